//! Local compliance dashboard: the JSON endpoints an operator (or the static
//! web UI) consults on the node itself. No fleet state lives here.

use crate::agent::pipeline::{CheckConfig, run_checks};
use crate::backend;
use crate::build_info;
use crate::selftest;
use actix_web::{HttpResponse, web};

pub struct DashboardState {
    pub check_config: CheckConfig,
    pub deployment_tier: String,
}

async fn get_compliance(state: web::Data<DashboardState>) -> HttpResponse {
    let config = state.check_config.clone();
    match web::block(move || run_checks(&config)).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(_) => HttpResponse::InternalServerError()
            .json(serde_json::json!({ "error": "internal error" })),
    }
}

async fn get_backend() -> HttpResponse {
    HttpResponse::Ok().json(backend::detect_info())
}

async fn get_migration() -> HttpResponse {
    HttpResponse::Ok().json(backend::migration_status())
}

async fn get_deployment(state: web::Data<DashboardState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "tier": state.deployment_tier }))
}

async fn get_selftest() -> HttpResponse {
    match web::block(|| selftest::generate_report(build_info::CRATE_VERSION)).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(_) => HttpResponse::InternalServerError()
            .json(serde_json::json!({ "error": "internal error" })),
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/compliance", web::get().to(get_compliance))
            .route("/backend", web::get().to(get_backend))
            .route("/migration", web::get().to(get_migration))
            .route("/deployment", web::get().to(get_deployment))
            .route("/selftest", web::get().to(get_selftest)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn dashboard_serves_backend_and_deployment() {
        let state = web::Data::new(DashboardState {
            check_config: CheckConfig::default(),
            deployment_tier: "standard".to_string(),
        });
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/api/v1/deployment").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["tier"], "standard");

        let req = test::TestRequest::get().uri("/api/v1/backend").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body.get("active").is_some());

        let req = test::TestRequest::get().uri("/api/v1/migration").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body.get("migration_urgency").is_some());
    }
}
