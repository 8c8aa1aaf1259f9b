//! Gateway stats server: health, recent clients, prometheus counters and the
//! on-demand self-test report.

use crate::build_info;
use crate::proxy::inspector::ClientInspector;
use crate::selftest;
use actix_web::{HttpResponse, web};
use std::sync::Arc;

pub struct StatsState {
    pub inspector: Arc<ClientInspector>,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": build_info::CRATE_VERSION,
        "mode": "fips-proxy-tier3",
    }))
}

async fn clients(state: web::Data<StatsState>) -> HttpResponse {
    let (recent, summary) = state.inspector.snapshot();
    HttpResponse::Ok().json(serde_json::json!({
        "recent": recent,
        "summary": summary,
    }))
}

async fn metrics(state: web::Data<StatsState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(state.inspector.render_metrics())
}

async fn selftest() -> HttpResponse {
    match web::block(|| selftest::generate_report(build_info::CRATE_VERSION)).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(_) => HttpResponse::InternalServerError()
            .json(serde_json::json!({ "error": "internal error" })),
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/api/v1/clients", web::get().to(clients))
        .route("/metrics", web::get().to(metrics))
        .route("/api/v1/selftest", web::get().to(selftest));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use rustls::CipherSuite;

    fn state_with_traffic() -> web::Data<StatsState> {
        let inspector = Arc::new(ClientInspector::new(128).unwrap());
        inspector.record(
            &[
                CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                CipherSuite::TLS13_AES_128_GCM_SHA256,
            ],
            Some("a.example"),
        );
        inspector.record(
            &[CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256],
            Some("b.example"),
        );
        web::Data::new(StatsState { inspector })
    }

    #[actix_web::test]
    async fn health_reports_proxy_mode() {
        let app = test::init_service(
            App::new().app_data(state_with_traffic()).configure(routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mode"], "fips-proxy-tier3");
    }

    #[actix_web::test]
    async fn clients_endpoint_returns_recent_and_summary() {
        let app = test::init_service(
            App::new().app_data(state_with_traffic()).configure(routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/v1/clients").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["summary"]["total"], 2);
        assert_eq!(body["summary"]["fips_capable"], 1);
        assert_eq!(body["summary"]["non_fips"], 1);
        assert_eq!(body["recent"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn metrics_endpoint_is_prometheus_text() {
        let app = test::init_service(
            App::new().app_data(state_with_traffic()).configure(routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("fips_proxy_clients_total 2"));
        assert!(text.contains("fips_proxy_clients_fips 1"));
        assert!(text.contains("fips_proxy_clients_nonfips 1"));
    }
}
