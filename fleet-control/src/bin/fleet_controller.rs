use actix_web::{App, HttpServer, web};
use clap::Parser;
use fips_fleet_control::agent::pipeline::CheckConfig;
use fips_fleet_control::event::channel::pub_sub_bounded;
use fips_fleet_control::fleet::api::{ApiState, routes};
use fips_fleet_control::fleet::config::ControllerConfig;
use fips_fleet_control::fleet::monitor::{EVENT_CHANNEL_CAPACITY, Monitor};
use fips_fleet_control::fleet::remediation::RemediationQueue;
use fips_fleet_control::fleet::store::SqliteStore;
use fips_fleet_control::fleet::types::NodeEvent;
use fips_fleet_control::http::tls::install_rustls_default_crypto_provider;
use fips_fleet_control::utils::spawn_named;
use std::error::Error;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Fleet controller daemon: enrollment, liveness monitoring, report ingestion
/// and remediation dispatch.
#[derive(Debug, Parser)]
#[command(name = "fleet-controller", version)]
struct Cli {
    /// Path to the controller configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = _main(cli) {
        error!("the controller exited with an error: {e}");
        exit(1);
    }
}

fn _main(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };
    config.logging.try_init()?;
    install_rustls_default_crypto_provider();

    let admin_key = config.resolve_admin_key()?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    // Bounded transition-event channel; a drain thread logs the transitions
    // and drops nothing the monitor cares about.
    let (event_publisher, event_consumer) = pub_sub_bounded::<NodeEvent>(EVENT_CHANNEL_CAPACITY);
    let event_drain = spawn_named("fleet_events", move || {
        for event in event_consumer.as_ref().iter() {
            info!(node_id = %event.node_id, event = event.kind.as_str(), "node transition");
        }
    });

    let monitor =
        Monitor::new(store.clone(), config.monitor, Some(event_publisher)).spawn();

    let state = web::Data::new(ApiState {
        store,
        queue: Arc::new(RemediationQueue::new()),
        admin_key,
        deployment_tier: config.deployment_tier.clone(),
        check_config: CheckConfig::default(),
    });

    let bind_addr = (config.host.clone(), config.port);
    info!(host = %config.host, port = config.port, "starting controller API");
    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
            .bind(bind_addr)?
            .shutdown_timeout(SHUTDOWN_TIMEOUT.as_secs())
            .run()
            .await
    })?;

    // The HTTP server returned: SIGINT/SIGTERM was handled, drain the rest.
    monitor.join()?;
    let _ = event_drain.join();
    info!("exiting gracefully");
    Ok(())
}
