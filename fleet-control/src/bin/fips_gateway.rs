use actix_web::{App, HttpServer, web};
use clap::Parser;
use fips_fleet_control::http::tls::install_rustls_default_crypto_provider;
use fips_fleet_control::proxy::config::GatewayConfig;
use fips_fleet_control::proxy::gateway::{
    GatewayState, build_listener_tls, build_upstream_client, forward,
};
use fips_fleet_control::proxy::inspector::ClientInspector;
use fips_fleet_control::proxy::server::{StatsState, routes as stats_routes};
use fips_fleet_control::selftest;
use std::error::Error;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const READ_HEADER_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// TLS-terminating reverse proxy with ClientHello inspection.
#[derive(Debug, Parser)]
#[command(name = "fips-gateway", version)]
struct Cli {
    /// Path to the gateway configuration file.
    #[arg(long)]
    config: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = _main(cli) {
        error!("the gateway exited with an error: {e}");
        exit(1);
    }
}

fn _main(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = GatewayConfig::load(&cli.config)?;
    config.logging.try_init()?;
    install_rustls_default_crypto_provider();

    // Startup gate: a critical self-test failure refuses to serve traffic.
    let (_results, outcome) = selftest::run_all_checks();
    if let Err(err) = outcome {
        eprintln!("refusing to start: {err}");
        exit(1);
    }
    info!("self-test gate passed");

    // One inspector per process; the cert resolver and the stats server share
    // it so both call paths produce identical summaries.
    let inspector = Arc::new(ClientInspector::new(config.ring_capacity)?);
    let tls_config = build_listener_tls(&config, inspector.clone())?;

    let gateway_state = web::Data::new(GatewayState {
        upstream_url: config.effective_upstream_url(),
        client: build_upstream_client(&config)?,
    });
    let stats_state = web::Data::new(StatsState {
        inspector: inspector.clone(),
    });

    info!(
        listen = %config.listen_addr,
        stats = %config.stats_addr,
        upstream = %gateway_state.upstream_url,
        upstream_tls = config.upstream_tls,
        "starting FIPS gateway"
    );

    let listen_addr = config.listen_addr.clone();
    let stats_addr = config.stats_addr.clone();
    actix_web::rt::System::new().block_on(async move {
        let main_server = HttpServer::new(move || {
            App::new()
                .app_data(gateway_state.clone())
                .default_service(web::to(forward))
        })
        .bind_rustls_0_23(listen_addr.as_str(), tls_config)?
        .client_request_timeout(READ_HEADER_TIMEOUT)
        .keep_alive(IDLE_TIMEOUT)
        .shutdown_timeout(SHUTDOWN_TIMEOUT.as_secs())
        .run();

        let stats_server = HttpServer::new(move || {
            App::new()
                .app_data(stats_state.clone())
                .configure(stats_routes)
        })
        .bind(stats_addr.as_str())?
        .shutdown_timeout(SHUTDOWN_TIMEOUT.as_secs())
        .run();

        // Both servers observe SIGINT/SIGTERM and drain within the shutdown
        // window.
        tokio::try_join!(main_server, stats_server).map(|_| ())
    })?;

    info!("exiting gracefully");
    Ok(())
}
