use actix_web::{App, HttpServer, web};
use clap::Parser;
use fips_fleet_control::agent::client::{EnrollRequest, FleetClient};
use fips_fleet_control::agent::config::AgentConfig;
use fips_fleet_control::agent::dashboard::{self, DashboardState};
use fips_fleet_control::agent::executor::{Executor, any_auto_failure};
use fips_fleet_control::agent::pipeline::{run_checks, run_checks_with};
use fips_fleet_control::agent::platform::HostPlatform;
use fips_fleet_control::agent::{spawn_remediation_poller, spawn_reporter};
use fips_fleet_control::backend;
use fips_fleet_control::build_info;
use fips_fleet_control::checker::posture::PostureCollector;
use fips_fleet_control::event::ApplicationEvent;
use fips_fleet_control::event::channel::{EventPublisher, pub_sub};
use fips_fleet_control::fleet::types::RemediationRequest;
use fips_fleet_control::http::client::HttpClient;
use fips_fleet_control::http::config::HttpConfig;
use fips_fleet_control::http::tls::install_rustls_default_crypto_provider;
use fips_fleet_control::utils::spawn_named;
use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use tracing::{error, info};

/// Node agent: periodic compliance reporting, remediation execution and the
/// local dashboard.
#[derive(Debug, Parser)]
#[command(name = "fleet-agent", version)]
struct Cli {
    /// Path to the agent configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run the check battery once, print the report and exit.
    #[arg(long)]
    check: bool,

    /// Run the named remediation actions once (comma-separated) and exit.
    #[arg(long, value_delimiter = ',')]
    remediate: Option<Vec<String>>,

    /// With --remediate: plan only, execute nothing.
    #[arg(long)]
    dry_run: bool,

    /// Enroll against the controller with this token and exit.
    #[arg(long)]
    enroll: Option<String>,

    /// Node name used at enrollment.
    #[arg(long)]
    name: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    match _main(cli) {
        Ok(code) => exit(code),
        Err(e) => {
            error!("the agent exited with an error: {e}");
            exit(1);
        }
    }
}

fn _main(cli: Cli) -> Result<i32, Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    config.logging.try_init()?;
    install_rustls_default_crypto_provider();

    if cli.check {
        let report = run_checks(&config.checks);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    if let Some(actions) = cli.remediate {
        return run_one_shot_remediation(&config, actions, cli.dry_run);
    }

    if let Some(token) = cli.enroll {
        return run_enrollment(&config, token, cli.name);
    }

    run_daemon(&config)
}

fn run_one_shot_remediation(
    config: &AgentConfig,
    actions: Vec<String>,
    dry_run: bool,
) -> Result<i32, Box<dyn Error>> {
    let executor = Executor::new(HostPlatform);
    let report = run_checks(&config.checks);
    let plan = executor.plan(&report.sections);
    let request = RemediationRequest {
        id: uuid::Uuid::new_v4().to_string(),
        node_id: config.node_id.clone().unwrap_or_default(),
        actions,
        dry_run,
    };
    let result = executor.execute(&request, &plan);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if any_auto_failure(&result) { 1 } else { 0 })
}

fn run_enrollment(
    config: &AgentConfig,
    token: String,
    name: Option<String>,
) -> Result<i32, Box<dyn Error>> {
    let http = HttpClient::new(HttpConfig::default())?;
    let backend_info = backend::detect_info();
    let response = FleetClient::enroll(
        &http,
        &config.controller_url,
        &EnrollRequest {
            token,
            name: name.unwrap_or_else(|| {
                std::env::var("HOSTNAME").unwrap_or_else(|_| "unnamed-node".to_string())
            }),
            // Role and region come from the token binding
            role: None,
            region: None,
            labels: HashMap::new(),
            version: build_info::CRATE_VERSION.to_string(),
            fips_backend: backend_info.name,
        },
    )?;
    // The API key is shown exactly once; persist it into the agent config.
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "node_id": response.node_id,
        "api_key": response.api_key,
    }))?);
    Ok(0)
}

fn run_daemon(config: &AgentConfig) -> Result<i32, Box<dyn Error>> {
    let (node_id, api_key) = config.resolve_identity()?;
    let backend_info = backend::detect_info();

    let client = FleetClient::new(
        HttpClient::new(HttpConfig::default())?,
        &config.controller_url,
        &node_id,
        &api_key,
        build_info::CRATE_VERSION,
        &backend_info.name,
    );

    let (application_event_publisher, application_event_consumer) = pub_sub();
    create_shutdown_signal_handler(application_event_publisher)?;

    // One posture collector per process, shared by both loops.
    let posture = Arc::new(PostureCollector::new());

    let check_config = config.checks.clone();
    let reporter_posture = posture.clone();
    let reporter = spawn_reporter(
        move || run_checks_with(&check_config, &reporter_posture),
        client,
        config.interval,
    );

    let poller = if config.remediate {
        let client = FleetClient::new(
            HttpClient::new(HttpConfig::default())?,
            &config.controller_url,
            &node_id,
            &api_key,
            build_info::CRATE_VERSION,
            &backend_info.name,
        );
        Some(spawn_remediation_poller(
            client,
            Executor::new(HostPlatform),
            config.checks.clone(),
            posture.clone(),
            config.interval,
        ))
    } else {
        None
    };

    let dashboard = match config.dashboard_port {
        Some(port) => Some(start_dashboard(config, port)?),
        None => None,
    };

    info!(node_id = %node_id, "agent running; waiting for shutdown signal");
    let _ = application_event_consumer.as_ref().recv();
    info!("shutdown requested, stopping loops");

    reporter.join()?;
    if let Some(poller) = poller {
        poller.join()?;
    }
    if let Some((handle, join)) = dashboard {
        actix_web::rt::System::new().block_on(handle.stop(true));
        let _ = join.join();
    }
    info!("exiting gracefully");
    Ok(0)
}

type DashboardHandle = (actix_web::dev::ServerHandle, std::thread::JoinHandle<()>);

/// Runs the dashboard server on its own thread; the returned handle stops it
/// during shutdown. Signals are handled by the main thread, not the server.
fn start_dashboard(config: &AgentConfig, port: u16) -> Result<DashboardHandle, Box<dyn Error>> {
    let state = web::Data::new(DashboardState {
        check_config: config.checks.clone(),
        deployment_tier: config.deployment_tier.clone(),
    });
    let (handle_tx, handle_rx) = std::sync::mpsc::channel();
    let join = spawn_named("agent_dashboard", move || {
        let system = actix_web::rt::System::new();
        let outcome: std::io::Result<()> = system.block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(state.clone())
                    .configure(dashboard::routes)
            })
            .bind(("127.0.0.1", port))?
            .workers(1)
            .disable_signals()
            .run();
            let _ = handle_tx.send(server.handle());
            server.await
        });
        if let Err(err) = outcome {
            error!(error_msg = %err, "dashboard server failed");
        }
    });
    let handle = handle_rx
        .recv()
        .map_err(|_| "dashboard server did not start")?;
    info!(port, "dashboard listening");
    Ok((handle, join))
}

fn create_shutdown_signal_handler(
    publisher: EventPublisher<ApplicationEvent>,
) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("received termination signal, stopping agent");
        let _ = publisher.publish(ApplicationEvent::StopRequested);
    })
}
