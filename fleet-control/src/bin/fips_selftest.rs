use clap::Parser;
use fips_fleet_control::build_info;
use fips_fleet_control::http::tls::install_rustls_default_crypto_provider;
use fips_fleet_control::selftest::{self, SelfTestStatus};
use std::process::exit;

/// Runs the cryptographic self-test suite and reports the outcome.
/// Exit codes: 0 all pass, 1 any critical failure, 2 argument error.
#[derive(Debug, Parser)]
#[command(name = "fips-selftest", version)]
struct Cli {
    /// Emit the full report as JSON instead of the text summary.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    install_rustls_default_crypto_provider();

    let report = selftest::generate_report(build_info::CRATE_VERSION);

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(body) => println!("{body}"),
            Err(err) => {
                eprintln!("could not serialize report: {err}");
                exit(1);
            }
        }
    } else {
        println!(
            "FIPS self-test: version {} on {}",
            report.version, report.platform
        );
        for result in &report.results {
            let tag = match result.status {
                SelfTestStatus::Pass => "PASS",
                SelfTestStatus::Fail => "FAIL",
                SelfTestStatus::Warning => "WARN",
                SelfTestStatus::Skip => "SKIP",
            };
            println!("[{tag}] {}: {}", result.name, result.message);
        }
        println!(
            "{} checks: {} passed, {} failed, {} warnings, {} skipped",
            report.summary.total,
            report.summary.passed,
            report.summary.failed,
            report.summary.warnings,
            report.summary.skipped
        );
    }

    exit(if report.passed { 0 } else { 1 });
}
