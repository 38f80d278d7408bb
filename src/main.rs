//! Entry point: CLI parsing, telemetry bring-up, document loading, and
//! report I/O. Mirrors the shape of the original `runner` binary's `main` —
//! parse args, configure telemetry from env + flags, dispatch, write the
//! report, exit non-zero on a non-Pass overall status — generalized from
//! one `execute` subcommand to the three document kinds this engine runs.

use clap::Parser;
use httpbench::cli::{Cli, CommonArgs, Commands};
use httpbench::context::Scope;
use httpbench::engine::model::Status;
use httpbench::engine::TestEngine;
use httpbench::load::LoadDriver;
use httpbench::report::{SuiteReport, TestReport};
use httpbench::suite::SuiteRunner;
use httpbench::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use httpbench::{loader, registry};
use tracing::{error, info, Level};

#[tokio::main]
async fn main() {
    registry::register_builtins();
    let cli = Cli::parse();

    let common = match &cli.command {
        Commands::Run { common, .. } => common,
        Commands::Suite { common, .. } => common,
        Commands::Load { common, .. } => common,
    };
    setup_telemetry(common);

    let exit_code = match &cli.command {
        Commands::Run { file, common } => run_test(file, common).await,
        Commands::Suite { file, common } => run_suite(file, common).await,
        Commands::Load {
            file,
            iterations,
            common,
        } => run_load(file, *iterations, common).await,
    };

    shutdown_telemetry();
    std::process::exit(exit_code);
}

fn setup_telemetry(common: &CommonArgs) {
    let mut telemetry_config = TelemetryConfig::from_env();
    telemetry_config.log_level = if common.silent {
        Level::ERROR
    } else if common.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    if common.otel {
        if let Some(endpoint) = &common.otel_endpoint {
            telemetry_config.otlp_endpoint = Some(endpoint.clone());
        } else if telemetry_config.otlp_endpoint.is_none() {
            telemetry_config.otlp_endpoint = Some("http://localhost:4317".to_string());
        }
    }

    if let Err(e) = init_telemetry(telemetry_config) {
        if !common.silent {
            eprintln!("Warning: failed to initialize telemetry: {e}");
        }
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

async fn run_test(file: &std::path::Path, common: &CommonArgs) -> i32 {
    let mut test = match loader::load_test(file) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "failed to load test document");
            return 1;
        }
    };
    if !common.silent {
        info!(test = %test.name, "test loaded");
    }

    let mut scope = Scope::new();
    let result = TestEngine::new().run(&mut test, &mut scope).await;
    let status = result.status;

    let report = TestReport::from(&result);
    write_report(
        common,
        report.to_json().unwrap_or_default(),
        report.to_text(),
    );

    exit_code_for(status)
}

async fn run_suite(file: &std::path::Path, common: &CommonArgs) -> i32 {
    let mut suite = match loader::load_suite(file) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to load suite document");
            return 1;
        }
    };
    if !common.silent {
        info!(suite = %suite.name, "suite loaded");
    }

    let result = SuiteRunner::new().run(&mut suite).await;
    let status = result.status;

    let report = SuiteReport::from(&result);
    write_report(
        common,
        report.to_json().unwrap_or_default(),
        report.to_text(),
    );

    exit_code_for(status)
}

async fn run_load(file: &std::path::Path, iterations: u64, common: &CommonArgs) -> i32 {
    let (name, scenarios) = match loader::load_load(file) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "failed to load load document");
            return 1;
        }
    };
    if !common.silent {
        info!(load = %name, scenarios = scenarios.len(), iterations, "load run starting");
    }

    let result = LoadDriver::new(name).run(scenarios, iterations).await;

    let json = serde_json::to_string_pretty(&result).unwrap_or_default();
    let mut text = format!(
        "Load {}: {} picks across {} scenario(s)\n",
        result.name,
        result.total_picks,
        result.per_scenario.len()
    );
    for (name, stats) in &result.per_scenario {
        text.push_str(&format!(
            "  {name}: picks={} passes={} failures={}\n",
            stats.picks, stats.passes, stats.failures
        ));
    }
    write_report(common, json, text);

    let any_failures = result.per_scenario.iter().any(|(_, s)| s.failures > 0);
    if any_failures {
        1
    } else {
        0
    }
}

fn write_report(common: &CommonArgs, json: String, text: String) {
    let rendered = if common.text { text } else { json };
    match &common.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &rendered) {
                eprintln!("failed to write report to {}: {e}", path.display());
            } else if !common.silent {
                println!("report saved to {}", path.display());
            }
        }
        None => println!("{rendered}"),
    }
}

fn exit_code_for(status: Status) -> i32 {
    if status == Status::Pass {
        0
    } else {
        1
    }
}
