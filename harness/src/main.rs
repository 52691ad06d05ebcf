//! ESS Harness - Entry Point
//!
//! Provisions, upgrades, migrates and shuts down ESS deployments for stack
//! testing. One phase runs per invocation, or all of them with `--pipeline`.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use ess_harness::app::options::HarnessOptions;
use ess_harness::app::run::run;
use ess_harness::logs::{init_logging, LogOptions};
use ess_harness::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    let options = match HarnessOptions::from_args(&cli_args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Invalid options: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: options.log_level,
        json_format: options.json_logs,
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    info!("Running ESS harness {} ({})", version.version, version.git_hash);
    tokio::select! {
        result = run(options) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Phase failed: {e}");
                ExitCode::FAILURE
            }
        },
        _ = await_shutdown_signal() => {
            error!("Interrupted before the phase completed");
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down...");
        } else {
            std::future::pending::<()>().await;
        }
    }
}
