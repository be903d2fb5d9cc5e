//! gateway-hydrate: startup entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config, apply `emulate` from the command line
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Connect to the identity store
//!   6. On readiness, hydrate once (Ctrl-C abandons the run)
//!   7. Print the report

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gateway_hydrate::{config, error, hydrate, logger, store};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    // Load .env if present; ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;
    if args.emulate {
        config.db.emulate = true;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        name = %config.name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        emulate = config.db.emulate,
        "config loaded"
    );

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, abandoning hydration");
            ctrlc_token.cancel();
        }
    });

    let connection = store::connect(&config.db);

    let report = tokio::select! {
        biased;

        _ = shutdown.cancelled() => None,
        report = hydrate::on_ready(connection, &config.db.hydration, config.db.scope_concurrency) => report,
    };

    match report {
        Some(report) => println!("✓ Hydration finished: {report}"),
        None => warn!("hydration did not run to completion"),
    }

    Ok(())
}

struct CliArgs {
    log_level: Option<&'static str>,
    emulate: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut emulate = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: gateway-hydrate [emulate] [OPTIONS]");
                println!();
                println!("Arguments:");
                println!("  emulate                    Keep the identity store in memory");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "emulate" => emulate = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    CliArgs {
        log_level: logger::level_for_verbosity(verbosity),
        emulate,
        config_path,
    }
}
