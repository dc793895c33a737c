use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use opc_serial_bridge::{config, server::Bridge};

/// Bridge an OPC TCP stream to Adalight/AWA/WLED serial LED outputs.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the JSON configuration file.
    config: PathBuf,

    /// Enable periodic stats output.
    #[arg(long)]
    debug: bool,

    /// Enable per-frame hex dumps (implies --debug).
    #[arg(long)]
    ddebug: bool,
}

fn main() -> ExitCode {
    let mut args = Args::parse();
    if args.ddebug {
        args.debug = true;
    }

    init_tracing(args.debug, args.ddebug);

    let config = match config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running));

    let bridge = match Bridge::setup(&config, Arc::clone(&running)) {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to start bridge");
            return ExitCode::FAILURE;
        }
    };

    let run_result = bridge.run(&config.opc.host, config.opc.port, args.debug);
    bridge.shutdown();

    match run_result {
        Ok(()) => {
            info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool, ddebug: bool) {
    let default_level = if ddebug {
        "trace"
    } else if debug {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) {
    let handler_result = ctrlc::set_handler(move || {
        tracing::warn!("Ctrl-C received, shutting down");
        running.store(false, Ordering::Relaxed);
    });

    if let Err(e) = handler_result {
        error!(error = %e, "failed to install Ctrl-C handler");
    }
}
