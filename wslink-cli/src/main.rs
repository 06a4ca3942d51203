mod cli;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use wslink::{Credentials, HttpLoginFlow, LinkManager, StdoutSink, TungsteniteConnector, tls};

use crate::cli::Args;

#[tokio::main]
async fn main() {
    let args = Args::load();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Credentials first: nothing touches the network if they are missing.
    let credentials = Credentials::from_env()?;

    let config = args.link_config();
    config.validate()?;

    let tls_config = tls::websocket_config(config.danger_accept_invalid_certs)
        .context("Failed to set up TLS")?;
    if config.danger_accept_invalid_certs {
        warn!(
            "Server certificate validation is disabled for {}",
            config.url
        );
    }

    let login_flow = HttpLoginFlow::new(args.login_url.clone());
    info!(
        "Keeping {} open, signing in through {}",
        config.url,
        login_flow.login_url()
    );
    let manager = LinkManager::new(
        config,
        credentials,
        TungsteniteConnector::new(tls_config),
        Arc::new(login_flow),
        Arc::new(StdoutSink),
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                signal_cancel.cancel();
            }
            Err(e) => error!("Failed to listen for interrupt signal: {}", e),
        }
    });

    manager.run(cancel).await;
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}
