//! Spyglass backend server.
//!
//! ```bash
//! spyglass-server --config spyglass.toml --port 8000
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use spyglass::logger::setup_logger;
use spyglass::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "spyglass-server")]
#[command(about = "HTTP backend for the Spyglass party game", long_about = None)]
struct Args {
    /// TOML config file (default: ./spyglass.toml if present)
    #[arg(short, long, env = "SPYGLASS_CONFIG")]
    config: Option<PathBuf>,

    /// Host address to bind to, overriding the config file
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to bind to, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logger("spyglass-server", &args.log_level);

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), SpyglassError> {
    let mut config = ServerConfig::load(args.config.as_deref())?;
    config.listen_addr = override_addr(&config.listen_addr, args.host, args.port)?;
    config.validate()?;

    let auth = InitDataAuthenticator::from_settings(
        config.auth.bot_token.clone(),
        config.auth.init_data_bypass,
    );
    let server = SpyglassServerBuilder::from_config(&config)?
        .build(auth)
        .await?;

    server
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
        })
        .await
}

/// Replaces the host and/or port of `addr` with the CLI values.
fn override_addr(
    addr: &str,
    host: Option<String>,
    port: Option<u16>,
) -> Result<String, SpyglassError> {
    if host.is_none() && port.is_none() {
        return Ok(addr.to_string());
    }
    let current: SocketAddr = addr.parse().map_err(|_| {
        ConfigError::Invalid(format!("listen_addr {addr:?} is not a socket address"))
    })?;
    let port = port.unwrap_or(current.port());
    Ok(match host {
        Some(host) => format!("{host}:{port}"),
        None => SocketAddr::new(current.ip(), port).to_string(),
    })
}
