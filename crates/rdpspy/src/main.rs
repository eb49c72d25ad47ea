#[macro_use]
extern crate tracing;

mod config;
mod session;
mod tls;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tracing::Instrument as _;

use crate::config::Config;

fn main() -> anyhow::Result<()> {
    let config = Config::parse_args().context("CLI arguments parsing")?;

    setup_logging(config.log_file.as_deref()).context("unable to initialize logging")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("unable to create tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let acceptor = match (&config.cert, &config.key) {
        (Some(cert), Some(key)) => Some(tls::make_acceptor(cert, key).context("building the TLS acceptor")?),
        _ => {
            warn!("no certificate configured; TLS-negotiating clients will fail");
            None
        }
    };

    let connector = tls::make_connector();

    // Fail fast when the target is unreachable instead of accepting victims
    // that can never be bridged.
    tokio::net::TcpStream::connect(config.destination.lookup_addr())
        .await
        .with_context(|| format!("target {} is unreachable", config.destination.lookup_addr()))?;

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;

    info!(listen = %config.listen, target = %config.destination.lookup_addr(), "rdpspy is ready");

    let session_counter = Arc::new(AtomicU64::new(0));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let session_id = session_counter.fetch_add(1, Ordering::Relaxed);
        info!(%peer, session_id, "new victim connection");

        let config = config.clone();
        let acceptor = acceptor.clone();
        let connector = connector.clone();

        tokio::spawn(
            async move {
                if let Err(e) = session::run_session(config, acceptor, connector, stream, session_id).await {
                    error!(error = format_args!("{e:#}"), "session failed");
                }
            }
            .instrument(info_span!("session", id = session_id)),
        );
    }
}

fn setup_logging(log_file: Option<&str>) -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::builder()
        .with_default_directive("rdpspy=info".parse().context("invalid default filter")?)
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer)
        .init();

    Ok(())
}
