//! Mock storage server binary.
//!
//! Launched by the fixture harness as a subprocess; not intended to be run
//! by hand, though nothing stops you.

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use shoal_server::{create_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// shoald - mock object-storage + identity server
#[derive(Parser, Debug)]
#[command(name = "shoald")]
#[command(version, about, long_about = None)]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long)]
    port: u16,

    /// Server certificate (PEM). TLS is enabled when both --tls-cert and
    /// --tls-key are given.
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// Server private key (PEM).
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid bind address")?;

    let app = create_router(AppState::new());

    match (args.tls_cert, args.tls_key) {
        (Some(cert), Some(key)) => {
            let tls = RustlsConfig::from_pem_file(&cert, &key)
                .await
                .context("failed to load TLS material")?;
            tracing::info!(%addr, "listening (TLS)");
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        _ => {
            tracing::info!(%addr, "listening");
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind to {addr}"))?;
            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}
