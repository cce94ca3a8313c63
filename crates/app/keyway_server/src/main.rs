//! Keyway SSO broker server binary.
//!
//! Configuration comes from `KEYWAY_*` / `OIDC_*` environment variables
//! (optionally via a `.env` file); see `BrokerConfig::from_env`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use keyway_core::config::BrokerConfig;
use keyway_core::handoff::HandoffLedger;
use keyway_core::idp::{IdentityProvider, OidcProvider};
use keyway_core::session::{MemorySessionStore, SessionStore};
use tracing::{info, warn};

/// CLI arguments for the broker server.
#[derive(Parser, Debug)]
#[command(name = "keyway_server", about = "Keyway SSO broker server")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long, env = "KEYWAY_BIND")]
    bind: Option<String>,

    /// Seconds between sweeps of expired sessions and handoff tickets.
    #[arg(long, env = "KEYWAY_CLEANUP_INTERVAL_SECS", default_value_t = 60)]
    cleanup_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,keyway_api=debug,keyway_core=debug")
                }),
        )
        .init();

    let args = Args::parse();

    let mut config = BrokerConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    info!(
        issuer = %config.issuer,
        callback_url = %config.callback_url,
        products = config.products.len(),
        "starting keyway_server"
    );
    if config.products.is_empty() {
        warn!("no products configured; logins will only set root cookies");
    }
    if !config.cookies.secure {
        warn!("secure cookies disabled; use only for local development");
    }

    let idp: Arc<dyn IdentityProvider> =
        Arc::new(OidcProvider::new(config.oidc.clone(), config.idp_timeout)?);

    let session_ttl = Duration::from_secs(config.session_ttl_secs.max(0) as u64);
    let sessions = Arc::new(MemorySessionStore::new(session_ttl));
    let ledger = Arc::new(HandoffLedger::new());

    let sweep = Duration::from_secs(args.cleanup_interval_secs.max(1));
    sessions.spawn_cleanup_task(sweep);
    ledger.spawn_cleanup_task(sweep);

    let bind_addr = config.bind_addr.clone();
    let state = keyway_api::AppState::new(config, sessions as Arc<dyn SessionStore>, idp, ledger);
    let app = keyway_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "SSO broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
