//! `openerpd`: the multi-site OpenERP server binary.
//!
//! Usage:
//!   openerpd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/openerp/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod bootstrap;
mod config;
mod pages;
mod routes;

use std::sync::Arc;

use clap::Parser;
use openerp_core::Module;
use openerp_site::ContextFactory;
use tracing::{info, warn};

use config::ServerConfig;
use routes::AppState;

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// OpenERP server.
#[derive(Parser, Debug)]
#[command(name = "openerpd", about = "OpenERP multi-site server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides `server.listen`, default 0.0.0.0:8080).
    #[arg(long = "listen")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;
    bootstrap::verify_config(&server_config)?;

    let listen = cli
        .listen
        .or_else(|| server_config.server.listen.clone())
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    let service = bootstrap::service_config(&server_config, &listen);

    let registry = Arc::new(bootstrap::open_registry(&service)?);
    bootstrap::register_sites(&registry, &server_config, &service)?;
    info!(sites = registry.len(), "sites ready");

    let mut factory = ContextFactory::new();
    if let Some(locale) = &server_config.server.default_locale {
        factory = factory.with_default_locale(locale);
    }

    let modules: Vec<Box<dyn Module>> = vec![Box::new(pages::module())];
    for m in &modules {
        info!("Module {} mounted at /{}/", m.name(), m.name());
    }

    let state = AppState {
        registry: registry.clone(),
        factory,
        auth: Arc::new(bootstrap::tokens(&server_config)),
    };
    let app = routes::build_router(state, &modules);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("OpenERP server listening on {}", listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = registry.destroy_all() {
        warn!(error = %e, "shutting sites down");
    }
    info!("OpenERP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "waiting for ctrl-c");
    }
}
