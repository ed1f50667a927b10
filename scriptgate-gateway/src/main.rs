//! Entry point for the `scriptgate` HTTPS server.

use std::path::PathBuf;
use std::sync::Arc;

use scriptgate_core::{Configuration, GatewaySettings};
use scriptgate_executor::ProcessBackend;
use scriptgate_gateway::{
    cors::CorsPolicy,
    error::StartupError,
    routes::{create_router, AppState},
    server::{build_app, GatewayServer, ServerTimeouts},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("SCRIPTGATE_CONFIG")
        .map_or_else(|_| PathBuf::from("config.yml"), PathBuf::from);

    if let Err(e) = run(config_path).await {
        tracing::error!(error = %e, "scriptgate stopped");
        std::process::exit(1);
    }
}

async fn run(config_path: PathBuf) -> Result<(), StartupError> {
    let config = Configuration::load(&config_path)?;
    let working_dir = std::env::current_dir()?;
    let settings = GatewaySettings::from_config(&config, &working_dir)?;

    let cors = CorsPolicy::new(&settings.cors_allowed_origin)?;
    let timeouts = ServerTimeouts::default();
    let state = AppState::new(Arc::new(ProcessBackend::new()), settings.clone());
    let app = build_app(create_router(state), cors, &timeouts);

    let server = GatewayServer::bind(&settings, app, timeouts).await?;
    let addr = server.local_addr()?;
    info!(
        addr = %addr,
        config = %config_path.display(),
        scripts = %settings.script_dir.display(),
        "scriptgate listening on https://{addr}"
    );

    server.serve().await?;
    Ok(())
}
