use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::domain::error::Result;
use crate::infrastructure::bootstrap::build_state;
use crate::infrastructure::config::AppConfig;
use crate::interfaces::http::start_server;

pub async fn run() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.log_level);

    let state = build_state(&config).map_err(|err| {
        error!(error = %err, "Failed to initialize application state");
        err
    })?;

    let server = start_server(state, &config)?;
    server.await?;

    info!("HTTP API stopped");
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
