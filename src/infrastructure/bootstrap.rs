use std::sync::Arc;

use tracing::{info, warn};

use crate::application::use_cases::history_gateway::HistoryGateway;
use crate::application::use_cases::relay_executor::RelayExecutor;
use crate::application::use_cases::submit_relay::SubmitRelayUseCase;
use crate::domain::error::Result;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::history_store::{open_history_store, SharedHistoryStore};
use crate::interfaces::http::HttpState;

/// Builds the shared state once. The store handle is created here and passed
/// down explicitly; no database connection is attempted yet.
pub fn build_state(config: &AppConfig) -> Result<Arc<HttpState>> {
    let store = open_configured_store(config)?;
    let history = HistoryGateway::new(store);
    let executor = Arc::new(RelayExecutor::new(config.relay_timeout())?);

    info!(
        timeout_ms = executor.timeout().as_millis() as u64,
        history_enabled = history.is_configured(),
        "Relay pipeline ready"
    );

    Ok(Arc::new(HttpState {
        submit_relay: SubmitRelayUseCase::new(executor, history.clone()),
        history,
    }))
}

fn open_configured_store(config: &AppConfig) -> Result<Option<SharedHistoryStore>> {
    let Some(database_url) = config.database_url() else {
        warn!("DATABASE_URL not set, request history is disabled");
        return Ok(None);
    };

    let store = open_history_store(database_url)?;
    info!(target_db = %store.target(), "History storage configured");
    Ok(Some(store))
}
