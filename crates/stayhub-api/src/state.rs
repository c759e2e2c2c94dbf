use std::sync::Arc;

use tracing::error;

use stayhub_db::Database;

use crate::error::ApiError;
use crate::provider::PaymentProvider;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub provider: Arc<dyn PaymentProvider>,
    /// Handed to the browser for the hosted payment element.
    pub publishable_key: String,
    /// Unset disables the webhook endpoint.
    pub webhook_secret: Option<String>,
}

/// Run blocking DB work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::Internal)
}
