pub mod auth;
pub mod error;
pub mod extract;
pub mod friends;
pub mod middleware;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod users;

use gamekeeper_core::ServiceResult;

pub use routes::router;
pub use state::{AppState, AppStateInner};

use crate::error::AppError;

/// Runs a synchronous service call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("spawn_blocking join error: {e}")))?
        .map_err(AppError::from)
}
