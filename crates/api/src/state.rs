use std::sync::Arc;

use relaize_db::TaskService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Task records, queue and storage directories.
    pub service: Arc<TaskService>,
    pub config: Arc<ServerConfig>,
}
