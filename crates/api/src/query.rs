//! Query parameter types for API handlers.

use relaize_core::task::TaskStatus;
use relaize_db::ListTasksQuery;
use serde::Deserialize;

use crate::error::AppResult;

/// `GET /tasks?status=&offset=&limit=`.
///
/// `limit` is clamped in the service layer via `clamp_limit`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListParams {
    pub status: Option<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl TaskListParams {
    /// Parse the status filter; an unknown status is a validation error.
    pub fn into_query(self) -> AppResult<ListTasksQuery> {
        let status = self
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TaskStatus::parse)
            .transpose()?;

        Ok(ListTasksQuery {
            status,
            offset: self.offset,
            limit: self.limit,
        })
    }
}
