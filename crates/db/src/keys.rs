//! Redis key layout.

use std::fmt::Display;

/// Sorted set of task ids scored by creation time.
pub const TASK_INDEX: &str = "tasks:index";

/// List used as the FIFO work queue.
pub const TASK_QUEUE: &str = "tasks:queue";

const TASK_DATA_PREFIX: &str = "tasks:data:";

/// Key of the JSON blob holding one task record.
pub fn task_data(id: impl Display) -> String {
    format!("{TASK_DATA_PREFIX}{id}")
}
