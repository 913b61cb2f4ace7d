mod commands;
mod queries;
mod types;

pub(crate) use commands::{
    claim, create, delete, finish, mark_failed, reset_stalled, retry, set_expected,
    update_progress,
};
pub(crate) use queries::{current_status, find_by_id, list, list_stuck, next_pending, status_counts};
pub(crate) use types::{ClaimRule, CreateQueueRecord, FinishRun};
