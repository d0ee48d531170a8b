//! Error taxonomy for the scheduling engine.

use thiserror::Error;

use crate::models::ItemId;

/// Errors surfaced by project mutations and queries.
///
/// Every error is a logic or input error. The engine performs no I/O, so
/// nothing here is transient and nothing is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// Accepting a dependency would close a cycle through this item.
    #[error("Dependency would create a cycle through item {0}")]
    CycleDetected(ItemId),
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),
    #[error("Duplicate item id: {0}")]
    DuplicateItem(ItemId),
    /// Structurally disallowed mutation (dates on a container, type change, ...).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// Malformed input record.
    #[error("Invalid project record: {0}")]
    Validation(String),
}

impl ScheduleError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
