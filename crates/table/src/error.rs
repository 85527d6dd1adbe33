use thiserror::Error;

use crate::engine::EngineError;
use crate::table::TableState;
use crate::types::{TableId, UserId};

/// Failures reported by the account authority.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("rejected by authority: {0}")]
    Rejected(String),
    #[error("authority unavailable: {0}")]
    Unavailable(String),
}

/// Validation failures of table operations. Nothing is mutated when one is
/// returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("table {0} not found")]
    NotFound(TableId),
    #[error("table {0} already exists")]
    AlreadyExists(TableId),
    #[error("table {0} has no free seat")]
    SeatFull(TableId),
    #[error("user {user_id} is already at table {table_id}")]
    AlreadySeated { user_id: UserId, table_id: TableId },
    #[error("observers cannot switch ready state")]
    ObserverCannotReady,
    #[error("user {0} is not at this table")]
    NotSeated(UserId),
    #[error("table {table_id} is {state:?}, expected {expected:?}")]
    WrongState {
        table_id: TableId,
        state: TableState,
        expected: TableState,
    },
    #[error(transparent)]
    Authority(#[from] AuthorityError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Invariant violations on cached user profiles.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("user {0} is not registered")]
    Unknown(UserId),
    #[error("{field} of user {user_id} cannot be negative ({value})")]
    Negative {
        user_id: UserId,
        field: &'static str,
        value: i64,
    },
}
