use std::time::Duration;

use thiserror::Error;

use crate::{
    allocator::AllocationError, config::ConfigError, definitions::ticket_id::TicketId,
    persisters::persister::PersistError,
};

/// Everything the store can report back to the request layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid order: {0}")]
    InvalidDraft(String),
    #[error("malformed ticket id `{0}`")]
    InvalidId(String),
    #[error("ticket id limit of {limit} reached")]
    CapacityExceeded { limit: usize },
    #[error("could not create a unique ticket id after {attempts} attempts")]
    AllocationCollision { attempts: u32 },
    #[error("no pending ticket with id {0}")]
    NotFound(TicketId),
    #[error("stored ticket {id} is unreadable: {reason}")]
    CorruptRecord { id: String, reason: String },
    #[error("ticket {0} is already paid for")]
    AlreadyPaid(TicketId),
    #[error("storage failure: {0}")]
    Persist(#[from] PersistError),
    #[error("ticket allocation worker is not running")]
    WorkerUnavailable,
    #[error("ticket allocation did not answer within {0:?}")]
    WorkerTimeout(Duration),
    #[error("invalid store configuration: {0}")]
    Config(#[from] ConfigError),
}

impl StoreError {
    /// Whether repeating the same call can succeed without operator help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::AllocationCollision { .. } | StoreError::WorkerTimeout(_)
        )
    }

    /// Whether the caller sent something wrong, as opposed to a server side
    /// failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidDraft(_)
                | StoreError::InvalidId(_)
                | StoreError::NotFound(_)
                | StoreError::AlreadyPaid(_)
        )
    }
}

impl From<AllocationError> for StoreError {
    fn from(value: AllocationError) -> Self {
        match value {
            AllocationError::CapacityExceeded { limit } => StoreError::CapacityExceeded { limit },
            AllocationError::Collision { attempts } => StoreError::AllocationCollision { attempts },
        }
    }
}
