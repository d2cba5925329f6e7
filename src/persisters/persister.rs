use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::definitions::{ticket::TicketRecord, ticket_id::TicketId};

/// The two storage areas a ticket can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Pending,
    Paid,
}

impl Namespace {
    pub fn dir_name(self) -> &'static str {
        match self {
            Namespace::Pending => "pending",
            Namespace::Paid => "paid",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Storage behind the ticket store.
///
/// `store` has create-if-absent semantics: writing a record under an id that
/// already exists in the namespace fails with [`PersistError::AlreadyExists`]
/// and leaves the existing record untouched. A record is either fully
/// visible or not visible at all.
#[async_trait]
pub trait TicketPersister: Send + Sync {
    async fn list(&self, namespace: Namespace) -> Result<Vec<TicketId>, PersistError>;
    async fn exists(&self, namespace: Namespace, id: &TicketId) -> Result<bool, PersistError>;
    async fn retrieve(&self, namespace: Namespace, id: &TicketId)
        -> Result<TicketRecord, PersistError>;
    async fn store(&self, namespace: Namespace, record: &TicketRecord) -> Result<(), PersistError>;
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to persist: NotFound")]
    NotFound,
    #[error("Failed to persist: AlreadyExists")]
    AlreadyExists,
    #[error("Failed to persist: Corrupt ({0})")]
    Corrupt(String),
    #[error("Failed to persist: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to persist: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Encoding shared by every adapter: indented JSON plus a trailing newline.
pub fn encode_record(record: &TicketRecord) -> Result<Vec<u8>, PersistError> {
    let mut buf = serde_json::to_vec_pretty(record)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Parses a stored record and checks it belongs under `key`.
pub fn decode_record(key: &str, buf: &[u8]) -> Result<TicketRecord, PersistError> {
    let record: TicketRecord =
        serde_json::from_slice(buf).map_err(|e| PersistError::Corrupt(e.to_string()))?;
    if record.id.as_str() != key {
        return Err(PersistError::Corrupt(format!(
            "record id {} stored under {key}",
            record.id
        )));
    }
    if !record.is_well_formed() {
        return Err(PersistError::Corrupt(
            "total does not match line items".to_string(),
        ));
    }
    Ok(record)
}
