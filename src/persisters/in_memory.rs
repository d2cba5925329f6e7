use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::definitions::{ticket::TicketRecord, ticket_id::TicketId};

use super::persister::{
    decode_record, encode_record, Namespace, PersistError, TicketPersister,
};

/// Keeps encoded records in memory, keyed by id per namespace.
///
/// Records are stored encoded, so a reader goes through the same decoding
/// and integrity checks as with the filesystem adapter.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersister {
    namespaces: Arc<RwLock<HashMap<Namespace, BTreeMap<String, Vec<u8>>>>>,
}

impl InMemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places raw bytes under `key`, bypassing encoding. Lets callers seed
    /// legacy or damaged entries.
    pub fn insert_raw(&self, namespace: Namespace, key: impl Into<String>, buf: Vec<u8>) {
        self.namespaces
            .write()
            .expect("namespaces lock")
            .entry(namespace)
            .or_default()
            .insert(key.into(), buf);
    }

    pub fn len(&self, namespace: Namespace) -> usize {
        self.namespaces
            .read()
            .expect("namespaces lock")
            .get(&namespace)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, namespace: Namespace) -> bool {
        self.len(namespace) == 0
    }
}

#[async_trait]
impl TicketPersister for InMemoryPersister {
    async fn list(&self, namespace: Namespace) -> Result<Vec<TicketId>, PersistError> {
        Ok(self
            .namespaces
            .read()
            .expect("namespaces lock")
            .get(&namespace)
            .map(|entries| {
                entries
                    .keys()
                    .filter_map(|key| TicketId::parse(key).ok())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn exists(&self, namespace: Namespace, id: &TicketId) -> Result<bool, PersistError> {
        Ok(self
            .namespaces
            .read()
            .expect("namespaces lock")
            .get(&namespace)
            .is_some_and(|entries| entries.contains_key(id.as_str())))
    }

    async fn retrieve(
        &self,
        namespace: Namespace,
        id: &TicketId,
    ) -> Result<TicketRecord, PersistError> {
        let buf = self
            .namespaces
            .read()
            .expect("namespaces lock")
            .get(&namespace)
            .and_then(|entries| entries.get(id.as_str()).cloned())
            .ok_or(PersistError::NotFound)?;
        decode_record(id.as_str(), &buf)
    }

    async fn store(&self, namespace: Namespace, record: &TicketRecord) -> Result<(), PersistError> {
        let buf = encode_record(record)?;
        let mut namespaces = self.namespaces.write().expect("namespaces lock");
        let entries = namespaces.entry(namespace).or_default();
        if entries.contains_key(record.id.as_str()) {
            return Err(PersistError::AlreadyExists);
        }
        entries.insert(record.id.to_string(), buf);
        Ok(())
    }
}
