use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::definitions::{ticket::TicketRecord, ticket_id::TicketId};

use super::persister::{
    decode_record, encode_record, Namespace, PersistError, TicketPersister,
};

#[cfg(unix)]
const FILE_MODE: u32 = 0o640;

/// One directory per namespace under `root`, one file per ticket id.
///
/// Files are written under a hidden temporary name and then hard-linked to
/// their final name. Linking fails if the name is taken, which gives an
/// atomic create-if-absent, and readers never see a half written record.
#[derive(Debug, Clone)]
pub struct FilesystemPersister {
    root: PathBuf,
}

impl FilesystemPersister {
    /// Opens (creating if needed) the namespace directories under `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let persister = Self { root: root.into() };
        for namespace in [Namespace::Pending, Namespace::Paid] {
            fs::create_dir_all(persister.dir(namespace)).await?;
        }
        log::debug!("ticket storage opened at {}", persister.root.display());
        Ok(persister)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.dir_name())
    }

    fn path(&self, namespace: Namespace, id: &TicketId) -> PathBuf {
        self.dir(namespace).join(id.as_str())
    }
}

#[async_trait]
impl TicketPersister for FilesystemPersister {
    async fn list(&self, namespace: Namespace) -> Result<Vec<TicketId>, PersistError> {
        let mut entries = fs::read_dir(self.dir(namespace)).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match TicketId::parse(name) {
                Ok(id) => ids.push(id),
                Err(_) => log::warn!("ignoring stray file {name} in {namespace}"),
            }
        }
        Ok(ids)
    }

    async fn exists(&self, namespace: Namespace, id: &TicketId) -> Result<bool, PersistError> {
        Ok(fs::try_exists(self.path(namespace, id)).await?)
    }

    async fn retrieve(
        &self,
        namespace: Namespace,
        id: &TicketId,
    ) -> Result<TicketRecord, PersistError> {
        let buf = match fs::read(self.path(namespace, id)).await {
            Ok(buf) => buf,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(PersistError::NotFound),
            Err(e) => return Err(e.into()),
        };
        decode_record(id.as_str(), &buf)
    }

    async fn store(&self, namespace: Namespace, record: &TicketRecord) -> Result<(), PersistError> {
        let buf = encode_record(record)?;
        let target = self.path(namespace, &record.id);
        let tmp = self
            .dir(namespace)
            .join(format!(".{}.{}.tmp", record.id, Uuid::new_v4()));

        let result = write_then_link(&tmp, &target, &buf).await;
        if let Err(e) = fs::remove_file(&tmp).await {
            if e.kind() != ErrorKind::NotFound {
                log::warn!("could not remove {}: {e}", tmp.display());
            }
        }
        result?;
        log::debug!("stored {} in {namespace}", record.id);
        Ok(())
    }
}

async fn write_then_link(tmp: &Path, target: &Path, buf: &[u8]) -> Result<(), PersistError> {
    fs::write(tmp, buf).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp, std::fs::Permissions::from_mode(FILE_MODE)).await?;
    }
    match fs::hard_link(tmp, target).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(PersistError::AlreadyExists),
        Err(e) => Err(e.into()),
    }
}
