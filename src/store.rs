//! The two-phase ticket store.
//!
//! A ticket id goes `absent → pending → paid` and never back. Creation is
//! funnelled through a single allocation worker so that two concurrent orders
//! can never observe the same set of issued ids. Reads and promotion run on
//! the caller's task; promotion relies on the persister's create-if-absent
//! write, so of two concurrent promotions of one id exactly one succeeds.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::{
    allocator::{Clock, IdAllocator, SystemClock},
    config::StoreConfig,
    definitions::{
        ticket::{TicketDraft, TicketRecord},
        ticket_id::TicketId,
        ticket_state::TicketState,
    },
    error::StoreError,
    persisters::{
        filesystem::FilesystemPersister,
        persister::{Namespace, PersistError, TicketPersister},
    },
    worker::{self, AllocationRequest},
};

/// Issued/paid counts, as seen by the persister right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub issued: usize,
    pub paid: usize,
    pub remaining: usize,
}

pub struct TicketStore<P: ?Sized> {
    persister: Arc<P>,
    config: Arc<StoreConfig>,
    requests: mpsc::Sender<AllocationRequest>,
}

impl<P: ?Sized> Clone for TicketStore<P> {
    fn clone(&self) -> Self {
        Self {
            persister: self.persister.clone(),
            config: self.config.clone(),
            requests: self.requests.clone(),
        }
    }
}

impl TicketStore<FilesystemPersister> {
    /// Opens a store over `config.data_dir`.
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let persister = FilesystemPersister::open(&config.data_dir).await?;
        Self::new(persister, config)
    }
}

impl<P: TicketPersister + 'static> TicketStore<P> {
    /// Builds a store and starts its allocation worker. Must be called from
    /// within a tokio runtime.
    pub fn new(persister: P, config: StoreConfig) -> Result<Self, StoreError> {
        Self::with_clock(persister, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        persister: P,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        Self::from_shared(Arc::new(persister), config, clock)
    }
}

impl<P: TicketPersister + ?Sized + 'static> TicketStore<P> {
    pub fn from_shared(
        persister: Arc<P>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        let allocator = IdAllocator::new(config.id_limit, config.retry_budget, clock);
        let (requests, _worker) = worker::spawn(persister.clone(), allocator, config.queue_depth);
        Ok(Self {
            persister,
            config: Arc::new(config),
            requests,
        })
    }
}

impl<P: TicketPersister + ?Sized> TicketStore<P> {
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// False once the allocation worker has exited; every later
    /// [`create_ticket`](Self::create_ticket) fails with `WorkerUnavailable`.
    pub fn is_worker_running(&self) -> bool {
        !self.requests.is_closed()
    }

    /// Validates the draft, allocates an id and persists the ticket as
    /// pending.
    ///
    /// An invalid draft is rejected before any allocation. A caller that hits
    /// `WorkerTimeout` cannot tell whether the ticket was written; the
    /// worker logs tickets whose caller had already left.
    pub async fn create_ticket(&self, draft: TicketDraft) -> Result<TicketRecord, StoreError> {
        let total = match draft.validate(self.config.min_amount, self.config.max_amount) {
            Ok(total) => total,
            Err(e) => {
                log::warn!("rejected order from {}: {e}", draft.email);
                return Err(e);
            }
        };

        let record = self.submit(draft, total).await?;
        log::info!(
            "created ticket {} for {} ({} names, total {})",
            record.id,
            record.email,
            record.line_items.len(),
            record.total_amount
        );
        Ok(record)
    }

    async fn submit(&self, draft: TicketDraft, total: u64) -> Result<TicketRecord, StoreError> {
        let timeout = self.config.allocation_timeout;
        let (reply, response) = oneshot::channel();
        let request = AllocationRequest { draft, total, reply };

        let exchange = async {
            self.requests
                .send(request)
                .await
                .map_err(|_| StoreError::WorkerUnavailable)?;
            response.await.map_err(|_| StoreError::WorkerUnavailable)?
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(Err(StoreError::WorkerUnavailable)) => {
                log::error!("ticket allocation worker is gone");
                Err(StoreError::WorkerUnavailable)
            }
            Ok(result) => result,
            Err(_) => Err(StoreError::WorkerTimeout(timeout)),
        }
    }

    /// Loads a pending ticket by its (caller supplied) id.
    pub async fn load_pending(&self, id: &str) -> Result<TicketRecord, StoreError> {
        let id = TicketId::parse(id)?;
        match self.persister.retrieve(Namespace::Pending, &id).await {
            Ok(record) => Ok(record),
            Err(PersistError::NotFound) => Err(StoreError::NotFound(id)),
            Err(PersistError::Corrupt(reason)) => {
                log::error!("pending ticket {id} is corrupt: {reason}");
                Err(StoreError::CorruptRecord {
                    id: id.to_string(),
                    reason,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Existence check against the paid namespace. Content is not read.
    pub async fn is_paid(&self, id: &TicketId) -> Result<bool, StoreError> {
        Ok(self.persister.exists(Namespace::Paid, id).await?)
    }

    pub async fn state_of(&self, id: &TicketId) -> Result<TicketState, StoreError> {
        if self.is_paid(id).await? {
            Ok(TicketState::Paid)
        } else if self.persister.exists(Namespace::Pending, id).await? {
            Ok(TicketState::Pending)
        } else {
            Ok(TicketState::Absent)
        }
    }

    /// Moves a pending ticket into the paid namespace.
    ///
    /// Call only once payment has succeeded out of band. The record has to
    /// match the pending one exactly. A second promotion of the same id, even
    /// a concurrent one, fails with `AlreadyPaid` and writes nothing.
    pub async fn promote_to_paid(&self, record: &TicketRecord) -> Result<(), StoreError> {
        let state = self.state_of(&record.id).await?;
        if !state.can_transition_to(TicketState::Paid) {
            log::warn!("cannot promote ticket {}: it is {state}", record.id);
            return Err(match state {
                TicketState::Paid => StoreError::AlreadyPaid(record.id.clone()),
                _ => StoreError::NotFound(record.id.clone()),
            });
        }

        let pending = self.load_pending(record.id.as_str()).await?;
        if pending != *record {
            return Err(StoreError::InvalidDraft(format!(
                "record does not match pending ticket {}",
                record.id
            )));
        }

        match self.persister.store(Namespace::Paid, record).await {
            Ok(()) => {
                log::info!(
                    "ticket {} paid ({} {})",
                    record.id,
                    record.total_amount,
                    self.config.currency
                );
                Ok(())
            }
            Err(PersistError::AlreadyExists) => {
                log::warn!("refused second promotion of ticket {}", record.id);
                Err(StoreError::AlreadyPaid(record.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let issued = self.persister.list(Namespace::Pending).await?.len();
        let paid = self.persister.list(Namespace::Paid).await?.len();
        Ok(StoreStats {
            issued,
            paid,
            remaining: self.config.id_limit.saturating_sub(issued),
        })
    }
}
