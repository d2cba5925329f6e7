//! The single writer of the pending namespace.
//!
//! One task owns "list issued ids, pick a new one, persist it". Callers queue
//! an [`AllocationRequest`] and wait on its reply channel; the task handles
//! requests strictly one after another in arrival order.

use std::{collections::HashSet, sync::Arc};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    allocator::IdAllocator,
    definitions::{
        ticket::{TicketDraft, TicketRecord},
        ticket_id::TicketId,
    },
    error::StoreError,
    persisters::persister::{Namespace, PersistError, TicketPersister},
};

pub(crate) struct AllocationRequest {
    pub draft: TicketDraft,
    pub total: u64,
    pub reply: oneshot::Sender<Result<TicketRecord, StoreError>>,
}

pub(crate) fn spawn<P>(
    persister: Arc<P>,
    allocator: IdAllocator,
    queue_depth: usize,
) -> (mpsc::Sender<AllocationRequest>, JoinHandle<()>)
where
    P: TicketPersister + ?Sized + 'static,
{
    let (sender, receiver) = mpsc::channel(queue_depth);
    let handle = tokio::spawn(run(persister, allocator, receiver));
    (sender, handle)
}

async fn run<P>(
    persister: Arc<P>,
    allocator: IdAllocator,
    mut requests: mpsc::Receiver<AllocationRequest>,
) where
    P: TicketPersister + ?Sized,
{
    log::info!("ticket allocation worker started ({allocator:?})");
    while let Some(request) = requests.recv().await {
        let result =
            allocate_and_persist(persister.as_ref(), &allocator, request.draft, request.total)
                .await;
        if let Err(Ok(record)) = request.reply.send(result) {
            log::warn!(
                "caller stopped waiting, ticket {} stays pending",
                record.id
            );
        }
    }
    log::info!("ticket allocation worker stopped");
}

async fn allocate_and_persist<P>(
    persister: &P,
    allocator: &IdAllocator,
    draft: TicketDraft,
    total: u64,
) -> Result<TicketRecord, StoreError>
where
    P: TicketPersister + ?Sized,
{
    let existing: HashSet<TicketId> = persister
        .list(Namespace::Pending)
        .await?
        .into_iter()
        .collect();
    let id = allocator.allocate(existing.len(), &existing)?;
    let record = TicketRecord::new(id, draft, total);
    match persister.store(Namespace::Pending, &record).await {
        Ok(()) => Ok(record),
        // Written by someone outside this worker since the listing.
        Err(PersistError::AlreadyExists) => {
            log::warn!("ticket id {} appeared while allocating", record.id);
            Err(StoreError::AllocationCollision {
                attempts: allocator.retry_budget(),
            })
        }
        Err(e) => Err(e.into()),
    }
}
