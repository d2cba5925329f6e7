//! Confirm-and-promote: charge a pending ticket and move it to paid.
//!
//! The store never talks to a payment provider itself. [`Checkout`] sits
//! between the request layer and a [`PaymentGateway`], and only promotes a
//! ticket once the gateway reports a paid charge that matches the order.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    definitions::{ticket::TicketRecord, ticket_id::TicketId, ticket_state::TicketState},
    error::StoreError,
    helpers::normalize_id,
    persisters::persister::TicketPersister,
    store::TicketStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Minor currency units
    pub amount: u64,
    pub currency: String,
    pub description: String,
    pub email: String,
    pub statement: String,
    /// Opaque payment token handed over by the client
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub paid: bool,
    pub amount: u64,
    pub currency: String,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("card error {code}: {message}")]
    Card { code: String, message: String },
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: ChargeRequest) -> Result<Charge, GatewayError>;
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Payment failed (charge error): {0}")]
    Gateway(#[from] GatewayError),
    #[error("Payment failed: {code}: {message}")]
    Declined { code: String, message: String },
    #[error("a payment for ticket {0} is already in progress")]
    InProgress(TicketId),
    #[error("charge of {charged} {currency} does not match the expected {expected}")]
    NonConforming {
        expected: u64,
        charged: u64,
        currency: String,
    },
    #[error("charge {charge_id} went through but ticket could not be saved: {source}")]
    Unrecorded {
        charge_id: String,
        source: StoreError,
    },
}

/// A successfully paid ticket and the charge that paid for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub ticket: TicketRecord,
    pub charge_id: String,
}

/// Read-only view of a ticket for lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketInfo {
    pub ticket: TicketRecord,
    pub state: TicketState,
}

pub struct Checkout<P: ?Sized, G> {
    store: TicketStore<P>,
    gateway: G,
    in_flight: Mutex<HashSet<TicketId>>,
    /// Charges that went through for tickets still pending, by ticket id
    unrecorded: Mutex<HashMap<TicketId, String>>,
}

/// Claim on a ticket id for the duration of one payment attempt.
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<TicketId>>,
    id: TicketId,
}

impl<'a> InFlight<'a> {
    fn claim(ids: &'a Mutex<HashSet<TicketId>>, id: &TicketId) -> Option<Self> {
        let claimed = ids.lock().expect("in flight lock").insert(id.clone());
        claimed.then(|| Self {
            ids,
            id: id.clone(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids.lock().expect("in flight lock").remove(&self.id);
    }
}

impl<P, G> Checkout<P, G>
where
    P: TicketPersister + ?Sized,
    G: PaymentGateway,
{
    pub fn new(store: TicketStore<P>, gateway: G) -> Self {
        Self {
            store,
            gateway,
            in_flight: Mutex::new(HashSet::new()),
            unrecorded: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &TicketStore<P> {
        &self.store
    }

    /// Charges that succeeded at the gateway but whose ticket could not be
    /// saved as paid yet.
    pub fn unrecorded_charges(&self) -> Vec<(TicketId, String)> {
        let unrecorded = self.unrecorded.lock().expect("unrecorded charges lock");
        unrecorded
            .iter()
            .map(|(id, charge_id)| (id.clone(), charge_id.clone()))
            .collect()
    }

    /// Charges the pending ticket `id` with `token` and promotes it to paid.
    ///
    /// While one payment for an id is running, another one for the same id
    /// through this `Checkout` is refused with `InProgress` before anything
    /// is charged. If an earlier charge went through but the ticket could not
    /// be saved, paying again retries the save with that charge and does not
    /// charge a second time.
    pub async fn pay(&self, id: &str, token: &str) -> Result<Receipt, CheckoutError> {
        let id = TicketId::parse(&normalize_id(id))?;
        let Some(_claim) = InFlight::claim(&self.in_flight, &id) else {
            return Err(CheckoutError::InProgress(id));
        };
        if self.store.is_paid(&id).await? {
            return Err(StoreError::AlreadyPaid(id).into());
        }
        let ticket = self.store.load_pending(id.as_str()).await?;

        let earlier = self
            .unrecorded
            .lock()
            .expect("unrecorded charges lock")
            .get(&id)
            .cloned();
        let charge_id = match earlier {
            Some(charge_id) => {
                log::info!("ticket {id} was already charged by {charge_id}, saving it again");
                charge_id
            }
            None => self.charge(&ticket, token).await?,
        };
        self.record(ticket, charge_id).await
    }

    /// Charges the ticket total and returns the id of a conforming charge.
    async fn charge(&self, ticket: &TicketRecord, token: &str) -> Result<String, CheckoutError> {
        let config = self.store.config();
        let request = ChargeRequest {
            amount: ticket.total_amount,
            currency: config.currency.clone(),
            description: ticket.id.to_string(),
            email: ticket.email.clone(),
            statement: format!("{} {}", config.statement_prefix, ticket.id),
            source: token.to_string(),
        };
        let charge = match self.gateway.charge(request).await {
            Ok(charge) => charge,
            Err(e) => {
                log::warn!("charge for ticket {} failed: {e}", ticket.id);
                return Err(e.into());
            }
        };

        if !charge.paid {
            let code = charge.failure_code.unwrap_or_default();
            let message = charge.failure_message.unwrap_or_default();
            log::warn!("payment for ticket {} declined: {code}: {message}", ticket.id);
            return Err(CheckoutError::Declined { code, message });
        }
        if charge.amount != ticket.total_amount
            || !charge.currency.eq_ignore_ascii_case(&config.currency)
        {
            log::warn!(
                "charge {} for ticket {} is {} {}, expected {} {}",
                charge.id,
                ticket.id,
                charge.amount,
                charge.currency,
                ticket.total_amount,
                config.currency
            );
            return Err(CheckoutError::NonConforming {
                expected: ticket.total_amount,
                charged: charge.amount,
                currency: charge.currency,
            });
        }

        Ok(charge.id)
    }

    async fn record(
        &self,
        ticket: TicketRecord,
        charge_id: String,
    ) -> Result<Receipt, CheckoutError> {
        let result = self.store.promote_to_paid(&ticket).await;
        let mut unrecorded = self.unrecorded.lock().expect("unrecorded charges lock");
        match result {
            Ok(()) => {
                unrecorded.remove(&ticket.id);
                log::info!("ticket {} paid by charge {charge_id}", ticket.id);
                Ok(Receipt { ticket, charge_id })
            }
            Err(source) => {
                log::error!(
                    "Couldn't save ticket {} paid by charge {charge_id}: {source}",
                    ticket.id
                );
                if matches!(source, StoreError::AlreadyPaid(_)) {
                    unrecorded.remove(&ticket.id);
                } else {
                    unrecorded.insert(ticket.id.clone(), charge_id.clone());
                }
                Err(CheckoutError::Unrecorded { charge_id, source })
            }
        }
    }

    /// Looks a ticket up by a typed-in id, tolerating case and whitespace.
    pub async fn lookup(&self, id: &str) -> Result<TicketInfo, StoreError> {
        lookup(&self.store, id).await
    }
}

pub async fn lookup<P>(store: &TicketStore<P>, id: &str) -> Result<TicketInfo, StoreError>
where
    P: TicketPersister + ?Sized,
{
    let ticket = store.load_pending(&normalize_id(id)).await?;
    let state = if store.is_paid(&ticket.id).await? {
        TicketState::Paid
    } else {
        TicketState::Pending
    };
    Ok(TicketInfo { ticket, state })
}

/// How [`MockGateway`] answers every charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Approve,
    Decline { code: String, message: String },
    /// Approves but books `amount` instead of the requested amount.
    Misbook { amount: u64 },
    Fail,
}

/// In-process gateway for tests and demos. Records every request it sees.
#[derive(Debug)]
pub struct MockGateway {
    outcome: MockOutcome,
    requests: Mutex<Vec<ChargeRequest>>,
}

impl MockGateway {
    pub fn new(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn approving() -> Self {
        Self::new(MockOutcome::Approve)
    }

    pub fn requests(&self) -> Vec<ChargeRequest> {
        self.requests.lock().expect("mock gateway lock").clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<Charge, GatewayError> {
        self.requests
            .lock()
            .expect("mock gateway lock")
            .push(request.clone());
        let id = format!("ch_mock_{}", Uuid::new_v4().simple());
        match &self.outcome {
            MockOutcome::Approve => Ok(Charge {
                id,
                paid: true,
                amount: request.amount,
                currency: request.currency,
                failure_code: None,
                failure_message: None,
            }),
            MockOutcome::Decline { code, message } => Ok(Charge {
                id,
                paid: false,
                amount: request.amount,
                currency: request.currency,
                failure_code: Some(code.clone()),
                failure_message: Some(message.clone()),
            }),
            MockOutcome::Misbook { amount } => Ok(Charge {
                id,
                paid: true,
                amount: *amount,
                currency: request.currency,
                failure_code: None,
                failure_message: None,
            }),
            MockOutcome::Fail => Err(GatewayError::Unavailable("mock outage".to_string())),
        }
    }
}
