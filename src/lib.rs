//! Ticket identifier allocation and a two-phase (pending/paid) ticket store.
//!
//! Orders come in as [`TicketDraft`]s, get a short `IG18XXXX` identifier from
//! the [`allocator`] and are persisted as pending. After an out-of-band
//! payment succeeds the record is promoted into the paid namespace, at most
//! once.

pub mod allocator;
pub mod checkout;
pub mod config;
pub mod definitions;
pub mod error;
pub mod helpers;
pub mod persisters;
pub mod store;
mod worker;

pub use definitions::ticket::{LineItem, TicketDraft, TicketRecord};
pub use definitions::ticket_id::TicketId;
pub use definitions::ticket_state::TicketState;
pub use error::StoreError;
pub use store::TicketStore;
