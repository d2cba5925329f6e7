use std::sync::Arc;

use rand::Rng;
use ticket_store::{
    checkout::{Checkout, MockGateway},
    config::StoreConfig,
    persisters::in_memory::InMemoryPersister,
    TicketDraft, TicketStore,
};
use tokio::spawn;

use crate::runner::pay_twice;

mod runner;

// order tickets - many concurrent buyers
// pay each ticket - two racing payment submissions per ticket
// only one submission may be charged and promoted
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = StoreConfig {
        id_limit: 150,
        ..StoreConfig::from_env()
    };
    let store = TicketStore::new(InMemoryPersister::new(), config).expect("store config");

    let mut orders = Vec::new();
    for n in 0..200 {
        let store = store.clone();
        let amount = rand::thread_rng().gen_range(5..=500);
        orders.push(spawn(async move {
            let draft = TicketDraft::new(format!("buyer{n}@example.com"))
                .item(format!("Guest {n}"), amount);
            store.create_ticket(draft).await
        }));
    }

    let mut created = Vec::new();
    for order in orders {
        match order.await.expect("order task") {
            Ok(ticket) => created.push(ticket),
            Err(e) => println!("Order refused: {e}"),
        }
    }
    println!("Created {} tickets", created.len());

    let checkout = Arc::new(Checkout::new(store.clone(), MockGateway::approving()));
    let mut payments = Vec::new();
    for ticket in created {
        payments.push(spawn(pay_twice(checkout.clone(), ticket.id.to_string())));
    }
    let mut promoted = 0;
    for payment in payments {
        promoted += payment.await.expect("payment task");
    }

    let stats = store.stats().await.expect("stats");
    println!("Promoted {promoted} tickets, {stats:?}");
}
