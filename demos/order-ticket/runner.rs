use std::sync::Arc;

use ticket_store::{
    checkout::{Checkout, CheckoutError, MockGateway},
    persisters::in_memory::InMemoryPersister,
    StoreError,
};

/// Submits the same payment twice at once, like a double-clicked pay button.
/// Returns how many of the two were charged and promoted.
pub async fn pay_twice(
    checkout: Arc<Checkout<InMemoryPersister, MockGateway>>,
    id: String,
) -> usize {
    let (first, second) = tokio::join!(
        checkout.pay(&id, "tok_demo"),
        checkout.pay(&id, "tok_demo")
    );
    let mut paid = 0;
    for result in [first, second] {
        match result {
            Ok(receipt) => {
                println!("Paid {} with {}", receipt.ticket.id, receipt.charge_id);
                paid += 1;
            }
            Err(CheckoutError::InProgress(id))
            | Err(CheckoutError::Store(StoreError::AlreadyPaid(id))) => {
                println!("Duplicate payment for {id} refused");
            }
            Err(e) => println!("Payment for {id} failed: {e}"),
        }
    }
    paid
}
