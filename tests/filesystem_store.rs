use std::{collections::HashSet, fs, sync::Arc};

use ticket_store::{
    allocator::FixedClock,
    checkout::{Checkout, CheckoutError, MockGateway},
    config::StoreConfig,
    definitions::ticket_id::is_valid_id,
    persisters::filesystem::FilesystemPersister,
    StoreError, TicketDraft, TicketState, TicketStore,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config(dir: &tempfile::TempDir, id_limit: usize) -> StoreConfig {
    StoreConfig {
        id_limit,
        ..StoreConfig::default()
    }
    .with_data_dir(dir.path())
}

fn file_count(dir: &tempfile::TempDir, namespace: &str) -> usize {
    fs::read_dir(dir.path().join(namespace)).unwrap().count()
}

#[tokio::test]
async fn test_order_then_pay_on_disk() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = TicketStore::open(config(&dir, 100)).await.unwrap();

    let draft = TicketDraft::new("a@b.com").item("Alice", 500);
    let record = store.create_ticket(draft).await.unwrap();
    assert_eq!(record.total_amount, 500);
    assert!(is_valid_id(record.id.as_str()));

    let loaded = store.load_pending(record.id.as_str()).await.unwrap();
    assert_eq!(loaded, record);
    assert!(!store.is_paid(&record.id).await.unwrap());

    store.promote_to_paid(&record).await.unwrap();
    assert!(store.is_paid(&record.id).await.unwrap());
    assert!(matches!(
        store.promote_to_paid(&record).await,
        Err(StoreError::AlreadyPaid(_))
    ));

    assert!(dir.path().join("pending").join(record.id.as_str()).is_file());
    assert!(dir.path().join("paid").join(record.id.as_str()).is_file());
    assert_eq!(file_count(&dir, "paid"), 1);
}

#[tokio::test]
async fn test_reopened_store_continues_where_it_left_off() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock(0));
    let mut ids = HashSet::new();

    for _ in 0..2 {
        let persister = FilesystemPersister::open(dir.path()).await.unwrap();
        let store = TicketStore::with_clock(persister, config(&dir, 10), clock.clone()).unwrap();
        for _ in 0..3 {
            let record = store
                .create_ticket(TicketDraft::new("a@b.com").item("Guest", 10))
                .await
                .unwrap();
            assert!(ids.insert(record.id));
        }
    }
    assert_eq!(ids.len(), 6);
    assert_eq!(file_count(&dir, "pending"), 6);
}

#[tokio::test]
async fn test_capacity_and_collisions_leave_disk_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let persister = FilesystemPersister::open(dir.path()).await.unwrap();
    let store =
        TicketStore::with_clock(persister, config(&dir, 2), Arc::new(FixedClock(0))).unwrap();

    store
        .create_ticket(TicketDraft::new("a@b.com").item("A", 10))
        .await
        .unwrap();
    // Squat on the id the frozen clock produces for the second ticket.
    let squatted = fs::read(dir.path().join("pending").join("IG1800ZZ")).unwrap();
    fs::remove_file(dir.path().join("pending").join("IG1800ZZ")).unwrap();
    fs::write(
        dir.path().join("pending").join("IG1800ZY"),
        String::from_utf8(squatted).unwrap().replace("IG1800ZZ", "IG1800ZY"),
    )
    .unwrap();

    let result = store
        .create_ticket(TicketDraft::new("a@b.com").item("B", 10))
        .await;
    assert!(
        matches!(result, Err(StoreError::AllocationCollision { .. })),
        "{result:?}"
    );
    assert_eq!(file_count(&dir, "pending"), 1);

    fs::write(dir.path().join("pending").join("IG18AAAA"), b"{}").unwrap();
    let result = store
        .create_ticket(TicketDraft::new("a@b.com").item("C", 10))
        .await;
    assert!(
        matches!(result, Err(StoreError::CapacityExceeded { limit: 2 })),
        "{result:?}"
    );
    assert_eq!(file_count(&dir, "pending"), 2);
}

#[tokio::test]
async fn test_corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = TicketStore::open(config(&dir, 10)).await.unwrap();
    let record = store
        .create_ticket(TicketDraft::new("a@b.com").item("Alice", 50))
        .await
        .unwrap();
    let path = dir.path().join("pending").join(record.id.as_str());
    let text = fs::read_to_string(&path).unwrap();
    fs::write(&path, &text[..text.len() / 2]).unwrap();

    let result = store.load_pending(record.id.as_str()).await;
    assert!(
        matches!(result, Err(StoreError::CorruptRecord { .. })),
        "{result:?}"
    );
    assert!(!result.unwrap_err().is_client_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_and_payments() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = TicketStore::open(config(&dir, 1000)).await.unwrap();

    let orders: Vec<_> = (0..60)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create_ticket(TicketDraft::new(format!("{n}@b.com")).item("Guest", 25))
                    .await
            })
        })
        .collect();
    let mut records = Vec::new();
    for order in orders {
        records.push(order.await.unwrap().unwrap());
    }
    let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), 60);

    let checkout = Arc::new(Checkout::new(store.clone(), MockGateway::approving()));
    let payments: Vec<_> = records
        .iter()
        .flat_map(|r| [r.id.to_string(), r.id.to_string()])
        .map(|id| {
            let checkout = checkout.clone();
            tokio::spawn(async move { checkout.pay(&id, "tok").await })
        })
        .collect();
    let mut paid = 0;
    for payment in payments {
        match payment.await.unwrap() {
            Ok(_) => paid += 1,
            Err(CheckoutError::InProgress(_))
            | Err(CheckoutError::Store(StoreError::AlreadyPaid(_))) => {}
            Err(e) => panic!("unexpected {e}"),
        }
    }
    assert_eq!(paid, 60);
    assert_eq!(file_count(&dir, "paid"), 60);

    let stats = store.stats().await.unwrap();
    assert_eq!((stats.issued, stats.paid, stats.remaining), (60, 60, 940));
    for record in &records {
        assert_eq!(
            store.state_of(&record.id).await.unwrap(),
            TicketState::Paid
        );
    }
}
