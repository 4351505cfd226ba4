use pulsepay::domain::event::{EventKind, FailureReason};
use pulsepay::domain::payment::{NewPayment, PaymentStatus};
use pulsepay::domain::ports::{EventStoreBox, PaymentFilter};
use pulsepay::infrastructure::in_memory::InMemoryEventStore;

#[tokio::test]
async fn test_store_as_trait_object() {
    let store: EventStoreBox = std::sync::Arc::new(InMemoryEventStore::new());

    // Verify Send + Sync by spawning tasks
    let handles: Vec<_> = (0..8u64)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let payment = store
                    .create_payment(NewPayment::new(100 * (i + 1), "USD", "merch_01"))
                    .await
                    .unwrap();
                store.append_event(payment.id, EventKind::Created).await.unwrap();
                let last = if i % 2 == 0 {
                    EventKind::Authorized
                } else {
                    EventKind::failed(FailureReason::InvalidMerchant)
                };
                store.append_event(payment.id, last).await.unwrap();
                payment.id
            })
        })
        .collect();

    for handle in handles {
        let id = handle.await.unwrap();
        assert_eq!(store.events_for_payment(id).await.unwrap().len(), 2);
    }

    let failed = store
        .find_payments(&PaymentFilter {
            status: Some(PaymentStatus::Failed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 4);
}
