//! Live subscriptions against the local chain

use std::time::Duration;

use futures::StreamExt;
use transfer_registry::{
    BlockRange, Bytes32, ContractKind, EventFilter, EventKind, EventSource, EvmAddress,
    LocalChain, LoggedEvent, PaymentManagerBackend, RemoteBridgeBackend,
};

fn owner() -> EvmAddress {
    EvmAddress::repeat_byte(0x01)
}

fn signer() -> EvmAddress {
    EvmAddress::repeat_byte(0xAA)
}

async fn next(sub: &mut transfer_registry::EventSubscription) -> LoggedEvent {
    tokio::time::timeout(Duration::from_secs(2), sub.next_event())
        .await
        .expect("timed out waiting for notification")
        .expect("subscription closed")
}

#[tokio::test]
async fn test_live_matches_history() {
    let chain = LocalChain::new(owner());
    let manager = chain.payment_manager(owner());
    let mut sub = manager.subscribe(EventFilter::new()).await.unwrap();

    for i in 1..=3u8 {
        manager
            .submit_pending(signer(), i as u64, Bytes32::repeat_byte(i), Bytes32::repeat_byte(0xF0 | i))
            .await
            .unwrap();
    }
    manager
        .submit_failed(Bytes32::repeat_byte(2), Bytes32::repeat_byte(0xF2))
        .await
        .unwrap();

    let mut live = Vec::new();
    for _ in 0..4 {
        live.push(next(&mut sub).await);
    }

    let history = manager
        .get_logs(&EventFilter::new(), BlockRange::new(1, chain.head().await))
        .await
        .unwrap();
    assert_eq!(live, history);

    sub.unsubscribe().await;
}

#[tokio::test]
async fn test_subscription_scoped_to_contract() {
    let chain = LocalChain::new(owner());
    let manager = chain.payment_manager(owner());
    let bridge = chain.remote_bridge(owner());

    let mut bridge_sub = bridge.subscribe(EventFilter::new()).await.unwrap();

    manager
        .submit_pending(signer(), 1, Bytes32::repeat_byte(1), Bytes32::repeat_byte(2))
        .await
        .unwrap();
    bridge
        .register(Bytes32::repeat_byte(1), Bytes32::repeat_byte(1), signer(), 1)
        .await
        .unwrap();

    let event = next(&mut bridge_sub).await;
    assert_eq!(event.contract, ContractKind::RemoteBridge);
    assert_eq!(event.kind(), EventKind::TransferRegistered);

    // Asking a bridge handle for PaymentManager events yields nothing
    let mut mismatched = bridge
        .subscribe(EventFilter::new().contract(ContractKind::PaymentManager))
        .await
        .unwrap();
    assert!(mismatched.next().await.is_none());
}

#[tokio::test]
async fn test_filtered_stream() {
    let chain = LocalChain::new(owner());
    let manager = chain.payment_manager(owner());
    let watched = Bytes32::repeat_byte(0x07);

    let sub = manager
        .subscribe(EventFilter::for_kind(EventKind::TxSuccess).topic(1, vec![watched]))
        .await
        .unwrap();

    for hash in [Bytes32::repeat_byte(0x06), watched] {
        manager
            .submit_pending(signer(), 1, hash, Bytes32::repeat_byte(0x99))
            .await
            .unwrap();
        manager
            .submit_success(hash, Bytes32::repeat_byte(0x99))
            .await
            .unwrap();
    }

    let events: Vec<LoggedEvent> = tokio::time::timeout(
        Duration::from_secs(2),
        sub.take(1).collect::<Vec<_>>(),
    )
    .await
    .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].notification.transfer_hash(), Some(watched));
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let chain = LocalChain::new(owner());
    let manager = chain.payment_manager(owner());

    let sub = manager.subscribe(EventFilter::new()).await.unwrap();
    assert!(!sub.is_cancelled());
    sub.unsubscribe().await;

    // Emitting after unsubscribe must not block or fail
    manager
        .submit_pending(signer(), 1, Bytes32::repeat_byte(1), Bytes32::repeat_byte(2))
        .await
        .unwrap();
    assert_eq!(chain.head().await, 1);
}
