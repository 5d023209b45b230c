//! Relay behaviour against the in-process chain
//!
//! Run with: cargo test -p registry-relayer --test relay_test

use std::time::Duration;

use registry_relayer::{RelaySettings, TransferRelay};
use transfer_registry::{
    BlockRange, Bytes32, EventFilter, EventKind, EventSource, EvmAddress, LocalChain,
    LocalPaymentManager, LocalRemoteBridge, Notification, PaymentManagerBackend, RetryConfig,
    RemoteBridgeBackend,
};

type LocalRelay = TransferRelay<LocalPaymentManager, LocalRemoteBridge>;

fn owner() -> EvmAddress {
    EvmAddress::repeat_byte(0x01)
}

fn signer() -> EvmAddress {
    EvmAddress::repeat_byte(0xAA)
}

fn settings() -> RelaySettings {
    RelaySettings {
        poll_interval: Duration::from_millis(10),
        confirmations: 0,
        retry: RetryConfig::new(0, Duration::from_millis(1)),
        ..RelaySettings::default()
    }
}

fn setup(settings: RelaySettings) -> (LocalChain, LocalPaymentManager, LocalRemoteBridge, LocalRelay) {
    let chain = LocalChain::new(owner());
    let manager = chain.payment_manager(owner());
    let bridge = chain.remote_bridge(owner());
    let relay = TransferRelay::new(manager.clone(), bridge.clone(), settings);
    (chain, manager, bridge, relay)
}

#[tokio::test]
async fn test_pending_then_success_is_mirrored() {
    let (_chain, manager, bridge, mut relay) = setup(settings());
    let local = Bytes32::repeat_byte(0x11);
    let foreign = Bytes32::repeat_byte(0x22);

    manager.submit_pending(signer(), 9, local, foreign).await.unwrap();
    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.registered, 1);

    let record = bridge.transfers(local).await.unwrap();
    assert!(record.exist);
    assert_eq!(record.hash, local);
    assert_eq!(record.signer, signer());
    assert_eq!(record.nonce, 9);
    assert_eq!(bridge.get_last_block().await.unwrap(), report.range.to);

    manager.submit_success(local, foreign).await.unwrap();
    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.registered, 0);
    assert_eq!(bridge.transfers(local).await.unwrap().hash, foreign);
}

#[tokio::test]
async fn test_resumes_from_checkpoint() {
    let (_chain, manager, bridge, mut relay) = setup(settings());

    manager
        .submit_pending(signer(), 1, Bytes32::repeat_byte(0x01), Bytes32::repeat_byte(0xF1))
        .await
        .unwrap();
    let first = relay.poll_once().await.unwrap().unwrap();

    manager
        .submit_pending(signer(), 2, Bytes32::repeat_byte(0x02), Bytes32::repeat_byte(0xF2))
        .await
        .unwrap();
    let second = relay.poll_once().await.unwrap().unwrap();

    assert_eq!(second.range.from, first.range.to + 1);
    assert_eq!(second.registered, 1);
    assert_eq!(second.skipped, 0);

    let registered = bridge
        .get_logs(
            &EventFilter::for_kind(EventKind::TransferRegistered),
            BlockRange::new(0, 1_000),
        )
        .await
        .unwrap();
    assert_eq!(registered.len(), 2);
}

#[tokio::test]
async fn test_replay_skips_already_mirrored() {
    let (_chain, manager, bridge, mut relay) = setup(settings());
    let local = Bytes32::repeat_byte(0x33);

    manager
        .submit_pending(signer(), 4, local, Bytes32::repeat_byte(0x44))
        .await
        .unwrap();
    relay.poll_once().await.unwrap().unwrap();

    // Rewind the checkpoint so the same history is scanned again
    bridge.set_last_block(0).await.unwrap();
    let replay = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(replay.range.from, 0);
    assert_eq!(replay.registered, 0);
    assert_eq!(replay.skipped, 1);
    assert_eq!(bridge.transfers(local).await.unwrap().nonce, 4);
}

#[tokio::test]
async fn test_success_without_registration_is_skipped() {
    let (chain, manager, bridge, _) = setup(settings());
    let local = Bytes32::repeat_byte(0x55);

    manager
        .submit_pending(signer(), 1, local, Bytes32::repeat_byte(0x66))
        .await
        .unwrap();
    let pending_block = chain.head().await;
    manager
        .submit_success(local, Bytes32::repeat_byte(0x66))
        .await
        .unwrap();

    // Start after the pending notification
    let mut relay = TransferRelay::new(
        manager.clone(),
        bridge.clone(),
        RelaySettings {
            start_block: pending_block + 1,
            ..settings()
        },
    );
    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.updated, 0);
    assert_eq!(report.skipped, 1);
    assert!(!bridge.transfers(local).await.unwrap().exist);
}

#[tokio::test]
async fn test_confirmations_hold_back_recent_blocks() {
    let (chain, manager, bridge, mut relay) = setup(RelaySettings {
        confirmations: 3,
        start_block: 1,
        ..settings()
    });

    manager
        .submit_pending(signer(), 1, Bytes32::repeat_byte(0x77), Bytes32::repeat_byte(0x88))
        .await
        .unwrap();
    assert_eq!(relay.poll_once().await.unwrap(), None);
    assert!(!bridge.transfers(Bytes32::repeat_byte(0x77)).await.unwrap().exist);

    chain.advance(3).await;
    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.range, BlockRange::new(1, 1));
    assert_eq!(report.registered, 1);
}

#[tokio::test]
async fn test_chunks_checkpoint_each_range() {
    let (chain, manager, bridge, mut relay) = setup(RelaySettings {
        max_block_range: 2,
        start_block: 1,
        ..settings()
    });
    for i in 1..=5u8 {
        manager
            .submit_pending(signer(), i as u64, Bytes32::repeat_byte(i), Bytes32::repeat_byte(0xF0))
            .await
            .unwrap();
    }
    let head = chain.head().await;

    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.registered, 5);
    assert_eq!(bridge.get_last_block().await.unwrap(), head);

    let checkpoints = bridge
        .get_logs(&EventFilter::new(), BlockRange::new(head + 1, chain.head().await))
        .await
        .unwrap();
    // Checkpoints emit nothing; only the five registrations are logged
    assert!(checkpoints
        .iter()
        .all(|e| matches!(e.notification, Notification::TransferRegistered { .. })));
    assert_eq!(checkpoints.len(), 5);
}

#[tokio::test]
async fn test_idle_chain_sends_no_checkpoints() {
    let (chain, _manager, bridge, mut relay) = setup(RelaySettings {
        confirmations: 1,
        start_block: 1,
        ..settings()
    });
    chain.advance(3).await;

    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.range, BlockRange::new(1, 2));
    assert_eq!(report.checkpoint, None);

    for _ in 0..10 {
        assert_eq!(relay.poll_once().await.unwrap(), None);
    }
    assert_eq!(chain.head().await, 3);
    assert_eq!(relay.next_block(), Some(3));
    assert_eq!(bridge.get_last_block().await.unwrap(), 0);
}

#[tokio::test]
async fn test_genesis_block_scanned_once() {
    let (chain, _manager, _bridge, mut relay) = setup(settings());

    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.range, BlockRange::new(0, 0));
    assert_eq!(relay.poll_once().await.unwrap(), None);

    chain.advance(1).await;
    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.range, BlockRange::new(1, 1));
    assert_eq!(chain.head().await, 1);
}

#[tokio::test]
async fn test_checkpoint_after_interval_without_transfers() {
    let (chain, _manager, bridge, mut relay) = setup(RelaySettings {
        start_block: 1,
        checkpoint_interval: 5,
        ..settings()
    });
    chain.advance(6).await;

    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.checkpoint, Some(6));
    assert_eq!(bridge.get_last_block().await.unwrap(), 6);

    // The checkpoint's own block is scanned without another write
    let head = chain.head().await;
    let report = relay.poll_once().await.unwrap().unwrap();
    assert_eq!(report.range, BlockRange::new(7, head));
    assert_eq!(report.checkpoint, None);
    assert_eq!(relay.poll_once().await.unwrap(), None);
    assert_eq!(chain.head().await, head);
}

#[tokio::test]
async fn test_flush_writes_scan_position_once() {
    let (chain, _manager, bridge, mut relay) = setup(RelaySettings {
        start_block: 1,
        ..settings()
    });
    assert_eq!(relay.flush_checkpoint().await.unwrap(), None);

    chain.advance(4).await;
    relay.poll_once().await.unwrap().unwrap();
    assert_eq!(bridge.get_last_block().await.unwrap(), 0);

    assert_eq!(relay.flush_checkpoint().await.unwrap(), Some(4));
    assert_eq!(bridge.get_last_block().await.unwrap(), 4);

    let head = chain.head().await;
    assert_eq!(relay.flush_checkpoint().await.unwrap(), None);
    assert_eq!(chain.head().await, head);
}

#[tokio::test]
async fn test_unauthorized_bridge_aborts_poll() {
    let chain = LocalChain::new(owner());
    let manager = chain.payment_manager(owner());
    let stranger = chain.remote_bridge(EvmAddress::repeat_byte(0x99));
    let mut relay = TransferRelay::new(manager.clone(), stranger.clone(), settings());

    assert!(relay.preflight().await.is_err());

    manager
        .submit_pending(signer(), 1, Bytes32::repeat_byte(0x01), Bytes32::repeat_byte(0x02))
        .await
        .unwrap();
    assert!(relay.poll_once().await.is_err());
    assert_eq!(stranger.get_last_block().await.unwrap(), 0);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let (_chain, manager, bridge, mut relay) = setup(settings());
    relay.preflight().await.unwrap();

    manager
        .submit_pending(signer(), 1, Bytes32::repeat_byte(0x0C), Bytes32::repeat_byte(0x0D))
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    let handle = tokio::spawn(async move { relay.run(shutdown_rx).await });

    let mut mirrored = false;
    for _ in 0..100 {
        if bridge.transfers(Bytes32::repeat_byte(0x0C)).await.unwrap().exist {
            mirrored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(mirrored);

    shutdown_tx.send(()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(bridge.get_last_block().await.unwrap() >= 1);
}
