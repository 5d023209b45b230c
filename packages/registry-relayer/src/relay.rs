//! PaymentManager to RemoteBridge relay
//!
//! Each poll reads the bridge checkpoint, scans PaymentManager history up to
//! `head - confirmations` and mirrors it:
//!
//! - `PendingTransfer(signer, nonce, txHash)` becomes
//!   `register(txHash, txHash, signer, nonce)`
//! - `TxSuccess(local, foreign)` becomes `update(local, foreign)`
//!
//! The scan position is kept in memory. The bridge checkpoint is a paid
//! transaction, so it is only written after a chunk that carried transfers,
//! once the position runs `checkpoint_interval` blocks ahead of it, and on
//! shutdown. An on-chain checkpoint that differs from the last one this
//! relay saw (a rewind by the owner, another relayer) takes precedence.
//! Replaying a chunk is harmless: a second `register` is rejected with
//! `AlreadyExists` and skipped, and an `update` for a transfer the bridge
//! never saw is rejected with `RecordNotFound` and skipped.

use std::time::Duration;

use eyre::{eyre, Result, WrapErr};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use transfer_registry::{
    with_retry, BackendError, BackendResult, BlockRange, EventFilter, EventKind, LoggedEvent,
    Notification, PaymentManagerBackend, PendingTx, RegistryError, RemoteBridgeBackend,
    RetryConfig, TxReceipt,
};

use crate::config::Config;
use crate::metrics;

/// Tunables for [`TransferRelay`]
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub poll_interval: Duration,
    pub max_block_range: u64,
    pub confirmations: u64,
    /// First block scanned while the bridge checkpoint is still zero
    pub start_block: u64,
    pub retry: RetryConfig,
    /// Upper bound on waiting for a submitted transaction's receipt
    pub confirm_timeout: Duration,
    /// Blocks the scan position may run ahead of the bridge checkpoint on a
    /// chain without transfers
    pub checkpoint_interval: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_block_range: 10_000,
            confirmations: 1,
            start_block: 0,
            retry: RetryConfig::default(),
            confirm_timeout: Duration::from_secs(120),
            checkpoint_interval: 10_000,
        }
    }
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_block_range: config.max_block_range,
            checkpoint_interval: config.checkpoint_interval,
            confirmations: config.confirmations,
            start_block: config.start_block,
            retry: RetryConfig::new(
                config.retry_attempts,
                Duration::from_millis(config.retry_delay_ms),
            ),
            ..Self::default()
        }
    }
}

/// What a single mirrored notification turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    Registered,
    Updated,
    /// The bridge already reflects the notification, or cannot take it
    Skipped(&'static str),
}

/// Totals for one [`TransferRelay::poll_once`] pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub range: BlockRange,
    pub registered: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Block written to `setLastBlock` during this pass, if any
    pub checkpoint: Option<u64>,
}

impl PollReport {
    fn new(range: BlockRange) -> Self {
        Self {
            range,
            registered: 0,
            updated: 0,
            skipped: 0,
            checkpoint: None,
        }
    }

    fn record(&mut self, outcome: MirrorOutcome) {
        match outcome {
            MirrorOutcome::Registered => self.registered += 1,
            MirrorOutcome::Updated => self.updated += 1,
            MirrorOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Where the relay stands relative to the bridge checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Progress {
    /// Bridge checkpoint as last read or written by this relay
    checkpoint: u64,
    /// Next block to scan
    next: u64,
    /// `next` when the relay last resumed from the bridge
    origin: u64,
}

impl Progress {
    /// Resume from an on-chain checkpoint. Zero means the bridge has never
    /// been checkpointed.
    fn resume(checkpoint: u64, start_block: u64) -> Self {
        let next = if checkpoint == 0 {
            start_block
        } else {
            checkpoint + 1
        };
        Self {
            checkpoint,
            next,
            origin: next,
        }
    }

    /// Last scanned block not yet written to the bridge
    fn unflushed(&self) -> Option<u64> {
        if self.next == self.origin {
            return None;
        }
        self.next
            .checked_sub(1)
            .filter(|scanned| *scanned > self.checkpoint)
    }
}

pub struct TransferRelay<P, B> {
    payment_manager: P,
    remote_bridge: B,
    settings: RelaySettings,
    progress: Option<Progress>,
}

impl<P, B> TransferRelay<P, B>
where
    P: PaymentManagerBackend,
    B: RemoteBridgeBackend,
{
    pub fn new(payment_manager: P, remote_bridge: B, settings: RelaySettings) -> Self {
        Self {
            payment_manager,
            remote_bridge,
            settings,
            progress: None,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Next block the relay will scan, `None` before the first poll
    pub fn next_block(&self) -> Option<u64> {
        self.progress.map(|p| p.next)
    }

    /// Fail early when the configured key cannot write to the bridge
    pub async fn preflight(&self) -> Result<()> {
        let bridge_owner = self
            .remote_bridge
            .owner()
            .await
            .wrap_err("Failed to read RemoteBridge owner")?;
        if !self.remote_bridge.is_owner().await? {
            return Err(eyre!(
                "Relayer account is not the RemoteBridge owner ({})",
                bridge_owner
            ));
        }

        let payment_version = self.payment_manager.version().await?;
        let bridge_version = self.remote_bridge.version().await?;
        info!(
            payment_manager_version = %payment_version,
            remote_bridge_version = %bridge_version,
            owner = %bridge_owner,
            "Relay preflight passed"
        );
        Ok(())
    }

    /// Poll until a shutdown signal arrives
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            confirmations = self.settings.confirmations,
            "Transfer relay starting..."
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    if let Err(e) = self.flush_checkpoint().await {
                        warn!(error = %e, "Failed to write final checkpoint");
                    }
                    break;
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {
                    if let Err(e) = self.poll_once().await {
                        metrics::POLL_ERRORS.inc();
                        error!(error = %e, "Error relaying transfers");
                    }
                }
            }
        }

        Ok(())
    }

    /// Scan everything between the last scanned block and the confirmed
    /// head once. Returns `None` when there is nothing new.
    pub async fn poll_once(&mut self) -> Result<Option<PollReport>> {
        let retry = self.settings.retry.clone();

        let onchain = with_retry(&retry, "get_last_block", || {
            self.remote_bridge.get_last_block()
        })
        .await
        .wrap_err("Failed to read RemoteBridge checkpoint")?;

        let mut progress = match self.progress {
            Some(progress) if progress.checkpoint == onchain => progress,
            known => {
                if let Some(known) = known {
                    info!(
                        expected = known.checkpoint,
                        found = onchain,
                        "Bridge checkpoint moved, resuming from it"
                    );
                }
                Progress::resume(onchain, self.settings.start_block)
            }
        };
        self.progress = Some(progress);
        let from = progress.next;

        let head = with_retry(&retry, "block_number", || self.payment_manager.block_number())
            .await
            .wrap_err("Failed to read block number")?;
        let to = head.saturating_sub(self.settings.confirmations);

        if to < from {
            debug!(checkpoint = onchain, from_block = from, head, "No confirmed blocks to relay");
            metrics::POLLS_COMPLETED.inc();
            return Ok(None);
        }

        let range = BlockRange::new(from, to);
        let mut report = PollReport::new(range);
        debug!(from_block = from, to_block = to, "Relaying transfers");

        let filter = EventFilter::for_kind(EventKind::PendingTransfer).kind(EventKind::TxSuccess);
        for chunk in range.chunks(self.settings.max_block_range) {
            let events = with_retry(&retry, "get_logs", || {
                self.payment_manager.get_logs(&filter, chunk)
            })
            .await
            .wrap_err_with(|| {
                format!("Failed to fetch logs for blocks {}..={}", chunk.from, chunk.to)
            })?;

            for event in &events {
                let outcome = self.mirror(event).await.wrap_err_with(|| {
                    format!(
                        "Failed to mirror {} at block {}",
                        event.kind().name(),
                        event.block_number
                    )
                })?;
                report.record(outcome);
            }

            progress.next = chunk.to + 1;
            self.progress = Some(progress);
            metrics::BLOCKS_SCANNED.inc_by(chunk.to - chunk.from + 1);
            metrics::SCANNED_BLOCK.set(chunk.to as i64);

            let lag = chunk.to.saturating_sub(progress.checkpoint);
            if !events.is_empty() || lag >= self.settings.checkpoint_interval {
                self.write_checkpoint(chunk.to).await?;
                progress.checkpoint = chunk.to;
                report.checkpoint = Some(chunk.to);
            }
            debug!(
                from_block = chunk.from,
                to_block = chunk.to,
                events = events.len(),
                "Chunk scanned"
            );
        }
        metrics::POLLS_COMPLETED.inc();

        if report.registered + report.updated + report.skipped > 0 {
            info!(
                from_block = from,
                to_block = to,
                registered = report.registered,
                updated = report.updated,
                skipped = report.skipped,
                "Relayed transfers"
            );
        }
        Ok(Some(report))
    }

    /// Write the scan position to the bridge if it is ahead of the
    /// checkpoint. Returns the block written.
    pub async fn flush_checkpoint(&mut self) -> Result<Option<u64>> {
        match self.progress.and_then(|p| p.unflushed()) {
            Some(block) => {
                self.write_checkpoint(block).await?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    async fn write_checkpoint(&mut self, block: u64) -> Result<()> {
        self.submit("set_last_block", || self.remote_bridge.set_last_block(block))
            .await
            .wrap_err("Failed to checkpoint RemoteBridge")?;

        if let Some(progress) = self.progress.as_mut() {
            progress.checkpoint = block;
        }
        metrics::CHECKPOINT_BLOCK.set(block as i64);
        debug!(block, "Checkpoint written");
        Ok(())
    }

    /// Apply one PaymentManager notification to the bridge
    pub async fn mirror(&self, event: &LoggedEvent) -> BackendResult<MirrorOutcome> {
        let outcome = match event.notification {
            Notification::PendingTransfer {
                signer,
                nonce,
                tx_hash,
            } => {
                let sent = self
                    .submit("register", || {
                        self.remote_bridge.register(tx_hash, tx_hash, signer, nonce)
                    })
                    .await;
                match sent {
                    Ok(receipt) => {
                        info!(
                            tx_hash = %tx_hash,
                            signer = %signer,
                            nonce,
                            bridge_tx = %receipt.tx_hash,
                            "Registered transfer"
                        );
                        MirrorOutcome::Registered
                    }
                    Err(BackendError::Rejected(RegistryError::AlreadyExists { .. })) => {
                        debug!(tx_hash = %tx_hash, "Transfer already registered");
                        MirrorOutcome::Skipped("already_registered")
                    }
                    Err(e) => return Err(e),
                }
            }
            Notification::TxSuccess { local, foreign } => {
                let sent = self
                    .submit("update", || self.remote_bridge.update(local, foreign))
                    .await;
                match sent {
                    Ok(receipt) => {
                        info!(
                            local = %local,
                            remote = %foreign,
                            bridge_tx = %receipt.tx_hash,
                            "Updated transfer"
                        );
                        MirrorOutcome::Updated
                    }
                    Err(BackendError::Rejected(RegistryError::RecordNotFound { .. })) => {
                        warn!(local = %local, "Success for a transfer the bridge never registered");
                        MirrorOutcome::Skipped("not_registered")
                    }
                    Err(e) => return Err(e),
                }
            }
            ref other => {
                debug!(kind = other.kind().name(), "Ignoring notification");
                MirrorOutcome::Skipped("ignored")
            }
        };

        match outcome {
            MirrorOutcome::Registered => metrics::TRANSFERS_MIRRORED
                .with_label_values(&["register"])
                .inc(),
            MirrorOutcome::Updated => metrics::TRANSFERS_MIRRORED
                .with_label_values(&["update"])
                .inc(),
            MirrorOutcome::Skipped(reason) => {
                metrics::TRANSFERS_SKIPPED.with_label_values(&[reason]).inc()
            }
        }
        Ok(outcome)
    }

    /// Submit with transport retries, then wait for the receipt
    async fn submit<F, Fut>(&self, op_name: &str, send: F) -> BackendResult<TxReceipt>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = BackendResult<PendingTx>>,
    {
        let pending = with_retry(&self.settings.retry, op_name, send).await?;
        pending.confirm_within(self.settings.confirm_timeout).await
    }
}
