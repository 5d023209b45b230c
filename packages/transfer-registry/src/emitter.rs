//! Append-only notification log with a live feed
//!
//! Entries are appended in block order, so range queries binary-search the
//! start and stream forward. Live subscribers get the same `LoggedEvent`
//! values the history returns.

use tokio::sync::broadcast;
use tracing::trace;

use crate::events::{ContractKind, EventFilter, LoggedEvent, Notification};
use crate::types::{BlockRange, Bytes32};

/// Capacity of the live broadcast channel
pub const LIVE_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct EventLog {
    entries: Vec<LoggedEvent>,
    live: broadcast::Sender<LoggedEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(LIVE_CAPACITY)
    }

    pub fn with_capacity(live_capacity: usize) -> Self {
        let (live, _) = broadcast::channel(live_capacity.max(1));
        Self {
            entries: Vec::new(),
            live,
        }
    }

    /// Append a notification and publish it to live subscribers.
    ///
    /// `block_number` must not be lower than the last appended entry.
    pub fn emit(
        &mut self,
        contract: ContractKind,
        notification: Notification,
        block_number: u64,
        tx_hash: Bytes32,
    ) -> LoggedEvent {
        debug_assert!(self
            .entries
            .last()
            .map(|last| last.block_number <= block_number)
            .unwrap_or(true));

        let log_index = self
            .entries
            .iter()
            .rev()
            .take_while(|e| e.block_number == block_number)
            .count() as u64;

        let event = LoggedEvent {
            contract,
            notification,
            block_number,
            log_index,
            tx_hash,
        };
        self.entries.push(event.clone());

        // No receivers is fine
        let receivers = self.live.send(event.clone()).unwrap_or(0);
        trace!(
            kind = %event.kind(),
            block = block_number,
            receivers = receivers,
            "Notification emitted"
        );

        event
    }

    /// Lazily iterate matching entries inside `range`
    pub fn query<'a>(
        &'a self,
        filter: &'a EventFilter,
        range: BlockRange,
    ) -> impl Iterator<Item = &'a LoggedEvent> + 'a {
        let start = self
            .entries
            .partition_point(|e| e.block_number < range.from);
        self.entries[start..]
            .iter()
            .take_while(move |e| e.block_number <= range.to)
            .filter(move |e| filter.matches(e))
    }

    /// Raw live feed; filtering is left to the caller
    pub fn subscribe_raw(&self) -> broadcast::Receiver<LoggedEvent> {
        self.live.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::types::EvmAddress;

    fn retry(byte: u8) -> Notification {
        Notification::Retry {
            tx_hash: Bytes32::repeat_byte(byte),
        }
    }

    fn populated() -> EventLog {
        let mut log = EventLog::new();
        log.emit(
            ContractKind::PaymentManager,
            Notification::OwnershipTransferred {
                previous_owner: EvmAddress::ZERO,
                new_owner: EvmAddress::repeat_byte(1),
            },
            0,
            Bytes32::repeat_byte(0xF0),
        );
        for block in 1..=5u8 {
            log.emit(
                ContractKind::PaymentManager,
                retry(block),
                block as u64,
                Bytes32::repeat_byte(block),
            );
        }
        log
    }

    #[test]
    fn test_log_index_per_block() {
        let mut log = EventLog::new();
        let a = log.emit(ContractKind::PaymentManager, retry(1), 3, Bytes32::repeat_byte(1));
        let b = log.emit(ContractKind::RemoteBridge, retry(2), 3, Bytes32::repeat_byte(2));
        let c = log.emit(ContractKind::PaymentManager, retry(3), 4, Bytes32::repeat_byte(3));
        assert_eq!((a.log_index, b.log_index, c.log_index), (0, 1, 0));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_query_range_inclusive() {
        let log = populated();
        let filter = EventFilter::for_kind(EventKind::Retry);
        let blocks: Vec<u64> = log
            .query(&filter, BlockRange::new(2, 4))
            .map(|e| e.block_number)
            .collect();
        assert_eq!(blocks, vec![2, 3, 4]);
    }

    #[test]
    fn test_query_filters_kind() {
        let log = populated();
        let filter = EventFilter::for_kind(EventKind::OwnershipTransferred);
        assert_eq!(log.query(&filter, BlockRange::new(0, 100)).count(), 1);
        assert_eq!(log.query(&filter, BlockRange::new(1, 100)).count(), 0);
    }

    #[test]
    fn test_query_empty_range() {
        let log = populated();
        let filter = EventFilter::new();
        assert_eq!(log.query(&filter, BlockRange::new(4, 2)).count(), 0);
        assert_eq!(log.query(&filter, BlockRange::new(50, 60)).count(), 0);
    }

    #[tokio::test]
    async fn test_live_feed_matches_history() {
        let mut log = EventLog::new();
        let mut rx = log.subscribe_raw();
        let emitted = log.emit(ContractKind::PaymentManager, retry(7), 1, Bytes32::repeat_byte(7));

        let live = rx.recv().await.unwrap();
        assert_eq!(live, emitted);

        let filter = EventFilter::new();
        let history: Vec<_> = log.query(&filter, BlockRange::new(0, 10)).collect();
        assert_eq!(history, vec![&live]);
    }
}
