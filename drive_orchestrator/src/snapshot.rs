//! Lock-free snapshot publishing.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use drive_common::{HealthSnapshot, TxFrame};

/// An immutable point-in-time view of the whole drive network.
///
/// Replaced wholesale each tick; a reader always observes either the old
/// or the new value, never a torn one.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub timestamp: SystemTime,
    pub health: HealthSnapshot,
    pub drive_states: Arc<[TxFrame]>,
    pub cycle_time: Duration,
    pub min_cycle: Duration,
    pub max_cycle: Duration,
}

impl StatusSnapshot {
    pub fn empty() -> Self {
        Self {
            timestamp: SystemTime::UNIX_EPOCH,
            health: HealthSnapshot::default(),
            drive_states: Arc::from(Vec::new().into_boxed_slice()),
            cycle_time: Duration::ZERO,
            min_cycle: Duration::ZERO,
            max_cycle: Duration::ZERO,
        }
    }
}

/// A swappable slot the loop writes to every tick and any thread reads
/// from without taking a lock.
pub struct SnapshotPublisher {
    slot: Arc<ArcSwap<StatusSnapshot>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(ArcSwap::from_pointee(StatusSnapshot::empty())),
        }
    }

    /// Construct a reader handle that shares the same underlying slot.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            slot: self.slot.clone(),
        }
    }

    /// Atomically replace the published snapshot (loop-side only).
    pub fn publish(&self, snapshot: StatusSnapshot) {
        self.slot.store(Arc::new(snapshot));
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// A cheaply cloneable read handle into the snapshot slot. Never blocks.
#[derive(Clone)]
pub struct SnapshotReader {
    slot: Arc<ArcSwap<StatusSnapshot>>,
}

impl SnapshotReader {
    pub fn load(&self) -> Arc<StatusSnapshot> {
        self.slot.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_observes_published_value() {
        let publisher = SnapshotPublisher::new();
        let reader = publisher.reader();
        assert_eq!(reader.load().drive_states.len(), 0);

        let mut snapshot = StatusSnapshot::empty();
        snapshot.drive_states = Arc::from(vec![TxFrame::default(); 3].into_boxed_slice());
        publisher.publish(snapshot);

        assert_eq!(reader.load().drive_states.len(), 3);
    }

    #[test]
    fn multiple_readers_share_the_same_slot() {
        let publisher = SnapshotPublisher::new();
        let a = publisher.reader();
        let b = publisher.reader();
        let mut snapshot = StatusSnapshot::empty();
        snapshot.cycle_time = Duration::from_millis(2);
        publisher.publish(snapshot);
        assert_eq!(a.load().cycle_time, b.load().cycle_time);
    }
}
