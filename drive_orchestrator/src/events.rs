//! The two fire-and-forget event streams: `StatusChanged`
//! and `Faulted`. Both are `tokio::sync::broadcast` channels, which give
//! the drop-oldest/lagged-receiver back-pressure semantics a slow
//! subscriber needs, without any bespoke bounded-queue plumbing.

use std::time::{Duration, Instant, SystemTime};

use drive_common::{DriveErrorCode, HealthSnapshot, TxFrame};
use tokio::sync::broadcast;

/// Default channel capacity for both event streams. Slow subscribers
/// that fall behind this many events start missing the oldest ones
/// (`broadcast::error::RecvError::Lagged`) rather than stalling the loop.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct DriveStatusChangeEvent {
    pub slave: u16,
    pub timestamp: SystemTime,
    pub monotonic_ticks: u64,
    pub sequence: u64,
    pub current: TxFrame,
    pub previous: TxFrame,
    pub changed_bits_mask: u32,
    pub active_command_keyword: String,
}

#[derive(Debug, Clone)]
pub struct FaultedEvent {
    pub slave: u16,
    pub status_bits: u32,
    pub code: DriveErrorCode,
    pub message: String,
    pub health: HealthSnapshot,
}

/// Owns the send side of both streams; cloned senders are cheap and are
/// what the loop holds to publish from its worker thread.
#[derive(Clone)]
pub struct EventBus {
    status_changed: broadcast::Sender<DriveStatusChangeEvent>,
    faulted: broadcast::Sender<FaultedEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (status_changed, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (faulted, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            status_changed,
            faulted,
        }
    }

    pub fn subscribe_status_changed(&self) -> broadcast::Receiver<DriveStatusChangeEvent> {
        self.status_changed.subscribe()
    }

    pub fn subscribe_faulted(&self) -> broadcast::Receiver<FaultedEvent> {
        self.faulted.subscribe()
    }

    /// Publish a `StatusChanged` event. Fire-and-forget: an error here
    /// just means there are currently no subscribers, which is not a
    /// loop-level problem.
    pub fn emit_status_changed(&self, event: DriveStatusChangeEvent) {
        let _ = self.status_changed.send(event);
    }

    pub fn emit_faulted(&self, event: FaultedEvent) {
        let _ = self.faulted.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-slave fault de-duplication state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultThrottle {
    last: Option<(DriveErrorCode, Instant)>,
}

impl FaultThrottle {
    /// Decide whether `code` should be emitted now, updating internal
    /// state. `None` resets the suppression window so a future
    /// reappearance of any code emits immediately.
    pub fn should_emit(&mut self, code: Option<DriveErrorCode>, now: Instant, interval: Duration) -> bool {
        match code {
            None => {
                self.last = None;
                false
            }
            Some(code) => match self.last {
                Some((last_code, last_time)) if last_code == code && now - last_time < interval => {
                    false
                }
                _ => {
                    self.last = Some((code, now));
                    true
                }
            },
        }
    }
}
