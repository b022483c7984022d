//! `PendingCommand`: the value object carried from a caller, through the
//! ingest channel, to become an axis's active command.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::OrchestratorError;

/// The condition that resolves a [`PendingCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCriterion {
    AckOnly,
    AckWithTimeout,
    PositionReached,
    Indexed,
    Enabled,
    Disabled,
    Halt,
}

/// A caller's in-flight request, queued to the I/O loop and mutated only
/// by it from then on.
pub struct PendingCommand {
    pub axis: u16,
    pub keyword: String,
    pub parameter: i32,
    pub velocity: i32,
    pub acceleration: u16,
    pub deceleration: u16,
    pub requires_ack: bool,
    pub criterion: CompletionCriterion,
    pub timeout: Option<Duration>,

    pub acked: bool,
    pub start: Option<Instant>,
    pub prev_position_reached: Option<bool>,
    pub prev_motor_on: Option<bool>,

    cancelled: Arc<AtomicBool>,
    completion: Option<oneshot::Sender<Result<(), OrchestratorError>>>,
}

impl PendingCommand {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        axis: u16,
        keyword: impl Into<String>,
        parameter: i32,
        velocity: i32,
        acceleration: u16,
        deceleration: u16,
        requires_ack: bool,
        criterion: CompletionCriterion,
        timeout: Option<Duration>,
    ) -> (Self, CommandAwait) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();
        let command = Self {
            axis,
            keyword: keyword.into(),
            parameter,
            velocity,
            acceleration,
            deceleration,
            requires_ack,
            criterion,
            timeout,
            acked: false,
            start: None,
            prev_position_reached: None,
            prev_motor_on: None,
            cancelled: cancelled.clone(),
            completion: Some(tx),
        };
        let awaiting = CommandAwait {
            rx,
            cancelled,
            resolved: false,
        };
        (command, awaiting)
    }

    /// True once the caller's future has been dropped before resolution.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Reset ack/timer/edge-detection scratch when the command becomes
    /// the axis's active command.
    pub fn start(&mut self, now: Instant) {
        self.acked = false;
        self.start = Some(now);
        self.prev_position_reached = None;
        self.prev_motor_on = None;
    }

    /// Resolve the caller's promise. A no-op if already resolved or if
    /// the caller already dropped the receiving future.
    pub fn resolve(&mut self, result: Result<(), OrchestratorError>) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(result);
        }
    }
}

/// The future a caller awaits for a dispatched command to resolve.
///
/// Dropping this future before it resolves (e.g. because the enclosing
/// task was aborted, or a `tokio::select!` branch lost) marks the
/// underlying command cancelled; the loop observes this at the next
/// phase and removes it from the axis without attempting to reach the
/// drive further.
pub struct CommandAwait {
    rx: oneshot::Receiver<Result<(), OrchestratorError>>,
    cancelled: Arc<AtomicBool>,
    resolved: bool,
}

impl Future for CommandAwait {
    type Output = Result<(), OrchestratorError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => {
                self.resolved = true;
                Poll::Ready(result)
            }
            Poll::Ready(Err(_)) => {
                self.resolved = true;
                Poll::Ready(Err(OrchestratorError::SessionEnded))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for CommandAwait {
    fn drop(&mut self) {
        if !self.resolved {
            self.cancelled.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_result_to_awaiter() {
        let (mut command, awaiting) =
            PendingCommand::new(1, "ENBL", 1, 0, 0, 0, true, CompletionCriterion::Enabled, None);
        command.resolve(Ok(()));
        assert!(awaiting.await.is_ok());
    }

    #[tokio::test]
    async fn dropping_the_awaiter_marks_the_command_cancelled() {
        let (command, awaiting) =
            PendingCommand::new(1, "DPOS", 0, 0, 0, 0, true, CompletionCriterion::PositionReached, None);
        drop(awaiting);
        assert!(command.is_cancelled());
    }

    #[tokio::test]
    async fn resolving_twice_does_not_panic() {
        let (mut command, awaiting) =
            PendingCommand::new(1, "HALT", 0, 0, 0, 0, true, CompletionCriterion::Halt, None);
        command.resolve(Ok(()));
        command.resolve(Err(OrchestratorError::Cancelled));
        assert!(awaiting.await.is_ok());
    }

    #[test]
    fn start_resets_scratch() {
        let (mut command, _awaiting) =
            PendingCommand::new(1, "DPOS", 0, 0, 0, 0, true, CompletionCriterion::PositionReached, None);
        command.acked = true;
        command.prev_position_reached = Some(true);
        command.start(Instant::now());
        assert!(!command.acked);
        assert_eq!(command.prev_position_reached, None);
        assert_eq!(command.prev_motor_on, None);
        assert!(command.start.is_some());
    }
}
