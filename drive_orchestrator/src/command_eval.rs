//! Pending-command evaluation: ack latch, AL-status gate,
//! completion criteria, and timeout — applied to one axis's active
//! command against the `TxFrame` just read this tick.
//!
//! Fault decoding is handled separately, in the I/O loop's per-slave
//! phase: a decoded drive fault raises a throttled event but never
//! fails the command by itself. This module only decides
//! completion/failure from the ack/AL-status/criterion/timeout rules.

use std::time::Instant;

use drive_common::{wire::keyword, DriveErrorCode, StatusFlags, TxFrame};

use crate::command::{CompletionCriterion, PendingCommand};
use crate::error::OrchestratorError;

/// Outcome of evaluating one active command for one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    Pending,
    Completed,
    Failed(OrchestratorError),
}

/// Apply the ack-latch, AL-status-gate, completion, and timeout checks
/// to `cmd` given the tick's `tx` frame.
pub fn evaluate_command(
    cmd: &mut PendingCommand,
    tx: &TxFrame,
    al_status_nonzero: bool,
    now: Instant,
) -> EvalOutcome {
    // Step 1 — ack latch.
    if !cmd.acked && tx.status.contains(StatusFlags::EXECUTE_ACK) {
        cmd.acked = true;
    }

    // Step 3 — AL-status gate.
    if al_status_nonzero {
        return EvalOutcome::Failed(OrchestratorError::drive_error(DriveErrorCode::UnknownFault));
    }

    // Step 4 — completion check.
    if criterion_satisfied(cmd, tx, now) {
        return EvalOutcome::Completed;
    }

    // Step 5 — timeout.
    if let (Some(start), Some(timeout)) = (cmd.start, cmd.timeout) {
        if now.duration_since(start) >= timeout {
            return EvalOutcome::Failed(OrchestratorError::drive_error(DriveErrorCode::SafetyTimeout));
        }
    }

    EvalOutcome::Pending
}

fn criterion_satisfied(cmd: &mut PendingCommand, tx: &TxFrame, now: Instant) -> bool {
    match cmd.criterion {
        CompletionCriterion::AckOnly => cmd.acked,

        CompletionCriterion::AckWithTimeout => {
            let elapsed = cmd.start.map(|s| now.duration_since(s)).unwrap_or_default();
            let required = cmd.timeout.unwrap_or_default();
            cmd.acked && elapsed >= required
        }

        CompletionCriterion::PositionReached => {
            let position_reached = tx.status.contains(StatusFlags::POSITION_REACHED);
            let motor_on = tx.status.contains(StatusFlags::MOTOR_ON);

            let seeded = cmd.prev_position_reached.is_none();
            let rising_position_reached =
                matches!(cmd.prev_position_reached, Some(false)) && position_reached;
            let falling_motor_on = matches!(cmd.prev_motor_on, Some(true)) && !motor_on;
            let position_match =
                cmd.keyword == keyword::DPOS && tx.actual_position == cmd.parameter;

            cmd.prev_position_reached = Some(position_reached);
            cmd.prev_motor_on = Some(motor_on);

            !seeded && (rising_position_reached || falling_motor_on || position_match)
        }

        CompletionCriterion::Indexed => {
            tx.status.contains(StatusFlags::ENCODER_VALID)
                && tx.status.contains(StatusFlags::POSITION_REACHED)
        }

        CompletionCriterion::Enabled => {
            tx.status.contains(StatusFlags::AMPLIFIERS_ENABLED)
                && tx.status.contains(StatusFlags::MOTOR_ON)
        }

        CompletionCriterion::Disabled => !tx.status.contains(StatusFlags::AMPLIFIERS_ENABLED),

        CompletionCriterion::Halt => !tx.status.contains(StatusFlags::SCANNING),
    }
}
