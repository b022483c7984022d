//! Public error taxonomy surfaced to callers.

use thiserror::Error;

use drive_common::DriveErrorCode;

/// Errors a caller of the public API can observe.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("orchestrator is not initialized")]
    NotInitialized,

    #[error("orchestrator is already initialized")]
    AlreadyInitialized,

    #[error("failed to open adapter interface {interface}: {reason}")]
    AdapterOpenFailed { interface: String, reason: String },

    #[error("adapter reported zero slaves")]
    NoSlaves,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("slave {slave} out of range (1..={slave_count})")]
    SlaveOutOfRange { slave: u16, slave_count: u16 },

    #[error("slave {slave} already has a command in flight")]
    AlreadyInFlight { slave: u16 },

    #[error("slave {slave} is not ready: {reason}")]
    NotReady { slave: u16, reason: String },

    #[error("slave {slave} is stop-latched; call reset() or enable(true) first")]
    Latched { slave: u16 },

    #[error("{message}")]
    DriveError {
        code: DriveErrorCode,
        message: String,
        hint: &'static str,
    },

    #[error("command cancelled")]
    Cancelled,

    #[error("session restarted during re-initialize")]
    SessionRestarted,

    #[error("session ended")]
    SessionEnded,
}

impl OrchestratorError {
    /// Build a `DriveError` whose `message` carries the drive-side
    /// recovery hint (spec.md §7: "the original drive-side recovery
    /// hint"), not just the code's short name.
    pub(crate) fn drive_error(code: DriveErrorCode) -> Self {
        let hint = code.recovery_hint();
        let message = if hint.is_empty() {
            code.to_string()
        } else {
            format!("{code}: {hint}")
        };
        Self::DriveError { code, message, hint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_error_carries_static_hint() {
        let err = OrchestratorError::drive_error(DriveErrorCode::ThermalProtection);
        match err {
            OrchestratorError::DriveError { code, hint, .. } => {
                assert_eq!(code, DriveErrorCode::ThermalProtection);
                assert_eq!(hint, "let drive cool; ENBL=1 or RSET");
            }
            _ => panic!("expected DriveError"),
        }
    }
}
