//! Adapter-level errors, distinct from the orchestrator's public error
//! taxonomy — these are translated at the boundary.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("failed to open interface {interface}: {reason}")]
    OpenFailed { interface: String, reason: String },

    #[error("slave {slave} out of range (0..{slave_count})")]
    SlaveOutOfRange { slave: u16, slave_count: u16 },

    #[error("adapter not initialized")]
    NotInitialized,

    #[error("adapter I/O error: {0}")]
    Io(String),
}
