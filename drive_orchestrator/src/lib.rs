//! # Drive Orchestrator
//!
//! A high-level async orchestrator for a fieldbus network of
//! piezo-motion drives, sitting above a native adapter. Owns:
//!
//! - a strictly periodic (1-5 ms) I/O loop on a dedicated OS thread
//! - serialization of async motion requests into a per-axis
//!   command/acknowledgement state machine with settle criteria
//! - classification of drive faults from the 22-bit status vector,
//!   with per-slave duplicate suppression
//! - a working-counter strike/recovery/re-initialize ladder
//! - lock-free status snapshot and event-stream publishing for
//!   external bridges
//!
//! [`Orchestrator`] is the single public entry point; everything else
//! in this crate is either a building block it composes or a type
//! exposed for callers to observe.

pub mod axis;
pub mod classifier;
pub mod command;
pub mod command_eval;
pub mod config;
pub mod error;
pub mod events;
pub mod io_loop;
pub mod orchestrator;
pub mod snapshot;

pub use classifier::{classify_fault, ClassifiedFault};
pub use command::{CommandAwait, CompletionCriterion, PendingCommand};
pub use config::{ConfigError, OrchestratorConfig};
pub use error::OrchestratorError;
pub use events::{DriveStatusChangeEvent, EventBus, FaultedEvent};
pub use orchestrator::Orchestrator;
pub use snapshot::{SnapshotReader, StatusSnapshot};

pub use drive_adapter::{Adapter, AdapterError, SimulatedAdapter};
pub use drive_common::{DriveErrorCode, HealthSnapshot, RxFrame, StatusFlags, TxFrame};
