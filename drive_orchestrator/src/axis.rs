//! Per-slave state owned exclusively by the I/O loop.

use drive_common::{RxFrame, TxFrame};

use crate::command::PendingCommand;

/// One slave's complete loop-owned state.
///
/// The last-raised-fault/timestamp half of spec.md §3's axis state table
/// lives in `IoLoop`'s own `fault_throttles` table ([`crate::events::FaultThrottle`]),
/// not here, since that state needs nothing else from this slot.
pub struct AxisSlot {
    pub rx: RxFrame,
    pub tx: TxFrame,
    pub previous_tx: TxFrame,
    pub active: Option<PendingCommand>,
    pub stop_latched: bool,
}

impl AxisSlot {
    pub fn new() -> Self {
        Self {
            rx: RxFrame::nop(),
            tx: TxFrame::default(),
            previous_tx: TxFrame::default(),
            active: None,
            stop_latched: false,
        }
    }
}

impl Default for AxisSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate a fresh per-axis table for `slave_count` slaves.
pub fn new_axis_table(slave_count: u16) -> Vec<AxisSlot> {
    (0..slave_count).map(|_| AxisSlot::new()).collect()
}
