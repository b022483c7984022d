//! Bus health counters reported by the adapter once per tick.

/// Snapshot of the adapter's bus health counters for the current tick.
///
/// Used by the I/O loop to classify the outcome of the cyclic exchange
/// and by the AL-status gate in pending-command evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthSnapshot {
    pub slaves_found: u16,
    pub group_expected_wkc: i32,
    pub last_wkc: i32,
    pub bytes_out: u32,
    pub bytes_in: u32,
    pub slaves_operational: u16,
    pub al_status_code: u16,
}

impl HealthSnapshot {
    /// True when the last exchange's working counter matched what the
    /// group expected — a fully healthy cycle.
    pub fn is_healthy(&self) -> bool {
        self.last_wkc == self.group_expected_wkc
    }
}
