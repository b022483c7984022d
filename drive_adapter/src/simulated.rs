//! A simulated fieldbus adapter.
//!
//! Provides plausible single-axis physics (enable/disable, point-to-point
//! moves, jog, homing) driven purely by the `RxFrame`s the orchestrator
//! writes, without any real hardware. Useful for exercising the
//! orchestrator's public API end-to-end and as the backing adapter for
//! the demo binary.

use std::time::Instant;

use tracing::{debug, warn};

use drive_common::wire::keyword;
use drive_common::{HealthSnapshot, RxFrame, StatusFlags, TxFrame};

use crate::error::AdapterError;
use crate::Adapter;

/// Per-axis simulated physical state.
#[derive(Debug, Clone, Copy)]
struct SimAxis {
    position: i32,
    target: i32,
    enabled: bool,
    motor_on: bool,
    encoder_valid: bool,
    scanning: bool,
    position_reached: bool,
    prev_execute: bool,
    index_ticks_remaining: u8,
}

impl Default for SimAxis {
    fn default() -> Self {
        Self {
            position: 0,
            target: 0,
            enabled: false,
            motor_on: false,
            encoder_valid: false,
            scanning: false,
            position_reached: true,
            prev_execute: false,
            index_ticks_remaining: 0,
        }
    }
}

/// A software-emulated fieldbus adapter implementing [`Adapter`].
pub struct SimulatedAdapter {
    interface: Option<String>,
    axes: Vec<SimAxis>,
    pending_rx: Vec<RxFrame>,
    last_tx: Vec<TxFrame>,
    configured_slaves: u16,
    last_exchange: Option<Instant>,
    errors: Vec<String>,
    /// Forces the next `exchange()` to return this working counter
    /// instead of `slave_count()` — test/demo hook for WKC degradation.
    forced_wkc: Option<i32>,
}

impl SimulatedAdapter {
    /// Construct a simulated bus with `slave_count` axes, not yet opened.
    pub fn new(slave_count: u16) -> Self {
        Self {
            interface: None,
            axes: vec![SimAxis::default(); slave_count as usize],
            pending_rx: vec![RxFrame::nop(); slave_count as usize],
            last_tx: vec![TxFrame::default(); slave_count as usize],
            configured_slaves: slave_count,
            last_exchange: None,
            errors: Vec::new(),
            forced_wkc: None,
        }
    }

    /// Force the next [`Adapter::exchange`] call to report `wkc` instead
    /// of the healthy value. Used by tests/demos to provoke the WKC
    /// strike ladder.
    pub fn force_next_wkc(&mut self, wkc: i32) {
        self.forced_wkc = Some(wkc);
    }

    fn check_slave(&self, slave: u16) -> Result<usize, AdapterError> {
        if slave == 0 || slave as usize > self.axes.len() {
            return Err(AdapterError::SlaveOutOfRange {
                slave,
                slave_count: self.axes.len() as u16,
            });
        }
        Ok((slave - 1) as usize)
    }

    fn step_axis(axis: &mut SimAxis, rx: &RxFrame) -> StatusFlags {
        let ack = axis.prev_execute;
        axis.prev_execute = rx.execute == 1;

        match rx.command_str() {
            keyword::ENBL => {
                axis.enabled = rx.parameter != 0;
                if axis.enabled {
                    axis.motor_on = true;
                } else {
                    axis.motor_on = false;
                    axis.scanning = false;
                }
            }
            keyword::RSET => {
                // Nothing to clear in the simulated bus — no injected faults.
            }
            keyword::DPOS if axis.enabled && axis.motor_on => {
                axis.target = rx.parameter;
                let step = rx.velocity.unsigned_abs().max(1) as i32;
                let diff = axis.target - axis.position;
                if diff.abs() <= step {
                    axis.position = axis.target;
                    axis.position_reached = true;
                } else {
                    axis.position += step * diff.signum();
                    axis.position_reached = false;
                }
            }
            keyword::SCAN if axis.enabled && axis.motor_on => {
                let dir = rx.parameter.signum();
                axis.scanning = dir != 0;
                let step = rx.velocity.unsigned_abs().max(1) as i32;
                axis.position += step * dir;
            }
            keyword::INDX => {
                if !axis.encoder_valid {
                    if axis.index_ticks_remaining == 0 {
                        axis.index_ticks_remaining = 2;
                    } else {
                        axis.index_ticks_remaining -= 1;
                        if axis.index_ticks_remaining == 0 {
                            axis.encoder_valid = true;
                            axis.position = 0;
                            axis.position_reached = true;
                        }
                    }
                }
            }
            keyword::HALT | keyword::STOP => {
                axis.scanning = false;
            }
            _ => {}
        }

        let mut status = StatusFlags::empty();
        status.set(StatusFlags::AMPLIFIERS_ENABLED, axis.enabled);
        status.set(StatusFlags::MOTOR_ON, axis.motor_on);
        status.set(StatusFlags::CLOSED_LOOP, axis.motor_on);
        status.set(StatusFlags::ENCODER_VALID, axis.encoder_valid);
        status.set(StatusFlags::POSITION_REACHED, axis.position_reached);
        status.set(StatusFlags::SCANNING, axis.scanning);
        status.set(StatusFlags::EXECUTE_ACK, ack);
        status
    }
}

impl Adapter for SimulatedAdapter {
    fn initialize(&mut self, interface: &str) -> Result<(), AdapterError> {
        if self.configured_slaves == 0 {
            return Err(AdapterError::OpenFailed {
                interface: interface.to_string(),
                reason: "no slaves configured".to_string(),
            });
        }
        debug!(interface, slaves = self.configured_slaves, "simulated adapter opened");
        self.interface = Some(interface.to_string());
        self.last_exchange = None;
        Ok(())
    }

    fn slave_count(&self) -> u16 {
        if self.interface.is_some() {
            self.configured_slaves
        } else {
            0
        }
    }

    fn write_rx(&mut self, slave: u16, frame: RxFrame) -> Result<(), AdapterError> {
        let idx = self.check_slave(slave)?;
        self.pending_rx[idx] = frame;
        Ok(())
    }

    fn read_tx(&mut self, slave: u16) -> Result<TxFrame, AdapterError> {
        let idx = self.check_slave(slave)?;
        Ok(self.last_tx[idx])
    }

    fn exchange(&mut self, _timeout_us: u32) -> i32 {
        if self.interface.is_none() {
            return crate::wkc::RECV_FAILED;
        }
        self.last_exchange = Some(Instant::now());

        for (axis, (rx, tx)) in self
            .axes
            .iter_mut()
            .zip(self.pending_rx.iter().zip(self.last_tx.iter_mut()))
        {
            let status = Self::step_axis(axis, rx);
            *tx = TxFrame {
                actual_position: axis.position,
                status,
                slot: 0,
            };
        }

        if let Some(forced) = self.forced_wkc.take() {
            return forced;
        }
        self.axes.len() as i32
    }

    fn health(&self) -> HealthSnapshot {
        let n = self.axes.len() as u16;
        HealthSnapshot {
            slaves_found: n,
            group_expected_wkc: n as i32,
            last_wkc: n as i32,
            bytes_out: n as u32 * drive_common::wire::RX_FRAME_LEN as u32,
            bytes_in: n as u32 * drive_common::wire::TX_FRAME_LEN as u32,
            slaves_operational: n,
            al_status_code: 0,
        }
    }

    fn recover(&mut self, _timeout_ms: u32) -> i32 {
        self.axes.len() as i32
    }

    fn drain_errors(&mut self) -> String {
        if self.errors.is_empty() {
            String::new()
        } else {
            self.errors.drain(..).collect::<Vec<_>>().join("; ")
        }
    }

    fn shutdown(&mut self) {
        if self.interface.take().is_some() {
            debug!("simulated adapter closed");
        } else {
            warn!("shutdown called on an adapter that was never initialized");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_common::wire::keyword;

    #[test]
    fn initialize_fails_with_zero_slaves() {
        let mut adapter = SimulatedAdapter::new(0);
        assert!(adapter.initialize("sim0").is_err());
    }

    #[test]
    fn slave_count_zero_before_initialize() {
        let adapter = SimulatedAdapter::new(2);
        assert_eq!(adapter.slave_count(), 0);
    }

    #[test]
    fn enable_then_move_reaches_target() {
        let mut adapter = SimulatedAdapter::new(1);
        adapter.initialize("sim0").unwrap();

        adapter
            .write_rx(1, RxFrame::with_command(keyword::ENBL, 1, 0, 0, 0, true))
            .unwrap();
        adapter.exchange(1000);
        let tx = adapter.read_tx(1).unwrap();
        assert!(tx.status.contains(StatusFlags::AMPLIFIERS_ENABLED));
        assert!(tx.status.contains(StatusFlags::MOTOR_ON));

        adapter
            .write_rx(1, RxFrame::with_command(keyword::DPOS, 100, 50, 10, 10, true))
            .unwrap();
        for _ in 0..10 {
            adapter.exchange(1000);
            let tx = adapter.read_tx(1).unwrap();
            if tx.actual_position == 100 {
                assert!(tx.status.contains(StatusFlags::POSITION_REACHED));
                return;
            }
        }
        panic!("axis never reached target position");
    }

    #[test]
    fn write_rx_out_of_range_slave_errors() {
        let mut adapter = SimulatedAdapter::new(1);
        adapter.initialize("sim0").unwrap();
        assert!(adapter.write_rx(2, RxFrame::nop()).is_err());
        assert!(adapter.write_rx(0, RxFrame::nop()).is_err());
    }

    #[test]
    fn forced_wkc_overrides_next_exchange() {
        let mut adapter = SimulatedAdapter::new(2);
        adapter.initialize("sim0").unwrap();
        adapter.force_next_wkc(1);
        assert_eq!(adapter.exchange(1000), 1);
        assert_eq!(adapter.exchange(1000), 2);
    }

    #[test]
    fn index_becomes_valid_after_a_few_ticks() {
        let mut adapter = SimulatedAdapter::new(1);
        adapter.initialize("sim0").unwrap();
        adapter
            .write_rx(1, RxFrame::with_command(keyword::INDX, 0, 10, 10, 10, true))
            .unwrap();
        let mut became_valid = false;
        for _ in 0..5 {
            adapter.exchange(1000);
            if adapter
                .read_tx(1)
                .unwrap()
                .status
                .contains(StatusFlags::ENCODER_VALID)
            {
                became_valid = true;
                break;
            }
        }
        assert!(became_valid);
    }
}
