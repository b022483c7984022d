//! The periodic I/O loop: drains ingest, stages outputs,
//! exchanges with the adapter, classifies wire health, evaluates active
//! commands, publishes a snapshot, and sleeps until the next tick. Runs
//! single-threadedly on a dedicated worker so the bus cadence is never
//! at the mercy of an async scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use drive_adapter::wkc::{classify, ExchangeOutcome};
use drive_adapter::Adapter;
use drive_common::wire::keyword;
use drive_common::{HealthSnapshot, RxFrame, TxFrame};

use crate::axis::{new_axis_table, AxisSlot};
use crate::classifier::classify_fault;
use crate::command::PendingCommand;
use crate::command_eval::{evaluate_command, EvalOutcome};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::events::{DriveStatusChangeEvent, EventBus, FaultThrottle, FaultedEvent};
use crate::snapshot::{SnapshotPublisher, StatusSnapshot};

/// O(1) per-tick cycle timing, mirrored into every published snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CycleStats {
    pub last: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl CycleStats {
    fn new() -> Self {
        Self {
            last: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }

    fn record(&mut self, duration: Duration) {
        self.last = duration;
        if duration < self.min {
            self.min = duration;
        }
        if duration > self.max {
            self.max = duration;
        }
    }
}

pub struct IoLoop {
    adapter: Box<dyn Adapter>,
    interface: String,
    config: OrchestratorConfig,
    table: Vec<AxisSlot>,
    fault_throttles: Vec<FaultThrottle>,
    ingest_rx: mpsc::UnboundedReceiver<PendingCommand>,
    events: EventBus,
    snapshot: SnapshotPublisher,
    shutdown: CancellationToken,
    stop_latches: Arc<Vec<AtomicBool>>,
    wkc_strikes: u32,
    fatal_error_count: u32,
    last_health: HealthSnapshot,
    stats: CycleStats,
    sequence: u64,
    ticks: u64,
}

impl IoLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Box<dyn Adapter>,
        interface: String,
        config: OrchestratorConfig,
        slave_count: u16,
        ingest_rx: mpsc::UnboundedReceiver<PendingCommand>,
        events: EventBus,
        snapshot: SnapshotPublisher,
        shutdown: CancellationToken,
        stop_latches: Arc<Vec<AtomicBool>>,
    ) -> Self {
        Self {
            adapter,
            interface,
            config,
            table: new_axis_table(slave_count),
            fault_throttles: vec![FaultThrottle::default(); slave_count as usize],
            ingest_rx,
            events,
            snapshot,
            shutdown,
            stop_latches,
            wkc_strikes: 0,
            fatal_error_count: 0,
            last_health: HealthSnapshot::default(),
            stats: CycleStats::new(),
            sequence: 0,
            ticks: 0,
        }
    }

    /// Spawn the loop on a dedicated OS thread and return its handle.
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("drive-io-loop".to_string())
            .spawn(move || self.run())
            .expect("failed to spawn drive I/O loop thread")
    }

    fn run(mut self) {
        let period = self.config.cycle_period();
        info!(period_ms = self.config.cycle_period_ms, "I/O loop started");

        while !self.shutdown.is_cancelled() {
            let start = Instant::now();
            self.tick();
            let elapsed = start.elapsed();
            self.stats.record(elapsed);

            if elapsed > period {
                warn!(?elapsed, ?period, "cycle overran its period");
            }
            if let Some(remaining) = period.checked_sub(elapsed) {
                thread::sleep(remaining);
            }
        }

        self.fail_all_active(OrchestratorError::SessionEnded);
        self.adapter.shutdown();
        info!("I/O loop stopped");
    }

    fn tick(&mut self) {
        self.ticks += 1;

        self.phase_a_ingest();
        self.phase_b_stage_outputs();

        let wkc = self.adapter.exchange(self.config.exchange_timeout_us);
        let health = self.adapter.health();
        self.last_health = health;

        self.phase_e_classify_and_ladder(wkc, health);
        self.phase_f_process_slaves(health);
        self.phase_g_publish();
        self.phase_h_drain_errors();

        if self.config.enable_cycle_trace_logging {
            debug!(
                tick = self.ticks,
                wkc,
                strikes = self.wkc_strikes,
                fatal = self.fatal_error_count,
                last_cycle_us = self.stats.last.as_micros() as u64,
                "cycle trace"
            );
        }
    }

    /// Phase A — drain ingest, install or reject each item.
    fn phase_a_ingest(&mut self) {
        let slave_count = self.table.len() as u16;
        while let Ok(mut command) = self.ingest_rx.try_recv() {
            if command.is_cancelled() {
                continue;
            }
            if command.axis == 0 || command.axis > slave_count {
                command.resolve(Err(OrchestratorError::drive_error(
                    drive_common::DriveErrorCode::UnknownFault,
                )));
                continue;
            }
            let idx = (command.axis - 1) as usize;
            if self.table[idx].active.is_some() {
                command.resolve(Err(OrchestratorError::AlreadyInFlight {
                    slave: command.axis,
                }));
                continue;
            }
            command.start(Instant::now());
            self.table[idx].active = Some(command);
        }
    }

    /// Phase B — mutate `rx[i]` for every slave and write it out.
    fn phase_b_stage_outputs(&mut self) {
        for (i, slot) in self.table.iter_mut().enumerate() {
            let cancelled = slot
                .active
                .as_ref()
                .map(PendingCommand::is_cancelled)
                .unwrap_or(false);
            if cancelled {
                slot.active = None;
            }

            slot.rx = match &slot.active {
                None => RxFrame::nop(),
                Some(command) => {
                    let execute = !(command.acked && command.requires_ack);
                    RxFrame::with_command(
                        &command.keyword,
                        command.parameter,
                        command.velocity,
                        command.acceleration,
                        command.deceleration,
                        execute,
                    )
                }
            };

            let slave = (i + 1) as u16;
            if let Err(err) = self.adapter.write_rx(slave, slot.rx) {
                warn!(slave, error = %err, "write_rx failed; continuing");
            }
        }
    }

    /// Phase E — classify the exchange outcome and drive the recovery ladder.
    fn phase_e_classify_and_ladder(&mut self, wkc: i32, health: HealthSnapshot) {
        match classify(wkc, health.last_wkc, health.group_expected_wkc) {
            ExchangeOutcome::Healthy => {
                self.wkc_strikes = 0;
                self.fatal_error_count = 0;
            }
            ExchangeOutcome::WkcLow => {
                self.fatal_error_count = 0;
                self.wkc_strikes += 1;
                self.run_strike_ladder();
            }
            ExchangeOutcome::Unknown => {
                warn!(wkc, "unrecognized exchange outcome; treating as a strike");
                self.fatal_error_count = 0;
                self.wkc_strikes += 1;
                self.run_strike_ladder();
            }
            ExchangeOutcome::Fatal => {
                self.fatal_error_count += 1;
                if self.fatal_error_count >= 3 {
                    self.reinitialize();
                    self.fatal_error_count = 0;
                    self.wkc_strikes = 0;
                } else {
                    self.run_strike_ladder();
                }
            }
        }
    }

    fn run_strike_ladder(&mut self) {
        if self.wkc_strikes < self.config.wkc_recovery_threshold {
            return;
        }
        warn!(strikes = self.wkc_strikes, "WKC strike threshold reached; attempting recovery");
        let recovered = self.adapter.recover(self.config.recovery_timeout_ms);
        if recovered > 0 {
            thread::sleep(Duration::from_millis(20));
            self.wkc_strikes = 0;
        } else {
            self.reinitialize();
            self.wkc_strikes = 0;
        }
    }

    fn reinitialize(&mut self) {
        error!("reinitializing adapter session");
        self.fail_all_active(OrchestratorError::SessionRestarted);

        self.adapter.shutdown();
        thread::sleep(self.config.reinitialization_delay());

        match self.adapter.initialize(&self.interface) {
            Ok(()) => {
                let slave_count = self.adapter.slave_count();
                if slave_count as usize != self.table.len() {
                    info!(old = self.table.len(), new = slave_count, "slave count changed on reinit");
                    self.table = new_axis_table(slave_count);
                    self.fault_throttles = vec![FaultThrottle::default(); slave_count as usize];
                }
                info!(slaves = slave_count, "adapter reinitialized");
            }
            Err(err) => {
                error!(error = %err, "reinitialize failed; will retry on the next unhealthy cycle");
            }
        }
    }

    fn fail_all_active(&mut self, err: OrchestratorError) {
        for slot in &mut self.table {
            if let Some(mut command) = slot.active.take() {
                command.resolve(Err(err.clone()));
            }
        }
    }

    /// Phase F — per-slave read, fault decode, status-change emission,
    /// and active-command evaluation.
    fn phase_f_process_slaves(&mut self, health: HealthSnapshot) {
        let al_status_nonzero = health.al_status_code != 0;
        let now = Instant::now();
        let fault_interval = self.config.fault_repeat_interval();

        let adapter = &mut self.adapter;
        let table = &mut self.table;
        let fault_throttles = &mut self.fault_throttles;
        let events = &self.events;
        let sequence = &mut self.sequence;
        let ticks = self.ticks;
        let stop_latches = &self.stop_latches;

        for (i, slot) in table.iter_mut().enumerate() {
            let slave = (i + 1) as u16;

            match adapter.read_tx(slave) {
                Ok(tx) => {
                    slot.previous_tx = slot.tx;
                    slot.tx = tx;
                }
                Err(err) => {
                    warn!(slave, error = %err, "read_tx failed; retaining previous frame");
                }
            }

            let fault = classify_fault(&slot.tx);
            if fault_throttles[i].should_emit(fault.map(|f| f.code), now, fault_interval) {
                let fault = fault.expect("should_emit only returns true for Some(code)");
                events.emit_faulted(FaultedEvent {
                    slave,
                    status_bits: slot.tx.status.bits(),
                    code: fault.code,
                    message: format!("{}: {}", fault.code, fault.hint),
                    health,
                });
            }

            if slot.active.is_some() {
                let changed_mask = slot.tx.changed_bits(&slot.previous_tx);
                let position_changed = slot.tx.actual_position != slot.previous_tx.actual_position;
                if changed_mask != 0 || position_changed {
                    *sequence += 1;
                    let keyword = slot
                        .active
                        .as_ref()
                        .map(|c| c.keyword.clone())
                        .unwrap_or_default();
                    events.emit_status_changed(DriveStatusChangeEvent {
                        slave,
                        timestamp: SystemTime::now(),
                        monotonic_ticks: ticks,
                        sequence: *sequence,
                        current: slot.tx,
                        previous: slot.previous_tx,
                        changed_bits_mask: changed_mask,
                        active_command_keyword: keyword,
                    });
                }
            }

            if let Some(mut command) = slot.active.take() {
                match evaluate_command(&mut command, &slot.tx, al_status_nonzero, now) {
                    EvalOutcome::Pending => slot.active = Some(command),
                    EvalOutcome::Completed => {
                        apply_latch_side_effect(&command, slot, stop_latches.get(i));
                        command.resolve(Ok(()));
                    }
                    EvalOutcome::Failed(err) => {
                        if let OrchestratorError::DriveError { code, hint, .. } = &err {
                            if fault_throttles[i].should_emit(Some(*code), now, fault_interval) {
                                events.emit_faulted(FaultedEvent {
                                    slave,
                                    status_bits: slot.tx.status.bits(),
                                    code: *code,
                                    message: format!("{code}: {hint}"),
                                    health,
                                });
                            }
                        }
                        command.resolve(Err(err));
                    }
                }
            }
        }
    }

    /// Phase G — build and publish an immutable snapshot.
    fn phase_g_publish(&mut self) {
        let drive_states: Arc<[TxFrame]> =
            self.table.iter().map(|slot| slot.tx).collect::<Vec<_>>().into();
        self.snapshot.publish(StatusSnapshot {
            timestamp: SystemTime::now(),
            health: self.last_health,
            drive_states,
            cycle_time: self.stats.last,
            min_cycle: self.stats.min,
            max_cycle: self.stats.max,
        });
    }

    /// Phase H — drain and log any buffered adapter-level error text.
    fn phase_h_drain_errors(&mut self) {
        let errors = self.adapter.drain_errors();
        if !errors.is_empty() {
            error!(errors = %errors, "adapter reported buffered errors");
        }
    }
}

/// `Stop()` sets the stop latch; `Reset()` and `Enable(true)` clear it,
/// once those commands complete (spec.md §4.2's per-row notes).
fn apply_latch_side_effect(command: &PendingCommand, slot: &mut AxisSlot, latch: Option<&AtomicBool>) {
    let keyword_str = command.keyword.as_str();
    let clears = keyword_str == keyword::RSET || (keyword_str == keyword::ENBL && command.parameter != 0);
    let sets = keyword_str == keyword::STOP;

    if sets {
        slot.stop_latched = true;
    } else if clears {
        slot.stop_latched = false;
    }

    if let Some(latch) = latch {
        if sets {
            latch.store(true, Ordering::Release);
        } else if clears {
            latch.store(false, Ordering::Release);
        }
    }
}
