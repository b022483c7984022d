//! The public entry point: lifecycle (`initialize`/`shutdown`) and the
//! eight public operations from spec.md §4.2, built on top of the
//! ingest channel, per-axis gates, snapshot reader, and event bus the
//! I/O loop publishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use drive_adapter::Adapter;
use drive_common::wire::keyword;
use drive_common::{StatusFlags, TxFrame};

use crate::command::{CompletionCriterion, PendingCommand};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::events::{DriveStatusChangeEvent, EventBus, FaultedEvent};
use crate::io_loop::IoLoop;
use crate::snapshot::{SnapshotPublisher, SnapshotReader, StatusSnapshot};

/// Runtime state behind the public API: present once [`Orchestrator::initialize`]
/// succeeds, torn down by [`Orchestrator::shutdown`].
struct Session {
    ingest_tx: mpsc::UnboundedSender<PendingCommand>,
    snapshot: SnapshotReader,
    events: EventBus,
    shutdown: CancellationToken,
    loop_handle: Option<thread::JoinHandle<()>>,
    axis_gates: Arc<Vec<tokio::sync::Mutex<()>>>,
    stop_latches: Arc<Vec<AtomicBool>>,
    slave_count: u16,
}

/// The Drive Orchestrator: a high-level async façade over a fieldbus
/// network of piezo-motion drives (spec.md §2).
///
/// Construct with the adapter the orchestrator should drive (a real
/// native adapter or [`drive_adapter::SimulatedAdapter`]) and a
/// configuration, then call [`Orchestrator::initialize`] once before
/// issuing motion commands. `Orchestrator` is `Send + Sync` and is
/// meant to be shared behind an `Arc` across caller tasks; every public
/// operation takes `&self`.
pub struct Orchestrator {
    config: OrchestratorConfig,
    adapter_slot: Mutex<Option<Box<dyn Adapter>>>,
    session: RwLock<Option<Session>>,
}

impl Orchestrator {
    /// Build an orchestrator around `adapter`, not yet initialized.
    pub fn new(adapter: Box<dyn Adapter>, config: OrchestratorConfig) -> Self {
        Self {
            config,
            adapter_slot: Mutex::new(Some(adapter)),
            session: RwLock::new(None),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Open `interface`, discover the slave count, and spawn the I/O
    /// loop. Must be called exactly once before any other operation.
    pub async fn initialize(&self, interface: &str) -> Result<(), OrchestratorError> {
        if self.session.read().is_some() {
            return Err(OrchestratorError::AlreadyInitialized);
        }
        let mut adapter = self
            .adapter_slot
            .lock()
            .take()
            .ok_or(OrchestratorError::AlreadyInitialized)?;

        if let Err(err) = adapter.initialize(interface) {
            let reason = err.to_string();
            *self.adapter_slot.lock() = Some(adapter);
            return Err(OrchestratorError::AdapterOpenFailed {
                interface: interface.to_string(),
                reason,
            });
        }

        let slave_count = adapter.slave_count();
        if slave_count == 0 {
            adapter.shutdown();
            *self.adapter_slot.lock() = Some(adapter);
            return Err(OrchestratorError::NoSlaves);
        }

        let (ingest_tx, ingest_rx) = mpsc::unbounded_channel();
        let events = EventBus::new();
        let publisher = SnapshotPublisher::new();
        let snapshot = publisher.reader();
        let shutdown = CancellationToken::new();
        let stop_latches: Arc<Vec<AtomicBool>> =
            Arc::new((0..slave_count).map(|_| AtomicBool::new(false)).collect());
        let axis_gates: Arc<Vec<tokio::sync::Mutex<()>>> =
            Arc::new((0..slave_count).map(|_| tokio::sync::Mutex::new(())).collect());

        let io_loop = IoLoop::new(
            adapter,
            interface.to_string(),
            self.config.clone(),
            slave_count,
            ingest_rx,
            events.clone(),
            publisher,
            shutdown.clone(),
            stop_latches.clone(),
        );
        let loop_handle = io_loop.spawn();

        *self.session.write() = Some(Session {
            ingest_tx,
            snapshot,
            events,
            shutdown,
            loop_handle: Some(loop_handle),
            axis_gates,
            stop_latches,
            slave_count,
        });

        info!(interface, slaves = slave_count, "orchestrator initialized");
        Ok(())
    }

    /// Stop the I/O loop, fail every in-flight command with
    /// [`OrchestratorError::SessionEnded`], and close the adapter.
    /// Idempotent after the first call.
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        let session = self.session.write().take();
        let Some(mut session) = session else {
            return Ok(());
        };
        session.shutdown.cancel();
        if let Some(handle) = session.loop_handle.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
        info!("orchestrator shut down");
        Ok(())
    }

    /// Number of slaves discovered at `initialize`, or 0 if not initialized.
    pub fn slave_count(&self) -> u16 {
        self.session.read().as_ref().map_or(0, |s| s.slave_count)
    }

    /// The latest published [`StatusSnapshot`]. Never blocks or allocates.
    pub fn get_status(&self) -> Arc<StatusSnapshot> {
        match self.session.read().as_ref() {
            Some(session) => session.snapshot.load(),
            None => Arc::new(StatusSnapshot::empty()),
        }
    }

    /// Subscribe to the `StatusChanged` event stream.
    pub fn subscribe_status_changed(
        &self,
    ) -> Result<broadcast::Receiver<DriveStatusChangeEvent>, OrchestratorError> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.events.subscribe_status_changed())
            .ok_or(OrchestratorError::NotInitialized)
    }

    /// Subscribe to the `Faulted` event stream.
    pub fn subscribe_faulted(&self) -> Result<broadcast::Receiver<FaultedEvent>, OrchestratorError> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.events.subscribe_faulted())
            .ok_or(OrchestratorError::NotInitialized)
    }

    // ---- public motion operations (spec.md §4.2) ----

    /// `MoveAbsolute`: dispatch `DPOS` and wait for `PositionReached`.
    pub async fn move_absolute(
        &self,
        slave: u16,
        target: i32,
        velocity: i32,
        acceleration: u16,
        deceleration: u16,
        settle: Option<Duration>,
    ) -> Result<(), OrchestratorError> {
        self.check_not_latched(slave)?;
        self.check_ready(
            slave,
            &[
                (StatusFlags::AMPLIFIERS_ENABLED, "amplifiers not enabled"),
                (StatusFlags::MOTOR_ON, "motor not on"),
                (StatusFlags::CLOSED_LOOP, "not in closed loop"),
                (StatusFlags::ENCODER_VALID, "encoder not valid"),
            ],
        )?;
        let timeout = settle.unwrap_or_else(|| self.config.default_settle_timeout());
        self.dispatch(
            slave,
            keyword::DPOS,
            target,
            velocity,
            acceleration,
            deceleration,
            true,
            CompletionCriterion::PositionReached,
            Some(timeout),
        )
        .await
    }

    /// `Jog`: dispatch `SCAN` and wait for the ack only.
    pub async fn jog(
        &self,
        slave: u16,
        direction: i32,
        velocity: i32,
        acceleration: u16,
        deceleration: u16,
    ) -> Result<(), OrchestratorError> {
        if !(-1..=1).contains(&direction) {
            return Err(OrchestratorError::InvalidArgument(format!(
                "jog direction must be -1, 0, or 1, got {direction}"
            )));
        }
        self.check_not_latched(slave)?;
        self.check_ready(
            slave,
            &[
                (StatusFlags::AMPLIFIERS_ENABLED, "amplifiers not enabled"),
                (StatusFlags::MOTOR_ON, "motor not on"),
                (StatusFlags::CLOSED_LOOP, "not in closed loop"),
            ],
        )?;
        self.dispatch(
            slave,
            keyword::SCAN,
            direction,
            velocity,
            acceleration,
            deceleration,
            true,
            CompletionCriterion::AckOnly,
            None,
        )
        .await
    }

    /// `Index`: dispatch `INDX` and wait for `EncoderValid ∧ PositionReached`.
    /// Resolves immediately without dispatching if the encoder is already
    /// valid.
    pub async fn index(
        &self,
        slave: u16,
        direction: i32,
        velocity: i32,
        acceleration: u16,
        deceleration: u16,
        settle: Option<Duration>,
    ) -> Result<(), OrchestratorError> {
        if direction != 0 && direction != 1 {
            return Err(OrchestratorError::InvalidArgument(format!(
                "index direction must be 0 or 1, got {direction}"
            )));
        }
        self.check_not_latched(slave)?;
        self.check_ready(slave, &[(StatusFlags::AMPLIFIERS_ENABLED, "amplifiers not enabled")])?;

        let tx = self.current_tx(slave)?;
        if tx.status.contains(StatusFlags::ENCODER_VALID) {
            return Ok(());
        }

        let timeout = settle.unwrap_or_else(|| self.config.default_settle_timeout());
        self.dispatch(
            slave,
            keyword::INDX,
            direction,
            velocity,
            acceleration,
            deceleration,
            true,
            CompletionCriterion::Indexed,
            Some(timeout),
        )
        .await
    }

    /// `Reset`: dispatch `RSET` and wait for `AckWithTimeout(1s)`. Also
    /// clears the stop latch once the command completes (handled by the
    /// I/O loop).
    pub async fn reset(&self, slave: u16) -> Result<(), OrchestratorError> {
        self.dispatch(
            slave,
            keyword::RSET,
            0,
            0,
            0,
            0,
            true,
            CompletionCriterion::AckWithTimeout,
            Some(Duration::from_secs(1)),
        )
        .await
    }

    /// `Enable`: dispatch `ENBL` and wait for `Enabled`/`Disabled`.
    /// Resolves immediately without dispatching if already in the
    /// target state; enabling also clears the stop latch.
    pub async fn enable(&self, slave: u16, enabled: bool) -> Result<(), OrchestratorError> {
        let idx = self.axis_index(slave)?;
        let tx = self.current_tx(slave)?;
        let currently_enabled =
            tx.status.contains(StatusFlags::AMPLIFIERS_ENABLED) && tx.status.contains(StatusFlags::MOTOR_ON);
        let currently_disabled = !tx.status.contains(StatusFlags::AMPLIFIERS_ENABLED);

        if (enabled && currently_enabled) || (!enabled && currently_disabled) {
            if enabled {
                self.clear_stop_latch(idx);
            }
            return Ok(());
        }

        self.dispatch(
            slave,
            keyword::ENBL,
            enabled as i32,
            0,
            0,
            0,
            true,
            if enabled {
                CompletionCriterion::Enabled
            } else {
                CompletionCriterion::Disabled
            },
            Some(Duration::from_millis(500)),
        )
        .await
    }

    /// `Halt`: dispatch `HALT` and wait for `¬Scanning`.
    pub async fn halt(&self, slave: u16) -> Result<(), OrchestratorError> {
        self.dispatch(
            slave,
            keyword::HALT,
            0,
            0,
            0,
            0,
            true,
            CompletionCriterion::Halt,
            Some(Duration::from_secs(2)),
        )
        .await
    }

    /// `Stop`: dispatch `STOP` and wait for the ack. Sets the stop latch
    /// once the command completes (handled by the I/O loop).
    pub async fn stop(&self, slave: u16) -> Result<(), OrchestratorError> {
        self.dispatch(
            slave,
            keyword::STOP,
            0,
            0,
            0,
            0,
            true,
            CompletionCriterion::AckOnly,
            Some(Duration::from_secs(2)),
        )
        .await
    }

    /// `SendRaw`: dispatch a caller-chosen keyword, waiting for the ack only.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_raw(
        &self,
        slave: u16,
        keyword: &str,
        parameter: i32,
        velocity: i32,
        acceleration: u16,
        deceleration: u16,
        requires_ack: bool,
        timeout: Option<Duration>,
    ) -> Result<(), OrchestratorError> {
        if keyword.is_empty() || keyword.len() > drive_common::wire::COMMAND_LEN {
            return Err(OrchestratorError::InvalidArgument(format!(
                "keyword must be 1-{} ASCII characters",
                drive_common::wire::COMMAND_LEN
            )));
        }
        let upper = keyword.to_ascii_uppercase();
        self.dispatch(
            slave,
            &upper,
            parameter,
            velocity,
            acceleration,
            deceleration,
            requires_ack,
            CompletionCriterion::AckOnly,
            timeout,
        )
        .await
    }

    // ---- internals ----

    fn axis_index(&self, slave: u16) -> Result<usize, OrchestratorError> {
        let guard = self.session.read();
        let session = guard.as_ref().ok_or(OrchestratorError::NotInitialized)?;
        if slave == 0 || slave > session.slave_count {
            return Err(OrchestratorError::SlaveOutOfRange {
                slave,
                slave_count: session.slave_count,
            });
        }
        Ok((slave - 1) as usize)
    }

    fn current_tx(&self, slave: u16) -> Result<TxFrame, OrchestratorError> {
        let idx = self.axis_index(slave)?;
        let guard = self.session.read();
        let session = guard.as_ref().ok_or(OrchestratorError::NotInitialized)?;
        let snapshot = session.snapshot.load();
        Ok(snapshot.drive_states.get(idx).copied().unwrap_or_default())
    }

    fn check_not_latched(&self, slave: u16) -> Result<(), OrchestratorError> {
        let idx = self.axis_index(slave)?;
        let guard = self.session.read();
        let session = guard.as_ref().ok_or(OrchestratorError::NotInitialized)?;
        if session.stop_latches[idx].load(Ordering::Acquire) {
            return Err(OrchestratorError::Latched { slave });
        }
        Ok(())
    }

    fn check_ready(&self, slave: u16, required: &[(StatusFlags, &'static str)]) -> Result<(), OrchestratorError> {
        let tx = self.current_tx(slave)?;
        for (flag, reason) in required {
            if !tx.status.contains(*flag) {
                return Err(OrchestratorError::NotReady {
                    slave,
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }

    fn clear_stop_latch(&self, idx: usize) {
        if let Some(session) = self.session.read().as_ref() {
            session.stop_latches[idx].store(false, Ordering::Release);
        }
    }

    /// Step 2-5 of a public operation (spec.md §4.2): acquire the axis
    /// gate, build and enqueue the `PendingCommand`, and await its
    /// completion. The gate is released when the returned future drops.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        slave: u16,
        keyword: &str,
        parameter: i32,
        velocity: i32,
        acceleration: u16,
        deceleration: u16,
        requires_ack: bool,
        criterion: CompletionCriterion,
        timeout: Option<Duration>,
    ) -> Result<(), OrchestratorError> {
        let (ingest_tx, axis_gates) = {
            let guard = self.session.read();
            let session = guard.as_ref().ok_or(OrchestratorError::NotInitialized)?;
            if slave == 0 || slave > session.slave_count {
                return Err(OrchestratorError::SlaveOutOfRange {
                    slave,
                    slave_count: session.slave_count,
                });
            }
            (session.ingest_tx.clone(), session.axis_gates.clone())
        };

        let idx = (slave - 1) as usize;
        let _gate = axis_gates[idx].lock().await;

        let (command, awaiting) = PendingCommand::new(
            slave,
            keyword,
            parameter,
            velocity,
            acceleration,
            deceleration,
            requires_ack,
            criterion,
            timeout,
        );
        ingest_tx.send(command).map_err(|_| OrchestratorError::SessionEnded)?;
        awaiting.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_adapter::SimulatedAdapter;

    fn orchestrator(slaves: u16) -> Orchestrator {
        Orchestrator::new(Box::new(SimulatedAdapter::new(slaves)), OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn initialize_then_shutdown_is_idempotent() {
        let orch = orchestrator(1);
        orch.initialize("sim0").await.unwrap();
        assert_eq!(orch.slave_count(), 1);
        orch.shutdown().await.unwrap();
        orch.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let orch = orchestrator(1);
        orch.initialize("sim0").await.unwrap();
        let err = orch.initialize("sim0").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyInitialized));
        orch.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn zero_slaves_fails_with_no_slaves() {
        let orch = orchestrator(0);
        let err = orch.initialize("sim0").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NoSlaves));
    }

    #[tokio::test]
    async fn operations_before_initialize_fail_not_initialized() {
        let orch = orchestrator(1);
        let err = orch.reset(1).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotInitialized));
    }

    #[tokio::test]
    async fn move_absolute_rejects_not_ready_axis() {
        let orch = orchestrator(1);
        orch.initialize("sim0").await.unwrap();
        let err = orch.move_absolute(1, 100, 10, 10, 10, None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotReady { slave: 1, .. }));
        orch.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn out_of_range_slave_is_rejected() {
        let orch = orchestrator(1);
        orch.initialize("sim0").await.unwrap();
        let err = orch.reset(7).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::SlaveOutOfRange { slave: 7, .. }));
        orch.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn jog_rejects_invalid_direction() {
        let orch = orchestrator(1);
        orch.initialize("sim0").await.unwrap();
        let err = orch.jog(1, 2, 10, 10, 10).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
        orch.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn enable_and_move_happy_path_completes() {
        let orch = orchestrator(1);
        orch.initialize("sim0").await.unwrap();

        orch.enable(1, true).await.unwrap();
        orch.move_absolute(1, 100, 20_000, 1000, 1000, Some(Duration::from_secs(2)))
            .await
            .unwrap();

        let status = orch.get_status();
        assert_eq!(status.drive_states[0].actual_position, 100);
        orch.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn enable_is_idempotent_and_does_not_enqueue() {
        let orch = orchestrator(1);
        orch.initialize("sim0").await.unwrap();
        orch.enable(1, true).await.unwrap();
        // Second call observes the same state and short-circuits.
        orch.enable(1, true).await.unwrap();
        orch.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn stop_latches_and_reset_clears_it() {
        let orch = orchestrator(1);
        orch.initialize("sim0").await.unwrap();
        orch.enable(1, true).await.unwrap();

        orch.stop(1).await.unwrap();
        let err = orch.move_absolute(1, 100, 10, 10, 10, None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Latched { slave: 1 }));

        orch.reset(1).await.unwrap();
        // Latch cleared; still not ready to move (encoder/closed-loop not
        // asserted by the simulated adapter on reset) but no longer latched.
        let err = orch.move_absolute(1, 100, 10, 10, 10, None).await.unwrap_err();
        assert!(!matches!(err, OrchestratorError::Latched { .. }));
        orch.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn index_is_idempotent_once_encoder_valid() {
        let orch = orchestrator(1);
        orch.initialize("sim0").await.unwrap();
        orch.enable(1, true).await.unwrap();
        orch.index(1, 1, 10_000, 100, 100, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        // Encoder now valid; a second index resolves without dispatch.
        orch.index(1, 1, 10_000, 100, 100, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        orch.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_callers_to_the_same_axis_serialize() {
        let orch = Arc::new(orchestrator(1));
        orch.initialize("sim0").await.unwrap();
        orch.enable(1, true).await.unwrap();

        let a = orch.clone();
        let b = orch.clone();
        let (r1, r2) = tokio::join!(
            a.move_absolute(1, 50, 20_000, 1000, 1000, Some(Duration::from_secs(2))),
            b.move_absolute(1, 100, 20_000, 1000, 1000, Some(Duration::from_secs(2))),
        );
        assert!(r1.is_ok());
        assert!(r2.is_ok());
        orch.shutdown().await.unwrap();
    }
}
