use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time,
};

use crate::{
    record::RecordStore,
    sensor::SensorSource,
    shared::{SignalStage, TimingMode},
    util::AbortOnDropHandle,
};

use super::{
    config::{TimingConfig, TimingControllerConfig},
    course::{CourseSnapshot, CourseState},
    error::{Result, TimingError},
    process::{TimingProcess, error::TimingProcessFatalError},
    sequencer::SignalSequence,
    state::{
        RiderEntry, TimingReader, TimingReceiver, TimingStatus, TimingStatusManager,
        TimingTransmitter, TimingUpdate,
    },
};

/// Controller for a running timing process.
///
/// `TimingController` is the single handle through which riders are
/// registered, signal sequences are activated, display snapshots are
/// polled, and the process is shut down.
#[derive(Debug)]
pub struct TimingController {
    config: TimingControllerConfig,
    course: Arc<Mutex<CourseState>>,
    handle: Mutex<Option<AbortOnDropHandle<()>>>,
    sequence_handle: Mutex<Option<AbortOnDropHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
    status_manager: Arc<TimingStatusManager>,
    update_tx: TimingTransmitter,
}

impl TimingController {
    fn new(
        config: &TimingConfig,
        course: Arc<Mutex<CourseState>>,
        handle: AbortOnDropHandle<()>,
        shutdown_tx: broadcast::Sender<()>,
        status_manager: Arc<TimingStatusManager>,
        update_tx: TimingTransmitter,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: config.into(),
            course,
            handle: Mutex::new(Some(handle)),
            sequence_handle: Mutex::new(None),
            shutdown_tx,
            status_manager,
            update_tx,
        })
    }

    fn lock_course(&self) -> MutexGuard<'_, CourseState> {
        self.course
            .lock()
            .expect("`CourseState` mutex can't be poisoned")
    }

    /// Returns a [`TimingReader`] interface for accessing process status and
    /// updates.
    pub fn reader(&self) -> Arc<dyn TimingReader> {
        self.status_manager.clone()
    }

    /// Creates a new [`TimingReceiver`] for subscribing to status changes
    /// and run milestones.
    pub fn update_receiver(&self) -> TimingReceiver {
        self.status_manager.update_receiver()
    }

    /// Returns the current [`TimingStatus`] as a snapshot.
    pub fn status_snapshot(&self) -> TimingStatus {
        self.status_manager.status_snapshot()
    }

    /// Returns the current display state as an immutable snapshot.
    pub fn course_snapshot(&self) -> CourseSnapshot {
        self.lock_course().snapshot()
    }

    /// Registers a rider into the waiting queue.
    ///
    /// Returns `false` when the id matches the queue tail or a rider still
    /// on course; accepted registrations are broadcast to subscribers.
    pub fn register_rider(&self, name: &str, id: &str, vehicle: &str) -> bool {
        let accepted = self.lock_course().register(name, id, vehicle);

        if accepted {
            let entry = RiderEntry {
                name: name.to_string(),
                id: id.to_string(),
                vehicle: vehicle.to_string(),
            };

            log::info!("Registered: {entry}");

            let _ = self.update_tx.send(TimingUpdate::RiderRegistered(entry));
        } else {
            log::debug!("Registration ignored for duplicate id {id}");
        }

        accepted
    }

    /// Handles a registration entry, including the queue-head re-touch
    /// shortcut: in signal mode, a second read of the tag already at the
    /// head of the queue forces a sequence start instead of re-registering.
    pub fn handle_entry(&self, name: &str, id: &str, vehicle: &str) {
        if self.config.mode == TimingMode::Signal {
            let is_retouch = {
                let course = self.lock_course();
                course.queue_head_id() == Some(id) && course.signal_stage() == SignalStage::Idle
            };

            if is_retouch {
                log::info!("Queue head re-touch by id {id}: forcing sequence start");

                if let Err(e) = self.start_signal_sequence(true) {
                    log::warn!("Forced sequence start rejected: {e}");
                }

                return;
            }
        }

        self.register_rider(name, id, vehicle);
    }

    /// Activates the red/yellow/green start sequence.
    ///
    /// `force` bypasses the release-interval gate only; mode, queue, and
    /// single-sequence checks always apply. The sequence runs as its own
    /// task and this method returns as soon as the red stage is committed.
    pub fn start_signal_sequence(&self, force: bool) -> Result<()> {
        {
            let mut course = self.lock_course();

            course.validate_sequence_start(Utc::now(), force, self.config.next_start_interval)?;
            course.begin_sequence();
        }

        log::info!("Red signal: sequence started");

        let handle = SignalSequence::spawn(&self.config, self.course.clone());

        // Replacing a finished handle is a no-op abort.
        *self
            .sequence_handle
            .lock()
            .expect("`TimingController` mutex can't be poisoned") = Some(handle);

        Ok(())
    }

    fn try_consume_handle(&self) -> Option<AbortOnDropHandle<()>> {
        self.handle
            .lock()
            .expect("`TimingController` mutex can't be poisoned")
            .take()
    }

    /// Tries to perform a clean shutdown of the timing process and consumes
    /// the task handle.
    ///
    /// A pending signal sequence is aborted first. If a clean shutdown
    /// fails, the process is aborted. This method can only be called once
    /// per controller instance.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(mut handle) = self.try_consume_handle() else {
            return Err(TimingError::TimingAlreadyShutdown);
        };

        if handle.is_finished() {
            let status = self.status_manager.status_snapshot();
            return Err(TimingError::TimingAlreadyTerminated(status));
        }

        self.status_manager.update(TimingStatus::ShutdownInitiated);

        // Drop aborts the sequence task if one is still pending.
        drop(
            self.sequence_handle
                .lock()
                .expect("`TimingController` mutex can't be poisoned")
                .take(),
        );

        let shutdown_send_res = self.shutdown_tx.send(()).map_err(|e| {
            handle.abort();
            TimingProcessFatalError::SendShutdownSignalFailed(e)
        });

        let shutdown_res = match shutdown_send_res {
            Ok(_) => {
                tokio::select! {
                    join_res = &mut handle => {
                        join_res.map_err(TimingProcessFatalError::TimingProcessTaskJoin)
                    }
                    _ = time::sleep(self.config.shutdown_timeout) => {
                        handle.abort();
                        Err(TimingProcessFatalError::ShutdownTimeout)
                    }
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = shutdown_res {
            let e_ref = Arc::new(e);
            self.status_manager.update(e_ref.clone().into());

            return Err(TimingError::TimingShutdownFailed(e_ref));
        }

        self.status_manager.update(TimingStatus::Shutdown);
        Ok(())
    }

    /// Waits until the timing process has stopped and returns the final
    /// status.
    pub async fn until_stopped(&self) -> TimingStatus {
        let mut update_rx = self.update_receiver();

        let status = self.status_snapshot();
        if status.is_stopped() {
            return status;
        }

        loop {
            match update_rx.recv().await {
                Ok(update) => {
                    if let TimingUpdate::Status(status) = update
                        && status.is_stopped()
                    {
                        return status;
                    }
                }
                Err(RecvError::Lagged(_)) => {
                    let status = self.status_snapshot();
                    if status.is_stopped() {
                        return status;
                    }
                }
                Err(RecvError::Closed) => return self.status_snapshot(),
            }
        }
    }
}

/// Builder for configuring and starting a timing engine.
///
/// `TimingEngine` encapsulates the configuration, sensor source, and record
/// store. The timing process is spawned when [`start`](Self::start) is
/// called, and a [`TimingController`] is returned for management.
pub struct TimingEngine {
    config: TimingConfig,
    sensors: Arc<dyn SensorSource>,
    record_store: Arc<dyn RecordStore>,
    status_manager: Arc<TimingStatusManager>,
    update_tx: TimingTransmitter,
}

impl TimingEngine {
    /// Creates a new timing engine with the given configuration, sensor
    /// source, and record store.
    pub fn new(
        config: impl Into<TimingConfig>,
        sensors: Arc<dyn SensorSource>,
        record_store: Arc<dyn RecordStore>,
    ) -> Self {
        let (update_tx, _) = broadcast::channel::<TimingUpdate>(1_000);

        let status_manager = TimingStatusManager::new(update_tx.clone());

        Self {
            config: config.into(),
            sensors,
            record_store,
            status_manager,
            update_tx,
        }
    }

    /// Returns a reader interface for accessing process status and updates.
    pub fn reader(&self) -> Arc<dyn TimingReader> {
        self.status_manager.clone()
    }

    /// Creates a new receiver for subscribing to status changes and run
    /// milestones.
    pub fn update_receiver(&self) -> TimingReceiver {
        self.status_manager.update_receiver()
    }

    /// Returns the current timing status as a snapshot.
    pub fn status_snapshot(&self) -> TimingStatus {
        self.status_manager.status_snapshot()
    }

    /// Starts the timing process and returns a [`TimingController`] for
    /// managing it.
    ///
    /// This consumes the engine and spawns the tick loop in the background.
    pub fn start(self) -> Arc<TimingController> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let course = Arc::new(Mutex::new(CourseState::new(self.config.mode())));

        let handle = TimingProcess::spawn(
            &self.config,
            course.clone(),
            self.sensors,
            self.record_store,
            shutdown_tx.clone(),
            self.status_manager.clone(),
            self.update_tx.clone(),
        );

        TimingController::new(
            &self.config,
            course,
            handle,
            shutdown_tx,
            self.status_manager,
            self.update_tx,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::{Duration, sleep};

    use crate::{
        record::MemoryRecordStore,
        sensor::PulseSensor,
        shared::SignalStage,
        timing::{TimingConfig, TimingError, TimingStatus, TimingUpdate},
    };

    use super::TimingEngine;

    fn fast_config() -> TimingConfig {
        TimingConfig::default()
            .with_tick_interval_ms(5)
            .with_sensor_cooldown_ms(100)
            .with_next_start_interval_ms(150)
            .with_goal_display_time_ms(100)
            .with_min_run_time_ms(50)
    }

    fn fast_signal_config() -> TimingConfig {
        fast_config()
            .with_mode(crate::shared::TimingMode::Signal)
            .with_pre_stage_wait_ms(30)
            .with_stage_wait_range_ms(30, 30)
            .with_stage_poll_interval_ms(5)
    }

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn starts_and_shuts_down() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let engine = TimingEngine::new(fast_config(), sensors, store);

            assert!(matches!(
                engine.status_snapshot(),
                TimingStatus::NotInitiated
            ));

            let controller = engine.start();
            sleep(Duration::from_millis(50)).await;

            assert!(matches!(
                controller.status_snapshot(),
                TimingStatus::Running
            ));

            controller.shutdown().await.unwrap();
            assert!(matches!(
                controller.status_snapshot(),
                TimingStatus::Shutdown
            ));
        }

        #[tokio::test]
        async fn second_shutdown_is_rejected() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let controller = TimingEngine::new(fast_config(), sensors, store).start();
            sleep(Duration::from_millis(50)).await;

            controller.shutdown().await.unwrap();

            let result = controller.shutdown().await;
            assert!(matches!(result, Err(TimingError::TimingAlreadyShutdown)));
        }

        #[tokio::test]
        async fn until_stopped_returns_final_status() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let controller = TimingEngine::new(fast_config(), sensors, store).start();
            sleep(Duration::from_millis(50)).await;

            let waiter = controller.clone();
            let waited = tokio::spawn(async move { waiter.until_stopped().await });

            controller.shutdown().await.unwrap();

            let status = waited.await.unwrap();
            assert!(status.is_stopped());
        }
    }

    mod runs {
        use super::*;

        #[tokio::test]
        async fn full_run_produces_a_record() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let controller =
                TimingEngine::new(fast_config(), sensors.clone(), store.clone()).start();
            let mut updates = controller.update_receiver();
            sleep(Duration::from_millis(50)).await;

            assert!(controller.register_rider("Aiko", "1001", "MT-09"));

            sensors.trigger_start();
            sleep(Duration::from_millis(80)).await;

            let snapshot = controller.course_snapshot();
            assert_eq!(snapshot.current_name, "Aiko");
            assert!(!snapshot.is_goal);

            sensors.trigger_stop();
            sleep(Duration::from_millis(50)).await;

            let snapshot = controller.course_snapshot();
            assert!(snapshot.is_goal);

            let records = store.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].rider_name(), "Aiko");
            assert!(!records[0].false_start());

            let mut seen_start = false;
            let mut seen_finish = false;
            while let Ok(update) = updates.try_recv() {
                match update {
                    TimingUpdate::RunStarted(run) => {
                        assert_eq!(run.name, "Aiko");
                        seen_start = true;
                    }
                    TimingUpdate::RunFinished(record) => {
                        assert_eq!(record.rider_id(), "1001");
                        seen_finish = true;
                    }
                    _ => {}
                }
            }
            assert!(seen_start && seen_finish);

            controller.shutdown().await.unwrap();
        }

        #[tokio::test]
        async fn registration_broadcasts_entry() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let controller = TimingEngine::new(fast_config(), sensors, store).start();
            let mut updates = controller.update_receiver();
            sleep(Duration::from_millis(50)).await;

            assert!(controller.register_rider("Ben", "1002", "CB650R"));
            assert!(!controller.register_rider("Ben", "1002", "CB650R"));

            let mut registered = 0;
            while let Ok(update) = updates.try_recv() {
                if let TimingUpdate::RiderRegistered(entry) = update {
                    assert_eq!(entry.id, "1002");
                    registered += 1;
                }
            }
            assert_eq!(registered, 1);

            controller.shutdown().await.unwrap();
        }
    }

    mod sequence {
        use super::*;

        #[tokio::test]
        async fn rejected_in_normal_mode() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let controller = TimingEngine::new(fast_config(), sensors, store).start();
            sleep(Duration::from_millis(50)).await;

            controller.register_rider("Aiko", "1001", "MT-09");

            let result = controller.start_signal_sequence(false);
            assert!(matches!(result, Err(TimingError::SignalModeUnavailable)));

            controller.shutdown().await.unwrap();
        }

        #[tokio::test]
        async fn rejected_with_empty_queue() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let controller = TimingEngine::new(fast_signal_config(), sensors, store).start();
            sleep(Duration::from_millis(50)).await;

            let result = controller.start_signal_sequence(false);
            assert!(matches!(result, Err(TimingError::NoRidersWaiting)));

            controller.shutdown().await.unwrap();
        }

        #[tokio::test]
        async fn green_release_records_reaction() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let controller =
                TimingEngine::new(fast_signal_config(), sensors.clone(), store.clone()).start();
            sleep(Duration::from_millis(50)).await;

            controller.register_rider("Aiko", "1001", "MT-09");
            controller.start_signal_sequence(false).unwrap();

            let result = controller.start_signal_sequence(false);
            assert!(matches!(result, Err(TimingError::SequenceAlreadyActive)));

            // Red (30ms) + yellow (30ms), then the rider reacts.
            sleep(Duration::from_millis(100)).await;
            assert_eq!(controller.course_snapshot().signal_stage, SignalStage::Green);

            sensors.trigger_start();
            sleep(Duration::from_millis(80)).await;

            sensors.trigger_stop();
            sleep(Duration::from_millis(50)).await;

            let records = store.records();
            assert_eq!(records.len(), 1);
            assert!(!records[0].false_start());
            assert!(records[0].reaction_time().is_some());

            controller.shutdown().await.unwrap();
        }

        #[tokio::test]
        async fn early_pass_is_false_start() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let controller =
                TimingEngine::new(fast_signal_config(), sensors.clone(), store.clone()).start();
            sleep(Duration::from_millis(50)).await;

            controller.register_rider("Aiko", "1001", "MT-09");
            controller.start_signal_sequence(false).unwrap();

            // Pass during the red stage.
            sensors.trigger_start();
            sleep(Duration::from_millis(80)).await;

            let snapshot = controller.course_snapshot();
            assert_eq!(snapshot.current_name, "Aiko");

            sensors.trigger_stop();
            sleep(Duration::from_millis(50)).await;

            let records = store.records();
            assert_eq!(records.len(), 1);
            assert!(records[0].false_start());
            assert_eq!(records[0].status_label(), "FALSE START");

            controller.shutdown().await.unwrap();
        }

        #[tokio::test]
        async fn head_retouch_forces_sequence() {
            let sensors = Arc::new(PulseSensor::new());
            let store = Arc::new(MemoryRecordStore::new());
            let controller = TimingEngine::new(fast_signal_config(), sensors, store).start();
            sleep(Duration::from_millis(50)).await;

            controller.handle_entry("Aiko", "1001", "MT-09");
            assert_eq!(controller.course_snapshot().queue_len, 1);

            controller.handle_entry("Aiko", "1001", "MT-09");

            let snapshot = controller.course_snapshot();
            assert_eq!(snapshot.queue_len, 1);
            assert_eq!(snapshot.signal_stage, SignalStage::Red);

            controller.shutdown().await.unwrap();
        }
    }
}
