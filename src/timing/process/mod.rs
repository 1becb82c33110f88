use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::{sync::broadcast, time};

use crate::{
    record::RecordStore,
    sensor::SensorSource,
    shared::format_seconds,
    util::{AbortOnDropHandle, Never},
};

use super::{
    config::{TimingConfig, TimingProcessConfig},
    course::CourseState,
    state::{TimingStatus, TimingStatusManager, TimingTransmitter, TimingUpdate},
};

pub(crate) mod error;

use error::TimingProcessFatalError;

/// The tick loop task: polls the sensors at a fixed period, applies the
/// transitions to the shared [`CourseState`], and publishes the results.
///
/// Persistence happens outside the course lock so a slow record store can
/// never stall timing.
pub(super) struct TimingProcess {
    config: TimingProcessConfig,
    course: Arc<Mutex<CourseState>>,
    sensors: Arc<dyn SensorSource>,
    record_store: Arc<dyn RecordStore>,
    shutdown_tx: broadcast::Sender<()>,
    status_manager: Arc<TimingStatusManager>,
    update_tx: TimingTransmitter,
}

impl TimingProcess {
    pub fn spawn(
        config: &TimingConfig,
        course: Arc<Mutex<CourseState>>,
        sensors: Arc<dyn SensorSource>,
        record_store: Arc<dyn RecordStore>,
        shutdown_tx: broadcast::Sender<()>,
        status_manager: Arc<TimingStatusManager>,
        update_tx: TimingTransmitter,
    ) -> AbortOnDropHandle<()> {
        let config = config.into();

        tokio::spawn(async move {
            let process = Self {
                config,
                course,
                sensors,
                record_store,
                shutdown_tx,
                status_manager,
                update_tx,
            };

            process.supervise().await
        })
        .into()
    }

    fn lock_course(&self) -> MutexGuard<'_, CourseState> {
        self.course
            .lock()
            .expect("`CourseState` mutex can't be poisoned")
    }

    async fn run(&self) -> Never {
        self.status_manager.update(TimingStatus::Running);

        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let start_active = self.sensors.start_active();
            let stop_active = self.sensors.stop_active();
            let now = Utc::now();

            let outcome = self
                .lock_course()
                .apply_tick(now, start_active, stop_active, &self.config);

            if let Some(started) = outcome.started {
                if started.false_start {
                    log::warn!("False start by {} ({})", started.name, started.vehicle);
                } else {
                    log::info!("Start: {} ({})", started.name, started.vehicle);
                }

                let _ = self.update_tx.send(TimingUpdate::RunStarted(started));
            }

            if let Some(record) = outcome.finalized {
                log::info!(
                    "Goal: {} in {}s [{}]",
                    record.rider_name(),
                    format_seconds(record.result_time()),
                    record.status_label(),
                );

                let _ = self
                    .update_tx
                    .send(TimingUpdate::RunFinished(record.clone()));

                // Persistence failures must not interrupt timing.
                if let Err(e) = self.record_store.append(&record).await {
                    log::warn!("Failed to persist run record: {e}");
                }
            }
        }
    }

    async fn supervise(self) {
        self.status_manager.update(TimingStatus::Starting);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::select! {
            never = self.run() => match never {},
            shutdown_res = shutdown_rx.recv() => {
                if let Err(e) = shutdown_res {
                    let status = TimingProcessFatalError::ShutdownSignalRecv(e).into();
                    self.status_manager.update(status);
                }
                // Shutdown signal received; the controller publishes the
                // final status once the join completes.
            }
        }
    }
}
