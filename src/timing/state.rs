use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::broadcast;

use crate::record::RunRecord;

use super::{course::RunStart, process::error::TimingProcessFatalError};

/// Lifecycle status of the timing process.
#[derive(Debug, Clone)]
pub enum TimingStatus {
    /// Timing process has not been started yet.
    NotInitiated,
    /// Timing process is initializing.
    Starting,
    /// Tick loop is running and sensors are being observed.
    Running,
    /// Shutdown has been requested and is in progress.
    ShutdownInitiated,
    /// Timing process has been gracefully shut down.
    Shutdown,
    /// Timing process terminated due to a fatal error.
    Terminated(Arc<TimingProcessFatalError>),
}

impl TimingStatus {
    /// Returns `true` if the timing process has stopped (either shut down or
    /// terminated).
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Shutdown | Self::Terminated(_))
    }
}

impl fmt::Display for TimingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitiated => write!(f, "Not initiated"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::ShutdownInitiated => write!(f, "Shutdown initiated"),
            Self::Shutdown => write!(f, "Shutdown"),
            Self::Terminated(error) => write!(f, "Terminated: {error}"),
        }
    }
}

impl From<Arc<TimingProcessFatalError>> for TimingStatus {
    fn from(value: Arc<TimingProcessFatalError>) -> Self {
        Self::Terminated(value)
    }
}

impl From<TimingProcessFatalError> for TimingStatus {
    fn from(value: TimingProcessFatalError) -> Self {
        Arc::new(value).into()
    }
}

/// A rider accepted into the waiting queue.
#[derive(Debug, Clone)]
pub struct RiderEntry {
    pub name: String,
    pub id: String,
    pub vehicle: String,
}

impl fmt::Display for RiderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ID:{}, Vehicle:{})", self.name, self.id, self.vehicle)
    }
}

/// Update events emitted by the timing process.
///
/// These updates are broadcast to subscribers alongside the polled
/// snapshot, and include status changes and run milestones.
#[derive(Debug, Clone)]
pub enum TimingUpdate {
    /// Timing process status has changed.
    Status(TimingStatus),
    /// A rider was registered into the waiting queue.
    RiderRegistered(RiderEntry),
    /// A rider was released onto the course.
    RunStarted(RunStart),
    /// A run was finalized and its record produced.
    RunFinished(RunRecord),
}

impl From<TimingStatus> for TimingUpdate {
    fn from(value: TimingStatus) -> Self {
        Self::Status(value)
    }
}

pub(crate) type TimingTransmitter = broadcast::Sender<TimingUpdate>;

/// Receiver for subscribing to [`TimingUpdate`]s.
pub type TimingReceiver = broadcast::Receiver<TimingUpdate>;

/// Trait for reading timing process status and subscribing to updates.
///
/// Provides a read-only interface to the process state without the ability
/// to control or modify it.
pub trait TimingReader: Send + Sync + 'static {
    /// Creates a new [`TimingReceiver`] for subscribing to timing updates.
    fn update_receiver(&self) -> TimingReceiver;

    /// Returns the current [`TimingStatus`] as a snapshot.
    fn status_snapshot(&self) -> TimingStatus;
}

#[derive(Debug)]
pub(crate) struct TimingStatusManager {
    status: Mutex<TimingStatus>,
    update_tx: TimingTransmitter,
}

impl TimingStatusManager {
    pub fn new(update_tx: TimingTransmitter) -> Arc<Self> {
        let status = Mutex::new(TimingStatus::NotInitiated);

        Arc::new(Self { status, update_tx })
    }

    fn lock_status(&self) -> MutexGuard<'_, TimingStatus> {
        self.status
            .lock()
            .expect("`TimingStatusManager` mutex can't be poisoned")
    }

    pub fn update(&self, new_status: TimingStatus) {
        let mut status_guard = self.lock_status();
        *status_guard = new_status.clone();
        drop(status_guard);

        // Ignore no-receivers errors
        let _ = self.update_tx.send(new_status.into());
    }
}

impl TimingReader for TimingStatusManager {
    fn update_receiver(&self) -> TimingReceiver {
        self.update_tx.subscribe()
    }

    fn status_snapshot(&self) -> TimingStatus {
        self.lock_status().clone()
    }
}
