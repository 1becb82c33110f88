#![doc = include_str!("../README.md")]

/// Exports [`EntryListener`] and the registration wire format.
///
/// [`EntryListener`]: crate::entry::EntryListener
pub mod entry;
/// Exports [`RecordStore`] implementations for finished-run persistence.
///
/// [`RecordStore`]: crate::record::RecordStore
pub mod record;
/// Exports the [`SensorSource`] seam and the [`PulseSensor`] implementation.
///
/// [`SensorSource`]: crate::sensor::SensorSource
/// [`PulseSensor`]: crate::sensor::PulseSensor
pub mod sensor;
mod shared;
/// Exports [`TimingEngine`], [`TimingController`], and other types related
/// to the tick loop and the signal sequence.
///
/// [`TimingEngine`]: crate::timing::TimingEngine
/// [`TimingController`]: crate::timing::TimingController
pub mod timing;
mod util;

pub use timing::{TimingController, TimingEngine};

/// Error types returned by `gymkhana-timing`.
pub mod error {
    pub use super::entry::error::EntryError;
    pub use super::record::error::RecordError;
    pub use super::timing::{error::TimingError, process::error::TimingProcessFatalError};
}

/// Exports the rider data model and shared value types.
pub mod models {
    pub use super::record::RunRecord;
    pub use super::shared::{RunStatus, SignalStage, TimingMode};
    pub use super::timing::{CourseSnapshot, QueueEntry, RiderEntry, RunStart};
}
