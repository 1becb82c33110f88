//! Course timing: the tick-loop engine, its controller handle, and the
//! signal-start sequence.
//!
//! [`TimingEngine`] owns construction; calling [`TimingEngine::start`]
//! consumes it, spawns the tick process, and returns an
//! [`Arc<TimingController>`](TimingController) through which callers
//! register riders, activate signal sequences, observe updates, and shut
//! the engine down.

mod config;
mod course;
mod engine;
pub(crate) mod error;
pub(crate) mod process;
mod sequencer;
mod state;

pub use config::TimingConfig;
pub use course::{CourseSnapshot, QueueEntry, RunStart};
pub use engine::{TimingController, TimingEngine};
pub use error::TimingError;
pub use state::{
    RiderEntry, TimingReader, TimingReceiver, TimingStatus, TimingUpdate,
};
