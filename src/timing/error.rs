use std::{result, sync::Arc};

use thiserror::Error;

use super::{process::error::TimingProcessFatalError, state::TimingStatus};

#[derive(Error, Debug)]
pub enum TimingError {
    #[error("Signal sequence unavailable: engine is running in NORMAL mode")]
    SignalModeUnavailable,

    #[error("Signal sequence not started: no riders waiting in the queue")]
    NoRidersWaiting,

    #[error("Signal sequence already active")]
    SequenceAlreadyActive,

    #[error("Start gated: next release allowed in {remaining_secs}s")]
    StartIntervalGated { remaining_secs: i64 },

    #[error("Timing process already shutdown error")]
    TimingAlreadyShutdown,

    #[error("Timing process already terminated error, status: {0}")]
    TimingAlreadyTerminated(TimingStatus),

    #[error("Timing shutdown procedure failed: {0}")]
    TimingShutdownFailed(Arc<TimingProcessFatalError>),
}

pub(super) type Result<T> = result::Result<T, TimingError>;
