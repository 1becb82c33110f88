use thiserror::Error;

use tokio::{sync::broadcast::error, task::JoinError};

/// Fatal errors that stop the timing process.
///
/// The tick loop itself has no recoverable failure modes: sensor reads are
/// infallible by contract and record-store failures are logged without
/// interrupting timing. These variants cover the shutdown path only.
#[derive(Error, Debug)]
pub enum TimingProcessFatalError {
    #[error("Failed to send shutdown signal to the timing process: {0}")]
    SendShutdownSignalFailed(error::SendError<()>),

    #[error("Failed to receive shutdown signal: {0}")]
    ShutdownSignalRecv(error::RecvError),

    #[error("Timing process task join error: {0}")]
    TimingProcessTaskJoin(JoinError),

    #[error("Timing process did not stop within the shutdown timeout")]
    ShutdownTimeout,
}
