use chrono::Duration;
use serde::Serialize;
use strum::Display;

/// Operating mode of a timing session.
///
/// Mode is a configuration value: the same engine runs both modes, with
/// signal-mode behavior enabled by [`Signal`](Self::Signal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TimingMode {
    /// Riders are released directly by the start sensor.
    Normal,
    /// Riders are released through the red/yellow/green light sequence.
    Signal,
}

/// Lifecycle status of a rider.
///
/// Transitions are monotonic: `Waiting` → `Running` → `Goal` or `False`,
/// never reversed, never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// Registered and waiting in the queue.
    Waiting,
    /// On course, clock running.
    Running,
    /// Finished cleanly.
    Goal,
    /// Finished a run that began with a false start.
    False,
}

/// Process-wide state of the start-light sequence.
///
/// At most one sequence is active at a time; activation is only accepted
/// while the stage is [`Idle`](Self::Idle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStage {
    Idle,
    Red,
    Yellow,
    Green,
    /// A start edge arrived before green; the pending sequence aborts.
    False,
}

/// Formats a duration as seconds with fixed 3-decimal precision, the
/// format used by both the snapshot and the persisted record layout.
pub(crate) fn format_seconds(duration: Duration) -> String {
    format!("{:.3}", duration.num_milliseconds() as f64 / 1000.0)
}
