use chrono::Duration;
use tokio::time;

use crate::shared::TimingMode;

/// Configuration for the [`TimingEngine`](crate::timing::TimingEngine).
///
/// Gating values (`sensor_cooldown`, `next_start_interval`,
/// `goal_display_time`, `min_run_time`) are `chrono` durations because they
/// are compared against wall-clock timestamps inside the tick's critical
/// section; sleep values are `tokio` durations.
#[derive(Clone, Debug)]
pub struct TimingConfig {
    mode: TimingMode,
    tick_interval: time::Duration,
    sensor_cooldown: Duration,
    next_start_interval: Duration,
    goal_display_time: Duration,
    min_run_time: Duration,
    pre_stage_wait: time::Duration,
    stage_wait_min: time::Duration,
    stage_wait_max: time::Duration,
    stage_poll_interval: time::Duration,
    shutdown_timeout: time::Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            mode: TimingMode::Normal,
            tick_interval: time::Duration::from_millis(10),
            sensor_cooldown: Duration::milliseconds(3_000),
            next_start_interval: Duration::milliseconds(5_000),
            goal_display_time: Duration::milliseconds(5_000),
            min_run_time: Duration::milliseconds(3_000),
            pre_stage_wait: time::Duration::from_millis(2_000),
            stage_wait_min: time::Duration::from_millis(1_000),
            stage_wait_max: time::Duration::from_millis(2_500),
            stage_poll_interval: time::Duration::from_millis(50),
            shutdown_timeout: time::Duration::from_secs(6),
        }
    }
}

impl TimingConfig {
    /// Returns a configuration for a signal-mode session.
    ///
    /// Signal sessions space releases further apart than normal sessions, so
    /// the start interval defaults to 10 seconds instead of 5.
    pub fn signal() -> Self {
        Self::default()
            .with_mode(TimingMode::Signal)
            .with_next_start_interval_ms(10_000)
    }

    /// Returns the operating mode.
    pub fn mode(&self) -> TimingMode {
        self.mode
    }

    /// Returns the tick loop period.
    pub fn tick_interval(&self) -> time::Duration {
        self.tick_interval
    }

    /// Returns the dead time after a stop trigger during which further stop
    /// edges are ignored.
    pub fn sensor_cooldown(&self) -> Duration {
        self.sensor_cooldown
    }

    /// Returns the minimum interval between releases while riders are on
    /// course.
    pub fn next_start_interval(&self) -> Duration {
        self.next_start_interval
    }

    /// Returns how long a finished run stays on display before the current
    /// runner advances.
    pub fn goal_display_time(&self) -> Duration {
        self.goal_display_time
    }

    /// Returns the minimum run duration below which a stop edge is treated
    /// as spurious.
    pub fn min_run_time(&self) -> Duration {
        self.min_run_time
    }

    /// Returns the fixed red-stage hold.
    pub fn pre_stage_wait(&self) -> time::Duration {
        self.pre_stage_wait
    }

    /// Returns the lower bound of the randomized yellow-stage hold.
    pub fn stage_wait_min(&self) -> time::Duration {
        self.stage_wait_min
    }

    /// Returns the upper bound of the randomized yellow-stage hold.
    pub fn stage_wait_max(&self) -> time::Duration {
        self.stage_wait_max
    }

    /// Returns the sub-interval at which the sequence task polls for a
    /// false-start interruption during the yellow hold.
    pub fn stage_poll_interval(&self) -> time::Duration {
        self.stage_poll_interval
    }

    /// Returns how long `shutdown` waits for the tick loop to stop before
    /// aborting it.
    pub fn shutdown_timeout(&self) -> time::Duration {
        self.shutdown_timeout
    }

    /// Sets the operating mode.
    pub fn with_mode(mut self, mode: TimingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the tick loop period, in milliseconds.
    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval = time::Duration::from_millis(ms);
        self
    }

    /// Sets the stop-sensor cooldown, in milliseconds.
    pub fn with_sensor_cooldown_ms(mut self, ms: u64) -> Self {
        self.sensor_cooldown = Duration::milliseconds(ms as i64);
        self
    }

    /// Sets the minimum interval between releases, in milliseconds.
    pub fn with_next_start_interval_ms(mut self, ms: u64) -> Self {
        self.next_start_interval = Duration::milliseconds(ms as i64);
        self
    }

    /// Sets the display hold after a finished run, in milliseconds.
    pub fn with_goal_display_time_ms(mut self, ms: u64) -> Self {
        self.goal_display_time = Duration::milliseconds(ms as i64);
        self
    }

    /// Sets the minimum run duration, in milliseconds.
    pub fn with_min_run_time_ms(mut self, ms: u64) -> Self {
        self.min_run_time = Duration::milliseconds(ms as i64);
        self
    }

    /// Sets the fixed red-stage hold, in milliseconds.
    pub fn with_pre_stage_wait_ms(mut self, ms: u64) -> Self {
        self.pre_stage_wait = time::Duration::from_millis(ms);
        self
    }

    /// Sets the randomized yellow-stage hold range, in milliseconds.
    pub fn with_stage_wait_range_ms(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.stage_wait_min = time::Duration::from_millis(min_ms);
        self.stage_wait_max = time::Duration::from_millis(max_ms.max(min_ms));
        self
    }

    /// Sets the yellow-hold interruption poll interval, in milliseconds.
    pub fn with_stage_poll_interval_ms(mut self, ms: u64) -> Self {
        self.stage_poll_interval = time::Duration::from_millis(ms);
        self
    }

    /// Sets the shutdown timeout, in seconds.
    pub fn with_shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.shutdown_timeout = time::Duration::from_secs(secs);
        self
    }
}

/// The subset of [`TimingConfig`] the controller needs after the engine has
/// started: shutdown handling, activation gating, and the sequence timings.
#[derive(Clone, Debug)]
pub(super) struct TimingControllerConfig {
    pub mode: TimingMode,
    pub next_start_interval: Duration,
    pub pre_stage_wait: time::Duration,
    pub stage_wait_min: time::Duration,
    pub stage_wait_max: time::Duration,
    pub stage_poll_interval: time::Duration,
    pub shutdown_timeout: time::Duration,
}

impl From<&TimingConfig> for TimingControllerConfig {
    fn from(config: &TimingConfig) -> Self {
        Self {
            mode: config.mode,
            next_start_interval: config.next_start_interval,
            pre_stage_wait: config.pre_stage_wait,
            stage_wait_min: config.stage_wait_min,
            stage_wait_max: config.stage_wait_max,
            stage_poll_interval: config.stage_poll_interval,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

/// The subset of [`TimingConfig`] consulted inside the tick's critical
/// section, passed by reference into `CourseState::apply_tick`.
#[derive(Clone, Debug)]
pub(crate) struct TimingProcessConfig {
    pub tick_interval: time::Duration,
    pub sensor_cooldown: Duration,
    pub next_start_interval: Duration,
    pub goal_display_time: Duration,
    pub min_run_time: Duration,
}

impl From<&TimingConfig> for TimingProcessConfig {
    fn from(config: &TimingConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            sensor_cooldown: config.sensor_cooldown,
            next_start_interval: config.next_start_interval,
            goal_display_time: config.goal_display_time,
            min_run_time: config.min_run_time,
        }
    }
}
