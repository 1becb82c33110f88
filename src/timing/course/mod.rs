use std::collections::VecDeque;

use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;

use crate::{
    record::RunRecord,
    shared::{RunStatus, SignalStage, TimingMode, format_seconds},
};

use super::{config::TimingProcessConfig, error::TimingError};


/// Placeholder shown when no runner is on display.
const NO_RUNNER: &str = "---";

/// Placeholder shown while no reaction time is available.
const NO_REACTION: &str = "---";

/// A registered rider, from queue entry to finalization.
#[derive(Debug, Clone)]
pub(crate) struct Rider {
    pub name: String,
    pub id: String,
    pub vehicle: String,
    pub status: RunStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub result_time: Option<Duration>,
    pub reaction_time: Option<Duration>,
    pub false_start: bool,
}

impl Rider {
    fn waiting(name: &str, id: &str, vehicle: &str) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
            vehicle: vehicle.to_string(),
            status: RunStatus::Waiting,
            start_time: None,
            result_time: None,
            reaction_time: None,
            false_start: false,
        }
    }
}

/// A rider released onto the course, as broadcast to update subscribers.
#[derive(Debug, Clone)]
pub struct RunStart {
    pub name: String,
    pub id: String,
    pub vehicle: String,
    pub false_start: bool,
    /// Reaction time for a green-stage release; `None` in normal mode and
    /// for false starts.
    pub reaction_time: Option<Duration>,
}

impl From<&Rider> for RunStart {
    fn from(rider: &Rider) -> Self {
        Self {
            name: rider.name.clone(),
            id: rider.id.clone(),
            vehicle: rider.vehicle.clone(),
            false_start: rider.false_start,
            reaction_time: rider.reaction_time,
        }
    }
}

/// One waiting rider in the snapshot's queue listing.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub name: String,
    pub vehicle: String,
}

/// Immutable display snapshot, built by value under the course lock.
///
/// The UI polls this on its own cadence and never holds the lock during
/// rendering.
#[derive(Debug, Clone, Serialize)]
pub struct CourseSnapshot {
    /// Name of the runner on display, `---` when none.
    pub current_name: String,
    pub current_id: String,
    pub current_vehicle: String,
    /// Elapsed or final time as 3-decimal seconds text.
    pub elapsed: String,
    pub is_goal: bool,
    pub queue: Vec<QueueEntry>,
    pub queue_len: usize,
    /// Start sensor status text (`READY`, `ACTIVE!`, `WAIT (Ns)`, ...).
    pub start_status: String,
    /// Stop sensor status text (`READY`, `ACTIVE!`, `COOLDOWN`).
    pub stop_status: String,
    pub signal_stage: SignalStage,
    /// Reaction time text, `---` when none is on display.
    pub reaction: String,
    pub is_false: bool,
}

/// Per-tick transition results, handed back to the process so that logging,
/// update broadcasting, and persistence all happen after the lock is
/// released.
#[derive(Debug, Default)]
pub(crate) struct TickOutcome {
    pub started: Option<RunStart>,
    pub finalized: Option<RunRecord>,
}

/// The one owned state struct behind the shared lock: waiting queue,
/// on-course runners, display state, gating timestamps, and the signal
/// stage.
///
/// All methods take `now` explicitly; the tick loop passes the wall clock
/// and tests pass synthetic instants.
#[derive(Debug)]
pub(crate) struct CourseState {
    mode: TimingMode,
    queue: VecDeque<Rider>,
    on_course: VecDeque<Rider>,
    /// Display copy of the runner currently shown; the authoritative entry
    /// for a running rider stays in `on_course`.
    current_runner: Option<Rider>,
    elapsed: Duration,
    goal_hold_expires_at: Option<DateTime<Utc>>,
    last_start_trigger: Option<DateTime<Utc>>,
    last_stop_trigger: Option<DateTime<Utc>>,
    last_valid_start: Option<DateTime<Utc>>,
    start_status_text: String,
    stop_status_text: String,
    signal_stage: SignalStage,
    signal_start_time: Option<DateTime<Utc>>,
    reaction_time: Option<Duration>,
}

impl CourseState {
    pub fn new(mode: TimingMode) -> Self {
        Self {
            mode,
            queue: VecDeque::new(),
            on_course: VecDeque::new(),
            current_runner: None,
            elapsed: Duration::zero(),
            goal_hold_expires_at: None,
            last_start_trigger: None,
            last_stop_trigger: None,
            last_valid_start: None,
            start_status_text: "READY".to_string(),
            stop_status_text: "READY".to_string(),
            signal_stage: SignalStage::Idle,
            signal_start_time: None,
            reaction_time: None,
        }
    }

    pub fn signal_stage(&self) -> SignalStage {
        self.signal_stage
    }

    pub fn queue_head_id(&self) -> Option<&str> {
        self.queue.front().map(|r| r.id.as_str())
    }

    /// Registers a rider into the waiting queue.
    ///
    /// Rejected when `id` matches the queue *tail* or any on-course runner.
    /// The tail-only queue check is an intentionally narrow anti-duplicate
    /// policy against a hardware tag being re-read moments after its own
    /// registration; it does not scan the full queue.
    pub fn register(&mut self, name: &str, id: &str, vehicle: &str) -> bool {
        if self.queue.back().is_some_and(|r| r.id == id) {
            return false;
        }

        if self.on_course.iter().any(|r| r.id == id) {
            return false;
        }

        self.queue.push_back(Rider::waiting(name, id, vehicle));
        true
    }

    /// Applies one tick of the engine: sensor gating, display-hold expiry,
    /// start and stop transitions, and the elapsed-time refresh.
    ///
    /// `start_active` / `stop_active` are the debounced hardware flags; the
    /// gating rules may force them inactive for this tick.
    pub fn apply_tick(
        &mut self,
        now: DateTime<Utc>,
        mut start_active: bool,
        mut stop_active: bool,
        config: &TimingProcessConfig,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        self.refresh_start_status(now, &mut start_active, config);
        self.refresh_stop_status(now, &mut stop_active, config);

        self.expire_display_hold(now);

        match self.mode {
            TimingMode::Normal => {
                if start_active {
                    outcome.started = self.release_from_queue(now);
                }
            }
            TimingMode::Signal => {
                if start_active {
                    outcome.started = self.release_by_stage(now);
                }
            }
        }

        if stop_active {
            outcome.finalized = self.finalize_front_runner(now, config);
        }

        if let Some(current) = &self.current_runner
            && current.status == RunStatus::Running
            && let Some(started_at) = current.start_time
        {
            self.elapsed = now - started_at;
        }

        outcome
    }

    /// Recomputes the start-sensor status text and applies release gating:
    /// while riders are on course and the start interval has not elapsed,
    /// the start signal is forced inactive regardless of hardware state.
    fn refresh_start_status(
        &mut self,
        now: DateTime<Utc>,
        start_active: &mut bool,
        config: &TimingProcessConfig,
    ) {
        // Normal mode gates on the last release; signal mode gates on the
        // last valid (sequence) start, and only while the lights are dark.
        let last_reference = match self.mode {
            TimingMode::Normal => self.last_start_trigger,
            TimingMode::Signal => self.last_valid_start,
        };

        if let Some(last) = last_reference
            && now - last < config.next_start_interval
            && !self.on_course.is_empty()
        {
            // A lit stage overrides the wait display; the release stays
            // armed so the stage branches can act on the edge.
            if self.mode == TimingMode::Signal && self.signal_stage != SignalStage::Idle {
                self.start_status_text = "READY (SIG)".to_string();
                return;
            }

            let remaining = (config.next_start_interval - (now - last)).num_seconds();
            self.start_status_text = format!("WAIT ({remaining}s)");
            *start_active = false;
        } else if *start_active {
            self.start_status_text = "ACTIVE!".to_string();
        } else {
            self.start_status_text = "READY".to_string();
        }
    }

    /// Recomputes the stop-sensor status text and applies the cooldown:
    /// one physical pass must not trigger two logical goals.
    fn refresh_stop_status(
        &mut self,
        now: DateTime<Utc>,
        stop_active: &mut bool,
        config: &TimingProcessConfig,
    ) {
        let cooling_down = self
            .last_stop_trigger
            .is_some_and(|last| now - last < config.sensor_cooldown);

        if cooling_down {
            self.stop_status_text = "COOLDOWN".to_string();
            *stop_active = false;
        } else if *stop_active {
            self.stop_status_text = "ACTIVE!".to_string();
        } else {
            self.stop_status_text = "READY".to_string();
        }
    }

    /// Advances the display once a finished run's hold period lapses: the
    /// most-recently-started runner still on course takes over, or the
    /// display clears. Signal mode additionally returns the lights to idle
    /// and drops the shown reaction time.
    fn expire_display_hold(&mut self, now: DateTime<Utc>) {
        let finished = self
            .current_runner
            .as_ref()
            .is_some_and(|r| matches!(r.status, RunStatus::Goal | RunStatus::False));

        if !finished {
            return;
        }

        let expired = self.goal_hold_expires_at.is_some_and(|at| now > at);
        if !expired {
            return;
        }

        self.current_runner = self.on_course.back().cloned();
        self.goal_hold_expires_at = None;

        if self.mode == TimingMode::Signal {
            self.elapsed = Duration::zero();
            self.signal_stage = SignalStage::Idle;
            self.reaction_time = None;
        }
    }

    /// Normal-mode start transition: pops the queue head, starts its clock
    /// at the trigger instant, and appends it to the on-course list.
    fn release_from_queue(&mut self, now: DateTime<Utc>) -> Option<RunStart> {
        let mut rider = self.queue.pop_front()?;

        self.last_start_trigger = Some(now);

        rider.status = RunStatus::Running;
        rider.start_time = Some(now);

        let started = RunStart::from(&rider);
        self.current_runner = Some(rider.clone());
        self.on_course.push_back(rider);

        Some(started)
    }

    /// Signal-mode start transition, branched on the current stage.
    ///
    /// Red/yellow: false start — the run is timed from the illegal pass and
    /// the stage is forced to `False`, which both aborts the pending
    /// sequence (observed by its poll) and begins timing. Green: the run is
    /// timed from the green light, so the elapsed time includes the
    /// reaction interval. Idle: the edge is ignored.
    fn release_by_stage(&mut self, now: DateTime<Utc>) -> Option<RunStart> {
        if self.queue.is_empty() {
            return None;
        }

        match self.signal_stage {
            SignalStage::Red | SignalStage::Yellow => {
                self.signal_stage = SignalStage::False;

                let mut rider = self.queue.pop_front()?;
                rider.status = RunStatus::Running;
                rider.start_time = Some(now);
                rider.false_start = true;

                let started = RunStart::from(&rider);
                self.current_runner = Some(rider.clone());
                self.on_course.push_back(rider);

                self.last_valid_start = Some(now);

                Some(started)
            }
            SignalStage::Green => {
                let green_at = self.signal_start_time?;
                let reaction = now - green_at;

                let mut rider = self.queue.pop_front()?;
                rider.status = RunStatus::Running;
                // The race clock zero is the green light, not the pass.
                rider.start_time = Some(green_at);
                rider.reaction_time = Some(reaction);

                let started = RunStart::from(&rider);
                self.reaction_time = Some(reaction);
                self.current_runner = Some(rider.clone());
                self.on_course.push_back(rider);

                self.last_valid_start = Some(now);
                self.signal_stage = SignalStage::Idle;

                Some(started)
            }
            SignalStage::Idle | SignalStage::False => None,
        }
    }

    /// Stop transition: finalizes the *oldest* on-course runner, provided
    /// its run has lasted longer than the minimum run time (filters
    /// spurious immediate re-triggers of the same pass).
    fn finalize_front_runner(
        &mut self,
        now: DateTime<Utc>,
        config: &TimingProcessConfig,
    ) -> Option<RunRecord> {
        let eligible_started_at = self
            .on_course
            .front()
            .and_then(|r| r.start_time)
            .filter(|&started_at| now - started_at > config.min_run_time)?;

        self.last_stop_trigger = Some(now);

        let mut runner = self.on_course.pop_front()?;
        let result = now - eligible_started_at;

        runner.result_time = Some(result);
        runner.status = if runner.false_start {
            RunStatus::False
        } else {
            RunStatus::Goal
        };

        self.elapsed = result;
        self.goal_hold_expires_at = Some(now + config.goal_display_time);

        let record = RunRecord::new(
            now.with_timezone(&Local),
            runner.name.clone(),
            runner.id.clone(),
            runner.vehicle.clone(),
            result,
            runner.reaction_time,
            runner.false_start,
            self.mode,
        );

        self.current_runner = Some(runner);

        Some(record)
    }

    /// Validates a sequence activation request under the lock.
    ///
    /// Rejections are signalled by value, never by blocking. The stage is
    /// the single-activation guard: it reads `Idle` only when no sequence
    /// is pending and no finished false start is still on display.
    pub fn validate_sequence_start(
        &self,
        now: DateTime<Utc>,
        force: bool,
        next_start_interval: Duration,
    ) -> Result<(), TimingError> {
        if self.mode != TimingMode::Signal {
            return Err(TimingError::SignalModeUnavailable);
        }

        if self.queue.is_empty() {
            return Err(TimingError::NoRidersWaiting);
        }

        if self.signal_stage != SignalStage::Idle {
            return Err(TimingError::SequenceAlreadyActive);
        }

        if !force
            && !self.on_course.is_empty()
            && let Some(last) = self.last_valid_start
            && now - last < next_start_interval
        {
            let remaining_secs = (next_start_interval - (now - last)).num_seconds();
            return Err(TimingError::StartIntervalGated { remaining_secs });
        }

        Ok(())
    }

    /// Commits the start of a validated sequence: red light on, stale
    /// reaction display cleared.
    pub fn begin_sequence(&mut self) {
        self.signal_stage = SignalStage::Red;
        self.signal_start_time = None;
        self.reaction_time = None;
    }

    /// Red → yellow, re-verified under the lock. Returns `false` when a
    /// false start already ended the sequence.
    pub fn try_advance_to_yellow(&mut self) -> bool {
        if self.signal_stage != SignalStage::Red {
            return false;
        }

        self.signal_stage = SignalStage::Yellow;
        true
    }

    /// Yellow → green, re-verified under the lock. On success `now` becomes
    /// the race-clock zero point for the next release.
    pub fn try_advance_to_green(&mut self, now: DateTime<Utc>) -> bool {
        if self.signal_stage != SignalStage::Yellow {
            return false;
        }

        self.signal_stage = SignalStage::Green;
        self.signal_start_time = Some(now);
        true
    }

    /// Returns `true` once a false start has ended the pending sequence;
    /// polled by the sequence task during its unlocked waits.
    pub fn sequence_interrupted(&self) -> bool {
        self.signal_stage == SignalStage::False
    }

    /// Builds the display snapshot by value.
    pub fn snapshot(&self) -> CourseSnapshot {
        let (current_name, current_id, current_vehicle, is_goal, is_false) =
            match &self.current_runner {
                Some(runner) => (
                    runner.name.clone(),
                    runner.id.clone(),
                    runner.vehicle.clone(),
                    matches!(runner.status, RunStatus::Goal | RunStatus::False),
                    runner.false_start,
                ),
                None => (
                    NO_RUNNER.to_string(),
                    String::new(),
                    String::new(),
                    false,
                    false,
                ),
            };

        let queue = self
            .queue
            .iter()
            .map(|r| QueueEntry {
                name: r.name.clone(),
                vehicle: r.vehicle.clone(),
            })
            .collect::<Vec<_>>();

        CourseSnapshot {
            current_name,
            current_id,
            current_vehicle,
            elapsed: format_seconds(self.elapsed),
            is_goal,
            queue_len: queue.len(),
            queue,
            start_status: self.start_status_text.clone(),
            stop_status: self.stop_status_text.clone(),
            signal_stage: self.signal_stage,
            reaction: self
                .reaction_time
                .map(format_seconds)
                .unwrap_or_else(|| NO_REACTION.to_string()),
            is_false,
        }
    }
}
