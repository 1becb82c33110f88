use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

/// Seam between the tick loop and the physical start/stop hardware.
///
/// Implementations report the *level* of each sensor; edge handling and
/// debouncing live in the timing transitions, so reads must be cheap and
/// infallible. Hardware adapters (GPIO, serial light barriers) implement
/// this on their own; [`PulseSensor`] covers keyboard and remote operation.
pub trait SensorSource: Send + Sync + 'static {
    /// Returns `true` while the start sensor is interrupted.
    fn start_active(&self) -> bool;

    /// Returns `true` while the stop sensor is interrupted.
    fn stop_active(&self) -> bool;
}

/// A software sensor that turns one-shot triggers into short active pulses.
///
/// Each trigger holds the corresponding channel active for the pulse width,
/// long enough for the tick loop to observe it at its own period.
#[derive(Debug)]
pub struct PulseSensor {
    pulse_width: Duration,
    start_until: Mutex<Option<DateTime<Utc>>>,
    stop_until: Mutex<Option<DateTime<Utc>>>,
}

impl Default for PulseSensor {
    fn default() -> Self {
        Self {
            pulse_width: Duration::milliseconds(200),
            start_until: Mutex::new(None),
            stop_until: Mutex::new(None),
        }
    }
}

impl PulseSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pulse width, in milliseconds.
    pub fn with_pulse_width_ms(mut self, ms: u64) -> Self {
        self.pulse_width = Duration::milliseconds(ms as i64);
        self
    }

    fn lock_channel<'a>(
        channel: &'a Mutex<Option<DateTime<Utc>>>,
    ) -> MutexGuard<'a, Option<DateTime<Utc>>> {
        channel
            .lock()
            .expect("`PulseSensor` mutex can't be poisoned")
    }

    /// Activates the start channel for one pulse width.
    pub fn trigger_start(&self) {
        *Self::lock_channel(&self.start_until) = Some(Utc::now() + self.pulse_width);
    }

    /// Activates the stop channel for one pulse width.
    pub fn trigger_stop(&self) {
        *Self::lock_channel(&self.stop_until) = Some(Utc::now() + self.pulse_width);
    }

    fn channel_active(channel: &Mutex<Option<DateTime<Utc>>>) -> bool {
        Self::lock_channel(channel).is_some_and(|until| Utc::now() < until)
    }
}

impl SensorSource for PulseSensor {
    fn start_active(&self) -> bool {
        Self::channel_active(&self.start_until)
    }

    fn stop_active(&self) -> bool {
        Self::channel_active(&self.stop_until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod pulse_sensor {
        use super::*;

        #[test]
        fn idle_by_default() {
            let sensor = PulseSensor::new();

            assert!(!sensor.start_active());
            assert!(!sensor.stop_active());
        }

        #[test]
        fn channels_are_independent() {
            let sensor = PulseSensor::new();

            sensor.trigger_start();

            assert!(sensor.start_active());
            assert!(!sensor.stop_active());
        }

        #[test]
        fn pulse_lapses_after_width() {
            let sensor = PulseSensor::new().with_pulse_width_ms(10);

            sensor.trigger_stop();
            assert!(sensor.stop_active());

            std::thread::sleep(std::time::Duration::from_millis(25));
            assert!(!sensor.stop_active());
        }

        #[test]
        fn retrigger_extends_pulse() {
            let sensor = PulseSensor::new().with_pulse_width_ms(30);

            sensor.trigger_start();
            std::thread::sleep(std::time::Duration::from_millis(20));
            sensor.trigger_start();
            std::thread::sleep(std::time::Duration::from_millis(20));

            assert!(sensor.start_active());
        }
    }
}
