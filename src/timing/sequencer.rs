use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rand::Rng;
use tokio::time;

use crate::util::AbortOnDropHandle;

use super::{config::TimingControllerConfig, course::CourseState};

/// The start-sequence task: red hold, randomized yellow hold, then green.
///
/// The task never holds the course lock while sleeping. Each stage advance
/// re-verifies the stage under the lock, so a false start detected by the
/// tick loop (which forces the stage to `False`) makes the next advance
/// refuse and the task finish early. The yellow hold additionally polls for
/// the interruption so the task does not outlive a dead sequence.
pub(super) struct SignalSequence {
    config: TimingControllerConfig,
    course: Arc<Mutex<CourseState>>,
}

impl SignalSequence {
    pub fn spawn(
        config: &TimingControllerConfig,
        course: Arc<Mutex<CourseState>>,
    ) -> AbortOnDropHandle<()> {
        let config = config.clone();

        tokio::spawn(async move {
            let sequence = Self { config, course };

            sequence.run().await
        })
        .into()
    }

    fn lock_course(&self) -> MutexGuard<'_, CourseState> {
        self.course
            .lock()
            .expect("`CourseState` mutex can't be poisoned")
    }

    async fn run(self) {
        time::sleep(self.config.pre_stage_wait).await;

        if !self.lock_course().try_advance_to_yellow() {
            log::info!("Signal sequence interrupted during red stage");
            return;
        }

        let hold = {
            let min = self.config.stage_wait_min;
            let max = self.config.stage_wait_max;

            // ThreadRng is not Send, so the sample is scoped off the await.
            let mut rng = rand::thread_rng();
            rng.gen_range(min..=max)
        };

        let deadline = time::Instant::now() + hold;

        while time::Instant::now() < deadline {
            time::sleep(self.config.stage_poll_interval).await;

            if self.lock_course().sequence_interrupted() {
                log::info!("Signal sequence interrupted during yellow stage");
                return;
            }
        }

        if self.lock_course().try_advance_to_green(Utc::now()) {
            log::info!("Green signal: course open");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::{
        shared::{SignalStage, TimingMode},
        timing::{
            TimingConfig,
            config::{TimingControllerConfig, TimingProcessConfig},
            course::CourseState,
        },
    };

    use super::SignalSequence;

    fn fast_config() -> TimingConfig {
        TimingConfig::signal()
            .with_pre_stage_wait_ms(20)
            .with_stage_wait_range_ms(20, 20)
            .with_stage_poll_interval_ms(5)
    }

    fn course_with_rider() -> Arc<Mutex<CourseState>> {
        let mut course = CourseState::new(TimingMode::Signal);
        course.register("Aiko", "1001", "MT-09");
        course.begin_sequence();

        Arc::new(Mutex::new(course))
    }

    fn stage(course: &Arc<Mutex<CourseState>>) -> SignalStage {
        course.lock().unwrap().signal_stage()
    }

    mod run {
        use super::*;

        #[tokio::test]
        async fn advances_to_green() {
            let config = fast_config();
            let course = course_with_rider();

            let handle =
                SignalSequence::spawn(&TimingControllerConfig::from(&config), course.clone());
            let _ = handle.await;

            assert_eq!(stage(&course), SignalStage::Green);
        }

        #[tokio::test]
        async fn stops_after_false_start_during_red() {
            let config = fast_config().with_pre_stage_wait_ms(100);
            let course = course_with_rider();

            let handle =
                SignalSequence::spawn(&TimingControllerConfig::from(&config), course.clone());

            // A pass while the red light is up forces the stage to `False`.
            course.lock().unwrap().apply_tick(
                chrono::Utc::now(),
                true,
                false,
                &TimingProcessConfig::from(&config),
            );

            let _ = handle.await;

            assert_eq!(stage(&course), SignalStage::False);
        }

        #[tokio::test]
        async fn stops_after_false_start_during_yellow() {
            let config = fast_config().with_stage_wait_range_ms(200, 200);
            let course = course_with_rider();

            let handle =
                SignalSequence::spawn(&TimingControllerConfig::from(&config), course.clone());

            // Wait out the red stage, then interrupt during yellow.
            tokio::time::sleep(tokio::time::Duration::from_millis(60)).await;
            assert_eq!(stage(&course), SignalStage::Yellow);

            course.lock().unwrap().apply_tick(
                chrono::Utc::now(),
                true,
                false,
                &TimingProcessConfig::from(&config),
            );

            let _ = handle.await;

            assert_eq!(stage(&course), SignalStage::False);
        }
    }
}
