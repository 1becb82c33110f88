//! Signal-mode session: a clean green-light run followed by a false start.
//!
//! Run with `cargo run --example signal_course`.

use std::{error::Error, sync::Arc, time::Duration};

use tokio::time::sleep;

use gymkhana_timing::{
    TimingEngine, record::MemoryRecordStore, sensor::PulseSensor, timing::TimingConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Shortened stage holds so a full session fits in a few seconds.
    let config = TimingConfig::signal()
        .with_next_start_interval_ms(1_000)
        .with_goal_display_time_ms(1_000)
        .with_min_run_time_ms(500)
        .with_sensor_cooldown_ms(500)
        .with_pre_stage_wait_ms(500)
        .with_stage_wait_range_ms(300, 800);

    let sensors = Arc::new(PulseSensor::new());
    let store = Arc::new(MemoryRecordStore::new());

    let controller = TimingEngine::new(config, sensors.clone(), store.clone()).start();
    sleep(Duration::from_millis(50)).await;

    controller.register_rider("Aiko", "1001", "MT-09");
    controller.register_rider("Ben", "1002", "CB650R");

    // Clean run: wait for green, then react.
    controller.start_signal_sequence(false)?;
    loop {
        sleep(Duration::from_millis(20)).await;
        let stage = controller.course_snapshot().signal_stage;
        log::debug!("Stage: {stage}");
        if stage == gymkhana_timing::models::SignalStage::Green {
            break;
        }
    }

    sensors.trigger_start();
    sleep(Duration::from_millis(800)).await;
    sensors.trigger_stop();
    sleep(Duration::from_millis(1_200)).await;

    // Second rider touches the queue-head tag again, forcing a sequence,
    // then jumps the red light.
    controller.handle_entry("Ben", "1002", "CB650R");
    sleep(Duration::from_millis(200)).await;
    sensors.trigger_start();
    sleep(Duration::from_millis(800)).await;
    sensors.trigger_stop();
    sleep(Duration::from_millis(200)).await;

    for record in store.records() {
        log::info!(
            "{} ({}): {}s reaction={:?} [{}]",
            record.rider_name(),
            record.vehicle(),
            record.result_time().num_milliseconds() as f64 / 1000.0,
            record.reaction_time().map(|r| r.num_milliseconds()),
            record.status_label(),
        );
    }

    controller.shutdown().await?;

    Ok(())
}
