//! Normal-mode session driven by simulated sensor pulses.
//!
//! Two riders are registered over the UDP entry port and released by the
//! start sensor; finished runs land in `gymkhana_data/`.
//!
//! Run with `cargo run --example normal_course`.

use std::{error::Error, sync::Arc, time::Duration};

use tokio::{net::UdpSocket, time::sleep};

use gymkhana_timing::{
    TimingEngine,
    entry::{DEFAULT_ENTRY_PORT, EntryListener},
    record::CsvRecordStore,
    sensor::PulseSensor,
    timing::TimingConfig,
};

async fn send_entry(name: &str, id: &str, vehicle: &str) -> Result<(), Box<dyn Error>> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let payload = serde_json::json!({
        "type": "ENTRY",
        "name": name,
        "id": id,
        "vehicle": vehicle,
    });

    socket
        .send_to(
            payload.to_string().as_bytes(),
            ("127.0.0.1", DEFAULT_ENTRY_PORT),
        )
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Shortened gating so a full session fits in a few seconds.
    let config = TimingConfig::default()
        .with_next_start_interval_ms(1_000)
        .with_goal_display_time_ms(1_000)
        .with_min_run_time_ms(500)
        .with_sensor_cooldown_ms(500);

    let sensors = Arc::new(PulseSensor::new());
    let store = Arc::new(CsvRecordStore::new("gymkhana_data")?);

    let controller = TimingEngine::new(config, sensors.clone(), store).start();

    let listener = EntryListener::bind(("127.0.0.1", DEFAULT_ENTRY_PORT)).await?;
    let _entry_handle = listener.start(controller.clone());

    send_entry("Aiko", "1001", "MT-09").await?;
    send_entry("Ben", "1002", "CB650R").await?;
    sleep(Duration::from_millis(200)).await;

    log::info!("Queue: {:?}", controller.course_snapshot().queue);

    sensors.trigger_start();
    sleep(Duration::from_millis(1_200)).await;

    sensors.trigger_start();
    sleep(Duration::from_millis(800)).await;

    sensors.trigger_stop();
    sleep(Duration::from_millis(700)).await;

    sensors.trigger_stop();
    sleep(Duration::from_millis(300)).await;

    let snapshot = controller.course_snapshot();
    log::info!(
        "Final display: {} {} [{}]",
        snapshot.current_name,
        snapshot.elapsed,
        snapshot.stop_status,
    );

    controller.shutdown().await?;

    Ok(())
}
