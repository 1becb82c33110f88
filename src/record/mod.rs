use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate};

use crate::shared::{TimingMode, format_seconds};

pub(crate) mod error;

#[cfg(test)]
mod tests;

use error::{RecordError, Result};

/// Column headers of the per-day result file, written exactly once when the
/// day's file is first created.
pub const RECORD_HEADER: [&str; 8] = [
    "Timestamp",
    "RiderName",
    "ID",
    "Vehicle",
    "Time",
    "ReactionTime",
    "Status",
    "Mode",
];

/// One finalized run, as persisted by a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct RunRecord {
    timestamp: DateTime<Local>,
    rider_name: String,
    rider_id: String,
    vehicle: String,
    result_time: Duration,
    reaction_time: Option<Duration>,
    false_start: bool,
    mode: TimingMode,
}

impl RunRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        timestamp: DateTime<Local>,
        rider_name: String,
        rider_id: String,
        vehicle: String,
        result_time: Duration,
        reaction_time: Option<Duration>,
        false_start: bool,
        mode: TimingMode,
    ) -> Self {
        Self {
            timestamp,
            rider_name,
            rider_id,
            vehicle,
            result_time,
            reaction_time,
            false_start,
            mode,
        }
    }

    /// Returns the local wall-clock time at which the run was finalized.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn rider_name(&self) -> &str {
        &self.rider_name
    }

    pub fn rider_id(&self) -> &str {
        &self.rider_id
    }

    pub fn vehicle(&self) -> &str {
        &self.vehicle
    }

    /// Returns the run duration, measured from the rider's clock zero to the
    /// stop trigger.
    pub fn result_time(&self) -> Duration {
        self.result_time
    }

    /// Returns the reaction time for a green-stage release, `None` in normal
    /// mode or after a false start.
    pub fn reaction_time(&self) -> Option<Duration> {
        self.reaction_time
    }

    pub fn false_start(&self) -> bool {
        self.false_start
    }

    pub fn mode(&self) -> TimingMode {
        self.mode
    }

    /// Returns the status column label: `FALSE START` for penalized runs,
    /// `OK` otherwise.
    pub fn status_label(&self) -> &'static str {
        if self.false_start { "FALSE START" } else { "OK" }
    }

    /// Returns the record as the persisted row layout, with 3-decimal time
    /// fields and a blank reaction column when absent.
    pub fn csv_row(&self) -> [String; 8] {
        [
            self.timestamp.format("%H:%M:%S").to_string(),
            self.rider_name.clone(),
            self.rider_id.clone(),
            self.vehicle.clone(),
            format_seconds(self.result_time),
            self.reaction_time.map(format_seconds).unwrap_or_default(),
            self.status_label().to_string(),
            self.mode.to_string(),
        ]
    }
}

/// Append-only persistence of finished runs.
///
/// Failures are reported to the caller but are non-fatal to timing: the
/// in-memory transition that produced the record has already happened and
/// is never rolled back.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Appends one finalized run.
    async fn append(&self, record: &RunRecord) -> Result<()>;
}

/// [`RecordStore`] writing one CSV file per calendar day.
///
/// Files are named `gymkhana_YYYYMMDD.csv` under the data directory, which
/// is created on construction. The header row is written exactly once, the
/// first time a day's file is created.
#[derive(Debug)]
pub struct CsvRecordStore {
    data_dir: PathBuf,
}

impl CsvRecordStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        Ok(Self { data_dir })
    }

    fn day_file(&self, date: NaiveDate) -> PathBuf {
        self.data_dir
            .join(format!("gymkhana_{}.csv", date.format("%Y%m%d")))
    }
}

#[async_trait]
impl RecordStore for CsvRecordStore {
    async fn append(&self, record: &RunRecord) -> Result<()> {
        let path = self.day_file(record.timestamp().date_naive());
        let new_file = !path.exists();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if new_file {
            writer.write_record(RECORD_HEADER)?;
        }
        writer.write_record(record.csv_row())?;
        writer.flush()?;

        Ok(())
    }
}

/// In-memory [`RecordStore`] for tests and demonstrations.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<RunRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all appended records, in append order.
    pub fn records(&self) -> Vec<RunRecord> {
        self.lock_records().clone()
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, Vec<RunRecord>> {
        self.records
            .lock()
            .expect("`MemoryRecordStore` mutex can't be poisoned")
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn append(&self, record: &RunRecord) -> Result<()> {
        self.lock_records().push(record.clone());
        Ok(())
    }
}
