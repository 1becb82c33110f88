use std::{fs, path::PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};

use crate::shared::TimingMode;

use super::{CsvRecordStore, MemoryRecordStore, RECORD_HEADER, RecordStore, RunRecord};

fn local_time() -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2026, 3, 1, 14, 30, 5)
        .single()
        .unwrap()
}

fn normal_record() -> RunRecord {
    RunRecord::new(
        local_time(),
        "Aiko".to_string(),
        "1001".to_string(),
        "MT-09".to_string(),
        Duration::milliseconds(34_567),
        None,
        false,
        TimingMode::Normal,
    )
}

fn signal_record(reaction_ms: Option<i64>, false_start: bool) -> RunRecord {
    RunRecord::new(
        local_time(),
        "Ben".to_string(),
        "1002".to_string(),
        "CB650R".to_string(),
        Duration::milliseconds(41_005),
        reaction_ms.map(Duration::milliseconds),
        false_start,
        TimingMode::Signal,
    )
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gymkhana-record-{}-{}", std::process::id(), name));
    let _ = fs::remove_dir_all(&dir);
    dir
}

mod csv_row {
    use super::*;

    #[test]
    fn normal_run() {
        let row = normal_record().csv_row();

        assert_eq!(row[0], "14:30:05");
        assert_eq!(row[1], "Aiko");
        assert_eq!(row[2], "1001");
        assert_eq!(row[3], "MT-09");
        assert_eq!(row[4], "34.567");
        assert_eq!(row[5], "");
        assert_eq!(row[6], "OK");
        assert_eq!(row[7], "NORMAL");
    }

    #[test]
    fn signal_run_with_reaction() {
        let row = signal_record(Some(420), false).csv_row();

        assert_eq!(row[4], "41.005");
        assert_eq!(row[5], "0.420");
        assert_eq!(row[6], "OK");
        assert_eq!(row[7], "SIGNAL");
    }

    #[test]
    fn false_start_run() {
        let record = signal_record(None, true);

        assert_eq!(record.status_label(), "FALSE START");
        assert_eq!(record.csv_row()[6], "FALSE START");
    }
}

mod csv_store {
    use super::*;

    #[test]
    fn day_file_naming() {
        let dir = temp_dir("naming");
        let store = CsvRecordStore::new(&dir).unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let path = store.day_file(date);

        assert_eq!(path.file_name().unwrap(), "gymkhana_20260301.csv");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn header_written_once() {
        let dir = temp_dir("header");
        let store = CsvRecordStore::new(&dir).unwrap();

        store.append(&normal_record()).await.unwrap();
        store.append(&signal_record(Some(420), false)).await.unwrap();

        let path = store.day_file(local_time().date_naive());
        let contents = fs::read_to_string(&path).unwrap();
        let lines = contents.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], RECORD_HEADER.join(","));
        assert!(lines[1].starts_with("14:30:05,Aiko,1001,MT-09,34.567,,OK,"));
        assert!(lines[2].contains("0.420"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rows_parse_back_with_all_fields() {
        let dir = temp_dir("false-start");
        let store = CsvRecordStore::new(&dir).unwrap();

        store.append(&signal_record(None, true)).await.unwrap();

        let path = store.day_file(local_time().date_naive());
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let row = reader.records().next().unwrap().unwrap();

        assert_eq!(row.len(), 8);
        assert_eq!(&row[6], "FALSE START");

        let _ = fs::remove_dir_all(&dir);
    }
}

mod memory_store {
    use super::*;

    #[tokio::test]
    async fn keeps_append_order() {
        let store = MemoryRecordStore::new();

        store.append(&normal_record()).await.unwrap();
        store.append(&signal_record(Some(420), false)).await.unwrap();

        let records = store.records();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rider_name(), "Aiko");
        assert_eq!(records[1].rider_name(), "Ben");
    }
}
