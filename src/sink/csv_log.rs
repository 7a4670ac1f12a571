use std::collections::{BTreeMap, HashSet};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::JobRecord;
use crate::error::SinkError;

/// Append-only CSV log of recorded jobs; the local source of truth.
///
/// The header is written with the first row. Later appends never touch
/// existing rows.
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
}

/// Row counts for `printlog status`.
#[derive(Debug, Default, PartialEq)]
pub struct LogSummary {
    pub total: usize,
    pub per_printer: BTreeMap<String, usize>,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ids of every job already in the log. A log that does not exist yet
    /// is empty; one that cannot be read is an error.
    pub async fn load_known_ids(&self) -> Result<HashSet<String>, SinkError> {
        let path = self.path.clone();
        let ids = tokio::task::spawn_blocking(move || read_known_ids(&path)).await??;
        info!(count = ids.len(), path = %self.path.display(), "Loaded recorded job ids");
        Ok(ids)
    }

    /// Append `records`, creating the file with a header if needed.
    pub async fn append(&self, records: Vec<JobRecord>) -> Result<usize, SinkError> {
        if records.is_empty() {
            return Ok(0);
        }
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_records(&path, &records)).await?
    }

    pub async fn summary(&self) -> Result<LogSummary, SinkError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_summary(&path)).await?
    }
}

fn is_empty_or_missing(path: &Path) -> Result<bool, SinkError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

fn read_known_ids(path: &Path) -> Result<HashSet<String>, SinkError> {
    if is_empty_or_missing(path)? {
        return Ok(HashSet::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == "uuid")
        .ok_or(SinkError::MissingUuidColumn)?;

    let mut ids = HashSet::new();
    for row in reader.records() {
        let row = row?;
        if let Some(uuid) = row.get(column).filter(|uuid| !uuid.is_empty()) {
            ids.insert(uuid.to_string());
        }
    }
    Ok(ids)
}

fn append_records(path: &Path, records: &[JobRecord]) -> Result<usize, SinkError> {
    let write_header = is_empty_or_missing(path)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    debug!(rows = records.len(), header = write_header, path = %path.display(), "Appended to job log");
    Ok(records.len())
}

fn read_summary(path: &Path) -> Result<LogSummary, SinkError> {
    let mut summary = LogSummary::default();
    if is_empty_or_missing(path)? {
        return Ok(summary);
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == "printer_name");

    for row in reader.records() {
        let row = row?;
        summary.total += 1;
        let printer = column.and_then(|c| row.get(c)).unwrap_or_default();
        *summary.per_printer.entry(printer.to_string()).or_default() += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LOG_FIELDS;

    fn record(uuid: &str, printer: &str) -> JobRecord {
        JobRecord {
            uuid: uuid.to_string(),
            printer_name: printer.to_string(),
            date: "2024-02-03".into(),
            datetime_started: "2024-02-02T16:00:00-08:00".into(),
            datetime_finished: "2024-02-02T18:30:00-08:00".into(),
            name: "gear, large".into(),
            result: "Finished".into(),
            time_total: Some(9000.0),
            material_0_amount: 120.5,
            material_1_amount: 0.0,
            material_0_name: "PLA".into(),
            material_1_name: "Unknown".into(),
        }
    }

    #[tokio::test]
    async fn first_append_writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::new(dir.path().join("jobs.csv"));

        let written = log
            .append(vec![record("a", "S5"), record("b", "S5")])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let content = std::fs::read_to_string(log.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), LOG_FIELDS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "a,S5,2024-02-03,2024-02-02T16:00:00-08:00,2024-02-02T18:30:00-08:00,\"gear, large\",Finished,9000,120.5,0,PLA,Unknown"
        );
        assert_eq!(lines.count(), 1);
    }

    #[tokio::test]
    async fn later_appends_do_not_repeat_header() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::new(dir.path().join("jobs.csv"));

        log.append(vec![record("a", "S5")]).await.unwrap();
        log.append(vec![record("b", "S3")]).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.matches("uuid,printer_name").count(), 1);
        assert_eq!(content.lines().count(), 3);

        let ids = log.load_known_ids().await.unwrap();
        assert_eq!(ids, HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn appending_nothing_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::new(dir.path().join("jobs.csv"));

        assert_eq!(log.append(Vec::new()).await.unwrap(), 0);
        assert!(!log.path().exists());
    }

    #[tokio::test]
    async fn missing_log_has_no_known_ids() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::new(dir.path().join("absent.csv"));
        assert!(log.load_known_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn log_without_uuid_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        std::fs::write(&path, "id,name\n1,x\n").unwrap();

        let err = CsvLog::new(&path).load_known_ids().await.unwrap_err();
        assert!(matches!(err, SinkError::MissingUuidColumn));
    }

    #[tokio::test]
    async fn blank_uuids_are_not_known() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        std::fs::write(&path, "uuid,printer_name\n,S5\nabc,S5\n").unwrap();

        let ids = CsvLog::new(&path).load_known_ids().await.unwrap();
        assert_eq!(ids, HashSet::from(["abc".to_string()]));
    }

    #[tokio::test]
    async fn summary_counts_rows_per_printer() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::new(dir.path().join("jobs.csv"));
        log.append(vec![record("a", "S5"), record("b", "S3"), record("c", "S5")])
            .await
            .unwrap();

        let summary = log.summary().await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.per_printer.get("S5"), Some(&2));
        assert_eq!(summary.per_printer.get("S3"), Some(&1));
    }
}
