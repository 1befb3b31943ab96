//! Append-only CSV record of machine state transitions.
//!
//! The file has the columns `timestamp,event,details`. The header is written
//! once, when the file is created (or found empty); every later open appends.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use crate::error::EventLogError;

pub const HEADER: [&str; 3] = ["timestamp", "event", "details"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "Hazard Detected")]
    HazardDetected,
    #[serde(rename = "Machine Restarted")]
    MachineRestarted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::HazardDetected => "Hazard Detected",
            EventKind::MachineRestarted => "Machine Restarted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "event")]
    pub event_kind: EventKind,
    pub details: String,
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};
    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Durable sink for transition events.
pub trait EventRecorder {
    fn append(&mut self, kind: EventKind, details: &str) -> Result<EventLogEntry, EventLogError>;
}

impl<R: EventRecorder + ?Sized> EventRecorder for &mut R {
    fn append(&mut self, kind: EventKind, details: &str) -> Result<EventLogEntry, EventLogError> {
        (**self).append(kind, details)
    }
}

/// CSV-backed event log. The file is opened lazily on the first append.
#[derive(Debug)]
pub struct CsvEventLog {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl CsvEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    /// Opens (creating if needed) the log right away, so a bad path fails before any frame is processed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EventLogError> {
        let mut log = Self::new(path);
        log.writer()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> EventLogError {
        EventLogError::Io { path: self.path.display().to_string(), source }
    }

    fn csv_err(&self, source: csv::Error) -> EventLogError {
        EventLogError::Csv { path: self.path.display().to_string(), source }
    }

    fn open_writer(&self) -> Result<csv::Writer<File>, EventLogError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        let is_new = file.metadata().map_err(|e| self.io_err(e))?.len() == 0;
        if !is_new {
            self.terminate_last_row(&mut file).map_err(|e| self.io_err(e))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        if is_new {
            writer.write_record(HEADER).map_err(|e| self.csv_err(e))?;
            writer.flush().map_err(|e| self.io_err(e))?;
            log::info!("Created event log {}", self.path.display());
        }
        Ok(writer)
    }

    /// A row torn by a crash or a full disk must not swallow the next one.
    fn terminate_last_row(&self, file: &mut File) -> std::io::Result<()> {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            log::warn!("Event log {} ends with an incomplete row", self.path.display());
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut csv::Writer<File>, EventLogError> {
        match self.writer {
            Some(ref mut writer) => Ok(writer),
            None => {
                let writer = self.open_writer()?;
                Ok(self.writer.insert(writer))
            }
        }
    }
}

impl EventRecorder for CsvEventLog {
    fn append(&mut self, kind: EventKind, details: &str) -> Result<EventLogEntry, EventLogError> {
        let entry = EventLogEntry {
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            event_kind: kind,
            details: details.to_string(),
        };

        let path = self.path.display().to_string();
        let writer = self.writer()?;
        let written = match writer.serialize(&entry) {
            Ok(()) => writer.flush().map_err(|source| EventLogError::Io { path: path.clone(), source }),
            Err(source) => Err(EventLogError::Csv { path, source }),
        };
        if written.is_err() {
            // reopen on the next append instead of reusing a writer in an unknown state
            self.writer = None;
        }
        written.map(|_| entry)
    }
}

/// Reads every entry back in file order. A missing file is an empty log.
///
/// Malformed rows are skipped with a warning; only I/O errors fail the read.
pub fn read_entries(path: &Path) -> Result<Vec<EventLogEntry>, EventLogError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let csv_err = |source| EventLogError::Csv { path: path.display().to_string(), source };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut entries = Vec::new();
    for row in reader.deserialize::<EventLogEntry>() {
        match row {
            Ok(entry) => entries.push(entry),
            Err(err) if err.is_io_error() => return Err(csv_err(err)),
            Err(err) => log::warn!("Skipping malformed event log row in {}: {}", path.display(), err),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_written_once_on_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event_log.csv");
        let _log = CsvEventLog::open(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "timestamp,event,details\n");
    }

    #[test]
    fn lazy_log_creates_file_on_first_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event_log.csv");
        let mut log = CsvEventLog::new(&path);
        assert!(!path.exists());
        log.append(EventKind::HazardDetected, "No helmet detected!").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "timestamp,event,details");
        assert!(lines[1].ends_with(",Hazard Detected,No helmet detected!"));
    }

    #[test]
    fn round_trip_preserves_order_kind_and_details() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event_log.csv");
        let mut log = CsvEventLog::open(&path).unwrap();
        let written = vec![
            log.append(EventKind::HazardDetected, "Human detected in hazard zone!; No helmet detected!").unwrap(),
            log.append(EventKind::MachineRestarted, "No hazard detected.").unwrap(),
            log.append(EventKind::HazardDetected, "details, with \"quotes\"\nand a newline").unwrap(),
        ];
        let read = read_entries(&path).unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event_log.csv");
        {
            let mut log = CsvEventLog::open(&path).unwrap();
            log.append(EventKind::HazardDetected, "first run").unwrap();
        }
        {
            let mut log = CsvEventLog::open(&path).unwrap();
            log.append(EventKind::MachineRestarted, "second run").unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("timestamp,event,details").count(), 1);
        let read = read_entries(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].details, "first run");
        assert_eq!(read[1].event_kind, EventKind::MachineRestarted);
    }

    #[test]
    fn reopen_after_torn_row_starts_a_new_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event_log.csv");
        std::fs::write(&path, "timestamp,event,details\n2024-05-01 08:00:00,Hazard Detected,x").unwrap();

        let mut log = CsvEventLog::new(&path);
        log.append(EventKind::MachineRestarted, "No hazard detected.").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Hazard Detected,x\n"));
        assert_eq!(text.matches("timestamp,event,details").count(), 1);
        let read = read_entries(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].details, "x");
        assert_eq!(read[1].event_kind, EventKind::MachineRestarted);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event_log.csv");
        {
            let mut log = CsvEventLog::open(&path).unwrap();
            log.append(EventKind::HazardDetected, "first").unwrap();
            log.append(EventKind::MachineRestarted, "second").unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"2024-05-01 08:0").unwrap();
        drop(file);

        let read = read_entries(&path).unwrap();
        let details: Vec<_> = read.iter().map(|e| e.details.as_str()).collect();
        assert_eq!(details, ["first", "second"]);
    }

    #[test]
    fn unknown_event_kind_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event_log.csv");
        std::fs::write(
            &path,
            "timestamp,event,details\n2024-05-01 08:00:00,Coffee Break,x\n2024-05-01 08:00:01,Machine Restarted,y\n",
        ).unwrap();
        let read = read_entries(&path).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].details, "y");
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_entries(&dir.path().join("nope.csv")).unwrap().is_empty());
    }

    #[test]
    fn open_in_missing_dir_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvEventLog::open(dir.path().join("missing").join("log.csv")).unwrap_err();
        assert!(matches!(err, EventLogError::Io { .. }));
    }

    #[test]
    fn timestamp_uses_fixed_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event_log.csv");
        let mut log = CsvEventLog::open(&path).unwrap();
        log.append(EventKind::MachineRestarted, "No hazard detected.").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let row = text.lines().nth(1).unwrap();
        let ts = row.split(',').next().unwrap();
        assert!(NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).is_ok(), "{ts}");
        assert_eq!(ts.len(), "2024-01-01 00:00:00".len());
    }
}
