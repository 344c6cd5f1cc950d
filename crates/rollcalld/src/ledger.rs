//! Attendance ledger: one record per student per calendar day.
//!
//! Persisted as `{"recognizedStudents": [{"rollNo": ..., "timestamp": ...}]}`.
//! The day of a record is the date part of its stored timestamp, so records
//! written with a `Z` suffix compare by the wall date they were written with.

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("ledger encode: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "rollNo")]
    pub roll_number: String,
    pub timestamp: DateTime<FixedOffset>,
}

impl AttendanceRecord {
    pub fn new(roll_number: impl Into<String>, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            roll_number: roll_number.into(),
            timestamp,
        }
    }

    /// Calendar day this record counts for.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Serialized ledger document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSheet {
    #[serde(rename = "recognizedStudents", default)]
    pub recognized_students: Vec<AttendanceRecord>,
}

/// Wall clock used to stamp records and decide "today".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Server-local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Shared attendance store.
pub trait AttendanceLedger: Send + Sync {
    /// Persist one record. Returns `false` without writing when the student
    /// already has a record for that day.
    fn append(&self, record: &AttendanceRecord) -> Result<bool, LedgerError>;

    /// Records for one calendar day, in insertion order.
    fn list(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError>;
}

/// JSON file ledger. Writes go through a temp file and rename.
pub struct JsonLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the file.
    pub fn sheet(&self) -> Result<AttendanceSheet, LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read()
    }

    /// Remove all attendance data.
    pub fn clear(&self) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "attendance cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn read(&self) -> Result<AttendanceSheet, LedgerError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AttendanceSheet::default()),
            Err(source) => return Err(self.io_error(source)),
        };
        if text.trim().is_empty() {
            return Ok(AttendanceSheet::default());
        }

        match serde_json::from_str(&text) {
            Ok(sheet) => Ok(sheet),
            Err(e) => {
                // Keep the unreadable file for inspection and start over.
                let aside = self.path.with_extension(format!(
                    "json.corrupt-{}",
                    Local::now().format("%Y%m%d%H%M%S")
                ));
                tracing::warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "attendance file unreadable; starting a new one"
                );
                std::fs::rename(&self.path, &aside).map_err(|source| self.io_error(source))?;
                Ok(AttendanceSheet::default())
            }
        }
    }

    fn write(&self, sheet: &AttendanceSheet) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(sheet)?;
        std::fs::write(&tmp, json).map_err(|source| self.io_error(source))?;
        std::fs::rename(&tmp, &self.path).map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl AttendanceLedger for JsonLedger {
    fn append(&self, record: &AttendanceRecord) -> Result<bool, LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut sheet = self.read()?;

        let date = record.date();
        if sheet
            .recognized_students
            .iter()
            .any(|r| r.roll_number == record.roll_number && r.date() == date)
        {
            tracing::debug!(roll = %record.roll_number, %date, "already recorded for the day");
            return Ok(false);
        }

        sheet.recognized_students.push(record.clone());
        self.write(&sheet)?;
        Ok(true)
    }

    fn list(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .read()?
            .recognized_students
            .into_iter()
            .filter(|r| r.date() == date)
            .collect())
    }
}
