//! Attendance ledger — append-only CSV log of completed sessions.
//!
//! One row per finalized session, header `Name,Entry Time,Exit Time`,
//! timestamps in local time. The format is consumed by external reporting
//! tools, so it never changes shape.

use crate::types::{Identity, Session};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column order is part of the file format.
const HEADER: [&str; 3] = ["Name", "Entry Time", "Exit Time"];
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("attendance log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("attendance log record error: {0}")]
    Csv(#[from] csv::Error),
    #[error("session for {0} is not finalized")]
    NotFinalized(Identity),
}

/// One persisted row, string-typed exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Entry Time")]
    pub entry_time: String,
    #[serde(rename = "Exit Time")]
    pub exit_time: String,
}

impl AttendanceRecord {
    /// Format a finalized session for persistence. Sessions without an exit
    /// time never reach the ledger; hitting this error is a tracker defect.
    pub fn from_session(session: &Session) -> Result<Self, LedgerError> {
        let exited_at = session
            .exited_at
            .ok_or_else(|| LedgerError::NotFinalized(session.identity.clone()))?;
        Ok(Self {
            name: session.identity.to_string(),
            entry_time: session.entered_at.format(TIMESTAMP_FORMAT).to_string(),
            exit_time: exited_at.format(TIMESTAMP_FORMAT).to_string(),
        })
    }
}

/// Handle to the attendance log file. Single-writer: exactly one daemon
/// process may append; concurrent readers are fine because each append is
/// one flushed write.
pub struct AttendanceLedger {
    path: PathBuf,
}

impl AttendanceLedger {
    /// Open the log at `path`, creating it (and its parent directories) with
    /// a header row if missing. An existing file is left untouched; appends
    /// go after the last row.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        if !path.exists() {
            let mut file = File::create(&path)?;
            {
                let mut writer = csv::Writer::from_writer(&mut file);
                writer.write_record(HEADER)?;
                writer.flush()?;
            }
            file.sync_all()?;
            tracing::info!(path = %path.display(), "initialized attendance log");
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably persist one finalized session as one row. The row is flushed
    /// and fsynced before this returns; a success means the record survives
    /// a process crash.
    pub fn append(&mut self, session: &Session) -> Result<(), LedgerError> {
        let record = AttendanceRecord::from_session(session)?;

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut file);
            writer.serialize(&record)?;
            writer.flush()?;
        }
        file.sync_all()?;

        tracing::debug!(name = %record.name, exit = %record.exit_time, "session recorded");
        Ok(())
    }

    /// Read the full persisted history, in file order.
    pub fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }

    /// Write rows whose entry timestamp starts with `date_prefix`
    /// (`YYYY-MM-DD`) to `out`, same format, header included even when no
    /// rows match. Returns the number of exported rows.
    pub fn export_by_date(&self, date_prefix: &str, out: &Path) -> Result<usize, LedgerError> {
        let records = self.load_all()?;
        let matching: Vec<&AttendanceRecord> = records
            .iter()
            .filter(|r| r.entry_time.starts_with(date_prefix))
            .collect();

        let mut file = File::create(out)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut file);
            writer.write_record(HEADER)?;
            for record in &matching {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        file.sync_all()?;

        tracing::info!(date = date_prefix, count = matching.len(), out = %out.display(), "exported records");
        Ok(matching.len())
    }
}

/// Conventional location of the attendance log.
pub fn default_log_path() -> PathBuf {
    crate::default_data_dir().join("attendance.csv")
}
