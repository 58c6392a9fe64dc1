//! CSV export of the CPR records for archiving alongside a handover.
//!
//! Rows are written oldest first (the order a reader scans a chart in), and
//! each file is fsynced before the export reports success.

use crate::store::CprRecords;
use crate::{CprEvent, CprSession, Result, TimelineEntry};
use std::fs::File;
use std::path::Path;

pub const SESSIONS_CSV: &str = "cpr_sessions.csv";
pub const EVENTS_CSV: &str = "cpr_events.csv";
pub const TIMELINE_CSV: &str = "cpr_timeline.csv";

#[derive(Debug, serde::Serialize)]
struct SessionRow<'a> {
    time: &'a str,
    iso: String,
    duration: &'a str,
    rate: u32,
    cycles: u32,
    rhythm: Option<&'a str>,
}

impl<'a> From<&'a CprSession> for SessionRow<'a> {
    fn from(session: &'a CprSession) -> Self {
        SessionRow {
            time: &session.time,
            iso: session.iso.to_rfc3339(),
            duration: &session.duration,
            rate: session.rate,
            cycles: session.cycles,
            rhythm: session.rhythm.as_deref(),
        }
    }
}

/// Shared row shape for events and timeline entries
#[derive(Debug, serde::Serialize)]
struct EntryRow<'a> {
    time: &'a str,
    iso: String,
    #[serde(rename = "type")]
    kind: &'static str,
    details: &'a str,
}

impl<'a> From<&'a CprEvent> for EntryRow<'a> {
    fn from(event: &'a CprEvent) -> Self {
        EntryRow {
            time: &event.time,
            iso: event.iso.to_rfc3339(),
            kind: event.kind.as_str(),
            details: &event.details,
        }
    }
}

impl<'a> From<&'a TimelineEntry> for EntryRow<'a> {
    fn from(entry: &'a TimelineEntry) -> Self {
        EntryRow {
            time: &entry.time,
            iso: entry.iso.to_rfc3339(),
            kind: entry.kind.as_str(),
            details: &entry.details,
        }
    }
}

/// Write one CSV file; headers are always present, even with no rows
fn write_csv<T: serde::Serialize>(path: &Path, headers: &[&str], rows: Vec<T>) -> Result<usize> {
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    writer.write_record(headers)?;
    let count = rows.len();
    for row in rows {
        writer.serialize(row)?;
    }

    // Flush and sync to disk
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::debug!("Wrote {} rows to {:?}", count, path);
    Ok(count)
}

/// Export sessions, events and timeline into `dir`
///
/// Returns the total number of data rows written across the three files.
pub fn export_records(records: &CprRecords, dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir)?;

    let sessions: Vec<SessionRow> = records.sessions.iter().rev().map(SessionRow::from).collect();
    let events: Vec<EntryRow> = records.events.iter().rev().map(EntryRow::from).collect();
    let timeline: Vec<EntryRow> = records.timeline.iter().rev().map(EntryRow::from).collect();

    let mut total = 0;
    total += write_csv(
        &dir.join(SESSIONS_CSV),
        &["time", "iso", "duration", "rate", "cycles", "rhythm"],
        sessions,
    )?;
    total += write_csv(
        &dir.join(EVENTS_CSV),
        &["time", "iso", "type", "details"],
        events,
    )?;
    total += write_csv(
        &dir.join(TIMELINE_CSV),
        &["time", "iso", "type", "details"],
        timeline,
    )?;

    tracing::info!("Exported {} CPR rows to {:?}", total, dir);
    Ok(total)
}
