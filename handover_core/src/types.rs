//! Core domain types for the Handover system.
//!
//! This module defines the fundamental types used throughout the system:
//! - CPR events, timeline entries and completed sessions
//! - Controller phases, signals and snapshots
//! - Patient records, vital signs, GCS assessments and notes

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Timestamps
// ============================================================================

/// Human-readable wall-clock time (`HH:MM:SS`, local timezone)
pub fn display_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Format an elapsed duration as `MM:SS`; minutes are not wrapped at 60
pub fn format_mm_ss(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

// ============================================================================
// CPR Record Types
// ============================================================================

/// Kind of a logged CPR event
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CprEventKind {
    Rhythm,
    Shock,
    Medication,
    Intervention,
    Note,
}

impl CprEventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rhythm => "rhythm",
            Self::Shock => "shock",
            Self::Medication => "medication",
            Self::Intervention => "intervention",
            Self::Note => "note",
        }
    }
}

impl fmt::Display for CprEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Kind of a timeline entry (superset of [`CprEventKind`])
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineKind {
    SessionStart,
    SessionEnd,
    PulseCheck,
    Rhythm,
    Shock,
    Medication,
    Intervention,
    Note,
}

impl TimelineKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart => "session-start",
            Self::SessionEnd => "session-end",
            Self::PulseCheck => "pulse-check",
            Self::Rhythm => "rhythm",
            Self::Shock => "shock",
            Self::Medication => "medication",
            Self::Intervention => "intervention",
            Self::Note => "note",
        }
    }
}

impl fmt::Display for TimelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<CprEventKind> for TimelineKind {
    fn from(kind: CprEventKind) -> Self {
        match kind {
            CprEventKind::Rhythm => Self::Rhythm,
            CprEventKind::Shock => Self::Shock,
            CprEventKind::Medication => Self::Medication,
            CprEventKind::Intervention => Self::Intervention,
            CprEventKind::Note => Self::Note,
        }
    }
}

/// A type-specific CPR event (rhythm, shock, drug, intervention, note)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CprEvent {
    pub time: String,
    pub iso: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: CprEventKind,
    pub details: String,
}

impl CprEvent {
    pub fn new(at: DateTime<Utc>, kind: CprEventKind, details: impl Into<String>) -> Self {
        Self {
            time: display_time(at),
            iso: at,
            kind,
            details: details.into(),
        }
    }
}

/// An entry on the merged CPR timeline
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub time: String,
    pub iso: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: TimelineKind,
    pub details: String,
}

impl TimelineEntry {
    pub fn new(at: DateTime<Utc>, kind: TimelineKind, details: impl Into<String>) -> Self {
        Self {
            time: display_time(at),
            iso: at,
            kind,
            details: details.into(),
        }
    }
}

impl From<&CprEvent> for TimelineEntry {
    fn from(event: &CprEvent) -> Self {
        Self {
            time: event.time.clone(),
            iso: event.iso,
            kind: event.kind.into(),
            details: event.details.clone(),
        }
    }
}

/// A completed CPR session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CprSession {
    pub time: String,
    pub iso: DateTime<Utc>,
    /// Elapsed session time as `MM:SS`
    pub duration: String,
    /// Compressions per minute at the moment the session ended
    pub rate: u32,
    pub cycles: u32,
    /// Last rhythm recorded before the session ended
    pub rhythm: Option<String>,
}

// ============================================================================
// Controller Types
// ============================================================================

/// Phase of the CPR session state machine
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CprPhase {
    #[default]
    Idle,
    Running,
    AwaitingPulseCheck,
}

/// A short fixed-pitch beep requested from the audio collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u32,
}

/// Notifications emitted by the controller for the presentation layer
#[derive(Clone, Debug, PartialEq)]
pub enum Signal {
    SessionStarted { rate: u32 },
    /// One compression beat; `tone` is set when audio is enabled
    Beat { count: u32, tone: Option<Tone> },
    /// Once-per-second elapsed time update
    Clock { elapsed: Duration },
    PulseCheckDue { cycle: u32 },
    RateChanged { bpm: u32 },
    SessionEnded(CprSession),
}

/// Point-in-time view of the controller for rendering
#[derive(Clone, Debug, PartialEq)]
pub struct CprSnapshot {
    pub phase: CprPhase,
    pub compression_count: u32,
    pub cycle_count: u32,
    pub current_cycle: u32,
    pub cycle_progress: u32,
    pub cycle_target: u32,
    pub rate: u32,
    pub elapsed: Duration,
}

// ============================================================================
// Patient Types
// ============================================================================

/// A set of vital-sign readings taken together
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct VitalSigns {
    pub time: String,
    pub iso: DateTime<Utc>,
    pub heart_rate: Option<u16>,
    pub resp_rate: Option<u16>,
    pub systolic: Option<u16>,
    pub diastolic: Option<u16>,
    pub spo2: Option<u8>,
    /// Degrees Celsius
    pub temperature: Option<f32>,
    /// mmol/L
    pub glucose: Option<f32>,
}

/// Glasgow Coma Scale assessment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GcsAssessment {
    pub time: String,
    pub iso: DateTime<Utc>,
    pub eye: u8,
    pub verbal: u8,
    pub motor: u8,
}

/// Severity band derived from a GCS total
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GcsSeverity {
    Mild,
    Moderate,
    Severe,
}

/// Free-text clinical note
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub time: String,
    pub iso: DateTime<Utc>,
    pub text: String,
}

/// Patient identity, history and observations
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub chief_complaint: Option<String>,
    #[serde(default)]
    pub history: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Newest first
    #[serde(default)]
    pub vitals: Vec<VitalSigns>,
    /// Newest first
    #[serde(default)]
    pub gcs: Vec<GcsAssessment>,
    /// Newest first
    #[serde(default)]
    pub notes: Vec<Note>,
}

/// Partial edit of a patient's identity/history fields
#[derive(Clone, Debug, Default)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub age: Option<u8>,
    pub sex: Option<String>,
    pub location: Option<String>,
    pub chief_complaint: Option<String>,
    pub history: Option<String>,
    pub allergies: Option<String>,
    pub medications: Option<String>,
}
