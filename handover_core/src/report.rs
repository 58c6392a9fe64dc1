//! Plain-text handover report.
//!
//! Compiles a patient record and the CPR logs into the summary read out (or
//! printed) at handover. Records are only read.

use crate::store::CprRecords;
use crate::{PatientRecord, TimelineKind};
use chrono::{DateTime, Local, Utc};
use std::fmt::Write;

/// Maximum CPR events listed in a report
pub const REPORT_EVENT_LIMIT: usize = 20;

fn field(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        let _ = writeln!(out, "  {:<16}{}", format!("{}:", label), value);
    }
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "-".repeat(title.len()));
}

fn render_patient(out: &mut String, patient: &PatientRecord) {
    section(out, "PATIENT");
    field(out, "Name", Some(&patient.name));
    let age = patient.age.map(|a| a.to_string());
    field(out, "Age", age.as_deref());
    field(out, "Sex", patient.sex.as_deref());
    field(out, "Location", patient.location.as_deref());
    field(out, "Complaint", patient.chief_complaint.as_deref());
    field(out, "History", patient.history.as_deref());
    field(out, "Allergies", patient.allergies.as_deref());
    field(out, "Medications", patient.medications.as_deref());

    if let Some(vitals) = patient.vitals.first() {
        section(out, &format!("LATEST VITALS ({})", vitals.time));
        let hr = vitals.heart_rate.map(|v| format!("{} bpm", v));
        field(out, "Heart rate", hr.as_deref());
        let rr = vitals.resp_rate.map(|v| format!("{} /min", v));
        field(out, "Resp rate", rr.as_deref());
        let bp = vitals.blood_pressure().map(|v| format!("{} mmHg", v));
        field(out, "Blood pressure", bp.as_deref());
        let spo2 = vitals.spo2.map(|v| format!("{}%", v));
        field(out, "SpO2", spo2.as_deref());
        let temp = vitals.temperature.map(|v| format!("{:.1} C", v));
        field(out, "Temperature", temp.as_deref());
        let glucose = vitals.glucose.map(|v| format!("{:.1} mmol/L", v));
        field(out, "Glucose", glucose.as_deref());
        if patient.vitals.len() > 1 {
            let _ = writeln!(out, "  ({} earlier sets recorded)", patient.vitals.len() - 1);
        }
    }

    if let Some(gcs) = patient.gcs.first() {
        section(out, &format!("GCS ({})", gcs.time));
        let _ = writeln!(out, "  {} ({})", gcs.breakdown(), gcs.severity());
    }

    if !patient.notes.is_empty() {
        section(out, "NOTES");
        for note in &patient.notes {
            let _ = writeln!(out, "  [{}] {}", note.time, note.text);
        }
    }
}

fn render_cpr(out: &mut String, records: &CprRecords) {
    if records.sessions.is_empty() && records.events.is_empty() {
        return;
    }

    section(out, "RESUSCITATION");
    if let Some(session) = records.sessions.latest() {
        let _ = writeln!(
            out,
            "  Last CPR session ended {}: duration {}, {} cycles at {}/min",
            session.time, session.duration, session.cycles, session.rate
        );
        field(out, "Last rhythm", session.rhythm.as_deref());
        if records.sessions.len() > 1 {
            let _ = writeln!(out, "  Total CPR sessions: {}", records.sessions.len());
        }
    }

    let shocks = records
        .timeline
        .iter()
        .filter(|e| e.kind == TimelineKind::Shock)
        .count();
    if shocks > 0 {
        let _ = writeln!(out, "  Shocks delivered: {}", shocks);
    }

    if !records.events.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Events (newest first):");
        for event in records.events.iter().take(REPORT_EVENT_LIMIT) {
            let _ = writeln!(out, "    {}  {:<12} {}", event.time, event.kind, event.details);
        }
        if records.events.len() > REPORT_EVENT_LIMIT {
            let _ = writeln!(
                out,
                "    ... {} earlier events omitted",
                records.events.len() - REPORT_EVENT_LIMIT
            );
        }
    }
}

/// Render one patient record on its own, without the CPR sections
pub fn render_patient_summary(patient: &PatientRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Patient {}", patient.id);
    let _ = writeln!(
        out,
        "Updated {}",
        patient
            .updated_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    render_patient(&mut out, patient);
    out
}

/// Render the handover report
pub fn render_handover(
    patient: Option<&PatientRecord>,
    records: &CprRecords,
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PATIENT HANDOVER REPORT");
    let _ = writeln!(
        out,
        "Generated {}",
        now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );

    match patient {
        Some(patient) => render_patient(&mut out, patient),
        None => {
            section(&mut out, "PATIENT");
            let _ = writeln!(out, "  No patient record");
        }
    }

    render_cpr(&mut out, records);
    out
}
