#![forbid(unsafe_code)]

//! Core domain model and business logic for the Handover system.
//!
//! This crate provides:
//! - Domain types (CPR events, timeline, sessions, patient records)
//! - CPR session controller (metronome, session timer, pulse-check gating)
//! - Bounded newest-first event logs
//! - Persistence (key-value store, patient registry)
//! - Handover report and CSV export

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod event_log;
pub mod scheduler;
pub mod metronome;
pub mod store;
pub mod controller;
pub mod patient;
pub mod report;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result, ValidationError};
pub use types::*;
pub use catalog::get_default_catalog;
pub use config::Config;
pub use event_log::EventLog;
pub use store::{CprRecords, FileStore, KeyValueStore, MemoryStore};
pub use controller::{parse_shock_energy, ControllerSettings, CprController};
pub use patient::{parse_blood_pressure, PatientRegistry};
pub use report::{render_handover, render_patient_summary};
pub use export::export_records;
