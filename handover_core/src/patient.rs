//! Patient records: identity, history, vitals, GCS and notes.
//!
//! Plain bookkeeping over [`PatientRecord`]s persisted under a single store
//! key. Every mutation is written through immediately.

use crate::error::ValidationError;
use crate::store::{load_json, save_json, KeyValueStore, PATIENTS_KEY};
use crate::{
    display_time, Error, GcsAssessment, GcsSeverity, Note, PatientRecord, PatientUpdate, Result,
    VitalSigns,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// Validation
// ============================================================================

fn check_range<T: PartialOrd + Copy + std::fmt::Display>(
    name: &str,
    value: Option<T>,
    min: T,
    max: T,
) -> std::result::Result<(), ValidationError> {
    match value {
        // NaN is not contained in any range
        Some(v) if !(min..=max).contains(&v) => Err(ValidationError::InvalidVitals(format!(
            "{} {} outside {}-{}",
            name, v, min, max
        ))),
        _ => Ok(()),
    }
}

impl VitalSigns {
    /// Empty reading set stamped at `at`
    pub fn taken_at(at: DateTime<Utc>) -> Self {
        Self {
            time: display_time(at),
            iso: at,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_none()
            && self.resp_rate.is_none()
            && self.systolic.is_none()
            && self.diastolic.is_none()
            && self.spo2.is_none()
            && self.temperature.is_none()
            && self.glucose.is_none()
    }

    /// At least one reading, every reading physiologically plausible
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::InvalidVitals(
                "at least one reading is required".into(),
            ));
        }
        check_range("heart rate", self.heart_rate, 0, 300)?;
        check_range("respiratory rate", self.resp_rate, 0, 80)?;
        check_range("systolic", self.systolic, 0, 300)?;
        check_range("diastolic", self.diastolic, 0, 200)?;
        check_range("SpO2", self.spo2, 0, 100)?;
        check_range("temperature", self.temperature, 25.0, 45.0)?;
        check_range("glucose", self.glucose, 0.0, 50.0)?;

        if let (Some(sys), Some(dia)) = (self.systolic, self.diastolic) {
            if dia > sys {
                return Err(ValidationError::InvalidVitals(format!(
                    "diastolic {} above systolic {}",
                    dia, sys
                )));
            }
        }
        Ok(())
    }

    /// `120/80` style blood pressure, when both values are present
    pub fn blood_pressure(&self) -> Option<String> {
        match (self.systolic, self.diastolic) {
            (Some(sys), Some(dia)) => Some(format!("{}/{}", sys, dia)),
            (Some(sys), None) => Some(format!("{}/-", sys)),
            _ => None,
        }
    }
}

/// Parse `SYS/DIA` (or a bare systolic value)
pub fn parse_blood_pressure(
    input: &str,
) -> std::result::Result<(u16, Option<u16>), ValidationError> {
    let invalid = || ValidationError::InvalidVitals(format!("blood pressure '{}'", input));
    let mut parts = input.trim().splitn(2, '/');
    let systolic = parts
        .next()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(invalid)?;
    let diastolic = match parts.next() {
        Some(d) => Some(d.trim().parse().map_err(|_| invalid())?),
        None => None,
    };
    Ok((systolic, diastolic))
}

impl GcsAssessment {
    /// Build an assessment, checking each component range
    pub fn new(
        at: DateTime<Utc>,
        eye: u8,
        verbal: u8,
        motor: u8,
    ) -> std::result::Result<Self, ValidationError> {
        if !(1..=4).contains(&eye) {
            return Err(ValidationError::InvalidGcs(format!("eye {} outside 1-4", eye)));
        }
        if !(1..=5).contains(&verbal) {
            return Err(ValidationError::InvalidGcs(format!(
                "verbal {} outside 1-5",
                verbal
            )));
        }
        if !(1..=6).contains(&motor) {
            return Err(ValidationError::InvalidGcs(format!(
                "motor {} outside 1-6",
                motor
            )));
        }
        Ok(Self {
            time: display_time(at),
            iso: at,
            eye,
            verbal,
            motor,
        })
    }

    /// 3-15
    pub fn total(&self) -> u8 {
        self.eye + self.verbal + self.motor
    }

    pub fn severity(&self) -> GcsSeverity {
        match self.total() {
            13..=15 => GcsSeverity::Mild,
            9..=12 => GcsSeverity::Moderate,
            _ => GcsSeverity::Severe,
        }
    }

    /// `E4 V5 M6 = 15`
    pub fn breakdown(&self) -> String {
        format!(
            "E{} V{} M{} = {}",
            self.eye,
            self.verbal,
            self.motor,
            self.total()
        )
    }
}

impl std::fmt::Display for GcsSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            GcsSeverity::Mild => "mild",
            GcsSeverity::Moderate => "moderate",
            GcsSeverity::Severe => "severe",
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Patient CRUD over a key-value store
#[derive(Debug)]
pub struct PatientRegistry<S: KeyValueStore> {
    store: S,
    /// Newest first
    patients: Vec<PatientRecord>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl<S: KeyValueStore> PatientRegistry<S> {
    /// Load the registry; a missing or corrupt key yields an empty registry
    pub fn load(store: S) -> Self {
        let patients: Vec<PatientRecord> = load_json(&store, PATIENTS_KEY);
        tracing::debug!("Loaded {} patient records", patients.len());
        Self { store, patients }
    }

    fn save(&mut self) -> Result<()> {
        save_json(&mut self.store, PATIENTS_KEY, &self.patients)
    }

    /// All patients, newest first
    pub fn list(&self) -> &[PatientRecord] {
        &self.patients
    }

    pub fn get(&self, id: Uuid) -> Option<&PatientRecord> {
        self.patients.iter().find(|p| p.id == id)
    }

    /// Most recently created patient
    pub fn latest(&self) -> Option<&PatientRecord> {
        self.patients.first()
    }

    /// Look up by full UUID or unique prefix of its string form
    pub fn resolve(&self, id_or_prefix: &str) -> Result<Uuid> {
        let needle = id_or_prefix.trim().to_lowercase();
        if needle.is_empty() {
            return Err(Error::NotFound("empty patient id".into()));
        }

        let matches: Vec<Uuid> = self
            .patients
            .iter()
            .filter(|p| p.id.to_string().starts_with(&needle))
            .map(|p| p.id)
            .collect();

        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(Error::NotFound(format!("patient {}", id_or_prefix))),
            _ => Err(Error::Ambiguous(format!(
                "{} matches {} patients",
                id_or_prefix,
                matches.len()
            ))),
        }
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut PatientRecord> {
        self.patients
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("patient {}", id)))
    }

    /// Create a patient with the given name and optional identity fields
    pub fn create(&mut self, name: &str, details: PatientUpdate) -> Result<Uuid> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingName.into());
        }

        let now = Utc::now();
        let record = PatientRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            age: details.age,
            sex: non_empty(details.sex),
            location: non_empty(details.location),
            chief_complaint: non_empty(details.chief_complaint),
            history: non_empty(details.history),
            allergies: non_empty(details.allergies),
            medications: non_empty(details.medications),
            created_at: now,
            updated_at: now,
            vitals: Vec::new(),
            gcs: Vec::new(),
            notes: Vec::new(),
        };
        let id = record.id;
        self.patients.insert(0, record);
        self.save()?;

        tracing::info!("Created patient {}", id);
        Ok(id)
    }

    /// Apply a partial edit; only `Some` fields change
    pub fn update(&mut self, id: Uuid, changes: PatientUpdate) -> Result<()> {
        if let Some(name) = &changes.name {
            if name.trim().is_empty() {
                return Err(ValidationError::MissingName.into());
            }
        }

        let record = self.get_mut(id)?;
        if let Some(name) = changes.name {
            record.name = name.trim().to_string();
        }
        if changes.age.is_some() {
            record.age = changes.age;
        }
        if let Some(sex) = changes.sex {
            record.sex = non_empty(Some(sex));
        }
        if let Some(location) = changes.location {
            record.location = non_empty(Some(location));
        }
        if let Some(complaint) = changes.chief_complaint {
            record.chief_complaint = non_empty(Some(complaint));
        }
        if let Some(history) = changes.history {
            record.history = non_empty(Some(history));
        }
        if let Some(allergies) = changes.allergies {
            record.allergies = non_empty(Some(allergies));
        }
        if let Some(medications) = changes.medications {
            record.medications = non_empty(Some(medications));
        }
        record.updated_at = Utc::now();

        self.save()?;
        tracing::info!("Updated patient {}", id);
        Ok(())
    }

    pub fn delete(&mut self, id: Uuid) -> Result<PatientRecord> {
        let index = self
            .patients
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("patient {}", id)))?;
        let removed = self.patients.remove(index);
        self.save()?;

        tracing::info!("Deleted patient {}", id);
        Ok(removed)
    }

    pub fn add_vitals(&mut self, id: Uuid, vitals: VitalSigns) -> Result<()> {
        vitals.validate()?;
        let record = self.get_mut(id)?;
        record.vitals.insert(0, vitals);
        record.updated_at = Utc::now();
        self.save()
    }

    pub fn add_gcs(&mut self, id: Uuid, assessment: GcsAssessment) -> Result<()> {
        let record = self.get_mut(id)?;
        record.gcs.insert(0, assessment);
        record.updated_at = Utc::now();
        self.save()
    }

    pub fn add_note(&mut self, id: Uuid, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyNote.into());
        }
        let now = Utc::now();
        let record = self.get_mut(id)?;
        record.notes.insert(
            0,
            Note {
                time: display_time(now),
                iso: now,
                text: text.to_string(),
            },
        );
        record.updated_at = now;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};

    fn registry() -> PatientRegistry<MemoryStore> {
        PatientRegistry::load(MemoryStore::new())
    }

    #[test]
    fn test_create_and_list_newest_first() {
        let mut reg = registry();
        let a = reg.create("Alex Doe", PatientUpdate::default()).unwrap();
        let b = reg.create("Sam Roe", PatientUpdate::default()).unwrap();

        let ids: Vec<_> = reg.list().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(reg.latest().unwrap().name, "Sam Roe");
    }

    #[test]
    fn test_create_requires_name() {
        let mut reg = registry();
        let result = reg.create("   ", PatientUpdate::default());
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::MissingName))
        ));
        assert!(reg.list().is_empty());
    }

    #[test]
    fn test_update_only_touches_given_fields() {
        let mut reg = registry();
        let id = reg
            .create(
                "Alex Doe",
                PatientUpdate {
                    age: Some(54),
                    allergies: Some("Penicillin".into()),
                    ..PatientUpdate::default()
                },
            )
            .unwrap();

        reg.update(
            id,
            PatientUpdate {
                chief_complaint: Some("Chest pain".into()),
                ..PatientUpdate::default()
            },
        )
        .unwrap();

        let p = reg.get(id).unwrap();
        assert_eq!(p.age, Some(54));
        assert_eq!(p.allergies.as_deref(), Some("Penicillin"));
        assert_eq!(p.chief_complaint.as_deref(), Some("Chest pain"));
        assert!(p.updated_at >= p.created_at);
    }

    #[test]
    fn test_delete_and_missing() {
        let mut reg = registry();
        let id = reg.create("Alex Doe", PatientUpdate::default()).unwrap();
        reg.delete(id).unwrap();
        assert!(reg.get(id).is_none());
        assert!(matches!(reg.delete(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_resolve_prefix() {
        let mut reg = registry();
        let id = reg.create("Alex Doe", PatientUpdate::default()).unwrap();
        let full = id.to_string();

        assert_eq!(reg.resolve(&full).unwrap(), id);
        assert_eq!(reg.resolve(&full[..8]).unwrap(), id);
        assert_eq!(reg.resolve(&full[..8].to_uppercase()).unwrap(), id);
        assert!(matches!(reg.resolve("zzzz"), Err(Error::NotFound(_))));
        assert!(matches!(reg.resolve(""), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_resolve_ambiguous() {
        let mut reg = registry();
        for _ in 0..40 {
            reg.create("Patient", PatientUpdate::default()).unwrap();
        }
        // 40 random ids over 16 leading hex digits share at least one prefix
        let first_chars: Vec<char> = reg
            .list()
            .iter()
            .map(|p| p.id.to_string().chars().next().unwrap())
            .collect();
        let shared = first_chars
            .iter()
            .copied()
            .find(|c| first_chars.iter().filter(|d| **d == *c).count() > 1)
            .unwrap();
        assert!(matches!(
            reg.resolve(&shared.to_string()),
            Err(Error::Ambiguous(_))
        ));
    }

    #[test]
    fn test_vitals_validation() {
        let mut vitals = VitalSigns::taken_at(Utc::now());
        assert!(vitals.validate().is_err());

        vitals.heart_rate = Some(88);
        vitals.systolic = Some(120);
        vitals.diastolic = Some(80);
        assert!(vitals.validate().is_ok());
        assert_eq!(vitals.blood_pressure().as_deref(), Some("120/80"));

        vitals.spo2 = Some(101);
        assert!(vitals.validate().is_err());
        vitals.spo2 = Some(97);

        vitals.diastolic = Some(130);
        assert!(vitals.validate().is_err());
        vitals.diastolic = Some(80);

        vitals.temperature = Some(51.0);
        assert!(vitals.validate().is_err());

        vitals.temperature = Some(f32::NAN);
        assert!(matches!(
            vitals.validate(),
            Err(ValidationError::InvalidVitals(_))
        ));
        vitals.temperature = Some(36.8);
        assert!(vitals.validate().is_ok());

        vitals.glucose = Some(f32::NAN);
        assert!(vitals.validate().is_err());
    }

    #[test]
    fn test_parse_blood_pressure() {
        assert_eq!(parse_blood_pressure("120/80").unwrap(), (120, Some(80)));
        assert_eq!(parse_blood_pressure(" 90 ").unwrap(), (90, None));
        assert!(parse_blood_pressure("high").is_err());
        assert!(parse_blood_pressure("120/x").is_err());
    }

    #[test]
    fn test_gcs_total_and_severity() {
        let now = Utc::now();
        let full = GcsAssessment::new(now, 4, 5, 6).unwrap();
        assert_eq!(full.total(), 15);
        assert_eq!(full.severity(), GcsSeverity::Mild);
        assert_eq!(full.breakdown(), "E4 V5 M6 = 15");

        let moderate = GcsAssessment::new(now, 3, 3, 5).unwrap();
        assert_eq!(moderate.total(), 11);
        assert_eq!(moderate.severity(), GcsSeverity::Moderate);

        let minimal = GcsAssessment::new(now, 1, 1, 1).unwrap();
        assert_eq!(minimal.total(), 3);
        assert_eq!(minimal.severity(), GcsSeverity::Severe);

        assert!(GcsAssessment::new(now, 0, 5, 6).is_err());
        assert!(GcsAssessment::new(now, 4, 6, 6).is_err());
        assert!(GcsAssessment::new(now, 4, 5, 7).is_err());
    }

    #[test]
    fn test_observations_newest_first() {
        let mut reg = registry();
        let id = reg.create("Alex Doe", PatientUpdate::default()).unwrap();

        reg.add_note(id, "Found collapsed").unwrap();
        reg.add_note(id, "Bystander CPR in progress").unwrap();
        assert!(reg.add_note(id, "  ").is_err());

        let mut first = VitalSigns::taken_at(Utc::now());
        first.heart_rate = Some(40);
        let mut second = VitalSigns::taken_at(Utc::now());
        second.heart_rate = Some(72);
        reg.add_vitals(id, first).unwrap();
        reg.add_vitals(id, second).unwrap();

        let p = reg.get(id).unwrap();
        assert_eq!(p.notes[0].text, "Bystander CPR in progress");
        assert_eq!(p.notes.len(), 2);
        assert_eq!(p.vitals[0].heart_rate, Some(72));
    }

    #[test]
    fn test_registry_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        let mut reg = PatientRegistry::load(store.clone());
        let id = reg.create("Alex Doe", PatientUpdate::default()).unwrap();
        reg.add_gcs(id, GcsAssessment::new(Utc::now(), 2, 2, 4).unwrap())
            .unwrap();

        let reloaded = PatientRegistry::load(store);
        let p = reloaded.get(id).unwrap();
        assert_eq!(p.gcs.len(), 1);
        assert_eq!(p.gcs[0].total(), 8);
    }
}
