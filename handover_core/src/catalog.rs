//! Built-in resuscitation vocabularies.
//!
//! Rhythm codes, medications and interventions offered to the responder as
//! quick picks. Free-text entries are still accepted everywhere; the catalog
//! only canonicalises known spellings.

use once_cell::sync::Lazy;

/// A selectable catalog item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogItem {
    pub code: &'static str,
    pub label: &'static str,
    /// Rhythm is shockable (VF / pulseless VT)
    pub shockable: bool,
}

/// Resuscitation vocabularies
#[derive(Clone, Debug)]
pub struct Catalog {
    pub rhythms: Vec<CatalogItem>,
    pub medications: Vec<CatalogItem>,
    pub interventions: Vec<CatalogItem>,
}

/// Cached default catalog - built once and reused
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

const fn item(code: &'static str, label: &'static str) -> CatalogItem {
    CatalogItem {
        code,
        label,
        shockable: false,
    }
}

/// Builds the default catalog
pub fn build_default_catalog() -> Catalog {
    let rhythms = vec![
        CatalogItem {
            code: "VF",
            label: "Ventricular fibrillation",
            shockable: true,
        },
        CatalogItem {
            code: "pVT",
            label: "Pulseless ventricular tachycardia",
            shockable: true,
        },
        item("PEA", "Pulseless electrical activity"),
        item("Asystole", "Asystole"),
        item("Sinus", "Sinus rhythm"),
        item("Brady", "Bradycardia"),
        item("ROSC", "Return of spontaneous circulation"),
    ];

    let medications = vec![
        item("Adrenaline 1mg", "Adrenaline (epinephrine) 1 mg IV/IO"),
        item("Amiodarone 300mg", "Amiodarone 300 mg IV/IO"),
        item("Amiodarone 150mg", "Amiodarone 150 mg IV/IO"),
        item("Lidocaine 1mg/kg", "Lidocaine 1 mg/kg IV/IO"),
        item("Atropine 0.5mg", "Atropine 0.5 mg IV"),
        item("Naloxone 0.4mg", "Naloxone 0.4 mg IV/IM"),
        item("Sodium bicarbonate", "Sodium bicarbonate 8.4%"),
        item("Calcium chloride", "Calcium chloride 10%"),
    ];

    let interventions = vec![
        item("IV access", "Intravenous access"),
        item("IO access", "Intraosseous access"),
        item("OPA", "Oropharyngeal airway"),
        item("NPA", "Nasopharyngeal airway"),
        item("SGA", "Supraglottic airway"),
        item("ETT", "Endotracheal intubation"),
        item("BVM", "Bag-valve-mask ventilation"),
        item("Pads applied", "Defibrillation pads applied"),
        item("Mechanical CPR", "Mechanical CPR device"),
        item("Suction", "Airway suction"),
    ];

    Catalog {
        rhythms,
        medications,
        interventions,
    }
}

fn find<'a>(items: &'a [CatalogItem], code: &str) -> Option<&'a CatalogItem> {
    items
        .iter()
        .find(|item| item.code.eq_ignore_ascii_case(code.trim()))
}

/// Known code in canonical spelling, anything else trimmed and passed through
fn normalize(items: &[CatalogItem], code: &str) -> String {
    match find(items, code) {
        Some(known) => known.code.to_string(),
        None => code.trim().to_string(),
    }
}

impl Catalog {
    /// Find a rhythm by code, case-insensitively
    pub fn rhythm(&self, code: &str) -> Option<&CatalogItem> {
        find(&self.rhythms, code)
    }

    pub fn medication(&self, code: &str) -> Option<&CatalogItem> {
        find(&self.medications, code)
    }

    pub fn intervention(&self, code: &str) -> Option<&CatalogItem> {
        find(&self.interventions, code)
    }

    pub fn normalize_rhythm(&self, code: &str) -> String {
        normalize(&self.rhythms, code)
    }

    pub fn normalize_medication(&self, code: &str) -> String {
        normalize(&self.medications, code)
    }

    pub fn normalize_intervention(&self, code: &str) -> String {
        normalize(&self.interventions, code)
    }

    pub fn is_shockable(&self, code: &str) -> bool {
        self.rhythm(code).is_some_and(|r| r.shockable)
    }

    /// Quick-pick listing of every vocabulary, codes padded into a column
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (title, items) in [
            ("Rhythms", &self.rhythms),
            ("Medications", &self.medications),
            ("Interventions", &self.interventions),
        ] {
            out.push_str(title);
            out.push_str(":\n");
            for item in items.iter() {
                let marker = if item.shockable { "  [shockable]" } else { "" };
                out.push_str(&format!("  {:<20}{}{}\n", item.code, item.label, marker));
            }
        }
        out
    }
}
