//! Identity values carried across documents for the same variant index

use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{SynthError, SynthResult};
use crate::output::save_json;
use crate::record::SyntheticRecord;

const PERSONA_KEYWORDS: &[&str] = &[
    "name",
    "ssn",
    "social security",
    "address",
    "city",
    "state",
    "zip",
    "employer",
    "dob",
    "date of birth",
    "policy",
    "property",
    "wages",
    "salary",
    "income",
    "ein",
    "phone",
];

/// Label -> value pairs describing one synthetic person
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Persona {
    values: IndexMap<String, Value>,
}

impl Persona {
    /// Identity-like entries of a generated record, judged by label keywords
    pub fn from_record(record: &SyntheticRecord) -> Self {
        let values = record
            .iter()
            .filter(|(label, _)| is_persona_label(label))
            .map(|(label, field)| (label.to_string(), field.field_value.clone()))
            .collect();
        Self { values }
    }

    /// Newer values win
    pub fn merge(&mut self, newer: Persona) {
        self.values.extend(newer.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&Value> {
        self.values.get(label)
    }

    /// Prompt section asking the model to reuse this persona
    pub fn prompt_block(&self) -> Option<String> {
        if self.values.is_empty() {
            return None;
        }
        let persona_json = serde_json::to_string_pretty(&self.values).ok()?;
        Some(format!(
            "\n\n## BORROWER PERSONA\n\
             Below is the current borrower persona JSON. \
             You MUST use these details for all similar fields in the output, for example, \
             Social security number (SSN) and Employee's social security number would be the same \
             values for a specific borrower persona, \
             and update the persona if new personal identifiers are created or changed. \
             Do not invent new identities for this variant unless a new field is required.\n{}",
            persona_json
        ))
    }
}

fn is_persona_label(label: &str) -> bool {
    let label = label.to_lowercase();
    PERSONA_KEYWORDS.iter().any(|keyword| label.contains(keyword))
}

/// One persona file per variant index under `<output>/persona_variants/`
#[derive(Debug, Clone)]
pub struct PersonaStore {
    dir: PathBuf,
}

impl PersonaStore {
    pub fn new(output_root: &Path) -> Self {
        Self {
            dir: output_root.join("persona_variants"),
        }
    }

    pub fn path_for(&self, variant: usize) -> PathBuf {
        self.dir.join(format!("persona_variant_{}.json", variant))
    }

    /// Saved persona for `variant`; an unreadable file counts as no persona
    pub fn load(&self, variant: usize) -> Persona {
        let path = self.path_for(variant);
        if !path.exists() {
            return Persona::default();
        }
        match std::fs::read_to_string(&path)
            .map_err(|e| SynthError::file_io(path.display().to_string(), e))
            .and_then(|content| {
                serde_json::from_str::<IndexMap<String, Value>>(&content).map_err(|e| {
                    SynthError::document_format_with_source(path.display().to_string(), "invalid persona", e)
                })
            }) {
            Ok(values) => {
                debug!("Loaded persona {} ({} values)", variant, values.len());
                Persona { values }
            }
            Err(e) => {
                warn!("⚠️  Ignoring persona file: {}", e);
                Persona::default()
            }
        }
    }

    pub fn save(&self, variant: usize, persona: &Persona) -> SynthResult<()> {
        save_json(&persona.values, &self.path_for(variant), "Persona")
    }

    /// Merge identity values from a new record into the stored persona
    pub fn update(&self, variant: usize, record: &SyntheticRecord) -> SynthResult<Persona> {
        let mut persona = self.load(variant);
        persona.merge(Persona::from_record(record));
        self.save(variant, &persona)?;
        Ok(persona)
    }
}
