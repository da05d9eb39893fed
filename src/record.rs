use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::error::SynthResult;
use crate::mapping::FieldMap;
use crate::output::save_json;
use crate::pdf::{FieldCatalog, FieldType};

/// One generated value and the field it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub field_name: String,
    pub field_type: Option<FieldType>,
    pub field_value: Value,
}

/// Generated values for one variant, keyed by human-readable label.
///
/// Serialized as `{ label: { field_name, field_type, field_value } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyntheticRecord {
    fields: IndexMap<String, RecordField>,
}

/// Text form of a JSON value as it should appear in a form field
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

impl SyntheticRecord {
    /// Attach labels and field types to a flat identifier -> value response.
    ///
    /// Keys that resolve to no known field are dropped with a warning.
    pub fn from_response(response: &Map<String, Value>, labels: &FieldMap, catalog: &FieldCatalog) -> Self {
        let mut record = SyntheticRecord::default();

        for (key, value) in response {
            let Some((identifier, label)) = labels.resolve_key(key) else {
                warn!("No label found for field: {}", key);
                continue;
            };
            record.fields.insert(
                label.to_string(),
                RecordField {
                    field_name: identifier.to_string(),
                    field_type: catalog.field_type(identifier),
                    field_value: value.clone(),
                },
            );
        }

        info!(
            "Successfully mapped {} fields out of {} total fields",
            record.len(),
            response.len()
        );
        record
    }

    pub fn insert(&mut self, label: impl Into<String>, field: RecordField) {
        self.fields.insert(label.into(), field);
    }

    /// Add every entry of `other`, replacing entries with the same label
    pub fn merge(&mut self, other: SyntheticRecord) {
        self.fields.extend(other.fields);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&RecordField> {
        self.fields.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordField)> {
        self.fields.iter().map(|(label, field)| (label.as_str(), field))
    }

    /// Field identifier -> text value, the shape the form filler consumes
    pub fn values_by_identifier(&self) -> IndexMap<String, String> {
        self.fields
            .values()
            .map(|field| (field.field_name.clone(), value_to_text(&field.field_value)))
            .collect()
    }

    pub fn save(&self, path: &Path, data_flag: &str) -> SynthResult<()> {
        save_json(self, path, data_flag)
    }
}
