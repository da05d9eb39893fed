use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{load_document, terminal_fields, widget_states};
use crate::error::{SynthError, SynthResult};
use crate::output::save_json;

/// AcroForm field type, serialized with the PDF name (`/Tx`, `/Btn`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "/Tx")]
    Text,
    #[serde(rename = "/Btn")]
    Button,
    #[serde(rename = "/Ch")]
    Choice,
    #[serde(rename = "/Sig")]
    Signature,
}

impl FieldType {
    pub fn from_pdf_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Tx" => Some(FieldType::Text),
            b"Btn" => Some(FieldType::Button),
            b"Ch" => Some(FieldType::Choice),
            b"Sig" => Some(FieldType::Signature),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "/Tx",
            FieldType::Button => "/Btn",
            FieldType::Choice => "/Ch",
            FieldType::Signature => "/Sig",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the catalog file stores per field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_type: Option<FieldType>,
    /// Appearance states of a button, e.g. `["/1", "/Off"]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub spec: FieldSpec,
}

/// Ordered set of the fields a fillable document exposes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldCatalog {
    fields: IndexMap<String, FieldSpec>,
}

impl FieldCatalog {
    /// Read every terminal AcroForm field of `path`
    pub fn extract(path: &Path) -> SynthResult<Self> {
        let doc = load_document(path)?;
        let nodes = terminal_fields(&doc, path)?;

        let mut fields = IndexMap::new();
        for node in nodes {
            let mut possible_values = Vec::new();
            if node.field_type == Some(FieldType::Button) {
                for widget in &node.widgets {
                    for state in widget_states(&doc, *widget) {
                        let state = format!("/{}", state);
                        if !possible_values.contains(&state) {
                            possible_values.push(state);
                        }
                    }
                }
            }
            fields.insert(
                node.name,
                FieldSpec {
                    field_type: node.field_type,
                    possible_values,
                },
            );
        }

        info!("📋 PDF AcroForm fields were extracted successfully ({} fields)", fields.len());
        Ok(Self { fields })
    }

    /// Catalog file kept next to the source document
    pub fn sidecar_path(document: &Path) -> PathBuf {
        let stem = document_stem(document);
        document.with_file_name(format!("{}_field_mappings.json", stem))
    }

    /// Reuse the saved catalog when present, otherwise extract and save it
    pub fn load_or_extract(document: &Path) -> SynthResult<Self> {
        let sidecar = Self::sidecar_path(document);
        if sidecar.exists() {
            let catalog = Self::load(&sidecar)?;
            info!("Field mappings were read from {}", sidecar.display());
            return Ok(catalog);
        }
        let catalog = Self::extract(document)?;
        catalog.save(&sidecar)?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> SynthResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SynthError::file_io(path.display().to_string(), e))?;
        serde_json::from_str(&content).map_err(|e| {
            SynthError::document_format_with_source(path.display().to_string(), "invalid field catalog", e)
        })
    }

    pub fn save(&self, path: &Path) -> SynthResult<()> {
        save_json(self, path, "PDF AcroForm fields")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.fields.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&FieldSpec> {
        self.fields.get(identifier)
    }

    pub fn field_type(&self, identifier: &str) -> Option<FieldType> {
        self.fields.get(identifier).and_then(|spec| spec.field_type)
    }

    /// Field identifiers in document order
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = FormField> + '_ {
        self.fields.iter().map(|(name, spec)| FormField {
            name: name.clone(),
            spec: spec.clone(),
        })
    }

    /// Fields that carry a type and can receive a value
    pub fn typed_count(&self) -> usize {
        self.fields.values().filter(|spec| spec.field_type.is_some()).count()
    }

    /// Split the typed fields into catalogs of at most `size` entries
    pub fn chunks(&self, size: usize) -> Vec<FieldCatalog> {
        let typed: Vec<(&String, &FieldSpec)> = self
            .fields
            .iter()
            .filter(|(_, spec)| spec.field_type.is_some())
            .collect();
        typed
            .chunks(size.max(1))
            .map(|chunk| FieldCatalog {
                fields: chunk
                    .iter()
                    .map(|(name, spec)| ((*name).clone(), (*spec).clone()))
                    .collect(),
            })
            .collect()
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl FromIterator<(String, FieldSpec)> for FieldCatalog {
    fn from_iter<I: IntoIterator<Item = (String, FieldSpec)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Ordered field identifiers of a fillable document
pub fn extract_field_identifiers(path: &Path) -> SynthResult<Vec<String>> {
    Ok(FieldCatalog::extract(path)?.identifiers().map(str::to_string).collect())
}

/// Document type name: the file stem of the source document
pub fn document_stem(document: &Path) -> String {
    document
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}
