//! Label <-> field identifier lookup table

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{SynthError, SynthResult};
use crate::output::save_json;
use crate::pdf::fields::document_stem;
use crate::pdf::FieldCatalog;
use crate::record::value_to_text;

/// Human-readable labels for a document's fields.
///
/// Loaded once per document and never modified afterwards. Labels are unique:
/// a repeated label is disambiguated with the field's own name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    by_label: IndexMap<String, String>,
    by_id: IndexMap<String, String>,
}

fn last_segment(identifier: &str) -> &str {
    identifier.rsplit('.').next().unwrap_or(identifier)
}

/// Last dotted segment -> identifier, for segments only one field uses
fn unique_segments(catalog: &FieldCatalog) -> HashMap<&str, &str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for identifier in catalog.identifiers() {
        *counts.entry(last_segment(identifier)).or_default() += 1;
    }
    catalog
        .identifiers()
        .filter(|id| counts.get(last_segment(id)) == Some(&1))
        .map(|id| (last_segment(id), id))
        .collect()
}

impl FieldMap {
    /// Build from identifier -> label pairs (the on-disk shape)
    pub fn from_labels<I>(labels: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = FieldMap::default();
        for (identifier, label) in labels {
            if map.by_id.contains_key(&identifier) {
                continue;
            }
            let label = label.trim().to_string();
            let label = if map.by_label.contains_key(&label) {
                let unique = format!("{} ({})", label, last_segment(&identifier));
                tracing::debug!("Duplicate label '{}', using '{}'", label, unique);
                unique
            } else {
                label
            };
            map.by_label.insert(label.clone(), identifier.clone());
            map.by_id.insert(identifier, label);
        }
        map
    }

    /// Labels file kept next to the source document
    pub fn sidecar_path(document: &Path) -> PathBuf {
        document.with_file_name(format!("{}_human_readable_labels.json", document_stem(document)))
    }

    pub fn load(path: &Path) -> SynthResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SynthError::file_io(path.display().to_string(), e))?;
        let raw: Map<String, Value> = serde_json::from_str(&content).map_err(|e| {
            SynthError::document_format_with_source(path.display().to_string(), "invalid labels file", e)
        })?;
        let map = Self::from_labels(raw.into_iter().map(|(id, label)| (id, value_to_text(&label))));
        info!("🏷️  Human readable labels were read from {} ({} fields)", path.display(), map.len());
        Ok(map)
    }

    pub fn save(&self, path: &Path) -> SynthResult<()> {
        save_json(&self.by_id, path, "Human readable labels")
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn label_for(&self, identifier: &str) -> Option<&str> {
        self.by_id.get(identifier).map(String::as_str)
    }

    pub fn identifier_for(&self, label: &str) -> Option<&str> {
        self.by_label.get(label).map(String::as_str)
    }

    /// (identifier, label) pairs in document order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_id.iter().map(|(id, label)| (id.as_str(), label.as_str()))
    }

    /// Translate labels into (identifier, label) pairs.
    ///
    /// Labels without a mapping are dropped with a warning.
    pub fn map_labels<S: AsRef<str>>(&self, labels: &[S]) -> Vec<(String, String)> {
        let mut mapped = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            match self.identifier_for(label) {
                Some(identifier) => mapped.push((identifier.to_string(), label.to_string())),
                None => warn!("No field mapping for label '{}', skipping", label),
            }
        }
        mapped
    }

    /// Find the field a generated key refers to.
    ///
    /// Tries the exact identifier, then the key as a label, then an identifier
    /// whose trailing dotted segments equal the key. An ambiguous trailing
    /// match resolves to nothing.
    pub fn resolve_key(&self, key: &str) -> Option<(&str, &str)> {
        if key.is_empty() {
            return None;
        }
        if let Some((id, label)) = self.by_id.get_key_value(key) {
            return Some((id.as_str(), label.as_str()));
        }
        if let Some((label, id)) = self.by_label.get_key_value(key) {
            return Some((id.as_str(), label.as_str()));
        }

        let dotted = format!(".{}", key);
        let mut candidates = self.by_id.iter().filter(|(id, _)| id.ends_with(&dotted));
        match (candidates.next(), candidates.next()) {
            (Some((id, label)), None) => {
                info!("Matched partial key '{}' to full key '{}'", key, id);
                Some((id.as_str(), label.as_str()))
            }
            (Some(_), Some(_)) => {
                warn!("Key '{}' matches more than one field, skipping", key);
                None
            }
            _ => None,
        }
    }

    /// Align a labels table written by hand (or by an earlier run) with the
    /// fields actually present in `catalog`.
    ///
    /// Identifiers found in the catalog are kept. The rest are matched on their
    /// last dotted segment when exactly one catalog field shares it, and
    /// dropped with a warning otherwise.
    pub fn align_to(&self, catalog: &FieldCatalog) -> FieldMap {
        let by_segment = unique_segments(catalog);
        let mut aligned: IndexMap<String, String> = IndexMap::new();
        for (id, label) in &self.by_id {
            let full = if catalog.contains(id) {
                Some(id.as_str())
            } else {
                by_segment.get(last_segment(id)).copied()
            };
            match full {
                Some(full) if !aligned.contains_key(full) => {
                    if full != id.as_str() {
                        info!("Label '{}' moved from {} to {}", label, id, full);
                    }
                    aligned.insert(full.to_string(), label.clone());
                }
                Some(_) => warn!("Field {} is labelled twice, keeping the first label", id),
                None => warn!("Field {} is not in the document, skipping", id),
            }
        }
        FieldMap::from_labels(aligned)
    }

    /// Only the entries whose identifier is in `catalog`
    pub fn restrict_to(&self, catalog: &FieldCatalog) -> FieldMap {
        FieldMap::from_labels(
            self.by_id
                .iter()
                .filter(|(id, _)| catalog.contains(id))
                .map(|(id, label)| (id.clone(), label.clone())),
        )
    }

    /// Keep the entries of an AI label response that name real fields.
    ///
    /// Exact identifier matches are kept. When fewer than 70% of the keys match
    /// exactly, the rest are matched on their last dotted segment.
    pub fn reconcile(response: &Map<String, Value>, catalog: &FieldCatalog) -> FieldMap {
        let mut remapped: IndexMap<String, String> = IndexMap::new();
        for (key, label) in response {
            if catalog.contains(key) {
                remapped.insert(key.clone(), value_to_text(label));
            } else {
                warn!("Field {} not found in field mappings, skipping", key);
            }
        }

        if (remapped.len() as f64) < response.len() as f64 * 0.7 {
            info!(
                "Only {}/{} exact matches found, attempting suffix matching...",
                remapped.len(),
                response.len()
            );

            let suffix_to_full = unique_segments(catalog);

            for (key, label) in response {
                if catalog.contains(key) {
                    continue;
                }
                if let Some(full) = suffix_to_full.get(last_segment(key)) {
                    if !remapped.contains_key(*full) {
                        info!("Suffix matched {} -> {}", key, full);
                        remapped.insert(full.to_string(), value_to_text(label));
                    }
                }
            }
        }

        info!("Final mapping: {} fields mapped successfully", remapped.len());
        FieldMap::from_labels(remapped)
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.by_id).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{FieldSpec, FieldType};
    use serde_json::json;

    fn catalog(names: &[&str]) -> FieldCatalog {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    FieldSpec {
                        field_type: Some(FieldType::Text),
                        possible_values: Vec::new(),
                    },
                )
            })
            .collect()
    }

    fn sample() -> FieldMap {
        FieldMap::from_labels(vec![
            ("form[0].Page1[0].f1_01[0]".to_string(), "Employee name".to_string()),
            ("form[0].Page1[0].f1_02[0]".to_string(), "Employee SSN".to_string()),
        ])
    }

    #[test]
    fn map_labels_drops_unknown_labels() {
        let map = sample();
        let mapped = map.map_labels(&["Employee SSN", "Favourite colour", "Employee name"]);
        assert_eq!(
            mapped,
            vec![
                ("form[0].Page1[0].f1_02[0]".to_string(), "Employee SSN".to_string()),
                ("form[0].Page1[0].f1_01[0]".to_string(), "Employee name".to_string()),
            ]
        );
    }

    #[test]
    fn resolve_key_tries_exact_label_then_partial() {
        let map = sample();
        assert_eq!(map.resolve_key("form[0].Page1[0].f1_01[0]").unwrap().1, "Employee name");
        assert_eq!(map.resolve_key("f1_02[0]").unwrap().1, "Employee SSN");
        assert_eq!(map.resolve_key("Page1[0].f1_02[0]").unwrap().1, "Employee SSN");
        assert_eq!(map.resolve_key("Employee name").unwrap().0, "form[0].Page1[0].f1_01[0]");
        assert!(map.resolve_key("f9_99[0]").is_none());
    }

    #[test]
    fn partial_key_stops_at_segment_boundary() {
        let map = FieldMap::from_labels(vec![
            ("form[0].LastName[0]".to_string(), "Last name".to_string()),
            ("form[0].Name[0]".to_string(), "Name".to_string()),
        ]);
        assert_eq!(map.resolve_key("Name[0]"), Some(("form[0].Name[0]", "Name")));
        assert!(map.resolve_key("ame[0]").is_none());
    }

    #[test]
    fn exact_label_wins_over_substring_of_identifier() {
        let map = FieldMap::from_labels(vec![
            ("form[0].f1[0]".to_string(), "Name".to_string()),
            ("form[0].EmployeeName[0]".to_string(), "Employee name".to_string()),
        ]);
        assert_eq!(map.resolve_key("Name"), Some(("form[0].f1[0]", "Name")));
    }

    #[test]
    fn ambiguous_partial_key_is_skipped() {
        let map = FieldMap::from_labels(vec![
            ("p1[0].total[0]".to_string(), "Page 1 total".to_string()),
            ("p2[0].total[0]".to_string(), "Page 2 total".to_string()),
        ]);
        assert!(map.resolve_key("total[0]").is_none());
    }

    #[test]
    fn align_to_completes_short_identifiers_and_drops_ghosts() {
        let catalog = catalog(&["name", "employee.ssn", "married"]);
        let map = FieldMap::from_labels(vec![
            ("name".to_string(), "Employee name".to_string()),
            ("ssn".to_string(), "SSN".to_string()),
            ("ghost[0]".to_string(), "Ghost".to_string()),
        ]);
        let aligned = map.align_to(&catalog);
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned.identifier_for("SSN"), Some("employee.ssn"));
        assert!(aligned.identifier_for("Ghost").is_none());
    }

    #[test]
    fn duplicate_labels_stay_distinct() {
        let map = FieldMap::from_labels(vec![
            ("a.f1[0]".to_string(), "Amount".to_string()),
            ("a.f2[0]".to_string(), "Amount".to_string()),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.identifier_for("Amount"), Some("a.f1[0]"));
        assert_eq!(map.identifier_for("Amount (f2[0])"), Some("a.f2[0]"));
    }

    #[test]
    fn reconcile_keeps_exact_matches() {
        let catalog = catalog(&["p.f1[0]", "p.f2[0]", "p.f3[0]"]);
        let response = json!({"p.f1[0]": "Name", "p.f2[0]": "City", "p.f3[0]": "Zip", "bogus": "X"});
        let map = FieldMap::reconcile(response.as_object().unwrap(), &catalog);
        assert_eq!(map.len(), 3);
        assert!(map.identifier_for("X").is_none());
    }

    #[test]
    fn reconcile_falls_back_to_suffix_matching() {
        let catalog = catalog(&["top[0].Page1[0].f1_01[0]", "top[0].Page1[0].f1_02[0]", "top[0].Page2[0].c1_1[0]"]);
        let response = json!({"f1_01[0]": "Name", "Page1.f1_02[0]": "Address", "c1_1[0]": "Married"});
        let map = FieldMap::reconcile(response.as_object().unwrap(), &catalog);
        assert_eq!(map.len(), 3);
        assert_eq!(map.label_for("top[0].Page2[0].c1_1[0]"), Some("Married"));
    }

    #[test]
    fn labels_file_roundtrip_keeps_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("w2_human_readable_labels.json");
        let map = sample();
        map.save(&path).unwrap();
        let loaded = FieldMap::load(&path).unwrap();
        assert_eq!(loaded, map);
        assert_eq!(loaded.iter().next().unwrap().1, "Employee name");
    }
}
