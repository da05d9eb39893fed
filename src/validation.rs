//! Fill verification: re-read a filled PDF and compare it with the record it was filled from

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::SynthResult;
use crate::output::save_json;
use crate::pdf::{read_field_values, FieldType};
use crate::record::{value_to_text, SyntheticRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The document holds a different value
    Mismatch,
    /// The document holds no value for the field
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub field_name: String,
    pub label: String,
    pub issue: IssueKind,
    pub expected: String,
    pub actual: Option<String>,
}

/// Verification result for one filled variant
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleValidation {
    pub sample_id: String,
    pub verified: usize,
    pub mismatched: usize,
    pub missing: usize,
    /// Signature fields are never filled and not checked
    pub skipped: usize,
    pub issues: Vec<FieldIssue>,
}

impl SampleValidation {
    pub fn checked(&self) -> usize {
        self.verified + self.mismatched + self.missing
    }

    pub fn is_successful(&self) -> bool {
        self.mismatched == 0 && self.missing == 0
    }

    /// Percentage of checked fields that hold the expected value
    pub fn success_rate(&self) -> f64 {
        if self.checked() == 0 {
            return 100.0;
        }
        percentage(self.verified, self.checked())
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}

/// Checkbox and radio values are stored as state names, so compare intent
fn button_matches(expected: &str, actual: &str) -> bool {
    let wanted = expected.trim().trim_start_matches('/');
    if wanted == actual {
        return true;
    }
    match wanted.to_lowercase().as_str() {
        "" | "off" | "no" | "false" | "0" | "unchecked" => actual == "Off",
        "yes" | "on" | "true" | "x" | "checked" | "1" => actual != "Off",
        _ => false,
    }
}

/// Compare every value of `record` with what `pdf` now contains
pub fn verify_fill(pdf: &Path, record: &SyntheticRecord, sample_id: &str) -> SynthResult<SampleValidation> {
    let stored = read_field_values(pdf)?;
    let mut result = SampleValidation {
        sample_id: sample_id.to_string(),
        ..Default::default()
    };

    for (label, field) in record.iter() {
        let expected = value_to_text(&field.field_value);
        let actual = stored.get(&field.field_name);

        let matches = match (field.field_type, actual) {
            (Some(FieldType::Signature), _) => {
                result.skipped += 1;
                continue;
            }
            (Some(FieldType::Button), Some(actual)) => button_matches(&expected, actual),
            (_, Some(actual)) => actual == &expected,
            (_, None) if expected.is_empty() => true,
            (_, None) => {
                result.missing += 1;
                result.issues.push(FieldIssue {
                    field_name: field.field_name.clone(),
                    label: label.to_string(),
                    issue: IssueKind::Missing,
                    expected,
                    actual: None,
                });
                continue;
            }
        };

        if matches {
            result.verified += 1;
        } else {
            result.mismatched += 1;
            result.issues.push(FieldIssue {
                field_name: field.field_name.clone(),
                label: label.to_string(),
                issue: IssueKind::Mismatch,
                expected,
                actual: actual.cloned(),
            });
        }
    }

    if result.is_successful() {
        info!("✅ Verified {} fields in {:?}", result.verified, pdf);
    } else {
        warn!(
            "⚠️  {}: {} verified, {} mismatched, {} missing",
            sample_id, result.verified, result.mismatched, result.missing
        );
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub samples_processed: usize,
    pub successful_samples: usize,
    pub failed_samples: usize,
    /// Share of fully verified samples, in percent
    pub success_rate: f64,
    /// Share of verified fields across all samples, in percent
    pub field_success_rate: f64,
    pub most_problematic_fields: Vec<(String, usize)>,
}

/// Per-document collection of sample verifications
#[derive(Debug, Clone)]
pub struct ValidationReport {
    document_type: String,
    output_dir: PathBuf,
    samples: Vec<SampleValidation>,
}

#[derive(Serialize)]
struct ReportFile<'a> {
    document_type: &'a str,
    report_generated_at: String,
    validation_summary: ValidationSummary,
    sample_reports: &'a [SampleValidation],
}

impl ValidationReport {
    pub fn new(output_dir: &Path, document_type: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            output_dir: output_dir.to_path_buf(),
            samples: Vec::new(),
        }
    }

    pub fn add_sample(&mut self, sample: SampleValidation) {
        self.samples.push(sample);
    }

    pub fn summary(&self) -> ValidationSummary {
        let successful = self.samples.iter().filter(|s| s.is_successful()).count();
        let checked: usize = self.samples.iter().map(SampleValidation::checked).sum();
        let verified: usize = self.samples.iter().map(|s| s.verified).sum();

        let mut issue_counts: IndexMap<&str, usize> = IndexMap::new();
        for issue in self.samples.iter().flat_map(|s| &s.issues) {
            *issue_counts.entry(issue.field_name.as_str()).or_default() += 1;
        }
        let mut problematic: Vec<(String, usize)> = issue_counts
            .into_iter()
            .map(|(field, count)| (field.to_string(), count))
            .collect();
        problematic.sort_by(|a, b| b.1.cmp(&a.1));
        problematic.truncate(10);

        ValidationSummary {
            samples_processed: self.samples.len(),
            successful_samples: successful,
            failed_samples: self.samples.len() - successful,
            success_rate: if self.samples.is_empty() {
                0.0
            } else {
                percentage(successful, self.samples.len())
            },
            field_success_rate: if checked == 0 { 0.0 } else { percentage(verified, checked) },
            most_problematic_fields: problematic,
        }
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        info!("============================================================");
        info!("VALIDATION REPORT: {}", self.document_type);
        info!("Samples Processed: {}", summary.samples_processed);
        info!("Success Rate: {}%", summary.success_rate);
        info!("Field Success Rate: {}%", summary.field_success_rate);
        for (field, count) in &summary.most_problematic_fields {
            info!("  - {}: {} issues", field, count);
        }
        info!("============================================================");
    }

    /// Write `validation_report.json` into the document's output directory
    pub fn save(&self) -> SynthResult<PathBuf> {
        let path = self.output_dir.join("validation_report.json");
        let file = ReportFile {
            document_type: &self.document_type,
            report_generated_at: Utc::now().to_rfc3339(),
            validation_summary: self.summary(),
            sample_reports: &self.samples,
        };
        save_json(&file, &path, "Validation report")?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(id: &str, verified: usize, issues: &[(&str, IssueKind)]) -> SampleValidation {
        let mut sample = SampleValidation {
            sample_id: id.to_string(),
            verified,
            ..Default::default()
        };
        for (field, kind) in issues {
            match kind {
                IssueKind::Mismatch => sample.mismatched += 1,
                IssueKind::Missing => sample.missing += 1,
            }
            sample.issues.push(FieldIssue {
                field_name: field.to_string(),
                label: field.to_string(),
                issue: *kind,
                expected: "x".to_string(),
                actual: None,
            });
        }
        sample
    }

    #[test]
    fn button_intent_is_compared() {
        assert!(button_matches("/1", "1"));
        assert!(button_matches("Yes", "1"));
        assert!(button_matches("false", "Off"));
        assert!(!button_matches("true", "Off"));
        assert!(!button_matches("Choice1", "Choice2"));
    }

    #[test]
    fn summary_ranks_problem_fields() {
        let mut report = ValidationReport::new(Path::new("unused"), "W2");
        report.add_sample(sample("Sample1", 3, &[]));
        report.add_sample(sample("Sample2", 1, &[("ssn", IssueKind::Mismatch), ("zip", IssueKind::Missing)]));
        report.add_sample(sample("Sample3", 2, &[("ssn", IssueKind::Missing)]));

        let summary = report.summary();
        assert_eq!(summary.samples_processed, 3);
        assert_eq!(summary.successful_samples, 1);
        assert_eq!(summary.success_rate, 33.33);
        assert_eq!(summary.field_success_rate, 66.67);
        assert_eq!(summary.most_problematic_fields[0], ("ssn".to_string(), 2));
    }

    #[test]
    fn report_is_written_next_to_the_samples() {
        let temp_dir = tempdir().unwrap();
        let mut report = ValidationReport::new(temp_dir.path(), "W2");
        report.add_sample(sample("Sample1", 2, &[]));

        let path = report.save().unwrap();
        assert_eq!(path, temp_dir.path().join("validation_report.json"));
        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved["validation_summary"]["success_rate"], 100.0);
        assert_eq!(saved["sample_reports"][0]["sample_id"], "Sample1");
    }
}
