use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::ai::parse::{flatten, is_nested, parse_object};
use crate::ai::{variability_seed, CompletionClient, CompletionRequest, ContentPart};
use crate::config::GenerationConfig;
use crate::error::{GenerationFailure, SynthError, SynthResult};
use crate::logging::PerformanceTimer;
use crate::mapping::FieldMap;
use crate::pdf::FieldCatalog;
use crate::prompts::format_prompt;
use crate::record::SyntheticRecord;

fn labels_system_prompt(document_type: &str) -> String {
    format!(
        "You are a document understanding expert. \
         Your task is to analyze {document_type} PDFs and map each AcroForm field name to its corresponding \
         human-readable label based on the form's layout and printed instructions.\n\n\
         Use visual cues from the form such as field placement, surrounding text, section titles and line numbers \
         to determine the most accurate and concise label for each field. \
         Maintain accuracy with field numbers and context, even if the layout spans multiple pages.\n\n\
         Be accurate, consistent, and align labels with the official {document_type} terminology as it appears on the form.",
        document_type = document_type
    )
}

fn data_system_prompt(document_type: &str, seed: u32) -> String {
    format!(
        "You are generating realistic synthetic data for the following document type: {}. \
         Ensure no two outputs are alike (i.e) No distinguishable fields are the same across outputs. \
         Use the given seed for variability: {}.",
        document_type, seed
    )
}

/// Talks to the completion service on behalf of the form pipeline
pub struct SyntheticDataGenerator<'a, C: CompletionClient> {
    client: &'a C,
    data_deployment: String,
    vision_deployment: String,
    settings: GenerationConfig,
}

impl<'a, C: CompletionClient> SyntheticDataGenerator<'a, C> {
    pub fn new(
        client: &'a C,
        data_deployment: impl Into<String>,
        vision_deployment: impl Into<String>,
        settings: GenerationConfig,
    ) -> Self {
        Self {
            client,
            data_deployment: data_deployment.into(),
            vision_deployment: vision_deployment.into(),
            settings,
        }
    }

    /// Ask the vision deployment for a label per field, then keep only the
    /// labels that name real fields of `catalog`.
    ///
    /// `page_images` are PNG renderings of the field-name overlay; the request
    /// still goes out without them when none could be produced.
    pub async fn generate_labels(
        &self,
        document_type: &str,
        prompt_template: &str,
        catalog: &FieldCatalog,
        page_images: &[PathBuf],
    ) -> SynthResult<FieldMap> {
        let _timer = PerformanceTimer::start(format!("label generation for {}", document_type));

        let prompt = format_prompt(prompt_template, &[("document_type", document_type)])?;
        let mut request = CompletionRequest::text(
            self.vision_deployment.as_str(),
            labels_system_prompt(document_type),
            format!(
                "{}\n\n### AcroForm Field Mappings JSON:\n```json\n{}\n```",
                prompt,
                catalog.to_pretty_json()
            ),
        )
        .with_sampling(self.settings.labels_temperature, self.settings.labels_max_tokens);

        for image in page_images {
            let bytes = std::fs::read(image).map_err(|e| SynthError::file_io(image.display().to_string(), e))?;
            request.user.push(ContentPart::PngImage(STANDARD.encode(bytes)));
        }
        info!(
            "🏷️  Requesting human readable labels for {} ({} fields, {} page images)",
            document_type,
            catalog.len(),
            page_images.len()
        );

        let completion = self.client.complete(&request).await?;
        let response = parse_object(&completion.content)?;
        let labels = FieldMap::reconcile(&response, catalog);
        if labels.is_empty() {
            return Err(SynthError::generation(
                GenerationFailure::MissingKeys,
                format!("label response for {} names none of the document's fields", document_type),
            ));
        }

        info!("Human readable labels have been generated successfully!");
        Ok(labels)
    }

    /// One variant of synthetic values for a document.
    ///
    /// `prompt` is the fully formatted data-generation prompt. Large forms are
    /// generated chunk by chunk and the chunk records merged.
    pub async fn generate_record(
        &self,
        document_type: &str,
        prompt: &str,
        catalog: &FieldCatalog,
        labels: &FieldMap,
        data_flag: &str,
    ) -> SynthResult<SyntheticRecord> {
        let _timer = PerformanceTimer::start(format!("data generation for {}", data_flag));

        let typed = catalog.typed_count();
        let record = if typed > self.settings.chunk_threshold {
            info!("Large form detected ({} fields). Using chunked processing.", typed);
            self.generate_chunked(document_type, catalog, labels, data_flag).await?
        } else {
            let response = self.request_values(document_type, prompt, data_flag).await?;
            SyntheticRecord::from_response(&response, labels, catalog)
        };

        if record.is_empty() {
            return Err(SynthError::generation(
                GenerationFailure::MissingKeys,
                format!("no generated key for {} matched a known field", data_flag),
            ));
        }
        Ok(record)
    }

    async fn generate_chunked(
        &self,
        document_type: &str,
        catalog: &FieldCatalog,
        labels: &FieldMap,
        data_flag: &str,
    ) -> SynthResult<SyntheticRecord> {
        let chunks = catalog.chunks(self.settings.chunk_size);
        info!(
            "Processing {} fields in {} chunks of {} fields each",
            catalog.typed_count(),
            chunks.len(),
            self.settings.chunk_size
        );

        let mut combined = SyntheticRecord::default();
        for (index, chunk) in chunks.iter().enumerate() {
            let number = index + 1;
            let chunk_labels = labels.restrict_to(chunk);
            let prompt = format!(
                "Generate synthetic data for {} fields (chunk {}/{}).\n\n\
                 Field mappings for this chunk:\n{}\n\n\
                 Human readable labels for this chunk:\n{}\n\n\
                 Generate realistic, consistent data for these {} fields only.\n\
                 Ensure data is appropriate for the document type and field labels.\n\
                 Return as a JSON object with field names as keys and values as strings.",
                document_type,
                number,
                chunks.len(),
                chunk.to_pretty_json(),
                chunk_labels.to_pretty_json(),
                chunk.len()
            );

            let response = self
                .request_values(
                    &format!("{} (chunk {})", document_type, number),
                    &prompt,
                    &format!("{} - Chunk {}", data_flag, number),
                )
                .await?;
            let record = SyntheticRecord::from_response(&response, labels, catalog);
            info!("Chunk {} completed: {} fields processed", number, record.len());
            combined.merge(record);
        }

        info!("Chunked processing completed: {} total fields processed", combined.len());
        Ok(combined)
    }

    /// One completion call returning a flat identifier -> value object
    async fn request_values(&self, document_type: &str, prompt: &str, data_flag: &str) -> SynthResult<Map<String, Value>> {
        let seed = variability_seed();
        let request = CompletionRequest::text(
            self.data_deployment.as_str(),
            data_system_prompt(document_type, seed),
            format!("{}\n\n### VARIABILITY NOTE\nRandomization seed: {}", prompt, seed),
        )
        .with_sampling(self.settings.data_temperature, self.settings.data_max_tokens);

        debug!("Requesting values for {} (seed {})", data_flag, seed);
        let completion = self.client.complete(&request).await?;
        let response = parse_object(&completion.content)?;

        if is_nested(&response) {
            info!("Detected nested response structure, flattening...");
            Ok(flatten(&response))
        } else {
            Ok(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Completion;
    use crate::config::SynthConfig;
    use crate::pdf::{FieldSpec, FieldType};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replies with canned responses and remembers every request
    #[derive(Default)]
    struct CannedClient {
        replies: RefCell<VecDeque<String>>,
        requests: RefCell<Vec<CompletionRequest>>,
    }

    impl CannedClient {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: RefCell::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: RefCell::default(),
            }
        }
    }

    impl CompletionClient for CannedClient {
        async fn complete(&self, request: &CompletionRequest) -> SynthResult<Completion> {
            self.requests.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .map(Completion::new)
                .ok_or_else(|| SynthError::generation(GenerationFailure::Transport, "no scripted reply"))
        }
    }

    fn catalog(count: usize) -> FieldCatalog {
        (1..=count)
            .map(|i| {
                (
                    format!("form[0].f1_{:03}[0]", i),
                    FieldSpec {
                        field_type: Some(FieldType::Text),
                        possible_values: vec![],
                    },
                )
            })
            .collect()
    }

    fn labels(count: usize) -> FieldMap {
        FieldMap::from_labels((1..=count).map(|i| (format!("form[0].f1_{:03}[0]", i), format!("Line {}", i))))
    }

    fn generator(client: &CannedClient) -> SyntheticDataGenerator<'_, CannedClient> {
        let mut settings = SynthConfig::default().generation;
        settings.chunk_threshold = 4;
        settings.chunk_size = 3;
        SyntheticDataGenerator::new(client, "mini", "vision", settings)
    }

    #[tokio::test]
    async fn labels_are_reconciled_against_the_catalog() {
        let client = CannedClient::new(&[r#"{"form[0].f1_001[0]": "Name", "bogus": "Nothing"}"#]);
        let map = generator(&client)
            .generate_labels("W2", "Label every field of {document_type}.", &catalog(2), &[])
            .await
            .unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.label_for("form[0].f1_001[0]"), Some("Name"));

        let requests = client.requests.borrow();
        assert_eq!(requests[0].deployment, "vision");
        assert!(requests[0].system.contains("analyze W2 PDFs"));
        assert!(requests[0].user_text().starts_with("Label every field of W2."));
        assert!(requests[0].user_text().contains("### AcroForm Field Mappings JSON:"));
    }

    #[tokio::test]
    async fn small_forms_use_a_single_call() {
        let client = CannedClient::new(&[r#"{"form[0]": {"f1_001[0]": "Ada"}, "f1_002[0]": "42"}"#]);
        let record = generator(&client)
            .generate_record("W2", "Fill it", &catalog(2), &labels(2), "W2 - Sample 1")
            .await
            .unwrap();

        assert_eq!(record.len(), 2);
        assert_eq!(record.get("Line 2").unwrap().field_name, "form[0].f1_002[0]");
        let requests = client.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].deployment, "mini");
        assert!(requests[0].user_text().contains("### VARIABILITY NOTE"));
    }

    #[tokio::test]
    async fn large_forms_are_chunked() {
        let client = CannedClient::new(&[
            r#"{"form[0].f1_001[0]": "a", "form[0].f1_002[0]": "b", "form[0].f1_003[0]": "c"}"#,
            r#"{"form[0].f1_004[0]": "d", "form[0].f1_005[0]": "e"}"#,
        ]);
        let record = generator(&client)
            .generate_record("W2", "unused for chunks", &catalog(5), &labels(5), "W2")
            .await
            .unwrap();

        assert_eq!(record.len(), 5);
        let requests = client.requests.borrow();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].user_text().contains("(chunk 2/2)"));
        assert!(requests[1].system.contains("W2 (chunk 2)"));
    }

    #[tokio::test]
    async fn unmatched_response_is_missing_keys() {
        let client = CannedClient::new(&[r#"{"unrelated": "x"}"#]);
        let err = generator(&client)
            .generate_record("W2", "Fill it", &catalog(2), &labels(2), "W2")
            .await
            .unwrap_err();
        assert_eq!(err.generation_reason(), Some(GenerationFailure::MissingKeys));
    }
}
