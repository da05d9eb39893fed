#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use formsynth::ai::{Completion, CompletionClient, CompletionRequest};
use formsynth::config::{AiCredentials, SynthConfig};
use formsynth::context::RunContext;
use formsynth::prompts::PromptLibrary;
use formsynth::render::RenderCapabilities;
use formsynth::{GenerationFailure, SynthError, SynthResult};

/// Identifiers of the fields in [`write_sample_form`], in AcroForm order
pub const SAMPLE_FIELDS: [&str; 4] = ["name", "employee.ssn", "married", "notes"];

fn empty_stream(doc: &mut Document) -> ObjectId {
    doc.add_object(Stream::new(dictionary! {}, Vec::new()))
}

fn rect() -> Object {
    Object::Array(vec![
        Object::Integer(72),
        Object::Integer(700),
        Object::Integer(272),
        Object::Integer(720),
    ])
}

/// One-page fillable PDF with a text field, a nested text field, a checkbox
/// with /Yes and /Off states, and a pre-filled text field
pub fn write_sample_form(path: &Path) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();

    let name_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => Object::string_literal("name"),
        "Rect" => rect(),
        "P" => page_id,
    });

    let ssn_id = doc.new_object_id();
    let employee_id = doc.add_object(dictionary! {
        "T" => Object::string_literal("employee"),
        "Kids" => vec![Object::Reference(ssn_id)],
    });
    doc.objects.insert(
        ssn_id,
        Object::Dictionary(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal("ssn"),
            "Parent" => employee_id,
            "Rect" => rect(),
            "P" => page_id,
        }),
    );

    let yes_stream = empty_stream(&mut doc);
    let off_stream = empty_stream(&mut doc);
    let married_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "T" => Object::string_literal("married"),
        "V" => Object::Name(b"Off".to_vec()),
        "AS" => Object::Name(b"Off".to_vec()),
        "AP" => dictionary! {
            "N" => dictionary! {
                "Yes" => yes_stream,
                "Off" => off_stream,
            },
        },
        "Rect" => rect(),
        "P" => page_id,
    });

    let notes_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => Object::string_literal("notes"),
        "V" => Object::string_literal("original"),
        "Rect" => rect(),
        "P" => page_id,
    });

    let content_id = empty_stream(&mut doc);
    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Annots" => vec![
                Object::Reference(name_id),
                Object::Reference(ssn_id),
                Object::Reference(married_id),
                Object::Reference(notes_id),
            ],
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        }),
    );

    let acroform_id = doc.add_object(dictionary! {
        "Fields" => vec![
            Object::Reference(name_id),
            Object::Reference(employee_id),
            Object::Reference(married_id),
            Object::Reference(notes_id),
        ],
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(path).expect("fixture PDF saves");
    path.to_path_buf()
}

/// One-page PDF without any form
pub fn write_plain_pdf(path: &Path) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = empty_stream(&mut doc);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(path).expect("fixture PDF saves");
    path.to_path_buf()
}

/// Completion client that answers from a script and records each request
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<SynthResult<Completion>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, content: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(Completion::new(content)));
        self
    }

    pub fn fail(self, reason: GenerationFailure) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(SynthError::generation(reason, "scripted failure")));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> SynthResult<Completion> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SynthError::generation(GenerationFailure::Transport, "script exhausted")))
    }
}

/// Executable shell script standing in for an external tool; `$last` is its final argument
#[cfg(unix)]
pub fn stub_tool(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\nfor last; do :; done\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

pub fn credentials() -> AiCredentials {
    AiCredentials::from_lookup(|key| match key {
        "AZURE_OPENAI_API_KEY" => Some("test-key".to_string()),
        "AZURE_OPENAI_ENDPOINT" => Some("https://example.invalid".to_string()),
        _ => None,
    })
    .expect("test credentials are complete")
}

pub fn prompts() -> PromptLibrary {
    PromptLibrary::from_json(
        r#"{
            "default": {
                "humanReadableLabels": "Label the fields of {document_type}.",
                "dataGeneration": "Fill {document_type}.\nFields: {field_mappings_json}\nLabels: {human_readable_labels}"
            },
            "avm": { "dataGeneration": "Write an AVM report." }
        }"#,
    )
    .expect("test prompts parse")
}

/// Context with no external render tools, so tests never shell out
pub fn context(output_root: &Path, variants: usize) -> RunContext {
    let mut config = SynthConfig::default();
    config.logging.enable_file_logging = false;
    RunContext::with_capabilities(config, prompts(), output_root, RenderCapabilities::default()).with_variants(variants)
}
