use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::error::{SynthError, SynthResult};

/// Prompt configuration file:
///
/// ```json
/// {
///   "default": { "humanReadableLabels": "...", "dataGeneration": "..." },
///   "avm": { "dataGeneration": "..." }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptLibrary {
    #[serde(default)]
    pub default: FormPrompts,
    #[serde(default)]
    pub avm: Option<AvmPrompts>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormPrompts {
    #[serde(rename = "humanReadableLabels", default)]
    pub human_readable_labels: String,
    #[serde(rename = "dataGeneration", default)]
    pub data_generation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvmPrompts {
    #[serde(rename = "dataGeneration")]
    pub data_generation: String,
}

impl PromptLibrary {
    pub fn load<P: AsRef<Path>>(path: P) -> SynthResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SynthError::configuration(format!("Failed to read prompt file {}: {}", path.display(), e))
        })?;
        let library = Self::from_json(&content).map_err(|e| match e {
            SynthError::Configuration { message } => {
                SynthError::configuration(format!("{} ({})", message, path.display()))
            }
            other => other,
        })?;
        info!("📋 Prompts loaded from {}", path.display());
        Ok(library)
    }

    pub fn from_json(content: &str) -> SynthResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| SynthError::configuration(format!("Invalid prompt file: {}", e)))
    }

    pub fn avm_prompt(&self) -> SynthResult<&str> {
        self.avm
            .as_ref()
            .map(|p| p.data_generation.as_str())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| SynthError::configuration("prompt file has no avm.dataGeneration prompt"))
    }
}

/// Substitute `{name}` placeholders; `{{` and `}}` produce literal braces.
///
/// Every placeholder in the template must be supplied.
pub fn format_prompt(template: &str, values: &[(&str, &str)]) -> SynthResult<String> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    name.push(next);
                }
                if !closed {
                    return Err(SynthError::template(format!("unclosed placeholder '{{{}'", name)));
                }
                let value = values
                    .iter()
                    .find(|(key, _)| *key == name.trim())
                    .map(|(_, value)| *value)
                    .ok_or_else(|| SynthError::template(format!("no value for placeholder '{{{}}}'", name)))?;
                output.push_str(value);
            }
            '}' => return Err(SynthError::template("single '}' in prompt template")),
            other => output.push(other),
        }
    }

    Ok(output)
}
