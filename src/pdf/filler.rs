use indexmap::IndexMap;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{
    acroform_dict_mut, encode_text, load_document, object_text, resolve, terminal_fields, widget_states, FieldNode,
    FieldType,
};
use crate::error::{SynthError, SynthResult};
use crate::output::make_directory;

/// What a fill pass did with the values it was given
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillSummary {
    /// Fully qualified names of the fields that received a value
    pub filled: Vec<String>,
    /// Record keys with no matching field in the document
    pub unmatched: Vec<String>,
}

fn with_dict(doc: &mut Document, id: ObjectId, update: impl FnOnce(&mut Dictionary)) -> bool {
    match doc.get_object_mut(id).and_then(Object::as_dict_mut) {
        Ok(dict) => {
            update(dict);
            true
        }
        Err(_) => false,
    }
}

fn set_need_appearances(doc: &mut Document) {
    if let Some(acroform) = acroform_dict_mut(doc) {
        acroform.set("NeedAppearances", Object::Boolean(true));
    }
}

fn save_document(doc: &mut Document, output: &Path) -> SynthResult<()> {
    if let Some(parent) = output.parent() {
        make_directory(parent)?;
    }
    doc.save(output)
        .map_err(|e| SynthError::write(output.display().to_string(), e))?;
    Ok(())
}

/// Locate the document field a record key refers to: full name first,
/// then the field's own partial name
fn match_field<'a>(
    key: &str,
    by_name: &HashMap<&'a str, &'a FieldNode>,
    by_partial: &HashMap<&'a str, Vec<&'a FieldNode>>,
) -> Option<&'a FieldNode> {
    if let Some(node) = by_name.get(key) {
        return Some(*node);
    }
    let last_segment = key.rsplit('.').next().unwrap_or(key);
    match by_partial.get(last_segment).map(Vec::as_slice) {
        Some([node]) => Some(*node),
        Some(candidates) if candidates.len() > 1 => {
            warn!("Field key '{}' is ambiguous ({} candidates), skipping", key, candidates.len());
            None
        }
        _ => None,
    }
}

/// Appearance state to select on a button for a generated value
fn button_state(value: &str, states: &[String]) -> String {
    let wanted = value.trim().trim_start_matches('/');
    if states.iter().any(|s| s == wanted) {
        return wanted.to_string();
    }
    let on_state = states.iter().find(|s| s.as_str() != "Off");
    match wanted.to_lowercase().as_str() {
        "" | "off" | "no" | "false" | "0" | "unchecked" => "Off".to_string(),
        "yes" | "on" | "true" | "x" | "checked" | "1" => on_state.cloned().unwrap_or_else(|| wanted.to_string()),
        _ => wanted.to_string(),
    }
}

/// Write `values` (field identifier to value) into a copy of `input` saved at `output`.
///
/// Fields not named in `values` are left exactly as they were.
pub fn fill_form(input: &Path, values: &IndexMap<String, String>, output: &Path) -> SynthResult<FillSummary> {
    let mut doc = load_document(input)?;
    let nodes = terminal_fields(&doc, input)?;

    let by_name: HashMap<&str, &FieldNode> = nodes.iter().map(|n| (n.name.as_str(), n)).collect();
    let mut by_partial: HashMap<&str, Vec<&FieldNode>> = HashMap::new();
    for node in &nodes {
        by_partial.entry(node.partial_name.as_str()).or_default().push(node);
    }

    let mut summary = FillSummary::default();
    let mut needs_appearances = false;

    for (key, value) in values {
        let Some(node) = match_field(key, &by_name, &by_partial) else {
            debug!("No field named '{}' in {:?}", key, input);
            summary.unmatched.push(key.clone());
            continue;
        };

        match node.field_type {
            Some(FieldType::Signature) => {
                debug!("Skipping signature field {}", node.name);
                continue;
            }
            Some(FieldType::Button) => {
                let states: Vec<String> = node
                    .widgets
                    .iter()
                    .flat_map(|w| widget_states(&doc, *w))
                    .collect();
                let state = button_state(value, &states);
                with_dict(&mut doc, node.id, |field| {
                    field.set("V", Object::Name(state.clone().into_bytes()));
                });
                for widget in &node.widgets {
                    let own_states = widget_states(&doc, *widget);
                    let widget_state = if own_states.iter().any(|s| *s == state) {
                        state.clone()
                    } else {
                        "Off".to_string()
                    };
                    with_dict(&mut doc, *widget, |w| {
                        w.set("AS", Object::Name(widget_state.into_bytes()));
                    });
                }
            }
            Some(FieldType::Text) | Some(FieldType::Choice) | None => {
                with_dict(&mut doc, node.id, |field| {
                    field.set("V", encode_text(value));
                });
                for widget in &node.widgets {
                    with_dict(&mut doc, *widget, |w| {
                        w.remove(b"AP");
                    });
                }
                needs_appearances = true;
            }
        }
        summary.filled.push(node.name.clone());
    }

    if needs_appearances {
        set_need_appearances(&mut doc);
    }
    save_document(&mut doc, output)?;

    info!(
        "📝 PDF filled: {} fields written, {} keys unmatched -> {:?}",
        summary.filled.len(),
        summary.unmatched.len(),
        output
    );
    Ok(summary)
}

/// Copy of `input` where every field shows `{its name}`, read-only, for page images
/// that let a vision model see where each field sits
pub fn overlay_field_names(input: &Path, output: &Path, font_size: u32) -> SynthResult<usize> {
    let mut doc = load_document(input)?;
    let nodes = terminal_fields(&doc, input)?;
    let appearance = format!("/Helv {} Tf 0 g", font_size);

    let mut processed = 0usize;
    for node in &nodes {
        let display = format!("{{{}}}", node.partial_name);
        let updated = with_dict(&mut doc, node.id, |field| {
            let flags = field.get(b"Ff").and_then(Object::as_i64).unwrap_or(0);
            field.set("V", encode_text(&display));
            field.set("Ff", Object::Integer(flags | 1));
            field.set("DA", Object::string_literal(appearance.as_str()));
        });
        if !updated {
            warn!("Failed to process field {}", node.name);
            continue;
        }
        for widget in &node.widgets {
            with_dict(&mut doc, *widget, |w| {
                w.set("DA", Object::string_literal(appearance.as_str()));
                w.remove(b"AP");
            });
        }
        processed += 1;
    }

    set_need_appearances(&mut doc);
    save_document(&mut doc, output)?;

    info!("Field processing summary: {}/{} successful", processed, nodes.len());
    if processed < nodes.len() {
        warn!(
            "{} fields could not be processed - this may affect label quality",
            nodes.len() - processed
        );
    }
    Ok(processed)
}

/// Current value of every field that has one, keyed by fully qualified name.
/// Button values are returned without the leading slash.
pub fn read_field_values(path: &Path) -> SynthResult<IndexMap<String, String>> {
    let doc = load_document(path)?;
    let nodes = terminal_fields(&doc, path)?;

    let mut values = IndexMap::new();
    for node in nodes {
        let value = doc
            .get_object(node.id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"V").ok())
            .and_then(|v| resolve(&doc, v))
            .and_then(object_text);
        if let Some(value) = value {
            values.insert(node.name, value);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn button_values_pick_known_states() {
        let on_off = states(&["1", "Off"]);
        assert_eq!(button_state("/1", &on_off), "1");
        assert_eq!(button_state("Yes", &on_off), "1");
        assert_eq!(button_state("false", &on_off), "Off");
        assert_eq!(button_state("/Choice2", &states(&["Choice1", "Choice2", "Off"])), "Choice2");
    }
}
