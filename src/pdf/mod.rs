//! AcroForm access on top of lopdf: field discovery, filling and read-back

pub mod fields;
pub mod filler;

use lopdf::{Document, Object, ObjectId, StringFormat};
use std::path::Path;

use crate::error::{SynthError, SynthResult};

pub use fields::{FieldCatalog, FieldSpec, FieldType, FormField};
pub use filler::{fill_form, overlay_field_names, read_field_values, FillSummary};

const MAX_FIELD_DEPTH: usize = 32;

pub(crate) fn load_document(path: &Path) -> SynthResult<Document> {
    if !path.exists() {
        return Err(SynthError::file_io(
            path.display().to_string(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "document does not exist"),
        ));
    }
    Document::load(path).map_err(|e| {
        SynthError::document_format_with_source(path.display().to_string(), "PDF could not be parsed", e)
    })
}

/// Follow indirect references until a direct object is reached
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_FIELD_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise single-byte)
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode a value as a PDF text string; non-ASCII text goes out as UTF-16BE
pub(crate) fn encode_text(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Readable value of a field's /V entry
pub(crate) fn object_text(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Integer(i) => Some(i.to_string()),
        Object::Real(r) => Some(r.to_string()),
        Object::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A terminal form field found by walking the AcroForm tree
#[derive(Debug, Clone)]
pub(crate) struct FieldNode {
    /// Fully qualified, dot-separated name
    pub name: String,
    /// Last segment of the name (the field's own /T)
    pub partial_name: String,
    pub id: ObjectId,
    pub field_type: Option<FieldType>,
    /// Widget annotations; the field itself when field and widget are merged
    pub widgets: Vec<ObjectId>,
}

/// Where the AcroForm dictionary lives, so it can be updated in place
pub(crate) enum AcroFormLocation {
    Indirect(ObjectId),
    InCatalog(ObjectId),
}

pub(crate) fn acroform_location(doc: &Document) -> Option<AcroFormLocation> {
    let catalog_id = doc.trailer.get(b"Root").ok()?.as_reference().ok()?;
    let catalog = doc.get_object(catalog_id).ok()?.as_dict().ok()?;
    match catalog.get(b"AcroForm").ok()? {
        Object::Reference(id) => Some(AcroFormLocation::Indirect(*id)),
        Object::Dictionary(_) => Some(AcroFormLocation::InCatalog(catalog_id)),
        _ => None,
    }
}

fn acroform_dict(doc: &Document) -> Option<&lopdf::Dictionary> {
    match acroform_location(doc)? {
        AcroFormLocation::Indirect(id) => doc.get_object(id).ok()?.as_dict().ok(),
        AcroFormLocation::InCatalog(catalog_id) => doc
            .get_object(catalog_id)
            .ok()?
            .as_dict()
            .ok()?
            .get(b"AcroForm")
            .ok()?
            .as_dict()
            .ok(),
    }
}

pub(crate) fn acroform_dict_mut(doc: &mut Document) -> Option<&mut lopdf::Dictionary> {
    match acroform_location(doc)? {
        AcroFormLocation::Indirect(id) => doc.get_object_mut(id).ok()?.as_dict_mut().ok(),
        AcroFormLocation::InCatalog(catalog_id) => doc
            .get_object_mut(catalog_id)
            .ok()?
            .as_dict_mut()
            .ok()?
            .get_mut(b"AcroForm")
            .ok()?
            .as_dict_mut()
            .ok(),
    }
}

/// Every terminal field of the document, in AcroForm order
pub(crate) fn terminal_fields(doc: &Document, path: &Path) -> SynthResult<Vec<FieldNode>> {
    let acroform = acroform_dict(doc)
        .ok_or_else(|| SynthError::document_format(path.display().to_string(), "no AcroForm dictionary"))?;

    let roots: Vec<ObjectId> = acroform
        .get(b"Fields")
        .ok()
        .and_then(|fields| resolve(doc, fields))
        .and_then(|fields| fields.as_array().ok())
        .map(|fields| fields.iter().filter_map(|f| f.as_reference().ok()).collect())
        .unwrap_or_default();

    let mut nodes = Vec::new();
    for id in roots {
        walk_field(doc, id, "", None, 0, &mut nodes);
    }

    if nodes.is_empty() {
        return Err(SynthError::document_format(
            path.display().to_string(),
            "AcroForm has no fillable fields",
        ));
    }
    Ok(nodes)
}

fn walk_field(
    doc: &Document,
    id: ObjectId,
    parent_name: &str,
    inherited_type: Option<FieldType>,
    depth: usize,
    nodes: &mut Vec<FieldNode>,
) {
    if depth > MAX_FIELD_DEPTH {
        tracing::warn!("Field tree deeper than {} levels, stopping at {}", MAX_FIELD_DEPTH, parent_name);
        return;
    }
    let Some(dict) = doc.get_object(id).ok().and_then(|o| o.as_dict().ok()) else {
        return;
    };

    let partial = dict
        .get(b"T")
        .ok()
        .and_then(|t| resolve(doc, t))
        .and_then(object_text)
        .unwrap_or_default();
    let name = match (parent_name.is_empty(), partial.is_empty()) {
        (true, _) => partial.clone(),
        (false, true) => parent_name.to_string(),
        (false, false) => format!("{}.{}", parent_name, partial),
    };
    let field_type = dict
        .get(b"FT")
        .ok()
        .and_then(|ft| ft.as_name().ok())
        .and_then(FieldType::from_pdf_name)
        .or(inherited_type);

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|kids| resolve(doc, kids))
        .and_then(|kids| kids.as_array().ok())
        .map(|kids| kids.iter().filter_map(|k| k.as_reference().ok()).collect())
        .unwrap_or_default();

    let (child_fields, widgets): (Vec<ObjectId>, Vec<ObjectId>) = kids.into_iter().partition(|kid| {
        doc.get_object(*kid)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .map(|d| d.has(b"T"))
            .unwrap_or(false)
    });

    if !child_fields.is_empty() {
        for child in child_fields {
            walk_field(doc, child, &name, field_type, depth + 1, nodes);
        }
        return;
    }

    if name.is_empty() {
        return;
    }

    nodes.push(FieldNode {
        name,
        partial_name: partial,
        id,
        field_type,
        widgets: if widgets.is_empty() { vec![id] } else { widgets },
    });
}

/// Appearance state names a button widget can take (from /AP /N)
pub(crate) fn widget_states(doc: &Document, widget: ObjectId) -> Vec<String> {
    doc.get_object(widget)
        .ok()
        .and_then(|o| o.as_dict().ok())
        .and_then(|d| d.get(b"AP").ok())
        .and_then(|ap| resolve(doc, ap))
        .and_then(|ap| ap.as_dict().ok())
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|n| resolve(doc, n))
        .and_then(|n| n.as_dict().ok())
        .map(|n| {
            n.iter()
                .map(|(state, _)| String::from_utf8_lossy(state).into_owned())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_text_strings_decode() {
        let bytes = [0xFE, 0xFF, 0x00, 0x4A, 0x00, 0xF6];
        assert_eq!(decode_text(&bytes), "Jö");
        assert_eq!(decode_text(b"plain"), "plain");
    }

    #[test]
    fn non_ascii_values_encode_as_utf16() {
        match encode_text("José") {
            Object::String(bytes, StringFormat::Hexadecimal) => assert_eq!(decode_text(&bytes), "José"),
            other => panic!("unexpected encoding {:?}", other),
        }
        assert_eq!(object_text(&encode_text("Main St")).unwrap(), "Main St");
    }
}
