//! Shared constants and helpers for SPL reading and writing.

use std::collections::HashMap;
use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use sha2::Digest;

use spl_model::{Code, Quantity, Ratio};

use crate::error::ExportError;

/// HL7 v3 namespace used by SPL.
pub const HL7_NS: &str = "urn:hl7-org:v3";

/// XML Schema instance namespace.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Class code written on product identifier wrappers.
pub const IDENT_CLASS_CODE: &str = "IDENT";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    hex::encode(digest)
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Collapse runs of XML whitespace to a single space, keeping edges.
pub fn collapse_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_space = false;
    for ch in value.chars() {
        if is_xml_space(ch) {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out
}

/// Collapse and trim; used for plain-text elements such as titles and names.
pub fn normalize_text(value: &str) -> String {
    collapse_whitespace(value).trim().to_string()
}

pub fn is_blank(value: &str) -> bool {
    value.chars().all(is_xml_space)
}

/// Resolve the body of an entity reference (`amp`, `#39`, `#x27`).
pub fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = name.strip_prefix('#')?;
            let value = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Tracks the element path while streaming, with positional indices among
/// same-named siblings (`component[2]`; the first sibling has no index).
#[derive(Debug)]
pub struct PathTracker {
    segments: Vec<String>,
    sibling_counts: Vec<HashMap<String, usize>>,
}

impl PathTracker {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            sibling_counts: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self, name: &str) {
        let index = match self.sibling_counts.last_mut() {
            Some(counts) => {
                let count = counts.entry(name.to_string()).or_insert(0);
                *count += 1;
                *count
            }
            None => 1,
        };
        self.segments.push(path_segment(name, index));
        self.sibling_counts.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.segments.pop();
        if self.sibling_counts.len() > 1 {
            self.sibling_counts.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn current(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            out.push_str(segment);
        }
        out
    }
}

impl Default for PathTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub fn path_segment(name: &str, index: usize) -> String {
    if index > 1 {
        format!("{name}[{index}]")
    } else {
        name.to_string()
    }
}

/// Write a simple text element.
pub fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), ExportError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Write an optional text element, skipping `None`.
pub fn write_opt_text<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: Option<&str>,
) -> Result<(), ExportError> {
    match text {
        Some(text) => write_text_element(writer, name, text),
        None => Ok(()),
    }
}

/// Write an empty element with attributes, skipping `None` values.
pub fn write_empty<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attributes: &[(&str, Option<&str>)],
) -> Result<(), ExportError> {
    let mut element = BytesStart::new(name);
    for (key, value) in attributes {
        if let Some(value) = value {
            element.push_attribute((*key, *value));
        }
    }
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

/// Write a coded element (`<code code=".." codeSystem=".." displayName=".."/>`).
pub fn write_code<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    code: &Code,
) -> Result<(), ExportError> {
    write_empty(
        writer,
        name,
        &[
            ("code", Some(code.code.as_str())),
            ("codeSystem", code.code_system.as_deref()),
            ("displayName", code.display_name.as_deref()),
        ],
    )
}

/// Write `<name value=".."/>`.
pub fn write_value<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), ExportError> {
    write_empty(writer, name, &[("value", Some(value))])
}

fn write_quantity<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    quantity: &Quantity,
) -> Result<(), ExportError> {
    write_empty(
        writer,
        name,
        &[
            ("value", Some(quantity.value.as_str())),
            ("unit", quantity.unit.as_deref()),
        ],
    )
}

/// Write `<quantity><numerator/><denominator/></quantity>`.
pub fn write_ratio<W: Write>(writer: &mut Writer<W>, ratio: &Ratio) -> Result<(), ExportError> {
    writer.write_event(Event::Start(BytesStart::new("quantity")))?;
    if let Some(numerator) = &ratio.numerator {
        write_quantity(writer, "numerator", numerator)?;
    }
    if let Some(denominator) = &ratio.denominator {
        write_quantity(writer, "denominator", denominator)?;
    }
    writer.write_event(Event::End(BytesEnd::new("quantity")))?;
    Ok(())
}

pub fn start<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<(), ExportError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

pub fn end<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<(), ExportError> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_keeps_edges() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), " a b ");
        assert_eq!(normalize_text("  a \n\t b  "), "a b");
        assert!(is_blank(" \n\t"));
        assert!(!is_blank(" x "));
    }

    #[test]
    fn collapse_leaves_non_breaking_space() {
        assert_eq!(collapse_whitespace("a\u{a0}\u{a0}b"), "a\u{a0}\u{a0}b");
    }

    #[test]
    fn resolves_predefined_and_numeric_entities() {
        assert_eq!(resolve_entity("amp"), Some('&'));
        assert_eq!(resolve_entity("apos"), Some('\''));
        assert_eq!(resolve_entity("#39"), Some('\''));
        assert_eq!(resolve_entity("#x27"), Some('\''));
        assert_eq!(resolve_entity("nbsp"), None);
    }

    #[test]
    fn path_tracker_indexes_repeated_siblings() {
        let mut tracker = PathTracker::new();
        tracker.push("document");
        tracker.push("component");
        tracker.pop();
        tracker.push("component");
        assert_eq!(tracker.current(), "/document/component[2]");
        tracker.push("section");
        assert_eq!(tracker.current(), "/document/component[2]/section");
        assert_eq!(tracker.depth(), 3);
    }

    #[test]
    fn known_sha256() {
        assert_eq!(
            sha256_hex(b"Hello, World!"),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }
}
