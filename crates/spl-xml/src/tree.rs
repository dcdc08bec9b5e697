//! Generic element trees.
//!
//! Labeling text is captured as [`XmlNode`] fragments while the importer
//! streams, and the comparison engine parses whole documents into one
//! [`XmlElement`]. Both go through [`FragmentBuilder`], so text is normalized
//! the same way everywhere:
//!
//! - adjacent text pieces (including resolved entity references) are merged;
//! - runs of XML whitespace collapse to one space, edges are kept;
//! - whitespace-only text nodes are dropped;
//! - comments, processing instructions and namespace declarations are dropped.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use spl_model::fragment::local_name;
use spl_model::{Location, XmlElement, XmlNode};

use crate::common::{PathTracker, collapse_whitespace, is_blank, resolve_entity};
use crate::error::{ExportError, ImportError};

pub(crate) fn is_namespace_declaration(key: &str) -> bool {
    key == "xmlns" || key.starts_with("xmlns:")
}

/// Convert a start tag into an element with no children.
///
/// The element name loses its namespace prefix; attribute names are kept as
/// written.
pub(crate) fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = XmlElement::new(local_name(&name));
    for attr in start.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if is_namespace_declaration(&key) {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|err| err.to_string())?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

/// Resolve the raw body of a general entity reference.
pub(crate) fn reference_char(raw: &[u8]) -> Result<char, String> {
    let name = String::from_utf8_lossy(raw);
    resolve_entity(&name).ok_or_else(|| format!("undefined entity reference &{name};"))
}

/// Incrementally builds a list of normalized nodes from streamed events.
#[derive(Debug, Default)]
pub struct FragmentBuilder {
    open: Vec<XmlElement>,
    nodes: Vec<XmlNode>,
}

impl FragmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, element: XmlElement) {
        self.open.push(element);
    }

    pub fn close(&mut self) {
        if let Some(mut element) = self.open.pop() {
            normalize_children(&mut element.children);
            self.siblings().push(XmlNode::Element(element));
        }
    }

    pub fn text(&mut self, value: &str) {
        let siblings = self.siblings();
        if let Some(XmlNode::Text { value: last }) = siblings.last_mut() {
            last.push_str(value);
            return;
        }
        siblings.push(XmlNode::text(value));
    }

    pub fn push_char(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        self.text(ch.encode_utf8(&mut buf));
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn finish(mut self) -> Vec<XmlNode> {
        while !self.open.is_empty() {
            self.close();
        }
        normalize_children(&mut self.nodes);
        self.nodes
    }

    fn siblings(&mut self) -> &mut Vec<XmlNode> {
        match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.nodes,
        }
    }
}

fn normalize_children(children: &mut Vec<XmlNode>) {
    children.retain_mut(|node| match node {
        XmlNode::Text { value } => {
            *value = collapse_whitespace(value);
            !is_blank(value)
        }
        XmlNode::Element(_) => true,
    });
}

fn malformed<R>(message: impl Into<String>, paths: &PathTracker, reader: &Reader<R>) -> ImportError {
    ImportError::Malformed {
        message: message.into(),
        location: Location::new(paths.current(), u64::try_from(reader.buffer_position()).ok()),
    }
}

/// Parse a whole document into its root element.
pub fn parse_tree(bytes: &[u8]) -> Result<XmlElement, ImportError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut builder = FragmentBuilder::new();
    let mut paths = PathTracker::new();
    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| malformed(err.to_string(), &paths, &reader))?;
        match event {
            Event::Start(start) => {
                let element =
                    element_from_start(&start).map_err(|msg| malformed(msg, &paths, &reader))?;
                paths.push(&element.name);
                builder.open(element);
            }
            Event::End(_) => {
                builder.close();
                paths.pop();
            }
            Event::Text(text) => builder.text(&String::from_utf8_lossy(&text)),
            Event::CData(data) => builder.text(&String::from_utf8_lossy(&data)),
            Event::GeneralRef(reference) => {
                let ch = reference_char(&reference).map_err(|msg| malformed(msg, &paths, &reader))?;
                builder.push_char(ch);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if builder.depth() > 0 {
        return Err(malformed("unexpected end of document", &paths, &reader));
    }
    builder
        .finish()
        .into_iter()
        .find_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text { .. } => None,
        })
        .ok_or_else(|| malformed("document has no root element", &paths, &reader))
}

/// Write one node and its subtree.
pub fn write_node<W: Write>(writer: &mut Writer<W>, node: &XmlNode) -> Result<(), ExportError> {
    match node {
        XmlNode::Text { value } => {
            writer.write_event(Event::Text(BytesText::new(value)))?;
        }
        XmlNode::Element(element) => {
            let mut start = BytesStart::new(element.name.as_str());
            for (key, value) in &element.attributes {
                start.push_attribute((key.as_str(), value.as_str()));
            }
            if element.children.is_empty() {
                writer.write_event(Event::Empty(start))?;
            } else {
                writer.write_event(Event::Start(start))?;
                for child in &element.children {
                    write_node(writer, child)?;
                }
                writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
            }
        }
    }
    Ok(())
}
