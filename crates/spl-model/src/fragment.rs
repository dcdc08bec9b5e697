//! Generic XML fragments.
//!
//! Labeling text (`<text>` children) is free-form markup. It is kept as a
//! small element tree so that ordering and inline structure survive the
//! round trip without the model having to understand every markup element.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum XmlNode {
    Element(XmlElement),
    Text { value: String },
}

impl XmlNode {
    pub fn text(value: impl Into<String>) -> Self {
        XmlNode::Text {
            value: value.into(),
        }
    }

    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlElement {
    /// Qualified name as written in the source.
    pub name: String,
    /// Attributes in source order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|child| child.local_name() == name)
    }

    /// Concatenated text of this element and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(element: &XmlElement, out: &mut String) {
    for child in &element.children {
        match child {
            XmlNode::Text { value } => out.push_str(value),
            XmlNode::Element(inner) => collect_text(inner, out),
        }
    }
}

/// Strip a namespace prefix (`hl7:section` → `section`).
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_concatenates_descendants() {
        let mut paragraph = XmlElement::new("paragraph");
        paragraph.children.push(XmlNode::text("Take "));
        let mut bold = XmlElement::new("content");
        bold.attributes
            .push(("styleCode".to_string(), "bold".to_string()));
        bold.children.push(XmlNode::text("one"));
        paragraph.children.push(XmlNode::Element(bold));
        paragraph.children.push(XmlNode::text(" tablet"));

        assert_eq!(paragraph.text_content(), "Take one tablet");
        assert_eq!(paragraph.child("content").unwrap().attribute("styleCode"), Some("bold"));
    }

    #[test]
    fn local_name_strips_prefix() {
        assert_eq!(local_name("v3:section"), "section");
        assert_eq!(local_name("section"), "section");
    }
}
