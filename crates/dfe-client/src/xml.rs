//! # Minimal XML Tree
//!
//! Both the SOAP envelopes and the distributed documents are small, so they
//! are read into an owned element tree and navigated by local name.
//! Namespace prefixes are dropped and `xmlns` declarations are not kept as
//! attributes: every element the client reads is addressed by local name
//! only.
//!
//! quick-xml never expands external entities. DOCTYPE declarations are
//! rejected outright.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Document is not well-formed or not acceptable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct XmlError(String);

impl XmlError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// One element with its attributes, text content, and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name, without namespace prefix.
    pub name: String,
    /// Attributes by local name, in document order.
    pub attributes: Vec<(String, String)>,
    /// Concatenated text and CDATA content, whitespace-trimmed.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<Element>,
}

impl Element {
    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First descendant (depth-first, excluding `self`) with the given name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Follow a chain of direct children.
    pub fn path(&self, names: &[&str]) -> Option<&Element> {
        names.iter().try_fold(self, |el, name| el.child(name))
    }

    /// Attribute value by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text of a direct child, `None` if the child is absent or empty.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }
}

/// Parse a complete document and return its root element.
pub fn parse_document(data: &[u8]) -> Result<Element, XmlError> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if root.is_some() {
                    return Err(XmlError::new("content after root element"));
                }
                stack.push(open_element(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let element = open_element(e)?;
                close_element(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::new("unbalanced end tag"))?;
                close_element(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| XmlError::new(format!("bad text content: {err}")))?;
                push_text(&mut stack, &text)?;
            }
            Ok(Event::CData(ref e)) => {
                let text = std::str::from_utf8(e)
                    .map_err(|err| XmlError::new(format!("CDATA is not UTF-8: {err}")))?;
                push_text(&mut stack, text.trim())?;
            }
            Ok(Event::DocType(_)) => {
                return Err(XmlError::new("DOCTYPE declarations are not allowed"));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XmlError::new(format!(
                    "XML parse error at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::new("unexpected end of document"));
    }
    root.ok_or_else(|| XmlError::new("document has no root element"))
}

fn open_element(e: &BytesStart<'_>) -> Result<Element, XmlError> {
    let name = utf8(e.local_name().as_ref())?.to_string();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::new(format!("bad attribute on <{name}>: {err}")))?;
        let raw_key = attr.key.as_ref();
        if raw_key == b"xmlns" || raw_key.starts_with(b"xmlns:") {
            continue;
        }
        let key = utf8(attr.key.local_name().as_ref())?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::new(format!("bad attribute value on <{name}>: {err}")))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        ..Element::default()
    })
}

fn close_element(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::new("multiple root elements")),
    }
}

fn push_text(stack: &mut [Element], text: &str) -> Result<(), XmlError> {
    if text.is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(current) => {
            current.text.push_str(text);
            Ok(())
        }
        None => Err(XmlError::new("text outside root element")),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, XmlError> {
    std::str::from_utf8(bytes).map_err(|e| XmlError::new(format!("name is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefixes_and_namespace_declarations() {
        let doc = br#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body><a:item xmlns:a="urn:a" a:id="7">x</a:item></soap:Body></soap:Envelope>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.name, "Envelope");
        assert!(root.attributes.is_empty());
        let item = root.path(&["Body", "item"]).unwrap();
        assert_eq!(item.attribute("id"), Some("7"));
        assert_eq!(item.text, "x");
    }

    #[test]
    fn unescapes_text_and_attributes() {
        let root = parse_document(br#"<r a="1 &amp; 2">&lt;ok&gt;</r>"#).unwrap();
        assert_eq!(root.attribute("a"), Some("1 & 2"));
        assert_eq!(root.text, "<ok>");
    }

    #[test]
    fn reads_cdata() {
        let root = parse_document(b"<r><![CDATA[a < b]]></r>").unwrap();
        assert_eq!(root.text, "a < b");
    }

    #[test]
    fn find_searches_descendants() {
        let root = parse_document(b"<a><b><c><d>deep</d></c></b><d>shallow</d></a>").unwrap();
        assert_eq!(root.find("d").unwrap().text, "deep");
        assert_eq!(root.child("d").unwrap().text, "shallow");
        assert_eq!(root.children_named("d").count(), 1);
    }

    #[test]
    fn child_text_treats_empty_as_absent() {
        let root = parse_document(b"<a><b/><c>  </c><d>v</d></a>").unwrap();
        assert_eq!(root.child_text("b"), None);
        assert_eq!(root.child_text("c"), None);
        assert_eq!(root.child_text("d"), Some("v"));
        assert_eq!(root.child_text("missing"), None);
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(parse_document(b"").is_err());
        assert!(parse_document(b"<a><b></a>").is_err());
        assert!(parse_document(b"<a>").is_err());
        assert!(parse_document(b"<a/><b/>").is_err());
        assert!(parse_document(b"not xml at all").is_err());
    }

    #[test]
    fn rejects_doctype() {
        let doc = br#"<?xml version="1.0"?><!DOCTYPE r [<!ENTITY x SYSTEM "file:///etc/passwd">]><r>&x;</r>"#;
        assert!(parse_document(doc).is_err());
    }
}
