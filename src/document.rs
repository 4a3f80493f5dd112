//! XML document parsing and relationship extraction.
//!
//! Documents are parsed with `quick-xml` into a small immutable [`Element`]
//! tree. Only the pieces the query engine needs are kept: tag names,
//! attributes, leading text, and the text trailing each child.
//!
//! Parsing is fail-soft at the document boundary: [`extract_relationships`]
//! never returns an error, it returns [`DocumentRelationships::Skipped`] with
//! the reason instead so one malformed file cannot abort a whole query.

use std::borrow::Cow;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Tag name of the elements a query runs over.
pub const RELATIONSHIP_TAG: &str = "EntityRelationship";

/// A parsed XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Text before the first child element.
    pub text: Option<String>,
    pub children: Vec<Element>,
    /// Text after this element's end tag, up to the next sibling.
    pub tail: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Leading text, treating an empty string the same as no text.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    /// Pre-order iterator over every descendant, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Serializes the element and its subtree back to markup.
    ///
    /// Text is escaped for `&`, `<` and `>` only; attribute values are fully
    /// escaped. The element's own tail is not included, so keywords made of
    /// trailing whitespace never match.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&quick_xml::escape::escape(value.as_str()));
            out.push('"');
        }
        if self.text.is_none() && self.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&quick_xml::escape::partial_escape(text.as_str()));
        }
        for child in &self.children {
            child.write_xml(out);
            if let Some(tail) = &child.tail {
                out.push_str(&quick_xml::escape::partial_escape(tail.as_str()));
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Iterator returned by [`Element::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Why a document could not be turned into an element tree.
#[derive(Debug, thiserror::Error)]
pub enum DocumentParseError {
    #[error("failed to read document: {0}")]
    Read(#[from] std::io::Error),
    #[error("malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },
    #[error("document has no root element")]
    NoRoot,
}

/// Outcome of scanning one document for relationship elements.
#[derive(Debug)]
pub enum DocumentRelationships {
    Found(Vec<Element>),
    Skipped { reason: DocumentParseError },
}

impl DocumentRelationships {
    /// Elements found, or an empty slice for a skipped document.
    pub fn elements(&self) -> &[Element] {
        match self {
            DocumentRelationships::Found(elements) => elements,
            DocumentRelationships::Skipped { .. } => &[],
        }
    }
}

/// Reads `path` and collects every `EntityRelationship` below the root.
pub fn extract_relationships(path: &Path) -> DocumentRelationships {
    extract_elements(path, RELATIONSHIP_TAG)
}

/// Reads `path` and collects every descendant of the root named `tag`, in
/// document order.
pub fn extract_elements(path: &Path, tag: &str) -> DocumentRelationships {
    let parsed = std::fs::read(path)
        .map_err(DocumentParseError::from)
        .and_then(|bytes| parse_document(&bytes));
    match parsed {
        Ok(root) => DocumentRelationships::Found(
            root.descendants()
                .filter(|e| e.name == tag)
                .cloned()
                .collect(),
        ),
        Err(reason) => DocumentRelationships::Skipped { reason },
    }
}

/// Parses a complete, well-formed document and returns its root element.
pub fn parse_document(xml: &[u8]) -> Result<Element, DocumentParseError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position() as u64;
        let malformed = |message: String| DocumentParseError::Malformed { position, message };

        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if root.is_some() {
                    return Err(malformed("content after the root element".to_string()));
                }
                stack.push(start_element(&e).map_err(malformed)?);
            }
            Ok(Event::Empty(e)) => {
                if root.is_some() {
                    return Err(malformed("content after the root element".to_string()));
                }
                let element = start_element(&e).map_err(malformed)?;
                close_element(element, &mut stack, &mut root);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected end tag".to_string()))?;
                close_element(element, &mut stack, &mut root);
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| malformed(e.to_string()))?;
                push_text(&mut stack, text).map_err(malformed)?;
            }
            Ok(Event::CData(c)) => {
                let bytes = c.into_inner();
                let text = std::str::from_utf8(&bytes).map_err(|e| malformed(e.to_string()))?;
                push_text(&mut stack, Cow::Borrowed(text)).map_err(malformed)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(e.to_string())),
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(DocumentParseError::Malformed {
            position: reader.buffer_position() as u64,
            message: format!("unclosed element <{}>", open.name),
        });
    }
    root.ok_or(DocumentParseError::NoRoot)
}

fn start_element(e: &BytesStart<'_>) -> Result<Element, String> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|err| err.to_string())?
        .to_string();
    let mut element = Element::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| err.to_string())?
            .to_string();
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn close_element(element: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

/// Appends character data to whatever is currently open: the leading text of
/// the innermost element, or the tail of its last child.
fn push_text(stack: &mut [Element], text: Cow<'_, str>) -> Result<(), String> {
    let Some(current) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err("text outside the root element".to_string());
    };
    let slot = match current.children.last_mut() {
        Some(child) => &mut child.tail,
        None => &mut current.text,
    };
    slot.get_or_insert_with(String::new).push_str(&text);
    Ok(())
}
