//! XML event input and element-tree output.
//!
//! Uses quick-xml, which does not expand external entities. DOCTYPE
//! declarations are rejected outright.

use crate::error::{Result, SoapEncodingError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::trace;

/// Parser event consumed by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    TagStart {
        /// Qualified tag name as written
        name: String,
        /// Attributes in document order, values unescaped
        attributes: Vec<(String, String)>,
    },
    Text(String),
    TagEnd {
        name: String,
    },
}

/// Element produced by the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name
    pub name: String,
    /// Attributes in output order
    pub attributes: Vec<(String, String)>,
    pub content: XmlContent,
}

/// Element content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum XmlContent {
    #[default]
    Empty,
    Text(String),
    Children(Vec<XmlElement>),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            content: XmlContent::Empty,
        }
    }

    /// Attribute value by qualified name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing one of the same name.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Append a child element. Text content is discarded.
    pub fn push_child(&mut self, child: XmlElement) {
        match &mut self.content {
            XmlContent::Children(children) => children.push(child),
            content => *content = XmlContent::Children(vec![child]),
        }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.content = if text.is_empty() {
            XmlContent::Empty
        } else {
            XmlContent::Text(text)
        };
    }

    pub fn children(&self) -> &[XmlElement] {
        match &self.content {
            XmlContent::Children(children) => children,
            _ => &[],
        }
    }

    /// First child with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children().iter().find(|c| c.name == name)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            XmlContent::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Stream the events of a document into `f`.
///
/// Self-closing tags produce a start and an end event. CDATA becomes text.
/// Comments, processing instructions and the XML declaration are skipped.
pub fn for_each_event<F>(xml: &str, mut f: F) -> Result<()>
where
    F: FnMut(XmlEvent) -> Result<()>,
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SoapEncodingError::Xml(format!("XML parse error: {}", e)))?;
        match event {
            Event::Start(ref e) => {
                let (name, attributes) = start_parts(e)?;
                f(XmlEvent::TagStart { name, attributes })?;
            }
            Event::Empty(ref e) => {
                let (name, attributes) = start_parts(e)?;
                f(XmlEvent::TagStart {
                    name: name.clone(),
                    attributes,
                })?;
                f(XmlEvent::TagEnd { name })?;
            }
            Event::End(ref e) => {
                let name = utf8(e.name().as_ref())?.to_string();
                f(XmlEvent::TagEnd { name })?;
            }
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|e| SoapEncodingError::Xml(format!("Invalid text: {}", e)))?;
                if !text.is_empty() {
                    f(XmlEvent::Text(text.into_owned()))?;
                }
            }
            Event::CData(ref e) => {
                f(XmlEvent::Text(utf8(e.as_ref())?.to_string()))?;
            }
            Event::DocType(_) => {
                return Err(SoapEncodingError::Xml(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }
            Event::Eof => break,
            _ => trace!("Skipping markup event"),
        }
        buf.clear();
    }
    Ok(())
}

/// Collect every event of a document.
pub fn read_events(xml: &str) -> Result<Vec<XmlEvent>> {
    let mut events = Vec::new();
    for_each_event(xml, |event| {
        events.push(event);
        Ok(())
    })?;
    Ok(events)
}

fn start_parts(e: &BytesStart) -> Result<(String, Vec<(String, String)>)> {
    let name = utf8(e.name().as_ref())?.to_string();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| SoapEncodingError::Xml(format!("Invalid attribute: {}", e)))?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| SoapEncodingError::Xml(format!("Invalid attribute value: {}", e)))?;
        attributes.push((key, value.into_owned()));
    }
    Ok((name, attributes))
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| SoapEncodingError::Xml(format!("Invalid UTF-8: {}", e)))
}

/// Serialise an element tree.
///
/// `indent` is the number of spaces per level, `None` for compact output.
pub fn write_element(element: &XmlElement, indent: Option<usize>, declaration: bool) -> Result<String> {
    let mut writer = match indent {
        Some(width) => Writer::new_with_indent(Vec::new(), b' ', width),
        None => Writer::new(Vec::new()),
    };
    if declaration {
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(write_error)?;
    }
    write_node(&mut writer, element)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| SoapEncodingError::Xml(format!("Invalid UTF-8 output: {}", e)))
}

fn write_node(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    match &element.content {
        XmlContent::Empty => {
            writer.write_event(Event::Empty(start)).map_err(write_error)?;
        }
        XmlContent::Text(text) => {
            writer.write_event(Event::Start(start)).map_err(write_error)?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(element.name.as_str())))
                .map_err(write_error)?;
        }
        XmlContent::Children(children) => {
            writer.write_event(Event::Start(start)).map_err(write_error)?;
            for child in children {
                write_node(writer, child)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(element.name.as_str())))
                .map_err(write_error)?;
        }
    }
    Ok(())
}

fn write_error(e: impl std::fmt::Display) -> SoapEncodingError {
    SoapEncodingError::Xml(format!("XML write error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_events_self_closing_and_entities() {
        let events = read_events(r#"<?xml version="1.0"?><a x="1&amp;2"><b/>t&lt;u<!-- c --></a>"#)
            .unwrap();
        assert_eq!(
            events,
            vec![
                XmlEvent::TagStart {
                    name: "a".into(),
                    attributes: vec![("x".into(), "1&2".into())],
                },
                XmlEvent::TagStart {
                    name: "b".into(),
                    attributes: vec![],
                },
                XmlEvent::TagEnd { name: "b".into() },
                XmlEvent::Text("t<u".into()),
                XmlEvent::TagEnd { name: "a".into() },
            ]
        );
    }

    #[test]
    fn test_cdata_is_text() {
        let events = read_events("<a><![CDATA[<raw>]]></a>").unwrap();
        assert_eq!(events[1], XmlEvent::Text("<raw>".into()));
    }

    #[test]
    fn test_doctype_rejected() {
        let xml = r#"<?xml version="1.0"?><!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><foo>&xxe;</foo>"#;
        let err = read_events(xml).unwrap_err();
        assert!(matches!(err, SoapEncodingError::Xml(_)));
    }

    #[test]
    fn test_mismatched_end_tag() {
        assert!(read_events("<a><b></a>").is_err());
    }

    #[test]
    fn test_write_element() {
        let mut root = XmlElement::new("m:Get");
        root.set_attribute("xmlns:m", "urn:m");
        let mut child = XmlElement::new("name");
        child.set_text("a<b");
        root.push_child(child);
        root.push_child(XmlElement::new("empty"));

        let xml = write_element(&root, None, false).unwrap();
        assert_eq!(
            xml,
            r#"<m:Get xmlns:m="urn:m"><name>a&lt;b</name><empty/></m:Get>"#
        );

        let with_decl = write_element(&root, Some(2), true).unwrap();
        assert!(with_decl.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(with_decl.contains("\n  <name>"));
    }

    #[test]
    fn test_element_helpers() {
        let mut element = XmlElement::new("x");
        element.set_attribute("id", "1");
        element.set_attribute("id", "2");
        assert_eq!(element.attribute("id"), Some("2"));
        assert_eq!(element.attributes.len(), 1);
        element.set_text("");
        assert_eq!(element.content, XmlContent::Empty);
        assert!(element.children().is_empty());
    }
}
