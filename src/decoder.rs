//! Push decoder: XML events to a value graph.
//!
//! Elements whose shape cannot be known from their start tag are created as
//! [`Value::Unknown`] and settled when a child arrives (struct) or at the end
//! tag (registry classification). Hrefs become [`Value::Reference`]
//! placeholders that the [`ReferenceResolver`] replaces after the last event.

use crate::config::{DecodeConfig, EncodingStyle};
use crate::envelope::Envelope;
use crate::error::{Result, SoapEncodingError};
use crate::namespace::{NamespaceContext, QualifiedName, ENCODING_NS, ENVELOPE_NS, XSD_NS, XSI_NS};
use crate::resolver::{Owner, ReferenceResolver};
use crate::types::{is_array_notation, parse_array_position, Classification, TypeRegistry, ANY_TYPE};
use crate::value::{ArrayValue, Basetype, Node, NodeId, Reference, StructValue, Value};
use crate::xml::{for_each_event, XmlEvent};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Envelope,
    Header,
    Body,
    Node(NodeId),
}

#[derive(Debug)]
struct Frame {
    tag: String,
    ns: NamespaceContext,
    slot: Slot,
    style: EncodingStyle,
    text: String,
    saw_child: bool,
}

/// Encoding attributes of one start tag.
#[derive(Debug, Default)]
struct SoapAttributes {
    nil: bool,
    xsi_type: Option<QualifiedName>,
    array_type: Option<String>,
    href: Option<String>,
    id: Option<String>,
    root: Option<bool>,
    offset: Option<usize>,
    position: Option<usize>,
}

/// Event-driven decoder for one envelope.
pub struct Decoder<'r> {
    registry: &'r TypeRegistry,
    config: DecodeConfig,
    root_ns: NamespaceContext,
    envelope: Envelope,
    resolver: ReferenceResolver,
    stack: Vec<Frame>,
    elements: usize,
}

impl<'r> Decoder<'r> {
    pub fn new(registry: &'r TypeRegistry, config: DecodeConfig) -> Self {
        Self {
            registry,
            config,
            root_ns: NamespaceContext::new(),
            envelope: Envelope::new(),
            resolver: ReferenceResolver::new(),
            stack: Vec::new(),
            elements: 0,
        }
    }

    /// Start from a pre-populated namespace context, for fragments whose
    /// prefixes are declared out of band.
    pub fn with_namespaces(mut self, ns: NamespaceContext) -> Self {
        self.root_ns = ns;
        self
    }

    /// Decode a whole document.
    pub fn decode_str(mut self, xml: &str) -> Result<Envelope> {
        for_each_event(xml, |event| self.feed(event))?;
        self.finish()
    }

    pub fn feed(&mut self, event: XmlEvent) -> Result<()> {
        match event {
            XmlEvent::TagStart { name, attributes } => self.on_tag_start(&name, &attributes),
            XmlEvent::Text(text) => self.on_text(&text),
            XmlEvent::TagEnd { name } => self.on_tag_end(&name),
        }
    }

    pub fn on_tag_start(&mut self, tag: &str, attributes: &[(String, String)]) -> Result<()> {
        trace!(tag = tag, depth = self.stack.len(), "Tag start");

        if self.stack.len() >= self.config.max_depth {
            return Err(SoapEncodingError::LimitExceeded(format!(
                "Element depth exceeds {}",
                self.config.max_depth
            )));
        }
        self.elements += 1;
        if self.elements > self.config.max_elements {
            return Err(SoapEncodingError::LimitExceeded(format!(
                "Element count exceeds {}",
                self.config.max_elements
            )));
        }

        let (mut ns, parent_slot, mut style) = match self.stack.last_mut() {
            Some(parent) => {
                parent.saw_child = true;
                (parent.ns.clone(), Some(parent.slot), parent.style)
            }
            None => (self.root_ns.clone(), None, self.config.style),
        };

        for (key, value) in attributes {
            if key == "xmlns" {
                ns.declare_default(Some(value.as_str()));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                ns.declare(value, prefix);
            }
        }

        let name = ns.parse(tag)?;

        let mut encoding_style = None;
        for (key, value) in attributes {
            if is_attribute(&ns, ENVELOPE_NS, "encodingStyle", key) {
                if let Some(declared) = EncodingStyle::from_uri_list(value) {
                    style = declared;
                }
                encoding_style = Some(value.clone());
            }
        }

        let slot = match parent_slot {
            None if name.is(ENVELOPE_NS, "Envelope") => Some(Slot::Envelope),
            Some(Slot::Envelope) if name.is(ENVELOPE_NS, "Header") => Some(Slot::Header),
            Some(Slot::Envelope) if name.is(ENVELOPE_NS, "Body") => Some(Slot::Body),
            Some(Slot::Envelope) => {
                return Err(SoapEncodingError::FormatDecode(format!(
                    "Unexpected element {} in Envelope",
                    name
                )));
            }
            _ => None,
        };
        let slot = match slot {
            Some(container) => container,
            None => {
                let owner = match parent_slot {
                    Some(Slot::Header) => Owner::Header,
                    Some(Slot::Node(parent)) => Owner::Node(parent),
                    _ => Owner::Body,
                };
                let node = match style {
                    EncodingStyle::Dynamic => {
                        self.start_dynamic(&ns, name, owner, attributes, encoding_style)?
                    }
                    EncodingStyle::AspDotNet => {
                        self.start_asp_dot_net(name, owner, encoding_style)?
                    }
                };
                Slot::Node(node)
            }
        };

        self.stack.push(Frame {
            tag: tag.to_string(),
            ns,
            slot,
            style,
            text: String::new(),
            saw_child: false,
        });
        Ok(())
    }

    fn start_dynamic(
        &mut self,
        ns: &NamespaceContext,
        name: QualifiedName,
        owner: Owner,
        attributes: &[(String, String)],
        encoding_style: Option<String>,
    ) -> Result<NodeId> {
        let attrs = read_attributes(ns, attributes)?;

        let parent_element_type = match owner {
            Owner::Node(parent) => match self.envelope.graph.value(parent) {
                Value::Array(array) => Some(array.element_type.clone()),
                _ => None,
            },
            _ => None,
        };

        let value = if attrs.nil {
            Value::Null
        } else if let Some(href) = &attrs.href {
            Value::Reference(Reference {
                target: href.clone(),
            })
        } else if let Some(notation) = &attrs.array_type {
            Value::Array(self.array_from_attribute(ns, notation, attrs.offset)?)
        } else if let Some(type_name) = &attrs.xsi_type {
            self.dispatch(type_name, true, true)?
        } else if let Some(element_type) = &parent_element_type {
            self.dispatch(element_type, true, false)?
        } else {
            self.dispatch(&name, false, false)?
        };

        let node = self.envelope.graph.insert(Node {
            name: name.clone(),
            id: attrs.id.clone(),
            root: attrs.root,
            encoding_style,
            value,
        });

        if let Some(id) = &attrs.id {
            self.resolver.register_id(id, node)?;
        }
        if attrs.href.is_some() && !attrs.nil {
            self.resolver.enqueue(node, owner);
        }

        let position = if parent_element_type.is_some() && attrs.array_type.is_none() {
            attrs.position.or(attrs.offset)
        } else {
            attrs.position
        };
        self.attach(owner, name, node, position, EncodingStyle::Dynamic)?;
        Ok(node)
    }

    fn start_asp_dot_net(
        &mut self,
        name: QualifiedName,
        owner: Owner,
        encoding_style: Option<String>,
    ) -> Result<NodeId> {
        let mut node = Node::new(
            name.clone(),
            Value::Unknown {
                type_name: None,
                explicit: false,
            },
        );
        node.encoding_style = encoding_style;
        let node = self.envelope.graph.insert(node);
        self.attach(owner, name, node, None, EncodingStyle::AspDotNet)?;
        Ok(node)
    }

    /// Value skeleton for a type name.
    ///
    /// `strict` rejects unregistered XSD and SOAP-ENC names; names taken
    /// from context fall back to an unknown placeholder instead.
    fn dispatch(&self, type_name: &QualifiedName, explicit: bool, strict: bool) -> Result<Value> {
        let unknown = |type_name: Option<QualifiedName>| Value::Unknown {
            explicit: type_name.is_some(),
            type_name,
        };

        let Some(uri) = type_name.namespace.as_deref() else {
            return Ok(unknown(explicit.then(|| type_name.clone())));
        };
        if uri != XSD_NS && uri != ENCODING_NS {
            return Ok(unknown(explicit.then(|| type_name.clone())));
        }

        let local = type_name.name.as_str();
        if local == ANY_TYPE || local == "ur-type" {
            return Ok(unknown(None));
        }
        if uri == ENCODING_NS && local == "Struct" {
            return Ok(Value::Struct(StructValue::new(None)));
        }
        if is_array_notation(local) {
            let notation = self.registry.lookup_by_array_notation(local)?;
            return Ok(Value::Array(ArrayValue::new(
                QualifiedName::new(uri, notation.element_type),
                notation.declared_length,
            )));
        }
        if uri == ENCODING_NS && local == "Array" {
            return Ok(Value::Array(ArrayValue::new(QualifiedName::xsd(ANY_TYPE), None)));
        }
        if let Some(kind) = self.registry.lookup_by_type_attribute(uri, local) {
            return Ok(Value::Basetype(Basetype {
                type_name: type_name.clone(),
                kind,
                value: None,
            }));
        }
        if strict {
            return Err(SoapEncodingError::UnsupportedType(type_name.to_string()));
        }
        Ok(unknown(None))
    }

    fn array_from_attribute(
        &self,
        ns: &NamespaceContext,
        notation: &str,
        offset: Option<usize>,
    ) -> Result<ArrayValue> {
        let split = notation.find('[').ok_or_else(|| {
            SoapEncodingError::FormatDecode(format!("Illegal arrayType: {}", notation))
        })?;
        let element = ns.parse(&notation[..split])?;
        let parsed = self
            .registry
            .lookup_by_array_notation(&format!("{}{}", element.name, &notation[split..]))?;

        let element_type = QualifiedName {
            namespace: element.namespace,
            name: parsed.element_type,
        };
        let array = ArrayValue::new(element_type, parsed.declared_length);
        Ok(match offset {
            Some(offset) => {
                let mut array = array.with_offset(offset);
                array.sparse = true;
                array
            }
            None => array,
        })
    }

    fn attach(
        &mut self,
        owner: Owner,
        name: QualifiedName,
        node: NodeId,
        position: Option<usize>,
        style: EncodingStyle,
    ) -> Result<()> {
        let parent = match owner {
            Owner::Header => {
                self.envelope.add_header_entry(name, node);
                return Ok(());
            }
            Owner::Body => {
                self.envelope.add_body_entry(name, node);
                return Ok(());
            }
            Owner::Node(parent) => parent,
        };

        let parent_node = self.envelope.graph.get_mut(parent).ok_or_else(|| {
            SoapEncodingError::FormatDecode(format!("Unknown parent for element {}", name))
        })?;

        if let Value::Unknown { type_name, .. } = &parent_node.value {
            let promoted = Value::Struct(StructValue::new(type_name.clone()));
            debug!(element = %parent_node.name, "Promoting element to struct");
            parent_node.value = promoted;
        }

        if style == EncodingStyle::AspDotNet && matches!(parent_node.value, Value::Struct(_)) {
            return self.merge_member(parent, name, node);
        }

        match &mut parent_node.value {
            Value::Struct(members) => {
                if let Some(previous) = members.insert(name.clone(), node) {
                    debug!(
                        member = %name,
                        previous = previous.index(),
                        "Overwriting repeated struct member"
                    );
                }
                Ok(())
            }
            Value::Array(array) => match position {
                Some(index) => array.set(index, node),
                None => array.push(node).map(|_| ()),
            },
            other => Err(SoapEncodingError::FormatDecode(format!(
                "Element {} cannot be a child of a {}",
                name,
                other.kind_name()
            ))),
        }
    }

    /// Repeated member names gather into an implicit array.
    fn merge_member(&mut self, parent: NodeId, name: QualifiedName, node: NodeId) -> Result<()> {
        let graph = &mut self.envelope.graph;
        let existing = graph.member(parent, &name.name);
        let Some(existing) = existing else {
            graph.add_member(parent, node)?;
            return Ok(());
        };

        if matches!(graph.value(existing), Value::Array(_)) {
            graph.push_element(existing, node)?;
            return Ok(());
        }

        debug!(member = %name, "Merging repeated member into array");
        let array = graph.new_array(name.clone(), QualifiedName::xsd(ANY_TYPE), None);
        graph.push_element(array, existing)?;
        graph.push_element(array, node)?;
        graph.replace_child(parent, existing, array);
        Ok(())
    }

    pub fn on_text(&mut self, text: &str) -> Result<()> {
        let Some(frame) = self.stack.last_mut() else {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(SoapEncodingError::FormatDecode(
                "Text outside of any element".to_string(),
            ));
        };
        if frame.text.len() + text.len() > self.config.max_text_length {
            return Err(SoapEncodingError::LimitExceeded(format!(
                "Text length exceeds {}",
                self.config.max_text_length
            )));
        }
        frame.text.push_str(text);
        Ok(())
    }

    pub fn on_tag_end(&mut self, tag: &str) -> Result<()> {
        trace!(tag = tag, depth = self.stack.len(), "Tag end");

        let frame = self.stack.pop().ok_or_else(|| {
            SoapEncodingError::FormatDecode(format!("Unexpected end tag {}", tag))
        })?;
        if frame.tag != tag {
            return Err(SoapEncodingError::FormatDecode(format!(
                "End tag {} does not match {}",
                tag, frame.tag
            )));
        }

        let node_id = match frame.slot {
            Slot::Node(node) => node,
            _ => {
                if !frame.text.trim().is_empty() {
                    warn!(element = tag, "Discarding text in envelope container");
                }
                return Ok(());
            }
        };
        let node = self.envelope.graph.get_mut(node_id).ok_or_else(|| {
            SoapEncodingError::FormatDecode(format!("Lost node for element {}", tag))
        })?;

        let value = std::mem::replace(&mut node.value, Value::Null);
        node.value = match value {
            Value::Unknown {
                type_name,
                explicit,
            } => {
                let classification = self.registry.classify_ambiguous_element(
                    frame.saw_child,
                    explicit,
                    &frame.text,
                );
                debug!(
                    element = %node.name,
                    classification = ?classification,
                    "Classified untyped element"
                );
                match classification {
                    Classification::Struct => Value::Struct(StructValue::new(type_name)),
                    Classification::String => Value::Basetype(Basetype::string(frame.text)),
                }
            }
            Value::Basetype(basetype) => Value::Basetype(Basetype::from_lexical(
                basetype.type_name,
                basetype.kind,
                &frame.text,
            )?),
            other => {
                if !frame.text.trim().is_empty() {
                    warn!(
                        element = %node.name,
                        kind = other.kind_name(),
                        "Discarding stray text"
                    );
                }
                other
            }
        };
        Ok(())
    }

    /// Complete decoding and resolve references.
    pub fn finish(mut self) -> Result<Envelope> {
        if let Some(open) = self.stack.last() {
            return Err(SoapEncodingError::FormatDecode(format!(
                "Element {} is not closed",
                open.tag
            )));
        }
        debug!(
            elements = self.elements,
            references = self.resolver.pending(),
            "Decoding finished"
        );
        self.resolver.resolve(&mut self.envelope)?;
        Ok(self.envelope)
    }
}

/// Whether an attribute key names `{uri}local`. Unprefixed attributes are in
/// no namespace.
fn is_attribute(ns: &NamespaceContext, uri: &str, local: &str, key: &str) -> bool {
    key.contains(':') && ns.compare(uri, local, key)
}

fn read_attributes(ns: &NamespaceContext, attributes: &[(String, String)]) -> Result<SoapAttributes> {
    let mut attrs = SoapAttributes::default();
    for (key, value) in attributes {
        if is_attribute(ns, XSI_NS, "nil", key) {
            attrs.nil = match value.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                other => {
                    return Err(SoapEncodingError::FormatDecode(format!(
                        "Illegal xsi:nil value '{}'",
                        other
                    )))
                }
            };
        } else if is_attribute(ns, XSI_NS, "type", key) {
            attrs.xsi_type = Some(ns.parse(value.trim())?);
        } else if is_attribute(ns, ENCODING_NS, "arrayType", key) {
            attrs.array_type = Some(value.trim().to_string());
        } else if key == "href" {
            attrs.href = Some(value.clone());
        } else if key == "id" {
            attrs.id = Some(value.clone());
        } else if is_attribute(ns, ENCODING_NS, "root", key) {
            attrs.root = Some(match value.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                other => {
                    return Err(SoapEncodingError::FormatDecode(format!(
                        "Illegal root value '{}'",
                        other
                    )))
                }
            });
        } else if is_attribute(ns, ENCODING_NS, "offset", key) {
            attrs.offset = Some(parse_array_position(value)?);
        } else if is_attribute(ns, ENCODING_NS, "position", key) {
            attrs.position = Some(parse_array_position(value)?);
        }
    }
    Ok(attrs)
}
