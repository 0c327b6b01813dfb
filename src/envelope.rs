//! SOAP envelope framing and the configured codec facade.

use crate::config::CodecConfig;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Result, SoapEncodingError};
use crate::namespace::{
    NamespaceContext, NamespaceSession, QualifiedName, ENCODING_NS, ENVELOPE_NS, XSD_NS, XSI_NS,
};
use crate::resolver::Owner;
use crate::types::TypeRegistry;
use crate::value::{Member, NodeId, ValueGraph};
use crate::xml::{write_element, XmlElement};
use tracing::debug;

/// A decoded or to-be-encoded envelope.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Arena holding every value of the envelope
    pub graph: ValueGraph,
    header: Vec<Member>,
    body: Vec<Member>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_header_entry(&mut self, name: QualifiedName, node: NodeId) {
        self.header.push(Member::new(name, node));
    }

    pub fn add_body_entry(&mut self, name: QualifiedName, node: NodeId) {
        self.body.push(Member::new(name, node));
    }

    pub fn header(&self) -> &[Member] {
        &self.header
    }

    pub fn body(&self) -> &[Member] {
        &self.body
    }

    /// Body entries that are serialization roots, i.e. not flagged
    /// `SOAP-ENC:root="0"`.
    pub fn root_entries(&self) -> impl Iterator<Item = &Member> {
        self.body
            .iter()
            .filter(move |m| self.graph.get(m.node).and_then(|n| n.root) != Some(false))
    }

    /// First body entry with the given local name.
    pub fn body_entry(&self, local: &str) -> Option<NodeId> {
        self.body
            .iter()
            .find(|m| m.name.name == local)
            .map(|m| m.node)
    }

    pub(crate) fn replace_entry(&mut self, owner: Owner, old: NodeId, new: NodeId) {
        let entries = match owner {
            Owner::Header => &mut self.header,
            Owner::Body => &mut self.body,
            Owner::Node(_) => return,
        };
        for entry in entries.iter_mut().filter(|e| e.node == old) {
            entry.node = new;
        }
    }
}

/// Configured entry point for decoding and encoding envelopes.
pub struct SoapCodec {
    config: CodecConfig,
    registry: TypeRegistry,
    session: NamespaceSession,
}

impl SoapCodec {
    /// Create a codec with the default type registry.
    pub fn new(config: CodecConfig) -> Self {
        Self::with_registry(config, TypeRegistry::default())
    }

    pub fn with_registry(config: CodecConfig, registry: TypeRegistry) -> Self {
        Self {
            config,
            registry,
            session: NamespaceSession::new(),
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Decoder bound to this codec's registry and limits.
    pub fn decoder(&self) -> Decoder<'_> {
        Decoder::new(&self.registry, self.config.decoding.clone())
    }

    /// Decode a SOAP envelope or a bare fragment.
    pub fn decode(&self, xml: &str) -> Result<Envelope> {
        let envelope = self.decoder().decode_str(xml)?;
        debug!(
            headers = envelope.header().len(),
            entries = envelope.body().len(),
            nodes = envelope.graph.len(),
            "Decoded envelope"
        );
        Ok(envelope)
    }

    /// Decode raw bytes, which must be UTF-8.
    pub fn decode_bytes(&self, data: &[u8]) -> Result<Envelope> {
        let xml = std::str::from_utf8(data)
            .map_err(|e| SoapEncodingError::Xml(format!("Invalid UTF-8: {}", e)))?;
        self.decode(xml)
    }

    /// Build the `Envelope` element tree.
    ///
    /// Prefix numbering restarts for every document.
    pub fn encode_envelope(&self, envelope: &Envelope) -> Result<XmlElement> {
        self.session.reset();
        let prefixes = &self.config.encoding.prefixes;
        let mut ns = NamespaceContext::new();
        let mut root = XmlElement::new("");
        for (uri, preferred) in [
            (ENVELOPE_NS, prefixes.envelope.as_str()),
            (ENCODING_NS, prefixes.encoding.as_str()),
            (XSD_NS, prefixes.xsd.as_str()),
            (XSI_NS, prefixes.xsi.as_str()),
        ] {
            let preferred = Some(preferred).filter(|p| !p.is_empty());
            let prefix = ns.assign(&self.session, uri, preferred);
            root.set_attribute(format!("xmlns:{}", prefix), uri);
        }
        root.name = ns.qualify(Some(ENVELOPE_NS), "Envelope")?;

        let encoder = Encoder::new(&self.registry, &self.session, &self.config.encoding);
        let entries: Vec<Member> = envelope
            .header()
            .iter()
            .chain(envelope.body())
            .cloned()
            .collect();
        let mut encoded = encoder.encode_entries(&envelope.graph, &entries, &ns)?;
        let body_entries = encoded.split_off(envelope.header().len());

        if !encoded.is_empty() {
            let mut header = XmlElement::new(ns.qualify(Some(ENVELOPE_NS), "Header")?);
            for entry in encoded {
                header.push_child(entry);
            }
            root.push_child(header);
        }
        let mut body = XmlElement::new(ns.qualify(Some(ENVELOPE_NS), "Body")?);
        for entry in body_entries {
            body.push_child(entry);
        }
        root.push_child(body);
        Ok(root)
    }

    /// Encode an envelope as a document.
    pub fn encode(&self, envelope: &Envelope) -> Result<String> {
        let element = self.encode_envelope(envelope)?;
        write_element(
            &element,
            self.config.encoding.indent,
            self.config.encoding.xml_declaration,
        )
    }

    /// Encode a single node as element `name`, outside any envelope.
    pub fn encode_value(
        &self,
        graph: &ValueGraph,
        node: NodeId,
        name: &QualifiedName,
    ) -> Result<XmlElement> {
        self.session.reset();
        let encoder = Encoder::new(&self.registry, &self.session, &self.config.encoding);
        encoder.encode(graph, node, &NamespaceContext::new(), name)
    }
}

impl Default for SoapCodec {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}
