//! Value graph to XML element tree.

use crate::config::{EncodeConfig, EncodingStyle};
use crate::error::{Result, SoapEncodingError};
use crate::namespace::{
    NamespaceContext, NamespaceSession, QualifiedName, ENCODING_NS, ENVELOPE_NS, XSD_NS, XSI_NS,
};
use crate::types::{array_item_name, notation_rank, NativeKind, TypeRegistry, ANY_TYPE};
use crate::value::{ArrayValue, Basetype, Member, NodeId, StructValue, Value, ValueGraph};
use crate::xml::XmlElement;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Multi-reference bookkeeping for one encoding pass.
#[derive(Debug, Default)]
struct EncodeState {
    /// Ids of nodes reachable more than once
    shared: HashMap<NodeId, String>,
    /// Shared nodes already written in full under multiref
    emitted: HashSet<NodeId>,
    /// Nodes whose own `id` has been written
    ids_written: HashSet<NodeId>,
    /// Nodes on the current descent path
    path: HashSet<NodeId>,
}

/// Context inherited from the enclosing element.
#[derive(Debug, Clone, Copy)]
struct Inherited<'t> {
    /// `None` makes the element announce its style
    style: Option<EncodingStyle>,
    /// Element type of the enclosing array
    element_type: Option<&'t QualifiedName>,
}

/// Encodes value graphs into element trees.
pub struct Encoder<'a> {
    registry: &'a TypeRegistry,
    session: &'a NamespaceSession,
    config: &'a EncodeConfig,
}

impl<'a> Encoder<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        session: &'a NamespaceSession,
        config: &'a EncodeConfig,
    ) -> Self {
        Self {
            registry,
            session,
            config,
        }
    }

    /// Encode one node as element `name` under `ns`.
    ///
    /// The element inherits the configured style and does not announce it
    /// unless the node overrides it.
    pub fn encode(
        &self,
        graph: &ValueGraph,
        node: NodeId,
        ns: &NamespaceContext,
        name: &QualifiedName,
    ) -> Result<XmlElement> {
        let mut state = self.scan(graph, &[node]);
        let inherited = Inherited {
            style: Some(self.config.style),
            element_type: None,
        };
        self.encode_node(graph, node, ns.clone(), name, inherited, &mut state)
    }

    /// Encode several top-level entries sharing one multi-reference scan.
    ///
    /// Every entry announces its encoding style.
    pub fn encode_entries(
        &self,
        graph: &ValueGraph,
        entries: &[Member],
        ns: &NamespaceContext,
    ) -> Result<Vec<XmlElement>> {
        let roots: Vec<NodeId> = entries.iter().map(|m| m.node).collect();
        let mut state = self.scan(graph, &roots);
        let inherited = Inherited {
            style: None,
            element_type: None,
        };
        entries
            .iter()
            .map(|m| self.encode_node(graph, m.node, ns.clone(), &m.name, inherited, &mut state))
            .collect()
    }

    /// Count how often each node is reached and assign ids to shared ones.
    fn scan(&self, graph: &ValueGraph, roots: &[NodeId]) -> EncodeState {
        let mut state = EncodeState::default();
        if !self.config.multiref {
            return state;
        }

        let mut visits: HashMap<NodeId, usize> = HashMap::new();
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let count = visits.entry(id).or_insert(0);
            *count += 1;
            if *count > 1 {
                continue;
            }
            order.push(id);
            match graph.value(id) {
                Value::Struct(s) => stack.extend(s.members().iter().rev().map(|m| m.node)),
                Value::Array(a) => {
                    let items: Vec<NodeId> = a.iter().map(|(_, n)| n).collect();
                    stack.extend(items.into_iter().rev());
                }
                _ => {}
            }
        }

        let mut taken: HashSet<String> = order
            .iter()
            .filter_map(|id| graph.get(*id).and_then(|n| n.id.clone()))
            .collect();
        let mut minted = 0;
        for id in order {
            if visits.get(&id).copied().unwrap_or(0) < 2 {
                continue;
            }
            let assigned = match graph.get(id).and_then(|n| n.id.clone()) {
                Some(existing) => existing,
                None => loop {
                    minted += 1;
                    let candidate = format!("id{}", minted);
                    if taken.insert(candidate.clone()) {
                        break candidate;
                    }
                },
            };
            debug!(node = id.index(), id = %assigned, "Shared node encoded as multiref");
            state.shared.insert(id, assigned);
        }
        state
    }

    fn encode_node(
        &self,
        graph: &ValueGraph,
        id: NodeId,
        mut ns: NamespaceContext,
        name: &QualifiedName,
        inherited: Inherited<'_>,
        state: &mut EncodeState,
    ) -> Result<XmlElement> {
        let node = graph
            .get(id)
            .ok_or_else(|| SoapEncodingError::Encoding(format!("Unknown node handle {}", id.index())))?;

        let mut decls = Vec::new();
        let mut attributes = Vec::new();

        let override_style = node
            .encoding_style
            .as_deref()
            .and_then(EncodingStyle::from_uri_list);
        let style = override_style
            .or(inherited.style)
            .unwrap_or(self.config.style);
        let multiref = self.config.multiref && style == EncodingStyle::Dynamic;

        let element_name = self.qualify_declaring(&mut ns, &mut decls, name)?;

        let shared_id = if multiref { state.shared.get(&id).cloned() } else { None };
        if let Some(shared) = &shared_id {
            if state.emitted.contains(&id) {
                let mut element = XmlElement::new(element_name);
                element.attributes = decls;
                element.set_attribute("href", format!("#{}", shared));
                return Ok(element);
            }
        }
        if !state.path.insert(id) {
            return Err(SoapEncodingError::Encoding(format!(
                "Cycle through element {} requires multiref encoding",
                name
            )));
        }

        if shared_id.is_some() {
            state.emitted.insert(id);
        }
        if style == EncodingStyle::Dynamic {
            let first_id = state.ids_written.insert(id);
            let wire_id = shared_id.or_else(|| node.id.clone().filter(|_| first_id));
            if let Some(wire_id) = wire_id {
                attributes.push(("id".to_string(), wire_id));
            }
            if let Some(root) = node.root {
                let prefix = self.attribute_prefix(&mut ns, &mut decls, ENCODING_NS);
                attributes.push((format!("{}:root", prefix), if root { "1" } else { "0" }.to_string()));
            }
        }
        if node.encoding_style.is_some() || inherited.style.is_none() {
            let uri = node
                .encoding_style
                .clone()
                .unwrap_or_else(|| style.namespace().to_string());
            let prefix = self.attribute_prefix(&mut ns, &mut decls, ENVELOPE_NS);
            attributes.push((format!("{}:encodingStyle", prefix), uri));
        }

        let mut element = XmlElement::new(element_name);
        match &node.value {
            Value::Null => {
                let prefix = self.attribute_prefix(&mut ns, &mut decls, XSI_NS);
                attributes.push((format!("{}:nil", prefix), "true".to_string()));
            }
            Value::Basetype(basetype) => {
                if style == EncodingStyle::Dynamic && self.config.explicit_typing {
                    let type_name = self.basetype_type_name(basetype)?;
                    if inherited.element_type != Some(&type_name) {
                        self.push_type(&mut ns, &mut decls, &mut attributes, &type_name)?;
                    }
                }
                element.set_text(basetype.lexical());
            }
            Value::Struct(members) => {
                if style == EncodingStyle::Dynamic && self.config.explicit_typing {
                    match &members.type_name {
                        Some(type_name) if inherited.element_type != Some(type_name) => {
                            self.push_type(&mut ns, &mut decls, &mut attributes, type_name)?;
                        }
                        // An empty untyped element reads back as an empty string.
                        None if members.is_empty() => {
                            let marker = QualifiedName::encoding("Struct");
                            self.push_type(&mut ns, &mut decls, &mut attributes, &marker)?;
                        }
                        _ => {}
                    }
                }
                self.encode_members(graph, members, &ns, style, &mut element, state)?;
            }
            Value::Array(array) => {
                if style == EncodingStyle::Dynamic {
                    self.array_attributes(array, &mut ns, &mut decls, &mut attributes)?;
                }
                self.encode_items(graph, array, &ns, style, &mut element, state)?;
            }
            Value::Reference(r) => {
                return Err(SoapEncodingError::Encoding(format!(
                    "Unresolved reference {} cannot be encoded",
                    r.target
                )));
            }
            Value::Unknown { .. } => {
                return Err(SoapEncodingError::Encoding(format!(
                    "Unclassified element {} cannot be encoded",
                    name
                )));
            }
        }

        state.path.remove(&id);
        decls.extend(attributes);
        element.attributes = decls;
        Ok(element)
    }

    fn encode_members(
        &self,
        graph: &ValueGraph,
        members: &StructValue,
        ns: &NamespaceContext,
        style: EncodingStyle,
        element: &mut XmlElement,
        state: &mut EncodeState,
    ) -> Result<()> {
        let inherited = Inherited {
            style: Some(style),
            element_type: None,
        };
        for member in members.iter() {
            // Merged arrays are written back as repeated members.
            if style == EncodingStyle::AspDotNet {
                if let Value::Array(items) = graph.value(member.node) {
                    for (_, item) in items.iter() {
                        let child =
                            self.encode_node(graph, item, ns.clone(), &member.name, inherited, state)?;
                        element.push_child(child);
                    }
                    continue;
                }
            }
            let child = self.encode_node(graph, member.node, ns.clone(), &member.name, inherited, state)?;
            element.push_child(child);
        }
        Ok(())
    }

    fn array_attributes(
        &self,
        array: &ArrayValue,
        ns: &mut NamespaceContext,
        decls: &mut Vec<(String, String)>,
        attributes: &mut Vec<(String, String)>,
    ) -> Result<()> {
        let rank = notation_rank(&array.element_type.name);
        if rank != 1 {
            return Err(SoapEncodingError::ArrayRank(rank));
        }

        let enc = self.attribute_prefix(ns, decls, ENCODING_NS);
        if self.config.explicit_typing && array.element_type.name != ANY_TYPE {
            let xsi = self.attribute_prefix(ns, decls, XSI_NS);
            attributes.push((format!("{}:type", xsi), format!("{}:Array", enc)));
        }

        let element_type = self.qualify_declaring(ns, decls, &array.element_type)?;
        attributes.push((
            format!("{}:arrayType", enc),
            format!("{}[{}]", element_type, array.len()),
        ));

        if !array.sparse {
            if let Some((first, _)) = array.iter().next() {
                if first > 0 {
                    attributes.push((format!("{}:offset", enc), format!("[{}]", first)));
                }
            }
        }
        Ok(())
    }

    fn encode_items(
        &self,
        graph: &ValueGraph,
        array: &ArrayValue,
        ns: &NamespaceContext,
        style: EncodingStyle,
        element: &mut XmlElement,
        state: &mut EncodeState,
    ) -> Result<()> {
        let item_name = QualifiedName::local(array_item_name(&array.element_type.name));
        let inherited = Inherited {
            style: Some(style),
            element_type: Some(&array.element_type),
        };

        if array.sparse && style == EncodingStyle::Dynamic {
            for (index, item) in array.iter() {
                let mut child = self.encode_node(graph, item, ns.clone(), &item_name, inherited, state)?;
                let mut child_ns = ns.clone();
                let mut decls = Vec::new();
                let enc = self.attribute_prefix(&mut child_ns, &mut decls, ENCODING_NS);
                for decl in decls {
                    child.set_attribute(decl.0, decl.1);
                }
                child.set_attribute(format!("{}:position", enc), format!("[{}]", index));
                element.push_child(child);
            }
            return Ok(());
        }

        let mut expected = None;
        for (index, item) in array.iter() {
            if let Some(next) = expected {
                for _ in next..index {
                    element.push_child(self.nil_item(ns, &item_name)?);
                }
            }
            let child = self.encode_node(graph, item, ns.clone(), &item_name, inherited, state)?;
            element.push_child(child);
            expected = Some(index + 1);
        }
        Ok(())
    }

    fn nil_item(&self, ns: &NamespaceContext, name: &QualifiedName) -> Result<XmlElement> {
        let mut ns = ns.clone();
        let mut decls = Vec::new();
        let mut element = XmlElement::new(self.qualify_declaring(&mut ns, &mut decls, name)?);
        let xsi = self.attribute_prefix(&mut ns, &mut decls, XSI_NS);
        decls.push((format!("{}:nil", xsi), "true".to_string()));
        element.attributes = decls;
        Ok(element)
    }

    /// Type name written for a basetype.
    fn basetype_type_name(&self, basetype: &Basetype) -> Result<QualifiedName> {
        if self.registry.names_kind(&basetype.type_name, basetype.kind) {
            return Ok(basetype.type_name.clone());
        }
        if let Some(name) = self.registry.type_name_of(basetype.kind) {
            return Ok(name.clone());
        }
        if basetype.kind == NativeKind::String {
            return Ok(QualifiedName::xsd("string"));
        }
        Err(SoapEncodingError::Encoding(format!(
            "No type name registered for xsd:{}",
            basetype.kind
        )))
    }

    fn push_type(
        &self,
        ns: &mut NamespaceContext,
        decls: &mut Vec<(String, String)>,
        attributes: &mut Vec<(String, String)>,
        type_name: &QualifiedName,
    ) -> Result<()> {
        let xsi = self.attribute_prefix(ns, decls, XSI_NS);
        let value = self.qualify_declaring(ns, decls, type_name)?;
        attributes.push((format!("{}:type", xsi), value));
        Ok(())
    }

    /// Qualify a name, declaring its namespace on this element when needed.
    fn qualify_declaring(
        &self,
        ns: &mut NamespaceContext,
        decls: &mut Vec<(String, String)>,
        name: &QualifiedName,
    ) -> Result<String> {
        match name.namespace.as_deref() {
            Some(uri) if !ns.is_declared(uri) => {
                let prefix = ns.assign(self.session, uri, self.preferred_prefix(uri));
                decls.push(declaration(&prefix, uri));
            }
            None if ns.default_namespace().is_some() => {
                ns.declare_default(None);
                decls.push(("xmlns".to_string(), String::new()));
            }
            _ => {}
        }
        ns.qualify_name(name)
    }

    /// Prefix for a namespaced attribute. Attributes never use the default
    /// namespace, so a prefix is always bound.
    fn attribute_prefix(
        &self,
        ns: &mut NamespaceContext,
        decls: &mut Vec<(String, String)>,
        uri: &str,
    ) -> String {
        if let Some(prefix) = ns.prefix_of(uri) {
            return prefix.to_string();
        }
        let preferred = self.preferred_prefix(uri).filter(|p| !p.is_empty());
        let mut prefix = ns.assign(self.session, uri, preferred);
        if prefix.is_empty() {
            prefix = ns.assign(self.session, uri, Some(&self.session.next_prefix()));
        }
        decls.push(declaration(&prefix, uri));
        prefix
    }

    fn preferred_prefix(&self, uri: &str) -> Option<&str> {
        let prefixes = &self.config.prefixes;
        match uri {
            ENVELOPE_NS => Some(prefixes.envelope.as_str()),
            ENCODING_NS => Some(prefixes.encoding.as_str()),
            XSD_NS => Some(prefixes.xsd.as_str()),
            XSI_NS => Some(prefixes.xsi.as_str()),
            _ => None,
        }
    }
}

fn declaration(prefix: &str, uri: &str) -> (String, String) {
    if prefix.is_empty() {
        ("xmlns".to_string(), uri.to_string())
    } else {
        (format!("xmlns:{}", prefix), uri.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scalar;
    use crate::xml::write_element;

    fn encode(graph: &ValueGraph, node: NodeId, config: &EncodeConfig) -> Result<XmlElement> {
        let registry = TypeRegistry::default();
        let session = NamespaceSession::new();
        let encoder = Encoder::new(&registry, &session, config);
        encoder.encode(graph, node, &NamespaceContext::new(), &graph[node].name)
    }

    fn render(element: &XmlElement) -> String {
        write_element(element, None, false).unwrap()
    }

    #[test]
    fn test_basetype() {
        let mut graph = ValueGraph::new();
        let n = graph.basetype(QualifiedName::local("count"), Basetype::int(3));
        let xml = render(&encode(&graph, n, &EncodeConfig::default()).unwrap());
        assert_eq!(
            xml,
            r#"<count xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xsi:type="xsd:int">3</count>"#
        );
    }

    #[test]
    fn test_untyped_output() {
        let mut graph = ValueGraph::new();
        let n = graph.basetype(QualifiedName::local("s"), Basetype::string("v"));
        let config = EncodeConfig {
            explicit_typing: false,
            ..EncodeConfig::default()
        };
        assert_eq!(render(&encode(&graph, n, &config).unwrap()), "<s>v</s>");
    }

    #[test]
    fn test_null() {
        let mut graph = ValueGraph::new();
        let n = graph.null(QualifiedName::local("nothing"));
        let element = encode(&graph, n, &EncodeConfig::default()).unwrap();
        assert_eq!(element.attribute("xsi:nil"), Some("true"));
        assert!(element.attribute("xsi:type").is_none());
    }

    #[test]
    fn test_struct_members_and_namespace() {
        let mut graph = ValueGraph::new();
        let s = graph.new_struct(
            QualifiedName::new("urn:m", "order"),
            Some(QualifiedName::new("urn:m", "Order")),
        );
        let id = graph.basetype(QualifiedName::local("id"), Basetype::long(7));
        graph.add_member(s, id).unwrap();

        let element = encode(&graph, s, &EncodeConfig::default()).unwrap();
        assert_eq!(element.name, "n1:order");
        assert_eq!(element.attribute("xmlns:n1"), Some("urn:m"));
        assert_eq!(element.attribute("xsi:type"), Some("n1:Order"));
        let child = &element.children()[0];
        assert_eq!(child.name, "id");
        assert_eq!(child.attribute("xsi:type"), Some("xsd:long"));
        assert_eq!(child.text(), Some("7"));
    }

    #[test]
    fn test_unnamespaced_member_under_default_namespace() {
        let mut graph = ValueGraph::new();
        let s = graph.new_struct(QualifiedName::local("s"), None);
        let m = graph.basetype(QualifiedName::local("m"), Basetype::string("x"));
        graph.add_member(s, m).unwrap();

        let registry = TypeRegistry::default();
        let session = NamespaceSession::new();
        let config = EncodeConfig::default();
        let encoder = Encoder::new(&registry, &session, &config);
        let mut ns = NamespaceContext::new();
        ns.declare_default(Some("urn:d"));
        let element = encoder.encode(&graph, s, &ns, &QualifiedName::local("s")).unwrap();
        assert_eq!(element.attribute("xmlns"), Some(""));
        assert!(element.children()[0].attribute("xmlns").is_none());
    }

    #[test]
    fn test_dense_array() {
        let mut graph = ValueGraph::new();
        let a = graph.new_array(QualifiedName::local("nums"), QualifiedName::xsd("int"), None);
        for i in [1, 2] {
            let item = graph.basetype(QualifiedName::local("item"), Basetype::int(i));
            graph.push_element(a, item).unwrap();
        }
        let element = encode(&graph, a, &EncodeConfig::default()).unwrap();
        assert_eq!(element.attribute("xsi:type"), Some("enc:Array"));
        assert_eq!(element.attribute("enc:arrayType"), Some("xsd:int[2]"));
        assert_eq!(element.children().len(), 2);
        assert_eq!(element.children()[0].name, "int");
        assert!(element.children()[0].attribute("xsi:type").is_none());
    }

    #[test]
    fn test_sparse_array_positions() {
        let mut graph = ValueGraph::new();
        let a = graph.new_array(QualifiedName::local("a"), QualifiedName::xsd("string"), Some(4));
        let item = graph.basetype(QualifiedName::local("x"), Basetype::string("v"));
        graph.set_element(a, 2, item).unwrap();

        let element = encode(&graph, a, &EncodeConfig::default()).unwrap();
        assert_eq!(element.attribute("enc:arrayType"), Some("xsd:string[4]"));
        assert_eq!(element.children().len(), 1);
        assert_eq!(element.children()[0].attribute("enc:position"), Some("[2]"));
    }

    #[test]
    fn test_dense_offset_and_gap() {
        let mut graph = ValueGraph::new();
        let first = graph.basetype(QualifiedName::local("i"), Basetype::int(1));
        let second = graph.basetype(QualifiedName::local("i"), Basetype::int(3));
        let mut array = ArrayValue::new(QualifiedName::xsd("int"), Some(5)).with_offset(1);
        array.push(first).unwrap();
        array.set(3, second).unwrap();
        array.sparse = false;
        let a = graph.insert(crate::value::Node::new(QualifiedName::local("a"), Value::Array(array)));

        let element = encode(&graph, a, &EncodeConfig::default()).unwrap();
        assert_eq!(element.attribute("enc:offset"), Some("[1]"));
        let children = element.children();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].text(), Some("1"));
        assert_eq!(children[1].attribute("xsi:nil"), Some("true"));
        assert_eq!(children[2].text(), Some("3"));
    }

    #[test]
    fn test_nested_array_item_name() {
        let mut graph = ValueGraph::new();
        let outer = graph.new_array(QualifiedName::local("m"), QualifiedName::xsd("int[]"), None);
        let inner = graph.new_array(QualifiedName::local("r"), QualifiedName::xsd("int"), None);
        let v = graph.basetype(QualifiedName::local("v"), Basetype::int(1));
        graph.push_element(inner, v).unwrap();
        graph.push_element(outer, inner).unwrap();

        let element = encode(&graph, outer, &EncodeConfig::default()).unwrap();
        assert_eq!(element.attribute("enc:arrayType"), Some("xsd:int[][1]"));
        assert_eq!(element.children()[0].name, "intArray");
    }

    #[test]
    fn test_rank_two_element_type() {
        let mut graph = ValueGraph::new();
        let a = graph.new_array(QualifiedName::local("m"), QualifiedName::xsd("int[,]"), None);
        assert!(matches!(
            encode(&graph, a, &EncodeConfig::default()).unwrap_err(),
            SoapEncodingError::ArrayRank(2)
        ));
    }

    #[test]
    fn test_shared_node_multiref() {
        let mut graph = ValueGraph::new();
        let s = graph.new_struct(QualifiedName::local("pair"), None);
        let shared = graph.basetype(QualifiedName::local("v"), Basetype::string("x"));
        let left = graph.new_struct(QualifiedName::local("left"), None);
        let right = graph.new_struct(QualifiedName::local("right"), None);
        graph.add_member(left, shared).unwrap();
        graph.add_member(right, shared).unwrap();
        graph.add_member(s, left).unwrap();
        graph.add_member(s, right).unwrap();

        let element = encode(&graph, s, &EncodeConfig::default()).unwrap();
        let first = &element.children()[0].children()[0];
        let second = &element.children()[1].children()[0];
        assert_eq!(first.attribute("id"), Some("id1"));
        assert_eq!(second.attribute("href"), Some("#id1"));
        assert_eq!(second.content, crate::xml::XmlContent::Empty);
    }

    #[test]
    fn test_cycle_without_multiref() {
        let mut graph = ValueGraph::new();
        let a = graph.new_struct(QualifiedName::local("a"), None);
        let b = graph.new_struct(QualifiedName::local("b"), None);
        graph.add_member(a, b).unwrap();
        graph.add_member(b, a).unwrap();

        let config = EncodeConfig {
            multiref: false,
            ..EncodeConfig::default()
        };
        assert!(matches!(
            encode(&graph, a, &config).unwrap_err(),
            SoapEncodingError::Encoding(_)
        ));
        assert!(encode(&graph, a, &EncodeConfig::default()).is_ok());
    }

    #[test]
    fn test_existing_id_reused() {
        let mut graph = ValueGraph::new();
        let a = graph.new_struct(QualifiedName::local("a"), None);
        graph[a].id = Some("self".to_string());
        graph.add_member(a, a).unwrap();
        let element = encode(&graph, a, &EncodeConfig::default()).unwrap();
        assert_eq!(element.attribute("id"), Some("self"));
        assert_eq!(element.children()[0].attribute("href"), Some("#self"));
    }

    #[test]
    fn test_placeholders_rejected() {
        let mut graph = ValueGraph::new();
        let r = graph.insert(crate::value::Node::new(
            QualifiedName::local("r"),
            Value::Reference(crate::value::Reference {
                target: "#x".to_string(),
            }),
        ));
        assert!(encode(&graph, r, &EncodeConfig::default()).is_err());
    }

    #[test]
    fn test_missing_type_name_falls_back() {
        let registry = TypeRegistry::new();
        let session = NamespaceSession::new();
        let config = EncodeConfig::default();
        let encoder = Encoder::new(&registry, &session, &config);

        let mut graph = ValueGraph::new();
        let s = graph.basetype(QualifiedName::local("s"), Basetype::string("x"));
        let element = encoder
            .encode(&graph, s, &NamespaceContext::new(), &QualifiedName::local("s"))
            .unwrap();
        assert_eq!(element.attribute("xsi:type"), Some("xsd:string"));

        let n = graph.basetype(
            QualifiedName::local("n"),
            Basetype {
                type_name: QualifiedName::xsd("int"),
                kind: NativeKind::Int,
                value: Some(Scalar::Int(1)),
            },
        );
        assert!(matches!(
            encoder
                .encode(&graph, n, &NamespaceContext::new(), &QualifiedName::local("n"))
                .unwrap_err(),
            SoapEncodingError::Encoding(_)
        ));
    }

    #[test]
    fn test_encoding_style_override() {
        let mut graph = ValueGraph::new();
        let s = graph.new_struct(QualifiedName::local("s"), None);
        graph[s].encoding_style = Some(EncodingStyle::AspDotNet.namespace().to_string());
        let m = graph.basetype(QualifiedName::local("m"), Basetype::int(1));
        graph.add_member(s, m).unwrap();

        let element = encode(&graph, s, &EncodeConfig::default()).unwrap();
        assert_eq!(
            element.attribute("env:encodingStyle"),
            Some("http://tempuri.org/ASP.NET")
        );
        assert!(element.children()[0].attribute("xsi:type").is_none());
    }

    #[test]
    fn test_empty_struct_marker() {
        let mut graph = ValueGraph::new();
        let s = graph.new_struct(QualifiedName::local("s"), None);
        let element = encode(&graph, s, &EncodeConfig::default()).unwrap();
        assert_eq!(element.attribute("xsi:type"), Some("enc:Struct"));

        let m = graph.basetype(QualifiedName::local("m"), Basetype::int(1));
        graph.add_member(s, m).unwrap();
        let element = encode(&graph, s, &EncodeConfig::default()).unwrap();
        assert!(element.attribute("xsi:type").is_none());
    }

    #[test]
    fn test_shared_node_under_style_override_keeps_id() {
        let mut graph = ValueGraph::new();
        let pair = graph.new_struct(QualifiedName::local("pair"), None);
        let asp = graph.new_struct(QualifiedName::local("asp"), None);
        graph[asp].encoding_style = Some(EncodingStyle::AspDotNet.namespace().to_string());
        let dynamic = graph.new_struct(QualifiedName::local("dyn"), None);
        let v = graph.basetype(QualifiedName::local("v"), Basetype::string("x"));
        graph.add_member(asp, v).unwrap();
        graph.add_member(dynamic, v).unwrap();
        graph.add_member(pair, asp).unwrap();
        graph.add_member(pair, dynamic).unwrap();

        let element = encode(&graph, pair, &EncodeConfig::default()).unwrap();
        let asp_v = &element.children()[0].children()[0];
        let dyn_v = &element.children()[1].children()[0];
        assert!(asp_v.attribute("id").is_none());
        assert_eq!(asp_v.text(), Some("x"));
        assert!(dyn_v.attribute("href").is_none());
        assert_eq!(dyn_v.attribute("id"), Some("id1"));
        assert_eq!(dyn_v.text(), Some("x"));
    }
}
