//! Arena-backed value graph.
//!
//! Nodes live in a [`ValueGraph`] and refer to each other through [`NodeId`]
//! handles, so shared and cyclic structures need no reference counting and a
//! placeholder can be overwritten in place once its real shape is known.

use crate::error::{Result, SoapEncodingError};
use crate::namespace::QualifiedName;
use crate::types::{NativeKind, Scalar};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{BTreeMap, HashSet};
use std::ops::{Index, IndexMut};

/// Handle to a node in a [`ValueGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in its arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A named value with its multi-reference metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Element name the value was read from or will be written as
    pub name: QualifiedName,
    /// `id` attribute
    pub id: Option<String>,
    /// `SOAP-ENC:root` flag
    pub root: Option<bool>,
    /// `SOAP-ENV:encodingStyle` override for this subtree
    pub encoding_style: Option<String>,
    pub value: Value,
}

impl Node {
    pub fn new(name: QualifiedName, value: Value) -> Self {
        Self {
            name,
            id: None,
            root: None,
            encoding_style: None,
            value,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_root(mut self, root: bool) -> Self {
        self.root = Some(root);
        self
    }

    pub fn with_encoding_style(mut self, uri: impl Into<String>) -> Self {
        self.encoding_style = Some(uri.into());
        self
    }
}

/// A SOAP value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `xsi:nil="true"`
    Null,
    Basetype(Basetype),
    Struct(StructValue),
    Array(ArrayValue),
    /// Unresolved `href`. Only exists while decoding.
    Reference(Reference),
    /// Element whose shape is decided at its end tag. Only exists while
    /// decoding.
    Unknown {
        type_name: Option<QualifiedName>,
        explicit: bool,
    },
}

impl Value {
    /// Short variant name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Basetype(_) => "basetype",
            Self::Struct(_) => "struct",
            Self::Array(_) => "array",
            Self::Reference(_) => "reference",
            Self::Unknown { .. } => "unknown",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_basetype(&self) -> Option<&Basetype> {
        match self {
            Self::Basetype(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

/// A simple typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Basetype {
    /// Wire type name
    pub type_name: QualifiedName,
    pub kind: NativeKind,
    /// Parsed value, absent for an empty non-string element
    pub value: Option<Scalar>,
}

impl Basetype {
    /// Build from a scalar, named by its XSD kind.
    pub fn new(value: Scalar) -> Self {
        let kind = value.kind();
        Self {
            type_name: QualifiedName::xsd(kind.xsd_name()),
            kind,
            value: Some(value),
        }
    }

    /// Empty value of a kind.
    pub fn empty(kind: NativeKind) -> Self {
        Self {
            type_name: QualifiedName::xsd(kind.xsd_name()),
            kind,
            value: None,
        }
    }

    /// Parse a lexical form under an explicit type name.
    ///
    /// Empty text yields an empty value unless the kind is string.
    pub fn from_lexical(type_name: QualifiedName, kind: NativeKind, text: &str) -> Result<Self> {
        let value = if kind != NativeKind::String && text.trim().is_empty() {
            None
        } else {
            Some(kind.parse(text)?)
        };
        Ok(Self {
            type_name,
            kind,
            value,
        })
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Scalar::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(Scalar::Boolean(value))
    }

    pub fn int(value: i32) -> Self {
        Self::new(Scalar::Int(value))
    }

    pub fn long(value: i64) -> Self {
        Self::new(Scalar::Long(value))
    }

    pub fn double(value: f64) -> Self {
        Self::new(Scalar::Double(value))
    }

    pub fn date(value: NaiveDate) -> Self {
        Self::new(Scalar::Date(value))
    }

    pub fn time(value: NaiveTime) -> Self {
        Self::new(Scalar::Time(value))
    }

    pub fn date_time(value: NaiveDateTime) -> Self {
        Self::new(Scalar::DateTime {
            value,
            offset: None,
        })
    }

    pub fn base64(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Scalar::Base64Binary(bytes.into()))
    }

    /// Lexical rendering, empty when there is no value.
    pub fn lexical(&self) -> String {
        self.value.as_ref().map(Scalar::to_lexical).unwrap_or_default()
    }

    /// The value as a string slice, for string kinds.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Some(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }
}

/// Struct member slot, also used for envelope header and body entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: QualifiedName,
    pub node: NodeId,
}

impl Member {
    pub fn new(name: QualifiedName, node: NodeId) -> Self {
        Self { name, node }
    }
}

/// Ordered struct members, unique by local name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructValue {
    /// `xsi:type` of the struct, `None` when it arrived untyped
    pub type_name: Option<QualifiedName>,
    members: Vec<Member>,
}

impl StructValue {
    pub fn new(type_name: Option<QualifiedName>) -> Self {
        Self {
            type_name,
            members: Vec::new(),
        }
    }

    /// Member handle by local name.
    pub fn get(&self, local: &str) -> Option<NodeId> {
        self.members
            .iter()
            .find(|m| m.name.name == local)
            .map(|m| m.node)
    }

    /// Member slot by local name.
    pub fn member(&self, local: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name.name == local)
    }

    /// Insert a member. A member with the same local name is overwritten in
    /// place and its previous handle returned.
    pub fn insert(&mut self, name: QualifiedName, node: NodeId) -> Option<NodeId> {
        if let Some(slot) = self.members.iter_mut().find(|m| m.name.name == name.name) {
            let previous = slot.node;
            slot.name = name;
            slot.node = node;
            return Some(previous);
        }
        self.members.push(Member::new(name, node));
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn replace_handle(&mut self, old: NodeId, new: NodeId) -> bool {
        let mut replaced = false;
        for member in self.members.iter_mut().filter(|m| m.node == old) {
            member.node = new;
            replaced = true;
        }
        replaced
    }
}

/// Rank-1 SOAP array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    /// Element type, itself array notation for nested arrays
    pub element_type: QualifiedName,
    pub declared_length: Option<usize>,
    /// Index of the first transmitted element
    pub offset: usize,
    /// Whether elements were placed by explicit position
    pub sparse: bool,
    elements: BTreeMap<usize, NodeId>,
    next: usize,
}

impl ArrayValue {
    pub fn new(element_type: QualifiedName, declared_length: Option<usize>) -> Self {
        Self {
            element_type,
            declared_length,
            offset: 0,
            sparse: false,
            elements: BTreeMap::new(),
            next: 0,
        }
    }

    /// Start appending at `offset`.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self.next = self.next.max(offset);
        self
    }

    /// Append after the last placed element.
    pub fn push(&mut self, node: NodeId) -> Result<usize> {
        let index = self.next;
        self.check_bounds(index)?;
        self.elements.insert(index, node);
        self.next = index + 1;
        Ok(index)
    }

    /// Place an element at an explicit position; marks the array sparse.
    /// Following appends continue after it.
    pub fn set(&mut self, index: usize, node: NodeId) -> Result<()> {
        self.check_bounds(index)?;
        self.elements.insert(index, node);
        self.sparse = true;
        self.next = index + 1;
        Ok(())
    }

    fn check_bounds(&self, index: usize) -> Result<()> {
        match self.declared_length {
            Some(declared) if index >= declared => {
                Err(SoapEncodingError::ArrayBounds { index, declared })
            }
            _ => Ok(()),
        }
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.elements.get(&index).copied()
    }

    /// Logical length: the declared length, else one past the last occupied
    /// position.
    pub fn len(&self) -> usize {
        self.declared_length.unwrap_or_else(|| {
            self.elements
                .keys()
                .next_back()
                .map(|last| last + 1)
                .unwrap_or(self.offset)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of occupied positions.
    pub fn occupied(&self) -> usize {
        self.elements.len()
    }

    /// Occupied positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        self.elements.iter().map(|(i, n)| (*i, *n))
    }

    pub(crate) fn replace_handle(&mut self, old: NodeId, new: NodeId) -> bool {
        let mut replaced = false;
        for node in self.elements.values_mut().filter(|n| **n == old) {
            *node = new;
            replaced = true;
        }
        replaced
    }
}

/// Placeholder for an `href` pending resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Raw `href` value, normally `#id`
    pub target: String,
}

/// Arena of nodes.
#[derive(Debug, Clone, Default)]
pub struct ValueGraph {
    nodes: Vec<Node>,
}

impl ValueGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Value of a node; `Null` for a foreign handle.
    pub fn value(&self, id: NodeId) -> &Value {
        self.nodes.get(id.0).map(|n| &n.value).unwrap_or(&Value::Null)
    }

    pub fn null(&mut self, name: QualifiedName) -> NodeId {
        self.insert(Node::new(name, Value::Null))
    }

    pub fn basetype(&mut self, name: QualifiedName, value: Basetype) -> NodeId {
        self.insert(Node::new(name, Value::Basetype(value)))
    }

    pub fn new_struct(&mut self, name: QualifiedName, type_name: Option<QualifiedName>) -> NodeId {
        self.insert(Node::new(name, Value::Struct(StructValue::new(type_name))))
    }

    pub fn new_array(
        &mut self,
        name: QualifiedName,
        element_type: QualifiedName,
        declared_length: Option<usize>,
    ) -> NodeId {
        self.insert(Node::new(
            name,
            Value::Array(ArrayValue::new(element_type, declared_length)),
        ))
    }

    /// Add a member to a struct node; the member name is the child's name.
    pub fn add_member(&mut self, parent: NodeId, child: NodeId) -> Result<Option<NodeId>> {
        let name = self.node(child)?.name.clone();
        match &mut self.node_mut(parent)?.value {
            Value::Struct(s) => Ok(s.insert(name, child)),
            other => Err(SoapEncodingError::Encoding(format!(
                "Cannot add a member to a {}",
                other.kind_name()
            ))),
        }
    }

    /// Append to an array node.
    pub fn push_element(&mut self, parent: NodeId, child: NodeId) -> Result<usize> {
        match &mut self.node_mut(parent)?.value {
            Value::Array(a) => a.push(child),
            other => Err(SoapEncodingError::Encoding(format!(
                "Cannot append an element to a {}",
                other.kind_name()
            ))),
        }
    }

    /// Place an element at an explicit array position.
    pub fn set_element(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        match &mut self.node_mut(parent)?.value {
            Value::Array(a) => a.set(index, child),
            other => Err(SoapEncodingError::Encoding(format!(
                "Cannot place an element in a {}",
                other.kind_name()
            ))),
        }
    }

    /// Repoint every slot of `parent` holding `old` to `new`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> bool {
        match self.nodes.get_mut(parent.0).map(|n| &mut n.value) {
            Some(Value::Struct(s)) => s.replace_handle(old, new),
            Some(Value::Array(a)) => a.replace_handle(old, new),
            _ => false,
        }
    }

    /// Struct member handle by local name.
    pub fn member(&self, parent: NodeId, local: &str) -> Option<NodeId> {
        self.value(parent).as_struct().and_then(|s| s.get(local))
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| SoapEncodingError::Encoding(format!("Unknown node handle {}", id.0)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| SoapEncodingError::Encoding(format!("Unknown node handle {}", id.0)))
    }

    /// Structural equivalence of `a` in `self` and `b` in `other`.
    ///
    /// Element names of the two roots are not compared; member names are.
    /// Arrays compare by logical length, so an open array matches its
    /// decoded form with an explicit length.
    /// Pairs already under comparison count as equal, so cyclic graphs
    /// terminate.
    ///
    /// ASP.NET style carries no type markers, so an empty struct written in
    /// that style decodes as an empty string and no longer compares equal.
    pub fn equivalent(&self, a: NodeId, other: &ValueGraph, b: NodeId) -> bool {
        let mut visiting = HashSet::new();
        equivalent_nodes(self, a, other, b, &mut visiting)
    }
}

impl Index<NodeId> for ValueGraph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for ValueGraph {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}

fn equivalent_nodes(
    left: &ValueGraph,
    a: NodeId,
    right: &ValueGraph,
    b: NodeId,
    visiting: &mut HashSet<(NodeId, NodeId)>,
) -> bool {
    if !visiting.insert((a, b)) {
        return true;
    }
    match (left.value(a), right.value(b)) {
        (Value::Null, Value::Null) => true,
        (Value::Basetype(x), Value::Basetype(y)) => x.kind == y.kind && x.value == y.value,
        (Value::Struct(x), Value::Struct(y)) => {
            x.type_name == y.type_name
                && x.len() == y.len()
                && x.iter().zip(y.iter()).all(|(mx, my)| {
                    mx.name.name == my.name.name
                        && equivalent_nodes(left, mx.node, right, my.node, visiting)
                })
        }
        (Value::Array(x), Value::Array(y)) => {
            x.element_type == y.element_type
                && x.len() == y.len()
                && x.occupied() == y.occupied()
                && x.iter().zip(y.iter()).all(|((ix, nx), (iy, ny))| {
                    ix == iy && equivalent_nodes(left, nx, right, ny, visiting)
                })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(graph: &mut ValueGraph, name: &str) -> NodeId {
        let node = graph.new_struct(QualifiedName::local("person"), None);
        let child = graph.basetype(QualifiedName::local("name"), Basetype::string(name));
        graph.add_member(node, child).unwrap();
        node
    }

    #[test]
    fn test_struct_insert_overwrites_by_local_name() {
        let mut graph = ValueGraph::new();
        let s = graph.new_struct(QualifiedName::local("s"), None);
        let first = graph.basetype(QualifiedName::local("a"), Basetype::int(1));
        let second = graph.basetype(QualifiedName::new("urn:x", "a"), Basetype::int(2));
        assert_eq!(graph.add_member(s, first).unwrap(), None);
        assert_eq!(graph.add_member(s, second).unwrap(), Some(first));

        let members = graph[s].value.as_struct().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members.get("a"), Some(second));
    }

    #[test]
    fn test_array_push_and_bounds() {
        let mut graph = ValueGraph::new();
        let array = graph.new_array(QualifiedName::local("a"), QualifiedName::xsd("int"), Some(2));
        for i in 0..2 {
            let item = graph.basetype(QualifiedName::local("item"), Basetype::int(i));
            graph.push_element(array, item).unwrap();
        }
        let extra = graph.basetype(QualifiedName::local("item"), Basetype::int(2));
        let err = graph.push_element(array, extra).unwrap_err();
        assert!(matches!(err, SoapEncodingError::ArrayBounds { index: 2, declared: 2 }));
    }

    #[test]
    fn test_array_positioned_element() {
        let mut array = ArrayValue::new(QualifiedName::xsd("string"), Some(5));
        array.set(2, NodeId(7)).unwrap();
        array.push(NodeId(8)).unwrap();
        assert!(array.sparse);
        assert_eq!(array.get(0), None);
        assert_eq!(array.get(2), Some(NodeId(7)));
        assert_eq!(array.get(3), Some(NodeId(8)));
        assert_eq!(array.len(), 5);
        assert_eq!(array.occupied(), 2);
        assert!(array.set(5, NodeId(9)).is_err());
    }

    #[test]
    fn test_add_member_to_basetype_fails() {
        let mut graph = ValueGraph::new();
        let leaf = graph.basetype(QualifiedName::local("x"), Basetype::int(1));
        let child = graph.null(QualifiedName::local("y"));
        assert!(graph.add_member(leaf, child).is_err());
    }

    #[test]
    fn test_equivalent_across_graphs() {
        let mut left = ValueGraph::new();
        let mut right = ValueGraph::new();
        let a = person(&mut left, "Ann");
        let b = person(&mut right, "Ann");
        let c = person(&mut right, "Bob");
        assert!(left.equivalent(a, &right, b));
        assert!(!left.equivalent(a, &right, c));
    }

    #[test]
    fn test_equivalent_terminates_on_cycles() {
        let mut graph = ValueGraph::new();
        let a = graph.new_struct(QualifiedName::local("a"), None);
        let b = graph.new_struct(QualifiedName::local("b"), None);
        graph.add_member(a, b).unwrap();
        graph.add_member(b, a).unwrap();
        assert!(graph.equivalent(a, &graph, a));
    }

    #[test]
    fn test_replace_child() {
        let mut graph = ValueGraph::new();
        let s = graph.new_struct(QualifiedName::local("s"), None);
        let old = graph.null(QualifiedName::local("m"));
        let new = graph.basetype(QualifiedName::local("m"), Basetype::string("v"));
        graph.add_member(s, old).unwrap();
        assert!(graph.replace_child(s, old, new));
        assert_eq!(graph.member(s, "m"), Some(new));
        assert!(!graph.replace_child(new, old, s));
    }

    #[test]
    fn test_basetype_from_lexical() {
        let empty = Basetype::from_lexical(QualifiedName::xsd("int"), NativeKind::Int, "  ").unwrap();
        assert_eq!(empty.value, None);
        assert_eq!(empty.lexical(), "");

        let blank = Basetype::from_lexical(QualifiedName::xsd("string"), NativeKind::String, "")
            .unwrap();
        assert_eq!(blank.as_str(), Some(""));

        assert!(Basetype::from_lexical(QualifiedName::xsd("int"), NativeKind::Int, "x").is_err());
    }
}
