//! Namespace bookkeeping and qualified names.
//!
//! A [`NamespaceContext`] is the URI/prefix mapping visible at one point of the
//! document tree. Every descent into a child element works on a clone, so
//! siblings may declare prefixes independently without touching their
//! ancestors. Fresh prefixes are minted from a [`NamespaceSession`].

use crate::error::{Result, SoapEncodingError};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// SOAP 1.1 envelope namespace.
pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// SOAP 1.1 encoding namespace.
pub const ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
/// XML Schema namespace.
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
/// XML Schema instance namespace.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// Pseudo encoding style used by ASP.NET services.
pub const ASP_DOT_NET_NS: &str = "http://tempuri.org/ASP.NET";
/// The namespace permanently bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A namespace-qualified name. Equality ignores prefix spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QualifiedName {
    /// Namespace URI
    pub namespace: Option<String>,
    /// Local part
    pub name: String,
}

impl QualifiedName {
    /// Create a name in a namespace.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Create a name without namespace.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    pub fn xsd(name: impl Into<String>) -> Self {
        Self::new(XSD_NS, name)
    }

    pub fn encoding(name: impl Into<String>) -> Self {
        Self::new(ENCODING_NS, name)
    }

    /// Check namespace and local name at once.
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.name == name
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Prefix naming state shared by all contexts of one session.
///
/// The counter is atomic so a session may be shared deliberately; a codec owns
/// its own session by default.
#[derive(Debug, Default)]
pub struct NamespaceSession {
    counter: AtomicU32,
}

impl NamespaceSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next `nN` prefix.
    pub fn next_prefix(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("n{}", n)
    }

    /// Restart numbering at `n1`.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

/// URI/prefix mapping visible at one element.
#[derive(Debug, Clone, Default)]
pub struct NamespaceContext {
    /// URI -> prefix used when qualifying names
    by_uri: HashMap<String, String>,
    /// prefix -> URI used when parsing names
    by_prefix: HashMap<String, String>,
    default_namespace: Option<String>,
}

impl NamespaceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current default namespace.
    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Prefix assigned to `uri`, if any.
    pub fn prefix_of(&self, uri: &str) -> Option<&str> {
        self.by_uri.get(uri).map(String::as_str)
    }

    /// Whether `uri` can be named in this context without a new declaration.
    pub fn is_declared(&self, uri: &str) -> bool {
        self.default_namespace.as_deref() == Some(uri) || self.by_uri.contains_key(uri)
    }

    /// Assign a prefix to `uri` and return it.
    ///
    /// An already assigned URI keeps its prefix. A preferred prefix of `""`
    /// makes `uri` the default namespace. A preferred prefix that is already
    /// bound to another URI is replaced by a fresh one from the session.
    pub fn assign(
        &mut self,
        session: &NamespaceSession,
        uri: &str,
        preferred: Option<&str>,
    ) -> String {
        if let Some(prefix) = self.by_uri.get(uri) {
            return prefix.clone();
        }
        if self.default_namespace.as_deref() == Some(uri) && preferred.map_or(true, str::is_empty) {
            return String::new();
        }
        if preferred == Some("") {
            self.default_namespace = Some(uri.to_string());
            return String::new();
        }

        let prefix = match preferred {
            Some(p) if !self.by_prefix.contains_key(p) => p.to_string(),
            _ => self.mint(session),
        };
        self.by_uri.insert(uri.to_string(), prefix.clone());
        self.by_prefix.insert(prefix.clone(), uri.to_string());
        prefix
    }

    fn mint(&self, session: &NamespaceSession) -> String {
        loop {
            let candidate = session.next_prefix();
            if !self.by_prefix.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Record an `xmlns:prefix="uri"` declaration read from the wire.
    ///
    /// Unlike [`assign`](Self::assign) this follows XML scoping: a prefix
    /// redeclared on a descendant rebinds for that subtree.
    pub fn declare(&mut self, uri: &str, prefix: &str) {
        if let Some(previous) = self.by_prefix.insert(prefix.to_string(), uri.to_string()) {
            if self.by_uri.get(&previous).map(String::as_str) == Some(prefix) {
                self.by_uri.remove(&previous);
            }
        }
        self.by_uri.insert(uri.to_string(), prefix.to_string());
    }

    /// Record an `xmlns="uri"` declaration. `None` undeclares the default.
    pub fn declare_default(&mut self, uri: Option<&str>) {
        self.default_namespace = uri.filter(|u| !u.is_empty()).map(str::to_string);
    }

    /// Format `{uri}local` as a qualified string.
    pub fn qualify(&self, uri: Option<&str>, local: &str) -> Result<String> {
        let Some(uri) = uri else {
            return Ok(local.to_string());
        };
        if self.default_namespace.as_deref() == Some(uri) {
            return Ok(local.to_string());
        }
        if uri == XML_NS {
            return Ok(format!("xml:{}", local));
        }
        match self.by_uri.get(uri) {
            Some(prefix) => Ok(format!("{}:{}", prefix, local)),
            None => Err(SoapEncodingError::UnresolvedNamespace(uri.to_string())),
        }
    }

    /// Format a [`QualifiedName`].
    pub fn qualify_name(&self, name: &QualifiedName) -> Result<String> {
        self.qualify(name.namespace.as_deref(), &name.name)
    }

    /// Parse `prefix:local` or `local` against this context.
    pub fn parse(&self, qualified: &str) -> Result<QualifiedName> {
        match qualified.split_once(':') {
            None => {
                if qualified.is_empty() {
                    return Err(SoapEncodingError::FormatDecode(
                        "Illegal element format: empty name".to_string(),
                    ));
                }
                Ok(QualifiedName {
                    namespace: self.default_namespace.clone(),
                    name: qualified.to_string(),
                })
            }
            Some((prefix, local)) => {
                if prefix.is_empty() || local.is_empty() {
                    return Err(SoapEncodingError::FormatDecode(format!(
                        "Illegal element format: {}",
                        qualified
                    )));
                }
                let uri = self.resolve_prefix(prefix).ok_or_else(|| {
                    SoapEncodingError::UnknownNamespacePrefix(prefix.to_string())
                })?;
                Ok(QualifiedName::new(uri, local))
            }
        }
    }

    fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.by_prefix.get(prefix).map(String::as_str)
    }

    /// Whether `candidate` names `{uri}local` here, whatever prefix it uses.
    pub fn compare(&self, uri: &str, local: &str, candidate: &str) -> bool {
        match candidate.split_once(':') {
            Some((prefix, name)) => {
                name == local && self.resolve_prefix(prefix) == Some(uri)
            }
            None => candidate == local && self.default_namespace.as_deref() == Some(uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_twice_returns_same_prefix() {
        let session = NamespaceSession::new();
        let mut ns = NamespaceContext::new();
        let first = ns.assign(&session, "urn:a", None);
        let second = ns.assign(&session, "urn:a", None);
        assert_eq!(first, "n1");
        assert_eq!(first, second);
    }

    #[test]
    fn test_assign_preferred_and_collision() {
        let session = NamespaceSession::new();
        let mut ns = NamespaceContext::new();
        assert_eq!(ns.assign(&session, XSD_NS, Some("xsd")), "xsd");
        assert_eq!(ns.assign(&session, "urn:other", Some("xsd")), "n1");
        assert_eq!(ns.prefix_of("urn:other"), Some("n1"));
    }

    #[test]
    fn test_assign_default_namespace() {
        let session = NamespaceSession::new();
        let mut ns = NamespaceContext::new();
        assert_eq!(ns.assign(&session, "urn:d", Some("")), "");
        assert_eq!(ns.default_namespace(), Some("urn:d"));
        assert_eq!(ns.qualify(Some("urn:d"), "x").unwrap(), "x");
        assert_eq!(ns.assign(&session, "urn:d", None), "");
    }

    #[test]
    fn test_minting_skips_declared_prefixes() {
        let session = NamespaceSession::new();
        let mut ns = NamespaceContext::new();
        ns.declare("urn:wire", "n1");
        assert_eq!(ns.assign(&session, "urn:fresh", None), "n2");
    }

    #[test]
    fn test_qualify_unresolved() {
        let ns = NamespaceContext::new();
        let err = ns.qualify(Some("urn:nowhere"), "x").unwrap_err();
        assert!(matches!(err, SoapEncodingError::UnresolvedNamespace(_)));
        assert_eq!(ns.qualify(None, "plain").unwrap(), "plain");
    }

    #[test]
    fn test_parse() {
        let mut ns = NamespaceContext::new();
        ns.declare("urn:m", "m");
        ns.declare_default(Some("urn:default"));

        assert_eq!(ns.parse("m:Item").unwrap(), QualifiedName::new("urn:m", "Item"));
        assert_eq!(ns.parse("Item").unwrap(), QualifiedName::new("urn:default", "Item"));
        assert_eq!(ns.parse("xml:lang").unwrap(), QualifiedName::new(XML_NS, "lang"));

        let err = ns.parse("q:Item").unwrap_err();
        assert!(matches!(err, SoapEncodingError::UnknownNamespacePrefix(ref p) if p == "q"));
        assert!(ns.parse(":Item").unwrap_err().is_format_error());
        assert!(ns.parse("").unwrap_err().is_format_error());
    }

    #[test]
    fn test_compare_ignores_prefix_spelling() {
        let mut ns = NamespaceContext::new();
        ns.declare(XSI_NS, "xsi");
        ns.declare(XSI_NS, "i");
        assert!(ns.compare(XSI_NS, "type", "xsi:type"));
        assert!(ns.compare(XSI_NS, "type", "i:type"));
        assert!(!ns.compare(XSI_NS, "type", "type"));
        assert!(!ns.compare(XSI_NS, "nil", "xsi:type"));
    }

    #[test]
    fn test_clone_is_independent() {
        let session = NamespaceSession::new();
        let mut parent = NamespaceContext::new();
        parent.assign(&session, "urn:p", Some("p"));

        let mut child = parent.clone();
        child.assign(&session, "urn:c", Some("c"));

        assert!(child.is_declared("urn:p"));
        assert!(child.is_declared("urn:c"));
        assert!(!parent.is_declared("urn:c"));
    }

    #[test]
    fn test_declare_rebinds_prefix() {
        let mut ns = NamespaceContext::new();
        ns.declare("urn:one", "m");
        let mut child = ns.clone();
        child.declare("urn:two", "m");
        assert_eq!(child.parse("m:x").unwrap(), QualifiedName::new("urn:two", "x"));
        assert_eq!(child.prefix_of("urn:one"), None);
        assert_eq!(ns.parse("m:x").unwrap(), QualifiedName::new("urn:one", "x"));
    }

    #[test]
    fn test_session_reset() {
        let session = NamespaceSession::new();
        assert_eq!(session.next_prefix(), "n1");
        assert_eq!(session.next_prefix(), "n2");
        session.reset();
        assert_eq!(session.next_prefix(), "n1");
    }
}
