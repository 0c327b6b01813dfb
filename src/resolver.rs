//! Multi-reference resolution.
//!
//! The decoder registers every `id` and queues every `href` placeholder here.
//! Once the envelope is complete, [`ReferenceResolver::resolve`] repoints each
//! placeholder's slot at its target, which may produce shared and cyclic
//! graphs.

use crate::envelope::Envelope;
use crate::error::{Result, SoapEncodingError};
use crate::value::{NodeId, Value};
use std::collections::HashMap;
use tracing::debug;

/// Where a node is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Envelope header entry
    Header,
    /// Envelope body entry
    Body,
    /// Struct member or array element of a node
    Node(NodeId),
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    node: NodeId,
    owner: Owner,
}

/// Id pool and pending href placeholders of one envelope.
#[derive(Debug, Default)]
pub struct ReferenceResolver {
    ids: HashMap<String, NodeId>,
    pending: Vec<Pending>,
}

impl ReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an `id`. Ids are unique per envelope.
    pub fn register_id(&mut self, id: &str, node: NodeId) -> Result<()> {
        if self.ids.contains_key(id) {
            return Err(SoapEncodingError::FormatDecode(format!(
                "Duplicate id '{}'",
                id
            )));
        }
        self.ids.insert(id.to_string(), node);
        Ok(())
    }

    /// Queue a reference placeholder attached at `owner`.
    pub fn enqueue(&mut self, node: NodeId, owner: Owner) {
        self.pending.push(Pending { node, owner });
    }

    /// Number of queued references.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Node registered under `id`.
    pub fn lookup(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Resolve every queued reference in `envelope`.
    pub fn resolve(mut self, envelope: &mut Envelope) -> Result<()> {
        let mut pending = std::mem::take(&mut self.pending);
        let mut pass = 0;

        while !pending.is_empty() {
            pass += 1;
            let before = pending.len();
            let mut deferred = Vec::new();

            for reference in pending {
                let href = match envelope.graph.value(reference.node) {
                    Value::Reference(r) => r.target.clone(),
                    _ => continue,
                };
                let target = href
                    .strip_prefix('#')
                    .and_then(|id| self.ids.get(id).copied())
                    .ok_or_else(|| SoapEncodingError::UnresolvedReference(href.clone()))?;

                if target == reference.node {
                    return Err(SoapEncodingError::UnresolvedReference(href));
                }
                if matches!(envelope.graph.value(target), Value::Reference(_)) {
                    deferred.push(reference);
                    continue;
                }

                self.redirect(envelope, reference, target);
            }

            debug!(
                pass = pass,
                resolved = before - deferred.len(),
                deferred = deferred.len(),
                "Reference resolution pass"
            );

            if deferred.len() == before {
                let href = deferred
                    .first()
                    .and_then(|r| match envelope.graph.value(r.node) {
                        Value::Reference(r) => Some(r.target.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                return Err(SoapEncodingError::UnresolvedReference(href));
            }
            pending = deferred;
        }
        Ok(())
    }

    fn redirect(&mut self, envelope: &mut Envelope, reference: Pending, target: NodeId) {
        match reference.owner {
            Owner::Header | Owner::Body => {
                envelope.replace_entry(reference.owner, reference.node, target);
            }
            Owner::Node(parent) => {
                envelope.graph.replace_child(parent, reference.node, target);
            }
        }
        for node in self.ids.values_mut() {
            if *node == reference.node {
                *node = target;
            }
        }
        if let Some(node) = envelope.graph.get_mut(reference.node) {
            node.value = Value::Null;
        }
    }
}
