//! SOAP 1.1 Encoding Engine for Zentinel
//!
//! Converts between in-memory value graphs and the SOAP 1.1 section 5 wire
//! encoding, including multi-reference (`id`/`href`) graphs, typed basetypes,
//! structs and sparse or offset arrays.
//!
//! # Features
//!
//! - Push decoder driven by tag/text events, with deferred classification of
//!   untyped elements
//! - Reference resolution producing shared and cyclic graphs
//! - Encoder with per-subtree namespace scoping and multiref output
//! - Dynamic and ASP.NET encoding styles
//! - Decode limits (depth, element count, text length)
//! - SOAP Fault rendering for codec errors
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap_encoding::{CodecConfig, SoapCodec};
//!
//! let codec = SoapCodec::new(CodecConfig::default());
//! let envelope = codec.decode(request_xml)?;
//! let reply = codec.encode(&envelope)?;
//! ```

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod namespace;
pub mod resolver;
pub mod types;
pub mod value;
pub mod xml;

pub use config::{CodecConfig, EncodingStyle};
pub use envelope::{Envelope, SoapCodec};
pub use error::{soap_fault_response, ErrorCode, Result, SoapEncodingError};
pub use namespace::{NamespaceContext, NamespaceSession, QualifiedName};
pub use types::{NativeKind, Scalar, TypeRegistry};
pub use value::{Basetype, NodeId, Value, ValueGraph};
