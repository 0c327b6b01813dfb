//! Error types for the SOAP encoding engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SoapEncodingError>;

/// SOAP encoding engine errors.
///
/// Every variant is terminal for the envelope being processed.
#[derive(Error, Debug)]
pub enum SoapEncodingError {
    #[error("Format decode error: {0}")]
    FormatDecode(String),

    #[error("Unknown namespace qualifier: {0}")]
    UnknownNamespacePrefix(String),

    #[error("Namespace {0} not defined yet")]
    UnresolvedNamespace(String),

    #[error("Type {0} is not supported")]
    UnsupportedType(String),

    #[error("Array index {index} out of bounds for declared length {declared}")]
    ArrayBounds { index: usize, declared: usize },

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Multi-dimensional arrays are not supported: {0}")]
    RankNotSupported(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Array rank {0} is not supported, rank must be 1")]
    ArrayRank(usize),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("XML error: {0}")]
    Xml(String),
}

impl SoapEncodingError {
    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::FormatDecode(_) => ErrorCode::FormatDecode,
            Self::UnknownNamespacePrefix(_) | Self::UnresolvedNamespace(_) => {
                ErrorCode::FormatDecode
            }
            Self::UnsupportedType(_) => ErrorCode::UnsupportedType,
            Self::ArrayBounds { .. } => ErrorCode::ArrayBounds,
            Self::UnresolvedReference(_) => ErrorCode::UnresolvedReference,
            Self::RankNotSupported(_) => ErrorCode::RankNotSupported,
            Self::Encoding(_) => ErrorCode::Encoding,
            Self::ArrayRank(_) => ErrorCode::ArrayRank,
            Self::LimitExceeded(_) => ErrorCode::LimitExceeded,
            Self::Xml(_) => ErrorCode::InvalidXml,
        }
    }

    /// Malformed namespace or qualified-name usage.
    pub fn is_format_error(&self) -> bool {
        self.code() == ErrorCode::FormatDecode
    }
}

/// Error codes reported in SOAP Fault details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed namespace, qualified name or attribute value
    FormatDecode,
    /// Explicit type not registered
    UnsupportedType,
    /// Declared array length exceeded
    ArrayBounds,
    /// href without matching id
    UnresolvedReference,
    /// Multi-dimensional array on the wire
    RankNotSupported,
    /// Value graph cannot be encoded
    Encoding,
    /// Multi-dimensional array requested for encoding
    ArrayRank,
    /// Depth, element or text limit exceeded
    LimitExceeded,
    /// Invalid XML syntax
    InvalidXml,
}

impl ErrorCode {
    /// Get the string code for this error.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormatDecode => "FORMAT_DECODE",
            Self::UnsupportedType => "UNSUPPORTED_TYPE",
            Self::ArrayBounds => "ARRAY_BOUNDS",
            Self::UnresolvedReference => "UNRESOLVED_REFERENCE",
            Self::RankNotSupported => "RANK_NOT_SUPPORTED",
            Self::Encoding => "ENCODING",
            Self::ArrayRank => "ARRAY_RANK",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::InvalidXml => "INVALID_XML",
        }
    }

    /// Whether the fault is attributable to the message sender.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, Self::Encoding | Self::ArrayRank)
    }
}

/// Generate a SOAP 1.1 Fault document for a codec error.
pub fn soap_fault_response(error: &SoapEncodingError) -> String {
    let code = error.code();
    let fault_code = if code.is_client_fault() {
        "SOAP-ENV:Client"
    } else {
        "SOAP-ENV:Server"
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <SOAP-ENV:Fault>
      <faultcode>{}</faultcode>
      <faultstring>{}</faultstring>
      <detail>
        <codec:error xmlns:codec="urn:zentinel:soap:encoding" code="{}"/>
      </detail>
    </SOAP-ENV:Fault>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
        fault_code,
        xml_escape(&error.to_string()),
        code.as_str()
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ArrayBounds.as_str(), "ARRAY_BOUNDS");
        assert_eq!(ErrorCode::UnresolvedReference.as_str(), "UNRESOLVED_REFERENCE");
    }

    #[test]
    fn test_namespace_errors_are_format_errors() {
        assert!(SoapEncodingError::UnknownNamespacePrefix("m".into()).is_format_error());
        assert!(SoapEncodingError::UnresolvedNamespace("urn:x".into()).is_format_error());
        assert!(!SoapEncodingError::UnsupportedType("xsd:foo".into()).is_format_error());
    }

    #[test]
    fn test_client_fault() {
        let error = SoapEncodingError::UnresolvedReference("#missing".into());
        let fault = soap_fault_response(&error);
        assert!(fault.contains("http://schemas.xmlsoap.org/soap/envelope/"));
        assert!(fault.contains("<faultcode>SOAP-ENV:Client</faultcode>"));
        assert!(fault.contains("UNRESOLVED_REFERENCE"));
    }

    #[test]
    fn test_server_fault_escapes_message() {
        let error = SoapEncodingError::Encoding("cannot encode <Reference>".into());
        let fault = soap_fault_response(&error);
        assert!(fault.contains("<faultcode>SOAP-ENV:Server</faultcode>"));
        assert!(fault.contains("&lt;Reference&gt;"));
    }
}
