//! Configuration types for the SOAP encoding engine.

use crate::namespace::{ASP_DOT_NET_NS, ENCODING_NS};
use serde::{Deserialize, Serialize};

/// Main configuration for a [`SoapCodec`](crate::SoapCodec).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Config version
    pub version: String,

    /// Encoder settings
    pub encoding: EncodeConfig,

    /// Decoder settings
    pub decoding: DecodeConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            encoding: EncodeConfig::default(),
            decoding: DecodeConfig::default(),
        }
    }
}

/// Encoding styles understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncodingStyle {
    /// SOAP 1.1 section 5 encoding with xsi:type, multirefs and arrays
    #[default]
    Dynamic,
    /// Untyped elements only, repeated names form arrays
    AspDotNet,
}

impl EncodingStyle {
    /// URI announced in `SOAP-ENV:encodingStyle`.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Dynamic => ENCODING_NS,
            Self::AspDotNet => ASP_DOT_NET_NS,
        }
    }

    /// Style named by an encodingStyle URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            ENCODING_NS => Some(Self::Dynamic),
            ASP_DOT_NET_NS => Some(Self::AspDotNet),
            _ => None,
        }
    }

    /// First recognised style in a whitespace separated URI list.
    pub fn from_uri_list(list: &str) -> Option<Self> {
        list.split_whitespace().find_map(Self::from_uri)
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Style used when a node carries no override
    pub style: EncodingStyle,

    /// Emit xsi:type on basetypes and typed structs
    pub explicit_typing: bool,

    /// Emit shared and cyclic nodes once, then refer to them by href
    pub multiref: bool,

    /// Write the `<?xml ...?>` declaration
    pub xml_declaration: bool,

    /// Spaces per indentation level, compact output when unset
    pub indent: Option<usize>,

    /// Preferred namespace prefixes
    pub prefixes: PrefixConfig,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            style: EncodingStyle::Dynamic,
            explicit_typing: true,
            multiref: true,
            xml_declaration: true,
            indent: None,
            prefixes: PrefixConfig::default(),
        }
    }
}

/// Preferred prefixes for the well-known namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixConfig {
    /// SOAP envelope namespace
    pub envelope: String,

    /// SOAP encoding namespace
    pub encoding: String,

    /// XML Schema namespace
    pub xsd: String,

    /// XML Schema instance namespace
    pub xsi: String,
}

impl Default for PrefixConfig {
    fn default() -> Self {
        Self {
            envelope: "env".to_string(),
            encoding: "enc".to_string(),
            xsd: "xsd".to_string(),
            xsi: "xsi".to_string(),
        }
    }
}

/// Decoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Style assumed until an encodingStyle attribute says otherwise
    pub style: EncodingStyle,

    /// Maximum element nesting depth
    pub max_depth: usize,

    /// Maximum number of elements per envelope
    pub max_elements: usize,

    /// Maximum text length of a single element (bytes)
    pub max_text_length: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            style: EncodingStyle::Dynamic,
            max_depth: 64,
            max_elements: 100_000,
            max_text_length: 1_048_576, // 1MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CodecConfig::default();
        assert_eq!(config.encoding.style, EncodingStyle::Dynamic);
        assert!(config.encoding.explicit_typing);
        assert!(config.encoding.multiref);
        assert_eq!(config.encoding.prefixes.envelope, "env");
        assert_eq!(config.decoding.max_depth, 64);
    }

    #[test]
    fn test_config_serialization() {
        let config = CodecConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: CodecConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.decoding.max_elements, config.decoding.max_elements);
        assert_eq!(parsed.encoding.indent, None);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
encoding:
  style: aspdotnet
  multiref: false
  indent: 2
  prefixes:
    envelope: SOAP-ENV
decoding:
  max_depth: 16
"#;
        let config: CodecConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.encoding.style, EncodingStyle::AspDotNet);
        assert!(!config.encoding.multiref);
        assert!(config.encoding.explicit_typing);
        assert_eq!(config.encoding.indent, Some(2));
        assert_eq!(config.encoding.prefixes.envelope, "SOAP-ENV");
        assert_eq!(config.encoding.prefixes.xsd, "xsd");
        assert_eq!(config.decoding.max_depth, 16);
        assert_eq!(config.decoding.style, EncodingStyle::Dynamic);
    }

    #[test]
    fn test_encoding_style_uris() {
        assert_eq!(EncodingStyle::from_uri(ENCODING_NS), Some(EncodingStyle::Dynamic));
        assert_eq!(
            EncodingStyle::from_uri(EncodingStyle::AspDotNet.namespace()),
            Some(EncodingStyle::AspDotNet)
        );
        assert_eq!(EncodingStyle::from_uri("urn:custom"), None);
        assert_eq!(
            EncodingStyle::from_uri_list("urn:custom http://tempuri.org/ASP.NET"),
            Some(EncodingStyle::AspDotNet)
        );
    }
}
