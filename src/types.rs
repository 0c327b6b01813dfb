//! Type registry: XSD/SOAP-ENC type names, native kinds and lexical codecs.

use crate::error::{Result, SoapEncodingError};
use crate::namespace::{QualifiedName, ENCODING_NS, XSD_NS};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// `xsd:anyType`: carries no type information of its own.
pub const ANY_TYPE: &str = "anyType";

/// Native value kinds a basetype can decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeKind {
    Boolean,
    String,
    Byte,
    Short,
    Int,
    Long,
    Integer,
    Decimal,
    Float,
    Double,
    DateTime,
    Date,
    Time,
    HexBinary,
    Base64Binary,
}

impl NativeKind {
    pub const ALL: [NativeKind; 15] = [
        NativeKind::Boolean,
        NativeKind::String,
        NativeKind::Byte,
        NativeKind::Short,
        NativeKind::Int,
        NativeKind::Long,
        NativeKind::Integer,
        NativeKind::Decimal,
        NativeKind::Float,
        NativeKind::Double,
        NativeKind::DateTime,
        NativeKind::Date,
        NativeKind::Time,
        NativeKind::HexBinary,
        NativeKind::Base64Binary,
    ];

    /// XML Schema local name of the kind.
    pub fn xsd_name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::Double => "double",
            Self::DateTime => "dateTime",
            Self::Date => "date",
            Self::Time => "time",
            Self::HexBinary => "hexBinary",
            Self::Base64Binary => "base64Binary",
        }
    }

    /// Parse a lexical form into a scalar of this kind.
    ///
    /// Strings keep their text verbatim; every other kind ignores surrounding
    /// whitespace.
    pub fn parse(&self, text: &str) -> Result<Scalar> {
        if *self == Self::String {
            return Ok(Scalar::String(text.to_string()));
        }
        let text = text.trim();
        let invalid = || {
            SoapEncodingError::FormatDecode(format!(
                "Cannot parse '{}' as xsd:{}",
                text,
                self.xsd_name()
            ))
        };
        let scalar = match self {
            Self::String => Scalar::String(text.to_string()),
            Self::Boolean => match text {
                "true" | "1" => Scalar::Boolean(true),
                "false" | "0" => Scalar::Boolean(false),
                _ => return Err(invalid()),
            },
            Self::Byte => Scalar::Byte(text.parse().map_err(|_| invalid())?),
            Self::Short => Scalar::Short(text.parse().map_err(|_| invalid())?),
            Self::Int => Scalar::Int(text.parse().map_err(|_| invalid())?),
            Self::Long => Scalar::Long(text.parse().map_err(|_| invalid())?),
            Self::Integer => {
                if !is_integer_lexical(text) {
                    return Err(invalid());
                }
                Scalar::Integer(text.to_string())
            }
            Self::Decimal => {
                if !is_decimal_lexical(text) {
                    return Err(invalid());
                }
                Scalar::Decimal(text.to_string())
            }
            Self::Float => Scalar::Float(parse_float(text).ok_or_else(invalid)?),
            Self::Double => Scalar::Double(parse_float(text).ok_or_else(invalid)?),
            Self::DateTime => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                    Scalar::DateTime {
                        value: dt.naive_local(),
                        offset: Some(dt.offset().fix()),
                    }
                } else {
                    let value = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                        .map_err(|_| invalid())?;
                    Scalar::DateTime {
                        value,
                        offset: None,
                    }
                }
            }
            Self::Date => Scalar::Date(
                NaiveDate::parse_from_str(text.trim_end_matches('Z'), "%Y-%m-%d")
                    .map_err(|_| invalid())?,
            ),
            Self::Time => Scalar::Time(
                NaiveTime::parse_from_str(text.trim_end_matches('Z'), "%H:%M:%S%.f")
                    .map_err(|_| invalid())?,
            ),
            Self::HexBinary => Scalar::HexBinary(hex::decode(text).map_err(|_| invalid())?),
            Self::Base64Binary => {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                Scalar::Base64Binary(BASE64.decode(compact).map_err(|_| invalid())?)
            }
        };
        Ok(scalar)
    }
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.xsd_name())
    }
}

fn is_integer_lexical(text: &str) -> bool {
    let digits = text.strip_prefix(&['+', '-'][..]).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal_lexical(text: &str) -> bool {
    let unsigned = text.strip_prefix(&['+', '-'][..]).unwrap_or(text);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    (!int_part.is_empty() || !frac_part.is_empty())
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit())
}

fn parse_float<F: FromStr>(text: &str) -> Option<F> {
    let text = match text {
        "INF" => "inf",
        "-INF" => "-inf",
        "NaN" => "NaN",
        _ if text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => return None,
        other => other,
    };
    text.parse().ok()
}

/// A decoded simple value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Boolean(bool),
    String(String),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    /// Arbitrary precision, kept in validated lexical form
    Integer(String),
    /// Arbitrary precision, kept in validated lexical form
    Decimal(String),
    Float(f32),
    Double(f64),
    DateTime {
        value: NaiveDateTime,
        /// `None` when the wire form carried no timezone
        offset: Option<FixedOffset>,
    },
    Date(NaiveDate),
    Time(NaiveTime),
    HexBinary(Vec<u8>),
    Base64Binary(Vec<u8>),
}

impl Scalar {
    /// Kind this scalar belongs to.
    pub fn kind(&self) -> NativeKind {
        match self {
            Self::Boolean(_) => NativeKind::Boolean,
            Self::String(_) => NativeKind::String,
            Self::Byte(_) => NativeKind::Byte,
            Self::Short(_) => NativeKind::Short,
            Self::Int(_) => NativeKind::Int,
            Self::Long(_) => NativeKind::Long,
            Self::Integer(_) => NativeKind::Integer,
            Self::Decimal(_) => NativeKind::Decimal,
            Self::Float(_) => NativeKind::Float,
            Self::Double(_) => NativeKind::Double,
            Self::DateTime { .. } => NativeKind::DateTime,
            Self::Date(_) => NativeKind::Date,
            Self::Time(_) => NativeKind::Time,
            Self::HexBinary(_) => NativeKind::HexBinary,
            Self::Base64Binary(_) => NativeKind::Base64Binary,
        }
    }

    /// Canonical lexical rendering.
    pub fn to_lexical(&self) -> String {
        match self {
            Self::Boolean(b) => b.to_string(),
            Self::String(s) => s.clone(),
            Self::Byte(v) => v.to_string(),
            Self::Short(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Long(v) => v.to_string(),
            Self::Integer(s) | Self::Decimal(s) => s.clone(),
            Self::Float(v) => format_float(*v),
            Self::Double(v) => format_float(*v),
            Self::DateTime { value, offset } => {
                let mut out = value.format("%Y-%m-%dT%H:%M:%S%.f").to_string();
                if let Some(offset) = offset {
                    if offset.local_minus_utc() == 0 {
                        out.push('Z');
                    } else {
                        out.push_str(&offset.to_string());
                    }
                }
                out
            }
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            Self::HexBinary(bytes) => hex::encode_upper(bytes),
            Self::Base64Binary(bytes) => BASE64.encode(bytes),
        }
    }
}

/// Shortest form that reads back as the same value at its own width.
fn format_float<F: fmt::Display + Into<f64> + Copy>(v: F) -> String {
    let wide: f64 = v.into();
    if wide.is_nan() {
        "NaN".to_string()
    } else if wide == f64::INFINITY {
        "INF".to_string()
    } else if wide == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        v.to_string()
    }
}

/// Parsed `SOAP-ENC:arrayType` notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayType {
    /// Element type local name, possibly itself an array notation (`int[]`)
    pub element_type: String,
    /// Declared length, absent for `Type[]`
    pub declared_length: Option<usize>,
}

/// Outcome of classifying an element that arrived without type information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A `string` basetype holding the element text
    String,
    /// A struct
    Struct,
}

/// Mapping between XSD/SOAP-ENC type names and native kinds.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    by_name: HashMap<QualifiedName, NativeKind>,
    preferred: HashMap<NativeKind, QualifiedName>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        for kind in NativeKind::ALL {
            registry.register_basetype(kind.xsd_name(), kind);
        }
        registry.register(ENCODING_NS, "base64", NativeKind::Base64Binary);
        registry
    }
}

impl TypeRegistry {
    /// Create an empty registry. Use [`TypeRegistry::default`] for the
    /// standard XSD mappings.
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            preferred: HashMap::new(),
        }
    }

    /// Register an XSD type name. The first name registered for a kind becomes
    /// its encoding name.
    pub fn register_basetype(&mut self, xsd_name: &str, kind: NativeKind) {
        self.register(XSD_NS, xsd_name, kind);
    }

    /// Register a type name in any namespace.
    pub fn register(&mut self, namespace: &str, name: &str, kind: NativeKind) {
        let qname = QualifiedName::new(namespace, name);
        self.preferred.entry(kind).or_insert_with(|| qname.clone());
        self.by_name.insert(qname, kind);
    }

    /// Look up the kind named by an `xsi:type` value.
    ///
    /// SOAP-ENC re-exports the XSD simple types, so the encoding namespace
    /// falls back to the XSD table.
    pub fn lookup_by_type_attribute(&self, uri: &str, local: &str) -> Option<NativeKind> {
        if uri == XSD_NS {
            self.by_name.get(&QualifiedName::new(XSD_NS, local)).copied()
        } else if uri == ENCODING_NS {
            self.by_name
                .get(&QualifiedName::new(ENCODING_NS, local))
                .or_else(|| self.by_name.get(&QualifiedName::new(XSD_NS, local)))
                .copied()
        } else {
            None
        }
    }

    /// Wire name used when encoding a kind.
    pub fn type_name_of(&self, kind: NativeKind) -> Option<&QualifiedName> {
        self.preferred.get(&kind)
    }

    /// Whether `name` is registered as `kind`.
    pub fn names_kind(&self, name: &QualifiedName, kind: NativeKind) -> bool {
        name.namespace
            .as_deref()
            .and_then(|ns| self.lookup_by_type_attribute(ns, &name.name))
            == Some(kind)
    }

    /// Parse `Type[n]`, `Type[]` or nested `Type[][n]`.
    pub fn lookup_by_array_notation(&self, text: &str) -> Result<ArrayType> {
        parse_array_notation(text)
    }

    /// Classify an element decoded without a registered type.
    ///
    /// Child elements make a struct. Otherwise the text decides: an element
    /// without type information is always a string, even when empty or
    /// whitespace-only; one with a custom type is a struct unless it carries
    /// non-whitespace text.
    pub fn classify_ambiguous_element(
        &self,
        has_child_elements: bool,
        explicit_type: bool,
        text: &str,
    ) -> Classification {
        if has_child_elements {
            Classification::Struct
        } else if explicit_type && text.trim().is_empty() {
            Classification::Struct
        } else {
            Classification::String
        }
    }
}

/// Parse array notation without a registry.
pub fn parse_array_notation(text: &str) -> Result<ArrayType> {
    let illegal = || SoapEncodingError::FormatDecode(format!("Illegal arrayType: {}", text));
    let body = text.strip_suffix(']').ok_or_else(illegal)?;
    let open = body.rfind('[').ok_or_else(illegal)?;
    let element_type = &body[..open];
    let dims = &body[open + 1..];

    if element_type.is_empty() {
        return Err(illegal());
    }
    if dims.contains(',') || element_type.contains(',') {
        return Err(SoapEncodingError::RankNotSupported(text.to_string()));
    }
    let declared_length = if dims.trim().is_empty() {
        None
    } else {
        Some(dims.trim().parse::<usize>().map_err(|_| illegal())?)
    };

    Ok(ArrayType {
        element_type: element_type.to_string(),
        declared_length,
    })
}

/// Parse a `SOAP-ENC:offset` / `SOAP-ENC:position` value such as `[2]`.
pub fn parse_array_position(text: &str) -> Result<usize> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| SoapEncodingError::FormatDecode(format!("Illegal array position: {}", text)))?;
    if inner.contains(',') {
        return Err(SoapEncodingError::RankNotSupported(text.to_string()));
    }
    inner
        .trim()
        .parse()
        .map_err(|_| SoapEncodingError::FormatDecode(format!("Illegal array position: {}", text)))
}

/// Whether a type local name is itself array notation.
pub fn is_array_notation(name: &str) -> bool {
    name.ends_with(']')
}

/// Rank of the innermost dimension group of an element type, 1 when the
/// name carries no brackets.
pub fn notation_rank(name: &str) -> usize {
    name.split('[')
        .skip(1)
        .map(|group| group.matches(',').count() + 1)
        .max()
        .unwrap_or(1)
}

/// Element name for array items: bracket groups become a literal `Array`.
pub fn array_item_name(element_type: &str) -> String {
    let mut base = element_type;
    let mut suffix = String::new();
    while let Some(stripped) = base.strip_suffix(']') {
        match stripped.rfind('[') {
            Some(open) => {
                base = &stripped[..open];
                suffix.push_str("Array");
            }
            None => break,
        }
    }
    format!("{}{}", base, suffix)
}
