//! Native CQL type tags and the value codec used by the session layer.
//!
//! Cells arrive from the driver as raw native-protocol bytes. This module
//! decodes them into [`CqlValue`], lifts them into engine-level
//! [`ScalarValue`]s for partition domains, renders them as CQL literals for
//! partition ids, and converts engine filter values back into native values
//! for statement binding.

use std::fmt;
use std::net::IpAddr;

use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::common::ScalarValue;
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, SessionError};

/// Internal type tag for a native CQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CassandraType {
    Ascii,
    Bigint,
    Blob,
    Custom,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Inet,
    Int,
    Text,
    Timestamp,
    Uuid,
    Timeuuid,
    Varchar,
    Varint,
    List,
    Map,
    Set,
}

impl CassandraType {
    /// Maps a native type name (as reported by cluster metadata) to a tag.
    ///
    /// Names this binary does not know (user-defined types, tuples, newer
    /// scalar types) map to [`CassandraType::Custom`] and are carried as
    /// opaque bytes.
    pub fn from_native_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "ascii" => Self::Ascii,
            "bigint" => Self::Bigint,
            "blob" => Self::Blob,
            "boolean" => Self::Boolean,
            "counter" => Self::Counter,
            "decimal" => Self::Decimal,
            "double" => Self::Double,
            "float" => Self::Float,
            "inet" => Self::Inet,
            "int" => Self::Int,
            "text" => Self::Text,
            "timestamp" => Self::Timestamp,
            "uuid" => Self::Uuid,
            "timeuuid" => Self::Timeuuid,
            "varchar" => Self::Varchar,
            "varint" => Self::Varint,
            "list" => Self::List,
            "map" => Self::Map,
            "set" => Self::Set,
            _ => Self::Custom,
        }
    }

    /// Number of type arguments a parameterized tag takes (`0` for scalars).
    pub fn type_argument_size(self) -> usize {
        match self {
            Self::List | Self::Set => 1,
            Self::Map => 2,
            _ => 0,
        }
    }

    /// Arrow type the engine sees for a column of this tag.
    pub fn arrow_data_type(self) -> DataType {
        match self {
            Self::Ascii | Self::Text | Self::Varchar => DataType::Utf8,
            Self::Bigint | Self::Counter => DataType::Int64,
            Self::Int => DataType::Int32,
            Self::Boolean => DataType::Boolean,
            Self::Double => DataType::Float64,
            Self::Float => DataType::Float32,
            Self::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
            Self::Uuid | Self::Timeuuid | Self::Inet | Self::Decimal | Self::Varint => {
                DataType::Utf8
            }
            Self::Blob | Self::Custom | Self::List | Self::Map | Self::Set => DataType::Binary,
        }
    }

    /// Decodes raw native-protocol cell bytes for this tag.
    pub fn deserialize(self, raw: &[u8]) -> Result<CqlValue, ClusterError> {
        let value = match self {
            Self::Ascii => CqlValue::Ascii(decode_utf8(raw)?),
            Self::Text | Self::Varchar => CqlValue::Text(decode_utf8(raw)?),
            Self::Bigint => CqlValue::Bigint(i64::from_be_bytes(fixed(raw, "bigint")?)),
            Self::Counter => CqlValue::Counter(i64::from_be_bytes(fixed(raw, "counter")?)),
            Self::Timestamp => CqlValue::Timestamp(i64::from_be_bytes(fixed(raw, "timestamp")?)),
            Self::Int => CqlValue::Int(i32::from_be_bytes(fixed(raw, "int")?)),
            Self::Boolean => {
                let [byte] = fixed::<1>(raw, "boolean")?;
                CqlValue::Boolean(byte != 0)
            }
            Self::Double => CqlValue::Double(f64::from_be_bytes(fixed(raw, "double")?)),
            Self::Float => CqlValue::Float(f32::from_be_bytes(fixed(raw, "float")?)),
            Self::Uuid => CqlValue::Uuid(fixed(raw, "uuid")?),
            Self::Timeuuid => CqlValue::Timeuuid(fixed(raw, "timeuuid")?),
            Self::Inet => match raw.len() {
                4 => CqlValue::Inet(IpAddr::from(fixed::<4>(raw, "inet")?)),
                16 => CqlValue::Inet(IpAddr::from(fixed::<16>(raw, "inet")?)),
                len => {
                    return Err(ClusterError::Decode(format!(
                        "inet cell has invalid length {len}"
                    )))
                }
            },
            Self::Varint => {
                varint_to_i128(raw).ok_or_else(|| {
                    ClusterError::Decode(format!("varint cell of {} bytes out of range", raw.len()))
                })?;
                CqlValue::Varint(raw.to_vec())
            }
            Self::Decimal => {
                if raw.len() < 5 {
                    return Err(ClusterError::Decode(format!(
                        "decimal cell has invalid length {}",
                        raw.len()
                    )));
                }
                let scale = i32::from_be_bytes(fixed(&raw[..4], "decimal scale")?);
                let unscaled = raw[4..].to_vec();
                varint_to_i128(&unscaled).ok_or_else(|| {
                    ClusterError::Decode("decimal unscaled value out of range".to_string())
                })?;
                CqlValue::Decimal { scale, unscaled }
            }
            Self::Blob | Self::Custom | Self::List | Self::Map | Self::Set => {
                CqlValue::Blob(raw.to_vec())
            }
        };
        Ok(value)
    }

    /// Lifts a raw partition-key cell into the engine-level value used for
    /// partition domains.
    pub fn partition_key_value(self, raw: &[u8]) -> Result<ScalarValue, ClusterError> {
        let value = self.deserialize(raw)?;
        Ok(match value {
            CqlValue::Ascii(v) | CqlValue::Text(v) => ScalarValue::Utf8(Some(v)),
            CqlValue::Bigint(v) | CqlValue::Counter(v) => ScalarValue::Int64(Some(v)),
            CqlValue::Int(v) => ScalarValue::Int32(Some(v)),
            CqlValue::Boolean(v) => ScalarValue::Boolean(Some(v)),
            CqlValue::Double(v) => ScalarValue::Float64(Some(v)),
            CqlValue::Float(v) => ScalarValue::Float32(Some(v)),
            CqlValue::Timestamp(v) => ScalarValue::TimestampMillisecond(Some(v), None),
            CqlValue::Blob(v) => ScalarValue::Binary(Some(v)),
            other @ (CqlValue::Uuid(_)
            | CqlValue::Timeuuid(_)
            | CqlValue::Inet(_)
            | CqlValue::Varint(_)
            | CqlValue::Decimal { .. }) => ScalarValue::Utf8(Some(other.to_string())),
        })
    }

    /// Renders a raw cell as a CQL literal for diagnostics and partition ids.
    pub fn cql_literal(self, raw: &[u8]) -> Result<String, ClusterError> {
        Ok(self.deserialize(raw)?.to_cql_literal())
    }

    /// Converts an engine filter value into the native value bound into a
    /// statement for a column of this tag.
    pub fn to_native_value(self, value: &ScalarValue) -> Result<CqlValue, SessionError> {
        let invalid = || {
            SessionError::InvalidFilterValue(format!("cannot bind {value:?} to {self} column"))
        };
        if value.is_null() {
            return Err(invalid());
        }
        let native = match self {
            Self::Ascii => CqlValue::Ascii(scalar_to_string(value).ok_or_else(invalid)?),
            Self::Text | Self::Varchar => {
                CqlValue::Text(scalar_to_string(value).ok_or_else(invalid)?)
            }
            Self::Bigint => CqlValue::Bigint(scalar_to_i64(value).ok_or_else(invalid)?),
            Self::Counter => CqlValue::Counter(scalar_to_i64(value).ok_or_else(invalid)?),
            Self::Int => CqlValue::Int(
                scalar_to_i64(value)
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(invalid)?,
            ),
            Self::Boolean => match value {
                ScalarValue::Boolean(Some(v)) => CqlValue::Boolean(*v),
                _ => return Err(invalid()),
            },
            Self::Double => CqlValue::Double(scalar_to_f64(value).ok_or_else(invalid)?),
            Self::Float => CqlValue::Float(scalar_to_f64(value).ok_or_else(invalid)? as f32),
            Self::Timestamp => {
                CqlValue::Timestamp(scalar_to_timestamp_ms(value).ok_or_else(invalid)?)
            }
            Self::Uuid => CqlValue::Uuid(scalar_to_uuid(value).ok_or_else(invalid)?),
            Self::Timeuuid => CqlValue::Timeuuid(scalar_to_uuid(value).ok_or_else(invalid)?),
            Self::Inet => CqlValue::Inet(
                scalar_to_string(value)
                    .and_then(|s| s.parse::<IpAddr>().ok())
                    .ok_or_else(invalid)?,
            ),
            Self::Varint => {
                let v = match value {
                    ScalarValue::Utf8(Some(s)) | ScalarValue::LargeUtf8(Some(s)) => {
                        s.trim().parse::<i128>().ok()
                    }
                    other => scalar_to_i64(other).map(i128::from),
                }
                .ok_or_else(invalid)?;
                CqlValue::Varint(varint_from_i128(v))
            }
            Self::Decimal => {
                let text = match value {
                    ScalarValue::Utf8(Some(s)) | ScalarValue::LargeUtf8(Some(s)) => s.clone(),
                    other => scalar_to_i64(other).ok_or_else(invalid)?.to_string(),
                };
                let (scale, unscaled) = parse_decimal(&text).ok_or_else(invalid)?;
                CqlValue::Decimal {
                    scale,
                    unscaled: varint_from_i128(unscaled),
                }
            }
            Self::Blob | Self::Custom | Self::List | Self::Map | Self::Set => match value {
                ScalarValue::Binary(Some(v))
                | ScalarValue::LargeBinary(Some(v))
                | ScalarValue::FixedSizeBinary(_, Some(v)) => CqlValue::Blob(v.clone()),
                _ => return Err(invalid()),
            },
        };
        Ok(native)
    }
}

impl fmt::Display for CassandraType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ascii => "ascii",
            Self::Bigint => "bigint",
            Self::Blob => "blob",
            Self::Custom => "custom",
            Self::Boolean => "boolean",
            Self::Counter => "counter",
            Self::Decimal => "decimal",
            Self::Double => "double",
            Self::Float => "float",
            Self::Inet => "inet",
            Self::Int => "int",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::Timeuuid => "timeuuid",
            Self::Varchar => "varchar",
            Self::Varint => "varint",
            Self::List => "list",
            Self::Map => "map",
            Self::Set => "set",
        };
        f.write_str(name)
    }
}

/// Native value as bound into statements or decoded from cells.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Ascii(String),
    Text(String),
    Bigint(i64),
    Counter(i64),
    Int(i32),
    Boolean(bool),
    Double(f64),
    Float(f32),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
    Timeuuid([u8; 16]),
    Inet(IpAddr),
    /// Big-endian two's complement, minimal length.
    Varint(Vec<u8>),
    Decimal { scale: i32, unscaled: Vec<u8> },
    Blob(Vec<u8>),
}

impl CqlValue {
    /// Encodes the value in native-protocol cell form.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Self::Ascii(v) | Self::Text(v) => v.as_bytes().to_vec(),
            Self::Bigint(v) | Self::Counter(v) | Self::Timestamp(v) => v.to_be_bytes().to_vec(),
            Self::Int(v) => v.to_be_bytes().to_vec(),
            Self::Boolean(v) => vec![u8::from(*v)],
            Self::Double(v) => v.to_be_bytes().to_vec(),
            Self::Float(v) => v.to_be_bytes().to_vec(),
            Self::Uuid(v) | Self::Timeuuid(v) => v.to_vec(),
            Self::Inet(IpAddr::V4(v)) => v.octets().to_vec(),
            Self::Inet(IpAddr::V6(v)) => v.octets().to_vec(),
            Self::Varint(v) | Self::Blob(v) => v.clone(),
            Self::Decimal { scale, unscaled } => {
                let mut out = Vec::with_capacity(4 + unscaled.len());
                out.extend_from_slice(&scale.to_be_bytes());
                out.extend_from_slice(unscaled);
                out
            }
        }
    }

    /// Renders the value as a CQL literal.
    pub fn to_cql_literal(&self) -> String {
        match self {
            Self::Ascii(v) | Self::Text(v) => quote_string_literal(v),
            Self::Inet(v) => quote_string_literal(&v.to_string()),
            Self::Blob(v) => format!("0x{}", hex::encode(v)),
            Self::Double(v) => float_literal(*v),
            Self::Float(v) => float_literal(f64::from(*v)),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascii(v) | Self::Text(v) => f.write_str(v),
            Self::Bigint(v) | Self::Counter(v) | Self::Timestamp(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Uuid(v) | Self::Timeuuid(v) => f.write_str(&format_uuid(v)),
            Self::Inet(v) => write!(f, "{v}"),
            Self::Varint(v) => match varint_to_i128(v) {
                Some(n) => write!(f, "{n}"),
                None => write!(f, "0x{}", hex::encode(v)),
            },
            Self::Decimal { scale, unscaled } => match varint_to_i128(unscaled) {
                Some(n) => f.write_str(&format_decimal(n, *scale)),
                None => write!(f, "0x{}", hex::encode(unscaled)),
            },
            Self::Blob(v) => write!(f, "0x{}", hex::encode(v)),
        }
    }
}

/// Quotes a string literal, doubling embedded single quotes.
pub fn quote_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn float_literal(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let literal = if value > 0.0 { "Infinity" } else { "-Infinity" };
        literal.to_string()
    } else {
        value.to_string()
    }
}

fn decode_utf8(raw: &[u8]) -> Result<String, ClusterError> {
    String::from_utf8(raw.to_vec())
        .map_err(|err| ClusterError::Decode(format!("text cell is not valid utf-8: {err}")))
}

fn fixed<const N: usize>(raw: &[u8], what: &str) -> Result<[u8; N], ClusterError> {
    raw.try_into().map_err(|_| {
        ClusterError::Decode(format!(
            "{what} cell has invalid length {} (expected {N})",
            raw.len()
        ))
    })
}

/// Encodes an integer as a minimal big-endian two's complement varint.
pub fn varint_from_i128(value: i128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start + 1 < bytes.len() {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Decodes a big-endian two's complement varint; `None` when empty or wider
/// than 128 bits.
pub fn varint_to_i128(raw: &[u8]) -> Option<i128> {
    if raw.is_empty() || raw.len() > 16 {
        return None;
    }
    let fill = if raw[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - raw.len()..].copy_from_slice(raw);
    Some(i128::from_be_bytes(buf))
}

/// Plain notation while the adjusted exponent stays in `[-6, digits)`,
/// scientific (`1.5E+3`) otherwise, so the output never grows with the scale.
fn format_decimal(unscaled: i128, scale: i32) -> String {
    let digits = unscaled.unsigned_abs().to_string();
    let sign = if unscaled < 0 { "-" } else { "" };
    let adjusted = digits.len() as i64 - 1 - i64::from(scale);
    if scale == 0 {
        return format!("{sign}{digits}");
    }
    if scale > 0 && adjusted >= -6 {
        let scale = scale as usize;
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        return format!("{sign}{int_part}.{frac_part}");
    }
    let (lead, rest) = digits.split_at(1);
    if rest.is_empty() {
        format!("{sign}{lead}E{adjusted:+}")
    } else {
        format!("{sign}{lead}.{rest}E{adjusted:+}")
    }
}

fn parse_decimal(text: &str) -> Option<(i32, i128)> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (body, exponent) = match body.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().ok()?),
        None => (body, 0),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = format!("{int_part}{frac_part}");
    let magnitude = digits.parse::<i128>().ok()?;
    let scale = i32::try_from(frac_part.len()).ok()?.checked_sub(exponent)?;
    Some((scale, if negative { -magnitude } else { magnitude }))
}

fn format_uuid(bytes: &[u8; 16]) -> String {
    let hex = hex::encode(bytes);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn parse_uuid(text: &str) -> Option<[u8; 16]> {
    let compact = text.trim().replace('-', "");
    if compact.len() != 32 {
        return None;
    }
    hex::decode(compact).ok()?.try_into().ok()
}

fn scalar_to_string(value: &ScalarValue) -> Option<String> {
    match value {
        ScalarValue::Utf8(Some(v))
        | ScalarValue::LargeUtf8(Some(v))
        | ScalarValue::Utf8View(Some(v)) => Some(v.clone()),
        _ => None,
    }
}

fn scalar_to_i64(value: &ScalarValue) -> Option<i64> {
    match value {
        ScalarValue::Int8(Some(v)) => Some(i64::from(*v)),
        ScalarValue::Int16(Some(v)) => Some(i64::from(*v)),
        ScalarValue::Int32(Some(v)) => Some(i64::from(*v)),
        ScalarValue::Int64(Some(v)) => Some(*v),
        ScalarValue::UInt8(Some(v)) => Some(i64::from(*v)),
        ScalarValue::UInt16(Some(v)) => Some(i64::from(*v)),
        ScalarValue::UInt32(Some(v)) => Some(i64::from(*v)),
        ScalarValue::UInt64(Some(v)) => i64::try_from(*v).ok(),
        _ => None,
    }
}

fn scalar_to_f64(value: &ScalarValue) -> Option<f64> {
    match value {
        ScalarValue::Float64(Some(v)) => Some(*v),
        ScalarValue::Float32(Some(v)) => Some(f64::from(*v)),
        other => scalar_to_i64(other).map(|v| v as f64),
    }
}

fn scalar_to_timestamp_ms(value: &ScalarValue) -> Option<i64> {
    match value {
        ScalarValue::TimestampMillisecond(Some(v), _) => Some(*v),
        ScalarValue::TimestampSecond(Some(v), _) => Some(v.saturating_mul(1_000)),
        ScalarValue::TimestampMicrosecond(Some(v), _) => Some(v.div_euclid(1_000)),
        ScalarValue::TimestampNanosecond(Some(v), _) => Some(v.div_euclid(1_000_000)),
        ScalarValue::Int64(Some(v)) => Some(*v),
        _ => None,
    }
}

fn scalar_to_uuid(value: &ScalarValue) -> Option<[u8; 16]> {
    match value {
        ScalarValue::Binary(Some(v)) | ScalarValue::FixedSizeBinary(16, Some(v)) => {
            v.as_slice().try_into().ok()
        }
        other => scalar_to_string(other).and_then(|s| parse_uuid(&s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_names_map_case_insensitively() {
        assert_eq!(CassandraType::from_native_name("TEXT"), CassandraType::Text);
        assert_eq!(CassandraType::from_native_name("map"), CassandraType::Map);
        assert_eq!(
            CassandraType::from_native_name("frozen_udt"),
            CassandraType::Custom
        );
        assert_eq!(CassandraType::Map.type_argument_size(), 2);
        assert_eq!(CassandraType::Set.type_argument_size(), 1);
        assert_eq!(CassandraType::Int.type_argument_size(), 0);
    }

    #[test]
    fn text_literal_escapes_quotes() {
        let literal = CassandraType::Text.cql_literal(b"o'brien").expect("literal");
        assert_eq!(literal, "'o''brien'");
    }

    #[test]
    fn uuid_cells_render_hyphenated() {
        let raw = hex::decode("123e4567e89b12d3a456426614174000").expect("hex");
        let literal = CassandraType::Uuid.cql_literal(&raw).expect("literal");
        assert_eq!(literal, "123e4567-e89b-12d3-a456-426614174000");
        let value = CassandraType::Uuid
            .to_native_value(&ScalarValue::Utf8(Some(literal)))
            .expect("bind uuid");
        assert_eq!(value.serialize(), raw);
    }

    #[test]
    fn varint_encoding_is_minimal() {
        assert_eq!(varint_from_i128(0), vec![0x00]);
        assert_eq!(varint_from_i128(127), vec![0x7F]);
        assert_eq!(varint_from_i128(128), vec![0x00, 0x80]);
        assert_eq!(varint_from_i128(-1), vec![0xFF]);
        assert_eq!(varint_from_i128(-129), vec![0xFF, 0x7F]);
        assert_eq!(varint_to_i128(&[0xFF, 0x7F]), Some(-129));
    }

    #[test]
    fn decimal_renders_with_scale() {
        let value = CassandraType::Decimal
            .to_native_value(&ScalarValue::Utf8(Some("-12.050".to_string())))
            .expect("bind decimal");
        assert_eq!(value.to_cql_literal(), "-12.050");
        let value = CassandraType::Decimal
            .to_native_value(&ScalarValue::Utf8(Some("0.5".to_string())))
            .expect("bind decimal");
        assert_eq!(value.to_cql_literal(), "0.5");
    }

    #[test]
    fn decimal_with_extreme_scale_renders_in_scientific_notation() {
        let decode = |scale: i32, unscaled: &[u8]| {
            let mut raw = scale.to_be_bytes().to_vec();
            raw.extend_from_slice(unscaled);
            CassandraType::Decimal
                .deserialize(&raw)
                .expect("decode decimal")
                .to_string()
        };
        assert_eq!(decode(i32::MAX, &[0x01]), "1E-2147483647");
        assert_eq!(decode(i32::MIN, &[0x01]), "1E+2147483648");
        assert_eq!(decode(100_000_000, &[0xFF, 0x85]), "-1.23E-99999998");
        assert_eq!(decode(-2, &[0x0C]), "1.2E+3");
        assert_eq!(decode(7, &[0x01]), "1E-7");
        assert_eq!(decode(6, &[0x01]), "0.000001");
    }

    #[test]
    fn decimal_filter_accepts_exponent_form() {
        let value = CassandraType::Decimal
            .to_native_value(&ScalarValue::Utf8(Some("1.2E+3".to_string())))
            .expect("bind decimal");
        assert_eq!(value.to_cql_literal(), "1.2E+3");
        assert!(CassandraType::Decimal
            .to_native_value(&ScalarValue::Utf8(Some("1E+".to_string())))
            .is_err());
    }

    #[test]
    fn int_filter_rejects_out_of_range_values() {
        let err = CassandraType::Int
            .to_native_value(&ScalarValue::Int64(Some(i64::from(i32::MAX) + 1)))
            .expect_err("overflow");
        assert!(matches!(err, SessionError::InvalidFilterValue(_)));
        let ok = CassandraType::Int
            .to_native_value(&ScalarValue::Int64(Some(7)))
            .expect("in range");
        assert_eq!(ok, CqlValue::Int(7));
    }

    #[test]
    fn null_filter_values_are_rejected() {
        let err = CassandraType::Text
            .to_native_value(&ScalarValue::Utf8(None))
            .expect_err("null");
        assert!(matches!(err, SessionError::InvalidFilterValue(_)));
    }

    #[test]
    fn partition_key_values_use_engine_types() {
        let raw = 42i32.to_be_bytes();
        assert_eq!(
            CassandraType::Int.partition_key_value(&raw).expect("int"),
            ScalarValue::Int32(Some(42))
        );
        let raw = 1_700_000_000_000i64.to_be_bytes();
        assert_eq!(
            CassandraType::Timestamp.partition_key_value(&raw).expect("ts"),
            ScalarValue::TimestampMillisecond(Some(1_700_000_000_000), None)
        );
        assert!(CassandraType::Int.partition_key_value(&[0x01]).is_err());
    }
}
