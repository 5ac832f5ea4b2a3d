//! Transform operations carried by a job.
//!
//! On the wire an operation is `{"type": "...", "params": {...}}`. Decoding
//! produces the typed [`Operation`] union once, at the submission boundary
//! and again when the worker reads an envelope, so nothing downstream ever
//! inspects a loosely-typed parameter map.
//!
//! Enumerated string fields (`format`, `position`) decode leniently: an
//! unrecognized value maps to its documented fallback instead of failing.
//! Integer compress fields accept any JSON number and truncate it toward
//! zero, so `80.0` and `80` mean the same thing.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Wire tag for the compress operation.
pub const OP_COMPRESS: &str = "compress";

/// Wire tag for the watermark operation.
pub const OP_WATERMARK: &str = "watermark";

/// Operation types accepted at submission.
pub const VALID_OPERATION_TYPES: &[&str] = &[OP_COMPRESS, OP_WATERMARK];

/// JPEG quality used when none (or an out-of-range one) is supplied.
pub const DEFAULT_QUALITY: u8 = 85;

/// Watermark text used when the `text` field is absent.
pub const DEFAULT_WATERMARK_TEXT: &str = "Watermark";

/// Watermark opacity used when the `opacity` field is absent.
pub const DEFAULT_OPACITY: f64 = 0.5;

/// Watermark font size (pixels) used when absent or not positive.
pub const DEFAULT_FONT_SIZE: f64 = 24.0;

/// Watermark color used when the `color` field is absent.
pub const DEFAULT_COLOR: &str = "#FFFFFF";

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

/// An encoder the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    /// Parse a format name. `jpg` is accepted as an alias of `jpeg`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Canonical format name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    /// File extension for output keys. `jpeg` maps to `jpg`.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// The `format` field of a compress operation, as requested.
///
/// An unrecognized name is kept verbatim so the encoder can apply the
/// documented fallback (JPEG at the default quality).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedFormat {
    Known(OutputFormat),
    Unrecognized(String),
}

impl From<String> for RequestedFormat {
    fn from(value: String) -> Self {
        match OutputFormat::parse(&value) {
            Some(format) => Self::Known(format),
            None => Self::Unrecognized(value),
        }
    }
}

impl Serialize for RequestedFormat {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(format) => serializer.serialize_str(format.as_str()),
            Self::Unrecognized(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for RequestedFormat {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

// ---------------------------------------------------------------------------
// Watermark position
// ---------------------------------------------------------------------------

/// One of the five fixed watermark layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Position {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
            Self::Center => "center",
        }
    }
}

impl From<String> for Position {
    /// Unrecognized positions fall back to `bottom-right`.
    fn from(value: String) -> Self {
        match value.as_str() {
            "top-left" => Self::TopLeft,
            "top-right" => Self::TopRight,
            "bottom-left" => Self::BottomLeft,
            "bottom-right" => Self::BottomRight,
            "center" => Self::Center,
            _ => Self::BottomRight,
        }
    }
}

impl From<Position> for String {
    fn from(value: Position) -> Self {
        value.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Parameters of a `compress` operation. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressParams {
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "truncated_i64"
    )]
    pub quality: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<RequestedFormat>,
    /// Negative widths decode to `0` (unconstrained).
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "truncated_dimension"
    )]
    pub max_width: Option<u32>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "truncated_dimension"
    )]
    pub max_height: Option<u32>,
}

/// Truncate any JSON number toward zero, saturating at the `i64` bounds.
fn truncate_number(number: &serde_json::Number) -> i64 {
    if let Some(n) = number.as_i64() {
        n
    } else if let Some(n) = number.as_u64() {
        i64::try_from(n).unwrap_or(i64::MAX)
    } else {
        // `as` saturates and maps NaN to 0.
        number.as_f64().map_or(0, |f| f as i64)
    }
}

fn truncated_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let number = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(number.as_ref().map(truncate_number))
}

fn truncated_dimension<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = truncated_i64(deserializer)?;
    Ok(value.map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX)))
}

/// Parameters of a `watermark` operation. Absent fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkParams {
    pub text: String,
    pub position: Position,
    pub opacity: f64,
    pub font_size: f64,
    pub color: String,
}

impl Default for WatermarkParams {
    fn default() -> Self {
        Self {
            text: DEFAULT_WATERMARK_TEXT.to_string(),
            position: Position::BottomRight,
            opacity: DEFAULT_OPACITY,
            font_size: DEFAULT_FONT_SIZE,
            color: DEFAULT_COLOR.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// The `{type, params}` shape used on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOperation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One transform step.
///
/// `Unknown` keeps an operation whose `type` this build does not recognize;
/// the pipeline skips it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOperation", into = "RawOperation")]
pub enum Operation {
    Compress(CompressParams),
    Watermark(WatermarkParams),
    Unknown {
        kind: String,
        params: serde_json::Value,
    },
}

impl Operation {
    /// Wire tag of this operation.
    pub fn kind(&self) -> &str {
        match self {
            Self::Compress(_) => OP_COMPRESS,
            Self::Watermark(_) => OP_WATERMARK,
            Self::Unknown { kind, .. } => kind,
        }
    }
}

impl TryFrom<RawOperation> for Operation {
    type Error = serde_json::Error;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        match raw.kind.as_str() {
            OP_COMPRESS => decode_params(raw.params).map(Self::Compress),
            OP_WATERMARK => decode_params(raw.params).map(Self::Watermark),
            _ => Ok(Self::Unknown {
                kind: raw.kind,
                params: raw.params,
            }),
        }
    }
}

impl From<Operation> for RawOperation {
    fn from(op: Operation) -> Self {
        match op {
            // Serializing plain derive structs into a Value cannot fail.
            Operation::Compress(p) => RawOperation {
                kind: OP_COMPRESS.to_string(),
                params: serde_json::to_value(p).unwrap_or_default(),
            },
            Operation::Watermark(p) => RawOperation {
                kind: OP_WATERMARK.to_string(),
                params: serde_json::to_value(p).unwrap_or_default(),
            },
            Operation::Unknown { kind, params } => RawOperation { kind, params },
        }
    }
}

/// Missing or `null` params decode to the parameter defaults.
fn decode_params<T>(params: serde_json::Value) -> Result<T, serde_json::Error>
where
    T: serde::de::DeserializeOwned + Default,
{
    if params.is_null() {
        Ok(T::default())
    } else {
        serde_json::from_value(params)
    }
}

/// Decode and validate operations received at submission.
///
/// Unlike envelope decoding, submission is strict about the operation
/// `type` and the JSON shape of `params`. Value ranges are not checked here;
/// the pipeline normalizes them to defaults.
pub fn parse_submitted(raw: Vec<RawOperation>) -> Result<Vec<Operation>, CoreError> {
    if raw.is_empty() {
        return Err(CoreError::Validation(
            "operations must contain at least one entry".into(),
        ));
    }

    raw.into_iter()
        .enumerate()
        .map(|(index, op)| {
            if !VALID_OPERATION_TYPES.contains(&op.kind.as_str()) {
                return Err(CoreError::Validation(format!(
                    "operations[{index}]: unknown type '{}'. Valid: {VALID_OPERATION_TYPES:?}",
                    op.kind
                )));
            }
            if !op.params.is_object() {
                return Err(CoreError::Validation(format!(
                    "operations[{index}]: params must be a JSON object"
                )));
            }
            Operation::try_from(op).map_err(|e| {
                CoreError::Validation(format!("operations[{index}]: invalid params: {e}"))
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
