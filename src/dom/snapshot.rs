//! Raw snapshot payloads as produced by the in-page extraction script.
//!
//! The extractor hands back either a JSON string or an already-structured value.
//! Two shapes are understood:
//! - flat: `{ "map": { id: record, ... }, "rootId": id, "perfMetrics": ... }`
//! - legacy: a single record whose `children` are nested records

use crate::error::{BrowserError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

/// Key of the node map in a flat snapshot
pub const MAP_KEY: &str = "map";

/// Key of the root id in a flat snapshot
pub const ROOT_ID_KEY: &str = "rootId";

/// Value of the `type` field that marks a text record
pub const TEXT_NODE_TYPE: &str = "TEXT_NODE";

const PERF_KEYS: [&str; 2] = ["perfMetrics", "perfSummary"];

/// Identifier assigned by the extractor. Only unique within one snapshot.
///
/// The extractor may emit ids as strings or integers; both normalize to the string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Interpret a JSON value as a node id
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(Self(id.clone())),
            Value::Number(id) => Some(Self(id.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        NodeId::from_value(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("expected a string or integer node id, got {}", value))
        })
    }
}

/// Viewport dimensions attached to a record
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RawViewport {
    pub width: i64,
    pub height: i64,
}

/// Text record. Both fields are required; they are optional here so that
/// their absence surfaces as a structure error instead of a serde message.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawTextRecord {
    pub text: Option<String>,
    pub is_visible: Option<bool>,
}

/// Element record.
///
/// Only `tagName` and `xpath` must be well-formed. Flags that are null or not
/// booleans read as false, scalar attribute values are stringified, and a
/// highlight index or viewport of the wrong shape reads as absent.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawElementRecord {
    pub tag_name: Option<String>,
    pub xpath: Option<String>,
    #[serde(default, deserialize_with = "lenient_attributes")]
    pub attributes: IndexMap<String, String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_visible: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_interactive: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_top_element: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_in_viewport: bool,
    #[serde(default, deserialize_with = "lenient_index")]
    pub highlight_index: Option<usize>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub shadow_root: bool,
    /// Child ids in the flat form, nested records in the legacy form
    pub children: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient_viewport")]
    pub viewport: Option<RawViewport>,
}

fn lenient_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_bool().unwrap_or(false))
}

fn lenient_index<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_u64().and_then(|index| usize::try_from(index).ok()))
}

fn lenient_viewport<'de, D>(deserializer: D) -> std::result::Result<Option<RawViewport>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(RawViewport::deserialize(&value).ok())
}

fn lenient_attributes<'de, D>(deserializer: D) -> std::result::Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(fields) = Value::deserialize(deserializer)? else {
        return Ok(IndexMap::new());
    };

    Ok(fields
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                // null and nested values carry nothing an attribute can hold
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key, value))
        })
        .collect())
}

/// One record of the node map
#[derive(Debug, Clone, PartialEq)]
pub enum RawNodeRecord {
    Text(RawTextRecord),
    Element(RawElementRecord),
}

impl RawNodeRecord {
    /// Parse a record. `Ok(None)` for an absent or empty record.
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => return Ok(None),
            Value::Object(fields) if fields.is_empty() => return Ok(None),
            Value::Object(_) => {}
            other => {
                return Err(BrowserError::InvalidStructure(format!(
                    "node record must be a mapping, got {}",
                    value_kind(other)
                )));
            }
        }

        if is_text_record(value) {
            RawTextRecord::deserialize(value)
                .map(|record| Some(RawNodeRecord::Text(record)))
                .map_err(|e| BrowserError::InvalidStructure(format!("malformed text record: {}", e)))
        } else {
            RawElementRecord::deserialize(value)
                .map(|record| Some(RawNodeRecord::Element(record)))
                .map_err(|e| BrowserError::InvalidStructure(format!("malformed element record: {}", e)))
        }
    }
}

fn is_text_record(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some(TEXT_NODE_TYPE)
}

/// Whether a raw record carries a usable `highlightIndex`
pub fn has_highlight_index(value: &Value) -> bool {
    value.get("highlightIndex").and_then(Value::as_u64).is_some()
}

/// Whether a raw record has a `children` field at all (an empty list counts)
pub fn has_children_field(value: &Value) -> bool {
    value.get("children").is_some()
}

/// Flat snapshot: every node keyed by id, plus the id of the root
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Records in payload order
    pub node_map: IndexMap<NodeId, Value>,
    pub root_id: NodeId,
    /// Extractor-side timings, passed through untouched
    pub perf_summary: Option<Value>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}

/// Classified payload
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Flat(Snapshot),
    /// Single record with nested children
    Legacy(Value),
}

/// Decode whatever the bridge returned into a classified payload.
///
/// Text that is not valid JSON falls through as the original value; if that
/// leaves something that is not a mapping the decode error is reported.
pub fn decode_payload(payload: Value) -> Result<DecodedPayload> {
    let (value, decode_error) = match payload {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(decoded) => (decoded, None),
            Err(e) => {
                log::debug!("Snapshot payload is not JSON text, passing it through: {}", e);
                (Value::String(text), Some(e))
            }
        },
        other => (other, None),
    };

    let mut fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(match decode_error {
                Some(e) => BrowserError::DecodeFailed(e.to_string()),
                None => BrowserError::InvalidStructure(format!(
                    "expected a mapping, got {}",
                    value_kind(&other)
                )),
            });
        }
    };

    if !(fields.contains_key(MAP_KEY) && fields.contains_key(ROOT_ID_KEY)) {
        log::debug!("Snapshot has no '{}'/'{}' keys, using the legacy single-node form", MAP_KEY, ROOT_ID_KEY);
        return Ok(DecodedPayload::Legacy(Value::Object(fields)));
    }

    let root_value = fields.shift_remove(ROOT_ID_KEY).unwrap_or(Value::Null);
    let root_id = NodeId::from_value(&root_value).ok_or_else(|| {
        BrowserError::InvalidStructure(format!("'{}' must be a string or integer, got {}", ROOT_ID_KEY, root_value))
    })?;

    let node_map = match fields.shift_remove(MAP_KEY) {
        Some(Value::Object(records)) => records
            .into_iter()
            .map(|(id, record)| (NodeId(id), record))
            .collect::<IndexMap<_, _>>(),
        Some(other) => {
            return Err(BrowserError::InvalidStructure(format!(
                "'{}' must be a mapping, got {}",
                MAP_KEY,
                value_kind(&other)
            )));
        }
        None => IndexMap::new(),
    };

    let perf_summary = PERF_KEYS.iter().find_map(|key| fields.shift_remove(*key));

    Ok(DecodedPayload::Flat(Snapshot {
        node_map,
        root_id,
        perf_summary,
    }))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}
