//! Catalog data model: the value types the client understands, the values it reads back and
//! the per-key descriptor handed to callers.
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::{KeyscopeError, Result};

/// The value types a key may hold
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// a single string
    Scalar,
    /// an ordered sequence of strings
    List,
    /// an unordered set of unique strings
    Set,
    /// field → value pairs
    Map,
    /// members ordered by a floating point score
    SortedSet,
    /// a type the store reports that this client does not special-case, e.g. `stream`
    Unrecognized(String),
    /// sentinel for a key that does not exist
    Absent,
}

impl ValueType {
    /// maps the store's own type name (the `TYPE` reply) onto a [`ValueType`]
    pub fn from_store_name(name: &str) -> ValueType {
        match name {
            "string" => ValueType::Scalar,
            "list" => ValueType::List,
            "set" => ValueType::Set,
            "hash" => ValueType::Map,
            "zset" => ValueType::SortedSet,
            "none" => ValueType::Absent,
            other => ValueType::Unrecognized(other.to_string()),
        }
    }

    /// true for the types whose write payload is structured JSON
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ValueType::List | ValueType::Set | ValueType::Map | ValueType::SortedSet
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Scalar => "scalar",
            ValueType::List => "list",
            ValueType::Set => "set",
            ValueType::Map => "map",
            ValueType::SortedSet => "sorted-set",
            ValueType::Unrecognized(name) => name.as_str(),
            ValueType::Absent => "absent",
        };
        f.write_str(name)
    }
}

/// parses a user supplied type name. Both this client's names and the store's names are
/// accepted (`map` and `hash`, `sorted-set` and `zset`, ...).
impl FromStr for ValueType {
    type Err = KeyscopeError;

    fn from_str(s: &str) -> Result<ValueType> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scalar" | "string" => Ok(ValueType::Scalar),
            "list" => Ok(ValueType::List),
            "set" => Ok(ValueType::Set),
            "map" | "hash" => Ok(ValueType::Map),
            "sorted-set" | "sortedset" | "zset" => Ok(ValueType::SortedSet),
            other => Err(KeyscopeError::Config(format!("unknown value type '{}'", other))),
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One member of a sorted set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMember {
    /// the member
    pub member: String,
    /// its score. Infinite scores are written as `"inf"` / `"-inf"`, JSON has no number for them.
    #[serde(serialize_with = "serialize_score")]
    pub score: f64,
}

fn serialize_score<S: Serializer>(score: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match *score {
        s if s == f64::INFINITY => serializer.serialize_str("inf"),
        s if s == f64::NEG_INFINITY => serializer.serialize_str("-inf"),
        s => serializer.serialize_f64(s),
    }
}

/// A value read back from the store. The variant always matches the key's [`ValueType`],
/// except for [`KeyValue::Placeholder`] which stands in for a value that could not be read.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// a scalar
    Scalar(String),
    /// list elements in list order
    List(Vec<String>),
    /// set members
    Set(BTreeSet<String>),
    /// map fields in the order the store returned them
    Map(Vec<(String, String)>),
    /// sorted set members in rank order
    SortedSet(Vec<ScoredMember>),
    /// fixed text shown instead of a value that could not be fetched
    Placeholder(String),
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            KeyValue::Scalar(s) | KeyValue::Placeholder(s) => serializer.serialize_str(s),
            KeyValue::List(items) => items.serialize(serializer),
            KeyValue::Set(members) => {
                let mut seq = serializer.serialize_seq(Some(members.len()))?;
                for member in members {
                    seq.serialize_element(member)?;
                }
                seq.end()
            }
            KeyValue::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (field, value) in fields {
                    map.serialize_entry(field, value)?;
                }
                map.end()
            }
            KeyValue::SortedSet(members) => members.serialize(serializer),
        }
    }
}

/// One entry of a key catalog.
///
/// A descriptor coming out of a key listing only carries `name`. After a describe call the
/// type, expiration and value are filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyDescriptor {
    /// the key name
    pub name: String,
    /// the value type, `None` if it was not probed
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    /// seconds until expiry, `None` means the key never expires (or was not probed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    /// the value, `None` until described
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<KeyValue>,
}

impl KeyDescriptor {
    /// a descriptor that only knows the key's name
    pub fn named(name: impl Into<String>) -> KeyDescriptor {
        KeyDescriptor {
            name: name.into(),
            value_type: None,
            ttl: None,
            value: None,
        }
    }

    /// the descriptor returned when describing a key that does not exist
    pub fn absent(name: impl Into<String>) -> KeyDescriptor {
        KeyDescriptor {
            value_type: Some(ValueType::Absent),
            ..KeyDescriptor::named(name)
        }
    }

    /// a fully described key. Negative `ttl` sentinels are folded into `None`.
    pub fn described(
        name: impl Into<String>,
        value_type: ValueType,
        ttl: i64,
        value: KeyValue,
    ) -> KeyDescriptor {
        KeyDescriptor {
            name: name.into(),
            value_type: Some(value_type),
            ttl: normalize_ttl(ttl),
            value: Some(value),
        }
    }

    /// true if a describe call found no such key
    pub fn is_absent(&self) -> bool {
        self.value_type == Some(ValueType::Absent)
    }

    /// true once the value has been fetched
    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }
}

/// `TTL` replies -1 for "no expiry" and -2 for "no such key"; both mean no expiration here
pub fn normalize_ttl(ttl: i64) -> Option<i64> {
    Some(ttl).filter(|t| *t >= 0)
}

/// Whether a write creates a key or replaces an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// container writes add to whatever is already stored under the key
    Create,
    /// container keys are deleted first, so the payload fully replaces the old value
    Update,
}
