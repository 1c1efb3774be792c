//! Decoding of write payloads.
//!
//! Container values arrive as JSON text: an array for lists and sets, an object for maps,
//! and either an array of `{"member", "score"}` objects or a `member → score` object for
//! sorted sets. The whole payload is decoded into a [`Payload`] before any command is
//! sent, so a malformed payload never leaves a half written key behind.
use serde_json::Value;

use crate::command::Command;
use crate::key::ValueType;
use crate::{KeyscopeError, Result};

/// A fully decoded write payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// written with `SET`
    Scalar(String),
    /// written with `RPUSH`, order preserved
    List(Vec<String>),
    /// written with `SADD`
    Set(Vec<String>),
    /// written with `HSET`
    Map(Vec<(String, String)>),
    /// written with `ZADD`
    SortedSet(Vec<(String, f64)>),
}

impl Payload {
    /// decodes `raw` according to `value_type`.
    ///
    /// Scalars (and types this client does not special-case) take `raw` verbatim.
    ///
    /// # Errors
    /// [`KeyscopeError::Payload`] if a container payload is not valid JSON, has the wrong
    /// shape, or contains nested values
    pub fn parse(value_type: &ValueType, raw: &str) -> Result<Payload> {
        match value_type {
            ValueType::Scalar | ValueType::Unrecognized(_) => Ok(Payload::Scalar(raw.to_string())),
            ValueType::List => parse_array(raw, "list").map(Payload::List),
            ValueType::Set => parse_array(raw, "set").map(Payload::Set),
            ValueType::Map => parse_object(raw).map(Payload::Map),
            ValueType::SortedSet => parse_scored(raw).map(Payload::SortedSet),
            ValueType::Absent => Err(KeyscopeError::Payload(
                "cannot write a value of type 'absent'".into(),
            )),
        }
    }

    /// the commands that store this payload under `key`. An empty container produces no
    /// commands, the store has no representation for it.
    pub fn commands(self, key: &str) -> Vec<Command> {
        let key = key.to_string();
        match self {
            Payload::Scalar(value) => vec![Command::Set { key, value }],
            Payload::List(items) if !items.is_empty() => vec![Command::RPush { key, items }],
            Payload::Set(members) if !members.is_empty() => vec![Command::SAdd { key, members }],
            Payload::Map(fields) if !fields.is_empty() => vec![Command::HSet { key, fields }],
            Payload::SortedSet(members) if !members.is_empty() => {
                vec![Command::ZAdd { key, members }]
            }
            _ => vec![],
        }
    }
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| KeyscopeError::Payload(format!("invalid JSON: {}", e)))
}

fn parse_array(raw: &str, kind: &str) -> Result<Vec<String>> {
    match parse_json(raw)? {
        Value::Array(items) => items.iter().map(scalar_text).collect(),
        other => Err(KeyscopeError::Payload(format!(
            "a {} payload must be a JSON array, got {}",
            kind,
            json_kind(&other)
        ))),
    }
}

fn parse_object(raw: &str) -> Result<Vec<(String, String)>> {
    match parse_json(raw)? {
        Value::Object(fields) => fields
            .iter()
            .map(|(field, value)| Ok((field.clone(), scalar_text(value)?)))
            .collect(),
        other => Err(KeyscopeError::Payload(format!(
            "a map payload must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn parse_scored(raw: &str) -> Result<Vec<(String, f64)>> {
    match parse_json(raw)? {
        Value::Object(members) => members
            .iter()
            .map(|(member, score)| Ok((member.clone(), score_of(score)?)))
            .collect(),
        Value::Array(entries) => entries
            .iter()
            .map(|entry| {
                let member = entry
                    .get("member")
                    .ok_or_else(|| KeyscopeError::Payload("sorted set entry has no 'member'".into()))
                    .and_then(scalar_text)?;
                let score = entry
                    .get("score")
                    .ok_or_else(|| KeyscopeError::Payload("sorted set entry has no 'score'".into()))
                    .and_then(score_of)?;
                Ok((member, score))
            })
            .collect(),
        other => Err(KeyscopeError::Payload(format!(
            "a sorted-set payload must be a JSON array or object, got {}",
            json_kind(&other)
        ))),
    }
}

/// strings are taken as-is, numbers and booleans by their JSON text
fn scalar_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(KeyscopeError::Payload(format!(
            "elements must be strings, numbers or booleans, got {}",
            json_kind(other)
        ))),
    }
}

fn score_of(value: &Value) -> Result<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    };
    score
        .filter(|s| !s.is_nan())
        .ok_or_else(|| KeyscopeError::Payload(format!("'{}' is not a valid score", value)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
