//! Best-effort health information about a store.
//!
//! [`Diagnostics`] is what a front end shows next to a failed key listing. Collecting it
//! never fails: every probe records its own outcome. [`ServerReport`] is the more detailed
//! server/memory/config overview.
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::store::StoreConnection;
use crate::Result;

/// key written, read back and deleted by the write permission probe
pub const WRITE_PROBE_KEY: &str = "test:connection";
const WRITE_PROBE_VALUE: &str = "test";

/// Outcome of each diagnostic probe
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// a connection could be opened
    pub connected: bool,
    /// why connecting failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_error: Option<String>,
    /// reply to PING
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<String>,
    /// whether `INFO server` answered
    pub server_info: bool,
    /// number of keys the listing command returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_count: Option<usize>,
    /// why listing keys failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_error: Option<String>,
    /// whether a value could be written and read back
    pub write_ok: bool,
    /// why the write probe failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
}

impl Diagnostics {
    /// diagnostics for a store that could not be reached at all
    pub fn unreachable(reason: String) -> Diagnostics {
        Diagnostics {
            connection_error: Some(reason),
            ..Diagnostics::default()
        }
    }
}

/// runs every probe on an open connection
pub fn probe<S: StoreConnection + ?Sized>(conn: &mut S) -> Diagnostics {
    let mut diag = Diagnostics {
        connected: true,
        ..Diagnostics::default()
    };

    match conn.ping() {
        Ok(reply) => diag.ping = Some(reply),
        Err(e) => warn!("ping failed: {}", e),
    }

    diag.server_info = match conn.info("server") {
        Ok(_) => true,
        Err(e) => {
            debug!("server info unavailable: {}", e);
            false
        }
    };

    match conn.keys("*") {
        Ok(keys) => diag.key_count = Some(keys.len()),
        Err(e) => diag.key_error = Some(e.to_string()),
    }

    match write_probe(conn) {
        Ok(ok) => diag.write_ok = ok,
        Err(e) => diag.write_error = Some(e.to_string()),
    }

    diag
}

fn write_probe<S: StoreConnection + ?Sized>(conn: &mut S) -> Result<bool> {
    conn.set(WRITE_PROBE_KEY, WRITE_PROBE_VALUE)?;
    let read_back = conn.get(WRITE_PROBE_KEY)?;
    conn.del(WRITE_PROBE_KEY)?;
    Ok(read_back.as_deref() == Some(WRITE_PROBE_VALUE))
}

/// Server, memory and configuration overview
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerReport {
    /// `INFO server`, numeric fields as numbers
    pub server: BTreeMap<String, Value>,
    /// `INFO memory`, numeric fields as numbers
    pub memory: BTreeMap<String, Value>,
    /// `CONFIG GET *`, empty if the server refuses it
    pub config: BTreeMap<String, String>,
}

/// collects a [`ServerReport`]. The info sections are required, the config is best effort.
pub fn report<S: StoreConnection + ?Sized>(conn: &mut S) -> Result<ServerReport> {
    let server = typed(conn.info("server")?);
    let memory = typed(conn.info("memory")?);
    let config = match conn.config("*") {
        Ok(pairs) => pairs
            .into_iter()
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .collect(),
        Err(e) => {
            warn!("could not read server configuration: {}", e);
            BTreeMap::new()
        }
    };
    Ok(ServerReport { server, memory, config })
}

fn typed(info: BTreeMap<String, String>) -> BTreeMap<String, Value> {
    info.into_iter()
        .map(|(name, raw)| (name, info_value(raw)))
        .collect()
}

/// integers and finite floats become JSON numbers, everything else stays text
fn info_value(raw: String) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(raw),
    }
}
