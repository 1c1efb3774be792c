use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, select};
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientConfig, TcpConnector};
use crate::diagnostics::{self, Diagnostics, ServerReport};
use crate::key::{KeyDescriptor, KeyValue, ValueType, WriteMode};
use crate::payload::Payload;
use crate::store::{Connector, StoreConnection};
use crate::{ConnectionTarget, KeyscopeError, Result};

/// the overall budget for operations raced against a deadline
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(8);

/// shown instead of the value of a key whose type cannot be read as a scalar
pub const UNSUPPORTED_VALUE: &str = "[unsupported type]";

/// Settings for a [`KeyCatalogClient`] talking to a real store
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// socket level settings for every connection
    pub client: ClientConfig,
    /// overall budget for `describe_key`, `diagnose` and `server_report`
    pub deadline: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            client: ClientConfig::default(),
            deadline: DEFAULT_DEADLINE,
        }
    }
}

impl CatalogConfig {
    /// replaces the overall deadline
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// replaces the per-command socket timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.client.command_timeout = timeout;
        self
    }

    /// replaces the number of connect attempts
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.client.max_attempts = attempts;
        self
    }
}

/// `KeyCatalogClient` is the data access layer of the key browser.
///
/// Every operation takes the connection target as a string, validates it, opens a fresh
/// connection through its [`Connector`], runs one or a few commands, and releases the
/// connection again, also when the operation fails. Nothing is cached between calls, so
/// calls may run concurrently from any number of threads.
///
/// # Example
/// ```rust
/// use keyscope::{group, CatalogConfig, KeyCatalogClient};
/// # fn main() -> keyscope::Result<()> {
/// let catalog = KeyCatalogClient::new(CatalogConfig::default());
/// let keys = catalog.list_keys("redis://127.0.0.1:6379")?;
/// for group in group(keys) {
///     println!("{} ({})", group.prefix, group.members.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct KeyCatalogClient<C: Connector = TcpConnector> {
    connector: C,
    deadline: Duration,
}

impl KeyCatalogClient<TcpConnector> {
    /// a catalog client that talks to stores over TCP
    pub fn new(config: CatalogConfig) -> Self {
        KeyCatalogClient {
            connector: TcpConnector::new(config.client),
            deadline: config.deadline,
        }
    }
}

impl<C: Connector> KeyCatalogClient<C> {
    /// a catalog client using a custom `connector`
    pub fn with_connector(connector: C, deadline: Duration) -> Self {
        KeyCatalogClient { connector, deadline }
    }

    /// the overall deadline used by raced operations
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// checks that `target` can be reached; returns the store's reply to PING
    #[instrument(skip(self, target))]
    pub fn connect(&self, target: &str) -> Result<String> {
        let target = ConnectionTarget::parse(target)?;
        let mut conn = self.connector.open(&target)?;
        let reply = conn.ping()?;
        info!("connected to {}", target);
        Ok(reply)
    }

    /// lists every key name, sorted. Only the names are filled in.
    ///
    /// # Errors
    /// `Config` for a malformed target, `Connection` if the store is unreachable,
    /// `Protocol` if the reply is not a key enumeration, `Timeout` if the socket times out
    #[instrument(skip(self, target))]
    pub fn list_keys(&self, target: &str) -> Result<Vec<KeyDescriptor>> {
        let target = ConnectionTarget::parse(target)?;
        let mut conn = self.connector.open(&target)?;
        let mut names = conn.keys("*")?;
        names.sort();
        debug!("listed {} keys", names.len());
        Ok(names.into_iter().map(KeyDescriptor::named).collect())
    }

    /// describes a single key: existence, type, ttl and value.
    ///
    /// A missing key is not an error; it comes back as [`KeyDescriptor::absent`]. The whole
    /// call is raced against the client's deadline.
    ///
    /// # Errors
    /// `Config`, `Connection`, `Protocol`, or `Timeout` if the deadline expired first
    #[instrument(skip(self, target))]
    pub fn describe_key(&self, target: &str, name: &str) -> Result<KeyDescriptor> {
        let target = ConnectionTarget::parse(target)?;
        let name = require_name(name)?.to_string();
        let connector = self.connector.clone();
        self.race("describe", move || {
            let mut conn = connector.open(&target)?;
            describe(&mut *conn, &name)
        })
    }

    /// lists every key and describes each one on a single connection.
    ///
    /// A key that fails to describe does not abort the listing; it is reported with an
    /// unrecognized type and an error placeholder as its value.
    #[instrument(skip(self, target))]
    pub fn describe_all(&self, target: &str) -> Result<Vec<KeyDescriptor>> {
        let target = ConnectionTarget::parse(target)?;
        let mut conn = self.connector.open(&target)?;
        let mut names = conn.keys("*")?;
        names.sort();

        let described = names
            .into_iter()
            .map(|name| match describe(&mut *conn, &name) {
                Ok(desc) => desc,
                Err(e) => {
                    warn!("could not describe key {}: {}", name, e);
                    failed_descriptor(name, &e)
                }
            })
            .collect();
        Ok(described)
    }

    /// writes `payload` under `name` as a value of `value_type`.
    ///
    /// Container payloads are fully decoded before the store is contacted. In
    /// [`WriteMode::Update`] container keys are deleted first, so the payload replaces the old
    /// value instead of being merged into it.
    ///
    /// # Errors
    /// `Payload` if the payload cannot be decoded (nothing is written), `Config`,
    /// `Connection`, `Protocol`
    #[instrument(skip(self, target, payload))]
    pub fn write_key(
        &self,
        target: &str,
        name: &str,
        value_type: &ValueType,
        payload: &str,
        mode: WriteMode,
    ) -> Result<()> {
        let target = ConnectionTarget::parse(target)?;
        let name = require_name(name)?;
        let payload = Payload::parse(value_type, payload)?;

        let mut conn = self.connector.open(&target)?;
        if mode == WriteMode::Update && value_type.is_container() {
            conn.del(name)?;
        }
        for cmd in payload.commands(name) {
            conn.mutate(&cmd)?;
        }
        info!("wrote {} key {} ({:?})", value_type, name, mode);
        Ok(())
    }

    /// deletes `name`. Deleting a key that does not exist succeeds.
    #[instrument(skip(self, target))]
    pub fn delete_key(&self, target: &str, name: &str) -> Result<()> {
        let target = ConnectionTarget::parse(target)?;
        let name = require_name(name)?;
        let mut conn = self.connector.open(&target)?;
        let removed = conn.del(name)?;
        info!("deleted key {} ({} removed)", name, removed);
        Ok(())
    }

    /// best-effort diagnostics; never fails, problems are recorded in the result
    #[instrument(skip(self, target))]
    pub fn diagnose(&self, target: &str) -> Diagnostics {
        let target = match ConnectionTarget::parse(target) {
            Ok(target) => target,
            Err(e) => return Diagnostics::unreachable(e.to_string()),
        };
        let connector = self.connector.clone();
        let outcome = self.race("diagnose", move || {
            let mut conn = connector.open(&target)?;
            Ok(diagnostics::probe(&mut *conn))
        });
        outcome.unwrap_or_else(|e| Diagnostics::unreachable(e.to_string()))
    }

    /// server, memory and configuration overview, raced against the deadline
    #[instrument(skip(self, target))]
    pub fn server_report(&self, target: &str) -> Result<ServerReport> {
        let target = ConnectionTarget::parse(target)?;
        let connector = self.connector.clone();
        self.race("server-report", move || {
            let mut conn = connector.open(&target)?;
            diagnostics::report(&mut *conn)
        })
    }

    /// runs `op` on a worker thread and waits for it at most `self.deadline`.
    ///
    /// On timeout the worker is abandoned, not cancelled: it keeps running until its own
    /// socket timeouts end it, and its connection guard still releases the connection.
    fn race<T, F>(&self, label: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = channel::bounded(1);
        thread::Builder::new()
            .name(format!("keyscope-{}", label))
            .spawn(move || {
                // nobody is listening any more if the deadline already fired
                let _ = tx.send(op());
            })?;

        let deadline = channel::after(self.deadline);
        select! {
            recv(rx) -> outcome => outcome.unwrap_or_else(|_| {
                Err(KeyscopeError::Protocol(format!("{} worker stopped without a result", label)))
            }),
            recv(deadline) -> _ => {
                warn!("{} did not finish within {:?}", label, self.deadline);
                Err(KeyscopeError::Timeout(self.deadline))
            }
        }
    }
}

fn require_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        Err(KeyscopeError::Config("key name is required".into()))
    } else {
        Ok(name)
    }
}

/// existence, type, ttl, then the value fetch that matches the type
fn describe<S: StoreConnection + ?Sized>(conn: &mut S, name: &str) -> Result<KeyDescriptor> {
    if !conn.exists(name)? {
        return Ok(KeyDescriptor::absent(name));
    }
    let value_type = conn.key_type(name)?;
    if value_type == ValueType::Absent {
        // expired between the two probes
        return Ok(KeyDescriptor::absent(name));
    }
    let ttl = conn.ttl(name)?;
    let value = fetch_value(conn, name, &value_type)?;
    Ok(KeyDescriptor::described(name, value_type, ttl, value))
}

fn fetch_value<S: StoreConnection + ?Sized>(
    conn: &mut S,
    name: &str,
    value_type: &ValueType,
) -> Result<KeyValue> {
    let value = match value_type {
        ValueType::Scalar => KeyValue::Scalar(conn.get(name)?.unwrap_or_default()),
        ValueType::List => KeyValue::List(conn.list_items(name)?),
        ValueType::Set => KeyValue::Set(conn.set_members(name)?.into_iter().collect::<BTreeSet<_>>()),
        ValueType::Map => KeyValue::Map(conn.map_fields(name)?),
        ValueType::SortedSet => KeyValue::SortedSet(conn.scored_members(name)?),
        ValueType::Unrecognized(kind) => match read_as_scalar(conn, name) {
            Ok(value) => value,
            Err(e) => {
                debug!("{} key {} has no scalar reading: {}", kind, name, e);
                KeyValue::Placeholder(UNSUPPORTED_VALUE.to_string())
            }
        },
        ValueType::Absent => KeyValue::Placeholder(UNSUPPORTED_VALUE.to_string()),
    };
    Ok(value)
}

/// fallback for types without a dedicated read command
fn read_as_scalar<S: StoreConnection + ?Sized>(conn: &mut S, name: &str) -> Result<KeyValue> {
    conn.get(name)?
        .map(KeyValue::Scalar)
        .ok_or_else(|| KeyscopeError::Protocol(format!("GET returned nothing for {}", name)))
}

fn failed_descriptor(name: String, err: &KeyscopeError) -> KeyDescriptor {
    KeyDescriptor {
        value_type: Some(ValueType::Unrecognized("unknown".into())),
        value: Some(KeyValue::Placeholder(format!("[error: {}]", err))),
        ..KeyDescriptor::named(name)
    }
}
