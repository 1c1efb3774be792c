//! The seam between the catalog client and the store.
//!
//! A [`Connector`] opens one [`StoreConnection`] per catalog call. Connections only have to
//! know how to execute a raw [`Command`] and how to close themselves; the typed helpers
//! that check reply shapes are provided methods on the trait, so every implementation
//! normalizes replies the same way.
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::command::Command;
use crate::frame::Frame;
use crate::key::{ScoredMember, ValueType};
use crate::{ConnectionTarget, KeyscopeError, Result};

/// Opens connections to a store. Cloned into every worker that runs a catalog call.
pub trait Connector: Clone + Send + Sync + 'static {
    /// the connection type this connector produces
    type Connection: StoreConnection + 'static;

    /// establishes a ready-to-use connection to `target`
    ///
    /// # Errors
    /// [`KeyscopeError::Connection`] if the store cannot be reached or authenticated
    fn connect(&self, target: &ConnectionTarget) -> Result<Self::Connection>;

    /// connects and wraps the connection in a [`ConnectionGuard`] that closes it on drop
    fn open(&self, target: &ConnectionTarget) -> Result<ConnectionGuard<Self::Connection>> {
        let conn = self.connect(target)?;
        Ok(ConnectionGuard::new(conn, target.to_string()))
    }
}

/// A single open connection to the store
pub trait StoreConnection: Send {
    /// sends `cmd` and returns the raw reply, which may be a [`Frame::Error`]
    fn execute(&mut self, cmd: &Command) -> Result<Frame>;

    /// politely closes the connection. Errors are reported but callers are expected to
    /// swallow them.
    fn close(&mut self) -> Result<()>;

    /// sends `cmd` and turns an error reply into [`KeyscopeError::Protocol`]
    fn query(&mut self, cmd: &Command) -> Result<Frame> {
        match self.execute(cmd)? {
            Frame::Error(msg) => Err(KeyscopeError::Protocol(format!(
                "{} failed: {}",
                cmd.name(),
                msg
            ))),
            frame => Ok(frame),
        }
    }

    /// `PING`, returns the reply text
    fn ping(&mut self) -> Result<String> {
        let cmd = Command::Ping;
        expect_text(&cmd, self.query(&cmd)?)
    }

    /// `KEYS pattern`
    fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        let cmd = Command::Keys { pattern: pattern.to_string() };
        expect_strings(&cmd, self.query(&cmd)?)
    }

    /// `DBSIZE`
    fn db_size(&mut self) -> Result<i64> {
        let cmd = Command::DbSize;
        expect_int(&cmd, self.query(&cmd)?)
    }

    /// `EXISTS key`
    fn exists(&mut self, key: &str) -> Result<bool> {
        let cmd = Command::Exists { key: key.to_string() };
        Ok(expect_int(&cmd, self.query(&cmd)?)? > 0)
    }

    /// `TYPE key`
    fn key_type(&mut self, key: &str) -> Result<ValueType> {
        let cmd = Command::Type { key: key.to_string() };
        Ok(ValueType::from_store_name(&expect_text(&cmd, self.query(&cmd)?)?))
    }

    /// `TTL key`, raw reply including the negative sentinels
    fn ttl(&mut self, key: &str) -> Result<i64> {
        let cmd = Command::Ttl { key: key.to_string() };
        expect_int(&cmd, self.query(&cmd)?)
    }

    /// `GET key`
    fn get(&mut self, key: &str) -> Result<Option<String>> {
        let cmd = Command::Get { key: key.to_string() };
        match self.query(&cmd)? {
            Frame::Null => Ok(None),
            frame => expect_text(&cmd, frame).map(Some),
        }
    }

    /// `LRANGE key 0 -1`
    fn list_items(&mut self, key: &str) -> Result<Vec<String>> {
        let cmd = Command::LRange { key: key.to_string(), start: 0, stop: -1 };
        expect_strings(&cmd, self.query(&cmd)?)
    }

    /// `SMEMBERS key`
    fn set_members(&mut self, key: &str) -> Result<Vec<String>> {
        let cmd = Command::SMembers { key: key.to_string() };
        expect_strings(&cmd, self.query(&cmd)?)
    }

    /// `HGETALL key`, fields in reply order
    fn map_fields(&mut self, key: &str) -> Result<Vec<(String, String)>> {
        let cmd = Command::HGetAll { key: key.to_string() };
        expect_pairs(&cmd, self.query(&cmd)?)
    }

    /// `ZRANGE key 0 -1 WITHSCORES`
    fn scored_members(&mut self, key: &str) -> Result<Vec<ScoredMember>> {
        let cmd = Command::ZRangeWithScores { key: key.to_string(), start: 0, stop: -1 };
        expect_pairs(&cmd, self.query(&cmd)?)?
            .into_iter()
            .map(|(member, score)| -> Result<ScoredMember> {
                let score = score.parse::<f64>().map_err(|_| {
                    KeyscopeError::Protocol(format!("ZRANGE returned non-numeric score '{}'", score))
                })?;
                Ok(ScoredMember { member, score })
            })
            .collect()
    }

    /// `SET key value`
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let cmd = Command::Set { key: key.to_string(), value: value.to_string() };
        expect_text(&cmd, self.query(&cmd)?).map(|_| ())
    }

    /// `DEL key`, returns the number of keys removed
    fn del(&mut self, key: &str) -> Result<i64> {
        let cmd = Command::Del { key: key.to_string() };
        expect_int(&cmd, self.query(&cmd)?)
    }

    /// `INFO section` parsed into `name → value` lines
    fn info(&mut self, section: &str) -> Result<BTreeMap<String, String>> {
        let cmd = Command::Info { section: section.to_string() };
        let text = expect_text(&cmd, self.query(&cmd)?)?;
        Ok(text
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .map(|(name, value)| (name.to_string(), value.trim_end().to_string()))
            .collect())
    }

    /// `CONFIG GET pattern`
    fn config(&mut self, pattern: &str) -> Result<Vec<(String, String)>> {
        let cmd = Command::ConfigGet { pattern: pattern.to_string() };
        expect_pairs(&cmd, self.query(&cmd)?)
    }

    /// runs a mutating command and checks it produced an integer or status reply
    fn mutate(&mut self, cmd: &Command) -> Result<()> {
        match self.query(cmd)? {
            Frame::Integer(_) | Frame::Simple(_) => Ok(()),
            other => Err(unexpected(cmd, &other)),
        }
    }
}

/// Owns a connection for the duration of one catalog call and closes it when dropped,
/// whichever way the call exits. Close failures are logged and swallowed.
pub struct ConnectionGuard<C: StoreConnection> {
    conn: C,
    label: String,
}

impl<C: StoreConnection> ConnectionGuard<C> {
    /// wraps `conn`; `label` identifies the connection in log messages
    pub fn new(conn: C, label: String) -> Self {
        ConnectionGuard { conn, label }
    }
}

impl<C: StoreConnection> Deref for ConnectionGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C: StoreConnection> DerefMut for ConnectionGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C: StoreConnection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        match self.conn.close() {
            Ok(()) => debug!("released connection to {}", self.label),
            Err(e) => warn!("error while releasing connection to {}: {}", self.label, e),
        }
    }
}

fn unexpected(cmd: &Command, frame: &Frame) -> KeyscopeError {
    KeyscopeError::Protocol(format!(
        "unexpected {} reply to {}",
        frame.kind(),
        cmd.name()
    ))
}

fn expect_int(cmd: &Command, frame: Frame) -> Result<i64> {
    match frame {
        Frame::Integer(n) => Ok(n),
        other => Err(unexpected(cmd, &other)),
    }
}

fn expect_text(cmd: &Command, frame: Frame) -> Result<String> {
    match frame {
        Frame::Simple(s) | Frame::Bulk(s) => Ok(s),
        other => Err(unexpected(cmd, &other)),
    }
}

fn expect_strings(cmd: &Command, frame: Frame) -> Result<Vec<String>> {
    match frame {
        Frame::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Frame::Bulk(s) | Frame::Simple(s) => Ok(s),
                other => Err(unexpected(cmd, &other)),
            })
            .collect(),
        other => Err(unexpected(cmd, &other)),
    }
}

fn expect_pairs(cmd: &Command, frame: Frame) -> Result<Vec<(String, String)>> {
    let flat = expect_strings(cmd, frame)?;
    if flat.len() % 2 != 0 {
        return Err(KeyscopeError::Protocol(format!(
            "{} returned an odd number of elements",
            cmd.name()
        )));
    }
    let mut pairs = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(a), Some(b)) = (iter.next(), iter.next()) {
        pairs.push((a, b));
    }
    Ok(pairs)
}
