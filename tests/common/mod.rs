//! An in-memory store behind the `Connector` seam, so catalog behaviour can be tested without
//! a server.
#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use keyscope::command::Command;
use keyscope::frame::Frame;
use keyscope::{ConnectionTarget, Connector, KeyscopeError, Result, StoreConnection};

/// A value held by the in-memory store
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Str(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
    Hash(Vec<(String, String)>),
    ZSet(Vec<(String, f64)>),
    /// a type without dedicated read support, e.g. `stream`
    Other(String),
}

impl Entry {
    fn type_name(&self) -> &str {
        match self {
            Entry::Str(_) => "string",
            Entry::List(_) => "list",
            Entry::Set(_) => "set",
            Entry::Hash(_) => "hash",
            Entry::ZSet(_) => "zset",
            Entry::Other(name) => name,
        }
    }
}

#[derive(Debug, Default)]
pub struct Data {
    pub entries: HashMap<String, Entry>,
    pub ttls: HashMap<String, i64>,
}

/// Shared state of one in-memory store and counters for every connection opened on it
#[derive(Clone, Default)]
pub struct MemoryConnector {
    pub data: Arc<Mutex<Data>>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub log: Arc<Mutex<Vec<Command>>>,
    /// every command touching one of these keys gets an error reply
    pub poisoned: Arc<Mutex<HashSet<String>>>,
    /// every command sleeps this long before answering
    pub latency: Option<Duration>,
    pub refuse: bool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        MemoryConnector::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        MemoryConnector {
            latency: Some(latency),
            ..MemoryConnector::default()
        }
    }

    pub fn refusing() -> Self {
        MemoryConnector {
            refuse: true,
            ..MemoryConnector::default()
        }
    }

    pub fn put(&self, key: &str, entry: Entry) {
        self.data.lock().unwrap().entries.insert(key.to_string(), entry);
    }

    pub fn expire(&self, key: &str, secs: i64) {
        self.data.lock().unwrap().ttls.insert(key.to_string(), secs);
    }

    pub fn entry(&self, key: &str) -> Option<Entry> {
        self.data.lock().unwrap().entries.get(key).cloned()
    }

    pub fn poison(&self, key: &str) {
        self.poisoned.lock().unwrap().insert(key.to_string());
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// names of the commands executed so far, in order
    pub fn sent(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().iter().map(Command::name).collect()
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    fn connect(&self, target: &ConnectionTarget) -> Result<MemoryConnection> {
        if self.refuse {
            return Err(KeyscopeError::Connection(format!("{} refused the connection", target)));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: self.clone(),
        })
    }
}

pub struct MemoryConnection {
    store: MemoryConnector,
}

impl StoreConnection for MemoryConnection {
    fn execute(&mut self, cmd: &Command) -> Result<Frame> {
        if let Some(latency) = self.store.latency {
            thread::sleep(latency);
        }
        self.store.log.lock().unwrap().push(cmd.clone());
        let args = cmd.args();
        if args.len() > 1 && self.store.poisoned.lock().unwrap().contains(&args[1]) {
            return Ok(Frame::Error("ERR injected failure".into()));
        }
        let mut data = self.store.data.lock().unwrap();
        Ok(apply(&mut data, cmd))
    }

    fn close(&mut self) -> Result<()> {
        self.store.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn bulk(s: &str) -> Frame {
    Frame::Bulk(s.to_string())
}

fn ok() -> Frame {
    Frame::Simple("OK".into())
}

fn wrong_type() -> Frame {
    Frame::Error("WRONGTYPE Operation against a key holding the wrong kind of value".into())
}

/// the subset of command semantics the catalog relies on
fn apply(data: &mut Data, cmd: &Command) -> Frame {
    match cmd {
        Command::Auth { .. } | Command::Select { .. } | Command::Quit => ok(),
        Command::Ping => Frame::Simple("PONG".into()),
        Command::Keys { .. } => {
            Frame::Array(data.entries.keys().map(|k| bulk(k)).collect())
        }
        Command::DbSize => Frame::Integer(data.entries.len() as i64),
        Command::Exists { key } => Frame::Integer(data.entries.contains_key(key) as i64),
        Command::Type { key } => Frame::Simple(
            data.entries.get(key).map_or("none", Entry::type_name).to_string(),
        ),
        Command::Ttl { key } => match data.entries.get(key) {
            None => Frame::Integer(-2),
            Some(_) => Frame::Integer(*data.ttls.get(key).unwrap_or(&-1)),
        },
        Command::Get { key } => match data.entries.get(key) {
            None => Frame::Null,
            Some(Entry::Str(s)) => bulk(s),
            Some(_) => wrong_type(),
        },
        Command::LRange { key, .. } => match data.entries.get(key) {
            None => Frame::Array(vec![]),
            Some(Entry::List(items)) => Frame::Array(items.iter().map(|s| bulk(s)).collect()),
            Some(_) => wrong_type(),
        },
        Command::SMembers { key } => match data.entries.get(key) {
            None => Frame::Array(vec![]),
            Some(Entry::Set(members)) => Frame::Array(members.iter().map(|s| bulk(s)).collect()),
            Some(_) => wrong_type(),
        },
        Command::HGetAll { key } => match data.entries.get(key) {
            None => Frame::Array(vec![]),
            Some(Entry::Hash(fields)) => Frame::Array(
                fields.iter().flat_map(|(f, v)| vec![bulk(f), bulk(v)]).collect(),
            ),
            Some(_) => wrong_type(),
        },
        Command::ZRangeWithScores { key, .. } => match data.entries.get(key) {
            None => Frame::Array(vec![]),
            Some(Entry::ZSet(members)) => {
                let mut ranked = members.clone();
                ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
                Frame::Array(
                    ranked
                        .iter()
                        .flat_map(|(m, s)| vec![bulk(m), bulk(&s.to_string())])
                        .collect(),
                )
            }
            Some(_) => wrong_type(),
        },
        Command::Set { key, value } => {
            data.entries.insert(key.clone(), Entry::Str(value.clone()));
            data.ttls.remove(key);
            ok()
        }
        Command::Del { key } => {
            data.ttls.remove(key);
            Frame::Integer(data.entries.remove(key).is_some() as i64)
        }
        Command::RPush { key, items } => {
            let entry = data.entries.entry(key.clone()).or_insert_with(|| Entry::List(vec![]));
            match entry {
                Entry::List(list) => {
                    list.extend(items.iter().cloned());
                    Frame::Integer(list.len() as i64)
                }
                _ => wrong_type(),
            }
        }
        Command::SAdd { key, members } => {
            let entry = data
                .entries
                .entry(key.clone())
                .or_insert_with(|| Entry::Set(BTreeSet::new()));
            match entry {
                Entry::Set(set) => {
                    let added = members.iter().filter(|m| set.insert((*m).clone())).count();
                    Frame::Integer(added as i64)
                }
                _ => wrong_type(),
            }
        }
        Command::HSet { key, fields } => {
            let entry = data.entries.entry(key.clone()).or_insert_with(|| Entry::Hash(vec![]));
            match entry {
                Entry::Hash(existing) => {
                    let mut added = 0;
                    for (field, value) in fields {
                        match existing.iter_mut().find(|(f, _)| f == field) {
                            Some(slot) => slot.1 = value.clone(),
                            None => {
                                existing.push((field.clone(), value.clone()));
                                added += 1;
                            }
                        }
                    }
                    Frame::Integer(added)
                }
                _ => wrong_type(),
            }
        }
        Command::ZAdd { key, members } => {
            let entry = data.entries.entry(key.clone()).or_insert_with(|| Entry::ZSet(vec![]));
            match entry {
                Entry::ZSet(existing) => {
                    let mut added = 0;
                    for (member, score) in members {
                        match existing.iter_mut().find(|(m, _)| m == member) {
                            Some(slot) => slot.1 = *score,
                            None => {
                                existing.push((member.clone(), *score));
                                added += 1;
                            }
                        }
                    }
                    Frame::Integer(added)
                }
                _ => wrong_type(),
            }
        }
        Command::Info { section } => match section.as_str() {
            "server" => bulk("# Server\r\nredis_version:7.2.4\r\nuptime_in_seconds:3600\r\n"),
            "memory" => bulk("# Memory\r\nused_memory:1048576\r\nmem_fragmentation_ratio:1.25\r\n"),
            _ => bulk(""),
        },
        Command::ConfigGet { .. } => Frame::Error("ERR unknown command 'CONFIG'".into()),
    }
}
