//! The store commands issued by this crate.

/// The fixed set of store commands this client ever sends.
///
/// Every command is encoded on the wire as an array of bulk strings (see [`Command::args`]);
/// the reply shape each one promises is checked by the typed methods on
/// [`StoreConnection`](crate::StoreConnection).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// authenticate, optionally as a named user
    Auth {
        /// ACL user name
        username: Option<String>,
        /// password
        password: String,
    },
    /// select a logical database
    Select {
        /// database index
        db: u32,
    },
    /// liveness check
    Ping,
    /// ask the server to close the connection
    Quit,
    /// enumerate keys matching a glob pattern
    Keys {
        /// glob pattern, `*` for everything
        pattern: String,
    },
    /// number of keys in the selected database
    DbSize,
    /// 1 if the key exists
    Exists {
        /// the key to probe
        key: String,
    },
    /// name of the key's value type
    Type {
        /// the key to probe
        key: String,
    },
    /// remaining time to live in seconds
    Ttl {
        /// the key to probe
        key: String,
    },
    /// read a scalar
    Get {
        /// the key to read
        key: String,
    },
    /// read a range of a list
    LRange {
        /// the list key
        key: String,
        /// first index, inclusive
        start: i64,
        /// last index, inclusive, negative counts from the end
        stop: i64,
    },
    /// read every member of a set
    SMembers {
        /// the set key
        key: String,
    },
    /// read every field and value of a map
    HGetAll {
        /// the map key
        key: String,
    },
    /// read a range of a sorted set together with the scores
    ZRangeWithScores {
        /// the sorted set key
        key: String,
        /// first rank, inclusive
        start: i64,
        /// last rank, inclusive, negative counts from the end
        stop: i64,
    },
    /// write a scalar
    Set {
        /// the key to write
        key: String,
        /// the value to write
        value: String,
    },
    /// delete a key of any type
    Del {
        /// the key to delete
        key: String,
    },
    /// append to a list
    RPush {
        /// the list key
        key: String,
        /// elements in order
        items: Vec<String>,
    },
    /// add members to a set
    SAdd {
        /// the set key
        key: String,
        /// members to add
        members: Vec<String>,
    },
    /// set fields of a map
    HSet {
        /// the map key
        key: String,
        /// field/value pairs
        fields: Vec<(String, String)>,
    },
    /// add members with scores to a sorted set
    ZAdd {
        /// the sorted set key
        key: String,
        /// (member, score) pairs
        members: Vec<(String, f64)>,
    },
    /// server information for one section
    Info {
        /// section name, e.g. `server` or `memory`
        section: String,
    },
    /// read configuration parameters matching a glob pattern
    ConfigGet {
        /// glob pattern
        pattern: String,
    },
}

impl Command {
    /// the command name as sent on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::Auth { .. } => "AUTH",
            Command::Select { .. } => "SELECT",
            Command::Ping => "PING",
            Command::Quit => "QUIT",
            Command::Keys { .. } => "KEYS",
            Command::DbSize => "DBSIZE",
            Command::Exists { .. } => "EXISTS",
            Command::Type { .. } => "TYPE",
            Command::Ttl { .. } => "TTL",
            Command::Get { .. } => "GET",
            Command::LRange { .. } => "LRANGE",
            Command::SMembers { .. } => "SMEMBERS",
            Command::HGetAll { .. } => "HGETALL",
            Command::ZRangeWithScores { .. } => "ZRANGE",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::RPush { .. } => "RPUSH",
            Command::SAdd { .. } => "SADD",
            Command::HSet { .. } => "HSET",
            Command::ZAdd { .. } => "ZADD",
            Command::Info { .. } => "INFO",
            Command::ConfigGet { .. } => "CONFIG",
        }
    }

    /// the full argument vector, command name first
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.name().to_string()];
        match self {
            Command::Auth { username, password } => {
                if let Some(user) = username {
                    args.push(user.clone());
                }
                args.push(password.clone());
            }
            Command::Select { db } => args.push(db.to_string()),
            Command::Ping | Command::Quit | Command::DbSize => {}
            Command::Keys { pattern } => args.push(pattern.clone()),
            Command::Exists { key }
            | Command::Type { key }
            | Command::Ttl { key }
            | Command::Get { key }
            | Command::SMembers { key }
            | Command::HGetAll { key }
            | Command::Del { key } => args.push(key.clone()),
            Command::LRange { key, start, stop } => {
                args.extend([key.clone(), start.to_string(), stop.to_string()]);
            }
            Command::ZRangeWithScores { key, start, stop } => {
                args.extend([
                    key.clone(),
                    start.to_string(),
                    stop.to_string(),
                    "WITHSCORES".to_string(),
                ]);
            }
            Command::Set { key, value } => args.extend([key.clone(), value.clone()]),
            Command::RPush { key, items } => {
                args.push(key.clone());
                args.extend(items.iter().cloned());
            }
            Command::SAdd { key, members } => {
                args.push(key.clone());
                args.extend(members.iter().cloned());
            }
            Command::HSet { key, fields } => {
                args.push(key.clone());
                for (field, value) in fields {
                    args.push(field.clone());
                    args.push(value.clone());
                }
            }
            Command::ZAdd { key, members } => {
                args.push(key.clone());
                for (member, score) in members {
                    args.push(score.to_string());
                    args.push(member.clone());
                }
            }
            Command::Info { section } => args.push(section.clone()),
            Command::ConfigGet { pattern } => {
                args.extend(["GET".to_string(), pattern.clone()]);
            }
        }
        args
    }
}
