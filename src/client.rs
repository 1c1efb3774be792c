use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::command::Command;
use crate::frame::{read_frame, write_command, Frame};
use crate::store::{Connector, StoreConnection};
use crate::target::Scheme;
use crate::{ConnectionTarget, KeyscopeError, Result};

/// Socket level settings for a [`StoreClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// how long a single TCP connect attempt may take
    pub connect_timeout: Duration,
    /// read/write timeout applied to every command
    pub command_timeout: Duration,
    /// how many times connecting is attempted before giving up
    pub max_attempts: u32,
    /// delay before retry `n` is `n * backoff_step`, capped at `backoff_cap`
    pub backoff_step: Duration,
    /// upper bound for the delay between connect attempts
    pub backoff_cap: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff_step: Duration::from_millis(50),
            backoff_cap: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// the delay to wait after failed attempt number `attempt` (1 based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt).min(self.backoff_cap)
    }
}

/// Lifecycle of one [`StoreClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// nothing attempted yet
    Idle,
    /// TCP connect and handshake in progress
    Connecting,
    /// waiting for the next command
    Ready,
    /// a command is in flight
    Operating,
    /// QUIT sent, socket being shut down
    Closing,
    /// socket is gone
    Closed,
}

/// `StoreClient` is one synchronous connection to a store, speaking its wire protocol over
/// a [`TcpStream`].
///
/// The connection is authenticated and switched to the target's database before
/// [`StoreClient::connect`] returns. Every command blocks until its reply arrives or the
/// command timeout expires.
pub struct StoreClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    state: ConnectionState,
    // set once an I/O error leaves the stream in an unknown position
    broken: bool,
    command_timeout: Duration,
    peer: SocketAddr,
}

impl StoreClient {
    /// connects to `target`, retrying with backoff, then authenticates and selects the db
    ///
    /// # Errors
    /// [`KeyscopeError::Connection`] if the host cannot be resolved, every attempt fails,
    /// the target asks for an encrypted transport, or the handshake is rejected
    #[instrument(skip(config))]
    pub fn connect(target: &ConnectionTarget, config: &ClientConfig) -> Result<StoreClient> {
        let mut state = ConnectionState::Idle;
        transition(&mut state, ConnectionState::Connecting);

        if target.scheme() == Scheme::Encrypted {
            return Err(KeyscopeError::Connection(
                "encrypted transport (rediss) is not available in this client".into(),
            ));
        }

        let addrs: Vec<SocketAddr> = (target.host(), target.port())
            .to_socket_addrs()
            .map_err(|e| {
                KeyscopeError::Connection(format!("could not resolve {}: {}", target.host(), e))
            })?
            .collect();

        let stream = connect_with_retry(&addrs, config)?;
        let (peer, writer) = prepare(&stream, config)
            .map_err(|e| KeyscopeError::Connection(format!("socket setup failed: {}", e)))?;

        let mut client = StoreClient {
            reader: BufReader::new(stream),
            writer: BufWriter::new(writer),
            state,
            broken: false,
            command_timeout: config.command_timeout,
            peer,
        };
        client.handshake(target)?;
        transition(&mut client.state, ConnectionState::Ready);
        Ok(client)
    }

    /// current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// AUTH and SELECT, any failure here is a connection failure
    fn handshake(&mut self, target: &ConnectionTarget) -> Result<()> {
        if let Some(password) = target.password() {
            let auth = Command::Auth {
                username: target.username().map(String::from),
                password: password.to_string(),
            };
            self.handshake_step(&auth)?;
        }
        if target.db() != 0 {
            self.handshake_step(&Command::Select { db: target.db() })?;
        }
        Ok(())
    }

    fn handshake_step(&mut self, cmd: &Command) -> Result<()> {
        match self.round_trip(cmd) {
            Ok(Frame::Error(msg)) => Err(KeyscopeError::Connection(format!(
                "{} rejected: {}",
                cmd.name(),
                msg
            ))),
            Ok(_) => Ok(()),
            Err(e) => Err(KeyscopeError::Connection(e.to_string())),
        }
    }

    fn round_trip(&mut self, cmd: &Command) -> io::Result<Frame> {
        let sent = write_command(&mut self.writer, &cmd.args()).and_then(|_| self.writer.flush());
        let reply = sent.and_then(|_| read_frame(&mut self.reader));
        if reply.is_err() {
            self.broken = true;
        }
        reply
    }
}

impl StoreConnection for StoreClient {
    fn execute(&mut self, cmd: &Command) -> Result<Frame> {
        if self.broken || self.state == ConnectionState::Closed {
            return Err(KeyscopeError::Connection(format!(
                "connection to {} is no longer usable",
                self.peer
            )));
        }
        transition(&mut self.state, ConnectionState::Operating);
        let reply = self.round_trip(cmd);
        transition(&mut self.state, ConnectionState::Ready);
        debug!("{} -> {:?}", cmd.name(), reply.as_ref().map(Frame::kind));
        reply.map_err(|e| classify(e, self.command_timeout))
    }

    fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        transition(&mut self.state, ConnectionState::Closing);

        let quit = if self.broken {
            Ok(())
        } else {
            self.round_trip(&Command::Quit).map(|_| ())
        };
        let shutdown = match self.writer.get_ref().shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        };
        transition(&mut self.state, ConnectionState::Closed);

        quit.and(shutdown)
            .map_err(|e| KeyscopeError::Connection(format!("closing {}: {}", self.peer, e)))
    }
}

/// Opens [`StoreClient`]s over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: ClientConfig,
}

impl TcpConnector {
    /// a connector using the given socket settings
    pub fn new(config: ClientConfig) -> Self {
        TcpConnector { config }
    }
}

impl Connector for TcpConnector {
    type Connection = StoreClient;

    fn connect(&self, target: &ConnectionTarget) -> Result<StoreClient> {
        StoreClient::connect(target, &self.config)
    }
}

fn transition(state: &mut ConnectionState, next: ConnectionState) {
    debug!("connection state {:?} -> {:?}", state, next);
    *state = next;
}

/// applies the command timeouts and splits off a write handle
fn prepare(stream: &TcpStream, config: &ClientConfig) -> io::Result<(SocketAddr, TcpStream)> {
    stream.set_read_timeout(Some(config.command_timeout))?;
    stream.set_write_timeout(Some(config.command_timeout))?;
    stream.set_nodelay(true)?;
    Ok((stream.peer_addr()?, stream.try_clone()?))
}

/// tries every resolved address, up to `max_attempts` rounds with increasing delays
fn connect_with_retry(addrs: &[SocketAddr], config: &ClientConfig) -> Result<TcpStream> {
    let attempts = config.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        for addr in addrs {
            match TcpStream::connect_timeout(addr, config.connect_timeout) {
                Ok(stream) => {
                    debug!("connected to {} on attempt {}", addr, attempt);
                    return Ok(stream);
                }
                Err(e) => {
                    warn!("connect to {} failed (attempt {}/{}): {}", addr, attempt, attempts, e);
                    last_err = Some(e);
                }
            }
        }
        if attempt < attempts {
            thread::sleep(config.backoff(attempt));
        }
    }
    Err(KeyscopeError::Connection(match last_err {
        Some(e) => format!("giving up after {} attempts: {}", attempts, e),
        None => "host resolved to no addresses".to_string(),
    }))
}

/// maps an I/O failure of an in-flight command onto the error taxonomy
fn classify(e: io::Error, timeout: Duration) -> KeyscopeError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => KeyscopeError::Timeout(timeout),
        io::ErrorKind::InvalidData => KeyscopeError::Protocol(e.to_string()),
        _ => KeyscopeError::Connection(e.to_string()),
    }
}
