//! Wire codec for the store's request/reply protocol (RESP2).
//!
//! Requests are always arrays of bulk strings. Replies are read into a [`Frame`]. Codec
//! failures are reported as [`io::Error`]s so that the client can tell malformed data
//! (`InvalidData`) apart from a socket timeout or a dropped connection.
use std::io::{self, BufRead, Write};

/// upper bound for a single bulk string or array, anything larger is treated as garbage
const MAX_LENGTH: i64 = 512 * 1024 * 1024;

/// A single decoded reply
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `+OK`
    Simple(String),
    /// `-ERR message`
    Error(String),
    /// `:42`
    Integer(i64),
    /// `$5 hello`
    Bulk(String),
    /// `$-1` or `*-1`
    Null,
    /// `*2 ...`
    Array(Vec<Frame>),
}

impl Frame {
    /// short description of the frame kind, used in protocol error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Simple(_) => "simple string",
            Frame::Error(_) => "error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(_) => "bulk string",
            Frame::Null => "null",
            Frame::Array(_) => "array",
        }
    }
}

/// encodes `args` as an array of bulk strings and writes it to `writer`.
/// The caller is responsible for flushing.
pub fn write_command<W: Write>(writer: &mut W, args: &[String]) -> io::Result<()> {
    write!(writer, "*{}\r\n", args.len())?;
    for arg in args {
        write!(writer, "${}\r\n", arg.len())?;
        writer.write_all(arg.as_bytes())?;
        writer.write_all(b"\r\n")?;
    }
    Ok(())
}

/// reads exactly one reply frame from `reader`
pub fn read_frame<R: BufRead>(reader: &mut R) -> io::Result<Frame> {
    let line = read_line(reader)?;
    let mut chars = line.chars();
    let tag = chars.next().unwrap_or_default();
    let rest = chars.as_str();
    match tag {
        '+' => Ok(Frame::Simple(rest.to_string())),
        '-' => Ok(Frame::Error(rest.to_string())),
        ':' => parse_int(rest).map(Frame::Integer),
        '$' => {
            let len = parse_len(rest)?;
            if len < 0 {
                return Ok(Frame::Null);
            }
            let mut buf = vec![0u8; len as usize + 2];
            reader.read_exact(&mut buf)?;
            if &buf[len as usize..] != b"\r\n" {
                return Err(invalid("bulk string is not terminated by CRLF"));
            }
            buf.truncate(len as usize);
            Ok(Frame::Bulk(String::from_utf8_lossy(&buf).into_owned()))
        }
        '*' => {
            let len = parse_len(rest)?;
            if len < 0 {
                return Ok(Frame::Null);
            }
            let mut items = Vec::with_capacity(len.min(1024) as usize);
            for _ in 0..len {
                items.push(read_frame(reader)?);
            }
            Ok(Frame::Array(items))
        }
        other => Err(invalid(&format!("unknown reply type marker '{}'", other))),
    }
}

/// reads one CRLF terminated line, without the terminator
fn read_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by the store",
        ));
    }
    if !buf.ends_with(b"\r\n") {
        return Err(invalid("reply line is not terminated by CRLF"));
    }
    buf.truncate(buf.len() - 2);
    if buf.is_empty() {
        return Err(invalid("empty reply line"));
    }
    String::from_utf8(buf).map_err(|_| invalid("reply line is not valid UTF-8"))
}

fn parse_int(s: &str) -> io::Result<i64> {
    s.parse::<i64>()
        .map_err(|_| invalid(&format!("'{}' is not an integer", s)))
}

fn parse_len(s: &str) -> io::Result<i64> {
    let len = parse_int(s)?;
    if len > MAX_LENGTH {
        return Err(invalid(&format!("length {} exceeds the protocol limit", len)));
    }
    Ok(len)
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
