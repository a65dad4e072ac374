//! STOMP 1.2 frame codec.
//!
//! One WebSocket text message normally carries one frame, but a message may
//! also hold several frames back to back or nothing but heart-beat EOLs.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // client
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // server
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    pub fn is_server_command(&self) -> bool {
        matches!(
            self,
            Command::Connected | Command::Message | Command::Receipt | Command::Error
        )
    }

    /// CONNECT and CONNECTED headers are sent verbatim, without escaping.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("malformed header line {0:?}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header")]
    InvalidEscape,
    #[error("invalid content-length")]
    InvalidContentLength,
    #[error("frame is missing its NUL terminator")]
    Unterminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header. Repeated headers keep the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Frame::new(Command::Error)
            .header("message", message.clone())
            .header("content-type", "text/plain")
            .body(message)
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                escape_into(&mut out, name);
                out.push(':');
                escape_into(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Decodes every frame in `input`. Heart-beat EOLs between frames are skipped.
pub fn parse_frames(input: &str) -> Result<Vec<Frame>, FrameError> {
    let mut frames = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(frames);
        }
        let (frame, remaining) = parse_one(rest)?;
        frames.push(frame);
        rest = remaining;
    }
}

fn parse_one(input: &str) -> Result<(Frame, &str), FrameError> {
    let (command_line, mut rest) = split_line(input).ok_or(FrameError::Unterminated)?;
    let command: Command = command_line.parse()?;

    let mut headers = Vec::new();
    loop {
        let (line, after) = split_line(rest).ok_or(FrameError::Unterminated)?;
        rest = after;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| v.trim().parse::<usize>().map_err(|_| FrameError::InvalidContentLength))
        .transpose()?;

    let (body, rest) = match content_length {
        Some(len) => {
            let body = rest.get(..len).ok_or(FrameError::InvalidContentLength)?;
            let after = rest[len..].strip_prefix('\0').ok_or(FrameError::Unterminated)?;
            (body, after)
        }
        None => {
            let end = rest.find('\0').ok_or(FrameError::Unterminated)?;
            (&rest[..end], &rest[end + 1..])
        }
    };

    Ok((
        Frame {
            command,
            headers,
            body: body.to_string(),
        },
        rest,
    ))
}

/// Splits off one line ending in LF or CRLF. `None` when no EOL is left.
fn split_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = input[..idx].strip_suffix('\r').unwrap_or(&input[..idx]);
    Some((line, &input[idx + 1..]))
}

fn escape_into(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_frame() {
        let frames = parse_frames("SEND\ndestination:/app/chat\n\n{\"a\":1}\0").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Send);
        assert_eq!(frames[0].get("destination"), Some("/app/chat"));
        assert_eq!(frames[0].body, "{\"a\":1}");
    }

    #[test]
    fn heartbeats_and_multiple_frames() {
        let input = "\n\r\nSUBSCRIBE\r\nid:sub-0\r\ndestination:/topic/a\r\n\r\n\0\nDISCONNECT\n\n\0\n";
        let frames = parse_frames(input).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get("id"), Some("sub-0"));
        assert_eq!(frames[1].command, Command::Disconnect);

        assert!(parse_frames("\n\n").unwrap().is_empty());
    }

    #[test]
    fn content_length_allows_embedded_nul() {
        let frames = parse_frames("SEND\ndestination:/q\ncontent-length:3\n\na\0b\0").unwrap();
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn repeated_header_keeps_first() {
        let frames = parse_frames("SEND\nfoo:1\nfoo:2\n\n\0").unwrap();
        assert_eq!(frames[0].get("foo"), Some("1"));
    }

    #[test]
    fn escaping_applies_except_on_connect() {
        let frame = Frame::new(Command::Message).header("weird", "a:b\nc\\d");
        let encoded = frame.encode();
        assert!(encoded.contains("weird:a\\cb\\nc\\\\d\n"));
        assert_eq!(parse_frames(&encoded).unwrap()[0], frame);

        let connect = parse_frames("CONNECT\npasscode:a\\c\n\n\0").unwrap();
        assert_eq!(connect[0].get("passcode"), Some("a\\c"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            parse_frames("HELLO\n\n\0"),
            Err(FrameError::UnknownCommand("HELLO".into()))
        );
        assert_eq!(parse_frames("SEND\nno-colon\n\n\0"), Err(FrameError::MalformedHeader("no-colon".into())));
        assert_eq!(parse_frames("SEND\nx:\\t\n\n\0"), Err(FrameError::InvalidEscape));
        assert_eq!(parse_frames("SEND\n\nbody"), Err(FrameError::Unterminated));
        assert_eq!(
            parse_frames("SEND\ncontent-length:99\n\nabc\0"),
            Err(FrameError::InvalidContentLength)
        );
    }
}
