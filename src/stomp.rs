//! STOMP 1.2 frame encoding and decoding.
//!
//! The game server speaks STOMP over WebSocket text messages. A frame is a
//! command line, `name:value` header lines, a blank line, the body and a NUL
//! terminator. Bare EOLs between frames are heart-beats and are skipped.
//!
//! Header names and values are escaped (`\\`, `\n`, `\r`, `\c`) in every frame
//! except `CONNECT` and `CONNECTED`. When a `content-length` header is present
//! the body is read by byte count, otherwise up to the first NUL.

use std::fmt;

use crate::error::{Result, SessionError};

/// Frame commands understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
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
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// The command as it appears on the wire.
    pub fn as_str(self) -> &'static str {
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

    /// Parse a wire command. Returns `None` for unknown commands.
    pub fn parse(s: &str) -> Option<Self> {
        let command = match s {
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
            _ => return None,
        };
        Some(command)
    }

    /// Handshake frames carry their headers unescaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order. When a header is repeated the first
/// occurrence wins, see [`Frame::header`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// A frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header called `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `CONNECT` frame for a STOMP 1.2 session without heart-beating.
    pub fn connect(host: &str) -> Self {
        Frame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
    }

    /// `SEND` frame to `destination`. Non-empty bodies get a `content-length`.
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        let mut frame = Frame::new(Command::Send).with_header("destination", destination);
        if !body.is_empty() {
            frame = frame.with_header("content-length", body.len().to_string());
        }
        frame.with_body(body)
    }

    /// `SUBSCRIBE` frame binding subscription `id` to `destination`.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
    }

    /// `UNSUBSCRIBE` frame for subscription `id`.
    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    /// `DISCONNECT` frame.
    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Encode the frame, including the trailing NUL.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape {
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

/// Decode every frame contained in one transport message.
///
/// Heart-beat EOLs before, between and after frames are skipped, so a
/// heart-beat-only message decodes to an empty vector.
///
/// # Errors
///
/// Returns [`SessionError::Frame`] on an unknown command, a header line
/// without `:`, an invalid escape, a bad `content-length`, or a missing NUL.
pub fn decode(input: &str) -> Result<Vec<Frame>> {
    frames(input).collect()
}

/// Decode the frames of one transport message lazily.
///
/// Frames before a malformed one are still yielded. The iterator ends after
/// the first error, since the rest of the message cannot be delimited.
pub fn frames(input: &str) -> Frames<'_> {
    Frames { rest: Some(input) }
}

/// Iterator returned by [`frames`].
#[derive(Debug)]
pub struct Frames<'a> {
    rest: Option<&'a str>,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest.take()?.trim_start_matches(['\n', '\r']);
        if rest.is_empty() {
            return None;
        }
        match decode_one(rest) {
            Ok((frame, remaining)) => {
                self.rest = Some(remaining);
                Some(Ok(frame))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

fn decode_one(input: &str) -> Result<(Frame, &str)> {
    let (command_line, mut rest) = input
        .split_once('\n')
        .ok_or_else(|| malformed("missing command line terminator"))?;
    let command_line = command_line.trim_end_matches('\r');
    let command = Command::parse(command_line)
        .ok_or_else(|| malformed(format!("unknown command {command_line:?}")))?;
    let unescape_headers = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, remaining) = rest
            .split_once('\n')
            .ok_or_else(|| malformed("unterminated header block"))?;
        rest = remaining;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("header line without ':' {line:?}")))?;
        if unescape_headers {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| malformed(format!("invalid content-length {value:?}")))
        })
        .transpose()?;

    let (body, rest) = match content_length {
        Some(len) => {
            let body = rest
                .get(..len)
                .ok_or_else(|| malformed("body shorter than content-length"))?;
            let after = rest
                .get(len..)
                .and_then(|after| after.strip_prefix('\0'))
                .ok_or_else(|| malformed("missing NUL after content-length body"))?;
            (body, after)
        }
        None => rest
            .split_once('\0')
            .ok_or_else(|| malformed("missing NUL terminator"))?,
    };

    let frame = Frame {
        command,
        headers,
        body: body.to_string(),
    };
    Ok((frame, rest))
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => return Err(malformed(format!("invalid header escape {other:?}"))),
        }
    }
    Ok(out)
}

fn malformed(reason: impl Into<String>) -> SessionError {
    SessionError::Frame(reason.into())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn frames_before_a_malformed_one_are_kept() {
        let input = "MESSAGE\ndestination:/topic/update/abc\nsubscription:s\n\n{}\0BOGUS\n\n\0";
        let mut decoded = frames(input);

        let first = decoded.next().unwrap().unwrap();
        assert_eq!(first.command, Command::Message);
        assert_eq!(first.body, "{}");
        assert!(matches!(decoded.next(), Some(Err(SessionError::Frame(_)))));
        assert!(decoded.next().is_none());

        assert!(decode(input).is_err());
    }

    #[test]
    fn connect_frame_is_not_escaped() {
        let encoded = Frame::connect("snake.example:8080").encode();
        assert_eq!(
            encoded,
            "CONNECT\naccept-version:1.2\nhost:snake.example:8080\nheart-beat:0,0\n\n\0"
        );
    }

    #[test]
    fn send_frame_carries_content_length() {
        let encoded = Frame::send("/app/move", "\"up\"").encode();
        assert_eq!(
            encoded,
            "SEND\ndestination:/app/move\ncontent-length:4\n\n\"up\"\0"
        );
    }

    #[test]
    fn empty_send_has_no_content_length() {
        let frame = Frame::send("/app/pause", "");
        assert!(frame.header("content-length").is_none());
        assert_eq!(frame.encode(), "SEND\ndestination:/app/pause\n\n\0");
    }

    #[test]
    fn header_values_are_escaped_and_unescaped() {
        let frame = Frame::new(Command::Message)
            .with_header("destination", "/topic/update/a:b")
            .with_header("note", "line\nbreak\\slash");
        let encoded = frame.encode();
        assert!(encoded.contains("destination:/topic/update/a\\cb\n"));
        assert!(encoded.contains("note:line\\nbreak\\\\slash\n"));

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, vec![frame]);
    }

    #[test]
    fn decode_message_without_content_length() {
        let frames =
            decode("MESSAGE\ndestination:/user/queue/getIdx\nsubscription:sub-1\n\n2\0").unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("destination"), Some("/user/queue/getIdx"));
        assert_eq!(frame.header("subscription"), Some("sub-1"));
        assert_eq!(frame.body, "2");
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let frames = decode("MESSAGE\ncontent-length:3\n\na\0b\0").unwrap();
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn content_length_counts_bytes() {
        let body = "\"Zoë\"";
        let raw = format!("MESSAGE\ncontent-length:{}\n\n{body}\0", body.len());
        let frames = decode(&raw).unwrap();
        assert_eq!(frames[0].body, body);
    }

    #[test]
    fn heartbeats_and_crlf_are_tolerated() {
        let raw = "\n\r\nCONNECTED\r\nversion:1.2\r\n\r\n\0\n\nRECEIPT\nreceipt-id:7\n\n\0\n";
        let frames = decode(raw).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Connected);
        assert_eq!(frames[0].header("version"), Some("1.2"));
        assert_eq!(frames[1].command, Command::Receipt);
        assert_eq!(frames[1].header("receipt-id"), Some("7"));
    }

    #[test]
    fn heartbeat_only_message_is_empty() {
        assert!(decode("\n").unwrap().is_empty());
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn repeated_header_first_wins() {
        let frames = decode("MESSAGE\nfoo:first\nfoo:second\n\n\0").unwrap();
        assert_eq!(frames[0].header("foo"), Some("first"));
    }

    #[test]
    fn rejects_unknown_command() {
        let err = decode("HELLO\n\n\0").unwrap_err();
        assert!(matches!(err, SessionError::Frame(_)));
    }

    #[test]
    fn rejects_missing_terminator() {
        assert!(matches!(
            decode("MESSAGE\ndestination:/x\n\nbody").unwrap_err(),
            SessionError::Frame(_)
        ));
        assert!(matches!(
            decode("MESSAGE\ncontent-length:2\n\nabc\0").unwrap_err(),
            SessionError::Frame(_)
        ));
        assert!(matches!(
            decode("MESSAGE\ncontent-length:9\n\nabc\0").unwrap_err(),
            SessionError::Frame(_)
        ));
    }

    #[test]
    fn rejects_bad_header_lines() {
        assert!(decode("MESSAGE\nno-colon\n\n\0").is_err());
        assert!(decode("MESSAGE\nbad:\\t\n\n\0").is_err());
        assert!(decode("MESSAGE\ncontent-length:x\n\n\0").is_err());
    }

    #[test]
    fn command_names_round_trip() {
        for command in [
            Command::Connect,
            Command::Send,
            Command::Subscribe,
            Command::Unsubscribe,
            Command::Disconnect,
            Command::Connected,
            Command::Message,
            Command::Receipt,
            Command::Error,
        ] {
            assert_eq!(Command::parse(command.as_str()), Some(command));
        }
    }
}
