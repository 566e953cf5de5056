//! # STOMP Frames
//!
//! Minimal STOMP 1.2 text codec, enough to CONNECT, SUBSCRIBE and read MESSAGE frames
//! carried in WebSocket text messages.
//!
//! A frame is `COMMAND\n(header:value\n)*\nbody\0`. One WebSocket message may carry several
//! frames and bare end-of-line heart-beats between them. Bodies are text; a NUL byte inside
//! a body is not supported.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame has no command line")]
    MissingCommand,
    #[error("Malformed header line '{0}'")]
    MalformedHeader(String),
    #[error("Invalid escape sequence in header '{0}'")]
    BadEscape(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Builder-style header append.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// First value of a header; repeated headers keep the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serializes the frame, NUL terminator included.
    pub fn encode(&self) -> String {
        // CONNECT and CONNECTED headers are never escaped
        let escape = !matches!(self.command.as_str(), "CONNECT" | "CONNECTED");
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
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

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
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
            _ => return Err(FrameError::BadEscape(raw.to_string())),
        }
    }
    Ok(out)
}

/// Splits a WebSocket payload into frames, skipping heart-beats.
pub fn parse_frames(payload: &str) -> Result<Vec<StompFrame>, FrameError> {
    payload
        .split('\0')
        .map(|chunk| chunk.trim_start_matches(['\r', '\n']))
        .filter(|chunk| !chunk.is_empty())
        .map(parse_frame)
        .collect()
}

fn parse_frame(chunk: &str) -> Result<StompFrame, FrameError> {
    let (head, body) = match chunk.find("\n\n") {
        Some(idx) => (&chunk[..idx], &chunk[idx + 2..]),
        None => match chunk.find("\r\n\r\n") {
            Some(idx) => (&chunk[..idx], &chunk[idx + 4..]),
            None => (chunk, ""),
        },
    };

    let mut lines = head.lines();
    let command = lines
        .next()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .ok_or(FrameError::MissingCommand)?;
    let escape = !matches!(command, "CONNECT" | "CONNECTED");

    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if escape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let mut frame = StompFrame {
        command: command.to_string(),
        headers,
        body: body.to_string(),
    };

    if let Some(len) = frame.get("content-length").and_then(|v| v.parse::<usize>().ok()) {
        if len < frame.body.len() && frame.body.is_char_boundary(len) {
            frame.body.truncate(len);
        }
    }
    Ok(frame)
}
