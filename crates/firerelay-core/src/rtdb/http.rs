//! Minimal HTTP/1.1 framing for one-request-per-connection exchanges.

use alloc::{string::String, vec::Vec};
use core::fmt::Write;

pub const USER_AGENT: &str = "firerelay/0.1";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Serialises a request with `Connection: close` so the response ends at EOF.
pub fn encode_request(method: Method, host: &str, target: &str, json_body: Option<&str>) -> Vec<u8> {
    let mut head = String::new();
    let _ = write!(
        head,
        "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: application/json\r\nConnection: close\r\n",
        method.as_str(),
        target,
        host,
        USER_AGENT
    );
    if let Some(body) = json_body {
        let _ = write!(
            head,
            "Content-Type: application/json\r\nContent-Length: {}\r\n",
            body.len()
        );
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    if let Some(body) = json_body {
        out.extend_from_slice(body.as_bytes());
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpError {
    Truncated,
    BadStatusLine,
    BadChunk,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn body_text(&self) -> &str {
        core::str::from_utf8(&self.body).unwrap_or("")
    }
}

/// Parses a complete response read until the peer closed the connection.
pub fn parse_response(raw: &[u8]) -> Result<HttpResponse, HttpError> {
    let header_end = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or(HttpError::Truncated)?;
    let head = core::str::from_utf8(&raw[..header_end]).map_err(|_| HttpError::BadStatusLine)?;
    let body = &raw[header_end + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or("");
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::BadStatusLine);
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(HttpError::BadStatusLine)?;

    let mut chunked = false;
    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value.eq_ignore_ascii_case("chunked");
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().ok();
        }
    }

    let body = if chunked {
        decode_chunked(body)?
    } else if let Some(len) = content_length {
        if body.len() < len {
            return Err(HttpError::Truncated);
        }
        body[..len].to_vec()
    } else {
        body.to_vec()
    };

    Ok(HttpResponse { status, body })
}

fn decode_chunked(mut input: &[u8]) -> Result<Vec<u8>, HttpError> {
    let mut out = Vec::new();
    loop {
        let line_end = input
            .windows(2)
            .position(|window| window == b"\r\n")
            .ok_or(HttpError::Truncated)?;
        let size_line = core::str::from_utf8(&input[..line_end]).map_err(|_| HttpError::BadChunk)?;
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16).map_err(|_| HttpError::BadChunk)?;
        input = &input[line_end + 2..];

        if size == 0 {
            return Ok(out);
        }
        let end = size.checked_add(2).ok_or(HttpError::BadChunk)?;
        let Some(chunk) = input.get(..end) else {
            return Err(HttpError::Truncated);
        };
        let (data, terminator) = chunk.split_at(size);
        if terminator != b"\r\n" {
            return Err(HttpError::BadChunk);
        }
        out.extend_from_slice(data);
        input = &input[end..];
    }
}
