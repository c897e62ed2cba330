use std::collections::HashMap;

use thiserror::Error;

use super::request::{Method, Request};

/// Result of offering the bytes buffered so far to the request parser.
/// The buffer is re-examined from the start on every feed, so partial
/// arrivals (down to one byte at a time) cost nothing but a rescan.
#[derive(Debug)]
pub enum Parse {
    NeedMore,
    Complete { request: Request, consumed: usize },
    Failed(ReadError),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error("malformed request")]
    BadRequest,
    #[error("unsupported HTTP version")]
    BadVersion,
    #[error("request body exceeds the configured limit")]
    BodyTooLarge,
}

impl ReadError {
    pub fn status(&self) -> u16 {
        match self {
            ReadError::BadRequest => 400,
            ReadError::BadVersion => 505,
            ReadError::BodyTooLarge => 413,
        }
    }
}

pub fn try_parse(buf: &[u8], max_body: u64) -> Parse {
    let header_end = match find_crlf2(buf, 0) {
        Some(pos) => pos,
        None => return Parse::NeedMore,
    };
    let body_start = header_end + 4;

    let header_str = match std::str::from_utf8(&buf[..header_end]) {
        Ok(s) => s,
        Err(_) => return Parse::Failed(ReadError::BadRequest),
    };
    let mut lines = header_str.split("\r\n");

    let request_line = match lines.next() {
        Some(line) => line,
        None => return Parse::Failed(ReadError::BadRequest),
    };
    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Parse::Failed(ReadError::BadRequest),
    };
    let method = match Method::from_str(method) {
        Some(m) => m,
        None => return Parse::Failed(ReadError::BadRequest),
    };
    if version != "HTTP/1.1" {
        return Parse::Failed(ReadError::BadVersion);
    }

    let mut headers: HashMap<String, String> = HashMap::new();
    let mut content_length_seen = 0usize;
    for line in lines {
        let (name, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => return Parse::Failed(ReadError::BadRequest),
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Parse::Failed(ReadError::BadRequest);
        }
        if name == "content-length" {
            content_length_seen += 1;
        }
        headers.insert(name, value.trim().to_string());
    }
    if content_length_seen > 1 {
        return Parse::Failed(ReadError::BadRequest);
    }

    let chunked = wants_chunked(&headers);
    let content_length = headers.get("content-length");
    if chunked && content_length.is_some() {
        // Ambiguous framing.
        return Parse::Failed(ReadError::BadRequest);
    }

    let (body, consumed) = if chunked {
        match decode_chunked(buf, body_start, max_body) {
            Ok(Some(done)) => done,
            Ok(None) => return Parse::NeedMore,
            Err(err) => return Parse::Failed(err),
        }
    } else if let Some(value) = content_length {
        let declared = match value.parse::<u64>() {
            Ok(n) => n,
            Err(_) => return Parse::Failed(ReadError::BadRequest),
        };
        if declared > max_body {
            // Rejected before any body byte is accepted.
            return Parse::Failed(ReadError::BodyTooLarge);
        }
        let declared = declared as usize;
        if buf.len() - body_start < declared {
            return Parse::NeedMore;
        }
        (
            buf[body_start..body_start + declared].to_vec(),
            body_start + declared,
        )
    } else {
        (Vec::new(), body_start)
    };

    Parse::Complete {
        request: Request {
            method,
            target: target.to_string(),
            version: version.to_string(),
            headers,
            body,
            chunked,
        },
        consumed,
    }
}

fn wants_chunked(headers: &HashMap<String, String>) -> bool {
    ["transfer-encoding", "te"].iter().any(|name| {
        headers
            .get(*name)
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    })
}

/// Decodes `hex-size CRLF data CRLF` frames until the zero-size chunk.
/// Trailer lines after the terminator are read and discarded. Returns
/// `Ok(None)` while the framing is still incomplete.
fn decode_chunked(
    buf: &[u8],
    body_start: usize,
    max_body: u64,
) -> Result<Option<(Vec<u8>, usize)>, ReadError> {
    let mut pos = body_start;
    let mut body = Vec::new();

    loop {
        let line_end = match find_crlf(buf, pos) {
            Some(p) => p,
            None => return Ok(None),
        };
        let size_line = std::str::from_utf8(&buf[pos..line_end])
            .map_err(|_| ReadError::BadRequest)?;
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size =
            u64::from_str_radix(size_hex, 16).map_err(|_| ReadError::BadRequest)? as usize;
        pos = line_end + 2;

        if size == 0 {
            loop {
                let trailer_end = match find_crlf(buf, pos) {
                    Some(p) => p,
                    None => return Ok(None),
                };
                let empty = trailer_end == pos;
                pos = trailer_end + 2;
                if empty {
                    return Ok(Some((body, pos)));
                }
            }
        }

        if (body.len() as u64).saturating_add(size as u64) > max_body {
            return Err(ReadError::BodyTooLarge);
        }
        if buf.len() < pos + size + 2 {
            return Ok(None);
        }
        if &buf[pos + size..pos + size + 2] != b"\r\n" {
            return Err(ReadError::BadRequest);
        }
        body.extend_from_slice(&buf[pos..pos + size]);
        pos += size + 2;
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    if from > buf.len() {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| p + from)
}

fn find_crlf2(buf: &[u8], from: usize) -> Option<usize> {
    if from > buf.len() {
        return None;
    }
    buf[from..]
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + from)
}
