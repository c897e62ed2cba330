use std::fs::File;

/// Reason phrase for a status code. Codes outside the table fall back to
/// the 500 phrase so a response head can always be emitted.
pub fn status_text(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        411 => "Length Required",
        413 => "Content Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Internal Server Error",
    }
}

/// Content type from the file extension. Unknown extensions are served
/// as opaque binary.
pub fn mime_type(path: &str) -> &'static str {
    let ext = match path.rfind('.') {
        Some(dot) => &path[dot..],
        None => return "application/octet-stream",
    };
    match ext {
        ".html" => "text/html",
        ".css" => "text/css",
        ".js" => "application/javascript",
        ".json" => "application/json",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".svg" => "image/svg+xml",
        ".txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// An assembled response, tagged by kind. The transmitter matches on the
/// tag to decide framing; only static files can be streamed chunked.
#[derive(Debug)]
pub enum Response {
    StaticFile {
        file: File,
        content_type: &'static str,
        size: u64,
        chunked: bool,
    },
    Directory {
        html: String,
    },
    Redirect {
        code: u16,
        location: String,
    },
    Canned {
        code: u16,
        body: Vec<u8>,
    },
    ErrorPage {
        code: u16,
        body: Vec<u8>,
    },
    CgiOutput {
        bytes: Vec<u8>,
    },
}

impl Response {
    pub fn code(&self) -> u16 {
        match self {
            Response::StaticFile { .. } => 200,
            Response::Directory { .. } => 200,
            Response::Redirect { code, .. } => *code,
            Response::Canned { code, .. } => *code,
            Response::ErrorPage { code, .. } => *code,
            Response::CgiOutput { .. } => 200,
        }
    }

    /// Serializes the status line and headers, terminated by the blank
    /// line. Every reply closes the connection.
    pub fn head(&self) -> Vec<u8> {
        let code = self.code();
        let mut head = format!("HTTP/1.1 {} {}\r\nConnection: close\r\n", code, status_text(code));

        match self {
            Response::StaticFile {
                content_type,
                size,
                chunked,
                ..
            } => {
                head.push_str(&format!("Content-Type: {}\r\n", content_type));
                if *chunked {
                    head.push_str("Transfer-Encoding: chunked\r\n");
                } else {
                    head.push_str(&format!("Content-Length: {}\r\n", size));
                }
            }
            Response::Directory { html } => {
                head.push_str("Content-Type: text/html\r\n");
                head.push_str(&format!("Content-Length: {}\r\n", html.len()));
            }
            Response::Redirect { location, .. } => {
                head.push_str("Content-Type: text/html\r\n");
                head.push_str(&format!("Location: {}\r\n", location));
                head.push_str("Content-Length: 0\r\n");
            }
            Response::Canned { body, .. } => {
                head.push_str("Content-Type: text/html\r\n");
                head.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
            Response::ErrorPage { body, .. } => {
                head.push_str("Content-Type: text/html\r\n");
                head.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
            Response::CgiOutput { bytes } => {
                head.push_str("Content-Type: text/html\r\n");
                head.push_str(&format!("Content-Length: {}\r\n", bytes.len()));
            }
        }

        head.push_str("\r\n");
        head.into_bytes()
    }
}
