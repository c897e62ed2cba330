use std::fs::File;
use std::io::Read;
use std::os::fd::RawFd;

use tracing::warn;

use super::response::Response;

// Body staging buffer; the wire never sees more than this per refill.
const SEND_BUFFER: usize = 64 * 1024;

const CHUNK_TERMINATOR: &[u8] = b"0\r\n\r\n";

/// Progress report from one pump over a writable socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    /// The socket buffer is full; write readiness stays armed.
    Blocked,
    /// The whole response has been transmitted.
    Done,
    /// The peer is gone; no further response attempts.
    Aborted,
}

enum Source {
    Drained,
    File { file: File, chunked: bool },
}

/// Streams one response to a connection, tolerating partial writes.
/// In-memory bodies are staged up front; file bodies are refilled in
/// bounded slices, framed as chunks when the reply is chunked.
pub struct Transmitter {
    pending: Vec<u8>,
    cursor: usize,
    source: Source,
}

impl Transmitter {
    pub fn new(response: Response) -> Self {
        let mut pending = response.head();
        let source = match response {
            Response::StaticFile { file, chunked, .. } => Source::File { file, chunked },
            Response::Directory { html } => {
                pending.extend_from_slice(html.as_bytes());
                Source::Drained
            }
            Response::Redirect { .. } => Source::Drained,
            Response::Canned { body, .. } | Response::ErrorPage { body, .. } => {
                pending.extend_from_slice(&body);
                Source::Drained
            }
            Response::CgiOutput { bytes } => {
                pending.extend_from_slice(&bytes);
                Source::Drained
            }
        };
        Self {
            pending,
            cursor: 0,
            source,
        }
    }

    /// Sends as much as the socket accepts right now.
    pub fn pump(&mut self, fd: RawFd) -> Pump {
        loop {
            if self.cursor == self.pending.len() {
                self.pending.clear();
                self.cursor = 0;
                match self.refill() {
                    Ok(false) => return Pump::Done,
                    Ok(true) => {}
                    Err(err) => {
                        warn!("body stream failed mid-response: {}", err);
                        return Pump::Aborted;
                    }
                }
            }

            let remaining = &self.pending[self.cursor..];
            let n = unsafe {
                libc::send(
                    fd,
                    remaining.as_ptr() as *const libc::c_void,
                    remaining.len(),
                    libc::MSG_NOSIGNAL,
                )
            };
            if n > 0 {
                self.cursor += n as usize;
                continue;
            }
            let err = std::io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) => Pump::Blocked,
                Some(libc::EINTR) => continue,
                Some(libc::EPIPE) | Some(libc::ECONNRESET) => Pump::Aborted,
                _ => {
                    warn!("send failed: {}", err);
                    Pump::Aborted
                }
            };
        }
    }

    /// Stages the next slice of the body. Returns false once the source
    /// is fully drained.
    fn refill(&mut self) -> std::io::Result<bool> {
        let (file, chunked) = match &mut self.source {
            Source::Drained => return Ok(false),
            Source::File { file, chunked } => (file, *chunked),
        };

        let mut buf = vec![0u8; SEND_BUFFER];
        let n = file.read(&mut buf)?;
        if n == 0 {
            self.source = Source::Drained;
            if chunked {
                self.pending.extend_from_slice(CHUNK_TERMINATOR);
                return Ok(true);
            }
            return Ok(false);
        }

        if chunked {
            self.pending = chunk_frame(&buf[..n]);
        } else {
            buf.truncate(n);
            self.pending = buf;
        }
        Ok(true)
    }
}

fn chunk_frame(data: &[u8]) -> Vec<u8> {
    let mut frame = format!("{:x}\r\n", data.len()).into_bytes();
    frame.extend_from_slice(data);
    frame.extend_from_slice(b"\r\n");
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_a_chunk_with_hex_size() {
        assert_eq!(chunk_frame(b"hello"), b"5\r\nhello\r\n");
    }

    #[test]
    fn frames_sizes_above_fifteen_in_hex() {
        let data = [0u8; 26];
        let frame = chunk_frame(&data);
        assert!(frame.starts_with(b"1a\r\n"));
        assert!(frame.ends_with(b"\r\n"));
        assert_eq!(frame.len(), 4 + 26 + 2);
    }

    #[test]
    fn terminator_is_a_zero_chunk() {
        assert_eq!(CHUNK_TERMINATOR, b"0\r\n\r\n");
    }
}
