use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

use mio::unix::pipe::{self, Receiver};

const LOG_DIR: &str = "logs";
const STDOUT_LOG: &str = "logs/log.log";
const STDERR_LOG: &str = "logs/error.log";

/// Captures the process's own stdout and stderr through non-blocking
/// pipes whose read ends are drained by the event loop into the log
/// files. Everything printed after `install` lands in `logs/`.
pub struct LogCapture {
    stdout_rx: Receiver,
    stderr_rx: Receiver,
}

impl LogCapture {
    pub fn install() -> io::Result<Self> {
        fs::create_dir_all(LOG_DIR)?;

        let (stdout_tx, stdout_rx) = pipe::new()?;
        let (stderr_tx, stderr_rx) = pipe::new()?;
        redirect(stdout_tx.into_raw_fd(), libc::STDOUT_FILENO)?;
        redirect(stderr_tx.into_raw_fd(), libc::STDERR_FILENO)?;

        Ok(Self {
            stdout_rx,
            stderr_rx,
        })
    }

    pub fn stdout_fd(&self) -> RawFd {
        self.stdout_rx.as_raw_fd()
    }

    pub fn stderr_fd(&self) -> RawFd {
        self.stderr_rx.as_raw_fd()
    }

    pub fn owns(&self, fd: RawFd) -> bool {
        fd == self.stdout_fd() || fd == self.stderr_fd()
    }

    /// Moves everything buffered in the pipe into its log file.
    pub fn drain(&mut self, fd: RawFd) {
        let (rx, path) = if fd == self.stdout_fd() {
            (&mut self.stdout_rx, STDOUT_LOG)
        } else {
            (&mut self.stderr_rx, STDERR_LOG)
        };

        let mut captured = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match rx.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => captured.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        if captured.is_empty() {
            return;
        }

        // Log-file write failures cannot be reported anywhere useful:
        // both standard streams point back into these pipes.
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = file.write_all(&captured);
        }
    }
}

fn redirect(pipe_fd: RawFd, stream_fd: RawFd) -> io::Result<()> {
    let res = unsafe { libc::dup2(pipe_fd, stream_fd) };
    let err = io::Error::last_os_error();
    unsafe {
        libc::close(pipe_fd);
    }
    if res < 0 {
        return Err(err);
    }
    Ok(())
}
