use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use mio::unix::pipe;
use tracing::warn;

use crate::config::Config;
use crate::http::request::Request;

pub const CGI_TIMEOUT: Duration = Duration::from_secs(20);
const REAP_INTERVAL: Duration = Duration::from_millis(100);

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgiStatus {
    Success(i32),
    KilledBySignal,
    Timeout,
    Error,
}

#[derive(Debug)]
pub struct CgiOutcome {
    pub stdout: Vec<u8>,
    pub status: CgiStatus,
}

/// Runs `interpreter script` with the request body on stdin and collects
/// the child's stdout to EOF. The child is watched at ~100 ms intervals
/// and killed at the deadline; it is always reaped, whatever happens.
pub fn execute(
    interpreter: &str,
    script: &Path,
    body: &[u8],
    env: HashMap<String, String>,
) -> io::Result<CgiOutcome> {
    execute_with_deadline(interpreter, script, body, env, CGI_TIMEOUT)
}

pub fn execute_with_deadline(
    interpreter: &str,
    script: &Path,
    body: &[u8],
    env: HashMap<String, String>,
    timeout: Duration,
) -> io::Result<CgiOutcome> {
    let deadline = Instant::now() + timeout;

    // The child writes into a non-blocking pipe so the watchdog can run
    // between reads.
    let (sender, mut receiver) = pipe::new()?;
    let sender = unsafe { OwnedFd::from_raw_fd(sender.into_raw_fd()) };

    let mut child = Command::new(interpreter)
        .arg(script)
        .env_clear()
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(sender))
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        if !body.is_empty() {
            // write_all loops over partial writes.
            if let Err(err) = stdin.write_all(body) {
                warn!("writing request body to cgi stdin failed: {}", err);
            }
        }
        // Dropping stdin closes the child's input.
    }

    let mut stdout = Vec::new();
    let mut buf = [0u8; 4096];
    let mut exited: Option<ExitStatus> = None;

    loop {
        match receiver.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => stdout.extend_from_slice(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if exited.is_some() {
                    // Child is gone but something still holds the pipe
                    // open; what we have is all we will get.
                    break;
                }
                match child.try_wait() {
                    Ok(Some(status)) => {
                        exited = Some(status);
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        kill_and_reap(&mut child);
                        return Err(err);
                    }
                }
                if Instant::now() >= deadline {
                    kill_and_reap(&mut child);
                    return Ok(CgiOutcome {
                        stdout,
                        status: CgiStatus::Timeout,
                    });
                }
                thread::sleep(REAP_INTERVAL);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                kill_and_reap(&mut child);
                return Err(err);
            }
        }
    }

    let status = match exited {
        Some(status) => status,
        None => loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        kill_and_reap(&mut child);
                        return Ok(CgiOutcome {
                            stdout,
                            status: CgiStatus::Timeout,
                        });
                    }
                    thread::sleep(REAP_INTERVAL);
                }
                Err(err) => {
                    kill_and_reap(&mut child);
                    return Err(err);
                }
            }
        },
    };

    let status = if let Some(code) = status.code() {
        CgiStatus::Success(code)
    } else if status.signal().is_some() {
        CgiStatus::KilledBySignal
    } else {
        CgiStatus::Error
    };
    Ok(CgiOutcome { stdout, status })
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// CGI/1.1 environment for one request.
pub fn build_env(request: &Request, config: &Config, script_path: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("GATEWAY_INTERFACE".into(), "CGI/1.1".into());
    env.insert("SERVER_PROTOCOL".into(), "HTTP/1.1".into());
    env.insert("SERVER_SOFTWARE".into(), "webserv/1.0".into());
    env.insert("SERVER_NAME".into(), config.server_name().to_string());
    env.insert("SERVER_PORT".into(), config.port().to_string());
    env.insert("REQUEST_METHOD".into(), request.method.to_string());
    env.insert("SCRIPT_NAME".into(), script_path.to_string());
    env.insert("PATH_INFO".into(), String::new());
    env.insert("PATH_TRANSLATED".into(), script_path.to_string());

    if let Some(query) = request.query() {
        if !query.is_empty() {
            env.insert("QUERY_STRING".into(), query.to_string());
        }
    }
    if !request.body.is_empty() {
        env.insert("CONTENT_LENGTH".into(), request.body.len().to_string());
    }
    if let Some(content_type) = request.header("content-type") {
        env.insert("CONTENT_TYPE".into(), content_type.to_string());
    }
    env
}
