//! The event loop: listeners, connections, per-connection idle timers,
//! and log-capture pipes all dispatch through one epoll readiness set.

pub mod connection;
pub mod logs;
pub mod matcher;
pub mod respond;

use std::collections::HashMap;
use std::io;
use std::net::TcpListener;
use std::os::unix::io::{AsRawFd, RawFd};

use anyhow::Context;
use libc::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::http::reader::{self, Parse};
use crate::http::transmitter::{Pump, Transmitter};
use crate::network::classify::{classify, Decision};
use crate::network::poll::Poller;
use crate::network::timer;
use respond::ResponseBuilder;

use connection::{Connection, Phase};
use logs::LogCapture;

const MAX_EVENTS: usize = 1024;
const WAIT_TIMEOUT_MS: i32 = 1000;
const IDLE_TIMEOUT_SECS: u64 = 20;

pub struct Server {
    poller: Poller,
    configs: Vec<Config>,
    listeners: HashMap<RawFd, ListenerEntry>,
    connections: HashMap<RawFd, Connection>,
    // timer fd -> the connection it guards
    timers: HashMap<RawFd, RawFd>,
    logs: Option<LogCapture>,
}

struct ListenerEntry {
    #[allow(dead_code)] // keeps the listening socket open
    listener: TcpListener,
    config_idx: usize,
}

impl Server {
    pub fn new(configs: Vec<Config>) -> anyhow::Result<Self> {
        Ok(Self {
            poller: Poller::new().context("failed to create the readiness set")?,
            configs,
            listeners: HashMap::new(),
            connections: HashMap::new(),
            timers: HashMap::new(),
            logs: None,
        })
    }

    /// Binds one listening socket per server block. Individual bind
    /// failures are reported and skipped; at least one must succeed.
    pub fn bind(&mut self) -> anyhow::Result<()> {
        for (idx, config) in self.configs.iter().enumerate() {
            let addr = format!("0.0.0.0:{}", config.port());
            let listener = match TcpListener::bind(&addr) {
                Ok(listener) => listener,
                Err(err) => {
                    error!("failed to bind {}: {}", addr, err);
                    continue;
                }
            };
            listener
                .set_nonblocking(true)
                .with_context(|| format!("failed to unblock listener on {}", addr))?;

            let fd = listener.as_raw_fd();
            self.poller
                .add(fd, EPOLLIN as u32)
                .with_context(|| format!("failed to register listener on {}", addr))?;
            self.listeners.insert(
                fd,
                ListenerEntry {
                    listener,
                    config_idx: idx,
                },
            );
            info!("listening on http://{}", addr);
        }

        if self.listeners.is_empty() {
            anyhow::bail!("no ports could be bound");
        }
        Ok(())
    }

    /// Redirects stdout/stderr into pipes drained by this loop, so
    /// everything logged ends up under ./logs/.
    pub fn install_log_capture(&mut self) -> io::Result<()> {
        let capture = LogCapture::install()?;
        self.poller.add(capture.stdout_fd(), EPOLLIN as u32)?;
        self.poller.add(capture.stderr_fd(), EPOLLIN as u32)?;
        self.logs = Some(capture);
        Ok(())
    }

    /// Runs until a process-fatal error. Every dispatch decision keys off
    /// which table the ready fd belongs to.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
        info!("event loop started");

        loop {
            let n = match self.poller.wait(&mut events, WAIT_TIMEOUT_MS) {
                Ok(n) => n,
                Err(err) => match classify(&err) {
                    Decision::Transient => continue,
                    _ => {
                        self.shutdown();
                        return Err(err);
                    }
                },
            };

            for event in events.iter().take(n) {
                let fd = event.u64 as RawFd;
                let flags = event.events;

                let fatal = if self.listeners.contains_key(&fd) {
                    self.accept_connection(fd)
                } else if self.logs.as_ref().map_or(false, |logs| logs.owns(fd)) {
                    if let Some(logs) = self.logs.as_mut() {
                        logs.drain(fd);
                    }
                    false
                } else if self.timers.contains_key(&fd) {
                    self.handle_timer(fd)
                } else {
                    self.handle_client_event(fd, flags)
                };

                if fatal {
                    self.shutdown();
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        "process-fatal I/O error",
                    ));
                }
            }
        }
    }

    /// Closes every tracked descriptor. Terminal; the loop does not
    /// continue past this.
    fn shutdown(&mut self) {
        let fds: Vec<RawFd> = self.connections.keys().copied().collect();
        for fd in fds {
            self.close_connection(fd);
        }
        self.listeners.clear();
        error!("server shut down after fatal error");
    }

    fn accept_connection(&mut self, listener_fd: RawFd) -> bool {
        let config_idx = match self.listeners.get(&listener_fd) {
            Some(entry) => entry.config_idx,
            None => return false,
        };

        let client_fd =
            unsafe { libc::accept(listener_fd, std::ptr::null_mut(), std::ptr::null_mut()) };
        if client_fd < 0 {
            let err = io::Error::last_os_error();
            return match classify(&err) {
                Decision::ProcessFatal => true,
                _ => false,
            };
        }

        unsafe {
            let flags = libc::fcntl(client_fd, libc::F_GETFL, 0);
            libc::fcntl(client_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }

        let timer_fd = match timer::arm_idle_timer(IDLE_TIMEOUT_SECS) {
            Ok(fd) => fd,
            Err(err) => {
                warn!("failed to arm idle timer: {}", err);
                unsafe {
                    libc::close(client_fd);
                }
                return matches!(classify(&err), Decision::ProcessFatal);
            }
        };

        if let Err(err) = self
            .poller
            .add(client_fd, EPOLLIN as u32)
            .and_then(|()| self.poller.add(timer_fd, EPOLLIN as u32))
        {
            warn!("failed to register connection: {}", err);
            unsafe {
                libc::close(client_fd);
                libc::close(timer_fd);
            }
            return matches!(classify(&err), Decision::ProcessFatal);
        }

        self.connections
            .insert(client_fd, Connection::new(client_fd, timer_fd, config_idx));
        self.timers.insert(timer_fd, client_fd);
        debug!("accepted connection on fd {}", client_fd);
        false
    }

    fn handle_client_event(&mut self, fd: RawFd, flags: u32) -> bool {
        if flags & ((EPOLLERR | EPOLLHUP) as u32) != 0 {
            debug!("connection on fd {} aborted", fd);
            self.close_connection(fd);
            return false;
        }
        let mut fatal = false;
        if flags & (EPOLLIN as u32) != 0 {
            fatal |= self.read_from_client(fd);
        }
        if flags & (EPOLLOUT as u32) != 0 {
            self.write_to_client(fd);
        }
        fatal
    }

    /// Feeds newly readable bytes into the request parser and flips the
    /// connection to the write side once a response can be produced.
    fn read_from_client(&mut self, fd: RawFd) -> bool {
        let mut peer_closed = false;
        let mut drop_connection = false;
        {
            let conn = match self.connections.get_mut(&fd) {
                Some(conn) => conn,
                None => return false,
            };
            if !conn.is_reading() {
                // Late readable event after the flip to writing.
                return false;
            }

            let mut buf = [0u8; 4096];
            loop {
                let n = unsafe {
                    libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
                };
                if n > 0 {
                    conn.inbuf.extend_from_slice(&buf[..n as usize]);
                } else if n == 0 {
                    peer_closed = true;
                    break;
                } else {
                    let err = io::Error::last_os_error();
                    match classify(&err) {
                        Decision::Transient => break,
                        Decision::ConnectionFatal => {
                            warn!("read failed on fd {}: {}", fd, err);
                            drop_connection = true;
                            break;
                        }
                        Decision::ProcessFatal => return true,
                    }
                }
            }
        }
        if drop_connection {
            self.close_connection(fd);
            return false;
        }

        let (config_idx, parse) = {
            let conn = match self.connections.get(&fd) {
                Some(conn) => conn,
                None => return false,
            };
            let max = self.configs[conn.config_idx].client_max_body_size();
            (conn.config_idx, reader::try_parse(&conn.inbuf, max))
        };

        match parse {
            Parse::NeedMore => {
                if peer_closed {
                    debug!("peer closed fd {} before completing a request", fd);
                    self.close_connection(fd);
                    return false;
                }
                if let Some(conn) = self.connections.get_mut(&fd) {
                    if conn.inbuf.windows(4).any(|w| w == b"\r\n\r\n") {
                        conn.phase = Phase::ReadingBody;
                    }
                }
                false
            }
            Parse::Complete { request, .. } => {
                info!("{} {}", request.method, request.target);
                let response = ResponseBuilder::new(&self.configs[config_idx]).respond(&request);
                self.start_response(fd, response)
            }
            Parse::Failed(err) => {
                warn!("rejecting request on fd {}: {}", fd, err);
                let response = ResponseBuilder::new(&self.configs[config_idx]).error(err.status());
                self.start_response(fd, response)
            }
        }
    }

    fn write_to_client(&mut self, fd: RawFd) {
        let pump = {
            let conn = match self.connections.get_mut(&fd) {
                Some(conn) => conn,
                None => return,
            };
            match conn.transmitter.as_mut() {
                Some(transmitter) => transmitter.pump(fd),
                None => {
                    conn.phase = Phase::Closing;
                    Pump::Aborted
                }
            }
        };

        match pump {
            Pump::Blocked => {}
            Pump::Done => {
                debug!("response sent on fd {}", fd);
                self.close_connection(fd);
            }
            Pump::Aborted => {
                self.close_connection(fd);
            }
        }
    }

    /// The idle timer fired. A connection still reading turns into a 408
    /// drained through the normal write path; a connection already
    /// writing is left alone.
    fn handle_timer(&mut self, timer_fd: RawFd) -> bool {
        timer::acknowledge(timer_fd);
        let conn_fd = match self.timers.get(&timer_fd) {
            Some(&fd) => fd,
            None => return false,
        };
        let (reading, config_idx) = match self.connections.get(&conn_fd) {
            Some(conn) => (conn.is_reading(), conn.config_idx),
            None => return false,
        };
        if !reading {
            return false;
        }

        info!("idle timeout on fd {}", conn_fd);
        let response = ResponseBuilder::new(&self.configs[config_idx]).error(408);
        self.start_response(conn_fd, response)
    }

    /// Installs the transmitter and rewrites the fd's registration from
    /// read to write intent.
    fn start_response(&mut self, fd: RawFd, response: crate::http::response::Response) -> bool {
        let timer_fd = match self.connections.get_mut(&fd) {
            Some(conn) => {
                conn.phase = Phase::Writing;
                conn.transmitter = Some(Transmitter::new(response));
                conn.timer_fd
            }
            None => return false,
        };
        let _ = timer::disarm(timer_fd);

        if let Err(err) = self.poller.modify(fd, EPOLLOUT as u32) {
            warn!("failed to arm write readiness on fd {}: {}", fd, err);
            let fatal = matches!(classify(&err), Decision::ProcessFatal);
            self.close_connection(fd);
            return fatal;
        }
        false
    }

    /// Removes the connection and releases its socket and timer together.
    fn close_connection(&mut self, fd: RawFd) {
        if let Some(conn) = self.connections.remove(&fd) {
            self.timers.remove(&conn.timer_fd);
            let _ = self.poller.delete(fd);
            let _ = self.poller.delete(conn.timer_fd);
            unsafe {
                libc::close(fd);
                libc::close(conn.timer_fd);
            }
        }
    }
}
