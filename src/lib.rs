//! webserv - configurable non-blocking HTTP/1.1 origin server.
//!
//! Core library: configuration front end, HTTP parsing and response
//! assembly, the epoll-driven event loop, and the CGI executor.

pub mod config;
pub mod handlers;
pub mod http;
pub mod network;
pub mod server;
