//! Request handlers that leave the main process: CGI execution.

pub mod cgi;
