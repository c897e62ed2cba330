use std::collections::HashSet;

use super::models::{Config, MatchType};
use super::ConfigError;

const MAX_BODY_SIZE: u64 = 1024 * 1024 * 1024;

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Semantic checks over parsed server blocks. Everything here fails the
/// whole startup; the core never sees a half-valid configuration.
pub fn validate(servers: &[Config]) -> Result<(), ConfigError> {
    if servers.is_empty() {
        return Err(invalid("no server blocks found"));
    }

    let mut used_ports = HashSet::new();
    for server in servers {
        validate_server(server)?;
        if !used_ports.insert(server.port) {
            return Err(invalid(format!("duplicate listen port {}", server.port)));
        }
    }
    Ok(())
}

fn validate_server(server: &Config) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(invalid("server block is missing a 'listen' directive"));
    }
    if server.root.is_empty() {
        return Err(invalid(format!(
            "server on port {} is missing a 'root' directive",
            server.port
        )));
    }
    if !server.root.starts_with('/') {
        return Err(invalid(format!(
            "server root must be an absolute path: {:?}",
            server.root
        )));
    }
    if server.client_max_body_size == 0 || server.client_max_body_size > MAX_BODY_SIZE {
        return Err(invalid(format!(
            "client_max_body_size out of range: {}",
            server.client_max_body_size
        )));
    }
    for (&code, page) in &server.error_pages {
        if !(400..=599).contains(&code) {
            return Err(invalid(format!("error_page code out of range: {}", code)));
        }
        if page.is_empty() {
            return Err(invalid(format!("error_page {} has an empty path", code)));
        }
    }
    for location in &server.locations {
        if location.path.is_empty() {
            return Err(invalid("location with an empty pattern"));
        }
        let is_regex = matches!(
            location.match_type,
            MatchType::Regex | MatchType::RegexCi
        );
        if !is_regex && !location.path.starts_with('/') {
            return Err(invalid(format!(
                "location pattern must start with '/': {:?}",
                location.path
            )));
        }
        let cgi = &location.cgi;
        if cgi.interpreters.len() != cgi.extensions.len() {
            return Err(invalid(format!(
                "location {:?}: cgi_path and cgi_ext must have the same length",
                location.path
            )));
        }
        for ext in &cgi.extensions {
            if !ext.starts_with('.') {
                return Err(invalid(format!(
                    "cgi_ext entries must start with '.': {:?}",
                    ext
                )));
            }
        }
    }
    Ok(())
}
