//! Configuration front end: lexer, parser, and validator for the
//! Nginx-subset format, producing immutable [`Config`] values.

pub mod lexer;
pub mod models;
pub mod parser;
pub mod validator;

use std::fs;
use std::path::Path;

use thiserror::Error;

pub use models::{CgiConfig, Config, Location, MatchType, ReturnDirective};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {err}")]
    Read {
        path: String,
        #[source]
        err: std::io::Error,
    },
    #[error("line {line}, column {col}: {msg}")]
    Syntax {
        msg: String,
        line: usize,
        col: usize,
    },
    #[error("invalid location regex {pattern:?}: {err}")]
    Regex {
        pattern: String,
        #[source]
        err: regex::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Parses and validates a configuration source in one step.
pub fn from_source(source: &str) -> Result<Vec<Config>, ConfigError> {
    let servers = parser::parse(source)?;
    validator::validate(&servers)?;
    Ok(servers)
}

/// Loads the configuration file the binary was started with.
pub fn load(path: &Path) -> Result<Vec<Config>, ConfigError> {
    let source = fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.display().to_string(),
        err,
    })?;
    from_source(&source)
}
