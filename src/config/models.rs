use std::collections::HashMap;

use regex::Regex;

use crate::http::request::Method;

/// How a location pattern is matched against a request path.
///
/// Precedence follows Nginx: exact first, then the longest prefix
/// (a preferential prefix suppresses the regex scan), then regexes in
/// configuration order, then the plain prefix winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Prefix,
    PreferentialPrefix,
    Regex,
    RegexCi,
}

/// A `return` directive attached to a location. Redirects and canned
/// responses short-circuit all filesystem access.
#[derive(Debug, Clone)]
pub enum ReturnDirective {
    None,
    Redirect { code: u16, url: String },
    Response { code: u16, body: Option<String> },
}

impl ReturnDirective {
    pub fn is_none(&self) -> bool {
        matches!(self, ReturnDirective::None)
    }
}

/// CGI bindings for a location: `extensions[i]` is executed by
/// `interpreters[i]`.
#[derive(Debug, Clone, Default)]
pub struct CgiConfig {
    pub(crate) interpreters: Vec<String>,
    pub(crate) extensions: Vec<String>,
}

impl CgiConfig {
    pub fn is_enabled(&self) -> bool {
        !self.interpreters.is_empty() && !self.extensions.is_empty()
    }

    pub fn handles_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }

    pub fn interpreter_for(&self, ext: &str) -> Option<&str> {
        self.extensions
            .iter()
            .position(|e| e == ext)
            .and_then(|i| self.interpreters.get(i))
            .map(String::as_str)
    }
}

/// One `location` block: a URL pattern bound to handling policy.
#[derive(Debug, Clone)]
pub struct Location {
    pub(crate) path: String,
    pub(crate) match_type: MatchType,
    pub(crate) root: Option<String>,
    pub(crate) index: Option<String>,
    pub(crate) allowed_methods: Vec<Method>,
    pub(crate) autoindex: bool,
    pub(crate) return_directive: ReturnDirective,
    pub(crate) cgi: CgiConfig,
    pub(crate) regex: Option<Regex>,
}

impl Location {
    pub(crate) fn new(path: String, match_type: MatchType) -> Self {
        Self {
            path,
            match_type,
            root: None,
            index: None,
            allowed_methods: vec![Method::Get],
            autoindex: false,
            return_directive: ReturnDirective::None,
            cgi: CgiConfig::default(),
            regex: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    /// Directory appended to the server root for this location.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn allowed_methods(&self) -> &[Method] {
        &self.allowed_methods
    }

    pub fn allows(&self, method: Method) -> bool {
        self.allowed_methods.contains(&method)
    }

    pub fn autoindex(&self) -> bool {
        self.autoindex
    }

    pub fn return_directive(&self) -> &ReturnDirective {
        &self.return_directive
    }

    pub fn cgi(&self) -> &CgiConfig {
        &self.cgi
    }

    /// Compiled pattern, present iff the match type is `Regex`/`RegexCi`.
    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }
}

/// Immutable configuration of one server block. Built by the parser,
/// checked by the validator, then only read by the core.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) port: u16,
    pub(crate) server_name: String,
    pub(crate) root: String,
    pub(crate) index: String,
    pub(crate) client_max_body_size: u64,
    pub(crate) error_pages: HashMap<u16, String>,
    pub(crate) locations: Vec<Location>,
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn client_max_body_size(&self) -> u64 {
        self.client_max_body_size
    }

    pub fn error_pages(&self) -> &HashMap<u16, String> {
        &self.error_pages
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }
}
