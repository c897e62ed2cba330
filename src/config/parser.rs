use std::collections::HashMap;

use regex::RegexBuilder;

use super::lexer::{Lexer, Token, TokenKind};
use super::models::{Config, Location, MatchType, ReturnDirective};
use super::ConfigError;
use crate::http::request::Method;

const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];
const RESPONSE_CODES: [u16; 5] = [200, 400, 403, 404, 405];

/// Parses a whole configuration source into server blocks.
/// Regex location patterns are compiled here so a bad pattern surfaces
/// as a configuration error, not at request time.
pub fn parse(source: &str) -> Result<Vec<Config>, ConfigError> {
    let mut parser = Parser::new(source)?;
    parser.parse_all()
}

struct Parser {
    lexer: Lexer,
    current: Token,
}

impl Parser {
    fn new(source: &str) -> Result<Self, ConfigError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<Token, ConfigError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn syntax(&self, msg: impl Into<String>) -> ConfigError {
        ConfigError::Syntax {
            msg: msg.into(),
            line: self.current.line,
            col: self.current.col,
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ConfigError> {
        if self.current.kind != kind {
            return Err(self.syntax(format!("expected {}", what)));
        }
        self.advance()
    }

    fn expect_value(&mut self, what: &str) -> Result<String, ConfigError> {
        match self.current.kind {
            TokenKind::Ident | TokenKind::Str => Ok(self.advance()?.text),
            _ => Err(self.syntax(format!("expected {}", what))),
        }
    }

    fn expect_number(&mut self, what: &str) -> Result<u64, ConfigError> {
        let tok = self.expect_value(what)?;
        tok.parse::<u64>()
            .map_err(|_| self.syntax(format!("expected {}, got {:?}", what, tok)))
    }

    fn parse_all(&mut self) -> Result<Vec<Config>, ConfigError> {
        let mut servers = Vec::new();
        while self.current.kind != TokenKind::Eof {
            if self.current.kind != TokenKind::Ident || self.current.text != "server" {
                return Err(self.syntax("expected 'server' block"));
            }
            self.advance()?;
            servers.push(self.parse_server()?);
        }
        Ok(servers)
    }

    fn parse_server(&mut self) -> Result<Config, ConfigError> {
        self.expect(TokenKind::LBrace, "'{' after 'server'")?;

        let mut config = Config {
            port: 0,
            server_name: "localhost".into(),
            root: String::new(),
            index: "index.html".into(),
            client_max_body_size: 1024 * 1024,
            error_pages: HashMap::new(),
            locations: Vec::new(),
        };

        while self.current.kind != TokenKind::RBrace {
            if self.current.kind == TokenKind::Eof {
                return Err(self.syntax("unexpected end of file in server block"));
            }
            let directive = self.expect_value("directive name")?;
            match directive.as_str() {
                "location" => {
                    let location = self.parse_location()?;
                    config.locations.push(location);
                }
                "listen" => {
                    let port = self.expect_number("port number")?;
                    if port == 0 || port > 65535 {
                        return Err(self.syntax("port number out of range"));
                    }
                    config.port = port as u16;
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "server_name" => {
                    config.server_name = self.expect_value("server name")?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "root" => {
                    config.root = self.expect_value("root path")?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "index" => {
                    config.index = self.expect_value("index filename")?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "client_max_body_size" => {
                    config.client_max_body_size = self.expect_number("body size in bytes")?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "error_page" => {
                    let code = self.expect_number("status code")? as u16;
                    let page = self.expect_value("error page path")?;
                    config.error_pages.insert(code, page);
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                other => {
                    return Err(self.syntax(format!("unknown server directive {:?}", other)))
                }
            }
        }
        self.advance()?;
        Ok(config)
    }

    fn parse_location(&mut self) -> Result<Location, ConfigError> {
        let first = self.expect_value("location pattern")?;
        let (match_type, path) = match first.as_str() {
            "=" => (MatchType::Exact, self.expect_value("location pattern")?),
            "^~" => (
                MatchType::PreferentialPrefix,
                self.expect_value("location pattern")?,
            ),
            "~" => (MatchType::Regex, self.expect_value("location pattern")?),
            "~*" => (MatchType::RegexCi, self.expect_value("location pattern")?),
            _ => (MatchType::Prefix, first),
        };

        let mut location = Location::new(path, match_type);
        if matches!(match_type, MatchType::Regex | MatchType::RegexCi) {
            let regex = RegexBuilder::new(&location.path)
                .case_insensitive(match_type == MatchType::RegexCi)
                .build()
                .map_err(|err| ConfigError::Regex {
                    pattern: location.path.clone(),
                    err,
                })?;
            location.regex = Some(regex);
        }

        self.expect(TokenKind::LBrace, "'{' after location pattern")?;
        while self.current.kind != TokenKind::RBrace {
            if self.current.kind == TokenKind::Eof {
                return Err(self.syntax("unexpected end of file in location block"));
            }
            let directive = self.expect_value("directive name")?;
            match directive.as_str() {
                "root" => {
                    location.root = Some(self.expect_value("root path")?);
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "index" => {
                    location.index = Some(self.expect_value("index filename")?);
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "allow_methods" => {
                    let mut methods = Vec::new();
                    while self.current.kind != TokenKind::Semicolon {
                        let name = self.expect_value("method name")?;
                        let method = Method::from_str(&name)
                            .ok_or_else(|| self.syntax(format!("unknown method {:?}", name)))?;
                        methods.push(method);
                    }
                    if methods.is_empty() {
                        return Err(self.syntax("allow_methods needs at least one method"));
                    }
                    location.allowed_methods = methods;
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "autoindex" => {
                    let value = self.expect_value("'on' or 'off'")?;
                    location.autoindex = match value.as_str() {
                        "on" => true,
                        "off" => false,
                        _ => return Err(self.syntax("autoindex expects 'on' or 'off'")),
                    };
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "return" => {
                    let code = self.expect_number("status code")? as u16;
                    let mut arg = None;
                    if self.current.kind != TokenKind::Semicolon {
                        arg = Some(self.expect_value("return url or body")?);
                    }
                    location.return_directive = if REDIRECT_CODES.contains(&code) {
                        let url = arg
                            .ok_or_else(|| self.syntax("redirect return needs a target url"))?;
                        ReturnDirective::Redirect { code, url }
                    } else if RESPONSE_CODES.contains(&code) {
                        ReturnDirective::Response { code, body: arg }
                    } else {
                        return Err(self.syntax(format!("invalid return code {}", code)));
                    };
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "cgi_path" => {
                    let mut interpreters = Vec::new();
                    while self.current.kind != TokenKind::Semicolon {
                        interpreters.push(self.expect_value("interpreter path")?);
                    }
                    location.cgi.interpreters = interpreters;
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                "cgi_ext" => {
                    let mut extensions = Vec::new();
                    while self.current.kind != TokenKind::Semicolon {
                        extensions.push(self.expect_value("cgi extension")?);
                    }
                    location.cgi.extensions = extensions;
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                other => {
                    return Err(self.syntax(format!("unknown location directive {:?}", other)))
                }
            }
        }
        self.advance()?;
        Ok(location)
    }
}
