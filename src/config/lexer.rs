use super::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Str,
    LBrace,
    RBrace,
    Semicolon,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub col: usize,
}

/// Hand-rolled tokenizer for the Nginx-subset configuration format.
/// Identifiers are permissive so regex location patterns lex as one token.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '_' | '-' | '/' | '.' | '^' | '$' | '+' | '*' | '?' | '=' | '~' | ':'
                | '[' | ']' | '(' | ')' | '\\' | '|'
        )
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_noise(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind, text: String, line: usize, col: usize) -> Token {
        Token {
            kind,
            text,
            line,
            col,
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ConfigError> {
        self.skip_noise();
        let (line, col) = (self.line, self.col);

        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(self.token(TokenKind::Eof, String::new(), line, col)),
        };

        match c {
            '{' => {
                self.advance();
                Ok(self.token(TokenKind::LBrace, "{".into(), line, col))
            }
            '}' => {
                self.advance();
                Ok(self.token(TokenKind::RBrace, "}".into(), line, col))
            }
            ';' => {
                self.advance();
                Ok(self.token(TokenKind::Semicolon, ";".into(), line, col))
            }
            '"' => {
                self.advance();
                let mut text = String::new();
                loop {
                    match self.advance() {
                        Some('"') => break,
                        Some('\n') | None => {
                            return Err(ConfigError::Syntax {
                                msg: "unterminated string literal".into(),
                                line,
                                col,
                            })
                        }
                        Some(c) => text.push(c),
                    }
                }
                Ok(self.token(TokenKind::Str, text, line, col))
            }
            c if is_ident_char(c) => {
                let mut text = String::new();
                while let Some(c) = self.peek() {
                    if !is_ident_char(c) {
                        break;
                    }
                    text.push(c);
                    self.advance();
                }
                Ok(self.token(TokenKind::Ident, text, line, col))
            }
            other => Err(ConfigError::Syntax {
                msg: format!("unexpected character {:?}", other),
                line,
                col,
            }),
        }
    }
}
