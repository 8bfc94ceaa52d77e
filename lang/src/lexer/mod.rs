mod token;


pub use token::{Span, Token, TokenKind};

use std::str::Chars;

pub struct Lexer<'a> {
    source: &'a str,
    chars: Chars<'a>,
    position: usize,
    line: u32,
    column: u32,
    // Bracket nesting; newlines only terminate statements at depth 0
    depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lexical error at {}:{}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for LexError {}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars(),
            position: 0,
            line: 1,
            column: 1,
            depth: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let start_position = self.position;
        let start_line = self.line;
        let start_column = self.column;

        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '/' if self.peek_next() == Some('/') => {
                    self.skip_comment();
                    return self.next_token();
                }

                '\n' => self.single(TokenKind::Newline),

                '(' => self.single(TokenKind::LeftParen),
                ')' => self.single(TokenKind::RightParen),
                '[' => self.single(TokenKind::LeftBracket),
                ']' => self.single(TokenKind::RightBracket),
                '{' => self.single(TokenKind::LeftBrace),
                '}' => self.single(TokenKind::RightBrace),
                ',' => self.single(TokenKind::Comma),
                ':' => self.single(TokenKind::Colon),
                ';' => self.single(TokenKind::Semicolon),
                '?' => self.single(TokenKind::Question),
                '.' => self.single(TokenKind::Dot),

                '#' if self.peek_next() == Some('{') => self.double(TokenKind::HashBrace),

                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '%' => self.single(TokenKind::Percent),

                '=' if self.peek_next() == Some('=') => self.double(TokenKind::EqualEqual),
                '=' => self.single(TokenKind::Equal),

                '!' if self.peek_next() == Some('=') => self.double(TokenKind::BangEqual),
                '!' => self.single(TokenKind::Bang),

                '<' if self.peek_next() == Some('=') => self.double(TokenKind::LessEqual),
                '<' => self.single(TokenKind::Less),

                '>' if self.peek_next() == Some('=') => self.double(TokenKind::GreaterEqual),
                '>' => self.single(TokenKind::Greater),

                '&' if self.peek_next() == Some('&') => self.double(TokenKind::AmpAmp),
                '|' if self.peek_next() == Some('|') => self.double(TokenKind::PipePipe),

                '"' => self.string()?,
                '\'' => self.literal_string()?,

                c if c.is_ascii_digit() => self.number()?,

                c if self.is_identifier_start(c) => self.identifier_or_keyword(),

                c => {
                    return Err(LexError {
                        message: format!("Unexpected character: '{c}'"),
                        line: start_line,
                        column: start_column,
                    });
                }
            },
        };

        match kind {
            TokenKind::LeftParen
            | TokenKind::LeftBracket
            | TokenKind::LeftBrace
            | TokenKind::HashBrace => self.depth += 1,
            TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                self.depth = self.depth.saturating_sub(1)
            }
            _ => {}
        }

        let span = Span {
            start: start_position,
            end: self.position,
            line: start_line,
            column: start_column,
        };

        Ok(Token { kind, span })
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        self.advance();
        kind
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.chars.clone();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' && self.depth == 0 {
                break;
            }
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        self.advance();
        self.advance();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn is_identifier_start(&self, c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let start = self.position;

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.position];

        match text {
            "let" => TokenKind::Let,
            "return" => TokenKind::Return,
            "nil" => TokenKind::Nil,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier(text.to_string()),
        }
    }

    fn number(&mut self) -> Result<TokenKind, LexError> {
        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;

        self.digits();

        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.digits();

            let text = &self.source[start..self.position];
            let cleaned: String = text.chars().filter(|&c| c != '_').collect();
            let value: f64 = cleaned.parse().map_err(|_| LexError {
                message: format!("Invalid decimal literal: {text}"),
                line: start_line,
                column: start_column,
            })?;

            Ok(TokenKind::Decimal(value))
        } else {
            let text = &self.source[start..self.position];
            let cleaned: String = text.chars().filter(|&c| c != '_').collect();
            let value = match cleaned.parse::<i64>() {
                Ok(value) => value,
                // The magnitude of i64::MIN; the parser only accepts it after a unary minus
                Err(_) if cleaned.parse::<u64>() == Ok(i64::MIN.unsigned_abs()) => i64::MIN,
                Err(_) => {
                    return Err(LexError {
                        message: format!("Invalid integer literal: {text}"),
                        line: start_line,
                        column: start_column,
                    });
                }
            };

            Ok(TokenKind::Integer(value))
        }
    }

    fn digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn string(&mut self) -> Result<TokenKind, LexError> {
        let start_line = self.line;
        let start_column = self.column;

        self.advance();

        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        message: "Unterminated string literal".to_string(),
                        line: start_line,
                        column: start_column,
                    });
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some(c) => {
                            return Err(LexError {
                                message: format!("Invalid escape sequence: \\{c}"),
                                line: self.line,
                                column: self.column,
                            });
                        }
                        None => {
                            return Err(LexError {
                                message: "Unterminated string literal".to_string(),
                                line: start_line,
                                column: start_column,
                            });
                        }
                    };
                    self.advance();
                    value.push(escaped);
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        Ok(TokenKind::String(value))
    }

    /// Single-quoted strings take their content verbatim; `''` stands for one quote.
    fn literal_string(&mut self) -> Result<TokenKind, LexError> {
        let start_line = self.line;
        let start_column = self.column;

        self.advance();

        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        message: "Unterminated string literal".to_string(),
                        line: start_line,
                        column: start_column,
                    });
                }
                Some('\'') if self.peek_next() == Some('\'') => {
                    self.advance();
                    self.advance();
                    value.push('\'');
                }
                Some('\'') => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        Ok(TokenKind::String(value))
    }
}
