pub mod ast;

#[cfg(test)]
mod tests;

pub use ast::*;

use crate::lexer::{Span, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at {}:{}: {}",
            self.span.line, self.span.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

// Precedence levels for Pratt parsing (higher = binds tighter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None = 0,
    Conditional = 1, // ?:
    Or = 2,          // ||
    And = 3,         // &&
    Equality = 4,    // == !=
    Comparison = 5,  // < <= > >=
    Sum = 6,         // + -
    Product = 7,     // * / %
    Prefix = 8,      // ! - (unary)
    Call = 9,        // ()
    Index = 10,      // [] .
}

const START_SPAN: Span = Span {
    start: 0,
    end: 0,
    line: 1,
    column: 1,
};

fn join(start: Span, end: Span) -> Span {
    Span {
        start: start.start,
        end: end.end,
        line: start.line,
        column: start.column,
    }
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse a whole unit body: statements separated by newlines or `;`
    pub fn parse_statements(&mut self) -> Result<Vec<SpannedStmt>, ParseError> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            if self.at_terminator() {
                self.advance();
                continue;
            }
            statements.push(self.parse_statement()?);
        }

        Ok(statements)
    }

    /// Parse a single expression without the comma operator
    pub fn parse_expression(&mut self) -> Result<SpannedExpr, ParseError> {
        self.parse_precedence(Precedence::None)
    }

    /// Parse a comma-separated run of expressions; a single operand is returned as-is
    pub fn parse_sequence(&mut self) -> Result<SpannedExpr, ParseError> {
        let first = self.parse_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }

        let start = first.span;
        let mut items = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            self.skip_newlines();
            items.push(self.parse_expression()?);
        }

        let end = items.last().map(|item| item.span).unwrap_or(start);
        Ok(Spanned::new(Expr::Sequence(items), join(start, end)))
    }

    fn parse_statement(&mut self) -> Result<SpannedStmt, ParseError> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| ParseError::new("Expected statement", START_SPAN))?;

        match &token.kind {
            TokenKind::Let => {
                self.advance();

                let name = match self.advance() {
                    Some(Token {
                        kind: TokenKind::Identifier(name),
                        ..
                    }) => name,
                    Some(other) => {
                        return Err(ParseError::new(
                            format!("Expected variable name after 'let', got {}", other.kind),
                            other.span,
                        ));
                    }
                    None => {
                        return Err(ParseError::new(
                            "Expected variable name after 'let'",
                            token.span,
                        ));
                    }
                };

                self.expect(TokenKind::Equal)?;
                self.skip_newlines();
                let value = self.parse_sequence()?;
                self.skip_terminator();

                let span = join(token.span, value.span);
                Ok(Spanned::new(Stmt::Let { name, value }, span))
            }
            TokenKind::Return => {
                self.advance();

                let value = if self.at_terminator() || self.is_at_end() {
                    Spanned::new(Expr::Nil, token.span)
                } else {
                    self.parse_sequence()?
                };
                self.skip_terminator();

                let span = join(token.span, value.span);
                Ok(Spanned::new(Stmt::Return(value), span))
            }
            _ => {
                let expr = self.parse_sequence()?;
                let span = expr.span;
                self.skip_terminator();
                Ok(Spanned::new(Stmt::Expr(expr), span))
            }
        }
    }

    fn parse_precedence(&mut self, min_precedence: Precedence) -> Result<SpannedExpr, ParseError> {
        let mut left = self.parse_prefix()?;

        while let Some(token) = self.peek() {
            let precedence = self.get_infix_precedence(&token.kind);
            if precedence <= min_precedence {
                break;
            }

            left = self.parse_infix(left, precedence)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<SpannedExpr, ParseError> {
        let token = self.peek().cloned().ok_or_else(|| {
            ParseError::new(
                "Unexpected end of input",
                self.tokens.last().map(|t| t.span).unwrap_or(START_SPAN),
            )
        })?;

        match token.kind {
            // Literals
            TokenKind::Integer(i64::MIN) => Err(ParseError::new(
                "Integer literal out of range",
                token.span,
            )),
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Spanned::new(Expr::Integer(n), token.span))
            }
            TokenKind::Decimal(n) => {
                self.advance();
                Ok(Spanned::new(Expr::Decimal(n), token.span))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Spanned::new(Expr::String(s), token.span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Spanned::new(Expr::Boolean(true), token.span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Spanned::new(Expr::Boolean(false), token.span))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Spanned::new(Expr::Nil, token.span))
            }

            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Spanned::new(Expr::Identifier(name), token.span))
            }

            // Prefix operators
            TokenKind::Minus | TokenKind::Bang => {
                self.advance();
                if token.kind == TokenKind::Minus
                    && let Some(Token {
                        kind: TokenKind::Integer(i64::MIN),
                        span,
                    }) = self.peek().cloned()
                {
                    self.advance();
                    return Ok(Spanned::new(
                        Expr::Integer(i64::MIN),
                        join(token.span, span),
                    ));
                }
                let op = if token.kind == TokenKind::Minus {
                    PrefixOp::Neg
                } else {
                    PrefixOp::Not
                };
                let right = self.parse_precedence(Precedence::Prefix)?;
                let span = join(token.span, right.span);
                Ok(Spanned::new(
                    Expr::Prefix {
                        op,
                        right: Box::new(right),
                    },
                    span,
                ))
            }

            // Grouped expression, may contain the comma operator
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_sequence()?;
                let end_token = self.expect(TokenKind::RightParen)?;
                Ok(Spanned::new(expr.node, join(token.span, end_token.span)))
            }

            TokenKind::LeftBracket => self.parse_list(),
            TokenKind::LeftBrace => self.parse_dict(),
            TokenKind::HashBrace => self.parse_literal_dict(),

            _ => Err(ParseError::new(
                format!("Unexpected token: {}", token.kind),
                token.span,
            )),
        }
    }

    fn parse_infix(
        &mut self,
        left: SpannedExpr,
        precedence: Precedence,
    ) -> Result<SpannedExpr, ParseError> {
        let Some(token) = self.advance() else {
            return Ok(left);
        };

        match &token.kind {
            TokenKind::LeftBracket => {
                let index = self.parse_sequence()?;
                let end_token = self.expect(TokenKind::RightBracket)?;
                let span = join(left.span, end_token.span);
                Ok(Spanned::new(
                    Expr::Index {
                        collection: Box::new(left),
                        index: Box::new(index),
                    },
                    span,
                ))
            }

            TokenKind::Dot => match self.advance() {
                Some(Token {
                    kind: TokenKind::Identifier(name),
                    span: name_span,
                }) => {
                    let span = join(left.span, name_span);
                    Ok(Spanned::new(
                        Expr::Member {
                            object: Box::new(left),
                            name,
                        },
                        span,
                    ))
                }
                Some(other) => Err(ParseError::new(
                    format!("Expected member name after '.', got {}", other.kind),
                    other.span,
                )),
                None => Err(ParseError::new("Expected member name after '.'", token.span)),
            },

            TokenKind::LeftParen => {
                let function = match left.node {
                    Expr::Identifier(name) => name,
                    _ => {
                        return Err(ParseError::new(
                            "Only named functions can be called",
                            left.span,
                        ));
                    }
                };
                let args = self.parse_args()?;
                let end_token = self.expect(TokenKind::RightParen)?;
                Ok(Spanned::new(
                    Expr::Call { function, args },
                    join(left.span, end_token.span),
                ))
            }

            TokenKind::Question => {
                self.skip_newlines();
                let then_branch = self.parse_expression()?;
                self.expect(TokenKind::Colon)?;
                self.skip_newlines();
                // Right-associative: `a ? b : c ? d : e`
                let else_branch = self.parse_precedence(Precedence::None)?;
                let span = join(left.span, else_branch.span);
                Ok(Spanned::new(
                    Expr::Conditional {
                        condition: Box::new(left),
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    },
                    span,
                ))
            }

            kind => {
                let op = self.get_infix_op(kind).ok_or_else(|| {
                    ParseError::new(format!("Unexpected token: {kind}"), token.span)
                })?;
                // A trailing operator carries the expression onto the next line
                self.skip_newlines();
                let right = self.parse_precedence(precedence)?;
                let span = join(left.span, right.span);
                Ok(Spanned::new(
                    Expr::Infix {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    },
                    span,
                ))
            }
        }
    }

    fn get_infix_precedence(&self, kind: &TokenKind) -> Precedence {
        match kind {
            TokenKind::LeftBracket | TokenKind::Dot => Precedence::Index,
            TokenKind::LeftParen => Precedence::Call,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Product,
            TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
            TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => Precedence::Comparison,
            TokenKind::EqualEqual | TokenKind::BangEqual => Precedence::Equality,
            TokenKind::AmpAmp => Precedence::And,
            TokenKind::PipePipe => Precedence::Or,
            TokenKind::Question => Precedence::Conditional,
            _ => Precedence::None,
        }
    }

    fn get_infix_op(&self, kind: &TokenKind) -> Option<InfixOp> {
        match kind {
            TokenKind::Plus => Some(InfixOp::Add),
            TokenKind::Minus => Some(InfixOp::Sub),
            TokenKind::Star => Some(InfixOp::Mul),
            TokenKind::Slash => Some(InfixOp::Div),
            TokenKind::Percent => Some(InfixOp::Mod),
            TokenKind::EqualEqual => Some(InfixOp::Eq),
            TokenKind::BangEqual => Some(InfixOp::Ne),
            TokenKind::Less => Some(InfixOp::Lt),
            TokenKind::LessEqual => Some(InfixOp::Le),
            TokenKind::Greater => Some(InfixOp::Gt),
            TokenKind::GreaterEqual => Some(InfixOp::Ge),
            TokenKind::AmpAmp => Some(InfixOp::And),
            TokenKind::PipePipe => Some(InfixOp::Or),
            _ => None,
        }
    }

    fn parse_list(&mut self) -> Result<SpannedExpr, ParseError> {
        let start_span = self.expect(TokenKind::LeftBracket)?.span;

        let mut elements = Vec::new();

        while !self.check(&TokenKind::RightBracket) && !self.is_at_end() {
            elements.push(self.parse_expression()?);

            // Allow trailing comma
            if !self.check(&TokenKind::RightBracket) {
                self.expect(TokenKind::Comma)?;
            }
        }

        let end_token = self.expect(TokenKind::RightBracket)?;
        Ok(Spanned::new(
            Expr::List(elements),
            join(start_span, end_token.span),
        ))
    }

    /// `{key: value}` where each key is an expression
    fn parse_dict(&mut self) -> Result<SpannedExpr, ParseError> {
        let start_span = self.expect(TokenKind::LeftBrace)?.span;

        let mut entries = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let key = self.parse_expression()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression()?;
            entries.push((key, value));

            if !self.check(&TokenKind::RightBrace) {
                self.expect(TokenKind::Comma)?;
            }
        }

        let end_token = self.expect(TokenKind::RightBrace)?;
        Ok(Spanned::new(
            Expr::Dict(entries),
            join(start_span, end_token.span),
        ))
    }

    /// `#{name: value}` where a bare identifier key is taken literally
    fn parse_literal_dict(&mut self) -> Result<SpannedExpr, ParseError> {
        let start_span = self.expect(TokenKind::HashBrace)?.span;

        let mut entries = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let key = match self.peek().cloned() {
                Some(Token {
                    kind: TokenKind::Identifier(name),
                    span,
                }) => {
                    self.advance();
                    Spanned::new(Expr::String(name), span)
                }
                _ => self.parse_expression()?,
            };
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression()?;
            entries.push((key, value));

            if !self.check(&TokenKind::RightBrace) {
                self.expect(TokenKind::Comma)?;
            }
        }

        let end_token = self.expect(TokenKind::RightBrace)?;
        Ok(Spanned::new(
            Expr::Dict(entries),
            join(start_span, end_token.span),
        ))
    }

    fn parse_args(&mut self) -> Result<Vec<SpannedExpr>, ParseError> {
        let mut args = Vec::new();

        while !self.check(&TokenKind::RightParen) && !self.is_at_end() {
            args.push(self.parse_expression()?);

            if !self.check(&TokenKind::RightParen) {
                self.expect(TokenKind::Comma)?;
            }
        }

        Ok(args)
    }

    fn at_terminator(&self) -> bool {
        self.check(&TokenKind::Semicolon) || self.check(&TokenKind::Newline)
    }

    fn skip_terminator(&mut self) {
        if self.at_terminator() {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        if self.is_at_end() {
            None
        } else {
            let token = self.tokens[self.position].clone();
            self.position += 1;
            Some(token)
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().map(|t| &t.kind == kind).unwrap_or(false)
    }

    fn is_at_end(&self) -> bool {
        self.peek()
            .map(|t| t.kind == TokenKind::Eof)
            .unwrap_or(true)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(&kind)
            && let Some(token) = self.advance()
        {
            return Ok(token);
        }

        let token = self.peek();
        let span = token.map(|t| t.span).unwrap_or(START_SPAN);
        let found = token
            .map(|t| t.kind.to_string())
            .unwrap_or_else(|| "end of input".to_string());
        Err(ParseError::new(format!("Expected '{kind}', got '{found}'"), span))
    }
}
