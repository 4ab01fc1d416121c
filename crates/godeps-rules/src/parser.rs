// godeps: Third-party Go dependency management for the Please build system.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

use std::{cell::Cell, fmt};

use indexmap::IndexMap;

use crate::file::{Expr, Rule};
use crate::lexer::{self, Loc, Token, TokenKind};

/// Parser for the top-level calls of a BUILD file
pub struct Parser<'a> {
    source: &'a str,
    /// The whole token stream, including EOF
    tokens: Vec<Token>,
    /// Index of the next unconsumed token
    index: Cell<usize>,
}

#[derive(Debug)]
pub enum ParseError {
    UnexpectedToken(Token),
    Lexing { line: usize, column: usize },
    Unbalanced { loc: Loc },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken(token) => {
                let loc = token.range();
                write!(
                    f,
                    "unexpected token {} at line {}, column {}",
                    token, loc.start.line, loc.start.column
                )
            }
            ParseError::Lexing { line, column } => {
                write!(f, "lexing error at line {line}, column {column}")
            }
            ParseError::Unbalanced { loc } => write!(
                f,
                "unbalanced brackets in statement starting at line {}, column {}",
                loc.start.line, loc.start.column
            ),
        }
    }
}

impl std::error::Error for ParseError {}

impl<'a> Parser<'a> {
    /// Peek next unconsumed token
    pub fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    /// Peek the n-th unconsumed token, or `EOF` past the end
    pub fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.index.get() + n).min(last)]
    }

    /// Consume the next unconsumed token
    pub fn skip(&self) {
        self.index.set(self.index.get() + 1)
    }

    fn expect(&self, kind: TokenKind) -> Result<&Token, ParseError> {
        let token = self.peek();
        if token.kind() != kind {
            return Err(ParseError::UnexpectedToken(token.clone()));
        }
        self.skip();
        Ok(token)
    }

    /// Parse a series of elements surrounded by `l` and `r`, separated by `sep`,
    /// the parsing function `f` is used to parse each element.
    ///
    /// Note: allows trailing separator.
    pub fn surround_series<T, F>(
        &self,
        l: TokenKind,
        r: TokenKind,
        sep: TokenKind,
        f: F,
    ) -> Result<Vec<T>, ParseError>
    where
        F: Fn(&Parser<'a>) -> Result<T, ParseError>,
    {
        self.expect(l)?;
        let mut elems = Vec::new();
        if self.peek().kind() != r {
            loop {
                elems.push(f(self)?);
                let next = self.peek().kind();
                if next == r {
                    break;
                } else if next == sep {
                    self.skip();
                    // handle trailing comma
                    if self.peek().kind() == r {
                        break;
                    }
                } else {
                    return Err(ParseError::UnexpectedToken(self.peek().clone()));
                }
            }
        }
        self.skip(); // skip r
        Ok(elems)
    }

    /// Whether the next token ends an element of a series.
    fn at_element_end(&self) -> bool {
        matches!(
            self.peek().kind(),
            TokenKind::COMMA | TokenKind::RPAREN | TokenKind::RBRACKET | TokenKind::RBRACE
        )
    }

    fn parse_simple_expr(&self) -> Result<Expr, ParseError> {
        let expr = match self.peek() {
            Token::STRING((_, s)) => Expr::Str(s.clone()),
            Token::INT((_, i)) => Expr::Int(*i),
            Token::TRUE(_) => Expr::Bool(true),
            Token::FALSE(_) => Expr::Bool(false),
            Token::LBRACKET(_) => {
                return self
                    .surround_series(
                        TokenKind::LBRACKET,
                        TokenKind::RBRACKET,
                        TokenKind::COMMA,
                        |s| s.parse_expr(),
                    )
                    .map(Expr::List);
            }
            other => return Err(ParseError::UnexpectedToken(other.clone())),
        };
        self.skip();
        Ok(expr)
    }

    /// Consumes tokens up to the end of the current element, keeping the text.
    fn parse_raw_expr(&self) -> Result<Expr, ParseError> {
        let start = self.peek().range().clone();
        let mut end = start.start.offset;
        let mut depth = 0isize;
        loop {
            let token = self.peek();
            if token.kind() == TokenKind::EOF {
                return Err(ParseError::Unbalanced { loc: start });
            }
            if depth == 0 && self.at_element_end() {
                break;
            }
            // Keyword arguments only appear inside a nested call.
            if depth == 0 && token.kind() == TokenKind::EQUAL {
                return Err(ParseError::UnexpectedToken(token.clone()));
            }
            depth += token.depth_change();
            end = token.range().end.offset;
            self.skip();
        }
        Ok(Expr::Raw(self.source[start.start.offset..end].to_string()))
    }

    fn parse_expr(&self) -> Result<Expr, ParseError> {
        let start = self.index.get();
        if let Ok(expr) = self.parse_simple_expr()
            && self.at_element_end()
        {
            return Ok(expr);
        }
        self.index.set(start);
        self.parse_raw_expr()
    }

    fn parse_arg(&self) -> Result<(Option<String>, Expr), ParseError> {
        match (self.peek(), self.peek_nth(1)) {
            (Token::IDENT((_, key)), Token::EQUAL(_)) => {
                // skip label and '='
                self.skip();
                self.skip();
                Ok((Some(key.clone()), self.parse_expr()?))
            }
            _ => Ok((None, self.parse_expr()?)),
        }
    }

    fn parse_call(&self) -> Result<Rule, ParseError> {
        let Token::IDENT((loc, kind)) = self.peek() else {
            return Err(ParseError::UnexpectedToken(self.peek().clone()));
        };
        let start = loc.start;
        self.skip();
        let args = self.surround_series(
            TokenKind::LPAREN,
            TokenKind::RPAREN,
            TokenKind::COMMA,
            |s| s.parse_arg(),
        )?;
        let end = self.tokens[self.index.get() - 1].range().end.offset;

        let mut positional = Vec::new();
        let mut attrs = IndexMap::new();
        for (key, value) in args {
            match key {
                Some(key) => {
                    attrs.insert(key, value);
                }
                None => positional.push(value),
            }
        }
        Ok(Rule::parsed(
            kind.clone(),
            positional,
            attrs,
            start.offset..end,
            start.line,
        ))
    }

    /// Skips a statement that isn't a call: everything up to the next token
    /// starting a line outside any brackets.
    fn skip_statement(&self) -> Result<(), ParseError> {
        let start = self.peek().range().clone();
        let mut depth = 0isize;
        loop {
            let token = self.peek();
            if token.kind() == TokenKind::EOF {
                return if depth == 0 {
                    Ok(())
                } else {
                    Err(ParseError::Unbalanced { loc: start })
                };
            }
            depth += token.depth_change();
            self.skip();
            let next = self.peek().range().start;
            if depth == 0 && next.column == 1 {
                return Ok(());
            }
        }
    }

    fn parse_statements(&self) -> Result<Vec<Rule>, ParseError> {
        let mut rules = Vec::new();
        while self.peek().kind() != TokenKind::EOF {
            let is_call = matches!(
                (self.peek(), self.peek_nth(1)),
                (Token::IDENT((loc, _)), Token::LPAREN(_)) if loc.start.column == 1
            );
            if is_call {
                rules.push(self.parse_call()?);
            } else {
                self.skip_statement()?;
            }
        }
        Ok(rules)
    }
}

/// Parses the top-level calls of a BUILD file.
pub fn parse(source: &str) -> Result<Vec<Rule>, ParseError> {
    let parser = Parser {
        source,
        tokens: lexer::tokenize(source)?,
        index: Cell::new(0),
    };
    parser.parse_statements()
}
