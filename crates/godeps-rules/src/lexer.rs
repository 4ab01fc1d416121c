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

use logos::{Lexer, Logos, Skip};
use std::{fmt::Display, ops::Range};

use crate::parser::ParseError;

/// Position in a BUILD file
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Pos {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Byte offset from the start of the file
    pub offset: usize,
}

/// Location range in the source code, from start (inclusive) to end (exclusive)
pub type Loc = Range<Pos>;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(extras = (usize, usize))]
#[logos(skip(r"(\n|\r\n)", newline_callback))]
#[logos(skip(r"\\(\n|\r\n)", newline_callback))] // Line continuations
#[logos(skip(r"#[^\n\r]*"))]
#[logos(skip(r"[ \t\f]+"))]
pub enum Token {
    #[token("(", with_span)]
    LPAREN(Loc),
    #[token(")", with_span)]
    RPAREN(Loc),
    #[token("[", with_span)]
    LBRACKET(Loc),
    #[token("]", with_span)]
    RBRACKET(Loc),
    #[token("{", with_span)]
    LBRACE(Loc),
    #[token("}", with_span)]
    RBRACE(Loc),
    #[token(",", with_span)]
    COMMA(Loc),
    #[token(":", with_span)]
    COLON(Loc),
    #[token("=", with_span)]
    EQUAL(Loc),
    #[token(".", with_span)]
    DOT(Loc),
    #[token("+", with_span)]
    PLUS(Loc),
    #[token("==", with_span)]
    #[regex(r"[-*/%<>!|&^~]+=?", with_span)]
    OP(Loc),
    #[token("True", with_span)]
    TRUE(Loc),
    #[token("False", with_span)]
    FALSE(Loc),
    #[regex(r#""([^"\\\n]|\\.)*""#, with_string)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, with_string)]
    STRING((Loc, String)),
    #[regex(r"[0-9]+", with_int)]
    INT((Loc, i64)),
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", with_lexeme)]
    IDENT((Loc, String)),
    EOF(Loc),
}

fn newline_callback(lex: &mut Lexer<Token>) -> Skip {
    lex.extras.0 += 1;
    lex.extras.1 = lex.span().end;
    Skip
}

fn get_loc(lex: &mut Lexer<'_, Token>) -> Loc {
    let span = lex.span();
    let start = Pos {
        line: lex.extras.0,
        column: span.start - lex.extras.1 + 1,
        offset: span.start,
    };
    let end = Pos {
        line: lex.extras.0,
        column: span.end - lex.extras.1 + 1,
        offset: span.end,
    };
    start..end
}

fn with_span(lex: &mut Lexer<'_, Token>) -> Loc {
    get_loc(lex)
}

fn with_lexeme(lex: &mut Lexer<'_, Token>) -> (Loc, String) {
    let s = lex.slice().to_string();
    (get_loc(lex), s)
}

fn with_int(lex: &mut Lexer<'_, Token>) -> Option<(Loc, i64)> {
    let i = lex.slice().parse::<i64>().ok()?;
    Some((get_loc(lex), i))
}

fn with_string(lex: &mut Lexer<'_, Token>) -> (Loc, String) {
    let s = lex.slice();
    let value = unescape_string(&s[1..s.len() - 1]);
    (get_loc(lex), value)
}

/// Unknown escapes are kept as written.
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some(c @ ('\\' | '"' | '\'')) => result.push(c),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum TokenKind {
    LPAREN,
    RPAREN,
    LBRACKET,
    RBRACKET,
    LBRACE,
    RBRACE,
    COMMA,
    COLON,
    EQUAL,
    DOT,
    PLUS,
    OP,
    TRUE,
    FALSE,
    STRING,
    INT,
    IDENT,
    EOF,
}

impl Token {
    pub fn range(&self) -> &Loc {
        match self {
            Token::LPAREN(r)
            | Token::RPAREN(r)
            | Token::LBRACKET(r)
            | Token::RBRACKET(r)
            | Token::LBRACE(r)
            | Token::RBRACE(r)
            | Token::COMMA(r)
            | Token::COLON(r)
            | Token::EQUAL(r)
            | Token::DOT(r)
            | Token::PLUS(r)
            | Token::OP(r)
            | Token::TRUE(r)
            | Token::FALSE(r)
            | Token::EOF(r)
            | Token::STRING((r, _))
            | Token::INT((r, _))
            | Token::IDENT((r, _)) => r,
        }
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            Token::LPAREN(_) => TokenKind::LPAREN,
            Token::RPAREN(_) => TokenKind::RPAREN,
            Token::LBRACKET(_) => TokenKind::LBRACKET,
            Token::RBRACKET(_) => TokenKind::RBRACKET,
            Token::LBRACE(_) => TokenKind::LBRACE,
            Token::RBRACE(_) => TokenKind::RBRACE,
            Token::COMMA(_) => TokenKind::COMMA,
            Token::COLON(_) => TokenKind::COLON,
            Token::EQUAL(_) => TokenKind::EQUAL,
            Token::DOT(_) => TokenKind::DOT,
            Token::PLUS(_) => TokenKind::PLUS,
            Token::OP(_) => TokenKind::OP,
            Token::TRUE(_) => TokenKind::TRUE,
            Token::FALSE(_) => TokenKind::FALSE,
            Token::STRING(_) => TokenKind::STRING,
            Token::INT(_) => TokenKind::INT,
            Token::IDENT(_) => TokenKind::IDENT,
            Token::EOF(_) => TokenKind::EOF,
        }
    }

    /// Whether the token opens or closes a bracket, as +1 / -1.
    pub fn depth_change(&self) -> isize {
        match self.kind() {
            TokenKind::LPAREN | TokenKind::LBRACKET | TokenKind::LBRACE => 1,
            TokenKind::RPAREN | TokenKind::RBRACKET | TokenKind::RBRACE => -1,
            _ => 0,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LPAREN(_) => write!(f, "("),
            Token::RPAREN(_) => write!(f, ")"),
            Token::LBRACKET(_) => write!(f, "["),
            Token::RBRACKET(_) => write!(f, "]"),
            Token::LBRACE(_) => write!(f, "{{"),
            Token::RBRACE(_) => write!(f, "}}"),
            Token::COMMA(_) => write!(f, ","),
            Token::COLON(_) => write!(f, ":"),
            Token::EQUAL(_) => write!(f, "="),
            Token::DOT(_) => write!(f, "."),
            Token::PLUS(_) => write!(f, "+"),
            Token::OP(_) => write!(f, "operator"),
            Token::TRUE(_) => write!(f, "True"),
            Token::FALSE(_) => write!(f, "False"),
            Token::STRING((_, s)) => write!(f, "{:?}", s),
            Token::INT((_, i)) => write!(f, "{}", i),
            Token::IDENT((_, s)) => write!(f, "{}", s),
            Token::EOF(_) => write!(f, "<EOF>"),
        }
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Token::lexer(input);
    // Current line number and offset of current line start
    lexer.extras = (1, 0);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        match token {
            Ok(t) => tokens.push(t),
            Err(_) => {
                return Err(ParseError::Lexing {
                    line: lexer.extras.0,
                    column: lexer.span().start - lexer.extras.1 + 1,
                });
            }
        }
    }
    let pos = Pos {
        line: lexer.extras.0,
        column: input.len() - lexer.extras.1 + 1,
        offset: input.len(),
    };
    tokens.push(Token::EOF(pos..pos));
    Ok(tokens)
}

#[test]
fn tokenize_test() {
    let input = r#"# comment
go_module(name = 'x', install = ["a/..."], n = 1 + 2)
"#;
    let tokens = tokenize(input).unwrap();
    let rendered: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    expect_test::expect![[r#"
        [
            "go_module",
            "(",
            "name",
            "=",
            "\"x\"",
            ",",
            "install",
            "=",
            "[",
            "\"a/...\"",
            "]",
            ",",
            "n",
            "=",
            "1",
            "+",
            "2",
            ")",
            "<EOF>",
        ]
    "#]]
    .assert_debug_eq(&rendered);

    let Token::IDENT((loc, _)) = &tokens[0] else {
        panic!("expected an identifier");
    };
    assert_eq!((loc.start.line, loc.start.column, loc.start.offset), (2, 1, 10));
    assert_eq!(tokens.last().unwrap().range().start.line, 3);
}

#[test]
fn strings_and_errors() {
    let tokens = tokenize(r#""a\"b" 'c\'d' "e\.f""#).unwrap();
    let strings: Vec<_> = tokens
        .iter()
        .filter_map(|t| match t {
            Token::STRING((_, s)) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(strings, vec!["a\"b", "c'd", "e\\.f"]);

    let err = tokenize("x = 1\ny = `z`\n").unwrap_err();
    assert_eq!(err.to_string(), "lexing error at line 2, column 5");
}
