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

//! Parser for `go.mod` manifests.
//!
//! Every directive is recognised, both in single-line form and inside a
//! parenthesised block. Unknown directives are skipped with a debug log so
//! that manifests written by newer toolchains still load.

use logos::{Lexer, Logos};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::ModuleVersion;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip(r"[ \t\f]+"))]
enum Token {
    #[regex(r"\r?\n")]
    Newline,
    #[regex(r"//[^\r\n]*", with_comment)]
    Comment(String),
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("=>")]
    Arrow,
    #[regex(r#""([^"\\\r\n]|\\.)*""#, with_quoted)]
    #[regex(r"`[^`]*`", with_raw)]
    Str(String),
    #[regex(r#"[^ \t\f\r\n()"`/=][^ \t\f\r\n()"`]*"#, with_word)]
    #[regex(r#"/[^ \t\f\r\n()"`/][^ \t\f\r\n()"`]*"#, with_word)]
    Word(String),
}

fn with_comment(lex: &mut Lexer<Token>) -> String {
    lex.slice()[2..].trim().to_string()
}

fn with_word(lex: &mut Lexer<Token>) -> String {
    lex.slice().to_string()
}

fn with_raw(lex: &mut Lexer<Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

fn with_quoted(lex: &mut Lexer<Token>) -> Result<String, ()> {
    let s = lex.slice();
    unquote(&s[1..s.len() - 1]).ok_or(())
}

/// Interprets Go string escapes.
pub(crate) fn unquote(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            'n' => result.push('\n'),
            't' => result.push('\t'),
            'r' => result.push('\r'),
            'a' => result.push('\x07'),
            'b' => result.push('\x08'),
            'f' => result.push('\x0C'),
            'v' => result.push('\x0B'),
            '\\' => result.push('\\'),
            '"' => result.push('"'),
            '\'' => result.push('\''),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                result.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            _ => return None,
        }
    }
    Some(result)
}

#[derive(Debug, Error)]
pub enum ModFileError {
    #[error("line {line}: unexpected input")]
    Lexing { line: usize },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Require {
    pub path: String,
    pub version: String,
    /// Marked `// indirect`.
    pub indirect: bool,
}

/// One side of a `replace` directive. The version is optional on both sides;
/// a replacement without one is a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceTarget {
    pub path: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replace {
    pub old: ReplaceTarget,
    pub new: ReplaceTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModFile {
    pub module: Option<String>,
    pub go: Option<String>,
    pub toolchain: Option<String>,
    pub require: Vec<Require>,
    pub exclude: Vec<ModuleVersion>,
    pub replace: Vec<Replace>,
    pub retract: Vec<String>,
}

impl ModFile {
    /// Whether `path` is the old side of one of the replace directives.
    pub fn is_replaced(&self, path: &str) -> bool {
        self.replace.iter().any(|r| r.old.path == path)
    }
}

/// A single logical line of the manifest.
#[derive(Debug, Default)]
struct Line {
    number: usize,
    words: Vec<String>,
    comment: Option<String>,
    open: bool,
    close: bool,
}

fn split_lines(input: &str) -> Result<Vec<Line>, ModFileError> {
    let mut lexer = Token::lexer(input);
    let mut lines = Vec::new();
    let mut line = Line {
        number: 1,
        ..Default::default()
    };
    while let Some(token) = lexer.next() {
        let token = token.map_err(|_| ModFileError::Lexing { line: line.number })?;
        match token {
            Token::Newline => {
                let next = line.number + 1;
                lines.push(std::mem::replace(
                    &mut line,
                    Line {
                        number: next,
                        ..Default::default()
                    },
                ));
            }
            Token::Comment(c) => line.comment = Some(c),
            Token::LParen => line.open = true,
            Token::RParen => line.close = true,
            Token::Arrow => line.words.push("=>".to_string()),
            Token::Str(s) | Token::Word(s) => line.words.push(s),
        }
    }
    lines.push(line);
    Ok(lines)
}

pub fn parse(input: &str) -> Result<ModFile, ModFileError> {
    let mut file = ModFile::default();
    let mut block: Option<String> = None;
    for line in split_lines(input)? {
        if let Some(verb) = &block {
            if line.close {
                if !line.words.is_empty() {
                    return Err(syntax(line.number, "unexpected input before ')'"));
                }
                block = None;
                continue;
            }
            if line.words.is_empty() {
                continue;
            }
            let verb = verb.clone();
            apply(&mut file, &verb, &line.words, line.comment.as_deref(), line.number)?;
            continue;
        }

        let Some((verb, args)) = line.words.split_first() else {
            if line.open || line.close {
                return Err(syntax(line.number, "unexpected parenthesis"));
            }
            continue;
        };
        if line.open {
            if !args.is_empty() {
                return Err(syntax(line.number, "unexpected input before '('"));
            }
            if line.close {
                // `require ()`
                continue;
            }
            block = Some(verb.clone());
            continue;
        }
        apply(&mut file, verb, args, line.comment.as_deref(), line.number)?;
    }
    if block.is_some() {
        return Err(syntax(0, "unterminated block"));
    }
    Ok(file)
}

fn syntax(line: usize, message: impl Into<String>) -> ModFileError {
    ModFileError::Syntax {
        line,
        message: message.into(),
    }
}

fn apply(
    file: &mut ModFile,
    verb: &str,
    args: &[String],
    comment: Option<&str>,
    line: usize,
) -> Result<(), ModFileError> {
    match verb {
        "module" => {
            let [path] = args else {
                return Err(syntax(line, "usage: module module/path"));
            };
            file.module = Some(path.clone());
        }
        "go" => {
            let [v] = args else {
                return Err(syntax(line, "usage: go 1.23"));
            };
            file.go = Some(v.clone());
        }
        "toolchain" => {
            let [v] = args else {
                return Err(syntax(line, "usage: toolchain name"));
            };
            file.toolchain = Some(v.clone());
        }
        "require" => {
            let [path, version] = args else {
                return Err(syntax(line, "usage: require module/path v1.2.3"));
            };
            let indirect = comment.is_some_and(|c| {
                c == "indirect" || c.starts_with("indirect;")
            });
            file.require.push(Require {
                path: path.clone(),
                version: version.clone(),
                indirect,
            });
        }
        "exclude" => {
            let [path, version] = args else {
                return Err(syntax(line, "usage: exclude module/path v1.2.3"));
            };
            file.exclude.push(ModuleVersion::new(path, version));
        }
        "replace" => {
            let Some(arrow) = args.iter().position(|w| w == "=>") else {
                return Err(syntax(line, "usage: replace module/path [v1.2.3] => other/module v1.4"));
            };
            let old = replace_target(&args[..arrow], line)?;
            let new = replace_target(&args[arrow + 1..], line)?;
            file.replace.push(Replace { old, new });
        }
        "retract" => {
            if args.is_empty() {
                return Err(syntax(line, "usage: retract version"));
            }
            file.retract.push(args.join(" "));
        }
        other => log::debug!("ignoring unknown go.mod directive {other} on line {line}"),
    }
    Ok(())
}

fn replace_target(words: &[String], line: usize) -> Result<ReplaceTarget, ModFileError> {
    match words {
        [path] => Ok(ReplaceTarget {
            path: path.clone(),
            version: None,
        }),
        [path, version] => Ok(ReplaceTarget {
            path: path.clone(),
            version: Some(version.clone()),
        }),
        _ => Err(syntax(line, "replace side must be `path` or `path version`")),
    }
}
