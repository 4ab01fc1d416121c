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

//! Reads just enough of a directory of Go sources to know what package it
//! is and what it imports.
//!
//! Files are filtered the way the Go toolchain does it: test files, files
//! starting with `_` or `.`, files for another `GOOS`/`GOARCH` and files
//! whose build constraints don't hold are left out. Only the header of each
//! file (up to the last import declaration) is tokenised.

mod constraint;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use logos::{Lexer, Logos};
use thiserror::Error;

pub use constraint::{
    BuildContext, Constraint, KNOWN_ARCH, KNOWN_OS, host_goarch, host_goos, parse_go_build,
    parse_plus_build,
};

use crate::modfile::unquote;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip(r"[ \t\f\r]+"))]
enum GoToken {
    #[token("\n")]
    Newline,
    #[regex(r"//[^\n]*", |lex| lex.slice().to_string())]
    LineComment(String),
    #[token("/*", block_comment)]
    BlockComment,
    #[token("package")]
    Package,
    #[token("import")]
    Import,
    #[regex(r"[\p{L}_][\p{L}\p{Nd}_]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r#""([^"\\\n]|\\.)*""#, with_quoted)]
    #[regex(r"`[^`]*`", with_raw)]
    Str(String),
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
}

/// Consumes up to and including the closing `*/`.
fn block_comment(lex: &mut Lexer<GoToken>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => false,
    }
}

fn with_quoted(lex: &mut Lexer<GoToken>) -> Result<String, ()> {
    let s = lex.slice();
    unquote(&s[1..s.len() - 1]).ok_or(())
}

fn with_raw(lex: &mut Lexer<GoToken>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no buildable Go source files in {}", .dir.display())]
    NoBuildableSource { dir: PathBuf },
    #[error("found packages {first} ({first_file}) and {second} ({second_file}) in {}", .dir.display())]
    MultiplePackages {
        dir: PathBuf,
        first: String,
        first_file: String,
        second: String,
        second_file: String,
    },
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {message}", .path.display())]
    Syntax { path: PathBuf, message: String },
}

/// The parts of a Go file's header that decide whether and how it builds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileHeader {
    pub package: String,
    pub imports: Vec<String>,
    pub constraint: Option<Constraint>,
}

pub fn scan_header(src: &str) -> Result<FileHeader, String> {
    let mut lexer = GoToken::lexer(src);
    let mut go_build = None;
    let mut plus_build = Vec::new();
    let mut header = FileHeader::default();

    // Constraints and comments before the package clause.
    loop {
        match lexer.next() {
            None => return Err("expected 'package'".to_string()),
            Some(Err(_)) => return Err("unexpected input before package clause".to_string()),
            Some(Ok(GoToken::Newline | GoToken::BlockComment)) => {}
            Some(Ok(GoToken::LineComment(c))) => {
                if let Some(expr) = c.strip_prefix("//go:build") {
                    go_build = Some(
                        parse_go_build(expr.trim())
                            .ok_or_else(|| format!("malformed //go:build line: {c}"))?,
                    );
                } else if let Some(args) = c
                    .strip_prefix("//")
                    .map(str::trim_start)
                    .and_then(|c| c.strip_prefix("+build"))
                {
                    if let Some(expr) = parse_plus_build(args) {
                        plus_build.push(expr);
                    }
                }
            }
            Some(Ok(GoToken::Package)) => break,
            Some(Ok(other)) => return Err(format!("expected 'package', found {other:?}")),
        }
    }
    header.package = match next_significant(&mut lexer) {
        Some(GoToken::Ident(name)) => name,
        other => return Err(format!("expected package name, found {other:?}")),
    };
    header.constraint = go_build.or(match plus_build.len() {
        0 => None,
        1 => plus_build.pop(),
        _ => Some(Constraint::And(plus_build)),
    });

    // Import declarations. Anything else ends the header.
    loop {
        match next_significant(&mut lexer) {
            Some(GoToken::Semi) => {}
            Some(GoToken::Import) => match next_significant(&mut lexer) {
                Some(GoToken::LParen) => loop {
                    match next_significant(&mut lexer) {
                        Some(GoToken::RParen) => break,
                        Some(GoToken::Semi) => {}
                        Some(tok) => header.imports.push(import_spec(tok, &mut lexer)?),
                        None => return Err("unterminated import block".to_string()),
                    }
                },
                Some(tok) => header.imports.push(import_spec(tok, &mut lexer)?),
                None => return Err("expected import path".to_string()),
            },
            _ => break,
        }
    }
    Ok(header)
}

/// Reads `["name" | "."] "path"`, given its first token.
fn import_spec(first: GoToken, lexer: &mut Lexer<GoToken>) -> Result<String, String> {
    let path = match first {
        GoToken::Str(path) => path,
        GoToken::Ident(_) | GoToken::Dot => match next_significant(lexer) {
            Some(GoToken::Str(path)) => path,
            other => return Err(format!("expected import path, found {other:?}")),
        },
        other => return Err(format!("expected import path, found {other:?}")),
    };
    Ok(path)
}

/// Skips newlines and comments. Lexing errors end the stream.
fn next_significant(lexer: &mut Lexer<GoToken>) -> Option<GoToken> {
    loop {
        match lexer.next()? {
            Ok(GoToken::Newline | GoToken::LineComment(_) | GoToken::BlockComment) => {}
            Ok(tok) => return Some(tok),
            Err(_) => return None,
        }
    }
}

/// A directory of Go sources as seen from one [`BuildContext`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoPackageSource {
    pub dir: PathBuf,
    pub name: String,
    /// Go files that take part in the build, by file name.
    pub go_files: Vec<String>,
    /// Non-Go files, e.g. assembly and C sources.
    pub other_files: Vec<String>,
    /// Go files excluded by file name suffix or build constraint.
    pub ignored_go_files: Vec<String>,
    /// Sorted and unique.
    pub imports: Vec<String>,
}

impl GoPackageSource {
    pub fn is_command(&self) -> bool {
        self.name == "main"
    }
}

const OTHER_SOURCE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx", "m", "s", "S", "sx", "f", "F", "for", "f90",
    "swig", "swigcxx", "syso",
];

pub fn import_dir(dir: &Path, ctx: &BuildContext) -> Result<GoPackageSource, ScanError> {
    let io_err = |source| ScanError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    let mut pkg = GoPackageSource {
        dir: dir.to_path_buf(),
        ..Default::default()
    };
    let mut imports = BTreeSet::new();
    let mut first_file = String::new();
    for name in names {
        if name.starts_with('_') || name.starts_with('.') {
            continue;
        }
        let Some((_, ext)) = name.rsplit_once('.') else {
            continue;
        };
        if ext != "go" {
            if OTHER_SOURCE_EXTENSIONS.contains(&ext) && ctx.matches_file_name(&name) {
                pkg.other_files.push(name);
            }
            continue;
        }
        if name.ends_with("_test.go") {
            continue;
        }
        if !ctx.matches_file_name(&name) {
            pkg.ignored_go_files.push(name);
            continue;
        }
        let path = dir.join(&name);
        let src = std::fs::read_to_string(&path).map_err(|source| ScanError::Io {
            path: path.clone(),
            source,
        })?;
        let header = scan_header(&src).map_err(|message| ScanError::Syntax {
            path: path.clone(),
            message,
        })?;
        if header.constraint.as_ref().is_some_and(|c| !c.eval(ctx)) {
            pkg.ignored_go_files.push(name);
            continue;
        }
        if pkg.name.is_empty() {
            pkg.name = header.package;
            first_file = name.clone();
        } else if pkg.name != header.package {
            return Err(ScanError::MultiplePackages {
                dir: dir.to_path_buf(),
                first: pkg.name,
                first_file,
                second: header.package,
                second_file: name,
            });
        }
        imports.extend(header.imports);
        pkg.go_files.push(name);
    }
    if pkg.go_files.is_empty() {
        return Err(ScanError::NoBuildableSource {
            dir: dir.to_path_buf(),
        });
    }
    pkg.imports = imports.into_iter().collect();
    Ok(pkg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use std::collections::HashSet;

    fn ctx() -> BuildContext {
        BuildContext {
            goos: "linux".into(),
            goarch: "amd64".into(),
            tags: HashSet::new(),
            cgo_enabled: true,
        }
    }

    #[test]
    fn header_with_grouped_and_named_imports() {
        let src = r#"// Copyright notice.

//go:build linux || darwin

/* Package foo does things. */
package foo

import "fmt"
import (
	"strings"
	errs "github.com/pkg/errors"
	. "example.com/dot" // dot import
	_ "embed"
)

import "os"; import "io"

func main() { fmt.Println(strings.ToUpper("x")) }
"#;
        let header = scan_header(src).unwrap();
        expect![[r#"
            FileHeader {
                package: "foo",
                imports: [
                    "fmt",
                    "strings",
                    "github.com/pkg/errors",
                    "example.com/dot",
                    "embed",
                    "os",
                    "io",
                ],
                constraint: Some(
                    Or(
                        [
                            Tag(
                                "linux",
                            ),
                            Tag(
                                "darwin",
                            ),
                        ],
                    ),
                ),
            }
        "#]]
        .assert_debug_eq(&header);
    }

    #[test]
    fn block_comment_licence_headers() {
        let src = "/*\n * Copyright 2020 Example\n *\n * Licensed under the Apache License.\n */\n\npackage foo\n\nimport (\n\t\"fmt\" /* printing */\n\t/* \"unused\" */\n\t\"os\"\n)\n";
        let header = scan_header(src).unwrap();
        assert_eq!(header.package, "foo");
        assert_eq!(header.imports, ["fmt", "os"]);
        assert_eq!(
            scan_header("/* Package foo does things. */\npackage foo\n")
                .unwrap()
                .package,
            "foo"
        );
        assert!(scan_header("/* never closed\npackage foo\n").is_err());
    }

    #[test]
    fn plus_build_lines_are_anded() {
        let src = "// +build linux\n// +build !cgo\n\npackage foo\n";
        let header = scan_header(src).unwrap();
        let mut c = ctx();
        assert!(!header.constraint.as_ref().unwrap().eval(&c));
        c.cgo_enabled = false;
        assert!(header.constraint.as_ref().unwrap().eval(&c));
    }

    #[test]
    fn missing_package_clause() {
        assert!(scan_header("// just a comment\n").is_err());
    }

    #[test]
    fn import_dir_filters_files() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, content: &str| std::fs::write(dir.path().join(name), content).unwrap();
        write("a.go", "package foo\nimport \"fmt\"\n");
        write("b_linux.go", "package foo\nimport \"os\"\n");
        write("c_windows.go", "package foo\nimport \"syscall\"\n");
        write("d.go", "//go:build ignore\n\npackage main\n");
        write("a_test.go", "package foo_test\nimport \"testing\"\n");
        write("_skip.go", "package other\n");
        write("asm_amd64.s", "TEXT ·f(SB),0,$0\n");
        write("README.md", "# readme\n");

        let pkg = import_dir(dir.path(), &ctx()).unwrap();
        assert_eq!(pkg.name, "foo");
        assert_eq!(pkg.go_files, vec!["a.go", "b_linux.go"]);
        assert_eq!(pkg.other_files, vec!["asm_amd64.s"]);
        assert_eq!(pkg.ignored_go_files, vec!["c_windows.go", "d.go"]);
        assert_eq!(pkg.imports, vec!["fmt", "os"]);
        assert!(!pkg.is_command());
    }

    #[test]
    fn import_dir_without_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x_test.go"), "package x\n").unwrap();
        let err = import_dir(dir.path(), &ctx()).unwrap_err();
        assert!(matches!(err, ScanError::NoBuildableSource { .. }));
    }

    #[test]
    fn import_dir_with_mixed_packages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.go"), "package a\n").unwrap();
        std::fs::write(dir.path().join("b.go"), "package b\n").unwrap();
        let err = import_dir(dir.path(), &ctx()).unwrap_err();
        assert!(matches!(err, ScanError::MultiplePackages { .. }));
    }
}
