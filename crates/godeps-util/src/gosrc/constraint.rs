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

//! Build constraint expressions, in both `//go:build` and `// +build` form.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Tag(String),
    Not(Box<Constraint>),
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
}

impl Constraint {
    pub fn eval(&self, ctx: &BuildContext) -> bool {
        match self {
            Constraint::Tag(tag) => ctx.matches_tag(tag),
            Constraint::Not(c) => !c.eval(ctx),
            Constraint::And(cs) => cs.iter().all(|c| c.eval(ctx)),
            Constraint::Or(cs) => cs.iter().any(|c| c.eval(ctx)),
        }
    }
}

pub const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

pub const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

/// The target a package is being loaded for.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub goos: String,
    pub goarch: String,
    pub tags: HashSet<String>,
    pub cgo_enabled: bool,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self {
            goos: host_goos().to_string(),
            goarch: host_goarch().to_string(),
            tags: HashSet::new(),
            cgo_enabled: true,
        }
    }
}

impl BuildContext {
    pub fn matches_tag(&self, tag: &str) -> bool {
        match tag {
            "gc" => true,
            "cgo" => self.cgo_enabled,
            "unix" => UNIX_OS.contains(&self.goos.as_str()),
            _ if tag.starts_with("go1.") => true,
            _ => {
                self.matches_os(tag) || tag == self.goarch || self.tags.contains(tag)
            }
        }
    }

    pub fn matches_os(&self, os: &str) -> bool {
        os == self.goos
            || (os == "linux" && self.goos == "android")
            || (os == "solaris" && self.goos == "illumos")
            || (os == "darwin" && self.goos == "ios")
    }

    /// Applies the `_GOOS`, `_GOARCH` and `_GOOS_GOARCH` file name suffixes.
    pub fn matches_file_name(&self, name: &str) -> bool {
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        let stem = stem.strip_suffix("_test").unwrap_or(stem);
        let Some(i) = stem.find('_') else {
            return true;
        };
        let elems: Vec<&str> = stem[i..].split('_').collect();
        let n = elems.len();
        if n >= 2 && KNOWN_OS.contains(&elems[n - 2]) && KNOWN_ARCH.contains(&elems[n - 1]) {
            return self.matches_os(elems[n - 2]) && elems[n - 1] == self.goarch;
        }
        let last = elems[n - 1];
        if KNOWN_OS.contains(&last) {
            return self.matches_os(last);
        }
        if KNOWN_ARCH.contains(&last) {
            return last == self.goarch;
        }
        true
    }
}

pub fn host_goos() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    }
}

pub fn host_goarch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        arch => arch,
    }
}

/// Parses the expression of a `//go:build` line.
pub fn parse_go_build(expr: &str) -> Option<Constraint> {
    let tokens = tokenize(expr)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let c = parser.or()?;
    (parser.pos == parser.tokens.len()).then_some(c)
}

/// Parses the arguments of a `// +build` line: space-separated options are
/// OR'd, comma-separated terms within an option are AND'd.
pub fn parse_plus_build(args: &str) -> Option<Constraint> {
    let mut options = Vec::new();
    for option in args.split_whitespace() {
        let mut terms = Vec::new();
        for term in option.split(',') {
            let (negated, tag) = match term.strip_prefix('!') {
                Some(tag) => (true, tag),
                None => (false, term),
            };
            if tag.is_empty() || !tag.chars().all(is_tag_char) {
                return None;
            }
            let atom = Constraint::Tag(tag.to_string());
            terms.push(if negated {
                Constraint::Not(Box::new(atom))
            } else {
                atom
            });
        }
        options.push(Constraint::And(terms));
    }
    Some(Constraint::Or(options))
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

#[derive(Debug, PartialEq)]
enum Tok {
    Tag(String),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(s: &str) -> Option<Vec<Tok>> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '!' => {
                chars.next();
                tokens.push(Tok::Not);
            }
            '(' => {
                chars.next();
                tokens.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::RParen);
            }
            '&' | '|' => {
                chars.next();
                if chars.next()? != c {
                    return None;
                }
                tokens.push(if c == '&' { Tok::And } else { Tok::Or });
            }
            c if is_tag_char(c) => {
                let mut tag = String::new();
                while let Some(&c) = chars.peek().filter(|c| is_tag_char(**c)) {
                    tag.push(c);
                    chars.next();
                }
                tokens.push(Tok::Tag(tag));
            }
            _ => return None,
        }
    }
    Some(tokens)
}

struct ExprParser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    fn eat(&mut self, tok: &Tok) -> bool {
        if self.tokens.get(self.pos) == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Option<Constraint> {
        let mut terms = vec![self.and()?];
        while self.eat(&Tok::Or) {
            terms.push(self.and()?);
        }
        Some(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Constraint::Or(terms)
        })
    }

    fn and(&mut self) -> Option<Constraint> {
        let mut terms = vec![self.not()?];
        while self.eat(&Tok::And) {
            terms.push(self.not()?);
        }
        Some(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Constraint::And(terms)
        })
    }

    fn not(&mut self) -> Option<Constraint> {
        if self.eat(&Tok::Not) {
            return Some(Constraint::Not(Box::new(self.not()?)));
        }
        if self.eat(&Tok::LParen) {
            let c = self.or()?;
            return self.eat(&Tok::RParen).then_some(c);
        }
        match self.tokens.get(self.pos)? {
            Tok::Tag(tag) => {
                let tag = tag.clone();
                self.pos += 1;
                Some(Constraint::Tag(tag))
            }
            _ => None,
        }
    }
}
