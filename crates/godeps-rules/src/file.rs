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

//! BUILD files as a list of rule calls over the original text.

use std::fmt::Write;
use std::ops::Range;

use indexmap::IndexMap;

use crate::parser::{self, ParseError};

const INDENT: &str = "    ";

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Expr>),
    /// Any other expression, as written.
    Raw(String),
}

impl Expr {
    pub fn string_list<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> Self {
        Expr::List(
            items
                .into_iter()
                .map(|s| Expr::Str(s.as_ref().to_string()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The list's strings, if every element is one.
    pub fn as_string_list(&self) -> Option<Vec<&str>> {
        match self {
            Expr::List(items) => items.iter().map(Expr::as_str).collect(),
            _ => None,
        }
    }

    fn render(&self, out: &mut String, indent: usize) {
        match self {
            Expr::Str(s) => quote(out, s),
            Expr::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Expr::Bool(true) => out.push_str("True"),
            Expr::Bool(false) => out.push_str("False"),
            Expr::Raw(raw) => out.push_str(raw),
            Expr::List(items) if items.is_empty() => out.push_str("[]"),
            Expr::List(items) if items.len() == 1 && !matches!(items[0], Expr::List(_)) => {
                out.push('[');
                items[0].render(out, indent);
                out.push(']');
            }
            Expr::List(items) => {
                out.push_str("[\n");
                for item in items {
                    out.push_str(&INDENT.repeat(indent + 1));
                    item.render(out, indent + 1);
                    out.push_str(",\n");
                }
                out.push_str(&INDENT.repeat(indent));
                out.push(']');
            }
        }
    }
}

fn quote(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// A top-level call such as `go_module(name = "x", ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub kind: String,
    pub positional: Vec<Expr>,
    attrs: IndexMap<String, Expr>,
    /// Where the rule is in the file it was read from.
    span: Option<Range<usize>>,
    /// Line the rule starts on, for messages.
    pub line: usize,
    dirty: bool,
}

impl Rule {
    pub fn new(kind: &str, name: &str) -> Self {
        let mut attrs = IndexMap::new();
        attrs.insert("name".to_string(), Expr::Str(name.to_string()));
        Rule {
            kind: kind.to_string(),
            positional: Vec::new(),
            attrs,
            span: None,
            line: 0,
            dirty: true,
        }
    }

    pub(crate) fn parsed(
        kind: String,
        positional: Vec<Expr>,
        attrs: IndexMap<String, Expr>,
        span: Range<usize>,
        line: usize,
    ) -> Self {
        Rule {
            kind,
            positional,
            attrs,
            span: Some(span),
            line,
            dirty: false,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.attr_str("name")
    }

    pub fn attr(&self, key: &str) -> Option<&Expr> {
        self.attrs.get(key)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Expr::as_str)
    }

    pub fn attr_strings(&self, key: &str) -> Option<Vec<&str>> {
        self.attrs.get(key).and_then(Expr::as_string_list)
    }

    pub fn attr_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Sets `key`, keeping its position if already present.
    pub fn set_attr(&mut self, key: &str, value: Expr) {
        if self.attrs.get(key) != Some(&value) {
            self.attrs.insert(key.to_string(), value);
            self.dirty = true;
        }
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.set_attr(key, Expr::Str(value.to_string()));
    }

    pub fn set_strings<S: AsRef<str>>(&mut self, key: &str, values: impl IntoIterator<Item = S>) {
        self.set_attr(key, Expr::string_list(values));
    }

    pub fn del_attr(&mut self, key: &str) {
        if self.attrs.shift_remove(key).is_some() {
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.kind);
        if self.positional.is_empty() && self.attrs.is_empty() {
            out.push_str("()");
            return out;
        }
        out.push_str("(\n");
        for arg in &self.positional {
            out.push_str(INDENT);
            arg.render(&mut out, 1);
            out.push_str(",\n");
        }
        for (key, value) in &self.attrs {
            out.push_str(INDENT);
            out.push_str(key);
            out.push_str(" = ");
            value.render(&mut out, 1);
            out.push_str(",\n");
        }
        out.push(')');
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildFile {
    source: String,
    rules: Vec<Rule>,
}

impl BuildFile {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let rules = parser::parse(source)?;
        Ok(BuildFile {
            source: source.to_string(),
            rules,
        })
    }

    pub fn rules(&self) -> impl Iterator<Item = (usize, &Rule)> {
        self.rules.iter().enumerate()
    }

    pub fn rules_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = (usize, &'a Rule)> {
        self.rules().filter(move |(_, r)| r.kind == kind)
    }

    pub fn rule(&self, index: usize) -> &Rule {
        &self.rules[index]
    }

    pub fn rule_mut(&mut self, index: usize) -> &mut Rule {
        &mut self.rules[index]
    }

    /// Adds a rule at the end of the file, returning its index.
    pub fn add_rule(&mut self, rule: Rule) -> usize {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    pub fn is_changed(&self) -> bool {
        self.rules.iter().any(|r| r.is_dirty() || r.span.is_none())
    }

    /// The file with changed rules rewritten and new ones appended. Text
    /// outside changed rules is kept as it was.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for rule in &self.rules {
            let Some(span) = &rule.span else {
                continue;
            };
            out.push_str(&self.source[cursor..span.start]);
            if rule.dirty {
                out.push_str(&rule.render());
            } else {
                out.push_str(&self.source[span.clone()]);
            }
            cursor = span.end;
        }
        out.push_str(&self.source[cursor..]);

        for rule in self.rules.iter().filter(|r| r.span.is_none()) {
            let trimmed = out.trim_end_matches('\n').len();
            out.truncate(trimmed);
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&rule.render());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_rules() {
        let mut rule = Rule::new("go_module", "x");
        rule.set_str("module", "github.com/x/y");
        rule.set_strings("install", ["b", "a/..."]);
        rule.set_strings("visibility", ["PUBLIC"]);
        rule.set_attr("binary", Expr::Bool(true));
        rule.set_strings("deps", Vec::<String>::new());
        expect_test::expect![[r#"
            go_module(
                name = "x",
                module = "github.com/x/y",
                install = [
                    "b",
                    "a/...",
                ],
                visibility = ["PUBLIC"],
                binary = True,
                deps = [],
            )"#]]
        .assert_eq(&rule.render());
    }

    #[test]
    fn untouched_text_is_kept() {
        let source = r#"# Third party Go modules
load("//build_defs:go.build_defs", "go_thing")

go_module(
  name = "a",   # keep me
  module = "a.com/a",
  version = "v1.0.0",
)

VERSION = "1.2"

go_module(name = "b", module = "b.com/b", version = "v0.1.0")
"#;
        let mut file = BuildFile::parse(source).unwrap();
        assert_eq!(file.render(), source);

        // Setting an attribute to its current value changes nothing.
        file.rule_mut(1).set_str("module", "a.com/a");
        assert_eq!(file.render(), source);

        file.rule_mut(2).set_str("version", "v0.2.0");
        file.add_rule(Rule::new("go_mod_download", "c_dl"));
        expect_test::expect![[r#"
            # Third party Go modules
            load("//build_defs:go.build_defs", "go_thing")

            go_module(
              name = "a",   # keep me
              module = "a.com/a",
              version = "v1.0.0",
            )

            VERSION = "1.2"

            go_module(
                name = "b",
                module = "b.com/b",
                version = "v0.2.0",
            )

            go_mod_download(
                name = "c_dl",
            )
        "#]]
        .assert_eq(&file.render());
    }

    #[test]
    fn new_files() {
        let mut file = BuildFile::default();
        file.add_rule(Rule::new("go_module", "a"));
        file.add_rule(Rule::new("go_module", "b"));
        assert_eq!(
            file.render(),
            "go_module(\n    name = \"a\",\n)\n\ngo_module(\n    name = \"b\",\n)\n"
        );
    }
}
