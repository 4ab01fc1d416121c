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

use std::cell::RefCell;
use std::collections::HashMap;

use godeps_util::version;

use super::{ProxyError, ProxySource};

/// An in-memory module proxy that records every request made to it.
#[derive(Default)]
pub struct MockProxy {
    modules: HashMap<String, Vec<(String, String)>>,
    queries: HashMap<(String, String), String>,
    requests: RefCell<Vec<String>>,
}

impl MockProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, path: &str, version: &str, go_mod: &str) -> &mut Self {
        self.modules
            .entry(path.to_string())
            .or_default()
            .push((version.to_string(), go_mod.to_string()));
        self
    }

    /// Adds `path@version` whose `go.mod` requires `deps`.
    pub fn add_module_full<'a>(
        &mut self,
        path: &'a str,
        version: &'a str,
        deps: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> &mut Self {
        let go_mod = create_mock_go_mod(path, deps, []);
        self.add_module(path, version, &go_mod)
    }

    /// Makes `path@query` name `version`.
    pub fn add_query(&mut self, path: &str, query: &str, version: &str) -> &mut Self {
        self.queries
            .insert((path.to_string(), query.to_string()), version.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

pub fn create_mock_go_mod<'a>(
    path: &'a str,
    deps: impl IntoIterator<Item = (&'a str, &'a str)>,
    replaces: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut s = format!("module {path}\n\ngo 1.21\n");
    for (dep, version) in deps {
        s.push_str(&format!("require {dep} {version}\n"));
    }
    for (old, new) in replaces {
        s.push_str(&format!("replace {old} => {new}\n"));
    }
    s
}

impl ProxySource for MockProxy {
    fn latest(&self, path: &str) -> Result<String, ProxyError> {
        self.requests.borrow_mut().push(format!("{path}/@latest"));
        self.modules
            .get(path)
            .and_then(|versions| {
                versions
                    .iter()
                    .map(|(v, _)| v)
                    .max_by(|a, b| version::compare(a, b))
                    .cloned()
            })
            .ok_or_else(|| ProxyError::ModuleNotFound(path.to_string()))
    }

    fn info(&self, path: &str, query: &str) -> Result<String, ProxyError> {
        self.requests
            .borrow_mut()
            .push(format!("{path}/@v/{query}.info"));
        self.queries
            .get(&(path.to_string(), query.to_string()))
            .cloned()
            .ok_or_else(|| ProxyError::ModuleNotFound(format!("{path}@{query}")))
    }

    fn go_mod(&self, path: &str, version: &str) -> Result<String, ProxyError> {
        self.requests
            .borrow_mut()
            .push(format!("{path}/@v/{version}.mod"));
        self.modules
            .get(path)
            .and_then(|versions| versions.iter().find(|(v, _)| v == version))
            .map(|(_, go_mod)| go_mod.clone())
            .ok_or_else(|| ProxyError::ModuleNotFound(format!("{path}@{version}")))
    }
}
