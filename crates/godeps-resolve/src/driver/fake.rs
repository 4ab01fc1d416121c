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

use std::collections::HashSet;
use std::path::PathBuf;

use godeps_util::common::{is_std_import, split_wildcard};
use godeps_util::path::has_path_prefix;
use indexmap::IndexMap;

use super::{DriverError, DriverResponse, LoadedPackage, PackageDriver};
use crate::model::PackageModule;

/// A driver over a fixed table of packages.
#[derive(Default)]
pub struct FakeDriver {
    packages: IndexMap<String, LoadedPackage>,
    pub calls: Vec<Vec<String>>,
    /// How many of `calls` came through `reload`.
    pub reloads: usize,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds library package `id` of `module` (`"path@version"`, or just the
    /// path for the main module).
    pub fn add_package(&mut self, module: &str, id: &str, imports: &[&str]) -> &mut Self {
        let name = id.rsplit('/').next().unwrap_or(id).replace('-', "_");
        self.add(module, id, &name, imports)
    }

    pub fn add_command(&mut self, module: &str, id: &str, imports: &[&str]) -> &mut Self {
        self.add(module, id, "main", imports)
    }

    fn add(&mut self, module: &str, id: &str, name: &str, imports: &[&str]) -> &mut Self {
        let module = match module.split_once('@') {
            Some((path, version)) => Some(PackageModule::new(path, version)),
            None => None,
        };
        self.packages.insert(
            id.to_string(),
            LoadedPackage {
                id: id.to_string(),
                name: name.to_string(),
                module,
                imports: imports.iter().map(|s| s.to_string()).collect(),
                go_files: vec![PathBuf::from(format!("/src/{id}/{name}.go"))],
                other_files: Vec::new(),
            },
        );
        self
    }
}

impl PackageDriver for FakeDriver {
    fn load(&mut self, patterns: &[String]) -> Result<DriverResponse, DriverError> {
        self.calls.push(patterns.to_vec());
        let mut roots = Vec::new();
        for pattern in patterns {
            let pattern = pattern.split('@').next().unwrap_or_default();
            match split_wildcard(pattern) {
                (root, true) => roots.extend(
                    self.packages
                        .keys()
                        .filter(|id| has_path_prefix(id, root))
                        .cloned(),
                ),
                (id, false) if self.packages.contains_key(id) => roots.push(id.to_string()),
                _ => {}
            }
        }
        let mut packages = IndexMap::new();
        let mut seen = HashSet::new();
        let mut stack = roots.clone();
        while let Some(id) = stack.pop() {
            if is_std_import(&id) || !seen.insert(id.clone()) {
                continue;
            }
            if let Some(pkg) = self.packages.get(&id) {
                stack.extend(pkg.imports.iter().cloned());
                packages.insert(id, pkg.clone());
            }
        }
        Ok(DriverResponse { roots, packages })
    }

    fn reload(&mut self, patterns: &[String]) -> Result<DriverResponse, DriverError> {
        self.reloads += 1;
        self.load(patterns)
    }
}
