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

//! Placing packages into module parts.
//!
//! A module's packages normally all go in one part, emitted as one rule. When
//! that would make the module depend on itself through other modules, the
//! offending package is put in a new part instead. The part graph stays
//! acyclic as a result: a package only joins a part none of its imports
//! transitively depend on.

use std::collections::HashSet;

use crate::model::{GraphError, ModuleId, Modules, PackageId, PartId};

pub struct GraphResolver<'a> {
    modules: &'a mut Modules,
    root_module: String,
    /// Packages already placed, across every pass of a run.
    done: HashSet<PackageId>,
}

impl<'a> GraphResolver<'a> {
    pub fn new(modules: &'a mut Modules, root_module: impl Into<String>) -> Self {
        GraphResolver {
            modules,
            root_module: root_module.into(),
            done: HashSet::new(),
        }
    }

    pub fn modules(&self) -> &Modules {
        self.modules
    }

    pub fn modules_mut(&mut self) -> &mut Modules {
        self.modules
    }

    pub fn root_module(&self) -> &str {
        &self.root_module
    }

    /// Packages of the repository's own module never get parts.
    pub fn is_root_package(&self, pkg: PackageId) -> bool {
        !self.root_module.is_empty()
            && self
                .modules
                .package(pkg)
                .module
                .as_ref()
                .is_some_and(|m| m.path == self.root_module)
    }

    fn part_of(&mut self, pkg: PackageId) -> Result<Option<PartId>, GraphError> {
        if self.is_root_package(pkg) {
            return Ok(None);
        }
        self.modules.import(pkg).map(Some)
    }

    /// Whether `pkg`, or anything reachable from its part, lives in `part`.
    /// Everything visited is recorded in `done` and not visited again.
    pub fn depends_on(
        &mut self,
        done: &mut HashSet<PackageId>,
        pkg: PackageId,
        part: PartId,
    ) -> Result<bool, GraphError> {
        if !done.insert(pkg) {
            return Ok(false);
        }
        let Some(pkg_part) = self.part_of(pkg)? else {
            return Ok(false);
        };
        if pkg_part == part {
            return Ok(true);
        }
        let members: Vec<PackageId> = self.modules.part(pkg_part).packages.iter().copied().collect();
        for member in members {
            let imports: Vec<PackageId> = self.modules.package(member).imports.iter().copied().collect();
            for import in imports {
                if self.depends_on(done, import, part)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// The part `pkg` should go in: its existing part, a part installing it
    /// by wildcard, the first part none of its imports depend on, or a new
    /// part.
    fn get_or_create_module_part(
        &mut self,
        module: ModuleId,
        pkg: PackageId,
    ) -> Result<PartId, GraphError> {
        if let Some(part) = self.modules.assigned_part(pkg) {
            return Ok(part);
        }
        let parts = self.modules.module(module).parts.clone();
        if let Some(&part) = parts.iter().find(|&&p| self.modules.is_wildcard_import(p, pkg)) {
            return Ok(part);
        }
        let imports: Vec<PackageId> = self.modules.package(pkg).imports.iter().copied().collect();
        'parts: for part in parts {
            let mut done = HashSet::new();
            for &import in &imports {
                if self.part_of(import)? == Some(part) {
                    continue;
                }
                if self.depends_on(&mut done, import, part)? {
                    continue 'parts;
                }
            }
            return Ok(part);
        }
        Ok(self.modules.add_part(module))
    }

    /// Places `pkg` into a part of `module` and returns it. Placing a package
    /// twice returns the same part.
    pub fn assign(&mut self, module: ModuleId, pkg: PackageId) -> Result<PartId, GraphError> {
        let part = self.get_or_create_module_part(module, pkg)?;
        self.modules.set_assigned_part(pkg, part);
        if self.modules.part(part).packages.contains(&pkg) {
            return Ok(part);
        }
        let wildcard = self.modules.is_wildcard_import(part, pkg);
        let p = self.modules.part_mut(part);
        p.packages.insert(pkg);
        if !wildcard {
            p.modified = true;
        }
        Ok(part)
    }

    /// Places `pkg` after everything it imports.
    pub fn add_package_to_module_graph(
        &mut self,
        visiting: &mut HashSet<PackageId>,
        pkg: PackageId,
    ) -> Result<(), GraphError> {
        if self.done.contains(&pkg) {
            return Ok(());
        }
        if !visiting.insert(pkg) {
            return Err(GraphError::ImportCycle(self.modules.package(pkg).id.clone()));
        }
        let imports: Vec<PackageId> = self.modules.package(pkg).imports.iter().copied().collect();
        for import in imports {
            self.add_package_to_module_graph(visiting, import)?;
        }
        visiting.remove(&pkg);
        self.done.insert(pkg);

        let package = self.modules.package(pkg);
        let Some(module) = package.module.as_ref() else {
            return Err(GraphError::NoModule(vec![package.id.clone()]));
        };
        if self.is_root_package(pkg) || package.is_command {
            return Ok(());
        }
        let key = module.key();
        let module = self.modules.get_or_create_module(&key);
        self.assign(module, pkg)?;
        Ok(())
    }

    pub fn add_packages_to_modules(&mut self, roots: &[PackageId]) -> Result<(), GraphError> {
        let mut visiting = HashSet::new();
        for (i, &pkg) in roots.iter().enumerate() {
            log::debug!(
                "placing {} ({}/{})",
                self.modules.package(pkg).id,
                i + 1,
                roots.len()
            );
            self.add_package_to_module_graph(&mut visiting, pkg)?;
        }
        Ok(())
    }
}
