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

//! The persistent module graph: packages, modules and the parts modules are
//! split into. Rules read from BUILD files populate it, resolution extends it
//! and the emitter writes it back out.

use std::collections::HashMap;
use std::path::PathBuf;

use godeps_util::module::ModuleVersion;
use godeps_util::path::{has_path_prefix, join};
use indexmap::{IndexMap, IndexSet};
use slotmap::SlotMap;
use thiserror::Error;

slotmap::new_key_type! {
    /// A Go package, by import path.
    pub struct PackageId;
    /// A module, or a module as replaced by another.
    pub struct ModuleId;
    /// One cycle-free slice of a module, emitted as a single rule.
    pub struct PartId;
}

/// Identity of a module. A module replaced for one importer and used
/// directly by another are two distinct modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    pub path: String,
    pub replace: Option<String>,
}

impl ModuleKey {
    pub fn new(path: impl Into<String>) -> Self {
        ModuleKey {
            path: path.into(),
            replace: None,
        }
    }
}

/// The module a loaded package belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageModule {
    pub path: String,
    pub version: String,
    /// Where the sources really come from, if the module is replaced.
    pub replace: Option<ModuleVersion>,
}

impl PackageModule {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        PackageModule {
            path: path.into(),
            version: version.into(),
            replace: None,
        }
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey {
            path: self.path.clone(),
            replace: self.replace.as_ref().map(|r| r.path.clone()),
        }
    }

    /// The module version whose sources back this module.
    pub fn source(&self) -> ModuleVersion {
        self.replace
            .clone()
            .unwrap_or_else(|| ModuleVersion::new(&self.path, &self.version))
    }

    /// The version rules should record.
    pub fn effective_version(&self) -> &str {
        self.replace
            .as_ref()
            .map_or(self.version.as_str(), |r| r.version.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Package {
    pub id: String,
    pub module: Option<PackageModule>,
    pub imports: IndexSet<PackageId>,
    pub go_files: Vec<PathBuf>,
    pub other_files: Vec<PathBuf>,
    /// Declares `package main`. Never installed, but its imports are.
    pub is_command: bool,
    /// Loaded from source during this run, as opposed to only known from
    /// existing rules.
    pub resolved: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub replaced_by: Option<String>,
    pub version: String,
    pub licence: Option<String>,
    pub parts: Vec<PartId>,
}

#[derive(Debug, Clone)]
pub struct ModulePart {
    pub module: ModuleId,
    /// 1-based position within the module's parts.
    pub index: usize,
    pub packages: IndexSet<PackageId>,
    /// Sub-directories installed with `/...`; `""` is the whole module.
    pub install_wildcards: Vec<String>,
    /// Needs its rule written back out.
    pub modified: bool,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no module found for packages: {}", .0.join(", "))]
    NoModule(Vec<String>),
    #[error("no module for {package}, imported by {importer}; has the module been downloaded?")]
    NoModuleForImport { package: String, importer: String },
    #[error("no module part contains package {0}")]
    NoPart(String),
    #[error("import cycle through package {0}")]
    ImportCycle(String),
}

#[derive(Debug, Default)]
pub struct Modules {
    packages: SlotMap<PackageId, Package>,
    package_ids: HashMap<String, PackageId>,
    modules: SlotMap<ModuleId, Module>,
    module_ids: IndexMap<ModuleKey, ModuleId>,
    parts: SlotMap<PartId, ModulePart>,
    /// Which part each package was placed in.
    import_paths: HashMap<PackageId, PartId>,
}

impl Modules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_package(&mut self, id: &str) -> PackageId {
        if let Some(&pid) = self.package_ids.get(id) {
            return pid;
        }
        let pid = self.packages.insert(Package {
            id: id.to_string(),
            ..Default::default()
        });
        self.package_ids.insert(id.to_string(), pid);
        pid
    }

    pub fn package_id(&self, id: &str) -> Option<PackageId> {
        self.package_ids.get(id).copied()
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id]
    }

    pub fn package_mut(&mut self, id: PackageId) -> &mut Package {
        &mut self.packages[id]
    }

    pub fn get_or_create_module(&mut self, key: &ModuleKey) -> ModuleId {
        if let Some(&mid) = self.module_ids.get(key) {
            return mid;
        }
        let mid = self.modules.insert(Module {
            name: key.path.clone(),
            replaced_by: key.replace.clone(),
            ..Default::default()
        });
        self.module_ids.insert(key.clone(), mid);
        mid
    }

    pub fn module_id(&self, key: &ModuleKey) -> Option<ModuleId> {
        self.module_ids.get(key).copied()
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id]
    }

    /// Modules in the order they were first seen.
    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.module_ids.values().copied()
    }

    /// Appends a new, empty part to `module`.
    pub fn add_part(&mut self, module: ModuleId) -> PartId {
        let index = self.modules[module].parts.len() + 1;
        let part = self.parts.insert(ModulePart {
            module,
            index,
            packages: IndexSet::new(),
            install_wildcards: Vec::new(),
            modified: true,
        });
        self.modules[module].parts.push(part);
        part
    }

    pub fn part(&self, id: PartId) -> &ModulePart {
        &self.parts[id]
    }

    pub fn part_mut(&mut self, id: PartId) -> &mut ModulePart {
        &mut self.parts[id]
    }

    pub fn part_ids(&self) -> impl Iterator<Item = PartId> + '_ {
        self.parts.keys()
    }

    pub fn assigned_part(&self, pkg: PackageId) -> Option<PartId> {
        self.import_paths.get(&pkg).copied()
    }

    pub fn set_assigned_part(&mut self, pkg: PackageId, part: PartId) {
        self.import_paths.insert(pkg, part);
    }

    pub fn is_modified(&self, module: ModuleId) -> bool {
        self.modules[module]
            .parts
            .iter()
            .any(|&p| self.parts[p].modified)
    }

    /// The wildcard install of `part` covering `pkg`, if any.
    pub fn wildcard_import(&self, part: PartId, pkg: PackageId) -> Option<&str> {
        let part = &self.parts[part];
        let module = &self.modules[part.module];
        let id = &self.packages[pkg].id;
        part.install_wildcards
            .iter()
            .find(|wc| has_path_prefix(id, &join(&module.name, wc)))
            .map(String::as_str)
    }

    pub fn is_wildcard_import(&self, part: PartId, pkg: PackageId) -> bool {
        self.wildcard_import(part, pkg).is_some()
    }

    /// The module `pkg` belongs to, if it has one and the module is known.
    pub fn module_of(&self, pkg: PackageId) -> Option<ModuleId> {
        let key = self.packages[pkg].module.as_ref()?.key();
        self.module_id(&key)
    }

    /// Finds the part providing `pkg` without recording the answer.
    pub fn find_part(&self, pkg: PackageId) -> Result<PartId, GraphError> {
        if let Some(part) = self.assigned_part(pkg) {
            return Ok(part);
        }
        let no_part = || GraphError::NoPart(self.packages[pkg].id.clone());
        let module = self.module_of(pkg).ok_or_else(no_part)?;
        self.modules[module]
            .parts
            .iter()
            .copied()
            .find(|&part| self.is_wildcard_import(part, pkg))
            .ok_or_else(no_part)
    }

    /// Like [`Modules::find_part`], remembering wildcard matches.
    pub fn import(&mut self, pkg: PackageId) -> Result<PartId, GraphError> {
        let part = self.find_part(pkg)?;
        self.import_paths.insert(pkg, part);
        Ok(part)
    }
}
