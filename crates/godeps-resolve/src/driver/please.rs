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

use godeps_util::common::{CGO_IMPORT, is_std_import, split_wildcard};
use godeps_util::gosrc::{self, BuildContext, ScanError};
use godeps_util::module::ModuleVersion;
use godeps_util::path::{has_path_prefix, join, to_slash, trim_path_prefix};
use indexmap::IndexMap;
use walkdir::WalkDir;

use super::{DriverError, DriverResponse, LoadedPackage, PackageDriver};
use crate::download::ModuleSources;
use crate::local_rules::LocalRules;
use crate::model::PackageModule;
use crate::mvs::{Requirement, VersionResolver};

/// Where a package's sources live and which requirement provides them.
#[derive(Debug, Clone)]
struct PackageInfo {
    id: String,
    src_root: PathBuf,
    pkg_dir: PathBuf,
    requirement: Requirement,
}

/// Loads packages from module sources fetched through the module proxy or
/// built from the repository's existing `go_module` rules.
///
/// Module requirements persist across calls to [`PackageDriver::load`];
/// loaded packages are only remembered within one call.
pub struct PleaseDriver {
    resolver: VersionResolver,
    sources: Box<dyn ModuleSources>,
    local_rules: Box<dyn LocalRules>,
    build_ctx: BuildContext,
    packages: IndexMap<String, LoadedPackage>,
    skipped: HashSet<String>,
    loading: HashSet<String>,
    local_rules_loaded: bool,
}

impl PleaseDriver {
    pub fn new(
        resolver: VersionResolver,
        sources: Box<dyn ModuleSources>,
        local_rules: Box<dyn LocalRules>,
        build_ctx: BuildContext,
    ) -> Self {
        PleaseDriver {
            resolver,
            sources,
            local_rules,
            build_ctx,
            packages: IndexMap::new(),
            skipped: HashSet::new(),
            loading: HashSet::new(),
            local_rules_loaded: false,
        }
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Seeds requirements from existing `go_module` rules. A rule older than
    /// what resolution already asked for is ignored.
    fn load_local_modules(&mut self) -> Result<(), DriverError> {
        for local in self.local_rules.query_modules()? {
            if self.resolver.seed(&local.module) {
                log::debug!("using {} for {}", local.label, local.module);
                self.sources.add_local_module(local);
            } else {
                log::debug!(
                    "not using {} for {}, a newer version is required",
                    local.label,
                    local.module
                );
            }
        }
        Ok(())
    }

    /// The longest known module that really contains `id` on disk.
    fn find_package_in_known_modules(&mut self, id: &str) -> Option<String> {
        let candidates: Vec<ModuleVersion> = self
            .resolver
            .known_modules_for(id)
            .into_iter()
            .map(|r| r.module.source())
            .collect();
        for module in candidates {
            match self.sources.ensure_downloaded(&module) {
                Ok(root) if root.join(trim_path_prefix(id, &module.path)).is_dir() => {
                    return Some(module.path);
                }
                Ok(_) => {}
                Err(e) => log::debug!("{module} can't provide {id}: {e}"),
            }
        }
        None
    }

    fn module_for_package(&mut self, id: &str) -> Result<Requirement, DriverError> {
        let module = match self.find_package_in_known_modules(id) {
            Some(module) => module,
            None => self.resolver.proxy().module_for_package(id).map_err(|source| {
                crate::mvs::ResolveError::NoModuleForPackage {
                    package: id.to_string(),
                    source,
                }
            })?,
        };
        if self.resolver.requirement(&module).is_none() {
            let latest = self
                .resolver
                .proxy()
                .latest_version(&module)
                .map_err(crate::mvs::ResolveError::from)?;
            self.resolver.resolve(&module, &latest)?;
        }
        self.resolver
            .requirement(&module)
            .cloned()
            .ok_or(DriverError::MissingRequirement(module))
    }

    /// Routes `id` through the importing module's replace directives, or
    /// through the importer itself being replaced.
    fn check_replace(
        &mut self,
        from: &Requirement,
        id: &str,
    ) -> Result<Option<PackageInfo>, DriverError> {
        let mut routes: Vec<(String, String, ModuleVersion)> = Vec::new();
        if let Some(replace) = &from.module.replace {
            routes.push((
                from.module.path.clone(),
                from.module.version.clone(),
                replace.clone(),
            ));
        }
        for r in from.replacements.values() {
            routes.push((
                r.old.path.clone(),
                r.old.version.clone().unwrap_or_default(),
                r.new.clone(),
            ));
        }

        for (old_path, old_version, new) in routes {
            if !has_path_prefix(id, &old_path) {
                continue;
            }
            let target = self
                .resolver
                .requirement(&new.path)
                .map(|r| r.module.source())
                .ok_or_else(|| DriverError::MissingRequirement(new.path.clone()))?;
            let src_root = self.sources.ensure_downloaded(&target)?;
            let pkg_dir = src_root.join(trim_path_prefix(id, &old_path));
            if pkg_dir.is_dir() {
                let module = PackageModule {
                    path: old_path,
                    version: old_version,
                    replace: Some(target),
                };
                return Ok(Some(PackageInfo {
                    id: id.to_string(),
                    src_root,
                    pkg_dir,
                    requirement: Requirement {
                        module,
                        replacements: IndexMap::new(),
                    },
                }));
            }
        }
        Ok(None)
    }

    /// Finds the sources of `id`. `None` for the standard library.
    fn pkg_info(
        &mut self,
        from: Option<&Requirement>,
        id: &str,
    ) -> Result<Option<PackageInfo>, DriverError> {
        if is_std_import(id) {
            return Ok(None);
        }
        if let Some(from) = from
            && let Some(info) = self.check_replace(from, id)?
        {
            return Ok(Some(info));
        }
        let requirement = self.module_for_package(id)?;
        let src_root = self.sources.ensure_downloaded(&requirement.module.source())?;
        let pkg_dir = src_root.join(trim_path_prefix(id, &requirement.module.path));
        Ok(Some(PackageInfo {
            id: id.to_string(),
            src_root,
            pkg_dir,
            requirement,
        }))
    }

    fn load_pattern(&mut self, pattern: &str) -> Result<Vec<String>, DriverError> {
        let (root, walk) = split_wildcard(pattern);
        let Some(info) = self.pkg_info(None, root)? else {
            log::warn!("ignoring standard library pattern {pattern}");
            return Ok(Vec::new());
        };
        if !walk {
            return Ok(if self.load_package(&info)? {
                vec![info.id]
            } else {
                Vec::new()
            });
        }

        let mut roots = Vec::new();
        let walker = WalkDir::new(&info.pkg_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || (e.file_type().is_dir() && !is_ignored_dir(&e.file_name().to_string_lossy()))
            });
        for entry in walker {
            let entry = entry.map_err(|e| DriverError::Scan {
                package: pattern.to_string(),
                source: ScanError::Io {
                    path: info.pkg_dir.clone(),
                    source: e.into(),
                },
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&info.src_root)
                .map(to_slash)
                .unwrap_or_default();
            let id = join(&info.requirement.module.path, &rel);
            let Some(sub) = self.pkg_info(None, &id)? else {
                continue;
            };
            if self.load_package(&sub)? {
                roots.push(id);
            }
        }
        Ok(roots)
    }

    /// Loads a package and its imports. Returns `false` if the package was
    /// left out: it has no buildable sources, or it uses cgo.
    fn load_package(&mut self, info: &PackageInfo) -> Result<bool, DriverError> {
        if self.packages.contains_key(&info.id) || self.loading.contains(&info.id) {
            return Ok(true);
        }
        if self.skipped.contains(&info.id) {
            return Ok(false);
        }
        log::debug!("analysing {}", info.id);
        let src = match gosrc::import_dir(&info.pkg_dir, &self.build_ctx) {
            Ok(src) => src,
            Err(ScanError::NoBuildableSource { .. }) => {
                log::debug!("no buildable sources in {}", info.id);
                self.skipped.insert(info.id.clone());
                return Ok(false);
            }
            Err(source) => {
                return Err(DriverError::Scan {
                    package: info.id.clone(),
                    source,
                });
            }
        };
        if src.imports.iter().any(|i| i == CGO_IMPORT) {
            log::debug!("skipping {}, it uses cgo", info.id);
            self.skipped.insert(info.id.clone());
            return Ok(false);
        }

        self.loading.insert(info.id.clone());
        let mut imports = Vec::with_capacity(src.imports.len());
        for import in &src.imports {
            let loaded = self
                .pkg_info(Some(&info.requirement), import)
                .and_then(|dep| match dep {
                    Some(dep) => self.load_package(&dep),
                    None => Ok(true),
                })
                .map_err(|e| e.imported(import, &info.id))?;
            if loaded {
                imports.push(import.clone());
            }
        }
        self.loading.remove(&info.id);

        let dir = std::path::absolute(&info.pkg_dir).unwrap_or_else(|_| info.pkg_dir.clone());
        let module = info.requirement.module.clone();
        self.packages.insert(
            info.id.clone(),
            LoadedPackage {
                id: info.id.clone(),
                name: src.name,
                module: Some(module),
                imports,
                go_files: src.go_files.iter().map(|f| dir.join(f)).collect(),
                other_files: src.other_files.iter().map(|f| dir.join(f)).collect(),
            },
        );
        Ok(true)
    }
}

/// Directories a `/...` pattern doesn't descend into.
fn is_ignored_dir(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_') || name == "testdata"
}

impl PleaseDriver {
    fn load_patterns(&mut self, patterns: &[String]) -> Result<DriverResponse, DriverError> {
        if !self.local_rules_loaded {
            self.load_local_modules()?;
            self.local_rules_loaded = true;
        }
        let mut roots = Vec::new();
        for pattern in patterns {
            roots.extend(self.load_pattern(pattern)?);
        }
        Ok(DriverResponse {
            roots,
            packages: std::mem::take(&mut self.packages),
        })
    }
}

impl PackageDriver for PleaseDriver {
    fn load(&mut self, patterns: &[String]) -> Result<DriverResponse, DriverError> {
        self.packages.clear();
        self.skipped.clear();
        let packages = self.resolver.resolve_get_patterns(patterns)?;
        self.load_patterns(&packages)
    }

    fn reload(&mut self, patterns: &[String]) -> Result<DriverResponse, DriverError> {
        self.packages.clear();
        self.skipped.clear();
        self.load_patterns(patterns)
    }
}
