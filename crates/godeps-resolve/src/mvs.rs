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

//! Minimal version selection over the module proxy.
//!
//! Every module ends up at the highest version any reachable `go.mod`
//! requires of it, which is what Go's MVS selects. Requirements are recorded
//! before their own requires are walked, so cycles between modules terminate.

use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::rc::Rc;

use godeps_util::common::split_wildcard;
use godeps_util::modfile::{ModFile, ReplaceTarget};
use godeps_util::module::ModuleVersion;
use godeps_util::path::{self, has_path_prefix};
use godeps_util::version;
use indexmap::IndexMap;
use thiserror::Error;

use crate::model::PackageModule;
use crate::proxy::{ProxyClient, ProxyError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("module path must not be empty (requested version {version:?})")]
    EmptyModulePath { version: String },
    #[error("failed to fetch go.mod for {module}")]
    ManifestFetchFailure {
        module: ModuleVersion,
        #[source]
        source: ProxyError,
    },
    #[error("couldn't find module for package {package}")]
    NoModuleForPackage {
        package: String,
        #[source]
        source: ProxyError,
    },
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// A `replace` directive of a required module, with the replacement's path
/// already made absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub old: ReplaceTarget,
    pub new: ModuleVersion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub module: PackageModule,
    /// The module's own replace directives, keyed by the replaced path.
    pub replacements: IndexMap<String, Replacement>,
}

impl Requirement {
    fn new(path: &str, version: &str) -> Self {
        Requirement {
            module: PackageModule::new(path, version),
            replacements: IndexMap::new(),
        }
    }
}

pub struct VersionResolver {
    proxy: ProxyClient,
    requirements: HashMap<String, Requirement>,
}

impl VersionResolver {
    pub fn new(proxy: ProxyClient) -> Self {
        VersionResolver {
            proxy,
            requirements: HashMap::new(),
        }
    }

    pub fn proxy(&self) -> &ProxyClient {
        &self.proxy
    }

    pub fn requirement(&self, path: &str) -> Option<&Requirement> {
        self.requirements.get(path)
    }

    pub fn requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.values()
    }

    pub fn version_of(&self, path: &str) -> Option<&str> {
        self.requirements
            .get(path)
            .map(|r| r.module.version.as_str())
    }

    /// Modules already required whose path is a prefix of `pkg`, longest
    /// first.
    pub fn known_modules_for(&self, pkg: &str) -> Vec<&Requirement> {
        let (pkg, _) = split_wildcard(pkg);
        let mut found: Vec<_> = self
            .requirements
            .values()
            .filter(|r| has_path_prefix(pkg, &r.module.path))
            .collect();
        found.sort_by_key(|r| Reverse(r.module.path.len()));
        found
    }

    /// Requires `path` at `version` or higher. A request at or below the
    /// version already required is a no-op.
    pub fn resolve(&mut self, path: &str, version: &str) -> Result<(), ResolveError> {
        if path.is_empty() {
            return Err(ResolveError::EmptyModulePath {
                version: version.to_string(),
            });
        }
        if let Some(existing) = self.requirements.get(path)
            && version::compare(version, &existing.module.version) != Ordering::Greater
        {
            return Ok(());
        }

        log::debug!("-- Resolving {path}@{version}");
        let (version, manifest) = self.fetch_manifest(path, version)?;
        self.requirements
            .insert(path.to_string(), Requirement::new(path, &version));

        let mut replacements = IndexMap::new();
        for r in &manifest.replace {
            let new_version = r.new.version.clone().unwrap_or_else(|| version.clone());
            let new_path = if r.new.path.starts_with('.') {
                path::join(path, &r.new.path)
            } else {
                r.new.path.clone()
            };
            if new_path == path {
                continue;
            }
            match self.resolve(&new_path, &new_version) {
                Ok(()) => {
                    replacements.insert(
                        r.old.path.clone(),
                        Replacement {
                            old: r.old.clone(),
                            new: ModuleVersion::new(new_path, new_version),
                        },
                    );
                }
                Err(e) => log::warn!(
                    "ignoring replacement of {} by {new_path}@{new_version} in {path}@{version}: {e}",
                    r.old.path
                ),
            }
        }

        // Visible to manifests that lead back here while requires are walked.
        if let Some(req) = self.requirements.get_mut(path)
            && req.module.version == version
        {
            req.replacements = replacements.clone();
        }

        for req in &manifest.require {
            if replacements.contains_key(&req.path) {
                continue;
            }
            self.resolve(&req.path, &req.version)?;
        }
        Ok(())
    }

    /// Fetches the manifest, falling back to the `+incompatible` form used by
    /// `v2+` modules that predate `go.mod`.
    fn fetch_manifest(
        &self,
        path: &str,
        version: &str,
    ) -> Result<(String, Rc<ModFile>), ResolveError> {
        let first = match self.proxy.manifest(path, version) {
            Ok(m) => return Ok((version.to_string(), m)),
            Err(e) => e,
        };
        let incompatible = version::incompatible(version);
        if incompatible != version
            && let Ok(m) = self.proxy.manifest(path, &incompatible)
        {
            return Ok((incompatible, m));
        }
        Err(ResolveError::ManifestFetchFailure {
            module: ModuleVersion::new(path, version),
            source: first,
        })
    }

    /// Records a module provided by an existing build rule. Returns whether
    /// it was accepted, i.e. is at least as new as any existing requirement.
    pub fn seed(&mut self, module: &ModuleVersion) -> bool {
        match self.requirements.get_mut(&module.path) {
            Some(existing)
                if version::compare(&module.version, &existing.module.version)
                    == Ordering::Less =>
            {
                false
            }
            Some(existing) => {
                existing.module.version = module.version.clone();
                true
            }
            None => {
                self.requirements.insert(
                    module.path.clone(),
                    Requirement::new(&module.path, &module.version),
                );
                true
            }
        }
    }

    /// Resolves `pkg[@version]` patterns and returns them without versions.
    ///
    /// Without a version, or with `@latest`, the module's latest version is
    /// required. A version starting `vN` is taken as it is. Anything else
    /// (a commit, branch or tag) is turned into its pseudo-version first.
    pub fn resolve_get_patterns(
        &mut self,
        patterns: &[String],
    ) -> Result<Vec<String>, ResolveError> {
        let mut packages = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let (pkg, version) = match pattern.split_once('@') {
                Some((pkg, version)) => (pkg, Some(version)),
                None => (pattern.as_str(), None),
            };
            packages.push(pkg.to_string());
            let module = self.proxy.module_for_package(pkg).map_err(|source| {
                ResolveError::NoModuleForPackage {
                    package: pkg.to_string(),
                    source,
                }
            })?;
            match version {
                None | Some("latest") => {
                    let latest = self.proxy.latest_version(&module)?;
                    self.resolve(&module, &latest)?;
                }
                Some(v) if version::has_version_prefix(v) => self.resolve(&module, v)?,
                Some(query) => {
                    let pseudo = self.proxy.query_version(&module, query)?;
                    self.resolve(&module, &pseudo)?;
                }
            }
        }
        Ok(packages)
    }
}
