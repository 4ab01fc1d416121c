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

//! Attributing licences to modules.

pub mod classifier;

use std::path::{Path, PathBuf};

pub use classifier::{LicenceClassifier, TextClassifier};
use godeps_util::module::ModuleVersion;
use thiserror::Error;

use crate::download::{DownloadError, ModuleSources};
use crate::model::{ModuleId, Modules};

#[derive(Debug, Error)]
pub enum LicenceError {
    #[error("no licence file found for {}", .dir.display())]
    NotFound { dir: PathBuf },
    #[error("couldn't identify the licence in {}", .file.display())]
    Unrecognised { file: PathBuf },
    #[error("no source files to look for a licence next to")]
    NoSource,
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// A module whose licence couldn't be established.
#[derive(Debug)]
pub struct LicenceWarning {
    pub module: String,
    pub error: LicenceError,
}

impl std::fmt::Display for LicenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to determine licence for {}: {}", self.module, self.error)
    }
}

/// A directory holding some of the module's sources.
fn representative_dir(modules: &Modules, module: ModuleId) -> Option<&Path> {
    modules
        .module(module)
        .parts
        .iter()
        .flat_map(|&part| modules.part(part).packages.iter())
        .map(|&pkg| modules.package(pkg))
        .find_map(|pkg| {
            pkg.go_files
                .first()
                .or_else(|| pkg.other_files.first())
                .and_then(|file| file.parent())
        })
}

fn warn(module: &str, error: LicenceError) -> LicenceWarning {
    let warning = LicenceWarning {
        module: module.to_string(),
        error,
    };
    tracing::warn!("{warning}");
    warning
}

/// Identifies the licence of every modified module that doesn't have one.
pub fn set_licences(
    modules: &mut Modules,
    root_module: &str,
    classifier: &dyn LicenceClassifier,
) -> Vec<LicenceWarning> {
    let mut warnings = Vec::new();
    let ids: Vec<ModuleId> = modules.module_ids().collect();
    for mid in ids {
        let module = modules.module(mid);
        if !modules.is_modified(mid)
            || module.licence.as_deref().is_some_and(|l| !l.is_empty())
            || module.name == root_module
        {
            continue;
        }
        let name = module.name.clone();
        let found = match representative_dir(modules, mid) {
            Some(dir) => classifier.identify(dir),
            None => Err(LicenceError::NoSource),
        };
        match found {
            Ok(licence) => {
                log::debug!("{name} is licensed {licence}");
                modules.module_mut(mid).licence = Some(licence);
            }
            Err(e) => warnings.push(warn(&name, e)),
        }
    }
    warnings
}

/// Re-identifies the licence of every module at its source root, marking all
/// parts for rewriting.
pub fn refresh_all_licences(
    modules: &mut Modules,
    sources: &mut dyn ModuleSources,
    classifier: &dyn LicenceClassifier,
) -> Vec<LicenceWarning> {
    let mut warnings = Vec::new();
    let ids: Vec<ModuleId> = modules.module_ids().collect();
    for mid in ids {
        let module = modules.module(mid);
        let name = module.name.clone();
        let source = ModuleVersion::new(
            module.replaced_by.as_deref().unwrap_or(&module.name),
            module.version.as_str(),
        );
        for part in module.parts.clone() {
            modules.part_mut(part).modified = true;
        }
        tracing::info!("Adding licence for {source}");
        let found = sources
            .ensure_downloaded(&source)
            .map_err(LicenceError::from)
            .and_then(|dir| classifier.identify(&dir));
        match found {
            Ok(licence) => modules.module_mut(mid).licence = Some(licence),
            Err(e) => warnings.push(warn(&name, e)),
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::DirectorySources;
    use crate::licence::classifier::CountingClassifier;
    use crate::model::{ModuleKey, PackageModule};

    fn module_with_package(modules: &mut Modules, path: &str, modified: bool) -> ModuleId {
        let mid = modules.get_or_create_module(&ModuleKey::new(path));
        modules.module_mut(mid).version = "v1.0.0".into();
        let part = modules.add_part(mid);
        modules.part_mut(part).modified = modified;
        let pkg = modules.get_or_create_package(&format!("{path}/pkg"));
        let p = modules.package_mut(pkg);
        p.module = Some(PackageModule::new(path, "v1.0.0"));
        p.go_files = vec![PathBuf::from(format!("/src/{path}/pkg/pkg.go"))];
        modules.part_mut(part).packages.insert(pkg);
        mid
    }

    #[test]
    fn only_modified_unlicensed_modules_are_classified() {
        let mut modules = Modules::new();
        let fresh = module_with_package(&mut modules, "fresh.com/m", true);
        let untouched = module_with_package(&mut modules, "old.com/m", false);
        let licensed = module_with_package(&mut modules, "done.com/m", true);
        modules.module_mut(licensed).licence = Some("BSD-3-Clause".into());
        module_with_package(&mut modules, "example.com/app", true);

        let classifier = CountingClassifier::new("Apache-2.0");
        let warnings = set_licences(&mut modules, "example.com/app", &classifier);
        assert!(warnings.is_empty());
        assert_eq!(classifier.calls(), vec![PathBuf::from("/src/fresh.com/m/pkg")]);
        assert_eq!(modules.module(fresh).licence.as_deref(), Some("Apache-2.0"));
        assert_eq!(modules.module(untouched).licence, None);
        assert_eq!(modules.module(licensed).licence.as_deref(), Some("BSD-3-Clause"));
    }

    #[test]
    fn failures_are_per_module() {
        let mut modules = Modules::new();
        module_with_package(&mut modules, "a.com/m", true);
        let b = module_with_package(&mut modules, "b.com/m", true);
        let empty = modules.get_or_create_module(&ModuleKey::new("c.com/m"));
        modules.add_part(empty);

        let classifier = CountingClassifier::failing_for("/src/a.com/m/pkg");
        let warnings = set_licences(&mut modules, "", &classifier);
        let messages: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "failed to determine licence for a.com/m: no licence file found for /src/a.com/m/pkg",
                "failed to determine licence for c.com/m: no source files to look for a licence next to",
            ]
        );
        assert_eq!(modules.module(b).licence.as_deref(), Some("MIT"));
    }

    #[test]
    fn refresh_uses_module_roots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a.com/m")).unwrap();
        let mut modules = Modules::new();
        let a = module_with_package(&mut modules, "a.com/m", false);
        module_with_package(&mut modules, "missing.com/m", false);
        let mut sources = DirectorySources::new(dir.path());
        let classifier = CountingClassifier::new("ISC");

        let warnings = refresh_all_licences(&mut modules, &mut sources, &classifier);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].module, "missing.com/m");
        assert_eq!(classifier.calls(), vec![dir.path().join("a.com/m")]);
        assert_eq!(modules.module(a).licence.as_deref(), Some("ISC"));
        assert!(modules.is_modified(a));
        assert_eq!(
            sources.fetched,
            vec![
                ModuleVersion::new("a.com/m", "v1.0.0"),
                ModuleVersion::new("missing.com/m", "v1.0.0"),
            ]
        );
    }
}
