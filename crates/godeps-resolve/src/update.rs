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

//! Merging driver output into the model and placing the new packages.

use godeps_util::common::{is_std_import, wildcard_pattern};
use indexmap::IndexSet;
use thiserror::Error;

use crate::driver::{DriverError, DriverResponse, PackageDriver};
use crate::licence::{self, LicenceClassifier, LicenceWarning};
use crate::model::{GraphError, Modules, PackageId, PackageModule};
use crate::partition::GraphResolver;
use crate::verify;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to load packages")]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Copies every package of `response` into `modules`, returning the ids of
/// the roots. Packages without a module belong to `root_module`.
pub fn ingest(
    modules: &mut Modules,
    root_module: &str,
    response: &DriverResponse,
) -> Result<Vec<PackageId>, GraphError> {
    let mut missing = Vec::new();
    for loaded in response.packages.values() {
        let module = match &loaded.module {
            Some(module) => module.clone(),
            None if !root_module.is_empty() => PackageModule::new(root_module, ""),
            None => {
                missing.push(loaded.id.clone());
                continue;
            }
        };

        let mut imports = IndexSet::new();
        for import in &loaded.imports {
            if is_std_import(import) {
                continue;
            }
            let known = response.packages.contains_key(import)
                || modules
                    .package_id(import)
                    .is_some_and(|id| modules.package(id).module.is_some());
            if !known {
                return Err(GraphError::NoModuleForImport {
                    package: import.clone(),
                    importer: loaded.id.clone(),
                });
            }
            imports.insert(modules.get_or_create_package(import));
        }

        let pkg = modules.get_or_create_package(&loaded.id);
        let p = modules.package_mut(pkg);
        p.module = Some(module);
        p.imports = imports;
        p.go_files = loaded.go_files.clone();
        p.other_files = loaded.other_files.clone();
        p.is_command = loaded.is_command();
        p.resolved = true;
    }
    if !missing.is_empty() {
        return Err(GraphError::NoModule(missing));
    }

    Ok(response
        .roots
        .iter()
        .map(|id| modules.get_or_create_package(id))
        .collect())
}

/// Records the versions the driver loaded on the modules that now hold its
/// packages.
fn record_versions(modules: &mut Modules, response: &DriverResponse) {
    for loaded in response.packages.values() {
        let Some(module) = &loaded.module else {
            continue;
        };
        if let Some(mid) = modules.module_id(&module.key()) {
            let version = module.effective_version();
            if !version.is_empty() {
                modules.module_mut(mid).version = version.to_string();
            }
        }
    }
}

/// Patterns reloading what modified modules might still be missing: member
/// packages of any of their parts not loaded from source yet, and everything
/// under every part's wildcard installs.
pub fn modified_patterns(modules: &Modules) -> Vec<String> {
    let mut patterns = IndexSet::new();
    for mid in modules.module_ids() {
        if !modules.is_modified(mid) {
            continue;
        }
        let module = modules.module(mid);
        for &part in &module.parts {
            let part = modules.part(part);
            for &pkg in &part.packages {
                let pkg = modules.package(pkg);
                if !pkg.resolved {
                    patterns.insert(pkg.id.clone());
                }
            }
            for wildcard in &part.install_wildcards {
                patterns.insert(wildcard_pattern(&module.name, wildcard));
            }
        }
    }
    patterns.into_iter().collect()
}

fn place(resolver: &mut GraphResolver<'_>, response: &DriverResponse) -> Result<(), UpdateError> {
    let root_module = resolver.root_module().to_string();
    let roots = ingest(resolver.modules_mut(), &root_module, response)?;
    tracing::info!("Building module graph... {} packages", response.packages.len());
    resolver.add_packages_to_modules(&roots)?;
    record_versions(resolver.modules_mut(), response);
    Ok(())
}

/// Resolves `patterns` into `modules`: loads them, places every package in a
/// module part, reloads whatever the modified parts still lack, then
/// attributes licences to the modified modules.
pub fn update_modules(
    modules: &mut Modules,
    root_module: &str,
    driver: &mut dyn PackageDriver,
    patterns: &[String],
    classifier: &dyn LicenceClassifier,
) -> Result<Vec<LicenceWarning>, UpdateError> {
    let mut resolver = GraphResolver::new(modules, root_module);
    tracing::info!("Loading {} pattern(s)", patterns.len());
    place(&mut resolver, &driver.load(patterns)?)?;

    let extra = modified_patterns(resolver.modules());
    if !extra.is_empty() {
        log::debug!("resolving modified packages: {}", extra.join(" "));
        place(&mut resolver, &driver.reload(&extra)?)?;
    }

    verify::check_part_cycles(modules);
    tracing::info!("Adding licences...");
    Ok(licence::set_licences(modules, root_module, classifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::licence::classifier::CountingClassifier;
    use crate::model::ModuleKey;

    fn patterns(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    fn part_packages(modules: &Modules, module: &str) -> Vec<Vec<String>> {
        let mid = modules.module_id(&ModuleKey::new(module)).unwrap();
        modules
            .module(mid)
            .parts
            .iter()
            .map(|&p| {
                modules
                    .part(p)
                    .packages
                    .iter()
                    .map(|&pkg| modules.package(pkg).id.clone())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn end_to_end_cycle_through_four_modules() {
        let mut driver = FakeDriver::new();
        driver
            .add_package("m1.com@v1.0.0", "m1.com/p1", &["m2.com/p2"])
            .add_package("m2.com@v1.0.0", "m2.com/p2", &["m3.com/p3"])
            .add_package("m3.com@v1.0.0", "m3.com/p3", &["m4.com/p4"])
            .add_package("m4.com@v1.2.0", "m4.com/p4", &["fmt"])
            .add_package("m4.com@v1.2.0", "m4.com/p5", &["m1.com/p1"]);
        let mut modules = Modules::new();
        let classifier = CountingClassifier::new("MIT");

        let warnings = update_modules(
            &mut modules,
            "",
            &mut driver,
            &patterns(&["m1.com/p1", "m4.com/p5"]),
            &classifier,
        )
        .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(
            part_packages(&modules, "m4.com"),
            vec![vec!["m4.com/p4".to_string()], vec!["m4.com/p5".to_string()]]
        );
        let m4 = modules.module_id(&ModuleKey::new("m4.com")).unwrap();
        assert_eq!(modules.module(m4).version, "v1.2.0");
        assert_eq!(modules.module(m4).licence.as_deref(), Some("MIT"));
        // One call per modified module.
        assert_eq!(classifier.calls().len(), 4);
        // Every part is new, so nothing to reload.
        assert_eq!(driver.calls.len(), 1);
    }

    #[test]
    fn second_pass_expands_wildcards_of_modified_parts() {
        let mut driver = FakeDriver::new();
        driver
            .add_package("dep.com@v1.0.0", "dep.com/a", &[])
            .add_package("dep.com@v1.0.0", "dep.com/extra/b", &["other.com/c"])
            .add_package("other.com@v0.1.0", "other.com/c", &[]);
        let mut modules = Modules::new();
        let dep = modules.get_or_create_module(&ModuleKey::new("dep.com"));
        let part = modules.add_part(dep);
        modules.part_mut(part).install_wildcards.push("extra".into());
        modules.part_mut(part).modified = false;

        update_modules(
            &mut modules,
            "",
            &mut driver,
            &patterns(&["dep.com/a"]),
            &CountingClassifier::new("MIT"),
        )
        .unwrap();

        assert_eq!(
            driver.calls,
            vec![patterns(&["dep.com/a"]), patterns(&["dep.com/extra/..."])]
        );
        assert_eq!(driver.reloads, 1);
        assert_eq!(
            part_packages(&modules, "dep.com"),
            vec![vec!["dep.com/a".to_string(), "dep.com/extra/b".to_string()]]
        );
        assert_eq!(part_packages(&modules, "other.com"), vec![vec!["other.com/c".to_string()]]);
    }

    #[test]
    fn wildcards_of_untouched_parts_are_reloaded() {
        let mut modules = Modules::new();
        let dep = modules.get_or_create_module(&ModuleKey::new("dep.com"));
        let touched = modules.add_part(dep);
        let pending = modules.get_or_create_package("dep.com/a");
        modules.part_mut(touched).packages.insert(pending);
        let untouched = modules.add_part(dep);
        modules.part_mut(untouched).install_wildcards.push("extra".into());
        modules.part_mut(untouched).modified = false;
        let other = modules.get_or_create_module(&ModuleKey::new("other.com"));
        let idle = modules.add_part(other);
        modules.part_mut(idle).install_wildcards.push("idle".into());
        modules.part_mut(idle).modified = false;

        assert_eq!(
            modified_patterns(&modules),
            patterns(&["dep.com/a", "dep.com/extra/..."])
        );
    }

    #[test]
    fn root_module_packages_are_not_partitioned() {
        let mut driver = FakeDriver::new();
        driver
            .add_package("example.com/app", "example.com/app/server", &["dep.com/lib"])
            .add_package("dep.com@v1.0.0", "dep.com/lib", &[]);
        let mut modules = Modules::new();
        update_modules(
            &mut modules,
            "example.com/app",
            &mut driver,
            &patterns(&["example.com/app/server"]),
            &CountingClassifier::new("MIT"),
        )
        .unwrap();
        assert!(modules.module_id(&ModuleKey::new("example.com/app")).is_none());
        assert_eq!(part_packages(&modules, "dep.com"), vec![vec!["dep.com/lib".to_string()]]);
    }

    #[test]
    fn commands_are_loaded_but_not_placed() {
        let mut driver = FakeDriver::new();
        driver
            .add_command("tool.com@v1.1.0", "tool.com/cmd/tool", &["tool.com/lib"])
            .add_package("tool.com@v1.1.0", "tool.com/lib", &[]);
        let mut modules = Modules::new();
        update_modules(
            &mut modules,
            "",
            &mut driver,
            &patterns(&["tool.com/cmd/tool"]),
            &CountingClassifier::new("MIT"),
        )
        .unwrap();
        assert_eq!(part_packages(&modules, "tool.com"), vec![vec!["tool.com/lib".to_string()]]);
        let cmd = modules.package_id("tool.com/cmd/tool").unwrap();
        assert!(modules.package(cmd).is_command);
    }

    #[test]
    fn packages_need_a_module() {
        let mut driver = FakeDriver::new();
        driver.add_package("example.com/app", "example.com/app/server", &[]);
        let err = update_modules(
            &mut Modules::new(),
            "",
            &mut driver,
            &patterns(&["example.com/app/server"]),
            &CountingClassifier::new("MIT"),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no module found for packages: example.com/app/server"
        );
    }

    #[test]
    fn imports_must_be_loaded() {
        let mut driver = FakeDriver::new();
        driver.add_package("dep.com@v1.0.0", "dep.com/lib", &["gone.com/x"]);
        let err = update_modules(
            &mut Modules::new(),
            "",
            &mut driver,
            &patterns(&["dep.com/lib"]),
            &CountingClassifier::new("MIT"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            UpdateError::Graph(GraphError::NoModuleForImport { ref package, ref importer })
                if package == "gone.com/x" && importer == "dep.com/lib"
        ));
    }
}
