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

//! Writing the model back out as rules.
//!
//! Every module gets one `go_module` rule per part. The part created last is
//! the module's namesake: it's the one other rules depend on, so it exports
//! the module's other parts. Modules with several parts, or that are
//! replaced, download their sources once through a `go_mod_download` rule.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use godeps_resolve::model::{ModuleId, PartId};
use godeps_util::path::{join, split_last, trim_path_prefix};
use indexmap::IndexSet;
use regex::Regex;

use crate::file::{Expr, Rule};
use crate::{BuildGraph, GO_MOD_DOWNLOAD, GO_MODULE, RuleError};

static MAJOR_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^v[0-9]+$").expect("valid major version regex"));

impl BuildGraph {
    fn module_file(&mut self, module: ModuleId) -> Result<PathBuf, RuleError> {
        if let Some(path) = self.module_files.get(&module) {
            return Ok(path.clone());
        }
        let mut path = PathBuf::from(&self.config.third_party_folder);
        if self.config.structured {
            path.push(&self.modules.module(module).name);
        }
        path.push(&self.config.build_file_name);
        self.load_file(&path)?;
        self.module_files.insert(module, path.clone());
        Ok(path)
    }

    /// A rule name for `module` that's unique within `file`.
    pub(crate) fn module_name(&mut self, file: &Path, module: ModuleId) -> String {
        let m = self.modules.module(module);
        let module_path = m.replaced_by.clone().unwrap_or_else(|| m.name.clone());
        let (mut parent, base) = split_last(&m.name);
        let mut name = base.to_string();
        if let Some(replacement) = &m.replaced_by {
            name = format!("{}_replace", replacement.replace('/', "_"));
        } else if !self.config.structured && MAJOR_VERSION.is_match(&name) {
            let (p, b) = split_last(parent);
            parent = p;
            name = format!("{b}.{name}");
        }

        let used = self.used_names.entry(file.to_path_buf()).or_default();
        let mut attempt = 1;
        loop {
            match used.get(&name) {
                None => break,
                Some(owner) if *owner == module_path => return name,
                Some(_) => {}
            }
            if parent.is_empty() {
                attempt += 1;
                name = format!("{base}_m{attempt}");
            } else {
                let (p, b) = split_last(parent);
                parent = p;
                name = format!("{b}.{name}");
            }
        }
        used.insert(name.clone(), module_path);
        name
    }

    fn part_name(&mut self, file: &Path, part: PartId) -> String {
        let p = self.modules.part(part);
        let display_index = self.modules.module(p.module).parts.len() - p.index;
        let name = self.module_name(file, p.module);
        if display_index > 0 {
            format!("{name}_{display_index}")
        } else {
            name
        }
    }

    fn download_name(&mut self, file: &Path, module: ModuleId) -> String {
        format!("{}_dl", self.module_name(file, module))
    }

    fn label(&self, module: ModuleId, name: &str) -> String {
        if self.config.structured {
            let module = &self.modules.module(module).name;
            format!("//{}:{name}", join(&self.config.third_party_folder, module))
        } else {
            format!(":{name}")
        }
    }

    /// Names every part. Parts keep the names of their existing rules unless
    /// their module gained a part, in which case the whole module is renamed
    /// and rewritten so the newest part becomes the namesake.
    fn name_parts(&mut self) -> Result<HashMap<PartId, String>, RuleError> {
        let mut names = HashMap::new();
        let ids: Vec<ModuleId> = self.modules.module_ids().collect();
        for module in ids {
            let file = self.module_file(module)?;
            let parts = self.modules.module(module).parts.clone();
            let renumbered = parts.iter().any(|p| !self.part_rules.contains_key(p));
            for part in parts {
                let existing = self
                    .part_rules
                    .get(&part)
                    .and_then(|&i| self.files[&file].rule(i).name())
                    .map(str::to_string);
                let name = match existing {
                    Some(name) if !renumbered => name,
                    _ => {
                        self.modules.part_mut(part).modified = true;
                        self.part_name(&file, part)
                    }
                };
                names.insert(part, name);
            }
        }
        Ok(names)
    }

    /// Updates the rules of every modified module.
    pub fn format(&mut self) -> Result<(), RuleError> {
        let names = self.name_parts()?;
        let ids: Vec<ModuleId> = self.modules.module_ids().collect();
        for module in ids {
            if self.modules.is_modified(module) {
                self.format_module(module, &names)?;
            }
        }
        Ok(())
    }

    fn format_module(
        &mut self,
        module: ModuleId,
        names: &HashMap<PartId, String>,
    ) -> Result<(), RuleError> {
        let file = self.module_file(module)?;
        let m = self.modules.module(module).clone();

        let download = if m.parts.len() > 1 || m.replaced_by.is_some() {
            let name = self.download_name(&file, module);
            let index = match self.download_rules.get(&module) {
                Some(&index) => index,
                None => {
                    let index = self.files[&file].add_rule(Rule::new(GO_MOD_DOWNLOAD, &name));
                    self.download_rules.insert(module, index);
                    index
                }
            };
            let rule = self.files[&file].rule_mut(index);
            rule.set_str("module", m.replaced_by.as_deref().unwrap_or(&m.name));
            if !m.version.is_empty() {
                rule.set_str("version", &m.version);
            }
            if let Some(licence) = &m.licence {
                rule.set_strings("licences", [licence]);
            }
            Some(format!(":{}", rule.name().unwrap_or(&name)))
        } else {
            None
        };

        for (i, &part) in m.parts.iter().enumerate() {
            if !self.modules.part(part).modified {
                continue;
            }
            let name = &names[&part];
            let mut installs = IndexSet::new();
            let mut deps = IndexSet::new();
            let p = self.modules.part(part);
            for wildcard in &p.install_wildcards {
                installs.insert(if wildcard.is_empty() {
                    "...".to_string()
                } else {
                    format!("{wildcard}/...")
                });
            }
            for &pkg in &p.packages {
                let package = self.modules.package(pkg);
                if !self.modules.is_wildcard_import(part, pkg) {
                    let install = trim_path_prefix(&package.id, &m.name).trim_matches('/');
                    installs.insert(if install.is_empty() { "." } else { install }.to_string());
                }
                for &import in &package.imports {
                    let dep = self.modules.find_part(import)?;
                    if dep != part {
                        let dep_module = self.modules.part(dep).module;
                        deps.insert(self.label(dep_module, &names[&dep]));
                    }
                }
            }
            let mut installs: Vec<String> = installs.into_iter().collect();
            installs.sort();
            let mut deps: Vec<String> = deps.into_iter().collect();
            deps.sort();

            let namesake = i + 1 == m.parts.len();
            let exported: Vec<String> = if namesake {
                m.parts[..i].iter().map(|p| format!(":{}", names[p])).collect()
            } else {
                Vec::new()
            };
            let public = namesake || self.config.structured;

            let index = match self.part_rules.get(&part) {
                Some(&index) => index,
                None => {
                    let index = self.files[&file].add_rule(Rule::new(GO_MODULE, name));
                    self.part_rules.insert(part, index);
                    index
                }
            };
            let rule = self.files[&file].rule_mut(index);
            rule.set_str("name", name);
            rule.set_str("module", &m.name);
            match &download {
                Some(label) => {
                    rule.del_attr("version");
                    rule.set_str("download", label);
                }
                None => {
                    rule.del_attr("download");
                    if !m.version.is_empty() {
                        rule.set_str("version", &m.version);
                    }
                    if let Some(licence) = &m.licence {
                        rule.set_strings("licences", [licence]);
                    }
                }
            }
            set_or_del(rule, "install", installs != ["."], &installs);
            set_or_del(rule, "deps", !deps.is_empty(), &deps);
            set_or_del(rule, "exported_deps", !exported.is_empty(), &exported);
            set_or_del(rule, "visibility", public, &["PUBLIC"]);
        }
        Ok(())
    }

    /// Writes every changed file to disk.
    pub fn write_files(&self) -> Result<(), RuleError> {
        for (path, file) in &self.files {
            if !file.is_changed() {
                continue;
            }
            log::info!("writing {}", path.display());
            let io_error = |source| RuleError::Io {
                path: path.clone(),
                source,
            };
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(io_error)?;
            }
            std::fs::write(path, file.render()).map_err(io_error)?;
        }
        Ok(())
    }

    /// Prints every file, each preceded by a `# path` line.
    pub fn print_files(&self, out: &mut impl Write) -> std::io::Result<()> {
        for (path, file) in &self.files {
            writeln!(out, "# {}", path.display())?;
            writeln!(out, "{}", file.render())?;
        }
        Ok(())
    }
}

fn set_or_del<S: AsRef<str>>(rule: &mut Rule, key: &str, set: bool, values: &[S]) {
    if set {
        rule.set_attr(key, Expr::string_list(values));
    } else {
        rule.del_attr(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RulesConfig;
    use godeps_resolve::model::{ModuleKey, PackageModule};

    fn graph(dir: &Path, structured: bool) -> BuildGraph {
        BuildGraph::new(RulesConfig {
            third_party_folder: dir.join("third_party/go").to_string_lossy().into_owned(),
            build_file_name: "BUILD".to_string(),
            structured,
        })
    }

    /// Places `id` in a new or existing part of `module`, as resolution would.
    fn place(g: &mut BuildGraph, module: &str, part_index: usize, id: &str, imports: &[&str]) {
        let modules = &mut g.modules;
        let mid = modules.get_or_create_module(&ModuleKey::new(module));
        modules.module_mut(mid).version = "v1.0.0".into();
        while modules.module(mid).parts.len() < part_index {
            modules.add_part(mid);
        }
        let part = modules.module(mid).parts[part_index - 1];
        let pkg = modules.get_or_create_package(id);
        let deps: Vec<_> = imports.iter().map(|i| modules.get_or_create_package(i)).collect();
        let p = modules.package_mut(pkg);
        p.module = Some(PackageModule::new(module, "v1.0.0"));
        p.imports.extend(deps);
        p.resolved = true;
        modules.part_mut(part).packages.insert(pkg);
        modules.part_mut(part).modified = true;
        modules.set_assigned_part(pkg, part);
    }

    fn rendered(g: &BuildGraph) -> String {
        let mut out = Vec::new();
        g.print_files(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let root = g.config.third_party_folder.clone();
        text.replace(&root, "third_party/go")
    }

    #[test]
    fn flat_layout_with_split_module() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path(), false);
        place(&mut g, "m4.com", 1, "m4.com/p4", &[]);
        place(&mut g, "m1.com", 1, "m1.com/p1", &["m4.com/p4"]);
        place(&mut g, "m4.com", 2, "m4.com/p5", &["m1.com/p1"]);
        place(&mut g, "m4.com", 2, "m4.com", &[]);
        let m1 = g.modules.module_id(&ModuleKey::new("m1.com")).unwrap();
        g.modules.module_mut(m1).licence = Some("MIT".into());
        g.format().unwrap();

        expect_test::expect![[r#"
            # third_party/go/BUILD
            go_mod_download(
                name = "m4.com_dl",
                module = "m4.com",
                version = "v1.0.0",
            )

            go_module(
                name = "m4.com_1",
                module = "m4.com",
                download = ":m4.com_dl",
                install = ["p4"],
            )

            go_module(
                name = "m4.com",
                module = "m4.com",
                download = ":m4.com_dl",
                install = [
                    ".",
                    "p5",
                ],
                deps = [":m1.com"],
                exported_deps = [":m4.com_1"],
                visibility = ["PUBLIC"],
            )

            go_module(
                name = "m1.com",
                module = "m1.com",
                version = "v1.0.0",
                licences = ["MIT"],
                install = ["p1"],
                deps = [":m4.com_1"],
                visibility = ["PUBLIC"],
            )

        "#]]
        .assert_eq(&rendered(&g));
    }

    #[test]
    fn names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path(), false);
        place(&mut g, "github.com/a/x", 1, "github.com/a/x", &[]);
        place(&mut g, "github.com/b/x", 1, "github.com/b/x", &[]);
        place(&mut g, "github.com/c/y/v2", 1, "github.com/c/y/v2", &[]);
        let replaced = g.modules.get_or_create_module(&ModuleKey {
            path: "github.com/orig/z".into(),
            replace: Some("github.com/fork/z".into()),
        });
        let file = g.module_file(replaced).unwrap();
        let names: Vec<String> = g
            .modules
            .module_ids()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|m| g.module_name(&file, m))
            .collect();
        assert_eq!(
            names,
            vec!["x", "b.x", "y.v2", "github.com_fork_z_replace"]
        );
        // Stable once chosen.
        let b = g.modules.module_id(&ModuleKey::new("github.com/b/x")).unwrap();
        assert_eq!(g.module_name(&file, b), "b.x");
    }

    #[test]
    fn existing_rules_are_updated_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path(), false);
        let build = PathBuf::from(&g.config.third_party_folder).join("BUILD");
        std::fs::create_dir_all(build.parent().unwrap()).unwrap();
        std::fs::write(
            &build,
            r#"subinclude("///go//build_defs:go")

go_module(
    name = "dep",
    module = "dep.com/dep",
    version = "v1.0.0",
    licences = ["BSD-3-Clause"],
    visibility = ["PUBLIC"],
)

go_module(
    name = "lib",
    module = "lib.com/lib",
    version = "v0.1.0",
    install = ["..."],
    visibility = ["PUBLIC"],
)
"#,
        )
        .unwrap();
        g.read_third_party().unwrap();

        // A new package of lib imports dep; dep is untouched.
        let lib = g.modules.module_id(&ModuleKey::new("lib.com/lib")).unwrap();
        let part = g.modules.module(lib).parts[0];
        let pkg = g.modules.get_or_create_package("lib.com/lib/extra");
        let dep = g.modules.package_id("dep.com/dep").unwrap();
        let p = g.modules.package_mut(pkg);
        p.module = Some(PackageModule::new("lib.com/lib", "v0.2.0"));
        p.imports.insert(dep);
        g.modules.part_mut(part).packages.insert(pkg);
        g.modules.part_mut(part).modified = true;
        g.modules.module_mut(lib).version = "v0.2.0".into();

        g.format().unwrap();
        expect_test::expect![[r#"
            # third_party/go/BUILD
            subinclude("///go//build_defs:go")

            go_module(
                name = "dep",
                module = "dep.com/dep",
                version = "v1.0.0",
                licences = ["BSD-3-Clause"],
                visibility = ["PUBLIC"],
            )

            go_module(
                name = "lib",
                module = "lib.com/lib",
                version = "v0.2.0",
                install = ["..."],
                visibility = ["PUBLIC"],
                deps = [":dep"],
            )

        "#]]
        .assert_eq(&rendered(&g));

        g.write_files().unwrap();
        let written = std::fs::read_to_string(&build).unwrap();
        assert!(written.contains("deps = [\":dep\"]"), "{written}");
    }

    #[test]
    fn structured_layout_labels() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = graph(dir.path(), true);
        place(&mut g, "b.com/y", 1, "b.com/y", &[]);
        place(&mut g, "a.com/x", 1, "a.com/x/sub", &["b.com/y"]);
        g.format().unwrap();
        g.write_files().unwrap();

        let root = PathBuf::from(&g.config.third_party_folder);
        let x = std::fs::read_to_string(root.join("a.com/x/BUILD")).unwrap();
        let label = format!("//{}:y", join(&g.config.third_party_folder, "b.com/y"));
        assert!(x.contains("install = [\"sub\"]"), "{x}");
        assert!(x.contains(&label), "{x}");
        assert!(root.join("b.com/y/BUILD").is_file());
    }
}
