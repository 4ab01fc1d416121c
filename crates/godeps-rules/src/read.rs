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

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use godeps_resolve::model::{ModuleId, ModuleKey, Modules, PackageModule, PartId};
use godeps_util::module::ModuleVersion;
use godeps_util::path::join;
use indexmap::IndexMap;
use walkdir::WalkDir;

use crate::file::BuildFile;
use crate::{GO_MOD_DOWNLOAD, GO_MODULE, RuleError};

#[derive(Debug, Clone)]
pub struct RulesConfig {
    pub third_party_folder: String,
    pub build_file_name: String,
    /// One BUILD file per module under the third-party folder, rather than a
    /// single file for every module.
    pub structured: bool,
}

/// The modules described by BUILD files, and where their rules live.
pub struct BuildGraph {
    pub modules: Modules,
    pub(crate) config: RulesConfig,
    pub(crate) files: IndexMap<PathBuf, BuildFile>,
    pub(crate) module_files: HashMap<ModuleId, PathBuf>,
    /// Index of each part's `go_module` rule within its module's file.
    pub(crate) part_rules: HashMap<PartId, usize>,
    pub(crate) download_rules: HashMap<ModuleId, usize>,
    /// Rule names taken in each file, with the module path they belong to.
    pub(crate) used_names: HashMap<PathBuf, HashMap<String, String>>,
}

struct Download {
    index: usize,
    module: String,
    version: Option<String>,
    licence: Option<String>,
}

fn first_licence(rule: &crate::file::Rule) -> Option<String> {
    rule.attr_strings("licences")
        .and_then(|l| l.first().map(|s| s.to_string()))
}

impl BuildGraph {
    pub fn new(config: RulesConfig) -> Self {
        BuildGraph {
            modules: Modules::new(),
            config,
            files: IndexMap::new(),
            module_files: HashMap::new(),
            part_rules: HashMap::new(),
            download_rules: HashMap::new(),
            used_names: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    pub fn files(&self) -> impl Iterator<Item = (&Path, &BuildFile)> {
        self.files.iter().map(|(p, f)| (p.as_path(), f))
    }

    /// Reads every BUILD file under the third-party folder.
    pub fn read_third_party(&mut self) -> Result<(), RuleError> {
        let root = PathBuf::from(&self.config.third_party_folder);
        if !self.config.structured {
            return self.read_rules(&root.join(&self.config.build_file_name));
        }
        if !root.is_dir() {
            return Ok(());
        }
        let mut build_files = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| RuleError::Io {
                path: root.clone(),
                source: e.into(),
            })?;
            if entry.file_type().is_file() && entry.file_name() == self.config.build_file_name.as_str()
            {
                build_files.push(entry.into_path());
            }
        }
        for path in build_files {
            self.read_rules(&path)?;
        }
        Ok(())
    }

    /// Loads `path` into the set of files, empty if it doesn't exist yet.
    pub(crate) fn load_file(&mut self, path: &Path) -> Result<(), RuleError> {
        if self.files.contains_key(path) {
            return Ok(());
        }
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(RuleError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let file = BuildFile::parse(&source).map_err(|source| RuleError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.files.insert(path.to_path_buf(), file);
        Ok(())
    }

    /// Adds the modules declared in `path` to the model. Every part read is
    /// unmodified.
    pub fn read_rules(&mut self, path: &Path) -> Result<(), RuleError> {
        log::debug!("reading rules from {}", path.display());
        self.load_file(path)?;
        let file = &self.files[path];
        let missing = |rule: &crate::file::Rule, attr| RuleError::MissingAttr {
            path: path.to_path_buf(),
            line: rule.line,
            kind: rule.kind.clone(),
            attr,
        };

        let mut downloads = HashMap::new();
        let mut names = HashMap::new();
        for (index, rule) in file.rules_of_kind(GO_MOD_DOWNLOAD) {
            let name = rule.name().ok_or_else(|| missing(rule, "name"))?;
            let module = rule.attr_str("module").ok_or_else(|| missing(rule, "module"))?;
            names.insert(name.to_string(), module.to_string());
            downloads.insert(
                name.to_string(),
                Download {
                    index,
                    module: module.to_string(),
                    version: rule.attr_str("version").map(str::to_string),
                    licence: first_licence(rule),
                },
            );
        }

        struct Part {
            index: usize,
            name: String,
            module: String,
            install: Vec<String>,
            version: String,
            licence: Option<String>,
            download: Option<(usize, String)>,
        }
        let mut parts = Vec::new();
        for (index, rule) in file.rules_of_kind(GO_MODULE) {
            let name = rule.name().ok_or_else(|| missing(rule, "name"))?;
            let module = rule.attr_str("module").ok_or_else(|| missing(rule, "module"))?;
            let mut version = rule.attr_str("version").unwrap_or_default().to_string();
            let mut licence = first_licence(rule);
            let mut download = None;
            if let Some(label) = rule.attr_str("download") {
                let dl = downloads
                    .get(label.trim_start_matches(':'))
                    .ok_or_else(|| RuleError::UnknownDownload {
                        path: path.to_path_buf(),
                        line: rule.line,
                        label: label.to_string(),
                    })?;
                if let Some(v) = &dl.version {
                    version = v.clone();
                }
                licence = licence.or_else(|| dl.licence.clone());
                download = Some((dl.index, dl.module.clone()));
            }
            let install = match rule.attr_strings("install") {
                Some(install) if !install.is_empty() => {
                    install.into_iter().map(str::to_string).collect()
                }
                _ => vec![".".to_string()],
            };
            parts.push(Part {
                index,
                name: name.to_string(),
                module: module.to_string(),
                install,
                version,
                licence,
                download,
            });
        }

        for part in parts {
            let replaced_by = part
                .download
                .as_ref()
                .map(|(_, m)| m.clone())
                .filter(|m| *m != part.module);
            let key = ModuleKey {
                path: part.module.clone(),
                replace: replaced_by.clone(),
            };
            let mid = self.modules.get_or_create_module(&key);
            let m = self.modules.module_mut(mid);
            if !part.version.is_empty() {
                m.version = part.version.clone();
            }
            if part.licence.is_some() {
                m.licence = part.licence.clone();
            }
            self.module_files
                .entry(mid)
                .or_insert_with(|| path.to_path_buf());
            if let Some((index, _)) = part.download {
                self.download_rules.insert(mid, index);
            }
            names.insert(
                part.name.clone(),
                replaced_by.clone().unwrap_or_else(|| part.module.clone()),
            );

            let pid = self.modules.add_part(mid);
            self.modules.part_mut(pid).modified = false;
            self.part_rules.insert(pid, part.index);

            let package_module = PackageModule {
                path: part.module.clone(),
                version: part.version.clone(),
                replace: replaced_by.map(|r| ModuleVersion::new(r, part.version.as_str())),
            };
            for install in &part.install {
                if let Some(wildcard) = install.strip_suffix("...") {
                    let wildcard = wildcard.trim_end_matches('/');
                    self.modules
                        .part_mut(pid)
                        .install_wildcards
                        .push(wildcard.to_string());
                    continue;
                }
                let pkg = self
                    .modules
                    .get_or_create_package(&join(&part.module, install));
                self.modules.package_mut(pkg).module = Some(package_module.clone());
                self.modules.set_assigned_part(pkg, pid);
                self.modules.part_mut(pid).packages.insert(pkg);
            }
        }

        self.used_names
            .entry(path.to_path_buf())
            .or_default()
            .extend(names);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_config(dir: &Path) -> RulesConfig {
        RulesConfig {
            third_party_folder: dir.join("third_party/go").to_string_lossy().into_owned(),
            build_file_name: "BUILD".to_string(),
            structured: false,
        }
    }

    const RULES: &str = r#"
go_mod_download(
    name = "grpc_dl",
    module = "google.golang.org/grpc",
    version = "v1.50.0",
    licences = ["Apache-2.0"],
)

go_module(
    name = "grpc_1",
    module = "google.golang.org/grpc",
    download = ":grpc_dl",
    install = ["credentials/oauth"],
)

go_module(
    name = "grpc",
    module = "google.golang.org/grpc",
    download = ":grpc_dl",
    install = [
        ".",
        "internal/...",
    ],
    exported_deps = [":grpc_1"],
)

go_mod_download(
    name = "github.com_fork_x_replace_dl",
    module = "github.com/fork/x",
    version = "v0.2.0",
)

go_module(
    name = "github.com_fork_x_replace",
    module = "github.com/orig/x",
    download = ":github.com_fork_x_replace_dl",
)

go_module(
    name = "yaml.v3",
    module = "gopkg.in/yaml.v3",
    version = "v3.0.1",
    licences = ["MIT"],
)
"#;

    #[test]
    fn reads_modules_and_parts() {
        let dir = tempfile::tempdir().unwrap();
        let config = flat_config(dir.path());
        let build = PathBuf::from(&config.third_party_folder).join("BUILD");
        std::fs::create_dir_all(build.parent().unwrap()).unwrap();
        std::fs::write(&build, RULES).unwrap();

        let mut graph = BuildGraph::new(config);
        graph.read_third_party().unwrap();
        let modules = &graph.modules;

        let grpc = modules
            .module_id(&ModuleKey::new("google.golang.org/grpc"))
            .unwrap();
        let m = modules.module(grpc);
        assert_eq!(m.version, "v1.50.0");
        assert_eq!(m.licence.as_deref(), Some("Apache-2.0"));
        assert_eq!(m.parts.len(), 2);
        assert!(!modules.is_modified(grpc));
        assert_eq!(modules.part(m.parts[1]).install_wildcards, vec!["internal".to_string()]);

        // Wildcard installs don't name their packages.
        assert_eq!(
            modules.package_id("google.golang.org/grpc/internal/transport"),
            None
        );

        let root = modules.package_id("google.golang.org/grpc").unwrap();
        assert_eq!(modules.assigned_part(root), Some(m.parts[1]));
        let oauth = modules
            .package_id("google.golang.org/grpc/credentials/oauth")
            .unwrap();
        assert_eq!(modules.assigned_part(oauth), Some(m.parts[0]));

        let replaced = modules
            .module_id(&ModuleKey {
                path: "github.com/orig/x".into(),
                replace: Some("github.com/fork/x".into()),
            })
            .unwrap();
        assert_eq!(modules.module(replaced).version, "v0.2.0");
        let x = modules.package_id("github.com/orig/x").unwrap();
        assert_eq!(
            modules.package(x).module.as_ref().unwrap().source(),
            ModuleVersion::new("github.com/fork/x", "v0.2.0")
        );

        let yaml = modules.module_id(&ModuleKey::new("gopkg.in/yaml.v3")).unwrap();
        assert_eq!(modules.module(yaml).licence.as_deref(), Some("MIT"));

        let names = &graph.used_names[&build];
        assert_eq!(names["grpc_dl"], "google.golang.org/grpc");
        assert_eq!(names["github.com_fork_x_replace"], "github.com/fork/x");
    }

    #[test]
    fn missing_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = BuildGraph::new(flat_config(dir.path()));
        graph.read_third_party().unwrap();
        assert_eq!(graph.modules.module_ids().count(), 0);
        assert_eq!(graph.files().count(), 1);
    }

    #[test]
    fn bad_rules_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BUILD");
        std::fs::write(&path, "go_module(\n    name = \"x\",\n)\n").unwrap();
        let mut graph = BuildGraph::new(flat_config(dir.path()));
        let err = graph.read_rules(&path).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{}:1: go_module rule has no module", path.display())
        );

        std::fs::write(&path, "go_module(name = \"x\", module = \"m\", download = \":nope\")\n").unwrap();
        let mut graph = BuildGraph::new(flat_config(dir.path()));
        assert!(matches!(
            graph.read_rules(&path),
            Err(RuleError::UnknownDownload { .. })
        ));
    }

    #[test]
    fn structured_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = flat_config(dir.path());
        config.structured = true;
        let root = PathBuf::from(&config.third_party_folder);
        for (module, name) in [("a.com/x", "x"), ("b.com/y", "y")] {
            let module_dir = root.join(module);
            std::fs::create_dir_all(&module_dir).unwrap();
            std::fs::write(
                module_dir.join("BUILD"),
                format!("go_module(name = \"{name}\", module = \"{module}\", version = \"v1.0.0\")\n"),
            )
            .unwrap();
        }
        let mut graph = BuildGraph::new(config);
        graph.read_third_party().unwrap();
        let files: Vec<_> = graph.files().map(|(p, _)| p.to_path_buf()).collect();
        assert_eq!(files, vec![root.join("a.com/x/BUILD"), root.join("b.com/y/BUILD")]);
        assert_eq!(graph.modules.module_ids().count(), 2);
    }
}
