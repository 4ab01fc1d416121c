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

//! Materialising module sources on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use godeps_util::module::ModuleVersion;
use godeps_util::version;
use serde::Deserialize;
use thiserror::Error;

use crate::local_rules::{LocalModule, LocalRuleError, LocalRules};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to run {tool}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to download {module}: {message}")]
    Download { module: ModuleVersion, message: String },
    #[error("malformed `go mod download` output for {module}")]
    Json {
        module: ModuleVersion,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to prepare {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    LocalRule(#[from] LocalRuleError),
}

pub trait ModuleSources {
    /// Registers a module an existing build rule can provide.
    fn add_local_module(&mut self, module: LocalModule);

    /// Returns the root of `module`'s sources, fetching them at most once per
    /// run.
    fn ensure_downloaded(&mut self, module: &ModuleVersion) -> Result<PathBuf, DownloadError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DownloadResponse {
    #[serde(default)]
    dir: String,
    #[serde(default)]
    error: String,
}

/// Builds local rules where they satisfy the request, and falls back to
/// `go mod download` into a private `GOPATH` otherwise.
pub struct GoModDownloader {
    go_tool: PathBuf,
    out_dir: PathBuf,
    builder: Box<dyn LocalRules>,
    local: HashMap<String, LocalModule>,
    downloaded: HashMap<ModuleVersion, PathBuf>,
}

impl GoModDownloader {
    pub fn new(go_tool: PathBuf, out_dir: PathBuf, builder: Box<dyn LocalRules>) -> Self {
        GoModDownloader {
            go_tool,
            out_dir,
            builder,
            local: HashMap::new(),
            downloaded: HashMap::new(),
        }
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DownloadError + '_ {
        move |source| DownloadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// `go mod download` wants to run inside a module.
    fn init_scratch_module(&self) -> Result<PathBuf, DownloadError> {
        std::fs::create_dir_all(&self.out_dir).map_err(Self::io_error(&self.out_dir))?;
        let out_dir = std::path::absolute(&self.out_dir).map_err(Self::io_error(&self.out_dir))?;
        if out_dir.join("go.mod").exists() {
            return Ok(out_dir);
        }
        let output = Command::new(&self.go_tool)
            .args(["mod", "init", "dummy"])
            .current_dir(&out_dir)
            .output()
            .map_err(|source| self.spawn_error(source))?;
        if !output.status.success() {
            return Err(DownloadError::Download {
                module: ModuleVersion::new("dummy", ""),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(out_dir)
    }

    fn spawn_error(&self, source: std::io::Error) -> DownloadError {
        DownloadError::Spawn {
            tool: self.go_tool.display().to_string(),
            source,
        }
    }

    fn go_mod_download(&self, module: &ModuleVersion) -> Result<PathBuf, DownloadError> {
        let out_dir = self.init_scratch_module()?;
        tracing::info!("downloading {module}");
        let output = Command::new(&self.go_tool)
            .args(["mod", "download", "--json", &module.to_string()])
            .current_dir(&out_dir)
            .env("GOPATH", out_dir.join(godeps_util::common::GOPATH_DIR))
            .envs(std::env::var_os("GOROOT").map(|root| ("GOROOT", root)))
            .output()
            .map_err(|source| self.spawn_error(source))?;
        let resp: DownloadResponse = match serde_json::from_slice(&output.stdout) {
            Ok(resp) => resp,
            Err(_) if !output.status.success() => {
                return Err(DownloadError::Download {
                    module: module.clone(),
                    message: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }
            Err(source) => {
                return Err(DownloadError::Json {
                    module: module.clone(),
                    source,
                });
            }
        };
        if !resp.error.is_empty() {
            return Err(DownloadError::Download {
                module: module.clone(),
                message: resp.error,
            });
        }
        Ok(PathBuf::from(resp.dir))
    }
}

impl ModuleSources for GoModDownloader {
    fn add_local_module(&mut self, module: LocalModule) {
        self.local.insert(module.module.path.clone(), module);
    }

    fn ensure_downloaded(&mut self, module: &ModuleVersion) -> Result<PathBuf, DownloadError> {
        if let Some(dir) = self.downloaded.get(module) {
            return Ok(dir.clone());
        }
        let local = self.local.get(&module.path).filter(|local| {
            version::compare(&local.module.version, &module.version) != std::cmp::Ordering::Less
        });
        let dir = match local {
            Some(local) => {
                self.builder.build(&local.label)?;
                local.src_root.clone()
            }
            None => self.go_mod_download(module)?,
        };
        self.downloaded.insert(module.clone(), dir.clone());
        Ok(dir)
    }
}

/// Sources laid out in a directory as `<root>/<module path>`, regardless of
/// version.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct DirectorySources {
    root: PathBuf,
    local: HashMap<String, LocalModule>,
    pub fetched: Vec<ModuleVersion>,
}

#[cfg(test)]
impl DirectorySources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectorySources {
            root: root.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
impl ModuleSources for DirectorySources {
    fn add_local_module(&mut self, module: LocalModule) {
        self.local.insert(module.module.path.clone(), module);
    }

    fn ensure_downloaded(&mut self, module: &ModuleVersion) -> Result<PathBuf, DownloadError> {
        if !self.fetched.contains(module) {
            self.fetched.push(module.clone());
        }
        if let Some(local) = self.local.get(&module.path) {
            return Ok(local.src_root.clone());
        }
        let dir = self.root.join(&module.path);
        if !dir.is_dir() {
            return Err(DownloadError::Download {
                module: module.clone(),
                message: format!("{} does not exist", dir.display()),
            });
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingRules(Rc<RefCell<Vec<String>>>);

    impl LocalRules for RecordingRules {
        fn query_modules(&self) -> Result<Vec<LocalModule>, LocalRuleError> {
            Ok(Vec::new())
        }

        fn build(&self, label: &str) -> Result<(), LocalRuleError> {
            self.0.borrow_mut().push(label.to_string());
            Ok(())
        }
    }

    #[test]
    fn local_rules_are_built_once() {
        let built = Rc::new(RefCell::new(Vec::new()));
        let mut d = GoModDownloader::new(
            PathBuf::from("go-not-needed"),
            PathBuf::from("unused"),
            Box::new(RecordingRules(built.clone())),
        );
        d.add_local_module(LocalModule {
            label: "//third_party/go:errors".into(),
            module: ModuleVersion::new("github.com/pkg/errors", "v0.9.1"),
            src_root: PathBuf::from("plz-out/gen/errors"),
        });
        let m = ModuleVersion::new("github.com/pkg/errors", "v0.9.0");
        assert_eq!(d.ensure_downloaded(&m).unwrap(), PathBuf::from("plz-out/gen/errors"));
        assert_eq!(d.ensure_downloaded(&m).unwrap(), PathBuf::from("plz-out/gen/errors"));
        assert_eq!(*built.borrow(), vec!["//third_party/go:errors"]);
    }

    #[test]
    fn directory_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("example.com/m")).unwrap();
        let mut s = DirectorySources::new(dir.path());
        let m = ModuleVersion::new("example.com/m", "v1.0.0");
        assert_eq!(s.ensure_downloaded(&m).unwrap(), dir.path().join("example.com/m"));
        assert!(s.ensure_downloaded(&ModuleVersion::new("example.com/x", "v1.0.0")).is_err());
        assert_eq!(s.fetched.len(), 2);
    }
}
