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

#[cfg(test)]
pub mod mock;
pub mod online;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use godeps_util::common::split_wildcard;
use godeps_util::modfile::{self, ModFile, ModFileError};
use godeps_util::module::ModuleVersion;
use godeps_util::path::parent;
pub use online::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("can't find module {0}")]
    ModuleNotFound(String),
    #[error("unexpected status code {status} from {url}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },
    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("malformed response for {module}")]
    Json {
        module: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed go.mod for {module}")]
    Manifest {
        module: String,
        #[source]
        source: ModFileError,
    },
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module path must not be empty")]
    EmptyModulePath,
    #[error("couldn't find module for package {0}")]
    NoModuleForPackage(String),
}

/// The requests of the Go module proxy protocol needed here.
pub trait ProxySource {
    /// The latest version of the module at `path`.
    fn latest(&self, path: &str) -> Result<String, ProxyError>;

    /// The canonical version `query` (a branch, tag or commit) names.
    fn info(&self, path: &str, query: &str) -> Result<String, ProxyError>;

    /// The text of `path`'s `go.mod` at `version`.
    fn go_mod(&self, path: &str, version: &str) -> Result<String, ProxyError>;
}

impl<P> ProxySource for Rc<P>
where
    P: ProxySource + ?Sized,
{
    fn latest(&self, path: &str) -> Result<String, ProxyError> {
        (**self).latest(path)
    }

    fn info(&self, path: &str, query: &str) -> Result<String, ProxyError> {
        (**self).info(path, query)
    }

    fn go_mod(&self, path: &str, version: &str) -> Result<String, ProxyError> {
        (**self).go_mod(path, version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Latest {
    module: String,
    version: String,
}

/// Caching front end over a [`ProxySource`].
///
/// Latest-version answers (including "not found") are cached in memory for
/// the lifetime of the client. Manifests are also cached on disk, keyed by
/// `path@version`, so repeated runs don't hit the network.
pub struct ProxyClient {
    source: Box<dyn ProxySource>,
    cache_dir: Option<PathBuf>,
    latest: RefCell<HashMap<String, Option<Latest>>>,
    manifests: RefCell<HashMap<ModuleVersion, Rc<ModFile>>>,
}

impl ProxyClient {
    pub fn new(source: Box<dyn ProxySource>, cache_dir: Option<PathBuf>) -> Self {
        ProxyClient {
            source,
            cache_dir,
            latest: RefCell::new(HashMap::new()),
            manifests: RefCell::new(HashMap::new()),
        }
    }

    pub fn latest_version(&self, path: &str) -> Result<String, ProxyError> {
        if path.is_empty() {
            return Err(ProxyError::EmptyModulePath);
        }
        if let Some(cached) = self.latest.borrow().get(path) {
            return cached
                .as_ref()
                .map(|l| l.version.clone())
                .ok_or_else(|| ProxyError::ModuleNotFound(path.to_string()));
        }
        match self.source.latest(path) {
            Ok(version) => {
                log::debug!("latest version of {path} is {version}");
                self.latest.borrow_mut().insert(
                    path.to_string(),
                    Some(Latest {
                        module: path.to_string(),
                        version: version.clone(),
                    }),
                );
                Ok(version)
            }
            Err(ProxyError::ModuleNotFound(p)) => {
                self.latest.borrow_mut().insert(path.to_string(), None);
                Err(ProxyError::ModuleNotFound(p))
            }
            Err(e) => Err(e),
        }
    }

    /// Turns a version query such as a commit hash into the pseudo-version
    /// the proxy publishes it under.
    pub fn query_version(&self, path: &str, query: &str) -> Result<String, ProxyError> {
        if path.is_empty() {
            return Err(ProxyError::EmptyModulePath);
        }
        let version = self.source.info(path, query)?;
        log::debug!("{path}@{query} is {version}");
        Ok(version)
    }

    /// Finds the module providing `pattern` by walking up its path until the
    /// proxy knows a module there.
    pub fn module_for_package(&self, pattern: &str) -> Result<String, ProxyError> {
        let (pkg, _) = split_wildcard(pattern);
        let mut tried = Vec::new();
        let mut candidate = Some(pkg).filter(|p| !p.is_empty());
        let found = loop {
            let Some(path) = candidate else {
                return Err(ProxyError::NoModuleForPackage(pkg.to_string()));
            };
            let cached = self.latest.borrow().get(path).cloned();
            let latest = match cached {
                Some(latest) => latest,
                None => match self.source.latest(path) {
                    Ok(version) => Some(Latest {
                        module: path.to_string(),
                        version,
                    }),
                    Err(ProxyError::ModuleNotFound(_)) => None,
                    Err(e) => return Err(e),
                },
            };
            match latest {
                Some(latest) => break latest,
                None => {
                    tried.push(path);
                    candidate = parent(path);
                }
            }
        };
        let mut cache = self.latest.borrow_mut();
        cache.insert(found.module.clone(), Some(found.clone()));
        for path in tried {
            cache.insert(path.to_string(), Some(found.clone()));
        }
        Ok(found.module)
    }

    pub fn manifest(&self, path: &str, version: &str) -> Result<Rc<ModFile>, ProxyError> {
        let key = ModuleVersion::new(path, version);
        if let Some(m) = self.manifests.borrow().get(&key) {
            return Ok(m.clone());
        }
        let text = match self.read_cached(&key)? {
            Some(text) => text,
            None => {
                log::debug!("fetching go.mod for {key}");
                let text = self.source.go_mod(path, version)?;
                self.write_cached(&key, &text);
                text
            }
        };
        let file = modfile::parse(&text).map_err(|source| ProxyError::Manifest {
            module: key.to_string(),
            source,
        })?;
        let file = Rc::new(file);
        self.manifests.borrow_mut().insert(key, file.clone());
        Ok(file)
    }

    fn cache_file(&self, key: &ModuleVersion) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(key.to_string()))
    }

    fn read_cached(&self, key: &ModuleVersion) -> Result<Option<String>, ProxyError> {
        let Some(file) = self.cache_file(key) else {
            return Ok(None);
        };
        match std::fs::read_to_string(&file) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ProxyError::Io { path: file, source }),
        }
    }

    fn write_cached(&self, key: &ModuleVersion, text: &str) {
        let Some(file) = self.cache_file(key) else {
            return;
        };
        if let Err(e) = write_file(&file, text) {
            log::warn!("failed to cache go.mod at {}: {}", file.display(), e);
        }
    }
}

fn write_file(file: &Path, text: &str) -> std::io::Result<()> {
    if let Some(dir) = file.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(file, text)
}
