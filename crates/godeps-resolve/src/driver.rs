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

//! Loading Go packages, and everything they import, from module sources.

#[cfg(test)]
pub mod fake;
mod please;

use std::path::PathBuf;

use godeps_util::gosrc::ScanError;
use indexmap::IndexMap;
use thiserror::Error;

pub use please::PleaseDriver;

use crate::download::DownloadError;
use crate::local_rules::LocalRuleError;
use crate::model::PackageModule;
use crate::mvs::ResolveError;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPackage {
    pub id: String,
    /// The Go package name; `main` for commands.
    pub name: String,
    /// `None` only for packages of the main module.
    pub module: Option<PackageModule>,
    /// Import paths, standard library included.
    pub imports: Vec<String>,
    pub go_files: Vec<PathBuf>,
    pub other_files: Vec<PathBuf>,
}

impl LoadedPackage {
    pub fn is_command(&self) -> bool {
        self.name == "main"
    }
}

#[derive(Debug, Default)]
pub struct DriverResponse {
    /// The packages the patterns matched.
    pub roots: Vec<String>,
    /// Every package loaded, roots and their transitive imports, by id.
    pub packages: IndexMap<String, LoadedPackage>,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    LocalRule(#[from] LocalRuleError),
    #[error("failed to load package {package}")]
    Scan {
        package: String,
        #[source]
        source: ScanError,
    },
    #[error("no requirement recorded for module {0}")]
    MissingRequirement(String),
    #[error("{package} from {importer}")]
    Import {
        package: String,
        importer: String,
        #[source]
        source: Box<DriverError>,
    },
}

impl DriverError {
    pub(crate) fn imported(self, package: &str, importer: &str) -> Self {
        DriverError::Import {
            package: package.to_string(),
            importer: importer.to_string(),
            source: Box::new(self),
        }
    }
}

pub trait PackageDriver {
    /// Loads the packages matching `patterns` and their transitive imports.
    /// Patterns are import paths, optionally ending in `/...` and optionally
    /// suffixed with `@version`.
    fn load(&mut self, patterns: &[String]) -> Result<DriverResponse, DriverError>;

    /// Loads more packages of modules that are already required, keeping
    /// their versions. Patterns carry no versions.
    fn reload(&mut self, patterns: &[String]) -> Result<DriverResponse, DriverError> {
        self.load(patterns)
    }
}
