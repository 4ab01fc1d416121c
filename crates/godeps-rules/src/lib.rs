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

//! Reading and writing the `go_module` and `go_mod_download` rules that
//! describe third-party Go modules in Please BUILD files.

pub mod file;
pub mod format;
pub mod lexer;
pub mod parser;
pub mod read;

use std::path::PathBuf;

use godeps_resolve::model::GraphError;
use thiserror::Error;

pub use read::{BuildGraph, RulesConfig};

pub use godeps_util::common::{GO_MOD_DOWNLOAD_RULE as GO_MOD_DOWNLOAD, GO_MODULE_RULE as GO_MODULE};

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: parser::ParseError,
    },
    #[error("failed to access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{line}: {kind} rule has no {attr}", .path.display())]
    MissingAttr {
        path: PathBuf,
        line: usize,
        kind: String,
        attr: &'static str,
    },
    #[error("{}:{line}: no go_mod_download rule named {label}", .path.display())]
    UnknownDownload {
        path: PathBuf,
        line: usize,
        label: String,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
}
