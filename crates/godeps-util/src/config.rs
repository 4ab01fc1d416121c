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
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::common::{
    CONFIG_FILE, DEFAULT_BUILD_FILE_NAME, DEFAULT_GO_TOOL, DEFAULT_PLEASE_TOOL, DEFAULT_PROXY,
    DEFAULT_THIRD_PARTY_FOLDER, GODEPS_OUT_DIR, MODFILE_CACHE_DIR,
};
use crate::gosrc::{BuildContext, host_goarch, host_goos};

/// Settings shared by every stage of a run. Defaults come from the
/// environment; a `.godeps.json` in the working directory overrides them and
/// command line flags override both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub proxy_url: String,
    pub please_tool: String,
    pub go_tool: String,
    pub third_party_folder: String,
    pub build_file_name: String,
    /// Scratch space for downloads and cached manifests.
    pub out_dir: PathBuf,
    pub goos: String,
    pub goarch: String,
    pub build_tags: Vec<String>,
    pub cgo_enabled: bool,
}

impl ResolveConfig {
    pub fn new() -> Self {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        ResolveConfig {
            proxy_url: proxy_from_env(env("GOPROXY").as_deref()),
            please_tool: DEFAULT_PLEASE_TOOL.into(),
            go_tool: DEFAULT_GO_TOOL.into(),
            third_party_folder: DEFAULT_THIRD_PARTY_FOLDER.into(),
            build_file_name: DEFAULT_BUILD_FILE_NAME.into(),
            out_dir: env("GODEPS_OUT").map_or_else(|| PathBuf::from(GODEPS_OUT_DIR), PathBuf::from),
            goos: env("GOOS").unwrap_or_else(|| host_goos().into()),
            goarch: env("GOARCH").unwrap_or_else(|| host_goarch().into()),
            build_tags: Vec::new(),
            cgo_enabled: env("CGO_ENABLED").is_none_or(|v| v != "0"),
        }
    }

    /// Loads `.godeps.json` from `dir` if there is one.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::new());
        }
        let file = File::open(&config_path)
            .with_context(|| format!("failed to open {}", config_path.display()))?;
        let reader = BufReader::new(file);
        let config: ResolveConfig = serde_json_lenient::from_reader(reader)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        log::debug!("loaded configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn build_context(&self) -> BuildContext {
        BuildContext {
            goos: self.goos.clone(),
            goarch: self.goarch.clone(),
            tags: self.build_tags.iter().cloned().collect::<HashSet<_>>(),
            cgo_enabled: self.cgo_enabled,
        }
    }

    pub fn modfile_cache_dir(&self) -> PathBuf {
        self.out_dir.join(MODFILE_CACHE_DIR)
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the first proxy from a `GOPROXY` list that can serve requests.
pub fn proxy_from_env(goproxy: Option<&str>) -> String {
    goproxy
        .into_iter()
        .flat_map(|v| v.split([',', '|']))
        .map(str::trim)
        .find(|p| !p.is_empty() && *p != "direct" && *p != "off")
        .map(|p| p.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_PROXY.to_string())
}

/// Finds `tool` on `PATH`, falling back to the name as given.
pub fn locate_tool(tool: &str) -> PathBuf {
    which::which(tool).unwrap_or_else(|_| PathBuf::from(tool))
}
