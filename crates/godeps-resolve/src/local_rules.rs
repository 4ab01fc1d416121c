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

//! Modules the repository already provides through `go_module` build rules.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use godeps_util::common::{GO_MODULE_LABEL_PREFIX, GO_MODULE_RULE};
use godeps_util::module::{ModuleVersion, split_module_version};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalModule {
    /// The build label of the rule providing the module.
    pub label: String,
    pub module: ModuleVersion,
    /// Where the module's sources appear once the rule is built.
    pub src_root: PathBuf,
}

#[derive(Debug, Error)]
pub enum LocalRuleError {
    #[error("failed to run {tool}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed:\n{stderr}")]
    Failed { command: String, stderr: String },
    #[error("malformed build query output")]
    Json(#[from] serde_json::Error),
    #[error("{target} has no outputs")]
    NoOutputs { target: String },
    #[error("malformed label {label:?} on {target}")]
    BadLabel { target: String, label: String },
}

pub trait LocalRules {
    /// Every module the build graph already provides.
    fn query_modules(&self) -> Result<Vec<LocalModule>, LocalRuleError>;

    /// Builds the rule at `label` so its outputs exist on disk.
    fn build(&self, label: &str) -> Result<(), LocalRuleError>;
}

/// Used where the build tool isn't available, e.g. in tests.
pub struct NoLocalRules;

impl LocalRules for NoLocalRules {
    fn query_modules(&self) -> Result<Vec<LocalModule>, LocalRuleError> {
        Ok(Vec::new())
    }

    fn build(&self, _label: &str) -> Result<(), LocalRuleError> {
        Ok(())
    }
}

/// Queries and builds rules with the `plz` binary.
#[derive(Debug, Clone)]
pub struct PleaseTool {
    please: PathBuf,
    third_party_folder: String,
    gen_dir: PathBuf,
}

impl PleaseTool {
    pub fn new(please: PathBuf, third_party_folder: &str, gen_dir: PathBuf) -> Self {
        PleaseTool {
            please,
            third_party_folder: third_party_folder.trim_matches('/').to_string(),
            gen_dir,
        }
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, LocalRuleError> {
        let command = format!("{} {}", self.please.display(), args.join(" "));
        log::debug!("running {command}");
        let output = Command::new(&self.please)
            .args(args)
            .output()
            .map_err(|source| LocalRuleError::Spawn {
                tool: self.please.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(LocalRuleError::Failed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }
}

impl LocalRules for PleaseTool {
    fn query_modules(&self) -> Result<Vec<LocalModule>, LocalRuleError> {
        let pattern = format!("//{}/...", self.third_party_folder);
        let out = self.run(&[
            "query",
            "print",
            "--include",
            GO_MODULE_RULE,
            "--json",
            &pattern,
        ])?;
        parse_query_output(&out, &self.gen_dir)
    }

    fn build(&self, label: &str) -> Result<(), LocalRuleError> {
        tracing::info!("building {label}");
        self.run(&["build", label]).map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct QueryTarget {
    #[serde(default)]
    outs: Vec<String>,
    #[serde(default)]
    labels: Vec<String>,
}

/// Reads `plz query print --json` output: targets carrying a
/// `go_module:path@version` label provide that module under the generated
/// output directory.
pub fn parse_query_output(
    json: &[u8],
    gen_dir: &Path,
) -> Result<Vec<LocalModule>, LocalRuleError> {
    let targets: BTreeMap<String, QueryTarget> = serde_json::from_slice(json)?;
    let mut modules = Vec::new();
    for (target, info) in targets {
        for label in &info.labels {
            let Some(module) = label.strip_prefix(GO_MODULE_LABEL_PREFIX) else {
                continue;
            };
            let module = split_module_version(module).ok_or_else(|| LocalRuleError::BadLabel {
                target: target.clone(),
                label: label.clone(),
            })?;
            let out = info.outs.first().ok_or_else(|| LocalRuleError::NoOutputs {
                target: target.clone(),
            })?;
            modules.push(LocalModule {
                label: target.clone(),
                module,
                src_root: gen_dir.join(out),
            });
        }
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_output() {
        let json = br#"{
            "//third_party/go:errors": {
                "outs": ["errors"],
                "labels": ["go_module:github.com/pkg/errors@v0.9.1", "go"]
            },
            "//third_party/go:tool": {
                "outs": ["tool"],
                "labels": ["other"]
            }
        }"#;
        let modules = parse_query_output(json, Path::new("plz-out/gen")).unwrap();
        assert_eq!(
            modules,
            vec![LocalModule {
                label: "//third_party/go:errors".into(),
                module: ModuleVersion::new("github.com/pkg/errors", "v0.9.1"),
                src_root: PathBuf::from("plz-out/gen/errors"),
            }]
        );
    }

    #[test]
    fn labelled_target_without_outputs() {
        let json = br#"{"//x:y": {"labels": ["go_module:example.com/m@v1.0.0"]}}"#;
        assert!(matches!(
            parse_query_output(json, Path::new("gen")),
            Err(LocalRuleError::NoOutputs { .. })
        ));
    }

    #[test]
    fn malformed_label() {
        let json = br#"{"//x:y": {"outs": ["y"], "labels": ["go_module:example.com/m"]}}"#;
        assert!(matches!(
            parse_query_output(json, Path::new("gen")),
            Err(LocalRuleError::BadLabel { .. })
        ));
    }
}
