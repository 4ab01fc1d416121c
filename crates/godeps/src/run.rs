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

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use godeps_resolve::download::{GoModDownloader, ModuleSources};
use godeps_resolve::driver::PleaseDriver;
use godeps_resolve::licence::{self, LicenceWarning, TextClassifier};
use godeps_resolve::local_rules::{LocalRules, PleaseTool};
use godeps_resolve::mvs::VersionResolver;
use godeps_resolve::proxy::{OnlineProxy, ProxyClient};
use godeps_resolve::update::update_modules;
use godeps_rules::{BuildGraph, RulesConfig};
use godeps_util::common::{GO_MOD, PLEASE_GEN_DIR};
use godeps_util::config::{ResolveConfig, locate_tool};
use godeps_util::modfile;

use crate::cli::GodepsCli;

/// The module declared by `go.mod` in `dir`, if any. Its packages are part of
/// the repository and never get rules of their own.
pub fn root_module(dir: &Path) -> anyhow::Result<String> {
    let path = dir.join(GO_MOD);
    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let file = modfile::parse(&source)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(file.module.unwrap_or_default())
}

fn report(warnings: &[LicenceWarning]) {
    for warning in warnings {
        tracing::warn!("{warning}");
    }
}

fn rules_config(config: &ResolveConfig, structured: bool) -> RulesConfig {
    RulesConfig {
        third_party_folder: config.third_party_folder.clone(),
        build_file_name: config.build_file_name.clone(),
        structured,
    }
}

pub fn run_godeps(cli: &GodepsCli) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let mut config = ResolveConfig::load(&cwd)?;
    cli.apply_to(&mut config);

    let mut graph = BuildGraph::new(rules_config(&config, cli.structured));
    graph.read_third_party().context("failed to read existing rules")?;
    let root = root_module(&cwd)?;

    let please = PleaseTool::new(
        locate_tool(&config.please_tool),
        &config.third_party_folder,
        PathBuf::from(PLEASE_GEN_DIR),
    );
    let mut sources = GoModDownloader::new(
        locate_tool(&config.go_tool),
        config.out_dir.clone(),
        Box::new(please.clone()),
    );
    let classifier = TextClassifier::new();

    let warnings = if cli.update_licences_only {
        for local in please.query_modules()? {
            sources.add_local_module(local);
        }
        licence::refresh_all_licences(&mut graph.modules, &mut sources, &classifier)
    } else {
        if cli.packages.is_empty() {
            anyhow::bail!("no packages given, nothing to do");
        }
        let proxy = ProxyClient::new(
            Box::new(OnlineProxy::new(&config.proxy_url)),
            Some(config.modfile_cache_dir()),
        );
        let mut driver = PleaseDriver::new(
            VersionResolver::new(proxy),
            Box::new(sources),
            Box::new(please),
            config.build_context(),
        );
        update_modules(
            &mut graph.modules,
            &root,
            &mut driver,
            &cli.packages,
            &classifier,
        )?
    };
    report(&warnings);

    graph.format().context("failed to update rules")?;
    if cli.write {
        graph.write_files()?;
    } else {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        graph.print_files(&mut out)?;
        out.flush()?;
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_module_from_go_mod() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(root_module(dir.path()).unwrap(), "");
        std::fs::write(
            dir.path().join(GO_MOD),
            "module github.com/example/repo\n\ngo 1.21\n",
        )
        .unwrap();
        assert_eq!(root_module(dir.path()).unwrap(), "github.com/example/repo");
    }

    #[test]
    fn unparseable_go_mod() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GO_MOD), "module (\n").unwrap();
        let err = root_module(dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse"));
    }
}
