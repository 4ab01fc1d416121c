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

use godeps_util::config::ResolveConfig;

#[derive(Debug, clap::Parser)]
#[clap(
    name = "godeps",
    about = "Adds Go modules and their dependencies to a Please repository as go_module rules"
)]
pub struct GodepsCli {
    /// Packages or patterns (`path/...`) to add, optionally with `@version`
    pub packages: Vec<String>,

    /// The directory holding third-party Go rules
    #[clap(long = "third_party", value_name = "DIR")]
    pub third_party: Option<String>,

    /// Give each module its own BUILD file under the third-party directory
    #[clap(long, short = 's')]
    pub structured: bool,

    /// Rewrite BUILD files in place instead of printing them
    #[clap(long, short = 'w')]
    pub write: bool,

    /// The Please binary used to query and build existing rules
    #[clap(long = "please_path", value_name = "PATH", env = "GODEPS_PLEASE")]
    pub please_path: Option<String>,

    /// The Go binary used to download modules
    #[clap(long = "go_path", value_name = "PATH", env = "GODEPS_GO")]
    pub go_path: Option<String>,

    /// Only re-identify the licences of modules already in the repository
    #[clap(long = "update_licences_only", conflicts_with = "packages")]
    pub update_licences_only: bool,

    /// Build tags to honour when selecting source files
    #[clap(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    #[clap(flatten)]
    pub flags: UniversalFlags,
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct UniversalFlags {
    /// Suppress progress output
    #[clap(long, short = 'q')]
    pub quiet: bool,

    /// Increase verbosity
    #[clap(long, short = 'v')]
    pub verbose: bool,

    /// Trace the execution of the program into trace.json
    #[clap(long)]
    pub trace: bool,
}

impl GodepsCli {
    /// Command line settings take precedence over `.godeps.json`.
    pub fn apply_to(&self, config: &mut ResolveConfig) {
        if let Some(tp) = &self.third_party {
            config.third_party_folder = tp.trim_end_matches('/').to_string();
        }
        if let Some(please) = &self.please_path {
            config.please_tool = please.clone();
        }
        if let Some(go) = &self.go_path {
            config.go_tool = go.clone();
        }
        for tag in &self.tags {
            if !config.build_tags.contains(tag) {
                config.build_tags.push(tag.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults() {
        let cli = GodepsCli::try_parse_from(["godeps", "github.com/a/b/..."]).unwrap();
        assert_eq!(cli.packages, ["github.com/a/b/..."]);
        assert!(!cli.structured);
        assert!(!cli.write);
        let mut config = ResolveConfig::new();
        let before = config.third_party_folder.clone();
        cli.apply_to(&mut config);
        assert_eq!(config.third_party_folder, before);
    }

    #[test]
    fn overrides() {
        let cli = GodepsCli::try_parse_from([
            "godeps",
            "--third_party",
            "third_party/golang/",
            "-s",
            "-w",
            "--please_path",
            "/opt/plz",
            "--tags",
            "netgo,osusergo",
            "golang.org/x/net@v0.1.0",
        ])
        .unwrap();
        assert!(cli.structured);
        assert!(cli.write);
        let mut config = ResolveConfig::new();
        cli.apply_to(&mut config);
        assert_eq!(config.third_party_folder, "third_party/golang");
        assert_eq!(config.please_tool, "/opt/plz");
        assert_eq!(config.build_tags, ["netgo", "osusergo"]);
    }

    #[test]
    fn licence_refresh_takes_no_packages() {
        assert!(GodepsCli::try_parse_from(["godeps", "--update_licences_only"]).is_ok());
        assert!(
            GodepsCli::try_parse_from(["godeps", "--update_licences_only", "github.com/a/b"])
                .is_err()
        );
    }
}
