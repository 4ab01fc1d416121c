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

pub const DEFAULT_PROXY: &str = "https://proxy.golang.org";
pub const DEFAULT_THIRD_PARTY_FOLDER: &str = "third_party/go";
pub const DEFAULT_BUILD_FILE_NAME: &str = "BUILD";
pub const DEFAULT_PLEASE_TOOL: &str = "plz";
pub const DEFAULT_GO_TOOL: &str = "go";

pub const GODEPS_OUT_DIR: &str = "plz-out/godeps";
pub const PLEASE_GEN_DIR: &str = "plz-out/gen";
pub const MODFILE_CACHE_DIR: &str = "modfiles";
pub const GOPATH_DIR: &str = "go";
pub const CONFIG_FILE: &str = ".godeps.json";

pub const GO_MOD: &str = "go.mod";
pub const GO_MODULE_RULE: &str = "go_module";
pub const GO_MOD_DOWNLOAD_RULE: &str = "go_mod_download";
pub const GO_MODULE_LABEL_PREFIX: &str = "go_module:";

/// Pattern suffix that selects a package and every package beneath it.
pub const WILDCARD: &str = "...";

/// The cgo pseudo-package. Packages that import it can't be built as pure Go.
pub const CGO_IMPORT: &str = "C";

/// Standard library import paths have no dot in their first path element.
pub fn is_std_import(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or_default();
    !first.contains('.')
}

/// Splits `foo/bar/...` into `("foo/bar", true)`. Plain patterns come back
/// unchanged with `false`.
pub fn split_wildcard(pattern: &str) -> (&str, bool) {
    if pattern == WILDCARD {
        return ("", true);
    }
    match pattern.strip_suffix(WILDCARD) {
        Some(root) => (root.trim_end_matches('/'), true),
        None => (pattern, false),
    }
}

/// Turns a wildcard install (`""`, `"."` or a sub-directory) of `module`
/// into a loadable `.../...` pattern.
pub fn wildcard_pattern(module: &str, wildcard: &str) -> String {
    match wildcard.trim_matches('/') {
        "" | "." => format!("{module}/{WILDCARD}"),
        wc => format!("{module}/{wc}/{WILDCARD}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_imports_have_no_dotted_host() {
        assert!(is_std_import("fmt"));
        assert!(is_std_import("net/http"));
        assert!(is_std_import("C"));
        assert!(!is_std_import("github.com/pkg/errors"));
        assert!(!is_std_import("golang.org/x/net/http2"));
    }

    #[test]
    fn wildcards() {
        assert_eq!(split_wildcard("example.com/foo/..."), ("example.com/foo", true));
        assert_eq!(split_wildcard("example.com/foo"), ("example.com/foo", false));
        assert_eq!(split_wildcard("..."), ("", true));
        assert_eq!(wildcard_pattern("example.com/m", ""), "example.com/m/...");
        assert_eq!(wildcard_pattern("example.com/m", "."), "example.com/m/...");
        assert_eq!(wildcard_pattern("example.com/m", "sub"), "example.com/m/sub/...");
    }
}
