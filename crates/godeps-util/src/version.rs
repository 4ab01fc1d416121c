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

//! Ordering of Go module versions.
//!
//! Go versions are semantic versions with a mandatory `v` prefix. Shorthands
//! such as `v1` and `v1.2` are accepted and padded with zeros. Build metadata
//! (`+incompatible`) takes no part in ordering.

use std::cmp::Ordering;

use semver::{BuildMetadata, Version};

pub const INCOMPATIBLE_SUFFIX: &str = "+incompatible";

pub fn parse(v: &str) -> Option<Version> {
    let rest = v.strip_prefix('v')?;
    let split = rest.find(['-', '+']).unwrap_or(rest.len());
    let (core, suffix) = rest.split_at(split);
    let full = match core.split('.').count() {
        1 if suffix.is_empty() => format!("{core}.0.0"),
        2 if suffix.is_empty() => format!("{core}.0"),
        3 => rest.to_string(),
        _ => return None,
    };
    let mut version = Version::parse(&full).ok()?;
    version.build = BuildMetadata::EMPTY;
    Some(version)
}

/// Whether `v` looks like a version at all (`v` followed by a digit).
pub fn has_version_prefix(v: &str) -> bool {
    v.strip_prefix('v')
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_digit())
}

/// Compares two versions. An invalid version sorts below every valid one
/// and equal to every other invalid one.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// The form a `v2+` module without a `go.mod` is published under.
pub fn incompatible(v: &str) -> String {
    if v.ends_with(INCOMPATIBLE_SUFFIX) {
        v.to_string()
    } else {
        format!("{v}{INCOMPATIBLE_SUFFIX}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert_eq!(compare("v1.2.3", "v1.2.3"), Ordering::Equal);
        assert_eq!(compare("v1.2.3", "v1.10.0"), Ordering::Less);
        assert_eq!(compare("v2.0.0", "v1.99.99"), Ordering::Greater);
        assert_eq!(compare("v1.0.0-rc.1", "v1.0.0"), Ordering::Less);
        assert_eq!(
            compare(
                "v0.0.0-20190101000000-abcdefabcdef",
                "v0.0.0-20200101000000-abcdefabcdef"
            ),
            Ordering::Less
        );
        assert_eq!(compare("v2.0.0+incompatible", "v2.0.0"), Ordering::Equal);
        assert_eq!(compare("v1", "v1.0.0"), Ordering::Equal);
        assert_eq!(compare("v1.2", "v1.2.1"), Ordering::Less);
    }

    #[test]
    fn invalid_versions_sort_first() {
        assert_eq!(compare("master", "v0.0.1"), Ordering::Less);
        assert_eq!(compare("v0.0.1", ""), Ordering::Greater);
        assert_eq!(compare("master", "main"), Ordering::Equal);
        assert!(parse("1.2.3").is_none());
        assert!(parse("v1.2.3.4").is_none());
    }

    #[test]
    fn prefixes() {
        assert!(has_version_prefix("v1.2.3"));
        assert!(has_version_prefix("v0.0.0-2019"));
        assert!(!has_version_prefix("latest"));
        assert!(!has_version_prefix("abcdef"));
        assert_eq!(incompatible("v2.0.0"), "v2.0.0+incompatible");
        assert_eq!(incompatible("v2.0.0+incompatible"), "v2.0.0+incompatible");
    }
}
