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

//! Identifying licences from licence file text.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::LicenceError;

pub trait LicenceClassifier {
    /// The licence covering the sources in `dir`.
    fn identify(&self, dir: &Path) -> Result<String, LicenceError>;
}

/// Minimum share of a licence's phrases that must appear in the text.
pub const CONFIDENCE_THRESHOLD: f64 = 0.9;

static LICENCE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i-u:(un)?(licen[cs]e|copying))([-._].*)?$").expect("valid licence file regex")
});

struct Fingerprint {
    name: &'static str,
    phrases: &'static [&'static str],
}

const BSD_CLAUSES: [&str; 4] = [
    "redistribution and use in source and binary forms with or without modification are permitted provided that the following conditions are met",
    "redistributions of source code must retain the above copyright notice",
    "redistributions in binary form must reproduce the above copyright notice",
    "as is and any express or implied warranties including but not limited to the implied warranties of merchantability and fitness for a particular purpose are disclaimed",
];

static FINGERPRINTS: &[Fingerprint] = &[
    Fingerprint {
        name: "MIT",
        phrases: &[
            "permission is hereby granted free of charge to any person obtaining a copy",
            "to deal in the software without restriction",
            "the above copyright notice and this permission notice shall be included in all copies or substantial portions of the software",
            "the software is provided as is without warranty of any kind express or implied",
        ],
    },
    Fingerprint {
        name: "ISC",
        phrases: &[
            "permission to use copy modify and or distribute this software for any purpose with or without fee is hereby granted",
            "the software is provided as is and the author disclaims all warranties",
        ],
    },
    Fingerprint {
        name: "Apache-2.0",
        phrases: &[
            "apache license",
            "version 2 0 january 2004",
            "terms and conditions for use reproduction and distribution",
            "grant of copyright license",
            "grant of patent license",
            "limitation of liability",
        ],
    },
    Fingerprint {
        name: "BSD-2-Clause",
        phrases: &BSD_CLAUSES,
    },
    Fingerprint {
        name: "BSD-3-Clause",
        phrases: &[
            BSD_CLAUSES[0],
            BSD_CLAUSES[1],
            BSD_CLAUSES[2],
            BSD_CLAUSES[3],
            "neither the name of",
            "may be used to endorse or promote products derived from this software without specific prior written permission",
        ],
    },
    Fingerprint {
        name: "MPL-2.0",
        phrases: &[
            "mozilla public license version 2 0",
            "covered software",
            "larger work",
            "executable form",
            "this source code form is subject to the terms of the mozilla public license",
        ],
    },
    Fingerprint {
        name: "Unlicense",
        phrases: &[
            "this is free and unencumbered software released into the public domain",
            "anyone is free to copy modify publish use compile sell or distribute this software",
            "for more information please refer to",
        ],
    },
    Fingerprint {
        name: "GPL-2.0",
        phrases: &[
            "gnu general public license",
            "version 2 june 1991",
            "everyone is permitted to copy and distribute verbatim copies",
            "the licenses for most software are designed to take away your freedom to share and change it",
            "terms and conditions for copying distribution and modification",
        ],
    },
    Fingerprint {
        name: "GPL-3.0",
        phrases: &[
            "gnu general public license",
            "version 3 29 june 2007",
            "everyone is permitted to copy and distribute verbatim copies",
            "the gnu general public license is a free copyleft license for software and other kinds of works",
            "terms and conditions",
        ],
    },
    Fingerprint {
        name: "LGPL-2.1",
        phrases: &[
            "gnu lesser general public license",
            "version 2 1 february 1999",
            "everyone is permitted to copy and distribute verbatim copies",
            "the licenses for most software are designed to take away your freedom to share and change it",
        ],
    },
    Fingerprint {
        name: "LGPL-3.0",
        phrases: &[
            "gnu lesser general public license",
            "version 3 29 june 2007",
            "everyone is permitted to copy and distribute verbatim copies",
            "this version of the gnu lesser general public license incorporates the terms and conditions of version 3 of the gnu general public license",
        ],
    },
];

/// Lowercase words separated by single spaces, padded with a space each side.
fn normalise(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        out.push_str(&word.to_lowercase());
        out.push(' ');
    }
    out
}

/// The best matching licence for `text` and its score.
pub fn classify(text: &str) -> Option<(&'static str, f64)> {
    let text = normalise(text);
    let mut best: Option<(&Fingerprint, f64)> = None;
    for fp in FINGERPRINTS {
        let found = fp
            .phrases
            .iter()
            .filter(|p| text.contains(&format!(" {p} ")))
            .count();
        let score = found as f64 / fp.phrases.len() as f64;
        // Ties go to the more specific licence.
        let better = match best {
            None => true,
            Some((b, s)) => score > s || (score == s && fp.phrases.len() > b.phrases.len()),
        };
        if better {
            best = Some((fp, score));
        }
    }
    best.filter(|&(_, score)| score >= CONFIDENCE_THRESHOLD)
        .map(|(fp, score)| (fp.name, score))
}

/// Licence files directly inside `dir`, by name.
fn licence_files(dir: &Path) -> Result<Vec<PathBuf>, LicenceError> {
    let entries = std::fs::read_dir(dir).map_err(|source| LicenceError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        if path.is_file() && LICENCE_FILE.is_match(&name.to_string_lossy()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The root of the module containing `dir`: the nearest directory holding a
/// `go.mod` or named `path@version` as in the module cache.
fn is_module_root(dir: &Path) -> bool {
    dir.join("go.mod").is_file()
        || dir
            .file_name()
            .is_some_and(|n| n.to_string_lossy().contains('@'))
}

/// Reads licence files next to the sources, or in any parent directory up to
/// the module root, and recognises them from built-in fingerprints.
#[derive(Debug, Default)]
pub struct TextClassifier;

impl TextClassifier {
    pub fn new() -> Self {
        TextClassifier
    }
}

impl LicenceClassifier for TextClassifier {
    fn identify(&self, dir: &Path) -> Result<String, LicenceError> {
        let mut unrecognised = None;
        for current in dir.ancestors() {
            for file in licence_files(current)? {
                let text = std::fs::read_to_string(&file).map_err(|source| LicenceError::Io {
                    path: file.clone(),
                    source,
                })?;
                match classify(&text) {
                    Some((name, score)) => {
                        log::trace!("{} matches {name} ({score:.2})", file.display());
                        return Ok(name.to_string());
                    }
                    None if unrecognised.is_none() => unrecognised = Some(file),
                    None => {}
                }
            }
            if is_module_root(current) {
                break;
            }
        }
        Err(match unrecognised {
            Some(file) => LicenceError::Unrecognised { file },
            None => LicenceError::NotFound {
                dir: dir.to_path_buf(),
            },
        })
    }
}

/// Answers with a fixed licence and records which directories it was asked
/// about.
#[cfg(test)]
pub struct CountingClassifier {
    licence: String,
    fail_for: Option<PathBuf>,
    calls: std::cell::RefCell<Vec<PathBuf>>,
}

#[cfg(test)]
impl CountingClassifier {
    pub fn new(licence: &str) -> Self {
        CountingClassifier {
            licence: licence.to_string(),
            fail_for: None,
            calls: Default::default(),
        }
    }

    /// Answers `MIT`, except for `dir`, which has no licence.
    pub fn failing_for(dir: impl Into<PathBuf>) -> Self {
        CountingClassifier {
            fail_for: Some(dir.into()),
            ..Self::new("MIT")
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.borrow().clone()
    }
}

#[cfg(test)]
impl LicenceClassifier for CountingClassifier {
    fn identify(&self, dir: &Path) -> Result<String, LicenceError> {
        self.calls.borrow_mut().push(dir.to_path_buf());
        if self.fail_for.as_deref() == Some(dir) {
            return Err(LicenceError::NotFound {
                dir: dir.to_path_buf(),
            });
        }
        Ok(self.licence.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIT: &str = "MIT License

Copyright (c) 2015 Someone

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the \"Software\"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY.
";

    const BSD_3: &str = "Copyright (c) 2009 The Go Authors. All rights reserved.

Redistribution and use in source and binary forms, with or without
modification, are permitted provided that the following conditions are
met:

   * Redistributions of source code must retain the above copyright
notice, this list of conditions and the following disclaimer.
   * Redistributions in binary form must reproduce the above
copyright notice, this list of conditions and the following disclaimer
in the documentation and/or other materials provided with the
distribution.
   * Neither the name of Google Inc. nor the names of its
contributors may be used to endorse or promote products derived from
this software without specific prior written permission.

THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
\"AS IS\" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
A PARTICULAR PURPOSE ARE DISCLAIMED.
";

    #[test]
    fn classifies_common_licences() {
        assert_eq!(classify(MIT).map(|(n, _)| n), Some("MIT"));
        assert_eq!(classify(BSD_3).map(|(n, _)| n), Some("BSD-3-Clause"));
        let bsd_2 = BSD_3.replace("Neither the name", "Either the name");
        let bsd_2 = bsd_2.replace("may be used to endorse", "may be used");
        assert_eq!(classify(&bsd_2).map(|(n, _)| n), Some("BSD-2-Clause"));
        assert_eq!(classify("All rights reserved. Do not copy."), None);
    }

    #[test]
    fn licence_file_names() {
        for name in ["LICENSE", "LICENCE.md", "license.txt", "COPYING", "UNLICENSE", "LICENSE-MIT"] {
            assert!(LICENCE_FILE.is_match(name), "{name}");
        }
        for name in ["README.md", "licensed.go", "NOTICE"] {
            assert!(!LICENCE_FILE.is_match(name), "{name}");
        }
    }

    #[test]
    fn walks_up_to_the_module_root() {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("m");
        let pkg = module.join("internal/pkg");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(module.join("go.mod"), "module example.com/m\n").unwrap();
        std::fs::write(module.join("LICENSE"), MIT).unwrap();
        // Above the module root, so never consulted.
        std::fs::write(dir.path().join("LICENSE"), BSD_3).unwrap();

        assert_eq!(TextClassifier::new().identify(&pkg).unwrap(), "MIT");
    }

    #[test]
    fn reports_missing_and_unknown_licences() {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("example.com/m@v1.0.0");
        std::fs::create_dir_all(&module).unwrap();
        let err = TextClassifier::new().identify(&module).unwrap_err();
        assert!(matches!(err, LicenceError::NotFound { .. }), "{err}");

        std::fs::write(module.join("COPYING"), "Proprietary. Ask first.").unwrap();
        let err = TextClassifier::new().identify(&module).unwrap_err();
        assert!(
            matches!(&err, LicenceError::Unrecognised { file } if file.ends_with("COPYING")),
            "{err}"
        );
    }
}
