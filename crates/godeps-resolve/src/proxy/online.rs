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

use reqwest::StatusCode;
use serde::Deserialize;

use super::{ProxyError, ProxySource};

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "Version")]
    version: String,
}

/// A module proxy speaking the `GOPROXY` protocol over HTTP.
pub struct OnlineProxy {
    url_base: String,
    client: reqwest::blocking::Client,
}

impl OnlineProxy {
    pub fn new(url_base: &str) -> Self {
        OnlineProxy {
            url_base: url_base.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, path: &str, rest: &str) -> String {
        format!("{}/{}/{}", self.url_base, path.to_lowercase(), rest)
    }

    fn get(&self, url: String, module: &str) -> Result<String, ProxyError> {
        log::debug!("GET {url}");
        let resp = match self.client.get(&url).send() {
            Ok(resp) => resp,
            Err(source) => return Err(ProxyError::Http { url, source }),
        };
        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(ProxyError::ModuleNotFound(module.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ProxyError::UnexpectedStatus {
                url,
                status: status.as_u16(),
                body,
            });
        }
        resp.text().map_err(|source| ProxyError::Http { url, source })
    }
}

fn parse_info(module: &str, text: &str) -> Result<String, ProxyError> {
    let info: VersionInfo = serde_json::from_str(text).map_err(|source| ProxyError::Json {
        module: module.to_string(),
        source,
    })?;
    Ok(info.version)
}

impl ProxySource for OnlineProxy {
    fn latest(&self, path: &str) -> Result<String, ProxyError> {
        let text = self.get(self.url(path, "@latest"), path)?;
        parse_info(path, &text)
    }

    fn info(&self, path: &str, query: &str) -> Result<String, ProxyError> {
        let text = self.get(self.url(path, &format!("@v/{query}.info")), path)?;
        parse_info(path, &text)
    }

    fn go_mod(&self, path: &str, version: &str) -> Result<String, ProxyError> {
        self.get(self.url(path, &format!("@v/{version}.mod")), path)
    }
}
