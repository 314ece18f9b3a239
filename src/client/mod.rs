// Copyright 2024 Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The one plain-HTTP collaborator the crawl core needs outside of the
//! browser: fetching sitemaps (spec.md §4.3). Page content itself
//! always goes through PageDriver's window.

use crate::config::BasicAuth;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {0}")]
    Status(reqwest::StatusCode),
}

/// A thin `reqwest` wrapper carrying the per-seed basic-auth header, if
/// any (spec.md §4.4 "Configures basic auth on the window's next
/// navigation if the seed has auth" — the same credentials apply to a
/// seed's plain-HTTP sitemap fetch).
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(user_agent: Option<&str>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua.to_string());
        }
        Ok(Self {
            inner: builder.build()?,
        })
    }

    pub async fn get_bytes(
        &self,
        url: &str,
        auth: Option<&BasicAuth>,
    ) -> Result<bytes::Bytes, ClientError> {
        let mut request = self.inner.get(url);
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response.bytes().await?)
    }
}
