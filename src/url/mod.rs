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

mod depth;
mod origin;

pub use depth::Depth;
pub use origin::UrlOrigin;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Errors produced while normalizing a candidate URL (§3, §4.1).
#[derive(Debug, Error)]
pub enum UrlNormalizeError {
    #[error("not a parseable url: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme `{0}`, only http/https are crawlable")]
    UnsupportedScheme(String),
}

/// A URL that has gone through the normalization rules in §3:
/// fragment stripped unless the seed allows it, basic-auth userinfo
/// stripped, scheme restricted to http/https.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct NormalizedUrl(url::Url);

impl NormalizedUrl {
    /// Normalizes `raw` relative to `base` (if any), applying the
    /// stripping rules. `keep_hash` corresponds to `seed.allowHash`
    /// from §4.1 (true only for the `page-spa` scope).
    pub fn normalize(
        raw: &str,
        base: Option<&url::Url>,
        keep_hash: bool,
    ) -> Result<Self, UrlNormalizeError> {
        let mut parsed = match base {
            Some(base) => base.join(raw)?,
            None => url::Url::parse(raw)?,
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UrlNormalizeError::UnsupportedScheme(
                parsed.scheme().to_string(),
            ));
        }
        if !keep_hash {
            parsed.set_fragment(None);
        }
        // Strip any embedded basic-auth credentials; they never belong
        // in a queue key or a persisted checkpoint.
        let _ = parsed.set_username("");
        let _ = parsed.set_password(None);
        Ok(Self(parsed))
    }

    pub fn as_url(&self) -> &url::Url {
        &self.0
    }

    pub fn origin(&self) -> UrlOrigin {
        UrlOrigin::from_url(&self.0)
    }

    /// A stable dedup/lookup key. Two URLs that normalize identically
    /// produce the same key, which is what backs CrawlStore's
    /// uniqueness invariant (§3, §4.2).
    pub fn dedup_key(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for NormalizedUrl {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::hash::Hash for NormalizedUrl {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.as_str().hash(state)
    }
}

impl Display for NormalizedUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_by_default() {
        let u = NormalizedUrl::normalize("http://s/a#frag", None, false).unwrap();
        assert_eq!(u.as_url().fragment(), None);
    }

    #[test]
    fn keeps_fragment_for_spa() {
        let u = NormalizedUrl::normalize("http://s/a#frag", None, true).unwrap();
        assert_eq!(u.as_url().fragment(), Some("frag"));
    }

    #[test]
    fn strips_basic_auth() {
        let u = NormalizedUrl::normalize("http://user:pass@s/a", None, false).unwrap();
        assert_eq!(u.as_url().username(), "");
        assert_eq!(u.as_url().password(), None);
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = NormalizedUrl::normalize("ftp://s/a", None, false).unwrap_err();
        assert!(matches!(err, UrlNormalizeError::UnsupportedScheme(_)));
    }

    #[test]
    fn resolves_relative_against_base() {
        let base = url::Url::parse("http://s/dir/page.html").unwrap();
        let u = NormalizedUrl::normalize("../other", Some(&base), false).unwrap();
        assert_eq!(u.as_url().path(), "/other");
    }
}
