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

use crate::config::{ScopeType, SeedConfig};
use crate::toolkit::domains::registered_domain;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A `Regex` that round-trips through serde as its source string, so
/// `Seed`/`ScopeRules` stay (de)serializable for checkpointing without
/// hand-rolling a visitor.
#[derive(Debug, Clone)]
pub struct SerializableRegex(pub Regex);

impl Serialize for SerializableRegex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Output, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for SerializableRegex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Regex::new(&s)
            .map(SerializableRegex)
            .map_err(serde::de::Error::custom)
    }
}

/// The resolved, pre-compiled scope rules for one seed (spec.md §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeRules {
    pub include: Vec<SerializableRegex>,
    pub exclude: Vec<SerializableRegex>,
    pub allow_hash: bool,
    /// `None` represents the spec's `maxDepth = -1` (unbounded).
    pub max_depth: Option<u32>,
    pub max_extra_hops: u32,
}

fn compile_all(patterns: &[String]) -> Vec<SerializableRegex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok().map(SerializableRegex))
        .collect()
}

/// Rewrites the scheme prefix of a derived pattern to `https?:` so
/// http and https are treated as the same scope (spec.md §4.1, final
/// paragraph of the scope-type table).
fn scheme_agnostic(pattern: &str) -> String {
    if let Some(rest) = pattern.strip_prefix("^https://") {
        format!("^https?://{}", rest)
    } else if let Some(rest) = pattern.strip_prefix("^http://") {
        format!("^https?://{}", rest)
    } else {
        pattern.to_string()
    }
}

impl ScopeRules {
    /// Derives the include regex for scope types that don't supply
    /// `custom`, per the table in spec.md §4.1.
    pub fn derive(config: &SeedConfig) -> Self {
        let seed_url = url::Url::parse(&config.url).ok();
        let (derived_include, allow_hash): (Vec<String>, bool) = match config.scope_type {
            ScopeType::Page => (Vec::new(), false),
            ScopeType::PageSpa => {
                let escaped = regex::escape(&config.url);
                (vec![format!("^{}#.+", escaped)], true)
            }
            ScopeType::Prefix => {
                let pattern = seed_url
                    .as_ref()
                    .map(|u| {
                        let origin = format!("{}://{}", u.scheme(), u.host_str().unwrap_or(""));
                        let dir = {
                            let path = u.path();
                            match path.rfind('/') {
                                Some(idx) => &path[..=idx],
                                None => "/",
                            }
                        };
                        format!("^{}", regex::escape(&format!("{}{}", origin, dir)))
                    })
                    .unwrap_or_default();
                (vec![scheme_agnostic(&pattern)], false)
            }
            ScopeType::Host => {
                let pattern = seed_url
                    .as_ref()
                    .map(|u| {
                        format!(
                            "^{}/",
                            regex::escape(&format!(
                                "{}://{}",
                                u.scheme(),
                                u.host_str().unwrap_or("")
                            ))
                        )
                    })
                    .unwrap_or_default();
                (vec![scheme_agnostic(&pattern)], false)
            }
            ScopeType::Domain => {
                let pattern = seed_url
                    .as_ref()
                    .map(|u| {
                        let registered = registered_domain(u.host_str().unwrap_or(""));
                        format!(
                            "^{}://([^/]+\\.)*{}/",
                            u.scheme(),
                            regex::escape(&registered)
                        )
                    })
                    .unwrap_or_default();
                (vec![scheme_agnostic(&pattern)], false)
            }
            ScopeType::Any => (vec![".*".to_string()], false),
            ScopeType::Custom => (config.include.clone(), false),
        };

        Self {
            include: compile_all(&derived_include),
            exclude: compile_all(&config.exclude),
            allow_hash,
            max_depth: config.max_depth,
            max_extra_hops: config.max_extra_hops,
        }
    }

    pub fn is_in_scope(&self, candidate: &str) -> bool {
        self.include.iter().any(|r| r.0.is_match(candidate))
    }

    pub fn is_excluded(&self, candidate: &str, extra_excludes: &[SerializableRegex]) -> bool {
        self.exclude.iter().any(|r| r.0.is_match(candidate))
            || extra_excludes.iter().any(|r| r.0.is_match(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(scope_type: ScopeType, url: &str) -> SeedConfig {
        SeedConfig {
            url: url.to_string(),
            scope_type,
            ..Default::default()
        }
    }

    #[test]
    fn prefix_scope_matches_subpaths_only() {
        let rules = ScopeRules::derive(&seed(ScopeType::Prefix, "http://s/dir/page.html"));
        assert!(rules.is_in_scope("http://s/dir/other.html"));
        assert!(!rules.is_in_scope("http://s/elsewhere/other.html"));
    }

    #[test]
    fn host_scope_is_scheme_agnostic() {
        let rules = ScopeRules::derive(&seed(ScopeType::Host, "http://s/"));
        assert!(rules.is_in_scope("https://s/anything"));
    }

    #[test]
    fn domain_scope_matches_subdomains_of_registered_domain() {
        let rules = ScopeRules::derive(&seed(ScopeType::Domain, "http://www.example.com/"));
        assert!(rules.is_in_scope("http://blog.example.com/post"));
        assert!(!rules.is_in_scope("http://example.org/post"));
    }

    #[test]
    fn page_spa_allows_hash_routes() {
        let rules = ScopeRules::derive(&seed(ScopeType::PageSpa, "http://s/app"));
        assert!(rules.allow_hash);
        assert!(rules.is_in_scope("http://s/app#/route"));
    }

    #[test]
    fn any_scope_matches_everything() {
        let rules = ScopeRules::derive(&seed(ScopeType::Any, "http://s/"));
        assert!(rules.is_in_scope("http://anything/at/all"));
    }
}
