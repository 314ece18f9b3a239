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

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The scope family a seed derives its include rule from, spec.md
/// §4.1's scope-type derivation table.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ScopeType {
    Page,
    PageSpa,
    Prefix,
    Host,
    Domain,
    Any,
    Custom,
}

/// Where a seed's sitemap should be found.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitemapSource {
    Url(String),
    Detect,
}

/// HTTP basic-auth credentials bound to a seed's origin.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// The configuration of a single seed (spec.md §3 "Seed").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub url: String,
    pub scope_type: ScopeType,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// -1 means unbounded; represented here as `None`, resolved to a
    /// large cap (`u32::MAX`) by `ScopeEngine`.
    pub max_depth: Option<u32>,
    pub max_extra_hops: u32,
    pub auth: Option<BasicAuth>,
    pub sitemap: Option<SitemapSource>,
    pub select_links: Vec<LinkSelector>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            scope_type: ScopeType::Prefix,
            include: Vec::new(),
            exclude: Vec::new(),
            max_depth: None,
            max_extra_hops: 0,
            auth: None,
            sitemap: None,
            select_links: Vec::new(),
        }
    }
}

/// One `(cssSelector, attribute-or-property, isAttribute)` triple for
/// `LinkExtractor` (spec.md §4.5). The default set, when a seed
/// supplies none, is `a[href] -> @href`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSelector {
    pub css_selector: String,
    pub attribute_or_property: String,
    pub is_attribute: bool,
}

impl LinkSelector {
    pub fn default_anchor_href() -> Self {
        Self {
            css_selector: "a[href]".to_string(),
            attribute_or_property: "href".to_string(),
            is_attribute: true,
        }
    }
}
