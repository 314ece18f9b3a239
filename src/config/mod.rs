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

mod limits;
mod loader;
mod seed;

pub use limits::*;
pub use loader::{load_config, ConfigLoadError};
pub use seed::*;

use serde::{Deserialize, Serialize};

/// The immutable, by-value configuration for a single crawl. Copied
/// into each component at construction (spec.md §9 "Global state");
/// nothing downstream reaches back up to mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub seeds: Vec<SeedConfig>,
    pub limits: Limits,
    pub timing: Timing,
    pub workers: WorkerConfig,
    pub rules: Rules,
    pub behaviors: Behaviors,
    pub failure_policy: FailurePolicy,
    pub persistence: Persistence,
    pub sitemap: SitemapDates,
    pub misc: Misc,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            limits: Limits::default(),
            timing: Timing::default(),
            workers: WorkerConfig::default(),
            rules: Rules::default(),
            behaviors: Behaviors::default(),
            failure_policy: FailurePolicy::default(),
            persistence: Persistence::default(),
            sitemap: SitemapDates::default(),
            misc: Misc::default(),
        }
    }
}
