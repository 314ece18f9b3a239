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

mod input;
mod table;

pub use input::read_seed_file;
pub use table::SeedTable;

use crate::config::SeedConfig;
use crate::scope::ScopeRules;
use serde::{Deserialize, Serialize};

/// A stable integer id into the append-only seed arena (spec.md §9
/// "Arena + index for seeds"). Never reused, never `null`.
pub type SeedId = u32;

/// A single seed: identity, starting URL, and its resolved scope rules.
/// `original` distinguishes seeds supplied by config from `extra`
/// seeds materialized on a seed redirect (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seed {
    pub id: SeedId,
    pub config: SeedConfig,
    pub rules: ScopeRules,
    pub original: bool,
}

impl Seed {
    pub fn new(id: SeedId, config: SeedConfig, original: bool) -> Self {
        let rules = ScopeRules::derive(&config);
        Self {
            id,
            config,
            rules,
            original,
        }
    }

    pub fn is_original_seed(&self) -> bool {
        self.original
    }
}
