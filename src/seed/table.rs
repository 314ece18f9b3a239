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

use crate::config::SeedConfig;
use crate::seed::{Seed, SeedId};
use std::sync::RwLock;

/// The append-only seed arena (spec.md §3 "The set of seeds is
/// append-only within a crawl; seeds are identified by a stable
/// integer index."). `push_extra` always assigns an id strictly
/// greater than every id assigned so far, which is what makes extra
/// seed numbering deterministic across a replay of the same redirect
/// sequence (spec.md §8, invariant 8).
#[derive(Debug, Default)]
pub struct SeedTable {
    seeds: RwLock<Vec<Seed>>,
}

impl SeedTable {
    pub fn new() -> Self {
        Self {
            seeds: RwLock::new(Vec::new()),
        }
    }

    /// Loads the original seeds from config. Must be called before any
    /// `push_extra` call.
    pub fn from_config(configs: Vec<SeedConfig>) -> Self {
        let seeds = configs
            .into_iter()
            .enumerate()
            .map(|(idx, config)| Seed::new(idx as SeedId, config, true))
            .collect();
        Self {
            seeds: RwLock::new(seeds),
        }
    }

    pub fn get(&self, id: SeedId) -> Option<Seed> {
        self.seeds.read().unwrap().get(id as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.seeds.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Seed> {
        self.seeds.read().unwrap().clone()
    }

    /// Materializes an extra seed from `orig`'s scope configuration but
    /// pointing at `redirected_url` (spec.md §3 "Extra-seeds list",
    /// §4.4 "Redirect handling"). Returns the newly assigned id.
    pub fn push_extra(&self, orig: &Seed, redirected_url: String) -> SeedId {
        let mut guard = self.seeds.write().unwrap();
        let new_id = guard.len() as SeedId;
        let mut config = orig.config.clone();
        config.url = redirected_url;
        guard.push(Seed::new(new_id, config, false));
        new_id
    }

    /// Restores extra seeds from a checkpoint in the exact order they
    /// were recorded, reproducing the original id assignment.
    pub fn restore_extra(&self, orig_seed_id: SeedId, redirected_url: String) -> Option<SeedId> {
        let orig = self.get(orig_seed_id)?;
        Some(self.push_extra(&orig, redirected_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedConfig;

    #[test]
    fn extra_seed_ids_are_strictly_increasing() {
        let table = SeedTable::from_config(vec![SeedConfig {
            url: "http://s/".to_string(),
            ..Default::default()
        }]);
        let orig = table.get(0).unwrap();
        let e1 = table.push_extra(&orig, "http://t/welcome".to_string());
        let e2 = table.push_extra(&orig, "http://u/welcome".to_string());
        assert_eq!(e1, 1);
        assert_eq!(e2, 2);
        assert!(!table.get(e1).unwrap().is_original_seed());
    }
}
