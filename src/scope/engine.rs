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

use crate::scope::rules::SerializableRegex;
use crate::scope::ScopeError;
use crate::seed::Seed;
use crate::url::{Depth, NormalizedUrl};

/// The outcome of an accepted `isIncluded` call: the normalized URL and
/// whether accepting it consumed one of the seed's extra hops.
#[derive(Debug, Clone)]
pub struct ScopeDecision {
    pub url: NormalizedUrl,
    pub is_out_of_scope: bool,
}

/// Stateless decision engine; all mutable state (the runtime exclusion
/// list operators can grow via `processMessage`) lives in whatever
/// calls it, not here — this keeps `ScopeEngine` trivially `Sync` and
/// cheap to share across workers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScopeEngine;

impl ScopeEngine {
    pub fn new() -> Self {
        Self
    }

    /// spec.md §4.1 `isIncluded`. `extra_hops` is the *prospective*
    /// value the entry would carry if accepted as out-of-scope, i.e.
    /// the parent page's `extra_hops + 1` — this is what lets a URL be
    /// "enqueued with extraHops=1" (scenario 2 in spec.md §8) rather
    /// than the pre-increment count. In-scope acceptances ignore this
    /// value entirely and keep the parent's original `extra_hops`.
    pub fn is_included(
        &self,
        seed: &Seed,
        raw_url: &str,
        base: &url::Url,
        depth: u32,
        extra_hops: u32,
        no_oos: bool,
        extra_excludes: &[SerializableRegex],
    ) -> Result<ScopeDecision, ScopeError> {
        let normalized = NormalizedUrl::normalize(raw_url, Some(base), seed.rules.allow_hash)?;
        let candidate = normalized.as_url().as_str();

        let seed_normalized =
            NormalizedUrl::normalize(&seed.config.url, None, seed.rules.allow_hash).ok();
        let is_seed_url = seed_normalized.as_ref().map(|s| s == &normalized) == Some(true);

        let is_out_of_scope = if is_seed_url {
            false
        } else {
            let within_depth_budget = match seed.rules.max_depth {
                Some(max_depth) => depth <= max_depth,
                None => true,
            };
            let in_scope = within_depth_budget && seed.rules.is_in_scope(candidate);

            if in_scope {
                false
            } else if !no_oos && extra_hops <= seed.rules.max_extra_hops {
                true
            } else {
                return Err(ScopeError::OutOfScope);
            }
        };

        if seed.rules.is_excluded(candidate, extra_excludes) {
            return Err(ScopeError::Excluded);
        }

        Ok(ScopeDecision {
            url: normalized,
            is_out_of_scope,
        })
    }

    /// True when no child discovered on a page at `(depth, extra_hops)`
    /// could ever be accepted, letting a worker skip link extraction
    /// entirely (spec.md §4.1 `isAtMaxDepth`).
    pub fn is_at_max_depth(&self, seed: &Seed, depth: Depth) -> bool {
        let child_depth = depth.depth + 1;
        let depth_exhausted = match seed.rules.max_depth {
            Some(max_depth) => child_depth > max_depth,
            None => false,
        };
        let extra_hops_exhausted = depth.extra_hops >= seed.rules.max_extra_hops;
        depth_exhausted && extra_hops_exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScopeType, SeedConfig};

    fn host_seed(url: &str, max_extra_hops: u32) -> Seed {
        let config = SeedConfig {
            url: url.to_string(),
            scope_type: ScopeType::Host,
            max_extra_hops,
            ..Default::default()
        };
        Seed::new(0, config, true)
    }

    fn prefix_seed_depth1() -> Seed {
        let config = SeedConfig {
            url: "http://s/a".to_string(),
            scope_type: ScopeType::Prefix,
            max_depth: Some(1),
            ..Default::default()
        };
        Seed::new(0, config, true)
    }

    #[test]
    fn depth_limit_scenario() {
        // spec.md §8 scenario 1
        let seed = prefix_seed_depth1();
        let engine = ScopeEngine::new();
        let base = url::Url::parse("http://s/a").unwrap();
        let accepted = engine
            .is_included(&seed, "http://s/b", &base, 1, 0, false, &[])
            .unwrap();
        assert!(!accepted.is_out_of_scope);
        // /d would be depth 2, beyond max_depth=1; this seed has no extra-hop budget (0).
        let rejected = engine.is_included(&seed, "http://s/d", &base, 2, 1, false, &[]);
        assert!(rejected.is_err());
    }

    #[test]
    fn extra_hops_scenario() {
        // spec.md §8 scenario 2
        let seed = host_seed("http://s/", 1);
        let engine = ScopeEngine::new();
        let base = url::Url::parse("http://s/").unwrap();
        // /x: parent extra_hops=0, prospective=1, within budget of 1.
        let x = engine
            .is_included(&seed, "http://other/x", &base, 1, 1, false, &[])
            .unwrap();
        assert!(x.is_out_of_scope);
        // /y: parent (x's) extra_hops=1, prospective=2, exceeds budget of 1.
        let y = engine.is_included(&seed, "http://other/y", &base, 2, 2, false, &[]);
        assert!(y.is_err());
    }

    #[test]
    fn exclude_wins_over_include() {
        // spec.md §8 scenario 3
        let config = SeedConfig {
            url: "http://s/".to_string(),
            scope_type: ScopeType::Host,
            exclude: vec!["/admin/".to_string()],
            ..Default::default()
        };
        let seed = Seed::new(0, config, true);
        let engine = ScopeEngine::new();
        let base = url::Url::parse("http://s/").unwrap();
        assert!(engine
            .is_included(&seed, "http://s/public", &base, 1, 0, false, &[])
            .is_ok());
        assert!(engine
            .is_included(&seed, "http://s/admin/login", &base, 1, 0, false, &[])
            .is_err());
    }

    #[test]
    fn is_at_max_depth_respects_remaining_extra_hop_budget() {
        let seed = prefix_seed_depth1();
        let engine = ScopeEngine::new();
        assert!(engine.is_at_max_depth(&seed, Depth { depth: 1, extra_hops: 0 }));
        let seed_with_hops = host_seed("http://s/", 2);
        assert!(!engine.is_at_max_depth(
            &seed_with_hops,
            Depth { depth: 1, extra_hops: 0 }
        ));
    }
}
