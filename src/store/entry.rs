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

use crate::seed::SeedId;
use crate::url::{Depth, NormalizedUrl};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// One entry living in the shared queue (spec.md §3 "QueueEntry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub url: NormalizedUrl,
    pub seed_id: SeedId,
    pub depth: Depth,
    #[serde(with = "time::serde::rfc3339")]
    pub enqueued_at: OffsetDateTime,
    pub page_id: Option<Uuid>,
}

impl QueueEntry {
    pub fn seed(seed_id: SeedId, url: NormalizedUrl) -> Self {
        Self {
            url,
            seed_id,
            depth: Depth::seed(),
            enqueued_at: OffsetDateTime::now_utc(),
            page_id: None,
        }
    }

    pub fn child(seed_id: SeedId, url: NormalizedUrl, depth: Depth) -> Self {
        Self {
            url,
            seed_id,
            depth,
            enqueued_at: OffsetDateTime::now_utc(),
            page_id: None,
        }
    }

    /// The key used for dedup and for addressing terminal-state sets.
    pub fn key(&self) -> &str {
        self.url.dedup_key()
    }
}
