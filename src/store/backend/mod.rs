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

mod in_memory;
#[cfg(feature = "redis-store")]
mod redis_backend;

pub use in_memory::InMemoryBackend;
#[cfg(feature = "redis-store")]
pub use redis_backend::RedisBackend;

use crate::store::{AddOutcome, CrawlStatus, QueueEntry, StateBlob, StoreError};
use async_trait::async_trait;

/// The storage substrate `CrawlStore` delegates to (spec.md §4.2). One
/// narrow trait per the teacher's `SupportsX` convention, object-safe
/// so a `CrawlStore` can hold `Box<dyn CrawlStoreBackend>` without
/// knowing whether it's backed by memory or Redis.
#[async_trait]
pub trait CrawlStoreBackend: Send + Sync {
    /// spec.md §4.2 `addToQueue(entry, pageLimit)`. `page_limit` bounds
    /// `queued + inProgress + done + failed + excluded`; once the first
    /// call that would exceed it is observed, `LimitHit` becomes sticky
    /// process-wide (`is_limit_hit`) and every later call returns it
    /// too, even for URLs that would otherwise dedupe-fail first.
    async fn add_to_queue(
        &self,
        entry: QueueEntry,
        page_limit: Option<u64>,
    ) -> Result<AddOutcome, StoreError>;

    /// Whether a prior `add_to_queue` has observed the page limit
    /// (spec.md §3 "sets the global `limitHit` flag").
    async fn is_limit_hit(&self) -> Result<bool, StoreError>;

    /// Pops the next entry in FIFO-within-lowest-nonempty-depth order
    /// (spec.md §4.2 "Ordering") and marks it in-progress for `worker`
    /// until `deadline`. First reclaims any in-progress lock whose own
    /// deadline has already passed (spec.md §4.2 "Lock reclamation").
    async fn next_from_queue(
        &self,
        worker: &str,
        deadline: time::OffsetDateTime,
    ) -> Result<Option<QueueEntry>, StoreError>;

    /// Transitions `key` to a terminal state iff `worker` is still its
    /// recorded in-progress owner. A worker whose lock was reclaimed
    /// after a deadline pass (spec.md §4.2 "Lock reclamation") calls
    /// this too late; the call is silently ignored so it cannot
    /// overwrite whatever the reclaiming worker goes on to do
    /// (spec.md §8 invariant 1, "No URL is dispatched to two workers
    /// simultaneously").
    async fn mark_finished(&self, key: &str, worker: &str) -> Result<(), StoreError>;
    async fn mark_failed(&self, key: &str, worker: &str) -> Result<(), StoreError>;
    async fn mark_excluded(&self, key: &str, worker: &str) -> Result<(), StoreError>;

    /// Releases any in-progress locks held by `worker`, returning its
    /// entries to the front of their depth bucket (spec.md §4.2
    /// `clearOwnPendingLocks`, used on worker crash recovery).
    async fn clear_own_pending_locks(&self, worker: &str) -> Result<(), StoreError>;

    async fn add_extra_seed(&self, orig_seed_id: u32, url: String) -> Result<bool, StoreError>;
    async fn get_extra_seeds(&self) -> Result<Vec<(u32, String)>, StoreError>;

    /// Marks seed `seed_id`'s own sitemap ingestion complete. Scoped
    /// per-seed (spec.md §4.3 "per-ingestion completion contract") so a
    /// crawl with several seeds, each draining its own sitemap
    /// concurrently, can't have one seed's completion truncate another
    /// still-in-flight seed's drain.
    async fn mark_sitemap_done(&self, seed_id: u32) -> Result<(), StoreError>;
    async fn is_sitemap_done(&self, seed_id: u32) -> Result<bool, StoreError>;

    async fn set_status(&self, status: CrawlStatus) -> Result<(), StoreError>;
    async fn get_status(&self) -> Result<CrawlStatus, StoreError>;
    async fn is_crawl_canceled(&self) -> Result<bool, StoreError> {
        Ok(self.get_status().await? == CrawlStatus::Canceled)
    }
    async fn is_crawl_stopped(&self) -> Result<bool, StoreError> {
        Ok(matches!(
            self.get_status().await?,
            CrawlStatus::Canceled | CrawlStatus::Failed | CrawlStatus::Done
        ))
    }

    async fn queue_size(&self) -> Result<u64, StoreError>;
    async fn num_pending(&self) -> Result<u64, StoreError>;
    async fn num_done(&self) -> Result<u64, StoreError>;
    async fn num_failed(&self) -> Result<u64, StoreError>;
    async fn get_pending_list(&self) -> Result<Vec<QueueEntry>, StoreError>;

    async fn is_seen(&self, key: &str) -> Result<bool, StoreError>;

    async fn add_exclusion(&self, pattern: String) -> Result<(), StoreError>;
    async fn remove_exclusion(&self, pattern: &str) -> Result<(), StoreError>;
    async fn exclusions(&self) -> Result<Vec<String>, StoreError>;

    async fn serialize(&self) -> Result<StateBlob, StoreError>;
    async fn load(&self, blob: StateBlob) -> Result<(), StoreError>;
}
