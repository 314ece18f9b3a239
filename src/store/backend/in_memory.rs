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

use crate::store::backend::CrawlStoreBackend;
use crate::store::{AddOutcome, CrawlStatus, QueueEntry, StateBlob, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

struct InProgress {
    entry: QueueEntry,
    worker: String,
    deadline: time::OffsetDateTime,
}

/// The default `CrawlStoreBackend`: everything lives in one process's
/// memory, protected by a single mutex (spec.md §9 "single-process
/// default"). Good enough for one worker pool; `RedisBackend` is the
/// multi-process alternative.
#[derive(Default)]
pub struct InMemoryBackend {
    inner: Mutex<State>,
}

#[derive(Default)]
struct State {
    queue_by_depth: BTreeMap<u32, VecDeque<QueueEntry>>,
    in_progress: HashMap<String, InProgress>,
    seen: HashSet<String>,
    done: HashSet<String>,
    failed: HashSet<String>,
    excluded: HashSet<String>,
    extra_seeds: Vec<(u32, String)>,
    sitemap_done: HashSet<u32>,
    status: CrawlStatus,
    exclusions: Vec<String>,
    limit_hit: bool,
}

impl State {
    /// `queued + inProgress + done + failed + excluded` (spec.md §3
    /// "Page limit"): every key that ever entered `seen` stays there
    /// regardless of which terminal set it later moves to, so `seen`'s
    /// size is already this total.
    fn total_pages(&self) -> u64 {
        self.seen.len() as u64
    }

    /// Removes `key`'s in-progress lock iff `worker` still owns it,
    /// returning whether it did. A reclaimed lock has a different (or
    /// no) owner by the time the displaced worker gets around to
    /// calling this, so its terminal-state write is dropped rather
    /// than clobbering the reclaiming worker's own outcome.
    fn take_owned_lock(&mut self, key: &str, worker: &str) -> bool {
        match self.in_progress.get(key) {
            Some(pending) if pending.worker == worker => {
                self.in_progress.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Moves any in-progress entry whose deadline has elapsed back to
    /// the front of its depth bucket (spec.md §4.2 "Lock reclamation").
    fn reclaim_stale_locks(&mut self, now: time::OffsetDateTime) {
        let stale: Vec<String> = self
            .in_progress
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            if let Some(pending) = self.in_progress.remove(&key) {
                self.queue_by_depth
                    .entry(pending.entry.depth.depth)
                    .or_default()
                    .push_front(pending.entry);
            }
        }
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CrawlStoreBackend for InMemoryBackend {
    async fn add_to_queue(
        &self,
        entry: QueueEntry,
        page_limit: Option<u64>,
    ) -> Result<AddOutcome, StoreError> {
        let mut state = self.inner.lock().await;
        if state.limit_hit {
            return Ok(AddOutcome::LimitHit);
        }
        let key = entry.key().to_string();
        if state.seen.contains(&key) {
            return Ok(AddOutcome::DupeUrl);
        }
        if let Some(limit) = page_limit {
            if state.total_pages() >= limit {
                state.limit_hit = true;
                return Ok(AddOutcome::LimitHit);
            }
        }
        state.seen.insert(key);
        state
            .queue_by_depth
            .entry(entry.depth.depth)
            .or_default()
            .push_back(entry);
        Ok(AddOutcome::Added)
    }

    async fn is_limit_hit(&self) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.limit_hit)
    }

    async fn next_from_queue(
        &self,
        worker: &str,
        deadline: time::OffsetDateTime,
    ) -> Result<Option<QueueEntry>, StoreError> {
        let mut state = self.inner.lock().await;
        state.reclaim_stale_locks(time::OffsetDateTime::now_utc());
        let next_depth = state
            .queue_by_depth
            .iter()
            .find(|(_, q)| !q.is_empty())
            .map(|(depth, _)| *depth);
        let Some(depth) = next_depth else {
            return Ok(None);
        };
        let entry = state
            .queue_by_depth
            .get_mut(&depth)
            .and_then(|q| q.pop_front());
        if let Some(entry) = entry {
            state.in_progress.insert(
                entry.key().to_string(),
                InProgress {
                    entry: entry.clone(),
                    worker: worker.to_string(),
                    deadline,
                },
            );
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    async fn mark_finished(&self, key: &str, worker: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        if state.take_owned_lock(key, worker) {
            state.done.insert(key.to_string());
        }
        Ok(())
    }

    async fn mark_failed(&self, key: &str, worker: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        if state.take_owned_lock(key, worker) {
            state.failed.insert(key.to_string());
        }
        Ok(())
    }

    async fn mark_excluded(&self, key: &str, worker: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        if state.take_owned_lock(key, worker) {
            state.excluded.insert(key.to_string());
        }
        Ok(())
    }

    async fn clear_own_pending_locks(&self, worker: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        let stale: Vec<String> = state
            .in_progress
            .iter()
            .filter(|(_, p)| p.worker == worker)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            if let Some(pending) = state.in_progress.remove(&key) {
                state
                    .queue_by_depth
                    .entry(pending.entry.depth.depth)
                    .or_default()
                    .push_front(pending.entry);
            }
        }
        Ok(())
    }

    async fn add_extra_seed(&self, orig_seed_id: u32, url: String) -> Result<bool, StoreError> {
        let mut state = self.inner.lock().await;
        if state
            .extra_seeds
            .iter()
            .any(|(id, u)| *id == orig_seed_id && u == &url)
        {
            return Ok(false);
        }
        state.extra_seeds.push((orig_seed_id, url));
        Ok(true)
    }

    async fn get_extra_seeds(&self) -> Result<Vec<(u32, String)>, StoreError> {
        Ok(self.inner.lock().await.extra_seeds.clone())
    }

    async fn mark_sitemap_done(&self, seed_id: u32) -> Result<(), StoreError> {
        self.inner.lock().await.sitemap_done.insert(seed_id);
        Ok(())
    }

    async fn is_sitemap_done(&self, seed_id: u32) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.sitemap_done.contains(&seed_id))
    }

    async fn set_status(&self, status: CrawlStatus) -> Result<(), StoreError> {
        self.inner.lock().await.status = status;
        Ok(())
    }

    async fn get_status(&self) -> Result<CrawlStatus, StoreError> {
        Ok(self.inner.lock().await.status)
    }

    async fn queue_size(&self) -> Result<u64, StoreError> {
        let state = self.inner.lock().await;
        Ok(state.queue_by_depth.values().map(|q| q.len() as u64).sum())
    }

    async fn num_pending(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.in_progress.len() as u64)
    }

    async fn num_done(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.done.len() as u64)
    }

    async fn num_failed(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.failed.len() as u64)
    }

    async fn get_pending_list(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state
            .in_progress
            .values()
            .map(|p| p.entry.clone())
            .collect())
    }

    async fn is_seen(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.seen.contains(key))
    }

    async fn add_exclusion(&self, pattern: String) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        if !state.exclusions.contains(&pattern) {
            state.exclusions.push(pattern);
        }
        Ok(())
    }

    async fn remove_exclusion(&self, pattern: &str) -> Result<(), StoreError> {
        self.inner.lock().await.exclusions.retain(|p| p != pattern);
        Ok(())
    }

    async fn exclusions(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.lock().await.exclusions.clone())
    }

    async fn serialize(&self) -> Result<StateBlob, StoreError> {
        let state = self.inner.lock().await;
        let mut queue_by_depth = BTreeMap::new();
        for (depth, queue) in &state.queue_by_depth {
            queue_by_depth.insert(*depth, queue.iter().cloned().collect());
        }
        // In-progress entries go back to the front of the snapshot so a
        // resumed crawl re-attempts them (spec.md §4.2 `load`).
        for pending in state.in_progress.values() {
            queue_by_depth
                .entry(pending.entry.depth.depth)
                .or_insert_with(Vec::new)
                .insert(0, pending.entry.clone());
        }
        Ok(StateBlob {
            queue_by_depth,
            seen: state.seen.clone(),
            done: state.done.clone(),
            failed: state.failed.clone(),
            excluded: state.excluded.clone(),
            extra_seeds: state.extra_seeds.clone(),
            sitemap_done: state.sitemap_done.clone(),
            status: state.status,
        })
    }

    async fn load(&self, blob: StateBlob) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        state.queue_by_depth = blob
            .queue_by_depth
            .into_iter()
            .map(|(depth, entries)| (depth, entries.into_iter().collect()))
            .collect();
        state.in_progress.clear();
        state.seen = blob.seen;
        state.done = blob.done;
        state.failed = blob.failed;
        state.excluded = blob.excluded;
        state.extra_seeds = blob.extra_seeds;
        state.sitemap_done = blob.sitemap_done;
        state.status = blob.status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::NormalizedUrl;

    fn entry(url: &str) -> QueueEntry {
        QueueEntry::seed(0, NormalizedUrl::normalize(url, None, false).unwrap())
    }

    #[tokio::test]
    async fn dedupes_on_add() {
        let backend = InMemoryBackend::new();
        assert_eq!(
            backend.add_to_queue(entry("http://s/a"), None).await.unwrap(),
            AddOutcome::Added
        );
        assert_eq!(
            backend.add_to_queue(entry("http://s/a"), None).await.unwrap(),
            AddOutcome::DupeUrl
        );
    }

    #[tokio::test]
    async fn lower_depth_drains_first() {
        let backend = InMemoryBackend::new();
        let mut deep = entry("http://s/deep");
        deep.depth.depth = 2;
        backend.add_to_queue(deep, None).await.unwrap();
        backend.add_to_queue(entry("http://s/shallow"), None).await.unwrap();
        let deadline = time::OffsetDateTime::UNIX_EPOCH;
        let first = backend.next_from_queue("w1", deadline).await.unwrap().unwrap();
        assert_eq!(first.url.dedup_key(), "http://s/shallow");
    }

    #[tokio::test]
    async fn crash_recovery_requeues_pending() {
        let backend = InMemoryBackend::new();
        backend.add_to_queue(entry("http://s/a"), None).await.unwrap();
        let deadline = time::OffsetDateTime::UNIX_EPOCH;
        backend.next_from_queue("w1", deadline).await.unwrap();
        assert_eq!(backend.queue_size().await.unwrap(), 0);
        backend.clear_own_pending_locks("w1").await.unwrap();
        assert_eq!(backend.queue_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_workers_mark_finished_is_ignored_after_reclaim() {
        // spec.md §8 invariant 1/6: a worker whose lock already expired
        // must not clobber the reclaiming worker's outcome.
        let backend = InMemoryBackend::new();
        backend.add_to_queue(entry("http://s/a"), None).await.unwrap();
        let past_deadline = time::OffsetDateTime::UNIX_EPOCH;
        backend.next_from_queue("w1", past_deadline).await.unwrap();
        let future_deadline = time::OffsetDateTime::now_utc() + time::Duration::hours(1);
        backend.next_from_queue("w2", future_deadline).await.unwrap();

        // w1 finally gets around to reporting outcome for a lock it no longer owns.
        backend.mark_finished("http://s/a", "w1").await.unwrap();
        assert_eq!(backend.num_done().await.unwrap(), 0);

        // w2, the true current owner, can still finish it normally.
        backend.mark_finished("http://s/a", "w2").await.unwrap();
        assert_eq!(backend.num_done().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn page_limit_is_sticky_once_hit() {
        let backend = InMemoryBackend::new();
        assert_eq!(
            backend.add_to_queue(entry("http://s/a"), Some(1)).await.unwrap(),
            AddOutcome::Added
        );
        assert_eq!(
            backend.add_to_queue(entry("http://s/b"), Some(1)).await.unwrap(),
            AddOutcome::LimitHit
        );
        assert!(backend.is_limit_hit().await.unwrap());
        // Sticky: even a URL that would otherwise be a fresh add stays rejected.
        assert_eq!(
            backend.add_to_queue(entry("http://s/c"), Some(100)).await.unwrap(),
            AddOutcome::LimitHit
        );
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimed_by_next_dequeue() {
        let backend = InMemoryBackend::new();
        backend.add_to_queue(entry("http://s/a"), None).await.unwrap();
        let past_deadline = time::OffsetDateTime::UNIX_EPOCH;
        let first = backend.next_from_queue("w1", past_deadline).await.unwrap().unwrap();
        assert_eq!(first.url.dedup_key(), "http://s/a");
        // w1's lock already expired; w2 should be able to reclaim it.
        let future_deadline = time::OffsetDateTime::now_utc() + time::Duration::hours(1);
        let reclaimed = backend
            .next_from_queue("w2", future_deadline)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reclaimed.url.dedup_key(), "http://s/a");
    }

    #[tokio::test]
    async fn serialize_then_load_round_trips() {
        let backend = InMemoryBackend::new();
        backend.add_to_queue(entry("http://s/a"), None).await.unwrap();
        backend.mark_sitemap_done(0).await.unwrap();
        let blob = backend.serialize().await.unwrap();

        let restored = InMemoryBackend::new();
        restored.load(blob).await.unwrap();
        assert_eq!(restored.queue_size().await.unwrap(), 1);
        assert!(restored.is_sitemap_done(0).await.unwrap());
    }

    #[tokio::test]
    async fn sitemap_done_is_scoped_per_seed() {
        let backend = InMemoryBackend::new();
        backend.mark_sitemap_done(1).await.unwrap();
        assert!(backend.is_sitemap_done(1).await.unwrap());
        assert!(!backend.is_sitemap_done(2).await.unwrap());
    }
}
