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
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// The multi-process `CrawlStoreBackend` (spec.md §6 `REDIS_STORE_URL`):
/// lets several crawl processes share one queue. The depth-bucketed
/// ordering invariant is approximated with a sorted set scored by
/// `depth * 2^32 + sequence`, which keeps depth strictly primary while
/// preserving insertion order within a depth (spec.md §4.2 "Ordering").
pub struct RedisBackend {
    conn: ConnectionManager,
    prefix: String,
    sequence: AtomicU64,
}

impl RedisBackend {
    pub async fn connect(url: &str, collection: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(Self {
            conn,
            prefix: format!("crawlcore:{collection}"),
            sequence: AtomicU64::new(0),
        })
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{name}", self.prefix)
    }

    fn score(&self, depth: u32) -> f64 {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        (depth as f64) * 4_294_967_296.0 + (seq % 4_294_967_296) as f64
    }

    /// Removes `key`'s in-progress hash entry iff its recorded owner
    /// is still `worker`, returning whether it did. Mirrors
    /// `InMemoryBackend::take_owned_lock`: a worker whose lock was
    /// already reclaimed by `next_from_queue` (spec.md §4.2 "Lock
    /// reclamation") must not have its late terminal-state write
    /// clobber the reclaiming worker's outcome.
    async fn take_owned_lock(&self, key: &str, worker: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(self.key("inprogress"), key)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let Some(raw) = raw else { return Ok(false) };
        let Ok(record) = serde_json::from_str::<serde_json::Value>(&raw) else {
            return Ok(false);
        };
        let owner = record.get("worker").and_then(|v| v.as_str());
        if owner != Some(worker) {
            return Ok(false);
        }
        let _: () = conn
            .hdel(self.key("inprogress"), key)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(true)
    }

    /// Moves every in-progress entry whose deadline has elapsed back
    /// onto the queue, regardless of owner (spec.md §4.2 "Lock
    /// reclamation": "any in-progress lock past its deadline ... is
    /// reclaimable by `nextFromQueue`").
    async fn reclaim_stale_locks(&self, now: time::OffsetDateTime) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let all: std::collections::HashMap<String, String> = conn
            .hgetall(self.key("inprogress"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        for (key, raw) in all {
            let Ok(record) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            let expired = record
                .get("deadline")
                .and_then(|v| v.as_str())
                .and_then(|s| time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok())
                .map(|deadline| deadline <= now)
                .unwrap_or(false);
            if !expired {
                continue;
            }
            let Some(entry_value) = record.get("entry").cloned() else {
                continue;
            };
            let Ok(entry) = serde_json::from_value::<QueueEntry>(entry_value) else {
                continue;
            };
            let payload =
                serde_json::to_string(&entry).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let score = self.score(entry.depth.depth) - 4_294_967_296.0;
            let _: () = conn
                .zadd(self.key("queue"), payload, score)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
            let _: () = conn
                .hdel(self.key("inprogress"), &key)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl CrawlStoreBackend for RedisBackend {
    async fn add_to_queue(
        &self,
        entry: QueueEntry,
        page_limit: Option<u64>,
    ) -> Result<AddOutcome, StoreError> {
        let mut conn = self.conn.clone();
        if self.is_limit_hit().await? {
            return Ok(AddOutcome::LimitHit);
        }
        let key = entry.key().to_string();
        if let Some(limit) = page_limit {
            // `seen` already carries every URL that ever entered the
            // queue regardless of its current terminal state, so its
            // cardinality is exactly `queued+inProgress+done+failed+excluded`
            // (spec.md §3 "Page limit").
            let total: u64 = conn
                .scard(self.key("seen"))
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
            if total >= limit {
                let _: () = conn
                    .set(self.key("limit_hit"), 1_u8)
                    .await
                    .map_err(|e| StoreError::Unreachable(e.to_string()))?;
                return Ok(AddOutcome::LimitHit);
            }
        }
        let added: bool = conn
            .sadd(self.key("seen"), &key)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        if !added {
            return Ok(AddOutcome::DupeUrl);
        }
        let payload = serde_json::to_string(&entry).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let score = self.score(entry.depth.depth);
        let _: () = conn
            .zadd(self.key("queue"), payload, score)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(AddOutcome::Added)
    }

    async fn is_limit_hit(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<u8> = conn
            .get(self.key("limit_hit"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(value.unwrap_or(0) != 0)
    }

    async fn next_from_queue(
        &self,
        worker: &str,
        deadline: time::OffsetDateTime,
    ) -> Result<Option<QueueEntry>, StoreError> {
        let mut conn = self.conn.clone();
        self.reclaim_stale_locks(time::OffsetDateTime::now_utc())
            .await?;
        let popped: Vec<(String, f64)> = conn
            .zpopmin(self.key("queue"), 1)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let Some((payload, _)) = popped.into_iter().next() else {
            return Ok(None);
        };
        let entry: QueueEntry =
            serde_json::from_str(&payload).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let deadline_str = deadline
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let record = serde_json::json!({
            "entry": entry,
            "worker": worker,
            "deadline": deadline_str,
        });
        let _: () = conn
            .hset(
                self.key("inprogress"),
                entry.key(),
                record.to_string(),
            )
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(Some(entry))
    }

    async fn mark_finished(&self, key: &str, worker: &str) -> Result<(), StoreError> {
        if self.take_owned_lock(key, worker).await? {
            let mut conn = self.conn.clone();
            let _: () = conn
                .sadd(self.key("done"), key)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }
        Ok(())
    }

    async fn mark_failed(&self, key: &str, worker: &str) -> Result<(), StoreError> {
        if self.take_owned_lock(key, worker).await? {
            let mut conn = self.conn.clone();
            let _: () = conn
                .sadd(self.key("failed"), key)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }
        Ok(())
    }

    async fn mark_excluded(&self, key: &str, worker: &str) -> Result<(), StoreError> {
        if self.take_owned_lock(key, worker).await? {
            let mut conn = self.conn.clone();
            let _: () = conn
                .sadd(self.key("excluded"), key)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }
        Ok(())
    }

    async fn clear_own_pending_locks(&self, worker: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let all: std::collections::HashMap<String, String> = conn
            .hgetall(self.key("inprogress"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        for (key, raw) in all {
            let Ok(record) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            if record.get("worker").and_then(|v| v.as_str()) != Some(worker) {
                continue;
            }
            let Some(entry_value) = record.get("entry").cloned() else {
                continue;
            };
            let Ok(entry) = serde_json::from_value::<QueueEntry>(entry_value) else {
                continue;
            };
            let payload =
                serde_json::to_string(&entry).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let score = self.score(entry.depth.depth) - 4_294_967_296.0;
            let _: () = conn
                .zadd(self.key("queue"), payload, score)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
            let _: () = conn
                .hdel(self.key("inprogress"), &key)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }
        Ok(())
    }

    async fn add_extra_seed(&self, orig_seed_id: u32, url: String) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&(orig_seed_id, url))
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let added: bool = conn
            .sadd(self.key("extra_seeds_set"), &payload)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        if added {
            let _: () = conn
                .rpush(self.key("extra_seeds"), &payload)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }
        Ok(added)
    }

    async fn get_extra_seeds(&self) -> Result<Vec<(u32, String)>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(self.key("extra_seeds"), 0, -1)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        raw.into_iter()
            .map(|s| serde_json::from_str(&s).map_err(|e| StoreError::Corrupt(e.to_string())))
            .collect()
    }

    async fn mark_sitemap_done(&self, seed_id: u32) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .sadd(self.key("sitemap_done_seeds"), seed_id)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(())
    }

    async fn is_sitemap_done(&self, seed_id: u32) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.sismember(self.key("sitemap_done_seeds"), seed_id)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    async fn set_status(&self, status: CrawlStatus) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(self.key("status"), status.to_string())
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(())
    }

    async fn get_status(&self) -> Result<CrawlStatus, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.key("status"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        match raw {
            Some(s) => CrawlStatus::from_str(&s)
                .map_err(|_| StoreError::Corrupt(format!("unknown status `{s}`"))),
            None => Ok(CrawlStatus::default()),
        }
    }

    async fn queue_size(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.zcard(self.key("queue"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    async fn num_pending(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.hlen(self.key("inprogress"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    async fn num_done(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.scard(self.key("done"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    async fn num_failed(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.scard(self.key("failed"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    async fn get_pending_list(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let mut conn = self.conn.clone();
        let all: std::collections::HashMap<String, String> = conn
            .hgetall(self.key("inprogress"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let mut out = Vec::with_capacity(all.len());
        for raw in all.into_values() {
            let record: serde_json::Value =
                serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            if let Some(entry_value) = record.get("entry").cloned() {
                if let Ok(entry) = serde_json::from_value(entry_value) {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    async fn is_seen(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.sismember(self.key("seen"), key)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    async fn add_exclusion(&self, pattern: String) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .sadd(self.key("exclusions"), pattern)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(())
    }

    async fn remove_exclusion(&self, pattern: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .srem(self.key("exclusions"), pattern)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(())
    }

    async fn exclusions(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(self.key("exclusions"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    async fn serialize(&self) -> Result<StateBlob, StoreError> {
        // Used only for the local `collections/*.yaml` snapshot; Redis
        // itself is already durable, so this mirrors §4.2's contract
        // without being load-bearing for recovery when redis-store is
        // active (spec.md §6 "Persistence").
        let pending = self.get_pending_list().await?;
        let mut queue_by_depth: std::collections::BTreeMap<u32, Vec<QueueEntry>> =
            std::collections::BTreeMap::new();
        for entry in pending {
            queue_by_depth
                .entry(entry.depth.depth)
                .or_default()
                .push(entry);
        }
        let mut conn = self.conn.clone();
        let seen: std::collections::HashSet<String> = conn
            .smembers(self.key("seen"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let done: std::collections::HashSet<String> = conn
            .smembers(self.key("done"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let failed: std::collections::HashSet<String> = conn
            .smembers(self.key("failed"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let excluded: std::collections::HashSet<String> = conn
            .smembers(self.key("excluded"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let sitemap_done: std::collections::HashSet<u32> = conn
            .smembers(self.key("sitemap_done_seeds"))
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(StateBlob {
            queue_by_depth,
            seen,
            done,
            failed,
            excluded,
            extra_seeds: self.get_extra_seeds().await?,
            sitemap_done,
            status: self.get_status().await?,
        })
    }

    async fn load(&self, blob: StateBlob) -> Result<(), StoreError> {
        for entries in blob.queue_by_depth.into_values() {
            for entry in entries {
                self.add_to_queue(entry, None).await?;
            }
        }
        for seed_id in blob.sitemap_done {
            self.mark_sitemap_done(seed_id).await?;
        }
        self.set_status(blob.status).await?;
        for (id, url) in blob.extra_seeds {
            self.add_extra_seed(id, url).await?;
        }
        Ok(())
    }
}
