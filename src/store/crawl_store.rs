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

use crate::store::backend::{CrawlStoreBackend, InMemoryBackend};
use crate::store::{
    checkpoint, AddOutcome, ControlMessage, CrawlStatus, QueueEntry, StateBlob, StoreError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// The shared queue + per-URL status every worker coordinates through
/// (spec.md §4.2). A thin façade over a `CrawlStoreBackend`: the public
/// API is the full vocabulary spec.md §4.2 lists, independent of which
/// backend is plugged in underneath.
pub struct CrawlStore {
    backend: Arc<dyn CrawlStoreBackend>,
    checkpoint_dir: Option<PathBuf>,
    crawl_id: String,
    save_state_history: u32,
    page_limit: Option<u64>,
    queue_changed: watch::Sender<u64>,
    control_file: Option<PathBuf>,
    control_cursor: tokio::sync::Mutex<u64>,
}

impl CrawlStore {
    pub fn new(backend: Arc<dyn CrawlStoreBackend>, crawl_id: impl Into<String>) -> Self {
        let (queue_changed, _) = watch::channel(0);
        Self {
            backend,
            checkpoint_dir: None,
            crawl_id: crawl_id.into(),
            save_state_history: 5,
            page_limit: None,
            queue_changed,
            control_file: None,
            control_cursor: tokio::sync::Mutex::new(0),
        }
    }

    pub fn in_memory(crawl_id: impl Into<String>) -> Self {
        Self::new(Arc::new(InMemoryBackend::new()), crawl_id)
    }

    pub fn with_checkpointing(mut self, dir: PathBuf, save_state_history: u32) -> Self {
        self.checkpoint_dir = Some(dir);
        self.save_state_history = save_state_history;
        self
    }

    /// Caps `queued + inProgress + done + failed + excluded` (spec.md
    /// §3 "Page limit"). Carried on the facade so every caller's
    /// `add_to_queue(entry)` stays single-argument, matching how
    /// `SitemapIngester`/`LinkExtractor`/`PageWorker` invoke it.
    pub fn with_page_limit(mut self, page_limit: Option<u64>) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// Enables tailing `path` for operator-posted control messages
    /// (spec.md §4.2 `processMessage`). A worker calls
    /// `drain_control_file` once per loop iteration (spec.md §4.6 step 1).
    pub fn with_control_file(mut self, path: PathBuf) -> Self {
        self.control_file = Some(path);
        self
    }

    pub async fn add_to_queue(&self, entry: QueueEntry) -> Result<AddOutcome, StoreError> {
        let outcome = self.backend.add_to_queue(entry, self.page_limit).await?;
        if matches!(outcome, AddOutcome::Added) {
            self.notify_queue_changed();
        }
        Ok(outcome)
    }

    pub async fn is_limit_hit(&self) -> Result<bool, StoreError> {
        self.backend.is_limit_hit().await
    }

    pub async fn next_from_queue(
        &self,
        worker: &str,
        deadline: time::OffsetDateTime,
    ) -> Result<Option<QueueEntry>, StoreError> {
        self.backend.next_from_queue(worker, deadline).await
    }

    pub async fn mark_finished(&self, entry: &QueueEntry, worker: &str) -> Result<(), StoreError> {
        self.backend.mark_finished(entry.key(), worker).await?;
        self.notify_queue_changed();
        Ok(())
    }

    pub async fn mark_failed(&self, entry: &QueueEntry, worker: &str) -> Result<(), StoreError> {
        self.backend.mark_failed(entry.key(), worker).await?;
        self.notify_queue_changed();
        Ok(())
    }

    pub async fn mark_excluded(&self, entry: &QueueEntry, worker: &str) -> Result<(), StoreError> {
        self.backend.mark_excluded(entry.key(), worker).await
    }

    /// Recovers entries a crashed or restarted worker was holding
    /// (spec.md §4.2 `clearOwnPendingLocks`).
    pub async fn clear_own_pending_locks(&self, worker: &str) -> Result<(), StoreError> {
        self.backend.clear_own_pending_locks(worker).await?;
        self.notify_queue_changed();
        Ok(())
    }

    /// Subscribes to queue mutations (enqueue, finish, fail, lock
    /// release) so a `WorkerBarrier` can wake idle workers without
    /// polling (spec.md §4.7 "workers agree to stop only once the
    /// queue has been empty and unchanged").
    pub fn subscribe_to_change(&self) -> watch::Receiver<u64> {
        self.queue_changed.subscribe()
    }

    fn notify_queue_changed(&self) {
        self.queue_changed.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub async fn add_extra_seed(&self, orig_seed_id: u32, url: String) -> Result<bool, StoreError> {
        self.backend.add_extra_seed(orig_seed_id, url).await
    }

    pub async fn get_extra_seeds(&self) -> Result<Vec<(u32, String)>, StoreError> {
        self.backend.get_extra_seeds().await
    }

    pub async fn mark_sitemap_done(&self, seed_id: u32) -> Result<(), StoreError> {
        self.backend.mark_sitemap_done(seed_id).await
    }

    pub async fn is_sitemap_done(&self, seed_id: u32) -> Result<bool, StoreError> {
        self.backend.is_sitemap_done(seed_id).await
    }

    pub async fn set_status(&self, status: CrawlStatus) -> Result<(), StoreError> {
        self.backend.set_status(status).await
    }

    pub async fn get_status(&self) -> Result<CrawlStatus, StoreError> {
        self.backend.get_status().await
    }

    pub async fn is_crawl_canceled(&self) -> Result<bool, StoreError> {
        self.backend.is_crawl_canceled().await
    }

    pub async fn is_crawl_stopped(&self) -> Result<bool, StoreError> {
        self.backend.is_crawl_stopped().await
    }

    pub async fn queue_size(&self) -> Result<u64, StoreError> {
        self.backend.queue_size().await
    }

    pub async fn num_pending(&self) -> Result<u64, StoreError> {
        self.backend.num_pending().await
    }

    pub async fn num_done(&self) -> Result<u64, StoreError> {
        self.backend.num_done().await
    }

    pub async fn num_failed(&self) -> Result<u64, StoreError> {
        self.backend.num_failed().await
    }

    pub async fn get_pending_list(&self) -> Result<Vec<QueueEntry>, StoreError> {
        self.backend.get_pending_list().await
    }

    pub async fn is_seen(&self, key: &str) -> Result<bool, StoreError> {
        self.backend.is_seen(key).await
    }

    /// The dynamic exclusion list grown by `AddExclusion`/`RemoveExclusion`
    /// control messages, layered on top of a seed's static `exclude`
    /// patterns (spec.md §4.1 `extra_excludes`, §4.2 `processMessage`).
    pub async fn exclusions(&self) -> Result<Vec<String>, StoreError> {
        self.backend.exclusions().await
    }

    /// Drains one control message (spec.md §4.2 `processMessage`).
    pub async fn process_message(&self, message: ControlMessage) -> Result<(), StoreError> {
        match message {
            ControlMessage::AddExclusion(pattern) => self.backend.add_exclusion(pattern).await,
            ControlMessage::RemoveExclusion(pattern) => {
                self.backend.remove_exclusion(&pattern).await
            }
            ControlMessage::Cancel => self.backend.set_status(CrawlStatus::Canceled).await,
            ControlMessage::Pause => Ok(()),
            ControlMessage::Resume => Ok(()),
            ControlMessage::StopGracefully => self.backend.set_status(CrawlStatus::Done).await,
        }
    }

    /// Tails the control file for newly-appended, complete lines and
    /// applies each as a `ControlMessage` (spec.md §4.6 step 1). A
    /// no-op unless `with_control_file` was configured. A trailing
    /// partial line (the operator's write hasn't flushed a newline yet)
    /// is left for the next drain instead of being dropped.
    pub async fn drain_control_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.control_file else {
            return Ok(());
        };
        let mut cursor = self.control_cursor.lock().await;
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        if (data.len() as u64) < *cursor {
            // File was truncated or rotated out from under us; restart.
            *cursor = 0;
        }
        let unread = &data[*cursor as usize..];
        let text = String::from_utf8_lossy(unread);
        let mut consumed = 0usize;
        for line in text.split_inclusive('\n') {
            if !line.ends_with('\n') {
                break;
            }
            consumed += line.len();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ControlMessage>(trimmed) {
                Ok(message) => self.process_message(message).await?,
                Err(e) => {
                    log::warn!(target: "control", "ignoring malformed control message `{trimmed}`: {e}");
                }
            }
        }
        *cursor += consumed as u64;
        Ok(())
    }

    pub async fn serialize(&self) -> Result<StateBlob, StoreError> {
        self.backend.serialize().await
    }

    pub async fn load(&self, blob: StateBlob) -> Result<(), StoreError> {
        self.backend.load(blob).await
    }

    /// Writes a rotating checkpoint file if checkpointing was enabled
    /// (spec.md §6 "collections/<name>.yaml", `saveStateHistory`).
    pub async fn checkpoint(&self) -> Result<Option<PathBuf>, StoreError> {
        let Some(dir) = &self.checkpoint_dir else {
            return Ok(None);
        };
        let blob = self.serialize().await?;
        let path = checkpoint::write_checkpoint(dir, &self.crawl_id, &blob, self.save_state_history)?;
        Ok(Some(path))
    }

    /// Restores from the most recent checkpoint in `dir`, if any
    /// (spec.md §4.2 `load`, used on `--resume`).
    pub async fn resume_from(&self, dir: &Path, crawl_id: &str) -> Result<bool, StoreError> {
        let mut candidates: Vec<_> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().ends_with(&format!("{crawl_id}.yaml")))
                .collect(),
            Err(_) => return Ok(false),
        };
        candidates.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
        let Some(newest) = candidates.pop() else {
            return Ok(false);
        };
        let blob = checkpoint::load_checkpoint(&newest.path())?;
        self.load(blob).await?;
        Ok(true)
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
    async fn add_then_dequeue_roundtrip() {
        let store = CrawlStore::in_memory("test");
        store.add_to_queue(entry("http://s/a")).await.unwrap();
        let deadline = time::OffsetDateTime::UNIX_EPOCH;
        let popped = store.next_from_queue("w1", deadline).await.unwrap().unwrap();
        assert_eq!(popped.url.dedup_key(), "http://s/a");
        store.mark_finished(&popped, "w1").await.unwrap();
        assert_eq!(store.num_done().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn process_message_cancel_sets_status() {
        let store = CrawlStore::in_memory("test");
        store.process_message(ControlMessage::Cancel).await.unwrap();
        assert!(store.is_crawl_canceled().await.unwrap());
    }

    #[tokio::test]
    async fn process_message_grows_exclusion_list() {
        let store = CrawlStore::in_memory("test");
        store
            .process_message(ControlMessage::AddExclusion("/admin/".to_string()))
            .await
            .unwrap();
        assert_eq!(store.exclusions().await.unwrap(), vec!["/admin/".to_string()]);
        store
            .process_message(ControlMessage::RemoveExclusion("/admin/".to_string()))
            .await
            .unwrap();
        assert!(store.exclusions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_round_trips_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            CrawlStore::in_memory("test").with_checkpointing(dir.path().to_path_buf(), 5);
        store.add_to_queue(entry("http://s/a")).await.unwrap();
        let path = store.checkpoint().await.unwrap().unwrap();
        assert!(path.exists());

        let restored = CrawlStore::in_memory("test");
        let did_resume = restored.resume_from(dir.path(), "test").await.unwrap();
        assert!(did_resume);
        assert_eq!(restored.queue_size().await.unwrap(), 1);
    }
}
