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

//! WorkerPool (spec.md §4.7): spawns N `PageWorker`s, handles
//! pool-wide shutdown and crash recovery, closes the shared browser
//! once every worker has exited.

use crate::config::{Behaviors, FailurePolicy, Timing, WorkerConfig};
use crate::driver::WindowFactory;
use crate::runtime::ShutdownReceiver;
use crate::seed::SeedTable;
use crate::store::CrawlStore;
use crate::sync::WorkerBarrier;
use crate::worker::{PageFinishedEvent, PageWorker, WorkerError};
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::LazyLock;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

static TRAILING_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)$").expect("valid regex"));

/// Derives this host's worker-id offset from its hostname's ordinal in
/// a stateful replica set (spec.md §4.7 "IDs `[offset, offset+N)` where
/// `offset` is derived from the host's ordinal..."). A hostname with no
/// trailing `-N` (a non-replicated deployment) offsets at zero.
pub fn worker_offset(hostname: &str, workers_per_replica: u32) -> u32 {
    TRAILING_ORDINAL
        .captures(hostname)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|ordinal| ordinal * workers_per_replica)
        .unwrap_or(0)
}

pub struct WorkerPool {
    window_factory: Arc<dyn WindowFactory>,
    join_set: JoinSet<Result<u32, WorkerError>>,
}

impl WorkerPool {
    /// Spawns `config.workers` `PageWorker`s with ids
    /// `[offset, offset+workers)` (spec.md §4.7).
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        hostname: &str,
        config: &WorkerConfig,
        store: Arc<CrawlStore>,
        seeds: Arc<SeedTable>,
        window_factory: Arc<dyn WindowFactory>,
        shutdown: ShutdownReceiver,
        timing: Timing,
        behaviors: Behaviors,
        failure_policy: FailurePolicy,
        page_finished_tx: mpsc::Sender<PageFinishedEvent>,
    ) -> Self {
        let offset = worker_offset(hostname, config.workers);
        let worker_count =
            NonZeroUsize::new(config.workers.max(1) as usize).unwrap_or(NonZeroUsize::MIN);
        let barrier = Arc::new(WorkerBarrier::new(worker_count, CancellationToken::new()));

        let mut join_set = JoinSet::new();
        for i in 0..worker_count.get() as u32 {
            let id = offset + i;
            let worker = PageWorker::new(
                id,
                store.clone(),
                seeds.clone(),
                window_factory.clone(),
                shutdown.clone(),
                barrier.clone(),
                timing.clone(),
                behaviors.clone(),
                failure_policy.clone(),
                config.max_reuse,
                page_finished_tx.clone(),
            );
            join_set.spawn(async move { worker.run().await.map(|_| id) });
        }

        Self {
            window_factory,
            join_set,
        }
    }

    /// Waits for all workers to exit, then closes the shared browser
    /// (spec.md §4.7). Returns the first fatal error encountered, if
    /// any, after every worker has been drained.
    pub async fn join(mut self) -> Result<(), WorkerError> {
        let mut first_error = None;
        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok(Ok(id)) => log::info!(target: "worker", "worker-{id} exited cleanly"),
                Ok(Err(e)) => {
                    log::error!(target: "worker", "worker exited with fatal error: {e}");
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    log::error!(target: "worker", "worker task panicked: {join_err}");
                }
            }
        }
        if let Err(e) = self.window_factory.close_browser().await {
            log::warn!(target: "worker", "failed to close shared browser: {e}");
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_zero_without_trailing_ordinal() {
        assert_eq!(worker_offset("crawler", 4), 0);
    }

    #[test]
    fn offset_scales_by_workers_per_replica() {
        assert_eq!(worker_offset("crawler-statefulset-2", 4), 8);
        assert_eq!(worker_offset("crawler-0", 4), 0);
    }
}
