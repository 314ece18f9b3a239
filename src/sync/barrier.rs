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

use crate::store::CrawlStore;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::select;
use tokio_util::sync::CancellationToken;

/// The result of waiting on a [`WorkerBarrier`]: either the queue
/// changed underneath the worker and it should keep going, or every
/// worker agreed to stop.
#[derive(Debug)]
pub enum ContinueOrStop<T, C = T> {
    Continue(T),
    Cancelled(C),
}

/// Lets `N` idle `PageWorker`s agree to stop only once the queue has
/// been empty and unchanged for all of them at once, while letting any
/// of them bail out early the moment the queue changes again (spec.md
/// §4.7 "WorkerPool", "a worker exits its idle wait as soon as the
/// queue changes").
pub struct WorkerBarrier {
    number_of_workers: NonZeroUsize,
    cancel_requester_count_plus_one: AtomicUsize,
    cancellation_token: CancellationToken,
}

impl WorkerBarrier {
    pub fn new(number_of_workers: NonZeroUsize, cancellation_token: CancellationToken) -> Self {
        Self {
            number_of_workers,
            // Starts one greater than zero so `fetch_add` reaching
            // `number_of_workers` is the signal that everyone is
            // waiting, not an off-by-one undercount.
            cancel_requester_count_plus_one: AtomicUsize::new(1),
            cancellation_token,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn trigger_cancellation(&self) {
        self.cancellation_token.cancel()
    }

    fn subscription_triggered<T, F>(&self, worker_id: &str, cause_provider: F, target: &str) -> ContinueOrStop<T>
    where
        F: FnOnce() -> T,
    {
        let state = self
            .cancel_requester_count_plus_one
            .fetch_sub(1, Ordering::SeqCst);
        debug_assert_ne!(0, state, "worker {worker_id} hit an illegal barrier state");
        if self.cancellation_token.is_cancelled() {
            log::debug!("worker {worker_id} was cancelled but {target} changed");
            ContinueOrStop::Cancelled(cause_provider())
        } else {
            log::debug!("worker {worker_id} resumes because {target} changed");
            ContinueOrStop::Continue(cause_provider())
        }
    }

    /// Waits until either every worker has called this (in which case
    /// the barrier cancels itself and everyone stops), or `store`'s
    /// queue changes in the meantime (in which case this worker alone
    /// resumes).
    pub async fn wait_for_is_cancelled_with<T, F>(
        &self,
        worker_id: &str,
        store: &CrawlStore,
        cause_provider: F,
    ) -> ContinueOrStop<T>
    where
        F: FnOnce() -> T,
    {
        if self.cancellation_token.is_cancelled() {
            return ContinueOrStop::Cancelled(cause_provider());
        }

        let mut queue_changed = store.subscribe_to_change();
        log::debug!("worker {worker_id} starts waiting for stop or queue change");

        let count = self
            .cancel_requester_count_plus_one
            .fetch_add(1, Ordering::SeqCst);
        debug_assert_ne!(0, count, "worker {worker_id} hit an illegal barrier state");

        if count == self.number_of_workers.get() {
            log::debug!("worker {worker_id} triggers cancellation, all workers idle");
            self.cancellation_token.cancel();
        } else {
            log::debug!(
                "worker {worker_id} waits for cancellation ({count}/{})",
                self.number_of_workers.get()
            );
        }

        select! {
            _ = self.cancellation_token.cancelled() => {
                log::debug!("worker {worker_id} stopping");
                ContinueOrStop::Cancelled(cause_provider())
            }
            _ = queue_changed.changed() => {
                self.subscription_triggered(worker_id, cause_provider, "queue")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CrawlStore;
    use crate::url::NormalizedUrl;
    use std::sync::Arc;

    #[tokio::test]
    async fn last_worker_in_triggers_cancellation() {
        let token = CancellationToken::new();
        let barrier = Arc::new(WorkerBarrier::new(NonZeroUsize::new(2).unwrap(), token));
        let store = Arc::new(CrawlStore::in_memory("test"));

        let b1 = barrier.clone();
        let s1 = store.clone();
        let h1 = tokio::spawn(async move {
            b1.wait_for_is_cancelled_with("w1", &s1, || ()).await
        });

        // give w1 a chance to register before w2 joins
        tokio::task::yield_now().await;

        let result = barrier.wait_for_is_cancelled_with("w2", &store, || ()).await;
        assert!(matches!(result, ContinueOrStop::Cancelled(())));
        let first = h1.await.unwrap();
        assert!(matches!(first, ContinueOrStop::Cancelled(())));
        assert!(barrier.is_cancelled());
    }

    #[tokio::test]
    async fn queue_change_wakes_a_waiting_worker() {
        let token = CancellationToken::new();
        let barrier = Arc::new(WorkerBarrier::new(NonZeroUsize::new(2).unwrap(), token));
        let store = Arc::new(CrawlStore::in_memory("test"));

        let b1 = barrier.clone();
        let s1 = store.clone();
        let h1 = tokio::spawn(async move {
            b1.wait_for_is_cancelled_with("w1", &s1, || ()).await
        });

        tokio::task::yield_now().await;
        store.add_to_queue(seed_entry("http://s/a")).await.unwrap();

        let result = h1.await.unwrap();
        assert!(matches!(result, ContinueOrStop::Continue(())));
        assert!(!barrier.is_cancelled());
    }

    fn seed_entry(url: &str) -> crate::store::QueueEntry {
        crate::store::QueueEntry::seed(0, NormalizedUrl::normalize(url, None, false).unwrap())
    }
}
