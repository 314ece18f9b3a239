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

//! PageWorker (spec.md §4.6): owns one browser window at a time, pulls
//! work from `CrawlStore`, drives it through `PageDriver` and
//! `LinkExtractor`, and reports the outcome.

mod error;
mod pool;

pub use error::WorkerError;
pub use pool::{worker_offset, WorkerPool};

use crate::config::{Behaviors, FailurePolicy, Timing};
use crate::driver::{NavOptions, NavOutcome, PageDriver, WindowFactory};
use crate::extraction::LinkExtractor;
use crate::runtime::ShutdownReceiver;
use crate::scope::ScopeEngine;
use crate::seed::{Seed, SeedId, SeedTable};
use crate::store::{CrawlStore, LoadState, PageState, QueueEntry};
use crate::sync::{ContinueOrStop, WorkerBarrier};
use crate::url::{NormalizedUrl, UrlOrigin};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout as tokio_timeout;

/// What happened to one dequeued page, reported over `page_finished_tx`
/// so the coordinator can checkpoint and check limits without the
/// worker reaching back up to it (spec.md §9 "Dynamic dispatch / hooks",
/// "bounded channels instead of event emitters").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PageOutcomeKind {
    Finished,
    Failed,
    Excluded,
}

#[derive(Debug, Clone, Copy)]
pub struct PageFinishedEvent {
    pub worker_id: u32,
    pub outcome: PageOutcomeKind,
}

/// Up to this many consecutive window crashes before a worker escalates
/// to fatal (spec.md §4.6 "after MAX_REUSE consecutive failures the
/// process escalates to fatal"). The spec reuses `MAX_REUSE` for both
/// the page-reuse budget and the crash-retry budget.
const PAGE_RETRY_SLEEP: Duration = Duration::from_millis(500);

pub struct PageWorker {
    pub id: u32,
    store: Arc<CrawlStore>,
    seeds: Arc<SeedTable>,
    window_factory: Arc<dyn WindowFactory>,
    scope: ScopeEngine,
    extractor: LinkExtractor,
    shutdown: ShutdownReceiver,
    barrier: Arc<WorkerBarrier>,
    timing: Timing,
    behaviors: Behaviors,
    failure_policy: FailurePolicy,
    max_reuse: u32,
    page_finished_tx: mpsc::Sender<PageFinishedEvent>,

    window: Option<Box<dyn PageDriver>>,
    window_origin: Option<UrlOrigin>,
    reuse_count: u32,
    consecutive_crashes: u32,
}

impl PageWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        store: Arc<CrawlStore>,
        seeds: Arc<SeedTable>,
        window_factory: Arc<dyn WindowFactory>,
        shutdown: ShutdownReceiver,
        barrier: Arc<WorkerBarrier>,
        timing: Timing,
        behaviors: Behaviors,
        failure_policy: FailurePolicy,
        max_reuse: u32,
        page_finished_tx: mpsc::Sender<PageFinishedEvent>,
    ) -> Self {
        Self {
            id,
            store,
            seeds,
            window_factory,
            scope: ScopeEngine::new(),
            extractor: LinkExtractor::new(),
            shutdown,
            barrier,
            timing,
            behaviors,
            failure_policy,
            max_reuse: max_reuse.max(1),
            page_finished_tx,
            window: None,
            window_origin: None,
            reuse_count: 0,
            consecutive_crashes: 0,
        }
    }

    fn worker_tag(&self) -> String {
        format!("worker-{}", self.id)
    }

    /// The wall-clock budget for one page (spec.md §4.6 "Per-page
    /// timeout"): `pageLoadTimeout + behaviorTimeout + 2*PAGE_OP_TIMEOUT_SECS + pageExtraDelay`.
    fn page_deadline_budget(&self) -> Duration {
        Duration::from_secs(
            self.timing.page_load_timeout_secs
                + self.timing.behavior_timeout_secs
                + 2 * self.timing.page_op_timeout_secs
                + self.timing.page_extra_delay_secs,
        )
    }

    /// Main loop (spec.md §4.6 "Loop"). Runs until the crawl is no
    /// longer running or a fatal condition is reached.
    pub async fn run(mut self) -> Result<(), WorkerError> {
        let tag = self.worker_tag();
        // spec.md §4.2 `clearOwnPendingLocks`: this worker id may still
        // hold locks from an abrupt prior exit (process restart under
        // the same stateful-set ordinal); hand them back before
        // competing for new work instead of waiting out their deadline.
        self.store.clear_own_pending_locks(&tag).await?;
        loop {
            // spec.md §4.6 step 1: drain operator-posted control
            // messages (AddExclusion/RemoveExclusion/Cancel/Pause/
            // Resume/StopGracefully) before picking up new work.
            if let Err(e) = self.store.drain_control_file().await {
                log::warn!(target: "worker", "{tag} failed to drain control messages: {e}");
            }
            if self.shutdown.is_hard() || self.shutdown.is_graceful() {
                log::info!(target: "worker", "{tag} stopping: shutdown requested");
                break;
            }
            if self.store.is_crawl_stopped().await? {
                log::info!(target: "worker", "{tag} stopping: crawl status is terminal");
                break;
            }

            let deadline = time::OffsetDateTime::now_utc() + self.page_deadline_budget();
            match self.store.next_from_queue(&tag, deadline).await? {
                Some(entry) => {
                    self.process_entry(entry).await?;
                }
                None => {
                    if self.store.num_pending().await? > 0 {
                        tokio::time::sleep(PAGE_RETRY_SLEEP).await;
                        continue;
                    }
                    if self.store.queue_size().await? == 0 {
                        match self
                            .barrier
                            .wait_for_is_cancelled_with(&tag, &self.store, || ())
                            .await
                        {
                            ContinueOrStop::Continue(()) => continue,
                            ContinueOrStop::Cancelled(()) => break,
                        }
                    }
                }
            }
        }

        if let Some(mut window) = self.window.take() {
            let _ = window.close().await;
        }
        Ok(())
    }

    async fn process_entry(&mut self, mut entry: QueueEntry) -> Result<(), WorkerError> {
        let tag = self.worker_tag();
        let Some(mut seed) = self.seeds.get(entry.seed_id) else {
            return Err(WorkerError::UnknownSeed(entry.seed_id));
        };

        let extra_excludes = self.store.exclusions().await?;
        let compiled_excludes: Vec<_> = extra_excludes
            .iter()
            .filter_map(|p| regex::Regex::new(p).ok().map(crate::scope::SerializableRegex))
            .collect();

        // Recheck scope: exclusions may have grown since enqueue time
        // (spec.md §4.6 step 3).
        if seed.rules.is_excluded(entry.url.dedup_key(), &compiled_excludes) {
            self.store.mark_excluded(&entry, &tag).await?;
            self.report(PageOutcomeKind::Excluded).await;
            return Ok(());
        }

        let budget = self.page_deadline_budget();
        let result = tokio_timeout(
            budget,
            self.run_page(&tag, &mut entry, &mut seed, &compiled_excludes),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                self.store.mark_finished(&entry, &tag).await?;
                self.report(PageOutcomeKind::Finished).await;
                Ok(())
            }
            Ok(Err(PageFailure::Fatal(e))) => Err(e),
            Ok(Err(PageFailure::Soft)) => {
                self.store.mark_failed(&entry, &tag).await?;
                self.report(PageOutcomeKind::Failed).await;
                Ok(())
            }
            Err(_elapsed) => {
                log::warn!(target: "worker", "{tag} page {} exceeded its deadline", entry.url);
                self.store.mark_failed(&entry, &tag).await?;
                self.report(PageOutcomeKind::Failed).await;
                Ok(())
            }
        }
    }

    async fn report(&self, outcome: PageOutcomeKind) {
        let _ = self
            .page_finished_tx
            .send(PageFinishedEvent {
                worker_id: self.id,
                outcome,
            })
            .await;
    }

    /// Drives one page end to end (spec.md §4.6 step 4 & 5): window
    /// lifecycle, navigate, anti-bot/net-idle/behaviors, link
    /// extraction. Returns `Ok(())` for a page that reached
    /// `FullPageLoaded` or better; `Err(PageFailure::Soft)` for an
    /// ordinary page failure; `Err(PageFailure::Fatal)` when the
    /// failure policy escalates.
    async fn run_page(
        &mut self,
        tag: &str,
        entry: &mut QueueEntry,
        seed: &mut Seed,
        extra_excludes: &[crate::scope::SerializableRegex],
    ) -> Result<(), PageFailure> {
        let mut state = PageState::new(entry.clone());

        self.ensure_window(&entry.url.origin()).await?;

        let nav_opts = NavOptions {
            wait_until: self.timing.wait_until,
            timeout: Duration::from_secs(self.timing.page_load_timeout_secs),
        };

        if let Some(window) = self.window.as_mut() {
            window.prepare(seed.config.auth.as_ref()).await?;
        }

        let outcome = match self
            .window
            .as_mut()
            .expect("window ensured above")
            .navigate(&entry.url, &nav_opts)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.handle_window_failure(e).await;
                if self.consecutive_crashes >= self.max_reuse {
                    return Err(PageFailure::Fatal(WorkerError::CrashLoop(
                        self.id,
                        self.consecutive_crashes,
                    )));
                }
                return Err(PageFailure::Soft);
            }
        };

        self.consecutive_crashes = 0;
        self.reuse_count += 1;

        if matches!(outcome, NavOutcome::LoadFailed) && entry.depth.depth == 0 && self.failure_policy.fail_on_failed_seed {
            return Err(PageFailure::Fatal(WorkerError::SeedFailure(entry.seed_id)));
        }

        match &outcome {
            NavOutcome::LoadFailed | NavOutcome::ChromeError | NavOutcome::HttpError { .. } => {
                log::warn!(target: "pageStatus", "{tag} failed {}: {outcome:?}", entry.url);
                return Err(PageFailure::Soft);
            }
            NavOutcome::DownloadDetected { mime } => {
                state.mime = Some(mime.clone());
                state.is_html_page = false;
                state.load_state = LoadState::FullPageLoaded;
                log::info!(target: "pageStatus", "{tag} downloaded {} ({mime})", entry.url);
                return Ok(());
            }
            NavOutcome::SlowPage { status, mime } => {
                state.status = Some(*status);
                state.mime = mime.clone();
                state.load_state = LoadState::FullPageLoaded;
            }
            NavOutcome::Ok { status, mime } => {
                state.status = Some(*status);
                state.mime = mime.clone();
                state.load_state = LoadState::FullPageLoaded;

                self.maybe_rewrite_redirected_seed(entry, seed).await?;

                let window = self.window.as_mut().expect("window ensured above");
                let anti_bot_timeout = Duration::from_secs(self.timing.page_op_timeout_secs * 2);
                let _ = window.check_anti_bot(anti_bot_timeout).await;
                let _ = window
                    .await_net_idle(Duration::from_secs(self.timing.net_idle_wait_secs))
                    .await;

                if self.behaviors.enable_behaviors {
                    let post_load_delay = Duration::from_secs(self.timing.post_load_delay_secs);
                    if window.await_custom_page_load(post_load_delay).await.is_ok() {
                        state.load_state = LoadState::BehaviorsDone;
                    }
                }
            }
        }

        state.is_html_page = outcome.is_html_page();

        if state.is_html_page && !self.scope.is_at_max_depth(seed, entry.depth) {
            let window = self.window.as_mut().expect("window ensured above");
            let extraction = self
                .extractor
                .extract(
                    window.as_mut(),
                    &self.scope,
                    seed,
                    &self.store,
                    entry,
                    Duration::from_secs(self.timing.page_op_timeout_secs),
                    extra_excludes,
                )
                .await?;
            log::debug!(
                target: "links",
                "{tag} queued {} link(s) from {}{}",
                extraction.queued,
                entry.url,
                if extraction.limit_hit { " (page limit hit)" } else { "" }
            );
            state.load_state = state.load_state.max(LoadState::ExtractionDone);
        }

        debug_assert!(state.finished_successfully(), "every non-early-return path sets load_state >= FullPageLoaded");
        Ok(())
    }

    /// spec.md §4.4 "Redirect handling": if this is a seed-level page
    /// (`depth=0`) and the window's final URL differs from the one
    /// requested, materialize an extra seed from the original seed's
    /// scope pointing at the landed URL, and rewrite `entry`/`seed` to
    /// match before link extraction runs.
    async fn maybe_rewrite_redirected_seed(
        &mut self,
        entry: &mut QueueEntry,
        seed: &mut Seed,
    ) -> Result<(), WorkerError> {
        if entry.depth.depth != 0 {
            return Ok(());
        }
        let Some(final_url) = self.window.as_ref().and_then(|w| w.current_url()) else {
            return Ok(());
        };
        let Ok(final_normalized) = NormalizedUrl::normalize(&final_url, None, seed.rules.allow_hash)
        else {
            return Ok(());
        };
        if final_normalized == entry.url {
            return Ok(());
        }

        let new_seed_id: SeedId = self.seeds.push_extra(seed, final_url.clone());
        self.store.add_extra_seed(entry.seed_id, final_url).await?;
        if let Some(new_seed) = self.seeds.get(new_seed_id) {
            entry.seed_id = new_seed_id;
            entry.url = final_normalized;
            *seed = new_seed;
        }
        Ok(())
    }

    /// Opens a fresh window, or reuses the current one, per spec.md
    /// §4.6 "Page reuse": recycle when the reuse budget is spent, the
    /// origin changes, or the window has crashed.
    async fn ensure_window(&mut self, origin: &UrlOrigin) -> Result<(), WorkerError> {
        let must_recycle = match (&self.window, &self.window_origin) {
            (Some(window), Some(current_origin)) => {
                window.crashed()
                    || current_origin != origin
                    || self.reuse_count >= self.max_reuse
            }
            _ => true,
        };

        if must_recycle {
            if let Some(mut window) = self.window.take() {
                let _ = window.close().await;
            }
            let window = self.window_factory.open_window().await?;
            self.window = Some(window);
            self.window_origin = Some(origin.clone());
            self.reuse_count = 0;
        }
        Ok(())
    }

    /// spec.md §7 "Window crash": mark the in-flight page failed, close
    /// and drop the window so the next page opens a fresh one, and
    /// track consecutive failures toward the fatal escalation budget.
    async fn handle_window_failure(&mut self, err: crate::driver::DriverError) {
        log::warn!(target: "worker", "{} window failure: {err}", self.worker_tag());
        if let Some(mut window) = self.window.take() {
            let _ = window.close().await;
        }
        self.window_origin = None;
        self.consecutive_crashes += 1;
    }
}

/// Distinguishes an ordinary page failure (`markFailed`, keep going)
/// from one that escalates the whole worker to fatal (spec.md §7).
enum PageFailure {
    Soft,
    Fatal(WorkerError),
}

impl From<crate::driver::DriverError> for PageFailure {
    fn from(e: crate::driver::DriverError) -> Self {
        log::warn!(target: "worker", "driver error: {e}");
        PageFailure::Soft
    }
}

impl From<crate::extraction::ExtractionError> for PageFailure {
    fn from(e: crate::extraction::ExtractionError) -> Self {
        PageFailure::Fatal(WorkerError::from(e))
    }
}

impl From<crate::store::StoreError> for PageFailure {
    fn from(e: crate::store::StoreError) -> Self {
        PageFailure::Fatal(WorkerError::from(e))
    }
}

impl From<WorkerError> for PageFailure {
    fn from(e: WorkerError) -> Self {
        PageFailure::Fatal(e)
    }
}
