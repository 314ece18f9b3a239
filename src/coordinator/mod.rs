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

//! CrawlCoordinator (spec.md §4.8): loads or initializes state, seeds
//! the queue, fans out sitemaps, launches the shared browser and
//! `WorkerPool`, then drives the checkpoint/limit-check loop until the
//! crawl finishes, is canceled, or is interrupted.

mod error;

pub use error::CoordinatorError;

use crate::client::HttpClient;
use crate::config::{Config, SaveState, SitemapSource};
use crate::driver::WindowFactory;
use crate::io::CollectionLayout;
use crate::runtime::Shutdown;
use crate::scope::ScopeEngine;
use crate::seed::{Seed, SeedTable};
use crate::sitemap;
use crate::store::{ControlMessage, CrawlStatus, CrawlStore, QueueEntry};
use crate::url::NormalizedUrl;
use crate::worker::{WorkerError, WorkerPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// How the crawl ended, carried back to the `main.rs` boundary so it
/// can pick an exit code (spec.md §6 "Exit codes") without this crate
/// knowing about `std::process::ExitCode` at all.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CrawlOutcome {
    /// Ran to completion, or was canceled by a hard stop signal — both
    /// exit `0` per spec.md §6.
    Normal,
    /// A graceful or hard shutdown signal was observed; `browser_crashed`
    /// distinguishes exit `10` from exit `11`.
    Interrupted { browser_crashed: bool },
    /// The final checkpoint write failed while a shutdown was already
    /// in progress (exit `13`).
    InterruptedWhileSerializing,
}

pub struct CrawlCoordinator {
    config: Config,
    crawl_id: String,
    layout: CollectionLayout,
    recover: bool,
}

impl CrawlCoordinator {
    pub fn new(mut config: Config, crawl_id: String, layout: CollectionLayout, recover: bool) -> Self {
        // spec.md §6 "maxPageLimit: hard cap on pageLimit itself may
        // never exceed".
        if let (Some(page_limit), Some(max_page_limit)) =
            (config.limits.page_limit, config.limits.max_page_limit)
        {
            if page_limit > max_page_limit {
                config.limits.page_limit = Some(max_page_limit);
            }
        }
        Self {
            config,
            crawl_id,
            layout,
            recover,
        }
    }

    pub async fn run(
        self,
        window_factory: Arc<dyn WindowFactory>,
        shutdown: Shutdown,
    ) -> Result<CrawlOutcome, CoordinatorError> {
        self.layout.ensure_dirs()?;

        let store = Arc::new(
            CrawlStore::in_memory(self.crawl_id.clone())
                .with_checkpointing(
                    self.layout.checkpoints_dir(),
                    self.config.persistence.save_state_history,
                )
                .with_page_limit(self.config.limits.page_limit)
                .with_control_file(self.layout.control_file_path()),
        );

        // Step 1: resume persisted state, if `--recover` asked for it.
        // Without it, a fresh run must not silently pick up a stale
        // checkpoint left behind by a prior crawl with the same id.
        if self.recover {
            if store
                .resume_from(&self.layout.checkpoints_dir(), &self.crawl_id)
                .await?
            {
                log::info!(target: "crawlStatus", "resumed checkpoint for crawl `{}`", self.crawl_id);
            }
        }

        // Step 2: poll while status is `debug` (operator inspection).
        while store.get_status().await? == CrawlStatus::Debug {
            if shutdown.is_hard() {
                return Ok(CrawlOutcome::Interrupted {
                    browser_crashed: false,
                });
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        // Step 3: a crawl already `done` either parks or exits.
        if store.get_status().await? == CrawlStatus::Done {
            if self.config.failure_policy.wait_on_done {
                log::info!(target: "crawlStatus", "crawl already done, parking on waitOnDone");
                let notify = Arc::new(Notify::new());
                let waker = notify.clone();
                let receiver = shutdown.receiver();
                tokio::spawn(async move {
                    receiver.hard_cancelled().await;
                    waker.notify_one();
                });
                notify.notified().await;
                return Ok(CrawlOutcome::Interrupted {
                    browser_crashed: false,
                });
            }
            return Ok(CrawlOutcome::Normal);
        }

        // Step 4: seed the queue and fan out sitemaps.
        let seeds = Arc::new(SeedTable::from_config(self.config.seeds.clone()));
        // spec.md §3 "an (origSeedId, newUrl) record is persisted so
        // restart reconstructs the seed table identically": replay the
        // persisted extra-seeds list, in order, before assigning any
        // new ones, so ids line up with the pre-restart run.
        for (orig_seed_id, redirected_url) in store.get_extra_seeds().await? {
            seeds.restore_extra(orig_seed_id, redirected_url);
        }

        let client = HttpClient::new(self.config.workers.user_agent.as_deref())?;
        let mut sitemap_handles = Vec::new();
        for seed in seeds.all() {
            if !seed.is_original_seed() {
                continue;
            }
            let normalized =
                NormalizedUrl::normalize(&seed.config.url, None, seed.rules.allow_hash)?;
            store.add_to_queue(QueueEntry::seed(seed.id, normalized)).await?;

            if store.is_sitemap_done(seed.id).await? {
                continue;
            }
            if let Some(sitemap_url) = resolve_sitemap_url(&seed) {
                let handle = sitemap::ingest(
                    client.clone(),
                    store.clone(),
                    ScopeEngine::new(),
                    Arc::new(seed.clone()),
                    sitemap_url,
                    self.config.sitemap.clone(),
                    Duration::from_secs(30),
                )
                .await;
                sitemap_handles.push(handle);
            }
        }
        log::info!(
            target: "crawlStatus",
            "seeded {} original seed(s), {} sitemap(s) fanned out",
            seeds.len(),
            sitemap_handles.len()
        );

        // Step 5: launch the shared browser and the worker pool.
        let (page_finished_tx, mut page_finished_rx) = mpsc::channel(1024);
        // `HOSTNAME` carries the stateful-set ordinal `worker_offset()`
        // needs (spec.md §6); `CRAWL_ID` only seeds the crawl id and is
        // set on every run, so it can't be the primary source here.
        let hostname = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("CRAWL_ID"))
            .unwrap_or_default();
        let pool = WorkerPool::spawn(
            &hostname,
            &self.config.workers,
            store.clone(),
            seeds.clone(),
            window_factory,
            shutdown.receiver(),
            self.config.timing.clone(),
            self.config.behaviors.clone(),
            self.config.failure_policy.clone(),
            page_finished_tx,
        );
        let pool_join = tokio::spawn(pool.join());

        // Steps 6-8: checkpoint + limit checks on every page finish,
        // until the pool drains or a shutdown signal lands.
        let start = time::OffsetDateTime::now_utc();
        let save_interval = time::Duration::seconds(
            self.config.persistence.save_state_interval_secs as i64,
        );
        let mut last_checkpoint = start;
        let hard_cancelled = shutdown.receiver();

        let outcome = loop {
            tokio::select! {
                event = page_finished_rx.recv() => {
                    match event {
                        Some(_event) => {
                            if self.config.persistence.save_state == SaveState::Always
                                && time::OffsetDateTime::now_utc() - last_checkpoint >= save_interval
                            {
                                store.checkpoint().await?;
                                last_checkpoint = time::OffsetDateTime::now_utc();
                            }
                            if let Some(outcome) = self.check_limits(&store, start).await? {
                                break outcome;
                            }
                        }
                        None => break CrawlOutcome::Normal,
                    }
                }
                _ = hard_cancelled.hard_cancelled() => {
                    break CrawlOutcome::Interrupted { browser_crashed: false };
                }
            }
        };

        let pool_result = pool_join
            .await
            .map_err(|e| CoordinatorError::Join(e.to_string()))?;

        let outcome = match outcome {
            CrawlOutcome::Interrupted { .. } => CrawlOutcome::Interrupted {
                browser_crashed: matches!(&pool_result, Err(WorkerError::CrashLoop(_, _))),
            },
            other => other,
        };

        // Step 8: every shutdown path flushes a final checkpoint.
        let final_checkpoint = store.checkpoint().await;
        let outcome = if matches!(outcome, CrawlOutcome::Interrupted { .. }) && final_checkpoint.is_err()
        {
            CrawlOutcome::InterruptedWhileSerializing
        } else {
            outcome
        };

        if !matches!(
            outcome,
            CrawlOutcome::Interrupted { .. } | CrawlOutcome::InterruptedWhileSerializing
        ) {
            pool_result?;
        }

        Ok(outcome)
    }

    /// spec.md §4.8 step 7: `sizeLimit`/`timeLimit`/`diskUtilization`
    /// stop the crawl gracefully; `failOnFailedLimit` escalates to
    /// fatal.
    async fn check_limits(
        &self,
        store: &CrawlStore,
        start: time::OffsetDateTime,
    ) -> Result<Option<CrawlOutcome>, CoordinatorError> {
        let limits = &self.config.limits;

        if let Some(size_limit) = limits.size_limit {
            if self.layout.archive_size_bytes() >= size_limit {
                log::info!(target: "crawlStatus", "sizeLimit reached, stopping gracefully");
                store.process_message(ControlMessage::StopGracefully).await?;
                return Ok(Some(CrawlOutcome::Normal));
            }
        }

        if let Some(time_limit) = limits.time_limit_secs {
            let elapsed = (time::OffsetDateTime::now_utc() - start).whole_seconds().max(0) as u64;
            if elapsed >= time_limit {
                log::info!(target: "crawlStatus", "timeLimit reached, stopping gracefully");
                store.process_message(ControlMessage::StopGracefully).await?;
                return Ok(Some(CrawlOutcome::Normal));
            }
        }

        if let Some(disk_limit_pct) = limits.disk_utilization_pct {
            if let Some(used_pct) = disk_utilization_pct(self.layout.root()) {
                if used_pct >= disk_limit_pct {
                    log::error!(target: "crawlStatus", "diskUtilization reached, escalating to fatal");
                    return Err(CoordinatorError::DiskUtilizationExceeded(used_pct, disk_limit_pct));
                }
            }
        }

        if let Some(fail_limit) = limits.fail_on_failed_limit {
            let failed = store.num_failed().await?;
            if failed >= fail_limit {
                log::error!(target: "crawlStatus", "failOnFailedLimit reached, escalating to fatal");
                return Err(CoordinatorError::FailLimitExceeded(failed));
            }
        }

        Ok(None)
    }
}

fn resolve_sitemap_url(seed: &Seed) -> Option<String> {
    match seed.config.sitemap.as_ref()? {
        SitemapSource::Url(url) => Some(url.clone()),
        SitemapSource::Detect => {
            let base = url::Url::parse(&seed.config.url).ok()?;
            base.join("/sitemap.xml").ok().map(|u| u.to_string())
        }
    }
}

fn disk_utilization_pct(root: &std::path::Path) -> Option<u8> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let mount = disks
        .iter()
        .filter(|disk| root.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())?;
    let total = mount.total_space();
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(mount.available_space());
    Some(((used * 100 / total).min(100)) as u8)
}
