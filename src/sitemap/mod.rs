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

//! SitemapIngester (spec.md §4.3): streams URLs out of a seed's
//! sitemap (and nested sitemaps) and funnels in-scope ones into
//! CrawlStore, without blocking the coordinator on a large sitemap.

use crate::client::HttpClient;
use crate::config::SitemapDates;
use crate::scope::ScopeEngine;
use crate::seed::Seed;
use crate::store::CrawlStore;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use sitemap::structs::{LastMod, Location};
use std::io::Cursor;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Resolves after either (a) the sitemap (and any nested sitemaps)
/// finished, or (b) `EARLY_RESOLVE_COUNT` URLs have been emitted,
/// whichever comes first (spec.md §4.3 "Contract"). The rest continues
/// draining in the background task the caller is handed.
const EARLY_RESOLVE_COUNT: usize = 100;
const MAX_FETCH_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// The outcome returned to the coordinator after the initial fetch
/// window: how many URLs have been queued so far, and a background
/// handle for the remainder still draining.
pub struct SitemapIngestHandle {
    pub queued_so_far: usize,
    pub remainder: tokio::task::JoinHandle<()>,
}

/// Drives the sitemap at `sitemap_url` for `seed`, enqueueing in-scope
/// URLs into `store`. `initial_timeout` bounds only the early-resolve
/// window; the background task keeps going past it.
pub async fn ingest(
    client: HttpClient,
    store: std::sync::Arc<CrawlStore>,
    scope: ScopeEngine,
    seed: std::sync::Arc<Seed>,
    sitemap_url: String,
    dates: SitemapDates,
    initial_timeout: Duration,
) -> SitemapIngestHandle {
    let (tx, mut rx) = mpsc::channel::<usize>(1);

    let handle = tokio::spawn(drain(client, store, scope, seed, sitemap_url, dates, tx));

    let queued_so_far = match timeout(initial_timeout, rx.recv()).await {
        Ok(Some(count)) => count,
        Ok(None) => 0,
        Err(_) => 0,
    };

    SitemapIngestHandle {
        queued_so_far,
        remainder: handle,
    }
}

async fn drain(
    client: HttpClient,
    store: std::sync::Arc<CrawlStore>,
    scope: ScopeEngine,
    seed: std::sync::Arc<Seed>,
    sitemap_url: String,
    dates: SitemapDates,
    progress: mpsc::Sender<usize>,
) {
    let mut pending_sitemaps = vec![sitemap_url];
    let mut queued = 0usize;
    let mut notified_early = false;

    while let Some(url) = pending_sitemaps.pop() {
        let bytes = match fetch_with_retry(&client, &url, seed.config.auth.as_ref()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!(target: "sitemap", "giving up on `{url}`: {e}");
                continue;
            }
        };

        let reader = SiteMapReader::new(Cursor::new(bytes.as_ref()));
        for entity in reader {
            match entity {
                SiteMapEntity::Url(url_entry) => {
                    let loc = match &url_entry.loc {
                        Location::Url(u) => u,
                        _ => continue,
                    };
                    let lastmod = match &url_entry.lastmod {
                        LastMod::DateTime(dt) => Some(*dt),
                        _ => None,
                    };
                    if !within_date_window(lastmod, &dates) {
                        continue;
                    }
                    if store.is_sitemap_done(seed.id).await.unwrap_or(false) {
                        break;
                    }
                    if let Some(base) = seed_base(&seed) {
                        if let Ok(decision) = scope.is_included(
                            seed.as_ref(),
                            loc.as_str(),
                            &base,
                            0,
                            0,
                            true,
                            &[],
                        ) {
                            let entry = crate::store::QueueEntry::seed(seed.id, decision.url);
                            match store.add_to_queue(entry).await {
                                Ok(crate::store::AddOutcome::Added) => {
                                    queued += 1;
                                    if !notified_early && queued >= EARLY_RESOLVE_COUNT {
                                        notified_early = true;
                                        let _ = progress.send(queued).await;
                                    }
                                }
                                Ok(crate::store::AddOutcome::LimitHit) => break,
                                _ => {}
                            }
                        }
                    }
                }
                SiteMapEntity::SiteMap(nested) => {
                    if let Location::Url(loc) = &nested.loc {
                        pending_sitemaps.push(loc.to_string());
                    }
                }
                SiteMapEntity::Err(e) => {
                    log::warn!(target: "sitemap", "parse error in `{url}`: {e}");
                }
            }
        }
    }

    if !notified_early {
        let _ = progress.send(queued).await;
    }
    let _ = store.mark_sitemap_done(seed.id).await;
}

fn seed_base(seed: &Seed) -> Option<url::Url> {
    url::Url::parse(&seed.config.url).ok()
}

fn within_date_window(lastmod: Option<OffsetDateTime>, dates: &SitemapDates) -> bool {
    let Some(lastmod) = lastmod else {
        return true;
    };
    let format = time::macros::format_description!("[year]-[month]-[day]");
    if let Some(from) = &dates.from_date {
        if let Ok(from) = time::Date::parse(from, &format) {
            if lastmod.date() < from {
                return false;
            }
        }
    }
    if let Some(to) = &dates.to_date {
        if let Ok(to) = time::Date::parse(to, &format) {
            if lastmod.date() > to {
                return false;
            }
        }
    }
    true
}

async fn fetch_with_retry(
    client: &HttpClient,
    url: &str,
    auth: Option<&crate::config::BasicAuth>,
) -> Result<bytes::Bytes, crate::client::ClientError> {
    let mut backoff = INITIAL_BACKOFF;
    let mut last_err = None;
    for attempt in 1..=MAX_FETCH_ATTEMPTS {
        match client.get_bytes(url, auth).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                log::warn!(target: "sitemap", "fetch attempt {attempt}/{MAX_FETCH_ATTEMPTS} for `{url}` failed: {e}");
                last_err = Some(e);
                if attempt < MAX_FETCH_ATTEMPTS {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt was made"))
}
