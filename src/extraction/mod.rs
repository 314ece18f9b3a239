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

//! LinkExtractor (spec.md §4.5): evaluates selector triples in every
//! eligible frame of a loaded page and funnels candidate URLs through
//! `ScopeEngine` + `CrawlStore`.

use crate::config::LinkSelector;
use crate::driver::{DriverError, FrameHandle, PageDriver};
use crate::scope::{ScopeEngine, SerializableRegex};
use crate::seed::Seed;
use crate::store::{AddOutcome, CrawlStore, QueueEntry, StoreError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of extracting links from one page: how many candidate URLs
/// were queued, and whether the page limit was observed mid-extraction
/// (so the worker can stop looking at further pages).
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub queued: usize,
    pub limit_hit: bool,
}

/// Stateless, like `ScopeEngine` — every mutable piece (the driver, the
/// store, the current entry) is threaded in as an argument.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkExtractor;

impl LinkExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Runs extraction for the page currently loaded by `driver`. The
    /// default selector set, when `seed` supplies none, is
    /// `a[href] -> @href` (spec.md §4.5 "Contract").
    pub async fn extract(
        &self,
        driver: &mut dyn PageDriver,
        scope: &ScopeEngine,
        seed: &Seed,
        store: &CrawlStore,
        entry: &QueueEntry,
        per_frame_timeout: Duration,
        extra_excludes: &[SerializableRegex],
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let selectors = if seed.config.select_links.is_empty() {
            vec![LinkSelector::default_anchor_href()]
        } else {
            seed.config.select_links.clone()
        };

        let frames = driver.filter_frames().await?;
        let mut outcome = ExtractionOutcome::default();

        for frame in &frames {
            if outcome.limit_hit {
                break;
            }
            let raw_urls = match tokio::time::timeout(
                per_frame_timeout,
                self.extract_from_frame(driver, frame, &selectors),
            )
            .await
            {
                Ok(Ok(urls)) => urls,
                // Timing out one frame does not affect others
                // (spec.md §4.5 "Contract").
                Ok(Err(_)) | Err(_) => continue,
            };

            let Some(base) = frame_base(frame, seed) else {
                continue;
            };

            for raw_url in raw_urls {
                let prospective_extra_hops = entry.depth.extra_hops + 1;
                let child_depth = entry.depth.depth + 1;
                let decision = scope.is_included(
                    seed,
                    &raw_url,
                    &base,
                    child_depth,
                    prospective_extra_hops,
                    false,
                    extra_excludes,
                );
                let Ok(decision) = decision else {
                    continue;
                };
                let depth = entry.depth.child(decision.is_out_of_scope);
                let child = QueueEntry::child(seed.id, decision.url, depth);
                match store.add_to_queue(child).await? {
                    AddOutcome::Added => outcome.queued += 1,
                    AddOutcome::LimitHit => {
                        outcome.limit_hit = true;
                        break;
                    }
                    AddOutcome::DupeUrl => {}
                }
            }
        }

        Ok(outcome)
    }

    async fn extract_from_frame(
        &self,
        driver: &mut dyn PageDriver,
        frame: &FrameHandle,
        selectors: &[LinkSelector],
    ) -> Result<Vec<String>, DriverError> {
        let mut urls = Vec::new();
        for selector in selectors {
            let script = build_extraction_script(selector);
            let matched = driver.eval_in_frame(frame, &script).await?;
            urls.extend(matched);
        }
        Ok(urls)
    }
}

/// Builds the script evaluated per selector triple: a CSS query plus
/// either an attribute read (`@href`) or a DOM property read (spec.md
/// §4.5 "a list of (cssSelector, attribute-or-property, isAttribute)
/// triples"). Values are JSON-escaped so a selector/attribute name
/// containing a quote can't break out of the template.
fn build_extraction_script(selector: &LinkSelector) -> String {
    let css = serde_json::to_string(&selector.css_selector).unwrap_or_else(|_| "\"\"".into());
    let accessor = if selector.is_attribute {
        let attr = serde_json::to_string(&selector.attribute_or_property).unwrap_or_default();
        format!("el => el.getAttribute({attr})")
    } else {
        format!("el => el[{}]", serde_json::to_string(&selector.attribute_or_property).unwrap_or_default())
    };
    format!(
        "Array.from(document.querySelectorAll({css})).map({accessor}).filter(v => typeof v === 'string' && v.length > 0)"
    )
}

fn frame_base(frame: &FrameHandle, seed: &Seed) -> Option<url::Url> {
    url::Url::parse(&frame.url)
        .ok()
        .or_else(|| url::Url::parse(&seed.config.url).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selector_script_reads_href_attribute() {
        let script = build_extraction_script(&LinkSelector::default_anchor_href());
        assert!(script.contains("a[href]"));
        assert!(script.contains("getAttribute"));
    }

    #[test]
    fn property_selector_reads_dom_property() {
        let selector = LinkSelector {
            css_selector: "video".to_string(),
            attribute_or_property: "src".to_string(),
            is_attribute: false,
        };
        let script = build_extraction_script(&selector);
        assert!(script.contains("el[\"src\"]") || script.contains("el[\"src\" ]"));
    }
}
