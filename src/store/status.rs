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

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The crawl-wide status (spec.md §4.2 `setStatus`/`getStatus`).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CrawlStatus {
    #[default]
    Running,
    Done,
    Failing,
    Failed,
    Canceled,
    Interrupted,
    Debug,
}

/// Per-URL status (spec.md §3 "Each URL exists in at most one of the
/// following states").
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum UrlStatus {
    Queued,
    InProgress {
        worker: String,
        #[serde(with = "time::serde::rfc3339")]
        deadline: time::OffsetDateTime,
    },
    Done,
    Failed,
    Excluded,
}

/// The result of `addToQueue` (spec.md §4.2).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AddOutcome {
    Added,
    DupeUrl,
    LimitHit,
}
