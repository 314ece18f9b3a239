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

use crate::store::QueueEntry;
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display};

/// The ordered page lifecycle (spec.md §3 "PageState"). Ordering is
/// load-bearing: `loadState >= FullPageLoaded` is exactly the "finished
/// successfully" predicate used throughout §4 and §8.
#[derive(
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    IntoPrimitive,
    FromPrimitive,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Display,
    AsRefStr,
    Hash,
)]
#[repr(u8)]
pub enum LoadState {
    None = 0,
    ContentLoaded = 1,
    FullPageLoaded = 2,
    ExtractionDone = 3,
    BehaviorsDone = 4,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl LoadState {
    pub fn is_finished_successfully(&self) -> bool {
        *self >= LoadState::FullPageLoaded
    }
}

/// The transient, in-memory record a worker carries from dequeue to
/// finish; never persisted (spec.md §3: "discarded at page end").
#[derive(Debug, Clone)]
pub struct PageState {
    pub queue_entry: QueueEntry,
    pub load_state: LoadState,
    pub status: Option<u16>,
    pub mime: Option<String>,
    pub is_html_page: bool,
    pub title: Option<String>,
    pub filtered_frame_count: usize,
    pub log_details: Value,
}

impl PageState {
    pub fn new(queue_entry: QueueEntry) -> Self {
        Self {
            queue_entry,
            load_state: LoadState::None,
            status: None,
            mime: None,
            is_html_page: false,
            title: None,
            filtered_frame_count: 0,
            log_details: Value::Object(Default::default()),
        }
    }

    pub fn finished_successfully(&self) -> bool {
        self.load_state.is_finished_successfully()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_state_ordering() {
        assert!(LoadState::None < LoadState::ContentLoaded);
        assert!(LoadState::ContentLoaded < LoadState::FullPageLoaded);
        assert!(LoadState::FullPageLoaded < LoadState::ExtractionDone);
        assert!(LoadState::ExtractionDone < LoadState::BehaviorsDone);
    }

    #[test]
    fn finished_successfully_threshold() {
        assert!(!LoadState::ContentLoaded.is_finished_successfully());
        assert!(LoadState::FullPageLoaded.is_finished_successfully());
        assert!(LoadState::BehaviorsDone.is_finished_successfully());
    }
}
