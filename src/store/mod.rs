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

//! CrawlStore (spec.md §4.2): the shared, durable queue + per-URL
//! status that every worker coordinates through. No other component
//! holds durable state (spec.md §9 "Global state").

pub mod backend;
mod checkpoint;
mod control;
mod crawl_store;
mod entry;
mod errors;
mod page_state;
mod status;

pub use checkpoint::StateBlob;
pub use control::ControlMessage;
pub use crawl_store::CrawlStore;
pub use entry::QueueEntry;
pub use errors::StoreError;
pub use page_state::{LoadState, PageState};
pub use status::{AddOutcome, CrawlStatus, UrlStatus};
