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

use thiserror::Error;

/// Errors surfaced by a `CrawlStoreBackend` implementation. Deliberately
/// narrow: callers treat every variant as "the store is temporarily
/// unreachable" except `Corrupt`, which means the checkpoint itself is
/// unusable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("checkpoint serialization failed: {0}")]
    Serde(#[from] serde_yaml::Error),
    #[error("checkpoint io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint is corrupt: {0}")]
    Corrupt(String),
}
