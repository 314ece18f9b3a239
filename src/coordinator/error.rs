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

use crate::client::ClientError;
use crate::io::FsError;
use crate::store::StoreError;
use crate::url::UrlNormalizeError;
use crate::worker::WorkerError;
use thiserror::Error;

/// Composes every component error a `CrawlCoordinator` can surface
/// (spec.md §7, "component errors compose into a top-level error via
/// `#[from]`"). Maps to an exit code at the `main.rs` boundary, never
/// inside this crate.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    UrlNormalize(#[from] UrlNormalizeError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("worker pool task panicked: {0}")]
    Join(String),
    #[error("failOnFailedLimit reached: {0} failed page(s)")]
    FailLimitExceeded(u64),
    #[error("diskUtilization at {0}% reached the configured limit of {1}%")]
    DiskUtilizationExceeded(u8, u8),
}
