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

use crate::driver::DriverError;
use crate::extraction::ExtractionError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors a `PageWorker` can surface. Most page-level failures (load
/// timeout, chrome-error, crash) are handled inline as `markFailed` and
/// never reach this type; only conditions spec.md §7 calls "Fatal"
/// propagate out of `PageWorker::run`.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("worker {0} escalated to fatal after {1} consecutive window crashes")]
    CrashLoop(u32, u32),
    #[error("seed-level page for seed {0} failed and failOnFailedSeed is set")]
    SeedFailure(u32),
    #[error("seed {0} not found in the seed table")]
    UnknownSeed(u32),
}
