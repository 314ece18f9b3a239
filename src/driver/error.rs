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

/// Errors a `PageDriver` implementation can surface (spec.md §4.4).
/// These propagate up to `PageWorker`, which maps most of them to a
/// failed page rather than a fatal crawl error (spec.md §7).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("window creation failed: {0}")]
    WindowCreation(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script evaluation failed: {0}")]
    ScriptEval(String),
    #[error("the window reported a crash")]
    WindowCrashed,
    #[error("operation timed out")]
    Timeout,
}
