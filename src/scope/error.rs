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

use crate::url::UrlNormalizeError;
use thiserror::Error;

/// Why a candidate URL was rejected by `ScopeEngine::is_included`
/// (spec.md §4.1). Not a hard error: rejection is an expected, common
/// outcome on the link-discovery hot path.
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("url does not normalize: {0}")]
    NotNormalizable(#[from] UrlNormalizeError),
    #[error("out of scope and no extra hops remain")]
    OutOfScope,
    #[error("excluded by seed or runtime exclusion rule")]
    Excluded,
    #[error("invalid regex in scope rules: {0}")]
    BadRegex(#[from] regex::Error),
}
