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

/// What `PageDriver::navigate` observed, in order of decreasing
/// strength (spec.md §4.4 "Records, in order, whichever of: ... Returns
/// the strongest one available."). Replaces the source's three racing
/// promise listeners with one tagged result (spec.md §9 "Coroutine
/// control flow").
#[derive(Debug, Clone)]
pub enum NavOutcome {
    /// Navigation was aborted with `net::ERR_ABORTED` and a non-HTML
    /// content-type — treated as a successful non-HTML asset fetch.
    DownloadDetected { mime: String },
    /// DOM content loaded but the full-load deadline elapsed; proceed
    /// to link extraction, skip behaviors.
    SlowPage { status: u16, mime: Option<String> },
    /// No response was ever observed.
    LoadFailed,
    /// The window URL became `chrome-error://...` after navigation.
    ChromeError,
    /// A response arrived with `status >= 400` and the seed's failure
    /// policy treats that as fatal for this page.
    HttpError { status: u16 },
    Ok { status: u16, mime: Option<String> },
}

impl NavOutcome {
    pub fn is_html_page(&self) -> bool {
        match self {
            NavOutcome::Ok { mime, .. } | NavOutcome::SlowPage { mime, .. } => mime
                .as_deref()
                .map(|m| m.starts_with("text/html"))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            NavOutcome::Ok { status, .. }
            | NavOutcome::SlowPage { status, .. }
            | NavOutcome::HttpError { status } => Some(*status),
            _ => None,
        }
    }

    /// Whether this outcome still permits behaviors + link extraction.
    pub fn proceeds_to_extraction(&self) -> bool {
        matches!(self, NavOutcome::Ok { .. } | NavOutcome::SlowPage { .. })
    }
}
