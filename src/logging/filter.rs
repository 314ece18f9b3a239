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

use log::Record;
use log4rs::filter::{Filter, Response};

/// `logContext`/`logExcludeContext` (spec.md §6 "Misc"): gates records by
/// their `target` (the `context` field of the NDJSON schema). An empty
/// `include` list means "no restriction"; `exclude` always wins over
/// `include` when both name the same context.
#[derive(Debug, Clone)]
pub struct ContextFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl ContextFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }
}

impl Filter for ContextFilter {
    fn filter(&self, record: &Record) -> Response {
        let target = record.target();
        if self.exclude.iter().any(|c| c == target) {
            return Response::Reject;
        }
        if !self.include.is_empty() && !self.include.iter().any(|c| c == target) {
            return Response::Reject;
        }
        Response::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    fn record_with_target(target: &str) -> String {
        target.to_string()
    }

    #[test]
    fn empty_include_allows_everything_not_excluded() {
        let filter = ContextFilter::new(vec![], vec!["worker".to_string()]);
        let target = record_with_target("state");
        let record = Record::builder()
            .level(Level::Info)
            .target(&target)
            .build();
        assert!(matches!(filter.filter(&record), Response::Neutral));
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter = ContextFilter::new(
            vec!["worker".to_string()],
            vec!["worker".to_string()],
        );
        let target = record_with_target("worker");
        let record = Record::builder()
            .level(Level::Info)
            .target(&target)
            .build();
        assert!(matches!(filter.filter(&record), Response::Reject));
    }

    #[test]
    fn include_rejects_unlisted_context() {
        let filter = ContextFilter::new(vec!["worker".to_string()], vec![]);
        let target = record_with_target("sitemap");
        let record = Record::builder()
            .level(Level::Info)
            .target(&target)
            .build();
        assert!(matches!(filter.filter(&record), Response::Reject));
    }
}
