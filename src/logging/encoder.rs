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
use log4rs::encode::{self, Encode};
use serde_json::{Map, Value};

/// Emits one JSON object per line matching spec.md §6's log record
/// schema exactly: `{timestamp, logLevel, context, message, details}`.
/// `context` is the log `target` (the closed set spec.md names:
/// `worker`, `state`, `links`, `behavior`, `sitemap`, `pageStatus`,
/// `crawlStatus`, ...); `details` collects any structured key-value
/// pairs attached via `log::kv` (e.g. `log::info!(details: url = %u; "...")`).
#[derive(Debug)]
pub struct NdjsonEncoder;

struct DetailsVisitor(Map<String, Value>);

impl<'kvs> log::kv::VisitSource<'kvs> for DetailsVisitor {
    fn visit_pair(
        &mut self,
        key: log::kv::Key<'kvs>,
        value: log::kv::Value<'kvs>,
    ) -> Result<(), log::kv::Error> {
        self.0.insert(key.to_string(), Value::String(value.to_string()));
        Ok(())
    }
}

impl Encode for NdjsonEncoder {
    fn encode(&self, w: &mut dyn encode::Write, record: &Record) -> anyhow::Result<()> {
        let mut visitor = DetailsVisitor(Map::new());
        let _ = record.key_values().visit(&mut visitor);

        let timestamp = time::OffsetDateTime::now_utc();
        let timestamp = timestamp
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());

        let line = serde_json::json!({
            "timestamp": timestamp,
            "logLevel": record.level().as_str().to_lowercase(),
            "context": record.target(),
            "message": record.args().to_string(),
            "details": Value::Object(visitor.0),
        });

        writeln!(w, "{line}")?;
        Ok(())
    }
}
