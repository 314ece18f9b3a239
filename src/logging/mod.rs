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

//! Configures `log4rs` the way the teacher crate does (programmatic
//! `Config::builder()`, no external logger config file), but with an
//! NDJSON encoder matching spec.md §6's log record schema exactly, plus
//! `logging`/`logContext`/`logExcludeContext` filtering on top of the
//! teacher's plain `PatternEncoder` console appender.

mod encoder;
mod filter;

pub use encoder::NdjsonEncoder;
pub use filter::ContextFilter;

use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

/// `logging`/`logContext`/`logExcludeContext` from spec.md §6 "Misc":
/// whether structured logging is on at all, and which `context` values
/// to include or exclude.
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    pub enabled: bool,
    pub level: log::LevelFilter,
    pub include_contexts: Vec<String>,
    pub exclude_contexts: Vec<String>,
}

/// Wires one NDJSON file appender at `log_path` (spec.md §6
/// `logs/crawl-<utc-compact>.log`) and one human-readable console
/// appender, both gated through the same `ContextFilter`.
pub fn configure_logging(log_path: &Path, options: &LoggingOptions) -> Result<(), anyhow::Error> {
    let filter = ContextFilter::new(options.include_contexts.clone(), options.exclude_contexts.clone());

    let file_logger = FileAppender::builder()
        .encoder(Box::new(NdjsonEncoder))
        .build(log_path)?;

    let console_logger = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%dT%H:%M:%SZ)} {l} [{T}] {M} - {m}{n}",
        )))
        .build();

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(filter.clone()))
                .build("file", Box::new(file_logger)),
        )
        .appender(
            Appender::builder()
                .filter(Box::new(filter))
                .build("console", Box::new(console_logger)),
        )
        .build(
            Root::builder()
                .appender("file")
                .appender("console")
                .build(options.level),
        )?;

    log4rs::init_config(config)?;
    Ok(())
}
