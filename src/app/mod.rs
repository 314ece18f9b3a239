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

//! Process entry point: arg parsing, config/seed loading, logging
//! setup, then handing off to `CrawlCoordinator`. Mirrors the teacher's
//! split between `app::args` (clap surface) and a thin `exec_args`
//! that owns the async runtime.

mod args;
mod exitcode;

pub use args::CrawlArgs;

use crate::config::{load_config, Config};
use crate::coordinator::CrawlCoordinator;
use crate::driver::{DriverError, WindowFactory};
use crate::io::CollectionLayout;
use crate::logging::{configure_logging, LoggingOptions};
use crate::runtime::{watch_signals, Shutdown};
use crate::seed::read_seed_file;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

pub fn exec_args(args: CrawlArgs) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(17);
        }
    };
    runtime.block_on(run(args))
}

async fn run(args: CrawlArgs) -> ExitCode {
    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::from(9);
        }
    };

    if let Some(seed_file) = &args.seed_file {
        match read_seed_file(seed_file) {
            Ok(seeds) => config.seeds.extend(seeds),
            Err(e) => {
                eprintln!("failed to read seed file `{}`: {e}", seed_file.display());
                return ExitCode::from(9);
            }
        }
    }
    if let Some(collection) = &args.collection {
        config.misc.collection = collection.clone();
    }
    if let Some(cwd) = &args.cwd {
        config.misc.cwd = Some(cwd.to_string_lossy().to_string());
    }
    config.misc.overwrite = config.misc.overwrite || args.overwrite;
    config.misc.dry_run = config.misc.dry_run || args.dry_run;

    let crawl_id =
        std::env::var("CRAWL_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());
    let layout = CollectionLayout::new(
        config.misc.cwd.as_deref().map(Path::new),
        &config.misc.collection,
    );
    if let Err(e) = layout.ensure_dirs() {
        eprintln!("failed to create collection directories: {e}");
        return ExitCode::from(9);
    }

    let level = if args.quiet {
        log::LevelFilter::Warn
    } else {
        match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    let logging_options = LoggingOptions {
        enabled: true,
        level,
        include_contexts: Vec::new(),
        exclude_contexts: Vec::new(),
    };
    if let Err(e) = configure_logging(&layout.log_file_path(), &logging_options) {
        eprintln!("failed to configure logging: {e}");
        return ExitCode::from(9);
    }

    if config.misc.dry_run {
        log::info!(
            target: "crawlStatus",
            "dry run: {} seed(s) loaded, exiting without crawling",
            config.seeds.len()
        );
        return ExitCode::from(0);
    }

    let layout_arc = Arc::new(layout.clone());
    let window_factory = match build_window_factory(&config, layout_arc).await {
        Ok(factory) => factory,
        Err(e) => {
            log::error!(target: "crawlStatus", "failed to launch browser: {e}");
            return ExitCode::from(17);
        }
    };

    let shutdown = Shutdown::new();
    let signal_task = tokio::spawn(watch_signals(shutdown.clone()));

    let restarts_on_error = config.failure_policy.restarts_on_error;
    let coordinator = CrawlCoordinator::new(config, crawl_id, layout, args.recover);
    let result = coordinator.run(window_factory, shutdown).await;
    signal_task.abort();

    if let Err(e) = &result {
        log::error!(target: "crawlStatus", "crawl ended with error: {e}");
    }
    exitcode::exit_code_for(&result, restarts_on_error)
}

#[cfg(feature = "chrome")]
async fn build_window_factory(
    config: &Config,
    layout: Arc<CollectionLayout>,
) -> Result<Arc<dyn WindowFactory>, DriverError> {
    let factory = crate::driver::ChromeWindowFactory::launch(
        &config.workers,
        config.misc.recrawl_update_data,
        Some(layout),
        config.failure_policy.fail_on_invalid_status,
    )
    .await?;
    Ok(Arc::new(factory))
}

#[cfg(not(feature = "chrome"))]
async fn build_window_factory(
    _config: &Config,
    _layout: Arc<CollectionLayout>,
) -> Result<Arc<dyn WindowFactory>, DriverError> {
    Err(DriverError::WindowCreation(
        "no PageDriver implementation built; enable the `chrome` feature".to_string(),
    ))
}
