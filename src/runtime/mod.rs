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

//! Process-wide cancellation context (spec.md §4.8 step 8, §9 "Global
//! state"): replaces the source's process-global `interrupted`/
//! `forceTerm` booleans with an explicit value threaded through
//! `init → run`.

mod shutdown;

pub use shutdown::{Shutdown, ShutdownMode, ShutdownReceiver};

use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};

/// Listens for `SIGINT`/`SIGTERM`/`SIGABRT` and drives `shutdown`
/// through the two-stage policy in spec.md §4.8 step 8 and §6
/// "Signals": first signal flips graceful; a second one arriving
/// within 200ms of the first (or any signal once `SIGABRT` has been
/// seen) forces a hard stop.
pub async fn watch_signals(shutdown: Shutdown) {
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            log::error!(target: "crawlStatus", "failed to install SIGINT handler: {e}");
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            log::error!(target: "crawlStatus", "failed to install SIGTERM handler: {e}");
            return;
        }
    };
    let mut sigabrt = match signal(SignalKind::from_raw(libc_sigabrt())) {
        Ok(s) => s,
        Err(e) => {
            log::warn!(target: "crawlStatus", "failed to install SIGABRT handler: {e}");
            return;
        }
    };

    let mut abort_armed = false;
    let mut last_signal_at: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
            _ = sigabrt.recv() => {
                abort_armed = true;
                log::warn!(target: "crawlStatus", "received SIGABRT, next signal forces a hard stop");
                continue;
            }
        }

        let now = tokio::time::Instant::now();
        let within_double_signal_window = last_signal_at
            .map(|prev| now.duration_since(prev) < Duration::from_millis(200))
            .unwrap_or(false);
        last_signal_at = Some(now);

        if shutdown.is_graceful() && (within_double_signal_window || abort_armed) {
            log::warn!(target: "crawlStatus", "second interrupt signal, forcing hard stop");
            shutdown.force();
            return;
        }

        log::info!(target: "crawlStatus", "interrupt received, finishing in-flight pages then stopping");
        shutdown.graceful();
    }
}

fn libc_sigabrt() -> i32 {
    6
}
