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

//! PageDriver (spec.md §4.4): wraps a single browser window. The
//! browser automation library itself is an external collaborator
//! (spec.md §1) — this module only specifies the contract a driver
//! must satisfy; `chrome_driver` behind the `chrome` feature is the
//! one real implementor, grounded on `chromiumoxide`.

mod error;
mod outcome;
#[cfg(feature = "chrome")]
mod chrome_driver;

pub use error::DriverError;
pub use outcome::NavOutcome;
#[cfg(feature = "chrome")]
pub use chrome_driver::ChromePageDriver;

use crate::config::{BasicAuth, WaitUntil};
use crate::url::{NormalizedUrl, UrlOrigin};
use async_trait::async_trait;
use std::time::Duration;

/// Navigation options for `PageDriver::navigate` (spec.md §4.4
/// `gotoOpts`).
#[derive(Debug, Clone)]
pub struct NavOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

/// A document context inside a window: the main frame, or a nested
/// `IFRAME`/`FRAME` (spec.md §4.4 `filterFrames`, GLOSSARY "Frame").
#[derive(Debug, Clone)]
pub struct FrameHandle {
    pub id: String,
    pub is_main: bool,
    pub url: String,
}

/// One capability per spec.md §4.4, implemented by whatever drives the
/// actual browser. Narrow and object-safe so a `PageWorker` can hold
/// `Box<dyn PageDriver>` without caring which engine is underneath
/// (spec.md §9 "Dynamic dispatch / hooks": `PageHandler.process` is the
/// single capability a user override replaces).
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Installs request interception, the `__addLink` host callback,
    /// and basic-auth headers for `seed`'s origin (spec.md §4.4
    /// `prepare`).
    async fn prepare(&mut self, auth: Option<&BasicAuth>) -> Result<(), DriverError>;

    /// Drives the window to `url`, returning the strongest outcome
    /// observed (spec.md §4.4 `navigate`).
    async fn navigate(
        &mut self,
        url: &NormalizedUrl,
        opts: &NavOptions,
    ) -> Result<NavOutcome, DriverError>;

    /// Polls for a known interstitial (e.g. a Cloudflare challenge) for
    /// up to `timeout`, sleeping and rechecking while present. Best
    /// effort: a driver with no anti-bot detection may no-op (spec.md
    /// §4.4 `checkAntiBot`).
    async fn check_anti_bot(&mut self, timeout: Duration) -> Result<(), DriverError>;

    /// Best-effort wait for network quiescence (spec.md §4.4
    /// `awaitNetIdle`).
    async fn await_net_idle(&mut self, timeout: Duration) -> Result<(), DriverError>;

    /// Signals the injected behavior's "page loaded" hook in the main
    /// frame, then sleeps `post_load_delay` (spec.md §4.4
    /// `awaitCustomPageLoad`).
    async fn await_custom_page_load(
        &mut self,
        post_load_delay: Duration,
    ) -> Result<(), DriverError>;

    /// Frames eligible for link extraction: main frame or nested
    /// `IFRAME`/`FRAME`, not `about:blank`, not ad-classified (spec.md
    /// §4.4 `filterFrames`).
    async fn filter_frames(&mut self) -> Result<Vec<FrameHandle>, DriverError>;

    /// Evaluates `script` in `frame` and returns the resulting string
    /// values — the mechanism `LinkExtractor` uses to read an
    /// attribute or DOM property out of matched elements.
    async fn eval_in_frame(
        &mut self,
        frame: &FrameHandle,
        script: &str,
    ) -> Result<Vec<String>, DriverError>;

    /// The window's current URL, used to detect `chrome-error://...`
    /// post-goto (spec.md §4.4 failure semantics, `chromeError`).
    fn current_url(&self) -> Option<String>;

    fn origin(&self) -> Option<UrlOrigin>;

    /// Whether the window has reported a crash since it was opened
    /// (spec.md §4.6 "Crash isolation").
    fn crashed(&self) -> bool;

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens fresh browser windows for a `PageWorker` (spec.md §4.6/§4.7:
/// "the browser process is shared across workers; each worker owns its
/// own window"). The browser itself is an external collaborator
/// (spec.md §1); this is the narrow seam a `PageWorker` needs to get a
/// new `PageDriver` when it must recycle its window, kept separate
/// from `PageDriver` so test doubles don't need to fake a whole
/// browser process.
#[async_trait]
pub trait WindowFactory: Send + Sync {
    async fn open_window(&self) -> Result<Box<dyn PageDriver>, DriverError>;

    /// Closes the shared browser after every worker has exited
    /// (spec.md §4.7 "Waits for all to exit, then closes the shared
    /// browser").
    async fn close_browser(&self) -> Result<(), DriverError>;
}
