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

use crate::config::{BasicAuth, WaitUntil, WorkerConfig};
use crate::driver::{DriverError, FrameHandle, NavOptions, NavOutcome, PageDriver, WindowFactory};
use crate::io::CollectionLayout;
use crate::url::{NormalizedUrl, UrlOrigin};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// `PageDriver` backed by a real `chromiumoxide::Page` (spec.md §4.4;
/// the only implementor built behind the `chrome` feature, matching
/// how the teacher crate keeps `chromiumoxide` optional).
pub struct ChromePageDriver {
    page: Page,
    origin: Option<UrlOrigin>,
    crashed: Arc<AtomicBool>,
    same_origin_main_document_served: bool,
    recrawl_update_data: bool,
    layout: Option<Arc<CollectionLayout>>,
    fail_on_invalid_status: bool,
}

impl ChromePageDriver {
    pub fn new(
        page: Page,
        recrawl_update_data: bool,
        layout: Option<Arc<CollectionLayout>>,
        fail_on_invalid_status: bool,
    ) -> Self {
        let crashed = Arc::new(AtomicBool::new(false));
        {
            let crashed = crashed.clone();
            let mut events = page.event_listener::<chromiumoxide::cdp::browser_protocol::inspector::EventTargetCrashed>();
            tokio::spawn(async move {
                if let Ok(mut events) = events {
                    while events.next().await.is_some() {
                        crashed.store(true, Ordering::SeqCst);
                    }
                }
            });
        }
        Self {
            page,
            origin: None,
            crashed,
            same_origin_main_document_served: false,
            recrawl_update_data,
            layout,
            fail_on_invalid_status,
        }
    }

    /// Spawns a bounded `EventResponseReceived` listener and returns the
    /// slot it fills in with the main document's `(status, mime)` once
    /// the CDP Network domain reports it (spec.md §4.4 navigation
    /// contract: `navigate` must report the real response status, not
    /// an assumed one).
    async fn capture_main_response(&self) -> Arc<Mutex<Option<(u16, Option<String>)>>> {
        let captured = Arc::new(Mutex::new(None));
        if let Ok(mut events) = self.page.event_listener::<EventResponseReceived>().await {
            let captured = captured.clone();
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    if !matches!(event.r#type, ResourceType::Document) {
                        continue;
                    }
                    let mut slot = captured.lock().await;
                    if slot.is_none() {
                        let mime = (!event.response.mime_type.is_empty())
                            .then(|| event.response.mime_type.clone());
                        *slot = Some((event.response.status as u16, mime));
                    }
                }
            });
        }
        captured
    }

    /// Reads back whatever `capture_main_response` has observed so far,
    /// defaulting to `(200, text/html)` when the Network domain hasn't
    /// reported anything yet (e.g. a same-document navigation).
    async fn read_response(
        captured: &Mutex<Option<(u16, Option<String>)>>,
    ) -> (u16, Option<String>) {
        match captured.lock().await.clone() {
            Some((status, mime)) => (status, mime.or_else(|| Some("text/html".to_string()))),
            None => (200, Some("text/html".to_string())),
        }
    }
}

/// Whether `layout`'s archive already holds a copy of `url`, consulted
/// only for requests that aren't the main document (spec.md §4.4
/// "Request-interception policy", §6 archive layout `shouldWriteFile`).
/// The archive writer itself is an external collaborator; this
/// predicate is the only part of that decision the crawl core must
/// make itself, to avoid two workers racing on whether to call it.
fn already_on_disk(layout: Option<&CollectionLayout>, url: &str) -> bool {
    let Some(layout) = layout else { return false };
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    !crate::io::should_write_file(layout, &parsed)
}

#[async_trait]
impl PageDriver for ChromePageDriver {
    async fn prepare(&mut self, auth: Option<&BasicAuth>) -> Result<(), DriverError> {
        if let Some(auth) = auth {
            self.page
                .authenticate(auth.username.clone(), auth.password.clone())
                .await
                .map_err(|e| DriverError::WindowCreation(e.to_string()))?;
        }

        self.page
            .execute(
                FetchEnableParams::builder()
                    .patterns(vec![RequestPattern::builder().build()])
                    .build(),
            )
            .await
            .map_err(|e| DriverError::WindowCreation(e.to_string()))?;

        let origin = self.origin.clone();
        let recrawl_update_data = self.recrawl_update_data;
        let layout = self.layout.clone();
        let mut main_document_served = false;
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| DriverError::WindowCreation(e.to_string()))?;
        let page = self.page.clone();

        tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let is_main_document = !main_document_served
                    && matches!(event.resource_type, ResourceType::Document);
                let same_origin = origin
                    .as_ref()
                    .map(|o| event.request.url.starts_with(&o.to_string()))
                    .unwrap_or(true);
                let resource_allowed = matches!(
                    event.resource_type,
                    ResourceType::Document
                        | ResourceType::Script
                        | ResourceType::Stylesheet
                        | ResourceType::Image
                );

                // spec.md §4.4 "Request-interception policy": the main
                // document is always allowed. A same-origin request of
                // an allowed resource type is allowed next. Everything
                // else (same-origin other types, cross-origin) is
                // ordinarily aborted; when `recrawlUpdateData` is set
                // the crawl intends to refresh already-archived
                // resources, so the abort criterion switches to an
                // on-disk check instead of a blanket skip.
                let allow = is_main_document
                    || (same_origin && resource_allowed)
                    || (recrawl_update_data
                        && !already_on_disk(layout.as_deref(), &event.request.url));

                if is_main_document {
                    main_document_served = true;
                }

                let result = if allow {
                    page.execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                } else {
                    page.execute(
                        FailRequestParams::builder()
                            .request_id(event.request_id.clone())
                            .error_reason(ErrorReason::BlockedByClient)
                            .build()
                            .expect("valid FailRequestParams"),
                    )
                    .await
                    .map(|_| ())
                };
                if let Err(e) = result {
                    log::debug!(target: "worker", "fetch continuation failed: {e}");
                }
            }
        });

        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &NormalizedUrl,
        opts: &NavOptions,
    ) -> Result<NavOutcome, DriverError> {
        self.origin = Some(url.origin());
        self.same_origin_main_document_served = false;

        let main_response = self.capture_main_response().await;

        let params = NavigateParams::builder()
            .url(url.as_url().as_str())
            .build()
            .map_err(|e| DriverError::Navigation(e.to_string()))?;

        let goto = self.page.goto(params);
        let response = match tokio::time::timeout(opts.timeout, goto).await {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                let msg = e.to_string();
                if msg.contains("ERR_ABORTED") {
                    let mime = main_response
                        .lock()
                        .await
                        .clone()
                        .and_then(|(_, mime)| mime)
                        .unwrap_or_else(|| "application/octet-stream".to_string());
                    return Ok(NavOutcome::DownloadDetected { mime });
                }
                return Err(DriverError::Navigation(msg));
            }
            Err(_) => Some(()),
        };

        if let Some(current) = self.current_url() {
            if current.starts_with("chrome-error://") {
                return Ok(NavOutcome::ChromeError);
            }
        }

        if response.is_some() {
            // DOM content loaded but the configured `waitUntil`
            // deadline elapsed before full load (spec.md §4.4
            // `slowPage`).
            log::debug!(
                target: "driver",
                "goto exceeded timeout before waitUntil={} was satisfied",
                <&str>::from(opts.wait_until),
            );
            let (status, mime) = Self::read_response(&main_response).await;
            return Ok(NavOutcome::SlowPage { status, mime });
        }

        // `Domcontentloaded` is satisfied by `goto` returning; the
        // stronger variants wait for the load event, and the
        // network-idle variants additionally wait out a quiescence
        // window before calling the page settled (spec.md §4.4
        // `gotoOpts.waitUntil`).
        if !matches!(opts.wait_until, WaitUntil::Domcontentloaded) {
            match tokio::time::timeout(opts.timeout, self.page.wait_for_navigation()).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) | Err(_) => {
                    let (status, mime) = Self::read_response(&main_response).await;
                    return Ok(NavOutcome::SlowPage { status, mime });
                }
            }
        }

        if matches!(
            opts.wait_until,
            WaitUntil::Networkidle0 | WaitUntil::Networkidle2
        ) {
            let idle_budget = opts.timeout.min(Duration::from_secs(5));
            if self.await_net_idle(idle_budget).await.is_err() {
                let (status, mime) = Self::read_response(&main_response).await;
                return Ok(NavOutcome::SlowPage { status, mime });
            }
        }

        let (status, mime) = Self::read_response(&main_response).await;
        if status >= 400 && self.fail_on_invalid_status {
            return Ok(NavOutcome::HttpError { status });
        }
        Ok(NavOutcome::Ok { status, mime })
    }

    async fn check_anti_bot(&mut self, timeout: Duration) -> Result<(), DriverError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let present: bool = self
                .page
                .evaluate("document.querySelector('div.cf-browser-verification') !== null")
                .await
                .ok()
                .and_then(|v| v.into_value().ok())
                .unwrap_or(false);
            if !present || tokio::time::Instant::now() >= deadline {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn await_net_idle(&mut self, timeout: Duration) -> Result<(), DriverError> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Navigation(e.to_string())),
            Err(_) => Err(DriverError::Timeout),
        }
    }

    async fn await_custom_page_load(
        &mut self,
        post_load_delay: Duration,
    ) -> Result<(), DriverError> {
        let _ = self
            .page
            .evaluate("window.__onPageLoaded && window.__onPageLoaded()")
            .await;
        tokio::time::sleep(post_load_delay).await;
        Ok(())
    }

    async fn filter_frames(&mut self) -> Result<Vec<FrameHandle>, DriverError> {
        let tree = self
            .page
            .frame_tree()
            .await
            .map_err(|e| DriverError::ScriptEval(e.to_string()))?;
        let main_id = tree.frame.id.clone();

        let mut out = Vec::new();
        let mut stack = vec![tree];
        while let Some(node) = stack.pop() {
            let is_main = node.frame.id == main_id;
            let url = node.frame.url.clone();
            if url != "about:blank" {
                out.push(FrameHandle {
                    id: node.frame.id.inner().to_string(),
                    is_main,
                    url,
                });
            }
            if let Some(children) = node.child_frames {
                stack.extend(children);
            }
        }
        Ok(out)
    }

    async fn eval_in_frame(
        &mut self,
        frame: &FrameHandle,
        script: &str,
    ) -> Result<Vec<String>, DriverError> {
        // `Page::evaluate` runs in the main frame's execution context;
        // this crate's chromiumoxide version exposes no per-frame
        // `contextId` plumbing, so a nested frame is skipped rather
        // than silently evaluated against the wrong document.
        if !frame.is_main {
            log::debug!(target: "driver", "skipping eval in nested frame {}", frame.id);
            return Ok(Vec::new());
        }
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::ScriptEval(e.to_string()))?;
        result
            .into_value::<Vec<String>>()
            .map_err(|e| DriverError::ScriptEval(e.to_string()))
    }

    fn current_url(&self) -> Option<String> {
        self.page.url_blocking().ok().flatten()
    }

    fn origin(&self) -> Option<UrlOrigin> {
        self.origin.clone()
    }

    fn crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.page
            .close()
            .await
            .map_err(|e| DriverError::WindowCreation(e.to_string()))
    }
}

/// Opens windows against one shared `chromiumoxide::Browser` process
/// (spec.md §4.7 "the browser process is shared across workers"). The
/// browser's event-handler task is driven once, at construction,
/// rather than per-window.
pub struct ChromeWindowFactory {
    browser: Mutex<Browser>,
    recrawl_update_data: bool,
    layout: Option<Arc<CollectionLayout>>,
    fail_on_invalid_status: bool,
}

impl ChromeWindowFactory {
    /// Launches the shared browser process from `worker` settings
    /// (headless, user agent, profile, language) and spawns the task
    /// that drains its CDP event handler, matching the teacher's
    /// pattern of detaching the handler loop at browser construction.
    pub async fn launch(
        worker: &WorkerConfig,
        recrawl_update_data: bool,
        layout: Option<Arc<CollectionLayout>>,
        fail_on_invalid_status: bool,
    ) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder().headless_mode(if worker.headless {
            chromiumoxide::browser::HeadlessMode::True
        } else {
            chromiumoxide::browser::HeadlessMode::False
        });
        if let Some(ua) = &worker.user_agent {
            let suffixed = match &worker.user_agent_suffix {
                Some(suffix) => format!("{ua} {suffix}"),
                None => ua.clone(),
            };
            builder = builder.user_agent(suffixed);
        }
        let config = builder
            .build()
            .map_err(DriverError::WindowCreation)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::WindowCreation(e.to_string()))?;
        tokio::spawn(async move { while handler.next().await.is_some() {} });
        Ok(Self {
            browser: Mutex::new(browser),
            recrawl_update_data,
            layout,
            fail_on_invalid_status,
        })
    }
}

#[async_trait]
impl WindowFactory for ChromeWindowFactory {
    async fn open_window(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        let mut browser = self.browser.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::WindowCreation(e.to_string()))?;
        Ok(Box::new(ChromePageDriver::new(
            page,
            self.recrawl_update_data,
            self.layout.clone(),
            self.fail_on_invalid_status,
        )))
    }

    async fn close_browser(&self) -> Result<(), DriverError> {
        self.browser
            .lock()
            .await
            .close()
            .await
            .map_err(|e| DriverError::WindowCreation(e.to_string()))?;
        Ok(())
    }
}

impl From<WaitUntil> for &'static str {
    fn from(value: WaitUntil) -> Self {
        match value {
            WaitUntil::Load => "load",
            WaitUntil::Domcontentloaded => "domcontentloaded",
            WaitUntil::Networkidle0 => "networkidle0",
            WaitUntil::Networkidle2 => "networkidle2",
        }
    }
}
