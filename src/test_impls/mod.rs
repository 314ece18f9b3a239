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

//! Test doubles for `PageDriver`/`WindowFactory`, in the spirit of the
//! teacher's own `test_impls` module: a narrow fake that implements the
//! real trait, so `worker`/`pool`/`coordinator` tests exercise real
//! control flow without a browser.

#![cfg(test)]

use crate::driver::{DriverError, FrameHandle, NavOptions, NavOutcome, PageDriver, WindowFactory};
use crate::url::UrlOrigin;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// A scripted `PageDriver`: every call returns a canned answer, good
/// enough to drive `PageWorker` through its real control flow.
pub struct FakePageDriver {
    pub navigate_result: Result<NavOutcome, DriverError>,
    pub current_url: Option<String>,
    pub frames: Vec<FrameHandle>,
    pub links: Vec<String>,
    pub crashed: AtomicBool,
    pub closed: AtomicBool,
}

impl FakePageDriver {
    pub fn ok(status: u16) -> Self {
        Self {
            navigate_result: Ok(NavOutcome::Ok {
                status,
                mime: Some("text/html".to_string()),
            }),
            current_url: None,
            frames: vec![FrameHandle {
                id: "main".to_string(),
                is_main: true,
                url: String::new(),
            }],
            links: Vec::new(),
            crashed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn crashing() -> Self {
        Self {
            navigate_result: Err(DriverError::WindowCrashed),
            current_url: None,
            frames: Vec::new(),
            links: Vec::new(),
            crashed: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_links(mut self, links: Vec<&str>) -> Self {
        self.links = links.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_current_url(mut self, url: &str) -> Self {
        self.current_url = Some(url.to_string());
        self
    }
}

#[async_trait]
impl PageDriver for FakePageDriver {
    async fn prepare(&mut self, _auth: Option<&crate::config::BasicAuth>) -> Result<(), DriverError> {
        Ok(())
    }

    async fn navigate(
        &mut self,
        _url: &crate::url::NormalizedUrl,
        _opts: &NavOptions,
    ) -> Result<NavOutcome, DriverError> {
        match &self.navigate_result {
            Ok(outcome) => Ok(outcome.clone()),
            Err(DriverError::WindowCrashed) => Err(DriverError::WindowCrashed),
            Err(e) => Err(DriverError::Navigation(e.to_string())),
        }
    }

    async fn check_anti_bot(&mut self, _timeout: std::time::Duration) -> Result<(), DriverError> {
        Ok(())
    }

    async fn await_net_idle(&mut self, _timeout: std::time::Duration) -> Result<(), DriverError> {
        Ok(())
    }

    async fn await_custom_page_load(
        &mut self,
        _post_load_delay: std::time::Duration,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn filter_frames(&mut self) -> Result<Vec<FrameHandle>, DriverError> {
        Ok(self.frames.clone())
    }

    async fn eval_in_frame(
        &mut self,
        _frame: &FrameHandle,
        _script: &str,
    ) -> Result<Vec<String>, DriverError> {
        Ok(self.links.clone())
    }

    fn current_url(&self) -> Option<String> {
        self.current_url.clone()
    }

    fn origin(&self) -> Option<UrlOrigin> {
        self.current_url
            .as_deref()
            .and_then(|u| url::Url::parse(u).ok())
            .map(|u| UrlOrigin::from_url(&u))
    }

    fn crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a pre-scripted queue of `FakePageDriver`s, round-robin,
/// one per `open_window` call.
pub struct FakeWindowFactory {
    queue: Mutex<VecDeque<Box<dyn Fn() -> FakePageDriver + Send + Sync>>>,
    pub opened: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakeWindowFactory {
    pub fn new(builders: Vec<Box<dyn Fn() -> FakePageDriver + Send + Sync>>) -> Self {
        Self {
            queue: Mutex::new(builders.into_iter().collect()),
            opened: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn always(builder: impl Fn() -> FakePageDriver + Send + Sync + 'static) -> Self {
        Self::new(vec![Box::new(builder)])
    }
}

#[async_trait]
impl WindowFactory for FakeWindowFactory {
    async fn open_window(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.queue.lock().unwrap();
        let builder = queue.pop_front().expect("at least one builder");
        let driver = builder();
        queue.push_back(builder);
        Ok(Box::new(driver))
    }

    async fn close_browser(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
