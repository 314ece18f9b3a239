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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The two stop signals a crawl can receive (spec.md §4.8 step 8).
/// `Graceful` lets in-flight pages finish; `Hard` cancels them
/// immediately.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ShutdownMode {
    Graceful,
    Hard,
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    graceful_flag: Arc<AtomicBool>,
    hard_token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            graceful_flag: Arc::new(AtomicBool::new(false)),
            hard_token: CancellationToken::new(),
        }
    }

    pub fn is_graceful(&self) -> bool {
        self.graceful_flag.load(Ordering::SeqCst)
    }

    pub fn is_hard(&self) -> bool {
        self.hard_token.is_cancelled()
    }

    pub fn graceful(&self) {
        self.graceful_flag.store(true, Ordering::SeqCst);
    }

    pub fn force(&self) {
        self.graceful_flag.store(true, Ordering::SeqCst);
        self.hard_token.cancel();
    }

    /// `None` while running; `Some` once a stop has been requested.
    pub fn mode(&self) -> Option<ShutdownMode> {
        if self.is_hard() {
            Some(ShutdownMode::Hard)
        } else if self.is_graceful() {
            Some(ShutdownMode::Graceful)
        } else {
            None
        }
    }

    pub fn receiver(&self) -> ShutdownReceiver {
        ShutdownReceiver {
            graceful_flag: self.graceful_flag.clone(),
            hard_token: self.hard_token.clone(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// The read-only handle workers and ancillary tasks carry; a `clone()`
/// observes the same underlying flags (spec.md §5 "every suspension
/// point honors a deadline or an external cancel signal").
#[derive(Debug, Clone)]
pub struct ShutdownReceiver {
    graceful_flag: Arc<AtomicBool>,
    hard_token: CancellationToken,
}

impl ShutdownReceiver {
    pub fn is_graceful(&self) -> bool {
        self.graceful_flag.load(Ordering::SeqCst)
    }

    pub fn is_hard(&self) -> bool {
        self.hard_token.is_cancelled()
    }

    pub async fn hard_cancelled(&self) {
        self.hard_token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_implies_graceful() {
        let shutdown = Shutdown::new();
        shutdown.force();
        assert!(shutdown.is_graceful());
        assert!(shutdown.is_hard());
    }

    #[test]
    fn receiver_observes_graceful_flag() {
        let shutdown = Shutdown::new();
        let receiver = shutdown.receiver();
        assert!(!receiver.is_graceful());
        shutdown.graceful();
        assert!(receiver.is_graceful());
    }
}
