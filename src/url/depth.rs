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

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A URL's position in the crawl: how many in-scope hops from its seed
/// (`depth`), and how many of those hops were out-of-scope-but-allowed
/// (`extra_hops`). See `QueueEntry` in spec.md §3.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Depth {
    pub depth: u32,
    pub extra_hops: u32,
}

impl Depth {
    pub const ZERO: Depth = Depth {
        depth: 0,
        extra_hops: 0,
    };

    pub fn seed() -> Self {
        Self::ZERO
    }

    /// The depth of a child discovered on a page at this depth.
    pub fn child(&self, is_out_of_scope: bool) -> Self {
        Self {
            depth: self.depth + 1,
            extra_hops: if is_out_of_scope {
                self.extra_hops + 1
            } else {
                self.extra_hops
            },
        }
    }
}

impl Display for Depth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "depth={},extraHops={}", self.depth, self.extra_hops)
    }
}
