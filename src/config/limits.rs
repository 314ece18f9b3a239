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
use strum::{Display, EnumString};

/// spec.md §6 "Limits".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Hard cap on `queued + inProgress + done + failed + excluded`.
    /// `None` means unlimited.
    pub page_limit: Option<u64>,
    /// Upper bound `pageLimit` itself may never exceed.
    pub max_page_limit: Option<u64>,
    pub size_limit: Option<u64>,
    pub time_limit_secs: Option<u64>,
    pub disk_utilization_pct: Option<u8>,
    pub fail_on_failed_limit: Option<u64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            page_limit: None,
            max_page_limit: None,
            size_limit: None,
            time_limit_secs: None,
            disk_utilization_pct: None,
            fail_on_failed_limit: None,
        }
    }
}

/// spec.md §6 "Timing".
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WaitUntil {
    Load,
    Domcontentloaded,
    Networkidle0,
    Networkidle2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub page_load_timeout_secs: u64,
    pub behavior_timeout_secs: u64,
    pub page_extra_delay_secs: u64,
    pub post_load_delay_secs: u64,
    pub net_idle_wait_secs: u64,
    pub wait_until: WaitUntil,
    /// Per-frame extraction timeout (`PAGE_OP_TIMEOUT_SECS` in spec.md §4.5).
    pub page_op_timeout_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            page_load_timeout_secs: 90,
            behavior_timeout_secs: 90,
            page_extra_delay_secs: 0,
            post_load_delay_secs: 0,
            net_idle_wait_secs: 15,
            wait_until: WaitUntil::Load,
            page_op_timeout_secs: 5,
        }
    }
}

/// spec.md §6 "Workers".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub workers: u32,
    pub headless: bool,
    pub profile: Option<String>,
    pub user_agent: Option<String>,
    pub user_agent_suffix: Option<String>,
    pub lang: Option<String>,
    pub mobile_device: Option<String>,
    /// Successive same-origin pages a worker may serve from one window
    /// before recycling it (spec.md §4.6 `MAX_REUSE`).
    pub max_reuse: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1) as u32,
            headless: true,
            profile: None,
            user_agent: None,
            user_agent_suffix: None,
            lang: None,
            mobile_device: None,
            max_reuse: 5,
        }
    }
}

/// spec.md §6 "Rules".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub block_ads: bool,
    pub ad_block_message: Option<String>,
    pub block_rules: Vec<String>,
    pub block_message: Option<String>,
    pub origin_override: Vec<String>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            block_ads: false,
            ad_block_message: None,
            block_rules: Vec::new(),
            block_message: None,
            origin_override: Vec::new(),
        }
    }
}

/// spec.md §6 "Behaviors".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Behaviors {
    pub enable_behaviors: bool,
    pub custom_behaviors: Vec<String>,
}

impl Default for Behaviors {
    fn default() -> Self {
        Self {
            enable_behaviors: true,
            custom_behaviors: Vec::new(),
        }
    }
}

/// spec.md §6 "Failure policy".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailurePolicy {
    pub fail_on_failed_seed: bool,
    pub fail_on_invalid_status: bool,
    pub restarts_on_error: bool,
    pub wait_on_done: bool,
    pub exit_on_redis_error: bool,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            fail_on_failed_seed: false,
            fail_on_invalid_status: false,
            restarts_on_error: false,
            wait_on_done: false,
            exit_on_redis_error: false,
        }
    }
}

/// spec.md §6 "Persistence".
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SaveState {
    Never,
    Partial,
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Persistence {
    pub save_state: SaveState,
    pub save_state_interval_secs: u64,
    pub save_state_history: u32,
    pub redis_store_url: Option<String>,
    pub redis_store_clean: bool,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            save_state: SaveState::Partial,
            save_state_interval_secs: 300,
            save_state_history: 5,
            redis_store_url: None,
            redis_store_clean: false,
        }
    }
}

/// spec.md §6 "Sitemap".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitemapDates {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

impl Default for SitemapDates {
    fn default() -> Self {
        Self {
            from_date: None,
            to_date: None,
        }
    }
}

/// spec.md §6 "Misc".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Misc {
    pub collection: String,
    pub cwd: Option<String>,
    pub overwrite: bool,
    pub dry_run: bool,
    pub recrawl_update_data: bool,
}

impl Default for Misc {
    fn default() -> Self {
        Self {
            collection: "crawl".to_string(),
            cwd: None,
            overwrite: false,
            dry_run: false,
            recrawl_update_data: false,
        }
    }
}
