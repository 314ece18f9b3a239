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

use crate::store::{CrawlStatus, QueueEntry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// A full snapshot of `CrawlStore` (spec.md §4.2 `serialize`/`load`,
/// §6 "Checkpoint file content"). Round-tripping through this type is
/// spec.md §8 invariant 7.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateBlob {
    /// Queue entries grouped by depth, preserving FIFO order within a
    /// depth bucket (spec.md §4.2 "Ordering").
    pub queue_by_depth: BTreeMap<u32, Vec<QueueEntry>>,
    pub seen: HashSet<String>,
    pub done: HashSet<String>,
    pub failed: HashSet<String>,
    pub excluded: HashSet<String>,
    /// `(origSeedId, newUrl)` pairs in creation order (spec.md §3).
    pub extra_seeds: Vec<(u32, String)>,
    /// Ids of seeds whose own sitemap ingestion has completed (spec.md
    /// §4.3), scoped per-seed rather than crawl-global.
    pub sitemap_done: HashSet<u32>,
    pub status: CrawlStatus,
}

/// Writes `blob` to `<dir>/crawl-<utc>-<crawl_id>.yaml` and deletes the
/// oldest checkpoints beyond `keep` (spec.md §6 "Rotation keeps the
/// most recent `saveStateHistory` files").
pub fn write_checkpoint(
    dir: &Path,
    crawl_id: &str,
    blob: &StateBlob,
    keep: u32,
) -> Result<PathBuf, crate::store::StoreError> {
    std::fs::create_dir_all(dir)?;
    let timestamp = time::OffsetDateTime::now_utc();
    let format = time::format_description::well_known::Iso8601::DEFAULT;
    let stamp = timestamp
        .format(&format)
        .unwrap_or_else(|_| "unknown".to_string())
        .replace([':', '.'], "-");
    let path = dir.join(format!("crawl-{stamp}-{crawl_id}.yaml"));
    let yaml = serde_yaml::to_string(blob)?;
    std::fs::write(&path, yaml)?;
    rotate(dir, crawl_id, keep)?;
    Ok(path)
}

fn rotate(dir: &Path, crawl_id: &str, keep: u32) -> std::io::Result<()> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .ends_with(&format!("{crawl_id}.yaml"))
        })
        .collect();
    files.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    let excess = files.len().saturating_sub(keep as usize);
    for entry in files.into_iter().take(excess) {
        let _ = std::fs::remove_file(entry.path());
    }
    Ok(())
}

pub fn load_checkpoint(path: &Path) -> Result<StateBlob, crate::store::StoreError> {
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents)
        .map_err(|e| crate::store::StoreError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_yaml() {
        let mut blob = StateBlob::default();
        blob.seen.insert("http://s/a".to_string());
        blob.sitemap_done.insert(0);
        let yaml = serde_yaml::to_string(&blob).unwrap();
        let back: StateBlob = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(blob.seen, back.seen);
        assert_eq!(blob.sitemap_done, back.sitemap_done);
    }

    #[test]
    fn rotation_keeps_only_the_newest_n() {
        let dir = tempfile::tempdir().unwrap();
        for _ in 0..5 {
            write_checkpoint(dir.path(), "abc", &StateBlob::default(), 2).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 2);
    }
}
