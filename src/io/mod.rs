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

//! On-disk layout (spec.md §6 "Outputs / persisted layout"):
//! `<cwd>/collections/<collection>/{archive,logs,collections}`. The
//! archive writer itself is an external collaborator (spec.md §1); this
//! module only owns path construction plus the one decision the crawl
//! core cannot let two workers race on: whether a URL's resource
//! already exists on disk (spec.md §4.4 "Request-interception policy").

mod errors;

pub use errors::FsError;

use std::path::{Path, PathBuf};

/// Resolves the directory layout for one crawl collection.
#[derive(Debug, Clone)]
pub struct CollectionLayout {
    root: PathBuf,
}

impl CollectionLayout {
    /// `<cwd>/collections/<collection>/`. `cwd` defaults to the
    /// process's current directory when `None`.
    pub fn new(cwd: Option<&Path>, collection: &str) -> Self {
        let base = cwd.map(Path::to_path_buf).unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        });
        Self {
            root: base.join("collections").join(collection),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("collections")
    }

    /// `<collection>/control.ndjson`: an operator appends one JSON
    /// `ControlMessage` per line here while a crawl is running; workers
    /// tail new lines as they're written (spec.md §4.2 `processMessage`,
    /// §4.6 step 1 "Drain control messages").
    pub fn control_file_path(&self) -> PathBuf {
        self.root.join("control.ndjson")
    }

    /// `logs/crawl-<utc-compact>.log` (spec.md §6).
    pub fn log_file_path(&self) -> PathBuf {
        let stamp = compact_utc_stamp();
        self.logs_dir().join(format!("crawl-{stamp}.log"))
    }

    /// Creates every directory this layout names. Idempotent.
    pub fn ensure_dirs(&self) -> Result<(), FsError> {
        for dir in [self.archive_dir(), self.logs_dir(), self.checkpoints_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| FsError::Io(dir.clone(), e))?;
        }
        Ok(())
    }

    /// The mirrored on-disk path for a fetched URL: `archive/<host>/<pathname-or-index.html>`
    /// (spec.md §6). Never touches the filesystem; `ChromePageDriver`
    /// consults the path only to ask `should_write_file`.
    pub fn archive_path_for(&self, url: &url::Url) -> PathBuf {
        let host = url.host_str().unwrap_or("unknown-host");
        let path = url.path();
        let rel = if path.is_empty() || path.ends_with('/') {
            format!("{path}index.html")
        } else {
            path.to_string()
        };
        self.archive_dir().join(host).join(rel.trim_start_matches('/'))
    }

    /// Total bytes under `archive/`, used for `sizeLimit` enforcement
    /// (spec.md §6 "Limits", §4.8 step 7).
    pub fn archive_size_bytes(&self) -> u64 {
        directory_size(&self.archive_dir())
    }
}

fn directory_size(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut total = 0u64;
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_dir() {
            total += directory_size(&entry.path());
        } else {
            total += metadata.len();
        }
    }
    total
}

fn compact_utc_stamp() -> String {
    let now = time::OffsetDateTime::now_utc();
    let format = time::macros::format_description!(
        "[year][month][day]T[hour][minute][second]Z"
    );
    now.format(&format).unwrap_or_else(|_| "unknown".to_string())
}

/// Whether a request for `url` should be allowed to proceed to the
/// network rather than be aborted as already-archived (spec.md §4.4
/// "aborted whenever the URL already exists on disk"). A plain
/// existence check: the archive writer owns actually producing the
/// file, so this predicate only needs to be idempotent and cheap.
pub fn should_write_file(layout: &CollectionLayout, url: &url::Url) -> bool {
    !layout.archive_path_for(url).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_path_defaults_to_index_html() {
        let layout = CollectionLayout::new(Some(Path::new("/tmp/x")), "coll");
        let url = url::Url::parse("http://example.com/dir/").unwrap();
        let path = layout.archive_path_for(&url);
        assert!(path.ends_with("example.com/dir/index.html"));
    }

    #[test]
    fn archive_path_preserves_pathname() {
        let layout = CollectionLayout::new(Some(Path::new("/tmp/x")), "coll");
        let url = url::Url::parse("http://example.com/a/b.png").unwrap();
        let path = layout.archive_path_for(&url);
        assert!(path.ends_with("example.com/a/b.png"));
    }

    #[test]
    fn should_write_file_is_true_for_absent_paths() {
        let layout = CollectionLayout::new(Some(Path::new("/tmp/definitely-not-there-xyz")), "coll");
        let url = url::Url::parse("http://example.com/a").unwrap();
        assert!(should_write_file(&layout, &url));
    }
}
