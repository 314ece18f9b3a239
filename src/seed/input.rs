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

use crate::config::SeedConfig;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reads a seed file: one URL per line, blank lines ignored (spec.md
/// §6 "Seed file"). Each line becomes a `SeedConfig` with the crate's
/// default scope settings, which the caller may then override.
pub fn read_seed_file(path: impl AsRef<Path>) -> std::io::Result<Vec<SeedConfig>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut seeds = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        seeds.push(SeedConfig {
            url: trimmed.to_string(),
            ..Default::default()
        });
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn ignores_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http://a/\n\nhttp://b/\n   \n").unwrap();
        let seeds = read_seed_file(file.path()).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].url, "http://a/");
        assert_eq!(seeds[1].url, "http://b/");
    }
}
