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

use crate::config::Config;
use config::{Config as ConfigSource, Environment, File, FileFormat};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error(transparent)]
    Build(#[from] config::ConfigError),
    #[error("failed to read config from stdin: {0}")]
    Stdin(#[from] std::io::Error),
}

/// Loads the layered configuration: built-in defaults → config file →
/// `ATRA_CRAWL_*` environment variables (spec.md §6). `path` of `-`
/// reads the YAML document from stdin instead of a file.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigLoadError> {
    let mut builder = ConfigSource::builder();

    match path {
        Some(p) if p == Path::new("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            builder = builder.add_source(File::from_str(&buf, FileFormat::Yaml));
        }
        Some(p) => {
            builder = builder.add_source(File::from(p));
        }
        None => {}
    }

    let built = builder
        .add_source(Environment::with_prefix("ATRA_CRAWL").separator("__"))
        .build()?;

    Ok(built.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_defaults_when_nothing_is_given() {
        let config = load_config(None).unwrap();
        assert_eq!(config.workers.max_reuse, 5);
    }

    #[test]
    fn loads_a_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "misc:\n  collection: my-crawl\n").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.misc.collection, "my-crawl");
    }
}
