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

use clap::Parser;
use std::path::PathBuf;

/// CLI surface (spec.md §6 "Inputs"). `--config -` reads the YAML
/// document from stdin instead of a file.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CrawlArgs {
    /// Path to the YAML config file, or `-` to read it from stdin.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Plain-text seed file, one URL per line.
    #[arg(long, value_name = "PATH")]
    pub seed_file: Option<PathBuf>,

    /// Overrides the config's `misc.collection`.
    #[arg(long)]
    pub collection: Option<String>,

    /// Overrides the config's `misc.cwd`; defaults to the process cwd.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Resumes from the most recent checkpoint instead of starting a
    /// fresh collection.
    #[arg(long)]
    pub recover: bool,

    /// Loads seeds and config, then exits without crawling.
    #[arg(long)]
    pub dry_run: bool,

    /// Allows writing into an already-populated collection directory.
    #[arg(long)]
    pub overwrite: bool,

    /// Repeatable; raises log verbosity one step per occurrence.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Lowers log verbosity to warnings and above.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}
