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

//! Registered-domain extraction backed by the Public Suffix List, used
//! to derive the `domain` scope type's include regex (spec.md §4.1):
//! `^<scheme>://([^/]+\.)*<registered-host>/`.

/// Returns the registered domain (e.g. `example.co.uk` for
/// `www.blog.example.co.uk`) of `host`, falling back to `host` itself
/// if the PSL has no opinion (e.g. bare IP literals or single-label
/// hosts used in tests).
pub fn registered_domain(host: &str) -> String {
    match psl::domain(host.as_bytes()) {
        Some(domain) => String::from_utf8_lossy(domain.as_bytes()).into_owned(),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_subdomains() {
        assert_eq!(registered_domain("www.blog.example.com"), "example.com");
    }

    #[test]
    fn handles_compound_tlds() {
        assert_eq!(registered_domain("news.bbc.co.uk"), "bbc.co.uk");
    }

    #[test]
    fn falls_back_for_unknown_hosts() {
        assert_eq!(registered_domain("localhost"), "localhost");
    }
}
