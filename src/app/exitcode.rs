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

use crate::coordinator::{CoordinatorError, CrawlOutcome};
use std::process::ExitCode;

/// spec.md §6 "Exit codes", mirroring the teacher's
/// `app::exitcode_conversions` pattern of a single match at the
/// `main.rs` boundary.
pub fn exit_code_for(
    result: &Result<CrawlOutcome, CoordinatorError>,
    restarts_on_error: bool,
) -> ExitCode {
    match result {
        Ok(CrawlOutcome::Normal) => ExitCode::from(0),
        Ok(CrawlOutcome::Interrupted {
            browser_crashed: true,
        }) => ExitCode::from(10),
        Ok(CrawlOutcome::Interrupted {
            browser_crashed: false,
        }) => ExitCode::from(11),
        Ok(CrawlOutcome::InterruptedWhileSerializing) => ExitCode::from(13),
        Err(CoordinatorError::FailLimitExceeded(_))
        | Err(CoordinatorError::DiskUtilizationExceeded(_, _)) => ExitCode::from(9),
        Err(_) => {
            if restarts_on_error {
                ExitCode::from(0)
            } else {
                ExitCode::from(17)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn normal_outcome_exits_zero() {
        assert_eq!(exit_code_for(&Ok(CrawlOutcome::Normal), false), ExitCode::from(0));
    }

    #[test]
    fn interrupted_with_crash_exits_ten() {
        let result = Ok(CrawlOutcome::Interrupted {
            browser_crashed: true,
        });
        assert_eq!(exit_code_for(&result, false), ExitCode::from(10));
    }

    #[test]
    fn fatal_error_respects_restarts_on_error() {
        let result: Result<CrawlOutcome, CoordinatorError> =
            Err(CoordinatorError::Store(StoreError::Unreachable("test".to_string())));
        assert_eq!(exit_code_for(&result, false), ExitCode::from(17));
        assert_eq!(exit_code_for(&result, true), ExitCode::from(0));
    }
}
