// crabtriage - GPL-3.0-or-later
// This file is part of crabtriage.
//
// Copyright (C) 2025 Daniel Freiermuth
//
// crabtriage is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// crabtriage is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with crabtriage.  If not, see <https://www.gnu.org/licenses/>.

//! Failure triage for CI job logs.
//!
//! A job log is narrowed to a step's time window, the repository checkout
//! banner is cut out and the remaining lines are scanned for failure keywords.
//! Matches whose surrounding context is identical after normalization are
//! reported once, with every line they occurred on.
//!
//! ```
//! let log = "2024-01-01T00:00:01.000Z npm test\n2024-01-01T00:00:02.000Z Error: boom";
//! let failures = crabtriage::analyze_log(log, None).expect("one failure");
//! assert_eq!(failures[0].line_numbers, vec![2]);
//! assert_eq!(failures[0].severity.as_str(), "high");
//! ```

pub mod config;
pub mod core;
pub mod export;
pub mod fetch;
pub mod parser;
pub mod triage;

pub use crate::core::{excise_fetch_banner, filter_by_window, TimeWindow, WindowError};
pub use crate::parser::strip_line_info;
pub use crate::triage::{
    find_failures, rank_failures, FailureRecord, Keyword, Severity, SortOrder,
};

/// Run the whole pipeline on one job log.
///
/// Returns `None` when no failure was found. The function is pure: it never
/// fails, performs no I/O and keeps no state between calls.
#[must_use]
pub fn analyze_log(raw: &str, window: Option<&TimeWindow>) -> Option<Vec<FailureRecord>> {
    profiling::scope!("analyze_log");

    let windowed = filter_by_window(raw, window);
    let excised = excise_fetch_banner(&windowed);
    let failures = find_failures(&excised);

    tracing::debug!(
        failures = failures.as_ref().map_or(0, Vec::len),
        "Analyzed job log"
    );
    failures
}
