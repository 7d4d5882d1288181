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

//! Time-window filtering.
//!
//! A job log covers every step of the job. To look at a single step the log
//! is cut down to the lines whose runner timestamp falls inside the step's
//! reported bounds, padded by [`WINDOW_PADDING_MS`] on both sides because the
//! provider rounds step boundaries differently from the runner clock.

use crate::parser::parse_line_timestamp;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use std::borrow::Cow;
use std::fmt;

/// Padding applied before the start and after the end of a window.
pub const WINDOW_PADDING_MS: i64 = 300;

/// A step bound that could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("invalid {bound} time {value:?}: {source}")]
    InvalidBound {
        bound: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Reported start and completion of a step, before padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window from unpadded bounds, kept at millisecond precision.
    /// `start > end` is accepted and simply matches (almost) nothing.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: start.trunc_subsecs(3),
            end: end.trunc_subsecs(3),
        }
    }

    /// Build a window from RFC 3339 strings as reported by the CI provider.
    ///
    /// Returns `Ok(None)` when either bound is missing or empty, in which case
    /// no filtering should happen at all.
    pub fn from_bounds(
        started_at: Option<&str>,
        completed_at: Option<&str>,
    ) -> Result<Option<Self>, WindowError> {
        let started_at = started_at.filter(|s| !s.is_empty());
        let completed_at = completed_at.filter(|s| !s.is_empty());
        let (Some(started_at), Some(completed_at)) = (started_at, completed_at) else {
            return Ok(None);
        };

        let start = parse_bound("start", started_at)?;
        let end = parse_bound("end", completed_at)?;
        Ok(Some(Self::new(start, end)))
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    #[must_use]
    pub fn padded_start(&self) -> DateTime<Utc> {
        self.start - TimeDelta::milliseconds(WINDOW_PADDING_MS)
    }

    #[must_use]
    pub fn padded_end(&self) -> DateTime<Utc> {
        self.end + TimeDelta::milliseconds(WINDOW_PADDING_MS)
    }

    /// Whether an instant lies inside the padded window (both ends inclusive).
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.padded_start() && instant <= self.padded_end()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

fn parse_bound(bound: &'static str, value: &str) -> Result<DateTime<Utc>, WindowError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| WindowError::InvalidBound {
            bound,
            value: value.to_string(),
            source,
        })
}

/// Keep only the lines whose leading timestamp lies inside the padded window.
///
/// Without a window the text is returned as is. With a window every surviving
/// line must carry its own in-range timestamp: untimestamped lines (and
/// timestamps that do not parse) are dropped, there is no carry-over from a
/// previous line. Line order is preserved.
#[must_use]
pub fn filter_by_window<'a>(text: &'a str, window: Option<&TimeWindow>) -> Cow<'a, str> {
    let Some(window) = window else {
        return Cow::Borrowed(text);
    };
    profiling::scope!("filter_by_window");

    let mut total = 0usize;
    let kept: Vec<&str> = text
        .split('\n')
        .inspect(|_| total += 1)
        .filter(|line| parse_line_timestamp(line).is_some_and(|ts| window.contains(ts)))
        .collect();

    tracing::debug!(
        total,
        kept = kept.len(),
        window = %window,
        "Applied time window"
    );

    Cow::Owned(kept.join("\n"))
}
