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

//! Line-level parsing shared by the window filter and the failure scanner.
//!
//! CI runners prefix every log line with a UTC timestamp such as
//! `2024-01-01T00:00:00.1234567Z `. The window filter reads it, while the
//! normalizer masks it (together with run-specific artifact ids) so that the
//! same message from two different runs compares equal.

use chrono::{DateTime, SubsecRound, Utc};
use fancy_regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

// Runner timestamp at the very start of a line
static LEADING_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]+Z")
        .expect("valid regex literal")
});

// Same timestamp including the whitespace that separates it from the message
static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]+Z\s+")
        .expect("valid regex literal")
});

// Artifact upload lines: `name: e2e-report-pw-1712345678-1-9f86d08...tar.gz`
// Plain regex crate: linear time on any input, ASCII word boundary.
static ARTIFACT_NAME: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"((?-u:\b)name:\s+.*-pw-)[0-9]+-[0-9]+-[a-f0-9]+(\.tar\.gz)")
        .expect("valid regex literal")
});

/// Placeholder written over the numeric/hex part of an artifact name.
pub const ARTIFACT_ID_MASK: &str = "XXXXXXXXXX-X-XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX";

/// Return the raw leading timestamp of a line, without trailing whitespace.
#[must_use]
pub fn leading_timestamp(line: &str) -> Option<&str> {
    match LEADING_TIMESTAMP.find(line) {
        Ok(Some(m)) => Some(m.as_str()),
        _ => None,
    }
}

/// Parse the leading timestamp of a line.
///
/// The instant is truncated to whole milliseconds: step boundaries reported by
/// the CI provider have millisecond precision while runner lines carry up to
/// seven fractional digits. A timestamp that matches the shape but does not
/// name a real instant (month 13, ...) yields `None`.
#[must_use]
pub fn parse_line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    leading_timestamp(line).and_then(|raw| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(3))
    })
}

/// Normalize a log line so that run-specific noise does not defeat grouping.
///
/// * every digit of a leading runner timestamp becomes `X`
/// * the id part of a `-pw-` artifact name becomes [`ARTIFACT_ID_MASK`]
///
/// Both rewrites are independent. Lines without either pattern are returned
/// borrowed.
#[must_use]
pub fn strip_line_info(line: &str) -> Cow<'_, str> {
    let masked = mask_timestamp(line);
    if let Some(replaced) = mask_artifact_id(&masked) {
        Cow::Owned(replaced)
    } else {
        masked
    }
}

fn mask_timestamp(line: &str) -> Cow<'_, str> {
    let Ok(Some(prefix)) = TIMESTAMP_PREFIX.find(line) else {
        return Cow::Borrowed(line);
    };

    let mut masked: String = prefix
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_digit() { 'X' } else { c })
        .collect();
    masked.push_str(&line[prefix.end()..]);
    Cow::Owned(masked)
}

fn mask_artifact_id(line: &str) -> Option<String> {
    let caps = ARTIFACT_NAME.captures(line)?;
    let prefix = caps.get(1)?;
    let suffix = caps.get(2)?;

    let mut masked = String::with_capacity(line.len() + ARTIFACT_ID_MASK.len());
    masked.push_str(&line[..prefix.end()]);
    masked.push_str(ARTIFACT_ID_MASK);
    masked.push_str(&line[suffix.start()..]);
    Some(masked)
}
