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

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Words that mark a line as a failure candidate, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keyword {
    Error,
    Failed,
    Exception,
    Fatal,
    Crash,
    Unexpected,
}

/// Coarse ranking derived from the keyword that triggered a match.
///
/// Variants are ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

// One pattern per keyword. Word boundaries and case folding are ASCII only:
// `构建failed` matches, `craſh` does not.
static KEYWORD_PATTERNS: LazyLock<Vec<(Keyword, Regex)>> = LazyLock::new(|| {
    Keyword::ALL
        .iter()
        .map(|&keyword| {
            let pattern = format!(r"(?-u:\b)(?i-u:{})(?-u:\b)", keyword.as_str());
            (keyword, Regex::new(&pattern).expect("valid keyword pattern"))
        })
        .collect()
});

impl Keyword {
    /// All keywords, highest priority first.
    pub const ALL: [Self; 6] = [
        Self::Error,
        Self::Failed,
        Self::Exception,
        Self::Fatal,
        Self::Crash,
        Self::Unexpected,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Failed => "failed",
            Self::Exception => "exception",
            Self::Fatal => "fatal",
            Self::Crash => "crash",
            Self::Unexpected => "unexpected",
        }
    }

    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Fatal | Self::Crash => Severity::Critical,
            Self::Error | Self::Exception => Severity::High,
            Self::Failed | Self::Unexpected => Severity::Medium,
        }
    }

    /// Find the highest-priority keyword present in a line.
    ///
    /// Priority follows [`Keyword::ALL`], not the position inside the line:
    /// `crash after error` yields [`Keyword::Error`].
    #[must_use]
    pub fn detect(line: &str) -> Option<Self> {
        KEYWORD_PATTERNS
            .iter()
            .find(|(_, pattern)| pattern.is_match(line))
            .map(|&(keyword, _)| keyword)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_keywords() {
        assert_eq!(Keyword::detect("Process completed with exit code 1. Error"), Some(Keyword::Error));
        assert_eq!(Keyword::detect("1 test FAILED"), Some(Keyword::Failed));
        assert_eq!(Keyword::detect("Unhandled Exception: boom"), Some(Keyword::Exception));
        assert_eq!(Keyword::detect("fatal: not a git repository"), Some(Keyword::Fatal));
        assert_eq!(Keyword::detect("chrome did crash"), Some(Keyword::Crash));
        assert_eq!(Keyword::detect("Unexpected token <"), Some(Keyword::Unexpected));
        assert_eq!(Keyword::detect("all 42 tests passed"), None);
    }

    #[test]
    fn test_word_boundaries() {
        assert_eq!(Keyword::detect("errors: 0"), None);
        assert_eq!(Keyword::detect("NullPointerException thrown"), None);
        assert_eq!(Keyword::detect("crashed"), None);
        assert_eq!(Keyword::detect("onerror handler"), None);
        assert_eq!(Keyword::detect("TypeError: x is undefined"), None);
        assert_eq!(Keyword::detect("[error] build"), Some(Keyword::Error));
        assert_eq!(Keyword::detect("status=failed;"), Some(Keyword::Failed));
        assert_eq!(Keyword::detect("no_error_here"), None);
    }

    #[test]
    fn test_ascii_word_boundaries() {
        // Non-ASCII letters are not word characters
        assert_eq!(Keyword::detect("构建failed"), Some(Keyword::Failed));
        assert_eq!(Keyword::detect("éerror here"), Some(Keyword::Error));
        assert_eq!(Keyword::detect("测试crash了"), Some(Keyword::Crash));
    }

    #[test]
    fn test_ascii_case_folding() {
        // Long s must not fold onto s
        assert_eq!(Keyword::detect("craſh"), None);
        assert_eq!(Keyword::detect("exception"), Some(Keyword::Exception));
        assert_eq!(Keyword::detect("ERROR"), Some(Keyword::Error));
        assert_eq!(Keyword::detect("UnExPeCtEd"), Some(Keyword::Unexpected));
    }

    #[test]
    fn test_priority_order_not_position() {
        assert_eq!(Keyword::detect("crash reported after error"), Some(Keyword::Error));
        assert_eq!(Keyword::detect("Unexpected fatal exception"), Some(Keyword::Exception));
        assert_eq!(Keyword::detect("fatal crash"), Some(Keyword::Fatal));
    }

    #[test]
    fn test_severity_table() {
        assert_eq!(Keyword::Fatal.severity(), Severity::Critical);
        assert_eq!(Keyword::Crash.severity(), Severity::Critical);
        assert_eq!(Keyword::Error.severity(), Severity::High);
        assert_eq!(Keyword::Exception.severity(), Severity::High);
        assert_eq!(Keyword::Failed.severity(), Severity::Medium);
        assert_eq!(Keyword::Unexpected.severity(), Severity::Medium);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
