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

//! Failure extraction and grouping.
//!
//! Every line is normalized, tested for a failure keyword and, on a match,
//! expanded to a window of [`CONTEXT_RADIUS`] normalized lines on each side.
//! Matches whose windows are equal ignoring ASCII case are the same failure
//! and are folded into one [`FailureRecord`].

use crate::parser::strip_line_info;
use crate::triage::keyword::{Keyword, Severity};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Reverse;

/// Number of lines shown before and after a triggering line.
pub const CONTEXT_RADIUS: usize = 3;

/// One distinct failure found in a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// 1-based numbers of the triggering lines, in the order they were seen.
    pub line_numbers: Vec<usize>,
    /// Normalized lines around the first trigger, joined with `\n`.
    pub context: String,
    pub keyword: Keyword,
    pub severity: Severity,
    /// Always equal to `line_numbers.len()`.
    pub occurrences: usize,
}

impl FailureRecord {
    fn new(line_number: usize, context: String, keyword: Keyword) -> Self {
        Self {
            line_numbers: vec![line_number],
            context,
            keyword,
            severity: keyword.severity(),
            occurrences: 1,
        }
    }

    fn record_occurrence(&mut self, line_number: usize) {
        self.line_numbers.push(line_number);
        self.occurrences += 1;
    }
}

/// Order in which findings are presented.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Order of first appearance in the log
    #[default]
    FirstSeen,
    /// Most severe first
    Severity,
    /// Most frequent first
    Occurrences,
}

/// Scan a log for failures and group identical contexts.
///
/// Returns `None` when no line matched; a returned list is never empty.
/// Records come out in the order their first trigger appears.
#[must_use]
pub fn find_failures(text: &str) -> Option<Vec<FailureRecord>> {
    profiling::scope!("find_failures");

    let lines: Vec<Cow<'_, str>> = text.split('\n').map(strip_line_info).collect();
    let last = lines.len().saturating_sub(1);

    let mut groups: IndexMap<String, FailureRecord> = IndexMap::new();
    for (index, line) in lines.iter().enumerate() {
        let Some(keyword) = Keyword::detect(line) else {
            continue;
        };

        let first = index.saturating_sub(CONTEXT_RADIUS);
        let end = (index + CONTEXT_RADIUS).min(last);
        let context = lines[first..=end].join("\n");

        match groups.entry(context.to_ascii_lowercase()) {
            Entry::Occupied(mut existing) => existing.get_mut().record_occurrence(index + 1),
            Entry::Vacant(slot) => {
                slot.insert(FailureRecord::new(index + 1, context, keyword));
            }
        }
    }

    tracing::debug!(
        lines = lines.len(),
        failures = groups.len(),
        "Scanned log for failures"
    );

    if groups.is_empty() {
        None
    } else {
        Some(groups.into_values().collect())
    }
}

/// Reorder findings for presentation. The sort is stable, so ties keep their
/// first-seen order.
pub fn rank_failures(failures: &mut [FailureRecord], order: SortOrder) {
    match order {
        SortOrder::FirstSeen => failures.sort_by_key(|f| f.line_numbers.first().copied()),
        SortOrder::Severity => failures.sort_by_key(|f| Reverse(f.severity)),
        SortOrder::Occurrences => failures.sort_by_key(|f| Reverse(f.occurrences)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_input_is_none() {
        assert_eq!(find_failures(""), None);
    }

    #[test]
    fn test_no_keywords_is_none() {
        let text = "Run npm ci\nadded 812 packages\nerrors: 0\nDone in 3.2s";
        assert_eq!(find_failures(text), None);
    }

    #[test]
    fn test_single_failure_context() {
        let text = (1..=10)
            .map(|i| if i == 5 { "Error: boom".to_string() } else { format!("line {i}") })
            .collect::<Vec<_>>()
            .join("\n");

        let failures = find_failures(&text).expect("one failure");
        assert_eq!(failures.len(), 1);
        let failure = &failures[0];
        assert_eq!(failure.line_numbers, vec![5]);
        assert_eq!(failure.occurrences, 1);
        assert_eq!(failure.keyword, Keyword::Error);
        assert_eq!(failure.severity, Severity::High);
        assert_eq!(
            failure.context,
            "line 2\nline 3\nline 4\nError: boom\nline 6\nline 7\nline 8"
        );
    }

    #[test]
    fn test_context_is_clamped_at_edges() {
        let failures = find_failures("fatal: oops\nnext\nafter").expect("one failure");
        assert_eq!(failures[0].context, "fatal: oops\nnext\nafter");
        assert_eq!(failures[0].severity, Severity::Critical);

        let failures = find_failures("a\nb\nc\nd\ne\nboom crash").expect("one failure");
        assert_eq!(failures[0].context, "c\nd\ne\nboom crash");
        assert_eq!(failures[0].line_numbers, vec![6]);
    }

    #[test]
    fn test_repeated_block_is_grouped() {
        // The same 7-line neighbourhood twice, timestamps differ per run
        let block = |minute: u32| {
            [
                format!("2024-01-01T00:{minute:02}:00.0000001Z a"),
                format!("2024-01-01T00:{minute:02}:00.0000002Z b"),
                format!("2024-01-01T00:{minute:02}:00.0000003Z c"),
                format!("2024-01-01T00:{minute:02}:00.0000004Z Error: disk full"),
                format!("2024-01-01T00:{minute:02}:00.0000005Z d"),
                format!("2024-01-01T00:{minute:02}:00.0000006Z e"),
                format!("2024-01-01T00:{minute:02}:00.0000007Z f"),
            ]
            .join("\n")
        };
        let text = format!("{}\n{}", block(1), block(2));

        let failures = find_failures(&text).expect("failures");
        // Lines 4 and 11 share a masked window; nothing else matches
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].line_numbers, vec![4, 11]);
        assert_eq!(failures[0].occurrences, 2);
        assert!(failures[0]
            .context
            .starts_with("XXXX-XX-XXTXX:XX:XX.XXXXXXXZ a\n"));
    }

    #[test]
    fn test_same_trigger_in_different_neighbourhood_is_not_grouped() {
        let text = "a\nError: disk full\nb\n---\nA\nERROR: DISK FULL\nB";
        let failures = find_failures(text).expect("failures");
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].line_numbers, vec![2]);
        assert_eq!(failures[1].line_numbers, vec![6]);
    }

    #[test]
    fn test_case_only_difference_groups() {
        let text = "x\nx\nx\nError: disk full\nx\nx\nx\nx\nx\nx\nERROR: DISK FULL\nx\nx\nx";
        let failures = find_failures(text).expect("failures");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].line_numbers, vec![4, 11]);
        assert_eq!(failures[0].context, "x\nx\nx\nError: disk full\nx\nx\nx");
    }

    #[test]
    fn test_keyword_priority_over_position() {
        let failures = find_failures("the crash came after an error").expect("failure");
        assert_eq!(failures[0].keyword, Keyword::Error);
        assert_eq!(failures[0].severity, Severity::High);
    }

    #[test]
    fn test_keyword_matched_after_normalization() {
        // Timestamp digits never create or hide a keyword; message is matched as is
        let failures = find_failures("2024-01-01T00:00:00.000Z Build FAILED").expect("failure");
        assert_eq!(failures[0].keyword, Keyword::Failed);
        assert_eq!(failures[0].context, "XXXX-XX-XXTXX:XX:XX.XXXZ Build FAILED");
    }

    #[test]
    fn test_first_seen_order() {
        let text = "unexpected EOF\n.\n.\n.\n.\n.\n.\n.\nfatal: bad object\n.\n.\n.\n.\n.\n.\n.\nunexpected EOF";
        let failures = find_failures(text).expect("failures");
        let keywords: Vec<Keyword> = failures.iter().map(|f| f.keyword).collect();
        assert_eq!(keywords, vec![Keyword::Unexpected, Keyword::Fatal, Keyword::Unexpected]);
    }

    #[test]
    fn test_rank_by_severity_is_stable() {
        let text = "unexpected EOF\n.\n.\n.\n.\n.\n.\n.\nfatal: bad object\n.\n.\n.\n.\n.\n.\n.\nfailed to link";
        let mut failures = find_failures(text).expect("failures");
        rank_failures(&mut failures, SortOrder::Severity);
        let keywords: Vec<Keyword> = failures.iter().map(|f| f.keyword).collect();
        assert_eq!(keywords, vec![Keyword::Fatal, Keyword::Unexpected, Keyword::Failed]);

        rank_failures(&mut failures, SortOrder::FirstSeen);
        let keywords: Vec<Keyword> = failures.iter().map(|f| f.keyword).collect();
        assert_eq!(keywords, vec![Keyword::Unexpected, Keyword::Fatal, Keyword::Failed]);
    }

    #[test]
    fn test_rank_by_occurrences() {
        let once = "x\nx\nx\nfailed once\nx\nx\nx";
        let twice = "y\ny\ny\nerror twice\ny\ny\ny";
        let text = format!("{once}\n{twice}\n{twice}");
        let mut failures = find_failures(&text).expect("failures");
        assert_eq!(failures.len(), 2);

        rank_failures(&mut failures, SortOrder::Occurrences);
        assert_eq!(failures[0].keyword, Keyword::Error);
        assert_eq!(failures[0].line_numbers, vec![11, 18]);
        assert_eq!(failures[1].keyword, Keyword::Failed);
    }

    #[test]
    fn test_serializes_with_camel_case_fields() {
        let failures = find_failures("fatal: oops").expect("failure");
        let json = serde_json::to_value(&failures[0]).expect("serializable");
        assert_eq!(
            json,
            serde_json::json!({
                "lineNumbers": [1],
                "context": "fatal: oops",
                "keyword": "fatal",
                "severity": "critical",
                "occurrences": 1,
            })
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn occurrences_account_for_every_trigger(
            lines in proptest::collection::vec(
                prop_oneof![
                    Just("ok".to_string()),
                    Just("Error: boom".to_string()),
                    Just("job FAILED".to_string()),
                    "[a-z ]{0,12}",
                ],
                0..40,
            )
        ) {
            let text = lines.join("\n");
            let triggers: Vec<usize> = text
                .split('\n')
                .enumerate()
                .filter(|(_, line)| Keyword::detect(line).is_some())
                .map(|(i, _)| i + 1)
                .collect();

            match find_failures(&text) {
                None => prop_assert!(triggers.is_empty()),
                Some(failures) => {
                    prop_assert!(!failures.is_empty());
                    let mut seen: Vec<usize> = failures
                        .iter()
                        .flat_map(|f| f.line_numbers.iter().copied())
                        .collect();
                    seen.sort_unstable();
                    prop_assert_eq!(seen, triggers);

                    let mut keys = std::collections::HashSet::new();
                    for failure in &failures {
                        prop_assert_eq!(failure.occurrences, failure.line_numbers.len());
                        prop_assert!(failure.line_numbers.windows(2).all(|w| w[0] < w[1]));
                        prop_assert!(keys.insert(failure.context.to_ascii_lowercase()));
                    }
                }
            }
        }
    }
}
