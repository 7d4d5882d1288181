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

//! Rendering of findings for terminals and downstream tools.

use crate::triage::FailureRecord;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Output format for a set of findings.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human readable report
    #[default]
    Text,
    /// Pretty-printed JSON, `null` when nothing was found
    Json,
    /// Comma separated values with a header row
    Csv,
}

const CSV_COLUMNS: [&str; 5] = ["lineNumbers", "context", "keyword", "severity", "occurrences"];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Serialize findings as pretty JSON. "No failures" is `null`.
pub fn to_json(failures: Option<&[FailureRecord]>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&failures)
}

/// CSV for a single document: header row plus one row per failure.
/// Line numbers are joined with `;`. "No failures" is the header alone.
pub fn to_csv(failures: Option<&[FailureRecord]>) -> Result<String, ExportError> {
    write_csv(false, [("", failures)])
}

/// CSV for several documents, with a leading `source` column.
pub fn to_csv_by_source<'a, I>(documents: I) -> Result<String, ExportError>
where
    I: IntoIterator<Item = (&'a str, Option<&'a [FailureRecord]>)>,
{
    write_csv(true, documents)
}

fn write_csv<'a, I>(with_source: bool, documents: I) -> Result<String, ExportError>
where
    I: IntoIterator<Item = (&'a str, Option<&'a [FailureRecord]>)>,
{
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    let mut header = Vec::with_capacity(CSV_COLUMNS.len() + 1);
    if with_source {
        header.push("source");
    }
    header.extend(CSV_COLUMNS);
    writer.write_record(&header)?;

    for (source, failures) in documents {
        for failure in failures.unwrap_or_default() {
            let line_numbers = failure
                .line_numbers
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(";");
            let occurrences = failure.occurrences.to_string();

            let mut record = Vec::with_capacity(CSV_COLUMNS.len() + 1);
            if with_source {
                record.push(source);
            }
            record.extend([
                line_numbers.as_str(),
                failure.context.as_str(),
                failure.keyword.as_str(),
                failure.severity.as_str(),
                occurrences.as_str(),
            ]);
            writer.write_record(&record)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    // Every field came from a &str
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Terminal report, most useful with ranked findings.
#[must_use]
pub fn to_text(failures: Option<&[FailureRecord]>) -> String {
    let Some(failures) = failures else {
        return "No failures found.\n".to_string();
    };

    let mut out = String::new();
    for (i, failure) in failures.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let lines = failure
            .line_numbers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            out,
            "[{}] {} ({}x, line{} {})",
            failure.severity.as_str().to_uppercase(),
            failure.keyword,
            failure.occurrences,
            if failure.line_numbers.len() == 1 { "" } else { "s" },
            lines
        );
        for line in failure.context.split('\n') {
            let _ = writeln!(out, "    {line}");
        }
    }
    out
}

/// Render findings in the requested format.
pub fn render(
    format: OutputFormat,
    failures: Option<&[FailureRecord]>,
) -> Result<String, ExportError> {
    match format {
        OutputFormat::Text => Ok(to_text(failures)),
        OutputFormat::Json => {
            let mut json = to_json(failures)?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Csv => to_csv(failures),
    }
}
