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

//! Removal of the repository checkout banner.
//!
//! `actions/checkout` wraps its output in a collapsible group whose git chatter
//! (`error: ...` lines from harmless fetch retries, hint messages) would
//! otherwise show up as failures.

use std::borrow::Cow;

/// Opening marker of the checkout group.
pub const FETCH_GROUP_START: &str = "##[group]Fetching the repository";
/// Closing marker of any group.
pub const GROUP_END: &str = "##[endgroup]";

/// Remove the first checkout group, from its opening marker through the next
/// `##[endgroup]`, both markers included.
///
/// Only the first such group is removed; later ones stay in the text. Without
/// an opening marker, or without a closing marker after it, the text is
/// returned unchanged.
#[must_use]
pub fn excise_fetch_banner(text: &str) -> Cow<'_, str> {
    let Some(start) = text.find(FETCH_GROUP_START) else {
        return Cow::Borrowed(text);
    };
    let body = start + FETCH_GROUP_START.len();
    let Some(close) = text[body..].find(GROUP_END) else {
        tracing::debug!("Checkout group is never closed, keeping it");
        return Cow::Borrowed(text);
    };
    let end = body + close + GROUP_END.len();

    tracing::debug!(bytes = end - start, "Excised checkout group");

    let mut excised = String::with_capacity(text.len() - (end - start));
    excised.push_str(&text[..start]);
    excised.push_str(&text[end..]);
    Cow::Owned(excised)
}
