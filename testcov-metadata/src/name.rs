// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Returns true if `c` may appear in a sanitized name.
#[inline]
pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')
}

/// Rewrites `input` so that it only contains characters in `[A-Za-z0-9._-]`.
///
/// Every maximal run of other characters is replaced by a single `-`, so `a::b` becomes `a-b`
/// and `case[1, 2]` becomes `case-1-2-`. This is total: any input, including the empty string,
/// produces a valid name.
pub fn sanitize_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;
    for c in input.chars() {
        if is_name_char(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }
    out
}
