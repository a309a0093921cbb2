//! Shared utility helpers.

use std::borrow::Cow;

/// Split command output into its non-empty, trimmed lines.
///
/// Enumeration-style `dsjob` selectors (`-ljobs`, `-lstages`, ...) print
/// one item per line, sometimes with trailing blanks or CRLF endings.
pub fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Clip captured output for log lines: at most `max` bytes, cut on a char
/// boundary and marked with `…`.  Short input is borrowed as-is.
pub fn truncate_str(s: &str, max: usize) -> Cow<'_, str> {
    if s.len() <= max {
        return Cow::Borrowed(s);
    }
    let end = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    Cow::Owned(format!("{}…", &s[..end]))
}
