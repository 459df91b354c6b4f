use std::fmt::Write;

use crate::Error;

/// Renders an error as `path:line:column: message`, followed by the offending
/// source line with the span underlined.
pub fn render(src: &str, path: &str, error: &Error) -> String {
    let span = error.span();
    let pos = span.position(src);

    let lo = span.lo.min(src.len());
    let line_start = src[..lo].rfind('\n').map_or(0, |i| i + 1);
    let line_end = src[lo..].find('\n').map_or(src.len(), |i| lo + i);
    let line = &src[line_start..line_end];

    let hi = span.hi().clamp(lo, line_end);
    let marks = src[lo..hi].chars().count().max(1);

    let mut out = String::with_capacity(line.len() * 2 + 64);
    _ = writeln!(out, "{path}:{pos}: {error}");
    _ = writeln!(out, "{line}");
    _ = writeln!(out, "{:pad$}{:^<marks$}", "", "", pad = pos.column - 1);
    out
}
