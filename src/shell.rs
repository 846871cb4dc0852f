//! Helpers for emitting POSIX shell text.
//!
//! Every configuration value that reaches a rendered script goes
//! through [`quote`], so values containing `'`, `$`, backticks,
//! spaces or newlines reach the remote shell as literal data.

use std::fmt::Write;

/// Quote `value` as a single shell word.
///
/// The value is wrapped in single quotes; embedded single quotes
/// are closed, escaped and reopened (`'\''`).
///
/// ```
/// use trebuchet::shell::quote;
///
/// assert_eq!(quote("plain"), "'plain'");
/// assert_eq!(quote("it's"), r"'it'\''s'");
/// assert_eq!(quote(""), "''");
/// ```
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Render `NAME='value'` assignment lines, one per variable.
#[must_use]
pub fn assignments(vars: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (name, value) in vars {
        let _ = writeln!(out, "{name}={}", quote(value));
    }
    out
}

/// Render a command writing `content` verbatim to the file named by
/// the shell expression `target` (e.g. `"$DEPLOY_PATH/.env"`).
#[must_use]
pub fn write_file(target: &str, content: &str) -> String {
    format!("printf '%s' {} > {target}", quote(content))
}
