//! Minimal POSIX shell quoting for commands executed inside containers

/// Quote a string for safe interpolation into a `/bin/bash -lc` command line.
///
/// Strings made of plain word characters pass through unchanged; anything
/// else is single-quoted with embedded single quotes escaped.
pub fn quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r#"'\''"#))
}
