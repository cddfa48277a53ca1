//! Quoting for commands sent to a remote `sh`.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// Prefix `command` with a change into `dir`. Each remote command runs in
/// a fresh shell, so the directory only applies to this one command.
pub fn in_dir(dir: &str, command: &str) -> String {
    format!("cd {} && {}", quote_path(dir), command)
}
