//! Formatting helpers shared by the CLI commands.

use std::borrow::Cow;
use std::path::PathBuf;

/// Formats an uptime in seconds.
///
/// # Examples
///
/// ```
/// use lectern::utils::format_uptime;
///
/// assert_eq!(format_uptime(3661), "1h 1m 1s");
/// assert_eq!(format_uptime(61), "1m 1s");
/// assert_eq!(format_uptime(30), "30s");
/// ```
pub fn format_uptime(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    match (hours, minutes) {
        (0, 0) => format!("{}s", secs),
        (0, _) => format!("{}m {}s", minutes, secs),
        _ => format!("{}h {}m {}s", hours, minutes, secs),
    }
}

/// Formats a byte ceiling with binary units.
///
/// ```
/// use lectern::utils::format_size;
///
/// assert_eq!(format_size(52428800), "50 MB");
/// assert_eq!(format_size(1536), "1.5 KB");
/// ```
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Truncates to `max_len` characters, ending in "..." when cut.
pub fn truncate(s: &str, max_len: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_len {
        return Cow::Borrowed(s);
    }
    if max_len <= 3 {
        return Cow::Owned(s.chars().take(max_len).collect());
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    Cow::Owned(format!("{}...", kept))
}

/// Expands `~` in a lecture path given on the command line.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
