use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthChar;

pub const PLACEHOLDER: &str = "-";
const ELLIPSIS: &str = "..";
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Display width in terminal cells; East-Asian Full/Wide glyphs count as two.
pub fn display_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

/// Pads or truncates `text` so its display width is exactly `width`.
///
/// Truncated text ends with `..` inside the budget. A wide glyph that would
/// straddle the cut is dropped and the gap filled with a space.
pub fn pad(text: &str, width: usize) -> String {
    let full = display_width(text);
    if full <= width {
        let mut out = sanitize(text);
        out.extend(std::iter::repeat_n(' ', width - full));
        return out;
    }

    let marker = &ELLIPSIS[..ELLIPSIS.len().min(width)];
    let budget = width - marker.len();
    let mut out = String::with_capacity(width);
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = char_width(ch);
        if used + ch_width > budget {
            break;
        }
        out.push(if ch.is_control() { ' ' } else { ch });
        used += ch_width;
    }
    out.extend(std::iter::repeat_n(' ', budget - used));
    out.push_str(marker);
    out
}

/// Maps empty, whitespace-only and "not available" values to the placeholder.
pub fn normalize(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("n/a")
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("null")
    {
        return PLACEHOLDER.to_string();
    }
    trimmed.to_string()
}

pub fn opt<T: ToString>(value: Option<T>) -> String {
    value
        .map(|value| normalize(&value.to_string()))
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

pub fn format_uptime(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - since).num_seconds().max(0);
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{days}d {hours}h {minutes}m")
}

pub fn uptime_or_placeholder(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    since
        .map(|since| format_uptime(since, now))
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

pub fn gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

pub fn format_gib(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{:.1}", gib(bytes)),
        None => PLACEHOLDER.to_string(),
    }
}

pub fn percent(part: f64, total: f64) -> Option<f64> {
    (total > 0.0).then(|| (part / total * 100.0).clamp(0.0, 100.0))
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.1}%"),
        None => PLACEHOLDER.to_string(),
    }
}

pub fn yes_no(value: Option<bool>) -> String {
    match value {
        Some(true) => "Yes".to_string(),
        Some(false) => "No".to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

pub fn format_timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|value| {
            value
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

fn char_width(ch: char) -> usize {
    if ch.is_control() {
        return 1;
    }
    ch.width().unwrap_or(0)
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}
