//! Human-readable byte rendering for status messages.

const DECIMAL_UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Render a byte count with decimal (base 1000) units.
///
/// At most two fraction digits are shown and trailing zeros are dropped, so
/// `1_500_000_000` renders as `"1.5 GB"` and `2_000_000_000` as `"2 GB"`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    #[allow(clippy::cast_precision_loss)]
    let mut scaled = bytes as f64;
    let mut unit = 0;
    while scaled >= 1000.0 && unit < DECIMAL_UNITS.len() - 1 {
        scaled /= 1000.0;
        unit += 1;
    }

    let rounded = format!("{scaled:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", DECIMAL_UNITS[unit])
}
