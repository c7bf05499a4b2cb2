//! Human-readable byte sizes ("100MB", "1.5 gb") to byte counts.

use super::errors::SizeParseError;
use regex::Regex;
use std::sync::LazyLock;

static SIZE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*(b|kb|mb|gb|tb)$").expect("size pattern is valid")
});

/// Parse a size string into bytes using binary multiples (1 KB = 1024 B).
///
/// Fractional results are truncated toward zero. A result of zero bytes is
/// rejected, so `"0mb"` and `"0.0001b"` both fail with `OutOfRange`.
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let normalized = input.trim().to_lowercase();

    let captures = SIZE_REGEX
        .captures(&normalized)
        .ok_or_else(|| SizeParseError::InvalidFormat(normalized.clone()))?;

    let number = &captures[1];
    let value: f64 = number
        .parse()
        .map_err(|_| SizeParseError::InvalidNumber(number.to_string()))?;

    let multiplier: f64 = match &captures[2] {
        "b" => 1.0,
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        "tb" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        other => return Err(SizeParseError::InvalidFormat(other.to_string())),
    };

    let bytes = (value * multiplier).trunc();
    if !bytes.is_finite() || bytes < 1.0 || bytes > u64::MAX as f64 {
        return Err(SizeParseError::OutOfRange(normalized));
    }

    Ok(bytes as u64)
}
