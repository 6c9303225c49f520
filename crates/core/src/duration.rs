//! TTL duration parsing
//!
//! Accepts `"<value><unit>"` with optional whitespace between value and
//! unit, units `s`/`m`/`h`/`d`, decimals allowed. Bare numbers are taken as
//! milliseconds directly.

use crate::error::{StoreError, StoreResult};

/// Parse a human duration string into milliseconds.
///
/// ```
/// use basalt_core::duration::parse_duration_ms;
///
/// assert_eq!(parse_duration_ms("30s").unwrap(), 30_000);
/// assert_eq!(parse_duration_ms("1.5 h").unwrap(), 5_400_000);
/// assert_eq!(parse_duration_ms("250").unwrap(), 250);
/// ```
pub fn parse_duration_ms(input: &str) -> StoreResult<i64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(StoreError::invalid_duration(input));
    }

    let (value_part, multiplier) = match trimmed.chars().last() {
        Some('s') => (&trimmed[..trimmed.len() - 1], 1_000.0),
        Some('m') => (&trimmed[..trimmed.len() - 1], 60_000.0),
        Some('h') => (&trimmed[..trimmed.len() - 1], 3_600_000.0),
        Some('d') => (&trimmed[..trimmed.len() - 1], 86_400_000.0),
        _ => (trimmed, 1.0),
    };

    let value: f64 = value_part
        .trim()
        .parse()
        .map_err(|_| StoreError::invalid_duration(input))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(StoreError::invalid_duration(input));
    }

    let millis = value * multiplier;
    if !millis.is_finite() || millis > i64::MAX as f64 {
        return Err(StoreError::invalid_duration(input));
    }
    Ok(millis.round() as i64)
}
