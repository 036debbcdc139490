//! Duration literals for CLI flags (`5s`, `1m`, `250ms`).

use std::time::Duration;

/// Parse a human duration literal.
///
/// Accepted suffixes: `ms`, `s`, `m`, `h`. A bare integer is taken as
/// milliseconds. Fractions are not supported; `90s` covers what `1.5m`
/// would.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }

    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split_at);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{trimmed}'"))?;

    let millis = match suffix {
        "" | "ms" => value,
        "s" => value.saturating_mul(1_000),
        "m" => value.saturating_mul(60_000),
        "h" => value.saturating_mul(3_600_000),
        other => return Err(format!("unknown duration suffix '{other}' in '{trimmed}'")),
    };

    Ok(Duration::from_millis(millis))
}
