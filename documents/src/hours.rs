//! Hour amounts: dot form internally, decimal comma in document text.

/// Parses a duration typed by a user. Accepts `1,5` as well as `1.5`.
///
/// Returns `None` for anything that is not a finite, non-negative number.
pub fn parse_hours(input: &str) -> Option<f64> {
    let value: f64 = input.trim().replace(',', ".").parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Formats hours for a document cell: `2.5` → `2,5h`, `2.0` → `2h`.
///
/// Values are rounded to two decimals first so float noise from summing
/// never reaches the document.
pub fn format_hours(hours: f64) -> String {
    format!("{}h", format_decimal(hours))
}

/// Decimal-comma rendering without the unit.
pub fn format_decimal(value: f64) -> String {
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    let trimmed = if trimmed == "-0" { "0" } else { trimmed };
    trimmed.replace('.', ",")
}
