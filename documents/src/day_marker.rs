//! Recognises the "day of month" marker in report template rows.
//!
//! A row belongs to day N when one of its cell paragraphs reads as N once
//! surrounding whitespace, trailing periods and leading zeros are removed
//! (`"7"`, `"07."`, `" 15 "`). When several paragraphs of a row qualify, the
//! last one scanned wins; templates rely on that ordering.

/// Parses one paragraph. `"0"` and `"00"` are not days.
pub fn parse_day_marker(text: &str) -> Option<u32> {
    let cleaned = text.trim().trim_end_matches('.').trim().trim_start_matches('0');
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

/// Day marker of a whole row given each cell's paragraph texts, in cell order.
pub fn row_day<C, P>(cells: C) -> Option<u32>
where
    C: IntoIterator<Item = P>,
    P: IntoIterator,
    P::Item: AsRef<str>,
{
    let mut day = None;
    for cell in cells {
        for paragraph in cell {
            if let Some(found) = parse_day_marker(paragraph.as_ref()) {
                tracing::trace!(day = found, "day marker");
                day = Some(found);
            }
        }
    }
    day
}
