use serde::Deserialize;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// `limit`/`offset` query parameters, clamped before reaching SQL.
#[derive(Debug, Default, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Whether rows remain past this page out of `total`.
    pub fn has_more(&self, total: i64) -> bool {
        self.offset().saturating_add(self.limit()) < total
    }
}

/// Turns a user-supplied needle into an `ILIKE` pattern matching it as a
/// literal substring. Blank needles mean "no filter"; anything else is
/// matched as given, surrounding whitespace included.
pub fn contains_pattern(needle: Option<&str>) -> Option<String> {
    let needle = needle?;
    if needle.trim().is_empty() {
        return None;
    }

    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}
