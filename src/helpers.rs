/// Longest free-text value accepted from a form field.
pub const MAX_FIELD_CHARS: usize = 100;

/// Cuts a user supplied value down to [`MAX_FIELD_CHARS`] characters.
pub fn truncate(value: &str) -> String {
    value.chars().take(MAX_FIELD_CHARS).collect()
}

/// Shapes a typed-in ticket id for lookup: trimmed, truncated, upper case.
pub fn normalize_id(value: &str) -> String {
    truncate(value.trim()).to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("short"), "short");
        let long = "æ".repeat(120);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), MAX_FIELD_CHARS);
        assert_eq!(cut.len(), MAX_FIELD_CHARS * 2);
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("  ig18ab0z \n"), "IG18AB0Z");
    }
}
