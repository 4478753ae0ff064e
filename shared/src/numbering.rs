//! Document numbering for vouchers and receipts
//!
//! Numbers are a textual prefix followed by a zero-padded sequence, e.g.
//! `INV001`, `PINV042`, `REC1000`. The sequence grows past the pad width
//! rather than wrapping.

/// Default pad width for the numeric part
pub const DEFAULT_NUMBER_WIDTH: usize = 3;

/// Parse the numeric suffix of `number` if it starts with `prefix`
///
/// Returns `None` when the prefix does not match or the remainder is not
/// purely numeric. `PINV001` therefore does not parse under prefix `INV`.
pub fn parse_suffix(prefix: &str, number: &str) -> Option<u64> {
    let rest = number.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Format a document number
pub fn format_number(prefix: &str, sequence: u64, width: usize) -> String {
    format!("{}{:0width$}", prefix, sequence, width = width)
}

/// Next sequence value given the numbers already issued under `prefix`
///
/// Numbers that do not parse under the prefix are ignored. Returns `None`
/// when the highest issued suffix is already `u64::MAX`.
pub fn next_from_existing<'a, I>(prefix: &str, numbers: I) -> Option<u64>
where
    I: IntoIterator<Item = &'a str>,
{
    numbers
        .into_iter()
        .filter_map(|n| parse_suffix(prefix, n))
        .max()
        .unwrap_or(0)
        .checked_add(1)
}

/// Validate a number prefix (1-8 uppercase ASCII letters)
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.len() <= 8 && prefix.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffix() {
        assert_eq!(parse_suffix("INV", "INV001"), Some(1));
        assert_eq!(parse_suffix("INV", "INV1234"), Some(1234));
        assert_eq!(parse_suffix("INV", "PINV001"), None);
        assert_eq!(parse_suffix("INV", "INV"), None);
        assert_eq!(parse_suffix("INV", "INV-12"), None);
        assert_eq!(parse_suffix("REC", "rec001"), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number("INV", 1, 3), "INV001");
        assert_eq!(format_number("PINV", 42, 3), "PINV042");
        assert_eq!(format_number("REC", 1000, 3), "REC1000");
    }

    #[test]
    fn test_next_from_existing_ignores_other_prefixes() {
        let issued = ["INV001", "INV009", "PINV050", "INV010", "garbage"];
        assert_eq!(next_from_existing("INV", issued.iter().copied()), Some(11));
        assert_eq!(next_from_existing("PINV", issued.iter().copied()), Some(51));
        assert_eq!(next_from_existing("CN", issued.iter().copied()), Some(1));
    }

    #[test]
    fn test_next_from_existing_at_limit() {
        let max = format!("INV{}", u64::MAX);
        let below = format!("INV{}", u64::MAX - 1);
        assert_eq!(next_from_existing("INV", [below.as_str()]), Some(u64::MAX));
        assert_eq!(next_from_existing("INV", [below.as_str(), max.as_str()]), None);
        // Past u64 the suffix does not parse and is skipped
        assert_eq!(next_from_existing("INV", ["INV99999999999999999999", "INV004"]), Some(5));
    }

    #[test]
    fn test_prefix_validation() {
        assert!(is_valid_prefix("INV"));
        assert!(!is_valid_prefix(""));
        assert!(!is_valid_prefix("inv"));
        assert!(!is_valid_prefix("INV1"));
    }
}
