use crate::errors::CoreError;

/// Parses a free-text duration into whole seconds.
///
/// Accepted forms, in order:
/// 1. All digits: whole seconds (`"90"` → 90).
/// 2. `NhNmNs` groups, each optional but at least one present, optional
///    whitespace between groups, case-insensitive (`"1h 30m 15s"` → 5415).
///
/// Anything left over after the grammar fails the whole input, and the total
/// must be greater than zero.
pub fn parse_duration_spec(input: &str) -> Result<u64, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidFormat("empty input".into()));
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let seconds: u64 = trimmed
            .parse()
            .map_err(|_| CoreError::InvalidFormat(format!("'{trimmed}' is out of range")))?;
        if seconds == 0 {
            return Err(CoreError::InvalidFormat("non-positive".into()));
        }
        return Ok(seconds);
    }

    let mut rest = trimmed;
    let mut total: u64 = 0;
    let mut matched = false;
    for (unit, multiplier) in [('h', 3600), ('m', 60), ('s', 1)] {
        if let Some((value, remainder)) = take_group(rest, unit) {
            total = value
                .checked_mul(multiplier)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(|| CoreError::InvalidFormat(format!("'{trimmed}' is out of range")))?;
            matched = true;
            rest = remainder;
        }
    }

    if !matched || !rest.trim_start().is_empty() {
        return Err(CoreError::InvalidFormat(format!(
            "'{trimmed}' is not a duration like 10s, 5m, 1h 30m or 90"
        )));
    }
    if total == 0 {
        return Err(CoreError::InvalidFormat("non-positive".into()));
    }
    Ok(total)
}

/// Consumes leading whitespace, digits and the given unit suffix. Returns
/// `None` without consuming anything when the next group is not `<digits><unit>`.
fn take_group(input: &str, unit: char) -> Option<(u64, &str)> {
    let stripped = input.trim_start();
    let digits_end = stripped
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)?;
    if digits_end == 0 {
        return None;
    }
    let mut chars = stripped[digits_end..].chars();
    let suffix = chars.next()?;
    if !suffix.eq_ignore_ascii_case(&unit) {
        return None;
    }
    let value: u64 = stripped[..digits_end].parse().ok()?;
    Some((value, chars.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<u64, CoreError> {
        parse_duration_spec(input)
    }

    // ── plain seconds ─────────────────────────────────────────────────────────

    #[test]
    fn all_digits_are_seconds() {
        assert_eq!(parse("90").unwrap(), 90);
        assert_eq!(parse("1").unwrap(), 1);
    }

    #[test]
    fn zero_seconds_is_rejected() {
        assert!(matches!(parse("0"), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn negative_is_rejected() {
        assert!(matches!(parse("-5"), Err(CoreError::InvalidFormat(_))));
    }

    // ── h/m/s groups ──────────────────────────────────────────────────────────

    #[test]
    fn full_group_form() {
        assert_eq!(parse("1h 30m 15s").unwrap(), 5415);
    }

    #[test]
    fn single_groups() {
        assert_eq!(parse("2h").unwrap(), 7200);
        assert_eq!(parse("5m").unwrap(), 300);
        assert_eq!(parse("10s").unwrap(), 10);
    }

    #[test]
    fn groups_without_whitespace() {
        assert_eq!(parse("1h30m").unwrap(), 5400);
        assert_eq!(parse("1h15s").unwrap(), 3615);
    }

    #[test]
    fn case_and_padding_are_ignored() {
        assert_eq!(parse("  2H 5M  ").unwrap(), 7500);
    }

    #[test]
    fn zero_total_from_groups_is_rejected() {
        assert!(matches!(parse("0h 0m 0s"), Err(CoreError::InvalidFormat(_))));
    }

    // ── rejected inputs ───────────────────────────────────────────────────────

    #[test]
    fn empty_input_fails() {
        assert!(matches!(parse(""), Err(CoreError::InvalidFormat(_))));
        assert!(matches!(parse("   "), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn out_of_order_groups_fail() {
        assert!(parse("30m 1h").is_err());
        assert!(parse("5s 5m").is_err());
    }

    #[test]
    fn trailing_junk_fails() {
        assert!(parse("1h 30m banana").is_err());
        assert!(parse("90x").is_err());
        assert!(parse("1h5").is_err());
    }

    #[test]
    fn unknown_units_fail() {
        assert!(parse("3d").is_err());
        assert!(parse("1hour").is_err());
    }

    #[test]
    fn overflow_is_an_error_not_a_panic() {
        assert!(parse("99999999999999999999").is_err());
        assert!(parse("9999999999999999999h").is_err());
    }
}
