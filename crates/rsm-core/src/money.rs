//! # Money and Ratios
//!
//! Amounts are integer minor units ([`Cents`]). Rates are basis points
//! (1 bps = 0.01 %). All arithmetic is checked: an amount that would
//! overflow `i64` is rejected rather than wrapped or saturated.

/// Monetary amount in minor units (two implied decimals).
pub type Cents = i64;

/// Parse a decimal string into cents.
///
/// - `"10000"` → `1_000_000` (whole units)
/// - `"1234.56"` → `123_456`
/// - `"4.5"` → `450`
/// - more than two decimals are truncated: `"0.019"` → `1`
///
/// Returns `None` for empty or unparseable input and on overflow.
pub fn parse_amount(s: &str) -> Option<Cents> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let (int_str, frac_str) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    if int_str.is_empty() && frac_str.is_empty() {
        return None;
    }
    if !int_str.chars().all(|c| c.is_ascii_digit())
        || !frac_str.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if int_str.is_empty() {
        0
    } else {
        int_str.parse().ok()?
    };

    let frac: i64 = match frac_str.len() {
        0 => 0,
        1 => frac_str.parse::<i64>().ok()? * 10,
        _ => frac_str[..2].parse().ok()?,
    };

    let cents = whole.checked_mul(100)?.checked_add(frac)?;
    Some(if negative { -cents } else { cents })
}

/// Format cents as a string with two decimal places.
///
/// `1_000_000` → `"10000.00"`, `450` → `"4.50"`, `-5` → `"-0.05"`.
pub fn format_amount(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Apply a basis-point rate to an amount, truncating toward zero.
///
/// `apply_rate_bps(10_000, 1600)` → `1_600` (16 % of 100.00).
pub fn apply_rate_bps(amount: Cents, rate_bps: i64) -> Option<Cents> {
    amount.checked_mul(rate_bps).map(|v| v / 10_000)
}

/// Multiply a unit price by a quantity.
pub fn line_total(unit_price: Cents, quantity: i64) -> Option<Cents> {
    unit_price.checked_mul(quantity)
}

/// `part / whole * 100`, rounded to two decimals.
///
/// Returns `0.0` when `whole` is zero or negative.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    let raw = part as f64 / whole as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_whole_number() {
        assert_eq!(parse_amount("10000"), Some(1_000_000));
        assert_eq!(parse_amount("0"), Some(0));
        assert_eq!(parse_amount("1"), Some(100));
    }

    #[test]
    fn parse_amount_decimal() {
        assert_eq!(parse_amount("100.50"), Some(10_050));
        assert_eq!(parse_amount("1234.56"), Some(123_456));
        assert_eq!(parse_amount("0.01"), Some(1));
        assert_eq!(parse_amount("4.5"), Some(450));
        assert_eq!(parse_amount(".5"), Some(50));
        assert_eq!(parse_amount("7."), Some(700));
    }

    #[test]
    fn parse_amount_truncates_extra_decimals() {
        assert_eq!(parse_amount("0.019"), Some(1));
        assert_eq!(parse_amount("2.999"), Some(299));
    }

    #[test]
    fn parse_amount_negative() {
        assert_eq!(parse_amount("-1.50"), Some(-150));
        assert_eq!(parse_amount("-0.50"), Some(-50));
    }

    #[test]
    fn parse_amount_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("   "), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("1.2.3"), None);
        assert_eq!(parse_amount("+5"), None);
        assert_eq!(parse_amount("."), None);
        assert_eq!(parse_amount("1e5"), None);
    }

    #[test]
    fn parse_amount_rejects_overflow() {
        assert_eq!(parse_amount("92233720368547759"), None);
    }

    #[test]
    fn format_amount_two_decimals() {
        assert_eq!(format_amount(1_000_000), "10000.00");
        assert_eq!(format_amount(450), "4.50");
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(1), "0.01");
        assert_eq!(format_amount(-5), "-0.05");
    }

    #[test]
    fn apply_rate_truncates() {
        assert_eq!(apply_rate_bps(10_000, 1600), Some(1_600));
        assert_eq!(apply_rate_bps(999, 1600), Some(159));
        assert_eq!(apply_rate_bps(i64::MAX, 2), None);
    }

    #[test]
    fn line_total_checked() {
        assert_eq!(line_total(250, 4), Some(1_000));
        assert_eq!(line_total(i64::MAX, 2), None);
    }

    #[test]
    fn percentage_zero_whole_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(10, 10), 100.0);
        assert_eq!(percentage(45, 60), 75.0);
    }
}
