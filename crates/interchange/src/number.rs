//! Canonical number text.
//!
//! Every codec renders numbers through [`format_number`], so two engines
//! emit byte-identical output for the same value. The rule is the
//! ECMAScript `Number::toString` layout over the shortest round-tripping
//! digit string: plain decimals while the decimal exponent `n` satisfies
//! `-6 < n <= 21`, scientific notation (`1e+21`, `1.5e-7`) outside it.

/// Largest magnitude at which every integer is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Render a number canonically. `-0` renders as `0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "1.825e1".
    let sci = format!("{:e}", n.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exp: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let point = exp + 1;

    let mut out = String::with_capacity(digits.len() + 8);
    if n < 0.0 {
        out.push('-');
    }

    if k <= point && point <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((point - k) as usize));
    } else if 0 < point && point <= 21 {
        let (int_part, frac_part) = digits.split_at(point as usize);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    } else if -6 < point && point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-point) as usize));
        out.push_str(&digits);
    } else {
        let e = point - 1;
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        out.push('e');
        out.push(if e >= 0 { '+' } else { '-' });
        out.push_str(&e.abs().to_string());
    }
    out
}

/// The value as an `i64` when it is integral and exactly representable.
pub fn as_exact_i64(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Some(n as i64)
    } else {
        None
    }
}

/// Parse text that follows the JSON number grammar exactly. Anything else
/// (leading `+`, bare `.5`, hex, `NaN`, surrounding whitespace) is `None`.
pub fn parse_number(s: &str) -> Option<f64> {
    let b = s.as_bytes();
    let len = b.len();
    let mut i = 0;

    if i < len && b[i] == b'-' {
        i += 1;
    }
    if i >= len {
        return None;
    }
    if b[i] == b'0' {
        i += 1;
    } else if b[i].is_ascii_digit() {
        while i < len && b[i].is_ascii_digit() {
            i += 1;
        }
    } else {
        return None;
    }

    if i < len && b[i] == b'.' {
        i += 1;
        let start = i;
        while i < len && b[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return None;
        }
    }

    if i < len && (b[i] == b'e' || b[i] == b'E') {
        i += 1;
        if i < len && (b[i] == b'+' || b[i] == b'-') {
            i += 1;
        }
        let start = i;
        while i < len && b[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return None;
        }
    }

    if i != len {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
