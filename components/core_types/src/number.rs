//! Number formatting and parsing per JavaScript conventions.

/// Format a double the way JavaScript `ToString` does.
///
/// Integer-valued doubles inside the safe printing range drop the
/// decimal point; otherwise `ryu` produces the shortest form that
/// round-trips.
pub fn format_f64(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        // Integral values print without a fractional part.
        if n.abs() < 9.007_199_254_740_992e15 {
            return format!("{}", n as i64);
        }
        let mut buf = ryu::Buffer::new();
        let s = buf.format(n);
        return s.trim_end_matches(".0").to_string();
    }
    let mut buf = ryu::Buffer::new();
    buf.format(n).to_string()
}

/// Parse a numeric source literal or `Number(string)` input.
///
/// Accepts decimal, hex (`0x`), octal (`0o`) and binary (`0b`) forms.
/// Returns `None` when the text is not a number.
pub fn parse_number_literal(text: &str) -> Option<f64> {
    let t = text.trim();
    if t.is_empty() {
        return Some(0.0);
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    if let Some(oct) = t.strip_prefix("0o").or_else(|| t.strip_prefix("0O")) {
        return u64::from_str_radix(oct, 8).ok().map(|v| v as f64);
    }
    if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        return u64::from_str_radix(bin, 2).ok().map(|v| v as f64);
    }
    if t == "Infinity" || t == "+Infinity" {
        return Some(f64::INFINITY);
    }
    if t == "-Infinity" {
        return Some(f64::NEG_INFINITY);
    }
    t.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_integers() {
        assert_eq!(format_f64(0.0), "0");
        assert_eq!(format_f64(-0.0), "0");
        assert_eq!(format_f64(42.0), "42");
        assert_eq!(format_f64(-7.0), "-7");
        assert_eq!(format_f64(5050.0), "5050");
    }

    #[test]
    fn test_format_specials() {
        assert_eq!(format_f64(f64::NAN), "NaN");
        assert_eq!(format_f64(f64::INFINITY), "Infinity");
        assert_eq!(format_f64(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_format_fractions() {
        assert_eq!(format_f64(1.5), "1.5");
        assert_eq!(format_f64(0.25), "0.25");
    }

    #[test]
    fn test_parse_radix_forms() {
        assert_eq!(parse_number_literal("0x10"), Some(16.0));
        assert_eq!(parse_number_literal("0b101"), Some(5.0));
        assert_eq!(parse_number_literal("0o17"), Some(15.0));
        assert_eq!(parse_number_literal("3.25"), Some(3.25));
        assert_eq!(parse_number_literal("junk"), None);
    }

    #[test]
    fn test_roundtrip_via_parse() {
        for v in [0.0, 1.0, -1.0, 1.5, 5050.0, 0.1, 1e21] {
            let s = format_f64(v);
            let back = parse_number_literal(&s).unwrap();
            assert_eq!(back, v, "round-trip failed for {}", s);
        }
    }
}
