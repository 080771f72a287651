/// Format a price with thousands separators: 1,234 or 1,234.56
pub fn price(val: f64) -> String {
    let negative = val < 0.0;
    let abs = val.abs();
    let rendered = if abs.fract() == 0.0 {
        format!("{abs:.0}")
    } else {
        format!("{abs:.2}")
    };
    let (int_part, dec_part) = match rendered.split_once('.') {
        Some((i, d)) => (i, Some(d)),
        None => (rendered.as_str(), None),
    };

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let mut out: String = with_commas.chars().rev().collect();
    if let Some(dec) = dec_part {
        out.push('.');
        out.push_str(dec);
    }
    if negative {
        out.insert(0, '-');
    }
    out
}

/// Unknown prices and amounts render as a dash.
pub fn opt_price(val: Option<f64>) -> String {
    val.map(price).unwrap_or_else(|| "-".to_string())
}

/// Quantities keep their natural form: 3, 2.5
pub fn quantity(val: Option<f64>) -> String {
    match val {
        Some(q) if q.fract() == 0.0 => format!("{q:.0}"),
        Some(q) => q.to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_formatting() {
        assert_eq!(price(1234.56), "1,234.56");
        assert_eq!(price(-500.0), "-500");
        assert_eq!(price(0.0), "0");
        assert_eq!(price(1000000.0), "1,000,000");
        assert_eq!(price(42.1), "42.10");
        assert_eq!(price(120.0), "120");
    }

    #[test]
    fn test_unknown_values() {
        assert_eq!(opt_price(None), "-");
        assert_eq!(opt_price(Some(3600.0)), "3,600");
        assert_eq!(quantity(None), "-");
        assert_eq!(quantity(Some(3.0)), "3");
        assert_eq!(quantity(Some(2.5)), "2.5");
    }
}
