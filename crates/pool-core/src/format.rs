//! Display formatting for monetary values and ratios (pt-BR conventions).

use rust_decimal::Decimal;

/// Format an amount as Brazilian reais, e.g. `R$ 1.234.567,89`.
pub fn format_currency(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let negative = rounded < Decimal::ZERO;
    pt_br(&format!("{:.2}", rounded.abs()), negative)
}

/// Same as [`format_currency`] for floating point values.
pub fn format_currency_f64(value: f64) -> String {
    if !value.is_finite() {
        return "R$ -".to_string();
    }
    pt_br(&format!("{:.2}", value.abs()), value < 0.0)
}

/// Format a ratio as a percentage: 0.0055 -> "0.55%".
pub fn format_percentage(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Compact currency with K/M/B suffixes: 1_500_000 -> "R$ 1.5M", -2_500 -> "-R$ 2.5K".
pub fn compact_currency(value: f64) -> String {
    let abs = value.abs();
    let sign = if value < 0.0 { "-" } else { "" };
    if abs >= 1e9 {
        format!("{sign}R$ {:.1}B", abs / 1e9)
    } else if abs >= 1e6 {
        format!("{sign}R$ {:.1}M", abs / 1e6)
    } else if abs >= 1e3 {
        format!("{sign}R$ {:.1}K", abs / 1e3)
    } else {
        format!("{sign}R$ {:.0}", abs)
    }
}

fn pt_br(plain: &str, negative: bool) -> String {
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain, "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if negative { "-" } else { "" };
    format!("{sign}R$ {grouped},{frac_part}")
}
