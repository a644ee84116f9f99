//! pt-BR presentation helpers for money and dates.

use chrono::NaiveDate;

const NBSP: char = '\u{a0}';
const CURRENCY_PREFIX: &str = "R$\u{a0}";

/// Compact suffixes, smallest first.
const SCALES: [(f64, &str); 4] = [(1e3, "mil"), (1e6, "mi"), (1e9, "bi"), (1e12, "tri")];

fn group_thousands(mut n: u64) -> String {
    let mut groups = Vec::new();
    loop {
        if n < 1000 {
            groups.push(n.to_string());
            break;
        }
        groups.push(format!("{:03}", n % 1000));
        n /= 1000;
    }
    groups.reverse();
    groups.join(".")
}

fn sign(cents: i64) -> &'static str {
    if cents < 0 { "-" } else { "" }
}

/// `4_500_000_000` cents becomes `R$ 45.000.000,00`.
pub fn currency(cents: i64) -> String {
    let abs = cents.unsigned_abs();
    format!(
        "{}{}{},{:02}",
        sign(cents),
        CURRENCY_PREFIX,
        group_thousands(abs / 100),
        abs % 100
    )
}

// Below 10 keep one decimal, otherwise whole units.
fn round_compact(value: f64) -> f64 {
    if value < 10.0 {
        (value * 10.0).round() / 10.0
    } else {
        value.round()
    }
}

fn decimal_text(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}").replace('.', ",")
    }
}

/// Short form used in column headers: `R$ 350 mil`, `R$ 1,2 mi`.
pub fn currency_compact(cents: i64) -> String {
    let units = cents.unsigned_abs() as f64 / 100.0;
    let mut scale = SCALES.iter().rposition(|(size, _)| units >= *size);
    let mut value = match scale {
        Some(i) => round_compact(units / SCALES[i].0),
        None => round_compact(units),
    };

    // Rounding can carry into the next magnitude (999.950 -> 1.000 mil).
    if value >= 1000.0 {
        let next = scale.map_or(0, |i| i + 1);
        if next < SCALES.len() {
            scale = Some(next);
            value = round_compact(units / SCALES[next].0);
        }
    }

    let body = decimal_text(value);
    match scale {
        Some(i) => format!("{}{}{}{}{}", sign(cents), CURRENCY_PREFIX, body, NBSP, SCALES[i].1),
        None => format!("{}{}{}", sign(cents), CURRENCY_PREFIX, body),
    }
}

/// `dd/mm` as shown on cards.
pub fn day_month(date: NaiveDate) -> String {
    date.format("%d/%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_currency_uses_brazilian_separators() {
        assert_eq!(currency(45_000_000), "R$\u{a0}450.000,00");
        assert_eq!(currency(123_456_789), "R$\u{a0}1.234.567,89");
        assert_eq!(currency(5), "R$\u{a0}0,05");
        assert_eq!(currency(0), "R$\u{a0}0,00");
        assert_eq!(currency(-150_000), "-R$\u{a0}1.500,00");
    }

    #[test]
    fn compact_currency_picks_a_suffix() {
        assert_eq!(currency_compact(35_000_000), "R$\u{a0}350\u{a0}mil");
        assert_eq!(currency_compact(120_000_000), "R$\u{a0}1,2\u{a0}mi");
        assert_eq!(currency_compact(250_000_000_000), "R$\u{a0}2,5\u{a0}bi");
        assert_eq!(currency_compact(50_000), "R$\u{a0}500");
        assert_eq!(currency_compact(0), "R$\u{a0}0");
    }

    #[test]
    fn compact_currency_rounds_before_choosing_the_suffix() {
        assert_eq!(currency_compact(99_995_000), "R$\u{a0}1\u{a0}mi");
        assert_eq!(currency_compact(99_900_000), "R$\u{a0}999\u{a0}mil");
        assert_eq!(currency_compact(1_250_000), "R$\u{a0}13\u{a0}mil");
        assert_eq!(currency_compact(100_000_000), "R$\u{a0}1\u{a0}mi");
        assert_eq!(currency_compact(99_999), "R$\u{a0}1\u{a0}mil");
    }

    #[test]
    fn day_month_pads() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        assert_eq!(day_month(date), "05/03");
    }
}
