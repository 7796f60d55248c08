//! Shared revenue / margin / growth arithmetic and display formatting.
//!
//! Every handler goes through these functions so that the zero-division policy and the
//! rounding convention are identical everywhere: values are kept at full precision and
//! rounded only when formatted (percentages to 1 decimal, crores to 2 decimals).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const CRORE: f64 = 10_000_000.0;
pub const CURRENCY_SYMBOL: &str = "₹";

/// `margin / revenue * 100`, or `0` when there is no positive revenue.
pub fn margin_percent(revenue: f64, margin: f64) -> f64 {
    if revenue > 0.0 {
        margin / revenue * 100.0
    } else {
        0.0
    }
}

/// Period-over-period change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Growth {
    Percent(f64),
    /// Nothing in the previous period, something now.
    New,
}

impl Growth {
    pub fn percent(self) -> Option<f64> {
        match self {
            Growth::Percent(value) => Some(value),
            Growth::New => None,
        }
    }

    /// Sort key: `New` ranks above any finite growth.
    pub fn rank_value(self) -> f64 {
        match self {
            Growth::Percent(value) => value,
            Growth::New => f64::INFINITY,
        }
    }

    pub fn is_decline(self) -> bool {
        matches!(self, Growth::Percent(value) if value < 0.0)
    }
}

impl fmt::Display for Growth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Growth::New => f.write_str("New"),
            Growth::Percent(value) => {
                let rounded = (value * 10.0).round() / 10.0;
                if rounded > 0.0 {
                    write!(f, "+{:.1}%", rounded)
                } else if rounded == 0.0 {
                    f.write_str("0.0%")
                } else {
                    write!(f, "{:.1}%", rounded)
                }
            }
        }
    }
}

/// `(current - previous) / previous * 100` with the shared zero policy:
/// a previous value of zero with a positive current value is `New`; any other
/// non-positive previous value is `0%`.
pub fn growth_percent(current: f64, previous: f64) -> Growth {
    if previous > 0.0 {
        Growth::Percent((current - previous) / previous * 100.0)
    } else if previous == 0.0 && current > 0.0 {
        Growth::New
    } else {
        Growth::Percent(0.0)
    }
}

pub fn growth_delta(current: f64, previous: f64) -> f64 {
    current - previous
}

/// `part / total * 100`, or `0` when the total is not positive.
pub fn share_percent(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

pub fn to_crores(value: f64) -> f64 {
    value / CRORE
}

/// Universal monetary display: `₹12.34 Cr`.
///
/// Amounts too small to show up at two crore decimals also carry the exact base value,
/// e.g. `₹0.00 Cr (₹300.00)`.
pub fn format_crores(value: f64) -> String {
    let crores = to_crores(value);
    let rendered = format!("{}{:.2} Cr", CURRENCY_SYMBOL, crores);
    if value != 0.0 && crores.abs() < 0.005 {
        format!("{} ({}{:.2})", rendered, CURRENCY_SYMBOL, value)
    } else {
        rendered
    }
}

/// Signed crore delta, `+₹1.20 Cr` / `-₹0.40 Cr`.
pub fn format_crore_delta(delta: f64) -> String {
    if delta >= 0.0 {
        format!("+{}", format_crores(delta))
    } else {
        format!("-{}", format_crores(-delta))
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Which number a ranking or answer is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Revenue,
    Margin,
    MarginPercent,
    Transactions,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::Revenue => "Revenue",
            Metric::Margin => "Margin",
            Metric::MarginPercent => "GM%",
            Metric::Transactions => "Transactions",
        }
    }

    /// Formats a value of this metric for display.
    pub fn format(self, value: f64) -> String {
        match self {
            Metric::Revenue | Metric::Margin => format_crores(value),
            Metric::MarginPercent => format_percent(value),
            Metric::Transactions => format!("{}", value.round() as i64),
        }
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// The `n` items with the highest `key`, highest first. The sort is stable, so ties
/// keep their input order.
pub fn top_n<T, F>(items: &[T], n: usize, key: F) -> Vec<&T>
where
    F: Fn(&T) -> f64,
{
    let mut ranked: Vec<&T> = items.iter().collect();
    ranked.sort_by(|a, b| descending(key(a), key(b)));
    ranked.truncate(n);
    ranked
}

/// The `n` items with the lowest `key`, lowest first; stable on ties.
pub fn bottom_n<T, F>(items: &[T], n: usize, key: F) -> Vec<&T>
where
    F: Fn(&T) -> f64,
{
    let mut ranked: Vec<&T> = items.iter().collect();
    ranked.sort_by(|a, b| descending(key(b), key(a)));
    ranked.truncate(n);
    ranked
}

/// Share of the total held by the `k` largest values.
pub fn top_share(values: &[f64], k: usize) -> f64 {
    let total: f64 = values.iter().sum();
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| descending(*a, *b));
    let top: f64 = sorted.iter().take(k).sum();
    share_percent(top, total)
}

/// Herfindahl–Hirschman index on percentage shares (0–10,000).
pub fn herfindahl_index(values: &[f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    values
        .iter()
        .map(|value| {
            let share = value / total * 100.0;
            share * share
        })
        .sum()
}

/// How heavily a total leans on its single largest contributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyLevel {
    High,
    Moderate,
    Low,
}

impl DependencyLevel {
    pub fn from_share(share: f64) -> Self {
        if share > 50.0 {
            DependencyLevel::High
        } else if share > 25.0 {
            DependencyLevel::Moderate
        } else {
            DependencyLevel::Low
        }
    }
}

impl fmt::Display for DependencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DependencyLevel::High => "High",
            DependencyLevel::Moderate => "Moderate",
            DependencyLevel::Low => "Low",
        };
        f.write_str(text)
    }
}

/// Percentage of `values` strictly below `value`.
pub fn percentile_rank(values: &[f64], value: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let below = values.iter().filter(|v| **v < value).count();
    below as f64 / values.len() as f64 * 100.0
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_percent_zero_revenue() {
        assert_eq!(margin_percent(0.0, 50.0), 0.0);
        assert_eq!(margin_percent(-10.0, 5.0), 0.0);
        assert!((margin_percent(200.0, 50.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_growth_labels() {
        assert_eq!(growth_percent(5.0, 0.0).to_string(), "New");
        assert_eq!(growth_percent(0.0, 0.0).to_string(), "0.0%");
        assert_eq!(growth_percent(80.0, 100.0).to_string(), "-20.0%");
        assert_eq!(growth_percent(200.0, 100.0).to_string(), "+100.0%");
        assert_eq!(growth_percent(-5.0, 0.0).to_string(), "0.0%");
        assert_eq!(growth_percent(100.0, 100.0).to_string(), "0.0%");
    }

    #[test]
    fn test_growth_rank_value() {
        assert!(Growth::New.rank_value() > Growth::Percent(1e9).rank_value());
        assert!(growth_percent(50.0, 100.0).is_decline());
        assert!(!Growth::New.is_decline());
    }

    #[test]
    fn test_format_crores() {
        assert_eq!(format_crores(123_400_000.0), "₹12.34 Cr");
        assert_eq!(format_crores(0.0), "₹0.00 Cr");
        assert_eq!(format_crores(300.0), "₹0.00 Cr (₹300.00)");
        assert_eq!(format_crore_delta(-20_000_000.0), "-₹2.00 Cr");
        assert_eq!(format_crore_delta(20_000_000.0), "+₹2.00 Cr");
    }

    #[test]
    fn test_top_n_is_stable() {
        let items = vec![("a", 10.0), ("b", 30.0), ("c", 10.0), ("d", 30.0), ("e", 5.0)];
        let first: Vec<&str> = top_n(&items, 3, |i| i.1).iter().map(|i| i.0).collect();
        let second: Vec<&str> = top_n(&items, 3, |i| i.1).iter().map(|i| i.0).collect();
        assert_eq!(first, vec!["b", "d", "a"]);
        assert_eq!(first, second);

        let bottom: Vec<&str> = bottom_n(&items, 2, |i| i.1).iter().map(|i| i.0).collect();
        assert_eq!(bottom, vec!["e", "a"]);
    }

    #[test]
    fn test_concentration_helpers() {
        let values = [60.0, 30.0, 10.0];
        assert!((top_share(&values, 1) - 60.0).abs() < 1e-9);
        assert!((herfindahl_index(&values) - 4600.0).abs() < 1e-6);
        assert_eq!(DependencyLevel::from_share(60.0), DependencyLevel::High);
        assert_eq!(DependencyLevel::from_share(30.0), DependencyLevel::Moderate);
        assert_eq!(DependencyLevel::from_share(10.0), DependencyLevel::Low);
        assert!((percentile_rank(&values, 30.0) - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_metric_format() {
        assert_eq!(Metric::Transactions.format(12.0), "12");
        assert_eq!(Metric::MarginPercent.format(23.456), "23.5%");
    }
}
