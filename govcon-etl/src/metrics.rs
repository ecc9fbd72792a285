//! Derived metrics: market concentration, top-N breakdowns, iceberg score
//!
//! The thresholds below are fixed product heuristics. They are kept as
//! literal constants and must not be tuned without product sign-off.

use govcon_common::db::CategoryShare;
use std::collections::HashMap;

/// Raw HHI above which concentration risk is "high"
pub const HHI_HIGH_RISK: f64 = 5000.0;
/// Raw HHI above which concentration risk is "medium"
pub const HHI_MEDIUM_RISK: f64 = 2500.0;

/// Categories reported in a top-N breakdown
pub const TOP_N: usize = 3;

pub const ICEBERG_RATIO_WEIGHT: f64 = 20.0;
pub const ICEBERG_HIDDEN_PCT_FLOOR: f64 = 50.0;
pub const ICEBERG_HIGH_TIER: f64 = 75.0;
pub const ICEBERG_MEDIUM_TIER: f64 = 50.0;

/// Category → revenue
pub type RevenueBreakdown = HashMap<String, f64>;

/// Sum of positive revenues
fn positive_total(breakdown: &RevenueBreakdown) -> f64 {
    breakdown.values().filter(|v| **v > 0.0).sum()
}

/// Herfindahl-Hirschman Index on the 0-10,000 scale (sum of squared percentages)
pub fn raw_hhi(breakdown: &RevenueBreakdown) -> f64 {
    let total = positive_total(breakdown);
    if total <= 0.0 {
        return 0.0;
    }

    breakdown
        .values()
        .filter(|v| **v > 0.0)
        .map(|v| {
            let share = v / total * 100.0;
            share * share
        })
        .sum()
}

/// Concentration score in 0-1
pub fn hhi(breakdown: &RevenueBreakdown) -> f64 {
    raw_hhi(breakdown) / 10_000.0
}

/// Risk level for a raw (0-10,000) index
pub fn concentration_risk(raw: f64) -> &'static str {
    if raw > HHI_HIGH_RISK {
        "high"
    } else if raw > HHI_MEDIUM_RISK {
        "medium"
    } else {
        "low"
    }
}

/// Largest `n` categories by revenue with their share of total
///
/// Zero and negative revenues are excluded. Ties order by category name.
pub fn top_categories(breakdown: &RevenueBreakdown, n: usize) -> Vec<CategoryShare> {
    let total = positive_total(breakdown);
    if total <= 0.0 {
        return Vec::new();
    }

    let mut entries: Vec<(&String, f64)> = breakdown
        .iter()
        .filter(|(_, v)| **v > 0.0)
        .map(|(k, v)| (k, *v))
        .collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    entries
        .into_iter()
        .take(n)
        .map(|(category, revenue)| CategoryShare {
            category: category.clone(),
            revenue,
            percentage: revenue / total * 100.0,
        })
        .collect()
}

/// Prime vs. subcontract revenue split and its opportunity score
#[derive(Debug, Clone, PartialEq)]
pub struct IcebergScore {
    pub prime_revenue: f64,
    pub sub_revenue: f64,
    pub total_revenue: f64,
    /// `None` when prime revenue is not positive
    pub sub_to_prime_ratio: Option<f64>,
    pub hidden_revenue_pct: f64,
    pub score: f64,
    pub tier: &'static str,
}

/// Hidden revenue share: subcontract revenue / total × 100, 0 when total is 0
///
/// Bounded to 0-100; negative prime revenue (deobligations) would otherwise
/// push the share past 100.
pub fn hidden_revenue_pct(sub_revenue: f64, total_revenue: f64) -> f64 {
    if total_revenue > 0.0 {
        (sub_revenue / total_revenue * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Opportunity score (0-100) from the sub-to-prime ratio and hidden share
pub fn iceberg_score_from(ratio: Option<f64>, hidden_pct: f64) -> f64 {
    let score = match ratio {
        Some(r) if r > 1.0 => r * ICEBERG_RATIO_WEIGHT + hidden_pct,
        _ if hidden_pct > ICEBERG_HIDDEN_PCT_FLOOR => hidden_pct,
        _ => 0.0,
    };
    score.clamp(0.0, 100.0)
}

pub fn iceberg_tier(score: f64) -> &'static str {
    if score >= ICEBERG_HIGH_TIER {
        "high"
    } else if score >= ICEBERG_MEDIUM_TIER {
        "medium"
    } else {
        "low"
    }
}

pub fn iceberg_score(prime_revenue: f64, sub_revenue: f64) -> IcebergScore {
    let total_revenue = prime_revenue + sub_revenue;
    let sub_to_prime_ratio = (prime_revenue > 0.0).then(|| sub_revenue / prime_revenue);
    let hidden = hidden_revenue_pct(sub_revenue, total_revenue);
    let score = iceberg_score_from(sub_to_prime_ratio, hidden);

    IcebergScore {
        prime_revenue,
        sub_revenue,
        total_revenue,
        sub_to_prime_ratio,
        hidden_revenue_pct: hidden,
        score,
        tier: iceberg_tier(score),
    }
}

/// Arithmetic mean, `None` for no values
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(entries: &[(&str, f64)]) -> RevenueBreakdown {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_hhi_zero_total_is_zero() {
        let b = breakdown(&[("DOD", 0.0), ("VA", 0.0)]);
        assert_eq!(hhi(&b), 0.0);
        assert_eq!(hhi(&RevenueBreakdown::new()), 0.0);
        assert!(top_categories(&b, TOP_N).is_empty());
    }

    #[test]
    fn test_hhi_single_category_is_one() {
        let b = breakdown(&[("DOD", 5_000_000.0)]);
        assert!((hhi(&b) - 1.0).abs() < 1e-9);

        let top = top_categories(&b, TOP_N);
        assert_eq!(top.len(), 1);
        assert!((top[0].percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_hhi_even_split() {
        let b = breakdown(&[("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0)]);
        // 4 × 25² = 2500
        assert!((raw_hhi(&b) - 2500.0).abs() < 1e-9);
        assert!((hhi(&b) - 0.25).abs() < 1e-9);
        assert_eq!(concentration_risk(raw_hhi(&b)), "low");
    }

    #[test]
    fn test_concentration_risk_cutoffs() {
        assert_eq!(concentration_risk(5000.1), "high");
        assert_eq!(concentration_risk(5000.0), "medium");
        assert_eq!(concentration_risk(2500.1), "medium");
        assert_eq!(concentration_risk(2500.0), "low");
        assert_eq!(concentration_risk(0.0), "low");
    }

    #[test]
    fn test_top_categories_order_and_exclusion() {
        let b = breakdown(&[
            ("VA", 200.0),
            ("DOD", 500.0),
            ("GSA", 200.0),
            ("NASA", 100.0),
            ("DOE", 0.0),
        ]);
        let top = top_categories(&b, TOP_N);

        let names: Vec<_> = top.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(names, vec!["DOD", "GSA", "VA"]);
        assert!((top[0].percentage - 50.0).abs() < 1e-9);
        assert!((top[1].percentage - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_iceberg_ratio_above_one() {
        // ratio 2.0, hidden 40 → min(100, 2.0 × 20 + 40) = 80
        let score = iceberg_score_from(Some(2.0), 40.0);
        assert!((score - 80.0).abs() < 1e-9);
        assert_eq!(iceberg_tier(score), "high");
    }

    #[test]
    fn test_iceberg_score_is_capped() {
        let s = iceberg_score(100.0, 900.0);
        assert_eq!(s.sub_to_prime_ratio, Some(9.0));
        assert!((s.hidden_revenue_pct - 90.0).abs() < 1e-9);
        assert_eq!(s.score, 100.0);
        assert_eq!(s.tier, "high");
    }

    #[test]
    fn test_iceberg_zero_revenue_is_zero() {
        let s = iceberg_score(0.0, 0.0);
        assert_eq!(s.sub_to_prime_ratio, None);
        assert_eq!(s.hidden_revenue_pct, 0.0);
        assert_eq!(s.score, 0.0);
        assert_eq!(s.tier, "low");
    }

    #[test]
    fn test_iceberg_sub_only() {
        let s = iceberg_score(0.0, 250.0);
        assert_eq!(s.sub_to_prime_ratio, None);
        assert_eq!(s.score, 100.0);
    }

    #[test]
    fn test_iceberg_negative_prime_stays_in_range() {
        // Net deobligation: total 40 is smaller than the sub revenue
        let s = iceberg_score(-60.0, 100.0);
        assert_eq!(s.total_revenue, 40.0);
        assert_eq!(s.sub_to_prime_ratio, None);
        assert_eq!(s.hidden_revenue_pct, 100.0);
        assert_eq!(s.score, 100.0);
        assert_eq!(s.tier, "high");
    }

    #[test]
    fn test_iceberg_prime_heavy_is_low() {
        let s = iceberg_score(900.0, 100.0);
        assert_eq!(s.score, 0.0);
        assert_eq!(s.tier, "low");
    }

    #[test]
    fn test_iceberg_medium_tier() {
        // ratio 0.6 never triggers the ratio branch; hidden 60 → score 60
        assert!((iceberg_score_from(Some(0.6), 60.0) - 60.0).abs() < 1e-9);
        assert_eq!(iceberg_tier(60.0), "medium");
        assert_eq!(iceberg_tier(49.9), "low");
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(Vec::<f64>::new()), None);
        assert_eq!(mean([10.0, 20.0, 60.0]), Some(30.0));
    }
}
