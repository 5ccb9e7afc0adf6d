use std::collections::{BTreeMap, HashMap};

use kdp_core::{
    naics_description, validate_revenue_events, AgencySummary, EngineError, EngineResult, Month,
    MonthlyRevenueSummary, Opportunity, OpportunityStatus, RevenueEvent, RevenueEventKind,
};
use serde::Serialize;
use tracing::debug;

use crate::scoring::ScoredOpportunity;

/// Label used for opportunities that carry no NAICS code.
pub const UNSCORED_NAICS: &str = "unscored";

/// Contract value bands: inclusive lower bound, exclusive upper bound.
pub const VALUE_RANGES: &[(f64, Option<f64>, &str)] = &[
    (0.0, Some(100_000.0), "Under $100K"),
    (100_000.0, Some(500_000.0), "$100K - $500K"),
    (500_000.0, Some(1_000_000.0), "$500K - $1M"),
    (1_000_000.0, Some(5_000_000.0), "$1M - $5M"),
    (5_000_000.0, None, "Over $5M"),
];

/// Fee totals per calendar month across `[start, end]`, zero-filled and ascending.
///
/// The whole log is validated first; one invalid event fails the summary.
pub fn monthly_summary(
    events: &[RevenueEvent],
    start: Month,
    end: Month,
) -> EngineResult<Vec<MonthlyRevenueSummary>> {
    if end < start {
        return Err(EngineError::InvalidRange { start, end });
    }
    validate_revenue_events(events)?;

    let mut months: BTreeMap<Month, (f64, usize)> =
        start.through(end).map(|month| (month, (0.0, 0))).collect();
    for event in events {
        if let Some((fees, placements)) = months.get_mut(&event.month()) {
            *fees += event.fee_amount();
            if event.kind == RevenueEventKind::Placement {
                *placements += 1;
            }
        }
    }

    debug!(%start, %end, events = events.len(), "summarized monthly revenue");
    Ok(months
        .into_iter()
        .map(|(month, (total_fees, placements))| MonthlyRevenueSummary {
            month,
            total_fees,
            placements,
        })
        .collect())
}

/// Agencies ranked by total value, then contract count, then name.
///
/// Callers pass validated contracts; [`crate::DashboardQuery`] screens them first.
pub fn top_agencies(contracts: &[Opportunity], limit: usize) -> Vec<AgencySummary> {
    let mut by_agency: HashMap<&str, (usize, f64)> = HashMap::new();
    for contract in contracts {
        let entry = by_agency.entry(contract.agency.as_str()).or_default();
        entry.0 += 1;
        entry.1 += contract.estimated_value;
    }

    let mut agencies: Vec<AgencySummary> = by_agency
        .into_iter()
        .map(|(agency, (contract_count, total_value))| AgencySummary {
            agency: agency.to_string(),
            contract_count,
            total_value,
        })
        .collect();
    agencies.sort_by(|a, b| {
        b.total_value
            .total_cmp(&a.total_value)
            .then_with(|| b.contract_count.cmp(&a.contract_count))
            .then_with(|| a.agency.cmp(&b.agency))
    });
    agencies.truncate(limit);
    agencies
}

/// Won share of decided opportunities as a percentage; 0 when none are decided.
pub fn success_rate(opportunities: &[Opportunity]) -> f64 {
    let won = opportunities
        .iter()
        .filter(|o| o.status == OpportunityStatus::Won)
        .count();
    let lost = opportunities
        .iter()
        .filter(|o| o.status == OpportunityStatus::Lost)
        .count();
    let decided = won + lost;
    if decided == 0 {
        return 0.0;
    }
    won as f64 / decided as f64 * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueRangeCount {
    pub range: String,
    pub count: usize,
    pub total_value: f64,
}

/// Expects opportunities that passed [`crate::scoring::validate_opportunity`]; a
/// negative or non-finite value falls outside every band.
pub fn value_distribution(opportunities: &[Opportunity]) -> Vec<ValueRangeCount> {
    VALUE_RANGES
        .iter()
        .map(|(min, max, label)| {
            let in_range = opportunities.iter().filter(|o| {
                o.estimated_value >= *min && max.map_or(true, |max| o.estimated_value < max)
            });
            let (count, total_value) =
                in_range.fold((0, 0.0), |(n, sum), o| (n + 1, sum + o.estimated_value));
            ValueRangeCount {
                range: label.to_string(),
                count,
                total_value,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NaicsPerformance {
    pub naics_code: String,
    pub description: Option<String>,
    pub contract_count: usize,
    pub avg_opportunity_score: f64,
    pub total_value: f64,
}

/// Per-NAICS counts, mean score and value, ordered by code.
pub fn naics_performance(scored: &[ScoredOpportunity]) -> Vec<NaicsPerformance> {
    let mut by_code: BTreeMap<&str, (usize, u32, f64)> = BTreeMap::new();
    for item in scored {
        let code = item
            .opportunity()
            .naics_code
            .as_deref()
            .unwrap_or(UNSCORED_NAICS);
        let entry = by_code.entry(code).or_default();
        entry.0 += 1;
        entry.1 += u32::from(item.score().get());
        entry.2 += item.value();
    }

    by_code
        .into_iter()
        .map(|(code, (count, score_sum, total_value))| NaicsPerformance {
            naics_code: code.to_string(),
            description: naics_description(code).map(str::to_string),
            contract_count: count,
            avg_opportunity_score: f64::from(score_sum) / count as f64,
            total_value,
        })
        .collect()
}
