use std::cmp::Reverse;

use chrono::NaiveDate;
use kdp_core::{
    trailing_week, validate_revenue_events, EngineResult, Opportunity, RevenueEvent,
    RevenueEventKind, Snapshot,
};
use serde::Serialize;

use crate::scoring::validate_opportunity;

/// Activity over the seven days ending on `week_end`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyReport {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub new_opportunities: usize,
    pub new_pipeline_value: f64,
    pub placements: usize,
    pub adjustments: usize,
    pub revenue: f64,
}

impl WeeklyReport {
    pub fn to_markdown(&self) -> String {
        format!(
            "# Weekly Performance Report\n\n- Week: {} to {}\n- New opportunities: {}\n- New pipeline value: ${}\n- Placements: {}\n- Adjustments: {}\n- Revenue generated: ${}\n",
            self.week_start,
            self.week_end,
            self.new_opportunities,
            format_currency(self.new_pipeline_value),
            self.placements,
            self.adjustments,
            format_currency(self.revenue),
        )
    }
}

/// Fails on an invalid revenue log; invalid opportunities are left out of the counts.
pub fn weekly_report(snapshot: &Snapshot, as_of: NaiveDate) -> EngineResult<WeeklyReport> {
    validate_revenue_events(&snapshot.revenue_events)?;
    let (week_start, week_end) = trailing_week(as_of);
    let in_week = |date: NaiveDate| date >= week_start && date <= week_end;

    let new: Vec<&Opportunity> = snapshot
        .opportunities
        .iter()
        .filter(|o| validate_opportunity(o).is_ok_and(in_week))
        .collect();
    let events: Vec<&RevenueEvent> = snapshot
        .revenue_events
        .iter()
        .filter(|e| in_week(e.placement_date))
        .collect();

    Ok(WeeklyReport {
        week_start,
        week_end,
        new_opportunities: new.len(),
        new_pipeline_value: new.iter().map(|o| o.estimated_value).sum(),
        placements: events
            .iter()
            .filter(|e| e.kind == RevenueEventKind::Placement)
            .count(),
        adjustments: events
            .iter()
            .filter(|e| e.kind == RevenueEventKind::Adjustment)
            .count(),
        revenue: events.iter().map(|e| e.fee_amount()).sum(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentActivity {
    pub recent_opportunities: Vec<Opportunity>,
    pub recent_revenue: Vec<RevenueEvent>,
}

/// Newest opportunities and ledger events, newest first. Undated opportunities sort last.
pub fn recent_activity(snapshot: &Snapshot, limit: usize) -> RecentActivity {
    let mut opportunities: Vec<&Opportunity> = snapshot.opportunities.iter().collect();
    opportunities.sort_by(|a, b| {
        b.posted_date
            .cmp(&a.posted_date)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut events: Vec<&RevenueEvent> = snapshot.revenue_events.iter().collect();
    events.sort_by_key(|e| (Reverse(e.placement_date), e.id));

    RecentActivity {
        recent_opportunities: opportunities.into_iter().take(limit).cloned().collect(),
        recent_revenue: events.into_iter().take(limit).cloned().collect(),
    }
}

/// Dollar amount with thousands separators and cents, e.g. `1,234,567.89`.
pub fn format_currency(amount: f64) -> String {
    let text = format!("{:.2}", amount.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{cents}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdp_core::{OpportunityStatus, BROKERAGE_RATE};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn opportunity(id: &str, value: f64, posted: Option<NaiveDate>) -> Opportunity {
        Opportunity {
            id: id.into(),
            title: id.into(),
            agency: "DLA".into(),
            naics_code: Some("492110".into()),
            estimated_value: value,
            posted_date: posted,
            status: OpportunityStatus::Open,
        }
    }

    fn event(value: f64, on: NaiveDate, kind: RevenueEventKind) -> RevenueEvent {
        RevenueEvent {
            id: Uuid::new_v4(),
            contract_ref: None,
            contract_value: value,
            brokerage_rate: BROKERAGE_RATE,
            placement_date: on,
            kind,
            corrects: None,
        }
    }

    fn snapshot() -> Snapshot {
        let corrected = event(200_000.0, date(2026, 3, 5), RevenueEventKind::Placement);
        let mut correction = event(-50_000.0, date(2026, 3, 6), RevenueEventKind::Adjustment);
        correction.corrects = Some(corrected.id);
        Snapshot {
            opportunities: vec![
                opportunity("old", 10_000.0, Some(date(2026, 2, 20))),
                opportunity("start", 20_000.0, Some(date(2026, 3, 2))),
                opportunity("end", 30_000.0, Some(date(2026, 3, 8))),
                opportunity("undated", 40_000.0, None),
            ],
            revenue_events: vec![
                event(100_000.0, date(2026, 3, 1), RevenueEventKind::Placement),
                corrected,
                correction,
            ],
        }
    }

    #[test]
    fn weekly_report_counts_inclusive_seven_days() {
        let report = weekly_report(&snapshot(), date(2026, 3, 8)).expect("report");
        assert_eq!(report.week_start, date(2026, 3, 2));
        assert_eq!(report.week_end, date(2026, 3, 8));
        assert_eq!(report.new_opportunities, 2);
        assert_eq!(report.new_pipeline_value, 50_000.0);
        assert_eq!(report.placements, 1);
        assert_eq!(report.adjustments, 1);
        assert!((report.revenue - 4_500.0).abs() < 1e-9);

        let markdown = report.to_markdown();
        assert!(markdown.starts_with("# Weekly Performance Report"));
        assert!(markdown.contains("- Week: 2026-03-02 to 2026-03-08"));
        assert!(markdown.contains("- New pipeline value: $50,000.00"));
    }

    #[test]
    fn weekly_report_skips_invalid_opportunities_and_rejects_invalid_events() {
        let mut snapshot = snapshot();
        snapshot
            .opportunities
            .push(opportunity("negative", -5_000_000.0, Some(date(2026, 3, 4))));
        let report = weekly_report(&snapshot, date(2026, 3, 8)).expect("report");
        assert_eq!(report.new_opportunities, 2);
        assert_eq!(report.new_pipeline_value, 50_000.0);

        snapshot.revenue_events[0].brokerage_rate = f64::NAN;
        let err = weekly_report(&snapshot, date(2026, 3, 8)).unwrap_err();
        assert!(matches!(err, kdp_core::EngineError::InvalidRevenueEvent { .. }));
    }

    #[test]
    fn recent_activity_orders_newest_first() {
        let activity = recent_activity(&snapshot(), 2);
        let ids: Vec<&str> = activity
            .recent_opportunities
            .iter()
            .map(|o| o.id.as_str())
            .collect();
        assert_eq!(ids, vec!["end", "start"]);
        assert_eq!(activity.recent_revenue.len(), 2);
        assert_eq!(activity.recent_revenue[0].placement_date, date(2026, 3, 6));

        let all = recent_activity(&snapshot(), 10);
        assert_eq!(all.recent_opportunities.last().map(|o| o.id.as_str()), Some("undated"));
    }

    #[test]
    fn currency_formatting_groups_thousands() {
        assert_eq!(format_currency(0.0), "0.00");
        assert_eq!(format_currency(999.5), "999.50");
        assert_eq!(format_currency(1_234_567.891), "1,234,567.89");
        assert_eq!(format_currency(-4_500.0), "-4,500.00");
    }
}
