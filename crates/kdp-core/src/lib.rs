//! Core domain records and read-models for the brokerage opportunity pipeline.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "kdp-core";

/// Commission earned on a placed contract's value.
pub const BROKERAGE_RATE: f64 = 0.03;

/// NAICS codes the brokerage actively works, with their industry descriptions.
pub const TRACKED_NAICS: &[(&str, &str)] = &[
    ("488510", "Freight Transportation Arrangement"),
    (
        "541614",
        "Process, Physical Distribution, and Logistics Consulting Services",
    ),
    (
        "332311",
        "Prefabricated Metal Building and Component Manufacturing",
    ),
    ("492110", "Couriers and Express Delivery Services"),
    ("336611", "Ship Building and Repairing"),
];

pub fn is_tracked_naics(code: &str) -> bool {
    TRACKED_NAICS.iter().any(|(tracked, _)| *tracked == code)
}

pub fn naics_description(code: &str) -> Option<&'static str> {
    TRACKED_NAICS
        .iter()
        .find(|(tracked, _)| *tracked == code)
        .map(|(_, description)| *description)
}

/// NAICS codes are six ASCII digits.
pub fn is_well_formed_naics(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid opportunity {id}: {reason}")]
    InvalidOpportunity { id: String, reason: String },
    #[error("invalid revenue input: {0}")]
    InvalidRevenueInput(String),
    #[error("invalid revenue event {id}: {reason}")]
    InvalidRevenueEvent { id: Uuid, reason: String },
    #[error("invalid range: end month {end} is before start month {start}")]
    InvalidRange { start: Month, end: Month },
    #[error("a window of {months} months ending {end} starts before the supported calendar")]
    WindowOutOfRange { end: Month, months: u32 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub fn invalid_opportunity(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOpportunity {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_revenue_event(id: Uuid, reason: impl Into<String>) -> Self {
        Self::InvalidRevenueEvent {
            id,
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Open,
    Scored,
    Pursued,
    Won,
    Lost,
}

impl OpportunityStatus {
    /// Still in the pipeline, i.e. neither won nor lost.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::Scored | Self::Pursued)
    }
}

/// Normalized contract opportunity as supplied by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    pub agency: String,
    /// `None` marks the record as explicitly unscored for industry fit.
    #[serde(default)]
    pub naics_code: Option<String>,
    pub estimated_value: f64,
    #[serde(default)]
    pub posted_date: Option<NaiveDate>,
    pub status: OpportunityStatus,
}

/// Priority score, always within `Score::MIN..=Score::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Every valid score, highest first.
    pub fn all_descending() -> impl Iterator<Item = Score> {
        (Self::MIN..=Self::MAX).rev().map(Score)
    }
}

impl TryFrom<u8> for Score {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Score::new(value).ok_or_else(|| format!("score {value} outside 1..=10"))
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueEventKind {
    #[default]
    Placement,
    Adjustment,
}

fn default_brokerage_rate() -> f64 {
    BROKERAGE_RATE
}

/// Ledger entry for a placement or a correction to an earlier placement.
///
/// The fee is derived from `contract_value` and `brokerage_rate` every time it is
/// read; it is written out alongside the event but ignored on the way back in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RevenueEvent {
    pub id: Uuid,
    #[serde(default)]
    pub contract_ref: Option<String>,
    pub contract_value: f64,
    #[serde(default = "default_brokerage_rate")]
    pub brokerage_rate: f64,
    pub placement_date: NaiveDate,
    #[serde(default)]
    pub kind: RevenueEventKind,
    #[serde(default)]
    pub corrects: Option<Uuid>,
}

impl RevenueEvent {
    pub fn fee_amount(&self) -> f64 {
        self.contract_value * self.brokerage_rate
    }

    pub fn month(&self) -> Month {
        Month::from_date(self.placement_date)
    }

    /// Checks the event on its own; references to other events are checked by
    /// [`validate_revenue_events`].
    pub fn validate(&self) -> EngineResult<()> {
        if !self.contract_value.is_finite() {
            return Err(EngineError::invalid_revenue_event(
                self.id,
                "contract value is not a finite number",
            ));
        }
        if !self.brokerage_rate.is_finite() || !(0.0..=1.0).contains(&self.brokerage_rate) {
            return Err(EngineError::invalid_revenue_event(
                self.id,
                format!("brokerage rate {} is outside [0, 1]", self.brokerage_rate),
            ));
        }
        match (self.kind, self.corrects) {
            (RevenueEventKind::Placement, Some(_)) => Err(EngineError::invalid_revenue_event(
                self.id,
                "a placement cannot correct another event",
            )),
            (RevenueEventKind::Placement, None) if self.contract_value < 0.0 => {
                Err(EngineError::invalid_revenue_event(
                    self.id,
                    format!("placement value {} is negative", self.contract_value),
                ))
            }
            (RevenueEventKind::Adjustment, None) => Err(EngineError::invalid_revenue_event(
                self.id,
                "adjustment does not reference the event it corrects",
            )),
            _ => Ok(()),
        }
    }
}

/// Validates every event in log order. An adjustment must correct an event that
/// appears earlier in the log.
pub fn validate_revenue_events(events: &[RevenueEvent]) -> EngineResult<()> {
    let mut seen = HashSet::with_capacity(events.len());
    for event in events {
        event.validate()?;
        if let Some(corrects) = event.corrects {
            if !seen.contains(&corrects) {
                return Err(EngineError::invalid_revenue_event(
                    event.id,
                    format!("corrects unknown or later event {corrects}"),
                ));
            }
        }
        seen.insert(event.id);
    }
    Ok(())
}

impl Serialize for RevenueEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            id: &'a Uuid,
            contract_ref: &'a Option<String>,
            contract_value: f64,
            brokerage_rate: f64,
            fee_amount: f64,
            placement_date: &'a NaiveDate,
            kind: RevenueEventKind,
            corrects: &'a Option<Uuid>,
        }

        Wire {
            id: &self.id,
            contract_ref: &self.contract_ref,
            contract_value: self.contract_value,
            brokerage_rate: self.brokerage_rate,
            fee_amount: self.fee_amount(),
            placement_date: &self.placement_date,
            kind: self.kind,
            corrects: &self.corrects,
        }
        .serialize(serializer)
    }
}

/// Calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// `None` unless `month` is 1..=12 and `year` is within chrono's date range.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let years = NaiveDate::MIN.year()..=NaiveDate::MAX.year();
        ((1..=12).contains(&month) && years.contains(&year)).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn label(self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    fn index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_index(index: i64) -> Option<Self> {
        let year = i32::try_from(index.div_euclid(12)).ok()?;
        let month = u32::try_from(index.rem_euclid(12) + 1).ok()?;
        Self::new(year, month)
    }

    /// The following month; `None` past the last supported year.
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Shift backwards by `count` months; `None` before the first supported year.
    pub fn minus(self, count: u32) -> Option<Self> {
        Self::from_index(self.index() - i64::from(count))
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        Self::from_date(date) == self
    }

    /// Inclusive month range; empty when `end` is before `self`.
    pub fn through(self, end: Month) -> impl Iterator<Item = Month> {
        std::iter::successors(Some(self), move |m| m.next().filter(|next| *next <= end))
            .take_while(move |m| *m <= end)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for Month {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {s:?}"))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("invalid year in {s:?}"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in {s:?}"))?;
        Month::new(year, month).ok_or_else(|| format!("month out of range in {s:?}"))
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Reporting window for dashboard queries. `as_of` anchors recency scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingWindow {
    pub start: Month,
    pub end: Month,
    pub as_of: NaiveDate,
}

impl ReportingWindow {
    pub fn new(start: Month, end: Month, as_of: NaiveDate) -> EngineResult<Self> {
        if end < start {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self { start, end, as_of })
    }

    /// The `months` calendar months ending with the month of `as_of`.
    pub fn trailing_months(as_of: NaiveDate, months: u32) -> EngineResult<Self> {
        Self::ending(Month::from_date(as_of), months, as_of)
    }

    /// The `months` calendar months ending with `end`; zero is treated as one.
    pub fn ending(end: Month, months: u32, as_of: NaiveDate) -> EngineResult<Self> {
        let start = end
            .minus(months.max(1) - 1)
            .ok_or(EngineError::WindowOutOfRange { end, months })?;
        Ok(Self { start, end, as_of })
    }

    pub fn month_count(&self) -> usize {
        self.start.through(self.end).count()
    }
}

/// Seven days ending on `as_of`, inclusive.
pub fn trailing_week(as_of: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = as_of
        .checked_sub_days(Days::new(6))
        .unwrap_or(NaiveDate::MIN);
    (start, as_of)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineBucket {
    pub score: u8,
    pub count: usize,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenueSummary {
    pub month: Month,
    pub total_fees: f64,
    pub placements: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencySummary {
    pub agency: String,
    pub contract_count: usize,
    pub total_value: f64,
}

/// Opportunity excluded from a read-model because it failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedOpportunity {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_contracts: usize,
    pub active_contracts: usize,
    pub total_revenue: f64,
    pub success_rate: f64,
    pub top_agencies: Vec<AgencySummary>,
    pub monthly_revenue: Vec<MonthlyRevenueSummary>,
    pub opportunity_pipeline: Vec<PipelineBucket>,
    pub rejected: Vec<RejectedOpportunity>,
}

/// Immutable input handed to every query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
    #[serde(default)]
    pub revenue_events: Vec<RevenueEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn score_rejects_values_outside_range() {
        assert!(Score::new(0).is_none());
        assert!(Score::new(11).is_none());
        assert_eq!(Score::new(7).map(Score::get), Some(7));
        let all: Vec<u8> = Score::all_descending().map(Score::get).collect();
        assert_eq!(all, vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn month_arithmetic_crosses_year_boundaries() {
        let jan = Month::new(2026, 1).unwrap();
        assert_eq!(jan.minus(1), Month::new(2025, 12));
        assert_eq!(jan.minus(13), Month::new(2024, 12));
        assert_eq!(Month::new(2025, 12).unwrap().next(), Some(jan));
        assert!(Month::new(2025, 12).unwrap() < jan);
    }

    #[test]
    fn month_range_is_inclusive_and_empty_when_reversed() {
        let start = Month::new(2025, 11).unwrap();
        let end = Month::new(2026, 2).unwrap();
        let labels: Vec<String> = start.through(end).map(Month::label).collect();
        assert_eq!(labels, vec!["2025-11", "2025-12", "2026-01", "2026-02"]);
        assert_eq!(end.through(start).count(), 0);
        assert_eq!(start.through(start).count(), 1);
    }

    #[test]
    fn month_parses_and_serializes_as_label() {
        let month: Month = "2026-03".parse().unwrap();
        assert_eq!(month, Month::new(2026, 3).unwrap());
        assert!("2026-13".parse::<Month>().is_err());
        assert!("march".parse::<Month>().is_err());
        assert_eq!(serde_json::to_string(&month).unwrap(), "\"2026-03\"");
    }

    #[test]
    fn trailing_window_covers_requested_months() {
        let window = ReportingWindow::trailing_months(date(2026, 2, 14), 6).unwrap();
        assert_eq!(window.start, Month::new(2025, 9).unwrap());
        assert_eq!(window.end, Month::new(2026, 2).unwrap());
        assert_eq!(window.month_count(), 6);
    }

    #[test]
    fn month_arithmetic_stops_at_calendar_limits() {
        assert!(Month::new(i32::MAX, 12).is_none());
        assert!("2147483647-12".parse::<Month>().is_err());

        let last = Month::from_date(NaiveDate::MAX);
        assert_eq!(last.next(), None);
        assert_eq!(last.through(last).count(), 1);

        let first = Month::from_date(NaiveDate::MIN);
        assert_eq!(first.minus(1), None);
        assert_eq!(Month::new(2026, 3).unwrap().minus(u32::MAX), None);

        let err = ReportingWindow::trailing_months(date(2026, 3, 1), u32::MAX).unwrap_err();
        assert!(matches!(err, EngineError::WindowOutOfRange { months: u32::MAX, .. }));
    }

    #[test]
    fn reporting_window_rejects_reversed_range() {
        let err = ReportingWindow::new(
            Month::new(2026, 5).unwrap(),
            Month::new(2026, 1).unwrap(),
            date(2026, 5, 1),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange { .. }));
    }

    #[test]
    fn revenue_event_fee_is_derived_and_not_read_back() {
        let event = RevenueEvent {
            id: Uuid::nil(),
            contract_ref: Some("W912-24-R-0001".into()),
            contract_value: 200_000.0,
            brokerage_rate: BROKERAGE_RATE,
            placement_date: date(2026, 1, 10),
            kind: RevenueEventKind::Placement,
            corrects: None,
        };
        assert_eq!(event.fee_amount(), 200_000.0 * 0.03);

        let mut json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["fee_amount"], serde_json::json!(200_000.0 * 0.03));
        json["fee_amount"] = serde_json::json!(1.0);
        let back: RevenueEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    fn placement(value: f64) -> RevenueEvent {
        RevenueEvent {
            id: Uuid::new_v4(),
            contract_ref: None,
            contract_value: value,
            brokerage_rate: BROKERAGE_RATE,
            placement_date: date(2026, 1, 10),
            kind: RevenueEventKind::Placement,
            corrects: None,
        }
    }

    fn adjustment(delta: f64, corrects: Option<Uuid>) -> RevenueEvent {
        RevenueEvent {
            kind: RevenueEventKind::Adjustment,
            corrects,
            ..placement(delta)
        }
    }

    fn rejected_id(events: &[RevenueEvent]) -> Option<Uuid> {
        match validate_revenue_events(events) {
            Err(EngineError::InvalidRevenueEvent { id, .. }) => Some(id),
            _ => None,
        }
    }

    #[test]
    fn revenue_log_accepts_placements_and_earlier_corrections() {
        let first = placement(300_000.0);
        let correction = adjustment(-50_000.0, Some(first.id));
        assert_eq!(validate_revenue_events(&[first, correction]), Ok(()));
        assert_eq!(validate_revenue_events(&[]), Ok(()));
    }

    #[test]
    fn negative_placement_is_invalid() {
        let bad = placement(-1_000_000.0);
        assert_eq!(rejected_id(&[placement(10.0), bad.clone()]), Some(bad.id));
    }

    #[test]
    fn brokerage_rate_must_be_a_fraction() {
        for rate in [f64::NAN, -0.01, 1.5, 7.5, f64::INFINITY] {
            let event = RevenueEvent {
                brokerage_rate: rate,
                ..placement(1_000.0)
            };
            assert_eq!(rejected_id(std::slice::from_ref(&event)), Some(event.id), "rate {rate}");
        }
    }

    #[test]
    fn non_finite_value_is_invalid() {
        let event = adjustment(f64::NAN, Some(Uuid::new_v4()));
        assert!(event.validate().is_err());
    }

    #[test]
    fn adjustment_must_correct_an_earlier_event() {
        let dangling = adjustment(-10.0, Some(Uuid::new_v4()));
        assert_eq!(rejected_id(std::slice::from_ref(&dangling)), Some(dangling.id));

        let unlinked = adjustment(-10.0, None);
        assert_eq!(rejected_id(std::slice::from_ref(&unlinked)), Some(unlinked.id));

        let later = placement(500.0);
        let early = adjustment(-10.0, Some(later.id));
        assert_eq!(rejected_id(&[early.clone(), later]), Some(early.id));
    }

    #[test]
    fn placement_cannot_carry_a_correction() {
        let first = placement(100.0);
        let second = RevenueEvent {
            corrects: Some(first.id),
            ..placement(100.0)
        };
        assert_eq!(rejected_id(&[first, second.clone()]), Some(second.id));
    }

    #[test]
    fn tracked_naics_lookup() {
        assert!(is_tracked_naics("541614"));
        assert!(!is_tracked_naics("999999"));
        assert_eq!(naics_description("336611"), Some("Ship Building and Repairing"));
        assert!(is_well_formed_naics("999999"));
        assert!(!is_well_formed_naics("54161"));
        assert!(!is_well_formed_naics("54161x"));
    }

    #[test]
    fn opportunity_status_activity() {
        assert!(OpportunityStatus::Open.is_active());
        assert!(OpportunityStatus::Pursued.is_active());
        assert!(!OpportunityStatus::Won.is_active());
        assert!(!OpportunityStatus::Lost.is_active());
    }
}
