use chrono::NaiveDate;
use kdp_core::{
    AgencySummary, DashboardStats, EngineResult, MonthlyRevenueSummary, Opportunity,
    PipelineBucket, RejectedOpportunity, ReportingWindow, RevenueEvent, Snapshot,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::ledger::{FeeQuote, RevenueLedger};
use crate::pipeline::aggregate;
use crate::report::{recent_activity, weekly_report, RecentActivity, WeeklyReport};
use crate::scoring::{partition_valid, Scorer};
use crate::summary::{
    monthly_summary, naics_performance, success_rate, top_agencies, value_distribution,
    NaicsPerformance, ValueRangeCount,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub value_distribution: Vec<ValueRangeCount>,
    pub naics_performance: Vec<NaicsPerformance>,
    pub rejected: Vec<RejectedOpportunity>,
}

/// Read-model entry point for dashboard consumers.
///
/// Holds configuration only; every call recomputes from the snapshot it is given.
/// Opportunities that fail validation are excluded from every read-model and
/// reported in `rejected`; an invalid revenue log fails the call.
#[derive(Debug, Clone)]
pub struct DashboardQuery {
    config: EngineConfig,
    scorer: Scorer,
}

impl DashboardQuery {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let scorer = Scorer::new(config.scoring.clone())?;
        Ok(Self { config, scorer })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn get_dashboard_stats(
        &self,
        snapshot: &Snapshot,
        window: &ReportingWindow,
    ) -> EngineResult<DashboardStats> {
        let monthly_revenue = self.get_monthly_revenue(&snapshot.revenue_events, window)?;
        let total_revenue = monthly_revenue.iter().map(|m| m.total_fees).sum();

        let (valid, rejected) = partition_valid(&snapshot.opportunities);
        let active: Vec<Opportunity> = valid
            .iter()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect();
        let outcome = self.scorer.score_all(&active, window.as_of);

        let stats = DashboardStats {
            total_contracts: valid.len(),
            active_contracts: active.len(),
            total_revenue,
            success_rate: success_rate(&valid),
            top_agencies: top_agencies(&valid, self.config.top_agencies_limit),
            monthly_revenue,
            opportunity_pipeline: aggregate(&outcome.scored),
            rejected,
        };
        debug!(
            total_contracts = stats.total_contracts,
            active_contracts = stats.active_contracts,
            rejected = stats.rejected.len(),
            "computed dashboard stats"
        );
        Ok(stats)
    }

    /// Pipeline over every supplied opportunity; the first invalid record fails the call.
    pub fn get_opportunity_pipeline(
        &self,
        opportunities: &[Opportunity],
        as_of: NaiveDate,
    ) -> EngineResult<Vec<PipelineBucket>> {
        let scored = opportunities
            .iter()
            .map(|o| self.scorer.score_opportunity(o, as_of))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(aggregate(&scored))
    }

    pub fn get_monthly_revenue(
        &self,
        events: &[RevenueEvent],
        window: &ReportingWindow,
    ) -> EngineResult<Vec<MonthlyRevenueSummary>> {
        monthly_summary(events, window.start, window.end)
    }

    /// Invalid contracts are left out of the ranking.
    pub fn get_top_agencies(&self, contracts: &[Opportunity], limit: usize) -> Vec<AgencySummary> {
        let (valid, _) = partition_valid(contracts);
        top_agencies(&valid, limit)
    }

    /// Ledger seeded with `events` at the configured brokerage rate.
    pub fn ledger(&self, events: Vec<RevenueEvent>) -> EngineResult<RevenueLedger> {
        RevenueLedger::from_events(self.config.brokerage_rate, events)
    }

    /// Appends a placement to a ledger opened with [`DashboardQuery::ledger`].
    pub fn record_placement(
        &self,
        ledger: &mut RevenueLedger,
        contract_value: f64,
        placement_date: NaiveDate,
    ) -> EngineResult<RevenueEvent> {
        ledger.record_placement(contract_value, placement_date)
    }

    /// Same as [`DashboardQuery::record_placement`], attributed to a contract.
    pub fn record_placement_for(
        &self,
        ledger: &mut RevenueLedger,
        contract_ref: impl Into<String>,
        contract_value: f64,
        placement_date: NaiveDate,
    ) -> EngineResult<RevenueEvent> {
        ledger.record_placement_for(contract_ref, contract_value, placement_date)
    }

    pub fn record_adjustment(
        &self,
        ledger: &mut RevenueLedger,
        corrects: Uuid,
        value_delta: f64,
        placement_date: NaiveDate,
    ) -> EngineResult<RevenueEvent> {
        ledger.record_adjustment(corrects, value_delta, placement_date)
    }

    pub fn fee_quote(&self, opportunity: &Opportunity) -> EngineResult<FeeQuote> {
        RevenueLedger::new(self.config.brokerage_rate).quote(opportunity)
    }

    pub fn get_performance_metrics(
        &self,
        snapshot: &Snapshot,
        as_of: NaiveDate,
    ) -> PerformanceMetrics {
        let (valid, rejected) = partition_valid(&snapshot.opportunities);
        let outcome = self.scorer.score_all(&valid, as_of);
        PerformanceMetrics {
            value_distribution: value_distribution(&valid),
            naics_performance: naics_performance(&outcome.scored),
            rejected,
        }
    }

    pub fn get_recent_activity(&self, snapshot: &Snapshot, limit: usize) -> RecentActivity {
        let (opportunities, _) = partition_valid(&snapshot.opportunities);
        let screened = Snapshot {
            opportunities,
            revenue_events: snapshot.revenue_events.clone(),
        };
        recent_activity(&screened, limit)
    }

    pub fn get_weekly_report(
        &self,
        snapshot: &Snapshot,
        as_of: NaiveDate,
    ) -> EngineResult<WeeklyReport> {
        weekly_report(snapshot, as_of)
    }
}
