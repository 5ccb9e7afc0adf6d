//! Opportunity scoring, pipeline aggregation, revenue ledger and dashboard read-models.

pub mod config;
pub mod dashboard;
pub mod ledger;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod summary;

pub use config::{EngineConfig, ScoringConfig};
pub use dashboard::{DashboardQuery, PerformanceMetrics};
pub use ledger::{fee, FeeQuote, RevenueLedger};
pub use pipeline::aggregate;
pub use report::{recent_activity, weekly_report, RecentActivity, WeeklyReport};
pub use scoring::{
    partition_valid, validate_opportunity, ScoreBreakdown, ScoredOpportunity, Scorer,
    ScoringOutcome,
};
pub use summary::{
    monthly_summary, naics_performance, success_rate, top_agencies, value_distribution,
    NaicsPerformance, ValueRangeCount,
};

pub const CRATE_NAME: &str = "kdp-engine";
