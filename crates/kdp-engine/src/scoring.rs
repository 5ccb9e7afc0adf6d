use chrono::NaiveDate;
use kdp_core::{is_well_formed_naics, EngineError, EngineResult, Opportunity, RejectedOpportunity, Score};
use serde::Serialize;
use tracing::warn;

use crate::config::ScoringConfig;

/// Opportunity paired with the score computed from its current attributes.
///
/// Only [`Scorer`] constructs these, so the score cannot drift from the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredOpportunity {
    #[serde(flatten)]
    opportunity: Opportunity,
    score: Score,
}

impl ScoredOpportunity {
    pub fn opportunity(&self) -> &Opportunity {
        &self.opportunity
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn value(&self) -> f64 {
        self.opportunity.estimated_value
    }

    pub fn into_opportunity(self) -> Opportunity {
        self.opportunity
    }
}

/// Per-factor contributions behind a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub naics: f64,
    pub value: f64,
    pub recency: f64,
    pub raw: f64,
    pub score: Score,
}

#[derive(Debug, Clone, Default)]
pub struct ScoringOutcome {
    pub scored: Vec<ScoredOpportunity>,
    pub rejected: Vec<RejectedOpportunity>,
}

#[derive(Debug, Clone)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            config: ScoringConfig::default(),
        }
    }
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, opportunity: &Opportunity, as_of: NaiveDate) -> EngineResult<Score> {
        Ok(self.breakdown(opportunity, as_of)?.score)
    }

    pub fn score_opportunity(
        &self,
        opportunity: &Opportunity,
        as_of: NaiveDate,
    ) -> EngineResult<ScoredOpportunity> {
        let score = self.score(opportunity, as_of)?;
        Ok(ScoredOpportunity {
            opportunity: opportunity.clone(),
            score,
        })
    }

    /// Scores every record, setting aside the ones that fail validation.
    pub fn score_all(&self, opportunities: &[Opportunity], as_of: NaiveDate) -> ScoringOutcome {
        let mut outcome = ScoringOutcome::default();
        for opportunity in opportunities {
            match self.score_opportunity(opportunity, as_of) {
                Ok(scored) => outcome.scored.push(scored),
                Err(err) => {
                    warn!(opportunity_id = %opportunity.id, error = %err, "excluding opportunity from scoring");
                    outcome.rejected.push(RejectedOpportunity {
                        id: opportunity.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        outcome
    }

    pub fn breakdown(
        &self,
        opportunity: &Opportunity,
        as_of: NaiveDate,
    ) -> EngineResult<ScoreBreakdown> {
        let posted = validate_opportunity(opportunity)?;
        let naics = self.naics_factor(opportunity.naics_code.as_deref());
        let value = self.value_factor(opportunity.estimated_value);
        let recency = self.recency_factor(posted, as_of);
        let raw = naics + value + recency;

        let normalized = raw / self.config.total_weight();
        let scaled = (1.0 + 9.0 * normalized)
            .round()
            .clamp(f64::from(Score::MIN), f64::from(Score::MAX)) as u8;
        let score = Score::new(scaled).ok_or_else(|| {
            EngineError::InvalidConfig(format!("scoring produced out-of-range value {scaled}"))
        })?;

        Ok(ScoreBreakdown {
            naics,
            value,
            recency,
            raw,
            score,
        })
    }

    fn naics_factor(&self, code: Option<&str>) -> f64 {
        match code {
            Some(code) if self.config.is_tracked(code) => self.config.naics_weight,
            Some(_) => self.config.naics_weight * self.config.untracked_naics_factor,
            None => 0.0,
        }
    }

    fn value_factor(&self, value: f64) -> f64 {
        let breakpoints = &self.config.value_breakpoints;
        if breakpoints.is_empty() {
            return 0.0;
        }
        let tier = breakpoints.iter().filter(|b| value >= **b).count();
        self.config.value_weight * tier as f64 / breakpoints.len() as f64
    }

    fn recency_factor(&self, posted: NaiveDate, as_of: NaiveDate) -> f64 {
        let age_days = (as_of - posted).num_days().max(0) as f64;
        let window = f64::from(self.config.recency_window_days);
        self.config.recency_weight * (1.0 - age_days / window).max(0.0)
    }
}

/// Splits records into those every read-model may use and those it must exclude.
pub fn partition_valid(
    opportunities: &[Opportunity],
) -> (Vec<Opportunity>, Vec<RejectedOpportunity>) {
    let mut valid = Vec::with_capacity(opportunities.len());
    let mut rejected = Vec::new();
    for opportunity in opportunities {
        match validate_opportunity(opportunity) {
            Ok(_) => valid.push(opportunity.clone()),
            Err(err) => {
                warn!(
                    opportunity_id = %opportunity.id,
                    error = %err,
                    "excluding invalid opportunity"
                );
                rejected.push(RejectedOpportunity {
                    id: opportunity.id.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    (valid, rejected)
}

/// Checks the constraints scoring relies on and returns the posting date.
pub fn validate_opportunity(opportunity: &Opportunity) -> EngineResult<NaiveDate> {
    let value = opportunity.estimated_value;
    if !value.is_finite() {
        return Err(EngineError::invalid_opportunity(
            &opportunity.id,
            "estimated value is not a finite number",
        ));
    }
    if value < 0.0 {
        return Err(EngineError::invalid_opportunity(
            &opportunity.id,
            format!("estimated value {value} is negative"),
        ));
    }
    if let Some(code) = &opportunity.naics_code {
        if !is_well_formed_naics(code) {
            return Err(EngineError::invalid_opportunity(
                &opportunity.id,
                format!("malformed NAICS code {code:?}"),
            ));
        }
    }
    opportunity
        .posted_date
        .ok_or_else(|| EngineError::invalid_opportunity(&opportunity.id, "missing posted date"))
}
