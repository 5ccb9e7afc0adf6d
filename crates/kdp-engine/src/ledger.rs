use chrono::NaiveDate;
use kdp_core::{
    validate_revenue_events, EngineError, EngineResult, Opportunity, RevenueEvent,
    RevenueEventKind, BROKERAGE_RATE,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Brokerage fee owed on a placed contract at the standard rate.
pub fn fee(contract_value: f64) -> EngineResult<f64> {
    fee_at(contract_value, BROKERAGE_RATE)
}

fn fee_at(contract_value: f64, rate: f64) -> EngineResult<f64> {
    check_contract_value(contract_value)?;
    Ok(contract_value * rate)
}

fn check_contract_value(contract_value: f64) -> EngineResult<()> {
    if !contract_value.is_finite() {
        return Err(EngineError::InvalidRevenueInput(
            "contract value is not a finite number".into(),
        ));
    }
    if contract_value < 0.0 {
        return Err(EngineError::InvalidRevenueInput(format!(
            "contract value {contract_value} is negative"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeQuote {
    pub opportunity_id: String,
    pub contract_value: f64,
    pub fee_percentage: f64,
    pub fee_amount: f64,
}

/// Append-only log of placement and adjustment events.
///
/// Corrections are new `Adjustment` events pointing at the event they amend;
/// nothing already recorded is ever edited or removed.
#[derive(Debug, Clone)]
pub struct RevenueLedger {
    rate: f64,
    events: Vec<RevenueEvent>,
}

impl Default for RevenueLedger {
    fn default() -> Self {
        Self::new(BROKERAGE_RATE)
    }
}

impl RevenueLedger {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            events: Vec::new(),
        }
    }

    /// Resumes a ledger from previously recorded events, which must form a valid log.
    pub fn from_events(rate: f64, events: Vec<RevenueEvent>) -> EngineResult<Self> {
        validate_revenue_events(&events)?;
        Ok(Self { rate, events })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn fee(&self, contract_value: f64) -> EngineResult<f64> {
        fee_at(contract_value, self.rate)
    }

    pub fn quote(&self, opportunity: &Opportunity) -> EngineResult<FeeQuote> {
        let fee_amount = self.fee(opportunity.estimated_value)?;
        Ok(FeeQuote {
            opportunity_id: opportunity.id.clone(),
            contract_value: opportunity.estimated_value,
            fee_percentage: self.rate * 100.0,
            fee_amount,
        })
    }

    pub fn record_placement(
        &mut self,
        contract_value: f64,
        placement_date: NaiveDate,
    ) -> EngineResult<RevenueEvent> {
        self.append_placement(None, contract_value, placement_date)
    }

    pub fn record_placement_for(
        &mut self,
        contract_ref: impl Into<String>,
        contract_value: f64,
        placement_date: NaiveDate,
    ) -> EngineResult<RevenueEvent> {
        self.append_placement(Some(contract_ref.into()), contract_value, placement_date)
    }

    /// Records a correction against an earlier event. `value_delta` may be negative.
    pub fn record_adjustment(
        &mut self,
        corrects: Uuid,
        value_delta: f64,
        placement_date: NaiveDate,
    ) -> EngineResult<RevenueEvent> {
        if !value_delta.is_finite() {
            return Err(EngineError::InvalidRevenueInput(
                "adjustment amount is not a finite number".into(),
            ));
        }
        let original = self
            .events
            .iter()
            .find(|event| event.id == corrects)
            .ok_or_else(|| {
                EngineError::InvalidRevenueInput(format!("no ledger event {corrects} to adjust"))
            })?;

        let event = RevenueEvent {
            id: Uuid::new_v4(),
            contract_ref: original.contract_ref.clone(),
            contract_value: value_delta,
            brokerage_rate: original.brokerage_rate,
            placement_date,
            kind: RevenueEventKind::Adjustment,
            corrects: Some(corrects),
        };
        info!(event_id = %event.id, %corrects, value_delta, "recorded revenue adjustment");
        self.events.push(event.clone());
        Ok(event)
    }

    pub fn events(&self) -> &[RevenueEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<RevenueEvent> {
        self.events
    }

    pub fn total_fees(&self) -> f64 {
        self.events.iter().map(RevenueEvent::fee_amount).sum()
    }

    fn append_placement(
        &mut self,
        contract_ref: Option<String>,
        contract_value: f64,
        placement_date: NaiveDate,
    ) -> EngineResult<RevenueEvent> {
        check_contract_value(contract_value)?;
        let event = RevenueEvent {
            id: Uuid::new_v4(),
            contract_ref,
            contract_value,
            brokerage_rate: self.rate,
            placement_date,
            kind: RevenueEventKind::Placement,
            corrects: None,
        };
        info!(
            event_id = %event.id,
            contract_value,
            fee_amount = event.fee_amount(),
            "recorded placement"
        );
        self.events.push(event.clone());
        Ok(event)
    }
}
