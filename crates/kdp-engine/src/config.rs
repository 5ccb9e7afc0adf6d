use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kdp_core::{EngineError, EngineResult, BROKERAGE_RATE, TRACKED_NAICS};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "config/engine.yaml";

/// Weights and breakpoints for opportunity scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub tracked_naics: Vec<String>,
    pub naics_weight: f64,
    /// Share of `naics_weight` granted to a well-formed but untracked code.
    pub untracked_naics_factor: f64,
    /// Ascending contract values; each one reached raises the value tier by one.
    pub value_breakpoints: Vec<f64>,
    pub value_weight: f64,
    pub recency_window_days: u32,
    pub recency_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            tracked_naics: TRACKED_NAICS
                .iter()
                .map(|(code, _)| code.to_string())
                .collect(),
            naics_weight: 4.0,
            untracked_naics_factor: 0.25,
            value_breakpoints: vec![10_000.0, 50_000.0, 100_000.0, 500_000.0, 1_000_000.0],
            value_weight: 4.0,
            recency_window_days: 90,
            recency_weight: 2.0,
        }
    }
}

impl ScoringConfig {
    pub fn total_weight(&self) -> f64 {
        self.naics_weight + self.value_weight + self.recency_weight
    }

    pub fn is_tracked(&self, code: &str) -> bool {
        self.tracked_naics.iter().any(|tracked| tracked == code)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let weights = [
            ("naics_weight", self.naics_weight),
            ("value_weight", self.value_weight),
            ("recency_weight", self.recency_weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {weight}"
                )));
            }
        }
        if self.total_weight() <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "at least one scoring weight must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.untracked_naics_factor) {
            return Err(EngineError::InvalidConfig(format!(
                "untracked_naics_factor must be within [0, 1], got {}",
                self.untracked_naics_factor
            )));
        }
        if self.recency_window_days == 0 {
            return Err(EngineError::InvalidConfig(
                "recency_window_days must be at least 1".into(),
            ));
        }
        if self
            .value_breakpoints
            .iter()
            .any(|b| !b.is_finite() || *b < 0.0)
        {
            return Err(EngineError::InvalidConfig(
                "value_breakpoints must be non-negative numbers".into(),
            ));
        }
        if self.value_breakpoints.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EngineError::InvalidConfig(
                "value_breakpoints must be strictly ascending".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub brokerage_rate: f64,
    pub top_agencies_limit: usize,
    pub reports_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            brokerage_rate: BROKERAGE_RATE,
            top_agencies_limit: 5,
            reports_dir: PathBuf::from("./reports"),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("parsing engine config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    /// Defaults, then `KDP_CONFIG` (or `config/engine.yaml` when present), then
    /// individual `KDP_*` overrides.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("KDP_CONFIG") {
            Some(path) => Self::from_yaml_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_yaml_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };

        if let Some(rate) = lookup("KDP_BROKERAGE_RATE") {
            config.brokerage_rate = rate
                .parse()
                .with_context(|| format!("parsing KDP_BROKERAGE_RATE={rate:?}"))?;
        }
        if let Some(limit) = lookup("KDP_TOP_AGENCIES_LIMIT") {
            config.top_agencies_limit = limit
                .parse()
                .with_context(|| format!("parsing KDP_TOP_AGENCIES_LIMIT={limit:?}"))?;
        }
        if let Some(dir) = lookup("KDP_REPORTS_DIR") {
            config.reports_dir = PathBuf::from(dir);
        }

        config.validate()?;
        debug!(
            brokerage_rate = config.brokerage_rate,
            top_agencies_limit = config.top_agencies_limit,
            "engine config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.scoring.validate()?;
        if !self.brokerage_rate.is_finite() || !(0.0..=1.0).contains(&self.brokerage_rate) {
            return Err(EngineError::InvalidConfig(format!(
                "brokerage_rate must be within [0, 1], got {}",
                self.brokerage_rate
            )));
        }
        Ok(())
    }
}
