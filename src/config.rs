// 7.0 config.rs: all settings in one place. metrics windows, margin rules, repayment,
// parameter recommendation, stress scenarios and backtest defaults.
// 7.1 presets swap in tighter or looser margin rules; everything else keeps defaults.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::backtest::BacktestConfig;
use crate::margin::MarginParams;
use crate::metrics::MetricsConfig;
use crate::recommender::RecommenderConfig;
use crate::repayment::RepaymentParams;
use crate::stress::{default_scenarios, RiskScenario};

// Scenarios run by the stress tester
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressConfig {
    pub scenarios: Vec<RiskScenario>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            scenarios: default_scenarios(),
        }
    }
}

// The complete risk engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub metrics: MetricsConfig,
    pub margin: MarginParams,
    pub repayment: RepaymentParams,
    pub recommender: RecommenderConfig,
    pub stress: StressConfig,
    pub backtest: BacktestConfig,
}

impl RiskConfig {
    // Lower leverage cap, earlier margin calls, shorter repayment
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.margin.base_margin_rate = dec!(0.3);
        config.margin.max_leverage = dec!(3);
        config.margin.margin_call_threshold = dec!(1.0);
        config.margin.min_liquidity_ratio = dec!(2.5);
        config.repayment.income_fraction = dec!(0.5);
        config.repayment.max_days = 3;
        config.recommender.ltv_cap = dec!(0.6);
        config.backtest.max_drawdown_threshold = dec!(-0.15);
        config
    }

    // Higher leverage, later margin calls. for desks that rebalance intraday
    pub fn aggressive() -> Self {
        let mut config = Self::default();
        config.margin.base_margin_rate = dec!(0.15);
        config.margin.max_leverage = dec!(8);
        config.margin.margin_call_threshold = dec!(0.5);
        config.margin.min_liquidity_ratio = dec!(1.5);
        config.repayment.max_days = 7;
        config.backtest.max_drawdown_threshold = dec!(-0.30);
        config
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.horizons.iter().any(|h| *h == 0) {
            return Err(ConfigError::InvalidMetrics {
                reason: "horizons must be at least 1 day".to_string(),
            });
        }
        if self.metrics.volatility_window < 2 {
            return Err(ConfigError::InvalidMetrics {
                reason: "volatility window needs at least 2 returns".to_string(),
            });
        }

        let margin = &self.margin;
        if margin.base_margin_rate <= Decimal::ZERO || margin.base_margin_rate > Decimal::ONE {
            return Err(ConfigError::InvalidMargin {
                reason: "base margin rate must be in (0, 1]".to_string(),
            });
        }
        if margin.max_leverage <= Decimal::ZERO {
            return Err(ConfigError::InvalidMargin {
                reason: "max leverage must be positive".to_string(),
            });
        }
        // the margin-call rule fires first, so it must sit below the liquidity floor
        if margin.margin_call_threshold >= margin.min_liquidity_ratio {
            return Err(ConfigError::InvalidMargin {
                reason: "margin call threshold must be below min liquidity ratio".to_string(),
            });
        }

        let repayment = &self.repayment;
        if repayment.income_fraction <= Decimal::ZERO || repayment.income_fraction > Decimal::ONE {
            return Err(ConfigError::InvalidRepayment {
                reason: "income fraction must be in (0, 1]".to_string(),
            });
        }
        if repayment.max_days == 0 {
            return Err(ConfigError::InvalidRepayment {
                reason: "max days must be at least 1".to_string(),
            });
        }

        let rec = &self.recommender;
        if rec.optimal_utilization <= Decimal::ZERO || rec.optimal_utilization >= Decimal::ONE {
            return Err(ConfigError::InvalidRecommender {
                reason: "optimal utilization must be in (0, 1)".to_string(),
            });
        }
        if rec.ltv_cap <= Decimal::ZERO || rec.ltv_cap > Decimal::ONE {
            return Err(ConfigError::InvalidRecommender {
                reason: "ltv cap must be in (0, 1]".to_string(),
            });
        }
        if rec.drop_quantile <= Decimal::ZERO || rec.drop_quantile >= Decimal::ONE {
            return Err(ConfigError::InvalidRecommender {
                reason: "drop quantile must be in (0, 1)".to_string(),
            });
        }
        if rec.recovery_cap_days == 0 {
            return Err(ConfigError::InvalidRecommender {
                reason: "recovery cap must be at least 1 day".to_string(),
            });
        }

        if let Some(bad) = self.stress.scenarios.iter().find(|s| s.price_shock <= dec!(-1)) {
            return Err(ConfigError::InvalidScenario {
                reason: format!("{}: price shock must be above -100%", bad.name),
            });
        }

        if !self.backtest.initial_capital.is_positive() {
            return Err(ConfigError::InvalidBacktest {
                reason: "initial capital must be positive".to_string(),
            });
        }
        if self.backtest.max_drawdown_threshold >= Decimal::ZERO {
            return Err(ConfigError::InvalidBacktest {
                reason: "drawdown threshold must be negative".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid metrics config: {reason}")]
    InvalidMetrics { reason: String },
    #[error("invalid margin config: {reason}")]
    InvalidMargin { reason: String },
    #[error("invalid repayment config: {reason}")]
    InvalidRepayment { reason: String },
    #[error("invalid recommender config: {reason}")]
    InvalidRecommender { reason: String },
    #[error("invalid stress scenario: {reason}")]
    InvalidScenario { reason: String },
    #[error("invalid backtest config: {reason}")]
    InvalidBacktest { reason: String },
    #[error("config parse error: {0}")]
    Parse(String),
}

// Risk appetite presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Standard,
    Conservative,
    Aggressive,
}

impl RiskProfile {
    pub fn config(&self) -> RiskConfig {
        match self {
            RiskProfile::Standard => RiskConfig::default(),
            RiskProfile::Conservative => RiskConfig::conservative(),
            RiskProfile::Aggressive => RiskConfig::aggressive(),
        }
    }
}
