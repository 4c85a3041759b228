//! Scenario stress testing.
//!
//! Each [`RiskScenario`] shocks the position value and the baseline daily
//! volatility. Scenarios are evaluated independently: one that cannot be
//! evaluated yields an error in its own slot and the rest still run.
//!
//! The margin-call probability is a heuristic. It treats the shortfall against
//! the margin-call threshold as a normal tail with
//! `mean = value * volatility * sqrt(252)` and `scale = |position VaR(99%)|`.
//! Crypto returns are fat-tailed, so read the number as a relative score
//! across scenarios, not a calibrated probability.

use crate::error::{Result, RiskError};
use crate::margin::MarginEngine;
use crate::metrics::RiskMetricsCalculator;
use crate::types::{Confidence, Quote, SQRT_TRADING_DAYS};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// norm_cdf is 0 or 1 to Decimal precision well before this
const Z_CLAMP: Decimal = dec!(8);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScenario {
    pub name: String,
    /// Fractional price move, e.g. -0.40 for a 40% crash.
    pub price_shock: Decimal,
    /// Fractional change in volatility, e.g. 2.0 for +200%.
    #[serde(default)]
    pub volatility_shock: Decimal,
}

impl RiskScenario {
    pub fn new(name: impl Into<String>, price_shock: Decimal) -> Self {
        Self {
            name: name.into(),
            price_shock,
            volatility_shock: Decimal::ZERO,
        }
    }

    pub fn with_volatility_shock(mut self, volatility_shock: Decimal) -> Self {
        self.volatility_shock = volatility_shock;
        self
    }
}

/// Crash, correction and rally used when the caller supplies no scenarios.
pub fn default_scenarios() -> Vec<RiskScenario> {
    vec![
        RiskScenario::new("Major Crash", dec!(-0.40)).with_volatility_shock(dec!(2.0)),
        RiskScenario::new("Moderate Correction", dec!(-0.20)).with_volatility_shock(dec!(1.5)),
        RiskScenario::new("Bull Run", dec!(0.30)).with_volatility_shock(dec!(1.0)),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    pub scenario: String,
    pub shocked_value: Quote,
    pub shocked_volatility: Decimal,
    /// (shocked - original) / original
    pub portfolio_impact: Decimal,
    pub margin_call_probability: Decimal,
    /// Requirement on the shocked position minus the original value. Negative is surplus.
    pub required_additional_margin: Quote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub scenario: String,
    pub result: Result<StressResult>,
}

#[derive(Debug, Clone)]
pub struct StressTestRunner {
    engine: MarginEngine,
    baseline_volatility: Decimal,
    var_99: Decimal,
}

impl StressTestRunner {
    /// Baseline is the full-history daily volatility and 99% daily VaR.
    pub fn new(calculator: &RiskMetricsCalculator<'_>, engine: MarginEngine) -> Result<Self> {
        let baseline_volatility = calculator.full_sample_daily_volatility()?;
        let var_99 = calculator.value_at_risk(Confidence::NINETY_NINE)?;
        Ok(Self::with_baseline(engine, baseline_volatility, var_99))
    }

    pub fn with_baseline(engine: MarginEngine, baseline_volatility: Decimal, var_99: Decimal) -> Self {
        Self {
            engine,
            baseline_volatility,
            var_99,
        }
    }

    pub fn baseline_volatility(&self) -> Decimal {
        self.baseline_volatility
    }

    /// One outcome per scenario, in input order.
    pub fn run(&self, position_value: Quote, scenarios: &[RiskScenario]) -> Vec<ScenarioOutcome> {
        scenarios
            .iter()
            .map(|scenario| {
                let result = self.evaluate(position_value, scenario);
                if let Err(err) = &result {
                    tracing::warn!(scenario = %scenario.name, %err, "stress scenario skipped");
                }
                ScenarioOutcome {
                    scenario: scenario.name.clone(),
                    result,
                }
            })
            .collect()
    }

    pub fn evaluate(&self, position_value: Quote, scenario: &RiskScenario) -> Result<StressResult> {
        if !position_value.is_positive() {
            return Err(RiskError::invalid(format!(
                "position value {position_value} must be positive"
            )));
        }
        if scenario.price_shock <= dec!(-1) {
            return Err(RiskError::invalid(format!(
                "price shock {} wipes out the position",
                scenario.price_shock
            )));
        }
        if scenario.volatility_shock < dec!(-1) {
            return Err(RiskError::invalid(format!(
                "volatility shock {} gives negative volatility",
                scenario.volatility_shock
            )));
        }

        let shocked_value = position_value.mul(Decimal::ONE + scenario.price_shock);
        let shocked_volatility = self.baseline_volatility * (Decimal::ONE + scenario.volatility_shock);
        let margin_call_probability =
            self.estimate_margin_call_probability(shocked_value, shocked_volatility)?;
        let required_additional_margin = self
            .engine
            .margin_requirement(shocked_value, shocked_volatility)
            .sub(position_value);

        tracing::debug!(
            scenario = %scenario.name,
            %shocked_value,
            %margin_call_probability,
            "scenario evaluated"
        );

        Ok(StressResult {
            scenario: scenario.name.clone(),
            shocked_value,
            shocked_volatility,
            portfolio_impact: (shocked_value.value() - position_value.value()) / position_value.value(),
            margin_call_probability,
            required_additional_margin,
        })
    }

    /// Heuristic normal-tail probability of breaching the margin-call threshold.
    pub fn estimate_margin_call_probability(
        &self,
        position_value: Quote,
        volatility: Decimal,
    ) -> Result<Decimal> {
        let threshold = self.engine.params().margin_call_threshold;
        let mean = position_value.value() * volatility * SQRT_TRADING_DAYS;
        let scale = self
            .engine
            .position_value_at_risk(position_value, self.var_99)
            .abs()
            .value();
        let x = -threshold;

        if scale.is_zero() {
            // degenerate distribution: all mass at the mean
            return Ok(if x >= mean { Decimal::ONE } else { Decimal::ZERO });
        }

        let z = ((x - mean) / scale).clamp(-Z_CLAMP, Z_CLAMP);
        Ok(z.norm_cdf())
    }
}
