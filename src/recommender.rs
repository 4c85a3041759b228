//! Protocol parameter recommendations from historical tail behaviour.
//!
//! Three independent analyses over the same history:
//!
//! - **Liquidation**: initial LTV = min(cap, safety / (1 - worst daily move)),
//!   liquidation threshold = 0.9 x LTV.
//! - **Repayment window**: for every day whose return falls below the 5th
//!   percentile, count days until the close first exceeds the pre-drop close,
//!   capped at 30. The window is min(default, median recovery).
//! - **Interest rates**: base = risk-free + 0.5 x annualized volatility, with
//!   a two-segment curve through (0, base), (optimal, 2 x base), (1, 3 x base).
//!
//! These are heuristic safety margins. Nothing here claims optimality.

use crate::error::{Result, RiskError};
use crate::metrics::{MoveStats, RiskMetricsCalculator};
use crate::stats;
use crate::types::Confidence;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommenderConfig {
    pub confidence: Confidence,
    /// Hard upper bound on the initial LTV.
    pub ltv_cap: Decimal,
    /// Structural buffer applied to the worst-move LTV (0.8 = 20% buffer).
    pub ltv_safety_factor: Decimal,
    /// Liquidation threshold as a fraction of initial LTV.
    pub liquidation_buffer: Decimal,
    /// Upper bound on the recommended repayment window, in days.
    pub default_window: u32,
    /// Days after a drop beyond which it counts as unrecovered.
    pub recovery_cap_days: usize,
    /// Return quantile below which a day counts as a significant drop.
    pub drop_quantile: Decimal,
    pub risk_free_rate: Decimal,
    /// Weight of annualized volatility in the base rate.
    pub volatility_weight: Decimal,
    pub optimal_utilization: Decimal,
    /// Max rate as a multiple of the base rate.
    pub max_rate_multiple: Decimal,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            confidence: Confidence::NINETY_NINE,
            ltv_cap: dec!(0.8),
            ltv_safety_factor: dec!(0.8),
            liquidation_buffer: dec!(0.9),
            default_window: 5,
            recovery_cap_days: 30,
            drop_quantile: dec!(0.05),
            risk_free_rate: dec!(0.03),
            volatility_weight: dec!(0.5),
            optimal_utilization: dec!(0.8),
            max_rate_multiple: dec!(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationParameters {
    pub recommended_initial_ltv: Decimal,
    pub liquidation_threshold: Decimal,
    pub max_daily_drop: Decimal,
    pub var_daily: Decimal,
    pub moves_by_window: Vec<MoveStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentWindow {
    pub recommended_window: u32,
    pub drop_events: usize,
    pub median_recovery: Option<Decimal>,
    pub p90_recovery: Option<Decimal>,
    pub max_recovery: Option<u32>,
}

/// Two linear segments: (0, base) to (optimal, 2 x base) to (1, max).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRateCurve {
    pub base_rate: Decimal,
    pub optimal_utilization: Decimal,
    pub max_rate: Decimal,
    pub slope_1: Decimal,
    pub slope_2: Decimal,
}

impl InterestRateCurve {
    pub fn new(base_rate: Decimal, optimal_utilization: Decimal, max_rate: Decimal) -> Result<Self> {
        if optimal_utilization <= Decimal::ZERO || optimal_utilization >= Decimal::ONE {
            return Err(RiskError::invalid(format!(
                "optimal utilization {optimal_utilization} outside (0, 1)"
            )));
        }
        let kink_rate = base_rate * dec!(2);
        Ok(Self {
            base_rate,
            optimal_utilization,
            max_rate,
            slope_1: (kink_rate - base_rate) / optimal_utilization,
            slope_2: (max_rate - kink_rate) / (Decimal::ONE - optimal_utilization),
        })
    }

    /// Borrow rate at `utilization`, clamped to [0, 1].
    pub fn rate_at(&self, utilization: Decimal) -> Decimal {
        let u = utilization.clamp(Decimal::ZERO, Decimal::ONE);
        if u <= self.optimal_utilization {
            self.base_rate + self.slope_1 * u
        } else {
            self.base_rate + self.slope_1 * self.optimal_utilization
                + self.slope_2 * (u - self.optimal_utilization)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    pub liquidation: LiquidationParameters,
    pub repayment: RepaymentWindow,
    pub interest: InterestRateCurve,
}

impl ProtocolParameters {
    pub fn recommended_initial_ltv(&self) -> Decimal {
        self.liquidation.recommended_initial_ltv
    }

    pub fn liquidation_threshold(&self) -> Decimal {
        self.liquidation.liquidation_threshold
    }

    pub fn recommended_window(&self) -> u32 {
        self.repayment.recommended_window
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterRecommender {
    config: RecommenderConfig,
}

impl ParameterRecommender {
    pub fn new(config: RecommenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    /// Full recomputation. The three analyses run concurrently over the read-only history.
    pub fn recommend(&self, calculator: &RiskMetricsCalculator<'_>) -> Result<ProtocolParameters> {
        let (liquidation, (repayment, interest)) = rayon::join(
            || self.liquidation_parameters(calculator),
            || {
                rayon::join(
                    || self.repayment_window(calculator),
                    || self.interest_rate_curve(calculator),
                )
            },
        );

        let params = ProtocolParameters {
            liquidation: liquidation?,
            repayment: repayment?,
            interest: interest?,
        };

        tracing::info!(
            initial_ltv = %params.liquidation.recommended_initial_ltv,
            liquidation_threshold = %params.liquidation.liquidation_threshold,
            repayment_window = params.repayment.recommended_window,
            base_rate = %params.interest.base_rate,
            "protocol parameters recommended"
        );
        Ok(params)
    }

    pub fn liquidation_parameters(
        &self,
        calculator: &RiskMetricsCalculator<'_>,
    ) -> Result<LiquidationParameters> {
        let returns = calculator.repository().returns();
        let worst = returns
            .iter()
            .copied()
            .min()
            .ok_or_else(|| RiskError::insufficient(2, calculator.repository().len()))?;
        let var_daily = calculator.value_at_risk(self.config.confidence)?;

        // returns are > -1 for positive prices, so the denominator is > 0
        let recommended_initial_ltv =
            (self.config.ltv_safety_factor / (Decimal::ONE - worst)).min(self.config.ltv_cap);

        Ok(LiquidationParameters {
            recommended_initial_ltv,
            liquidation_threshold: recommended_initial_ltv * self.config.liquidation_buffer,
            max_daily_drop: worst,
            var_daily,
            moves_by_window: calculator.move_stats_by_horizon(),
        })
    }

    /// Recovery stats over drop days with a full `recovery_cap_days` of history after them.
    /// Drops closer to the end of the series are not scored.
    pub fn repayment_window(&self, calculator: &RiskMetricsCalculator<'_>) -> Result<RepaymentWindow> {
        let repo = calculator.repository();
        let returns = repo.returns();
        let threshold = stats::quantile(&returns, self.config.drop_quantile)?;
        let closes = repo.closes();
        let cap = self.config.recovery_cap_days;

        let mut recoveries: Vec<Decimal> = Vec::new();
        let mut without_lookahead = 0usize;

        for (t, obs) in repo.observations().iter().enumerate() {
            let Some(r) = obs.daily_return else { continue };
            if r >= threshold {
                continue;
            }
            if t + cap >= closes.len() {
                without_lookahead += 1;
                continue;
            }
            let pre_drop = closes[t - 1];
            let days = (1..=cap)
                .find(|k| closes[t + k] > pre_drop)
                .unwrap_or(cap);
            recoveries.push(Decimal::from(days));
        }

        if without_lookahead > 0 {
            tracing::warn!(
                count = without_lookahead,
                cap,
                "drop events too close to the end of history were not scored"
            );
        }

        if recoveries.is_empty() {
            return Ok(RepaymentWindow {
                recommended_window: self.config.default_window,
                drop_events: 0,
                median_recovery: None,
                p90_recovery: None,
                max_recovery: None,
            });
        }

        let median = stats::median(&recoveries)?;
        let median_days = median.floor().to_u32().unwrap_or(u32::MAX);
        let max_recovery = recoveries.iter().copied().max().and_then(|d| d.to_u32());

        Ok(RepaymentWindow {
            recommended_window: self.config.default_window.min(median_days),
            drop_events: recoveries.len(),
            median_recovery: Some(median),
            p90_recovery: Some(stats::quantile(&recoveries, dec!(0.9))?),
            max_recovery,
        })
    }

    pub fn interest_rate_curve(&self, calculator: &RiskMetricsCalculator<'_>) -> Result<InterestRateCurve> {
        let annual_vol = calculator.annualized_volatility()?;
        let base_rate = self.config.risk_free_rate + annual_vol * self.config.volatility_weight;
        InterestRateCurve::new(
            base_rate,
            self.config.optimal_utilization,
            base_rate * self.config.max_rate_multiple,
        )
    }
}
