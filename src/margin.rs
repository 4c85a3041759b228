//! Margin requirement and liquidation-risk classification.
//!
//! The requirement is a flat 20% of notional plus a volatility add-on scaled
//! by a crypto safety multiplier, capped at the full notional.
//!
//! Classification is a prioritized rule list, first match wins:
//! leverage cap, then margin-call threshold (split by repayment time), then
//! minimum liquidity ratio. Each call is stateless; tracking tier transitions
//! over time is the caller's job.

use crate::error::{Result, RiskError};
use crate::metrics::RiskMetricsCalculator;
use crate::repayment::{RepaymentOutcome, RepaymentScheduler};
use crate::types::{Price, Quote};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginParams {
    /// Flat requirement as a fraction of notional.
    pub base_margin_rate: Decimal,
    /// Safety factor applied to volatility, both in the add-on and in position VaR.
    pub volatility_multiplier: Decimal,
    /// Leverage (margin used / account value) above which a position is critical.
    pub max_leverage: Decimal,
    /// Liquidity ratio below which a margin call is issued.
    pub margin_call_threshold: Decimal,
    /// Liquidity ratio below which the position is flagged medium risk.
    pub min_liquidity_ratio: Decimal,
    /// A margin call with more than this many days to repay is HIGH, otherwise CRITICAL.
    pub repayment_grace_days: Decimal,
    /// Smallest collateral quantity accepted for a position.
    pub min_collateral_quantity: Decimal,
}

impl Default for MarginParams {
    fn default() -> Self {
        Self {
            base_margin_rate: dec!(0.2),
            volatility_multiplier: dec!(1.5),
            max_leverage: dec!(5.0),
            margin_call_threshold: dec!(0.75),
            min_liquidity_ratio: dec!(2.0),
            repayment_grace_days: dec!(2),
            min_collateral_quantity: dec!(0.1),
        }
    }
}

/// Single-collateral position as seen by the engine. Never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub collateral_quantity: Decimal,
    pub reference_price: Price,
    pub account_value: Quote,
    pub margin_used: Quote,
    pub available_credit: Quote,
}

impl Position {
    pub fn notional_value(&self) -> Quote {
        Quote::new(self.collateral_quantity * self.reference_price.value())
    }

    /// margin used / account value. Negative for an underwater account.
    pub fn leverage(&self) -> Result<Decimal> {
        if self.account_value.value().is_zero() {
            return Err(RiskError::invalid("zero account value leaves leverage unbounded"));
        }
        Ok(self.margin_used.value() / self.account_value.value())
    }

    /// (account value + available credit) / margin used
    pub fn liquidity_ratio(&self) -> Result<Decimal> {
        if !self.margin_used.is_positive() {
            return Err(RiskError::invalid(format!(
                "margin used {} must be positive to compute liquidity ratio",
                self.margin_used
            )));
        }
        Ok(self.account_value.add(self.available_credit).value() / self.margin_used.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn requires_margin_call(&self) -> bool {
        matches!(self, RiskTier::High | RiskTier::Critical)
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub tier: RiskTier,
    pub reason: String,
    pub liquidity_ratio: Decimal,
    pub leverage: Decimal,
}

/// Classification plus the repayment schedule attached to a margin call.
/// A schedule that cannot be computed keeps its error next to the assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginDecision {
    pub assessment: RiskAssessment,
    pub repayment: Option<Result<RepaymentOutcome>>,
}

#[derive(Debug, Clone, Default)]
pub struct MarginEngine {
    params: MarginParams,
}

impl MarginEngine {
    pub fn new(params: MarginParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MarginParams {
        &self.params
    }

    /// base + volatility add-on, never more than the notional itself.
    pub fn margin_requirement(&self, position_notional: Quote, current_volatility: Decimal) -> Quote {
        let base = position_notional.mul(self.params.base_margin_rate);
        let volatility_adjustment =
            position_notional.mul(current_volatility * self.params.volatility_multiplier);
        base.add(volatility_adjustment).min(position_notional)
    }

    /// Requirement using the calculator's trailing daily volatility.
    pub fn requirement_from_history(
        &self,
        position_notional: Quote,
        calculator: &RiskMetricsCalculator<'_>,
    ) -> Result<Quote> {
        let volatility = calculator.current_daily_volatility()?;
        Ok(self.margin_requirement(position_notional, volatility))
    }

    /// Position-level VaR: value * daily VaR * safety multiplier. Negative means loss.
    pub fn position_value_at_risk(&self, position_value: Quote, daily_var: Decimal) -> Quote {
        position_value.mul(daily_var * self.params.volatility_multiplier)
    }

    pub fn check_min_collateral(&self, position: &Position) -> Result<()> {
        if position.collateral_quantity < self.params.min_collateral_quantity {
            return Err(RiskError::invalid(format!(
                "collateral {} below minimum {}",
                position.collateral_quantity, self.params.min_collateral_quantity
            )));
        }
        Ok(())
    }

    /// Tier a position. Zero or negative margin used / account value is rejected.
    pub fn classify_liquidation_risk(
        &self,
        position: &Position,
        days_to_repay: Decimal,
    ) -> Result<RiskAssessment> {
        let liquidity_ratio = position.liquidity_ratio()?;
        let leverage = position.leverage()?;
        let p = &self.params;

        let (tier, reason) = if leverage > p.max_leverage {
            (RiskTier::Critical, "leverage exceeds maximum allowed".to_string())
        } else if liquidity_ratio < p.margin_call_threshold {
            if days_to_repay > p.repayment_grace_days {
                (
                    RiskTier::High,
                    format!("margin call issued: {days_to_repay} days to repay"),
                )
            } else {
                (
                    RiskTier::Critical,
                    "immediate liquidation risk: add collateral".to_string(),
                )
            }
        } else if liquidity_ratio < p.min_liquidity_ratio {
            (
                RiskTier::Medium,
                "increase collateral or reduce exposure".to_string(),
            )
        } else {
            (RiskTier::Low, "position within risk limits".to_string())
        };

        if tier.requires_margin_call() {
            tracing::info!(%tier, %leverage, %liquidity_ratio, "position flagged");
        }

        Ok(RiskAssessment {
            tier,
            reason,
            liquidity_ratio,
            leverage,
        })
    }

    /// Classify, and for HIGH or CRITICAL positions schedule the margin call repayment.
    pub fn decide(
        &self,
        position: &Position,
        days_to_repay: Decimal,
        margin_call_amount: Quote,
        daily_income: Quote,
        scheduler: &RepaymentScheduler,
    ) -> Result<MarginDecision> {
        let assessment = self.classify_liquidation_risk(position, days_to_repay)?;
        let repayment = if assessment.tier.requires_margin_call() {
            let outcome = scheduler.plan_default(margin_call_amount, daily_income);
            if let Err(err) = &outcome {
                tracing::warn!(tier = %assessment.tier, %err, "repayment schedule unavailable");
            }
            Some(outcome)
        } else {
            None
        };
        Ok(MarginDecision {
            assessment,
            repayment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repayment::RepaymentParams;

    fn position(account: Decimal, margin: Decimal, credit: Decimal) -> Position {
        Position {
            collateral_quantity: dec!(10),
            reference_price: Price::new_unchecked(dec!(42000)),
            account_value: Quote::new(account),
            margin_used: Quote::new(margin),
            available_credit: Quote::new(credit),
        }
    }

    #[test]
    fn notional_calculation() {
        let p = position(dec!(1), dec!(1), dec!(0));
        assert_eq!(p.notional_value().value(), dec!(420000));
    }

    #[test]
    fn requirement_base_plus_volatility() {
        let engine = MarginEngine::default();
        // 20% + 0.04 * 1.5 = 26%
        let req = engine.margin_requirement(Quote::new(dec!(100000)), dec!(0.04));
        assert_eq!(req.value(), dec!(26000));
    }

    #[test]
    fn requirement_capped_at_notional() {
        let engine = MarginEngine::default();
        let req = engine.margin_requirement(Quote::new(dec!(100000)), dec!(0.9));
        assert_eq!(req.value(), dec!(100000));
    }

    #[test]
    fn leverage_dominates() {
        let engine = MarginEngine::default();
        // leverage 6 > 5, liquidity ratio (1 + 100) / 6 is comfortable
        let a = engine
            .classify_liquidation_risk(&position(dec!(1), dec!(6), dec!(100)), dec!(10))
            .unwrap();
        assert_eq!(a.tier, RiskTier::Critical);
        assert_eq!(a.reason, "leverage exceeds maximum allowed");
    }

    #[test]
    fn margin_call_split_by_repay_time() {
        let engine = MarginEngine::default();
        // ratio (100 + 0) / 200 = 0.5 < 0.75, leverage 2
        let p = position(dec!(100), dec!(200), dec!(0));
        let high = engine.classify_liquidation_risk(&p, dec!(3)).unwrap();
        assert_eq!(high.tier, RiskTier::High);
        assert!(high.reason.contains("3 days"));

        let critical = engine.classify_liquidation_risk(&p, dec!(2)).unwrap();
        assert_eq!(critical.tier, RiskTier::Critical);
    }

    #[test]
    fn medium_and_low_tiers() {
        let engine = MarginEngine::default();
        // ratio 1.5
        let medium = engine
            .classify_liquidation_risk(&position(dec!(100), dec!(100), dec!(50)), dec!(5))
            .unwrap();
        assert_eq!(medium.tier, RiskTier::Medium);

        // ratio exactly 2.0 is not below the minimum
        let low = engine
            .classify_liquidation_risk(&position(dec!(100), dec!(100), dec!(100)), dec!(5))
            .unwrap();
        assert_eq!(low.tier, RiskTier::Low);
        assert_eq!(low.liquidity_ratio, dec!(2));
    }

    #[test]
    fn zero_margin_used_rejected() {
        let engine = MarginEngine::default();
        let result = engine.classify_liquidation_risk(&position(dec!(100), dec!(0), dec!(0)), dec!(5));
        assert!(matches!(result, Err(RiskError::InvalidInput { .. })));
    }

    #[test]
    fn zero_account_value_rejected() {
        let engine = MarginEngine::default();
        let result = engine.classify_liquidation_risk(&position(dec!(0), dec!(10), dec!(0)), dec!(5));
        assert!(matches!(result, Err(RiskError::InvalidInput { .. })));
    }

    #[test]
    fn underwater_account_is_tiered() {
        let engine = MarginEngine::default();
        // leverage -10, ratio (-1000 + 2000) / 10000 = 0.1
        let p = position(dec!(-1000), dec!(10000), dec!(2000));
        let urgent = engine.classify_liquidation_risk(&p, dec!(1)).unwrap();
        assert_eq!(urgent.tier, RiskTier::Critical);
        assert_eq!(urgent.leverage, dec!(-10));
        assert_eq!(urgent.liquidity_ratio, dec!(0.1));

        let call = engine.classify_liquidation_risk(&p, dec!(4)).unwrap();
        assert_eq!(call.tier, RiskTier::High);
    }

    #[test]
    fn failed_schedule_keeps_assessment() {
        let engine = MarginEngine::default();
        let scheduler = RepaymentScheduler::default();
        let p = position(dec!(100), dec!(200), dec!(0));
        let decision = engine
            .decide(&p, dec!(3), Quote::new(dec!(1000)), Quote::zero(), &scheduler)
            .unwrap();
        assert_eq!(decision.assessment.tier, RiskTier::High);
        assert!(matches!(decision.repayment, Some(Err(RiskError::InvalidInput { .. }))));
    }

    #[test]
    fn original_example_position() {
        // 10 BTC at 42k, half the value used as margin, 20% credit line
        let engine = MarginEngine::default();
        let value = dec!(420000);
        let p = position(value, value * dec!(0.5), value * dec!(0.2));
        let a = engine.classify_liquidation_risk(&p, dec!(3)).unwrap();
        // ratio 2.4, leverage 0.5
        assert_eq!(a.tier, RiskTier::Low);
        assert_eq!(a.leverage, dec!(0.5));
    }

    #[test]
    fn decide_attaches_repayment_for_margin_calls() {
        let engine = MarginEngine::default();
        let scheduler = RepaymentScheduler::new(RepaymentParams::default());
        let p = position(dec!(100), dec!(200), dec!(0));

        let decision = engine
            .decide(&p, dec!(3), Quote::new(dec!(1000)), Quote::new(dec!(500)), &scheduler)
            .unwrap();
        assert_eq!(decision.assessment.tier, RiskTier::High);
        assert!(matches!(decision.repayment, Some(Ok(RepaymentOutcome::Feasible(_)))));

        let calm = position(dec!(100), dec!(10), dec!(0));
        let decision = engine
            .decide(&calm, dec!(3), Quote::new(dec!(1000)), Quote::new(dec!(500)), &scheduler)
            .unwrap();
        assert!(decision.repayment.is_none());
    }

    #[test]
    fn min_collateral_check() {
        let engine = MarginEngine::default();
        let mut p = position(dec!(1), dec!(1), dec!(0));
        assert!(engine.check_min_collateral(&p).is_ok());
        p.collateral_quantity = dec!(0.05);
        assert!(engine.check_min_collateral(&p).is_err());
    }

    #[test]
    fn tiers_order_by_severity() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::High < RiskTier::Critical);
        assert_eq!(RiskTier::Critical.to_string(), "CRITICAL");
    }
}
