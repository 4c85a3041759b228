// 5.0 repayment.rs: schedule for covering a margin call out of daily income.
// only a conservative slice of income is counted as available. a 10% buffer is added on top
// of the call amount. a schedule longer than the allowed window is a normal, typed outcome.

use crate::error::{Result, RiskError};
use crate::types::Quote;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepaymentParams {
    // fraction of daily income counted as available for repayment
    pub income_fraction: Decimal,
    // buffer on top of the margin call, as a fraction of it
    pub buffer_rate: Decimal,
    // default repayment window in days
    pub max_days: u32,
}

impl Default for RepaymentParams {
    fn default() -> Self {
        Self {
            income_fraction: dec!(0.6),
            buffer_rate: dec!(0.1),
            max_days: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentPlan {
    pub daily_payment: Quote,
    pub days_required: u32,
    pub total_amount: Quote,
    pub buffer_amount: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepaymentOutcome {
    Feasible(RepaymentPlan),
    Infeasible { min_days_required: u32, max_days: u32 },
}

impl RepaymentOutcome {
    pub fn is_feasible(&self) -> bool {
        matches!(self, RepaymentOutcome::Feasible(_))
    }

    pub fn plan(&self) -> Option<&RepaymentPlan> {
        match self {
            RepaymentOutcome::Feasible(plan) => Some(plan),
            RepaymentOutcome::Infeasible { .. } => None,
        }
    }

    /// For callers that treat an infeasible schedule as a failure.
    pub fn into_result(self) -> Result<RepaymentPlan> {
        match self {
            RepaymentOutcome::Feasible(plan) => Ok(plan),
            RepaymentOutcome::Infeasible {
                min_days_required,
                max_days,
            } => Err(RiskError::InfeasiblePlan {
                min_days_required,
                max_days,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepaymentScheduler {
    params: RepaymentParams,
}

impl RepaymentScheduler {
    pub fn new(params: RepaymentParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RepaymentParams {
        &self.params
    }

    pub fn plan_default(&self, margin_call_amount: Quote, daily_income: Quote) -> Result<RepaymentOutcome> {
        self.plan(margin_call_amount, daily_income, self.params.max_days)
    }

    /// Smallest whole number of days that covers the call from available income.
    pub fn plan(
        &self,
        margin_call_amount: Quote,
        daily_income: Quote,
        max_days: u32,
    ) -> Result<RepaymentOutcome> {
        if !margin_call_amount.is_positive() {
            return Err(RiskError::invalid(format!(
                "margin call amount {margin_call_amount} must be positive"
            )));
        }
        let available_daily = daily_income.mul(self.params.income_fraction);
        if !available_daily.is_positive() {
            return Err(RiskError::invalid(format!(
                "no repayment capacity from daily income {daily_income}"
            )));
        }

        let min_days = (margin_call_amount.value() / available_daily.value()).ceil();
        let Some(days) = min_days.to_u32().filter(|d| *d <= max_days) else {
            let min_days_required = min_days.to_u32().unwrap_or(u32::MAX);
            tracing::debug!(min_days_required, max_days, "repayment window exceeded");
            return Ok(RepaymentOutcome::Infeasible {
                min_days_required,
                max_days,
            });
        };

        let buffer_amount = margin_call_amount.mul(self.params.buffer_rate);
        let total_amount = margin_call_amount.add(buffer_amount);
        let daily_payment = covering_installment(total_amount.value(), days);

        Ok(RepaymentOutcome::Feasible(RepaymentPlan {
            daily_payment: Quote::new(daily_payment),
            days_required: days,
            total_amount,
            buffer_amount,
        }))
    }
}

// total / days, nudged up by one unit in the last place if division rounded short
fn covering_installment(total: Decimal, days: u32) -> Decimal {
    let days = Decimal::from(days);
    let payment = total / days;
    if payment * days >= total {
        payment
    } else {
        payment + Decimal::new(1, payment.scale())
    }
}
