//! Shared estimators.
//!
//! Every tail estimate in the crate goes through [`quantile`], so the same
//! interpolation rule is used for VaR, move statistics, drop thresholds and
//! recovery percentiles. Standard deviations use the sample (n - 1) denominator.

use crate::error::{Result, RiskError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};

pub fn mean(values: &[Decimal]) -> Result<Decimal> {
    if values.is_empty() {
        return Err(RiskError::insufficient(1, 0));
    }
    let total: Decimal = values.iter().sum();
    Ok(total / Decimal::from(values.len()))
}

pub fn sample_std(values: &[Decimal]) -> Result<Decimal> {
    if values.len() < 2 {
        return Err(RiskError::insufficient(2, values.len()));
    }
    let m = mean(values)?;
    let sum_sq: Decimal = values.iter().map(|v| (*v - m) * (*v - m)).sum();
    let variance = sum_sq / Decimal::from(values.len() - 1);
    variance
        .sqrt()
        .ok_or_else(|| RiskError::invalid(format!("negative variance {variance}")))
}

/// Quantile with linear interpolation between the two nearest order statistics.
///
/// Position is `q * (n - 1)` over the ascending sort, matching the usual
/// "linear" rule. Monotone non-decreasing in `q`.
pub fn quantile(values: &[Decimal], q: Decimal) -> Result<Decimal> {
    if values.is_empty() {
        return Err(RiskError::insufficient(1, 0));
    }
    if q < Decimal::ZERO || q > Decimal::ONE {
        return Err(RiskError::invalid(format!("quantile {q} outside [0, 1]")));
    }

    let mut sorted = values.to_vec();
    sorted.sort();
    quantile_sorted(&sorted, q)
}

pub(crate) fn quantile_sorted(sorted: &[Decimal], q: Decimal) -> Result<Decimal> {
    let last = sorted.len().saturating_sub(1);
    let pos = q * Decimal::from(last);
    let lo_pos = pos.floor();
    let lo = lo_pos
        .to_usize()
        .ok_or_else(|| RiskError::invalid(format!("quantile position {pos} not addressable")))?
        .min(last);
    let hi = (lo + 1).min(last);
    let frac = pos - lo_pos;

    let (a, b) = (sorted[lo], sorted[hi]);
    if frac.is_zero() || a == b {
        return Ok(a);
    }
    Ok(a + (b - a) * frac)
}

pub fn median(values: &[Decimal]) -> Result<Decimal> {
    quantile(values, Decimal::new(5, 1))
}

/// (price - running max) / running max for each point. Always <= 0.
pub fn drawdown_series(prices: &[Decimal]) -> Vec<Decimal> {
    let mut peak = Decimal::MIN;
    prices
        .iter()
        .map(|&p| {
            if p > peak {
                peak = p;
            }
            if peak.is_zero() {
                Decimal::ZERO
            } else {
                (p - peak) / peak
            }
        })
        .collect()
}

/// Simple returns over `window` steps: p[t] / p[t - window] - 1 for t >= window.
pub fn pct_change(prices: &[Decimal], window: usize) -> Vec<Decimal> {
    if window == 0 || prices.len() <= window {
        return Vec::new();
    }
    prices
        .windows(window + 1)
        .map(|w| w[window] / w[0] - Decimal::ONE)
        .collect()
}
