// 12.0 synthetic.rs: seeded geometric random walk for demos and tests.
// log returns ~ N(drift, volatility), volume ~ LogNormal(10, 1). same seed, same series.

use crate::error::{Result, RiskError};
use crate::repository::{Bar, ReturnsRepository};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, LogNormal, Normal};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const PRICE_DP: u32 = 8;
const VOLUME_DP: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticHistory {
    pub start: NaiveDate,
    pub days: usize,
    pub start_price: f64,
    /// Mean daily log return.
    pub drift: f64,
    /// Std of daily log returns.
    pub volatility: f64,
    pub seed: u64,
}

impl Default for SyntheticHistory {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or(NaiveDate::MIN),
            days: 365 * 7,
            start_price: 1000.0,
            drift: 0.0005,
            volatility: 0.03,
            seed: 42,
        }
    }
}

impl SyntheticHistory {
    pub fn bars(&self) -> Result<Vec<Bar>> {
        if self.start_price <= 0.0 || !self.start_price.is_finite() {
            return Err(RiskError::invalid(format!(
                "start price {} must be positive",
                self.start_price
            )));
        }
        if !self.drift.is_finite() || !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(RiskError::invalid(format!(
                "drift {} and volatility {} must be finite, volatility non-negative",
                self.drift, self.volatility
            )));
        }
        let returns = Normal::new(self.drift, self.volatility)
            .map_err(|e| RiskError::invalid(format!("return distribution: {e}")))?;
        let volumes = LogNormal::new(10.0, 1.0)
            .map_err(|e| RiskError::invalid(format!("volume distribution: {e}")))?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut bars = Vec::with_capacity(self.days);
        let mut prev_close = self.start_price;
        for day in 0..self.days {
            let close = if day == 0 {
                self.start_price
            } else {
                prev_close * returns.sample(&mut rng).exp()
            };
            let volume: f64 = volumes.sample(&mut rng);
            let date = self.start + chrono::Duration::days(day as i64);

            let open = to_decimal(prev_close, PRICE_DP)?;
            let close_dec = to_decimal(close, PRICE_DP)?;
            bars.push(Bar {
                date,
                open,
                high: open.max(close_dec),
                low: open.min(close_dec),
                close: close_dec,
                volume: to_decimal(volume, VOLUME_DP)?,
            });
            prev_close = close;
        }

        tracing::debug!(days = self.days, seed = self.seed, "synthetic history generated");
        Ok(bars)
    }

    pub fn repository(&self) -> Result<ReturnsRepository> {
        ReturnsRepository::new(self.bars()?)
    }
}

fn to_decimal(value: f64, dp: u32) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(dp))
        .ok_or_else(|| RiskError::invalid(format!("{value} is not representable")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_series() {
        let config = SyntheticHistory {
            days: 100,
            ..SyntheticHistory::default()
        };
        assert_eq!(config.bars().unwrap(), config.bars().unwrap());
    }

    #[test]
    fn different_seed_different_series() {
        let a = SyntheticHistory { days: 50, ..SyntheticHistory::default() };
        let b = SyntheticHistory { seed: 7, ..a.clone() };
        assert_ne!(a.bars().unwrap(), b.bars().unwrap());
    }

    #[test]
    fn bars_are_consistent() {
        let bars = SyntheticHistory { days: 60, ..SyntheticHistory::default() }
            .bars()
            .unwrap();
        assert_eq!(bars.len(), 60);
        assert_eq!(bars[0].close, Decimal::from(1000));
        for bar in &bars {
            assert!(bar.close > Decimal::ZERO);
            assert!(bar.low <= bar.close && bar.close <= bar.high);
            assert!(bar.volume >= Decimal::ZERO);
        }
    }

    #[test]
    fn feeds_a_repository() {
        let repo = SyntheticHistory { days: 40, ..SyntheticHistory::default() }
            .repository()
            .unwrap();
        assert_eq!(repo.len(), 40);
    }

    #[test]
    fn rejects_negative_volatility() {
        let config = SyntheticHistory { volatility: -1.0, ..SyntheticHistory::default() };
        assert!(matches!(config.bars(), Err(RiskError::InvalidInput { .. })));
    }

    #[test]
    fn rejects_non_finite_drift() {
        let config = SyntheticHistory { drift: f64::NAN, ..SyntheticHistory::default() };
        assert!(matches!(config.bars(), Err(RiskError::InvalidInput { .. })));
    }
}
