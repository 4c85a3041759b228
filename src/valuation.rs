//! ahr999 valuation index.
//!
//! `index = (close / SMA200(close)) * (close / growth)` where
//! `growth = 10^(5.84 * log10(age_days) - 17.01)` and `age_days` counts from the
//! genesis block (2009-01-03). Below 0.45 has historically been a buying zone;
//! above 5 is overheated.

use crate::repository::ReturnsRepository;
use chrono::NaiveDate;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SMA_WINDOW: usize = 200;

const GROWTH_SLOPE: Decimal = dec!(5.84);
const GROWTH_INTERCEPT: Decimal = dec!(17.01);

pub fn genesis() -> NaiveDate {
    NaiveDate::from_ymd_opt(2009, 1, 3).unwrap_or(NaiveDate::MIN)
}

/// Power-law growth valuation for `date`. None on or before genesis.
pub fn growth_valuation(date: NaiveDate) -> Option<Decimal> {
    let age_days = (date - genesis()).num_days();
    if age_days <= 0 {
        return None;
    }
    let exponent = GROWTH_SLOPE * Decimal::from(age_days).checked_log10()? - GROWTH_INTERCEPT;
    Decimal::TEN.checked_powd(exponent)
}

/// Index per observation. None for the first 199 days and wherever growth is undefined.
pub fn ahr999(repo: &ReturnsRepository) -> Vec<Option<Decimal>> {
    let sma = repo.rolling_close_mean(SMA_WINDOW);
    repo.observations()
        .iter()
        .zip(sma.iter())
        .map(|(obs, sma)| {
            let sma = (*sma)?;
            let growth = growth_valuation(obs.date)?;
            let close = obs.close.value();
            let cost_ratio = close.checked_div(sma)?;
            let growth_ratio = close.checked_div(growth)?;
            cost_ratio.checked_mul(growth_ratio)
        })
        .collect()
}

/// Latest defined index value with its zone.
pub fn current(repo: &ReturnsRepository) -> Option<(Decimal, ValuationZone)> {
    ahr999(repo)
        .into_iter()
        .rev()
        .flatten()
        .next()
        .map(|index| (index, ValuationZone::classify(index)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValuationZone {
    Buy,
    Accumulate,
    Wait,
    Overheated,
}

impl ValuationZone {
    pub fn classify(index: Decimal) -> Self {
        if index < dec!(0.45) {
            ValuationZone::Buy
        } else if index < dec!(1.2) {
            ValuationZone::Accumulate
        } else if index < dec!(5) {
            ValuationZone::Wait
        } else {
            ValuationZone::Overheated
        }
    }
}

impl fmt::Display for ValuationZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValuationZone::Buy => "BUY",
            ValuationZone::Accumulate => "ACCUMULATE",
            ValuationZone::Wait => "WAIT",
            ValuationZone::Overheated => "OVERHEATED",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Bar;

    fn flat_repo(close: Decimal, days: i64) -> ReturnsRepository {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let bars = (0..days)
            .map(|d| Bar::close_only(start + chrono::Duration::days(d), close))
            .collect();
        ReturnsRepository::new(bars).unwrap()
    }

    #[test]
    fn undefined_before_full_sma_window() {
        let index = ahr999(&flat_repo(dec!(20000), 210));
        assert!(index[..SMA_WINDOW - 1].iter().all(Option::is_none));
        assert!(index[SMA_WINDOW - 1..].iter().all(Option::is_some));
    }

    #[test]
    fn growth_rises_with_age() {
        let early = growth_valuation(NaiveDate::from_ymd_opt(2015, 1, 1).unwrap()).unwrap();
        let late = growth_valuation(NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()).unwrap();
        assert!(late > early);
        assert_eq!(growth_valuation(genesis()), None);
    }

    #[test]
    fn flat_history_index_is_price_over_growth() {
        let low = current(&flat_repo(dec!(20000), 220)).unwrap().0;
        let high = current(&flat_repo(dec!(40000), 220)).unwrap().0;
        // the SMA ratio is 1 on a flat series, leaving close / growth
        assert!((high / low - dec!(2)).abs() < dec!(0.000001));
    }

    #[test]
    fn zones() {
        assert_eq!(ValuationZone::classify(dec!(0.3)), ValuationZone::Buy);
        assert_eq!(ValuationZone::classify(dec!(0.45)), ValuationZone::Accumulate);
        assert_eq!(ValuationZone::classify(dec!(1.2)), ValuationZone::Wait);
        assert_eq!(ValuationZone::classify(dec!(5)), ValuationZone::Overheated);
    }
}
