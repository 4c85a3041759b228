//! Volatility, drawdown and tail statistics over a [`ReturnsRepository`].
//!
//! VaR and expected shortfall are historical (empirical quantile) estimates on
//! daily simple returns. A more negative VaR means more loss risk. Because
//! every quantile uses the same interpolation rule, VaR(99%) <= VaR(95%) for
//! any series.
//!
//! Horizons are independent of each other, so [`RiskMetricsCalculator::move_stats_by_horizon`]
//! fans them out over rayon. Everything here only reads the repository.

use crate::error::{Result, RiskError};
use crate::repository::ReturnsRepository;
use crate::stats;
use crate::types::{Confidence, Price, SQRT_TRADING_DAYS, TRADING_DAYS};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Confidence for the headline VaR and move statistics.
    pub confidence: Confidence,
    /// Horizons (days) for multi-day move statistics.
    pub horizons: Vec<usize>,
    /// Trailing window for "current" volatility.
    pub volatility_window: usize,
    /// Trailing window for the volume moving average.
    pub volume_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            confidence: Confidence::NINETY_NINE,
            horizons: vec![1, 3, 5, 7, 14, 30],
            volatility_window: 30,
            volume_window: 30,
        }
    }
}

/// Distribution of simple returns over every overlapping `window`-day span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveStats {
    pub window: usize,
    pub max_drop: Decimal,
    pub var: Decimal,
    pub std: Decimal,
    pub samples: usize,
}

/// Headline statistics of a series, for the report layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub current_price: Price,
    pub all_time_high: Decimal,
    pub all_time_low: Decimal,
    pub average_close_30d: Option<Decimal>,
    pub mean_daily_return: Decimal,
    pub daily_return_std: Decimal,
    pub annualized_return: Decimal,
    pub annualized_volatility: Decimal,
    pub max_drawdown: Decimal,
    pub current_drawdown: Decimal,
    pub var_95: Decimal,
    pub var_99: Decimal,
    pub average_volume: Decimal,
    pub current_volume_ratio: Option<Decimal>,
    pub return_1d: Decimal,
    pub return_7d: Option<Decimal>,
    pub return_30d: Option<Decimal>,
}

pub struct RiskMetricsCalculator<'a> {
    repo: &'a ReturnsRepository,
    config: MetricsConfig,
}

impl<'a> RiskMetricsCalculator<'a> {
    pub fn new(repo: &'a ReturnsRepository, config: MetricsConfig) -> Self {
        Self { repo, config }
    }

    pub fn repository(&self) -> &'a ReturnsRepository {
        self.repo
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Annualized std of the trailing `window` daily returns.
    pub fn volatility(&self, window: usize) -> Result<Decimal> {
        self.trailing(window, self.repo.rolling_volatility(window))
    }

    /// Same as [`Self::volatility`] without annualization.
    pub fn daily_volatility(&self, window: usize) -> Result<Decimal> {
        self.trailing(window, self.repo.rolling_return_std(window))
    }

    /// Trailing daily volatility over the configured window.
    pub fn current_daily_volatility(&self) -> Result<Decimal> {
        self.daily_volatility(self.config.volatility_window)
    }

    /// Daily std over the whole history.
    pub fn full_sample_daily_volatility(&self) -> Result<Decimal> {
        stats::sample_std(&self.repo.returns())
    }

    pub fn annualized_volatility(&self) -> Result<Decimal> {
        Ok(self.full_sample_daily_volatility()? * SQRT_TRADING_DAYS)
    }

    /// (1 - c) quantile of daily returns.
    pub fn value_at_risk(&self, confidence: Confidence) -> Result<Decimal> {
        stats::quantile(&self.repo.returns(), confidence.tail())
    }

    /// Mean of daily returns at or below the VaR threshold.
    pub fn expected_shortfall(&self, confidence: Confidence) -> Result<Decimal> {
        let returns = self.repo.returns();
        let var = stats::quantile(&returns, confidence.tail())?;
        let tail: Vec<Decimal> = returns.into_iter().filter(|r| *r <= var).collect();
        stats::mean(&tail)
    }

    pub fn drawdown(&self) -> Arc<[Decimal]> {
        self.repo.drawdown()
    }

    /// Minimum of the drawdown series. Zero only for a never-declining series.
    pub fn max_drawdown(&self) -> Decimal {
        self.drawdown()
            .iter()
            .copied()
            .min()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn current_drawdown(&self) -> Decimal {
        self.drawdown().last().copied().unwrap_or(Decimal::ZERO)
    }

    pub fn log_returns(&self) -> Result<Vec<Decimal>> {
        self.repo.log_returns()
    }

    /// Max drop, VaR at the configured confidence and std of all overlapping
    /// `window`-day simple returns.
    pub fn windowed_move_stats(&self, window: usize) -> Result<MoveStats> {
        if window == 0 {
            return Err(RiskError::invalid("move window must be at least 1 day"));
        }
        let moves = stats::pct_change(&self.repo.closes(), window);
        if moves.len() < 2 {
            return Err(RiskError::insufficient(window + 2, self.repo.len()));
        }

        let max_drop = moves.iter().copied().min().unwrap_or(Decimal::ZERO);
        Ok(MoveStats {
            window,
            max_drop,
            var: stats::quantile(&moves, self.config.confidence.tail())?,
            std: stats::sample_std(&moves)?,
            samples: moves.len(),
        })
    }

    /// Move stats for every configured horizon, ordered by horizon.
    /// Horizons longer than the history are skipped.
    pub fn move_stats_by_horizon(&self) -> Vec<MoveStats> {
        let mut horizons = self.config.horizons.clone();
        horizons.sort_unstable();
        horizons.dedup();

        horizons
            .par_iter()
            .filter_map(|&window| match self.windowed_move_stats(window) {
                Ok(stats) => Some(stats),
                Err(err) => {
                    tracing::debug!(window, %err, "horizon skipped");
                    None
                }
            })
            .collect()
    }

    pub fn summary(&self) -> Result<SeriesSummary> {
        let returns = self.repo.returns();
        let observations = self.repo.observations();
        let last = self.repo.last();
        let closes = self.repo.closes();

        let mean_daily_return = stats::mean(&returns)?;
        let daily_return_std = stats::sample_std(&returns)?;

        let all_time_high = observations
            .iter()
            .map(|o| o.high.max(o.close.value()))
            .max()
            .unwrap_or(Decimal::ZERO);
        let all_time_low = observations
            .iter()
            .map(|o| o.low.min(o.close.value()))
            .min()
            .unwrap_or(Decimal::ZERO);

        let n_day_return = |n: usize| -> Option<Decimal> {
            let idx = closes.len().checked_sub(n + 1)?;
            Some(last.close.value() / closes[idx] - Decimal::ONE)
        };

        Ok(SeriesSummary {
            current_price: last.close,
            all_time_high,
            all_time_low,
            average_close_30d: self.repo.rolling_close_mean(30).last().copied().flatten(),
            mean_daily_return,
            daily_return_std,
            annualized_return: mean_daily_return * TRADING_DAYS,
            annualized_volatility: daily_return_std * SQRT_TRADING_DAYS,
            max_drawdown: self.max_drawdown(),
            current_drawdown: self.current_drawdown(),
            var_95: self.value_at_risk(Confidence::NINETY_FIVE)?,
            var_99: self.value_at_risk(Confidence::NINETY_NINE)?,
            average_volume: stats::mean(&self.repo.volumes())?,
            current_volume_ratio: self
                .repo
                .volume_ratio(self.config.volume_window)
                .last()
                .copied()
                .flatten(),
            return_1d: last.daily_return.unwrap_or(Decimal::ZERO),
            return_7d: n_day_return(7),
            return_30d: n_day_return(30),
        })
    }

    fn trailing(&self, window: usize, series: Arc<[Option<Decimal>]>) -> Result<Decimal> {
        if window < 2 {
            return Err(RiskError::invalid(format!(
                "volatility window {window} needs at least 2 returns"
            )));
        }
        series
            .last()
            .copied()
            .flatten()
            .ok_or_else(|| RiskError::insufficient(window, self.repo.len().saturating_sub(1)))
    }
}
