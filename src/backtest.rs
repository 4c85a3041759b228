// 10.0 backtest.rs: replay a fixed exposure against historical returns.
// each day's value depends on the previous day's, so a single run is strictly sequential.
// independent runs (different configs) are parallel via run_many.

use crate::error::{Result, RiskError};
use crate::events::{DrawdownEvent, EventLog, RiskEvent, RiskEventPayload};
use crate::repository::ReturnsRepository;
use crate::stats;
use crate::types::{Quote, SQRT_TRADING_DAYS};
use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: Quote,
    /// Fraction of portfolio value exposed to the asset's daily return.
    pub exposure: Decimal,
    /// Event trigger on (value - initial) / initial. Negative.
    pub max_drawdown_threshold: Decimal,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: Quote::new(dec!(100000)),
            exposure: Decimal::ONE,
            max_drawdown_threshold: dec!(-0.20),
            start: None,
            end: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub final_value: Quote,
    pub total_return: Decimal,
    /// Worst peak-to-trough decline of the portfolio value. Always <= 0.
    pub max_drawdown: Decimal,
    /// None when daily returns have no dispersion.
    pub sharpe_ratio: Option<Decimal>,
    pub risk_events: Vec<RiskEvent>,
    pub equity_curve: Vec<(NaiveDate, Quote)>,
}

impl BacktestReport {
    pub fn days(&self) -> usize {
        self.equity_curve.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BacktestSimulator;

impl BacktestSimulator {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, repo: &ReturnsRepository, config: &BacktestConfig) -> Result<BacktestReport> {
        if !config.initial_capital.is_positive() {
            return Err(RiskError::invalid(format!(
                "initial capital {} must be positive",
                config.initial_capital
            )));
        }
        if config.max_drawdown_threshold >= Decimal::ZERO {
            return Err(RiskError::invalid(format!(
                "drawdown threshold {} must be negative",
                config.max_drawdown_threshold
            )));
        }

        let sliced;
        let window = match (config.start, config.end) {
            (None, None) => repo,
            (start, end) => {
                sliced = repo.slice(
                    start.unwrap_or(repo.first().date),
                    end.unwrap_or(repo.last().date),
                )?;
                &sliced
            }
        };
        if window.len() < 2 {
            return Err(RiskError::insufficient(2, window.len()));
        }

        let initial = config.initial_capital.value();
        let mut value = initial;
        let mut log = EventLog::new();
        let mut daily_returns = Vec::with_capacity(window.len() - 1);
        let mut equity_curve = Vec::with_capacity(window.len());
        equity_curve.push((window.first().date, config.initial_capital));

        for obs in &window.observations()[1..] {
            let portfolio_return = obs.daily_return.unwrap_or(Decimal::ZERO) * config.exposure;
            value *= Decimal::ONE + portfolio_return;
            daily_returns.push(portfolio_return);
            equity_curve.push((obs.date, Quote::new(value)));

            let drawdown = (value - initial) / initial;
            if drawdown < config.max_drawdown_threshold {
                tracing::debug!(date = %obs.date, %drawdown, "drawdown threshold breached");
                log.emit(
                    obs.date,
                    RiskEventPayload::MaxDrawdownExceeded(DrawdownEvent {
                        drawdown,
                        threshold: config.max_drawdown_threshold,
                        portfolio_value: Quote::new(value),
                    }),
                );
            }
        }

        let values: Vec<Decimal> = equity_curve.iter().map(|(_, v)| v.value()).collect();
        let max_drawdown = stats::drawdown_series(&values)
            .into_iter()
            .min()
            .unwrap_or(Decimal::ZERO);

        let report = BacktestReport {
            final_value: Quote::new(value),
            total_return: (value - initial) / initial,
            max_drawdown,
            sharpe_ratio: sharpe_ratio(&daily_returns),
            risk_events: log.into_events(),
            equity_curve,
        };

        tracing::info!(
            days = report.days(),
            final_value = %report.final_value,
            max_drawdown = %report.max_drawdown,
            risk_events = report.risk_events.len(),
            "backtest complete"
        );
        Ok(report)
    }

    /// Independent runs over the same history. Results keep the order of `configs`.
    pub fn run_many(
        &self,
        repo: &ReturnsRepository,
        configs: &[BacktestConfig],
    ) -> Vec<Result<BacktestReport>> {
        configs.par_iter().map(|config| self.run(repo, config)).collect()
    }
}

// annualized mean / std of daily portfolio returns
fn sharpe_ratio(daily_returns: &[Decimal]) -> Option<Decimal> {
    let mean = stats::mean(daily_returns).ok()?;
    let std = stats::sample_std(daily_returns).ok()?;
    if std.is_zero() {
        return None;
    }
    Some(mean / std * SQRT_TRADING_DAYS)
}
