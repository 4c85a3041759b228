//! Historical price series with lazily cached derived columns.
//!
//! A [`ReturnsRepository`] is built once per analysis run and then only read.
//! Derived series (rolling volatility, moving averages, drawdown) are computed
//! on first request and cached per window. Computing a series twice yields the
//! same values, so racing readers that both miss the cache are harmless: the
//! first insert wins and the second result is dropped.

use crate::error::{Result, RiskError};
use crate::stats;
use crate::table::{self, PriceTable};
use crate::types::{Price, SQRT_TRADING_DAYS};
use chrono::NaiveDate;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// One raw OHLCV row as delivered by the data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    /// Close-only bar. open/high/low mirror the close, volume is zero.
    pub fn close_only(date: NaiveDate, close: Decimal) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
        }
    }
}

/// Validated row. `daily_return` is None for the first observation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Price,
    pub volume: Decimal,
    pub daily_return: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Derived {
    ReturnStd,
    Volatility,
    CloseSma,
    VolumeMa,
    VolumeRatio,
}

type Series = Arc<[Option<Decimal>]>;

#[derive(Debug, Default)]
struct DerivedCache {
    windows: RwLock<HashMap<(Derived, usize), Series>>,
    drawdown: OnceLock<Arc<[Decimal]>>,
}

#[derive(Debug)]
pub struct ReturnsRepository {
    observations: Vec<Observation>,
    cache: DerivedCache,
}

impl ReturnsRepository {
    /// Validate and index a series. Dates must be strictly increasing and closes positive.
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        if bars.is_empty() {
            return Err(RiskError::insufficient(1, 0));
        }

        let mut observations: Vec<Observation> = Vec::with_capacity(bars.len());
        for (idx, bar) in bars.into_iter().enumerate() {
            let close = Price::new(bar.close).ok_or_else(|| {
                RiskError::invalid(format!("non-positive close {} on {}", bar.close, bar.date))
            })?;
            if bar.volume < Decimal::ZERO {
                return Err(RiskError::invalid(format!(
                    "negative volume {} on {}",
                    bar.volume, bar.date
                )));
            }

            let daily_return = match observations.last() {
                Some(prev) => {
                    if bar.date <= prev.date {
                        return Err(RiskError::invalid(format!(
                            "dates not strictly increasing at row {idx}: {} after {}",
                            bar.date, prev.date
                        )));
                    }
                    Some(close.value() / prev.close.value() - Decimal::ONE)
                }
                None => None,
            };

            observations.push(Observation {
                date: bar.date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close,
                volume: bar.volume,
                daily_return,
            });
        }

        tracing::debug!(
            observations = observations.len(),
            first = %observations[0].date,
            "returns repository built"
        );

        Ok(Self {
            observations,
            cache: DerivedCache::default(),
        })
    }

    /// Build from a raw or pre-enriched table. Requires Date and Close.
    pub fn from_table(table: &PriceTable) -> Result<Self> {
        let dates = table.require(table::DATE)?;
        let closes = table.require(table::CLOSE)?;
        let opens = table.column(table::OPEN);
        let highs = table.column(table::HIGH);
        let lows = table.column(table::LOW);
        let volumes = table.column(table::VOLUME);

        if table.is_enriched() {
            tracing::debug!("enriched columns present; derived series will be recomputed");
        }

        let mut bars = Vec::with_capacity(table.rows());
        for row in 0..table.rows() {
            let date = parse_date(&dates[row], row)?;
            let close = parse_decimal(table::CLOSE, &closes[row], row)?;
            let optional = |col: Option<&[String]>, name: &str, fallback: Decimal| -> Result<Decimal> {
                match col.map(|c| c[row].as_str()) {
                    Some(cell) if !cell.is_empty() => parse_decimal(name, cell, row),
                    _ => Ok(fallback),
                }
            };

            bars.push(Bar {
                date,
                open: optional(opens, table::OPEN, close)?,
                high: optional(highs, table::HIGH, close)?,
                low: optional(lows, table::LOW, close)?,
                close,
                volume: optional(volumes, table::VOLUME, Decimal::ZERO)?,
            });
        }

        Self::new(bars)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    // construction rejects empty series
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn first(&self) -> &Observation {
        &self.observations[0]
    }

    pub fn last(&self) -> &Observation {
        &self.observations[self.observations.len() - 1]
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    pub fn closes(&self) -> Vec<Decimal> {
        self.observations.iter().map(|o| o.close.value()).collect()
    }

    pub fn volumes(&self) -> Vec<Decimal> {
        self.observations.iter().map(|o| o.volume).collect()
    }

    /// Defined daily returns, i.e. every observation but the first.
    pub fn returns(&self) -> Vec<Decimal> {
        self.observations.iter().filter_map(|o| o.daily_return).collect()
    }

    pub fn log_returns(&self) -> Result<Vec<Decimal>> {
        self.observations
            .windows(2)
            .map(|w| {
                let ratio = w[1].close.value() / w[0].close.value();
                ratio
                    .checked_ln()
                    .ok_or_else(|| RiskError::invalid(format!("log of ratio {ratio}")))
            })
            .collect()
    }

    /// Inclusive date range as a fresh repository. The first observation has no return.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(RiskError::invalid(format!("slice start {start} after end {end}")));
        }
        let bars: Vec<Bar> = self
            .observations
            .iter()
            .filter(|o| o.date >= start && o.date <= end)
            .map(Observation::to_bar)
            .collect();
        Self::new(bars)
    }

    /// Last `n` observations as a fresh repository.
    pub fn tail(&self, n: usize) -> Result<Self> {
        if n > self.len() {
            return Err(RiskError::insufficient(n, self.len()));
        }
        let bars = self.observations[self.len() - n..]
            .iter()
            .map(Observation::to_bar)
            .collect();
        Self::new(bars)
    }

    /// Trailing sample std of daily returns, aligned to observations.
    /// None where fewer than `window` returns are available.
    pub fn rolling_return_std(&self, window: usize) -> Series {
        self.cached(Derived::ReturnStd, window, || {
            let returns: Vec<Option<Decimal>> =
                self.observations.iter().map(|o| o.daily_return).collect();
            (0..returns.len())
                .map(|t| {
                    if window < 2 || t < window {
                        return None;
                    }
                    let slice: Option<Vec<Decimal>> = returns[t + 1 - window..=t].iter().copied().collect();
                    slice.and_then(|s| stats::sample_std(&s).ok())
                })
                .collect()
        })
    }

    /// Rolling annualized volatility: rolling return std * sqrt(252).
    pub fn rolling_volatility(&self, window: usize) -> Series {
        self.cached(Derived::Volatility, window, || {
            self.rolling_return_std(window)
                .iter()
                .map(|s| s.map(|v| v * SQRT_TRADING_DAYS))
                .collect()
        })
    }

    /// Trailing simple moving average of close.
    pub fn rolling_close_mean(&self, window: usize) -> Series {
        self.cached(Derived::CloseSma, window, || rolling_mean(&self.closes(), window))
    }

    pub fn volume_ma(&self, window: usize) -> Series {
        self.cached(Derived::VolumeMa, window, || rolling_mean(&self.volumes(), window))
    }

    /// Volume over its trailing mean. None where the mean is undefined or zero.
    pub fn volume_ratio(&self, window: usize) -> Series {
        self.cached(Derived::VolumeRatio, window, || {
            self.volume_ma(window)
                .iter()
                .zip(&self.observations)
                .map(|(ma, o)| match ma {
                    Some(ma) if !ma.is_zero() => Some(o.volume / *ma),
                    _ => None,
                })
                .collect()
        })
    }

    /// Drawdown from the running maximum close, per observation.
    pub fn drawdown(&self) -> Arc<[Decimal]> {
        self.cache
            .drawdown
            .get_or_init(|| stats::drawdown_series(&self.closes()).into())
            .clone()
    }

    fn cached<F>(&self, kind: Derived, window: usize, compute: F) -> Series
    where
        F: FnOnce() -> Vec<Option<Decimal>>,
    {
        let key = (kind, window);
        if let Some(hit) = self
            .cache
            .windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return hit.clone();
        }

        let computed: Series = compute().into();
        tracing::debug!(?kind, window, "derived series cached");

        self.cache
            .windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(computed)
            .clone()
    }
}

impl Observation {
    fn to_bar(&self) -> Bar {
        Bar {
            date: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close.value(),
            volume: self.volume,
        }
    }
}

fn rolling_mean(values: &[Decimal], window: usize) -> Vec<Option<Decimal>> {
    (0..values.len())
        .map(|t| {
            if window == 0 || t + 1 < window {
                return None;
            }
            stats::mean(&values[t + 1 - window..=t]).ok()
        })
        .collect()
}

fn parse_date(cell: &str, row: usize) -> Result<NaiveDate> {
    // accepts "2024-01-31" and "2024-01-31 00:00:00+00:00"
    let day = cell.get(..10).unwrap_or(cell);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| RiskError::Parse {
        column: table::DATE.to_string(),
        row,
        value: cell.to_string(),
    })
}

fn parse_decimal(column: &str, cell: &str, row: usize) -> Result<Decimal> {
    Decimal::from_str(cell)
        .or_else(|_| Decimal::from_scientific(cell))
        .map_err(|_| RiskError::Parse {
            column: column.to_string(),
            row,
            value: cell.to_string(),
        })
}
