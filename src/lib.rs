// collateral-risk: risk engine for crypto-backed lending.
// historical-data-first: every parameter is derived from the observed return series.
// all computation is deterministic with no external I/O. callers own loading and output.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Price, Quote, Confidence, trading-day constants
//   1.5  error.rs: RiskError taxonomy
//   1.6  stats.rs: mean, sample std, quantile, drawdown
//   2.x  table.rs: tabular ingest from columns or CSV
//   2.1  repository.rs: validated series + cached derived columns
//   3.x  metrics.rs: volatility, VaR, expected shortfall, move stats, summary
//   4.x  margin.rs: margin requirement, liquidation-risk classification
//   5.x  repayment.rs: margin-call repayment schedule
//   6.x  stress.rs: scenario stress tests, margin-call heuristic
//   7.x  config.rs: all params, presets, validation, JSON load
//   8.x  recommender.rs: LTV, liquidation threshold, repayment window, rate curve
//   9.x  valuation.rs: ahr999 valuation index
//   10.x backtest.rs: sequential exposure replay
//   11.x events.rs: risk events raised during replay
//   12.x synthetic.rs: seeded synthetic history

// data
pub mod error;
pub mod repository;
pub mod stats;
pub mod table;
pub mod types;

// risk analysis
pub mod backtest;
pub mod events;
pub mod margin;
pub mod metrics;
pub mod recommender;
pub mod repayment;
pub mod stress;
pub mod valuation;

// support
pub mod config;
pub mod synthetic;

// re exports for convenience
pub use backtest::{BacktestConfig, BacktestReport, BacktestSimulator};
pub use config::{ConfigError, RiskConfig, RiskProfile, StressConfig};
pub use error::{Result, RiskError};
pub use events::{DrawdownEvent, EventId, EventLog, RiskEvent, RiskEventPayload};
pub use margin::{MarginDecision, MarginEngine, MarginParams, Position, RiskAssessment, RiskTier};
pub use metrics::{MetricsConfig, MoveStats, RiskMetricsCalculator, SeriesSummary};
pub use recommender::{
    InterestRateCurve, LiquidationParameters, ParameterRecommender, ProtocolParameters,
    RecommenderConfig, RepaymentWindow,
};
pub use repayment::{RepaymentOutcome, RepaymentParams, RepaymentPlan, RepaymentScheduler};
pub use repository::{Bar, Observation, ReturnsRepository};
pub use stress::{default_scenarios, RiskScenario, ScenarioOutcome, StressResult, StressTestRunner};
pub use synthetic::SyntheticHistory;
pub use table::PriceTable;
pub use types::*;
pub use valuation::ValuationZone;
