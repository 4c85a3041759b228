//! End-to-end scenarios
//!
//! These tests run the engine over constructed histories with known answers.

use chrono::NaiveDate;
use collateral_risk::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
}

fn repo_from(closes: &[Decimal]) -> ReturnsRepository {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar::close_only(start() + chrono::Duration::days(i as i64), *c))
        .collect();
    ReturnsRepository::new(bars).unwrap()
}

/// Flat for 400 days except a single 40% drop on day 200.
fn crash_history() -> ReturnsRepository {
    let closes: Vec<Decimal> = (0..400)
        .map(|d| if d < 200 { dec!(50000) } else { dec!(30000) })
        .collect();
    repo_from(&closes)
}

mod recommendation {
    use super::*;

    #[test]
    fn single_crash_sets_ltv_and_threshold() {
        let repo = crash_history();
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        let params = ParameterRecommender::default().recommend(&calc).unwrap();

        assert_eq!(params.liquidation.max_daily_drop, dec!(-0.4));
        assert!(params.recommended_initial_ltv() <= dec!(0.8));
        assert_eq!(params.recommended_initial_ltv(), dec!(0.8) / dec!(1.4));
        assert_eq!(
            params.liquidation_threshold(),
            params.recommended_initial_ltv() * dec!(0.9)
        );
    }

    #[test]
    fn unrecovered_crash_keeps_default_window() {
        let repo = crash_history();
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        let params = ParameterRecommender::default().recommend(&calc).unwrap();

        assert_eq!(params.repayment.drop_events, 1);
        assert_eq!(params.repayment.median_recovery, Some(dec!(30)));
        assert_eq!(params.recommended_window(), 5);
    }

    #[test]
    fn rate_curve_is_anchored_on_base_rate() {
        let repo = crash_history();
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        let curve = ParameterRecommender::default().recommend(&calc).unwrap().interest;

        assert_eq!(curve.optimal_utilization, dec!(0.8));
        assert_eq!(curve.max_rate, curve.base_rate * dec!(3));
        assert_eq!(curve.rate_at(Decimal::ZERO), curve.base_rate);
        let kink = curve.rate_at(dec!(0.8));
        assert!((kink - curve.base_rate * dec!(2)).abs() < dec!(0.0000000001));
        assert!(curve.rate_at(dec!(0.9)) > curve.rate_at(dec!(0.8)));
    }

    #[test]
    fn synthetic_history_yields_sane_parameters() {
        let repo = SyntheticHistory::default().repository().unwrap();
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        let params = ParameterRecommender::default().recommend(&calc).unwrap();

        assert!(params.recommended_initial_ltv() > Decimal::ZERO);
        assert!(params.recommended_initial_ltv() <= dec!(0.8));
        assert!(params.recommended_window() <= 5);
        assert!(params.repayment.drop_events > 0);
        assert_eq!(params.liquidation.moves_by_window.len(), 6);
    }
}

mod stress {
    use super::*;

    #[test]
    fn default_scenarios_in_order() {
        let repo = SyntheticHistory { days: 500, ..SyntheticHistory::default() }
            .repository()
            .unwrap();
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        let runner = StressTestRunner::new(&calc, MarginEngine::default()).unwrap();
        let outcomes = runner.run(Quote::new(dec!(420000)), &default_scenarios());

        let names: Vec<&str> = outcomes.iter().map(|o| o.scenario.as_str()).collect();
        assert_eq!(names, vec!["Major Crash", "Moderate Correction", "Bull Run"]);

        let crash = outcomes[0].result.as_ref().unwrap();
        let rally = outcomes[2].result.as_ref().unwrap();
        assert_eq!(crash.portfolio_impact, dec!(-0.4));
        assert_eq!(rally.portfolio_impact, dec!(0.3));
        assert!(crash.shocked_volatility > rally.shocked_volatility);
        for outcome in &outcomes {
            let p = outcome.result.as_ref().unwrap().margin_call_probability;
            assert!(p >= Decimal::ZERO && p <= Decimal::ONE);
        }
    }
}

mod repayment {
    use super::*;

    #[test]
    fn thousand_over_five_hundred() {
        let outcome = RepaymentScheduler::default()
            .plan(Quote::new(dec!(1000)), Quote::new(dec!(500)), 5)
            .unwrap();
        let plan = outcome.into_result().unwrap();
        assert_eq!(plan.days_required, 4);
        assert_eq!(plan.buffer_amount.value(), dec!(100));
        assert_eq!(plan.daily_payment.value(), dec!(275));
    }

    #[test]
    fn ten_thousand_over_one_hundred_is_infeasible() {
        let outcome = RepaymentScheduler::default()
            .plan(Quote::new(dec!(10000)), Quote::new(dec!(100)), 5)
            .unwrap();
        assert!(!outcome.is_feasible());
        assert!(matches!(
            outcome,
            RepaymentOutcome::Infeasible { min_days_required: 167, max_days: 5 }
        ));
    }

    #[test]
    fn margin_call_decision_attaches_schedule() {
        let position = Position {
            collateral_quantity: dec!(2),
            reference_price: Price::new_unchecked(dec!(42000)),
            account_value: Quote::new(dec!(40000)),
            margin_used: Quote::new(dec!(80000)),
            available_credit: Quote::new(dec!(10000)),
        };
        let decision = MarginEngine::default()
            .decide(
                &position,
                dec!(4),
                Quote::new(dec!(1000)),
                Quote::new(dec!(500)),
                &RepaymentScheduler::default(),
            )
            .unwrap();
        assert_eq!(decision.assessment.tier, RiskTier::High);
        assert!(decision.repayment.unwrap().unwrap().is_feasible());
    }
}

mod boundaries {
    use super::*;

    #[test]
    fn zero_margin_used_is_invalid_input() {
        let position = Position {
            collateral_quantity: dec!(1),
            reference_price: Price::new_unchecked(dec!(42000)),
            account_value: Quote::new(dec!(10000)),
            margin_used: Quote::zero(),
            available_credit: Quote::new(dec!(5000)),
        };
        let result = MarginEngine::default().classify_liquidation_risk(&position, dec!(3));
        assert!(matches!(result, Err(RiskError::InvalidInput { .. })));
    }

    #[test]
    fn volatility_is_bit_identical_across_calls() {
        let repo = SyntheticHistory { days: 120, ..SyntheticHistory::default() }
            .repository()
            .unwrap();
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        let first = calc.volatility(30).unwrap();
        let second = calc.volatility(30).unwrap();
        assert_eq!(first.serialize(), second.serialize());
    }

    #[test]
    fn short_history_reports_insufficient_data() {
        let repo = repo_from(&[dec!(100), dec!(101), dec!(99), dec!(102)]);
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        assert!(matches!(
            calc.volatility(30),
            Err(RiskError::InsufficientData { .. })
        ));
    }

    #[test]
    fn out_of_order_dates_rejected() {
        let bars = vec![
            Bar::close_only(start() + chrono::Duration::days(1), dec!(100)),
            Bar::close_only(start(), dec!(101)),
        ];
        assert!(matches!(
            ReturnsRepository::new(bars),
            Err(RiskError::InvalidInput { .. })
        ));
    }
}

mod backtest {
    use super::*;

    #[test]
    fn crash_raises_ordered_drawdown_events() {
        let repo = crash_history();
        let report = BacktestSimulator::new()
            .run(&repo, &BacktestConfig::default())
            .unwrap();

        assert_eq!(report.final_value.value(), dec!(60000));
        assert_eq!(report.max_drawdown, dec!(-0.4));
        // days 200..=399 are all 40% below initial capital
        assert_eq!(report.risk_events.len(), 200);
        assert!(report.risk_events.windows(2).all(|w| w[0].date < w[1].date));
        let RiskEventPayload::MaxDrawdownExceeded(first) = &report.risk_events[0].payload;
        assert_eq!(first.drawdown, dec!(-0.4));
    }

    #[test]
    fn window_before_crash_is_quiet() {
        let repo = crash_history();
        let config = BacktestConfig {
            end: Some(start() + chrono::Duration::days(150)),
            ..BacktestConfig::default()
        };
        let report = BacktestSimulator::new().run(&repo, &config).unwrap();
        assert!(report.risk_events.is_empty());
        assert_eq!(report.days(), 151);
    }
}

mod ingest {
    use super::*;

    const CSV: &str = "\
Date,Open,High,Low,Close,Volume,Returns
2024-01-01,42000,42500,41800,42200,1000,
2024-01-02 00:00:00+00:00,42200,43000,42100,42900,1200,0.9
2024-01-03,42900,43100,41000,41500,1500,0.9
";

    #[test]
    fn enriched_csv_is_recomputed() {
        let table = PriceTable::from_csv_reader(CSV.as_bytes()).unwrap();
        assert!(table.is_enriched());
        let repo = ReturnsRepository::from_table(&table).unwrap();
        assert_eq!(repo.len(), 3);
        // the bogus Returns column is ignored
        assert_eq!(repo.observations()[1].daily_return, Some(dec!(42900) / dec!(42200) - Decimal::ONE));
    }

    #[test]
    fn missing_close_is_data_shape_error() {
        let csv = "Date,Open\n2024-01-01,1\n";
        let table = PriceTable::from_csv_reader(csv.as_bytes()).unwrap();
        assert!(matches!(
            ReturnsRepository::from_table(&table),
            Err(RiskError::DataShape { .. })
        ));
    }

    #[test]
    fn bad_cell_reports_position() {
        let csv = "Date,Close\n2024-01-01,100\n2024-01-02,abc\n";
        let table = PriceTable::from_csv_reader(csv.as_bytes()).unwrap();
        match ReturnsRepository::from_table(&table) {
            Err(RiskError::Parse { column, value, .. }) => {
                assert_eq!(column, "Close");
                assert_eq!(value, "abc");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
