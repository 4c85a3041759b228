//! Property-based tests for the risk math.
//!
//! These tests verify invariants hold under random inputs.

use chrono::NaiveDate;
use collateral_risk::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn repo_from_cents(closes: &[i64]) -> ReturnsRepository {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar::close_only(start + chrono::Duration::days(i as i64), Decimal::new(*c, 2)))
        .collect();
    ReturnsRepository::new(bars).unwrap()
}

// Strategies for generating test data
fn closes_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(100i64..10_000_000i64, 3..80) // $1 to $100,000
}

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $10M
}

fn volatility_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=5_000i64).prop_map(|x| Decimal::new(x, 4)) // 0 to 50% daily
}

proptest! {
    /// 99% VaR is never less severe than 95% VaR
    #[test]
    fn var_99_at_most_var_95(closes in closes_strategy()) {
        let repo = repo_from_cents(&closes);
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        let var_99 = calc.value_at_risk(Confidence::NINETY_NINE).unwrap();
        let var_95 = calc.value_at_risk(Confidence::NINETY_FIVE).unwrap();
        prop_assert!(var_99 <= var_95);
    }

    /// Drawdown is never positive
    #[test]
    fn max_drawdown_non_positive(closes in closes_strategy()) {
        let repo = repo_from_cents(&closes);
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        prop_assert!(calc.max_drawdown() <= Decimal::ZERO);
    }

    /// A non-decreasing series has no drawdown; any decline gives a negative one
    #[test]
    fn zero_drawdown_iff_non_decreasing(mut closes in closes_strategy()) {
        let repo = repo_from_cents(&closes);
        let declines = closes.windows(2).any(|w| w[1] < w[0]);
        let calc = RiskMetricsCalculator::new(&repo, MetricsConfig::default());
        prop_assert_eq!(calc.max_drawdown() < Decimal::ZERO, declines);

        closes.sort_unstable();
        let sorted = repo_from_cents(&closes);
        let calc = RiskMetricsCalculator::new(&sorted, MetricsConfig::default());
        prop_assert_eq!(calc.max_drawdown(), Decimal::ZERO);
    }

    /// Margin requirement grows with volatility and never exceeds notional
    #[test]
    fn margin_monotone_and_capped(
        notional in amount_strategy(),
        a in volatility_strategy(),
        b in volatility_strategy(),
    ) {
        let engine = MarginEngine::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let req_low = engine.margin_requirement(Quote::new(notional), low);
        let req_high = engine.margin_requirement(Quote::new(notional), high);
        prop_assert!(req_low <= req_high);
        prop_assert!(req_high.value() <= notional);
    }

    /// Leverage above the cap is CRITICAL whatever the liquidity ratio
    #[test]
    fn excess_leverage_always_critical(
        account in amount_strategy(),
        leverage in 501i64..5_000i64,
        credit in 0i64..1_000_000_000i64,
        days in 0u32..30,
    ) {
        let position = Position {
            collateral_quantity: dec!(1),
            reference_price: Price::new_unchecked(dec!(42000)),
            account_value: Quote::new(account),
            margin_used: Quote::new(account * Decimal::new(leverage, 2)),
            available_credit: Quote::new(Decimal::new(credit, 2)),
        };
        let assessment = MarginEngine::default()
            .classify_liquidation_risk(&position, Decimal::from(days))
            .unwrap();
        prop_assert_eq!(assessment.tier, RiskTier::Critical);
    }

    /// A feasible plan collects at least call + buffer in the fewest whole days
    #[test]
    fn repayment_covers_total_in_minimal_days(
        call in amount_strategy(),
        income in amount_strategy(),
        max_days in 1u32..30,
    ) {
        let scheduler = RepaymentScheduler::default();
        let available = income * dec!(0.6);
        match scheduler.plan(Quote::new(call), Quote::new(income), max_days).unwrap() {
            RepaymentOutcome::Feasible(plan) => {
                let days = Decimal::from(plan.days_required);
                prop_assert!(plan.days_required <= max_days);
                prop_assert!(plan.daily_payment.value() * days >= plan.total_amount.value());
                prop_assert!(days * available >= call);
                prop_assert!((days - Decimal::ONE) * available < call);
            }
            RepaymentOutcome::Infeasible { min_days_required, .. } => {
                prop_assert!(min_days_required > max_days);
            }
        }
    }

    /// Stress results keep input order and length
    #[test]
    fn stress_preserves_order(shocks in prop::collection::vec(-150i64..100i64, 0..10)) {
        let scenarios: Vec<RiskScenario> = shocks
            .iter()
            .enumerate()
            .map(|(i, s)| RiskScenario::new(format!("s{i}"), Decimal::new(*s, 2)))
            .collect();
        let runner = StressTestRunner::with_baseline(MarginEngine::default(), dec!(0.03), dec!(-0.07));
        let outcomes = runner.run(Quote::new(dec!(100000)), &scenarios);
        prop_assert_eq!(outcomes.len(), scenarios.len());
        for (outcome, scenario) in outcomes.iter().zip(&scenarios) {
            prop_assert_eq!(&outcome.scenario, &scenario.name);
        }
    }
}
