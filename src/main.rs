//! Collateral risk report.
//!
//! Runs the full analysis over a price history: summary statistics, margin
//! decisions, stress scenarios, repayment schedules, recommended protocol
//! parameters, the ahr999 index and a drawdown backtest.
//!
//! Usage: `risk-report [prices.csv] [standard|conservative|aggressive]`.
//! Without a CSV the report runs on seeded synthetic history.

use anyhow::{Context, Result};
use collateral_risk::*;
use rust_decimal_macros::dec;
use std::fs::File;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("collateral_risk=info,risk_report=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next();
    let profile = match args.next().as_deref() {
        None | Some("standard") => RiskProfile::Standard,
        Some("conservative") => RiskProfile::Conservative,
        Some("aggressive") => RiskProfile::Aggressive,
        Some(other) => anyhow::bail!("unknown risk profile {other}"),
    };
    let config = profile.config();
    config.validate()?;

    let repo = match path {
        Some(path) => {
            let file = File::open(&path).with_context(|| format!("opening {path}"))?;
            let table = PriceTable::from_csv_reader(file)?;
            ReturnsRepository::from_table(&table)?
        }
        None => SyntheticHistory::default().repository()?,
    };
    tracing::info!(observations = repo.len(), ?profile, "history loaded");

    println!("Collateral Risk Report");
    println!("{} to {}, {} observations\n", repo.first().date, repo.last().date, repo.len());

    let calculator = RiskMetricsCalculator::new(&repo, config.metrics.clone());

    section_1_summary(&calculator)?;
    section_2_margin_decisions(&config)?;
    section_3_stress_tests(&calculator, &config)?;
    section_4_repayment(&config)?;
    section_5_protocol_parameters(&calculator, &config)?;
    section_6_valuation(&repo);
    section_7_backtest(&repo, &config)?;

    println!("\nReport complete.");
    Ok(())
}

/// Headline statistics and multi-day move distribution.
fn section_1_summary(calculator: &RiskMetricsCalculator<'_>) -> Result<()> {
    println!("Section 1: Market Summary\n");

    let s = calculator.summary()?;
    println!("  Current price: ${}", s.current_price.value().round_dp(2));
    println!("  All-time high / low: ${} / ${}", s.all_time_high.round_dp(2), s.all_time_low.round_dp(2));
    println!("  Annualized return: {}", pct(s.annualized_return));
    println!("  Annualized volatility: {}", pct(s.annualized_volatility));
    println!("  Max drawdown: {}, current: {}", pct(s.max_drawdown), pct(s.current_drawdown));
    println!("  Daily VaR 95%: {}, 99%: {}", pct(s.var_95), pct(s.var_99));

    println!("\n  Horizon  Max drop   VaR      Std");
    for m in calculator.move_stats_by_horizon() {
        println!("  {:>4}d    {:>8} {:>8} {:>8}", m.window, pct(m.max_drop), pct(m.var), pct(m.std));
    }
    println!();
    Ok(())
}

/// Classify sample positions and schedule repayment where a margin call is due.
fn section_2_margin_decisions(config: &RiskConfig) -> Result<()> {
    println!("Section 2: Margin Decisions\n");

    let engine = MarginEngine::new(config.margin.clone());
    let scheduler = RepaymentScheduler::new(config.repayment.clone());
    let price = Price::new(dec!(42000)).context("reference price")?;

    let samples = [
        ("healthy", dec!(100000), dec!(20000), dec!(50000), dec!(5)),
        ("stretched", dec!(50000), dec!(40000), dec!(20000), dec!(5)),
        ("margin call", dec!(40000), dec!(80000), dec!(10000), dec!(4)),
        ("urgent", dec!(40000), dec!(80000), dec!(10000), dec!(1)),
        ("overlevered", dec!(10000), dec!(60000), dec!(200000), dec!(5)),
    ];

    for (label, account, margin_used, credit, days) in samples {
        let position = Position {
            collateral_quantity: dec!(2),
            reference_price: price,
            account_value: Quote::new(account),
            margin_used: Quote::new(margin_used),
            available_credit: Quote::new(credit),
        };
        engine.check_min_collateral(&position)?;
        let decision = engine.decide(
            &position,
            days,
            Quote::new(dec!(5000)),
            Quote::new(dec!(2000)),
            &scheduler,
        )?;
        let a = &decision.assessment;
        println!(
            "  {label:<12} {:<9} leverage {:>5}  liquidity {:>5}  {}",
            a.tier.to_string(),
            a.leverage.round_dp(2),
            a.liquidity_ratio.round_dp(2),
            a.reason
        );
        match decision.repayment {
            Some(Ok(RepaymentOutcome::Feasible(plan))) => println!(
                "               repay ${} / day over {} days",
                plan.daily_payment.value().round_dp(2),
                plan.days_required
            ),
            Some(Ok(RepaymentOutcome::Infeasible { min_days_required, max_days })) => println!(
                "               cannot repay within {max_days} days (needs {min_days_required})"
            ),
            Some(Err(err)) => println!("               no schedule: {err}"),
            None => {}
        }
    }
    println!();
    Ok(())
}

fn section_3_stress_tests(calculator: &RiskMetricsCalculator<'_>, config: &RiskConfig) -> Result<()> {
    println!("Section 3: Stress Tests\n");

    let runner = StressTestRunner::new(calculator, MarginEngine::new(config.margin.clone()))?;
    let position_value = Quote::new(dec!(420000));
    println!("  Position ${}, baseline daily vol {}\n", position_value, pct(runner.baseline_volatility()));

    for outcome in runner.run(position_value, &config.stress.scenarios) {
        match outcome.result {
            Ok(r) => println!(
                "  {:<20} value ${:>12}  impact {:>8}  call prob {:>8}  extra margin ${}",
                r.scenario,
                r.shocked_value.value().round_dp(2),
                pct(r.portfolio_impact),
                pct(r.margin_call_probability),
                r.required_additional_margin.value().round_dp(2)
            ),
            Err(err) => println!("  {:<20} skipped: {err}", outcome.scenario),
        }
    }
    println!();
    Ok(())
}

fn section_4_repayment(config: &RiskConfig) -> Result<()> {
    println!("Section 4: Repayment Schedules\n");

    let scheduler = RepaymentScheduler::new(config.repayment.clone());
    for (call, income) in [(dec!(1000), dec!(500)), (dec!(25000), dec!(10000)), (dec!(10000), dec!(100))] {
        let outcome = scheduler.plan_default(Quote::new(call), Quote::new(income))?;
        match outcome {
            RepaymentOutcome::Feasible(plan) => println!(
                "  call ${call}, income ${income}/day: ${} / day for {} days (total ${})",
                plan.daily_payment.value().round_dp(2),
                plan.days_required,
                plan.total_amount
            ),
            RepaymentOutcome::Infeasible { min_days_required, max_days } => println!(
                "  call ${call}, income ${income}/day: infeasible, needs {min_days_required} days > {max_days}"
            ),
        }
    }
    println!();
    Ok(())
}

fn section_5_protocol_parameters(calculator: &RiskMetricsCalculator<'_>, config: &RiskConfig) -> Result<()> {
    println!("Section 5: Protocol Parameters\n");

    let params = ParameterRecommender::new(config.recommender.clone()).recommend(calculator)?;
    let liq = &params.liquidation;
    println!("  Worst daily move: {}", pct(liq.max_daily_drop));
    println!("  Recommended initial LTV: {}", pct(liq.recommended_initial_ltv));
    println!("  Liquidation threshold: {}", pct(liq.liquidation_threshold));

    let rep = &params.repayment;
    println!("  Repayment window: {} days ({} drop events)", rep.recommended_window, rep.drop_events);
    if let (Some(median), Some(p90)) = (rep.median_recovery, rep.p90_recovery) {
        println!("  Recovery days: median {}, p90 {}", median.round_dp(1), p90.round_dp(1));
    }

    let curve = &params.interest;
    println!(
        "  Rates: base {}, at {} utilization {}, max {}",
        pct(curve.base_rate),
        pct(curve.optimal_utilization),
        pct(curve.rate_at(curve.optimal_utilization)),
        pct(curve.max_rate)
    );
    println!();
    Ok(())
}

fn section_6_valuation(repo: &ReturnsRepository) {
    println!("Section 6: ahr999 Index\n");
    match valuation::current(repo) {
        Some((index, zone)) => println!("  Latest index {} ({zone})\n", index.round_dp(3)),
        None => println!("  Not enough history for the 200-day average\n"),
    }
}

fn section_7_backtest(repo: &ReturnsRepository, config: &RiskConfig) -> Result<()> {
    println!("Section 7: Backtest\n");

    let configs: Vec<BacktestConfig> = [dec!(1), dec!(0.5), dec!(0.25)]
        .into_iter()
        .map(|exposure| BacktestConfig {
            exposure,
            ..config.backtest.clone()
        })
        .collect();

    for (cfg, report) in configs.iter().zip(BacktestSimulator::new().run_many(repo, &configs)) {
        let report = report?;
        let sharpe = report
            .sharpe_ratio
            .map(|s| s.round_dp(2).to_string())
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  exposure {:>4}: final ${:>12}  max drawdown {:>8}  sharpe {:>6}  risk events {}",
            cfg.exposure,
            report.final_value.value().round_dp(2),
            pct(report.max_drawdown),
            sharpe,
            report.risk_events.len()
        );
    }
    Ok(())
}

fn pct(value: rust_decimal::Decimal) -> String {
    format!("{}%", (value * dec!(100)).round_dp(2))
}
