mod common;

use barsim::domain::backtest::{run_backtest, BacktestConfig};
use barsim::domain::engine;
use barsim::domain::strategy::Strategy as TradingStrategy;
use common::*;
use proptest::prelude::*;

fn trading_strategy() -> impl Strategy<Value = TradingStrategy> {
    prop_oneof![
        (1usize..8, 8usize..20).prop_map(|(fast, slow)| TradingStrategy::DualMaCrossover { fast, slow }),
        (2usize..15, 10.0f64..45.0, 55.0f64..90.0).prop_map(|(period, oversold, overbought)| {
            TradingStrategy::RsiMeanReversion {
                period,
                oversold,
                overbought,
            }
        }),
        (1usize..15).prop_map(|lookback| TradingStrategy::MomentumBreakout { lookback }),
    ]
}

fn costs() -> impl Strategy<Value = BacktestConfig> {
    (0.0f64..10.0, 0.0f64..1.0, 0.0f64..2.0, 0.1f64..=1.0).prop_map(
        |(per_trade, pct, slippage, size)| BacktestConfig {
            commission_per_trade: per_trade,
            commission_pct: pct,
            slippage_pct: slippage,
            position_size: size,
            ..BacktestConfig::default()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn results_are_well_formed(
        prices in prop::collection::vec(0.01f64..10_000.0, 2..120),
        strategy in trading_strategy(),
        config in costs(),
    ) {
        let series = series_from_closes(&prices);
        let result = engine::run_with_series(&series, &strategy, &config).unwrap();

        prop_assert_eq!(result.equity_curve.len(), prices.len());
        prop_assert!((0.0..=100.0).contains(&result.win_rate));
        prop_assert!(result.max_drawdown <= 0.0);
        prop_assert!(result.sharpe_ratio.is_finite());
        prop_assert!(result.annualized_return.is_finite());
        if result.total_trades == 0 {
            prop_assert_eq!(result.win_rate, 0.0);
        }
        for trade in &result.trades {
            prop_assert!(trade.exit_date > trade.entry_date);
            prop_assert_eq!(
                trade.pnl,
                (trade.exit_price - trade.entry_price) * trade.quantity as f64
            );
            prop_assert!(trade.commission >= 0.0);
        }
    }

    #[test]
    fn cash_never_goes_negative(
        prices in prop::collection::vec(0.01f64..10_000.0, 2..120),
        strategy in trading_strategy(),
        config in costs(),
    ) {
        // A fixed fee can exceed the proceeds of a collapsed position.
        let config = BacktestConfig { commission_per_trade: 0.0, ..config };
        let series = series_from_closes(&prices);
        let run = run_backtest(&series, &strategy, &config).unwrap();
        prop_assert!(run.portfolio.cash >= 0.0);
        prop_assert!(run.portfolio.equity_curve.iter().all(|p| p.equity >= 0.0));
    }

    #[test]
    fn drawdown_is_zero_only_for_non_decreasing_curves(
        prices in prop::collection::vec(0.01f64..10_000.0, 2..120),
        strategy in trading_strategy(),
    ) {
        let series = series_from_closes(&prices);
        let result = engine::run_with_series(&series, &strategy, &BacktestConfig::default()).unwrap();
        let non_decreasing = result
            .equity_curve
            .windows(2)
            .all(|w| w[1].equity >= w[0].equity);
        prop_assert_eq!(result.max_drawdown == 0.0, non_decreasing);
    }

    #[test]
    fn signals_ignore_future_bars(
        prices in prop::collection::vec(0.01f64..10_000.0, 4..120),
        strategy in trading_strategy(),
        cut in 2usize..120,
    ) {
        let cut = cut.min(prices.len());
        prop_assume!(cut >= strategy.min_bars() && cut > 2);
        let full = series_from_closes(&prices);
        let prefix = series_from_closes(&prices[..cut]);
        let on_full = strategy.attach(&full).unwrap();
        let on_prefix = strategy.attach(&prefix).unwrap();
        for i in 0..cut {
            prop_assert_eq!(on_full.signal_at(i, &full), on_prefix.signal_at(i, &prefix));
        }
    }

    #[test]
    fn constant_prices_never_trade(
        close in 0.01f64..10_000.0,
        len in 2usize..300,
        strategy in trading_strategy(),
        config in costs(),
    ) {
        let series = PriceSeries::new("TEST", flat_bars("2021-06-01", len, close)).unwrap();
        let result = engine::run_with_series(&series, &strategy, &config).unwrap();
        prop_assert_eq!(result.total_trades, 0);
        prop_assert!(result.equity_curve.iter().all(|p| p.equity == config.initial_capital));
    }

    #[test]
    fn runs_are_repeatable(
        prices in prop::collection::vec(0.01f64..10_000.0, 2..120),
        strategy in trading_strategy(),
        config in costs(),
    ) {
        let series = series_from_closes(&prices);
        let a = engine::run_with_series(&series, &strategy, &config).unwrap();
        let b = engine::run_with_series(&series, &strategy, &config).unwrap();
        prop_assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
