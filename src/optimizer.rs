//! Exhaustive parameter search over the strategy grids.

use crate::backtest::run_single;
use crate::error::Result;
use crate::models::{Candle, Metrics};
use crate::strategy::{StrategyKind, StrategyParams, DEFAULT_FEE};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Score given to runs that fail a hard constraint.
pub const DISQUALIFIED: f64 = -1e9;

/// Constraints and costs applied while searching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    pub fee: f64,
    /// Fewer fills than this disqualifies a run.
    pub min_trades: usize,
    /// A max drawdown above this fraction disqualifies a run.
    pub max_dd_cap: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fee: DEFAULT_FEE,
            min_trades: 6,
            max_dd_cap: 0.25,
        }
    }
}

/// Ranks a backtest: Sharpe and growth are rewarded, drawdown is penalised.
pub fn score_metrics(metrics: Option<&Metrics>, cfg: &SearchConfig) -> f64 {
    let Some(m) = metrics else {
        return DISQUALIFIED;
    };
    if m.trades < cfg.min_trades || m.cagr <= 0.0 || m.max_dd > cfg.max_dd_cap {
        return DISQUALIFIED;
    }
    0.6 * m.sharpe + 0.4 * (m.cagr * 100.0) - 2.0 * (m.max_dd * 100.0)
}

/// Backtests every grid entry of `kind` and returns the best-scoring one.
///
/// Entries are evaluated in parallel but compared in grid order, so ties go to
/// the earlier entry. `None` means no entry beat [`DISQUALIFIED`].
pub fn grid_search_one(
    candles: &[Candle],
    kind: StrategyKind,
    cfg: &SearchConfig,
    progress: Option<&ProgressBar>,
) -> Option<(StrategyParams, Metrics)> {
    let candles = Candle::retain_finite(candles);
    let grid = kind.grid(cfg.fee);
    debug!(%kind, combinations = grid.len(), "Starting grid search");

    let scored: Vec<(f64, Option<Metrics>)> = grid
        .par_iter()
        .map(|params| {
            let metrics = run_single(&candles, params).metrics();
            if let Some(pb) = progress {
                pb.inc(1);
            }
            (score_metrics(metrics.as_ref(), cfg), metrics)
        })
        .collect();

    let mut best: Option<(f64, usize)> = None;
    for (idx, (score, _)) in scored.iter().enumerate() {
        if *score > best.map_or(DISQUALIFIED, |(s, _)| s) {
            best = Some((*score, idx));
        }
    }

    let (score, idx) = best?;
    let metrics = scored.into_iter().nth(idx).and_then(|(_, m)| m)?;
    info!(%kind, score, sharpe = metrics.sharpe, "Grid search winner");
    Some((grid[idx].clone(), metrics))
}

/// Parameters chosen for one kind.
#[derive(Debug, Clone)]
pub struct Winner {
    pub params: StrategyParams,
    /// Metrics of the grid winner; `None` when the defaults were taken.
    pub metrics: Option<Metrics>,
}

/// Best parameters per kind, falling back to the kind's defaults when nothing qualified.
pub fn optimise_all(
    candles: &[Candle],
    kinds: &[StrategyKind],
    cfg: &SearchConfig,
    show_progress: bool,
) -> Result<Vec<Winner>> {
    let mut winners = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let pb = if show_progress {
            Some(progress_bar(kind)?)
        } else {
            None
        };
        let found = grid_search_one(candles, kind, cfg, pb.as_ref());
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        let winner = match found {
            Some((params, metrics)) => Winner {
                params,
                metrics: Some(metrics),
            },
            None => {
                warn!(%kind, "No parameter set met the constraints, using defaults");
                Winner {
                    params: kind.default_params(cfg.fee),
                    metrics: None,
                }
            },
        };
        winners.push(winner);
    }
    Ok(winners)
}

/// Progress bar sized to the grid of `kind`.
pub fn progress_bar(kind: StrategyKind) -> Result<ProgressBar> {
    let pb = ProgressBar::new(kind.grid(DEFAULT_FEE).len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:>18} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    pb.set_message(kind.label());
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockDataProvider;
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;

    fn metrics(trades: usize, cagr: f64, max_dd: f64, sharpe: f64) -> Metrics {
        Metrics {
            sid: 1,
            name: "1: Donchian".into(),
            final_equity: 5100.0,
            pnl: 100.0,
            sharpe,
            max_dd,
            trades,
            winrate: 0.5,
            cagr,
            days: 1.0,
        }
    }

    #[rstest]
    #[case(metrics(5, 1.0, 0.1, 2.0))]
    #[case(metrics(6, 0.0, 0.1, 2.0))]
    #[case(metrics(6, -0.5, 0.1, 2.0))]
    #[case(metrics(10, 1.0, 0.26, 2.0))]
    fn constraint_violations_are_disqualified(#[case] m: Metrics) {
        assert_eq!(score_metrics(Some(&m), &SearchConfig::default()), DISQUALIFIED);
    }

    #[test]
    fn missing_metrics_are_disqualified() {
        assert_eq!(score_metrics(None, &SearchConfig::default()), DISQUALIFIED);
    }

    #[test]
    fn score_formula() {
        let m = metrics(6, 0.5, 0.1, 2.0);
        // 0.6*2 + 0.4*50 - 2*10
        let score = score_metrics(Some(&m), &SearchConfig::default());
        assert!((score - 1.2).abs() < 1e-9);
    }

    #[test]
    fn relaxed_constraints_accept_more() {
        let m = metrics(2, 0.5, 0.3, 1.0);
        let cfg = SearchConfig {
            min_trades: 2,
            max_dd_cap: 0.5,
            ..Default::default()
        };
        assert!(score_metrics(Some(&m), &cfg) > DISQUALIFIED);
    }

    fn flat_candles(n: usize) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle {
                open_time: t0 + Duration::minutes(i as i64),
                open: 100.0,
                high: 100.0,
                low: 100.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn flat_market_has_no_winner() {
        let candles = flat_candles(200);
        let cfg = SearchConfig::default();
        assert!(grid_search_one(&candles, StrategyKind::Donchian, &cfg, None).is_none());
    }

    #[test]
    fn optimise_all_falls_back_to_defaults() {
        let candles = flat_candles(200);
        let cfg = SearchConfig {
            fee: 0.002,
            ..Default::default()
        };
        let kinds = [StrategyKind::SmaCross, StrategyKind::Donchian];
        let winners = optimise_all(&candles, &kinds, &cfg, false).unwrap();
        assert!(winners.iter().all(|w| w.metrics.is_none()));
        let params: Vec<StrategyParams> = winners.into_iter().map(|w| w.params).collect();
        assert_eq!(
            params,
            vec![
                StrategyKind::SmaCross.default_params(0.002),
                StrategyKind::Donchian.default_params(0.002),
            ]
        );
    }

    #[test]
    fn winner_has_the_first_maximal_score() {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let candles = MockDataProvider::new()
            .candles("ETHUSDT", "1m", 3000, end)
            .unwrap();
        let cfg = SearchConfig {
            min_trades: 2,
            max_dd_cap: 1.0,
            ..Default::default()
        };
        let scores: Vec<f64> = StrategyKind::Donchian
            .grid(cfg.fee)
            .iter()
            .map(|p| score_metrics(run_single(&candles, p).metrics().as_ref(), &cfg))
            .collect();
        let best = scores.iter().copied().fold(DISQUALIFIED, f64::max);

        match grid_search_one(&candles, StrategyKind::Donchian, &cfg, None) {
            Some((params, m)) => {
                let idx = StrategyKind::Donchian
                    .grid(cfg.fee)
                    .iter()
                    .position(|p| *p == params)
                    .unwrap();
                assert_eq!(scores[idx], best);
                assert!(scores[..idx].iter().all(|s| *s < best));
                assert_eq!(score_metrics(Some(&m), &cfg), best);
            },
            None => assert_eq!(best, DISQUALIFIED),
        }
    }

    #[test]
    fn optimise_all_carries_the_grid_winner() {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let candles = MockDataProvider::new()
            .candles("BTCUSDT", "1m", 2000, end)
            .unwrap();
        let cfg = SearchConfig {
            min_trades: 2,
            max_dd_cap: 1.0,
            ..Default::default()
        };
        let winners = optimise_all(&candles, &[StrategyKind::Donchian], &cfg, true).unwrap();
        assert_eq!(winners.len(), 1);
        match grid_search_one(&candles, StrategyKind::Donchian, &cfg, None) {
            Some((params, m)) => {
                assert_eq!(winners[0].params, params);
                assert_eq!(winners[0].metrics.as_ref().map(|w| w.sharpe), Some(m.sharpe));
            },
            None => assert!(winners[0].metrics.is_none()),
        }
    }

    #[test]
    fn progress_bar_tracks_grid_size() {
        let pb = progress_bar(StrategyKind::SmaCross).unwrap();
        assert_eq!(pb.length(), Some(243));
    }
}
