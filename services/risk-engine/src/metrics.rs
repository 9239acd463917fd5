//! Portfolio statistics
//!
//! Pure functions over return and equity series. Every input is consumed
//! in order and sorting uses `total_cmp`, so identical inputs always give
//! bit-identical outputs.
//!
//! Returns are simple period returns `r_t = v_t / v_{t-1} - 1`. Losses are
//! reported as positive fractions.

// ── Return series ────────────────────────────────────────────────────────

/// Simple returns between consecutive values
///
/// Pairs whose base is not positive are skipped.
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n − 1); zero below two observations
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

// ── Volatility and tail risk ─────────────────────────────────────────────

/// Annualized volatility
///
/// `σ_annual = σ_period × √periods_per_year`
pub fn annualized_volatility(returns: &[f64], periods_per_year: f64) -> f64 {
    std_dev(returns) * periods_per_year.sqrt()
}

/// Historical Value-at-Risk at `confidence` (e.g. 0.99)
///
/// The loss at the `(1 − confidence)` empirical quantile of returns,
/// floored at zero. Index `⌊(1 − confidence) × n⌋` of the ascending sort.
pub fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    let sorted = sorted(returns);
    match tail_index(sorted.len(), confidence) {
        Some(i) => (-sorted[i]).max(0.0),
        None => 0.0,
    }
}

/// Historical Conditional VaR (expected shortfall)
///
/// Mean loss over the returns at or below the VaR quantile, floored at
/// zero. Always at least the VaR.
pub fn conditional_var(returns: &[f64], confidence: f64) -> f64 {
    let sorted = sorted(returns);
    match tail_index(sorted.len(), confidence) {
        Some(i) => (-mean(&sorted[..=i])).max(0.0),
        None => 0.0,
    }
}

fn sorted(xs: &[f64]) -> Vec<f64> {
    let mut v = xs.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

fn tail_index(n: usize, confidence: f64) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let tail = (1.0 - confidence).clamp(0.0, 1.0);
    let i = (tail * n as f64).floor() as usize;
    Some(i.min(n - 1))
}

// ── Drawdown ─────────────────────────────────────────────────────────────

/// Maximum and current drawdown of an equity curve
///
/// Drawdown at t is `1 − equity_t / peak_t`. Returns `(max, current)`.
pub fn drawdowns(equity: &[f64]) -> (f64, f64) {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    let mut current = 0.0;
    for &value in equity {
        peak = peak.max(value);
        current = if peak > 0.0 { 1.0 - value / peak } else { 0.0 };
        max_dd = max_dd.max(current);
    }
    (max_dd, current)
}

// ── Relative and risk-adjusted performance ───────────────────────────────

/// Beta against a benchmark return series
///
/// `β = cov(r, b) / var(b)` over the overlapping tail of both series; zero
/// when the benchmark does not move.
pub fn beta(returns: &[f64], benchmark: &[f64]) -> f64 {
    let n = returns.len().min(benchmark.len());
    if n < 2 {
        return 0.0;
    }
    let r = &returns[returns.len() - n..];
    let b = &benchmark[benchmark.len() - n..];
    let (mr, mb) = (mean(r), mean(b));
    let cov = r.iter().zip(b).map(|(x, y)| (x - mr) * (y - mb)).sum::<f64>() / (n - 1) as f64;
    let var = b.iter().map(|y| (y - mb).powi(2)).sum::<f64>() / (n - 1) as f64;
    if var == 0.0 {
        0.0
    } else {
        cov / var
    }
}

/// Annualized Sharpe ratio
///
/// `(mean(r) − rf/P) / σ(r) × √P`, with `rf` the annual risk-free rate and
/// `P` periods per year.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    let sd = std_dev(returns);
    if sd == 0.0 {
        return 0.0;
    }
    let excess = mean(returns) - risk_free_rate / periods_per_year;
    excess / sd * periods_per_year.sqrt()
}

/// Annualized Sortino ratio
///
/// Like Sharpe but divides by downside deviation
/// `√(Σ min(r − rf/P, 0)² / n)`.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let target = risk_free_rate / periods_per_year;
    let downside = (returns
        .iter()
        .map(|r| (r - target).min(0.0).powi(2))
        .sum::<f64>()
        / returns.len() as f64)
        .sqrt();
    if downside == 0.0 {
        return 0.0;
    }
    (mean(returns) - target) / downside * periods_per_year.sqrt()
}

// ── Tests ────────────────────────────────────────────────────────────────
