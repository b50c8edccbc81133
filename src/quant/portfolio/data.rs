//! # Portfolio Data Utilities
//!
//! $$
//! r_t = \frac{p_t}{p_{t-1}} - 1 \quad\text{or}\quad r_t = \ln\frac{p_t}{p_{t-1}}
//! $$
//!
//! Dense return samples (rows = periods, columns = assets) and helpers for
//! building them from price tables.

use std::collections::HashSet;

use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray::Zip;
use ndarray::s;

use super::error::OptimizeError;
use super::error::OptimizeResult;

/// How per-period returns are derived from consecutive prices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReturnKind {
  /// `p_t / p_{t-1} - 1`
  #[default]
  Simple,
  /// `ln(p_t / p_{t-1})`
  Log,
}

/// Time-ordered, dense matrix of per-asset return observations.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnSample {
  assets: Vec<String>,
  returns: Array2<f64>,
}

impl ReturnSample {
  /// Wrap a `periods x assets` return matrix.
  ///
  /// Fails when the column count does not match `assets`, identifiers repeat,
  /// or any observation is not finite. Missing data must be resolved upstream.
  pub fn new(assets: Vec<String>, returns: Array2<f64>) -> OptimizeResult<Self> {
    if returns.ncols() != assets.len() {
      return Err(OptimizeError::InvalidInput {
        reason: format!(
          "return matrix has {} columns but {} asset identifiers were given",
          returns.ncols(),
          assets.len()
        ),
      });
    }

    let mut seen = HashSet::with_capacity(assets.len());
    for asset in &assets {
      if !seen.insert(asset.as_str()) {
        return Err(OptimizeError::InvalidInput {
          reason: format!("duplicate asset identifier '{asset}'"),
        });
      }
    }

    if let Some(((t, i), _)) = returns.indexed_iter().find(|(_, v)| !v.is_finite()) {
      return Err(OptimizeError::InvalidInput {
        reason: format!("non-finite return at period {t} for asset '{}'", assets[i]),
      });
    }

    Ok(Self { assets, returns })
  }

  /// Build a sample from a `dates x assets` price table.
  pub fn from_prices(
    assets: Vec<String>,
    prices: ArrayView2<f64>,
    kind: ReturnKind,
  ) -> OptimizeResult<Self> {
    if let Some(((t, i), p)) = prices
      .indexed_iter()
      .find(|(_, p)| !p.is_finite() || **p <= 0.0)
    {
      return Err(OptimizeError::InvalidInput {
        reason: format!("price {p} at row {t}, column {i} must be finite and positive"),
      });
    }

    let returns = price_returns(prices, kind);
    Self::new(assets, returns)
  }

  /// Trailing window of at most `periods` observations.
  pub fn tail(&self, periods: usize) -> Self {
    let start = self.n_periods().saturating_sub(periods);
    Self {
      assets: self.assets.clone(),
      returns: self.returns.slice(s![start.., ..]).to_owned(),
    }
  }

  /// Asset identifiers, in column order.
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// `periods x assets` return matrix.
  pub fn returns(&self) -> ArrayView2<'_, f64> {
    self.returns.view()
  }

  /// Number of observations.
  pub fn n_periods(&self) -> usize {
    self.returns.nrows()
  }

  /// Number of assets.
  pub fn n_assets(&self) -> usize {
    self.returns.ncols()
  }
}

/// Convert consecutive price rows into return rows; the output has one row fewer.
pub fn price_returns(prices: ArrayView2<f64>, kind: ReturnKind) -> Array2<f64> {
  let rows = prices.nrows();
  if rows < 2 {
    return Array2::zeros((0, prices.ncols()));
  }

  let prev = prices.slice(s![..rows - 1, ..]);
  let next = prices.slice(s![1.., ..]);
  let mut out = Array2::zeros(prev.raw_dim());

  Zip::from(&mut out)
    .and(prev)
    .and(next)
    .for_each(|r, &p0, &p1| {
      *r = match kind {
        ReturnKind::Simple => p1 / p0 - 1.0,
        ReturnKind::Log => (p1 / p0).ln(),
      };
    });

  out
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn tickers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn simple_returns_from_prices() {
    let prices = array![[100.0, 50.0], [110.0, 50.0], [99.0, 55.0]];
    let sample =
      ReturnSample::from_prices(tickers(&["BAC", "JPM"]), prices.view(), ReturnKind::Simple)
        .unwrap();

    assert_eq!(sample.n_periods(), 2);
    assert_eq!(sample.n_assets(), 2);
    assert_abs_diff_eq!(sample.returns()[[0, 0]], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(sample.returns()[[1, 0]], -0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(sample.returns()[[0, 1]], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(sample.returns()[[1, 1]], 0.1, epsilon = 1e-12);
  }

  #[test]
  fn log_returns_from_prices() {
    let prices = array![[100.0], [110.0]];
    let sample =
      ReturnSample::from_prices(tickers(&["GS"]), prices.view(), ReturnKind::Log).unwrap();
    assert_abs_diff_eq!(sample.returns()[[0, 0]], (1.1_f64).ln(), epsilon = 1e-12);
  }

  #[test]
  fn non_positive_prices_are_rejected() {
    let prices = array![[100.0], [0.0]];
    let err = ReturnSample::from_prices(tickers(&["GS"]), prices.view(), ReturnKind::Simple);
    assert!(matches!(err, Err(OptimizeError::InvalidInput { .. })));
  }

  #[test]
  fn sample_rejects_mismatched_and_duplicate_assets() {
    let returns = array![[0.01, 0.02], [0.0, -0.01]];
    assert!(ReturnSample::new(tickers(&["A"]), returns.clone()).is_err());
    assert!(ReturnSample::new(tickers(&["A", "A"]), returns.clone()).is_err());
    assert!(ReturnSample::new(tickers(&["A", "B"]), returns).is_ok());
  }

  #[test]
  fn sample_rejects_nan() {
    let returns = array![[0.01, f64::NAN], [0.0, -0.01]];
    let err = ReturnSample::new(tickers(&["A", "B"]), returns).unwrap_err();
    assert!(err.to_string().contains("'B'"));
  }

  #[test]
  fn tail_keeps_latest_rows() {
    let returns = array![[0.01], [0.02], [0.03]];
    let sample = ReturnSample::new(tickers(&["A"]), returns).unwrap();
    let window = sample.tail(2);
    assert_eq!(window.n_periods(), 2);
    assert_eq!(window.returns()[[0, 0]], 0.02);
    assert_eq!(sample.tail(10).n_periods(), 3);
  }
}
