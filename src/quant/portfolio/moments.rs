//! # Moment Estimates
//!
//! $$
//! \hat\mu_i = \frac1T\sum_t r_{t,i},\qquad
//! \hat\Sigma_{ij} = \frac{1}{T-1}\sum_t (r_{t,i}-\hat\mu_i)(r_{t,j}-\hat\mu_j)
//! $$
//!
//! First two sample moments of a [`ReturnSample`] and conditioning diagnostics.

use nalgebra::DMatrix;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

use super::data::ReturnSample;
use super::error::OptimizeError;
use super::error::OptimizeResult;

/// Relative asymmetry tolerated in a caller-supplied covariance matrix.
const SYMMETRY_TOL: f64 = 1e-10;

/// Mean returns and covariance matrix of a return sample.
#[derive(Clone, Debug, PartialEq)]
pub struct MomentEstimates {
  mean: Array1<f64>,
  covariance: Array2<f64>,
}

impl MomentEstimates {
  /// Use moments computed elsewhere.
  pub fn new(mean: Array1<f64>, covariance: Array2<f64>) -> OptimizeResult<Self> {
    let n = mean.len();
    if covariance.dim() != (n, n) {
      return Err(OptimizeError::InvalidInput {
        reason: format!(
          "covariance shape {:?} does not match {n} mean returns",
          covariance.dim()
        ),
      });
    }
    if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
      return Err(OptimizeError::InvalidInput {
        reason: "moments must be finite".to_string(),
      });
    }

    let scale = covariance.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);
    for i in 0..n {
      for j in (i + 1)..n {
        if (covariance[[i, j]] - covariance[[j, i]]).abs() > SYMMETRY_TOL * scale {
          return Err(OptimizeError::InvalidInput {
            reason: format!("covariance is not symmetric at ({i}, {j})"),
          });
        }
      }
    }

    Ok(Self { mean, covariance })
  }

  /// Sample mean and unbiased (`T - 1`) covariance.
  pub fn estimate(sample: &ReturnSample) -> OptimizeResult<Self> {
    let (t, n) = (sample.n_periods(), sample.n_assets());
    if t < 2 || n == 0 {
      return Err(OptimizeError::InsufficientData {
        n_periods: t,
        n_assets: n,
      });
    }

    let returns = sample.returns();
    let mean = returns
      .mean_axis(Axis(0))
      .ok_or(OptimizeError::InsufficientData {
        n_periods: t,
        n_assets: n,
      })?;
    // rows of the transposed view are assets, columns are observations
    let covariance = returns
      .t()
      .cov(1.0)
      .map_err(|_| OptimizeError::InsufficientData {
        n_periods: t,
        n_assets: n,
      })?;

    Ok(Self { mean, covariance })
  }

  /// Per-asset mean return.
  pub fn mean(&self) -> &Array1<f64> {
    &self.mean
  }

  /// Covariance matrix, rows and columns in asset order.
  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  /// Number of assets.
  pub fn n_assets(&self) -> usize {
    self.mean.len()
  }

  /// Ratio of extreme eigenvalues of the covariance; infinite when it is not positive definite.
  pub fn condition_number(&self) -> f64 {
    let n = self.n_assets();
    let cov = DMatrix::from_fn(n, n, |i, j| self.covariance[[i, j]]);
    eigen_condition(cov, self.variance_scale())
  }

  /// Condition number of the covariance restricted to the fully-invested
  /// hyperplane `{d : 1'd = 0}`.
  ///
  /// This is the curvature that decides whether the minimum-variance portfolio
  /// is unique. It stays finite for a pair of perfectly anti-correlated assets
  /// (their zero-variance mix is unique) and blows up for duplicated assets.
  pub fn budget_condition_number(&self) -> f64 {
    let n = self.n_assets();
    if n < 2 {
      return 1.0;
    }

    let z = helmert_basis(n);
    let cov = DMatrix::from_fn(n, n, |i, j| self.covariance[[i, j]]);
    let reduced = z.transpose() * cov * &z;
    eigen_condition(reduced, self.variance_scale())
  }

  /// Largest eigenvalue of the covariance, the curvature scale of `w' Sigma w`.
  pub fn largest_eigenvalue(&self) -> f64 {
    let n = self.n_assets();
    let cov = DMatrix::from_fn(n, n, |i, j| self.covariance[[i, j]]);
    cov
      .symmetric_eigen()
      .eigenvalues
      .iter()
      .cloned()
      .fold(0.0_f64, f64::max)
  }

  /// Largest asset variance, the yardstick for "numerically zero" eigenvalues.
  fn variance_scale(&self) -> f64 {
    self
      .covariance
      .diag()
      .iter()
      .fold(0.0_f64, |m, v| m.max(v.abs()))
  }

  /// Expected portfolio return `mu'w`.
  pub fn portfolio_return(&self, w: &[f64]) -> f64 {
    self.mean.iter().zip(w.iter()).map(|(m, x)| m * x).sum()
  }

  /// Portfolio variance `w' Sigma w`.
  pub fn portfolio_variance(&self, w: &[f64]) -> f64 {
    let n = self.n_assets();
    let mut var = 0.0;
    for i in 0..n {
      let mut row = 0.0;
      for j in 0..n {
        row += self.covariance[[i, j]] * w[j];
      }
      var += w[i] * row;
    }
    var
  }

  /// `Sigma w`
  pub fn covariance_times(&self, w: &[f64]) -> Vec<f64> {
    self
      .covariance
      .outer_iter()
      .map(|row| row.iter().zip(w.iter()).map(|(c, x)| c * x).sum())
      .collect()
  }

  /// Sharpe ratio of `w`, zero when the volatility vanishes.
  pub fn sharpe_ratio(&self, w: &[f64], risk_free: f64) -> f64 {
    let vol = self.portfolio_variance(w).max(0.0).sqrt();
    if vol > 1e-15 {
      (self.portfolio_return(w) - risk_free) / vol
    } else {
      0.0
    }
  }
}

fn eigen_condition(m: DMatrix<f64>, scale: f64) -> f64 {
  let dim = m.nrows().max(1) as f64;
  let eig = m.symmetric_eigen().eigenvalues;
  let max = eig.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let min = eig.iter().cloned().fold(f64::INFINITY, f64::min);

  // eigenvalues within rounding noise of the variance scale count as zero
  let floor = scale * dim * f64::EPSILON;
  if !(max > floor) || !(min > floor) {
    f64::INFINITY
  } else {
    max / min
  }
}

/// Orthonormal basis (as columns) of the complement of the all-ones vector.
fn helmert_basis(n: usize) -> DMatrix<f64> {
  let mut z = DMatrix::zeros(n, n - 1);
  for k in 1..n {
    let norm = ((k * (k + 1)) as f64).sqrt();
    for i in 0..k {
      z[(i, k - 1)] = 1.0 / norm;
    }
    z[(k, k - 1)] = -(k as f64) / norm;
  }
  z
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn sample(returns: Array2<f64>) -> ReturnSample {
    let assets = (0..returns.ncols()).map(|i| format!("A{i}")).collect();
    ReturnSample::new(assets, returns).unwrap()
  }

  #[test]
  fn estimates_mean_and_unbiased_covariance() {
    let s = sample(array![[0.01, 0.02], [0.03, 0.00], [0.02, 0.04]]);
    let m = MomentEstimates::estimate(&s).unwrap();

    assert_abs_diff_eq!(m.mean()[0], 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(m.mean()[1], 0.02, epsilon = 1e-12);
    // deviations: a = [-0.01, 0.01, 0], b = [0, -0.02, 0.02]
    assert_abs_diff_eq!(m.covariance()[[0, 0]], 1e-4, epsilon = 1e-12);
    assert_abs_diff_eq!(m.covariance()[[1, 1]], 4e-4, epsilon = 1e-12);
    assert_abs_diff_eq!(m.covariance()[[0, 1]], -1e-4, epsilon = 1e-12);
    assert_abs_diff_eq!(m.covariance()[[1, 0]], -1e-4, epsilon = 1e-12);
  }

  #[test]
  fn single_observation_is_insufficient() {
    let s = sample(array![[0.01, 0.02, 0.03]]);
    let err = MomentEstimates::estimate(&s).unwrap_err();
    assert_eq!(
      err,
      OptimizeError::InsufficientData {
        n_periods: 1,
        n_assets: 3
      }
    );
  }

  #[test]
  fn empty_universe_is_insufficient() {
    let s = sample(Array2::zeros((4, 0)));
    assert!(matches!(
      MomentEstimates::estimate(&s),
      Err(OptimizeError::InsufficientData { n_assets: 0, .. })
    ));
  }

  #[test]
  fn condition_number_of_diagonal_covariance() {
    let m = MomentEstimates::new(array![0.1, 0.2], array![[0.04, 0.0], [0.0, 0.01]]).unwrap();
    assert_abs_diff_eq!(m.condition_number(), 4.0, epsilon = 1e-9);
    assert_abs_diff_eq!(m.largest_eigenvalue(), 0.04, epsilon = 1e-12);
  }

  #[test]
  fn anti_correlated_pair_is_singular_but_budget_conditioned() {
    let m = MomentEstimates::new(array![0.0, 0.0], array![[1e-4, -1e-4], [-1e-4, 1e-4]]).unwrap();
    assert!(m.condition_number() > 1e10);
    assert_abs_diff_eq!(m.budget_condition_number(), 1.0, epsilon = 1e-9);
  }

  #[test]
  fn duplicated_asset_is_singular_on_budget_hyperplane() {
    let m = MomentEstimates::new(array![0.0, 0.0], array![[1e-4, 1e-4], [1e-4, 1e-4]]).unwrap();
    assert!(m.budget_condition_number() > 1e10);
  }

  #[test]
  fn rejects_asymmetric_or_misshapen_covariance() {
    assert!(MomentEstimates::new(array![0.0, 0.0], array![[1.0, 0.5], [0.2, 1.0]]).is_err());
    assert!(MomentEstimates::new(array![0.0], array![[1.0, 0.0], [0.0, 1.0]]).is_err());
  }

  #[test]
  fn portfolio_statistics() {
    let m = MomentEstimates::new(array![0.1, 0.05], array![[0.04, 0.0], [0.0, 0.01]]).unwrap();
    let w = [0.5, 0.5];
    assert_abs_diff_eq!(m.portfolio_return(&w), 0.075, epsilon = 1e-12);
    assert_abs_diff_eq!(m.portfolio_variance(&w), 0.0125, epsilon = 1e-12);
    assert_abs_diff_eq!(
      m.sharpe_ratio(&w, 0.0),
      0.075 / 0.0125_f64.sqrt(),
      epsilon = 1e-12
    );
    assert_eq!(m.covariance_times(&w), vec![0.02, 0.005]);
  }
}
