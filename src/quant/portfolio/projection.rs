//! # Budget Projection
//!
//! $$
//! \Pi(\mathbf x) = \arg\min_{\mathbf 1^\top\mathbf w = 1,\ \ell\le\mathbf w\le u}\ \lVert\mathbf w-\mathbf x\rVert_2,
//! \qquad w_i = \operatorname{clip}(x_i-\tau,\ \ell_i,\ u_i)
//! $$
//!
//! Euclidean projection onto the fully-invested box, found by bisection on the
//! shift `tau`.

use super::types::Bounds;

const BISECTION_STEPS: usize = 200;

/// Project `x` onto `{w : sum(w) = 1, lower <= w <= upper}`.
///
/// `bounds` must already be validated for `x.len()` assets.
pub fn project_onto_budget(x: &[f64], bounds: &Bounds) -> Vec<f64> {
  let shifted = |tau: f64| -> Vec<f64> {
    x.iter()
      .zip(bounds.lower.iter().zip(bounds.upper.iter()))
      .map(|(&xi, (&lo, &hi))| (xi - tau).clamp(lo, hi))
      .collect()
  };
  let total = |tau: f64| -> f64 {
    x.iter()
      .zip(bounds.lower.iter().zip(bounds.upper.iter()))
      .map(|(&xi, (&lo, &hi))| (xi - tau).clamp(lo, hi))
      .sum()
  };

  // at tau_lo every weight sits on its upper bound, at tau_hi on its lower one
  let mut tau_lo = x
    .iter()
    .zip(bounds.upper.iter())
    .map(|(xi, hi)| xi - hi)
    .fold(f64::INFINITY, f64::min);
  let mut tau_hi = x
    .iter()
    .zip(bounds.lower.iter())
    .map(|(xi, lo)| xi - lo)
    .fold(f64::NEG_INFINITY, f64::max);

  if !(tau_lo <= tau_hi) {
    return shifted(tau_hi);
  }

  for _ in 0..BISECTION_STEPS {
    let mid = 0.5 * (tau_lo + tau_hi);
    if mid <= tau_lo || mid >= tau_hi {
      break;
    }
    if total(mid) > 1.0 {
      tau_lo = mid;
    } else {
      tau_hi = mid;
    }
  }

  // g(tau) is linear between the bracket ends once they are this close
  let (g_lo, g_hi) = (total(tau_lo), total(tau_hi));
  let tau = if (g_lo - g_hi).abs() > f64::EPSILON {
    tau_lo + (g_lo - 1.0) * (tau_hi - tau_lo) / (g_lo - g_hi)
  } else {
    0.5 * (tau_lo + tau_hi)
  };

  shifted(tau)
}
