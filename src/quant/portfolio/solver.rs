//! # Projected Gradient Solver
//!
//! $$
//! \mathbf w_{k+1} = \Pi\big(\mathbf y_k - t\nabla f(\mathbf y_k)\big),\qquad
//! \mathbf y_{k+1} = \mathbf w_{k+1} + \tfrac{\theta_k-1}{\theta_{k+1}}(\mathbf w_{k+1}-\mathbf w_k)
//! $$
//!
//! Accelerated projected gradient (FISTA with adaptive restart) as an `argmin`
//! solver for smooth objectives over the fully-invested box.

use std::time::Duration;
use std::time::Instant;

use argmin::core::CostFunction;
use argmin::core::Error;
use argmin::core::Gradient;
use argmin::core::IterState;
use argmin::core::KV;
use argmin::core::Problem;
use argmin::core::Solver;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;

use super::projection::project_onto_budget;
use super::types::Bounds;

/// Iteration state used by [`ProjectedGradient`].
pub type ProjectedState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

/// Exit message reported when the wall-clock budget runs out.
pub const TIME_BUDGET_EXIT: &str = "time budget exceeded";

const MAX_BACKTRACKS: usize = 60;
/// Relative cost noise tolerated by the sufficient-decrease test.
const COST_SLACK: f64 = 16.0 * f64::EPSILON;

/// Accelerated projected gradient descent.
///
/// The step starts at `initial_step` and is only ever halved, when the
/// sufficient-decrease test fails. Momentum is dropped whenever it stops
/// paying off (cost increase or a step against the last move). The run is
/// declared converged once a full projected step moves no weight by more
/// than `tol`.
#[derive(Clone, Debug)]
pub struct ProjectedGradient {
  bounds: Bounds,
  step: f64,
  tol: f64,
  time_budget: Option<Duration>,
  deadline: Option<Instant>,
  momentum: Option<Vec<f64>>,
  theta: f64,
  converged: bool,
}

impl ProjectedGradient {
  /// Construct a solver for `bounds` with starting step `initial_step` and step tolerance `tol`.
  pub fn new(bounds: Bounds, initial_step: f64, tol: f64) -> Self {
    Self {
      bounds,
      step: initial_step,
      tol,
      time_budget: None,
      deadline: None,
      momentum: None,
      theta: 1.0,
      converged: false,
    }
  }

  /// Stop with [`TIME_BUDGET_EXIT`] once `budget` has elapsed since `init`.
  pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
    self.time_budget = budget;
    self
  }

  fn reset_momentum(&mut self) {
    self.momentum = None;
    self.theta = 1.0;
  }
}

impl<O> Solver<O, ProjectedState> for ProjectedGradient
where
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  const NAME: &'static str = "Projected gradient";

  fn init(
    &mut self,
    problem: &mut Problem<O>,
    mut state: ProjectedState,
  ) -> Result<(ProjectedState, Option<KV>), Error> {
    let x0 = state
      .take_param()
      .ok_or_else(|| Error::msg("projected gradient requires an initial point"))?;
    let x = project_onto_budget(&x0, &self.bounds);
    let cost = problem.cost(&x)?;

    self.converged = false;
    self.reset_momentum();
    self.deadline = self.time_budget.map(|budget| Instant::now() + budget);

    Ok((state.param(x).cost(cost), None))
  }

  fn next_iter(
    &mut self,
    problem: &mut Problem<O>,
    mut state: ProjectedState,
  ) -> Result<(ProjectedState, Option<KV>), Error> {
    let x = state
      .take_param()
      .ok_or_else(|| Error::msg("projected gradient lost its iterate"))?;
    let fx = state.get_cost();

    let (y, fy) = match self.momentum.take() {
      Some(y) => {
        let fy = problem.cost(&y)?;
        if fy.is_finite() {
          (y, fy)
        } else {
          self.reset_momentum();
          (x.clone(), fx)
        }
      }
      None => (x.clone(), fx),
    };
    let gy = problem.gradient(&y)?;
    let slack = COST_SLACK * (fy.abs() + fx.abs()) + f64::MIN_POSITIVE;

    let mut t = self.step;
    let mut accepted = None;
    for attempt in 0..MAX_BACKTRACKS {
      let trial: Vec<f64> = y.iter().zip(gy.iter()).map(|(yi, gi)| yi - t * gi).collect();
      let candidate = project_onto_budget(&trial, &self.bounds);

      let mut lin = 0.0;
      let mut sq = 0.0;
      let mut max_move = 0.0_f64;
      for ((ci, yi), gi) in candidate.iter().zip(y.iter()).zip(gy.iter()) {
        let d = ci - yi;
        lin += gi * d;
        sq += d * d;
        max_move = max_move.max(d.abs());
      }

      if attempt == 0 && max_move <= self.tol {
        // full projected step vanished: stationary up to tolerance
        let cost = problem.cost(&candidate)?;
        self.converged = true;
        return Ok((state.param(candidate).cost(cost).gradient(gy), None));
      }
      if max_move == 0.0 {
        break;
      }

      let f_new = problem.cost(&candidate)?;
      if f_new.is_finite() && f_new <= fy + lin + sq / (2.0 * t) + slack {
        accepted = Some((candidate, f_new));
        break;
      }

      t *= 0.5;
    }
    self.step = t;

    let Some((x_new, f_new)) = accepted else {
      tracing::debug!(step = t, "projected gradient line search exhausted");
      self.reset_momentum();
      return Ok((state.param(x).cost(fx).gradient(gy), None));
    };

    let against_last_move: f64 = y
      .iter()
      .zip(x_new.iter())
      .zip(x.iter())
      .map(|((yi, ni), xi)| (yi - ni) * (ni - xi))
      .sum();

    if f_new > fx || against_last_move > 0.0 {
      self.reset_momentum();
    } else {
      let theta_next = 0.5 * (1.0 + (1.0 + 4.0 * self.theta * self.theta).sqrt());
      let beta = (self.theta - 1.0) / theta_next;
      self.momentum = Some(
        x_new
          .iter()
          .zip(x.iter())
          .map(|(ni, xi)| ni + beta * (ni - xi))
          .collect(),
      );
      self.theta = theta_next;
    }

    Ok((state.param(x_new).cost(f_new).gradient(gy), None))
  }

  fn terminate(&mut self, _state: &ProjectedState) -> TerminationStatus {
    if self.converged {
      return TerminationStatus::Terminated(TerminationReason::SolverConverged);
    }
    if let Some(deadline) = self.deadline {
      if Instant::now() >= deadline {
        return TerminationStatus::Terminated(TerminationReason::SolverExit(
          TIME_BUDGET_EXIT.to_string(),
        ));
      }
    }
    TerminationStatus::NotTerminated
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use argmin::core::Executor;
  use argmin::core::State;
  use ndarray::array;

  use super::*;
  use crate::quant::portfolio::moments::MomentEstimates;
  use crate::quant::portfolio::objectives::MinVarianceCost;

  #[test]
  fn converges_to_inverse_variance_mix() {
    // diagonal covariance: w_i proportional to 1 / sigma_i^2
    let moments =
      MomentEstimates::new(array![0.0, 0.0], array![[0.04, 0.0], [0.0, 0.01]]).unwrap();
    let solver = ProjectedGradient::new(Bounds::long_only(2), 1.0, 1e-12);

    let res = Executor::new(MinVarianceCost::new(&moments), solver)
      .configure(|state| state.param(vec![0.5, 0.5]).max_iters(10_000))
      .run()
      .unwrap();

    let state = res.state();
    assert_eq!(
      state.get_termination_reason(),
      Some(&TerminationReason::SolverConverged)
    );
    let w = state.get_best_param().unwrap();
    assert_abs_diff_eq!(w[0], 0.2, epsilon = 1e-8);
    assert_abs_diff_eq!(w[1], 0.8, epsilon = 1e-8);
  }

  #[test]
  fn reports_solver_name() {
    assert_eq!(
      <ProjectedGradient as Solver<MinVarianceCost<'static>, ProjectedState>>::NAME,
      "Projected gradient"
    );
  }

  #[test]
  fn stops_on_iteration_budget() {
    let moments = MomentEstimates::new(
      array![0.0, 0.0, 0.0],
      array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]],
    )
    .unwrap();
    let solver = ProjectedGradient::new(Bounds::long_only(3), 1e-9, 1e-15);

    let res = Executor::new(MinVarianceCost::new(&moments), solver)
      .configure(|state| state.param(vec![1.0, 0.0, 0.0]).max_iters(2))
      .run()
      .unwrap();

    assert_eq!(
      res.state().get_termination_reason(),
      Some(&TerminationReason::MaxItersReached)
    );
  }
}
