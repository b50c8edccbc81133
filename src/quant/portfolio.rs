//! # Portfolio
//!
//! $$
//! \mathbf w^\* = \arg\min_{\mathbf 1^\top\mathbf w = 1,\ \ell\le\mathbf w\le u} f(\mathbf w;\ \hat\mu, \hat\Sigma)
//! $$
//!
//! Constrained weight optimization (maximum Sharpe, minimum variance, maximum
//! return) over a window of asset returns.

pub mod data;
pub mod engine;
pub mod error;
pub mod moments;
pub mod objectives;
pub mod optimizers;
pub mod projection;
pub mod solver;
pub mod types;

pub use data::ReturnKind;
pub use data::ReturnSample;
pub use data::price_returns;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use error::OptimizeError;
pub use error::OptimizeResult;
pub use moments::MomentEstimates;
pub use optimizers::OptimizerConfig;
pub use optimizers::SolveOutcome;
pub use optimizers::SolverSettings;
pub use optimizers::optimize;
pub use optimizers::optimize_moments;
pub use projection::project_onto_budget;
pub use types::Bounds;
pub use types::ObjectiveKind;
pub use types::PortfolioResult;
pub use types::WeightVector;
