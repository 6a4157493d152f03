//! # parametric hazards
//!
//! parametric survival models fit by censored maximum likelihood - weibull first,
//! with delta-method intervals for anything you derive from the fit
//!
//! ## what you get
//!
//! - closed-form hazard models (weibull, exponential, linear) w/ analytic gradients
//! - right-censored log-likelihood, score & hessian
//! - BFGS / Newton-Raphson MLE on an unconstrained scale
//! - covariance from the observed information + delta-method intervals
//! - synthetic lifetimes w/ several censoring schemes
//! - kaplan-meier / nelson-aalen to eyeball the fit against
//!
//! ## quick start
//!
//! ```rust
//! use parametric_hazards::{
//!     simulate, CensoringScheme, ParametricSurvivalModel, SimulationConfig, WeibullHazard,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 200 weibull lifetimes, study ends at t = 15
//! let config = SimulationConfig::new(200, 10.0, 1.5)
//!     .with_censoring(CensoringScheme::FixedHorizon { horizon: 15.0 });
//! let data = simulate(&config)?;
//!
//! let mut model = ParametricSurvivalModel::new(WeibullHazard);
//! model.fit(&data)?;
//!
//! // median lifetime w/ a 95% delta-method interval
//! let median = model.delta(|p| WeibullHazard::median(p[0], p[1]))?;
//! assert!(median.lower < median.estimate && median.estimate < median.upper);
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod delta;
pub mod error;
pub mod hazard;
pub mod likelihood;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod simulate;

pub use data::LifetimeData;
pub use delta::DeltaEstimate;
pub use error::{Result, SurvivalError};
pub use hazard::{ExponentialHazard, HazardModel, LinearHazard, ParamKind, WeibullHazard};
pub use model::{ModelSummary, ParametricSurvivalModel};
pub use optimization::{OptimizationConfig, OptimizerType};
pub use simulate::{simulate, CensoringScheme, SimulationConfig};
