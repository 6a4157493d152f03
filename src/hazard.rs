use ndarray::{array, Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use crate::{
    data::LifetimeData,
    error::{Result, SurvivalError},
};

/// how a parameter maps onto the unconstrained optimization scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Positive, // optimized on log scale
    Real,     // optimized as-is
}

/// a hazard h(t) and its integral H(t), plus their gradients in the params
pub trait HazardModel: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn param_names(&self) -> &'static [&'static str];

    fn param_kinds(&self) -> &'static [ParamKind];

    fn n_params(&self) -> usize {
        self.param_names().len()
    }

    /// instantaneous failure rate at `t`
    fn hazard(&self, params: ArrayView1<f64>, t: f64) -> f64;

    /// integrated hazard from 0 to `t`
    fn cumulative_hazard(&self, params: ArrayView1<f64>, t: f64) -> f64;

    /// gradient of h(t) w.r.t. the params
    fn hazard_gradient(&self, params: ArrayView1<f64>, t: f64) -> Array1<f64>;

    /// gradient of H(t) w.r.t. the params
    fn cumulative_hazard_gradient(&self, params: ArrayView1<f64>, t: f64) -> Array1<f64>;

    /// starting point for the optimizer
    fn initial_params(&self, data: &LifetimeData) -> Array1<f64>;

    /// ln h(t); a non-positive hazard gives -inf rather than NaN
    fn log_hazard(&self, params: ArrayView1<f64>, t: f64) -> f64 {
        let h = self.hazard(params, t);
        if h > 0.0 {
            h.ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    fn survival(&self, params: ArrayView1<f64>, t: f64) -> f64 {
        (-self.cumulative_hazard(params, t)).exp()
    }

    fn cdf(&self, params: ArrayView1<f64>, t: f64) -> f64 {
        1.0 - self.survival(params, t)
    }

    fn density(&self, params: ArrayView1<f64>, t: f64) -> f64 {
        self.hazard(params, t) * self.survival(params, t)
    }

    fn validate_params(&self, params: ArrayView1<f64>) -> Result<()> {
        if params.len() != self.n_params() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "{} takes {} params, got {}",
                self.name(),
                self.n_params(),
                params.len()
            )));
        }

        for ((&value, name), kind) in params
            .iter()
            .zip(self.param_names())
            .zip(self.param_kinds())
        {
            let ok = match kind {
                ParamKind::Positive => value.is_finite() && value > 0.0,
                ParamKind::Real => value.is_finite(),
            };
            if !ok {
                return Err(SurvivalError::invalid_parameter(*name, value.to_string()));
            }
        }

        Ok(())
    }
}

/// weibull hazard, `H(t) = (t/lambda)^rho`
///
/// params are `[lambda, rho]` (scale, shape). `rho < 1` is a decreasing hazard,
/// `rho = 1` collapses to the exponential, `rho > 1` is wear-out.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeibullHazard;

impl WeibullHazard {
    pub fn new() -> Self {
        Self
    }

    /// time by which a fraction `p` has failed
    pub fn quantile(lambda: f64, rho: f64, p: f64) -> f64 {
        lambda * (-(1.0 - p).ln()).powf(1.0 / rho)
    }

    pub fn median(lambda: f64, rho: f64) -> f64 {
        lambda * std::f64::consts::LN_2.powf(1.0 / rho)
    }

    pub fn mean(lambda: f64, rho: f64) -> f64 {
        lambda * statrs::function::gamma::gamma(1.0 + 1.0 / rho)
    }
}

impl HazardModel for WeibullHazard {
    fn name(&self) -> &'static str {
        "weibull"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["lambda", "rho"]
    }

    fn param_kinds(&self) -> &'static [ParamKind] {
        &[ParamKind::Positive, ParamKind::Positive]
    }

    fn hazard(&self, params: ArrayView1<f64>, t: f64) -> f64 {
        let (lambda, rho) = (params[0], params[1]);
        rho / lambda * (t / lambda).powf(rho - 1.0)
    }

    fn cumulative_hazard(&self, params: ArrayView1<f64>, t: f64) -> f64 {
        let (lambda, rho) = (params[0], params[1]);
        (t / lambda).powf(rho)
    }

    fn hazard_gradient(&self, params: ArrayView1<f64>, t: f64) -> Array1<f64> {
        let (lambda, rho) = (params[0], params[1]);
        let h = self.hazard(params, t);
        // ln h = ln rho - rho ln lambda + (rho - 1) ln t
        array![-h * rho / lambda, h * (1.0 / rho + (t / lambda).ln())]
    }

    fn cumulative_hazard_gradient(&self, params: ArrayView1<f64>, t: f64) -> Array1<f64> {
        let (lambda, rho) = (params[0], params[1]);
        let big_h = self.cumulative_hazard(params, t);
        array![-big_h * rho / lambda, big_h * (t / lambda).ln()]
    }

    fn initial_params(&self, data: &LifetimeData) -> Array1<f64> {
        // exponential fit as the rho = 1 starting point
        let lambda = data.total_exposure() / data.n_events().max(1) as f64;
        array![lambda, 1.0]
    }
}

/// constant hazard `1/lambda`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialHazard;

impl ExponentialHazard {
    pub fn new() -> Self {
        Self
    }
}

impl HazardModel for ExponentialHazard {
    fn name(&self) -> &'static str {
        "exponential"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["lambda"]
    }

    fn param_kinds(&self) -> &'static [ParamKind] {
        &[ParamKind::Positive]
    }

    fn hazard(&self, params: ArrayView1<f64>, _t: f64) -> f64 {
        1.0 / params[0]
    }

    fn cumulative_hazard(&self, params: ArrayView1<f64>, t: f64) -> f64 {
        t / params[0]
    }

    fn hazard_gradient(&self, params: ArrayView1<f64>, _t: f64) -> Array1<f64> {
        let lambda = params[0];
        array![-1.0 / (lambda * lambda)]
    }

    fn cumulative_hazard_gradient(&self, params: ArrayView1<f64>, t: f64) -> Array1<f64> {
        let lambda = params[0];
        array![-t / (lambda * lambda)]
    }

    fn initial_params(&self, data: &LifetimeData) -> Array1<f64> {
        array![data.total_exposure() / data.n_events().max(1) as f64]
    }
}

/// linear hazard `h(t) = alpha + beta * t`
///
/// nothing keeps h positive - with a negative slope it crosses zero at `t = -alpha/beta`
/// and an event past that point sends the log-likelihood to -inf
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearHazard;

impl LinearHazard {
    pub fn new() -> Self {
        Self
    }
}

impl HazardModel for LinearHazard {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["alpha", "beta"]
    }

    fn param_kinds(&self) -> &'static [ParamKind] {
        &[ParamKind::Real, ParamKind::Real]
    }

    fn hazard(&self, params: ArrayView1<f64>, t: f64) -> f64 {
        params[0] + params[1] * t
    }

    fn cumulative_hazard(&self, params: ArrayView1<f64>, t: f64) -> f64 {
        params[0] * t + 0.5 * params[1] * t * t
    }

    fn hazard_gradient(&self, _params: ArrayView1<f64>, t: f64) -> Array1<f64> {
        array![1.0, t]
    }

    fn cumulative_hazard_gradient(&self, _params: ArrayView1<f64>, t: f64) -> Array1<f64> {
        array![t, 0.5 * t * t]
    }

    fn initial_params(&self, data: &LifetimeData) -> Array1<f64> {
        // flat hazard at the crude event rate
        let rate = data.n_events().max(1) as f64 / data.total_exposure();
        array![rate, 0.0]
    }
}

/// largest `|dH/dt - h(t)|` over `times`, dH/dt by central difference
///
/// `step` is relative to `t`; a consistent model comes back at round-off level
pub fn check_hazard_identity<M: HazardModel + ?Sized>(
    model: &M,
    params: ArrayView1<f64>,
    times: &[f64],
    step: f64,
) -> Result<f64> {
    model.validate_params(params)?;

    if !(step > 0.0 && step.is_finite()) {
        return Err(SurvivalError::invalid_parameter("step", step.to_string()));
    }

    let mut max_error = 0.0_f64;
    for &t in times {
        if !(t > 0.0 && t.is_finite()) {
            return Err(SurvivalError::invalid_parameter("t", t.to_string()));
        }

        let dt = step * t.max(1.0);
        let lo = (t - dt).max(t * 0.5);
        let hi = t + dt;
        let derivative =
            (model.cumulative_hazard(params, hi) - model.cumulative_hazard(params, lo)) / (hi - lo);

        max_error = max_error.max((derivative - model.hazard(params, t)).abs());
    }

    Ok(max_error)
}
