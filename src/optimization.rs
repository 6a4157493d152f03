use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use wolfe_bfgs::{Bfgs, BfgsSolution};
use crate::{
    data::LifetimeData,
    error::{Result, SurvivalError},
    hazard::HazardModel,
    likelihood::{
        from_unconstrained, likelihood_derivatives, log_likelihood, score, to_unconstrained,
        unconstrained_hessian, unconstrained_jacobian,
    },
};

/// objective value handed to the line search when the likelihood is -inf / NaN
const NON_FINITE_PENALTY: f64 = 1e10;
/// bound on each rescaled bfgs coordinate
const PSI_LIMIT: f64 = 1e3;
/// bfgs gradients are scaled back to this norm
const MAX_GRADIENT_NORM: f64 = 100.0;

/// Optimization algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerType {
    #[default]
    Bfgs,
    NewtonRaphson,
}

/// Configuration for maximum-likelihood fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    pub optimizer_type: OptimizerType,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// natural-scale starting point; None = the model's own guess
    pub initial_params: Option<Vec<f64>>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            optimizer_type: OptimizerType::Bfgs,
            max_iterations: 1000,
            tolerance: 1e-8,
            initial_params: None,
        }
    }
}

impl OptimizationConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SurvivalError::invalid_config("max_iterations must be > 0"));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(SurvivalError::invalid_config(format!(
                "tolerance must be positive & finite, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// what came out of the optimizer, on the natural parameter scale
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub params: Array1<f64>,
    pub log_likelihood: f64,
    pub iterations: usize,
    /// false only when newton-raphson ran out of uphill steps before the gradient test
    pub converged: bool,
}

/// Maximum-likelihood optimizer for a [`HazardModel`].
///
/// Works on the unconstrained scale (log for positive params) so neither BFGS nor
/// Newton can step out of the valid region.
pub struct MleOptimizer {
    config: OptimizationConfig,
}

impl MleOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Optimize using the configured algorithm
    pub fn optimize<M: HazardModel + ?Sized>(
        &self,
        model: &M,
        data: &LifetimeData,
    ) -> Result<OptimizationResult> {
        self.config.validate()?;

        if data.n_events() == 0 {
            return Err(SurvivalError::invalid_survival_data(
                "no observed events - likelihood has no maximum",
            ));
        }

        let initial = match &self.config.initial_params {
            Some(values) => Array1::from(values.clone()),
            None => model.initial_params(data),
        };
        model.validate_params(initial.view())?;

        let initial_ll = log_likelihood(model, initial.view(), data)?;
        if !initial_ll.is_finite() {
            return Err(SurvivalError::optimization_failed(format!(
                "log-likelihood at the starting point is {}",
                initial_ll
            )));
        }

        log::info!(
            "fitting {} model: n={}, events={}, optimizer={:?}, start={:?}",
            model.name(),
            data.n_samples(),
            data.n_events(),
            self.config.optimizer_type,
            initial.to_vec()
        );

        let result = match self.config.optimizer_type {
            OptimizerType::Bfgs => match self.bfgs_optimize(model, data, &initial) {
                Ok(result) => result,
                Err(err) => {
                    log::warn!("bfgs failed ({}), falling back to newton-raphson", err);
                    self.newton_raphson_optimize(model, data, &initial)?
                }
            },
            OptimizerType::NewtonRaphson => self.newton_raphson_optimize(model, data, &initial)?,
        };

        model.validate_params(result.params.view()).map_err(|e| {
            SurvivalError::optimization_failed(format!("optimizer left the parameter space: {}", e))
        })?;
        if !result.log_likelihood.is_finite() {
            return Err(SurvivalError::optimization_failed(format!(
                "final log-likelihood is {}",
                result.log_likelihood
            )));
        }

        if !result.converged {
            log::warn!(
                "{} fit stalled before the gradient test passed - estimates may be rough",
                model.name()
            );
        }

        log::info!(
            "{} fit done in {} iterations: params={:?}, loglik={:.6}",
            model.name(),
            result.iterations,
            result.params.to_vec(),
            result.log_likelihood
        );

        Ok(result)
    }

    /// quasi-newton via wolfe_bfgs, in unconstrained coordinates rescaled by the
    /// curvature at the start
    fn bfgs_optimize<M: HazardModel + ?Sized>(
        &self,
        model: &M,
        data: &LifetimeData,
        initial: &Array1<f64>,
    ) -> Result<OptimizationResult> {
        let kinds = model.param_kinds();
        let initial_phi = to_unconstrained(kinds, initial.view())?;
        let n_params = initial_phi.len();
        let scaling = curvature_scaling(model, data, initial);

        // psi = scaling * (phi - phi0), clamped so a wild trial step can't overflow H
        let to_phi = |psi: &Array1<f64>| -> Array1<f64> {
            &initial_phi + &(psi.mapv(|v| v.clamp(-PSI_LIMIT, PSI_LIMIT)) / &scaling)
        };

        let cost_and_grad = |psi: &Array1<f64>| -> (f64, Array1<f64>) {
            let phi = to_phi(psi);
            match unconstrained_objective(model, data, &phi) {
                Ok((cost, grad)) if cost.is_finite() && grad.iter().all(|g| g.is_finite()) => {
                    let mut grad = grad / &scaling;
                    let grad_norm = grad.dot(&grad).sqrt();
                    if grad_norm > MAX_GRADIENT_NORM {
                        grad.mapv_inplace(|g| g * MAX_GRADIENT_NORM / grad_norm);
                    }
                    (cost, grad)
                }
                Ok((cost, _)) => {
                    log::warn!("non-finite objective {} at phi={:?}", cost, phi.to_vec());
                    (NON_FINITE_PENALTY, Array1::zeros(n_params))
                }
                Err(e) => {
                    log::warn!("objective failed at phi={:?}: {}", phi.to_vec(), e);
                    (NON_FINITE_PENALTY, Array1::zeros(n_params))
                }
            }
        };

        let BfgsSolution {
            final_point,
            final_value,
            iterations,
            ..
        } = Bfgs::new(Array1::zeros(n_params), cost_and_grad)
            .with_tolerance(self.config.tolerance)
            .with_max_iterations(self.config.max_iterations)
            .run()
            .map_err(|e| SurvivalError::optimization_failed(format!("bfgs failed: {:?}", e)))?;

        if final_value >= NON_FINITE_PENALTY {
            return Err(SurvivalError::optimization_failed(
                "bfgs ended on a non-finite likelihood",
            ));
        }

        let phi = to_phi(&final_point);
        let (_, grad) = unconstrained_objective(model, data, &phi)?;
        let grad_max = (grad / &scaling).iter().fold(0.0_f64, |acc, g| acc.max(g.abs()));
        if !(grad_max < self.config.tolerance.sqrt()) {
            return Err(SurvivalError::optimization_failed(format!(
                "bfgs stopped with scaled gradient {:.3e} after {} iterations",
                grad_max, iterations
            )));
        }

        let params = from_unconstrained(kinds, phi.view())?;
        let loglik = log_likelihood(model, params.view(), data)?;

        Ok(OptimizationResult {
            params,
            log_likelihood: loglik,
            iterations,
            converged: true,
        })
    }

    /// Newton-Raphson on the unconstrained scale, halving steps that don't improve the likelihood
    fn newton_raphson_optimize<M: HazardModel + ?Sized>(
        &self,
        model: &M,
        data: &LifetimeData,
        initial: &Array1<f64>,
    ) -> Result<OptimizationResult> {
        let kinds = model.param_kinds();
        let mut phi = to_unconstrained(kinds, initial.view())?;
        let mut params = initial.clone();
        let mut prev_loglik = f64::NEG_INFINITY;

        for iteration in 0..self.config.max_iterations {
            let derivs = likelihood_derivatives(model, params.view(), data)?;
            let loglik = derivs.log_likelihood;

            let jac = unconstrained_jacobian(kinds, params.view())?;
            let gradient = &derivs.gradient * &jac;
            let hessian = unconstrained_hessian(kinds, params.view(), derivs.gradient.view(), &derivs.hessian)?;

            log::debug!(
                "newton iter {}: loglik={:.10}, |grad|={:.3e}",
                iteration,
                loglik,
                gradient.dot(&gradient).sqrt()
            );

            // Check for convergence
            let grad_max = gradient.iter().fold(0.0_f64, |acc, g| acc.max(g.abs()));
            let flat = (loglik - prev_loglik).abs() < self.config.tolerance
                && grad_max < self.config.tolerance.sqrt();
            if flat || grad_max < self.config.tolerance {
                return Ok(OptimizationResult {
                    params,
                    log_likelihood: loglik,
                    iterations: iteration,
                    converged: true,
                });
            }

            let direction = newton_direction(&hessian, &gradient);

            let mut step_size = 1.0;
            let mut improved = false;
            for _ in 0..40 {
                let candidate_phi = &phi + &(step_size * &direction);
                let candidate = from_unconstrained(kinds, candidate_phi.view())?;

                if model.validate_params(candidate.view()).is_ok() {
                    let candidate_ll = log_likelihood(model, candidate.view(), data)?;
                    if candidate_ll.is_finite() && candidate_ll >= loglik {
                        phi = candidate_phi;
                        params = candidate;
                        improved = true;
                        break;
                    }
                }
                step_size *= 0.5;
            }

            if !improved {
                // no uphill step left at machine precision
                return Ok(OptimizationResult {
                    params,
                    log_likelihood: loglik,
                    iterations: iteration,
                    converged: grad_max < self.config.tolerance.sqrt(),
                });
            }

            prev_loglik = loglik;
        }

        Err(SurvivalError::optimization_failed(format!(
            "Newton-Raphson failed to converge in {} iterations",
            self.config.max_iterations
        )))
    }
}

/// negative log-likelihood and its gradient w.r.t. the unconstrained params
fn unconstrained_objective<M: HazardModel + ?Sized>(
    model: &M,
    data: &LifetimeData,
    phi: &Array1<f64>,
) -> Result<(f64, Array1<f64>)> {
    let kinds = model.param_kinds();
    let params = from_unconstrained(kinds, phi.view())?;
    model.validate_params(params.view())?;

    let loglik = log_likelihood(model, params.view(), data)?;
    if !loglik.is_finite() {
        return Ok((-loglik, Array1::zeros(phi.len())));
    }

    let jac = unconstrained_jacobian(kinds, params.view())?;
    let grad = -(score(model, params.view(), data)? * &jac);

    Ok((-loglik, grad))
}

/// `sqrt(-d2 loglik)` along each unconstrained coordinate at `params`; 1 wherever
/// that curvature isn't usable
fn curvature_scaling<M: HazardModel + ?Sized>(
    model: &M,
    data: &LifetimeData,
    params: &Array1<f64>,
) -> Array1<f64> {
    let kinds = model.param_kinds();
    let hessian = likelihood_derivatives(model, params.view(), data).and_then(|derivs| {
        unconstrained_hessian(kinds, params.view(), derivs.gradient.view(), &derivs.hessian)
    });

    match hessian {
        Ok(hessian) => hessian
            .diag()
            .mapv(|v| if v < 0.0 && v.is_finite() { (-v).sqrt() } else { 1.0 }),
        Err(e) => {
            log::debug!("no curvature at the start ({}), bfgs runs unscaled", e);
            Array1::ones(params.len())
        }
    }
}

/// uphill direction: the newton step if the hessian yields one, else the gradient
fn newton_direction(hessian: &Array2<f64>, gradient: &Array1<f64>) -> Array1<f64> {
    match solve_linear_system(hessian, gradient) {
        Ok(step) if step.dot(gradient) < 0.0 => -step,
        _ => gradient.clone(),
    }
}

/// Solve linear system Ax = b (gaussian elimination w/ partial pivoting)
pub(crate) fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(SurvivalError::invalid_dimensions("Matrix dimensions mismatch"));
    }

    let mut a_copy = a.clone();
    let mut b_copy = b.clone();

    // Forward elimination
    for i in 0..n {
        let max_row = pivot_row(&a_copy, i);

        if a_copy[[max_row, i]].abs() < 1e-12 {
            return Err(SurvivalError::numerical_error("Matrix is singular"));
        }

        if max_row != i {
            swap_rows(&mut a_copy, i, max_row);
            b_copy.swap(i, max_row);
        }

        // Eliminate
        for k in i + 1..n {
            let factor = a_copy[[k, i]] / a_copy[[i, i]];
            for j in i..n {
                a_copy[[k, j]] -= factor * a_copy[[i, j]];
            }
            b_copy[k] -= factor * b_copy[i];
        }
    }

    // Back substitution
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        x[i] = b_copy[i];
        for j in i + 1..n {
            x[i] -= a_copy[[i, j]] * x[j];
        }
        x[i] /= a_copy[[i, i]];
    }

    Ok(x)
}

/// Gauss-Jordan inverse; the observed information -> covariance step
///
/// the matrix is equilibrated by `sqrt(|diag|)` first, so params on very different
/// scales don't read as singular
pub(crate) fn invert_matrix(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(SurvivalError::invalid_dimensions("can't invert a non-square matrix"));
    }

    let diag = a.diag().mapv(|v| v.abs().sqrt());
    let scales = if diag.iter().all(|d| *d > 0.0 && d.is_finite()) {
        diag
    } else {
        Array1::ones(n)
    };

    let mut work = Array2::from_shape_fn((n, n), |(i, j)| a[[i, j]] / (scales[i] * scales[j]));
    let mut inverse = Array2::<f64>::eye(n);
    let threshold = 1e-12 * work.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);

    for i in 0..n {
        let max_row = pivot_row(&work, i);

        if !(work[[max_row, i]].abs() >= threshold) {
            return Err(SurvivalError::numerical_error("Matrix is singular"));
        }

        if max_row != i {
            swap_rows(&mut work, i, max_row);
            swap_rows(&mut inverse, i, max_row);
        }

        let pivot = work[[i, i]];
        for j in 0..n {
            work[[i, j]] /= pivot;
            inverse[[i, j]] /= pivot;
        }

        for k in 0..n {
            if k == i {
                continue;
            }
            let factor = work[[k, i]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                work[[k, j]] -= factor * work[[i, j]];
                inverse[[k, j]] -= factor * inverse[[i, j]];
            }
        }
    }

    // undo the equilibration
    for i in 0..n {
        for j in 0..n {
            inverse[[i, j]] /= scales[i] * scales[j];
        }
    }

    Ok(inverse)
}

fn pivot_row(a: &Array2<f64>, col: usize) -> usize {
    let mut max_row = col;
    for k in col + 1..a.nrows() {
        if a[[k, col]].abs() > a[[max_row, col]].abs() {
            max_row = k;
        }
    }
    max_row
}

fn swap_rows(a: &mut Array2<f64>, i: usize, j: usize) {
    for col in 0..a.ncols() {
        a.swap([i, col], [j, col]);
    }
}
