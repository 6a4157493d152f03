use ndarray::{Array1, Array2, ArrayView1};
use crate::{
    data::LifetimeData,
    delta::{delta_method, delta_method_with_gradient, z_critical, DeltaEstimate},
    error::{Result, SurvivalError},
    hazard::{HazardModel, ParamKind},
    likelihood::observed_information,
    metrics::{aic, bic},
    optimization::{invert_matrix, MleOptimizer, OptimizationConfig, OptimizerType},
};

/// everything a fit produces
#[derive(Debug, Clone)]
struct FitState {
    params: Array1<f64>,
    covariance: Array2<f64>,
    log_likelihood: f64,
    iterations: usize,
    n_samples: usize,
    n_events: usize,
}

/// parametric survival model - a hazard model fit by censored MLE
#[derive(Debug, Clone)]
pub struct ParametricSurvivalModel<M: HazardModel> {
    model: M,
    config: OptimizationConfig,
    confidence_level: f64, // for every interval this model reports
    fit: Option<FitState>,
}

impl<M: HazardModel> ParametricSurvivalModel<M> {
    /// new unfitted model w/ default optimizer settings
    pub fn new(model: M) -> Self {
        Self {
            model,
            config: OptimizationConfig::default(),
            confidence_level: 0.95,
            fit: None,
        }
    }

    pub fn with_optimizer(mut self, optimizer_type: OptimizerType) -> Self {
        self.config.optimizer_type = optimizer_type;
        self
    }

    /// max iterations before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.config.max_iterations = max_iter;
        self
    }

    /// how close is close enough for convergence
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.config.tolerance = tol;
        self
    }

    /// start the optimizer here instead of the model's guess (natural scale)
    pub fn with_initial_params(mut self, params: Vec<f64>) -> Self {
        self.config.initial_params = Some(params);
        self
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    /// swap in a whole optimization config (e.g. one read from toml)
    pub fn with_config(mut self, config: OptimizationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hazard_model(&self) -> &M {
        &self.model
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// fit to data: MLE, then covariance = inverse observed information
    pub fn fit(&mut self, data: &LifetimeData) -> Result<&mut Self> {
        z_critical(self.confidence_level)?;

        let optimizer = MleOptimizer::new(self.config.clone());
        let result = optimizer.optimize(&self.model, data)?;

        let information = observed_information(&self.model, result.params.view(), data)?;
        let covariance = invert_matrix(&information).map_err(|_| {
            SurvivalError::numerical_error("observed information is singular - no covariance")
        })?;

        if (0..covariance.nrows()).any(|i| !(covariance[[i, i]] > 0.0)) {
            return Err(SurvivalError::numerical_error(
                "covariance has a non-positive variance - MLE is not a maximum",
            ));
        }

        log::debug!("{} covariance: {:?}", self.model.name(), covariance);

        self.fit = Some(FitState {
            params: result.params,
            covariance,
            log_likelihood: result.log_likelihood,
            iterations: result.iterations,
            n_samples: data.n_samples(),
            n_events: data.n_events(),
        });

        Ok(self)
    }

    fn state(&self) -> Result<&FitState> {
        self.fit.as_ref().ok_or(SurvivalError::ModelNotFitted)
    }

    /// has this model been fit to data yet?
    pub fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    /// fitted params on the natural scale
    pub fn params(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.state()?.params.view())
    }

    pub fn covariance(&self) -> Result<&Array2<f64>> {
        Ok(&self.state()?.covariance)
    }

    pub fn standard_errors(&self) -> Result<Array1<f64>> {
        let cov = self.covariance()?;
        Ok(cov.diag().mapv(f64::sqrt))
    }

    pub fn log_likelihood(&self) -> Result<f64> {
        Ok(self.state()?.log_likelihood)
    }

    pub fn iterations(&self) -> Result<usize> {
        Ok(self.state()?.iterations)
    }

    /// Wald interval per parameter.
    ///
    /// Positive parameters get their interval on the log scale, `theta * exp(+-z * se / theta)`,
    /// so the bounds stay positive.
    pub fn confidence_intervals(&self) -> Result<Vec<DeltaEstimate>> {
        let state = self.state()?;
        let z = z_critical(self.confidence_level)?;

        let intervals = self
            .model
            .param_kinds()
            .iter()
            .enumerate()
            .map(|(j, kind)| {
                let theta = state.params[j];
                let se = state.covariance[[j, j]].sqrt();
                let (lower, upper) = match kind {
                    ParamKind::Positive => {
                        let log_se = se / theta;
                        (theta * (-z * log_se).exp(), theta * (z * log_se).exp())
                    }
                    ParamKind::Real => (theta - z * se, theta + z * se),
                };
                DeltaEstimate {
                    estimate: theta,
                    std_error: se,
                    lower,
                    upper,
                    confidence_level: self.confidence_level,
                }
            })
            .collect();

        Ok(intervals)
    }

    pub fn predict_hazard(&self, times: ArrayView1<f64>) -> Result<Array1<f64>> {
        let params = self.params()?;
        check_times(times)?;
        Ok(times.mapv(|t| self.model.hazard(params, t)))
    }

    pub fn predict_cumulative_hazard(&self, times: ArrayView1<f64>) -> Result<Array1<f64>> {
        let params = self.params()?;
        check_times(times)?;
        Ok(times.mapv(|t| self.model.cumulative_hazard(params, t)))
    }

    /// S(t) = exp(-H(t)) at each time
    pub fn predict_survival(&self, times: ArrayView1<f64>) -> Result<Array1<f64>> {
        let params = self.params()?;
        check_times(times)?;
        Ok(times.mapv(|t| self.model.survival(params, t)))
    }

    /// Delta-method band for `H(t)`, built on `ln H` so the lower bound stays positive.
    ///
    /// `std_error` is reported on the `H` scale (`H * se(ln H)`).
    pub fn cumulative_hazard_band(&self, times: ArrayView1<f64>) -> Result<Vec<DeltaEstimate>> {
        let state = self.state()?;
        check_times(times)?;
        let params = state.params.view();

        times
            .iter()
            .map(|&t| {
                let big_h = self.model.cumulative_hazard(params, t);
                if !(big_h > 0.0 && big_h.is_finite()) {
                    return Err(SurvivalError::numerical_error(format!(
                        "cumulative hazard is {} at t = {} - no log-scale band",
                        big_h, t
                    )));
                }

                let log_gradient = self.model.cumulative_hazard_gradient(params, t) / big_h;
                let log_est = delta_method_with_gradient(
                    big_h.ln(),
                    log_gradient.view(),
                    &state.covariance,
                    self.confidence_level,
                )?;

                Ok(DeltaEstimate {
                    estimate: big_h,
                    std_error: big_h * log_est.std_error,
                    lower: log_est.lower.exp(),
                    upper: log_est.upper.exp(),
                    confidence_level: self.confidence_level,
                })
            })
            .collect()
    }

    /// survival band from the cumulative hazard band, `S = exp(-H)`
    pub fn survival_band(&self, times: ArrayView1<f64>) -> Result<Vec<DeltaEstimate>> {
        let band = self.cumulative_hazard_band(times)?;

        Ok(band
            .into_iter()
            .map(|h| {
                let survival = (-h.estimate).exp();
                DeltaEstimate {
                    estimate: survival,
                    std_error: survival * h.std_error, // |dS/dH| = S
                    lower: (-h.upper).exp(),
                    upper: (-h.lower).exp(),
                    confidence_level: h.confidence_level,
                }
            })
            .collect())
    }

    /// Delta-method estimate for any derived quantity `f(params)` of the fitted params.
    pub fn delta<F>(&self, f: F) -> Result<DeltaEstimate>
    where
        F: Fn(ArrayView1<f64>) -> f64,
    {
        let state = self.state()?;
        delta_method(f, state.params.view(), &state.covariance, self.confidence_level)
    }

    /// get a nice summary of the fitted model
    pub fn summary(&self) -> Result<ModelSummary> {
        let state = self.state()?;
        let intervals = self.confidence_intervals()?;
        let k = self.model.n_params();

        Ok(ModelSummary {
            model_name: self.model.name().to_string(),
            param_names: self.model.param_names().iter().map(|s| s.to_string()).collect(),
            estimates: state.params.clone(),
            std_errors: self.standard_errors()?,
            intervals,
            log_likelihood: state.log_likelihood,
            aic: aic(state.log_likelihood, k),
            bic: bic(state.log_likelihood, k, state.n_samples),
            n_samples: state.n_samples,
            n_events: state.n_events,
            confidence_level: self.confidence_level,
        })
    }
}

fn check_times(times: ArrayView1<f64>) -> Result<()> {
    if let Some(&bad) = times.iter().find(|&&t| !(t >= 0.0 && t.is_finite())) {
        return Err(SurvivalError::invalid_parameter("t", bad.to_string()));
    }
    Ok(())
}

/// nice summary of what the model learned
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub model_name: String,
    pub param_names: Vec<String>,
    pub estimates: Array1<f64>,
    pub std_errors: Array1<f64>,
    pub intervals: Vec<DeltaEstimate>,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub n_samples: usize,
    pub n_events: usize,
    pub confidence_level: f64,
}

impl ModelSummary {
    /// print out what we learned
    pub fn print(&self) {
        println!("{} survival model summary", self.model_name);
        println!("=====================================");
        println!("observations: {} ({} events, {} censored)",
                 self.n_samples, self.n_events, self.n_samples - self.n_events);
        println!("log-likelihood: {:.6}", self.log_likelihood);
        println!("AIC: {:.4}   BIC: {:.4}", self.aic, self.bic);
        println!();

        let ci_label = format!("{:.0}% CI", self.confidence_level * 100.0);
        println!("{:<12} {:>12} {:>12} {:>26}", "param", "estimate", "std err", ci_label);
        println!("{:-<65}", "");

        for (i, name) in self.param_names.iter().enumerate() {
            println!("{:<12} {:>12.6} {:>12.6}   [{:>10.6}, {:>10.6}]",
                     name,
                     self.estimates[i],
                     self.std_errors[i],
                     self.intervals[i].lower,
                     self.intervals[i].upper);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use crate::hazard::{ExponentialHazard, WeibullHazard};

    fn create_test_data() -> LifetimeData {
        let durations = vec![0.8, 1.4, 2.0, 2.9, 3.3, 4.1, 5.0, 6.2, 7.5, 9.1];
        let observed = vec![true, true, false, true, true, false, true, true, false, true];
        LifetimeData::new(durations, observed).unwrap()
    }

    #[test]
    fn test_model_creation() {
        let model = ParametricSurvivalModel::new(WeibullHazard)
            .with_max_iterations(500)
            .with_tolerance(1e-6)
            .with_optimizer(OptimizerType::NewtonRaphson)
            .with_confidence_level(0.9);

        assert_eq!(model.config.max_iterations, 500);
        assert_eq!(model.config.tolerance, 1e-6);
        assert_eq!(model.config.optimizer_type, OptimizerType::NewtonRaphson);
        assert_eq!(model.confidence_level(), 0.9);
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_model_not_fitted_error() {
        let model = ParametricSurvivalModel::new(WeibullHazard);
        assert!(matches!(model.params(), Err(SurvivalError::ModelNotFitted)));
        assert!(model.summary().is_err());
        assert!(model.covariance().is_err());
        assert!(model.predict_survival(array![1.0].view()).is_err());
        assert!(model.delta(|p| p[0]).is_err());
    }

    #[test]
    fn test_bad_confidence_level_fails_fit() {
        let data = create_test_data();
        let mut model = ParametricSurvivalModel::new(WeibullHazard).with_confidence_level(1.5);
        assert!(model.fit(&data).is_err());
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_exponential_standard_error() {
        // var(lambda) = lambda^2 / d for the exponential
        let data = create_test_data();
        let mut model = ParametricSurvivalModel::new(ExponentialHazard);
        model.fit(&data).unwrap();

        let lambda = model.params().unwrap()[0];
        let d = data.n_events() as f64;
        assert_relative_eq!(lambda, data.total_exposure() / d, max_relative = 1e-5);

        let se = model.standard_errors().unwrap()[0];
        assert_relative_eq!(se, lambda / d.sqrt(), max_relative = 1e-3);
    }

    #[test]
    fn test_positive_param_intervals() {
        let data = create_test_data();
        let mut model = ParametricSurvivalModel::new(WeibullHazard);
        model.fit(&data).unwrap();

        for ci in model.confidence_intervals().unwrap() {
            assert!(ci.lower > 0.0);
            assert!(ci.lower < ci.estimate && ci.estimate < ci.upper);
            // log-scale interval is symmetric in ratio
            assert_relative_eq!(ci.estimate / ci.lower, ci.upper / ci.estimate, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_predictions() {
        let data = create_test_data();
        let mut model = ParametricSurvivalModel::new(WeibullHazard);
        model.fit(&data).unwrap();

        let times = array![0.0, 1.0, 2.0, 5.0, 10.0];
        let surv = model.predict_survival(times.view()).unwrap();
        let cum = model.predict_cumulative_hazard(times.view()).unwrap();

        assert_relative_eq!(surv[0], 1.0, epsilon = 1e-12);
        for j in 1..times.len() {
            assert!(surv[j] <= surv[j - 1]);
            assert_relative_eq!(surv[j], (-cum[j]).exp(), epsilon = 1e-12);
        }

        assert!(model.predict_hazard(array![-1.0].view()).is_err());
    }

    #[test]
    fn test_bands_contain_estimates() {
        let data = create_test_data();
        let mut model = ParametricSurvivalModel::new(WeibullHazard);
        model.fit(&data).unwrap();

        let times = array![1.0, 3.0, 6.0];
        let cum_band = model.cumulative_hazard_band(times.view()).unwrap();
        let surv_band = model.survival_band(times.view()).unwrap();

        for (h, s) in cum_band.iter().zip(surv_band.iter()) {
            assert!(h.lower > 0.0 && h.lower < h.estimate && h.estimate < h.upper);
            assert!(s.lower >= 0.0 && s.lower < s.estimate && s.estimate < s.upper && s.upper <= 1.0);
            assert_relative_eq!(s.estimate, (-h.estimate).exp(), epsilon = 1e-12);
        }

        // t = 0 has H = 0, so no log-scale band
        assert!(model.cumulative_hazard_band(array![0.0].view()).is_err());
    }

    #[test]
    fn test_delta_on_median_matches_closed_form() {
        let data = create_test_data();
        let mut model = ParametricSurvivalModel::new(WeibullHazard);
        model.fit(&data).unwrap();

        let numeric = model
            .delta(|p| WeibullHazard::median(p[0], p[1]))
            .unwrap();
        let closed = crate::delta::weibull_median(
            model.params().unwrap(),
            model.covariance().unwrap(),
            0.95,
        )
        .unwrap();

        assert_relative_eq!(numeric.estimate, closed.estimate, epsilon = 1e-12);
        assert_relative_eq!(numeric.std_error, closed.std_error, max_relative = 1e-4);
    }

    #[test]
    fn test_summary() {
        let data = create_test_data();
        let mut model = ParametricSurvivalModel::new(WeibullHazard);
        model.fit(&data).unwrap();

        let summary = model.summary().unwrap();
        assert_eq!(summary.model_name, "weibull");
        assert_eq!(summary.param_names, vec!["lambda", "rho"]);
        assert_eq!(summary.n_samples, 10);
        assert_eq!(summary.n_events, 7);
        assert_relative_eq!(summary.aic, 4.0 - 2.0 * summary.log_likelihood, epsilon = 1e-12);
        summary.print();
    }
}
