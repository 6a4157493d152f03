use ndarray::{array, Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use crate::error::{Result, SurvivalError};

/// point estimate + delta-method interval for some derived quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaEstimate {
    pub estimate: f64,
    pub std_error: f64,
    pub lower: f64,
    pub upper: f64,
    pub confidence_level: f64,
}

/// two-sided standard normal critical value, e.g. 1.96 for 0.95
pub fn z_critical(confidence_level: f64) -> Result<f64> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(SurvivalError::invalid_parameter(
            "confidence_level",
            confidence_level.to_string(),
        ));
    }

    let normal = Normal::new(0.0, 1.0).map_err(|e| SurvivalError::numerical_error(e.to_string()))?;
    Ok(normal.inverse_cdf(0.5 + confidence_level / 2.0))
}

/// delta-method variance `g' cov g`
pub fn delta_method_variance(gradient: ArrayView1<f64>, covariance: &Array2<f64>) -> Result<f64> {
    let n = gradient.len();
    if covariance.dim() != (n, n) {
        return Err(SurvivalError::invalid_dimensions(format!(
            "gradient has {} entries but covariance is {:?}",
            n,
            covariance.dim()
        )));
    }

    let variance = gradient.dot(&covariance.dot(&gradient));
    if !variance.is_finite() {
        return Err(SurvivalError::numerical_error(format!(
            "delta-method variance is {}",
            variance
        )));
    }

    // round-off on a near-singular covariance can dip just below zero
    let scale = gradient.dot(&gradient) * covariance.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if variance < -1e-10 * scale.max(f64::MIN_POSITIVE) {
        return Err(SurvivalError::numerical_error(format!(
            "negative delta-method variance {} - covariance not positive semi-definite",
            variance
        )));
    }

    Ok(variance.max(0.0))
}

/// gradient of `f` by central differences, step relative to each coordinate
pub fn numerical_gradient<F>(f: F, params: ArrayView1<f64>) -> Result<Array1<f64>>
where
    F: Fn(ArrayView1<f64>) -> f64,
{
    scaled_numerical_gradient(f, params, Array1::ones(params.len()).view())
}

/// [`numerical_gradient`] w/ `scales[j]` used in place of `|params[j]|` when that
/// param is exactly zero
pub fn scaled_numerical_gradient<F>(
    f: F,
    params: ArrayView1<f64>,
    scales: ArrayView1<f64>,
) -> Result<Array1<f64>>
where
    F: Fn(ArrayView1<f64>) -> f64,
{
    if scales.len() != params.len() {
        return Err(SurvivalError::invalid_dimensions(format!(
            "{} scales for {} params",
            scales.len(),
            params.len()
        )));
    }

    let mut gradient = Array1::<f64>::zeros(params.len());
    let mut point = params.to_owned();

    for j in 0..params.len() {
        let original = point[j];
        let base = if original != 0.0 { original.abs() } else { scales[j].abs() };
        if !(base > 0.0 && base.is_finite()) {
            return Err(SurvivalError::numerical_error(format!(
                "no usable difference step for param {}",
                j
            )));
        }
        let step = 1e-6 * base;

        point[j] = original + step;
        let up = f(point.view());
        point[j] = original - step;
        let down = f(point.view());
        point[j] = original;

        gradient[j] = (up - down) / (2.0 * step);
        if !gradient[j].is_finite() {
            return Err(SurvivalError::numerical_error(format!(
                "non-finite derivative w.r.t. param {}",
                j
            )));
        }
    }

    Ok(gradient)
}

/// interval for a quantity whose gradient is already known
pub fn delta_method_with_gradient(
    estimate: f64,
    gradient: ArrayView1<f64>,
    covariance: &Array2<f64>,
    confidence_level: f64,
) -> Result<DeltaEstimate> {
    let z = z_critical(confidence_level)?;
    let std_error = delta_method_variance(gradient, covariance)?.sqrt();

    Ok(DeltaEstimate {
        estimate,
        std_error,
        lower: estimate - z * std_error,
        upper: estimate + z * std_error,
        confidence_level,
    })
}

/// delta method for an arbitrary `f(params)`, gradient taken numerically
///
/// a param sitting exactly at zero is stepped by a fraction of its standard error.
pub fn delta_method<F>(
    f: F,
    params: ArrayView1<f64>,
    covariance: &Array2<f64>,
    confidence_level: f64,
) -> Result<DeltaEstimate>
where
    F: Fn(ArrayView1<f64>) -> f64,
{
    let estimate = f(params);
    if !estimate.is_finite() {
        return Err(SurvivalError::numerical_error(format!(
            "derived quantity is {} at the estimate",
            estimate
        )));
    }

    let scales = covariance.diag().mapv(|v| v.max(0.0).sqrt());
    if scales.len() != params.len() {
        return Err(SurvivalError::invalid_dimensions(format!(
            "{} params but covariance is {:?}",
            params.len(),
            covariance.dim()
        )));
    }
    let gradient = scaled_numerical_gradient(&f, params, scales.view())?;
    delta_method_with_gradient(estimate, gradient.view(), covariance, confidence_level)
}

// weibull derived quantities, params = [lambda, rho]

fn check_weibull(params: ArrayView1<f64>) -> Result<(f64, f64)> {
    if params.len() != 2 {
        return Err(SurvivalError::invalid_dimensions(format!(
            "weibull takes 2 params, got {}",
            params.len()
        )));
    }
    let (lambda, rho) = (params[0], params[1]);
    if !(lambda > 0.0 && lambda.is_finite()) {
        return Err(SurvivalError::invalid_parameter("lambda", lambda.to_string()));
    }
    if !(rho > 0.0 && rho.is_finite()) {
        return Err(SurvivalError::invalid_parameter("rho", rho.to_string()));
    }
    Ok((lambda, rho))
}

/// time by which a fraction `p` has failed, `lambda * (-ln(1-p))^(1/rho)`, w/ its interval
pub fn weibull_quantile(
    params: ArrayView1<f64>,
    covariance: &Array2<f64>,
    p: f64,
    confidence_level: f64,
) -> Result<DeltaEstimate> {
    let (lambda, rho) = check_weibull(params)?;
    if !(p > 0.0 && p < 1.0) {
        return Err(SurvivalError::invalid_parameter("p", p.to_string()));
    }

    let k = -(1.0 - p).ln();
    let estimate = lambda * k.powf(1.0 / rho);
    let gradient = array![estimate / lambda, -estimate * k.ln() / (rho * rho)];

    delta_method_with_gradient(estimate, gradient.view(), covariance, confidence_level)
}

pub fn weibull_median(
    params: ArrayView1<f64>,
    covariance: &Array2<f64>,
    confidence_level: f64,
) -> Result<DeltaEstimate> {
    weibull_quantile(params, covariance, 0.5, confidence_level)
}

/// mean lifetime `lambda * gamma(1 + 1/rho)`
pub fn weibull_mean(
    params: ArrayView1<f64>,
    covariance: &Array2<f64>,
    confidence_level: f64,
) -> Result<DeltaEstimate> {
    let (lambda, rho) = check_weibull(params)?;

    let x = 1.0 + 1.0 / rho;
    let gamma = statrs::function::gamma::gamma(x);
    let estimate = lambda * gamma;
    // d gamma(x)/dx = gamma(x) * digamma(x)
    let d_rho = -lambda * gamma * statrs::function::gamma::digamma(x) / (rho * rho);
    let gradient = array![gamma, d_rho];

    delta_method_with_gradient(estimate, gradient.view(), covariance, confidence_level)
}

/// survival `exp(-(t/lambda)^rho)` at a single time
pub fn weibull_survival_at(
    params: ArrayView1<f64>,
    covariance: &Array2<f64>,
    t: f64,
    confidence_level: f64,
) -> Result<DeltaEstimate> {
    let (lambda, rho) = check_weibull(params)?;
    if !(t > 0.0 && t.is_finite()) {
        return Err(SurvivalError::invalid_parameter("t", t.to_string()));
    }

    let big_h = (t / lambda).powf(rho);
    let survival = (-big_h).exp();
    let gradient = array![
        survival * big_h * rho / lambda,
        -survival * big_h * (t / lambda).ln()
    ];

    let mut est = delta_method_with_gradient(survival, gradient.view(), covariance, confidence_level)?;
    est.lower = est.lower.max(0.0);
    est.upper = est.upper.min(1.0);
    Ok(est)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn covariance() -> Array2<f64> {
        array![[0.25, 0.01], [0.01, 0.04]]
    }

    #[test]
    fn test_z_critical() {
        assert_relative_eq!(z_critical(0.95).unwrap(), 1.959964, epsilon = 1e-5);
        assert_relative_eq!(z_critical(0.90).unwrap(), 1.644854, epsilon = 1e-5);
        assert!(z_critical(1.0).is_err());
        assert!(z_critical(0.0).is_err());
    }

    #[test]
    fn test_variance_of_linear_combination() {
        // var(aX + bY) = a^2 var X + 2ab cov + b^2 var Y
        let grad = array![2.0, -3.0];
        let expected = 4.0 * 0.25 - 2.0 * 6.0 * 0.01 + 9.0 * 0.04;
        let var = delta_method_variance(grad.view(), &covariance()).unwrap();
        assert_relative_eq!(var, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_variance_errors() {
        let grad = array![1.0, 2.0, 3.0];
        assert!(matches!(
            delta_method_variance(grad.view(), &covariance()),
            Err(SurvivalError::InvalidDimensions { .. })
        ));

        let indefinite = array![[1.0, 0.0], [0.0, -1.0]];
        assert!(matches!(
            delta_method_variance(array![0.0, 1.0].view(), &indefinite),
            Err(SurvivalError::NumericalError { .. })
        ));
    }

    #[test]
    fn test_numerical_gradient() {
        let params = array![1.5, 0.3];
        let grad = numerical_gradient(|p| p[0] * p[0] * p[1] + p[1].sin(), params.view()).unwrap();
        assert_relative_eq!(grad[0], 2.0 * 1.5 * 0.3, epsilon = 1e-7);
        assert_relative_eq!(grad[1], 1.5 * 1.5 + 0.3_f64.cos(), epsilon = 1e-7);
    }

    #[test]
    fn test_delta_method_interval_is_symmetric() {
        let params = array![4.0, 2.0];
        let est = delta_method(|p| p[0] / p[1], params.view(), &covariance(), 0.95).unwrap();

        assert_relative_eq!(est.estimate, 2.0, epsilon = 1e-12);
        assert_relative_eq!(est.estimate - est.lower, est.upper - est.estimate, epsilon = 1e-12);
        assert_relative_eq!(
            est.upper - est.lower,
            2.0 * 1.959964 * est.std_error,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_weibull_closed_form_gradients_match_numeric() {
        let params = array![7.0, 1.8];
        let cov = covariance();

        let median = weibull_median(params.view(), &cov, 0.95).unwrap();
        let numeric = delta_method(
            |p| p[0] * std::f64::consts::LN_2.powf(1.0 / p[1]),
            params.view(),
            &cov,
            0.95,
        )
        .unwrap();
        assert_relative_eq!(median.estimate, numeric.estimate, epsilon = 1e-12);
        assert_relative_eq!(median.std_error, numeric.std_error, max_relative = 1e-5);

        let mean = weibull_mean(params.view(), &cov, 0.95).unwrap();
        let numeric = delta_method(
            |p| p[0] * statrs::function::gamma::gamma(1.0 + 1.0 / p[1]),
            params.view(),
            &cov,
            0.95,
        )
        .unwrap();
        assert_relative_eq!(mean.std_error, numeric.std_error, max_relative = 1e-5);

        let surv = weibull_survival_at(params.view(), &cov, 5.0, 0.95).unwrap();
        let numeric = delta_method(
            |p| (-(5.0 / p[0]).powf(p[1])).exp(),
            params.view(),
            &cov,
            0.95,
        )
        .unwrap();
        assert_relative_eq!(surv.estimate, numeric.estimate, epsilon = 1e-12);
        assert_relative_eq!(surv.std_error, numeric.std_error, max_relative = 1e-5);
        assert!(surv.lower >= 0.0 && surv.upper <= 1.0);
    }

    #[test]
    fn test_weibull_input_checks() {
        let cov = covariance();
        assert!(weibull_median(array![-1.0, 1.0].view(), &cov, 0.95).is_err());
        assert!(weibull_median(array![1.0].view(), &cov, 0.95).is_err());
        assert!(weibull_quantile(array![1.0, 1.0].view(), &cov, 1.0, 0.95).is_err());
        assert!(weibull_survival_at(array![1.0, 1.0].view(), &cov, 0.0, 0.95).is_err());
    }

    #[test]
    fn test_numerical_gradient_small_params() {
        // hazard-sized params, e.g. a linear hazard on a minutes scale
        let params = array![5.69e-4, 3.75e-6];
        let t = 500.0;
        let h = params[0] + params[1] * t;
        let grad = numerical_gradient(|p| (p[0] + p[1] * t).ln(), params.view()).unwrap();
        assert_relative_eq!(grad[0], 1.0 / h, max_relative = 1e-6);
        assert_relative_eq!(grad[1], t / h, max_relative = 1e-6);
    }

    #[test]
    fn test_zero_param_uses_scale() {
        let params = array![2.0, 0.0];
        let grad = scaled_numerical_gradient(
            |p| p[0] * (1.0 + 1e4 * p[1]).ln(),
            params.view(),
            array![1.0, 1e-6].view(),
        )
        .unwrap();
        assert_relative_eq!(grad[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(grad[1], 2.0 * 1e4, max_relative = 1e-6);

        assert!(scaled_numerical_gradient(|p| p[1], params.view(), array![1.0, 0.0].view()).is_err());
        assert!(scaled_numerical_gradient(|p| p[1], params.view(), array![1.0].view()).is_err());
    }
}
