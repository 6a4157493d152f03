use ndarray::{Array1, Array2, ArrayView1};
use crate::{
    data::LifetimeData,
    error::{Result, SurvivalError},
    hazard::{HazardModel, ParamKind},
};

const RELATIVE_STEP: f64 = 1e-5;

/// log-likelihood plus first & second derivatives at one parameter point
#[derive(Debug, Clone)]
pub struct LikelihoodDerivatives {
    pub log_likelihood: f64,
    pub gradient: Array1<f64>,
    pub hessian: Array2<f64>,
}

/// censored log-likelihood: sum of ln h at events minus H at every duration
///
/// an event where the hazard is <= 0 gives -inf, not an error
pub fn log_likelihood<M: HazardModel + ?Sized>(
    model: &M,
    params: ArrayView1<f64>,
    data: &LifetimeData,
) -> Result<f64> {
    model.validate_params(params)?;

    let mut loglik = 0.0;
    for (t, observed) in data.iter() {
        if observed {
            let log_h = model.log_hazard(params, t);
            if log_h == f64::NEG_INFINITY {
                return Ok(f64::NEG_INFINITY);
            }
            loglik += log_h;
        }
        loglik -= model.cumulative_hazard(params, t);
    }

    Ok(loglik)
}

/// what the optimizer minimizes
pub fn negative_log_likelihood<M: HazardModel + ?Sized>(
    model: &M,
    params: ArrayView1<f64>,
    data: &LifetimeData,
) -> Result<f64> {
    Ok(-log_likelihood(model, params, data)?)
}

/// score (d loglik / d params), natural scale
pub fn score<M: HazardModel + ?Sized>(
    model: &M,
    params: ArrayView1<f64>,
    data: &LifetimeData,
) -> Result<Array1<f64>> {
    model.validate_params(params)?;

    let mut gradient = Array1::<f64>::zeros(model.n_params());
    for (t, observed) in data.iter() {
        if observed {
            let h = model.hazard(params, t);
            if !(h > 0.0 && h.is_finite()) {
                return Err(SurvivalError::numerical_error(format!(
                    "hazard is {} at observed time {} - score undefined",
                    h, t
                )));
            }
            gradient.scaled_add(1.0 / h, &model.hazard_gradient(params, t));
        }
        gradient -= &model.cumulative_hazard_gradient(params, t);
    }

    Ok(gradient)
}

/// second derivatives on the natural scale - central differences of the score, symmetrized
pub fn hessian<M: HazardModel + ?Sized>(
    model: &M,
    params: ArrayView1<f64>,
    data: &LifetimeData,
) -> Result<Array2<f64>> {
    model.validate_params(params)?;

    let n = model.n_params();
    let mut hessian = Array2::<f64>::zeros((n, n));

    let steps = difference_steps(model, params, data);
    for (j, &step) in steps.iter().enumerate() {

        let mut up = params.to_owned();
        let mut down = params.to_owned();
        up[j] += step;
        down[j] -= step;

        let score_up = score(model, up.view(), data)?;
        let score_down = score(model, down.view(), data)?;
        let column = (&score_up - &score_down) / (2.0 * step);
        hessian.column_mut(j).assign(&column);
    }

    let symmetric = (&hessian + &hessian.t()) / 2.0;
    if symmetric.iter().any(|v| !v.is_finite()) {
        return Err(SurvivalError::numerical_error("non-finite entry in hessian"));
    }

    Ok(symmetric)
}

/// `-hessian`; its inverse is the asymptotic covariance of the MLE
pub fn observed_information<M: HazardModel + ?Sized>(
    model: &M,
    params: ArrayView1<f64>,
    data: &LifetimeData,
) -> Result<Array2<f64>> {
    Ok(-hessian(model, params, data)?)
}

pub fn likelihood_derivatives<M: HazardModel + ?Sized>(
    model: &M,
    params: ArrayView1<f64>,
    data: &LifetimeData,
) -> Result<LikelihoodDerivatives> {
    Ok(LikelihoodDerivatives {
        log_likelihood: log_likelihood(model, params, data)?,
        gradient: score(model, params, data)?,
        hessian: hessian(model, params, data)?,
    })
}

/// per-param difference step, relative to the param and small enough that no
/// observed hazard moves by more than 1e-5 of itself
fn difference_steps<M: HazardModel + ?Sized>(
    model: &M,
    params: ArrayView1<f64>,
    data: &LifetimeData,
) -> Array1<f64> {
    // largest shift in each param before some event's hazard changes by 100%
    let mut reach = Array1::from_elem(params.len(), f64::INFINITY);
    for (t, observed) in data.iter() {
        if !observed {
            continue;
        }
        let h = model.hazard(params, t);
        if !(h > 0.0 && h.is_finite()) {
            continue;
        }
        for (r, g) in reach.iter_mut().zip(model.hazard_gradient(params, t).iter()) {
            if *g != 0.0 {
                *r = r.min(h / g.abs());
            }
        }
    }

    params
        .iter()
        .zip(model.param_kinds())
        .zip(reach.iter())
        .map(|((&value, kind), &reach)| {
            let base = match kind {
                ParamKind::Positive => value,
                ParamKind::Real if value != 0.0 => value.abs().min(reach),
                ParamKind::Real => reach,
            };
            if base > 0.0 && base.is_finite() {
                RELATIVE_STEP * base
            } else {
                RELATIVE_STEP * value.abs().max(f64::EPSILON)
            }
        })
        .collect()
}

/// natural -> unconstrained (log for positive params)
pub fn to_unconstrained(kinds: &[ParamKind], params: ArrayView1<f64>) -> Result<Array1<f64>> {
    check_kinds(kinds, params)?;

    let mut phi = Array1::<f64>::zeros(params.len());
    for (j, kind) in kinds.iter().enumerate() {
        phi[j] = match kind {
            ParamKind::Positive => {
                if params[j] <= 0.0 {
                    return Err(SurvivalError::invalid_parameter(
                        format!("param[{}]", j),
                        params[j].to_string(),
                    ));
                }
                params[j].ln()
            }
            ParamKind::Real => params[j],
        };
    }

    Ok(phi)
}

/// unconstrained -> natural
pub fn from_unconstrained(kinds: &[ParamKind], phi: ArrayView1<f64>) -> Result<Array1<f64>> {
    check_kinds(kinds, phi)?;

    Ok(kinds
        .iter()
        .zip(phi.iter())
        .map(|(kind, &v)| match kind {
            ParamKind::Positive => v.exp(),
            ParamKind::Real => v,
        })
        .collect())
}

/// diagonal of d(natural)/d(unconstrained), given the natural params
pub fn unconstrained_jacobian(kinds: &[ParamKind], params: ArrayView1<f64>) -> Result<Array1<f64>> {
    check_kinds(kinds, params)?;

    Ok(kinds
        .iter()
        .zip(params.iter())
        .map(|(kind, &theta)| match kind {
            ParamKind::Positive => theta, // d exp(phi)/dphi = exp(phi)
            ParamKind::Real => 1.0,
        })
        .collect())
}

/// hessian on the unconstrained scale from natural-scale derivatives:
/// `J H J` plus `g * theta` on the diagonal of log-scale params
pub fn unconstrained_hessian(
    kinds: &[ParamKind],
    params: ArrayView1<f64>,
    gradient: ArrayView1<f64>,
    hessian: &Array2<f64>,
) -> Result<Array2<f64>> {
    let jac = unconstrained_jacobian(kinds, params)?;
    let n = jac.len();

    if gradient.len() != n || hessian.dim() != (n, n) {
        return Err(SurvivalError::invalid_dimensions(
            "gradient/hessian don't match param count",
        ));
    }

    let mut out = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        for k in 0..n {
            out[[j, k]] = jac[j] * hessian[[j, k]] * jac[k];
        }
        if kinds[j] == ParamKind::Positive {
            out[[j, j]] += gradient[j] * params[j];
        }
    }

    Ok(out)
}

fn check_kinds(kinds: &[ParamKind], values: ArrayView1<f64>) -> Result<()> {
    if kinds.len() != values.len() {
        return Err(SurvivalError::invalid_dimensions(format!(
            "{} param kinds but {} values",
            kinds.len(),
            values.len()
        )));
    }
    Ok(())
}
