use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use crate::{
    data::LifetimeData,
    error::{Result, SurvivalError},
};

/// one step of a nonparametric curve, at an event time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurvivalStep {
    pub time: f64,
    pub at_risk: usize,
    pub events: usize,
    pub estimate: f64, // S(t) for kaplan-meier, H(t) for nelson-aalen
}

/// kaplan-meier product-limit estimate of S(t), one step per unique event time
pub fn kaplan_meier(data: &LifetimeData) -> Vec<SurvivalStep> {
    let mut survival_prob = 1.0;

    data.event_times()
        .into_iter()
        .map(|time| {
            let at_risk = data.at_risk(time);
            let events = data.events_at(time);
            if at_risk > 0 {
                survival_prob *= 1.0 - events as f64 / at_risk as f64;
            }
            SurvivalStep { time, at_risk, events, estimate: survival_prob }
        })
        .collect()
}

/// nelson-aalen estimate of the cumulative hazard H(t)
pub fn nelson_aalen(data: &LifetimeData) -> Vec<SurvivalStep> {
    let mut cumulative = 0.0;

    data.event_times()
        .into_iter()
        .map(|time| {
            let at_risk = data.at_risk(time);
            let events = data.events_at(time);
            if at_risk > 0 {
                cumulative += events as f64 / at_risk as f64;
            }
            SurvivalStep { time, at_risk, events, estimate: cumulative }
        })
        .collect()
}

/// read a step curve at `t` (right-continuous; `before_first` ahead of the first step)
pub fn step_value(steps: &[SurvivalStep], t: f64, before_first: f64) -> f64 {
    steps
        .iter()
        .take_while(|s| s.time <= t)
        .last()
        .map_or(before_first, |s| s.estimate)
}

/// Brier score of one predicted survival curve, averaged over `evaluation_times`.
///
/// Anyone censored before an evaluation time has unknown status there and is left
/// out of that time's average.
pub fn integrated_brier_score(
    survival_probs: ArrayView1<f64>, // predicted S(t) at each evaluation time
    evaluation_times: ArrayView1<f64>,
    data: &LifetimeData,
) -> Result<f64> {
    if survival_probs.len() != evaluation_times.len() {
        return Err(SurvivalError::invalid_dimensions(format!(
            "{} survival probabilities for {} evaluation times",
            survival_probs.len(),
            evaluation_times.len()
        )));
    }
    if evaluation_times.is_empty() {
        return Err(SurvivalError::invalid_dimensions("no evaluation times"));
    }

    let mut total_brier = 0.0;
    let mut n_scored = 0;

    for (&predicted_surv, &eval_time) in survival_probs.iter().zip(evaluation_times.iter()) {
        let mut brier_at_time = 0.0;
        let mut known = 0;

        for (t, observed) in data.iter() {
            let actual_surv = if t > eval_time {
                1.0
            } else if observed {
                0.0
            } else {
                continue; // censored before eval_time
            };

            brier_at_time += (predicted_surv - actual_surv).powi(2);
            known += 1;
        }

        if known > 0 {
            total_brier += brier_at_time / known as f64;
            n_scored += 1;
        }
    }

    if n_scored == 0 {
        return Err(SurvivalError::numerical_error(
            "every observation is censored before every evaluation time",
        ));
    }

    Ok(total_brier / n_scored as f64)
}

/// AIC (Akaike Information Criterion)
pub fn aic(log_likelihood: f64, n_parameters: usize) -> f64 {
    2.0 * n_parameters as f64 - 2.0 * log_likelihood
}

/// BIC (Bayesian Information Criterion)
pub fn bic(log_likelihood: f64, n_parameters: usize, n_samples: usize) -> f64 {
    (n_parameters as f64) * (n_samples as f64).ln() - 2.0 * log_likelihood
}

/// likelihood-based fit metrics, handy for comparing hazard models on the same data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub n_parameters: usize,
}

impl ModelMetrics {
    pub fn compute(log_likelihood: f64, n_parameters: usize, data: &LifetimeData) -> Result<Self> {
        if !log_likelihood.is_finite() {
            return Err(SurvivalError::numerical_error(format!(
                "log-likelihood is {}",
                log_likelihood
            )));
        }

        Ok(Self {
            log_likelihood,
            aic: aic(log_likelihood, n_parameters),
            bic: bic(log_likelihood, n_parameters, data.n_samples()),
            n_parameters,
        })
    }

    /// Print metrics summary
    pub fn print(&self) {
        println!("Model Evaluation Metrics");
        println!("========================");
        println!("Log-likelihood:      {:.6}", self.log_likelihood);
        println!("Parameters:          {}", self.n_parameters);
        println!("AIC:                 {:.6}", self.aic);
        println!("BIC:                 {:.6}", self.bic);
    }
}
