use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use crate::{
    data::LifetimeData,
    error::{Result, SurvivalError},
};

/// how lifetimes get right-censored
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CensoringScheme {
    /// everyone observed to failure
    #[default]
    None,
    /// study ends at `horizon`; anyone still alive is censored there
    FixedHorizon { horizon: f64 },
    /// independent censoring time ~ U(low, high)
    Uniform { low: f64, high: f64 },
    /// independent censoring time ~ Exp(rate)
    Exponential { rate: f64 },
}

/// knobs for generating synthetic weibull lifetimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub n_samples: usize,
    pub scale: f64, // lambda
    pub shape: f64, // rho
    pub censoring: CensoringScheme,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_samples: 100,
            scale: 10.0,
            shape: 1.5,
            censoring: CensoringScheme::None,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    pub fn new(n_samples: usize, scale: f64, shape: f64) -> Self {
        Self {
            n_samples,
            scale,
            shape,
            ..Default::default()
        }
    }

    pub fn with_censoring(mut self, censoring: CensoringScheme) -> Self {
        self.censoring = censoring;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// parse from toml; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_samples == 0 {
            return Err(SurvivalError::invalid_config("n_samples must be > 0"));
        }
        if !(self.scale > 0.0 && self.scale.is_finite()) {
            return Err(SurvivalError::invalid_config(format!(
                "scale must be positive & finite, got {}",
                self.scale
            )));
        }
        if !(self.shape > 0.0 && self.shape.is_finite()) {
            return Err(SurvivalError::invalid_config(format!(
                "shape must be positive & finite, got {}",
                self.shape
            )));
        }

        match self.censoring {
            CensoringScheme::None => {}
            CensoringScheme::FixedHorizon { horizon } => {
                if !(horizon > 0.0 && horizon.is_finite()) {
                    return Err(SurvivalError::invalid_config(format!(
                        "censoring horizon must be positive, got {}",
                        horizon
                    )));
                }
            }
            CensoringScheme::Uniform { low, high } => {
                if !(low >= 0.0 && high > low && high.is_finite()) {
                    return Err(SurvivalError::invalid_config(format!(
                        "uniform censoring needs 0 <= low < high, got [{}, {}]",
                        low, high
                    )));
                }
            }
            CensoringScheme::Exponential { rate } => {
                if !(rate > 0.0 && rate.is_finite()) {
                    return Err(SurvivalError::invalid_config(format!(
                        "censoring rate must be positive, got {}",
                        rate
                    )));
                }
            }
        }

        Ok(())
    }
}

/// one weibull lifetime by inverting S(t) = exp(-(t/lambda)^rho)
pub fn sample_weibull<R: Rng + ?Sized>(rng: &mut R, scale: f64, shape: f64) -> f64 {
    let u = 1.0 - rng.gen::<f64>(); // (0, 1], keeps ln finite
    scale * (-u.ln()).powf(1.0 / shape)
}

/// generate a censored weibull sample, seeded from the config
pub fn simulate(config: &SimulationConfig) -> Result<LifetimeData> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    simulate_with_rng(config, &mut rng)
}

/// same as [`simulate`] but drawing from a caller-owned rng (ignores `config.seed`)
pub fn simulate_with_rng<R: Rng + ?Sized>(
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<LifetimeData> {
    config.validate()?;

    let exp_censoring = match config.censoring {
        CensoringScheme::Exponential { rate } => Some(
            Exp::new(rate).map_err(|e| SurvivalError::invalid_config(e.to_string()))?,
        ),
        _ => None,
    };

    let mut durations = Vec::with_capacity(config.n_samples);
    let mut observed = Vec::with_capacity(config.n_samples);

    for _ in 0..config.n_samples {
        let lifetime = sample_weibull(rng, config.scale, config.shape);

        let censor_time = match config.censoring {
            CensoringScheme::None => f64::INFINITY,
            CensoringScheme::FixedHorizon { horizon } => horizon,
            CensoringScheme::Uniform { low, high } => rng.gen_range(low..high),
            CensoringScheme::Exponential { .. } => match &exp_censoring {
                Some(dist) => dist.sample(rng),
                None => f64::INFINITY,
            },
        };

        if lifetime <= censor_time {
            durations.push(lifetime);
            observed.push(true);
        } else {
            durations.push(censor_time);
            observed.push(false);
        }
    }

    // a zero censoring draw can't be a valid duration
    for d in durations.iter_mut() {
        if *d <= 0.0 {
            *d = f64::MIN_POSITIVE;
        }
    }

    let data = LifetimeData::new(durations, observed)?;
    log::debug!(
        "simulated {} weibull lifetimes (scale={}, shape={}): {} events, {} censored",
        data.n_samples(),
        config.scale,
        config.shape,
        data.n_events(),
        data.n_censored()
    );

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_same_seed_same_data() {
        let config = SimulationConfig::new(50, 5.0, 2.0).with_seed(7);
        let a = simulate(&config).unwrap();
        let b = simulate(&config).unwrap();
        assert_eq!(a.durations(), b.durations());
        assert_eq!(a.observed(), b.observed());

        let c = simulate(&config.clone().with_seed(8)).unwrap();
        assert_ne!(a.durations(), c.durations());
    }

    #[test]
    fn test_uncensored_by_default() {
        let data = simulate(&SimulationConfig::default()).unwrap();
        assert_eq!(data.n_samples(), 100);
        assert_eq!(data.n_censored(), 0);
    }

    #[test]
    fn test_fixed_horizon_censoring() {
        let config = SimulationConfig::new(500, 10.0, 1.5)
            .with_censoring(CensoringScheme::FixedHorizon { horizon: 8.0 });
        let data = simulate(&config).unwrap();

        assert!(data.n_censored() > 0);
        for (t, observed) in data.iter() {
            assert!(t <= 8.0);
            if !observed {
                assert_eq!(t, 8.0);
            }
        }

        // S(8) = exp(-(0.8)^1.5) ~ 0.489
        let censored_fraction = data.n_censored() as f64 / data.n_samples() as f64;
        assert!((censored_fraction - 0.489).abs() < 0.08, "censored {}", censored_fraction);
    }

    #[test]
    fn test_random_censoring() {
        let uniform = SimulationConfig::new(300, 10.0, 1.5)
            .with_censoring(CensoringScheme::Uniform { low: 1.0, high: 15.0 });
        let data = simulate(&uniform).unwrap();
        assert!(data.n_censored() > 0 && data.n_events() > 0);

        let exponential = SimulationConfig::new(300, 10.0, 1.5)
            .with_censoring(CensoringScheme::Exponential { rate: 0.1 });
        let data = simulate(&exponential).unwrap();
        assert!(data.n_censored() > 0 && data.n_events() > 0);
    }

    #[test]
    fn test_sample_weibull_median() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut draws: Vec<f64> = (0..20_000).map(|_| sample_weibull(&mut rng, 10.0, 2.0)).collect();
        draws.sort_by(f64::total_cmp);

        let sample_median = draws[draws.len() / 2];
        let true_median = 10.0 * std::f64::consts::LN_2.sqrt();
        assert_relative_eq!(sample_median, true_median, max_relative = 0.03);
        assert!(draws.iter().all(|&t| t >= 0.0 && t.is_finite()));
    }

    #[test]
    fn test_validate() {
        assert!(SimulationConfig::new(0, 1.0, 1.0).validate().is_err());
        assert!(SimulationConfig::new(10, -1.0, 1.0).validate().is_err());
        assert!(SimulationConfig::new(10, 1.0, f64::NAN).validate().is_err());
        assert!(SimulationConfig::default()
            .with_censoring(CensoringScheme::Uniform { low: 5.0, high: 2.0 })
            .validate()
            .is_err());
        assert!(SimulationConfig::default()
            .with_censoring(CensoringScheme::Exponential { rate: 0.0 })
            .validate()
            .is_err());
        assert!(SimulationConfig::default()
            .with_censoring(CensoringScheme::FixedHorizon { horizon: -3.0 })
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = SimulationConfig::from_toml_str(
            r#"
            n_samples = 250
            shape = 0.8

            [censoring]
            kind = "fixed_horizon"
            horizon = 12.0
            "#,
        )
        .unwrap();

        assert_eq!(config.n_samples, 250);
        assert_eq!(config.shape, 0.8);
        assert_eq!(config.scale, 10.0); // default kept
        assert_eq!(config.censoring, CensoringScheme::FixedHorizon { horizon: 12.0 });

        assert!(matches!(
            SimulationConfig::from_toml_str("n_samples = 0"),
            Err(SurvivalError::InvalidConfig { .. })
        ));
        assert!(SimulationConfig::from_toml_str("n_samples = \"lots\"").is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = SimulationConfig::default()
            .with_censoring(CensoringScheme::Exponential { rate: 0.05 });
        let json = serde_json::to_string(&config).unwrap();
        let back: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
