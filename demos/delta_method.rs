use parametric_hazards::{
    delta::{weibull_mean, weibull_median, weibull_quantile},
    likelihood::observed_information,
    simulate, CensoringScheme, ParametricSurvivalModel, SimulationConfig, WeibullHazard,
};
use ndarray::Array1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Delta Method - Uncertainty of Derived Quantities");
    println!("================================================\n");

    let config = SimulationConfig::new(120, 5.0, 2.0)
        .with_censoring(CensoringScheme::Uniform { low: 2.0, high: 10.0 })
        .with_seed(2);
    let data = simulate(&config)?;

    let mut model = ParametricSurvivalModel::new(WeibullHazard);
    model.fit(&data)?;
    model.summary()?.print();
    println!();

    // covariance = inverse of the observed information at the MLE
    let info = observed_information(&WeibullHazard, model.params()?, &data)?;
    println!("observed information:\n{:.4}", info);
    println!("covariance:\n{:.6}\n", model.covariance()?);

    let params = model.params()?;
    let cov = model.covariance()?;
    let level = model.confidence_level();

    let median = weibull_median(params, cov, level)?;
    let b10 = weibull_quantile(params, cov, 0.10, level)?;
    let mean = weibull_mean(params, cov, level)?;

    println!("{:<22} {:>10} {:>10} {:>22}", "quantity", "estimate", "std err", "95% CI");
    println!("{:-<67}", "");
    for (name, est) in [("median lifetime", median), ("B10 life", b10), ("mean lifetime", mean)] {
        println!(
            "{:<22} {:>10.4} {:>10.4}   [{:>8.4}, {:>8.4}]",
            name, est.estimate, est.std_error, est.lower, est.upper
        );
    }

    // any other smooth function of (lambda, rho) goes through the numeric gradient
    let hazard_at_5 = model.delta(|p| p[1] / p[0] * (5.0 / p[0]).powf(p[1] - 1.0))?;
    println!(
        "{:<22} {:>10.4} {:>10.4}   [{:>8.4}, {:>8.4}]",
        "hazard at t=5", hazard_at_5.estimate, hazard_at_5.std_error, hazard_at_5.lower, hazard_at_5.upper
    );
    println!();

    println!("Survival band (delta method on ln H)");
    let times = Array1::linspace(1.0, 10.0, 10);
    for (t, s) in times.iter().zip(model.survival_band(times.view())?) {
        println!("  t={:>5.1}  S={:.4}  [{:.4}, {:.4}]", t, s.estimate, s.lower, s.upper);
    }

    Ok(())
}
