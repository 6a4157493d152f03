use parametric_hazards::{
    metrics::{kaplan_meier, nelson_aalen, step_value, ModelMetrics},
    simulate, CensoringScheme, ExponentialHazard, ParametricSurvivalModel, SimulationConfig,
    WeibullHazard,
};
use ndarray::Array1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Parametric Survival Models - Basic Usage Example");
    println!("================================================\n");

    // Weibull lifetimes (lambda = 10, rho = 1.5); study stops at t = 12
    let config = SimulationConfig::new(250, 10.0, 1.5)
        .with_censoring(CensoringScheme::FixedHorizon { horizon: 12.0 })
        .with_seed(1);
    let data = simulate(&config)?;

    println!("Dataset Information:");
    println!("  - Number of samples: {}", data.n_samples());
    println!("  - Number of events: {}", data.n_events());
    println!("  - Number of censored: {}", data.n_censored());
    println!();

    // Example 1: Weibull fit
    println!("Example 1: Weibull Model");
    println!("------------------------");

    let mut weibull = ParametricSurvivalModel::new(WeibullHazard)
        .with_max_iterations(1000)
        .with_tolerance(1e-8);
    weibull.fit(&data)?;

    weibull.summary()?.print();
    println!();

    // Example 2: Exponential fit, the rho = 1 special case
    println!("Example 2: Exponential Model");
    println!("----------------------------");

    let mut exponential = ParametricSurvivalModel::new(ExponentialHazard);
    exponential.fit(&data)?;

    exponential.summary()?.print();
    println!();

    // Example 3: which fits better?
    println!("Example 3: Model Comparison");
    println!("---------------------------");

    let weibull_metrics = ModelMetrics::compute(weibull.log_likelihood()?, 2, &data)?;
    let exponential_metrics = ModelMetrics::compute(exponential.log_likelihood()?, 1, &data)?;
    println!("weibull:");
    weibull_metrics.print();
    println!("\nexponential:");
    exponential_metrics.print();
    println!();

    // Example 4: fitted curves vs the nonparametric estimates
    println!("Example 4: Fitted vs Nonparametric");
    println!("----------------------------------");

    let km = kaplan_meier(&data);
    let na = nelson_aalen(&data);
    let times = Array1::linspace(1.0, 12.0, 12);
    let surv = weibull.predict_survival(times.view())?;
    let cum = weibull.predict_cumulative_hazard(times.view())?;

    println!("{:>6} {:>10} {:>10} {:>10} {:>10}", "t", "S weibull", "S km", "H weibull", "H na");
    for (j, &t) in times.iter().enumerate() {
        println!(
            "{:>6.1} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
            t,
            surv[j],
            step_value(&km, t, 1.0),
            cum[j],
            step_value(&na, t, 0.0)
        );
    }

    Ok(())
}
