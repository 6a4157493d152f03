use parametric_hazards::{
    hazard::check_hazard_identity, likelihood::log_likelihood, HazardModel, LifetimeData,
    LinearHazard, ParametricSurvivalModel, WeibullHazard,
};
use ndarray::array;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Hazard Models - dH/dt = h and the log(h <= 0) pitfall");
    println!("=====================================================\n");

    let times = [0.5, 1.0, 2.0, 4.0, 8.0];
    let weibull_err = check_hazard_identity(&WeibullHazard, array![3.0, 1.7].view(), &times, 1e-5)?;
    let linear_err = check_hazard_identity(&LinearHazard, array![0.2, 0.1].view(), &times, 1e-5)?;
    println!("max |dH/dt - h|  weibull: {:.2e}  linear: {:.2e}\n", weibull_err, linear_err);

    let data = LifetimeData::new(
        vec![0.6, 1.1, 1.9, 2.4, 3.2, 3.9, 4.4, 5.0],
        vec![true, true, true, false, true, true, false, true],
    )?;

    // a falling linear hazard crosses zero at t = 4, before the event at t = 5
    let params = array![0.8, -0.2];
    for &t in &[1.0, 3.0, 4.0, 5.0] {
        println!(
            "h({}) = {:>6.3}   ln h = {}",
            t,
            LinearHazard.hazard(params.view(), t),
            LinearHazard.log_hazard(params.view(), t)
        );
    }
    let ll = log_likelihood(&LinearHazard, params.view(), &data)?;
    println!("log-likelihood at (alpha=0.8, beta=-0.2): {}\n", ll);

    // starting there is refused
    let mut bad = ParametricSurvivalModel::new(LinearHazard).with_initial_params(vec![0.8, -0.2]);
    match bad.fit(&data) {
        Ok(_) => println!("unexpectedly fit from an infeasible start"),
        Err(e) => println!("fit from infeasible start: {}", e),
    }

    // from a feasible start the optimizer keeps h > 0 at every event
    let mut good = ParametricSurvivalModel::new(LinearHazard);
    good.fit(&data)?;
    good.summary()?.print();

    Ok(())
}
