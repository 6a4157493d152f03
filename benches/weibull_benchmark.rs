use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use parametric_hazards::{
    likelihood::{hessian, log_likelihood, score},
    metrics::kaplan_meier,
    simulate, CensoringScheme, LifetimeData, OptimizerType, ParametricSurvivalModel,
    SimulationConfig, WeibullHazard,
};
use ndarray::array;

fn generate_synthetic_data(n_samples: usize) -> LifetimeData {
    let config = SimulationConfig::new(n_samples, 10.0, 1.5)
        .with_censoring(CensoringScheme::Uniform { low: 5.0, high: 25.0 })
        .with_seed(42);
    simulate(&config).unwrap()
}

fn benchmark_weibull_fitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("weibull_fitting");

    for &n_samples in [100, 1000, 10_000].iter() {
        for optimizer in [OptimizerType::Bfgs, OptimizerType::NewtonRaphson] {
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("{:?}_{}", optimizer, n_samples)),
                &n_samples,
                |b, &n_samples| {
                    let data = generate_synthetic_data(n_samples);
                    b.iter(|| {
                        let mut model = ParametricSurvivalModel::new(WeibullHazard)
                            .with_optimizer(optimizer);
                        model.fit(black_box(&data)).unwrap();
                    });
                },
            );
        }
    }
    group.finish();
}

fn benchmark_likelihood(c: &mut Criterion) {
    let mut group = c.benchmark_group("likelihood");

    let data = generate_synthetic_data(5000);
    let params = array![10.0, 1.5];

    group.bench_function("log_likelihood", |b| {
        b.iter(|| log_likelihood(&WeibullHazard, black_box(params.view()), &data).unwrap());
    });

    group.bench_function("score", |b| {
        b.iter(|| score(&WeibullHazard, black_box(params.view()), &data).unwrap());
    });

    group.bench_function("hessian", |b| {
        b.iter(|| hessian(&WeibullHazard, black_box(params.view()), &data).unwrap());
    });

    group.finish();
}

fn benchmark_delta_bands(c: &mut Criterion) {
    let data = generate_synthetic_data(1000);
    let mut model = ParametricSurvivalModel::new(WeibullHazard);
    model.fit(&data).unwrap();

    let times = ndarray::Array1::linspace(0.5, 30.0, 200);
    c.bench_function("survival_band_200", |b| {
        b.iter(|| model.survival_band(black_box(times.view())).unwrap());
    });

    c.bench_function("kaplan_meier_1000", |b| {
        b.iter(|| kaplan_meier(black_box(&data)));
    });
}

criterion_group!(
    benches,
    benchmark_weibull_fitting,
    benchmark_likelihood,
    benchmark_delta_bands
);
criterion_main!(benches);
