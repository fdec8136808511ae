use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gpsurf_gp::LaplaceRegressor;
use ndarray::{s, Array1, Array2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn training_data(n: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let xt = Array2::random_using((n, 3), Uniform::new(-1., 1.), &mut rng);
    let yt = xt.map_axis(Axis(1), |p| p.dot(&p) - 1.);
    (xt, yt)
}

fn criterion_gp(c: &mut Criterion) {
    let nts = [100, 300, 600];
    let n_new = 10;

    let mut group = c.benchmark_group("gp");
    group.sample_size(20);
    for nt in nts {
        let (xt, yt) = training_data(nt + n_new);
        let mut base = LaplaceRegressor::params()
            .noise(1e-3)
            .initial_capacity(nt + n_new)
            .build()
            .expect("GP engine");
        base.add_observations(&xt.slice(s![..nt, ..]), &yt.slice(s![..nt]))
            .expect("training points");

        group.bench_with_input(BenchmarkId::new("incremental", nt), &nt, |b, _| {
            b.iter(|| {
                let mut gp = base.clone();
                gp.add_observations(&xt.slice(s![nt.., ..]), &yt.slice(s![nt..]))
                    .expect("new points");
                std::hint::black_box(gp)
            })
        });
        group.bench_with_input(BenchmarkId::new("full", nt), &nt, |b, _| {
            b.iter(|| {
                let mut gp = base.clone();
                gp.clear();
                gp.add_observations(&xt, &yt).expect("all points");
                std::hint::black_box(gp)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_gp);
criterion_main!(benches);
