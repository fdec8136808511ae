use env_logger::{Builder, Env};
use gpsurf_gp::{LaplaceRegressor, GPSURF_LOG};
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::Uniform;
use rand_xoshiro::Xoshiro256Plus;
use std::f64::consts::PI;

const NOISE: f64 = 1e-3;

/// Points close to the sphere of given squared radius along with the
/// implicit function value `|x|^2 - 1`
fn sphere_cloud(n: usize, radius2: f64, rng: &mut Xoshiro256Plus) -> (Array2<f64>, Array1<f64>) {
    let mut x = Array2::zeros((n, 3));
    for mut p in x.rows_mut() {
        let theta = rng.sample(Uniform::new(-PI, PI));
        let z: f64 = rng.sample(Uniform::new(-1., 1.));
        let r = (radius2 - z * z).sqrt();
        p[0] = theta.sin() * r + rng.sample(Uniform::new(-NOISE, NOISE));
        p[1] = theta.cos() * r + rng.sample(Uniform::new(-NOISE, NOISE));
        p[2] = z + rng.sample(Uniform::new(-NOISE, NOISE));
    }
    let y = x.map_axis(Axis(1), |p| p.dot(&p) - 1.);
    (x, y)
}

fn main() {
    let env = Env::new().filter_or(GPSURF_LOG, "debug");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    let mut rng = Xoshiro256Plus::seed_from_u64(42);

    // surface, exterior and centre points
    let (surface, ys) = sphere_cloud(1000, 1., &mut rng);
    let (exterior, ye) = sphere_cloud(50, 2., &mut rng);
    let mut gp = LaplaceRegressor::params()
        .noise(NOISE)
        .initial_capacity(1024)
        .build()
        .expect("GP engine");
    gp.add_observations(&surface, &ys).expect("surface points");
    gp.add_observations(&exterior, &ye).expect("exterior points");
    gp.add_observations(&Array2::zeros((1, 3)), &Array1::from_elem(1, -1.))
        .expect("centre point");
    println!("{gp}");

    let q = surface.row(0);
    let (qf, qvar) = gp.predict_valvar(&q).expect("prediction");
    println!("y = {} -> f = {qf} var = {qvar}", ys[0]);

    // new points near the surface are predicted then absorbed
    let (xnew, ynew) = sphere_cloud(100, 1., &mut rng);
    gp.refresh().expect("up to date model");
    let predictor = gp.predictor().expect("predictor");
    let fs = predictor.predict(&xnew).expect("means");
    let vs = predictor.predict_vars(&xnew).expect("variances");
    for ((y, f), v) in ynew.iter().zip(fs.iter()).zip(vs.iter()) {
        println!("y = {y} -> f = {f} var = {v}");
    }

    gp.add_observations(&xnew, &ynew).expect("new points");
    let (qf, qvar) = gp.predict_valvar(&xnew.row(0)).expect("prediction");
    println!("y = {} -> f = {qf} var = {qvar}", ynew[0]);
    println!(
        "{} samples, log likelihood = {}",
        gp.n_samples(),
        gp.log_likelihood().expect("log likelihood")
    );
}
