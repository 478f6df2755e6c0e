//! Shared traffic generators for the integration tests.

#![allow(dead_code)]

use ndarray::{concatenate, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

pub const WIDTH: usize = 10;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Rows drawn from N(0, 1) in every dimension.
pub fn normal_matrix(rows: usize, width: usize, rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_fn((rows, width), |_| rng.sample::<f64, _>(StandardNormal))
}

/// Normal rows shifted by U(5, 10) in every dimension.
pub fn shifted_matrix(rows: usize, width: usize, rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_fn((rows, width), |_| {
        rng.sample::<f64, _>(StandardNormal) + rng.gen_range(5.0..10.0)
    })
}

/// 950 normal and 50 shifted training rows.
pub fn training_set(seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = normal_matrix(950, WIDTH, &mut rng);
    let shifted = shifted_matrix(50, WIDTH, &mut rng);
    concatenate(Axis(0), &[normal.view(), shifted.view()]).unwrap()
}
