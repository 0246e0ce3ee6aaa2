//! CPU load generators.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Estimate pi by Monte-Carlo sampling; only meant to keep a core busy.
///
/// With a seed the result is reproducible on any thread or process. Zero
/// iterations yield `0.0`.
pub fn pi_for_cpu_load(numiter: u64, seed: Option<u64>) -> f64 {
    if numiter == 0 {
        return 0.0;
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut n_in: u64 = 0;
    for _ in 0..numiter {
        let x: f64 = rng.gen();
        let y: f64 = rng.gen();
        if x * x + y * y < 1.0 {
            n_in += 1;
        }
    }
    4.0 * n_in as f64 / numiter as f64
}
