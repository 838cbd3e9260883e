//! Seeded synthetic dataset for bootstrapping a demo model

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::{Dataset, DatasetOrigin};

/// Weights of the first features in the latent decision function
const LATENT_WEIGHTS: [f64; 3] = [1.0, 0.5, -0.2];

/// Synthetic data configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyntheticConfig {
    pub n_samples: usize,
    pub n_features: usize,
    /// Standard deviation of the label noise
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_samples: 200,
            n_features: 6,
            noise: 0.3,
            seed: 42,
        }
    }
}

/// Generate a binary classification dataset.
///
/// Features are standard normal; the label is
/// `x0 + 0.5*x1 - 0.2*x2 + N(0, noise) > 0`. The same config always yields
/// the same dataset.
pub fn generate(config: &SyntheticConfig) -> Dataset {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
    let (n, d) = (config.n_samples, config.n_features);

    let features = Array2::from_shape_simple_fn((n, d), || standard_normal(&mut rng));

    let labels: Array1<f64> = features
        .rows()
        .into_iter()
        .map(|row| {
            let latent: f64 = row.iter().zip(LATENT_WEIGHTS.iter()).map(|(x, w)| x * w).sum();
            let noisy = latent + config.noise * standard_normal(&mut rng);
            if noisy > 0.0 { 1.0 } else { 0.0 }
        })
        .collect();

    Dataset::new(features, labels).with_origin(DatasetOrigin::Synthetic { seed: config.seed })
}

/// Box-Muller transform over two uniform draws
fn standard_normal(rng: &mut Xoshiro256PlusPlus) -> f64 {
    // 1 - u keeps the log argument in (0, 1]
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
