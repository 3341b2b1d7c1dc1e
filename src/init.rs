use ndarray::{Array1, Array4};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use crate::config::LayerConfig;

/// Bound of the fan-scaled uniform distribution the weights are drawn from:
/// `sqrt(6 / (fan_in + fan_out))` with `fan_in = C * kh * kw` and
/// `fan_out = K * kh * kw / (ph * pw)` (pooling shrinks the effective
/// fan-out).
pub(crate) fn uniform_bound(config: &LayerConfig) -> f64 {
    let (kh, kw) = config.kernel_size;
    let (ph, pw) = config.pool_size;
    let fan_in = (config.channels * kh * kw) as f64;
    let fan_out = (config.kernel_count * kh * kw) as f64 / (ph * pw) as f64;
    (6.0 / (fan_in + fan_out)).sqrt()
}

/// Draws the initial weight tensor from the injected random source and
/// zero-fills the bias vector. Deterministic for a given source state.
pub(crate) fn init_params<R: Rng + ?Sized>(
    config: &LayerConfig,
    rng: &mut R,
) -> (Array4<f64>, Array1<f64>) {
    let (kh, kw) = config.kernel_size;
    let bound = uniform_bound(config);
    let dist = Uniform::new(-bound, bound);
    let weights = Array4::from_shape_fn(
        (config.kernel_count, config.channels, kh, kw),
        |_| dist.sample(rng),
    );
    let bias = Array1::zeros(config.kernel_count);
    (weights, bias)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn config() -> LayerConfig {
        LayerConfig {
            image_size: (5, 5),
            channels: 3,
            kernel_count: 4,
            kernel_size: (2, 2),
            pool_size: (2, 2),
            seed: 1234,
            activation: String::from("relu"),
            tie_break: String::from("first_max"),
        }
    }

    #[test]
    fn test_bound_uses_both_fans() {
        let config = config();
        // fan_in = 3 * 4 = 12, fan_out = 4 * 4 / 4 = 4
        let expected = (6.0f64 / 16.0).sqrt();
        assert!((uniform_bound(&config) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_init_is_deterministic_for_equal_seeds() {
        let config = config();
        let (w1, b1) = init_params(&config, &mut StdRng::seed_from_u64(1234));
        let (w2, b2) = init_params(&config, &mut StdRng::seed_from_u64(1234));
        assert_eq!(w1, w2);
        assert_eq!(b1, b2);
    }

    #[test]
    fn test_init_respects_bound_and_zero_bias() {
        let config = config();
        let bound = uniform_bound(&config);
        let (w, b) = init_params(&config, &mut StdRng::seed_from_u64(42));
        assert_eq!(w.dim(), (4, 3, 2, 2));
        assert!(w.iter().all(|v| v.abs() < bound));
        assert!(b.iter().all(|v| *v == 0.0));
    }
}
