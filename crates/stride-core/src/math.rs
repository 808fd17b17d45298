//! Reward randomization math.
//!
//! Payout amounts carry controlled variance generated from a skew-normal
//! distribution. The variate source is a trait seam so the transform is
//! deterministic under test: production uses Box–Muller over a seedable RNG,
//! tests inject fixed variate pairs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A source of independent unit-normal variate pairs.
pub trait NormalSource {
    /// Returns the next `(u0, v)` pair of independent standard normals.
    fn next_pair(&mut self) -> (f64, f64);
}

/// Box–Muller transform over a uniform RNG.
#[derive(Debug)]
pub struct BoxMullerSource<R: Rng> {
    rng: R,
}

impl BoxMullerSource<StdRng> {
    /// Creates a source seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a deterministic source from a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> BoxMullerSource<R> {
    /// Wraps an existing RNG.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> NormalSource for BoxMullerSource<R> {
    fn next_pair(&mut self) -> (f64, f64) {
        // Sample uniforms in (0, 1]; ln(0) must be unreachable.
        let a: f64 = 1.0 - self.rng.gen::<f64>();
        let b: f64 = self.rng.gen::<f64>();

        let radius = (-2.0 * a.ln()).sqrt();
        let angle = 2.0 * std::f64::consts::PI * b;
        (radius * angle.cos(), radius * angle.sin())
    }
}

/// A source that replays fixed variate pairs, for deterministic tests.
#[derive(Debug, Default)]
pub struct FixedSource {
    pairs: Vec<(f64, f64)>,
    cursor: usize,
}

impl FixedSource {
    /// Creates a source that cycles through the given pairs.
    #[must_use]
    pub fn new(pairs: Vec<(f64, f64)>) -> Self {
        Self { pairs, cursor: 0 }
    }
}

impl NormalSource for FixedSource {
    fn next_pair(&mut self) -> (f64, f64) {
        if self.pairs.is_empty() {
            return (0.0, 0.0);
        }
        let pair = self.pairs[self.cursor % self.pairs.len()];
        self.cursor += 1;
        pair
    }
}

/// Draws one skew-normal variate.
///
/// With `skewness == 0` the result is `mean + deviation * u0`. Otherwise the
/// Azzalini construction applies: `coeff = skewness / sqrt(1 + skewness²)`,
/// `u1 = coeff * u0 + sqrt(1 - coeff²) * v`, and the sign of `u0` selects the
/// half-plane: `z = if u0 >= 0 { u1 } else { -u1 }`.
pub fn skew_normal(
    source: &mut dyn NormalSource,
    mean: f64,
    deviation: f64,
    skewness: f64,
) -> f64 {
    let (u0, v) = source.next_pair();

    if skewness == 0.0 {
        return mean + deviation * u0;
    }

    let coeff = skewness / (1.0 + skewness * skewness).sqrt();
    let u1 = coeff * u0 + (1.0 - coeff * coeff).sqrt() * v;
    let z = if u0 >= 0.0 { u1 } else { -u1 };
    mean + deviation * z
}

/// Stochastic reward amount generator.
///
/// Wraps a [`NormalSource`] with the payout-facing interface: a mean amount,
/// a deviation, and an optional skew applied per draw.
pub struct RewardRandomizer {
    source: Box<dyn NormalSource + Send>,
}

impl RewardRandomizer {
    /// Creates a randomizer over OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            source: Box::new(BoxMullerSource::from_entropy()),
        }
    }

    /// Creates a deterministic randomizer from a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            source: Box::new(BoxMullerSource::seeded(seed)),
        }
    }

    /// Creates a randomizer over an arbitrary variate source.
    #[must_use]
    pub fn with_source(source: Box<dyn NormalSource + Send>) -> Self {
        Self { source }
    }

    /// Draws one skew-normal amount.
    pub fn draw(&mut self, mean: f64, deviation: f64, skewness: f64) -> f64 {
        skew_normal(self.source.as_mut(), mean, deviation, skewness)
    }
}

impl std::fmt::Debug for RewardRandomizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardRandomizer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_skew_is_plain_normal() {
        let mut source = FixedSource::new(vec![(1.0, 1.0)]);
        let result = skew_normal(&mut source, 1.0, 2.0, 0.0);
        assert!((result - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn skewed_draw_matches_closed_form() {
        let mut source = FixedSource::new(vec![(1.0, 1.0)]);
        let result = skew_normal(&mut source, 1.0, 2.0, 2.0);

        // coeff = 2 / sqrt(5); u1 = coeff + sqrt(1 - coeff^2); u0 >= 0 so z = u1.
        let coeff = 2.0 / 5.0_f64.sqrt();
        let expected = 1.0 + 2.0 * (coeff + (1.0 - coeff * coeff).sqrt());
        assert!((result - expected).abs() < 1e-12);
    }

    #[test]
    fn negative_u0_flips_sign() {
        let mut source = FixedSource::new(vec![(-1.0, 1.0)]);
        let result = skew_normal(&mut source, 0.0, 1.0, 2.0);

        let coeff = 2.0 / 5.0_f64.sqrt();
        let u1 = -coeff + (1.0 - coeff * coeff).sqrt();
        assert!((result - (-u1)).abs() < 1e-12);
    }

    #[test]
    fn seeded_randomizer_is_reproducible() {
        let mut a = RewardRandomizer::seeded(42);
        let mut b = RewardRandomizer::seeded(42);
        for _ in 0..16 {
            let x = a.draw(10.0, 3.0, 1.5);
            let y = b.draw(10.0, 3.0, 1.5);
            assert!((x - y).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn box_muller_pairs_are_finite() {
        let mut source = BoxMullerSource::seeded(7);
        for _ in 0..1000 {
            let (u0, v) = source.next_pair();
            assert!(u0.is_finite());
            assert!(v.is_finite());
        }
    }

    #[test]
    fn fixed_source_cycles() {
        let mut source = FixedSource::new(vec![(1.0, 2.0), (3.0, 4.0)]);
        assert_eq!(source.next_pair(), (1.0, 2.0));
        assert_eq!(source.next_pair(), (3.0, 4.0));
        assert_eq!(source.next_pair(), (1.0, 2.0));
    }
}
