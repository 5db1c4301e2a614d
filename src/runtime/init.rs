use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError};
use serde::{Deserialize, Serialize};

/// How a trainable variable gets its initial values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Initializer {
    /// Every element takes the same value.
    Const { value: f32 },
    /// Glorot (Xavier) normal: a zero mean normal scaled by the fan in and fan out.
    GlorotNormal { fan_in: usize, fan_out: usize },
}

impl Initializer {
    /// Creates the generator for a variable of `limit` elements.
    ///
    /// # Returns
    /// An error if the scaled standard deviation is not finite.
    pub fn generator<R: Rng>(&self, limit: usize) -> Result<Box<dyn ParamGen<R>>, NormalError> {
        let generator: Box<dyn ParamGen<R>> = match *self {
            Self::Const { value } => Box::new(ConstParamGen::new(value, limit)),
            Self::GlorotNormal { fan_in, fan_out } => {
                Box::new(RandParamGen::glorot_normal(limit, fan_in, fan_out)?)
            }
        };

        Ok(generator)
    }
}

/// A `ParamGen` generates values for the initial state of the model's parameters.
pub trait ParamGen<R: Rng> {
    /// Should sample at most `n` parameters.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `n` - The upper limit of samples to generate.
    ///
    /// # Returns
    /// An option whether the generator is exhausted.
    fn sample(&mut self, rng: &mut R, n: usize) -> Option<Vec<f32>>;
}

/// A parameter generator that always generates the same value.
pub struct ConstParamGen {
    value: f32,
    remaining: usize,
}

impl ConstParamGen {
    /// Creates a new `ConstParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `value` - The value to always generate.
    /// * `limit` - The maximum amount of times to generate that value.
    pub fn new(value: f32, limit: usize) -> Self {
        Self {
            value,
            remaining: limit,
        }
    }
}

impl<R: Rng> ParamGen<R> for ConstParamGen {
    fn sample(&mut self, _rng: &mut R, mut n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        n = n.min(self.remaining);
        self.remaining -= n;
        Some(vec![self.value; n])
    }
}

/// A parameter generator that follows a certain probabilistic distribution.
pub struct RandParamGen<D: Distribution<f32>> {
    distribution: D,
    remaining: usize,
}

impl<D: Distribution<f32>> RandParamGen<D> {
    /// Creates a new `RandParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `distribution` - The distribution to sample the random numbers from.
    /// * `limit` - The maximum amount of numbers to generate.
    pub fn new(distribution: D, limit: usize) -> Self {
        Self {
            distribution,
            remaining: limit,
        }
    }
}

impl RandParamGen<Normal<f32>> {
    /// Creates a new `RandParamGen` using Glorot normal initialization.
    ///
    /// # Arguments
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `fan_in` - The number of input units in the weight tensor.
    /// * `fan_out` - The number of output units in the weight tensor.
    ///
    /// # Returns
    /// An error if the calculated standard deviation is not finite (NaN or infinite).
    pub fn glorot_normal(limit: usize, fan_in: usize, fan_out: usize) -> Result<Self, NormalError> {
        let std_dev = (2. / (fan_in + fan_out) as f32).sqrt();
        Ok(Self::new(Normal::new(0., std_dev)?, limit))
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen<R> for RandParamGen<D> {
    fn sample(&mut self, rng: &mut R, mut n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        n = n.min(self.remaining);
        self.remaining -= n;
        Some((0..n).map(|_| self.distribution.sample(rng)).collect())
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn const_generator_is_exhausted_after_its_limit() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut param_gen = ConstParamGen::new(0.1, 10);

        assert_eq!(param_gen.sample(&mut rng, 7).unwrap(), vec![0.1; 7]);
        assert_eq!(param_gen.sample(&mut rng, 7).unwrap(), vec![0.1; 3]);
        assert!(param_gen.sample(&mut rng, 1).is_none());
    }

    #[test]
    fn glorot_normal_spreads_by_the_fans() {
        let mut rng = StdRng::seed_from_u64(42);
        let (fan_in, fan_out) = (4, 5);
        let mut param_gen = RandParamGen::glorot_normal(10_000, fan_in, fan_out).unwrap();

        let sample = param_gen.sample(&mut rng, 10_000).unwrap();
        let n = sample.len() as f32;
        let mean = sample.iter().sum::<f32>() / n;
        let std_dev = (sample.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n).sqrt();
        let expected = (2. / (fan_in + fan_out) as f32).sqrt();

        assert_eq!(sample.len(), 10_000);
        assert!(mean.abs() < 0.02, "mean {mean}");
        assert!((std_dev - expected).abs() < 0.02, "std dev {std_dev}, expected {expected}");
        // Untruncated: some samples fall past two standard deviations.
        assert!(sample.iter().any(|x| x.abs() > 2. * expected));
        assert!(param_gen.sample(&mut rng, 1).is_none());
    }

    #[test]
    fn same_seed_same_values() {
        let init = Initializer::GlorotNormal {
            fan_in: 4,
            fan_out: 3,
        };

        let mut rng1 = StdRng::seed_from_u64(1234567);
        let mut rng2 = StdRng::seed_from_u64(1234567);
        let a = init.generator::<StdRng>(12).unwrap().sample(&mut rng1, 12);
        let b = init.generator::<StdRng>(12).unwrap().sample(&mut rng2, 12);

        assert_eq!(a, b);
    }
}
