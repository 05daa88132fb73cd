use ndarray::Array1;
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use parking_lot::Mutex;
use rand_xoshiro::Xoshiro256Plus;

/// A uniform random source safe to share between threads.
///
/// Accesses are serialized through a mutex so concurrent optimizer restarts can draw from
/// the same generator. Seed it with [`RandomSource::seed_from_u64`] to get reproducible runs.
#[derive(Debug)]
pub struct RandomSource {
    rng: Mutex<Xoshiro256Plus>,
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource {
    /// Random source with a generator initialized from the given seed
    pub fn seed_from_u64(seed: u64) -> Self {
        RandomSource {
            rng: Mutex::new(Xoshiro256Plus::seed_from_u64(seed)),
        }
    }

    /// Random source with a generator initialized from system entropy
    pub fn from_entropy() -> Self {
        RandomSource {
            rng: Mutex::new(Xoshiro256Plus::from_entropy()),
        }
    }

    /// Random source wrapping the given generator
    pub fn from_rng(rng: Xoshiro256Plus) -> Self {
        RandomSource {
            rng: Mutex::new(rng),
        }
    }

    /// Draw a real value uniformly in `[min, max)`, `min` when the range is empty
    pub fn uniform(&self, min: f64, max: f64) -> f64 {
        if min < max {
            self.rng.lock().gen_range(min..max)
        } else {
            min
        }
    }

    /// Draw an integer uniformly in `[min, max]`
    pub fn uniform_int(&self, min: i64, max: i64) -> i64 {
        if min < max {
            self.rng.lock().gen_range(min..=max)
        } else {
            min
        }
    }

    /// Draw a vector of size `n` with components uniformly distributed in `[min, max)`
    pub fn uniform_vector(&self, n: usize, min: f64, max: f64) -> Array1<f64> {
        if min < max {
            let mut rng = self.rng.lock();
            Array1::random_using(n, Uniform::new(min, max), &mut *rng)
        } else {
            Array1::from_elem(n, min)
        }
    }
}
