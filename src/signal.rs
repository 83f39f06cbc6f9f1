//! Fixed-length real-valued signals
//!
//! A `Signal` is never mutated after construction; every arithmetic helper
//! returns a fresh value. Element-wise operations require equal lengths.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::stats;

/// Ordered sequence of samples exchanged over the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal(Vec<f64>);

impl Signal {
    pub fn new(samples: Vec<f64>) -> Self {
        Self(samples)
    }

    /// Draw `len` independent standard-normal samples from `rng`
    pub fn standard_normal<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let samples: Vec<f64> = (0..len)
            .map(|_| StandardNormal.sample(&mut *rng))
            .collect();
        Self(samples)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.0
    }

    /// Leading `n` samples (fewer if the signal is shorter)
    pub fn head(&self, n: usize) -> &[f64] {
        &self.0[..n.min(self.0.len())]
    }

    pub fn add(&self, other: &Signal) -> Signal {
        self.zip_with(other, "add", |x, y| x + y)
    }

    pub fn sub(&self, other: &Signal) -> Signal {
        self.zip_with(other, "sub", |x, y| x - y)
    }

    /// `self - gain * other`, the feedback mix each party transmits
    pub fn mix_out(&self, other: &Signal, gain: f64) -> Signal {
        self.zip_with(other, "mix_out", |x, y| x - gain * y)
    }

    /// Euclidean norm of `self - other`
    pub fn distance(&self, other: &Signal) -> f64 {
        stats::euclidean_norm(self.sub(other).samples())
    }

    fn zip_with(&self, other: &Signal, op: &str, f: impl Fn(f64, f64) -> f64) -> Signal {
        assert_eq!(
            self.len(),
            other.len(),
            "signal length mismatch in {op}"
        );
        Signal(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(&x, &y)| f(x, y))
                .collect(),
        )
    }
}
