//! Reverberant noisy channel
//!
//! Models the shared room both parties transmit through: a fixed
//! reverberation kernel applied by "same"-mode convolution followed by
//! additive white Gaussian noise.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::error::{EchoKeyError, Result};
use crate::signal::Signal;
use crate::stats;

/// Spacing between echo taps in a reverberant kernel
pub const ECHO_SPACING: usize = 5;

/// Convolution kernel describing direct path plus echoes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpulseResponse {
    taps: Vec<f64>,
}

impl ImpulseResponse {
    /// Direct path at tap 0 and an echo of amplitude `decay^i` at every
    /// `ECHO_SPACING * i` tap, normalized to unit Euclidean norm.
    pub fn reverberant(size: usize, decay: f64) -> Result<Self> {
        if size == 0 {
            return Err(EchoKeyError::InvalidConfig(
                "impulse response size must be greater than zero".to_string(),
            ));
        }

        let mut taps = vec![0.0; size];
        taps[0] = 1.0;
        for i in 1..size / ECHO_SPACING {
            taps[i * ECHO_SPACING] = decay.powi(i as i32);
        }
        Self::from_taps(taps)
    }

    /// Normalize arbitrary taps to unit norm. Empty or all-zero kernels
    /// are rejected.
    pub fn from_taps(taps: Vec<f64>) -> Result<Self> {
        let norm = stats::euclidean_norm(&taps);
        if taps.is_empty() || !norm.is_finite() || norm == 0.0 {
            return Err(EchoKeyError::InvalidConfig(
                "impulse response must have finite, non-zero norm".to_string(),
            ));
        }
        Ok(Self {
            taps: taps.into_iter().map(|t| t / norm).collect(),
        })
    }

    /// Cyclic right shift by `offset` with the wrapped taps zeroed.
    ///
    /// The result is not renormalized: energy carried by the wrapped tail
    /// is lost, as it would be in a misaligned room model.
    pub fn shifted(&self, offset: usize) -> Self {
        let len = self.taps.len();
        let mut taps = vec![0.0; len];
        for (i, &tap) in self.taps.iter().enumerate() {
            let dst = i + offset;
            if dst < len {
                taps[dst] = tap;
            }
        }
        Self { taps }
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn norm(&self) -> f64 {
        stats::euclidean_norm(&self.taps)
    }
}

/// "Same"-mode linear convolution.
///
/// The full convolution has `n + k - 1` samples; the returned window has
/// the input length `n` and starts at offset `(k - 1) / 2`.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let k = kernel.len();
    if n == 0 || k == 0 {
        return vec![0.0; n];
    }

    let start = (k - 1) / 2;
    (0..n)
        .map(|m| {
            let full_idx = m + start;
            // full[full_idx] = sum_j kernel[j] * signal[full_idx - j]
            let j_min = full_idx.saturating_sub(n - 1);
            let j_max = full_idx.min(k - 1);
            (j_min..=j_max)
                .map(|j| kernel[j] * signal[full_idx - j])
                .sum()
        })
        .collect()
}

/// Reverberation plus AWGN, applied identically to every transmission
#[derive(Debug, Clone)]
pub struct ChannelModel {
    impulse_response: ImpulseResponse,
    noise: Normal<f64>,
}

impl ChannelModel {
    /// Rejects a negative or non-finite `noise_std`.
    pub fn new(impulse_response: ImpulseResponse, noise_std: f64) -> Result<Self> {
        // Normal::new only checks finiteness
        if !noise_std.is_finite() || noise_std < 0.0 {
            return Err(EchoKeyError::InvalidConfig(format!(
                "noise standard deviation must be finite and non-negative, got {noise_std}"
            )));
        }
        let noise = Normal::new(0.0, noise_std)?;
        Ok(Self {
            impulse_response,
            noise,
        })
    }

    /// Pass `signal` through the room and draw one noise sample per output
    /// position from `rng`, in output order.
    pub fn exchange<R: Rng + ?Sized>(&self, signal: &Signal, rng: &mut R) -> Signal {
        let reverbed = convolve_same(signal.samples(), self.impulse_response.taps());
        let received: Vec<f64> = reverbed
            .into_iter()
            .map(|v| v + self.noise.sample(&mut *rng))
            .collect();
        Signal::new(received)
    }
}

/// One-shot form of [`ChannelModel::exchange`]
pub fn exchange<R: Rng + ?Sized>(
    signal: &Signal,
    impulse_response: &ImpulseResponse,
    noise_std: f64,
    rng: &mut R,
) -> Result<Signal> {
    let channel = ChannelModel::new(impulse_response.clone(), noise_std)?;
    Ok(channel.exchange(signal, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_reverberant_unit_norm() {
        for &decay in &[0.05, 0.3, 0.7, 0.95] {
            for &size in &[5usize, 7, 50, 128] {
                let ir = ImpulseResponse::reverberant(size, decay).unwrap();
                assert_relative_eq!(ir.norm(), 1.0, epsilon = 1e-12);
                assert_eq!(ir.len(), size);
            }
        }
    }

    #[test]
    fn test_reverberant_tap_layout() {
        let ir = ImpulseResponse::reverberant(50, 0.7).unwrap();
        let scale = ir.taps()[0];
        assert!(scale > 0.0);
        assert_relative_eq!(ir.taps()[5] / scale, 0.7, epsilon = 1e-12);
        assert_relative_eq!(ir.taps()[45] / scale, 0.7f64.powi(9), epsilon = 1e-12);
        assert_eq!(ir.taps()[1], 0.0);
        assert_eq!(ir.taps()[49], 0.0);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(ImpulseResponse::reverberant(0, 0.7).is_err());
        assert!(ImpulseResponse::from_taps(vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn test_shifted_zeroes_wrapped_taps() {
        let ir = ImpulseResponse::reverberant(50, 0.7).unwrap();
        let shifted = ir.shifted(5);
        assert!(shifted.taps()[..5].iter().all(|&t| t == 0.0));
        assert_eq!(shifted.taps()[5], ir.taps()[0]);
        assert_eq!(shifted.taps()[10], ir.taps()[5]);
        assert!(shifted.norm() < 1.0);
    }

    #[test]
    fn test_convolve_same_identity_kernel() {
        let x = [1.0, -2.0, 3.0, 0.5];
        assert_eq!(convolve_same(&x, &[1.0]), x.to_vec());
    }

    #[test]
    fn test_convolve_same_centering() {
        // full = [1, 3, 6, 5, 3]; k = 3 so the window starts at 1
        let x = [1.0, 2.0, 3.0];
        let h = [1.0, 1.0, 1.0];
        assert_eq!(convolve_same(&x, &h), vec![3.0, 6.0, 5.0]);

        // even kernel: full = [1, 3, 5, 3]; k = 2 so the window starts at 0
        let h2 = [1.0, 1.0];
        assert_eq!(convolve_same(&x, &h2), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_convolve_same_kernel_longer_than_signal() {
        let x = [1.0, 1.0];
        let h = [1.0, 2.0, 3.0, 4.0, 5.0];
        // full = [1, 3, 5, 7, 9, 5]; start = 2
        assert_eq!(convolve_same(&x, &h), vec![5.0, 7.0]);
    }

    #[test]
    fn test_exchange_noiseless_is_convolution() {
        let ir = ImpulseResponse::reverberant(10, 0.5).unwrap();
        let channel = ChannelModel::new(ir.clone(), 0.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let x = Signal::new((0..20).map(|i| i as f64).collect());
        let out = channel.exchange(&x, &mut rng);
        assert_eq!(out.samples(), convolve_same(x.samples(), ir.taps()).as_slice());
    }

    #[test]
    fn test_exchange_advances_stream() {
        let ir = ImpulseResponse::reverberant(10, 0.5).unwrap();
        let channel = ChannelModel::new(ir, 0.3).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let x = Signal::new(vec![0.0; 16]);
        let first = channel.exchange(&x, &mut rng);
        let second = channel.exchange(&x, &mut rng);
        assert_ne!(first, second);

        let mut replay = ChaCha8Rng::seed_from_u64(9);
        assert_eq!(channel.exchange(&x, &mut replay), first);
    }

    #[test]
    fn test_negative_noise_rejected() {
        let ir = ImpulseResponse::reverberant(10, 0.5).unwrap();
        for bad in [-1.0, -1e-12, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                ChannelModel::new(ir.clone(), bad),
                Err(EchoKeyError::InvalidConfig(_))
            ));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let x = Signal::new(vec![1.0; 8]);
        assert!(exchange(&x, &ir, -0.3, &mut rng).is_err());
    }

    #[test]
    fn test_free_exchange_matches_channel_model() {
        let ir = ImpulseResponse::reverberant(50, 0.7).unwrap();
        let channel = ChannelModel::new(ir.clone(), 0.3).unwrap();
        let x = Signal::new((0..100).map(|i| (i as f64 * 0.1).sin()).collect());

        let mut rng_model = ChaCha8Rng::seed_from_u64(21);
        let mut rng_free = ChaCha8Rng::seed_from_u64(21);
        let from_model = channel.exchange(&x, &mut rng_model);
        let from_free = exchange(&x, &ir, 0.3, &mut rng_free).unwrap();
        assert_eq!(from_model, from_free);

        // both leave the stream at the same position
        assert_eq!(rng_model.gen::<u64>(), rng_free.gen::<u64>());
    }
}
