//! Passive eavesdropper with a mismatched room model
//!
//! Eve hears the sum of both private signals once, through a delayed copy
//! of the room response, with extra noise and no access to the feedback
//! loop. Her bits are then scrambled by random measurement errors.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::{ChannelModel, ImpulseResponse};
use crate::error::Result;
use crate::reconcile::{quantize, BitVector};
use crate::signal::Signal;
use crate::stats;

/// Eavesdropper model parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EavesdropperParams {
    /// Tap delay of Eve's room model relative to the true one
    pub offset: usize,
    /// Eve's noise standard deviation relative to the legitimate channel
    pub noise_multiplier: f64,
    /// Probability of flipping each of Eve's bits
    pub flip_probability: f64,
}

impl Default for EavesdropperParams {
    fn default() -> Self {
        Self {
            offset: 5,
            noise_multiplier: 1.5,
            flip_probability: 0.15,
        }
    }
}

/// Eve's room model: `base` delayed by `offset` taps, wrapped taps zeroed
pub fn misaligned_response(base: &ImpulseResponse, offset: usize) -> ImpulseResponse {
    base.shifted(offset)
}

/// Run Eve's observation and return her scrambled bits.
///
/// All channel noise is drawn from `rng_eve` before the flip draws.
pub fn probe<R: Rng + ?Sized>(
    a: &Signal,
    b: &Signal,
    base_impulse_response: &ImpulseResponse,
    noise_std: f64,
    params: &EavesdropperParams,
    rng_eve: &mut R,
) -> Result<BitVector> {
    let room = misaligned_response(base_impulse_response, params.offset);
    let channel = ChannelModel::new(room, noise_std * params.noise_multiplier)?;
    let observed = channel.exchange(&a.add(b), rng_eve);

    let clean = quantize(&observed);
    let scrambled: Vec<u8> = clean
        .bits()
        .iter()
        .map(|&bit| {
            let flip = rng_eve.gen::<f64>() < params.flip_probability;
            bit ^ u8::from(flip)
        })
        .collect();

    let flips = clean
        .bits()
        .iter()
        .zip(&scrambled)
        .filter(|(x, y)| x != y)
        .count();
    debug!(bits = scrambled.len(), flips, "eavesdropper observation");

    Ok(BitVector::from_bits(scrambled))
}

/// Correlation between Alice's reconciled bits and Eve's bits over their
/// common prefix.
pub fn eavesdropper_correlation(alice: &BitVector, eve: &BitVector) -> Option<f64> {
    let n = alice.len().min(eve.len());
    stats::bit_correlation(&alice.bits()[..n], &eve.bits()[..n])
}
