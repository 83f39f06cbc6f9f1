//! Exchange-and-converge loop
//!
//! Each party repeatedly transmits its private signal minus a scaled copy of
//! what it last received. The distance between the two parties' received
//! references is recorded after every exchange.

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::channel::ChannelModel;
use crate::signal::Signal;

/// Parameters of the feedback loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopParams {
    /// Scale applied to the received reference before it is mixed out
    pub mixing_gain: f64,
    /// Iteration cap after the initial exchange
    pub max_iters: usize,
    /// Stop as soon as the reference distance drops below this value
    pub stop_threshold: f64,
}

impl Default for LoopParams {
    fn default() -> Self {
        Self {
            mixing_gain: 0.2,
            max_iters: 20,
            stop_threshold: 1.0,
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// The norm crossed the threshold at this iteration (1-based)
    Threshold { iteration: usize },
    /// `max_iters` iterations ran without crossing the threshold
    IterationCap,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Threshold { .. } => "threshold",
            StopReason::IterationCap => "iteration_cap",
        }
    }
}

/// Terminal state of the loop
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceState {
    /// Alice's last received reference
    pub ref_a: Signal,
    /// Bob's last received reference
    pub ref_b: Signal,
    /// `norms[0]` is the initial exchange, then one entry per iteration
    pub norms: Vec<f64>,
    pub stop: StopReason,
}

impl ConvergenceState {
    /// Number of feedback iterations executed after the initial exchange
    pub fn iterations(&self) -> usize {
        self.norms.len().saturating_sub(1)
    }

    pub fn initial_norm(&self) -> f64 {
        self.norms.first().copied().unwrap_or(0.0)
    }

    pub fn final_norm(&self) -> f64 {
        self.norms.last().copied().unwrap_or(0.0)
    }

    /// `final_norm / initial_norm`, or `None` for a zero initial norm
    pub fn norm_ratio(&self) -> Option<f64> {
        let initial = self.initial_norm();
        if initial > 0.0 {
            Some(self.final_norm() / initial)
        } else {
            None
        }
    }
}

/// Run the loop.
///
/// Bob's reference is always produced from a signal Alice transmitted,
/// drawing noise from `rng_a`; Alice's reference comes from Bob's
/// transmission through `rng_b`. Within an exchange Alice's transmission is
/// drawn first.
///
/// # Panics
/// If `a` is empty or `a` and `b` differ in length.
pub fn converge<R: Rng + ?Sized>(
    a: &Signal,
    b: &Signal,
    channel: &ChannelModel,
    params: &LoopParams,
    rng_a: &mut R,
    rng_b: &mut R,
) -> ConvergenceState {
    assert!(!a.is_empty(), "converge requires non-empty signals");
    assert_eq!(a.len(), b.len(), "alice and bob signals differ in length");

    let mut ref_b = channel.exchange(a, rng_a);
    let mut ref_a = channel.exchange(b, rng_b);

    let mut norms = Vec::with_capacity(params.max_iters + 1);
    norms.push(ref_a.distance(&ref_b));
    debug!(iteration = 0, norm = norms[0], "initial exchange");

    let mut stop = StopReason::IterationCap;
    for k in 1..=params.max_iters {
        let s_a = a.mix_out(&ref_a, params.mixing_gain);
        let s_b = b.mix_out(&ref_b, params.mixing_gain);

        ref_b = channel.exchange(&s_a, rng_a);
        ref_a = channel.exchange(&s_b, rng_b);

        let norm = ref_a.distance(&ref_b);
        norms.push(norm);
        debug!(iteration = k, norm, "exchange");

        if norm < params.stop_threshold {
            stop = StopReason::Threshold { iteration: k };
            break;
        }
    }

    info!(
        iterations = norms.len() - 1,
        initial_norm = norms[0],
        final_norm = norms[norms.len() - 1],
        stop = stop.label(),
        "convergence loop finished"
    );

    ConvergenceState {
        ref_a,
        ref_b,
        norms,
        stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ImpulseResponse;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn default_channel(noise_std: f64) -> ChannelModel {
        ChannelModel::new(ImpulseResponse::reverberant(50, 0.7).unwrap(), noise_std).unwrap()
    }

    fn signals(seed_a: u64, seed_b: u64) -> (Signal, Signal, ChaCha8Rng, ChaCha8Rng) {
        let mut rng_a = ChaCha8Rng::seed_from_u64(seed_a);
        let mut rng_b = ChaCha8Rng::seed_from_u64(seed_b);
        let a = Signal::standard_normal(100, &mut rng_a);
        let b = Signal::standard_normal(100, &mut rng_b);
        (a, b, rng_a, rng_b)
    }

    #[test]
    fn test_runs_to_cap_when_threshold_unreachable() {
        let (a, b, mut rng_a, mut rng_b) = signals(42, 43);
        let params = LoopParams {
            stop_threshold: 0.0,
            ..LoopParams::default()
        };
        let state = converge(&a, &b, &default_channel(0.3), &params, &mut rng_a, &mut rng_b);
        assert_eq!(state.stop, StopReason::IterationCap);
        assert_eq!(state.norms.len(), params.max_iters + 1);
        assert_eq!(state.iterations(), params.max_iters);
    }

    #[test]
    fn test_stops_at_first_threshold_crossing() {
        let (a, b, mut rng_a, mut rng_b) = signals(42, 43);
        let params = LoopParams {
            stop_threshold: f64::INFINITY,
            ..LoopParams::default()
        };
        let state = converge(&a, &b, &default_channel(0.3), &params, &mut rng_a, &mut rng_b);
        assert_eq!(state.stop, StopReason::Threshold { iteration: 1 });
        assert_eq!(state.norms.len(), 2);
    }

    #[test]
    fn test_threshold_index_matches_norm_history() {
        let (a, b, mut rng_a, mut rng_b) = signals(5, 6);
        let uncapped = {
            let (a2, b2, mut ra, mut rb) = signals(5, 6);
            let params = LoopParams {
                stop_threshold: 0.0,
                ..LoopParams::default()
            };
            converge(&a2, &b2, &default_channel(0.3), &params, &mut ra, &mut rb)
        };
        // Choose a threshold just above the norm at iteration 7 so the
        // crossing happens no later than there.
        let threshold = uncapped.norms[7] + 1e-9;
        let expected = uncapped.norms[1..]
            .iter()
            .position(|&n| n < threshold)
            .map(|p| p + 1)
            .unwrap();

        let params = LoopParams {
            stop_threshold: threshold,
            ..LoopParams::default()
        };
        let state = converge(&a, &b, &default_channel(0.3), &params, &mut rng_a, &mut rng_b);
        assert_eq!(state.stop, StopReason::Threshold { iteration: expected });
        assert_eq!(state.norms[..], uncapped.norms[..=expected]);
    }

    #[test]
    fn test_references_follow_sender_streams() {
        let channel = default_channel(0.3);
        let (a, b, rng_a, rng_b) = signals(42, 43);
        let mut replay_a = rng_a.clone();
        let mut replay_b = rng_b.clone();

        // Bob hears Alice through her stream, Alice hears Bob through his.
        let initial_only = LoopParams {
            max_iters: 0,
            stop_threshold: 0.0,
            ..LoopParams::default()
        };
        let state = converge(
            &a,
            &b,
            &channel,
            &initial_only,
            &mut rng_a.clone(),
            &mut rng_b.clone(),
        );
        let ref_b0 = channel.exchange(&a, &mut replay_a);
        let ref_a0 = channel.exchange(&b, &mut replay_b);
        assert_eq!(state.stop, StopReason::IterationCap);
        assert_eq!(state.ref_b, ref_b0);
        assert_eq!(state.ref_a, ref_a0);
        assert_eq!(state.norms, vec![ref_a0.distance(&ref_b0)]);

        let one_iteration = LoopParams {
            max_iters: 1,
            ..initial_only
        };
        let state = converge(
            &a,
            &b,
            &channel,
            &one_iteration,
            &mut rng_a.clone(),
            &mut rng_b.clone(),
        );
        let s_a = a.mix_out(&ref_a0, one_iteration.mixing_gain);
        let s_b = b.mix_out(&ref_b0, one_iteration.mixing_gain);
        let ref_b1 = channel.exchange(&s_a, &mut replay_a);
        let ref_a1 = channel.exchange(&s_b, &mut replay_b);
        assert_eq!(state.ref_b, ref_b1);
        assert_eq!(state.ref_a, ref_a1);
        assert_eq!(state.norms.len(), 2);
        assert_eq!(state.norms[1], ref_a1.distance(&ref_b1));
    }

    #[test]
    fn test_zero_gain_is_repeated_initial_exchange() {
        let (a, b, mut rng_a, mut rng_b) = signals(11, 12);
        let params = LoopParams {
            mixing_gain: 0.0,
            max_iters: 3,
            stop_threshold: 0.0,
        };
        let channel = default_channel(0.0);
        let state = converge(&a, &b, &channel, &params, &mut rng_a, &mut rng_b);
        let first = state.norms[0];
        for &n in &state.norms {
            assert!((n - first).abs() < 1e-12);
        }
    }

    #[test]
    fn test_noiseless_loop_settles() {
        let (a, b, mut rng_a, mut rng_b) = signals(42, 43);
        let params = LoopParams {
            stop_threshold: 0.0,
            ..LoopParams::default()
        };
        let state = converge(&a, &b, &default_channel(0.0), &params, &mut rng_a, &mut rng_b);
        let n = state.norms.len();
        let last_step = (state.norms[n - 1] - state.norms[n - 2]).abs();
        assert!(last_step < 1e-4 * state.initial_norm());
    }

    #[test]
    fn test_deterministic_for_fixed_seeds() {
        let run = || {
            let (a, b, mut rng_a, mut rng_b) = signals(42, 43);
            converge(
                &a,
                &b,
                &default_channel(0.3),
                &LoopParams::default(),
                &mut rng_a,
                &mut rng_b,
            )
        };
        assert_eq!(run(), run());
    }

    #[test]
    #[should_panic(expected = "non-empty")]
    fn test_empty_signal_panics() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut rng2 = ChaCha8Rng::seed_from_u64(1);
        let empty = Signal::new(Vec::new());
        converge(
            &empty,
            &empty,
            &default_channel(0.3),
            &LoopParams::default(),
            &mut rng,
            &mut rng2,
        );
    }
}
