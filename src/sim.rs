//! End-to-end protocol scenario
//!
//! Seeds each party's stream, runs the convergence loop, reconciles the
//! quantized references, derives both keys, and probes the eavesdropper.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::channel::ChannelModel;
use crate::config::ProtocolConfig;
use crate::convergence::{converge, ConvergenceState, StopReason};
use crate::eavesdropper::{eavesdropper_correlation, probe};
use crate::error::Result;
use crate::key::{derive_key, KeyDigest};
use crate::reconcile::{quantize, reconcile, BitVector, Reconciliation};
use crate::signal::Signal;
use crate::stats;

/// Samples of each private signal included in the report
pub const REPORT_HEAD: usize = 5;

/// One participant: a private signal and the stream it was drawn from.
///
/// The same stream keeps supplying channel noise for everything the party
/// transmits, so it is never cloned or reseeded.
#[derive(Debug)]
pub struct Party {
    pub signal: Signal,
    rng: ChaCha8Rng,
}

impl Party {
    pub fn new(seed: u64, signal_length: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let signal = Signal::standard_normal(signal_length, &mut rng);
        Self { signal, rng }
    }
}

/// Values reported for a single run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolReport {
    pub alice_seed: u64,
    pub bob_seed: u64,
    pub eve_seed: u64,
    pub initial_correlation: Option<f64>,
    pub alice_head: Vec<f64>,
    pub bob_head: Vec<f64>,
    pub norms: Vec<f64>,
    pub stop: StopReason,
    pub iterations: usize,
    pub initial_norm: f64,
    pub final_norm: f64,
    pub raw_bit_correlation: Option<f64>,
    pub polarity_flipped: bool,
    pub mismatches: usize,
    pub mismatch_percent: f64,
    pub reconciled_len: usize,
    pub alice_key: KeyDigest,
    pub bob_key: KeyDigest,
    pub keys_match: bool,
    pub eavesdropper_correlation: Option<f64>,
}

/// Report plus the intermediate values it was computed from
#[derive(Debug, Clone)]
pub struct ProtocolRun {
    pub report: ProtocolReport,
    pub state: ConvergenceState,
    pub reconciliation: Reconciliation,
    pub eavesdropper_bits: BitVector,
}

pub fn run_protocol(config: &ProtocolConfig) -> Result<ProtocolRun> {
    config.validate()?;

    let impulse_response = config.impulse_response()?;
    let channel = ChannelModel::new(impulse_response.clone(), config.noise_std)?;

    let mut alice = Party::new(config.alice_seed, config.signal_length);
    let mut bob = Party::new(config.bob_seed, config.signal_length);
    let initial_correlation = stats::pearson(alice.signal.samples(), bob.signal.samples());

    let state = converge(
        &alice.signal,
        &bob.signal,
        &channel,
        &config.loop_params(),
        &mut alice.rng,
        &mut bob.rng,
    );

    let reconciliation = reconcile(&quantize(&state.ref_a), &quantize(&state.ref_b));
    let alice_key = derive_key(&reconciliation.alice, config.digest_length);
    let bob_key = derive_key(&reconciliation.bob, config.digest_length);
    let keys_match = alice_key == bob_key;
    if keys_match {
        info!(key = %alice_key, bits = reconciliation.alice.len(), "keys agree");
    } else {
        warn!(alice = %alice_key, bob = %bob_key, "keys differ");
    }

    let mut eve_rng = ChaCha8Rng::seed_from_u64(config.eve_seed);
    let eavesdropper_bits = probe(
        &alice.signal,
        &bob.signal,
        &impulse_response,
        config.noise_std,
        &config.eavesdropper_params(),
        &mut eve_rng,
    )?;
    let eve_corr = eavesdropper_correlation(&reconciliation.alice, &eavesdropper_bits);

    let report = ProtocolReport {
        alice_seed: config.alice_seed,
        bob_seed: config.bob_seed,
        eve_seed: config.eve_seed,
        initial_correlation,
        alice_head: alice.signal.head(REPORT_HEAD).to_vec(),
        bob_head: bob.signal.head(REPORT_HEAD).to_vec(),
        norms: state.norms.clone(),
        stop: state.stop,
        iterations: state.iterations(),
        initial_norm: state.initial_norm(),
        final_norm: state.final_norm(),
        raw_bit_correlation: reconciliation.raw_correlation,
        polarity_flipped: reconciliation.polarity_flipped,
        mismatches: reconciliation.mismatches,
        mismatch_percent: 100.0 * reconciliation.mismatch_rate(),
        reconciled_len: reconciliation.alice.len(),
        alice_key,
        bob_key,
        keys_match,
        eavesdropper_correlation: eve_corr,
    };

    Ok(ProtocolRun {
        report,
        state,
        reconciliation,
        eavesdropper_bits,
    })
}
