//! echokey - reverberant-channel key agreement simulation
//!
//! Two parties exchange private random signals through a shared noisy room,
//! feed scaled copies of what they hear back into their transmissions,
//! quantize the resulting references into bits, drop disagreeing positions
//! and hash what is left into short key digests. A passive eavesdropper with
//! a misaligned room model is simulated alongside for comparison.
//!
//! This is a toy: reconciliation leaks the agreement pattern and nothing
//! here is a secure key exchange.

pub mod channel;
pub mod config;
pub mod convergence;
pub mod eavesdropper;
pub mod error;
pub mod key;
pub mod monte_carlo;
pub mod output;
pub mod reconcile;
pub mod signal;
pub mod sim;
pub mod stats;

// Re-export main types
pub use channel::{convolve_same, exchange, ChannelModel, ImpulseResponse};
pub use config::ProtocolConfig;
pub use convergence::{converge, ConvergenceState, LoopParams, StopReason};
pub use eavesdropper::{
    eavesdropper_correlation, misaligned_response, probe, EavesdropperParams,
};
pub use error::EchoKeyError;
pub use key::{derive_key, KeyDigest};
pub use monte_carlo::{
    run_monte_carlo, summarize, MonteCarloConfig, MonteCarloSummary, TrialRecord,
};
pub use reconcile::{quantize, reconcile, BitVector, Reconciliation};
pub use signal::Signal;
pub use sim::{run_protocol, ProtocolReport, ProtocolRun};
