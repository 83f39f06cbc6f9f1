use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::channel::ImpulseResponse;
use crate::convergence::LoopParams;
use crate::eavesdropper::EavesdropperParams;
use crate::error::{EchoKeyError, Result};
use crate::key::MAX_DIGEST_LENGTH;

/// Full parameter set of one protocol run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub signal_length: usize,
    pub mixing_gain: f64,
    pub noise_std: f64,
    pub max_iters: usize,
    pub stop_threshold: f64,
    pub impulse_response_size: usize,
    pub decay: f64,
    pub eavesdropper_offset: usize,
    pub eavesdropper_noise_multiplier: f64,
    pub flip_probability: f64,
    pub digest_length: usize,
    pub alice_seed: u64,
    pub bob_seed: u64,
    pub eve_seed: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            signal_length: 100,
            mixing_gain: 0.2,
            noise_std: 0.3,
            max_iters: 20,
            stop_threshold: 1.0,
            impulse_response_size: 50,
            decay: 0.7,
            eavesdropper_offset: 5,
            eavesdropper_noise_multiplier: 1.5,
            flip_probability: 0.15,
            digest_length: 8,
            alice_seed: 42,
            bob_seed: 43,
            eve_seed: 44,
        }
    }
}

fn invalid(msg: &str) -> EchoKeyError {
    EchoKeyError::InvalidConfig(msg.to_string())
}

impl ProtocolConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg = Self::from_toml_str(&raw)?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: ProtocolConfig = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.signal_length == 0 {
            return Err(invalid("signal_length must be greater than zero"));
        }
        if self.impulse_response_size == 0 {
            return Err(invalid("impulse_response_size must be greater than zero"));
        }
        if !self.mixing_gain.is_finite() || self.mixing_gain < 0.0 {
            return Err(invalid("mixing_gain must be finite and non-negative"));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(invalid("noise_std must be finite and non-negative"));
        }
        if self.stop_threshold.is_nan() || self.stop_threshold < 0.0 {
            return Err(invalid("stop_threshold must be non-negative"));
        }
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(invalid("decay must be in (0, 1)"));
        }
        let multiplier = self.eavesdropper_noise_multiplier;
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(invalid(
                "eavesdropper_noise_multiplier must be finite and non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.flip_probability) {
            return Err(invalid("flip_probability must be in [0, 1]"));
        }
        if self.eavesdropper_offset >= self.impulse_response_size {
            return Err(invalid(
                "eavesdropper_offset must be smaller than impulse_response_size",
            ));
        }
        if self.digest_length == 0 || self.digest_length > MAX_DIGEST_LENGTH {
            return Err(invalid("digest_length must be in 1..=64"));
        }
        if self.alice_seed == self.bob_seed {
            return Err(invalid("alice_seed and bob_seed must differ"));
        }
        Ok(())
    }

    pub fn loop_params(&self) -> LoopParams {
        LoopParams {
            mixing_gain: self.mixing_gain,
            max_iters: self.max_iters,
            stop_threshold: self.stop_threshold,
        }
    }

    pub fn eavesdropper_params(&self) -> EavesdropperParams {
        EavesdropperParams {
            offset: self.eavesdropper_offset,
            noise_multiplier: self.eavesdropper_noise_multiplier,
            flip_probability: self.flip_probability,
        }
    }

    pub fn impulse_response(&self) -> Result<ImpulseResponse> {
        ImpulseResponse::reverberant(self.impulse_response_size, self.decay)
    }

    /// Same configuration with a fresh seed triple
    pub fn with_seeds(&self, alice: u64, bob: u64, eve: u64) -> Self {
        Self {
            alice_seed: alice,
            bob_seed: bob,
            eve_seed: eve,
            ..self.clone()
        }
    }
}
