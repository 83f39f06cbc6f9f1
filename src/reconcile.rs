//! Sign quantization and mismatch-dropping reconciliation

use serde::Serialize;
use tracing::info;

use crate::signal::Signal;
use crate::stats;

/// Ordered 0/1 sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BitVector(Vec<u8>);

impl BitVector {
    /// Panics if any entry is not 0 or 1.
    pub fn from_bits(bits: Vec<u8>) -> Self {
        assert!(bits.iter().all(|&b| b <= 1), "bit vectors hold only 0 and 1");
        Self(bits)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bits(&self) -> &[u8] {
        &self.0
    }

    /// Every bit flipped
    pub fn complement(&self) -> Self {
        Self(self.0.iter().map(|&b| 1 - b).collect())
    }

    /// Raw byte encoding used for hashing, one byte per bit
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Result of reconciling Alice's and Bob's raw bits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub alice: BitVector,
    pub bob: BitVector,
    /// Positions dropped from both vectors
    pub mismatches: usize,
    /// Correlation of the raw bits before any flip, `None` when undefined
    pub raw_correlation: Option<f64>,
    /// Bob's bits were complemented to undo a polarity inversion
    pub polarity_flipped: bool,
}

impl Reconciliation {
    /// Length of the vectors before reconciliation
    pub fn input_len(&self) -> usize {
        self.alice.len() + self.mismatches
    }

    pub fn mismatch_rate(&self) -> f64 {
        let total = self.input_len();
        if total == 0 {
            0.0
        } else {
            self.mismatches as f64 / total as f64
        }
    }
}

/// 1 where the sample is strictly positive, 0 otherwise
pub fn quantize(signal: &Signal) -> BitVector {
    BitVector(
        signal
            .samples()
            .iter()
            .map(|&v| u8::from(v > 0.0))
            .collect(),
    )
}

/// Align polarity and drop every position where the two vectors disagree.
///
/// Bob's bits are complemented first when the raw correlation is negative.
/// The same index set is removed from both vectors, so the outputs are
/// always equal. No agreeing positions yields two empty vectors.
///
/// # Panics
/// If the inputs differ in length.
pub fn reconcile(alice: &BitVector, bob: &BitVector) -> Reconciliation {
    assert_eq!(
        alice.len(),
        bob.len(),
        "reconcile requires equal-length bit vectors"
    );

    let raw_correlation = stats::bit_correlation(alice.bits(), bob.bits());
    let polarity_flipped = matches!(raw_correlation, Some(c) if c < 0.0);
    let bob_aligned = if polarity_flipped {
        bob.complement()
    } else {
        bob.clone()
    };

    let kept: Vec<u8> = alice
        .bits()
        .iter()
        .zip(bob_aligned.bits())
        .filter(|(a, b)| a == b)
        .map(|(&a, _)| a)
        .collect();
    let mismatches = alice.len() - kept.len();

    info!(
        kept = kept.len(),
        mismatches,
        polarity_flipped,
        "reconciled bit strings"
    );

    Reconciliation {
        alice: BitVector(kept.clone()),
        bob: BitVector(kept),
        mismatches,
        raw_correlation,
        polarity_flipped,
    }
}
