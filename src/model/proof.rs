//! Delivery proof captured while completing a stop.

use std::fmt;

/// Evidence gathered for one completion attempt.
///
/// Lives only as long as the completion workflow that collects it and is
/// never persisted locally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryProof {
    pub signature: Option<Vec<u8>>,
    pub photo: Option<Vec<u8>>,
    pub cash_collected: Option<f64>,
    pub failure_reason: Option<String>,
}

impl DeliveryProof {
    pub fn has_signature(&self) -> bool {
        self.signature.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_photo(&self) -> bool {
        self.photo.as_ref().is_some_and(|p| !p.is_empty())
    }
}

/// A piece of proof that a stop may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofField {
    Signature,
    CashAmount,
}

impl fmt::Display for ProofField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signature => f.write_str("signature"),
            Self::CashAmount => f.write_str("cash amount"),
        }
    }
}
