//! The route/delivery backend.
//!
//! The session issues these calls and only interprets success or failure plus
//! the minimal acknowledgement payload. Retry and backoff belong to the caller.

mod http;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::model::{DeliveryProof, OnlineStatus, Route};

pub use http::HttpBackend;

/// Errors that can occur talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("acknowledgement for stop {got} does not match request for stop {expected}")]
    Mismatch { expected: Uuid, got: Uuid },

    #[error("stop {stop_id} acknowledged as {got:?}, but {expected:?} was requested")]
    OutcomeMismatch {
        stop_id: Uuid,
        expected: CompletionOutcome,
        got: CompletionOutcome,
    },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = core::result::Result<T, BackendError>;

/// The remote side of dispatch.
pub trait DispatchBackend {
    /// Routes currently assigned to the driver.
    fn fetch_assigned_routes(&mut self, driver_id: Uuid) -> Result<Vec<Route>>;

    /// Record a stop's completion or failure.
    fn confirm_stop(&mut self, request: &CompletionRequest) -> Result<StopAck>;

    /// Report an online/offline toggle.
    fn set_online(&mut self, driver_id: Uuid, status: OnlineStatus) -> Result<()>;
}

/// How a stop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    Completed,
    Failed,
}

/// Body of `POST /stops/{id}/completion`.
///
/// Blobs never leave the device through this payload; a signature is
/// represented by its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub stop_id: Uuid,
    pub outcome: CompletionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_sha256: Option<String>,
    pub has_photo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_collected: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl CompletionRequest {
    pub fn completed(stop_id: Uuid, proof: &DeliveryProof) -> Self {
        Self {
            stop_id,
            outcome: CompletionOutcome::Completed,
            signature_sha256: proof
                .signature
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(fingerprint),
            has_photo: proof.has_photo(),
            cash_collected: proof.cash_collected,
            failure_reason: None,
        }
    }

    pub fn failed(stop_id: Uuid, reason: &str) -> Self {
        Self {
            stop_id,
            outcome: CompletionOutcome::Failed,
            signature_sha256: None,
            has_photo: false,
            cash_collected: None,
            failure_reason: Some(reason.to_string()),
        }
    }
}

/// The backend's acknowledgement of a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopAck {
    pub stop_id: Uuid,
    pub new_status: CompletionOutcome,
}

impl StopAck {
    /// Accept the acknowledgement only if it is for `request`'s stop and outcome.
    pub fn verify(self, request: &CompletionRequest) -> Result<Self> {
        if self.stop_id != request.stop_id {
            return Err(BackendError::Mismatch {
                expected: request.stop_id,
                got: self.stop_id,
            });
        }
        if self.new_status != request.outcome {
            return Err(BackendError::OutcomeMismatch {
                stop_id: self.stop_id,
                expected: request.outcome,
                got: self.new_status,
            });
        }
        Ok(self)
    }
}

/// Hex-encoded SHA-256 of a proof blob.
pub fn fingerprint(blob: &[u8]) -> String {
    hex::encode(Sha256::digest(blob))
}
