//! Delivery completion: collecting proof before a stop may settle.
//!
//! One workflow exists per completion attempt:
//!
//! ```text
//! collecting_proof ──validate/fail──▶ validated ──settle──▶ completed | failed
//!        ▲                                │
//!        └───────────reject───────────────┘   (backend did not acknowledge)
//! ```
//!
//! `validated` means the proof passed local checks and is awaiting the
//! backend. The stop itself does not change until [`DeliveryCompletionWorkflow::settle`].

use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{CompletionOutcome, CompletionRequest};
use crate::config::{CashPolicy, CompletionConfig};
use crate::model::{DeliveryProof, ProofField, Stop, StopStatus};
use crate::session::{Result, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPhase {
    CollectingProof,
    Validated,
    Completed,
    Failed,
}

/// How collected cash compares to what the stop expected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashReconciliation {
    pub expected: f64,
    pub collected: f64,
    /// `collected - expected`; negative for a short payment.
    pub discrepancy: f64,
    /// Set when the discrepancy exceeds the tolerance and policy asks for review.
    pub flagged: bool,
}

#[derive(Debug, Clone)]
pub struct DeliveryCompletionWorkflow {
    stop_id: Uuid,
    prior_status: StopStatus,
    requires_signature: bool,
    expected_cash: Option<f64>,
    phase: CompletionPhase,
    pending: Option<CompletionRequest>,
    proof: Option<DeliveryProof>,
    reconciliation: Option<CashReconciliation>,
    config: CompletionConfig,
}

impl DeliveryCompletionWorkflow {
    /// Open a workflow for `stop`, remembering its current status for cancellation.
    pub fn begin(stop: &Stop, config: CompletionConfig) -> Result<Self> {
        if !matches!(stop.status, StopStatus::EnRoute | StopStatus::Arrived) {
            return Err(SessionError::InvalidTransition(format!(
                "cannot complete a {} stop",
                stop.status.as_str()
            )));
        }
        debug!(stop = %stop.id, "completion started");
        Ok(Self {
            stop_id: stop.id,
            prior_status: stop.status.clone(),
            requires_signature: stop.requires_signature,
            expected_cash: stop.cash_on_delivery,
            phase: CompletionPhase::CollectingProof,
            pending: None,
            proof: None,
            reconciliation: None,
            config,
        })
    }

    pub fn stop_id(&self) -> Uuid {
        self.stop_id
    }

    pub fn phase(&self) -> CompletionPhase {
        self.phase
    }

    /// The stop's status when the workflow began.
    pub fn prior_status(&self) -> &StopStatus {
        &self.prior_status
    }

    /// Proof captured so far, until the workflow settles.
    pub fn proof(&self) -> Option<&DeliveryProof> {
        self.proof.as_ref()
    }

    pub fn reconciliation(&self) -> Option<CashReconciliation> {
        self.reconciliation
    }

    /// Check `proof` against what the stop requires.
    ///
    /// On success the workflow moves to `validated` and returns the request to
    /// send. On failure it stays in `collecting_proof`.
    pub fn validate(&mut self, proof: DeliveryProof) -> Result<CompletionRequest> {
        self.require_phase(CompletionPhase::CollectingProof)?;
        self.discard_pending();

        if self.requires_signature && !proof.has_signature() {
            return Err(SessionError::MissingProof(ProofField::Signature));
        }
        let reconciliation = match (self.expected_cash, proof.cash_collected) {
            (Some(_), None) => return Err(SessionError::MissingProof(ProofField::CashAmount)),
            (_, Some(collected)) if !collected.is_finite() || collected < 0.0 => {
                return Err(SessionError::InvalidCashAmount);
            }
            (Some(expected), Some(collected)) => Some(self.reconcile(expected, collected)),
            (None, _) => None,
        };

        let request = CompletionRequest::completed(self.stop_id, &proof);
        self.reconciliation = reconciliation;
        self.proof = Some(proof);
        self.pending = Some(request.clone());
        self.phase = CompletionPhase::Validated;
        Ok(request)
    }

    /// Report the delivery as failed. `reason` is mandatory.
    pub fn fail(&mut self, reason: &str) -> Result<CompletionRequest> {
        self.require_phase(CompletionPhase::CollectingProof)?;
        self.discard_pending();
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SessionError::MissingReason);
        }

        let request = CompletionRequest::failed(self.stop_id, reason);
        self.pending = Some(request.clone());
        self.phase = CompletionPhase::Validated;
        Ok(request)
    }

    /// The backend did not acknowledge: back to `collecting_proof`.
    ///
    /// The last request is kept so the driver can retry without re-capturing proof.
    pub fn reject(&mut self) {
        if self.phase == CompletionPhase::Validated {
            warn!(stop = %self.stop_id, "completion not acknowledged; awaiting retry");
            self.phase = CompletionPhase::CollectingProof;
        }
    }

    /// The request to resend after a rejection.
    pub fn retry_request(&mut self) -> Result<CompletionRequest> {
        self.require_phase(CompletionPhase::CollectingProof)?;
        let request = self
            .pending
            .clone()
            .ok_or(SessionError::NoCompletionInProgress)?;
        self.phase = CompletionPhase::Validated;
        Ok(request)
    }

    /// The backend acknowledged: move to the terminal phase and return the
    /// stop status to apply. Captured proof is discarded.
    pub fn settle(&mut self) -> Result<StopStatus> {
        self.require_phase(CompletionPhase::Validated)?;
        let request = self
            .pending
            .take()
            .ok_or(SessionError::NoCompletionInProgress)?;
        self.proof = None;

        let status = match request.outcome {
            CompletionOutcome::Completed => {
                self.phase = CompletionPhase::Completed;
                StopStatus::Completed
            }
            CompletionOutcome::Failed => {
                self.phase = CompletionPhase::Failed;
                StopStatus::Failed {
                    reason: request.failure_reason.unwrap_or_default(),
                }
            }
        };
        debug!(stop = %self.stop_id, status = status.as_str(), "completion settled");
        Ok(status)
    }

    /// A new attempt supersedes whatever an earlier, unacknowledged one sent.
    fn discard_pending(&mut self) {
        self.pending = None;
        self.reconciliation = None;
    }

    fn reconcile(&self, expected: f64, collected: f64) -> CashReconciliation {
        let discrepancy = collected - expected;
        let mismatch = discrepancy.abs() > self.config.cash_tolerance;
        if mismatch {
            warn!(stop = %self.stop_id, expected, collected, "cash mismatch recorded");
        }
        CashReconciliation {
            expected,
            collected,
            discrepancy,
            flagged: mismatch && self.config.cash_policy == CashPolicy::FlagForReview,
        }
    }

    fn require_phase(&self, phase: CompletionPhase) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition(format!(
                "completion is {:?}, expected {phase:?}",
                self.phase
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::sample_route;

    fn stop(requires_signature: bool, cash: Option<f64>) -> Stop {
        let mut stop = sample_route(1).stops.remove(0);
        stop.status = StopStatus::EnRoute;
        stop.requires_signature = requires_signature;
        stop.cash_on_delivery = cash;
        stop
    }

    fn signed() -> DeliveryProof {
        DeliveryProof {
            signature: Some(b"sig".to_vec()),
            ..Default::default()
        }
    }

    #[test]
    fn cannot_begin_on_pending_or_terminal_stop() {
        let mut s = stop(false, None);
        s.status = StopStatus::Pending;
        assert!(DeliveryCompletionWorkflow::begin(&s, CompletionConfig::default()).is_err());

        s.status = StopStatus::Completed;
        assert!(DeliveryCompletionWorkflow::begin(&s, CompletionConfig::default()).is_err());
    }

    #[test]
    fn missing_signature_stays_collecting() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(true, None), CompletionConfig::default())
                .unwrap();
        let err = wf
            .validate(DeliveryProof {
                cash_collected: Some(100.0),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, SessionError::MissingProof(ProofField::Signature)));
        assert_eq!(wf.phase(), CompletionPhase::CollectingProof);
    }

    #[test]
    fn empty_signature_counts_as_missing() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(true, None), CompletionConfig::default())
                .unwrap();
        let err = wf
            .validate(DeliveryProof {
                signature: Some(Vec::new()),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, SessionError::MissingProof(ProofField::Signature)));
    }

    #[test]
    fn cash_stop_requires_amount() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(false, Some(40.0)), CompletionConfig::default())
                .unwrap();
        let err = wf.validate(DeliveryProof::default()).unwrap_err();

        assert!(matches!(err, SessionError::MissingProof(ProofField::CashAmount)));
    }

    #[test]
    fn negative_cash_is_rejected() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(false, Some(40.0)), CompletionConfig::default())
                .unwrap();
        let err = wf
            .validate(DeliveryProof {
                cash_collected: Some(-1.0),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, SessionError::InvalidCashAmount));
    }

    #[test]
    fn short_payment_is_recorded_and_flagged() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(false, Some(40.0)), CompletionConfig::default())
                .unwrap();
        wf.validate(DeliveryProof {
            cash_collected: Some(30.0),
            ..Default::default()
        })
        .unwrap();

        let rec = wf.reconciliation().unwrap();
        assert!((rec.discrepancy + 10.0).abs() < f64::EPSILON);
        assert!(rec.flagged);
        assert_eq!(wf.phase(), CompletionPhase::Validated);
    }

    #[test]
    fn accept_policy_records_without_flagging() {
        let config = CompletionConfig {
            cash_policy: CashPolicy::Accept,
            ..Default::default()
        };
        let mut wf = DeliveryCompletionWorkflow::begin(&stop(false, Some(40.0)), config).unwrap();
        wf.validate(DeliveryProof {
            cash_collected: Some(30.0),
            ..Default::default()
        })
        .unwrap();

        assert!(!wf.reconciliation().unwrap().flagged);
    }

    #[test]
    fn exact_payment_within_tolerance_is_not_flagged() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(false, Some(40.0)), CompletionConfig::default())
                .unwrap();
        wf.validate(DeliveryProof {
            cash_collected: Some(40.005),
            ..Default::default()
        })
        .unwrap();

        assert!(!wf.reconciliation().unwrap().flagged);
    }

    #[test]
    fn reject_then_retry_resends_same_request() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(true, None), CompletionConfig::default())
                .unwrap();
        let first = wf.validate(signed()).unwrap();

        wf.reject();
        assert_eq!(wf.phase(), CompletionPhase::CollectingProof);

        let retry = wf.retry_request().unwrap();
        assert_eq!(retry, first);
        assert_eq!(wf.phase(), CompletionPhase::Validated);
    }

    #[test]
    fn new_attempt_replaces_unacknowledged_request() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(true, None), CompletionConfig::default())
                .unwrap();
        wf.validate(signed()).unwrap();
        wf.reject();

        let err = wf.validate(DeliveryProof::default()).unwrap_err();
        assert!(matches!(err, SessionError::MissingProof(ProofField::Signature)));
        assert!(matches!(
            wf.retry_request(),
            Err(SessionError::NoCompletionInProgress)
        ));
        assert_eq!(wf.phase(), CompletionPhase::CollectingProof);

        let request = wf.fail("Nobody home").unwrap();
        assert_eq!(request.outcome, CompletionOutcome::Failed);
    }

    #[test]
    fn settle_completed() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(true, None), CompletionConfig::default())
                .unwrap();
        wf.validate(signed()).unwrap();

        assert_eq!(wf.settle().unwrap(), StopStatus::Completed);
        assert_eq!(wf.phase(), CompletionPhase::Completed);
        assert!(wf.settle().is_err());
    }

    #[test]
    fn fail_requires_reason_and_settles_failed() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(true, None), CompletionConfig::default())
                .unwrap();
        assert!(matches!(wf.fail(""), Err(SessionError::MissingReason)));

        let request = wf.fail("Refused by customer").unwrap();
        assert_eq!(request.outcome, CompletionOutcome::Failed);
        assert_eq!(
            wf.settle().unwrap(),
            StopStatus::Failed {
                reason: "Refused by customer".into()
            }
        );
        assert_eq!(wf.phase(), CompletionPhase::Failed);
    }

    #[test]
    fn settle_before_validation_fails() {
        let mut wf =
            DeliveryCompletionWorkflow::begin(&stop(false, None), CompletionConfig::default())
                .unwrap();
        assert!(wf.settle().is_err());
    }
}
