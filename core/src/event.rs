//! Observability events emitted by the controller.
//!
//! Each `tick()` returns the events describing what that step did.
//! The host decides what to do with them (log, ship, drop); the core
//! attaches no meaning to them after emission.

use crate::controller::KioskState;
use crate::escalation::OperatorDecision;
use crate::fraud::{FraudRule, Severity};
use crate::transaction::TransactionStatus;
use crate::types::{CardUid, StudentId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KioskEvent {
    StateChanged {
        from: KioskState,
        to: KioskState,
    },
    CardPresented {
        uid: CardUid,
    },
    FaceCaptured {
        bytes: usize,
    },
    VerificationSucceeded {
        student_id: StudentId,
        confidence: f64,
    },
    VerificationFailed {
        reason: String,
    },
    /// Backend unreachable; the attempt continues on local data.
    OfflineFallback {
        uid: CardUid,
    },
    FraudAlert {
        severity: Severity,
        rules: Vec<FraudRule>,
        reason: String,
    },
    EscalationResolved {
        decision: OperatorDecision,
    },
    TransactionRecorded {
        id: String,
        status: TransactionStatus,
        offline: bool,
    },
    SyncCompleted {
        uploaded: usize,
    },
    /// A sync attempt ran and did not fully succeed; queue retained.
    SyncDeferred {
        queued: usize,
    },
    FaultRaised {
        message: String,
        retryable: bool,
    },
    LowPowerChanged {
        low_power: bool,
    },
}
