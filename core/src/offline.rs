//! Degraded verification for when the backend is unreachable.
//!
//! Policy: a disconnected kiosk never auto-approves. The synthesized
//! result always carries `approval_required = true`, so every offline
//! attempt ends in front of the operator — the only automatic outcome
//! offline is a deny, when the local cache proves a double-serve.

use crate::fraud::{FraudDecision, FraudRule, Severity, DOUBLE_SERVE_WINDOW_SECS};
use crate::hardware::VerificationResult;
use crate::store::TransactionStore;
use crate::types::EpochSecs;

pub const OFFLINE_REASON: &str = "Offline mode - limited verification";

/// Synthesize the placeholder result used in place of the remote
/// oracle. Identity is unknown offline, so the card UID stands in for
/// the student id and the confidence is zero.
pub fn degraded_result(uid: &str) -> VerificationResult {
    VerificationResult {
        success: true,
        student_id: uid.to_string(),
        student_name: "Unknown (offline)".to_string(),
        confidence: 0.0,
        eligible: true,
        balance: 0.0,
        meal_plan: String::new(),
        already_served_today: false,
        approval_required: true,
        reason: OFFLINE_REASON.to_string(),
    }
}

/// Offline stand-in for the fraud engine. Only the card UID is known,
/// so the check runs against `rfid_uid` instead of the student id.
pub fn check_eligibility(
    store: &TransactionStore,
    uid: &str,
    now_secs: EpochSecs,
) -> FraudDecision {
    let recent = store.recent(DOUBLE_SERVE_WINDOW_SECS, now_secs);

    let served = recent.iter().any(|txn| {
        txn.rfid_uid == uid && txn.status.is_auto_approved()
    });
    if served {
        return FraudDecision {
            passes_all_rules: false,
            requires_approval: false,
            severity: Severity::Critical,
            alert_reason: "Already served today (offline check)".to_string(),
            triggered: vec![FraudRule::DoubleServing],
        };
    }

    let alert_reason = if recent.is_empty() {
        "No local data - manager approval required".to_string()
    } else {
        "Offline mode - manager approval required".to_string()
    };

    FraudDecision {
        passes_all_rules: true,
        requires_approval: true,
        severity: Severity::Warning,
        alert_reason,
        triggered: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TransactionRecord, TransactionStatus};

    fn record(uid: &str, status: TransactionStatus, timestamp: EpochSecs) -> TransactionRecord {
        TransactionRecord {
            id: String::new(),
            timestamp,
            student_id: "S1".into(),
            student_name: "Test".into(),
            rfid_uid: uid.into(),
            status,
            balance_before: 10.0,
            balance_after: 5.0,
            reason: String::new(),
            fraud_alert: false,
            face_confidence: 0.9,
            synced: false,
            offline_mode: false,
        }
    }

    #[test]
    fn empty_cache_escalates_instead_of_denying() {
        let store = TransactionStore::new();
        let decision = check_eligibility(&store, "04:AA", 50_000);
        assert!(decision.passes_all_rules);
        assert!(decision.requires_approval);
        assert_eq!(decision.severity, Severity::Warning);
    }

    #[test]
    fn recent_approval_for_same_card_denies() {
        let mut store = TransactionStore::new();
        store.append(record("04:AA", TransactionStatus::Approved, 49_000));
        let decision = check_eligibility(&store, "04:AA", 50_000);
        assert!(!decision.passes_all_rules);
        assert_eq!(decision.severity, Severity::Critical);
        assert_eq!(decision.triggered, vec![FraudRule::DoubleServing]);
    }

    #[test]
    fn other_cards_still_escalate_not_deny() {
        let mut store = TransactionStore::new();
        store.append(record("04:AA", TransactionStatus::Approved, 49_000));
        let decision = check_eligibility(&store, "04:BB", 50_000);
        assert!(decision.passes_all_rules);
        assert!(decision.requires_approval);
    }

    #[test]
    fn denied_history_does_not_count_as_served() {
        let mut store = TransactionStore::new();
        store.append(record("04:AA", TransactionStatus::Denied, 49_500));
        let decision = check_eligibility(&store, "04:AA", 50_000);
        assert!(decision.passes_all_rules);
        assert!(decision.requires_approval);
    }

    #[test]
    fn degraded_result_always_requires_approval() {
        let result = degraded_result("04:CC");
        assert!(result.approval_required);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.student_id, "04:CC");
    }
}
