//! Transaction records — the audit trail of every authorization attempt.
//!
//! RULE: exactly one record per completed attempt, success or failure.
//! A record is never mutated after creation except to flip `synced`
//! from false to true.

use crate::types::{CardUid, EpochSecs, StudentId};
use serde::{Deserialize, Serialize};

/// Outcome of an authorization attempt. Closed set — the backend wire
/// strings are the snake_case renderings ("approved", "denied",
/// "manual_approved", "override").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Approved,
    Denied,
    ManualApproved,
    Override,
}

impl TransactionStatus {
    /// Whether this outcome handed out a meal. Only `Approved` counts
    /// toward the double-serving rule; manual outcomes are operator
    /// judgment calls and are audited separately.
    pub fn is_auto_approved(&self) -> bool {
        matches!(self, TransactionStatus::Approved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    /// Assigned by the store on append when empty.
    #[serde(default)]
    pub id: String,
    pub timestamp: EpochSecs,
    pub student_id: StudentId,
    pub student_name: String,
    pub rfid_uid: CardUid,
    pub status: TransactionStatus,
    pub balance_before: f64,
    pub balance_after: f64,
    pub reason: String,
    pub fraud_alert: bool,
    pub face_confidence: f64,
    pub synced: bool,
    pub offline_mode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_to_wire_strings() {
        assert_eq!(
            serde_json::to_string(&TransactionStatus::ManualApproved).unwrap(),
            "\"manual_approved\""
        );
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Override).unwrap(),
            "\"override\""
        );
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = TransactionRecord {
            id: "t-1".into(),
            timestamp: 1_000,
            student_id: "S100".into(),
            student_name: "Dana Cole".into(),
            rfid_uid: "04:A3:7F".into(),
            status: TransactionStatus::Denied,
            balance_before: 3.0,
            balance_after: -2.0,
            reason: "Insufficient balance".into(),
            fraud_alert: true,
            face_confidence: 0.91,
            synced: false,
            offline_mode: false,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: TransactionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
