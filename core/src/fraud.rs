//! Fraud and eligibility rules.
//!
//! `evaluate` is a pure function of the verification result, the
//! recent transaction window, the current time, and the policy
//! thresholds. It performs no I/O and reads no clocks, so every rule
//! is testable in isolation.
//!
//! Rules run in fixed priority order. A rule that clears
//! `passes_all_rules` terminates evaluation immediately; rules that
//! only escalate (require approval, raise severity) continue so later
//! hard rules still get their say.

use crate::hardware::VerificationResult;
use crate::transaction::{TransactionRecord, TransactionStatus};
use crate::types::EpochSecs;
use serde::{Deserialize, Serialize};

// ── Constants ───────────────────────────────────────────────────────────────

/// Window for the double-serving rule.
pub const DOUBLE_SERVE_WINDOW_SECS: u64 = 6 * 3600;
/// Window for the rapid-failed-attempts rule.
pub const RAPID_ATTEMPT_WINDOW_SECS: u64 = 600;
/// Denied attempts within the window that trigger escalation.
pub const RAPID_ATTEMPT_LIMIT: usize = 3;

/// The only meal-plan value that passes the plan rule.
pub const MEAL_PLAN_ACTIVE: &str = "active";

// ── Types ───────────────────────────────────────────────────────────────────

/// Ordinal fraud-risk level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Warning,
    Critical,
}

/// Stable identifiers for the audit trail, in rule priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FraudRule {
    DoubleServing,
    LowConfidenceDeny,
    LowConfidenceReview,
    InsufficientBalance,
    LowBalanceReview,
    RapidAttempts,
    MealPlanInactive,
    AlreadyServedToday,
    NotEligible,
}

/// Thresholds `evaluate` runs against. Mirrors
/// [`crate::config::FraudPolicy`]; redeclared here as a borrowed view
/// so the engine does not depend on the config module.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub deny_below: f64,
    pub review_below: f64,
    pub meal_cost: f64,
}

impl From<&crate::config::FraudPolicy> for Thresholds {
    fn from(policy: &crate::config::FraudPolicy) -> Self {
        Self {
            deny_below: policy.deny_below,
            review_below: policy.review_below,
            meal_cost: policy.meal_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FraudDecision {
    pub passes_all_rules: bool,
    pub requires_approval: bool,
    pub severity: Severity,
    pub alert_reason: String,
    /// Every rule that fired, in evaluation order.
    pub triggered: Vec<FraudRule>,
}

impl FraudDecision {
    pub fn clean() -> Self {
        Self {
            passes_all_rules: true,
            requires_approval: false,
            severity: Severity::None,
            alert_reason: String::new(),
            triggered: Vec::new(),
        }
    }

    fn fail(&mut self, rule: FraudRule, reason: impl Into<String>) {
        self.passes_all_rules = false;
        self.escalate(rule, Severity::Critical, reason);
    }

    fn escalate(&mut self, rule: FraudRule, severity: Severity, reason: impl Into<String>) {
        self.severity = self.severity.max(severity);
        self.alert_reason = reason.into();
        self.triggered.push(rule);
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// Evaluate all fraud rules for one verification against the recent
/// transaction window (caller supplies the last 6 h from the store).
pub fn evaluate(
    verification: &VerificationResult,
    recent: &[TransactionRecord],
    now_secs: EpochSecs,
    thresholds: &Thresholds,
) -> FraudDecision {
    let mut decision = FraudDecision::clean();

    // Rule 1: double-serving — an approved meal for this student in
    // the last 6 hours.
    let double_serve_cutoff = now_secs.saturating_sub(DOUBLE_SERVE_WINDOW_SECS);
    let served = recent.iter().any(|txn| {
        txn.student_id == verification.student_id
            && txn.status == TransactionStatus::Approved
            && txn.timestamp >= double_serve_cutoff
    });
    if served {
        decision.fail(
            FraudRule::DoubleServing,
            "Already served today (double-serving detected)",
        );
        log::warn!(
            "Fraud: double-serving detected for {}",
            verification.student_id
        );
        return decision;
    }

    // Rule 2: face confidence floor.
    if verification.confidence < thresholds.deny_below {
        decision.fail(
            FraudRule::LowConfidenceDeny,
            format!("Face match too weak ({:.2})", verification.confidence),
        );
        log::warn!(
            "Fraud: confidence {:.2} below deny floor for {}",
            verification.confidence,
            verification.student_id
        );
        return decision;
    }
    if verification.confidence < thresholds.review_below {
        decision.requires_approval = true;
        decision.escalate(
            FraudRule::LowConfidenceReview,
            Severity::Warning,
            format!("Low face confidence ({:.2})", verification.confidence),
        );
    }

    // Rule 3: balance.
    if verification.balance <= 0.0 {
        decision.fail(FraudRule::InsufficientBalance, "Insufficient balance");
        log::warn!(
            "Fraud: insufficient balance for {}",
            verification.student_id
        );
        return decision;
    }
    if verification.balance < thresholds.meal_cost {
        decision.requires_approval = true;
        decision.escalate(
            FraudRule::LowBalanceReview,
            Severity::Warning,
            format!("Balance below meal cost ({:.2})", verification.balance),
        );
    }

    // Rule 4: rapid failed attempts — 3+ denials in 10 minutes routes
    // to the operator instead of another silent deny. This is the one
    // Critical that continues: the attempt itself may still be clean,
    // but a human has to look at the pattern.
    let attempt_cutoff = now_secs.saturating_sub(RAPID_ATTEMPT_WINDOW_SECS);
    let failed_attempts = recent
        .iter()
        .filter(|txn| {
            txn.student_id == verification.student_id
                && txn.status == TransactionStatus::Denied
                && txn.timestamp >= attempt_cutoff
        })
        .count();
    if failed_attempts >= RAPID_ATTEMPT_LIMIT {
        decision.requires_approval = true;
        decision.escalate(
            FraudRule::RapidAttempts,
            Severity::Critical,
            "Multiple failed attempts - manager review required",
        );
        log::warn!(
            "Fraud: {failed_attempts} failed attempts in window for {}",
            verification.student_id
        );
    }

    // Rule 5: meal plan status.
    if verification.meal_plan != MEAL_PLAN_ACTIVE {
        decision.fail(FraudRule::MealPlanInactive, "Meal plan not active");
        return decision;
    }

    // Rule 6: backend already-served flag.
    if verification.already_served_today {
        decision.fail(FraudRule::AlreadyServedToday, "Already served today");
        return decision;
    }

    // Rule 7: backend eligibility flag.
    if !verification.eligible {
        decision.fail(FraudRule::NotEligible, "Student not eligible");
        return decision;
    }

    decision
}
