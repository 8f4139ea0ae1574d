//! Peripheral and backend contracts.
//!
//! RULE: the core never touches a driver or a socket. Hosts implement
//! these traits over the real RFID reader, camera, OLED, keypad, PIR
//! sensor, and HTTP client; tests and the simulator implement them in
//! memory. All polls are non-blocking — the controller consumes their
//! return values each tick instead of registering callbacks.

use crate::transaction::TransactionRecord;
use crate::types::{CardUid, EncodedImage, StudentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Verification ────────────────────────────────────────────────────────────

/// Outcome of the remote identity check, one per attempt. Immutable
/// once produced; owned by the in-flight session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationResult {
    pub success: bool,
    pub student_id: StudentId,
    pub student_name: String,
    /// Face-match confidence in [0.0, 1.0].
    pub confidence: f64,
    pub eligible: bool,
    pub balance: f64,
    /// "active" is the only live value; anything else fails the plan rule.
    pub meal_plan: String,
    pub already_served_today: bool,
    pub approval_required: bool,
    pub reason: String,
}

// ── Faults ──────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("backend unreachable")]
    Unreachable,

    #[error("request timed out")]
    Timeout,

    #[error("backend rejected request: {0}")]
    Remote(String),

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Only timeouts and unreachability are safe to retry without an
    /// operator looking at the device.
    pub fn retryable(&self) -> bool {
        matches!(self, ApiError::Timeout | ApiError::Unreachable)
    }
}

// ── Peripherals ─────────────────────────────────────────────────────────────

pub trait MotionSensor {
    fn detected(&mut self) -> bool;
}

pub trait CardReader {
    /// One non-blocking poll: a card in the field yields its UID.
    fn detect_and_read(&mut self) -> Option<CardUid>;
}

pub trait Camera {
    /// One non-blocking poll: a ready frame yields the encoded image.
    /// An empty image means the frame was grabbed but encoding failed.
    fn capture(&mut self) -> Option<EncodedImage>;

    /// Release the frame buffer after the image has been consumed.
    fn release(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKey {
    Approve,
    Deny,
    Override,
}

pub trait OperatorPanel {
    fn poll_key(&mut self) -> Option<OperatorKey>;
}

/// Fire-and-forget display sink. The core never reads anything back.
pub trait Display {
    fn show_status(&mut self, line: &str, balance: &str, ok: bool);
    fn show_waiting(&mut self, message: &str);
    fn show_error(&mut self, message: &str);
    fn show_escalation(&mut self, name: &str, id: &str, reason: &str, remaining_secs: u64);
}

// ── Backend ─────────────────────────────────────────────────────────────────

/// The remote verification oracle and transaction log. `verify` must
/// return within a few seconds or report `Timeout`/`Unreachable` —
/// the controller has no way to cancel it mid-state.
pub trait Backend {
    fn is_connected(&mut self) -> bool;

    fn verify(&mut self, uid: &str, image: &[u8]) -> Result<VerificationResult, ApiError>;

    fn log_transaction(&mut self, record: &TransactionRecord) -> Result<(), ApiError>;

    /// Upload a batch of offline records. Returns how many the server
    /// accepted; anything short of the full batch is treated as a
    /// failure by the resync layer.
    fn sync_batch(&mut self, records: &[TransactionRecord]) -> Result<usize, ApiError>;
}
