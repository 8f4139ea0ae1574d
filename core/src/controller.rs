//! The session controller — the kiosk's end-to-end state machine.
//!
//! EXECUTION MODEL (fixed, documented):
//!   - An external cooperative scheduler calls `tick()` at 20–50 Hz.
//!   - Each tick polls motion, runs the periodic resync check, then
//!     advances exactly one state-machine step.
//!   - "Wait 2 s" style cooldowns are cooperative: the controller
//!     stores a deadline plus the next state and returns; ticks in
//!     between are no-ops.
//!   - `ManagerApprovalWait` is the single state allowed to hold the
//!     loop, bounded by the 60 s approval timeout. That block is
//!     deliberate: it is human-interaction latency, polled against an
//!     explicit deadline, never an indefinite wait.
//!
//! RULES:
//!   - Every completed attempt produces exactly one transaction
//!     record, on the deny path as much as on the approve path.
//!   - Card UID and face payload are cleared exactly when re-entering
//!     `WaitingForCard`, never at any other transition.
//!   - No fault may leave the controller outside the defined state
//!     set; unrecoverable faults park in `Error` with a recovery hint.

use crate::clock::{Clock, Pacer};
use crate::config::KioskConfig;
use crate::error::KioskResult;
use crate::escalation::{self, EscalationContext, OperatorDecision};
use crate::event::KioskEvent;
use crate::fraud::{self, FraudDecision, Severity, Thresholds, DOUBLE_SERVE_WINDOW_SECS};
use crate::hardware::{
    ApiError, Backend, Camera, CardReader, Display, MotionSensor, OperatorPanel,
    VerificationResult,
};
use crate::offline;
use crate::power::PowerManager;
use crate::resync::{ResyncCoordinator, SyncOutcome};
use crate::store::TransactionStore;
use crate::transaction::{TransactionRecord, TransactionStatus};
use crate::types::{CardUid, EncodedImage, Millis};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Timing constants ────────────────────────────────────────────────────────

/// Card-wait timeout before falling back to idle.
pub const CARD_WAIT_TIMEOUT_MS: u64 = 30_000;
/// How long the non-blocking camera may keep reporting "no frame yet"
/// before the capture counts as failed.
pub const FACE_CAPTURE_TIMEOUT_MS: u64 = 5_000;
/// Bounded operator wait in `ManagerApprovalWait`.
pub const APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);
/// Error-state dwell before automatic recovery to idle.
pub const ERROR_RECOVERY_MS: u64 = 10_000;
/// Cooldown after a capture failure, back to the card wait.
pub const CAPTURE_RETRY_MS: u64 = 2_000;
/// Cooldown after a verification failure, back to the card wait.
pub const VERIFY_RETRY_MS: u64 = 3_000;
/// How long an approval stays on screen.
pub const APPROVE_DISPLAY_MS: u64 = 2_000;
/// How long a denial stays on screen.
pub const DENY_DISPLAY_MS: u64 = 3_000;
/// Settle time after logging, before the next customer.
pub const LOG_SETTLE_MS: u64 = 2_000;

// ── State machine ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KioskState {
    Idle,
    WaitingForCard,
    CapturingFace,
    Verifying,
    Decision,
    ManagerApprovalWait,
    TransactionLog,
    Error,
}

/// The hardware handed to each tick. The controller never owns a
/// peripheral; the host does, and lends them here.
pub struct Peripherals<'a> {
    pub motion: &'a mut dyn MotionSensor,
    pub reader: &'a mut dyn CardReader,
    pub camera: &'a mut dyn Camera,
    pub panel: &'a mut dyn OperatorPanel,
    pub display: &'a mut dyn Display,
}

pub struct SessionController {
    config: KioskConfig,
    thresholds: Thresholds,
    store: TransactionStore,
    resync: ResyncCoordinator,
    power: PowerManager,

    state: KioskState,
    last_state_change: Millis,
    /// Cooperative cooldown: (deadline, state to enter when it passes).
    deferred: Option<(Millis, KioskState)>,

    // Per-attempt working state.
    uid: Option<CardUid>,
    face: Option<EncodedImage>,
    verification: Option<VerificationResult>,
    fraud: Option<FraudDecision>,
    pending_record: Option<TransactionRecord>,
    offline_attempt: bool,
    error_hint: String,
}

impl SessionController {
    pub fn new(config: KioskConfig, now_ms: Millis) -> Self {
        let thresholds = Thresholds::from(&config.fraud);
        let power = PowerManager::new(config.motion_timeout_secs, now_ms);
        Self {
            config,
            thresholds,
            store: TransactionStore::new(),
            resync: ResyncCoordinator::new(),
            power,
            state: KioskState::Idle,
            last_state_change: now_ms,
            deferred: None,
            uid: None,
            face: None,
            verification: None,
            fraud: None,
            pending_record: None,
            offline_attempt: false,
            error_hint: String::new(),
        }
    }

    pub fn current_state(&self) -> KioskState {
        self.state
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    pub fn resync_pending(&self) -> usize {
        self.resync.pending()
    }

    pub fn is_low_power(&self) -> bool {
        self.power.is_low_power()
    }

    /// Host-reported unrecoverable fault (peripheral init failure,
    /// watchdog trip). Parks the controller in `Error` with a hint for
    /// the operator.
    pub fn report_fault(&mut self, message: &str, hint: &str, now_ms: Millis) -> Vec<KioskEvent> {
        let mut events = Vec::new();
        self.raise_fault(message, hint, now_ms, &mut events);
        events
    }

    /// Advance the controller by one step.
    pub fn tick(
        &mut self,
        hw: &mut Peripherals<'_>,
        backend: &mut dyn Backend,
        clock: &dyn Clock,
        pacer: &dyn Pacer,
    ) -> KioskResult<Vec<KioskEvent>> {
        let now = clock.now_ms();
        let mut events = Vec::new();

        // Motion and power run every tick, regardless of state.
        let motion = hw.motion.detected();
        if self.power.on_tick(motion, now) {
            events.push(KioskEvent::LowPowerChanged {
                low_power: self.power.is_low_power(),
            });
        }
        if motion && self.state == KioskState::Idle && !self.power.is_low_power() {
            self.transition(KioskState::WaitingForCard, now, &mut events);
        }

        // Periodic resync, interleaved with whatever is in flight.
        match self.resync.maybe_sync(now, &mut self.store, backend) {
            Some(SyncOutcome::Completed { uploaded }) => {
                events.push(KioskEvent::SyncCompleted { uploaded });
            }
            Some(SyncOutcome::Deferred { queued }) => {
                events.push(KioskEvent::SyncDeferred { queued });
            }
            None => {}
        }

        // Cooperative cooldown: wait out the deadline, then move on.
        if let Some((until, next)) = self.deferred {
            if now < until {
                return Ok(events);
            }
            self.deferred = None;
            self.transition(next, now, &mut events);
            return Ok(events);
        }

        match self.state {
            KioskState::Idle => {} // motion handled above
            KioskState::WaitingForCard => self.state_waiting_for_card(hw, now, &mut events),
            KioskState::CapturingFace => self.state_capturing_face(hw, now, &mut events),
            KioskState::Verifying => self.state_verifying(hw, backend, now, &mut events),
            KioskState::Decision => self.state_decision(hw, now, &mut events),
            KioskState::ManagerApprovalWait => {
                self.state_manager_approval_wait(hw, clock, pacer, &mut events)
            }
            KioskState::TransactionLog => self.state_transaction_log(backend, now, &mut events),
            KioskState::Error => self.state_error(hw, motion, now, &mut events),
        }

        Ok(events)
    }

    // ── State handlers ──────────────────────────────────────────────

    fn state_waiting_for_card(
        &mut self,
        hw: &mut Peripherals<'_>,
        now: Millis,
        events: &mut Vec<KioskEvent>,
    ) {
        hw.display.show_waiting("Scan card");

        if let Some(uid) = hw.reader.detect_and_read() {
            if !uid.is_empty() {
                log::info!("RFID: card detected {uid}");
                self.power.note_activity(now);
                events.push(KioskEvent::CardPresented { uid: uid.clone() });
                self.uid = Some(uid);
                self.transition(KioskState::CapturingFace, now, events);
                return;
            }
        }

        if now.saturating_sub(self.last_state_change) >= CARD_WAIT_TIMEOUT_MS {
            self.transition(KioskState::Idle, now, events);
        }
    }

    fn state_capturing_face(
        &mut self,
        hw: &mut Peripherals<'_>,
        now: Millis,
        events: &mut Vec<KioskEvent>,
    ) {
        hw.display.show_waiting("Look at the camera");

        match hw.camera.capture() {
            Some(image) if !image.is_empty() => {
                hw.camera.release();
                log::info!("Camera: face captured ({} bytes)", image.len());
                events.push(KioskEvent::FaceCaptured { bytes: image.len() });
                self.face = Some(image);
                self.transition(KioskState::Verifying, now, events);
            }
            Some(_) => {
                // Frame grabbed but encoding produced nothing.
                hw.camera.release();
                log::error!("Camera: failed to encode image");
                events.push(KioskEvent::FaultRaised {
                    message: "face encode failed".to_string(),
                    retryable: true,
                });
                hw.display.show_error("Face capture failed");
                self.defer(CAPTURE_RETRY_MS, KioskState::WaitingForCard, now);
            }
            None => {
                if now.saturating_sub(self.last_state_change) >= FACE_CAPTURE_TIMEOUT_MS {
                    log::error!("Camera: no frame within capture window");
                    events.push(KioskEvent::FaultRaised {
                        message: "camera capture timed out".to_string(),
                        retryable: true,
                    });
                    hw.display.show_error("Camera error");
                    self.defer(CAPTURE_RETRY_MS, KioskState::WaitingForCard, now);
                }
            }
        }
    }

    fn state_verifying(
        &mut self,
        hw: &mut Peripherals<'_>,
        backend: &mut dyn Backend,
        now: Millis,
        events: &mut Vec<KioskEvent>,
    ) {
        hw.display.show_waiting("Verifying");

        let (uid, face) = match (self.uid.clone(), self.face.clone()) {
            (Some(uid), Some(face)) => (uid, face),
            _ => {
                self.raise_fault(
                    "verification entered without card or face",
                    "Restart the attempt at the card reader",
                    now,
                    events,
                );
                return;
            }
        };

        if !backend.is_connected() {
            self.verify_offline(hw, &uid, now, events);
            return;
        }

        match backend.verify(&uid, &face) {
            Ok(result) if result.success => {
                log::info!("Verification: success for {}", result.student_name);
                events.push(KioskEvent::VerificationSucceeded {
                    student_id: result.student_id.clone(),
                    confidence: result.confidence,
                });

                let window = self.store.recent(DOUBLE_SERVE_WINDOW_SECS, now / 1000);
                let decision = fraud::evaluate(&result, &window, now / 1000, &self.thresholds);
                if !decision.triggered.is_empty() {
                    events.push(KioskEvent::FraudAlert {
                        severity: decision.severity,
                        rules: decision.triggered.clone(),
                        reason: decision.alert_reason.clone(),
                    });
                }

                self.verification = Some(result);
                self.fraud = Some(decision);
                self.offline_attempt = false;
                self.transition(KioskState::Decision, now, events);
            }
            Ok(result) => {
                // Reachable, but the backend said no: bad read, unknown
                // card. Short cooldown, then try again.
                log::warn!("Verification: rejected - {}", result.reason);
                events.push(KioskEvent::VerificationFailed {
                    reason: result.reason.clone(),
                });
                hw.display
                    .show_error(&format!("Verification failed: {}", result.reason));
                self.defer(VERIFY_RETRY_MS, KioskState::WaitingForCard, now);
            }
            Err(ApiError::Unreachable) => {
                self.verify_offline(hw, &uid, now, events);
            }
            Err(e @ ApiError::Timeout) => {
                log::warn!("Verification: {e}");
                events.push(KioskEvent::FaultRaised {
                    message: e.to_string(),
                    retryable: true,
                });
                hw.display.show_error("Network timeout - try again");
                self.defer(VERIFY_RETRY_MS, KioskState::WaitingForCard, now);
            }
            Err(ApiError::Remote(reason)) => {
                log::warn!("Verification: backend error - {reason}");
                events.push(KioskEvent::VerificationFailed {
                    reason: reason.clone(),
                });
                hw.display.show_error(&format!("Verification failed: {reason}"));
                self.defer(VERIFY_RETRY_MS, KioskState::WaitingForCard, now);
            }
            Err(e @ ApiError::Malformed(_)) => {
                self.raise_fault(
                    &e.to_string(),
                    "Backend protocol mismatch - call support",
                    now,
                    events,
                );
            }
        }
    }

    /// Degraded path: no oracle, local data only, always escalated
    /// unless the cache proves a double-serve.
    fn verify_offline(
        &mut self,
        hw: &mut Peripherals<'_>,
        uid: &str,
        now: Millis,
        events: &mut Vec<KioskEvent>,
    ) {
        if !self.config.offline_mode_enabled {
            log::warn!("Verification: backend unreachable, offline mode disabled");
            events.push(KioskEvent::FaultRaised {
                message: "backend unreachable".to_string(),
                retryable: true,
            });
            hw.display.show_error("Network unavailable");
            self.defer(VERIFY_RETRY_MS, KioskState::WaitingForCard, now);
            return;
        }

        log::info!("Verification: offline fallback for {uid}");
        events.push(KioskEvent::OfflineFallback {
            uid: uid.to_string(),
        });

        let decision = offline::check_eligibility(&self.store, uid, now / 1000);
        if !decision.triggered.is_empty() {
            events.push(KioskEvent::FraudAlert {
                severity: decision.severity,
                rules: decision.triggered.clone(),
                reason: decision.alert_reason.clone(),
            });
        }

        self.verification = Some(offline::degraded_result(uid));
        self.fraud = Some(decision);
        self.offline_attempt = true;
        self.transition(KioskState::Decision, now, events);
    }

    fn state_decision(
        &mut self,
        hw: &mut Peripherals<'_>,
        now: Millis,
        events: &mut Vec<KioskEvent>,
    ) {
        let (passes, requires_approval, alert_reason, balance) = match (&self.verification, &self.fraud)
        {
            (Some(v), Some(f)) => (
                f.passes_all_rules,
                f.requires_approval || v.approval_required,
                f.alert_reason.clone(),
                v.balance,
            ),
            _ => {
                self.raise_fault(
                    "decision entered without verification context",
                    "Restart the attempt at the card reader",
                    now,
                    events,
                );
                return;
            }
        };

        if !passes {
            log::warn!("Decision: DENIED - {alert_reason}");
            self.stage_record(TransactionStatus::Denied, &alert_reason, now);
            hw.display.show_error(&alert_reason);
            self.defer(DENY_DISPLAY_MS, KioskState::TransactionLog, now);
            return;
        }

        if requires_approval {
            self.transition(KioskState::ManagerApprovalWait, now, events);
            return;
        }

        log::info!("Decision: AUTO-APPROVED");
        self.stage_record(
            TransactionStatus::Approved,
            "Auto-approved - matched credentials",
            now,
        );
        hw.display
            .show_status("APPROVED", &format!("{balance:.2}"), true);
        self.defer(APPROVE_DISPLAY_MS, KioskState::TransactionLog, now);
    }

    fn state_manager_approval_wait(
        &mut self,
        hw: &mut Peripherals<'_>,
        clock: &dyn Clock,
        pacer: &dyn Pacer,
        events: &mut Vec<KioskEvent>,
    ) {
        let (name, id, reason, balance) = match (&self.verification, &self.fraud) {
            (Some(v), Some(f)) => {
                let reason = if f.alert_reason.is_empty() {
                    v.reason.clone()
                } else {
                    f.alert_reason.clone()
                };
                (v.student_name.clone(), v.student_id.clone(), reason, v.balance)
            }
            _ => {
                self.raise_fault(
                    "escalation entered without verification context",
                    "Restart the attempt at the card reader",
                    clock.now_ms(),
                    events,
                );
                return;
            }
        };

        let ctx = EscalationContext {
            student_name: &name,
            student_id: &id,
            reason: &reason,
        };
        let decision =
            escalation::request_decision(hw.panel, hw.display, clock, pacer, &ctx, APPROVAL_TIMEOUT);
        events.push(KioskEvent::EscalationResolved { decision });

        // The bounded wait consumed real time; re-read the clock.
        let now = clock.now_ms();
        self.power.note_activity(now);

        match decision {
            OperatorDecision::Approved => {
                self.stage_record(TransactionStatus::ManualApproved, "Manager approved", now);
                hw.display
                    .show_status("APPROVED", &format!("{balance:.2}"), true);
                self.defer(APPROVE_DISPLAY_MS, KioskState::TransactionLog, now);
            }
            OperatorDecision::Override => {
                self.stage_record(TransactionStatus::Override, "Manager override", now);
                hw.display
                    .show_status("OVERRIDE", &format!("{balance:.2}"), true);
                self.defer(APPROVE_DISPLAY_MS, KioskState::TransactionLog, now);
            }
            OperatorDecision::Denied => {
                self.stage_record(TransactionStatus::Denied, "Manager denied", now);
                hw.display.show_error("Contact manager");
                self.defer(DENY_DISPLAY_MS, KioskState::TransactionLog, now);
            }
        }
    }

    fn state_transaction_log(
        &mut self,
        backend: &mut dyn Backend,
        now: Millis,
        events: &mut Vec<KioskEvent>,
    ) {
        let Some(record) = self.pending_record.take() else {
            // Nothing staged; nothing to log.
            self.defer(LOG_SETTLE_MS, KioskState::Idle, now);
            return;
        };

        let stored = self.store.append(record).clone();
        events.push(KioskEvent::TransactionRecorded {
            id: stored.id.clone(),
            status: stored.status,
            offline: stored.offline_mode,
        });

        if backend.is_connected() {
            match backend.log_transaction(&stored) {
                Ok(()) => {
                    self.store.mark_synced(&stored.id);
                    log::info!("Log: transaction {} uploaded", stored.id);
                    // Good moment to drain anything queued earlier.
                    match self.resync.sync_now(now, &mut self.store, backend) {
                        Some(SyncOutcome::Completed { uploaded }) => {
                            events.push(KioskEvent::SyncCompleted { uploaded });
                        }
                        Some(SyncOutcome::Deferred { queued }) => {
                            events.push(KioskEvent::SyncDeferred { queued });
                        }
                        None => {}
                    }
                }
                Err(e) => {
                    log::warn!("Log: upload failed ({e}), queueing for resync");
                    self.resync.enqueue(stored);
                }
            }
        } else {
            self.resync.enqueue(stored);
        }

        self.defer(LOG_SETTLE_MS, KioskState::Idle, now);
    }

    fn state_error(
        &mut self,
        hw: &mut Peripherals<'_>,
        motion: bool,
        now: Millis,
        events: &mut Vec<KioskEvent>,
    ) {
        hw.display.show_error(&self.error_hint);
        if motion || now.saturating_sub(self.last_state_change) >= ERROR_RECOVERY_MS {
            self.transition(KioskState::Idle, now, events);
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Assemble this attempt's transaction record and stage it for the
    /// `TransactionLog` state. One call per completed attempt.
    fn stage_record(&mut self, status: TransactionStatus, reason: &str, now: Millis) {
        let Some(v) = &self.verification else {
            log::error!("stage_record without verification context");
            return;
        };
        let fraud_alert = self
            .fraud
            .as_ref()
            .map(|f| f.severity >= Severity::Critical)
            .unwrap_or(false);

        self.pending_record = Some(TransactionRecord {
            id: String::new(),
            timestamp: now / 1000,
            student_id: v.student_id.clone(),
            student_name: v.student_name.clone(),
            rfid_uid: self.uid.clone().unwrap_or_default(),
            status,
            balance_before: v.balance,
            balance_after: v.balance - self.thresholds.meal_cost,
            reason: reason.to_string(),
            fraud_alert,
            face_confidence: v.confidence,
            synced: false,
            offline_mode: self.offline_attempt,
        });
    }

    fn defer(&mut self, delay_ms: Millis, next: KioskState, now: Millis) {
        self.deferred = Some((now + delay_ms, next));
    }

    fn raise_fault(
        &mut self,
        message: &str,
        hint: &str,
        now: Millis,
        events: &mut Vec<KioskEvent>,
    ) {
        log::error!("Fault: {message}");
        events.push(KioskEvent::FaultRaised {
            message: message.to_string(),
            retryable: false,
        });
        self.error_hint = hint.to_string();
        self.deferred = None;
        self.transition(KioskState::Error, now, events);
    }

    fn transition(&mut self, next: KioskState, now: Millis, events: &mut Vec<KioskEvent>) {
        log::info!("State: {:?} -> {next:?}", self.state);
        events.push(KioskEvent::StateChanged {
            from: self.state,
            to: next,
        });
        self.state = next;
        self.last_state_change = now;

        // A fresh card wait starts a fresh attempt.
        if next == KioskState::WaitingForCard {
            self.uid = None;
            self.face = None;
            self.verification = None;
            self.fraud = None;
            self.offline_attempt = false;
        }
    }
}
