//! Shared in-memory test doubles for the peripheral and backend traits.

#![allow(dead_code)]

use kiosk_core::clock::ManualClock;
use kiosk_core::config::KioskConfig;
use kiosk_core::controller::{KioskState, Peripherals, SessionController};
use kiosk_core::event::KioskEvent;
use kiosk_core::hardware::{
    ApiError, Backend, Camera, CardReader, Display, MotionSensor, OperatorKey, OperatorPanel,
    VerificationResult,
};
use kiosk_core::transaction::{TransactionRecord, TransactionStatus};
use std::collections::VecDeque;

// ── Peripheral doubles ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct FlagMotion {
    pub active: bool,
}

impl MotionSensor for FlagMotion {
    fn detected(&mut self) -> bool {
        self.active
    }
}

#[derive(Default)]
pub struct ScriptedReader {
    pub cards: VecDeque<String>,
}

impl CardReader for ScriptedReader {
    fn detect_and_read(&mut self) -> Option<String> {
        self.cards.pop_front()
    }
}

#[derive(Default)]
pub struct ScriptedCamera {
    pub frames: VecDeque<Vec<u8>>,
    pub released: usize,
}

impl Camera for ScriptedCamera {
    fn capture(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    fn release(&mut self) {
        self.released += 1;
    }
}

#[derive(Default)]
pub struct ScriptedPanel {
    /// One entry per poll; `None` entries simulate no key pressed.
    pub replies: VecDeque<Option<OperatorKey>>,
    pub polls: usize,
}

impl OperatorPanel for ScriptedPanel {
    fn poll_key(&mut self) -> Option<OperatorKey> {
        self.polls += 1;
        self.replies.pop_front().flatten()
    }
}

#[derive(Default)]
pub struct RecordingDisplay {
    pub waits: Vec<String>,
    pub errors: Vec<String>,
    pub statuses: Vec<(String, String, bool)>,
    /// Remaining seconds shown on each escalation refresh.
    pub escalations: Vec<u64>,
}

impl Display for RecordingDisplay {
    fn show_status(&mut self, line: &str, balance: &str, ok: bool) {
        self.statuses.push((line.into(), balance.into(), ok));
    }

    fn show_waiting(&mut self, message: &str) {
        self.waits.push(message.into());
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.into());
    }

    fn show_escalation(&mut self, _name: &str, _id: &str, _reason: &str, remaining_secs: u64) {
        self.escalations.push(remaining_secs);
    }
}

// ── Backend double ──────────────────────────────────────────────────────────

pub enum SyncReply {
    AcceptAll,
    Accept(usize),
    Fail(ApiError),
}

pub struct MockBackend {
    pub connected: bool,
    pub verify_reply: Result<VerificationResult, ApiError>,
    pub verify_calls: usize,
    pub log_reply: Result<(), ApiError>,
    pub logged: Vec<TransactionRecord>,
    pub sync_reply: SyncReply,
    pub sync_calls: usize,
    pub last_batch_len: usize,
}

impl MockBackend {
    pub fn online(verify_reply: Result<VerificationResult, ApiError>) -> Self {
        Self {
            connected: true,
            verify_reply,
            verify_calls: 0,
            log_reply: Ok(()),
            logged: Vec::new(),
            sync_reply: SyncReply::AcceptAll,
            sync_calls: 0,
            last_batch_len: 0,
        }
    }

    pub fn offline() -> Self {
        let mut backend = Self::online(Err(ApiError::Unreachable));
        backend.connected = false;
        backend
    }
}

impl Backend for MockBackend {
    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn verify(&mut self, _uid: &str, _image: &[u8]) -> Result<VerificationResult, ApiError> {
        self.verify_calls += 1;
        self.verify_reply.clone()
    }

    fn log_transaction(&mut self, record: &TransactionRecord) -> Result<(), ApiError> {
        self.log_reply.clone()?;
        self.logged.push(record.clone());
        Ok(())
    }

    fn sync_batch(&mut self, records: &[TransactionRecord]) -> Result<usize, ApiError> {
        self.sync_calls += 1;
        self.last_batch_len = records.len();
        match &self.sync_reply {
            SyncReply::AcceptAll => Ok(records.len()),
            SyncReply::Accept(n) => Ok(*n),
            SyncReply::Fail(e) => Err(e.clone()),
        }
    }
}

// ── Builders ────────────────────────────────────────────────────────────────

/// A verification that passes every rule at default thresholds.
pub fn verified(student_id: &str, confidence: f64, balance: f64) -> VerificationResult {
    VerificationResult {
        success: true,
        student_id: student_id.into(),
        student_name: format!("Student {student_id}"),
        confidence,
        eligible: true,
        balance,
        meal_plan: "active".into(),
        already_served_today: false,
        approval_required: false,
        reason: String::new(),
    }
}

pub fn record(
    student_id: &str,
    status: TransactionStatus,
    timestamp: u64,
) -> TransactionRecord {
    TransactionRecord {
        id: String::new(),
        timestamp,
        student_id: student_id.into(),
        student_name: format!("Student {student_id}"),
        rfid_uid: format!("uid-{student_id}"),
        status,
        balance_before: 20.0,
        balance_after: 15.0,
        reason: String::new(),
        fraud_alert: false,
        face_confidence: 0.9,
        synced: false,
        offline_mode: false,
    }
}

// ── Controller rig ──────────────────────────────────────────────────────────

/// Controller plus a full set of doubles, ticked at 50 Hz virtual time.
pub struct Rig {
    pub motion: FlagMotion,
    pub reader: ScriptedReader,
    pub camera: ScriptedCamera,
    pub panel: ScriptedPanel,
    pub display: RecordingDisplay,
    pub backend: MockBackend,
    pub clock: ManualClock,
    pub controller: SessionController,
}

impl Rig {
    pub fn new(backend: MockBackend) -> Self {
        Self {
            motion: FlagMotion::default(),
            reader: ScriptedReader::default(),
            camera: ScriptedCamera::default(),
            panel: ScriptedPanel::default(),
            display: RecordingDisplay::default(),
            backend,
            clock: ManualClock::new(0),
            controller: SessionController::new(KioskConfig::default(), 0),
        }
    }

    /// One tick, then 20 ms of virtual time (50 Hz loop rate).
    pub fn tick(&mut self) -> Vec<KioskEvent> {
        let mut hw = Peripherals {
            motion: &mut self.motion,
            reader: &mut self.reader,
            camera: &mut self.camera,
            panel: &mut self.panel,
            display: &mut self.display,
        };
        let events = self
            .controller
            .tick(&mut hw, &mut self.backend, &self.clock, &self.clock)
            .expect("tick failed");
        self.clock.advance(20);
        events
    }

    /// Tick until the controller reaches `target` or the budget runs
    /// out; panics on budget exhaustion so tests fail loudly.
    pub fn run_until(&mut self, target: KioskState, max_ticks: usize) -> Vec<KioskEvent> {
        let mut events = Vec::new();
        for _ in 0..max_ticks {
            events.extend(self.tick());
            if self.controller.current_state() == target {
                return events;
            }
        }
        panic!(
            "did not reach {target:?} within {max_ticks} ticks (stuck in {:?})",
            self.controller.current_state()
        );
    }

    /// Drive a full attempt up to and including the card+face capture,
    /// leaving the controller about to verify.
    pub fn present_card(&mut self, uid: &str) {
        self.motion.active = true;
        self.reader.cards.push_back(uid.into());
        self.camera.frames.push_back(vec![0xFF; 1024]);
    }
}
