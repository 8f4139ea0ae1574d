//! kiosk-sim: headless scenario runner for the kiosk core.
//!
//! Drives the session controller against simulated peripherals and a
//! simulated backend, on a hand-advanced clock, so whole cafeteria
//! shifts replay deterministically from a seed.
//!
//! Usage:
//!   kiosk-sim --seed 42 --ticks 90000
//!   kiosk-sim --seed 42 --ticks 90000 --offline-from 20000 --offline-until 50000
//!   kiosk-sim --config kiosk.json --events run.jsonl

use anyhow::Result;
use kiosk_core::clock::{Clock, ManualClock};
use kiosk_core::config::KioskConfig;
use kiosk_core::controller::{Peripherals, SessionController};
use kiosk_core::event::KioskEvent;
use kiosk_core::hardware::{
    ApiError, Backend, Camera, CardReader, Display, MotionSensor, OperatorKey, OperatorPanel,
    VerificationResult,
};
use kiosk_core::transaction::{TransactionRecord, TransactionStatus};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::VecDeque;
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

/// Loop period: 50 Hz, matching the device.
const TICK_MS: u64 = 20;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ticks = parse_arg(&args, "--ticks", 90_000u64);
    let offline_from = parse_arg(&args, "--offline-from", u64::MAX);
    let offline_until = parse_arg(&args, "--offline-until", u64::MAX);
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].clone());
    let events_path = args
        .windows(2)
        .find(|w| w[0] == "--events")
        .map(|w| w[1].clone());

    let config = match &config_path {
        Some(path) => KioskConfig::load(Path::new(path))?,
        None => KioskConfig::default(),
    };

    let started_at = chrono::Local::now();
    println!("kiosk-sim");
    println!("  started:  {}", started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  seed:     {seed}");
    println!("  ticks:    {ticks}");
    println!("  backend:  {}:{}", config.server_host, config.server_port);
    if offline_from != u64::MAX {
        println!("  offline:  {offline_from}ms..{offline_until}ms");
    }
    println!();

    let clock = Rc::new(ManualClock::new(0));
    let mut rng = Pcg64Mcg::seed_from_u64(seed);

    let roster = build_roster(&mut rng, 40);
    let schedule = build_schedule(&mut rng, &roster, ticks * TICK_MS);
    log::info!("Scenario: {} scheduled presentations", schedule.len());

    let mut motion = SimMotion {
        clock: clock.clone(),
        schedule: schedule.iter().map(|p| p.at_ms).collect(),
    };
    let mut reader = SimReader {
        clock: clock.clone(),
        pending: schedule.into(),
    };
    let mut camera = SimCamera {
        rng: Pcg64Mcg::seed_from_u64(seed ^ 0x01),
    };
    let mut panel = SimPanel {
        clock: clock.clone(),
        rng: Pcg64Mcg::seed_from_u64(seed ^ 0x02),
        asked_at: None,
    };
    let mut display = LogDisplay;
    let mut backend = SimBackend {
        connected: true,
        roster,
        rng: Pcg64Mcg::seed_from_u64(seed ^ 0x03),
    };

    let mut event_log = match &events_path {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    let mut controller = SessionController::new(config, clock.now_ms());
    let mut tally = Tally::default();

    for _ in 0..ticks {
        let now = clock.now_ms();
        backend.connected = !(offline_from..offline_until).contains(&now);

        let mut hw = Peripherals {
            motion: &mut motion,
            reader: &mut reader,
            camera: &mut camera,
            panel: &mut panel,
            display: &mut display,
        };
        let events = controller.tick(&mut hw, &mut backend, &*clock, &*clock)?;
        tally.absorb(&events);

        if let Some(out) = &mut event_log {
            for event in &events {
                let line = serde_json::to_string(&TimedEvent { at_ms: now, event })?;
                writeln!(out, "{line}")?;
            }
        }

        clock.advance(TICK_MS);
    }

    if let Some(mut out) = event_log {
        out.flush()?;
    }

    print_summary(&controller, &tally, ticks);
    Ok(())
}

// ── Scenario generation ─────────────────────────────────────────────────────

#[derive(Clone)]
struct Student {
    uid: String,
    id: String,
    name: String,
    balance: f64,
    base_confidence: f64,
    plan_active: bool,
}

struct Presentation {
    at_ms: u64,
    uid: String,
}

fn build_roster(rng: &mut Pcg64Mcg, count: usize) -> Vec<Student> {
    (0..count)
        .map(|i| Student {
            uid: format!("04:{:02X}:{:02X}:B2", i, 0xA0 + (i % 16)),
            id: format!("S{:04}", 1000 + i),
            name: format!("Student {:04}", 1000 + i),
            balance: rng.gen_range(0.0..80.0),
            base_confidence: rng.gen_range(0.55..0.99),
            plan_active: rng.gen_bool(0.95),
        })
        .collect()
}

/// Arrivals spread over the run; a few students come back for a
/// second try so the double-serving rule gets exercised.
fn build_schedule(rng: &mut Pcg64Mcg, roster: &[Student], span_ms: u64) -> Vec<Presentation> {
    let mut schedule = Vec::new();
    let mut at_ms = 2_000u64;
    while at_ms + 60_000 < span_ms {
        let student = &roster[rng.gen_range(0..roster.len())];
        schedule.push(Presentation {
            at_ms,
            uid: student.uid.clone(),
        });
        if rng.gen_bool(0.15) {
            // Repeat customer a few minutes later.
            schedule.push(Presentation {
                at_ms: at_ms + rng.gen_range(120_000..300_000).min(span_ms),
                uid: student.uid.clone(),
            });
        }
        at_ms += rng.gen_range(15_000..45_000);
    }
    schedule.sort_by_key(|p| p.at_ms);
    schedule
}

// ── Simulated peripherals ───────────────────────────────────────────────────

struct SimMotion {
    clock: Rc<ManualClock>,
    schedule: Vec<u64>,
}

impl MotionSensor for SimMotion {
    fn detected(&mut self) -> bool {
        let now = self.clock.now_ms();
        // PIR fires from shortly before an arrival until it is stale.
        self.schedule
            .iter()
            .any(|&at| now + 1_000 >= at && now < at + 8_000)
    }
}

struct SimReader {
    clock: Rc<ManualClock>,
    pending: VecDeque<Presentation>,
}

impl CardReader for SimReader {
    fn detect_and_read(&mut self) -> Option<String> {
        let now = self.clock.now_ms();
        // Drop presentations the kiosk never got to in time.
        while matches!(self.pending.front(), Some(p) if p.at_ms + 20_000 < now) {
            self.pending.pop_front();
        }
        match self.pending.front() {
            Some(p) if p.at_ms <= now => self.pending.pop_front().map(|p| p.uid),
            _ => None,
        }
    }
}

struct SimCamera {
    rng: Pcg64Mcg,
}

impl Camera for SimCamera {
    fn capture(&mut self) -> Option<Vec<u8>> {
        // Occasional missed frame; the controller's poll window rides
        // through it.
        if self.rng.gen_bool(0.05) {
            return None;
        }
        Some(vec![0xD8; self.rng.gen_range(700..1_400)])
    }
}

struct SimPanel {
    clock: Rc<ManualClock>,
    rng: Pcg64Mcg,
    asked_at: Option<u64>,
}

impl OperatorPanel for SimPanel {
    fn poll_key(&mut self) -> Option<OperatorKey> {
        let now = self.clock.now_ms();
        let asked = *self.asked_at.get_or_insert(now);
        // Operator reacts after a second and a half.
        if now.saturating_sub(asked) < 1_500 {
            return None;
        }
        self.asked_at = None;
        let roll: f64 = self.rng.gen();
        Some(if roll < 0.70 {
            OperatorKey::Approve
        } else if roll < 0.90 {
            OperatorKey::Deny
        } else {
            OperatorKey::Override
        })
    }
}

struct LogDisplay;

impl Display for LogDisplay {
    fn show_status(&mut self, line: &str, balance: &str, _ok: bool) {
        log::debug!("OLED: {line} ({balance})");
    }

    fn show_waiting(&mut self, message: &str) {
        log::trace!("OLED: {message}");
    }

    fn show_error(&mut self, message: &str) {
        log::debug!("OLED: ! {message}");
    }

    fn show_escalation(&mut self, name: &str, _id: &str, _reason: &str, remaining_secs: u64) {
        log::trace!("OLED: escalation {name} ({remaining_secs}s left)");
    }
}

// ── Simulated backend ───────────────────────────────────────────────────────

struct SimBackend {
    connected: bool,
    roster: Vec<Student>,
    rng: Pcg64Mcg,
}

impl Backend for SimBackend {
    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn verify(&mut self, uid: &str, _image: &[u8]) -> Result<VerificationResult, ApiError> {
        if !self.connected {
            return Err(ApiError::Unreachable);
        }
        let Some(student) = self.roster.iter().find(|s| s.uid == uid) else {
            return Ok(VerificationResult {
                success: false,
                student_id: String::new(),
                student_name: String::new(),
                confidence: 0.0,
                eligible: false,
                balance: 0.0,
                meal_plan: String::new(),
                already_served_today: false,
                approval_required: false,
                reason: "Unknown card".to_string(),
            });
        };
        let jitter: f64 = self.rng.gen_range(-0.08..0.05);
        Ok(VerificationResult {
            success: true,
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            confidence: (student.base_confidence + jitter).clamp(0.0, 1.0),
            eligible: true,
            balance: student.balance,
            meal_plan: if student.plan_active {
                "active".to_string()
            } else {
                "expired".to_string()
            },
            already_served_today: false,
            approval_required: false,
            reason: String::new(),
        })
    }

    fn log_transaction(&mut self, record: &TransactionRecord) -> Result<(), ApiError> {
        if !self.connected {
            return Err(ApiError::Unreachable);
        }
        if record.status == TransactionStatus::Approved
            || record.status == TransactionStatus::ManualApproved
        {
            if let Some(student) = self.roster.iter_mut().find(|s| s.id == record.student_id) {
                student.balance = record.balance_after;
            }
        }
        Ok(())
    }

    fn sync_batch(&mut self, records: &[TransactionRecord]) -> Result<usize, ApiError> {
        if !self.connected {
            return Err(ApiError::Unreachable);
        }
        Ok(records.len())
    }
}

// ── Reporting ───────────────────────────────────────────────────────────────

/// One line of the `--events` JSONL output.
#[derive(serde::Serialize)]
struct TimedEvent<'a> {
    at_ms: u64,
    event: &'a KioskEvent,
}

#[derive(Default)]
struct Tally {
    attempts: usize,
    approved: usize,
    denied: usize,
    manual: usize,
    overridden: usize,
    offline_records: usize,
    fraud_alerts: usize,
    escalations: usize,
    offline_fallbacks: usize,
    synced_batches: usize,
}

impl Tally {
    fn absorb(&mut self, events: &[KioskEvent]) {
        for event in events {
            match event {
                KioskEvent::TransactionRecorded { status, offline, .. } => {
                    self.attempts += 1;
                    if *offline {
                        self.offline_records += 1;
                    }
                    match status {
                        TransactionStatus::Approved => self.approved += 1,
                        TransactionStatus::Denied => self.denied += 1,
                        TransactionStatus::ManualApproved => self.manual += 1,
                        TransactionStatus::Override => self.overridden += 1,
                    }
                }
                KioskEvent::FraudAlert { .. } => self.fraud_alerts += 1,
                KioskEvent::EscalationResolved { .. } => self.escalations += 1,
                KioskEvent::OfflineFallback { .. } => self.offline_fallbacks += 1,
                KioskEvent::SyncCompleted { .. } => self.synced_batches += 1,
                _ => {}
            }
        }
    }
}

fn print_summary(controller: &SessionController, tally: &Tally, ticks: u64) {
    println!("=== RUN SUMMARY ===");
    println!("  ticks run:        {ticks}");
    println!("  final state:      {:?}", controller.current_state());
    println!("  attempts:         {}", tally.attempts);
    println!("  approved:         {}", tally.approved);
    println!("  denied:           {}", tally.denied);
    println!("  manual approved:  {}", tally.manual);
    println!("  overrides:        {}", tally.overridden);
    println!("  escalations:      {}", tally.escalations);
    println!("  fraud alerts:     {}", tally.fraud_alerts);
    println!("  offline fallbacks:{}", tally.offline_fallbacks);
    println!("  offline records:  {}", tally.offline_records);
    println!("  sync batches:     {}", tally.synced_batches);
    println!("  store size:       {}", controller.store().len());
    println!("  unsynced:         {}", controller.store().unsynced().len());
    println!("  resync backlog:   {}", controller.resync_pending());
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
