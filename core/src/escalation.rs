//! Escalation gate — bounded wait for an operator decision.
//!
//! This is the single place in the core allowed to hold the loop for
//! human-scale latency. The wait is a polled deadline, not an
//! indefinite block: the keypad is sampled every 50 ms and the
//! deadline elapsing resolves to `Denied`.

use crate::clock::{Clock, Pacer};
use crate::hardware::{Display, OperatorKey, OperatorPanel};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Keypad sampling interval.
pub const DECISION_POLL: Duration = Duration::from_millis(50);
/// Countdown refresh interval; coarser so the display never steals
/// input responsiveness.
pub const PROGRESS_REFRESH_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperatorDecision {
    Approved,
    Denied,
    Override,
}

impl From<OperatorKey> for OperatorDecision {
    fn from(key: OperatorKey) -> Self {
        match key {
            OperatorKey::Approve => OperatorDecision::Approved,
            OperatorKey::Deny => OperatorDecision::Denied,
            OperatorKey::Override => OperatorDecision::Override,
        }
    }
}

/// What the operator sees while deciding.
pub struct EscalationContext<'a> {
    pub student_name: &'a str,
    pub student_id: &'a str,
    pub reason: &'a str,
}

/// Block until the operator presses a decision key or `timeout`
/// elapses. Timeout resolves to `Denied`, at or after the deadline,
/// never before.
pub fn request_decision(
    panel: &mut dyn OperatorPanel,
    display: &mut dyn Display,
    clock: &dyn Clock,
    pacer: &dyn Pacer,
    ctx: &EscalationContext<'_>,
    timeout: Duration,
) -> OperatorDecision {
    let start = clock.now_ms();
    let deadline = start + timeout.as_millis() as u64;
    let mut last_refresh = start;

    display.show_escalation(
        ctx.student_name,
        ctx.student_id,
        ctx.reason,
        timeout.as_secs(),
    );
    log::info!("Escalation: waiting for operator ({})", ctx.reason);

    loop {
        if let Some(key) = panel.poll_key() {
            let decision = OperatorDecision::from(key);
            log::info!("Escalation: operator decided {decision:?}");
            return decision;
        }

        let now = clock.now_ms();
        if now >= deadline {
            log::info!("Escalation: timed out, auto-deny");
            return OperatorDecision::Denied;
        }

        if now - last_refresh >= PROGRESS_REFRESH_MS {
            let remaining_secs = (deadline - now).div_ceil(1000);
            display.show_escalation(
                ctx.student_name,
                ctx.student_id,
                ctx.reason,
                remaining_secs,
            );
            last_refresh = now;
        }

        pacer.pause(DECISION_POLL);
    }
}
