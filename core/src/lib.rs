//! kiosk-core — the control core of an unattended dining-hall
//! authorization kiosk.
//!
//! The core is hardware-free: peripherals, display, and backend are
//! trait objects supplied by the host. The host drives the
//! [`controller::SessionController`] by calling `tick()` at a steady
//! rate (20–50 Hz); each tick advances exactly one state-machine step.
//!
//! RULES:
//!   - Only the controller mutates the transaction store and the
//!     resync queue. Both live on the single tick thread.
//!   - The fraud engine is a pure function: no I/O, no clock reads,
//!     fully deterministic for a given input window.
//!   - Denials are business outcomes, recorded as transactions — only
//!     hardware and network problems are errors.

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod escalation;
pub mod event;
pub mod fraud;
pub mod hardware;
pub mod offline;
pub mod power;
pub mod resync;
pub mod store;
pub mod transaction;
pub mod types;
