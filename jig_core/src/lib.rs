#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Cartridge jig control logic (hardware-agnostic).
//!
//! All hardware interaction goes through the `jig_traits` seams, gathered in
//! a [`rig::Rig`]. Time only advances through the injected `Clock`, so the
//! whole cycle runs on virtual time in tests.
//!
//! ## Architecture
//!
//! - **Mechanism**: carrier advance with stuck recovery, retract, reject gate (`mechanism`)
//! - **Valves**: closed-loop rotation checks and open-loop drive (`valve`, `feedback`)
//! - **QR protocol**: trigger/verdict exchange with the SBC and retry wrapper (`qr`)
//! - **Faults**: saturating counters (`counters`) and pluggable escalation policies (`escalation`)
//! - **Operator**: blocking alarms (`alarm`) and the stack monitor (`stack`)
//! - **Cycle**: the steppable `station::Station`, built with `builder`, driven by `runner`

pub mod alarm;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod counters;
pub mod error;
pub mod escalation;
pub mod feedback;
pub mod hw_error;
pub mod mechanism;
pub mod mocks;
pub mod poll;
pub mod qr;
pub mod rig;
pub mod runner;
pub mod service;
pub mod stack;
pub mod station;
pub mod status;
pub mod valve;

pub use builder::{Missing, Set, StationBuilder};
pub use config::JigCfg;
pub use counters::{FaultCategory, FaultCounters, LeakStage, SaturatingCounter, Zone};
pub use error::{BuildError, JigError, Result};
pub use station::Station;
pub use status::{CycleReport, CycleStats, CycleStatus, Decision, RestartReason};
