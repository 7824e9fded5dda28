//! # Cockpit Bridge Library
//!
//! Mirror the F-16 DED to cockpit hardware and route panel input back into
//! the simulator.
//!
//! This library provides the telemetry sources (Falcon BMS shared memory and
//! the DCS-BIOS export stream), the shared state store, the diff-based
//! display synchronizer, and the command router that turns panel events into
//! key presses, axis moves or simulator commands.

pub mod bridge;
pub mod command;
pub mod config;
pub mod display;
pub mod error;
pub mod router;
pub mod serial;
pub mod telemetry;
