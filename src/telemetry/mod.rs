//! # Telemetry Module
//!
//! Gets simulator state into the [`SharedStateStore`].
//!
//! Two sources exist, one per simulator:
//! - Falcon BMS: [`snapshot::PolledSnapshotSource`] reads the shared memory
//!   records once per main loop iteration
//! - DCS World: [`stream::StreamDecoderSource`] runs on its own task and
//!   decodes the DCS-BIOS export stream as datagrams arrive
//!
//! Both sit behind [`TelemetrySource`] so the main loop drives them the same
//! way.

pub mod records;
pub mod snapshot;
pub mod store;
pub mod stream;

use async_trait::async_trait;

pub use store::{SharedStateStore, StateValue};

/// Number of DED lines exported by either simulator
pub const DED_LINE_COUNT: usize = 5;

/// Width of one DED line in the shared memory record
pub const DED_LINE_WIDTH: usize = 26;

/// Store key of the primary Falcon BMS record
pub const FLIGHT_DATA_KEY: &str = "BMS_flightdata";
pub const FLIGHT_DATA2_KEY: &str = "BMS_flightdata2";
pub const INTELLIVIBE_KEY: &str = "BMS_intellivibe";
pub const STRINGS_KEY: &str = "BMS_strings";

/// Store key for a streamed DED line (`index` is zero-based)
///
/// ```
/// assert_eq!(cockpit_bridge::telemetry::ded_line_key(0), "DED_line1");
/// ```
pub fn ded_line_key(index: usize) -> String {
    format!("DED_line{}", index + 1)
}

/// Anything that can bring the store up to date
#[async_trait]
pub trait TelemetrySource: Send {
    /// Called once per main loop iteration
    ///
    /// Returns `true` if new values were written. Sources that ingest on
    /// their own task return `false`.
    fn poll(&mut self, store: &SharedStateStore) -> bool;

    /// Stop background work and wait for it to finish
    async fn shutdown(&mut self) {}
}
