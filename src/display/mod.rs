//! # Display Module
//!
//! Mirrors the DED onto a serial-attached display.
//!
//! This module handles:
//! - Pulling the first N DED lines out of the store
//! - Decoding raw display bytes to text
//! - Sending the rendered message only when it changed
//! - Handing inbound panel events to an [`InboundHandler`]

pub mod decode;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, Result};
use crate::serial::LineChannel;
use crate::telemetry::{ded_line_key, SharedStateStore, DED_LINE_COUNT, FLIGHT_DATA_KEY};
use decode::decode_line;

/// Separator between lines in a rendered message
pub const LINE_SEPARATOR: &str = ",";

/// Consumer of inbound lines received from the display channel
#[async_trait]
pub trait InboundHandler: Send {
    async fn handle(&mut self, line: &str) -> Result<()>;
}

/// Where the DED lines live in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    /// `ded_lines` of the primary flight data record
    FlightData,
    /// One raw value per line under `DED_line1`..`DED_line5`
    StoreKeys,
}

impl LineSource {
    fn raw_lines(&self, store: &SharedStateStore, count: usize) -> Vec<Vec<u8>> {
        match self {
            Self::FlightData => {
                let value = store.get(FLIGHT_DATA_KEY);
                match value.as_flight_data() {
                    Some(record) => record
                        .ded_lines
                        .iter()
                        .take(count)
                        .map(|line| line.to_vec())
                        .collect(),
                    None => vec![Vec::new(); count],
                }
            }
            Self::StoreKeys => (0..count)
                .map(|i| store.get(&ded_line_key(i)).as_bytes().to_vec())
                .collect(),
        }
    }
}

/// Render decoded lines into one display message
pub fn render<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(LINE_SEPARATOR)
}

/// Counters for one synchronizer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub sent: u64,
    pub send_failures: u64,
    pub inbound: u64,
    /// Failures that retrying will not fix
    pub unrecoverable: u64,
}

/// Result of one [`DisplaySynchronizer::process`] call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Message written to the channel, if any
    pub sent: Option<String>,
    /// Inbound line handled, if any
    pub inbound: Option<String>,
}

/// Diff-based DED synchronizer
pub struct DisplaySynchronizer {
    store: SharedStateStore,
    source: LineSource,
    line_count: usize,
    channel: Box<dyn LineChannel>,
    handler: Box<dyn InboundHandler>,
    last_sent: String,
    stats: SyncStats,
}

impl std::fmt::Debug for DisplaySynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplaySynchronizer")
            .field("source", &self.source)
            .field("line_count", &self.line_count)
            .field("channel", &self.channel.name())
            .field("last_sent", &self.last_sent)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl DisplaySynchronizer {
    /// Create a synchronizer for `line_count` lines (clamped to 1..=5)
    ///
    /// Nothing is sent until at least one line has content.
    pub fn new(
        store: SharedStateStore,
        source: LineSource,
        line_count: usize,
        channel: Box<dyn LineChannel>,
        handler: Box<dyn InboundHandler>,
    ) -> Self {
        let line_count = line_count.clamp(1, DED_LINE_COUNT);
        info!(
            "Mirroring {} DED line(s) to channel '{}'",
            line_count,
            channel.name()
        );
        Self {
            store,
            source,
            line_count,
            channel,
            handler,
            last_sent: render(&vec![""; line_count]),
            stats: SyncStats::default(),
        }
    }

    /// Render the current display content from the store
    pub fn current_message(&self) -> String {
        let lines: Vec<String> = self
            .source
            .raw_lines(&self.store, self.line_count)
            .iter()
            .map(|raw| decode_line(raw))
            .collect();
        render(&lines)
    }

    /// One synchronization cycle
    ///
    /// Channel and handler failures are logged here; they never abort the
    /// caller's loop.
    pub async fn process(&mut self) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();

        let message = self.current_message();
        if message != self.last_sent {
            match self.channel.send_line(&message).await {
                Ok(()) => {
                    debug!("DED -> {}: {}", self.channel.name(), message);
                    self.stats.sent += 1;
                    self.last_sent = message.clone();
                    outcome.sent = Some(message);
                }
                Err(e) => {
                    self.stats.send_failures += 1;
                    let context = format!("Failed to update display '{}'", self.channel.name());
                    self.report(&context, &e);
                }
            }
        }

        match self.channel.receive_line().await {
            Ok(Some(line)) => {
                debug!("{} -> {}", self.channel.name(), line);
                self.stats.inbound += 1;
                if let Err(e) = self.handler.handle(&line).await {
                    self.report(&format!("Failed to handle '{}'", line), &e);
                }
                outcome.inbound = Some(line);
            }
            Ok(None) => {}
            Err(e) => {
                let context = format!("Failed to read from '{}'", self.channel.name());
                self.report(&context, &e);
            }
        }

        outcome
    }

    /// Soft errors are retried next cycle; anything else is counted
    fn report(&mut self, context: &str, err: &BridgeError) {
        if err.is_soft() {
            warn!("{}: {}", context, err);
        } else {
            self.stats.unrecoverable += 1;
            error!("{}: {}", context, err);
        }
    }

    pub fn last_sent(&self) -> &str {
        &self.last_sent
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }
}
