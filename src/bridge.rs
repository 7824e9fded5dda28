//! # Bridge
//!
//! Wires a telemetry source, the store, the display synchronizer and an
//! inbound handler together and runs the main loop.
//!
//! | Mode  | Telemetry                    | DED lines from      | Panel tokens go to  |
//! |-------|------------------------------|---------------------|---------------------|
//! | `DCS` | DCS-BIOS export stream task  | `DED_line1..5` keys | UDP command socket  |
//! | `BMS` | polled shared memory         | flight data record  | keyboard / joystick |

use std::fmt;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::command::SimCommandSender;
use crate::config::Config;
use crate::display::{DisplaySynchronizer, InboundHandler, LineSource, ProcessOutcome};
use crate::error::{BridgeError, Result};
use crate::router::inject::{VirtualJoystick, VirtualKeyboard};
use crate::router::CommandRouter;
use crate::serial::HardwareLink;
use crate::telemetry::snapshot::{PolledSnapshotSource, ShmDirectory};
use crate::telemetry::stream::{
    bind_multicast, ExportStreamDecoder, IngestionTask, StreamDecoderSource, StreamEndpoint,
};
use crate::telemetry::{ded_line_key, SharedStateStore, TelemetrySource, DED_LINE_COUNT};

/// Main loop iterations between status log messages
const STATUS_LOG_INTERVAL: u64 = 12_000;

/// Which simulator the bridge is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// DCS World through DCS-BIOS
    Dcs,
    /// Falcon BMS through shared memory
    Bms,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Dcs => f.write_str("DCS"),
            Mode::Bms => f.write_str("BMS"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DCS" => Ok(Mode::Dcs),
            "BMS" => Ok(Mode::Bms),
            other => Err(BridgeError::InvalidMode(other.to_string())),
        }
    }
}

impl Mode {
    /// Where this mode's DED lines are stored
    pub fn line_source(&self) -> LineSource {
        match self {
            Mode::Dcs => LineSource::StoreKeys,
            Mode::Bms => LineSource::FlightData,
        }
    }
}

/// A fully wired bridge
pub struct Bridge {
    mode: Mode,
    store: SharedStateStore,
    source: Box<dyn TelemetrySource>,
    synchronizer: DisplaySynchronizer,
    link: HardwareLink,
    loop_interval: Duration,
    iterations: u64,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("mode", &self.mode)
            .field("synchronizer", &self.synchronizer)
            .field("link", &self.link)
            .field("loop_interval", &self.loop_interval)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Open the hardware and build everything `mode` needs
    ///
    /// # Errors
    ///
    /// Any failure here is fatal: a serial port that cannot be opened, a
    /// missing display channel, an unreadable key file, no access to
    /// `/dev/uinput` (BMS) or a socket that cannot be bound (DCS).
    pub async fn build(config: &Config, mode: Mode) -> Result<Self> {
        let store = SharedStateStore::new();
        store.initialize_placeholders((0..DED_LINE_COUNT).map(ded_line_key));

        let mut link = HardwareLink::open(&config.endpoints)?;
        let channel = link
            .take(&config.display.channel)
            .ok_or_else(|| BridgeError::UnknownChannel(config.display.channel.clone()))?;

        let (source, handler): (Box<dyn TelemetrySource>, Box<dyn InboundHandler>) = match mode {
            Mode::Bms => {
                let router = CommandRouter::from_config(
                    &config.keymap,
                    Box::new(VirtualKeyboard::create()?),
                    Box::new(VirtualJoystick::create()?),
                )?;
                let memory = ShmDirectory::new(&config.shared_memory.directory);
                info!("Reading Falcon BMS shared memory from {}", memory.root().display());
                (Box::new(PolledSnapshotSource::new(memory)), Box::new(router))
            }
            Mode::Dcs => {
                let sender = SimCommandSender::bind(config.network.command_address).await?;
                let socket = bind_multicast(StreamEndpoint {
                    group: config.network.multicast_group,
                    port: config.network.port,
                })?;
                let decoder = StreamDecoderSource::new(ExportStreamDecoder::default(), store.clone());
                (Box::new(IngestionTask::spawn(decoder, socket)), Box::new(sender))
            }
        };

        let synchronizer = DisplaySynchronizer::new(
            store.clone(),
            mode.line_source(),
            config.display.line_count,
            channel,
            handler,
        );

        Ok(Self::from_parts(
            mode,
            store,
            source,
            synchronizer,
            link,
            Duration::from_millis(config.loop_interval_ms),
        ))
    }

    /// Assemble a bridge from already built parts
    pub fn from_parts(
        mode: Mode,
        store: SharedStateStore,
        source: Box<dyn TelemetrySource>,
        synchronizer: DisplaySynchronizer,
        link: HardwareLink,
        loop_interval: Duration,
    ) -> Self {
        Self {
            mode,
            store,
            source,
            synchronizer,
            link,
            loop_interval,
            iterations: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    /// Channels opened but not driven by the display synchronizer
    pub fn idle_channels(&self) -> &HardwareLink {
        &self.link
    }

    /// One main loop iteration: refresh telemetry, then synchronize the display
    pub async fn step(&mut self) -> ProcessOutcome {
        self.source.poll(&self.store);
        let outcome = self.synchronizer.process().await;

        self.iterations += 1;
        if self.iterations % STATUS_LOG_INTERVAL == 0 {
            let stats = self.synchronizer.stats();
            info!(
                "{} iterations, {} display updates, {} failed, {} inbound, {} unrecoverable",
                self.iterations, stats.sent, stats.send_failures, stats.inbound, stats.unrecoverable
            );
        }

        outcome
    }

    /// Run until Ctrl+C, then shut down
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; per-iteration failures are logged
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = interval(self.loop_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!("{} bridge running, press Ctrl+C to exit", self.mode);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step().await;
                }

                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        warn!("Failed to listen for Ctrl+C: {}", e);
                    }
                    info!("Received Ctrl+C, shutting down...");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stop the telemetry source and wait for background work to end
    pub async fn shutdown(&mut self) {
        self.source.shutdown().await;
        debug!("Telemetry source stopped after {} iterations", self.iterations);
    }
}
