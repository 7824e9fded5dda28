//! # Serial Communication Module
//!
//! Line-oriented links to the cockpit microcontrollers.
//!
//! This module handles:
//! - Opening each configured endpoint at 8N1 with its configured baud rate
//! - Sending newline-terminated UTF-8 text lines
//! - Polling for inbound lines without blocking the main loop
//! - Addressing channels by name through [`HardwareLink`]

pub mod port_trait;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::SerialEndpoint;
use crate::error::{BridgeError, Result};
use port_trait::{SerialPortIO, TokioSerialPort};

/// Upper bound on bytes pulled from the driver per receive call
const READ_CHUNK_SIZE: usize = 256;

/// A named, line-oriented, bidirectional channel
#[async_trait]
pub trait LineChannel: Send {
    /// Channel name as configured
    fn name(&self) -> &str;

    /// Send one line; the newline terminator is appended here
    async fn send_line(&mut self, text: &str) -> Result<()>;

    /// Return the next complete inbound line, or `None` without waiting
    async fn receive_line(&mut self) -> Result<Option<String>>;
}

/// Serial-backed [`LineChannel`]
///
/// Inbound bytes are accumulated until a `\n` arrives, so a line split across
/// several driver reads is returned once, whole.
pub struct SerialChannel<P: SerialPortIO> {
    name: String,
    port: P,
    pending: BytesMut,
}

impl<P: SerialPortIO> std::fmt::Debug for SerialChannel<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("name", &self.name)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SerialChannel<TokioSerialPort> {
    /// Open a serial endpoint with fixed 8N1 framing
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Name, port identifier and baud rate
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SerialOpen`] if the port cannot be opened
    pub fn open(endpoint: &SerialEndpoint) -> Result<Self> {
        let port = open_port(&endpoint.port, endpoint.baud_rate)?;
        info!(
            "Opened channel {} at {} ({} baud)",
            endpoint.name, endpoint.port, endpoint.baud_rate
        );
        Ok(Self::new(&endpoint.name, TokioSerialPort::new(port)))
    }
}

impl<P: SerialPortIO> SerialChannel<P> {
    pub fn new(name: &str, port: P) -> Self {
        Self {
            name: name.to_string(),
            port,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }

    /// Split one complete line off the front of the pending buffer.
    ///
    /// Blank lines are consumed and skipped.
    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw = self.pending.split_to(pos);
            self.pending.advance(1);
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }
}

#[async_trait]
impl<P: SerialPortIO> LineChannel for SerialChannel<P> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_line(&mut self, text: &str) -> Result<()> {
        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(b'\n');

        self.port
            .write_all(&frame)
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to write to {}: {}", self.name, e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to flush {}: {}", self.name, e)))?;

        debug!("Sent to {}: {}", self.name, text);
        Ok(())
    }

    async fn receive_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let available = self
            .port
            .bytes_available()
            .map_err(|e| BridgeError::Serial(format!("Failed to poll {}: {}", self.name, e)))?;
        if available == 0 {
            return Ok(None);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let want = available.min(READ_CHUNK_SIZE);
        let n = self
            .port
            .read(&mut chunk[..want])
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to read from {}: {}", self.name, e)))?;
        self.pending.extend_from_slice(&chunk[..n]);

        let line = self.take_line();
        if let Some(line) = &line {
            debug!("Received from {}: {}", self.name, line);
        }
        Ok(line)
    }
}

/// Open a specific serial port with 8N1 settings
fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| BridgeError::SerialOpen {
            port: path.to_string(),
            reason: e.to_string(),
        })
}

/// Named collection of independent line channels
#[derive(Default)]
pub struct HardwareLink {
    channels: HashMap<String, Box<dyn LineChannel>>,
}

impl std::fmt::Debug for HardwareLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareLink")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HardwareLink {
    /// Open every configured endpoint
    ///
    /// # Errors
    ///
    /// Fails on the first endpoint that cannot be opened
    pub fn open(endpoints: &[SerialEndpoint]) -> Result<Self> {
        let mut link = Self::default();
        for endpoint in endpoints {
            link.insert(Box::new(SerialChannel::open(endpoint)?));
        }
        Ok(link)
    }

    /// Register a channel under its own name, replacing any previous one
    pub fn insert(&mut self, channel: Box<dyn LineChannel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    /// Hand ownership of a channel to its single consumer
    pub fn take(&mut self, name: &str) -> Option<Box<dyn LineChannel>> {
        self.channels.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send a line on the named channel
    pub async fn send(&mut self, name: &str, text: &str) -> Result<()> {
        self.channel_mut(name)?.send_line(text).await
    }

    /// Poll the named channel for one complete line
    pub async fn receive(&mut self, name: &str) -> Result<Option<String>> {
        self.channel_mut(name)?.receive_line().await
    }

    fn channel_mut(&mut self, name: &str) -> Result<&mut Box<dyn LineChannel>> {
        self.channels
            .get_mut(name)
            .ok_or_else(|| BridgeError::UnknownChannel(name.to_string()))
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Mock line channel recording sent lines and replaying queued inbound lines
    #[derive(Clone)]
    pub struct MockLineChannel {
        pub name: String,
        pub sent: Arc<Mutex<Vec<String>>>,
        pub inbound: Arc<Mutex<VecDeque<String>>>,
        pub fail_sends: Arc<Mutex<bool>>,
    }

    impl MockLineChannel {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                sent: Arc::new(Mutex::new(Vec::new())),
                inbound: Arc::new(Mutex::new(VecDeque::new())),
                fail_sends: Arc::new(Mutex::new(false)),
            }
        }

        pub fn sent_lines(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn push_inbound(&self, line: &str) {
            self.inbound.lock().unwrap().push_back(line.to_string());
        }

        pub fn set_fail_sends(&self, fail: bool) {
            *self.fail_sends.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl LineChannel for MockLineChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send_line(&mut self, text: &str) -> Result<()> {
            if *self.fail_sends.lock().unwrap() {
                return Err(BridgeError::Serial("Mock send error".to_string()));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn receive_line(&mut self) -> Result<Option<String>> {
            Ok(self.inbound.lock().unwrap().pop_front())
        }
    }
}
