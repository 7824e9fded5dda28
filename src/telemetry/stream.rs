//! # Streamed Telemetry Source
//!
//! Ingests the DCS-BIOS export stream from its UDP multicast group.
//!
//! ## Export Stream Format
//!
//! ```text
//! 0x55 0x55 0x55 0x55                  frame sync
//! addr:u16le count:u16le data[count]   write block, repeated
//! ```
//!
//! Each write block stores `count` bytes (16-bit little-endian words) into a
//! 64 KiB address space. The bridge only tracks the addresses listed in
//! [`STREAM_FIELDS`]; writes elsewhere are ignored. A field whose bytes
//! changed is handed to its handler at the next frame sync, or when the
//! end-of-update marker at [`END_OF_UPDATE_ADDRESS`] is written.
//!
//! ## Field Table
//!
//! Every supported field is listed statically with its address, length and
//! [`FieldKind`]. Handlers run on the ingestion task: each is bounded-time,
//! does no I/O, and writes exactly one store key.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::{SharedStateStore, StateValue};
use super::{ded_line_key, TelemetrySource};
use crate::error::{BridgeError, Result};

/// Frame sync byte, sent four times in a row
pub const SYNC_BYTE: u8 = 0x55;

/// Address written once per frame after all other updates
pub const END_OF_UPDATE_ADDRESS: u16 = 0xFFFE;

/// Largest datagram accepted from the export stream
const MAX_DATAGRAM_SIZE: usize = 8192;

/// What a stream field holds and where its handler puts it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// DED line, zero-based index
    DedLine(usize),
}

impl FieldKind {
    /// Store key written by this field's handler
    pub fn store_key(&self) -> String {
        match self {
            Self::DedLine(index) => ded_line_key(*index),
        }
    }

    /// Apply a completed value to the store
    pub fn apply(&self, store: &SharedStateStore, value: &[u8]) {
        match self {
            Self::DedLine(_) => store.set(self.store_key(), StateValue::Bytes(value.to_vec())),
        }
    }
}

/// Static description of one exported field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub address: u16,
    pub length: usize,
}

impl FieldSpec {
    fn contains(&self, address: u16) -> bool {
        let start = usize::from(self.address);
        (start..start + self.length).contains(&usize::from(address))
    }
}

/// F-16C DED lines as exported by DCS-BIOS
pub const STREAM_FIELDS: [FieldSpec; 5] = [
    FieldSpec { kind: FieldKind::DedLine(0), address: 0x450A, length: 29 },
    FieldSpec { kind: FieldKind::DedLine(1), address: 0x4528, length: 29 },
    FieldSpec { kind: FieldKind::DedLine(2), address: 0x4546, length: 29 },
    FieldSpec { kind: FieldKind::DedLine(3), address: 0x4564, length: 29 },
    FieldSpec { kind: FieldKind::DedLine(4), address: 0x4582, length: 29 },
];

/// Byte-at-a-time decoder for the export stream
pub trait StreamDecoder: Send {
    /// Consume one byte, reporting every field that completed an update
    fn process_byte(&mut self, byte: u8, on_update: &mut dyn FnMut(FieldKind, &[u8]));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    WaitForSync,
    AddressLow,
    AddressHigh,
    CountLow,
    CountHigh,
    DataLow,
    DataHigh,
}

#[derive(Debug, Clone)]
struct FieldBuffer {
    layout: FieldSpec,
    bytes: Vec<u8>,
    dirty: bool,
}

/// Decoder for the fields in [`STREAM_FIELDS`]
#[derive(Debug, Clone)]
pub struct ExportStreamDecoder {
    state: ParserState,
    address: u16,
    count: u16,
    data_low: u8,
    sync_count: u8,
    fields: Vec<FieldBuffer>,
}

impl Default for ExportStreamDecoder {
    fn default() -> Self {
        Self::new(&STREAM_FIELDS)
    }
}

impl ExportStreamDecoder {
    /// Create a decoder tracking the given fields
    pub fn new(fields: &[FieldSpec]) -> Self {
        Self {
            state: ParserState::WaitForSync,
            address: 0,
            count: 0,
            data_low: 0,
            sync_count: 0,
            fields: fields
                .iter()
                .map(|layout| FieldBuffer {
                    layout: *layout,
                    bytes: vec![0u8; layout.length],
                    dirty: false,
                })
                .collect(),
        }
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        for field in &mut self.fields {
            if field.layout.contains(address) {
                let offset = usize::from(address - field.layout.address);
                if field.bytes[offset] != value {
                    field.bytes[offset] = value;
                    field.dirty = true;
                }
            }
        }
    }

    fn flush(&mut self, on_update: &mut dyn FnMut(FieldKind, &[u8])) {
        for field in &mut self.fields {
            if field.dirty {
                field.dirty = false;
                on_update(field.layout.kind, &field.bytes);
            }
        }
    }
}

impl StreamDecoder for ExportStreamDecoder {
    fn process_byte(&mut self, byte: u8, on_update: &mut dyn FnMut(FieldKind, &[u8])) {
        match self.state {
            ParserState::WaitForSync => {}
            ParserState::AddressLow => {
                self.address = u16::from(byte);
                self.state = ParserState::AddressHigh;
            }
            ParserState::AddressHigh => {
                self.address |= u16::from(byte) << 8;
                self.state = if self.address == 0x5555 {
                    ParserState::WaitForSync
                } else {
                    ParserState::CountLow
                };
            }
            ParserState::CountLow => {
                self.count = u16::from(byte);
                self.state = ParserState::CountHigh;
            }
            ParserState::CountHigh => {
                self.count |= u16::from(byte) << 8;
                self.state = if self.count == 0 {
                    ParserState::AddressLow
                } else {
                    ParserState::DataLow
                };
            }
            ParserState::DataLow => {
                self.data_low = byte;
                self.count = self.count.saturating_sub(1);
                self.state = ParserState::DataHigh;
            }
            ParserState::DataHigh => {
                let address = self.address;
                self.write_byte(address, self.data_low);
                self.write_byte(address.wrapping_add(1), byte);
                self.count = self.count.saturating_sub(1);

                if address == END_OF_UPDATE_ADDRESS {
                    self.flush(on_update);
                }

                self.address = address.wrapping_add(2);
                self.state = if self.count == 0 {
                    ParserState::AddressLow
                } else {
                    ParserState::DataLow
                };
            }
        }

        if byte == SYNC_BYTE {
            self.sync_count += 1;
        } else {
            self.sync_count = 0;
        }

        if self.sync_count == 4 {
            self.sync_count = 0;
            self.state = ParserState::AddressLow;
            self.flush(on_update);
        }
    }
}

/// Multicast endpoint of the export stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub group: Ipv4Addr,
    pub port: u16,
}

/// Bind to the stream's port and join its multicast group
///
/// The port is bound with `SO_REUSEADDR` so other export stream consumers
/// can listen on it at the same time.
///
/// # Errors
///
/// Returns [`BridgeError::Network`] if the socket cannot be bound or the
/// group cannot be joined
pub fn bind_multicast(endpoint: StreamEndpoint) -> Result<UdpSocket> {
    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, endpoint.port));
    let bind_error =
        |e: std::io::Error| BridgeError::Network(format!("Failed to bind {}: {}", bind_addr, e));

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    socket.bind(&bind_addr.into()).map_err(bind_error)?;
    socket
        .join_multicast_v4(&endpoint.group, &Ipv4Addr::UNSPECIFIED)
        .map_err(|e| {
            BridgeError::Network(format!("Failed to join {}: {}", endpoint.group, e))
        })?;
    socket.set_nonblocking(true)?;

    info!(
        group = %endpoint.group,
        port = endpoint.port,
        "Joined DCS-BIOS export stream"
    );
    Ok(UdpSocket::from_std(StdUdpSocket::from(socket))?)
}

/// Telemetry source fed by the export stream
pub struct StreamDecoderSource<D: StreamDecoder> {
    decoder: D,
    store: SharedStateStore,
}

impl<D: StreamDecoder> std::fmt::Debug for StreamDecoderSource<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDecoderSource").finish_non_exhaustive()
    }
}

impl<D: StreamDecoder + 'static> StreamDecoderSource<D> {
    pub fn new(decoder: D, store: SharedStateStore) -> Self {
        Self { decoder, store }
    }

    /// Feed one datagram through the decoder into the store
    pub fn ingest(&mut self, datagram: &[u8]) {
        let store = &self.store;
        let mut apply = |kind: FieldKind, value: &[u8]| kind.apply(store, value);
        for &byte in datagram {
            self.decoder.process_byte(byte, &mut apply);
        }
    }

    /// Spawn the ingestion task
    ///
    /// The task runs until `stop` flips to `true` or its sender is dropped.
    /// Receive errors are logged and the loop keeps going.
    pub fn start(mut self, socket: UdpSocket, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            let mut datagrams: u64 = 0;

            loop {
                let stopped = *stop.borrow();
                if stopped {
                    break;
                }

                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, _)) => {
                            datagrams += 1;
                            if datagrams == 1 {
                                info!("Received first export stream datagram ({} bytes)", len);
                            }
                            self.ingest(&buf[..len]);
                        }
                        Err(e) => warn!("Export stream receive error: {}", e),
                    },
                }
            }

            debug!("Ingestion task stopped after {} datagrams", datagrams);
        })
    }
}

/// Handle to a running ingestion task
#[derive(Debug)]
pub struct IngestionTask {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl IngestionTask {
    /// Start ingesting from an already bound socket
    pub fn spawn<D: StreamDecoder + 'static>(source: StreamDecoderSource<D>, socket: UdpSocket) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let handle = source.start(socket, stop_rx);
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

#[async_trait]
impl TelemetrySource for IngestionTask {
    fn poll(&mut self, _store: &SharedStateStore) -> bool {
        // Values arrive from the ingestion task.
        false
    }

    async fn shutdown(&mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Ingestion task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::assert_ok;

    /// Build one sync-prefixed frame writing `data` at `address`
    fn frame(address: u16, data: &[u8]) -> Vec<u8> {
        let mut bytes = vec![SYNC_BYTE; 4];
        bytes.extend_from_slice(&address.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    fn padded(text: &[u8], len: usize) -> Vec<u8> {
        let mut bytes = text.to_vec();
        bytes.resize(len, b' ');
        bytes
    }

    fn collect(decoder: &mut ExportStreamDecoder, bytes: &[u8]) -> Vec<(FieldKind, Vec<u8>)> {
        let mut updates = Vec::new();
        for &byte in bytes {
            decoder.process_byte(byte, &mut |kind, value| updates.push((kind, value.to_vec())));
        }
        updates
    }

    // ==================== Decoder ====================

    #[test]
    fn test_update_delivered_at_next_sync() {
        let mut decoder = ExportStreamDecoder::default();
        let line = padded(b"UHF 305.00", 30);

        let updates = collect(&mut decoder, &frame(0x450A, &line));
        assert!(updates.is_empty(), "updates wait for the frame boundary");

        let updates = collect(&mut decoder, &[SYNC_BYTE; 4]);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, FieldKind::DedLine(0));
        assert_eq!(updates[0].1, line[..29].to_vec());
    }

    #[test]
    fn test_update_delivered_at_end_of_update_marker() {
        let mut decoder = ExportStreamDecoder::default();
        let mut bytes = frame(0x4528, &padded(b"STPT 8", 30));
        bytes.extend_from_slice(&END_OF_UPDATE_ADDRESS.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&[0x01, 0x00]);

        let updates = collect(&mut decoder, &bytes);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, FieldKind::DedLine(1));
        assert!(updates[0].1.starts_with(b"STPT 8"));
    }

    #[test]
    fn test_unchanged_field_not_redelivered() {
        let mut decoder = ExportStreamDecoder::default();
        let bytes = frame(0x450A, &padded(b"COM1", 30));

        collect(&mut decoder, &bytes);
        assert_eq!(collect(&mut decoder, &bytes).len(), 1);
        assert!(collect(&mut decoder, &[SYNC_BYTE; 4]).is_empty());
    }

    #[test]
    fn test_writes_outside_table_ignored() {
        let mut decoder = ExportStreamDecoder::default();
        let mut bytes = frame(0x1000, &[1, 2, 3, 4]);
        bytes.extend_from_slice(&[SYNC_BYTE; 4]);

        assert!(collect(&mut decoder, &bytes).is_empty());
    }

    #[test]
    fn test_bytes_before_first_sync_ignored() {
        let mut decoder = ExportStreamDecoder::default();
        let mut bytes = vec![0x0A, 0x45, 0x02, 0x00, b'X', b'Y'];
        bytes.extend_from_slice(&[SYNC_BYTE; 4]);

        assert!(collect(&mut decoder, &bytes).is_empty());
    }

    #[test]
    fn test_partial_write_spanning_two_fields() {
        let mut decoder = ExportStreamDecoder::default();
        // Last byte of line 1 is 0x4526; 0x4527 is padding; line 2 starts at 0x4528.
        let mut bytes = frame(0x4526, &[b'A', b'_', b'B', b'C']);
        bytes.extend_from_slice(&[SYNC_BYTE; 4]);

        let updates = collect(&mut decoder, &bytes);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].0, FieldKind::DedLine(0));
        assert_eq!(updates[0].1[28], b'A');
        assert_eq!(updates[1].0, FieldKind::DedLine(1));
        assert_eq!(&updates[1].1[..2], b"BC");
    }

    #[test]
    fn test_field_table_is_static_and_ordered() {
        for (i, layout) in STREAM_FIELDS.iter().enumerate() {
            assert_eq!(layout.kind, FieldKind::DedLine(i));
            assert_eq!(layout.length, 29);
            assert_eq!(layout.kind.store_key(), format!("DED_line{}", i + 1));
        }
        assert_eq!(STREAM_FIELDS[1].address - STREAM_FIELDS[0].address, 30);
    }

    // ==================== Source ====================

    #[test]
    fn test_ingest_writes_store() {
        let store = SharedStateStore::new();
        let mut source = StreamDecoderSource::new(ExportStreamDecoder::default(), store.clone());

        let mut datagram = frame(0x450A, &padded(b"  UHF  242.00", 30));
        datagram.extend_from_slice(&[SYNC_BYTE; 4]);
        source.ingest(&datagram);

        let value = store.get("DED_line1");
        assert!(value.as_bytes().starts_with(b"  UHF  242.00"));
        assert_eq!(value.as_bytes().len(), 29);
    }

    #[tokio::test]
    async fn test_ingestion_task_receives_and_stops() {
        let store = SharedStateStore::new();
        let source = StreamDecoderSource::new(ExportStreamDecoder::default(), store.clone());

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let mut task = IngestionTask::spawn(source, socket);
        assert!(task.is_running());

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut datagram = frame(0x450A, &padded(b"CRUS", 30));
        datagram.extend_from_slice(&[SYNC_BYTE; 4]);
        sender.send_to(&datagram, addr).await.unwrap();

        let mut delivered = false;
        for _ in 0..100 {
            if store.get("DED_line1").as_bytes().starts_with(b"CRUS") {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(delivered, "datagram never reached the store");

        tokio::time::timeout(Duration::from_secs(1), task.shutdown())
            .await
            .expect("ingestion task did not stop");
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn test_multicast_port_can_be_shared() {
        let group = Ipv4Addr::new(239, 255, 50, 10);
        let first = bind_multicast(StreamEndpoint { group, port: 0 }).unwrap();
        let port = first.local_addr().unwrap().port();

        let second = assert_ok!(bind_multicast(StreamEndpoint { group, port }));
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_ingestion_task_stops_when_sender_dropped() {
        let source = StreamDecoderSource::new(ExportStreamDecoder::default(), SharedStateStore::new());
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (stop, stop_rx) = watch::channel(false);

        let handle = source.start(socket, stop_rx);
        drop(stop);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("ingestion task did not stop")
            .unwrap();
    }
}
