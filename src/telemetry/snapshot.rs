//! # Polled Snapshot Source
//!
//! Reads the Falcon BMS shared memory records on demand.
//!
//! Each call to [`PolledSnapshotSource::refresh`] copies the named regions,
//! decodes them, and returns an immutable [`Snapshot`]. When the simulator is
//! not running the regions do not exist; that is reported as `None`, never as
//! an error, so the main loop keeps the values it already has.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::records::{
    FlightData, FlightData2, IntellivibeData, StringArea, FLIGHT_DATA2_AREA, FLIGHT_DATA2_SIZE,
    FLIGHT_DATA_AREA, FLIGHT_DATA_SIZE, INTELLIVIBE_AREA, INTELLIVIBE_SIZE, STRING_AREA,
    STRING_AREA_MAX_SIZE,
};
use super::store::{SharedStateStore, StateValue};
use super::{TelemetrySource, FLIGHT_DATA2_KEY, FLIGHT_DATA_KEY, INTELLIVIBE_KEY, STRINGS_KEY};
use crate::error::{BridgeError, Result};

/// Access to named shared memory regions
pub trait SharedMemory: Send {
    /// Copy up to `max_len` bytes of the region called `name`.
    ///
    /// Returns `Ok(None)` when the region does not exist.
    fn read_region(&self, name: &str, max_len: usize) -> Result<Option<Vec<u8>>>;
}

/// Shared memory regions exposed as files in one directory (e.g. `/dev/shm`)
#[derive(Debug, Clone)]
pub struct ShmDirectory {
    root: PathBuf,
}

impl ShmDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SharedMemory for ShmDirectory {
    fn read_region(&self, name: &str, max_len: usize) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BridgeError::TelemetryUnavailable(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut buf = Vec::with_capacity(max_len.min(64 * 1024));
        file.take(max_len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| BridgeError::TelemetryUnavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Some(buf))
    }
}

/// One decoded read of all regions
///
/// The primary record is mandatory; the others are attached when they could
/// be read.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub flight_data: Arc<FlightData>,
    pub flight_data2: Option<Arc<FlightData2>>,
    pub intellivibe: Option<Arc<IntellivibeData>>,
    pub strings: Option<Arc<StringArea>>,
}

impl Snapshot {
    /// Write every record present in this snapshot into the store
    pub fn publish(&self, store: &SharedStateStore) {
        store.set(FLIGHT_DATA_KEY, StateValue::FlightData(Arc::clone(&self.flight_data)));
        if let Some(data) = &self.flight_data2 {
            store.set(FLIGHT_DATA2_KEY, StateValue::FlightData2(Arc::clone(data)));
        }
        if let Some(data) = &self.intellivibe {
            store.set(INTELLIVIBE_KEY, StateValue::Intellivibe(Arc::clone(data)));
        }
        if let Some(strings) = &self.strings {
            store.set(STRINGS_KEY, StateValue::Strings(Arc::clone(strings)));
        }
    }
}

/// Telemetry source backed by polled shared memory reads
#[derive(Debug)]
pub struct PolledSnapshotSource<M: SharedMemory> {
    memory: M,
    /// Last observed availability, `None` before the first read
    available: Option<bool>,
}

impl<M: SharedMemory> PolledSnapshotSource<M> {
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            available: None,
        }
    }

    /// Read a fresh snapshot, or `None` if the simulator is not publishing.
    ///
    /// Availability changes are logged once per transition.
    pub fn refresh(&mut self) -> Option<Snapshot> {
        let result = self.read_snapshot();
        let now_available = matches!(result, Ok(Some(_)));

        if self.available != Some(now_available) {
            match &result {
                Ok(Some(snapshot)) => info!(
                    "Falcon BMS shared memory available (version {})",
                    snapshot.flight_data.version_num
                ),
                Ok(None) => warn!("Falcon BMS shared memory not found, is the simulator running?"),
                Err(e) => warn!("Falcon BMS shared memory unreadable: {}", e),
            }
            self.available = Some(now_available);
        }

        result.ok().flatten()
    }

    fn read_snapshot(&self) -> Result<Option<Snapshot>> {
        let Some(primary) = self.memory.read_region(FLIGHT_DATA_AREA, FLIGHT_DATA_SIZE)? else {
            return Ok(None);
        };

        Ok(Some(Snapshot {
            flight_data: Arc::new(FlightData::from_bytes(&primary)?),
            flight_data2: self.read_optional(FLIGHT_DATA2_AREA, FLIGHT_DATA2_SIZE, FlightData2::from_bytes),
            intellivibe: self.read_optional(INTELLIVIBE_AREA, INTELLIVIBE_SIZE, IntellivibeData::from_bytes),
            strings: self.read_optional(STRING_AREA, STRING_AREA_MAX_SIZE, StringArea::from_bytes),
        }))
    }

    fn read_optional<T>(
        &self,
        name: &str,
        max_len: usize,
        decode: fn(&[u8]) -> Result<T>,
    ) -> Option<Arc<T>> {
        match self.memory.read_region(name, max_len) {
            Ok(Some(buf)) => match decode(&buf) {
                Ok(record) => Some(Arc::new(record)),
                Err(e) => {
                    debug!("Skipping {}: {}", name, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
                None
            }
        }
    }
}

#[async_trait]
impl<M: SharedMemory> TelemetrySource for PolledSnapshotSource<M> {
    fn poll(&mut self, store: &SharedStateStore) -> bool {
        match self.refresh() {
            Some(snapshot) => {
                snapshot.publish(store);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::records::fixtures::{flight_data_bytes, string_area_bytes};
    use std::fs;
    use tempfile::TempDir;

    fn shm_with_primary(ded: &[&[u8]]) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(FLIGHT_DATA_AREA), flight_data_bytes(ded)).unwrap();
        dir
    }

    #[test]
    fn test_missing_region_is_absent() {
        let dir = TempDir::new().unwrap();
        let mut source = PolledSnapshotSource::new(ShmDirectory::new(dir.path()));

        assert!(source.refresh().is_none());
        assert!(source.refresh().is_none());
    }

    #[test]
    fn test_truncated_primary_is_absent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(FLIGHT_DATA_AREA), vec![0u8; 100]).unwrap();
        let mut source = PolledSnapshotSource::new(ShmDirectory::new(dir.path()));

        assert!(source.refresh().is_none());
    }

    #[test]
    fn test_refresh_reads_primary_only() {
        let dir = shm_with_primary(&[b"COM1"]);
        let mut source = PolledSnapshotSource::new(ShmDirectory::new(dir.path()));

        let snapshot = source.refresh().unwrap();
        assert_eq!(&snapshot.flight_data.ded_lines[0][..4], b"COM1");
        assert!(snapshot.flight_data2.is_none());
        assert!(snapshot.intellivibe.is_none());
        assert!(snapshot.strings.is_none());
    }

    #[test]
    fn test_refresh_reads_all_regions() {
        let dir = shm_with_primary(&[]);
        fs::write(dir.path().join(FLIGHT_DATA2_AREA), vec![0u8; FLIGHT_DATA2_SIZE]).unwrap();
        fs::write(dir.path().join(INTELLIVIBE_AREA), vec![0u8; INTELLIVIBE_SIZE]).unwrap();
        fs::write(dir.path().join(STRING_AREA), string_area_bytes(&[(29, "F-16C-50")])).unwrap();
        let mut source = PolledSnapshotSource::new(ShmDirectory::new(dir.path()));

        let snapshot = source.refresh().unwrap();
        assert!(snapshot.flight_data2.is_some());
        assert!(snapshot.intellivibe.is_some());
        assert_eq!(snapshot.strings.unwrap().get("AcName"), Some("F-16C-50"));
    }

    #[test]
    fn test_oversized_region_is_capped() {
        let dir = TempDir::new().unwrap();
        let mut bytes = flight_data_bytes(&[]);
        bytes.extend_from_slice(&[0xAA; 64]);
        fs::write(dir.path().join(FLIGHT_DATA_AREA), bytes).unwrap();

        let memory = ShmDirectory::new(dir.path());
        let buf = memory.read_region(FLIGHT_DATA_AREA, FLIGHT_DATA_SIZE).unwrap().unwrap();
        assert_eq!(buf.len(), FLIGHT_DATA_SIZE);
    }

    #[test]
    fn test_poll_publishes_to_store() {
        let dir = shm_with_primary(&[b"STPT"]);
        let mut source = PolledSnapshotSource::new(ShmDirectory::new(dir.path()));
        let store = SharedStateStore::new();

        assert!(source.poll(&store));

        let value = store.get(FLIGHT_DATA_KEY);
        let record = value.as_flight_data().unwrap();
        assert_eq!(&record.ded_lines[0][..4], b"STPT");
    }

    #[test]
    fn test_poll_keeps_prior_values_when_absent() {
        let dir = shm_with_primary(&[b"STPT"]);
        let mut source = PolledSnapshotSource::new(ShmDirectory::new(dir.path()));
        let store = SharedStateStore::new();
        assert!(source.poll(&store));

        fs::remove_file(dir.path().join(FLIGHT_DATA_AREA)).unwrap();
        assert!(!source.poll(&store));

        assert!(store.get(FLIGHT_DATA_KEY).as_flight_data().is_some());
    }
}
