//! # Shared State Store
//!
//! The single place where telemetry lands, whichever source produced it.
//!
//! The store is written from the ingestion task (stream mode) and read from
//! the main loop, so every access goes through a reader/writer lock. Each
//! `get`/`set` is atomic on its own; there is no multi-key transaction, and a
//! reader may observe a multi-field update half applied.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::records::{FlightData, FlightData2, IntellivibeData, StringArea};

/// A value held in the store
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// Decoded text; the empty string is the placeholder
    Text(String),
    /// Raw bytes as delivered by the stream decoder
    Bytes(Vec<u8>),
    /// Decoded scalar
    Number(f64),
    /// Primary flight data record
    FlightData(Arc<FlightData>),
    /// Secondary flight data record
    FlightData2(Arc<FlightData2>),
    /// Event counter record
    Intellivibe(Arc<IntellivibeData>),
    /// Shared string table
    Strings(Arc<StringArea>),
}

impl StateValue {
    /// The placeholder every key reads as before its first real update
    #[must_use]
    pub fn placeholder() -> Self {
        Self::Text(String::new())
    }

    /// Raw byte view for text-like values, empty for everything else
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
            _ => &[],
        }
    }

    #[must_use]
    pub fn as_flight_data(&self) -> Option<&Arc<FlightData>> {
        match self {
            Self::FlightData(record) => Some(record),
            _ => None,
        }
    }
}

/// Cloneable handle to the concurrency-safe key/value store
///
/// # Examples
///
/// ```
/// use cockpit_bridge::telemetry::store::{SharedStateStore, StateValue};
///
/// let store = SharedStateStore::new();
/// assert_eq!(store.get("DED_line1"), StateValue::placeholder());
///
/// store.set("DED_line1", StateValue::Text("UHF 305.00".into()));
/// assert_eq!(store.get("DED_line1"), StateValue::Text("UHF 305.00".into()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedStateStore {
    inner: Arc<RwLock<HashMap<String, StateValue>>>,
}

impl SharedStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for `key`, or the placeholder if it was never set
    pub fn get(&self, key: &str) -> StateValue {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_else(StateValue::placeholder)
    }

    /// Overwrite `key` (last write wins)
    pub fn set(&self, key: impl Into<String>, value: StateValue) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Seed placeholders for `keys` without clobbering values already present
    pub fn initialize_placeholders<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            map.entry(key.into()).or_insert_with(StateValue::placeholder);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> HashMap<String, StateValue> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
