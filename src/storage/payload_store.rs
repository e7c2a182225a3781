use std::{
    any::Any,
    collections::HashMap,
    fmt::{self, Debug},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use dashmap::DashMap;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, trace};

use crate::common::{
    error::TradeError,
    persist::{Persistable, Persister},
};

/// Broadcastable data that is stored once and identified by its content.
#[typetag::serde(tag = "type")]
pub trait PersistableNetworkPayload: DynClone + Debug + Send + Sync {
    fn any_ref(&self) -> &dyn Any;
}

dyn_clone::clone_trait_object!(PersistableNetworkPayload);

impl dyn PersistableNetworkPayload {
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.any_ref().downcast_ref()
    }

    // SHA-256 over the tagged JSON form, so equal content always lands on the same key
    pub fn hash(&self) -> Result<PayloadHash, TradeError> {
        let json = serde_json::to_vec(self)?;
        Ok(PayloadHash(Sha256::digest(json).into()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PayloadHash([u8; 32]);

impl PayloadHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PayloadHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl TryFrom<String> for PayloadHash {
    type Error = TradeError;

    fn try_from(hex_string: String) -> Result<Self, Self::Error> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_string, &mut bytes)?;
        Ok(PayloadHash(bytes))
    }
}

impl From<PayloadHash> for String {
    fn from(hash: PayloadHash) -> String {
        hex::encode(hash.0)
    }
}

impl fmt::Display for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Debug for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadHash({})", self)
    }
}

type PayloadMap = HashMap<PayloadHash, Box<dyn PersistableNetworkPayload>>;

#[derive(Serialize, Deserialize)]
struct PayloadStoreSnapshot {
    entries: PayloadMap,
}

struct PayloadEntries(DashMap<PayloadHash, Box<dyn PersistableNetworkPayload>>);

impl PayloadEntries {
    fn snapshot(&self) -> PayloadMap {
        self.0
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

impl Persistable for PayloadEntries {
    fn to_json(&self) -> Result<String, TradeError> {
        let snapshot = PayloadStoreSnapshot {
            entries: self.snapshot(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }
}

/// Upsert-only map of network payloads keyed by content hash.
///
/// Safe to share across threads without outside locking. Entries are never removed, an
/// upsert under an existing key replaces the value.
pub struct PersistableNetworkPayloadStore {
    entries: Arc<PayloadEntries>,
    persister: Mutex<Option<Persister>>,
}

impl PersistableNetworkPayloadStore {
    pub fn new() -> Self {
        Self::from_map(PayloadMap::new())
    }

    fn from_map(map: PayloadMap) -> Self {
        let entries = DashMap::with_capacity(map.len());
        for (hash, payload) in map {
            entries.insert(hash, payload);
        }
        PersistableNetworkPayloadStore {
            entries: Arc::new(PayloadEntries(entries)),
            persister: Mutex::new(None),
        }
    }

    /// Loads the store persisted at `data_path` and keeps persisting to the same path.
    pub fn restore(data_path: impl AsRef<Path>) -> Result<Self, TradeError> {
        let json = Persister::restore(&data_path)?;
        let snapshot: PayloadStoreSnapshot = serde_json::from_str(&json)?;
        info!(
            "PayloadStore restored {} entries from {}",
            snapshot.entries.len(),
            data_path.as_ref().display()
        );
        let store = Self::from_map(snapshot.entries);
        store.attach_persister(data_path);
        Ok(store)
    }

    pub fn attach_persister(&self, data_path: impl AsRef<Path>) {
        let persistable: Arc<dyn Persistable> = self.entries.clone();
        let persister = Persister::new(persistable, data_path);
        persister.queue();
        if let Some(previous) = self.lock_persister().replace(persister) {
            if let Some(error) = previous.terminate().err() {
                debug!("PayloadStore previous persister terminate - {}", error);
            }
        }
    }

    fn lock_persister(&self) -> MutexGuard<'_, Option<Persister>> {
        match self.persister.lock() {
            Ok(persister) => persister,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn queue_persistence(&self) {
        if let Some(persister) = self.lock_persister().as_ref() {
            persister.queue();
        }
    }

    pub fn upsert(
        &self,
        payload: Box<dyn PersistableNetworkPayload>,
    ) -> Result<PayloadHash, TradeError> {
        let hash = payload.hash()?;
        self.upsert_with_key(hash, payload);
        Ok(hash)
    }

    pub fn upsert_with_key(&self, hash: PayloadHash, payload: Box<dyn PersistableNetworkPayload>) {
        trace!("PayloadStore upsert {}", hash);
        self.entries.0.insert(hash, payload);
        self.queue_persistence();
    }

    pub fn get(&self, hash: &PayloadHash) -> Option<Box<dyn PersistableNetworkPayload>> {
        self.entries.0.get(hash).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, hash: &PayloadHash) -> bool {
        self.entries.0.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.0.is_empty()
    }

    // Point-in-time copy, writers are never blocked for the whole map
    pub fn snapshot(&self) -> HashMap<PayloadHash, Box<dyn PersistableNetworkPayload>> {
        self.entries.snapshot()
    }

    pub fn terminate_persistence(&self) -> Result<(), TradeError> {
        match self.lock_persister().take() {
            Some(persister) => persister.terminate(),
            None => Ok(()),
        }
    }
}

impl Default for PersistableNetworkPayloadStore {
    fn default() -> Self {
        Self::new()
    }
}
