//! Contract for the durable gallery store and an in-process implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::StoreError;
use crate::reid::identity::{GalleryRecord, IdentityId};

/// Free-form metadata stored next to an embedding.
pub type Metadata = HashMap<String, String>;

/// Durable key-value store of identity embeddings.
///
/// Calls are best-effort. Implementations report failures as
/// [`StoreError`]; the feature bank never lets them reach its caller.
/// Timeouts are the implementation's concern.
pub trait GalleryStore {
    /// Whether the store believes it can currently serve requests.
    fn is_ready(&self) -> bool;

    /// Fetch every stored identity.
    fn fetch_all(&mut self) -> Result<HashMap<IdentityId, GalleryRecord>, StoreError>;

    /// Insert or replace an identity's record, timestamp included, and
    /// merge `metadata` into what is stored.
    fn upsert(
        &mut self,
        id: &IdentityId,
        record: &GalleryRecord,
        metadata: &Metadata,
    ) -> Result<(), StoreError>;

    /// Refresh an identity's `last_seen` only. Unknown ids fail with
    /// [`StoreError::NotFound`].
    fn touch(&mut self, id: &IdentityId) -> Result<(), StoreError>;

    /// Delete an identity. Deleting an unknown id succeeds.
    fn remove(&mut self, id: &IdentityId) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct MemoryGalleryInner {
    records: HashMap<IdentityId, (GalleryRecord, Metadata)>,
    offline: bool,
}

/// In-process gallery store.
///
/// Clones share the same records, so one session can reload what an
/// earlier session wrote. `set_online(false)` simulates a lost connection.
#[derive(Debug, Clone, Default)]
pub struct MemoryGallery {
    inner: Arc<Mutex<MemoryGalleryInner>>,
}

impl MemoryGallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.offline = !online;
        }
    }

    /// Insert a record directly, bypassing availability.
    pub fn insert(&self, id: IdentityId, record: GalleryRecord) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.records.insert(id, (record, Metadata::new()));
        }
    }

    pub fn get(&self, id: &IdentityId) -> Option<GalleryRecord> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.records.get(id).map(|(r, _)| r.clone()))
    }

    pub fn metadata(&self, id: &IdentityId) -> Option<Metadata> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.records.get(id).map(|(_, m)| m.clone()))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_online<T>(
        &self,
        f: impl FnOnce(&mut MemoryGalleryInner) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if inner.offline {
            return Err(StoreError::Unavailable);
        }
        f(&mut *inner)
    }
}

impl GalleryStore for MemoryGallery {
    fn is_ready(&self) -> bool {
        self.inner.lock().map(|inner| !inner.offline).unwrap_or(false)
    }

    fn fetch_all(&mut self) -> Result<HashMap<IdentityId, GalleryRecord>, StoreError> {
        self.with_online(|inner| {
            Ok(inner
                .records
                .iter()
                .map(|(id, (record, _))| (id.clone(), record.clone()))
                .collect())
        })
    }

    fn upsert(
        &mut self,
        id: &IdentityId,
        record: &GalleryRecord,
        metadata: &Metadata,
    ) -> Result<(), StoreError> {
        self.with_online(|inner| {
            let entry = inner
                .records
                .entry(id.clone())
                .or_insert_with(|| (record.clone(), Metadata::new()));
            entry.0 = record.clone();
            entry.1.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(())
        })
    }

    fn touch(&mut self, id: &IdentityId) -> Result<(), StoreError> {
        self.with_online(|inner| match inner.records.get_mut(id) {
            Some((record, _)) => {
                record.last_seen = Some(Utc::now());
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        })
    }

    fn remove(&mut self, id: &IdentityId) -> Result<(), StoreError> {
        self.with_online(|inner| {
            inner.records.remove(id);
            Ok(())
        })
    }
}
