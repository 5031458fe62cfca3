//! Appearance gallery that maps embeddings to durable identities.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError, check_unit};
use crate::reid::gallery::{GalleryStore, Metadata};
use crate::reid::identity::{Identity, IdentityId};
use crate::tracker::{Embedding, blend, cosine_similarity};

/// Configuration for the FeatureBank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureBankConfig {
    /// Cosine similarity a stored identity must exceed to match
    pub match_threshold: f32,
    /// Share of the stored embedding kept when a match is blended in
    pub feature_momentum: f32,
    /// Prefix of minted identity ids
    pub id_prefix: String,
}

impl Default for FeatureBankConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.7,
            feature_momentum: 0.8,
            id_prefix: "ID".to_string(),
        }
    }
}

impl FeatureBankConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("match_threshold", self.match_threshold)?;
        check_unit("feature_momentum", self.feature_momentum)?;
        if self.id_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        Ok(())
    }
}

/// Local identity cache with an optional durable store behind it.
///
/// Every [`resolve`](Self::resolve) scans the whole gallery, so cost grows
/// linearly with the number of identities. Galleries of a few hundred
/// entries are the intended size; callers keep it bounded with
/// [`expire`](Self::expire).
///
/// Store failures never surface as errors. They are logged and reflected
/// by [`store_ready`](Self::store_ready), and the bank keeps working from
/// its local cache.
pub struct FeatureBank {
    identities: Vec<Identity>,
    next_seq: u64,
    config: FeatureBankConfig,
    store: Option<Box<dyn GalleryStore + Send>>,
    store_ready: bool,
    /// Expired ids not yet deleted from the store
    pending_removals: BTreeSet<IdentityId>,
}

impl std::fmt::Debug for FeatureBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureBank")
            .field("identities", &self.identities.len())
            .field("next_seq", &self.next_seq)
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .field("store_ready", &self.store_ready)
            .field("pending_removals", &self.pending_removals.len())
            .finish()
    }
}

impl FeatureBank {
    /// Create a bank that works from its local cache only.
    pub fn new(config: FeatureBankConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            identities: Vec::new(),
            next_seq: 1,
            config,
            store: None,
            store_ready: false,
            pending_removals: BTreeSet::new(),
        })
    }

    /// Create a bank backed by `store` and load the gallery from it.
    ///
    /// An unreachable store leaves the bank empty and local-only until a
    /// later [`sync`](Self::sync) succeeds.
    pub fn with_store(
        config: FeatureBankConfig,
        store: impl GalleryStore + Send + 'static,
    ) -> Result<Self, ConfigError> {
        let mut bank = Self::new(config)?;
        bank.store_ready = store.is_ready();
        bank.store = Some(Box::new(store));
        bank.sync();
        Ok(bank)
    }

    /// Map `embedding` to an identity, minting one if nothing matches.
    pub fn resolve(&mut self, embedding: &Embedding) -> IdentityId {
        self.resolve_at(embedding, Utc::now())
    }

    /// [`resolve`](Self::resolve) with an explicit clock.
    pub fn resolve_at(&mut self, embedding: &Embedding, now: DateTime<Utc>) -> IdentityId {
        let best = self
            .identities
            .iter()
            .enumerate()
            .map(|(idx, identity)| {
                (idx, cosine_similarity(identity.embedding.view(), embedding.view()))
            })
            .fold(None, |best: Option<(usize, f32)>, (idx, sim)| match best {
                Some((_, best_sim)) if best_sim >= sim => best,
                _ => Some((idx, sim)),
            });

        if let Some((idx, similarity)) = best {
            let best_id = &self.identities[idx].identity_id;
            log::trace!("best gallery match {best_id} at {similarity:.3}");
            if similarity > self.config.match_threshold {
                let momentum = self.config.feature_momentum;
                let identity = &mut self.identities[idx];
                identity.embedding = blend(identity.embedding.view(), embedding.view(), momentum);
                identity.last_seen = Some(now);
                let id = identity.identity_id.clone();
                let record = identity.to_record();
                log::debug!("Identity matched: {id} (similarity {similarity:.3})");
                // identities minted during an outage are not in the store yet
                self.store_call(|store| match store.touch(&id) {
                    Err(StoreError::NotFound(_)) => store.upsert(&id, &record, &Metadata::new()),
                    other => other,
                });
                return id;
            }
        }

        let id = self.mint_id();
        log::debug!("Identity minted: {id}");
        let identity = Identity {
            identity_id: id.clone(),
            embedding: embedding.clone(),
            last_seen: Some(now),
        };
        let record = identity.to_record();
        self.identities.push(identity);
        self.store_call(|store| store.upsert(&id, &record, &Metadata::new()));
        id
    }

    /// Remove identities unseen for longer than `max_age`, sparing
    /// `protected`. Returns the removed ids so the caller can clean up
    /// anything stored alongside them.
    ///
    /// Removed ids are deleted from the store as well. While the store is
    /// unreachable the deletes are kept and retried by later
    /// [`flush`](Self::flush) and [`sync`](Self::sync) calls, and `sync`
    /// does not bring those ids back.
    pub fn expire(&mut self, max_age: Duration, protected: &[IdentityId]) -> Vec<IdentityId> {
        self.expire_at(Utc::now(), max_age, protected)
    }

    /// [`expire`](Self::expire) with an explicit clock.
    ///
    /// Identities without a `last_seen` timestamp count as stale.
    pub fn expire_at(
        &mut self,
        now: DateTime<Utc>,
        max_age: Duration,
        protected: &[IdentityId],
    ) -> Vec<IdentityId> {
        let protected: HashSet<&IdentityId> = protected.iter().collect();
        let mut removed = Vec::new();
        self.identities.retain(|identity| {
            if protected.contains(&identity.identity_id) {
                return true;
            }
            let stale = match identity.last_seen {
                Some(seen) => now - seen > max_age,
                None => true,
            };
            if stale {
                removed.push(identity.identity_id.clone());
            }
            !stale
        });

        if !removed.is_empty() {
            log::info!("Expired {} stale identities: {:?}", removed.len(), removed);
        }
        if self.store.is_some() && !removed.is_empty() {
            self.pending_removals.extend(removed.iter().cloned());
            self.push_removals();
        }
        removed
    }

    /// Merge the store's gallery into the local cache.
    ///
    /// The cache is authoritative for identities it already holds, so only
    /// identities it does not know are added. Identities known only locally
    /// stay until a [`flush`](Self::flush) writes them. Returns `false` and
    /// leaves the cache untouched when there is no store or it cannot be
    /// reached.
    pub fn sync(&mut self) -> bool {
        if self.store.is_none() {
            return false;
        }
        if !self.push_removals() {
            log::warn!("Gallery sync skipped, pending deletes not applied");
            return false;
        }
        let Some(store) = self.store.as_mut() else {
            return false;
        };
        let records = match store.fetch_all() {
            Ok(records) => records,
            Err(err) => {
                log::warn!("Gallery sync failed, keeping local cache: {err}");
                self.store_ready = false;
                return false;
            }
        };

        let mut incoming: Vec<Identity> = records
            .into_iter()
            .map(|(id, record)| Identity::from_record(id, record))
            .collect();
        incoming.sort_by(|a, b| a.identity_id.cmp(&b.identity_id));

        let fetched = incoming.len();
        for identity in incoming {
            if self.pending_removals.contains(&identity.identity_id) {
                continue;
            }
            if self.get(&identity.identity_id).is_none() {
                self.identities.push(identity);
            }
        }

        let prefix = &self.config.id_prefix;
        let max_seq = self
            .identities
            .iter()
            .filter_map(|i| i.identity_id.sequence(prefix))
            .max()
            .unwrap_or(0);
        self.next_seq = self.next_seq.max(max_seq + 1);
        self.store_ready = true;
        log::info!("Gallery synced: {fetched} fetched, {} cached", self.identities.len());
        true
    }

    /// Push every cached identity, with its local `last_seen`, to the store
    /// and apply pending deletes. Returns how many identities were written.
    pub fn flush(&mut self) -> usize {
        let Some(store) = self.store.as_mut() else {
            return 0;
        };
        let metadata = Metadata::new();
        let mut written = 0;
        for identity in &self.identities {
            match store.upsert(&identity.identity_id, &identity.to_record(), &metadata) {
                Ok(()) => written += 1,
                Err(err) => {
                    log::warn!("Gallery flush stopped at {}: {err}", identity.identity_id);
                    self.store_ready = false;
                    return written;
                }
            }
        }
        self.store_ready = true;
        self.push_removals();
        written
    }

    /// Refresh the local `last_seen` of an identity without touching the
    /// store. Returns `false` if the identity is not cached.
    pub fn mark_seen_at(&mut self, id: &IdentityId, now: DateTime<Utc>) -> bool {
        match self.identities.iter_mut().find(|i| &i.identity_id == id) {
            Some(identity) => {
                identity.last_seen = Some(now);
                true
            }
            None => false,
        }
    }

    /// Whether the last store interaction succeeded.
    pub fn store_ready(&self) -> bool {
        self.store.is_some() && self.store_ready
    }

    pub fn get(&self, id: &IdentityId) -> Option<&Identity> {
        self.identities.iter().find(|i| &i.identity_id == id)
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn config(&self) -> &FeatureBankConfig {
        &self.config
    }

    fn mint_id(&mut self) -> IdentityId {
        loop {
            let id = IdentityId::numbered(&self.config.id_prefix, self.next_seq);
            self.next_seq += 1;
            if self.get(&id).is_none() {
                return id;
            }
        }
    }

    /// Delete pending ids from the store. Returns `false` if some are left.
    fn push_removals(&mut self) -> bool {
        let Some(store) = self.store.as_mut() else {
            return true;
        };
        while let Some(id) = self.pending_removals.first().cloned() {
            if let Err(err) = store.remove(&id) {
                log::warn!("Gallery delete of {id} deferred: {err}");
                self.store_ready = false;
                return false;
            }
            self.pending_removals.remove(&id);
        }
        true
    }

    fn store_call(
        &mut self,
        call: impl FnOnce(&mut (dyn GalleryStore + Send)) -> Result<(), StoreError>,
    ) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        match call(&mut **store) {
            Ok(()) => self.store_ready = true,
            Err(err) => {
                log::warn!("Gallery store call failed, continuing locally: {err}");
                self.store_ready = false;
            }
        }
    }
}
