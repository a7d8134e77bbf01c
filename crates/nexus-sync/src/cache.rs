//! Entity cache for note, label and workspace collections.
//!
//! Each collection is keyed by a query key (owner plus filter). Entries carry
//! the time they were fetched and become stale after the freshness window;
//! a stale or missing entry is refetched on the next read. At most one fetch
//! per key is outstanding: concurrent readers share it.
//!
//! Writes are synchronous and apply to every cached entry that holds the
//! entity. Each write returns a [`Rollback`] that restores exactly what it
//! changed, and bumps the entry's generation so that a fetch which started
//! before the write cannot overwrite it when it lands.
//!
//! Entries nobody subscribes to are evicted after the idle window by
//! [`CollectionCache::evict_idle`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use nexus_core::{Entity, Label, Note, Result, Workspace};

use crate::config::SyncConfig;

// =============================================================================
// KEYS AND ENTRIES
// =============================================================================

/// Anything usable as a query key.
pub trait CacheKey: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static {}

impl<K> CacheKey for K where K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static {}

/// Query key of a notes collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotesKey {
    pub owner_id: Uuid,
    /// `None` is the "all notes" collection.
    pub workspace_id: Option<Uuid>,
}

impl NotesKey {
    pub fn new(owner_id: Uuid, workspace_id: Option<Uuid>) -> Self {
        Self {
            owner_id,
            workspace_id,
        }
    }

    /// Whether a note owned by `owner_id` in `workspace_id` belongs in this
    /// collection.
    pub fn admits(&self, owner_id: Uuid, workspace_id: Option<Uuid>) -> bool {
        self.owner_id == owner_id
            && (self.workspace_id.is_none() || self.workspace_id == workspace_id)
    }
}

impl fmt::Display for NotesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.workspace_id {
            Some(ws) => write!(f, "notes:{}:{}", self.owner_id, ws),
            None => write!(f, "notes:{}:all", self.owner_id),
        }
    }
}

/// A cached collection as seen by a reader.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry<T> {
    pub data: Vec<T>,
    pub fetched_at: Instant,
    pub is_stale: bool,
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Reads that joined an outstanding fetch instead of starting one.
    pub deduplicated: u64,
    /// Fetch results dropped because the entry changed while in flight.
    pub discarded: u64,
    pub evicted: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    deduplicated: AtomicU64,
    discarded: AtomicU64,
    evicted: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Vec<T>>>>;

struct Slot<T> {
    data: Option<Vec<T>>,
    fetched_at: Instant,
    invalidated: bool,
    last_access: Instant,
    generation: u64,
    subscribers: usize,
    in_flight: Option<(u64, SharedFetch<T>)>,
}

impl<T: Entity> Slot<T> {
    fn empty(now: Instant) -> Self {
        Self {
            data: None,
            fetched_at: now,
            invalidated: false,
            last_access: now,
            generation: 0,
            subscribers: 0,
            in_flight: None,
        }
    }

    fn entry(&self, now: Instant, stale_after: Duration) -> Option<CachedEntry<T>> {
        self.data.as_ref().map(|data| CachedEntry {
            data: data.clone(),
            fetched_at: self.fetched_at,
            is_stale: self.invalidated || now.duration_since(self.fetched_at) >= stale_after,
        })
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.data
            .as_ref()
            .and_then(|data| data.iter().position(|e| e.id() == id))
    }
}

// =============================================================================
// ROLLBACK
// =============================================================================

#[derive(Debug, Clone)]
enum Undo<T> {
    /// Put the previous value back in place.
    Restore(T),
    /// Drop an optimistically inserted entity.
    Remove(Uuid),
    /// Re-insert an optimistically removed entity at its old index.
    Reinsert { index: usize, entity: T },
}

/// The inverse of one cache write, captured before the write is applied.
#[derive(Debug, Clone)]
#[must_use = "a rollback that is dropped can never be applied"]
pub struct Rollback<K, T> {
    undo: Vec<(K, Undo<T>)>,
}

impl<K, T> Rollback<K, T> {
    /// Number of cached entries the write touched.
    pub fn touched(&self) -> usize {
        self.undo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }
}

// =============================================================================
// COLLECTION CACHE
// =============================================================================

/// Cache of one kind of collection (notes, labels or workspaces).
pub struct CollectionCache<K, T> {
    name: &'static str,
    stale_after: Duration,
    gc_after: Duration,
    slots: Mutex<HashMap<K, Slot<T>>>,
    next_fetch_id: AtomicU64,
    counters: Counters,
}

impl<K: CacheKey, T: Entity> CollectionCache<K, T> {
    pub fn new(name: &'static str, stale_after: Duration, gc_after: Duration) -> Self {
        Self {
            name,
            stale_after,
            gc_after,
            slots: Mutex::new(HashMap::new()),
            next_fetch_id: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<T>>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current entry for `key` without fetching.
    pub fn get(&self, key: &K) -> Option<CachedEntry<T>> {
        let now = Instant::now();
        let mut slots = self.lock();
        let slot = slots.get_mut(key)?;
        slot.last_access = now;
        slot.entry(now, self.stale_after)
    }

    /// Fresh entry for `key`, fetching when missing or stale.
    ///
    /// Concurrent callers for the same key share one fetch. A fetch result is
    /// stored only if nothing wrote to or invalidated the entry since the
    /// fetch started; otherwise the caller gets the current entry.
    pub async fn get_or_fetch<F, Fut>(&self, key: &K, fetch: F) -> Result<CachedEntry<T>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        let (fetch_id, shared, generation) = {
            let now = Instant::now();
            let mut slots = self.lock();
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot::empty(now));
            slot.last_access = now;

            if let Some(entry) = slot.entry(now, self.stale_after) {
                if !entry.is_stale {
                    Counters::bump(&self.counters.hits);
                    debug!(collection = self.name, query_key = %key, "Cache hit");
                    return Ok(entry);
                }
            }

            match &slot.in_flight {
                Some((id, shared)) => {
                    Counters::bump(&self.counters.deduplicated);
                    debug!(collection = self.name, query_key = %key, "Joining in-flight fetch");
                    (*id, shared.clone(), slot.generation)
                }
                None => {
                    Counters::bump(&self.counters.misses);
                    debug!(collection = self.name, query_key = %key, "Cache miss, fetching");
                    let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                    let shared = fetch().boxed().shared();
                    slot.in_flight = Some((id, shared.clone()));
                    (id, shared, slot.generation)
                }
            }
        };

        let outcome = shared.await;

        let now = Instant::now();
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            return outcome.map(|data| CachedEntry {
                data,
                fetched_at: now,
                is_stale: true,
            });
        };

        let ours = matches!(slot.in_flight, Some((id, _)) if id == fetch_id);
        if ours {
            slot.in_flight = None;
        }

        let data = match outcome {
            Ok(data) => data,
            Err(e) => {
                if ours {
                    warn!(collection = self.name, query_key = %key, error = %e, "Fetch failed");
                }
                return Err(e);
            }
        };

        if slot.generation != generation {
            if ours {
                Counters::bump(&self.counters.discarded);
                debug!(
                    collection = self.name,
                    query_key = %key,
                    "Entry changed during fetch, result discarded"
                );
            }
            return Ok(slot.entry(now, self.stale_after).unwrap_or(CachedEntry {
                data,
                fetched_at: now,
                is_stale: true,
            }));
        }

        if ours {
            slot.data = Some(data.clone());
            slot.fetched_at = now;
            slot.invalidated = false;
            debug!(
                collection = self.name,
                query_key = %key,
                result_count = data.len(),
                "Fetch stored"
            );
        }
        Ok(slot.entry(now, self.stale_after).unwrap_or(CachedEntry {
            data,
            fetched_at: now,
            is_stale: false,
        }))
    }

    /// Store a collection as freshly fetched.
    pub fn put(&self, key: K, data: Vec<T>) {
        let now = Instant::now();
        let mut slots = self.lock();
        let slot = slots.entry(key).or_insert_with(|| Slot::empty(now));
        slot.data = Some(data);
        slot.fetched_at = now;
        slot.last_access = now;
        slot.invalidated = false;
        slot.generation += 1;
    }

    /// Mark an entry stale and abandon its in-flight fetch.
    pub fn invalidate(&self, key: &K) {
        if let Some(slot) = self.lock().get_mut(key) {
            slot.invalidated = true;
            slot.in_flight = None;
            slot.generation += 1;
            debug!(collection = self.name, query_key = %key, "Invalidated");
        }
    }

    /// Invalidate every entry whose key matches.
    pub fn invalidate_where(&self, matches: impl Fn(&K) -> bool) {
        for (key, slot) in self.lock().iter_mut() {
            if matches(key) {
                slot.invalidated = true;
                slot.in_flight = None;
                slot.generation += 1;
                debug!(collection = self.name, query_key = %key, "Invalidated");
            }
        }
    }

    /// First cached copy of an entity.
    pub fn find(&self, id: Uuid) -> Option<T> {
        self.lock().values().find_map(|slot| {
            slot.data
                .as_ref()
                .and_then(|data| data.iter().find(|e| e.id() == id).cloned())
        })
    }

    /// Replace an entity wherever it is cached with `f(old)`.
    pub fn update(&self, id: Uuid, f: impl Fn(&T) -> T) -> Rollback<K, T> {
        let mut undo = Vec::new();
        for (key, slot) in self.lock().iter_mut() {
            let Some(index) = slot.position(id) else {
                continue;
            };
            if let Some(data) = slot.data.as_mut() {
                let next = f(&data[index]);
                let prev = std::mem::replace(&mut data[index], next);
                undo.push((key.clone(), Undo::Restore(prev)));
                slot.generation += 1;
            }
        }
        undo.reverse();
        Rollback { undo }
    }

    /// Prepend an entity to every loaded entry whose key admits it.
    pub fn insert_where(&self, entity: T, admits: impl Fn(&K) -> bool) -> Rollback<K, T> {
        let id = entity.id();
        let mut undo = Vec::new();
        for (key, slot) in self.lock().iter_mut() {
            if !admits(key) || slot.position(id).is_some() {
                continue;
            }
            if let Some(data) = slot.data.as_mut() {
                data.insert(0, entity.clone());
                undo.push((key.clone(), Undo::Remove(id)));
                slot.generation += 1;
            }
        }
        Rollback { undo }
    }

    /// Append an entity to every loaded entry whose key admits it.
    pub fn append_where(&self, entity: T, admits: impl Fn(&K) -> bool) -> Rollback<K, T> {
        let id = entity.id();
        let mut undo = Vec::new();
        for (key, slot) in self.lock().iter_mut() {
            if !admits(key) || slot.position(id).is_some() {
                continue;
            }
            if let Some(data) = slot.data.as_mut() {
                data.push(entity.clone());
                undo.push((key.clone(), Undo::Remove(id)));
                slot.generation += 1;
            }
        }
        Rollback { undo }
    }

    /// Remove an entity from every entry.
    pub fn remove(&self, id: Uuid) -> Rollback<K, T> {
        let mut undo = Vec::new();
        for (key, slot) in self.lock().iter_mut() {
            let Some(index) = slot.position(id) else {
                continue;
            };
            if let Some(data) = slot.data.as_mut() {
                let entity = data.remove(index);
                undo.push((key.clone(), Undo::Reinsert { index, entity }));
                slot.generation += 1;
            }
        }
        Rollback { undo }
    }

    /// Swap the entity with id `id` for `entity` (server record, or real id
    /// for a placeholder). Returns how many entries were touched.
    pub fn replace(&self, id: Uuid, entity: T) -> usize {
        let mut touched = 0;
        for slot in self.lock().values_mut() {
            let Some(index) = slot.position(id) else {
                continue;
            };
            if let Some(data) = slot.data.as_mut() {
                data[index] = entity.clone();
                slot.generation += 1;
                touched += 1;
            }
        }
        touched
    }

    /// Undo a write.
    pub fn rollback(&self, rollback: Rollback<K, T>) {
        let mut slots = self.lock();
        for (key, undo) in rollback.undo {
            let Some(slot) = slots.get_mut(&key) else {
                continue;
            };
            let Some(data) = slot.data.as_mut() else {
                continue;
            };
            match undo {
                Undo::Restore(prev) => {
                    if let Some(current) = data.iter_mut().find(|e| e.id() == prev.id()) {
                        *current = prev;
                    }
                }
                Undo::Remove(id) => data.retain(|e| e.id() != id),
                Undo::Reinsert { index, entity } => {
                    if !data.iter().any(|e| e.id() == entity.id()) {
                        let index = index.min(data.len());
                        data.insert(index, entity);
                    }
                }
            }
            slot.generation += 1;
        }
    }

    /// Register interest in `key`; subscribed entries are never evicted.
    pub fn subscribe(self: &Arc<Self>, key: K) -> Subscription<K, T> {
        let now = Instant::now();
        {
            let mut slots = self.lock();
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot::empty(now));
            slot.subscribers += 1;
            slot.last_access = now;
        }
        Subscription {
            cache: Arc::clone(self),
            key,
        }
    }

    fn unsubscribe(&self, key: &K) {
        let now = Instant::now();
        if let Some(slot) = self.lock().get_mut(key) {
            slot.subscribers = slot.subscribers.saturating_sub(1);
            slot.last_access = now;
        }
    }

    pub fn subscriber_count(&self, key: &K) -> usize {
        self.lock().get(key).map_or(0, |slot| slot.subscribers)
    }

    /// Drop entries idle past the eviction window that have no subscribers
    /// and no fetch in flight. Returns the number evicted.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|key, slot| {
            let keep = slot.subscribers > 0
                || slot.in_flight.is_some()
                || now.duration_since(slot.last_access) < self.gc_after;
            if !keep {
                debug!(collection = self.name, query_key = %key, "Evicting idle entry");
            }
            keep
        });
        let evicted = before - slots.len();
        self.counters
            .evicted
            .fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

/// Keeps a cache entry alive while held.
pub struct Subscription<K: CacheKey, T: Entity> {
    cache: Arc<CollectionCache<K, T>>,
    key: K,
}

impl<K: CacheKey, T: Entity> Subscription<K, T> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: CacheKey, T: Entity> Drop for Subscription<K, T> {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key);
    }
}

// =============================================================================
// ENTITY CACHE
// =============================================================================

/// The three collections the client keeps in memory.
#[derive(Clone)]
pub struct EntityCache {
    pub notes: Arc<CollectionCache<NotesKey, Note>>,
    /// Keyed by owner id.
    pub labels: Arc<CollectionCache<Uuid, Label>>,
    /// Keyed by owner id.
    pub workspaces: Arc<CollectionCache<Uuid, Workspace>>,
}

impl EntityCache {
    pub fn new(config: &SyncConfig) -> Self {
        info!(
            stale_after_secs = config.stale_after.as_secs(),
            gc_after_secs = config.gc_after.as_secs(),
            "Entity cache initialized"
        );
        Self {
            notes: Arc::new(CollectionCache::new(
                "notes",
                config.stale_after,
                config.gc_after,
            )),
            labels: Arc::new(CollectionCache::new(
                "labels",
                config.stale_after,
                config.gc_after,
            )),
            workspaces: Arc::new(CollectionCache::new(
                "workspaces",
                config.stale_after,
                config.gc_after,
            )),
        }
    }

    /// Sweep all three collections.
    pub fn evict_idle(&self) -> usize {
        self.notes.evict_idle() + self.labels.evict_idle() + self.workspaces.evict_idle()
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_core::NoteDraft;
    use std::sync::atomic::AtomicUsize;

    fn note(owner: Uuid, title: &str) -> Note {
        NoteDraft::text(title, "")
            .into_record(owner, None, 1)
            .into_note(Uuid::new_v4(), Utc::now())
    }

    fn cache() -> Arc<CollectionCache<NotesKey, Note>> {
        Arc::new(CollectionCache::new(
            "notes",
            Duration::from_secs(300),
            Duration::from_secs(600),
        ))
    }

    #[test]
    fn test_notes_key_admits_workspace_and_all() {
        let owner = Uuid::new_v4();
        let ws = Uuid::new_v4();
        assert!(NotesKey::new(owner, None).admits(owner, Some(ws)));
        assert!(NotesKey::new(owner, Some(ws)).admits(owner, Some(ws)));
        assert!(!NotesKey::new(owner, Some(ws)).admits(owner, None));
        assert!(!NotesKey::new(Uuid::new_v4(), None).admits(owner, None));
    }

    #[test]
    fn test_update_and_rollback_restore_previous_value() {
        let cache = cache();
        let owner = Uuid::new_v4();
        let n = note(owner, "C0");
        let all = NotesKey::new(owner, None);
        cache.put(all, vec![n.clone()]);

        let rollback = cache.update(n.id, |old| Note {
            title: "C1".into(),
            ..old.clone()
        });
        assert_eq!(rollback.touched(), 1);
        assert_eq!(cache.find(n.id).unwrap().title, "C1");

        cache.rollback(rollback);
        assert_eq!(cache.find(n.id).unwrap(), n);
    }

    #[test]
    fn test_remove_and_rollback_keep_order() {
        let cache = cache();
        let owner = Uuid::new_v4();
        let (a, b, c) = (note(owner, "a"), note(owner, "b"), note(owner, "c"));
        let all = NotesKey::new(owner, None);
        cache.put(all, vec![a.clone(), b.clone(), c.clone()]);

        let rollback = cache.remove(b.id);
        assert_eq!(cache.get(&all).unwrap().data.len(), 2);
        cache.rollback(rollback);

        let ids: Vec<Uuid> = cache.get(&all).unwrap().data.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_insert_only_into_admitting_loaded_entries() {
        let cache = cache();
        let owner = Uuid::new_v4();
        let ws = Uuid::new_v4();
        cache.put(NotesKey::new(owner, None), vec![]);
        cache.put(NotesKey::new(owner, Some(ws)), vec![]);

        let n = note(owner, "new");
        let rollback = cache.insert_where(n.clone(), |k| k.admits(owner, None));
        assert_eq!(rollback.touched(), 1);
        assert!(cache.get(&NotesKey::new(owner, Some(ws))).unwrap().data.is_empty());

        cache.rollback(rollback);
        assert!(cache.find(n.id).is_none());
    }

    #[test]
    fn test_replace_swaps_placeholder() {
        let cache = cache();
        let owner = Uuid::new_v4();
        let temp = note(owner, "draft");
        cache.put(NotesKey::new(owner, None), vec![temp.clone()]);

        let real = Note {
            id: Uuid::new_v4(),
            ..temp.clone()
        };
        assert_eq!(cache.replace(temp.id, real.clone()), 1);
        assert!(cache.find(temp.id).is_none());
        assert_eq!(cache.find(real.id), Some(real));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_goes_stale_after_window() {
        let cache = cache();
        let key = NotesKey::new(Uuid::new_v4(), None);
        cache.put(key, vec![]);
        assert!(!cache.get(&key).unwrap().is_stale);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!cache.get(&key).unwrap().is_stale);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key).unwrap().is_stale);
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_without_fetch() {
        let cache = cache();
        let key = NotesKey::new(Uuid::new_v4(), None);
        cache.put(key, vec![]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let entry = cache
            .get_or_fetch(&key, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(vec![]) }
            })
            .await
            .unwrap();
        assert!(!entry.is_stale);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_entry_untouched() {
        let cache = cache();
        let key = NotesKey::new(Uuid::new_v4(), None);
        let err = cache
            .get_or_fetch(&key, || async {
                Err(nexus_core::Error::NetworkFailure("offline".into()))
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_blocks_eviction() {
        let cache = cache();
        let key = NotesKey::new(Uuid::new_v4(), None);
        cache.put(key, vec![]);
        let sub = cache.subscribe(key);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(cache.evict_idle(), 0);

        drop(sub);
        assert_eq!(cache.subscriber_count(&key), 0);
        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(cache.evict_idle(), 1);
        assert!(!cache.contains_key(&key));
    }
}
