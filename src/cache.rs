use std::{collections::HashMap, fmt, hash::Hash, sync::Arc, time::Duration};

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Default lifetime of a cached collection.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Entities that can be indexed inside an [`EntityCache`].
pub trait Keyed {
    type Key: Clone + Eq + Hash + fmt::Debug;

    fn key(&self) -> Self::Key;
}

/// Lifecycle of the cached collection.
///
/// `Fresh -> Stale` is a pure function of time; nothing transitions actively.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheState {
    Absent,
    Fresh,
    Stale,
}

struct CacheEntry<T: Keyed> {
    items: Arc<Vec<T>>,
    index: HashMap<T::Key, usize>,
    fetched_at: Instant,
}

impl<T: Keyed> CacheEntry<T> {
    /// Keys are unique within an entry; for duplicates the last occurrence wins.
    fn new(items: Vec<T>, fetched_at: Instant) -> Self {
        let latest: HashMap<T::Key, usize> = items
            .iter()
            .enumerate()
            .map(|(position, item)| (item.key(), position))
            .collect();
        let received = items.len();
        let items: Vec<T> = items
            .into_iter()
            .enumerate()
            .filter(|(position, item)| latest.get(&item.key()) == Some(position))
            .map(|(_, item)| item)
            .collect();
        if items.len() < received {
            debug!(dropped = received - items.len(), "collapsed duplicate keys");
        }

        let mut entry = Self {
            items: Arc::new(items),
            index: HashMap::new(),
            fetched_at,
        };
        entry.reindex();
        entry
    }

    fn reindex(&mut self) {
        self.index = self
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| (item.key(), position))
            .collect();
    }

    fn is_live(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Read-through, write-through cache over one collection resource.
///
/// Readers get `Arc` snapshots. Writers replace the collection
/// copy-on-write, so a snapshot handed out earlier never changes underneath
/// its holder and no reader sees a half-written collection.
pub struct EntityCache<T: Keyed> {
    ttl: Duration,
    entry: RwLock<Option<CacheEntry<T>>>,
}

impl<T: Keyed> fmt::Debug for EntityCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("ttl", &self.ttl)
            .field("state", &self.state())
            .finish()
    }
}

impl<T: Keyed> Default for EntityCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<T: Keyed> EntityCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn state(&self) -> CacheState {
        match self.entry.read().as_ref() {
            None => CacheState::Absent,
            Some(entry) if entry.is_live(self.ttl) => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }

    /// Returns the live collection, or `None` on a miss or an expired entry.
    pub fn get(&self) -> Option<Arc<Vec<T>>> {
        let guard = self.entry.read();
        let entry = guard.as_ref().filter(|entry| entry.is_live(self.ttl))?;
        Some(Arc::clone(&entry.items))
    }

    /// Replaces the collection and restarts the TTL window.
    ///
    /// Returns the snapshot that was stored.
    pub fn put(&self, items: Vec<T>) -> Arc<Vec<T>> {
        debug!(len = items.len(), "populating entity cache");
        let entry = CacheEntry::new(items, Instant::now());
        let snapshot = Arc::clone(&entry.items);
        *self.entry.write() = Some(entry);
        snapshot
    }

    /// Drops the collection.
    pub fn invalidate(&self) {
        if self.entry.write().take().is_some() {
            debug!("entity cache invalidated");
        }
    }
}

impl<T: Keyed + Clone> EntityCache<T> {
    /// Looks one entity up in the live collection through the key index.
    pub fn get_one(&self, key: &T::Key) -> Option<T> {
        let guard = self.entry.read();
        let entry = guard.as_ref().filter(|entry| entry.is_live(self.ttl))?;
        let position = *entry.index.get(key)?;
        entry.items.get(position).cloned()
    }

    /// Replaces the entity with the same key, or appends it.
    ///
    /// Does nothing when the cache is absent. The TTL window is not extended.
    pub fn update_one(&self, item: T) {
        let mut guard = self.entry.write();
        let Some(entry) = guard.as_mut() else {
            return;
        };
        let key = item.key();
        let items = Arc::make_mut(&mut entry.items);
        match entry.index.get(&key) {
            Some(&position) => items[position] = item,
            None => {
                entry.index.insert(key, items.len());
                items.push(item);
            }
        }
    }

    /// Removes the entity with `key`. Returns whether it was present.
    pub fn remove_one(&self, key: &T::Key) -> bool {
        let mut guard = self.entry.write();
        let Some(entry) = guard.as_mut() else {
            return false;
        };
        let Some(position) = entry.index.get(key).copied() else {
            return false;
        };
        Arc::make_mut(&mut entry.items).remove(position);
        entry.reindex();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CacheState, EntityCache, Keyed};

    #[derive(Clone, Debug, PartialEq)]
    struct Task {
        id: u32,
        title: &'static str,
    }

    impl Keyed for Task {
        type Key = u32;

        fn key(&self) -> u32 {
            self.id
        }
    }

    fn task(id: u32, title: &'static str) -> Task {
        Task { id, title }
    }

    fn cache() -> EntityCache<Task> {
        EntityCache::new(Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn put_then_get_returns_the_same_collection() {
        let cache = cache();
        assert_eq!(cache.state(), CacheState::Absent);
        assert!(cache.get().is_none());

        let tasks = vec![task(1, "plan"), task(2, "build")];
        cache.put(tasks.clone());

        assert_eq!(cache.state(), CacheState::Fresh);
        assert_eq!(*cache.get().expect("hit"), tasks);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_goes_stale_after_ttl_without_writes() {
        let cache = cache();
        cache.put(vec![task(1, "plan")]);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get().is_none());
        assert_eq!(cache.state(), CacheState::Stale);
        assert!(cache.get_one(&1).is_none());

        cache.put(vec![task(1, "plan")]);
        assert_eq!(cache.state(), CacheState::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn update_one_replaces_in_place_within_original_window() {
        let cache = cache();
        cache.put(vec![task(1, "plan"), task(2, "build")]);
        tokio::time::advance(Duration::from_secs(30)).await;

        cache.update_one(task(2, "ship"));
        let snapshot = cache.get().expect("still fresh");
        assert!(snapshot.contains(&task(2, "ship")));
        assert!(!snapshot.contains(&task(2, "build")));
        assert_eq!(snapshot.len(), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get().is_none(), "update must not extend the TTL");
    }

    #[tokio::test(start_paused = true)]
    async fn update_one_appends_unknown_entities() {
        let cache = cache();
        cache.put(vec![task(1, "plan")]);
        cache.update_one(task(3, "review"));
        assert_eq!(cache.get_one(&3), Some(task(3, "review")));
        assert_eq!(cache.get().expect("hit").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn update_one_on_absent_cache_is_a_no_op() {
        let cache = cache();
        cache.update_one(task(1, "plan"));
        assert_eq!(cache.state(), CacheState::Absent);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_one_reindexes_remaining_entities() {
        let cache = cache();
        cache.put(vec![task(1, "a"), task(2, "b"), task(3, "c")]);

        assert!(cache.remove_one(&1));
        assert!(!cache.remove_one(&1));
        assert_eq!(cache.get_one(&3), Some(task(3, "c")));
        assert_eq!(cache.get_one(&2), Some(task(2, "b")));
        assert_eq!(cache.get().expect("hit").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_keys_collapse_to_the_last_occurrence() {
        let cache = cache();
        let stored = cache.put(vec![task(1, "old"), task(2, "b"), task(1, "new")]);
        assert_eq!(*stored, vec![task(2, "b"), task(1, "new")]);

        cache.update_one(task(1, "newer"));
        assert_eq!(*cache.get().expect("hit"), vec![task(2, "b"), task(1, "newer")]);

        assert!(cache.remove_one(&1));
        assert!(cache.get_one(&1).is_none());
        assert_eq!(*cache.get().expect("hit"), vec![task(2, "b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_snapshots_are_not_mutated() {
        let cache = cache();
        cache.put(vec![task(1, "plan")]);
        let before = cache.get().expect("hit");

        cache.update_one(task(1, "replanned"));
        cache.update_one(task(2, "new"));

        assert_eq!(*before, vec![task(1, "plan")]);
        assert_eq!(cache.get().expect("hit").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_returns_to_absent() {
        let cache = cache();
        cache.put(vec![task(1, "plan")]);
        cache.invalidate();
        assert_eq!(cache.state(), CacheState::Absent);
        assert!(cache.get_one(&1).is_none());
    }
}
