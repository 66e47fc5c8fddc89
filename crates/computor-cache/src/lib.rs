//! # computor-cache
//!
//! The tagged view cache: a key-value cache keyed by
//! opaque hashes, where every entry carries a set of `kind:id` tags so a
//! mutation can invalidate every aggregated view that touched it.
//!
//! Structurally this is a generic TTL+LRU `Cache<K, V>`
//! (in the style of `mockforge-core::cache`) with a tag index layered on
//! top, since a plain TTL+LRU cache has no notion of cross-entry
//! invalidation by tag.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub invalidations: u64,
}

struct Entry<V> {
    value: V,
    tags: HashSet<String>,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// Tagged, TTL-bounded view cache. One instance per process; the Redis
/// bridge in `computor-realtime` and the view assemblers in the server
/// crate share it behind an `Arc`.
pub struct ViewCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    /// `tag -> keys carrying that tag`, maintained alongside `entries` so
    /// `invalidate_tags` does not need a linear scan.
    tag_index: RwLock<HashMap<String, HashSet<String>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    invalidations: AtomicU64,
}

impl<V: Clone> Default for ViewCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ViewCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            tag_index: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let expired = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => true,
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        };
        if expired {
            self.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration, tags: impl IntoIterator<Item = String>) {
        let key = key.into();
        let tags: HashSet<String> = tags.into_iter().collect();

        {
            let mut tag_index = self.tag_index.write();
            for tag in &tags {
                tag_index.entry(tag.clone()).or_default().insert(key.clone());
            }
        }

        self.entries.write().insert(
            key,
            Entry {
                value,
                tags,
                inserted_at: Instant::now(),
                ttl,
            },
        );
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    fn remove(&self, key: &str) {
        let removed = self.entries.write().remove(key);
        if let Some(entry) = removed {
            let mut tag_index = self.tag_index.write();
            for tag in &entry.tags {
                if let Some(keys) = tag_index.get_mut(tag) {
                    keys.remove(key);
                }
            }
        }
    }

    /// Removes every entry whose tag set contains any of `tags`.
    pub fn invalidate_tags<'a>(&self, tags: impl IntoIterator<Item = &'a str>) {
        let mut keys_to_remove = HashSet::new();
        {
            let tag_index = self.tag_index.read();
            for tag in tags {
                if let Some(keys) = tag_index.get(tag) {
                    keys_to_remove.extend(keys.iter().cloned());
                }
            }
        }
        for key in &keys_to_remove {
            self.remove(key);
        }
        if !keys_to_remove.is_empty() {
            self.invalidations.fetch_add(keys_to_remove.len() as u64, Ordering::Relaxed);
        }
    }

    /// A full wipe for one user — every entry tagged `user:{user_id}`.
    pub fn invalidate_user_views(&self, user_id: &str) {
        self.invalidate_tags([format!("user:{user_id}").as_str()]);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the tag set a view assembler attaches to a cache entry: at
/// minimum `user:{reader_id}`, `course:{id}`, `course_content:{id}` for
/// each item, and `submission_group:{id}` where applicable.
pub fn view_tags(
    reader_id: &str,
    course_id: &str,
    course_content_ids: impl IntoIterator<Item = String>,
    submission_group_ids: impl IntoIterator<Item = String>,
) -> HashSet<String> {
    let mut tags = HashSet::new();
    tags.insert(format!("user:{reader_id}"));
    tags.insert(format!("course:{course_id}"));
    for id in course_content_ids {
        tags.insert(format!("course_content:{id}"));
    }
    for id in submission_group_ids {
        tags.insert(format!("submission_group:{id}"));
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache: ViewCache<String> = ViewCache::new();
        cache.set("k1", "v1".to_string(), Duration::from_secs(60), ["course:c1".to_string()]);
        assert_eq!(cache.get("k1"), Some("v1".to_string()));
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache: ViewCache<String> = ViewCache::new();
        cache.set("k1", "v1".to_string(), Duration::from_millis(1), []);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get("k1"), None);
    }

    /// After invalidate_tags for a mutated entity's tag, no stale read
    /// may be served.
    #[test]
    fn invalidate_tags_removes_every_entry_with_that_tag() {
        let cache: ViewCache<i32> = ViewCache::new();
        cache.set("student_view", 1, Duration::from_secs(60), ["course:c1".to_string()]);
        cache.set("tutor_view", 2, Duration::from_secs(60), ["course:c1".to_string()]);
        cache.set("other_course", 3, Duration::from_secs(60), ["course:c2".to_string()]);

        cache.invalidate_tags(["course:c1"]);

        assert_eq!(cache.get("student_view"), None);
        assert_eq!(cache.get("tutor_view"), None);
        assert_eq!(cache.get("other_course"), Some(3));
    }

    #[test]
    fn invalidate_user_views_wipes_only_that_user() {
        let cache: ViewCache<i32> = ViewCache::new();
        cache.set("a", 1, Duration::from_secs(60), ["user:u1".to_string()]);
        cache.set("b", 2, Duration::from_secs(60), ["user:u2".to_string()]);

        cache.invalidate_user_views("u1");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn entry_with_multiple_tags_invalidated_by_any_one() {
        let cache: ViewCache<i32> = ViewCache::new();
        cache.set(
            "combined",
            1,
            Duration::from_secs(60),
            ["user:u1".to_string(), "course:c1".to_string(), "course_content:cc1".to_string()],
        );
        cache.invalidate_tags(["course_content:cc1"]);
        assert_eq!(cache.get("combined"), None);
    }
}
