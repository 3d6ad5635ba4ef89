//! In-memory key-value store for tests.
//!
//! Single-mutex storage, so the conditional primitives (`set_if_absent`,
//! `compare_and_delete`) are atomic exactly like their Redis counterparts.
//! TTLs are enforced lazily: expired entries are purged when touched.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{CoordinationError, Result};
use crate::providers::KvStore;

#[derive(Debug, Clone)]
enum StoredValue {
    Bytes(Vec<u8>),
    /// member -> score
    SortedSet(BTreeMap<String, u64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// TTLs beyond `Instant` range become "no expiry".
fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

/// In-memory [`KvStore`] for tests.
///
/// `set_unavailable(true)` makes every operation fail, for exercising
/// fail-open and fail-closed paths.
#[derive(Debug, Clone, Default)]
pub struct MockKvStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Store raw bytes directly, bypassing any codec. Test helper for
    /// planting corrupt payloads.
    pub async fn put_raw(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: StoredValue::Bytes(value.to_vec()),
                    expires_at: ttl.and_then(deadline),
                },
            );
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoordinationError::StoreUnavailable(
                "simulated outage".into(),
            ));
        }
        self.entries
            .lock()
            .map_err(|_| CoordinationError::StoreUnavailable("mutex poisoned".into()))
    }

    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(Entry::expired) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    fn sorted_set<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Result<&'a mut BTreeMap<String, u64>> {
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: StoredValue::SortedSet(BTreeMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            StoredValue::SortedSet(set) => Ok(set),
            StoredValue::Bytes(_) => Err(CoordinationError::StoreUnavailable(
                "WRONGTYPE: key holds a string".into(),
            )),
        }
    }
}

impl KvStore for MockKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.guard()?;
        match Self::live(&mut entries, key).map(|e| &e.value) {
            Some(StoredValue::Bytes(bytes)) => Ok(Some(bytes.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.guard()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Bytes(value.to_vec()),
                expires_at: deadline(ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut entries = self.guard()?;
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Bytes(value.to_vec()),
                expires_at: deadline(ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.guard()?;
        let existed = Self::live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut entries = self.guard()?;
        let matches = matches!(
            Self::live(&mut entries, key).map(|e| &e.value),
            Some(StoredValue::Bytes(bytes)) if bytes == expected
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.guard()?;
        Ok(Self::live(&mut entries, key).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut entries = self.guard()?;
        Ok(Self::live(&mut entries, key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.guard()?;
        match Self::live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = deadline(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_pattern(&self, pattern: &str, _batch_size: usize) -> Result<u64> {
        let mut entries = self.guard()?;
        let matching: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| !entry.expired() && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matching {
            entries.remove(key);
        }
        Ok(matching.len() as u64)
    }

    async fn zadd(&self, key: &str, member: &str, score: u64) -> Result<()> {
        let mut entries = self.guard()?;
        Self::live(&mut entries, key);
        let set = Self::sorted_set(&mut entries, key)?;
        set.insert(member.to_string(), score);
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut entries = self.guard()?;
        match Self::live(&mut entries, key).map(|e| &e.value) {
            Some(StoredValue::SortedSet(set)) => Ok(set.len() as u64),
            _ => Ok(0),
        }
    }

    async fn zremove_below(&self, key: &str, min_score: u64) -> Result<u64> {
        let mut entries = self.guard()?;
        match Self::live(&mut entries, key).map(|e| &mut e.value) {
            Some(StoredValue::SortedSet(set)) => {
                let before = set.len();
                set.retain(|_, score| *score >= min_score);
                Ok((before - set.len()) as u64)
            }
            _ => Ok(0),
        }
    }

    async fn zoldest_score(&self, key: &str) -> Result<Option<u64>> {
        let mut entries = self.guard()?;
        match Self::live(&mut entries, key).map(|e| &e.value) {
            Some(StoredValue::SortedSet(set)) => Ok(set.values().min().copied()),
            _ => Ok(None),
        }
    }
}

/// Minimal glob: `*` matches any run of characters, everything else is
/// literal. Matches Redis `MATCH` closely enough for key patterns.
fn glob_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }
    let segments: Vec<&str> = pattern.split('*').collect();
    let Some((first, rest)) = segments.split_first() else {
        return true;
    };
    if !text.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let Some((last, middle)) = rest.split_last() else {
        return true;
    };
    for segment in middle {
        if segment.is_empty() {
            continue;
        }
        match text[pos..].find(segment) {
            Some(found) => pos += found + segment.len(),
            None => return false,
        }
    }
    if last.is_empty() {
        return true;
    }
    text.len() >= pos + last.len() && text[pos..].ends_with(last)
}
