// src/auth/cache.rs

//! Remembers which credentials a proxy accepted, so the next request through
//! it can send `Proxy-Authorization` up front instead of paying for a `407`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::AuthScheme;

const DEFAULT_CAPACITY: usize = 256;

/// An opaque fingerprint of a credential set.
///
/// See [`Credentials::digest`](super::Credentials::digest).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CredentialDigest(u64);

impl CredentialDigest {
    pub(crate) fn new(value: u64) -> Self {
        CredentialDigest(value)
    }
}

impl fmt::Debug for CredentialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialDigest({:016x})", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Key {
    host: String,
    port: u16,
    scheme: AuthScheme,
}

impl Key {
    fn new(host: &str, port: u16, scheme: &AuthScheme) -> Self {
        Key {
            host: host.to_ascii_lowercase(),
            port,
            scheme: scheme.clone(),
        }
    }
}

/// A concurrency-safe, bounded map of `(proxy host, proxy port, scheme)` to
/// the digest of the credential that proxy last accepted.
///
/// Cloning is cheap and every clone shares the same entries. Lookups go
/// straight to the sharded map; writers serialize on the eviction order.
/// Concurrent writers to the same key race with last-writer-wins semantics.
/// When full, recording a new key evicts the oldest one.
#[derive(Clone)]
pub struct ProxyCredentialCache {
    entries: Arc<DashMap<Key, CredentialDigest>>,
    // insertion order, oldest first
    order: Arc<Mutex<VecDeque<Key>>>,
    capacity: usize,
}

impl ProxyCredentialCache {
    pub fn new() -> Self {
        ProxyCredentialCache::with_capacity(DEFAULT_CAPACITY)
    }

    /// A cache holding at most `capacity` entries. A capacity of zero
    /// disables caching entirely.
    pub fn with_capacity(capacity: usize) -> Self {
        ProxyCredentialCache {
            entries: Arc::new(DashMap::new()),
            order: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    pub fn lookup(&self, host: &str, port: u16, scheme: &AuthScheme) -> Option<CredentialDigest> {
        let key = Key::new(host, port, scheme);
        self.entries.get(&key).map(|entry| *entry.value())
    }

    pub fn record(&self, host: &str, port: u16, scheme: &AuthScheme, digest: CredentialDigest) {
        if self.capacity == 0 {
            return;
        }
        let key = Key::new(host, port, scheme);
        let mut order = self.order.lock();

        if self.entries.insert(key.clone(), digest).is_some() {
            return;
        }
        order.push_back(key);

        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                log::trace!("proxy credential cache full, evicting {}:{}", oldest.host, oldest.port);
                self.entries.remove(&oldest);
            }
        }
    }

    /// Forget the credential for this proxy and scheme. Returns `true` if an
    /// entry was removed.
    pub fn invalidate(&self, host: &str, port: u16, scheme: &AuthScheme) -> bool {
        let key = Key::new(host, port, scheme);
        let mut order = self.order.lock();

        if self.entries.remove(&key).is_none() {
            return false;
        }
        order.retain(|k| *k != key);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut order = self.order.lock();
        self.entries.clear();
        order.clear();
    }
}

impl Default for ProxyCredentialCache {
    fn default() -> Self {
        ProxyCredentialCache::new()
    }
}

impl fmt::Debug for ProxyCredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentialCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
