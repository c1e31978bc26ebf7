//! # Resolution Cache
//!
//! Per-pass memo of fetched objects and of lookups that already failed.
//! A cache lives for one `resolve` call and is never shared.

use super::error::ResolveError;
use kube::core::GroupVersionKind;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// How a reference selects its object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Name(String),
    /// Equality label selector; sorted so equal selectors produce equal keys
    Labels(BTreeMap<String, String>),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Name(name) => f.write_str(name),
            Selector::Labels(labels) => {
                f.write_str("labels{")?;
                for (i, (k, v)) in labels.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Cache key for one lookup
#[must_use]
pub fn cache_key(selector: &Selector, namespace: &str, gvk: &GroupVersionKind) -> String {
    format!(
        "{selector}/{namespace}/{}/{}, Kind={}",
        gvk.group, gvk.version, gvk.kind
    )
}

/// Outcome of a cache probe
#[derive(Debug)]
pub enum Cached<'a> {
    Object(&'a Value),
    Tombstone(&'a ResolveError),
    Miss,
}

#[derive(Debug, Default)]
pub struct ResolutionCache {
    objects: HashMap<String, Value>,
    tombstones: HashMap<String, ResolveError>,
    hits: u64,
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&mut self, key: &str) -> Cached<'_> {
        if let Some(object) = self.objects.get(key) {
            self.hits += 1;
            return Cached::Object(object);
        }
        if let Some(err) = self.tombstones.get(key) {
            self.hits += 1;
            return Cached::Tombstone(err);
        }
        Cached::Miss
    }

    pub fn insert(&mut self, key: String, object: Value) {
        self.tombstones.remove(&key);
        self.objects.insert(key, object);
    }

    pub fn tombstone(&mut self, key: String, err: ResolveError) {
        self.objects.remove(&key);
        self.tombstones.insert(key, err);
    }

    /// Number of lookups answered from the cache
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }
}
