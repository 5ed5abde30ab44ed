//! Metric store: slash-delimited path-keyed nested map.

use std::collections::HashMap;

use super::buffer::RingBuffer;
use crate::error::AgentError;

#[derive(Debug, Clone)]
enum StoreEntry {
    Buffer(RingBuffer),
    Scope(HashMap<String, StoreEntry>),
}

/// Two disjoint partitions of one process's metric state: raw input readings
/// and the derived assurance view the rule engine reads. No locking is
/// needed: both partitions are only ever touched from within a single tick.
#[derive(Debug, Clone, Default)]
pub struct MetricStore {
    raw: HashMap<String, StoreEntry>,
    assurance: HashMap<String, StoreEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Raw,
    Assurance,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn root(&self, scope: Scope) -> &HashMap<String, StoreEntry> {
        match scope {
            Scope::Raw => &self.raw,
            Scope::Assurance => &self.assurance,
        }
    }

    fn root_mut(&mut self, scope: Scope) -> &mut HashMap<String, StoreEntry> {
        match scope {
            Scope::Raw => &mut self.raw,
            Scope::Assurance => &mut self.assurance,
        }
    }

    /// Ensures a ring buffer exists at `path` (slash-delimited segments,
    /// intermediate segments becoming nested scopes), creating it via
    /// `make` if absent, and returns a mutable handle to it.
    pub fn ensure(
        &mut self,
        scope: Scope,
        path: &str,
        make: impl FnOnce() -> RingBuffer,
    ) -> &mut RingBuffer {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut map = self.root_mut(scope);
        let (last, parents) = segments.split_last().expect("empty metric path");
        for seg in parents {
            map = match map
                .entry(seg.to_string())
                .or_insert_with(|| StoreEntry::Scope(HashMap::new()))
            {
                StoreEntry::Scope(inner) => inner,
                StoreEntry::Buffer(_) => panic!("path {path} crosses an existing leaf buffer"),
            };
        }
        let entry = map
            .entry(last.to_string())
            .or_insert_with(|| StoreEntry::Buffer(make()));
        match entry {
            StoreEntry::Buffer(buf) => buf,
            StoreEntry::Scope(_) => panic!("path {path} names an existing scope, not a buffer"),
        }
    }

    pub fn get(&self, scope: Scope, path: &str) -> Result<&RingBuffer, AgentError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut map = self.root(scope);
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| AgentError::MissingScope { path: path.to_string() })?;
        for seg in parents {
            map = match map.get(*seg) {
                Some(StoreEntry::Scope(inner)) => inner,
                _ => return Err(AgentError::MissingScope { path: path.to_string() }),
            };
        }
        match map.get(*last) {
            Some(StoreEntry::Buffer(buf)) => Ok(buf),
            _ => Err(AgentError::MissingScope { path: path.to_string() }),
        }
    }

    pub fn get_mut(&mut self, scope: Scope, path: &str) -> Result<&mut RingBuffer, AgentError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut map = self.root_mut(scope);
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| AgentError::MissingScope { path: path.to_string() })?;
        for seg in parents {
            map = match map.get_mut(*seg) {
                Some(StoreEntry::Scope(inner)) => inner,
                _ => return Err(AgentError::MissingScope { path: path.to_string() }),
            };
        }
        match map.get_mut(*last) {
            Some(StoreEntry::Buffer(buf)) => Ok(buf),
            _ => Err(AgentError::MissingScope { path: path.to_string() }),
        }
    }

    /// Removes the subtree rooted at `path` (scope or buffer), used when a
    /// vm/kb instance is reconciled away.
    pub fn drop_subtree(&mut self, scope: Scope, path: &str) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut map = self.root_mut(scope);
        for seg in parents {
            map = match map.get_mut(*seg) {
                Some(StoreEntry::Scope(inner)) => inner,
                _ => return,
            };
        }
        map.remove(*last);
    }

    /// Lists the immediate child segment names under `path` (e.g. interface
    /// names under a `net` scope), empty if `path` is absent or a leaf.
    pub fn keys_under(&self, scope: Scope, path: &str) -> Vec<String> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut map = self.root(scope);
        for seg in &segments {
            map = match map.get(*seg) {
                Some(StoreEntry::Scope(inner)) => inner,
                _ => return Vec::new(),
            };
        }
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }
}
