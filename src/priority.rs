//! Manually overridden display order of orders, saved per (date, location).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::Result;
use crate::models::Scope;

/// Durable string key-value storage for small client settings.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local store, used when no durable store is configured.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, String>>,
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn storage_key(scope: &Scope) -> String {
    format!(
        "order-priority:{}:{}",
        scope.date.format("%Y-%m-%d"),
        scope.location
    )
}

/// Saved ids first (only those still live, each once), then the remaining
/// live ids in their original order.
pub fn merge(saved: &[String], live: &[String]) -> Vec<String> {
    let live_set: HashSet<&str> = live.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(live.len());
    let mut merged = Vec::with_capacity(live.len());

    for id in saved {
        if live_set.contains(id.as_str()) && seen.insert(id.as_str()) {
            merged.push(id.clone());
        }
    }
    for id in live {
        if seen.insert(id.as_str()) {
            merged.push(id.clone());
        }
    }

    merged
}

/// Moves `from` to the index `to` had before the move. Unknown ids leave the list as is.
pub fn move_id(ids: &[String], from: &str, to: &str) -> Vec<String> {
    let mut moved = ids.to_vec();
    let (Some(from_idx), Some(to_idx)) = (
        ids.iter().position(|id| id == from),
        ids.iter().position(|id| id == to),
    ) else {
        return moved;
    };

    let item = moved.remove(from_idx);
    moved.insert(to_idx, item);
    moved
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Swaps `id` with its neighbour. An id missing from `ids` is appended first.
pub fn step(ids: &[String], id: &str, direction: Direction) -> Vec<String> {
    let mut stepped = ids.to_vec();
    let idx = match stepped.iter().position(|existing| existing == id) {
        Some(idx) => idx,
        None => {
            stepped.push(id.to_string());
            stepped.len() - 1
        }
    };

    let target = match direction {
        Direction::Up => idx.checked_sub(1),
        Direction::Down => Some(idx + 1).filter(|t| *t < stepped.len()),
    };
    if let Some(target) = target {
        stepped.swap(idx, target);
    }
    stepped
}

/// Reordering only makes sense with a selected scope and no active column sort.
pub fn can_reorder(sort_active: bool, scope: Option<&Scope>) -> bool {
    !sort_active && scope.is_some()
}

/// Saved priority lists on top of a [`KvStore`]. Storage failures are logged
/// and read as "nothing saved"; they never reach the caller.
pub struct PriorityOverrideStore<S> {
    store: S,
}

impl<S: KvStore> PriorityOverrideStore<S> {
    pub fn new(store: S) -> Self {
        PriorityOverrideStore { store }
    }

    pub fn get_order(&self, scope: &Scope) -> Vec<String> {
        let key = storage_key(scope);
        match self.store.get(&key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(%key, error = %e, "saved order priority is not a list of ids, ignoring");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(%key, error = %e, "failed to read saved order priority");
                Vec::new()
            }
        }
    }

    pub fn save_order(&self, scope: &Scope, ids: &[String]) {
        let key = storage_key(scope);
        let raw = match serde_json::to_string(ids) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%key, error = %e, "failed to encode order priority");
                return;
            }
        };
        match self.store.set(&key, &raw) {
            Ok(()) => debug!(%key, count = ids.len(), "order priority saved"),
            Err(e) => warn!(%key, error = %e, "failed to save order priority"),
        }
    }

    /// Live ids in saved order.
    pub fn ordered(&self, scope: &Scope, live: &[String]) -> Vec<String> {
        merge(&self.get_order(scope), live)
    }

    /// Drag-and-drop: move `from` onto `to`'s position and persist the result.
    pub fn reorder(&self, scope: &Scope, live: &[String], from: &str, to: &str) -> Vec<String> {
        let reordered = move_id(&self.ordered(scope, live), from, to);
        self.save_order(scope, &reordered);
        reordered
    }

    /// Arrow buttons: swap `id` with its neighbour and persist the result.
    pub fn step(&self, scope: &Scope, live: &[String], id: &str, direction: Direction) -> Vec<String> {
        let stepped = step(&self.ordered(scope, live), id, direction);
        self.save_order(scope, &stepped);
        stepped
    }
}
