//! The bounded, spatially-partitioned cache behind every matchmaking
//! subsystem: messages, signs, ghosts, bloodstains.
//!
//! Entries are shared out as `Arc<V>`; the pool is the single source of
//! truth for liveness. Per-area eviction is FIFO by an insertion queue
//! kept alongside the map. Removal leaves a stale trace in the queue;
//! pruning it eagerly would mean walking the whole deque, so stale ids
//! are simply skipped whenever trimming pops them.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use rand::seq::SliceRandom;

/// Per-area unique entry identifier.
pub type EntryId = u32;

struct Area<V> {
    entries: HashMap<EntryId, Arc<V>>,
    insertion_order: VecDeque<EntryId>,
}

impl<V> Default for Area<V> {
    fn default() -> Self {
        Self { entries: HashMap::new(), insertion_order: VecDeque::new() }
    }
}

/// A cache split up spatially by an opaque area key.
pub struct AreaPool<K, V> {
    areas: HashMap<K, Area<V>>,
    max_per_area: usize,
}

impl<K: Copy + Eq + Hash, V> AreaPool<K, V> {
    pub fn new(max_per_area: usize) -> Self {
        Self { areas: HashMap::new(), max_per_area }
    }

    /// Insert and enqueue; a no-op returning `false` if `id` is already
    /// present. Trims the area back under its cap afterwards.
    pub fn add(&mut self, area: K, id: EntryId, value: Arc<V>) -> bool {
        let slot = self.areas.entry(area).or_default();
        if slot.entries.contains_key(&id) {
            return false;
        }
        slot.entries.insert(id, value);
        slot.insertion_order.push_back(id);
        Self::trim_area(slot, self.max_per_area);
        true
    }

    /// Swap the value of a live entry without disturbing its age.
    pub fn replace(&mut self, area: K, id: EntryId, value: Arc<V>) -> bool {
        match self.areas.get_mut(&area) {
            Some(slot) if slot.entries.contains_key(&id) => {
                slot.entries.insert(id, value);
                true
            }
            _ => false,
        }
    }

    /// Remove from the map; the insertion-queue trace is pruned lazily.
    pub fn remove(&mut self, area: K, id: EntryId) -> Option<Arc<V>> {
        self.areas.get_mut(&area)?.entries.remove(&id)
    }

    pub fn find(&self, area: K, id: EntryId) -> Option<Arc<V>> {
        self.areas.get(&area)?.entries.get(&id).cloned()
    }

    pub fn contains(&self, area: K, id: EntryId) -> bool {
        self.areas.get(&area).is_some_and(|a| a.entries.contains_key(&id))
    }

    pub fn total_entries(&self) -> usize {
        self.areas.values().map(|a| a.entries.len()).sum()
    }

    /// Up to `n` distinct entries from one area, uniformly sampled.
    pub fn random_set(&self, area: K, n: usize) -> Vec<Arc<V>> {
        let Some(slot) = self.areas.get(&area) else { return Vec::new() };
        let mut ids: Vec<EntryId> = slot.entries.keys().copied().collect();
        ids.shuffle(&mut rand::thread_rng());
        ids.truncate(n);
        ids.iter().map(|id| slot.entries[id].clone()).collect()
    }

    /// Up to `n` entries across every area matching `area_filter`,
    /// stopping once `n` is reached.
    pub fn random_set_filtered(
        &self,
        n: usize,
        mut area_filter: impl FnMut(K) -> bool,
    ) -> Vec<Arc<V>> {
        let mut result = Vec::new();
        for (&key, slot) in &self.areas {
            if result.len() >= n || !area_filter(key) {
                continue;
            }
            let mut ids: Vec<EntryId> = slot.entries.keys().copied().collect();
            ids.shuffle(&mut rand::thread_rng());
            for id in ids.into_iter().take(n - result.len()) {
                result.push(slot.entries[&id].clone());
            }
        }
        result
    }

    /// Up to `n` entries from one area in insertion order, newest first,
    /// filtered. Stale queue traces are skipped.
    pub fn recent_set(
        &self,
        area: K,
        n: usize,
        mut predicate: impl FnMut(&V) -> bool,
    ) -> Vec<Arc<V>> {
        let Some(slot) = self.areas.get(&area) else { return Vec::new() };
        let mut result = Vec::new();
        for id in slot.insertion_order.iter().rev() {
            if result.len() >= n {
                break;
            }
            if let Some(value) = slot.entries.get(id) {
                if predicate(value) {
                    result.push(value.clone());
                }
            }
        }
        result
    }

    fn trim_area(slot: &mut Area<V>, max_per_area: usize) {
        while slot.entries.len() > max_per_area {
            let Some(oldest) = slot.insertion_order.pop_front() else { break };
            // May be a trace of an already-removed entry; skipping it is
            // the lazy prune.
            slot.entries.remove(&oldest);
        }
    }
}
