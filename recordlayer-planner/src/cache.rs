use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;

use crate::plan::Plan;

#[derive(Clone)]
struct Entry {
    plan: Plan,
    inserted_at_epoch_secs: u64,
}

/// `spec.md` §4.6 steps 1 & 6: the plan cache keyed by the query's
/// canonical fingerprint, with LRU capacity eviction and a per-entry TTL.
/// Callers supply `now_epoch_secs` (this crate never calls
/// `SystemTime::now()` itself, for the same determinism reason
/// `StatisticsManager` takes a caller-supplied timestamp).
pub struct PlanCache {
    entries: DashMap<String, Entry>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
    ttl_secs: u64,
}

impl PlanCache {
    pub fn new(capacity: usize, ttl_secs: u64) -> Self { Self { entries: DashMap::new(), order: Mutex::new(VecDeque::new()), capacity, ttl_secs } }

    /// Returns the cached plan if present and not expired relative to
    /// `now_epoch_secs`; an expired entry is evicted on lookup.
    pub fn get(&self, fingerprint: &str, now_epoch_secs: u64) -> Option<Plan> {
        let hit = self.entries.get(fingerprint)?;
        if now_epoch_secs.saturating_sub(hit.inserted_at_epoch_secs) > self.ttl_secs {
            drop(hit);
            self.entries.remove(fingerprint);
            self.remove_from_order(fingerprint);
            return None;
        }
        let plan = hit.plan.clone();
        drop(hit);
        self.touch(fingerprint);
        Some(plan)
    }

    pub fn insert(&self, fingerprint: impl Into<String>, plan: Plan, now_epoch_secs: u64) {
        let key = fingerprint.into();
        self.entries.insert(key.clone(), Entry { plan, inserted_at_epoch_secs: now_epoch_secs });
        self.touch(&key);
        self.evict_if_over_capacity();
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    fn touch(&self, key: &str) {
        let mut order = self.order.lock().unwrap();
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.to_string());
    }

    fn remove_from_order(&self, key: &str) {
        let mut order = self.order.lock().unwrap();
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
    }

    fn evict_if_over_capacity(&self) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() > self.capacity {
            let oldest = {
                let mut order = self.order.lock().unwrap();
                order.pop_front()
            };
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
