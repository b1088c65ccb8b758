// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Inline caches.
//!
//! A cache starts unlinked. Each miss puts a new guard in front of the
//! chain, so the most recently linked shape is tested first. Once the chain
//! is `threshold` guards deep, the next miss replaces it with a table keyed
//! by the receiver's slot and the cache stops guarding.
//!
//! The state is an immutable record behind `RwLock<Arc<_>>`: readers clone
//! the `Arc` and walk it without holding the lock, and a relink swaps in a
//! new record. Concurrent relinks are allowed; the last write wins.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::value::Value;

/// The shape a cached target was linked for.
pub trait CacheKey: Send + Sync {
    /// What the megamorphic table is keyed by.
    type Slot: Eq + Hash + Clone + Send + Sync;

    /// Whether `operands` have the shape this key was linked for.
    fn matches(&self, operands: &[Value]) -> bool;

    /// Table slot of this key, or `None` when the target cannot be shared by
    /// every operand list with the same slot.
    fn slot(&self) -> Option<Self::Slot>;

    /// Table slot for a list of operands.
    fn slot_of(operands: &[Value]) -> Option<Self::Slot>;
}

struct Guard<K, T> {
    key: K,
    target: T,
    depth: usize,
    next: Option<Arc<Guard<K, T>>>,
}

enum CacheState<K: CacheKey, T> {
    Unlinked,
    Guarded(Arc<Guard<K, T>>),
    Megamorphic(RwLock<HashMap<K::Slot, T>>),
}

/// Snapshot of a cache's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Guards in the chain; zero once megamorphic.
    pub depth: usize,
    pub megamorphic: bool,
}

pub struct InlineCache<K: CacheKey, T: Clone> {
    state: RwLock<Arc<CacheState<K, T>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<K: CacheKey, T: Clone> InlineCache<K, T> {
    pub fn new() -> Self {
        InlineCache {
            state: RwLock::new(Arc::new(CacheState::Unlinked)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// The live target linked for `operands`. `live` turns a cached target
    /// into a usable one and may reject it, which counts as a miss.
    pub fn lookup<R>(&self, operands: &[Value], live: impl Fn(&T) -> Option<R>) -> Option<R> {
        let state = Arc::clone(&self.state.read());
        let found = match &*state {
            CacheState::Unlinked => None,
            CacheState::Guarded(head) => {
                let mut guard = Some(head);
                let mut found = None;
                while let Some(g) = guard {
                    if g.key.matches(operands) {
                        found = live(&g.target);
                        break;
                    }
                    guard = g.next.as_ref();
                }
                found
            }
            CacheState::Megamorphic(table) => K::slot_of(operands)
                .and_then(|slot| table.read().get(&slot).cloned())
                .and_then(|target| live(&target)),
        };
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Link `target` for operands matching `key`.
    pub fn relink(&self, key: K, target: T, threshold: usize) {
        let mut state = self.state.write();
        let next = match &**state {
            CacheState::Unlinked => CacheState::Guarded(Arc::new(Guard {
                key,
                target,
                depth: 1,
                next: None,
            })),
            CacheState::Guarded(head) if head.depth >= threshold => {
                let mut table = HashMap::new();
                if let Some(slot) = key.slot() {
                    table.insert(slot, target);
                }
                let mut guard = Some(head);
                while let Some(g) = guard {
                    if let Some(slot) = g.key.slot() {
                        table.entry(slot).or_insert_with(|| g.target.clone());
                    }
                    guard = g.next.as_ref();
                }
                log::debug!(
                    "call site went megamorphic after {} guards ({} table entries)",
                    head.depth,
                    table.len()
                );
                CacheState::Megamorphic(RwLock::new(table))
            }
            CacheState::Guarded(head) => CacheState::Guarded(Arc::new(Guard {
                key,
                target,
                depth: head.depth + 1,
                next: Some(Arc::clone(head)),
            })),
            CacheState::Megamorphic(table) => {
                if let Some(slot) = key.slot() {
                    table.write().insert(slot, target);
                }
                return;
            }
        };
        *state = Arc::new(next);
    }

    pub fn stats(&self) -> CacheStats {
        let state = Arc::clone(&self.state.read());
        let (depth, megamorphic) = match &*state {
            CacheState::Unlinked => (0, false),
            CacheState::Guarded(head) => (head.depth, false),
            CacheState::Megamorphic(_) => (0, true),
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            depth,
            megamorphic,
        }
    }
}

impl<K: CacheKey, T: Clone> Default for InlineCache<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CacheKey, T: Clone> fmt::Debug for InlineCache<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("InlineCache")
            .field("hits", &stats.hits)
            .field("misses", &stats.misses)
            .field("depth", &stats.depth)
            .field("megamorphic", &stats.megamorphic)
            .finish()
    }
}
