//! The compiled-procedure cache.
//!
//! Procedures live in two structures: a slot table holding the lowered
//! closures, and an index from type pair to slot. Slots exist so that a
//! procedure can reference another pair's procedure before that pair has
//! finished compiling: synthesis declares a slot, emits `Op::Call` against
//! it, and the slot is backfilled when the nested pair's lowering
//! completes.
//!
//! Publication protocol: a compile session backfills every slot it
//! declared, then publishes all of its index entries under one write lock.
//! Readers go through the index, so they can never observe a declared but
//! unfilled slot; once a pair is visible, everything reachable from it is
//! usable. A failed session publishes nothing and recycles its slots, so
//! no partial artifact survives.
//!
//! One mutex serializes compile sessions: concurrent first users of a pair
//! produce exactly one physical compile, with the losers blocking until
//! the winner publishes and then reading the cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use rustc_hash::FxHashMap;

use morph_model::Value;

use crate::context::ConvCtx;
use crate::error::RuntimeError;
use crate::pair::TypePair;

/// A lowered new-instance conversion.
pub(crate) type ConvertFn =
    dyn Fn(&Value, &mut ConvCtx<'_>) -> Result<Value, RuntimeError> + Send + Sync;

/// A lowered populate-existing conversion. Takes and returns the
/// destination value.
pub(crate) type PopulateFn =
    dyn Fn(&Value, Value, &mut ConvCtx<'_>) -> Result<Value, RuntimeError> + Send + Sync;

/// A compiled procedure: the artifact the cache stores.
#[derive(Clone)]
pub(crate) enum Compiled {
    Convert(Arc<ConvertFn>),
    Populate(Arc<PopulateFn>),
}

/// Index into the slot table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SlotId(u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub(crate) struct ProcedureCache {
    /// Published pairs only.
    index: RwLock<FxHashMap<TypePair, SlotId>>,
    slots: RwLock<Vec<Option<Compiled>>>,
    /// Slots recycled from failed sessions.
    free: Mutex<Vec<SlotId>>,
    compile_lock: Mutex<()>,
    /// Physical synthesis+lowering executions, cumulative across resets.
    compiles: AtomicU64,
}

impl ProcedureCache {
    pub fn new() -> ProcedureCache {
        ProcedureCache {
            index: RwLock::new(FxHashMap::default()),
            slots: RwLock::new(Vec::new()),
            free: Mutex::new(Vec::new()),
            compile_lock: Mutex::new(()),
            compiles: AtomicU64::new(0),
        }
    }

    /// The published procedure for a pair, if any.
    pub fn lookup(&self, pair: TypePair) -> Option<Compiled> {
        let slot = *self.index.read().get(&pair)?;
        Some(self.thunk(slot))
    }

    /// The published slot for a pair, if any.
    pub fn published_slot(&self, pair: TypePair) -> Option<SlotId> {
        self.index.read().get(&pair).copied()
    }

    /// The procedure in a slot. Callers hand out slot ids only for
    /// backfilled slots (their own session's, or published ones), so an
    /// empty slot here is an engine bug.
    pub fn thunk(&self, slot: SlotId) -> Compiled {
        self.slots.read()[slot.index()]
            .clone()
            .expect("slot read before backfill")
    }

    /// Serialize compile sessions. Hold the guard for the whole
    /// synthesize-lower-publish sequence.
    pub fn compile_guard(&self) -> MutexGuard<'_, ()> {
        self.compile_lock.lock()
    }

    /// Declare an empty slot for a procedure being compiled.
    pub fn alloc_slot(&self) -> SlotId {
        if let Some(slot) = self.free.lock().pop() {
            return slot;
        }
        let mut slots = self.slots.write();
        let slot = SlotId(slots.len() as u32);
        slots.push(None);
        slot
    }

    pub fn backfill(&self, slot: SlotId, compiled: Compiled) {
        self.slots.write()[slot.index()] = Some(compiled);
    }

    /// Publish a session's pairs. One write lock, after every slot in
    /// `entries` has been backfilled.
    pub fn publish(&self, entries: &[(TypePair, SlotId)]) {
        let mut index = self.index.write();
        for &(pair, slot) in entries {
            index.insert(pair, slot);
        }
    }

    /// Return a failed session's slots to the free list. Nothing
    /// published can reference them.
    pub fn recycle(&self, failed: Vec<SlotId>) {
        let mut slots = self.slots.write();
        for slot in &failed {
            slots[slot.index()] = None;
        }
        drop(slots);
        self.free.lock().extend(failed);
    }

    pub fn note_compile(&self) {
        self.compiles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn compile_count(&self) -> u64 {
        self.compiles.load(Ordering::Relaxed)
    }

    pub fn compiled_pairs(&self) -> usize {
        self.index.read().len()
    }

    /// Drop every published procedure and declared slot. The compile
    /// counter is cumulative and survives.
    pub fn clear(&mut self) {
        self.index.get_mut().clear();
        self.slots.get_mut().clear();
        self.free.get_mut().clear();
    }
}
