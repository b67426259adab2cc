//! Arena that backs all heap-allocated runtime values.
//!
//! Every string, symbol, and object produced during parse and execution is
//! owned by the per-VM [`Heap`]. Slots freed during execution are recycled
//! through a free list, keeping memory usage flat for long-running loops.
//! Cleanup callbacks registered on the heap fire in LIFO order at VM
//! teardown, releasing any external handles the embedder attached.
//!
//! There is no reference counting among core objects: the heap is the single
//! owner and everything it holds dies with the VM.

use std::collections::BTreeMap;

use crate::{
    error::{JsError, JsResult},
    object::JsObject,
    string::JsString,
    value::JsSymbol,
};

/// Index of a value slot in the heap arena.
///
/// Uses `u32` to keep [`crate::value::Value`] small; four billion live
/// objects is far beyond what a single VM arena is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeapId(u32);

impl HeapId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Payload of one heap slot.
#[derive(Debug)]
pub(crate) enum HeapData {
    /// A long or UTF-8 string that does not fit the inline short form.
    String(JsString),
    /// A symbol with stable identity and optional description.
    Symbol(JsSymbol),
    /// Any object-kind entity: plain object, array, function, boxed
    /// primitive, date, regexp, promise, or error.
    Object(JsObject),
}

impl HeapData {
    /// Static variant name, used by [`HeapStats`].
    fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::Symbol(_) => "Symbol",
            Self::Object(object) => object.kind().type_name(),
        }
    }
}

/// Cleanup hook registered on the heap, run at teardown.
type CleanupFn = Box<dyn FnOnce()>;

/// Snapshot of heap occupancy, used by embedders to watch arena growth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of live values on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Breakdown of live values by kind name (e.g. "Array", "String").
    ///
    /// `BTreeMap` keeps iteration deterministic for display and comparison.
    pub objects_by_type: BTreeMap<&'static str, usize>,
}

/// Bump/pool arena tied to a VM handle.
///
/// `entries` is a slab: `None` marks a freed slot whose id sits on the free
/// list. `allocate` pops the free list when possible, otherwise appends.
/// `max_slots` bounds the arena; exhausting it reports the pre-built
/// `MemoryError` without allocating.
pub(crate) struct Heap {
    entries: Vec<Option<HeapData>>,
    /// IDs of freed slots available for reuse.
    free_list: Vec<HeapId>,
    /// Hard cap on total slots; `usize::MAX` means unbounded.
    max_slots: usize,
    /// Teardown hooks, fired in LIFO order on drop.
    cleanups: Vec<CleanupFn>,
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("entries", &self.entries)
            .field("free_list", &self.free_list)
            .field("max_slots", &self.max_slots)
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

impl Heap {
    pub fn new(max_slots: usize) -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            max_slots,
            cleanups: Vec::new(),
        }
    }

    /// Allocates a slot for `data`, reusing a freed slot when one exists.
    pub fn allocate(&mut self, data: HeapData) -> JsResult<HeapId> {
        if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(data);
            return Ok(id);
        }
        if self.entries.len() >= self.max_slots {
            return Err(JsError::out_of_memory());
        }
        let id = HeapId(u32::try_from(self.entries.len()).map_err(|_| JsError::out_of_memory())?);
        self.entries.push(Some(data));
        Ok(id)
    }

    /// Returns the data for a heap id.
    ///
    /// # Panics
    /// Panics if the id points at a freed slot. Ids are only produced by
    /// `allocate` and the core never frees a slot that is still reachable,
    /// so a panic here is an engine bug, not a user error.
    #[inline]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries[id.index()].as_ref().expect("heap slot is live")
    }

    #[inline]
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries[id.index()].as_mut().expect("heap slot is live")
    }

    /// Borrows the object stored at `id`.
    ///
    /// # Panics
    /// Panics if the slot does not hold an object; callers check the value
    /// tag before descending into the heap.
    pub fn object(&self, id: HeapId) -> &JsObject {
        match self.get(id) {
            HeapData::Object(object) => object,
            other => panic!("expected object slot, found {}", other.type_name()),
        }
    }

    pub fn object_mut(&mut self, id: HeapId) -> &mut JsObject {
        match self.get_mut(id) {
            HeapData::Object(object) => object,
            HeapData::String(_) | HeapData::Symbol(_) => panic!("expected object slot"),
        }
    }

    /// Borrows the string stored at `id`; see [`Heap::object`] for the
    /// panic contract.
    pub fn string(&self, id: HeapId) -> &JsString {
        match self.get(id) {
            HeapData::String(string) => string,
            other => panic!("expected string slot, found {}", other.type_name()),
        }
    }

    pub fn string_mut(&mut self, id: HeapId) -> &mut JsString {
        match self.get_mut(id) {
            HeapData::String(string) => string,
            _ => panic!("expected string slot"),
        }
    }

    /// Releases a slot back to the free list.
    ///
    /// The executor calls this for values it can prove unreachable; the
    /// core itself only ever releases at teardown, when the whole arena
    /// drops at once.
    pub fn release(&mut self, id: HeapId) {
        if self.entries[id.index()].take().is_some() {
            self.free_list.push(id);
        }
    }

    /// Registers a cleanup hook fired at teardown, after later-registered
    /// hooks (LIFO).
    pub fn add_cleanup(&mut self, hook: CleanupFn) {
        self.cleanups.push(hook);
    }

    /// Applies a slot cap; slots already allocated stay valid regardless.
    pub fn set_max_slots(&mut self, max_slots: usize) {
        self.max_slots = max_slots;
    }

    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut live = 0usize;
        for entry in self.entries.iter().flatten() {
            live += 1;
            *objects_by_type.entry(entry.type_name()).or_insert(0) += 1;
        }
        HeapStats {
            live_objects: live,
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            objects_by_type,
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        // Values drop with the slab; only external hooks need ordering.
        while let Some(hook) = self.cleanups.pop() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::string::JsString;

    fn sample_string(text: &str) -> HeapData {
        HeapData::String(JsString::from_str(text))
    }

    #[test]
    fn allocate_reuses_freed_slots() {
        let mut heap = Heap::new(usize::MAX);
        let a = heap.allocate(sample_string("a")).unwrap();
        let b = heap.allocate(sample_string("b")).unwrap();
        assert_ne!(a, b);

        heap.release(a);
        assert_eq!(heap.stats().free_slots, 1);

        let c = heap.allocate(sample_string("c")).unwrap();
        assert_eq!(a, c);
        assert_eq!(heap.stats().free_slots, 0);
        assert_eq!(heap.string(c).as_str(), Some("c"));
    }

    #[test]
    fn slot_cap_reports_memory_error() {
        let mut heap = Heap::new(1);
        heap.allocate(sample_string("a")).unwrap();
        let err = heap.allocate(sample_string("b")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MemoryError);
    }

    #[test]
    fn cleanups_fire_in_lifo_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let mut heap = Heap::new(usize::MAX);
            for label in ["first", "second", "third"] {
                let order = Rc::clone(&order);
                heap.add_cleanup(Box::new(move || order.borrow_mut().push(label)));
            }
        }
        assert_eq!(*order.borrow(), vec!["third", "second", "first"]);
    }

    #[test]
    fn stats_group_by_type() {
        let mut heap = Heap::new(usize::MAX);
        heap.allocate(sample_string("x")).unwrap();
        heap.allocate(sample_string("y")).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.live_objects, 2);
        assert_eq!(stats.objects_by_type.get("String"), Some(&2));
    }
}
