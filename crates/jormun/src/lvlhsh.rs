//! Layered hash: the bit-sliced associative structure behind property maps.
//!
//! A layered hash is a tree of 16-wide cells. A lookup consumes 4 bits of
//! the key hash per descent step; collisions chain in a small bucket at the
//! deepest reached cell, and a bucket that outgrows its capacity splits into
//! a child cell using the next 4 bits.
//!
//! Levels are held in `Rc`, so cloning a hash shares the whole tree and any
//! later insertion into a shared path forks only the levels it touches
//! (`Rc::make_mut`). This is how one prototype's property table is aliased
//! by every instance without per-instance copies: the upper levels stay
//! shared until an object mutates them.
//!
//! Iteration is in insertion order: every entry records a monotonically
//! increasing sequence number, and [`Lvlhsh::iter`] yields entries sorted by
//! it. Replacing a value keeps the original position, matching property
//! enumeration semantics.

use std::rc::Rc;

use smallvec::SmallVec;

/// Slots per cell; one hex digit of the hash selects a slot.
const CELL_WIDTH: usize = 16;
/// Collision-bucket size that triggers a split into a child cell.
const BUCKET_CAP: usize = 4;
/// Bits of hash consumed by a full descent; past this everything chains.
const MAX_SHIFT: u32 = 28;

#[derive(Debug, Clone)]
struct Entry<K, V> {
    hash: u32,
    order: u32,
    key: K,
    value: V,
}

#[derive(Debug, Clone)]
enum Slot<K, V> {
    Empty,
    Bucket(SmallVec<[Entry<K, V>; 2]>),
    Child(Rc<Cell<K, V>>),
}

#[derive(Debug, Clone)]
struct Cell<K, V> {
    slots: [Slot<K, V>; CELL_WIDTH],
}

impl<K, V> Cell<K, V> {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::Empty),
        }
    }
}

/// Outcome of [`Lvlhsh::insert`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Insert<V> {
    /// The key was new and the entry was added.
    Inserted,
    /// The key existed and `replace` was set; the previous value returned.
    Replaced(V),
    /// The key existed and `replace` was not set; nothing changed.
    Exists,
}

/// A layered key→value map. `K` is compared with `Eq` only among entries
/// whose caller-supplied hash collides.
#[derive(Debug)]
pub(crate) struct Lvlhsh<K, V> {
    root: Option<Rc<Cell<K, V>>>,
    len: u32,
    next_order: u32,
}

/// Cloning shares every level; mutation after a clone copies only the
/// touched path.
impl<K, V> Clone for Lvlhsh<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
            next_order: self.next_order,
        }
    }
}

impl<K, V> Default for Lvlhsh<K, V> {
    fn default() -> Self {
        Self {
            root: None,
            len: 0,
            next_order: 0,
        }
    }
}

impl<K: Eq + Clone, V: Clone> Lvlhsh<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `key → value`. When the key exists, `replace` decides
    /// between swapping the value in place (keeping its iteration
    /// position) and declining.
    pub fn insert(&mut self, hash: u32, key: K, value: V, replace: bool) -> Insert<V> {
        let order = self.next_order;
        let root = self.root.get_or_insert_with(|| Rc::new(Cell::new()));
        let outcome = insert_into(Rc::make_mut(root), 0, hash, key, value, order, replace);
        if matches!(outcome, Insert::Inserted) {
            self.len += 1;
            self.next_order += 1;
        }
        outcome
    }

    /// Finds the value for `key`, descending 4 hash bits per level.
    pub fn find(&self, hash: u32, key: &K) -> Option<&V> {
        let mut cell = self.root.as_deref()?;
        let mut shift = 0u32;
        loop {
            match &cell.slots[nibble(hash, shift)] {
                Slot::Empty => return None,
                Slot::Bucket(bucket) => {
                    return bucket.iter().find(|e| e.hash == hash && e.key == *key).map(|e| &e.value);
                }
                Slot::Child(child) => {
                    cell = child;
                    shift += 4;
                }
            }
        }
    }

    /// Mutable lookup. Forks any shared level on the descent path, so a
    /// map cloned from a shared template is safe to mutate through.
    pub fn find_mut(&mut self, hash: u32, key: &K) -> Option<&mut V> {
        let root = self.root.as_mut()?;
        find_mut_in(Rc::make_mut(root), 0, hash, key)
    }

    /// Removes `key`, returning its value. Child cells left empty are not
    /// condensed; property maps shrink rarely and re-grow in place.
    pub fn delete(&mut self, hash: u32, key: &K) -> Option<V> {
        let root = self.root.as_mut()?;
        let removed = delete_from(Rc::make_mut(root), 0, hash, key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Iterates entries in insertion order.
    ///
    /// Gathers entry references in one tree walk and sorts by sequence
    /// number; property maps are small enough that this stays cheap.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut entries: Vec<&Entry<K, V>> = Vec::with_capacity(self.len());
        if let Some(root) = &self.root {
            collect(root, &mut entries);
        }
        entries.sort_by_key(|e| e.order);
        entries.into_iter().map(|e| (&e.key, &e.value))
    }
}

#[inline]
fn nibble(hash: u32, shift: u32) -> usize {
    ((hash >> shift) & 0xF) as usize
}

fn insert_into<K: Eq + Clone, V: Clone>(
    cell: &mut Cell<K, V>,
    shift: u32,
    hash: u32,
    key: K,
    value: V,
    order: u32,
    replace: bool,
) -> Insert<V> {
    let slot = &mut cell.slots[nibble(hash, shift)];
    match slot {
        Slot::Empty => {
            let mut bucket = SmallVec::new();
            bucket.push(Entry { hash, order, key, value });
            *slot = Slot::Bucket(bucket);
            Insert::Inserted
        }
        Slot::Bucket(bucket) => {
            if let Some(entry) = bucket.iter_mut().find(|e| e.hash == hash && e.key == key) {
                if replace {
                    let old = std::mem::replace(&mut entry.value, value);
                    return Insert::Replaced(old);
                }
                return Insert::Exists;
            }
            if bucket.len() < BUCKET_CAP || shift >= MAX_SHIFT {
                bucket.push(Entry { hash, order, key, value });
                return Insert::Inserted;
            }
            // Split: push the bucket one level down and retry there.
            let mut child = Cell::new();
            for entry in bucket.drain(..) {
                let child_slot = &mut child.slots[nibble(entry.hash, shift + 4)];
                match child_slot {
                    Slot::Empty => {
                        let mut fresh = SmallVec::new();
                        fresh.push(entry);
                        *child_slot = Slot::Bucket(fresh);
                    }
                    Slot::Bucket(fresh) => fresh.push(entry),
                    Slot::Child(_) => unreachable!("fresh cell has no children"),
                }
            }
            let outcome = insert_into(&mut child, shift + 4, hash, key, value, order, replace);
            cell.slots[nibble(hash, shift)] = Slot::Child(Rc::new(child));
            outcome
        }
        Slot::Child(child) => insert_into(Rc::make_mut(child), shift + 4, hash, key, value, order, replace),
    }
}

fn find_mut_in<'a, K: Eq + Clone, V: Clone>(
    cell: &'a mut Cell<K, V>,
    shift: u32,
    hash: u32,
    key: &K,
) -> Option<&'a mut V> {
    match &mut cell.slots[nibble(hash, shift)] {
        Slot::Empty => None,
        Slot::Bucket(bucket) => bucket
            .iter_mut()
            .find(|e| e.hash == hash && e.key == *key)
            .map(|e| &mut e.value),
        Slot::Child(child) => find_mut_in(Rc::make_mut(child), shift + 4, hash, key),
    }
}

fn delete_from<K: Eq + Clone, V: Clone>(cell: &mut Cell<K, V>, shift: u32, hash: u32, key: &K) -> Option<V> {
    match &mut cell.slots[nibble(hash, shift)] {
        Slot::Empty => None,
        Slot::Bucket(bucket) => {
            let position = bucket.iter().position(|e| e.hash == hash && e.key == *key)?;
            Some(bucket.remove(position).value)
        }
        Slot::Child(child) => delete_from(Rc::make_mut(child), shift + 4, hash, key),
    }
}

fn collect<'a, K, V>(cell: &'a Cell<K, V>, out: &mut Vec<&'a Entry<K, V>>) {
    for slot in &cell.slots {
        match slot {
            Slot::Empty => {}
            Slot::Bucket(bucket) => out.extend(bucket.iter()),
            Slot::Child(child) => collect(child, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::intern::djb_hash;

    fn hash_of(key: &str) -> u32 {
        djb_hash(key.as_bytes())
    }

    #[test]
    fn insert_find_delete() {
        let mut map: Lvlhsh<String, i32> = Lvlhsh::new();
        assert_eq!(map.insert(hash_of("a"), "a".into(), 1, false), Insert::Inserted);
        assert_eq!(map.insert(hash_of("b"), "b".into(), 2, false), Insert::Inserted);
        assert_eq!(map.find(hash_of("a"), &"a".to_string()), Some(&1));
        assert_eq!(map.find(hash_of("missing"), &"missing".to_string()), None);

        assert_eq!(map.insert(hash_of("a"), "a".into(), 9, false), Insert::Exists);
        assert_eq!(map.insert(hash_of("a"), "a".into(), 9, true), Insert::Replaced(1));
        assert_eq!(map.find(hash_of("a"), &"a".to_string()), Some(&9));

        assert_eq!(map.delete(hash_of("a"), &"a".to_string()), Some(9));
        assert_eq!(map.find(hash_of("a"), &"a".to_string()), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn iteration_is_insertion_ordered() {
        let mut map: Lvlhsh<String, usize> = Lvlhsh::new();
        let keys = ["delta", "alpha", "omega", "beta", "kappa", "zeta", "theta"];
        for (index, key) in keys.iter().enumerate() {
            map.insert(hash_of(key), (*key).to_string(), index, false);
        }
        let seen: Vec<&str> = map.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(seen, keys);

        // Replacing keeps position; delete + reinsert moves to the end.
        map.insert(hash_of("alpha"), "alpha".into(), 99, true);
        map.delete(hash_of("delta"), &"delta".to_string());
        map.insert(hash_of("delta"), "delta".into(), 0, false);
        let seen: Vec<&str> = map.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(seen, ["alpha", "omega", "beta", "kappa", "zeta", "theta", "delta"]);
    }

    #[test]
    fn buckets_split_into_child_cells() {
        let mut map: Lvlhsh<u32, u32> = Lvlhsh::new();
        // Identical low nibbles force splits down several levels.
        let keys: Vec<u32> = (0..64).map(|i| i << 8).collect();
        for &key in &keys {
            assert_eq!(map.insert(key, key, key, false), Insert::Inserted);
        }
        assert_eq!(map.len(), keys.len());
        for &key in &keys {
            assert_eq!(map.find(key, &key), Some(&key));
        }
    }

    #[test]
    fn colliding_hashes_chain_by_key_equality() {
        let mut map: Lvlhsh<String, i32> = Lvlhsh::new();
        map.insert(7, "first".into(), 1, false);
        map.insert(7, "second".into(), 2, false);
        assert_eq!(map.find(7, &"first".to_string()), Some(&1));
        assert_eq!(map.find(7, &"second".to_string()), Some(&2));
        assert_eq!(map.delete(7, &"first".to_string()), Some(1));
        assert_eq!(map.find(7, &"second".to_string()), Some(&2));
    }

    #[test]
    fn clone_shares_levels_until_mutated() {
        let mut shared: Lvlhsh<String, i32> = Lvlhsh::new();
        for key in ["push", "pop", "slice", "splice", "join"] {
            shared.insert(hash_of(key), key.to_string(), 0, false);
        }

        let mut fork = shared.clone();
        assert!(Rc::ptr_eq(shared.root.as_ref().unwrap(), fork.root.as_ref().unwrap()));

        // Mutating the fork leaves the original untouched.
        fork.insert(hash_of("shift"), "shift".into(), 1, false);
        fork.delete(hash_of("pop"), &"pop".to_string());
        assert_eq!(shared.find(hash_of("pop"), &"pop".to_string()), Some(&0));
        assert_eq!(shared.find(hash_of("shift"), &"shift".to_string()), None);
        assert_eq!(fork.find(hash_of("shift"), &"shift".to_string()), Some(&1));
    }
}
