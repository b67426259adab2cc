//! Identifier interning.
//!
//! Identifiers are hashed once by the lexer and carry a stable unique id —
//! the DJB hash of their bytes — used as the primary key across scope trees
//! so identifiers are compared by integer, never by string, after
//! tokenization. The interner stores each distinct spelling once and hands
//! out [`AtomId`]s for text retrieval.
//!
//! A fixed set of well-known atoms (property names the runtime touches on
//! hot paths, like `length` and `prototype`) is pre-seeded at construction
//! so their ids are compile-time constants.

use hashbrown::HashTable;
use strum::{EnumIter, IntoStaticStr};

/// Index into the interner's atom storage.
///
/// Uses `u32` to save space; the id is dense and only meaningful for the
/// interner that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AtomId(u32);

impl AtomId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// DJB hash of a byte string: `h = h * 33 + byte`, seeded with 5381.
///
/// This is the engine-wide identifier hash. Scope trees key variables by it
/// and property hashes feed it to the layered hash, so equal spellings agree
/// on their integer key everywhere.
#[must_use]
pub fn djb_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &byte in bytes {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(u32::from(byte));
    }
    hash
}

/// Property names the runtime resolves without interning at call sites.
///
/// Seeded into every interner in declaration order, so
/// `WellKnownAtom::Length.atom()` is a constant id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum WellKnownAtom {
    Length,
    Prototype,
    Constructor,
    #[strum(serialize = "__proto__")]
    Proto,
    Name,
    Message,
    Stack,
    ValueOf,
    ToString,
    #[strum(serialize = "toJSON")]
    ToJson,
    #[strum(serialize = "toISOString")]
    ToIsoString,
    Parse,
    Stringify,
    Then,
    Value,
    Writable,
    Enumerable,
    Configurable,
    Get,
    Set,
    Arguments,
    This,
    Default,
    /// Contextual keyword in `import x from '…'`.
    From,
}

impl WellKnownAtom {
    /// The pre-seeded atom id for this name.
    #[must_use]
    pub fn atom(self) -> AtomId {
        AtomId(self as u32)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// One interned identifier: its spelling and DJB unique id.
#[derive(Debug)]
struct Atom {
    text: Box<str>,
    unique_id: u32,
}

/// Identifier atom table.
///
/// Lookup is by precomputed DJB hash with byte-equality confirmation, the
/// same scheme the dense-entry property tables use: the `HashTable` maps
/// hashes to indices in the `atoms` vector, which preserves first-interning
/// order.
#[derive(Debug)]
pub(crate) struct Interner {
    table: HashTable<AtomId>,
    atoms: Vec<Atom>,
}

impl Interner {
    /// Creates an interner with all well-known atoms pre-seeded.
    pub fn new() -> Self {
        let mut interner = Self {
            table: HashTable::new(),
            atoms: Vec::new(),
        };
        for well_known in <WellKnownAtom as strum::IntoEnumIterator>::iter() {
            let id = interner.intern(well_known.as_str());
            debug_assert_eq!(id, well_known.atom());
        }
        interner
    }

    /// Interns `text`, returning the existing atom when the spelling was
    /// seen before.
    pub fn intern(&mut self, text: &str) -> AtomId {
        let unique_id = djb_hash(text.as_bytes());
        let atoms = &self.atoms;
        let entry = self.table.entry(
            u64::from(unique_id),
            |&id| atoms[id.index()].text.as_ref() == text,
            |&id| u64::from(atoms[id.index()].unique_id),
        );
        match entry {
            hashbrown::hash_table::Entry::Occupied(occupied) => *occupied.get(),
            hashbrown::hash_table::Entry::Vacant(vacant) => {
                let id = AtomId(u32::try_from(self.atoms.len()).expect("atom table exceeds u32 range"));
                self.atoms.push(Atom {
                    text: text.into(),
                    unique_id,
                });
                vacant.insert(id);
                id
            }
        }
    }

    /// The spelling of an atom.
    #[inline]
    pub fn get(&self, id: AtomId) -> &str {
        &self.atoms[id.index()].text
    }

    /// The DJB unique id of an atom; scope trees key variables by this.
    #[inline]
    pub fn unique_id(&self, id: AtomId) -> u32 {
        self.atoms[id.index()].unique_id
    }
}
