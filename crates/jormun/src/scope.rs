//! Lexical scope tree: variables, labels, and delayed reference resolution.
//!
//! Scopes form a tree built during parsing. Each scope keys its variables,
//! labels, and unresolved references by the identifier's DJB unique id, so
//! all comparisons are integer comparisons. Variable indices are tagged
//! integers encoding *which scope class and which slot*: the low bits select
//! one of `{local, closure, global, argument, block}` and the high bits give
//! the slot within that class's array. Once assigned, an index is stable for
//! the life of the VM — that is what lets bytecode refer to variables
//! without names.
//!
//! Reference lifecycle: a name use records the AST node in the current
//! scope's reference table. Closing a scope resolves what it can against
//! its own declarations and escalates the rest to the parent; anything that
//! reaches the global scope unresolved becomes a global late-bound slot.

use std::collections::BTreeMap;

use crate::{
    ast::{AstArena, NodeId, NodePayload},
    intern::AtomId,
};

/// Function scopes may nest at most this deep.
pub(crate) const MAX_FUNCTION_NESTING: u8 = 5;

/// Index of a scope in the scope tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ScopeType {
    Global,
    Function,
    Block,
    /// One-entry scope wrapped around a named function expression so the
    /// name binds inside the body but not outside.
    Shim,
}

/// Which slot array a variable index selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexClass {
    Local = 0,
    Closure = 1,
    Global = 2,
    Argument = 3,
    Block = 4,
}

/// A tagged variable index: class in the low 3 bits, slot above them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarIndex(u32);

impl VarIndex {
    pub(crate) fn new(class: IndexClass, slot: u32) -> Self {
        Self((slot << 3) | class as u32)
    }

    #[must_use]
    pub fn class(self) -> IndexClass {
        match self.0 & 0x7 {
            0 => IndexClass::Local,
            1 => IndexClass::Closure,
            2 => IndexClass::Global,
            3 => IndexClass::Argument,
            4 => IndexClass::Block,
            _ => unreachable!("unused index class tag"),
        }
    }

    #[must_use]
    pub fn slot(self) -> u32 {
        self.0 >> 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Function,
    Argument,
    Catch,
    Shim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableState {
    /// Declared, no reference bound yet.
    Created,
    /// At least one reference resolved to it.
    Referenced,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub unique_id: u32,
    pub atom: AtomId,
    pub kind: VariableKind,
    pub index: VarIndex,
    pub state: VariableState,
}

/// One lexical scope.
#[derive(Debug)]
pub struct Scope {
    pub ty: ScopeType,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Variables keyed by unique id.
    pub variables: BTreeMap<u32, Variable>,
    /// Labels keyed by unique id, mapping to the label's name atom.
    pub labels: BTreeMap<u32, AtomId>,
    /// Unresolved name uses keyed by unique id.
    pub references: BTreeMap<u32, Vec<NodeId>>,
    /// Next slot counters; function and global scopes start fresh ones.
    next_local: u32,
    next_closure: u32,
    next_argument: u32,
    next_block: u32,
    /// Function-nesting depth; capped at [`MAX_FUNCTION_NESTING`].
    pub nesting: u8,
    pub is_module: bool,
    pub is_arrow: bool,
}

/// The scope tree of one parse.
#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new scope under `parent`.
    ///
    /// Function scopes start fresh slot counters and deepen the nesting
    /// level; block and shim scopes inherit both from their parent. The
    /// caller checks the nesting cap so it can report a positioned error.
    pub fn push(&mut self, ty: ScopeType, parent: Option<ScopeId>) -> ScopeId {
        let (nesting, is_module) = match parent {
            Some(parent_id) => {
                let parent_scope = self.get(parent_id);
                let nesting = if ty == ScopeType::Function {
                    parent_scope.nesting + 1
                } else {
                    parent_scope.nesting
                };
                (nesting, parent_scope.is_module)
            }
            None => (0, false),
        };
        let id = ScopeId(u32::try_from(self.scopes.len()).expect("scope tree exceeds u32 range"));
        self.scopes.push(Scope {
            ty,
            parent,
            children: Vec::new(),
            variables: BTreeMap::new(),
            labels: BTreeMap::new(),
            references: BTreeMap::new(),
            next_local: 0,
            next_closure: 0,
            next_argument: 0,
            next_block: 0,
            nesting,
            is_module,
            is_arrow: false,
        });
        if let Some(parent_id) = parent {
            self.get_mut(parent_id).children.push(id);
        }
        id
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    /// The nearest enclosing scope (including `from`) that owns variable
    /// slots: a function or the global scope.
    pub fn variable_owner(&self, from: ScopeId) -> ScopeId {
        let mut current = from;
        loop {
            let scope = self.get(current);
            match scope.ty {
                ScopeType::Global | ScopeType::Function => return current,
                ScopeType::Block | ScopeType::Shim => {
                    current = scope.parent.expect("block scope has a parent");
                }
            }
        }
    }

    /// Declares a variable in `scope`, or returns the existing one for a
    /// benign redeclaration (same unique id, same slot).
    pub fn declare(&mut self, scope_id: ScopeId, atom: AtomId, unique_id: u32, kind: VariableKind) -> &Variable {
        let class = {
            let scope = self.get(scope_id);
            match kind {
                VariableKind::Argument => IndexClass::Argument,
                VariableKind::Catch | VariableKind::Shim => IndexClass::Block,
                VariableKind::Var | VariableKind::Function => match scope.ty {
                    ScopeType::Global => IndexClass::Global,
                    _ => IndexClass::Local,
                },
            }
        };
        let scope = self.get_mut(scope_id);
        if !scope.variables.contains_key(&unique_id) {
            let counter = match class {
                IndexClass::Local | IndexClass::Global => {
                    let slot = scope.next_local;
                    scope.next_local += 1;
                    slot
                }
                IndexClass::Closure => {
                    let slot = scope.next_closure;
                    scope.next_closure += 1;
                    slot
                }
                IndexClass::Argument => {
                    let slot = scope.next_argument;
                    scope.next_argument += 1;
                    slot
                }
                IndexClass::Block => {
                    let slot = scope.next_block;
                    scope.next_block += 1;
                    slot
                }
            };
            scope.variables.insert(
                unique_id,
                Variable {
                    unique_id,
                    atom,
                    kind,
                    index: VarIndex::new(class, counter),
                    state: VariableState::Created,
                },
            );
        }
        &self.get(scope_id).variables[&unique_id]
    }

    /// Records a name use to resolve at scope close.
    pub fn add_reference(&mut self, scope_id: ScopeId, unique_id: u32, node: NodeId) {
        self.get_mut(scope_id).references.entry(unique_id).or_default().push(node);
    }

    /// Drops a recorded reference; used when the parser re-reads a name as
    /// an arrow-function parameter instead of a variable use.
    pub fn remove_reference(&mut self, scope_id: ScopeId, unique_id: u32, node: NodeId) {
        if let Some(nodes) = self.get_mut(scope_id).references.get_mut(&unique_id) {
            nodes.retain(|&n| n != node);
            if nodes.is_empty() {
                self.get_mut(scope_id).references.remove(&unique_id);
            }
        }
    }

    pub fn add_label(&mut self, scope_id: ScopeId, atom: AtomId, unique_id: u32) {
        self.get_mut(scope_id).labels.insert(unique_id, atom);
    }

    /// Looks a label up through the scope chain.
    pub fn find_label(&self, from: ScopeId, unique_id: u32) -> bool {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.get(id);
            if scope.labels.contains_key(&unique_id) {
                return true;
            }
            // Labels do not cross function boundaries.
            if scope.ty == ScopeType::Function {
                return false;
            }
            current = scope.parent;
        }
        false
    }

    /// Resolves a scope's pending references against its own declarations
    /// and escalates the rest to the parent. Called as each scope closes.
    pub fn close(&mut self, scope_id: ScopeId, ast: &mut AstArena) {
        let pending = std::mem::take(&mut self.get_mut(scope_id).references);
        let parent = self.get(scope_id).parent;
        for (unique_id, nodes) in pending {
            let resolved = self.get(scope_id).variables.get(&unique_id).map(|v| v.index);
            match resolved {
                Some(index) => {
                    if let Some(variable) = self.get_mut(scope_id).variables.get_mut(&unique_id) {
                        variable.state = VariableState::Referenced;
                    }
                    patch_nodes(ast, &nodes, index);
                }
                None => match parent {
                    Some(parent_id) => {
                        self.get_mut(parent_id).references.entry(unique_id).or_default().extend(nodes);
                    }
                    None => {
                        // Global late binding: materialize a global slot now
                        // so every later reference shares it.
                        let atom = nodes
                            .first()
                            .and_then(|&node| match &ast.get(node).payload {
                                NodePayload::VarRef(var_ref) => Some(var_ref.atom),
                                _ => None,
                            })
                            .expect("reference nodes carry their atom");
                        let index = self.declare(scope_id, atom, unique_id, VariableKind::Var).index;
                        if let Some(variable) = self.get_mut(scope_id).variables.get_mut(&unique_id) {
                            variable.state = VariableState::Referenced;
                        }
                        patch_nodes(ast, &nodes, index);
                    }
                },
            }
        }
    }

    /// Imports another global scope's variables, for accumulative
    /// re-parsing: slots keep their indices so previously generated code
    /// stays valid.
    pub fn import_globals(&mut self, global: ScopeId, variables: &BTreeMap<u32, Variable>, next_local: u32) {
        let scope = self.get_mut(global);
        scope
            .variables
            .extend(variables.values().map(|v| (v.unique_id, v.clone())));
        scope.next_local = scope.next_local.max(next_local);
    }

    pub fn next_local(&self, id: ScopeId) -> u32 {
        self.get(id).next_local
    }
}

fn patch_nodes(ast: &mut AstArena, nodes: &[NodeId], index: VarIndex) {
    for &node in nodes {
        if let NodePayload::VarRef(var_ref) = &mut ast.get_mut(node).payload {
            var_ref.index = Some(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        ast::{AstArena, AstNode, NodePayload, VarRef},
        intern::{Interner, djb_hash},
        lexer::TokenType,
    };

    fn reference_node(ast: &mut AstArena, scope: ScopeId, atom: AtomId, unique_id: u32) -> NodeId {
        ast.add(AstNode {
            token: TokenType::Name,
            line: 1,
            left: None,
            right: None,
            scope,
            hoist: false,
            payload: NodePayload::VarRef(VarRef {
                atom,
                unique_id,
                index: None,
            }),
            name: None,
        })
    }

    #[test]
    fn index_tag_bits_round_trip() {
        let index = VarIndex::new(IndexClass::Closure, 9);
        assert_eq!(index.class(), IndexClass::Closure);
        assert_eq!(index.slot(), 9);
        let global = VarIndex::new(IndexClass::Global, 0);
        assert_eq!(global.class(), IndexClass::Global);
    }

    #[test]
    fn redeclaration_is_benign_and_keeps_the_slot() {
        let mut interner = Interner::new();
        let mut tree = ScopeTree::new();
        let global = tree.push(ScopeType::Global, None);
        let atom = interner.intern("x");
        let uid = djb_hash(b"x");

        let first = tree.declare(global, atom, uid, VariableKind::Var).index;
        let second = tree.declare(global, atom, uid, VariableKind::Var).index;
        assert_eq!(first, second);
        assert_eq!(tree.get(global).variables.len(), 1);
    }

    #[test]
    fn references_escalate_to_declaring_scope() {
        let mut interner = Interner::new();
        let mut tree = ScopeTree::new();
        let mut ast = AstArena::new();

        let global = tree.push(ScopeType::Global, None);
        let function = tree.push(ScopeType::Function, Some(global));
        let block = tree.push(ScopeType::Block, Some(function));

        let atom = interner.intern("outer");
        let uid = djb_hash(b"outer");
        let declared = tree.declare(function, atom, uid, VariableKind::Var).index;

        let node = reference_node(&mut ast, block, atom, uid);
        tree.add_reference(block, uid, node);

        tree.close(block, &mut ast);
        tree.close(function, &mut ast);

        let NodePayload::VarRef(var_ref) = &ast.get(node).payload else {
            panic!("expected a reference payload");
        };
        assert_eq!(var_ref.index, Some(declared));
        assert_eq!(declared.class(), IndexClass::Local);
    }

    #[test]
    fn unresolved_reference_becomes_global_late_binding() {
        let mut interner = Interner::new();
        let mut tree = ScopeTree::new();
        let mut ast = AstArena::new();

        let global = tree.push(ScopeType::Global, None);
        let function = tree.push(ScopeType::Function, Some(global));

        let atom = interner.intern("late");
        let uid = djb_hash(b"late");
        let node = reference_node(&mut ast, function, atom, uid);
        tree.add_reference(function, uid, node);

        tree.close(function, &mut ast);
        tree.close(global, &mut ast);

        let NodePayload::VarRef(var_ref) = &ast.get(node).payload else {
            panic!("expected a reference payload");
        };
        let index = var_ref.index.expect("late binding materialized a slot");
        assert_eq!(index.class(), IndexClass::Global);
        assert!(tree.get(global).variables.contains_key(&uid));
    }

    #[test]
    fn function_scopes_deepen_nesting_and_blocks_inherit() {
        let mut tree = ScopeTree::new();
        let global = tree.push(ScopeType::Global, None);
        let f1 = tree.push(ScopeType::Function, Some(global));
        let block = tree.push(ScopeType::Block, Some(f1));
        let f2 = tree.push(ScopeType::Function, Some(block));
        assert_eq!(tree.get(global).nesting, 0);
        assert_eq!(tree.get(f1).nesting, 1);
        assert_eq!(tree.get(block).nesting, 1);
        assert_eq!(tree.get(f2).nesting, 2);
    }

    #[test]
    fn labels_stop_at_function_boundaries() {
        let mut interner = Interner::new();
        let mut tree = ScopeTree::new();
        let global = tree.push(ScopeType::Global, None);
        let block = tree.push(ScopeType::Block, Some(global));
        let function = tree.push(ScopeType::Function, Some(block));

        let atom = interner.intern("loop");
        let uid = djb_hash(b"loop");
        tree.add_label(global, atom, uid);
        assert!(tree.find_label(block, uid));
        assert!(!tree.find_label(function, uid));
    }
}
