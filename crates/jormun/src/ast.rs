//! AST node arena.
//!
//! Nodes are binary: a token type (shared with the lexer's enum), a source
//! line, left/right child links, a scope back-pointer, a hoist flag, and a
//! small polymorphic payload. The parser allocates nodes into an arena and
//! links them by id, which lets the scope-resolution pass patch variable
//! references in place once their declarations are known.

use crate::{
    intern::AtomId,
    lexer::TokenType,
    scope::{ScopeId, VarIndex},
    value::Value,
};

/// Index of a node in the AST arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a lambda descriptor in the arena's lambda table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LambdaId(u32);

impl LambdaId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A variable reference recorded on a name node.
///
/// Created unresolved; the scope close pass either patches `index` with the
/// declaring variable's slot or leaves it for global late binding at code
/// generation.
#[derive(Debug, Clone, Copy)]
pub struct VarRef {
    pub atom: AtomId,
    /// DJB unique id of the spelling; the scope-tree key.
    pub unique_id: u32,
    /// Resolved slot, patched at scope close.
    pub index: Option<VarIndex>,
}

/// Descriptor of a function body produced by the parser.
///
/// The external code generator lowers the body into bytecode and replaces
/// `code` handles; the core records the shape and the closure scope link.
#[derive(Debug, Clone)]
pub struct AstLambda {
    /// Declared parameter count (rest parameter excluded).
    pub nargs: u32,
    /// Whether the last parameter is a rest parameter.
    pub rest: bool,
    /// The function's own scope.
    pub scope: ScopeId,
    /// Name for function declarations/named expressions.
    pub name: Option<AtomId>,
    /// Body statement chain.
    pub body: Option<NodeId>,
}

/// Node payload union.
#[derive(Debug, Clone)]
pub enum NodePayload {
    None,
    /// A literal constant value.
    Value(Value),
    /// A variable reference, resolved at scope close.
    VarRef(VarRef),
    /// A function descriptor.
    Lambda(LambdaId),
}

/// One AST node.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub token: TokenType,
    pub line: u32,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub scope: ScopeId,
    /// Set for function declarations and imports so the statement chainer
    /// splices them to the front of their scope's chain.
    pub hoist: bool,
    pub payload: NodePayload,
    /// Label and function-expression names.
    pub name: Option<AtomId>,
}

/// Arena holding every node and lambda of one parse.
#[derive(Debug, Default)]
pub struct AstArena {
    nodes: Vec<AstNode>,
    lambdas: Vec<AstLambda>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: AstNode) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("AST arena exceeds u32 range"));
        self.nodes.push(node);
        id
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut AstNode {
        &mut self.nodes[id.index()]
    }

    pub fn add_lambda(&mut self, lambda: AstLambda) -> LambdaId {
        let id = LambdaId(u32::try_from(self.lambdas.len()).expect("lambda table exceeds u32 range"));
        self.lambdas.push(lambda);
        id
    }

    pub fn lambda(&self, id: LambdaId) -> &AstLambda {
        &self.lambdas[id.index()]
    }

    pub fn lambda_mut(&mut self, id: LambdaId) -> &mut AstLambda {
        &mut self.lambdas[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates node ids in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }
}
