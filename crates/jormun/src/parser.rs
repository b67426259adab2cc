//! Recursive-descent parser.
//!
//! One pass over the token stream builds the AST and populates the scope
//! tree. Statements are linked into a chain per scope; nodes flagged for
//! hoisting (function declarations, imports) are spliced to the front of
//! their chain regardless of textual position. Name uses are recorded as
//! unresolved references in the current scope and resolved — or escalated —
//! as each scope closes.
//!
//! Errors never partially commit: the first syntax error aborts the parse
//! and the caller discards the arena.

use crate::{
    ast::{AstArena, AstLambda, AstNode, LambdaId, NodeId, NodePayload, VarRef},
    error::{JsError, JsResult},
    heap::{Heap, HeapData},
    intern::AtomId,
    lexer::{Lexer, Token, TokenType},
    object::{JsObject, JsRegExp, ObjectPayload},
    scope::{MAX_FUNCTION_NESTING, ScopeId, ScopeTree, ScopeType, VariableKind},
    tracer::ParseTracer,
    value::Value,
};

/// Everything one parse produces: the node arena, the scope tree, and the
/// root statement chain.
#[derive(Debug)]
pub struct ParseResult {
    pub ast: AstArena,
    pub scopes: ScopeTree,
    pub global: ScopeId,
    pub root: Option<NodeId>,
}

/// The parser. Generic over the tracer so production parses carry no
/// tracing overhead.
pub(crate) struct Parser<'s, 'i, 'h, T: ParseTracer> {
    lexer: Lexer<'s, 'i>,
    heap: &'h mut Heap,
    ast: AstArena,
    scopes: ScopeTree,
    scope: ScopeId,
    tracer: T,
    /// Suppresses the `in` operator while a `for` head is being parsed.
    no_in: bool,
    /// Set once `export default` has been seen; a second one is an error.
    has_default_export: bool,
    /// Stop cleanly at an unmatched `}` instead of failing; used when the
    /// script is embedded in a larger configuration file.
    trailer: bool,
}

impl<'s, 'i, 'h, T: ParseTracer> Parser<'s, 'i, 'h, T> {
    pub fn new(
        src: &'s str,
        file_name: &'s str,
        start_line: u32,
        heap: &'h mut Heap,
        interner: &'i mut crate::intern::Interner,
        module: bool,
        tracer: T,
    ) -> Self {
        let mut scopes = ScopeTree::new();
        let global = scopes.push(ScopeType::Global, None);
        scopes.get_mut(global).is_module = module;
        Self {
            lexer: Lexer::new(src, file_name, start_line, interner),
            heap,
            ast: AstArena::new(),
            scopes,
            scope: global,
            tracer,
            no_in: false,
            has_default_export: false,
            trailer: false,
        }
    }

    pub fn set_trailer(&mut self, trailer: bool) {
        self.trailer = trailer;
    }

    /// Imports a previous parse's global variables so re-parsed source sees
    /// earlier bindings at their original slots (accumulative evaluation).
    pub fn import_globals(&mut self, previous: &ParseResult) {
        let prev_global = previous.scopes.get(previous.global);
        let next_local = previous.scopes.next_local(previous.global);
        self.scopes.import_globals(self.scope, &prev_global.variables, next_local);
    }

    /// Parses the whole source into a statement chain.
    pub fn parse(mut self) -> JsResult<ParseResult> {
        let mut top = None;
        loop {
            let next = self.lexer.peek_type()?;
            if next == TokenType::End || (self.trailer && next == TokenType::CloseBrace) {
                break;
            }
            if let Err(error) = self.statement_chain(&mut top) {
                self.tracer.on_error(&error.to_string());
                return Err(error);
            }
        }
        let global = self.scope;
        self.scopes.close(global, &mut self.ast);
        Ok(ParseResult {
            ast: self.ast,
            scopes: self.scopes,
            global,
            root: top,
        })
    }

    // ----- node and scope helpers -------------------------------------

    fn node(&mut self, token: TokenType, line: u32) -> NodeId {
        self.ast.add(AstNode {
            token,
            line,
            left: None,
            right: None,
            scope: self.scope,
            hoist: false,
            payload: NodePayload::None,
            name: None,
        })
    }

    fn binary(&mut self, token: TokenType, line: u32, left: NodeId, right: NodeId) -> NodeId {
        let node = self.node(token, line);
        self.ast.get_mut(node).left = Some(left);
        self.ast.get_mut(node).right = Some(right);
        node
    }

    fn syntax_error(&self, message: impl Into<String>) -> JsError {
        JsError::syntax(message, self.lexer.file_name(), self.lexer.line())
    }

    fn scope_begin(&mut self, ty: ScopeType) -> JsResult<ScopeId> {
        let id = self.scopes.push(ty, Some(self.scope));
        let nesting = self.scopes.get(id).nesting;
        if ty == ScopeType::Function && nesting > MAX_FUNCTION_NESTING {
            return Err(self.syntax_error(format!(
                "The maximum function nesting level is {MAX_FUNCTION_NESTING}"
            )));
        }
        self.tracer.on_scope_begin(ty.into(), nesting);
        self.scope = id;
        Ok(id)
    }

    fn scope_end(&mut self) {
        let ty = self.scopes.get(self.scope).ty;
        self.tracer.on_scope_end(ty.into());
        self.scopes.close(self.scope, &mut self.ast);
        self.scope = self.scopes.get(self.scope).parent.expect("non-global scope has a parent");
    }

    fn next_token(&mut self) -> JsResult<Token> {
        let token = self.lexer.next()?;
        self.tracer.on_token(token.ty.display_name(), token.line);
        Ok(token)
    }

    fn expect(&mut self, expected: TokenType) -> JsResult<Token> {
        let token = self.next_token()?;
        if token.ty == expected {
            Ok(token)
        } else {
            Err(self.lexer.unexpected(&token))
        }
    }

    fn unique_id(&mut self, atom: AtomId) -> u32 {
        self.lexer.interner().unique_id(atom)
    }

    /// Creates a name-reference node and records it for resolution.
    fn reference(&mut self, atom: AtomId, line: u32) -> NodeId {
        let unique_id = self.unique_id(atom);
        let node = self.ast.add(AstNode {
            token: TokenType::Name,
            line,
            left: None,
            right: None,
            scope: self.scope,
            hoist: false,
            payload: NodePayload::VarRef(VarRef {
                atom,
                unique_id,
                index: None,
            }),
            name: Some(atom),
        });
        self.scopes.add_reference(self.scope, unique_id, node);
        node
    }

    // ----- statements -------------------------------------------------

    /// Parses one statement and links it into `top`. Hoisted nodes are
    /// spliced to the front of the chain instead of appended.
    fn statement_chain(&mut self, top: &mut Option<NodeId>) -> JsResult<()> {
        let Some(statement) = self.statement()? else {
            return Ok(());
        };
        let line = self.ast.get(statement).line;
        let hoist = self.ast.get(statement).hoist;
        let link = self.node(TokenType::Statement, line);
        self.ast.get_mut(link).right = Some(statement);

        match top {
            None => *top = Some(link),
            Some(head) => {
                if hoist {
                    // Splice below the bottom-most link so hoisted nodes
                    // execute before everything that was written above them.
                    let mut bottom = *head;
                    while let Some(left) = self.ast.get(bottom).left {
                        bottom = left;
                    }
                    self.ast.get_mut(bottom).left = Some(link);
                } else {
                    self.ast.get_mut(link).left = Some(*head);
                    *top = Some(link);
                }
            }
        }
        Ok(())
    }

    /// Statement dispatch; returns `None` for the empty statement.
    fn statement(&mut self) -> JsResult<Option<NodeId>> {
        match self.lexer.peek_type()? {
            TokenType::Semicolon => {
                self.next_token()?;
                Ok(None)
            }
            TokenType::OpenBrace => self.block_statement().map(Some),
            TokenType::Function => self.function_declaration().map(Some),
            TokenType::Var => {
                let node = self.var_statement()?;
                self.consume_semicolon()?;
                Ok(Some(node))
            }
            TokenType::If => self.if_statement().map(Some),
            TokenType::Switch => self.switch_statement().map(Some),
            TokenType::While => self.while_statement().map(Some),
            TokenType::Do => self.do_statement().map(Some),
            TokenType::For => self.for_statement().map(Some),
            TokenType::Try => self.try_statement().map(Some),
            TokenType::Return => self.return_statement().map(Some),
            TokenType::Throw => self.throw_statement().map(Some),
            TokenType::Break | TokenType::Continue => self.break_continue_statement().map(Some),
            TokenType::Import => self.import_statement().map(Some),
            TokenType::Export => self.export_statement().map(Some),
            _ => self.expression_or_label_statement().map(Some),
        }
    }

    fn block_statement(&mut self) -> JsResult<NodeId> {
        let open = self.expect(TokenType::OpenBrace)?;
        self.scope_begin(ScopeType::Block)?;
        let mut chain = None;
        while self.lexer.peek_type()? != TokenType::CloseBrace {
            if self.lexer.peek_type()? == TokenType::End {
                let token = self.next_token()?;
                return Err(self.lexer.unexpected(&token));
            }
            self.statement_chain(&mut chain)?;
        }
        self.next_token()?;
        self.scope_end();
        let node = self.node(TokenType::Block, open.line);
        self.ast.get_mut(node).left = chain;
        Ok(node)
    }

    /// Consumes `;`, or applies automatic semicolon insertion: a newline
    /// before the next token, `}`, or end of input closes the statement.
    fn consume_semicolon(&mut self) -> JsResult<()> {
        let token = self.lexer.peek()?;
        match token.ty {
            TokenType::Semicolon => {
                self.next_token()?;
                Ok(())
            }
            TokenType::End | TokenType::CloseBrace => Ok(()),
            _ if token.newline_before => Ok(()),
            _ => {
                let token = self.next_token()?;
                Err(self.lexer.unexpected(&token))
            }
        }
    }

    fn expression_or_label_statement(&mut self) -> JsResult<NodeId> {
        // A name directly followed by `:` is a label.
        if self.lexer.peek_type()? == TokenType::Name {
            let name_token = self.next_token()?;
            if self.lexer.peek_type()? == TokenType::Colon {
                self.next_token()?;
                return self.labelled_statement(&name_token);
            }
            // Not a label: materialize the reference and continue the
            // expression grammar from it.
            let atom = name_token.atom.expect("name token carries an atom");
            let first = self.reference(atom, name_token.line);
            let first = self.arrow_from_name(first, name_token.line)?;
            let expr = self.continue_expression(first)?;
            self.consume_semicolon()?;
            return Ok(expr);
        }
        let expr = self.expression()?;
        self.consume_semicolon()?;
        Ok(expr)
    }

    fn labelled_statement(&mut self, name_token: &Token) -> JsResult<NodeId> {
        let atom = name_token.atom.expect("name token carries an atom");
        let unique_id = self.unique_id(atom);
        self.scopes.add_label(self.scope, atom, unique_id);
        let body = self.statement()?;
        let node = self.node(TokenType::Label, name_token.line);
        self.ast.get_mut(node).name = Some(atom);
        self.ast.get_mut(node).left = body;
        Ok(node)
    }

    fn var_statement(&mut self) -> JsResult<NodeId> {
        let var_token = self.expect(TokenType::Var)?;
        let mut chain: Option<NodeId> = None;
        loop {
            let name = self.expect(TokenType::Name)?;
            let atom = name.atom.expect("name token carries an atom");
            let declaration = self.var_declaration(atom, name.line)?;

            let init = if self.lexer.peek_type()? == TokenType::Assignment {
                self.next_token()?;
                Some(self.assignment_expression()?)
            } else {
                None
            };
            self.ast.get_mut(declaration).right = init;

            chain = Some(match chain {
                None => declaration,
                Some(prev) => self.binary(TokenType::Comma, var_token.line, prev, declaration),
            });
            if self.lexer.peek_type()? != TokenType::Comma {
                break;
            }
            self.next_token()?;
        }
        Ok(chain.expect("var statement has at least one declarator"))
    }

    /// Declares a `var` in the enclosing function or global scope and
    /// returns a `VarDeclaration` node whose reference resolves to it.
    fn var_declaration(&mut self, atom: AtomId, line: u32) -> JsResult<NodeId> {
        let unique_id = self.unique_id(atom);
        let owner = self.scopes.variable_owner(self.scope);
        self.scopes.declare(owner, atom, unique_id, VariableKind::Var);

        let reference = self.reference(atom, line);
        let node = self.node(TokenType::VarDeclaration, line);
        self.ast.get_mut(node).left = Some(reference);
        self.ast.get_mut(node).name = Some(atom);
        Ok(node)
    }

    fn if_statement(&mut self) -> JsResult<NodeId> {
        let if_token = self.expect(TokenType::If)?;
        self.expect(TokenType::OpenParenthesis)?;
        let condition = self.expression()?;
        self.expect(TokenType::CloseParenthesis)?;
        let then_branch = self.statement()?.unwrap_or_else(|| self.node(TokenType::Empty, if_token.line));

        let branches = if self.lexer.peek_type()? == TokenType::Else {
            let else_token = self.next_token()?;
            let else_branch = self
                .statement()?
                .unwrap_or_else(|| self.node(TokenType::Empty, else_token.line));
            self.binary(TokenType::Else, else_token.line, then_branch, else_branch)
        } else {
            then_branch
        };
        Ok(self.binary(TokenType::If, if_token.line, condition, branches))
    }

    fn switch_statement(&mut self) -> JsResult<NodeId> {
        let switch_token = self.expect(TokenType::Switch)?;
        self.expect(TokenType::OpenParenthesis)?;
        let discriminant = self.expression()?;
        self.expect(TokenType::CloseParenthesis)?;
        self.expect(TokenType::OpenBrace)?;

        let mut cases: Option<NodeId> = None;
        let mut seen_default = false;
        while self.lexer.peek_type()? != TokenType::CloseBrace {
            let token = self.next_token()?;
            let test = match token.ty {
                TokenType::Case => {
                    let test = self.expression()?;
                    Some(test)
                }
                TokenType::Default => {
                    if seen_default {
                        return Err(self.syntax_error("More than one default clause in switch statement"));
                    }
                    seen_default = true;
                    None
                }
                _ => return Err(self.lexer.unexpected(&token)),
            };
            self.expect(TokenType::Colon)?;

            let mut body = None;
            while !matches!(
                self.lexer.peek_type()?,
                TokenType::Case | TokenType::Default | TokenType::CloseBrace
            ) {
                self.statement_chain(&mut body)?;
            }
            let case = self.node(TokenType::Case, token.line);
            self.ast.get_mut(case).right = body;
            self.ast.get_mut(case).left = test;
            cases = Some(match cases {
                None => case,
                Some(prev) => self.binary(TokenType::Comma, token.line, prev, case),
            });
        }
        self.next_token()?;
        let node = self.node(TokenType::Switch, switch_token.line);
        self.ast.get_mut(node).left = Some(discriminant);
        self.ast.get_mut(node).right = cases;
        Ok(node)
    }

    fn while_statement(&mut self) -> JsResult<NodeId> {
        let while_token = self.expect(TokenType::While)?;
        self.expect(TokenType::OpenParenthesis)?;
        let condition = self.expression()?;
        self.expect(TokenType::CloseParenthesis)?;
        let body = self
            .statement()?
            .unwrap_or_else(|| self.node(TokenType::Empty, while_token.line));
        Ok(self.binary(TokenType::While, while_token.line, condition, body))
    }

    fn do_statement(&mut self) -> JsResult<NodeId> {
        let do_token = self.expect(TokenType::Do)?;
        let body = self
            .statement()?
            .unwrap_or_else(|| self.node(TokenType::Empty, do_token.line));
        self.expect(TokenType::While)?;
        self.expect(TokenType::OpenParenthesis)?;
        let condition = self.expression()?;
        self.expect(TokenType::CloseParenthesis)?;
        if self.lexer.peek_type()? == TokenType::Semicolon {
            self.next_token()?;
        }
        Ok(self.binary(TokenType::Do, do_token.line, body, condition))
    }

    fn for_statement(&mut self) -> JsResult<NodeId> {
        let for_token = self.expect(TokenType::For)?;
        self.expect(TokenType::OpenParenthesis)?;

        // `for (var name in …)` and `for (name in …)` branch into for-in.
        let init = match self.lexer.peek_type()? {
            TokenType::Semicolon => None,
            TokenType::Var => {
                let var_token_line = self.lexer.peek()?.line;
                self.next_token()?;
                let name = self.expect(TokenType::Name)?;
                let atom = name.atom.expect("name token carries an atom");
                let declaration = self.var_declaration(atom, name.line)?;
                if self.lexer.peek_type()? == TokenType::In {
                    return self.for_in_tail(for_token.line, declaration);
                }
                // Regular declaration list; re-join the var grammar.
                let init = if self.lexer.peek_type()? == TokenType::Assignment {
                    self.next_token()?;
                    self.no_in = true;
                    let expr = self.assignment_expression();
                    self.no_in = false;
                    Some(expr?)
                } else {
                    None
                };
                self.ast.get_mut(declaration).right = init;
                let mut chain = declaration;
                while self.lexer.peek_type()? == TokenType::Comma {
                    self.next_token()?;
                    let name = self.expect(TokenType::Name)?;
                    let atom = name.atom.expect("name token carries an atom");
                    let next = self.var_declaration(atom, name.line)?;
                    if self.lexer.peek_type()? == TokenType::Assignment {
                        self.next_token()?;
                        self.no_in = true;
                        let expr = self.assignment_expression();
                        self.no_in = false;
                        self.ast.get_mut(next).right = Some(expr?);
                    }
                    chain = self.binary(TokenType::Comma, var_token_line, chain, next);
                }
                Some(chain)
            }
            _ => {
                self.no_in = true;
                let expr = self.expression();
                self.no_in = false;
                let expr = expr?;
                if self.lexer.peek_type()? == TokenType::In {
                    if !matches!(self.ast.get(expr).payload, NodePayload::VarRef(_)) {
                        return Err(self.syntax_error("Invalid left-hand side in for-in"));
                    }
                    return self.for_in_tail(for_token.line, expr);
                }
                Some(expr)
            }
        };

        self.expect(TokenType::Semicolon)?;
        let condition = if self.lexer.peek_type()? == TokenType::Semicolon {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenType::Semicolon)?;
        let update = if self.lexer.peek_type()? == TokenType::CloseParenthesis {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenType::CloseParenthesis)?;
        let body = self
            .statement()?
            .unwrap_or_else(|| self.node(TokenType::Empty, for_token.line));

        // for(left = init, right = (cond ; (update ; body))).
        let update_body = self.node(TokenType::Semicolon, for_token.line);
        self.ast.get_mut(update_body).left = update;
        self.ast.get_mut(update_body).right = Some(body);
        let cond_chain = self.node(TokenType::Semicolon, for_token.line);
        self.ast.get_mut(cond_chain).left = condition;
        self.ast.get_mut(cond_chain).right = Some(update_body);
        let node = self.node(TokenType::For, for_token.line);
        self.ast.get_mut(node).left = init;
        self.ast.get_mut(node).right = Some(cond_chain);
        Ok(node)
    }

    /// Finishes `for (… in object) body` once the left side is parsed.
    fn for_in_tail(&mut self, line: u32, left: NodeId) -> JsResult<NodeId> {
        self.expect(TokenType::In)?;
        let object = self.expression()?;
        self.expect(TokenType::CloseParenthesis)?;
        let body = self.statement()?.unwrap_or_else(|| self.node(TokenType::Empty, line));
        let iteration = self.binary(TokenType::In, line, object, body);
        Ok(self.binary(TokenType::ForIn, line, left, iteration))
    }

    fn try_statement(&mut self) -> JsResult<NodeId> {
        let try_token = self.expect(TokenType::Try)?;
        let block = self.block_statement()?;

        let mut catch_clause = None;
        if self.lexer.peek_type()? == TokenType::Catch {
            let catch_token = self.next_token()?;
            self.expect(TokenType::OpenParenthesis)?;
            let name = self.expect(TokenType::Name)?;
            let atom = name.atom.expect("name token carries an atom");
            self.expect(TokenType::CloseParenthesis)?;

            // The catch binding lives in a block scope around the handler.
            self.scope_begin(ScopeType::Block)?;
            let unique_id = self.unique_id(atom);
            self.scopes.declare(self.scope, atom, unique_id, VariableKind::Catch);
            let binding = self.reference(atom, name.line);
            let body = self.catch_block()?;
            self.scope_end();

            let clause = self.binary(TokenType::Catch, catch_token.line, binding, body);
            catch_clause = Some(clause);
        }

        let finally_clause = if self.lexer.peek_type()? == TokenType::Finally {
            let finally_token = self.next_token()?;
            let body = self.block_statement()?;
            Some((finally_token.line, body))
        } else {
            None
        };

        if catch_clause.is_none() && finally_clause.is_none() {
            return Err(self.syntax_error("Missing catch or finally after try"));
        }

        let right = match (catch_clause, finally_clause) {
            (Some(catch_node), Some((line, finally_body))) => {
                Some(self.binary(TokenType::Finally, line, catch_node, finally_body))
            }
            (Some(catch_node), None) => Some(catch_node),
            (None, Some((line, finally_body))) => {
                let node = self.node(TokenType::Finally, line);
                self.ast.get_mut(node).right = Some(finally_body);
                Some(node)
            }
            (None, None) => unreachable!("checked above"),
        };
        let node = self.node(TokenType::Try, try_token.line);
        self.ast.get_mut(node).left = Some(block);
        self.ast.get_mut(node).right = right;
        Ok(node)
    }

    /// A catch handler's braces parsed inside the already-open binding
    /// scope (the binding must be visible to the handler body only).
    fn catch_block(&mut self) -> JsResult<NodeId> {
        let open = self.expect(TokenType::OpenBrace)?;
        let mut chain = None;
        while self.lexer.peek_type()? != TokenType::CloseBrace {
            if self.lexer.peek_type()? == TokenType::End {
                let token = self.next_token()?;
                return Err(self.lexer.unexpected(&token));
            }
            self.statement_chain(&mut chain)?;
        }
        self.next_token()?;
        let node = self.node(TokenType::Block, open.line);
        self.ast.get_mut(node).left = chain;
        Ok(node)
    }

    fn return_statement(&mut self) -> JsResult<NodeId> {
        let return_token = self.expect(TokenType::Return)?;
        if self.scopes.get(self.scopes.variable_owner(self.scope)).ty != ScopeType::Function {
            return Err(self.syntax_error("Illegal return statement"));
        }
        let value = {
            let next = self.lexer.peek()?;
            if matches!(next.ty, TokenType::Semicolon | TokenType::CloseBrace | TokenType::End) || next.newline_before
            {
                None
            } else {
                Some(self.expression()?)
            }
        };
        self.consume_semicolon()?;
        let node = self.node(TokenType::Return, return_token.line);
        self.ast.get_mut(node).left = value;
        Ok(node)
    }

    fn throw_statement(&mut self) -> JsResult<NodeId> {
        let throw_token = self.expect(TokenType::Throw)?;
        if self.lexer.peek()?.newline_before {
            return Err(self.syntax_error("Illegal newline after throw"));
        }
        let value = self.expression()?;
        self.consume_semicolon()?;
        let node = self.node(TokenType::Throw, throw_token.line);
        self.ast.get_mut(node).left = Some(value);
        Ok(node)
    }

    fn break_continue_statement(&mut self) -> JsResult<NodeId> {
        let token = self.next_token()?;
        let node = self.node(token.ty, token.line);
        let next = self.lexer.peek()?;
        if next.ty == TokenType::Name && !next.newline_before {
            let label = self.next_token()?;
            let atom = label.atom.expect("name token carries an atom");
            let unique_id = self.unique_id(atom);
            if !self.scopes.find_label(self.scope, unique_id) {
                return Err(JsError::syntax(
                    format!("Undefined label \"{}\"", label.text(self.lexer.src())),
                    self.lexer.file_name(),
                    label.line,
                ));
            }
            self.ast.get_mut(node).name = Some(atom);
        }
        self.consume_semicolon()?;
        Ok(node)
    }

    fn import_statement(&mut self) -> JsResult<NodeId> {
        let import_token = self.expect(TokenType::Import)?;
        if !self.scopes.get(self.scope).is_module || self.scopes.get(self.scope).ty != ScopeType::Global {
            return Err(self.syntax_error("Illegal import statement"));
        }
        let name = self.expect(TokenType::Name)?;
        let atom = name.atom.expect("name token carries an atom");
        let declaration = self.var_declaration(atom, name.line)?;

        let from = self.expect(TokenType::Name)?;
        if from.atom != Some(crate::intern::WellKnownAtom::From.atom()) {
            return Err(self.lexer.unexpected(&from));
        }
        let module_token = self.expect(TokenType::StringLiteral)?;
        let module_name = module_token.string.as_deref().unwrap_or_default();
        let module_value = Value::from_text(self.heap, module_name)?;
        let module_node = self.node(TokenType::StringLiteral, module_token.line);
        self.ast.get_mut(module_node).payload = NodePayload::Value(module_value);

        self.consume_semicolon()?;
        let node = self.binary(TokenType::Import, import_token.line, declaration, module_node);
        self.ast.get_mut(node).name = Some(atom);
        self.ast.get_mut(node).hoist = true;
        Ok(node)
    }

    fn export_statement(&mut self) -> JsResult<NodeId> {
        let export_token = self.expect(TokenType::Export)?;
        if !self.scopes.get(self.scope).is_module || self.scopes.get(self.scope).ty != ScopeType::Global {
            return Err(self.syntax_error("Illegal export statement"));
        }
        self.expect(TokenType::Default)?;
        if self.has_default_export {
            return Err(self.syntax_error("Duplicate default export"));
        }
        self.has_default_export = true;
        let value = self.expression()?;
        self.consume_semicolon()?;
        let node = self.node(TokenType::ExportDefault, export_token.line);
        self.ast.get_mut(node).left = Some(value);
        Ok(node)
    }

    // ----- functions --------------------------------------------------

    fn function_declaration(&mut self) -> JsResult<NodeId> {
        let function_token = self.expect(TokenType::Function)?;
        let name = self.expect(TokenType::Name)?;
        let atom = name.atom.expect("name token carries an atom");
        let unique_id = self.unique_id(atom);
        let owner = self.scopes.variable_owner(self.scope);
        self.scopes.declare(owner, atom, unique_id, VariableKind::Function);

        let lambda = self.function_rest(Some(atom))?;
        let node = self.node(TokenType::FunctionDeclaration, function_token.line);
        self.ast.get_mut(node).payload = NodePayload::Lambda(lambda);
        self.ast.get_mut(node).name = Some(atom);
        self.ast.get_mut(node).hoist = true;
        Ok(node)
    }

    fn function_expression(&mut self) -> JsResult<NodeId> {
        let function_token = self.expect(TokenType::Function)?;
        let name = if self.lexer.peek_type()? == TokenType::Name {
            let token = self.next_token()?;
            Some(token.atom.expect("name token carries an atom"))
        } else {
            None
        };

        // A named function expression sees its own name through a shim
        // scope that is invisible outside the expression.
        let lambda = if let Some(atom) = name {
            self.scope_begin(ScopeType::Shim)?;
            let unique_id = self.unique_id(atom);
            self.scopes.declare(self.scope, atom, unique_id, VariableKind::Shim);
            let lambda = self.function_rest(Some(atom))?;
            self.scope_end();
            lambda
        } else {
            self.function_rest(None)?
        };

        let node = self.node(TokenType::FunctionExpression, function_token.line);
        self.ast.get_mut(node).payload = NodePayload::Lambda(lambda);
        self.ast.get_mut(node).name = name;
        Ok(node)
    }

    /// Parses `(params) { body }` into a lambda descriptor; the function
    /// scope is begun here and closed after the body.
    fn function_rest(&mut self, name: Option<AtomId>) -> JsResult<LambdaId> {
        let scope = self.scope_begin(ScopeType::Function)?;
        self.expect(TokenType::OpenParenthesis)?;
        let (nargs, rest) = self.parameter_list()?;
        self.expect(TokenType::OpenBrace)?;
        let mut body = None;
        while self.lexer.peek_type()? != TokenType::CloseBrace {
            if self.lexer.peek_type()? == TokenType::End {
                let token = self.next_token()?;
                return Err(self.lexer.unexpected(&token));
            }
            self.statement_chain(&mut body)?;
        }
        self.next_token()?;
        self.scope_end();
        Ok(self.ast.add_lambda(AstLambda {
            nargs,
            rest,
            scope,
            name,
            body,
        }))
    }

    /// Parses a parameter list up to and including `)`. Rest parameters
    /// are accepted only in the last position; duplicates fail.
    fn parameter_list(&mut self) -> JsResult<(u32, bool)> {
        let mut nargs = 0u32;
        let mut rest = false;
        let mut seen: Vec<u32> = Vec::new();
        loop {
            match self.lexer.peek_type()? {
                TokenType::CloseParenthesis => {
                    self.next_token()?;
                    break;
                }
                TokenType::Ellipsis => {
                    self.next_token()?;
                    let name = self.expect(TokenType::Name)?;
                    let atom = name.atom.expect("name token carries an atom");
                    self.declare_parameter(atom, &mut seen, name.line)?;
                    rest = true;
                    self.expect(TokenType::CloseParenthesis)?;
                    break;
                }
                TokenType::Name => {
                    let name = self.next_token()?;
                    let atom = name.atom.expect("name token carries an atom");
                    self.declare_parameter(atom, &mut seen, name.line)?;
                    nargs += 1;
                    match self.lexer.peek_type()? {
                        TokenType::Comma => {
                            self.next_token()?;
                        }
                        TokenType::CloseParenthesis => {}
                        _ => {
                            let token = self.next_token()?;
                            return Err(self.lexer.unexpected(&token));
                        }
                    }
                }
                _ => {
                    let token = self.next_token()?;
                    return Err(self.lexer.unexpected(&token));
                }
            }
        }
        Ok((nargs, rest))
    }

    fn declare_parameter(&mut self, atom: AtomId, seen: &mut Vec<u32>, line: u32) -> JsResult<()> {
        let unique_id = self.unique_id(atom);
        if seen.contains(&unique_id) {
            return Err(JsError::syntax(
                format!("Duplicate parameter \"{}\"", self.lexer.interner().get(atom)),
                self.lexer.file_name(),
                line,
            ));
        }
        seen.push(unique_id);
        self.scopes.declare(self.scope, atom, unique_id, VariableKind::Argument);
        Ok(())
    }

    /// Builds an arrow function from an already-parsed single-name
    /// parameter, when the name is directly followed by `=>` on one line.
    fn arrow_from_name(&mut self, name_node: NodeId, line: u32) -> JsResult<NodeId> {
        let next = self.lexer.peek()?;
        if next.ty != TokenType::Arrow || next.newline_before {
            return Ok(name_node);
        }
        self.next_token()?;
        let NodePayload::VarRef(var_ref) = self.ast.get(name_node).payload.clone() else {
            return Err(self.syntax_error("Invalid arrow function parameter"));
        };
        // The name was recorded as a variable use; it is a parameter.
        self.scopes.remove_reference(self.scope, var_ref.unique_id, name_node);

        let scope = self.scope_begin(ScopeType::Function)?;
        self.scopes.get_mut(scope).is_arrow = true;
        self.scopes
            .declare(scope, var_ref.atom, var_ref.unique_id, VariableKind::Argument);
        let body = self.arrow_body()?;
        self.scope_end();
        let lambda = self.ast.add_lambda(AstLambda {
            nargs: 1,
            rest: false,
            scope,
            name: None,
            body: Some(body),
        });
        let node = self.node(TokenType::ArrowFunction, line);
        self.ast.get_mut(node).payload = NodePayload::Lambda(lambda);
        Ok(node)
    }

    /// Parses a parenthesized arrow function; the caller has already
    /// verified `=>` follows the closing paren on the same line.
    fn arrow_function(&mut self) -> JsResult<NodeId> {
        let open = self.expect(TokenType::OpenParenthesis)?;
        let scope = self.scope_begin(ScopeType::Function)?;
        self.scopes.get_mut(scope).is_arrow = true;
        let (nargs, rest) = self.parameter_list()?;
        self.expect(TokenType::Arrow)?;
        let body = self.arrow_body()?;
        self.scope_end();
        let lambda = self.ast.add_lambda(AstLambda {
            nargs,
            rest,
            scope,
            name: None,
            body: Some(body),
        });
        let node = self.node(TokenType::ArrowFunction, open.line);
        self.ast.get_mut(node).payload = NodePayload::Lambda(lambda);
        Ok(node)
    }

    /// An arrow body: a block statement chain or a single expression.
    fn arrow_body(&mut self) -> JsResult<NodeId> {
        if self.lexer.peek_type()? == TokenType::OpenBrace {
            let open = self.expect(TokenType::OpenBrace)?;
            let mut chain = None;
            while self.lexer.peek_type()? != TokenType::CloseBrace {
                if self.lexer.peek_type()? == TokenType::End {
                    let token = self.next_token()?;
                    return Err(self.lexer.unexpected(&token));
                }
                self.statement_chain(&mut chain)?;
            }
            self.next_token()?;
            let node = self.node(TokenType::Block, open.line);
            self.ast.get_mut(node).left = chain;
            Ok(node)
        } else {
            let expr = self.assignment_expression()?;
            let line = self.ast.get(expr).line;
            let node = self.node(TokenType::Return, line);
            self.ast.get_mut(node).left = Some(expr);
            Ok(node)
        }
    }

    // ----- expressions ------------------------------------------------

    fn expression(&mut self) -> JsResult<NodeId> {
        let first = self.assignment_expression()?;
        self.continue_comma(first)
    }

    fn continue_comma(&mut self, mut left: NodeId) -> JsResult<NodeId> {
        while self.lexer.peek_type()? == TokenType::Comma {
            let token = self.next_token()?;
            let right = self.assignment_expression()?;
            left = self.binary(TokenType::Comma, token.line, left, right);
        }
        Ok(left)
    }

    /// Continues the expression grammar from an already-parsed primary
    /// (used by the statement dispatcher after label lookahead).
    fn continue_expression(&mut self, primary: NodeId) -> JsResult<NodeId> {
        let left = self.continue_calls(primary)?;
        let mut left = self.continue_postfix(left)?;
        if self.lexer.peek_type()? == TokenType::Exponentiation {
            let token = self.next_token()?;
            let right = self.exponentiation_expression()?;
            left = self.binary(TokenType::Exponentiation, token.line, left, right);
        }
        let left = self.continue_binary_levels(left)?;
        let left = self.continue_conditional(left)?;
        let left = self.continue_assignment(left)?;
        self.continue_comma(left)
    }

    fn assignment_expression(&mut self) -> JsResult<NodeId> {
        // Arrow lookahead: `(` … `)` followed by `=>` on the same line.
        if self.lexer.peek_type()? == TokenType::OpenParenthesis && self.arrow_ahead()? {
            return self.arrow_function();
        }
        let left = self.conditional_expression()?;
        self.continue_assignment(left)
    }

    fn continue_assignment(&mut self, left: NodeId) -> JsResult<NodeId> {
        let ty = self.lexer.peek_type()?;
        if !ty.is_assignment_operator() {
            return Ok(left);
        }
        if !self.is_assignment_target(left) {
            return Err(self.syntax_error("Invalid left-hand side in assignment"));
        }
        let token = self.next_token()?;
        let right = self.assignment_expression()?;
        Ok(self.binary(ty, token.line, left, right))
    }

    fn is_assignment_target(&self, node: NodeId) -> bool {
        matches!(
            self.ast.get(node).token,
            TokenType::Name | TokenType::MemberDot | TokenType::MemberBracket
        )
    }

    fn conditional_expression(&mut self) -> JsResult<NodeId> {
        let condition = self.binary_expression(0)?;
        self.continue_conditional(condition)
    }

    fn continue_conditional(&mut self, condition: NodeId) -> JsResult<NodeId> {
        if self.lexer.peek_type()? != TokenType::Conditional {
            return Ok(condition);
        }
        let token = self.next_token()?;
        let consequent = self.assignment_expression()?;
        self.expect(TokenType::Colon)?;
        let alternate = self.assignment_expression()?;
        let branches = self.binary(TokenType::Colon, token.line, consequent, alternate);
        Ok(self.binary(TokenType::Conditional, token.line, condition, branches))
    }

    /// Binary operator levels, loosest first. `in` is suppressed inside a
    /// `for` head.
    fn binary_levels(&self) -> &'static [&'static [TokenType]] {
        &[
            &[TokenType::LogicalOr],
            &[TokenType::LogicalAnd],
            &[TokenType::BitwiseOr],
            &[TokenType::BitwiseXor],
            &[TokenType::BitwiseAnd],
            &[
                TokenType::Equal,
                TokenType::NotEqual,
                TokenType::StrictEqual,
                TokenType::StrictNotEqual,
            ],
            &[
                TokenType::Less,
                TokenType::Greater,
                TokenType::LessOrEqual,
                TokenType::GreaterOrEqual,
                TokenType::InstanceOf,
                TokenType::In,
            ],
            &[TokenType::LeftShift, TokenType::RightShift, TokenType::UnsignedRightShift],
            &[TokenType::Addition, TokenType::Subtraction],
            &[TokenType::Multiplication, TokenType::Division, TokenType::Remainder],
        ]
    }

    fn binary_expression(&mut self, level: usize) -> JsResult<NodeId> {
        let levels = self.binary_levels();
        if level >= levels.len() {
            return self.exponentiation_expression();
        }
        let left = self.binary_expression(level + 1)?;
        self.continue_binary_at(left, level)
    }

    fn continue_binary_at(&mut self, mut left: NodeId, level: usize) -> JsResult<NodeId> {
        let levels = self.binary_levels();
        loop {
            let ty = self.lexer.peek_type()?;
            if !levels[level].contains(&ty) || (ty == TokenType::In && self.no_in) {
                return Ok(left);
            }
            let token = self.next_token()?;
            let right = self.binary_expression(level + 1)?;
            left = self.binary(ty, token.line, left, right);
        }
    }

    /// Re-runs every binary level above an already-parsed operand, tightest
    /// first, so each operator attaches at its own precedence.
    fn continue_binary_levels(&mut self, mut left: NodeId) -> JsResult<NodeId> {
        let levels = self.binary_levels();
        for level in (0..levels.len()).rev() {
            left = self.continue_binary_at(left, level)?;
        }
        Ok(left)
    }

    /// `**` binds tighter than multiplication and is right-associative.
    fn exponentiation_expression(&mut self) -> JsResult<NodeId> {
        let left = self.unary_expression()?;
        if self.lexer.peek_type()? == TokenType::Exponentiation {
            let token = self.next_token()?;
            let right = self.exponentiation_expression()?;
            return Ok(self.binary(TokenType::Exponentiation, token.line, left, right));
        }
        Ok(left)
    }

    fn unary_expression(&mut self) -> JsResult<NodeId> {
        let ty = self.lexer.peek_type()?;
        let mapped = match ty {
            TokenType::Delete | TokenType::Typeof | TokenType::Void | TokenType::BitwiseNot | TokenType::LogicalNot => {
                Some(ty)
            }
            TokenType::Addition => Some(TokenType::UnaryPlus),
            TokenType::Subtraction => Some(TokenType::UnaryNegation),
            TokenType::Increment | TokenType::Decrement => Some(ty),
            _ => None,
        };
        let Some(mapped) = mapped else {
            return self.postfix_expression();
        };
        let token = self.next_token()?;
        let operand = self.unary_expression()?;
        if matches!(mapped, TokenType::Increment | TokenType::Decrement) && !self.is_assignment_target(operand) {
            return Err(self.syntax_error("Invalid left-hand side in prefix operation"));
        }
        let node = self.node(mapped, token.line);
        self.ast.get_mut(node).left = Some(operand);
        Ok(node)
    }

    fn postfix_expression(&mut self) -> JsResult<NodeId> {
        let operand = self.call_expression()?;
        self.continue_postfix(operand)
    }

    fn continue_postfix(&mut self, operand: NodeId) -> JsResult<NodeId> {
        let next = self.lexer.peek()?;
        // A newline terminates the operand; `a\n++b` is two statements.
        if matches!(next.ty, TokenType::Increment | TokenType::Decrement) && !next.newline_before {
            if !self.is_assignment_target(operand) {
                return Err(self.syntax_error("Invalid left-hand side in postfix operation"));
            }
            let token = self.next_token()?;
            let mapped = if token.ty == TokenType::Increment {
                TokenType::PostIncrement
            } else {
                TokenType::PostDecrement
            };
            let node = self.node(mapped, token.line);
            self.ast.get_mut(node).left = Some(operand);
            return Ok(node);
        }
        Ok(operand)
    }

    fn call_expression(&mut self) -> JsResult<NodeId> {
        let callee = if self.lexer.peek_type()? == TokenType::New {
            self.new_expression()?
        } else {
            self.primary_expression()?
        };
        self.continue_calls(callee)
    }

    fn new_expression(&mut self) -> JsResult<NodeId> {
        let new_token = self.expect(TokenType::New)?;
        let callee = if self.lexer.peek_type()? == TokenType::New {
            self.new_expression()?
        } else {
            let primary = self.primary_expression()?;
            self.continue_members(primary)?
        };
        let arguments = if self.lexer.peek_type()? == TokenType::OpenParenthesis {
            self.argument_list()?
        } else {
            None
        };
        let node = self.node(TokenType::New, new_token.line);
        self.ast.get_mut(node).left = Some(callee);
        self.ast.get_mut(node).right = arguments;
        Ok(node)
    }

    /// Member accesses only (no calls); `new a.b.c()` binds the arguments
    /// to the `new`, not to a call.
    fn continue_members(&mut self, mut object: NodeId) -> JsResult<NodeId> {
        loop {
            match self.lexer.peek_type()? {
                TokenType::Dot => {
                    let token = self.next_token()?;
                    let name = self.property_name()?;
                    let node = self.node(TokenType::MemberDot, token.line);
                    self.ast.get_mut(node).left = Some(object);
                    self.ast.get_mut(node).name = Some(name);
                    object = node;
                }
                TokenType::OpenBracket => {
                    let token = self.next_token()?;
                    let index = self.expression()?;
                    self.expect(TokenType::CloseBracket)?;
                    object = self.binary(TokenType::MemberBracket, token.line, object, index);
                }
                _ => return Ok(object),
            }
        }
    }

    fn continue_calls(&mut self, mut object: NodeId) -> JsResult<NodeId> {
        loop {
            match self.lexer.peek_type()? {
                TokenType::Dot | TokenType::OpenBracket => {
                    object = self.continue_members(object)?;
                }
                TokenType::OpenParenthesis => {
                    let line = self.lexer.peek()?.line;
                    let arguments = self.argument_list()?;
                    let node = self.node(TokenType::Call, line);
                    self.ast.get_mut(node).left = Some(object);
                    self.ast.get_mut(node).right = arguments;
                    object = node;
                }
                _ => return Ok(object),
            }
        }
    }

    /// A property name after `.`: any identifier-shaped word, keywords
    /// included.
    fn property_name(&mut self) -> JsResult<AtomId> {
        let token = self.next_token()?;
        match token.atom {
            Some(atom) => Ok(atom),
            None => {
                let text = token.text(self.lexer.src()).to_string();
                if token.ty != TokenType::Name && text.bytes().all(|b| b.is_ascii_alphabetic()) {
                    Ok(self.lexer.interner().intern(&text))
                } else {
                    Err(self.lexer.unexpected(&token))
                }
            }
        }
    }

    /// Parses `( arg, … )` into a comma-linked chain.
    fn argument_list(&mut self) -> JsResult<Option<NodeId>> {
        self.expect(TokenType::OpenParenthesis)?;
        let mut chain: Option<NodeId> = None;
        loop {
            if self.lexer.peek_type()? == TokenType::CloseParenthesis {
                self.next_token()?;
                return Ok(chain);
            }
            let argument = self.assignment_expression()?;
            chain = Some(match chain {
                None => argument,
                Some(prev) => {
                    let line = self.ast.get(argument).line;
                    self.binary(TokenType::Comma, line, prev, argument)
                }
            });
            match self.lexer.peek_type()? {
                TokenType::Comma => {
                    self.next_token()?;
                }
                TokenType::CloseParenthesis => {}
                _ => {
                    let token = self.next_token()?;
                    return Err(self.lexer.unexpected(&token));
                }
            }
        }
    }

    fn primary_expression(&mut self) -> JsResult<NodeId> {
        let ty = self.lexer.peek_type()?;
        match ty {
            TokenType::Number => {
                let token = self.next_token()?;
                let node = self.node(TokenType::Number, token.line);
                self.ast.get_mut(node).payload = NodePayload::Value(Value::Number(token.number));
                Ok(node)
            }
            TokenType::StringLiteral => {
                let token = self.next_token()?;
                let text = token.string.as_deref().unwrap_or_default();
                let value = Value::from_text(self.heap, text)?;
                let node = self.node(TokenType::StringLiteral, token.line);
                self.ast.get_mut(node).payload = NodePayload::Value(value);
                Ok(node)
            }
            TokenType::RegExpLiteral => {
                let token = self.next_token()?;
                let raw = token.string.as_deref().unwrap_or_default();
                let close = raw.rfind('/').unwrap_or(0);
                let regexp = JsRegExp {
                    pattern: raw[1..close].into(),
                    flags: raw[close + 1..].into(),
                };
                let id = self
                    .heap
                    .allocate(HeapData::Object(JsObject::new(None, None, ObjectPayload::RegExp(regexp))))?;
                let node = self.node(TokenType::RegExpLiteral, token.line);
                self.ast.get_mut(node).payload = NodePayload::Value(Value::Ref(id));
                Ok(node)
            }
            TokenType::True | TokenType::False => {
                let token = self.next_token()?;
                let node = self.node(token.ty, token.line);
                self.ast.get_mut(node).payload = NodePayload::Value(Value::Boolean(token.ty == TokenType::True));
                Ok(node)
            }
            TokenType::Null => {
                let token = self.next_token()?;
                let node = self.node(TokenType::Null, token.line);
                self.ast.get_mut(node).payload = NodePayload::Value(Value::Null);
                Ok(node)
            }
            TokenType::This => {
                let token = self.next_token()?;
                Ok(self.node(TokenType::This, token.line))
            }
            TokenType::Name => {
                let token = self.next_token()?;
                let atom = token.atom.expect("name token carries an atom");
                let node = self.reference(atom, token.line);
                self.arrow_from_name(node, token.line)
            }
            TokenType::Function => self.function_expression(),
            TokenType::OpenParenthesis => {
                if self.arrow_ahead()? {
                    return self.arrow_function();
                }
                self.next_token()?;
                let expr = self.expression()?;
                self.expect(TokenType::CloseParenthesis)?;
                Ok(expr)
            }
            TokenType::OpenBracket => self.array_literal(),
            TokenType::OpenBrace => self.object_literal(),
            _ => {
                let token = self.next_token()?;
                Err(self.lexer.unexpected(&token))
            }
        }
    }

    /// `[e0, e1, …]` with elision: missing elements are holes.
    fn array_literal(&mut self) -> JsResult<NodeId> {
        let open = self.expect(TokenType::OpenBracket)?;
        let mut chain: Option<NodeId> = None;
        let mut push = |parser: &mut Self, element: NodeId| {
            chain = Some(match chain.take() {
                None => element,
                Some(prev) => {
                    let line = parser.ast.get(element).line;
                    parser.binary(TokenType::Comma, line, prev, element)
                }
            });
        };
        loop {
            match self.lexer.peek_type()? {
                TokenType::CloseBracket => {
                    self.next_token()?;
                    break;
                }
                TokenType::Comma => {
                    // Elision: a hole occupies the position.
                    let token = self.next_token()?;
                    let hole = self.node(TokenType::Empty, token.line);
                    self.ast.get_mut(hole).payload = NodePayload::Value(Value::Invalid);
                    push(self, hole);
                }
                _ => {
                    let element = self.assignment_expression()?;
                    push(self, element);
                    match self.lexer.peek_type()? {
                        TokenType::Comma => {
                            self.next_token()?;
                            if self.lexer.peek_type()? == TokenType::CloseBracket {
                                self.next_token()?;
                                break;
                            }
                        }
                        TokenType::CloseBracket => {
                            self.next_token()?;
                            break;
                        }
                        _ => {
                            let token = self.next_token()?;
                            return Err(self.lexer.unexpected(&token));
                        }
                    }
                }
            }
        }
        let node = self.node(TokenType::ArrayLiteral, open.line);
        self.ast.get_mut(node).left = chain;
        Ok(node)
    }

    fn object_literal(&mut self) -> JsResult<NodeId> {
        let open = self.expect(TokenType::OpenBrace)?;
        let mut chain: Option<NodeId> = None;
        loop {
            if self.lexer.peek_type()? == TokenType::CloseBrace {
                self.next_token()?;
                break;
            }
            let key_token = self.next_token()?;
            let key_value = match key_token.ty {
                TokenType::Name => {
                    let atom = key_token.atom.expect("name token carries an atom");
                    let text = self.lexer.interner().get(atom).to_string();
                    Value::from_text(self.heap, &text)?
                }
                TokenType::StringLiteral => {
                    let text = key_token.string.as_deref().unwrap_or_default();
                    Value::from_text(self.heap, text)?
                }
                TokenType::Number => Value::from_text(self.heap, &crate::value::number_to_string(key_token.number))?,
                _ => return Err(self.lexer.unexpected(&key_token)),
            };
            let key = self.node(TokenType::StringLiteral, key_token.line);
            self.ast.get_mut(key).payload = NodePayload::Value(key_value);

            self.expect(TokenType::Colon)?;
            let value = self.assignment_expression()?;
            let entry = self.binary(TokenType::PropertyEntry, key_token.line, key, value);
            chain = Some(match chain {
                None => entry,
                Some(prev) => self.binary(TokenType::Comma, key_token.line, prev, entry),
            });

            match self.lexer.peek_type()? {
                TokenType::Comma => {
                    self.next_token()?;
                }
                TokenType::CloseBrace => {}
                _ => {
                    let token = self.next_token()?;
                    return Err(self.lexer.unexpected(&token));
                }
            }
        }
        let node = self.node(TokenType::ObjectLiteral, open.line);
        self.ast.get_mut(node).left = chain;
        Ok(node)
    }

    /// Raw-text lookahead for arrow functions: from the `(` in the
    /// lookahead buffer, find the matching `)` and check that `=>` follows
    /// on the same line. A newline before `=>` aborts recognition.
    fn arrow_ahead(&mut self) -> JsResult<bool> {
        let open_ty = self.lexer.peek()?.ty;
        let open_end = self.lexer.peek()?.end;
        debug_assert_eq!(open_ty, TokenType::OpenParenthesis);
        let src = self.lexer.src().as_bytes();
        let mut pos = open_end as usize;
        let mut depth = 1usize;
        while pos < src.len() {
            match src[pos] {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        pos += 1;
                        // Only spaces and tabs may separate `)` from `=>`.
                        while pos < src.len() && matches!(src[pos], b' ' | b'\t') {
                            pos += 1;
                        }
                        return Ok(pos + 1 < src.len() && src[pos] == b'=' && src[pos + 1] == b'>');
                    }
                }
                b'\'' | b'"' => {
                    let quote = src[pos];
                    pos += 1;
                    while pos < src.len() && src[pos] != quote {
                        if src[pos] == b'\\' {
                            pos += 1;
                        }
                        pos += 1;
                    }
                }
                _ => {}
            }
            pos += 1;
        }
        Ok(false)
    }
}
