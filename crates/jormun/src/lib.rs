#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is range-checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior mirrors the engine's integer model")]

mod ast;
mod date;
mod error;
mod heap;
mod intern;
mod json;
mod lexer;
mod lvlhsh;
mod object;
mod parser;
mod promise;
mod property;
mod scope;
mod string;
pub mod tracer;
mod value;
mod vm;

pub use crate::{
    ast::{AstArena, AstLambda, AstNode, LambdaId, NodeId, NodePayload, VarRef},
    error::{ErrorKind, JsError, JsResult, Lookup},
    heap::HeapStats,
    intern::{AtomId, WellKnownAtom, djb_hash},
    lexer::TokenType,
    object::ObjectKind,
    parser::ParseResult,
    scope::{IndexClass, Scope, ScopeId, ScopeTree, ScopeType, VarIndex, Variable, VariableKind, VariableState},
    string::StrProps,
    value::{ShortString, Value, ValueKind},
    vm::{ExternalCallback, Handle, UnhandledRejection, ValueRepr, Vm, VmOptions},
};
