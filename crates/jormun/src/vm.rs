//! The VM handle and embedding API.
//!
//! A [`Vm`] owns everything one interpreter instance needs: the heap arena,
//! the identifier interner, the shared prototype tables, the promise event
//! queue, the last parse, and the retval/error pair every operation reports
//! through. Multiple VMs coexist freely; there is no global mutable state.
//!
//! Shared hashes are populated once here at construction and treated as
//! read-only thereafter — every array instance aliases the same `length`
//! handler entry, every date the same method table. Mutation through an
//! object never touches these templates (see [`crate::property`]).
//!
//! The embedder-facing surface works with [`Handle`]s (opaque value tokens)
//! and [`ValueRepr`] (an owned, serializable representation for crossing
//! the embedding boundary).

use std::{collections::VecDeque, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    date,
    error::{ErrorKind, JsError, JsResult, Lookup},
    heap::{Heap, HeapData, HeapId, HeapStats},
    intern::{AtomId, Interner},
    json,
    object::{
        JsErrorData, JsFunction, JsObject, Lambda, NativeFn, NativeFunction, ObjectPayload, Property, PropertyKey,
        PropertyMap, SharedHashId,
    },
    parser::{ParseResult, Parser},
    promise::{JsPromise, PromiseEvent, PromiseReaction, ReactionKind},
    scope::VariableState,
    string::JsString,
    tracer::NoopTracer,
    value::{JsSymbol, Value},
};

/// What to do with a promise rejection nobody handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledRejection {
    /// Drop it silently.
    Ignore,
    /// Surface it as an error at the end of the outer call.
    #[default]
    Throw,
}

/// VM construction options.
#[derive(Debug, Clone, Default)]
pub struct VmOptions {
    /// Stop parsing at an unmatched closing brace instead of failing;
    /// used when a script is embedded in a larger config file.
    pub trailer: bool,
    /// Suppress file names and line numbers in reported errors.
    pub quiet: bool,
    /// Policy for unhandled promise rejections.
    pub unhandled_rejection: UnhandledRejection,
    /// Parse as a module (enables `import`/`export`).
    pub module: bool,
    /// Heap slot cap; `None` means unbounded.
    pub max_heap_slots: Option<usize>,
}

/// Opaque value token handed to embedders.
#[derive(Debug, Clone, Copy)]
pub struct Handle(pub(crate) Value);

/// Owned representation of a value for crossing the embedding boundary.
///
/// Containers are deep-copied on export; the `Object` variant preserves
/// property insertion order.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ValueRepr {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ValueRepr>),
    Object(IndexMap<String, ValueRepr>),
    /// A function, by display name.
    Function(String),
    /// A date, by epoch milliseconds.
    Date(f64),
    /// An error object: kind and message.
    Error(ErrorKind, String),
}

/// External property callback: receives the key and, for writes, the new
/// value; returns the read result or `None` to decline.
pub type ExternalCallback = Box<dyn FnMut(&str, Option<&ValueRepr>) -> Option<ValueRepr>>;

/// Heap ids of the built-in prototype objects.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Prototypes {
    pub object: HeapId,
    pub array: HeapId,
    pub function: HeapId,
    pub string: HeapId,
    pub number: HeapId,
    pub boolean: HeapId,
    pub symbol: HeapId,
    pub date: HeapId,
    pub regexp: HeapId,
    pub promise: HeapId,
    pub error: HeapId,
}

/// Shared instance-template hashes, by role.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SharedTemplates {
    /// `length` handler every array instance aliases.
    pub array_instance: SharedHashId,
    /// `length`/`name` handlers for function objects.
    pub function_instance: SharedHashId,
    /// `name`/`message` handlers for error objects.
    pub error_instance: SharedHashId,
}

/// One JavaScript virtual machine.
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) interner: Interner,
    shared_hashes: Vec<PropertyMap>,
    pub(crate) prototypes: Prototypes,
    pub(crate) templates: SharedTemplates,
    options: VmOptions,
    /// The value of the last completed operation, or the error payload.
    retval: Value,
    error: Option<JsError>,
    /// Pre-built allocation-failure error; reporting it cannot allocate.
    memory_error: JsError,
    /// FIFO queue of settled promise reactions awaiting dispatch.
    pub(crate) event_queue: VecDeque<PromiseEvent>,
    symbol_counter: u32,
    /// Last successful parse, kept for accumulative re-parsing.
    parsed: Option<ParseResult>,
    /// The JSON namespace object.
    json_object: HeapId,
    /// External-object property callbacks keyed by object id.
    externals: AHashMap<HeapId, ExternalCallback>,
    /// Rejection values that settled with no handler attached.
    unhandled_rejections: Vec<Value>,
}

impl Vm {
    /// Creates a VM: allocates the arena, seeds the interner, and builds
    /// the shared prototype tables.
    pub fn new(options: VmOptions) -> Self {
        // The cap applies to script allocations; construction itself must
        // not fail, so it is installed after the builtins exist.
        let mut heap = Heap::new(usize::MAX);

        // Bare prototype objects first; cross-links and method tables are
        // filled in below once every id exists.
        let mut alloc_proto = || {
            heap.allocate(HeapData::Object(JsObject::plain(None, None)))
                .expect("fresh arena cannot be exhausted during init")
        };
        let prototypes = Prototypes {
            object: alloc_proto(),
            array: alloc_proto(),
            function: alloc_proto(),
            string: alloc_proto(),
            number: alloc_proto(),
            boolean: alloc_proto(),
            symbol: alloc_proto(),
            date: alloc_proto(),
            regexp: alloc_proto(),
            promise: alloc_proto(),
            error: alloc_proto(),
        };
        let json_object = heap
            .allocate(HeapData::Object(JsObject::plain(Some(prototypes.object), None)))
            .expect("fresh arena cannot be exhausted during init");

        let mut vm = Self {
            heap,
            interner: Interner::new(),
            shared_hashes: Vec::new(),
            prototypes,
            templates: SharedTemplates {
                array_instance: SharedHashId(0),
                function_instance: SharedHashId(0),
                error_instance: SharedHashId(0),
            },
            options,
            retval: Value::Undefined,
            error: None,
            memory_error: JsError::out_of_memory(),
            event_queue: VecDeque::new(),
            symbol_counter: 0,
            parsed: None,
            json_object,
            externals: AHashMap::new(),
            unhandled_rejections: Vec::new(),
        };
        vm.init_builtins();
        if let Some(max_slots) = vm.options.max_heap_slots {
            let floor = vm.heap.stats().total_slots;
            vm.heap.set_max_slots(max_slots.max(floor));
        }
        vm
    }

    /// Builds the shared templates and prototype method tables.
    fn init_builtins(&mut self) {
        let prototypes = self.prototypes;

        // Every non-object prototype inherits from Object.prototype.
        for id in [
            prototypes.array,
            prototypes.function,
            prototypes.string,
            prototypes.number,
            prototypes.boolean,
            prototypes.symbol,
            prototypes.date,
            prototypes.regexp,
            prototypes.promise,
            prototypes.error,
        ] {
            self.heap.object_mut(id).set_proto(Some(prototypes.object));
            self.heap.object_mut(id).mark_shared();
        }
        self.heap.object_mut(prototypes.object).mark_shared();

        // Instance templates: handler properties computed per access.
        let mut array_instance = PropertyMap::new();
        insert_shared(&mut array_instance, "length", Property::handler("array_length", array_length_handler));
        self.templates.array_instance = self.add_shared_hash(array_instance);

        let mut function_instance = PropertyMap::new();
        insert_shared(
            &mut function_instance,
            "length",
            Property::handler("function_length", function_length_handler),
        );
        insert_shared(
            &mut function_instance,
            "name",
            Property::handler("function_name", function_name_handler),
        );
        self.templates.function_instance = self.add_shared_hash(function_instance);

        let mut error_instance = PropertyMap::new();
        insert_shared(&mut error_instance, "name", Property::handler("error_name", error_name_handler));
        insert_shared(
            &mut error_instance,
            "message",
            Property::handler("error_message", error_message_handler),
        );
        self.templates.error_instance = self.add_shared_hash(error_instance);

        // Object.prototype: the __proto__ accessor handler.
        let mut object_proto = PropertyMap::new();
        insert_shared(&mut object_proto, "__proto__", Property::handler("proto", proto_handler));
        let object_proto = self.add_shared_hash(object_proto);
        set_shared(&mut self.heap, prototypes.object, object_proto);

        // Date.prototype: the full method table.
        let date_proto = date::prototype_entries(self);
        let date_proto = self.add_shared_hash(date_proto);
        set_shared(&mut self.heap, prototypes.date, date_proto);

        // The JSON namespace: parse and stringify.
        let json_entries = json::namespace_entries(self);
        let json_shared = self.add_shared_hash(json_entries);
        set_shared(&mut self.heap, self.json_object, json_shared);
        let json_id = self.json_object;
        self.heap.object_mut(json_id).mark_shared();
    }

    pub(crate) fn add_shared_hash(&mut self, map: PropertyMap) -> SharedHashId {
        let id = SharedHashId(u32::try_from(self.shared_hashes.len()).expect("shared hash table exceeds u32 range"));
        self.shared_hashes.push(map);
        id
    }

    pub(crate) fn shared_hash(&self, id: SharedHashId) -> &PropertyMap {
        &self.shared_hashes[id.0 as usize]
    }

    // ----- allocation helpers -----------------------------------------

    pub(crate) fn alloc_object(&mut self) -> JsResult<HeapId> {
        let object = JsObject::plain(Some(self.prototypes.object), None);
        self.heap.allocate(HeapData::Object(object))
    }

    pub(crate) fn alloc_array(&mut self, elements: Vec<Value>) -> JsResult<HeapId> {
        let array = JsObject::array(Some(self.prototypes.array), Some(self.templates.array_instance), elements);
        self.heap.allocate(HeapData::Object(array))
    }

    pub(crate) fn alloc_date(&mut self, time: f64) -> JsResult<HeapId> {
        let date = JsObject::date(Some(self.prototypes.date), None, time);
        self.heap.allocate(HeapData::Object(date))
    }

    pub(crate) fn alloc_native(&mut self, name: &'static str, arity: u32, func: NativeFn) -> JsResult<Value> {
        let function = JsObject::new(
            Some(self.prototypes.function),
            Some(self.templates.function_instance),
            ObjectPayload::Function(JsFunction::Native(NativeFunction { name, arity, func })),
        );
        Ok(Value::Ref(self.heap.allocate(HeapData::Object(function))?))
    }

    pub(crate) fn alloc_error(&mut self, kind: ErrorKind, message: &str) -> JsResult<HeapId> {
        let error = JsObject::new(
            Some(self.prototypes.error),
            Some(self.templates.error_instance),
            ObjectPayload::Error(JsErrorData {
                kind,
                message: message.into(),
                error_data: false,
            }),
        );
        self.heap.allocate(HeapData::Object(error))
    }

    pub(crate) fn alloc_symbol(&mut self, description: Option<&str>) -> JsResult<Value> {
        self.symbol_counter += 1;
        let symbol = JsSymbol {
            id: self.symbol_counter,
            description: description.map(Into::into),
        };
        Ok(Value::Ref(self.heap.allocate(HeapData::Symbol(symbol))?))
    }

    // ----- calling ----------------------------------------------------

    /// Calls a function value. Native built-ins run here; lambdas need the
    /// external bytecode executor.
    pub(crate) fn call(&mut self, function: &Value, this: &Value, args: &[Value]) -> JsResult<Value> {
        let Value::Ref(id) = function else {
            return Err(JsError::type_error("value is not a function"));
        };
        let HeapData::Object(object) = self.heap.get(*id) else {
            return Err(JsError::type_error("value is not a function"));
        };
        match object.as_function() {
            Some(JsFunction::Native(native)) => {
                let func = native.func;
                func(self, this, args)
            }
            Some(JsFunction::Lambda(_)) => Err(JsError::internal("bytecode executor is not attached to this VM")),
            None => Err(JsError::type_error("value is not a function")),
        }
    }

    /// ToNumber with object unboxing: boxed primitives unwrap, dates yield
    /// their time value, other objects are NaN (no valueOf chain without
    /// the executor).
    pub(crate) fn to_number(&mut self, value: &Value) -> JsResult<f64> {
        if let Some(number) = value.to_number(&self.heap) {
            return Ok(number);
        }
        let Value::Ref(id) = value else {
            return Ok(f64::NAN);
        };
        match self.heap.get(*id) {
            HeapData::Object(object) => match object.payload() {
                ObjectPayload::Boxed(inner) => {
                    let inner = *inner;
                    self.to_number(&inner)
                }
                ObjectPayload::Date(time) => Ok(*time),
                _ => Ok(f64::NAN),
            },
            HeapData::Symbol(_) => Err(JsError::type_error("Cannot convert a Symbol value to a number")),
            HeapData::String(_) => Ok(f64::NAN),
        }
    }

    // ----- retval and errors ------------------------------------------

    /// Attaches an error to the VM, materializing its value-level object.
    /// Reporting a memory error takes the pre-built singleton path.
    pub(crate) fn set_error(&mut self, mut error: JsError) {
        if self.options.quiet {
            error.strip_location();
        }
        if error.kind() == ErrorKind::MemoryError {
            self.retval = Value::Undefined;
            self.error = Some(self.memory_error.clone());
            return;
        }
        self.retval = match self.alloc_error(error.kind(), error.message()) {
            Ok(id) => Value::Ref(id),
            Err(_) => Value::Undefined,
        };
        self.error = Some(error);
    }

    pub(crate) fn set_retval(&mut self, value: Value) {
        self.retval = value;
        self.error = None;
    }

    // ----- promise queue ----------------------------------------------

    /// Appends settled reactions to the FIFO event queue.
    pub(crate) fn enqueue_events(&mut self, events: Vec<PromiseEvent>) {
        self.event_queue.extend(events);
    }

    /// Pops the next pending reaction, in settlement order.
    pub(crate) fn dequeue_event(&mut self) -> Option<PromiseEvent> {
        self.event_queue.pop_front()
    }

    /// Reports a rejection with no handler attached, honoring the VM
    /// option.
    pub(crate) fn report_unhandled_rejection(&mut self, value: &Value) -> JsResult<()> {
        match self.options.unhandled_rejection {
            UnhandledRejection::Ignore => Ok(()),
            UnhandledRejection::Throw => {
                let text = value.display_string(&self.heap).unwrap_or_default();
                Err(JsError::new(ErrorKind::Error, format!("unhandled promise rejection: {text}")))
            }
        }
    }

    // ----- public embedding API ---------------------------------------

    /// Parses `source`, attaching the AST to the VM. Re-parsing
    /// accumulates: global bindings of earlier parses stay visible at
    /// their original slots.
    pub fn parse(&mut self, source: &str, file_name: &str) -> Result<(), JsError> {
        let module = self.options.module;
        let mut parser = Parser::new(source, file_name, 1, &mut self.heap, &mut self.interner, module, NoopTracer);
        if self.options.trailer {
            parser.set_trailer(true);
        }
        if let Some(previous) = &self.parsed {
            parser.import_globals(previous);
        }
        match parser.parse() {
            Ok(result) => {
                self.parsed = Some(result);
                self.set_retval(Value::Undefined);
                Ok(())
            }
            Err(mut error) => {
                if self.options.quiet {
                    error.strip_location();
                }
                self.set_error(error.clone());
                Err(error)
            }
        }
    }

    /// The last parse — the AST and scope tree the external code generator
    /// lowers to bytecode.
    pub fn parsed(&self) -> Option<&ParseResult> {
        self.parsed.as_ref()
    }

    /// The spelling of an interned identifier atom.
    pub fn atom_text(&self, atom: AtomId) -> &str {
        self.interner.get(atom)
    }

    /// The declared globals of the last parse as `(name, slot, referenced)`
    /// triples, in unique-id order.
    pub fn global_names(&self) -> Vec<(String, u32, bool)> {
        let Some(parsed) = &self.parsed else {
            return Vec::new();
        };
        parsed
            .scopes
            .get(parsed.global)
            .variables
            .values()
            .map(|variable| {
                (
                    self.interner.get(variable.atom).to_string(),
                    variable.index.slot(),
                    variable.state == VariableState::Referenced,
                )
            })
            .collect()
    }

    /// The current retval as an owned representation.
    pub fn retval(&self) -> ValueRepr {
        self.export_value(&self.retval)
    }

    /// The attached error rendered the way the engine prints it, or `None`
    /// when the VM is clean.
    pub fn error_string(&self) -> Option<String> {
        self.error.as_ref().map(JsError::to_string)
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// The `JSON` namespace object.
    pub fn json(&self) -> Handle {
        Handle(Value::Ref(self.json_object))
    }

    // ----- public value constructors ----------------------------------

    pub fn undefined(&self) -> Handle {
        Handle(Value::Undefined)
    }

    pub fn null(&self) -> Handle {
        Handle(Value::Null)
    }

    pub fn number(&self, value: f64) -> Handle {
        Handle(Value::Number(value))
    }

    pub fn boolean(&self, value: bool) -> Handle {
        Handle(Value::Boolean(value))
    }

    pub fn string(&mut self, text: &str) -> Result<Handle, JsError> {
        Ok(Handle(Value::from_text(&mut self.heap, text)?))
    }

    /// Builds a byte string from raw host data (one byte per code point).
    pub fn byte_string(&mut self, bytes: &[u8]) -> Result<Handle, JsError> {
        let id = self.heap.allocate(HeapData::String(JsString::from_bytes(bytes.to_vec())))?;
        Ok(Handle(Value::Ref(id)))
    }

    /// ToBoolean of a value.
    pub fn truthy(&self, value: Handle) -> bool {
        value.0.is_truthy(&self.heap)
    }

    /// The `typeof` operator result for a value.
    pub fn type_of(&self, value: Handle) -> &'static str {
        value.0.type_of(&self.heap)
    }

    pub fn object(&mut self) -> Result<Handle, JsError> {
        Ok(Handle(Value::Ref(self.alloc_object()?)))
    }

    pub fn array(&mut self, elements: &[Handle]) -> Result<Handle, JsError> {
        let elements = elements.iter().map(|h| h.0).collect();
        Ok(Handle(Value::Ref(self.alloc_array(elements)?)))
    }

    /// Builds a date value with constructor semantics: no args is now, one
    /// number is an epoch, one string parses, several numbers are calendar
    /// fields.
    pub fn date(&mut self, args: &[Handle]) -> Result<Handle, JsError> {
        let args: Vec<Value> = args.iter().map(|h| h.0).collect();
        let time = date::time_from_args(self, &args)?;
        Ok(Handle(Value::Ref(self.alloc_date(time)?)))
    }

    /// Materializes a function object for a lambda the code generator
    /// lowered: the shape lives here, the bytecode behind `code` lives in
    /// the executor.
    pub fn lambda_function(&mut self, nargs: u32, rest: bool, code: u32, name: Option<&str>) -> Result<Handle, JsError> {
        let function = JsObject::new(
            Some(self.prototypes.function),
            Some(self.templates.function_instance),
            ObjectPayload::Function(JsFunction::Lambda(Lambda {
                nargs,
                rest,
                code,
                closure: None,
                name: name.map(Rc::from),
            })),
        );
        Ok(Handle(Value::Ref(self.heap.allocate(HeapData::Object(function))?)))
    }

    /// Creates a pending promise object.
    pub fn promise(&mut self) -> Result<Handle, JsError> {
        let promise = JsObject::new(
            Some(self.prototypes.promise),
            None,
            ObjectPayload::Promise(JsPromise::new()),
        );
        Ok(Handle(Value::Ref(self.heap.allocate(HeapData::Object(promise))?)))
    }

    /// Registers a `then` pair on a promise and returns the derived
    /// promise that settles with the handler's result. Handlers fire
    /// through the event queue; registering on a settled promise enqueues
    /// immediately.
    pub fn promise_then(
        &mut self,
        promise: Handle,
        on_fulfilled: Option<Handle>,
        on_rejected: Option<Handle>,
    ) -> Result<Handle, JsError> {
        let id = self.promise_id(promise)?;
        let derived = self.promise()?;
        let derived_id = self.promise_id(derived)?;
        let ObjectPayload::Promise(state) = self.heap.object_mut(id).payload_mut() else {
            unreachable!("checked by promise_id");
        };
        let events = state.register(
            PromiseReaction {
                kind: ReactionKind::Fulfill,
                handler: on_fulfilled.map(|h| h.0),
                capability: Some(derived_id),
            },
            PromiseReaction {
                kind: ReactionKind::Reject,
                handler: on_rejected.map(|h| h.0),
                capability: Some(derived_id),
            },
        );
        self.enqueue_events(events);
        Ok(derived)
    }

    /// Settles a promise; the matching reactions join the FIFO queue. A
    /// rejection nobody handles is remembered for [`Vm::run_events`].
    pub fn settle_promise(&mut self, promise: Handle, fulfilled: bool, value: Handle) -> Result<(), JsError> {
        let id = self.promise_id(promise)?;
        let kind = if fulfilled { ReactionKind::Fulfill } else { ReactionKind::Reject };
        let ObjectPayload::Promise(state) = self.heap.object_mut(id).payload_mut() else {
            unreachable!("checked by promise_id");
        };
        let handled = state.is_handled();
        let events = state.settle(kind, value.0);
        if !fulfilled && !handled && events.is_empty() {
            self.unhandled_rejections.push(value.0);
        }
        self.enqueue_events(events);
        Ok(())
    }

    /// Drains the event queue, one handler call per event, in settlement
    /// order, then reports any unhandled rejection per the VM option.
    ///
    /// A reaction with a handler settles its derived promise with the
    /// handler's result; a pass-through reaction forwards the settlement.
    pub fn run_events(&mut self) -> Result<(), JsError> {
        while let Some(event) = self.dequeue_event() {
            let result = match event.reaction.handler {
                Some(handler) => Some(self.call(&handler, &Value::Undefined, &[event.argument])?),
                None => None,
            };
            if let Some(capability) = event.reaction.capability {
                let fulfilled = result.is_some() || event.reaction.kind == ReactionKind::Fulfill;
                let value = result.unwrap_or(event.argument);
                self.settle_promise(Handle(Value::Ref(capability)), fulfilled, Handle(value))?;
            }
        }
        let pending: Vec<Value> = std::mem::take(&mut self.unhandled_rejections);
        for value in pending {
            self.report_unhandled_rejection(&value)?;
        }
        Ok(())
    }

    fn promise_id(&self, promise: Handle) -> JsResult<HeapId> {
        let Handle(Value::Ref(id)) = promise else {
            return Err(JsError::type_error("value is not a promise"));
        };
        match self.heap.get(id) {
            HeapData::Object(object) if matches!(object.payload(), ObjectPayload::Promise(_)) => Ok(id),
            _ => Err(JsError::type_error("value is not a promise")),
        }
    }

    /// Registers an external object: its keys enumerate from `keys` and
    /// every read/write dispatches to `callback`.
    pub fn external_object(&mut self, keys: &[&str], callback: ExternalCallback) -> Result<Handle, JsError> {
        let mut shared = PropertyMap::new();
        for key in keys {
            insert_shared(&mut shared, key, Property::handler("external", external_handler));
        }
        let shared = self.add_shared_hash(shared);
        let object = JsObject::new(Some(self.prototypes.object), Some(shared), ObjectPayload::Plain);
        let id = self.heap.allocate(HeapData::Object(object))?;
        self.externals.insert(id, callback);
        Ok(Handle(Value::Ref(id)))
    }

    pub(crate) fn external_dispatch(&mut self, id: HeapId, key: &str, set: Option<ValueRepr>) -> Option<ValueRepr> {
        let callback = self.externals.get_mut(&id)?;
        callback(key, set.as_ref())
    }

    // ----- public property protocol -----------------------------------

    /// Reads a property; `Ok(None)` is a clean miss.
    pub fn property(&mut self, object: Handle, key: &str) -> Result<Option<Handle>, JsError> {
        let key = PropertyKey::name(key);
        match self.property_get(&object.0, &key)? {
            Lookup::Found(value) => Ok(Some(Handle(value))),
            Lookup::Declined => Ok(None),
        }
    }

    pub fn set_property(&mut self, object: Handle, key: &str, value: Handle) -> Result<(), JsError> {
        let key = PropertyKey::name(key);
        self.property_set(&object.0, &key, value.0, false)
    }

    pub fn delete_property(&mut self, object: Handle, key: &str) -> Result<bool, JsError> {
        let key = PropertyKey::name(key);
        self.property_delete(&object.0, &key, false)
    }

    /// Calls a function value with `this` and arguments, reporting through
    /// the retval/error pair like every outer entry point.
    pub fn call_function(&mut self, function: Handle, this: Handle, args: &[Handle]) -> Result<Handle, JsError> {
        let args: Vec<Value> = args.iter().map(|h| h.0).collect();
        match self.call(&function.0, &this.0, &args) {
            Ok(value) => {
                self.set_retval(value);
                Ok(Handle(value))
            }
            Err(error) => {
                self.set_error(error.clone());
                Err(error)
            }
        }
    }

    // ----- export / import --------------------------------------------

    /// Deep-copies a value into its owned representation.
    pub fn export(&self, handle: Handle) -> ValueRepr {
        self.export_value(&handle.0)
    }

    fn export_value(&self, value: &Value) -> ValueRepr {
        match value {
            Value::Undefined | Value::Invalid | Value::Data(_) => ValueRepr::Undefined,
            Value::Null => ValueRepr::Null,
            Value::Boolean(b) => ValueRepr::Bool(*b),
            Value::Number(n) => ValueRepr::Number(*n),
            Value::ShortString(s) => ValueRepr::String(s.as_str().to_string()),
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::String(s) => ValueRepr::String(s.as_str().unwrap_or_default().to_string()),
                HeapData::Symbol(symbol) => {
                    ValueRepr::String(format!("Symbol({})", symbol.description.as_deref().unwrap_or_default()))
                }
                HeapData::Object(object) => match object.payload() {
                    ObjectPayload::Array(array) => {
                        ValueRepr::Array(array.elements().iter().map(|e| self.export_value(e)).collect())
                    }
                    ObjectPayload::Date(time) => ValueRepr::Date(*time),
                    ObjectPayload::Error(data) => ValueRepr::Error(data.kind, data.message.to_string()),
                    ObjectPayload::Function(JsFunction::Native(native)) => ValueRepr::Function(native.name.to_string()),
                    ObjectPayload::Function(JsFunction::Lambda(lambda)) => {
                        ValueRepr::Function(lambda.name.as_deref().unwrap_or_default().to_string())
                    }
                    ObjectPayload::Boxed(inner) => self.export_value(inner),
                    _ => {
                        let mut map = IndexMap::new();
                        for key in self.own_keys(*id, true) {
                            if let Some(name) = key.as_name() {
                                let hash = key.hash();
                                if let Some(property) = object.own().find(hash, &key)
                                    && let crate::object::PropertyKind::Data(slot) = &property.kind
                                {
                                    map.insert(name.to_string(), self.export_value(slot));
                                }
                            }
                        }
                        ValueRepr::Object(map)
                    }
                },
            },
        }
    }

    /// Builds a value from its owned representation.
    pub fn import(&mut self, repr: &ValueRepr) -> Result<Handle, JsError> {
        let value = self.import_value(repr)?;
        Ok(Handle(value))
    }

    fn import_value(&mut self, repr: &ValueRepr) -> JsResult<Value> {
        Ok(match repr {
            ValueRepr::Undefined => Value::Undefined,
            ValueRepr::Null => Value::Null,
            ValueRepr::Bool(b) => Value::Boolean(*b),
            ValueRepr::Number(n) => Value::Number(*n),
            ValueRepr::String(s) => Value::from_text(&mut self.heap, s)?,
            ValueRepr::Array(elements) => {
                let values = elements
                    .iter()
                    .map(|e| self.import_value(e))
                    .collect::<JsResult<Vec<_>>>()?;
                Value::Ref(self.alloc_array(values)?)
            }
            ValueRepr::Object(map) => {
                let id = self.alloc_object()?;
                for (key, value) in map {
                    let value = self.import_value(value)?;
                    // Install as plain data so keys like "__proto__" do
                    // not trip handler properties.
                    self.define_property(id, PropertyKey::name(key), &crate::property::Descriptor::data(value))?;
                }
                Value::Ref(id)
            }
            ValueRepr::Function(_) => return Err(JsError::type_error("functions cannot be imported")),
            ValueRepr::Date(time) => Value::Ref(self.alloc_date(*time)?),
            ValueRepr::Error(kind, message) => Value::Ref(self.alloc_error(*kind, message)?),
        })
    }

    // ----- JSON front door --------------------------------------------

    /// `JSON.parse` without a reviver.
    pub fn json_parse(&mut self, text: &str) -> Result<Handle, JsError> {
        match json::parse(self, text, None) {
            Ok(value) => {
                self.set_retval(value);
                Ok(Handle(value))
            }
            Err(error) => {
                self.set_error(error.clone());
                Err(error)
            }
        }
    }

    /// `JSON.stringify`; `None` when the root reduces to nothing.
    pub fn json_stringify(&mut self, value: Handle) -> Result<Option<String>, JsError> {
        match json::stringify(self, value.0, None, None) {
            Ok(result) => Ok(result),
            Err(error) => {
                self.set_error(error.clone());
                Err(error)
            }
        }
    }
}

/// Inserts an entry into a shared template map under construction.
pub(crate) fn insert_shared(map: &mut PropertyMap, key: &str, property: Property) {
    let key = PropertyKey::name(key);
    map.insert(key.hash(), key, property, true);
}

fn set_shared(heap: &mut Heap, id: HeapId, shared: SharedHashId) {
    heap.object_mut(id).set_shared_hash(Some(shared));
}

// ----- built-in property handlers -------------------------------------

/// `length` of an array: reads the dense store size, writes truncate or
/// grow with holes.
fn array_length_handler(vm: &mut Vm, object: HeapId, _key: &PropertyKey, set: Option<&Value>) -> JsResult<Value> {
    match set {
        None => {
            let length = vm.heap.object(object).as_array().map_or(0, |a| a.len());
            Ok(Value::Number(length as f64))
        }
        Some(value) => {
            let number = vm.to_number(value)?;
            if !number.is_finite() || number < 0.0 || number.fract() != 0.0 || number > u32::MAX.into() {
                return Err(JsError::range_error("Invalid array length"));
            }
            if let Some(array) = vm.heap.object_mut(object).as_array_mut() {
                array.set_length(number as usize);
            }
            Ok(Value::Undefined)
        }
    }
}

fn function_length_handler(vm: &mut Vm, object: HeapId, _key: &PropertyKey, set: Option<&Value>) -> JsResult<Value> {
    if set.is_some() {
        return Ok(Value::Undefined);
    }
    let length = match vm.heap.object(object).as_function() {
        Some(JsFunction::Native(native)) => native.arity,
        Some(JsFunction::Lambda(lambda)) => lambda.nargs,
        None => 0,
    };
    Ok(Value::Number(f64::from(length)))
}

fn function_name_handler(vm: &mut Vm, object: HeapId, _key: &PropertyKey, set: Option<&Value>) -> JsResult<Value> {
    if set.is_some() {
        return Ok(Value::Undefined);
    }
    let name = match vm.heap.object(object).as_function() {
        Some(JsFunction::Native(native)) => native.name.to_string(),
        Some(JsFunction::Lambda(lambda)) => lambda.name.as_deref().unwrap_or_default().to_string(),
        None => String::new(),
    };
    Value::from_text(&mut vm.heap, &name)
}

fn error_name_handler(vm: &mut Vm, object: HeapId, _key: &PropertyKey, set: Option<&Value>) -> JsResult<Value> {
    if set.is_some() {
        return Ok(Value::Undefined);
    }
    let name = match vm.heap.object(object).payload() {
        ObjectPayload::Error(data) => <&'static str>::from(data.kind),
        _ => "Error",
    };
    Value::from_text(&mut vm.heap, name)
}

fn error_message_handler(vm: &mut Vm, object: HeapId, _key: &PropertyKey, set: Option<&Value>) -> JsResult<Value> {
    if set.is_some() {
        return Ok(Value::Undefined);
    }
    let message = match vm.heap.object(object).payload() {
        ObjectPayload::Error(data) => data.message.to_string(),
        _ => String::new(),
    };
    Value::from_text(&mut vm.heap, &message)
}

/// `__proto__`: reads the prototype link; writes re-link when given an
/// object or null.
fn proto_handler(vm: &mut Vm, object: HeapId, _key: &PropertyKey, set: Option<&Value>) -> JsResult<Value> {
    match set {
        None => Ok(match vm.heap.object(object).proto() {
            Some(proto) => Value::Ref(proto),
            None => Value::Null,
        }),
        Some(Value::Null) => {
            vm.heap.object_mut(object).set_proto(None);
            Ok(Value::Undefined)
        }
        Some(Value::Ref(id)) if matches!(vm.heap.get(*id), HeapData::Object(_)) => {
            let new_proto = *id;
            vm.heap.object_mut(object).set_proto(Some(new_proto));
            Ok(Value::Undefined)
        }
        Some(_) => Ok(Value::Undefined),
    }
}

/// Dispatch for externally bound objects; the callback decides reads and
/// writes per key.
fn external_handler(vm: &mut Vm, object: HeapId, key: &PropertyKey, set: Option<&Value>) -> JsResult<Value> {
    let Some(name) = key.as_name().map(str::to_string) else {
        return Ok(Value::Undefined);
    };
    let set_repr = set.map(|v| vm.export(Handle(*v)));
    match vm.external_dispatch(object, &name, set_repr) {
        Some(result) => {
            let Handle(value) = vm.import(&result)?;
            Ok(value)
        }
        None => Ok(Value::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_reports_and_recovers() {
        let mut vm = Vm::new(VmOptions::default());
        assert!(vm.parse("var a = ;", "bad.js").is_err());
        assert!(vm.error_string().unwrap().starts_with("SyntaxError:"));

        // The VM stays usable for a subsequent parse.
        assert!(vm.parse("var a = 1;", "good.js").is_ok());
        assert_eq!(vm.error_string(), None);
    }

    #[test]
    fn quiet_option_strips_location() {
        let mut vm = Vm::new(VmOptions {
            quiet: true,
            ..VmOptions::default()
        });
        let err = vm.parse("var a = ;", "secret.js").unwrap_err();
        assert!(!err.to_string().contains("secret.js"));
    }

    #[test]
    fn accumulative_parse_keeps_global_slots() {
        let mut vm = Vm::new(VmOptions::default());
        vm.parse("var first = 1;", "a.js").unwrap();
        vm.parse("var second = first;", "b.js").unwrap();

        let parsed = vm.parsed().unwrap();
        let globals = &parsed.scopes.get(parsed.global).variables;
        let first = globals.get(&crate::intern::djb_hash(b"first")).unwrap();
        let second = globals.get(&crate::intern::djb_hash(b"second")).unwrap();
        assert_ne!(first.index, second.index);
    }

    #[test]
    fn array_length_handler_reads_and_writes() {
        let mut vm = Vm::new(VmOptions::default());
        let array = vm
            .array(&[vm.number(1.0), vm.number(2.0), vm.number(3.0)])
            .unwrap();
        let length = vm.property(array, "length").unwrap().unwrap();
        assert_eq!(vm.export(length), ValueRepr::Number(3.0));

        vm.set_property(array, "length", vm.number(1.0)).unwrap();
        assert_eq!(vm.export(array), ValueRepr::Array(vec![ValueRepr::Number(1.0)]));

        let err = vm.set_property(array, "length", vm.number(-1.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RangeError);
    }

    #[test]
    fn proto_handler_round_trips() {
        let mut vm = Vm::new(VmOptions::default());
        let object = vm.object().unwrap();
        let proto = vm.property(object, "__proto__").unwrap().unwrap();
        let Handle(Value::Ref(id)) = proto else {
            panic!("__proto__ of a plain object is an object");
        };
        assert_eq!(id, vm.prototypes.object);

        // Unlinking the prototype also removes the accessor itself.
        vm.set_property(object, "__proto__", vm.null()).unwrap();
        assert!(vm.property(object, "__proto__").unwrap().is_none());
        assert!(vm.property(object, "anything").unwrap().is_none());
    }

    #[test]
    fn external_objects_dispatch_reads() {
        let mut vm = Vm::new(VmOptions::default());
        let external = vm
            .external_object(
                &["host"],
                Box::new(|key, set| {
                    assert!(set.is_none());
                    (key == "host").then(|| ValueRepr::String("bound".to_string()))
                }),
            )
            .unwrap();
        let value = vm.property(external, "host").unwrap().unwrap();
        assert_eq!(vm.export(value), ValueRepr::String("bound".to_string()));
    }

    #[test]
    fn export_import_round_trip() {
        let mut vm = Vm::new(VmOptions::default());
        let mut map = IndexMap::new();
        map.insert("a".to_string(), ValueRepr::Number(1.0));
        map.insert(
            "b".to_string(),
            ValueRepr::Array(vec![ValueRepr::Bool(true), ValueRepr::Null]),
        );
        let repr = ValueRepr::Object(map);
        let handle = vm.import(&repr).unwrap();
        assert_eq!(vm.export(handle), repr);
    }

    #[test]
    fn lambda_functions_need_the_executor() {
        let mut vm = Vm::new(VmOptions::default());
        let function = vm.lambda_function(2, false, 7, Some("compiled")).unwrap();

        // The shape is visible through handler properties…
        let length = vm.property(function, "length").unwrap().unwrap();
        assert_eq!(vm.export(length), ValueRepr::Number(2.0));
        let name = vm.property(function, "name").unwrap().unwrap();
        assert_eq!(vm.export(name), ValueRepr::String("compiled".to_string()));

        // …but calling needs the bytecode executor.
        let err = vm.call_function(function, vm.undefined(), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalError);
    }

    #[test]
    fn promise_reactions_drain_in_fifo_order() {
        let mut vm = Vm::new(VmOptions::default());
        let promise = vm.promise().unwrap();

        // Handler appends its argument to a shared log object.
        let log = vm.array(&[]).unwrap();
        let push = vm
            .alloc_native("push_arg", 1, |vm, this, args| {
                let Value::Ref(id) = this else { unreachable!() };
                if let Some(array) = vm.heap.object_mut(*id).as_array_mut() {
                    let end = array.len();
                    array.set(end, args.first().copied().unwrap_or(Value::Undefined));
                }
                Ok(Value::Undefined)
            })
            .unwrap();

        // Two reactions registered while pending, one after settlement.
        let handler = Handle(push);
        vm.promise_then(promise, Some(handler), None).unwrap();
        vm.promise_then(promise, Some(handler), None).unwrap();
        vm.settle_promise(promise, true, vm.number(1.0)).unwrap();
        vm.promise_then(promise, Some(handler), None).unwrap();
        assert_eq!(vm.event_queue.len(), 3);

        // Drain manually so the handler sees the log as `this`.
        while let Some(event) = vm.dequeue_event() {
            let Some(handler) = event.reaction.handler else { continue };
            vm.call(&handler, &log.0, &[event.argument]).unwrap();
        }
        assert_eq!(
            vm.export(log),
            ValueRepr::Array(vec![
                ValueRepr::Number(1.0),
                ValueRepr::Number(1.0),
                ValueRepr::Number(1.0)
            ])
        );
    }

    #[test]
    fn unhandled_rejection_surfaces_at_run_events() {
        let mut vm = Vm::new(VmOptions::default());
        let promise = vm.promise().unwrap();
        vm.settle_promise(promise, false, vm.number(9.0)).unwrap();
        let err = vm.run_events().unwrap_err();
        assert!(err.to_string().contains("unhandled promise rejection"));

        // A handled rejection passes silently.
        let mut vm = Vm::new(VmOptions::default());
        let promise = vm.promise().unwrap();
        let noop = vm.alloc_native("noop", 1, |_, _, _| Ok(Value::Undefined)).unwrap();
        vm.promise_then(promise, None, Some(Handle(noop))).unwrap();
        vm.settle_promise(promise, false, vm.number(9.0)).unwrap();
        vm.run_events().unwrap();
    }

    #[test]
    fn typeof_and_truthiness() {
        let mut vm = Vm::new(VmOptions::default());
        assert_eq!(vm.type_of(vm.undefined()), "undefined");
        assert_eq!(vm.type_of(vm.null()), "object");
        assert_eq!(vm.type_of(vm.number(1.0)), "number");
        let text = vm.string("x").unwrap();
        assert_eq!(vm.type_of(text), "string");
        let func = vm.lambda_function(0, false, 0, None).unwrap();
        assert_eq!(vm.type_of(func), "function");

        assert!(!vm.truthy(vm.number(0.0)));
        assert!(vm.truthy(text));
    }

    #[test]
    fn byte_strings_are_opaque_to_display() {
        let mut vm = Vm::new(VmOptions::default());
        let bytes = vm.byte_string(&[0xff, 0x00]).unwrap();
        assert!(vm.truthy(bytes));
        assert_eq!(vm.type_of(bytes), "string");
    }

    #[test]
    fn global_names_cover_declared_and_late_bound() {
        let mut vm = Vm::new(VmOptions::default());
        vm.parse("var declared = 1; late = declared;", "names.js").unwrap();
        let names = vm.global_names();
        let declared = names.iter().find(|(name, _, _)| name == "declared").unwrap();
        // `late` was never declared; the reference materialized a global
        // slot at resolution time.
        let late = names.iter().find(|(name, _, _)| name == "late").unwrap();
        assert!(declared.2);
        assert!(late.2);
        assert_ne!(declared.1, late.1);
    }

    #[test]
    fn unhandled_rejection_policy() {
        let mut vm = Vm::new(VmOptions {
            unhandled_rejection: UnhandledRejection::Ignore,
            ..VmOptions::default()
        });
        assert!(vm.report_unhandled_rejection(&Value::Number(1.0)).is_ok());

        let mut vm = Vm::new(VmOptions::default());
        let err = vm.report_unhandled_rejection(&Value::Number(1.0)).unwrap_err();
        assert!(err.to_string().contains("unhandled promise rejection"));
    }
}
