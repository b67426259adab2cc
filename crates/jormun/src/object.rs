//! Object entity: the header shared by every object kind plus the payload
//! that specializes it.
//!
//! An object carries an *own* property hash, an optional *shared* property
//! hash (a read-only template built at VM init and aliased by every instance
//! of the prototype), a prototype link, and the `{shared, extensible}`
//! flags. Property lookup walks own → shared → prototype chain; a
//! [`PropertyKind::Whiteout`] entry in the own hash shadows a shared-hash
//! entry, giving copy-on-write semantics over shared templates.
//!
//! Subtypes specialize the payload: arrays carry a dense value sequence
//! (holes are `Value::Invalid`), functions carry an invokable, boxed
//! primitives carry the primitive, dates carry one double, errors carry a
//! kind/message pair.

use std::rc::Rc;

use crate::{
    error::{ErrorKind, JsResult},
    heap::HeapId,
    intern::djb_hash,
    lvlhsh::Lvlhsh,
    promise::JsPromise,
    value::Value,
    vm::Vm,
};

/// Key of a property hash entry: a string name or a symbol identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PropertyKey {
    Name(Rc<str>),
    Symbol(u32),
}

impl PropertyKey {
    pub fn name(text: &str) -> Self {
        Self::Name(Rc::from(text))
    }

    /// The layered-hash key hash: DJB over name bytes, or the symbol id
    /// spread by the same function so symbols scatter too.
    pub fn hash(&self) -> u32 {
        match self {
            Self::Name(name) => djb_hash(name.as_bytes()),
            Self::Symbol(id) => djb_hash(&id.to_le_bytes()),
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Symbol(_) => None,
        }
    }
}

/// Native callback backing a handler property.
///
/// Handlers compute reads and intercept writes for properties that are not
/// stored as data slots: `length`, `prototype`, `constructor`, `__proto__`,
/// and array index access all go through this shape. `set_value` is `None`
/// for reads and `Some` for writes.
pub(crate) type HandlerFn = fn(vm: &mut Vm, object: HeapId, key: &PropertyKey, set_value: Option<&Value>) -> JsResult<Value>;

/// A handler property's callback with a debug name.
#[derive(Clone, Copy)]
pub(crate) struct PropertyHandler {
    pub name: &'static str,
    pub handler: HandlerFn,
}

impl std::fmt::Debug for PropertyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PropertyHandler({})", self.name)
    }
}

/// What a property hash entry holds.
#[derive(Debug, Clone)]
pub(crate) enum PropertyKind {
    /// A plain data slot.
    Data(Value),
    /// A getter/setter pair; either side may be absent.
    Accessor {
        getter: Option<Value>,
        setter: Option<Value>,
    },
    /// Reads and writes delegate to a native callback.
    Handler(PropertyHandler),
    /// Marks a shared-hash key as absent from this object.
    Whiteout,
}

/// One property hash entry: kind plus the three attribute booleans.
#[derive(Debug, Clone)]
pub(crate) struct Property {
    pub kind: PropertyKind,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Property {
    pub fn data(value: Value) -> Self {
        Self {
            kind: PropertyKind::Data(value),
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Data property with method attributes (non-enumerable, writable,
    /// configurable) — the shape of built-in prototype entries.
    pub fn method(value: Value) -> Self {
        Self {
            kind: PropertyKind::Data(value),
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    pub fn handler(name: &'static str, handler: HandlerFn) -> Self {
        Self {
            kind: PropertyKind::Handler(PropertyHandler { name, handler }),
            writable: true,
            enumerable: false,
            configurable: false,
        }
    }

    pub fn whiteout() -> Self {
        Self {
            kind: PropertyKind::Whiteout,
            writable: false,
            enumerable: false,
            configurable: true,
        }
    }

    pub fn is_whiteout(&self) -> bool {
        matches!(self.kind, PropertyKind::Whiteout)
    }
}

/// A property map: layered hash from key to property.
pub(crate) type PropertyMap = Lvlhsh<PropertyKey, Property>;

/// Handle of a shared (template) hash in the VM's shared-hash table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SharedHashId(pub(crate) u32);

/// The object sub-kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
pub enum ObjectKind {
    Object,
    Array,
    /// Boxed primitive (Boolean/Number/String object).
    ObjectValue,
    Function,
    RegExp,
    Date,
    Promise,
    Error,
}

impl ObjectKind {
    pub(crate) fn value_kind(self) -> crate::value::ValueKind {
        match self {
            Self::Object => crate::value::ValueKind::Object,
            Self::Array => crate::value::ValueKind::Array,
            Self::ObjectValue => crate::value::ValueKind::ObjectValue,
            Self::Function => crate::value::ValueKind::Function,
            Self::RegExp => crate::value::ValueKind::RegExp,
            Self::Date => crate::value::ValueKind::Date,
            Self::Promise => crate::value::ValueKind::Promise,
            Self::Error => crate::value::ValueKind::Error,
        }
    }

    pub(crate) fn type_name(self) -> &'static str {
        self.into()
    }
}

/// Signature of a native built-in function.
pub(crate) type NativeFn = fn(vm: &mut Vm, this: &Value, args: &[Value]) -> JsResult<Value>;

/// A function payload: either a native built-in or a lambda descriptor
/// produced by the parser and lowered by the external code generator.
#[derive(Debug, Clone)]
pub(crate) enum JsFunction {
    Native(NativeFunction),
    Lambda(Lambda),
}

#[derive(Clone, Copy)]
pub(crate) struct NativeFunction {
    pub name: &'static str,
    /// Declared parameter count, surfaced as the `length` property.
    pub arity: u32,
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// Runtime descriptor of a JavaScript function body.
///
/// The bytecode handle is assigned by the external generator; the core only
/// carries the shape (parameter count, rest flag, closure link).
#[derive(Debug, Clone)]
pub(crate) struct Lambda {
    pub nargs: u32,
    pub rest: bool,
    /// Handle into the external generator's code table.
    pub code: u32,
    /// Closure scope link, when the function captures its environment.
    pub closure: Option<HeapId>,
    pub name: Option<Rc<str>>,
}

/// A regexp literal's source; compilation happens in the external engine.
#[derive(Debug, Clone)]
pub(crate) struct JsRegExp {
    pub pattern: Rc<str>,
    pub flags: Rc<str>,
}

/// Error object payload: name/message pair plus the flag recording whether
/// host error data was attached.
#[derive(Debug, Clone)]
pub(crate) struct JsErrorData {
    pub kind: ErrorKind,
    pub message: Rc<str>,
    pub error_data: bool,
}

/// Payload specializing an object entity.
#[derive(Debug, Clone)]
pub(crate) enum ObjectPayload {
    Plain,
    Array(JsArray),
    Function(JsFunction),
    Boxed(Value),
    Date(f64),
    RegExp(JsRegExp),
    Promise(JsPromise),
    Error(JsErrorData),
}

/// Dense array storage; holes are `Value::Invalid` slots.
#[derive(Debug, Clone, Default)]
pub(crate) struct JsArray {
    elements: Vec<Value>,
}

impl JsArray {
    pub fn from_elements(elements: Vec<Value>) -> Self {
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.elements.get(index)
    }

    /// Writes `index`, growing with holes as needed.
    pub fn set(&mut self, index: usize, value: Value) {
        if index >= self.elements.len() {
            self.elements.resize(index + 1, Value::Invalid);
        }
        self.elements[index] = value;
    }

    /// Truncates or grows to `length`, filling new slots with holes.
    pub fn set_length(&mut self, length: usize) {
        self.elements.resize(length, Value::Invalid);
    }

    /// Marks `index` as a hole; deleting never shrinks `length`.
    pub fn delete(&mut self, index: usize) {
        if let Some(slot) = self.elements.get_mut(index) {
            *slot = Value::Invalid;
        }
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }
}

/// An object entity.
#[derive(Debug, Clone)]
pub(crate) struct JsObject {
    own: PropertyMap,
    shared: Option<SharedHashId>,
    proto: Option<HeapId>,
    /// True for template objects built at VM init; mutating through a
    /// shared object first forks it into a private one.
    shared_flag: bool,
    extensible: bool,
    payload: ObjectPayload,
}

impl JsObject {
    pub fn new(proto: Option<HeapId>, shared: Option<SharedHashId>, payload: ObjectPayload) -> Self {
        Self {
            own: PropertyMap::new(),
            shared,
            proto,
            shared_flag: false,
            extensible: true,
            payload,
        }
    }

    pub fn plain(proto: Option<HeapId>, shared: Option<SharedHashId>) -> Self {
        Self::new(proto, shared, ObjectPayload::Plain)
    }

    pub fn array(proto: Option<HeapId>, shared: Option<SharedHashId>, elements: Vec<Value>) -> Self {
        Self::new(proto, shared, ObjectPayload::Array(JsArray::from_elements(elements)))
    }

    pub fn date(proto: Option<HeapId>, shared: Option<SharedHashId>, time: f64) -> Self {
        Self::new(proto, shared, ObjectPayload::Date(time))
    }

    pub fn kind(&self) -> ObjectKind {
        match &self.payload {
            ObjectPayload::Plain => ObjectKind::Object,
            ObjectPayload::Array(_) => ObjectKind::Array,
            ObjectPayload::Function(_) => ObjectKind::Function,
            ObjectPayload::Boxed(_) => ObjectKind::ObjectValue,
            ObjectPayload::Date(_) => ObjectKind::Date,
            ObjectPayload::RegExp(_) => ObjectKind::RegExp,
            ObjectPayload::Promise(_) => ObjectKind::Promise,
            ObjectPayload::Error(_) => ObjectKind::Error,
        }
    }

    pub fn own(&self) -> &PropertyMap {
        &self.own
    }

    pub fn own_mut(&mut self) -> &mut PropertyMap {
        &mut self.own
    }

    pub fn shared_hash(&self) -> Option<SharedHashId> {
        self.shared
    }

    /// Attaches a shared template hash; done once while the VM builds its
    /// prototype tables.
    pub fn set_shared_hash(&mut self, shared: Option<SharedHashId>) {
        self.shared = shared;
    }

    pub fn proto(&self) -> Option<HeapId> {
        self.proto
    }

    pub fn set_proto(&mut self, proto: Option<HeapId>) {
        self.proto = proto;
    }

    pub fn is_shared(&self) -> bool {
        self.shared_flag
    }

    /// Marks this object as a shared template. Done once at VM init;
    /// thereafter any mutation path must clone into a private object.
    pub fn mark_shared(&mut self) {
        self.shared_flag = true;
    }

    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    pub fn prevent_extensions(&mut self) {
        self.extensible = false;
    }

    pub fn payload(&self) -> &ObjectPayload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut ObjectPayload {
        &mut self.payload
    }

    pub fn as_array(&self) -> Option<&JsArray> {
        match &self.payload {
            ObjectPayload::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut JsArray> {
        match &mut self.payload {
            ObjectPayload::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&JsFunction> {
        match &self.payload {
            ObjectPayload::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn date_time(&self) -> Option<f64> {
        match &self.payload {
            ObjectPayload::Date(time) => Some(*time),
            _ => None,
        }
    }

    pub fn set_date_time(&mut self, time: f64) {
        if let ObjectPayload::Date(slot) = &mut self.payload {
            *slot = time;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn array_holes_grow_and_delete() {
        let mut array = JsArray::default();
        array.set(2, Value::Number(3.0));
        assert_eq!(array.len(), 3);
        assert_eq!(array.get(0), Some(&Value::Invalid));
        assert_eq!(array.get(2), Some(&Value::Number(3.0)));

        array.delete(2);
        assert_eq!(array.len(), 3);
        assert_eq!(array.get(2), Some(&Value::Invalid));
    }

    #[test]
    fn kind_follows_payload() {
        let object = JsObject::plain(None, None);
        assert_eq!(object.kind(), ObjectKind::Object);
        let array = JsObject::array(None, None, vec![]);
        assert_eq!(array.kind(), ObjectKind::Array);
        let date = JsObject::date(None, None, 0.0);
        assert_eq!(date.kind(), ObjectKind::Date);
        assert_eq!(date.date_time(), Some(0.0));
    }

    #[test]
    fn property_key_hash_is_stable_on_bytes() {
        let a = PropertyKey::name("length");
        let b = PropertyKey::name("length");
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), PropertyKey::name("prototype").hash());
    }
}
