//! The object property protocol: query, define, and enumeration.
//!
//! The single lookup primitive walks an object's chain in the fixed order
//! own hash → shared hash → prototype's own → prototype's shared → … and
//! stops at the first non-whiteout match, remembering where it came from.
//! Everything else — get/set/delete/has, copy-on-write over shared
//! templates, handler dispatch, descriptor merging — is layered on that
//! walk.
//!
//! Whiteouts: deleting a key that exists in the shared hash inserts a
//! whiteout entry in the own hash. The shared template itself is never
//! mutated; enumeration and lookup treat the whiteout as "absent here,
//! keep walking the prototype chain".

use crate::{
    error::{JsError, JsResult, Lookup},
    heap::{HeapData, HeapId},
    object::{ObjectPayload, Property, PropertyKey, PropertyKind},
    value::{Value, ValueKind},
    vm::Vm,
};

/// Lookup mode of a property query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum QueryMode {
    Get,
    Set,
    Delete,
    Has,
}

/// A property descriptor as passed to define-property: every field
/// optional, so data/accessor/generic classification happens here.
#[derive(Debug, Clone, Default)]
pub(crate) struct Descriptor {
    pub value: Option<Value>,
    pub writable: Option<bool>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
    pub get: Option<Value>,
    pub set: Option<Value>,
}

impl Descriptor {
    pub fn data(value: Value) -> Self {
        Self {
            value: Some(value),
            writable: Some(true),
            enumerable: Some(true),
            configurable: Some(true),
            ..Self::default()
        }
    }

    fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }
}

/// Where the walk found a property and what it found.
#[derive(Debug, Clone)]
struct FoundProperty {
    /// The object whose hash held the entry.
    owner: HeapId,
    /// True when `owner` is the queried object itself (not an ancestor).
    from_self: bool,
    /// True when the entry came from a shared (template) hash.
    from_shared: bool,
    property: Property,
}

/// Parses a canonical array index out of a key: all digits, no leading
/// zero, below 2^32-1.
fn array_index(key: &PropertyKey) -> Option<u32> {
    let name = key.as_name()?;
    if name.is_empty() || name.len() > 10 {
        return None;
    }
    if name.len() > 1 && name.starts_with('0') {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = name.parse::<u64>().ok()?;
    u32::try_from(index).ok().filter(|&i| i < u32::MAX)
}

impl Vm {
    /// Walks the object chain for `key`, starting at `start`.
    ///
    /// `from_self` is true while the walk is still at the queried object;
    /// it turns false once the walk moves to the prototype.
    fn walk_chain(&self, start: HeapId, key: &PropertyKey, mut from_self: bool) -> Option<FoundProperty> {
        let hash = key.hash();
        let mut current = Some(start);
        while let Some(id) = current {
            let object = self.heap.object(id);
            let mut whiteout_here = false;
            if let Some(property) = object.own().find(hash, key) {
                if property.is_whiteout() {
                    whiteout_here = true;
                } else {
                    return Some(FoundProperty {
                        owner: id,
                        from_self,
                        from_shared: false,
                        property: property.clone(),
                    });
                }
            }
            if !whiteout_here
                && let Some(shared_id) = object.shared_hash()
                && let Some(property) = self.shared_hash(shared_id).find(hash, key)
                && !property.is_whiteout()
            {
                return Some(FoundProperty {
                    owner: id,
                    from_self,
                    from_shared: true,
                    property: property.clone(),
                });
            }
            current = object.proto();
            from_self = false;
        }
        None
    }

    /// Resolves where a lookup on `value` starts walking.
    ///
    /// Real objects start at themselves; string/number/boolean primitives
    /// start at their prototype (boxing without allocation); undefined and
    /// null fail with `TypeError`.
    fn lookup_start(&self, value: &Value, key: &PropertyKey, mode: QueryMode) -> JsResult<(Option<HeapId>, HeapId)> {
        match value {
            Value::Ref(id) if matches!(self.heap.get(*id), HeapData::Object(_)) => Ok((Some(*id), *id)),
            Value::Ref(id) => {
                let proto = match self.heap.get(*id) {
                    HeapData::String(_) => self.prototypes.string,
                    HeapData::Symbol(_) => self.prototypes.symbol,
                    HeapData::Object(_) => unreachable!(),
                };
                Ok((None, proto))
            }
            Value::ShortString(_) => Ok((None, self.prototypes.string)),
            Value::Number(_) => Ok((None, self.prototypes.number)),
            Value::Boolean(_) => Ok((None, self.prototypes.boolean)),
            Value::Undefined | Value::Null | Value::Invalid => {
                let kind = if matches!(value, Value::Null) { "null" } else { "undefined" };
                Err(JsError::type_error(format!(
                    "Cannot {mode} property \"{}\" of {kind}",
                    key_display(key)
                )))
            }
            Value::Data(_) => Err(JsError::type_error("external data has no properties")),
        }
    }

    /// `get` query: returns the property value, or `Declined` on a miss.
    pub(crate) fn property_get(&mut self, value: &Value, key: &PropertyKey) -> JsResult<Lookup<Value>> {
        // String fast paths: length and indexed characters never hit a hash.
        if value.is_string(&self.heap)
            && let Some(result) = self.string_own_property(value, key)
        {
            return Ok(Lookup::Found(result));
        }

        let (self_id, start) = self.lookup_start(value, key, QueryMode::Get)?;

        // Integer indices on arrays short-circuit to the dense store.
        if let Some(id) = self_id
            && let Some(index) = array_index(key)
            && let Some(array) = self.heap.object(id).as_array()
        {
            return Ok(match array.get(index as usize) {
                Some(Value::Invalid) | None => Lookup::Declined,
                Some(element) => Lookup::Found(*element),
            });
        }

        let Some(found) = self.walk_chain(start, key, self_id.is_some()) else {
            return Ok(Lookup::Declined);
        };
        match found.property.kind {
            PropertyKind::Data(slot) => Ok(Lookup::Found(slot)),
            PropertyKind::Handler(handler) => {
                let owner = self_id.unwrap_or(found.owner);
                Ok(Lookup::Found((handler.handler)(self, owner, key, None)?))
            }
            PropertyKind::Accessor { getter, .. } => match getter {
                Some(getter) => Ok(Lookup::Found(self.call(&getter, value, &[])?)),
                None => Ok(Lookup::Found(Value::Undefined)),
            },
            PropertyKind::Whiteout => unreachable!("walk skips whiteouts"),
        }
    }

    /// `set` query. Write failures are silent unless `strict`, except the
    /// cases the protocol always rejects (non-extensible target).
    pub(crate) fn property_set(&mut self, value: &Value, key: &PropertyKey, set_value: Value, strict: bool) -> JsResult<()> {
        let (self_id, _) = self.lookup_start(value, key, QueryMode::Set)?;
        let Some(id) = self_id else {
            // Primitive receiver: the boxed temporary would be discarded.
            if strict {
                return Err(JsError::type_error(format!(
                    "Cannot create property \"{}\" on primitive",
                    key_display(key)
                )));
            }
            return Ok(());
        };

        if let Some(index) = array_index(key)
            && let Some(array) = self.heap.object_mut(id).as_array_mut()
        {
            array.set(index as usize, set_value);
            return Ok(());
        }

        if let Some(found) = self.walk_chain(id, key, true) {
            match found.property.kind {
                // Handlers intercept writes wherever they sit in the
                // chain, always operating on the receiver.
                PropertyKind::Handler(handler) if found.property.writable => {
                    (handler.handler)(self, id, key, Some(&set_value))?;
                    return Ok(());
                }
                PropertyKind::Accessor { setter, .. } => {
                    return match setter {
                        Some(setter) => {
                            self.call(&setter, value, &[set_value])?;
                            Ok(())
                        }
                        None if strict => Err(JsError::type_error(format!(
                            "Cannot set property \"{}\" of object which has only a getter",
                            key_display(key)
                        ))),
                        None => Ok(()),
                    };
                }
                PropertyKind::Data(_) | PropertyKind::Handler(_) => {
                    if !found.property.writable {
                        // Inherited read-only (or shared template) data
                        // fails silently unless strict.
                        if strict {
                            return Err(JsError::type_error(format!(
                                "Cannot assign to read-only property \"{}\" of object",
                                key_display(key)
                            )));
                        }
                        return Ok(());
                    }
                    if found.from_self && !found.from_shared {
                        let hash = key.hash();
                        let object = self.heap.object_mut(id);
                        if let Some(slot) = object.own_mut().find_mut(hash, key) {
                            slot.kind = PropertyKind::Data(set_value);
                            return Ok(());
                        }
                        unreachable!("walk found the entry in this own hash");
                    }
                    // Found in a shared hash or up the chain: copy-on-write
                    // insert of a fresh data property in the own hash.
                }
                PropertyKind::Whiteout => unreachable!("walk skips whiteouts"),
            }
        } else if !self.heap.object(id).is_extensible() {
            return Err(JsError::type_error(format!(
                "Cannot add property \"{}\", object is not extensible",
                key_display(key)
            )));
        }

        self.insert_own(id, key.clone(), Property::data(set_value));
        Ok(())
    }

    /// `delete` query; returns whether the property is gone (which JS
    /// reports as `true` even for misses).
    pub(crate) fn property_delete(&mut self, value: &Value, key: &PropertyKey, _strict: bool) -> JsResult<bool> {
        let (self_id, _) = self.lookup_start(value, key, QueryMode::Delete)?;
        let Some(id) = self_id else {
            return Ok(true);
        };

        if let Some(index) = array_index(key)
            && let Some(array) = self.heap.object_mut(id).as_array_mut()
        {
            array.delete(index as usize);
            return Ok(true);
        }

        let Some(found) = self.walk_chain(id, key, true) else {
            return Ok(true);
        };
        if !found.from_self {
            // Inherited properties are not deletable through an instance.
            return Ok(true);
        }
        if !found.property.configurable {
            return Err(JsError::type_error(format!(
                "Cannot delete property \"{}\" of object",
                key_display(key)
            )));
        }
        let hash = key.hash();
        if found.from_shared {
            // Found only in shared: shadow it with a whiteout in own.
            self.insert_own(id, key.clone(), Property::whiteout());
        } else {
            let shadows_shared = self
                .heap
                .object(id)
                .shared_hash()
                .is_some_and(|shared| self.shared_hash(shared).find(hash, key).is_some());
            let object = self.heap.object_mut(id);
            if shadows_shared {
                // Keep a whiteout so the shared entry stays hidden.
                if let Some(slot) = object.own_mut().find_mut(hash, key) {
                    *slot = Property::whiteout();
                }
            } else {
                object.own_mut().delete(hash, key);
            }
        }
        Ok(true)
    }

    /// `has` query (`in` operator): walks the full chain.
    pub(crate) fn property_has(&mut self, value: &Value, key: &PropertyKey) -> JsResult<bool> {
        if value.is_string(&self.heap)
            && let Some(_found) = self.string_own_property(value, key)
        {
            return Ok(true);
        }
        let (self_id, start) = self.lookup_start(value, key, QueryMode::Has)?;
        if let Some(id) = self_id
            && let Some(index) = array_index(key)
            && let Some(array) = self.heap.object(id).as_array()
        {
            if !matches!(array.get(index as usize), Some(Value::Invalid) | None) {
                return Ok(true);
            }
        }
        Ok(self.walk_chain(start, key, self_id.is_some()).is_some())
    }

    /// Inserts into an own hash, replacing any whiteout so the fresh entry
    /// takes a new enumeration position.
    fn insert_own(&mut self, id: HeapId, key: PropertyKey, property: Property) {
        let hash = key.hash();
        let object = self.heap.object_mut(id);
        let stale_whiteout = object.own().find(hash, &key).is_some_and(Property::is_whiteout)
            && !property.is_whiteout();
        if stale_whiteout {
            object.own_mut().delete(hash, &key);
        }
        object.own_mut().insert(hash, key, property, true);
    }

    /// Own property of a string value: `length` or an indexed character.
    fn string_own_property(&mut self, value: &Value, key: &PropertyKey) -> Option<Value> {
        if let PropertyKey::Name(name) = key
            && &**name == "length"
        {
            let length = match value {
                Value::ShortString(s) => s.length(),
                Value::Ref(id) => match self.heap.get(*id) {
                    HeapData::String(s) => s.length(),
                    _ => return None,
                },
                _ => return None,
            };
            return Some(Value::Number(length as f64));
        }
        let index = array_index(key)? as usize;
        let ch = match value {
            Value::ShortString(s) => s.as_str().chars().nth(index),
            Value::Ref(id) => match self.heap.get_mut(*id) {
                HeapData::String(s) => s.char_at(index),
                _ => return None,
            },
            _ => return None,
        }?;
        let mut buffer = [0u8; 4];
        Value::from_text(&mut self.heap, ch.encode_utf8(&mut buffer)).ok()
    }

    /// Implements the full descriptor merge of define-property.
    ///
    /// Classifies the descriptor as data/accessor/generic, validates the
    /// transition against any existing property, and installs or updates
    /// atomically — a rejected transition changes nothing.
    pub(crate) fn define_property(&mut self, id: HeapId, key: PropertyKey, descriptor: &Descriptor) -> JsResult<()> {
        if descriptor.is_accessor() && descriptor.is_data() {
            return Err(JsError::type_error(
                "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
            ));
        }
        for side in [&descriptor.get, &descriptor.set] {
            if let Some(side) = side
                && !matches!(side, Value::Undefined)
                && !self.is_callable(side)
            {
                return Err(JsError::type_error("Getter/setter must be callable"));
            }
        }

        // Array indices with plain data descriptors land in the dense store.
        if let Some(index) = array_index(&key)
            && self.heap.object(id).as_array().is_some()
            && !descriptor.is_accessor()
            && descriptor.writable.unwrap_or(true)
            && descriptor.enumerable.unwrap_or(true)
            && descriptor.configurable.unwrap_or(true)
        {
            let value = descriptor.value.unwrap_or(Value::Undefined);
            if let Some(array) = self.heap.object_mut(id).as_array_mut() {
                array.set(index as usize, value);
                return Ok(());
            }
        }

        let hash = key.hash();
        let object = self.heap.object(id);
        let existing = object
            .own()
            .find(hash, &key)
            .filter(|p| !p.is_whiteout())
            .cloned()
            .or_else(|| {
                object
                    .shared_hash()
                    .and_then(|shared| self.shared_hash(shared).find(hash, &key))
                    .filter(|p| !p.is_whiteout() && object.own().find(hash, &key).is_none())
                    .cloned()
            });

        let Some(existing) = existing else {
            if !self.heap.object(id).is_extensible() {
                return Err(JsError::type_error(format!(
                    "Cannot define property \"{}\", object is not extensible",
                    key_display(&key)
                )));
            }
            let kind = if descriptor.is_accessor() {
                PropertyKind::Accessor {
                    getter: descriptor.get.filter(|g| !matches!(g, Value::Undefined)),
                    setter: descriptor.set.filter(|s| !matches!(s, Value::Undefined)),
                }
            } else {
                PropertyKind::Data(descriptor.value.unwrap_or(Value::Undefined))
            };
            self.insert_own(
                id,
                key,
                Property {
                    kind,
                    writable: descriptor.writable.unwrap_or(false),
                    enumerable: descriptor.enumerable.unwrap_or(false),
                    configurable: descriptor.configurable.unwrap_or(false),
                },
            );
            return Ok(());
        };

        let reject = |key: &PropertyKey| {
            Err(JsError::type_error(format!(
                "Cannot redefine property: \"{}\"",
                key_display(key)
            )))
        };

        let existing_is_accessor = matches!(existing.kind, PropertyKind::Accessor { .. });
        if !existing.configurable {
            if descriptor.configurable == Some(true) {
                return reject(&key);
            }
            if descriptor.enumerable.is_some_and(|e| e != existing.enumerable) {
                return reject(&key);
            }
            // data ↔ accessor flips need a configurable property.
            if descriptor.is_accessor() != existing_is_accessor && (descriptor.is_accessor() || descriptor.is_data()) {
                return reject(&key);
            }
            if !existing_is_accessor && descriptor.is_data() {
                if !existing.writable && descriptor.writable == Some(true) {
                    return reject(&key);
                }
                if !existing.writable
                    && let Some(new_value) = descriptor.value
                    && let PropertyKind::Data(old_value) = existing.kind
                    && !new_value.strict_equals(&old_value, &self.heap)
                {
                    return reject(&key);
                }
            }
            if existing_is_accessor
                && let PropertyKind::Accessor { getter, setter } = &existing.kind
            {
                let getter_changed = descriptor
                    .get
                    .is_some_and(|g| Some(g) != *getter && !(matches!(g, Value::Undefined) && getter.is_none()));
                let setter_changed = descriptor
                    .set
                    .is_some_and(|s| Some(s) != *setter && !(matches!(s, Value::Undefined) && setter.is_none()));
                if getter_changed || setter_changed {
                    return reject(&key);
                }
            }
        }

        // Merge: unspecified fields keep their current values.
        let merged_kind = if descriptor.is_accessor() {
            let (old_getter, old_setter) = match &existing.kind {
                PropertyKind::Accessor { getter, setter } => (*getter, *setter),
                _ => (None, None),
            };
            PropertyKind::Accessor {
                getter: descriptor
                    .get
                    .map_or(old_getter, |g| if matches!(g, Value::Undefined) { None } else { Some(g) }),
                setter: descriptor
                    .set
                    .map_or(old_setter, |s| if matches!(s, Value::Undefined) { None } else { Some(s) }),
            }
        } else if descriptor.is_data() {
            let old_value = match existing.kind {
                PropertyKind::Data(value) => value,
                _ => Value::Undefined,
            };
            PropertyKind::Data(descriptor.value.unwrap_or(old_value))
        } else {
            existing.kind.clone()
        };
        self.insert_own(
            id,
            key,
            Property {
                kind: merged_kind,
                writable: descriptor.writable.unwrap_or(existing.writable),
                enumerable: descriptor.enumerable.unwrap_or(existing.enumerable),
                configurable: descriptor.configurable.unwrap_or(existing.configurable),
            },
        );
        Ok(())
    }

    /// Ordered own keys of an object: array indices first, then own hash
    /// entries, then shared entries not shadowed by own; whiteouts are
    /// filtered, and `enumerable_only` additionally drops non-enumerables.
    pub(crate) fn own_keys(&self, id: HeapId, enumerable_only: bool) -> Vec<PropertyKey> {
        let object = self.heap.object(id);
        let mut keys = Vec::new();

        if let Some(array) = object.as_array() {
            for (index, element) in array.elements().iter().enumerate() {
                if !matches!(element, Value::Invalid) {
                    keys.push(PropertyKey::name(&index.to_string()));
                }
            }
        }

        for (key, property) in object.own().iter() {
            if property.is_whiteout() {
                continue;
            }
            if enumerable_only && !property.enumerable {
                continue;
            }
            keys.push(key.clone());
        }

        if let Some(shared_id) = object.shared_hash() {
            for (key, property) in self.shared_hash(shared_id).iter() {
                if property.is_whiteout() {
                    continue;
                }
                if enumerable_only && !property.enumerable {
                    continue;
                }
                if object.own().find(key.hash(), key).is_some() {
                    continue;
                }
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Keys for `for-in`: own keys of the object and every prototype,
    /// enumerable only, deduplicated with the nearest occurrence winning.
    pub(crate) fn chain_keys(&self, id: HeapId) -> Vec<PropertyKey> {
        let mut seen: Vec<PropertyKey> = Vec::new();
        let mut current = Some(id);
        while let Some(object_id) = current {
            for key in self.own_keys(object_id, true) {
                if !seen.contains(&key) {
                    seen.push(key);
                }
            }
            current = self.heap.object(object_id).proto();
        }
        seen
    }

    pub(crate) fn is_callable(&self, value: &Value) -> bool {
        matches!(value.kind(&self.heap), ValueKind::Function)
    }

    /// Boxes a primitive into an `object_value` wrapper object.
    pub(crate) fn box_primitive(&mut self, value: Value) -> JsResult<HeapId> {
        let proto = match value.kind(&self.heap) {
            ValueKind::String => self.prototypes.string,
            ValueKind::Number => self.prototypes.number,
            ValueKind::Boolean => self.prototypes.boolean,
            _ => {
                return Err(JsError::type_error("Cannot convert value to object"));
            }
        };
        let object = crate::object::JsObject::new(Some(proto), None, ObjectPayload::Boxed(value));
        self.heap.allocate(HeapData::Object(object))
    }
}

fn key_display(key: &PropertyKey) -> String {
    match key {
        PropertyKey::Name(name) => name.to_string(),
        PropertyKey::Symbol(id) => format!("Symbol({id})"),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::vm::{Vm, VmOptions};

    fn vm() -> Vm {
        Vm::new(VmOptions::default())
    }

    #[test]
    fn set_then_get_then_delete() {
        let mut vm = vm();
        let id = vm.alloc_object().unwrap();
        let object = Value::Ref(id);
        let key = PropertyKey::name("answer");

        assert_eq!(vm.property_get(&object, &key).unwrap(), Lookup::Declined);
        vm.property_set(&object, &key, Value::Number(42.0), false).unwrap();
        assert_eq!(vm.property_get(&object, &key).unwrap(), Lookup::Found(Value::Number(42.0)));

        assert!(vm.property_delete(&object, &key, false).unwrap());
        assert_eq!(vm.property_get(&object, &key).unwrap(), Lookup::Declined);
        assert!(!vm.own_keys(id, false).contains(&key));
    }

    #[test]
    fn get_walks_prototype_chain() {
        let mut vm = vm();
        let proto = vm.alloc_object().unwrap();
        let child = vm.alloc_object().unwrap();
        vm.heap.object_mut(child).set_proto(Some(proto));

        let key = PropertyKey::name("inherited");
        vm.property_set(&Value::Ref(proto), &key, Value::Number(1.0), false).unwrap();
        assert_eq!(
            vm.property_get(&Value::Ref(child), &key).unwrap(),
            Lookup::Found(Value::Number(1.0))
        );

        // Writing through the child shadows, not mutates, the prototype.
        vm.property_set(&Value::Ref(child), &key, Value::Number(2.0), false).unwrap();
        assert_eq!(
            vm.property_get(&Value::Ref(proto), &key).unwrap(),
            Lookup::Found(Value::Number(1.0))
        );
        assert_eq!(
            vm.property_get(&Value::Ref(child), &key).unwrap(),
            Lookup::Found(Value::Number(2.0))
        );
    }

    #[test]
    fn undefined_receiver_is_a_type_error() {
        let mut vm = vm();
        let key = PropertyKey::name("x");
        let err = vm.property_get(&Value::Undefined, &key).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Cannot get property \"x\" of undefined");
        let err = vm.property_set(&Value::Null, &key, Value::Null, false).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Cannot set property \"x\" of null");
    }

    #[test]
    fn array_indices_short_circuit_to_dense_store() {
        let mut vm = vm();
        let id = vm
            .alloc_array(vec![Value::Number(10.0), Value::Invalid, Value::Number(30.0)])
            .unwrap();
        let array = Value::Ref(id);

        let first = PropertyKey::name("0");
        let hole = PropertyKey::name("1");
        assert_eq!(vm.property_get(&array, &first).unwrap(), Lookup::Found(Value::Number(10.0)));
        assert_eq!(vm.property_get(&array, &hole).unwrap(), Lookup::Declined);
        assert!(!vm.property_has(&array, &hole).unwrap());

        vm.property_set(&array, &PropertyKey::name("5"), Value::Boolean(true), false)
            .unwrap();
        let elements = vm.heap.object(id).as_array().unwrap().len();
        assert_eq!(elements, 6);
    }

    #[test]
    fn non_extensible_set_of_absent_key_rejects() {
        let mut vm = vm();
        let id = vm.alloc_object().unwrap();
        let object = Value::Ref(id);
        vm.property_set(&object, &PropertyKey::name("present"), Value::Null, false)
            .unwrap();
        vm.heap.object_mut(id).prevent_extensions();

        // Existing keys stay writable; absent keys reject.
        vm.property_set(&object, &PropertyKey::name("present"), Value::Number(1.0), false)
            .unwrap();
        let err = vm
            .property_set(&object, &PropertyKey::name("absent"), Value::Null, false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Cannot add property \"absent\", object is not extensible"
        );
    }

    #[test]
    fn define_property_rejects_non_configurable_flip_to_accessor() {
        let mut vm = vm();
        let id = vm.alloc_object().unwrap();
        let key = PropertyKey::name("locked");
        vm.define_property(
            id,
            key.clone(),
            &Descriptor {
                value: Some(Value::Number(1.0)),
                writable: Some(false),
                enumerable: Some(false),
                configurable: Some(false),
                ..Descriptor::default()
            },
        )
        .unwrap();

        let err = vm
            .define_property(
                id,
                key.clone(),
                &Descriptor {
                    get: Some(Value::Undefined),
                    ..Descriptor::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Cannot redefine property: \"locked\"");

        // Same-value redefinition of a frozen data property is allowed.
        vm.define_property(
            id,
            key.clone(),
            &Descriptor {
                value: Some(Value::Number(1.0)),
                ..Descriptor::default()
            },
        )
        .unwrap();
        let err = vm
            .define_property(
                id,
                key,
                &Descriptor {
                    value: Some(Value::Number(2.0)),
                    ..Descriptor::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn string_primitives_expose_length_and_characters() {
        let mut vm = vm();
        let text = Value::from_text(&mut vm.heap, "héllo").unwrap();
        assert_eq!(
            vm.property_get(&text, &PropertyKey::name("length")).unwrap(),
            Lookup::Found(Value::Number(5.0))
        );
        let ch = vm.property_get(&text, &PropertyKey::name("1")).unwrap();
        let Lookup::Found(ch) = ch else { panic!("expected a character") };
        assert_eq!(ch.as_text(&vm.heap), Some("é"));
    }

    #[test]
    fn chain_keys_walk_prototypes_nearest_first() {
        let mut vm = vm();
        let proto = vm.alloc_object().unwrap();
        let child = vm.alloc_object().unwrap();
        vm.heap.object_mut(child).set_proto(Some(proto));

        vm.define_property(proto, PropertyKey::name("shared"), &Descriptor::data(Value::Number(1.0)))
            .unwrap();
        vm.define_property(proto, PropertyKey::name("below"), &Descriptor::data(Value::Number(2.0)))
            .unwrap();
        vm.define_property(child, PropertyKey::name("own"), &Descriptor::data(Value::Number(3.0)))
            .unwrap();
        vm.define_property(child, PropertyKey::name("shared"), &Descriptor::data(Value::Number(4.0)))
            .unwrap();

        let chain_keys = vm.chain_keys(child);
        let keys: Vec<&str> = chain_keys.iter().map(|k| k.as_name().unwrap()).collect();
        // Own keys first, duplicates collapse to the nearest occurrence.
        assert_eq!(keys, ["own", "shared", "below"]);
    }

    #[test]
    fn boxed_primitives_carry_their_prototype() {
        let mut vm = vm();
        let text = Value::from_text(&mut vm.heap, "boxed").unwrap();
        let id = vm.box_primitive(text).unwrap();
        assert_eq!(vm.heap.object(id).kind(), crate::object::ObjectKind::ObjectValue);
        assert_eq!(vm.heap.object(id).proto(), Some(vm.prototypes.string));

        let err = vm.box_primitive(Value::Null).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn own_keys_orders_own_before_shared_and_skips_whiteouts() {
        let mut vm = vm();
        let id = vm.alloc_object().unwrap();
        let object = Value::Ref(id);
        vm.property_set(&object, &PropertyKey::name("b"), Value::Number(1.0), false)
            .unwrap();
        vm.property_set(&object, &PropertyKey::name("a"), Value::Number(2.0), false)
            .unwrap();
        vm.property_delete(&object, &PropertyKey::name("b"), false).unwrap();
        vm.property_set(&object, &PropertyKey::name("b"), Value::Number(3.0), false)
            .unwrap();

        let keys: Vec<String> = vm
            .own_keys(id, true)
            .iter()
            .map(|k| k.as_name().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
