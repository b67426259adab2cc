//! The JSON codec: `JSON.parse` and `JSON.stringify`.
//!
//! Parse is a hand-written scanner over the source bytes with a depth cap
//! of [`MAX_JSON_DEPTH`]; every error carries the character offset (UTF-8
//! length, not byte offset) up to the failing byte. The reviver protocol
//! wraps the root as `{"": root}` and walks the live value graph, deleting
//! properties the reviver maps to `undefined`.
//!
//! Stringify is an iterative depth-first walk over an explicit stack of at
//! most [`MAX_JSON_DEPTH`] frames — deep or cyclic structures fail instead
//! of overflowing the call stack. Property retrieval goes through the
//! property protocol, so getters and handler properties are honored, then
//! `toJSON` and the replacer get their turns. Output accumulates in a
//! chunked buffer and is pulled up into one final allocation.

use smallvec::SmallVec;

use crate::{
    error::{ErrorKind, JsError, JsResult, Lookup},
    heap::HeapData,
    object::{ObjectPayload, Property, PropertyKey, PropertyMap},
    value::{Value, number_to_string},
    vm::{Vm, insert_shared},
};

/// Nesting limit for both parsing and stringification.
pub(crate) const MAX_JSON_DEPTH: usize = 32;

// ----- parse ----------------------------------------------------------

/// Parses JSON text into a value, applying `reviver` when given.
pub(crate) fn parse(vm: &mut Vm, text: &str, reviver: Option<Value>) -> JsResult<Value> {
    let mut parser = JsonParser {
        vm,
        src: text,
        bytes: text.as_bytes(),
        pos: 0,
        depth: 0,
    };
    parser.skip_space();
    if parser.at_end() {
        return Err(parser.error("Unexpected end of input"));
    }
    let root = parser.parse_value()?;
    parser.skip_space();
    if !parser.at_end() {
        return Err(parser.error("Unexpected token"));
    }

    match reviver {
        Some(reviver) if vm.is_callable(&reviver) => {
            let holder = vm.alloc_object()?;
            let key = PropertyKey::name("");
            vm.heap
                .object_mut(holder)
                .own_mut()
                .insert(key.hash(), key.clone(), Property::data(root), true);
            let result = internalize(vm, &Value::Ref(holder), &key, &reviver, 0);
            // The wrapper was only scaffolding for the walk.
            vm.heap.release(holder);
            result
        }
        _ => Ok(root),
    }
}

struct JsonParser<'a, 'v> {
    vm: &'v mut Vm,
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl JsonParser<'_, '_> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    /// Builds a `SyntaxError` whose position is the UTF-8 character length
    /// up to the failing byte.
    fn error(&self, message: &str) -> JsError {
        let clamped = self.pos.min(self.src.len());
        // Land on a character boundary before counting.
        let mut boundary = clamped;
        while boundary > 0 && !self.src.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let position = self.src[..boundary].chars().count();
        JsError::new(ErrorKind::SyntaxError, format!("{message} at position {position}"))
    }

    /// JSON whitespace: space, tab, CR, LF.
    fn skip_space(&mut self) {
        while matches!(self.byte(), b' ' | b'\t' | b'\r' | b'\n') {
            self.pos += 1;
        }
    }

    fn parse_value(&mut self) -> JsResult<Value> {
        match self.byte() {
            b'{' => self.parse_object(),
            b'[' => self.parse_array(),
            b'"' => {
                let text = self.parse_string()?;
                Value::from_text(&mut self.vm.heap, &text)
            }
            b't' => self.parse_literal("true", Value::Boolean(true)),
            b'f' => self.parse_literal("false", Value::Boolean(false)),
            b'n' => self.parse_literal("null", Value::Null),
            b'-' | b'0'..=b'9' => self.parse_number(),
            _ if self.at_end() => Err(self.error("Unexpected end of input")),
            _ => Err(self.error("Unexpected token")),
        }
    }

    fn parse_object(&mut self) -> JsResult<Value> {
        self.depth += 1;
        if self.depth > MAX_JSON_DEPTH {
            return Err(self.error("Nested too deep"));
        }
        self.pos += 1; // '{'
        let id = self.vm.alloc_object()?;

        self.skip_space();
        if self.byte() == b'}' {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Value::Ref(id));
        }
        loop {
            self.skip_space();
            if self.byte() != b'"' {
                return Err(self.unexpected());
            }
            let key_text = self.parse_string()?;
            self.skip_space();
            if self.byte() != b':' {
                return Err(self.unexpected());
            }
            self.pos += 1;
            self.skip_space();
            let value = self.parse_value()?;

            // Insert straight into the own hash: parse must not trigger
            // handlers ("__proto__" stays a plain data key).
            let key = PropertyKey::name(&key_text);
            self.vm
                .heap
                .object_mut(id)
                .own_mut()
                .insert(key.hash(), key, Property::data(value), true);

            self.skip_space();
            match self.byte() {
                b',' => {
                    self.pos += 1;
                }
                b'}' => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.unexpected()),
            }
        }
        self.depth -= 1;
        Ok(Value::Ref(id))
    }

    fn parse_array(&mut self) -> JsResult<Value> {
        self.depth += 1;
        if self.depth > MAX_JSON_DEPTH {
            return Err(self.error("Nested too deep"));
        }
        self.pos += 1; // '['
        let mut elements = Vec::new();

        self.skip_space();
        if self.byte() == b']' {
            self.pos += 1;
        } else {
            loop {
                self.skip_space();
                elements.push(self.parse_value()?);
                self.skip_space();
                match self.byte() {
                    b',' => {
                        self.pos += 1;
                    }
                    b']' => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.unexpected()),
                }
            }
        }
        self.depth -= 1;
        Ok(Value::Ref(self.vm.alloc_array(elements)?))
    }

    fn unexpected(&self) -> JsError {
        if self.at_end() {
            self.error("Unexpected end of input")
        } else {
            self.error("Unexpected token")
        }
    }

    fn parse_literal(&mut self, literal: &str, value: Value) -> JsResult<Value> {
        if self.src[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            Ok(value)
        } else {
            Err(self.error("Unexpected token"))
        }
    }

    fn parse_number(&mut self) -> JsResult<Value> {
        let start = self.pos;
        if self.byte() == b'-' {
            self.pos += 1;
        }
        match self.byte() {
            b'0' => self.pos += 1,
            b'1'..=b'9' => {
                while self.byte().is_ascii_digit() {
                    self.pos += 1;
                }
            }
            _ => return Err(self.unexpected()),
        }
        if self.byte() == b'.' {
            self.pos += 1;
            if !self.byte().is_ascii_digit() {
                return Err(self.unexpected());
            }
            while self.byte().is_ascii_digit() {
                self.pos += 1;
            }
        }
        if matches!(self.byte(), b'e' | b'E') {
            self.pos += 1;
            if matches!(self.byte(), b'+' | b'-') {
                self.pos += 1;
            }
            if !self.byte().is_ascii_digit() {
                return Err(self.unexpected());
            }
            while self.byte().is_ascii_digit() {
                self.pos += 1;
            }
        }
        let number = self.src[start..self.pos]
            .parse::<f64>()
            .map_err(|_| self.error("Unexpected token"))?;
        Ok(Value::Number(number))
    }

    fn parse_string(&mut self) -> JsResult<String> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            if self.at_end() {
                return Err(self.error("Unexpected end of input"));
            }
            let byte = self.byte();
            match byte {
                b'"' => {
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => {
                    self.pos += 1;
                    self.parse_escape(&mut out)?;
                }
                0x00..=0x1f => return Err(self.error("Unexpected token")),
                _ => {
                    let ch = self.src[self.pos..]
                        .chars()
                        .next()
                        .ok_or_else(|| self.error("Unexpected token"))?;
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> JsResult<()> {
        let byte = self.byte();
        self.pos += 1;
        match byte {
            b'"' => out.push('"'),
            b'\\' => out.push('\\'),
            b'/' => out.push('/'),
            b'b' => out.push('\u{8}'),
            b'f' => out.push('\u{c}'),
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'u' => {
                let unit = self.parse_hex4()?;
                if (0xd800..0xdc00).contains(&unit) {
                    // Leading surrogate: combines with a trailing `\u`
                    // escape, otherwise becomes U+FFFD.
                    if self.byte() == b'\\' && self.bytes.get(self.pos + 1) == Some(&b'u') {
                        let rewind = self.pos;
                        self.pos += 2;
                        let low = self.parse_hex4()?;
                        if (0xdc00..0xe000).contains(&low) {
                            let code = 0x10000 + ((unit - 0xd800) << 10) + (low - 0xdc00);
                            out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        } else {
                            self.pos = rewind;
                            out.push('\u{fffd}');
                        }
                    } else {
                        out.push('\u{fffd}');
                    }
                } else if (0xdc00..0xe000).contains(&unit) {
                    // Unmatched trailing surrogate.
                    out.push('\u{fffd}');
                } else {
                    out.push(char::from_u32(unit).unwrap_or('\u{fffd}'));
                }
            }
            _ => return Err(self.error("Unexpected token")),
        }
        Ok(())
    }

    fn parse_hex4(&mut self) -> JsResult<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            let digit = char::from(self.byte())
                .to_digit(16)
                .ok_or_else(|| self.unexpected())?;
            value = value * 16 + digit;
            self.pos += 1;
        }
        Ok(value)
    }
}

/// The reviver walk: visits `holder[key]`, recursing into containers, then
/// lets the reviver replace (or delete, via `undefined`) the value.
fn internalize(vm: &mut Vm, holder: &Value, key: &PropertyKey, reviver: &Value, depth: usize) -> JsResult<Value> {
    if depth > MAX_JSON_DEPTH {
        return Err(JsError::type_error("Nested too deep"));
    }
    let value = vm.property_get(holder, key)?.unwrap_or(Value::Undefined);

    if let Value::Ref(id) = value
        && matches!(vm.heap.get(id), HeapData::Object(_))
    {
        let is_array = vm.heap.object(id).as_array().is_some();
        if is_array {
            let length = vm.heap.object(id).as_array().map_or(0, |a| a.len());
            for index in 0..length {
                let element_key = PropertyKey::name(&index.to_string());
                let replaced = internalize(vm, &value, &element_key, reviver, depth + 1)?;
                if matches!(replaced, Value::Undefined) {
                    vm.property_delete(&value, &element_key, false)?;
                } else {
                    vm.property_set(&value, &element_key, replaced, false)?;
                }
            }
        } else {
            for child_key in vm.own_keys(id, true) {
                let replaced = internalize(vm, &value, &child_key, reviver, depth + 1)?;
                if matches!(replaced, Value::Undefined) {
                    vm.property_delete(&value, &child_key, false)?;
                } else {
                    vm.property_set(&value, &child_key, replaced, false)?;
                }
            }
        }
    }

    let key_text = key.as_name().unwrap_or_default().to_string();
    let key_value = Value::from_text(&mut vm.heap, &key_text)?;
    vm.call(reviver, holder, &[key_value, value])
}

// ----- stringify ------------------------------------------------------

/// Output buffer assembled from chunks; the final string is computed in a
/// single allocation sized from the chunk total.
#[derive(Debug, Default)]
struct ChunkBuffer {
    chunks: Vec<String>,
    size: usize,
}

/// Target size of one chunk; appends pack into the current chunk until it
/// crosses this.
const CHUNK_SIZE: usize = 1024;

impl ChunkBuffer {
    fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, text: &str) {
        self.size += text.len();
        match self.chunks.last_mut() {
            Some(last) if last.len() < CHUNK_SIZE => last.push_str(text),
            _ => self.chunks.push(text.to_string()),
        }
    }

    fn finish(self) -> String {
        let mut out = String::with_capacity(self.size);
        for chunk in &self.chunks {
            out.push_str(chunk);
        }
        out
    }
}

/// How the replacer argument constrains output.
enum Replacer {
    None,
    Function(Value),
    /// Key allow-list, deduplicated, in array order.
    Keys(Vec<String>),
}

/// One frame of the iterative stringify walk.
struct Frame {
    /// The container being walked.
    holder: Value,
    /// Keys to visit, in emission order (objects).
    keys: Vec<PropertyKey>,
    /// Element count (arrays).
    length: usize,
    index: usize,
    is_array: bool,
    /// Whether any child has been written, for comma placement.
    written: bool,
    /// The artificial `{"": root}` wrapper frame.
    is_root: bool,
}

/// Serializes `value` to JSON text; `Ok(None)` when the root reduces to
/// `undefined`, a function, or a symbol.
pub(crate) fn stringify(
    vm: &mut Vm,
    value: Value,
    replacer: Option<Value>,
    space: Option<Value>,
) -> JsResult<Option<String>> {
    let indent = indent_from_space(vm, space)?;
    let replacer = classify_replacer(vm, replacer);

    // Wrap the root so toJSON/replacer see the standard `("", root)` pair.
    let holder = vm.alloc_object()?;
    let root_key = PropertyKey::name("");
    vm.heap
        .object_mut(holder)
        .own_mut()
        .insert(root_key.hash(), root_key.clone(), Property::data(value), true);

    let mut out = ChunkBuffer::new();
    let mut stack: SmallVec<[Frame; 8]> = SmallVec::new();
    stack.push(Frame {
        holder: Value::Ref(holder),
        keys: vec![root_key],
        length: 1,
        index: 0,
        is_array: false,
        written: false,
        is_root: true,
    });
    let mut wrote_root = false;

    while let Some(frame) = stack.last_mut() {
        let exhausted = if frame.is_array {
            frame.index >= frame.length
        } else {
            frame.index >= frame.keys.len()
        };
        if exhausted {
            let closing = stack.pop().expect("frame stack is non-empty");
            if !closing.is_root {
                close_container(&mut out, &closing, &indent, stack.len());
            }
            continue;
        }

        let key = if frame.is_array {
            PropertyKey::name(&frame.index.to_string())
        } else {
            frame.keys[frame.index].clone()
        };
        frame.index += 1;
        let is_array = frame.is_array;
        let is_root = frame.is_root;
        let holder_value = frame.holder;

        // 1. Retrieve through the property protocol (getters, handlers).
        let mut value = vm.property_get(&holder_value, &key)?.unwrap_or(Value::Undefined);

        // 2. toJSON, when the value is an object carrying one.
        if value.is_object_like(&vm.heap)
            && let Lookup::Found(to_json) = vm.property_get(&value, &PropertyKey::name("toJSON"))?
            && vm.is_callable(&to_json)
        {
            let key_value = Value::from_text(&mut vm.heap, key.as_name().unwrap_or_default())?;
            value = vm.call(&to_json, &value, &[key_value])?;
        }

        // 3. The replacer function.
        if let Replacer::Function(function) = &replacer {
            let function = *function;
            let key_value = Value::from_text(&mut vm.heap, key.as_name().unwrap_or_default())?;
            value = vm.call(&function, &holder_value, &[key_value, value])?;
        }

        // Boxed primitives serialize as their primitive.
        if let Value::Ref(id) = value
            && let HeapData::Object(object) = vm.heap.get(id)
            && let ObjectPayload::Boxed(inner) = object.payload()
        {
            value = *inner;
        }

        // 5. Skip / null-out non-serializable values.
        if !is_serializable(vm, &value) {
            if is_array {
                let written = frame_written(&mut stack);
                write_separator(&mut out, written, &indent, &key, false, stack.len());
                out.push("null");
            }
            continue;
        }

        if is_root {
            wrote_root = true;
        } else {
            let written = frame_written(&mut stack);
            write_separator(&mut out, written, &indent, &key, !is_array, stack.len());
        }

        match &value {
            Value::Null => out.push("null"),
            Value::Boolean(true) => out.push("true"),
            Value::Boolean(false) => out.push("false"),
            Value::Number(n) => {
                // Non-finite numbers emit as null.
                if n.is_finite() {
                    out.push(&number_to_string(*n));
                } else {
                    out.push("null");
                }
            }
            Value::ShortString(s) => append_json_string(&mut out, s.as_str()),
            Value::Ref(id) => match vm.heap.get(*id) {
                HeapData::String(s) => {
                    let text = s
                        .as_str()
                        .ok_or_else(|| JsError::internal("cannot serialize a byte string"))?
                        .to_string();
                    append_json_string(&mut out, &text);
                }
                HeapData::Object(object) => {
                    if stack.len() >= MAX_JSON_DEPTH {
                        return Err(JsError::type_error("Nested too deep or a cyclic structure"));
                    }
                    let is_array = object.as_array().is_some();
                    let frame = if is_array {
                        let length = object.as_array().map_or(0, crate::object::JsArray::len);
                        out.push("[");
                        Frame {
                            holder: value,
                            keys: Vec::new(),
                            length,
                            index: 0,
                            is_array: true,
                            written: false,
                            is_root: false,
                        }
                    } else {
                        out.push("{");
                        Frame {
                            holder: value,
                            keys: object_keys(vm, *id, &replacer),
                            length: 0,
                            index: 0,
                            is_array: false,
                            written: false,
                            is_root: false,
                        }
                    };
                    stack.push(frame);
                }
                HeapData::Symbol(_) => unreachable!("symbols are filtered above"),
            },
            Value::Undefined | Value::Invalid | Value::Data(_) => unreachable!("filtered above"),
        }
    }

    vm.heap.release(holder);
    if wrote_root {
        Ok(Some(out.finish()))
    } else {
        Ok(None)
    }
}

/// Marks the top frame as written and reports whether it already was.
fn frame_written(stack: &mut SmallVec<[Frame; 8]>) -> bool {
    let frame = stack.last_mut().expect("frame stack is non-empty");
    std::mem::replace(&mut frame.written, true)
}

/// Emits the comma, newline/indent, and (for objects) the quoted key.
fn write_separator(
    out: &mut ChunkBuffer,
    already_written: bool,
    indent: &Option<String>,
    key: &PropertyKey,
    with_key: bool,
    depth: usize,
) {
    if already_written {
        out.push(",");
    }
    if let Some(indent) = indent {
        out.push("\n");
        for _ in 0..depth.saturating_sub(1) {
            out.push(indent);
        }
    }
    if with_key {
        append_json_string(out, key.as_name().unwrap_or_default());
        out.push(if indent.is_some() { ": " } else { ":" });
    }
}

fn close_container(out: &mut ChunkBuffer, frame: &Frame, indent: &Option<String>, depth: usize) {
    if frame.written
        && let Some(indent) = indent
    {
        out.push("\n");
        for _ in 0..depth.saturating_sub(1) {
            out.push(indent);
        }
    }
    out.push(if frame.is_array { "]" } else { "}" });
}

/// Values that serialize at all; `undefined`, functions, symbols, and
/// holes are skipped in objects and nulled in arrays.
fn is_serializable(vm: &Vm, value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Invalid | Value::Data(_) => false,
        Value::Ref(id) => match vm.heap.get(*id) {
            HeapData::Symbol(_) => false,
            HeapData::Object(object) => object.as_function().is_none(),
            HeapData::String(_) => true,
        },
        _ => true,
    }
}

/// The keys a container contributes, honoring a replacer allow-list.
fn object_keys(vm: &Vm, id: crate::heap::HeapId, replacer: &Replacer) -> Vec<PropertyKey> {
    match replacer {
        Replacer::Keys(allowed) => allowed.iter().map(|k| PropertyKey::name(k)).collect(),
        _ => vm
            .own_keys(id, true)
            .into_iter()
            .filter(|k| k.as_name().is_some())
            .collect(),
    }
}

fn classify_replacer(vm: &Vm, replacer: Option<Value>) -> Replacer {
    let Some(replacer) = replacer else {
        return Replacer::None;
    };
    if vm.is_callable(&replacer) {
        return Replacer::Function(replacer);
    }
    let Value::Ref(id) = replacer else {
        return Replacer::None;
    };
    let HeapData::Object(object) = vm.heap.get(id) else {
        return Replacer::None;
    };
    let Some(array) = object.as_array() else {
        return Replacer::None;
    };
    // Coerce elements to key strings, deduplicating in order.
    let mut keys: Vec<String> = Vec::new();
    for element in array.elements() {
        let key = match element {
            Value::Number(n) => Some(number_to_string(*n)),
            Value::ShortString(s) => Some(s.as_str().to_string()),
            Value::Ref(id) => match vm.heap.get(*id) {
                HeapData::String(s) => s.as_str().map(str::to_string),
                HeapData::Object(boxed) => match boxed.payload() {
                    ObjectPayload::Boxed(Value::Number(n)) => Some(number_to_string(*n)),
                    ObjectPayload::Boxed(inner) => inner.as_text(&vm.heap).map(str::to_string),
                    _ => None,
                },
                HeapData::Symbol(_) => None,
            },
            _ => None,
        };
        if let Some(key) = key
            && !keys.contains(&key)
        {
            keys.push(key);
        }
    }
    Replacer::Keys(keys)
}

/// Resolves the `space` argument into an indentation token.
///
/// Numbers clamp to `floor(n)` in `0..=10` spaces (non-finite or ≤ 0
/// means none); strings truncate to ten characters; a byte string is an
/// internal error.
fn indent_from_space(vm: &mut Vm, space: Option<Value>) -> JsResult<Option<String>> {
    let Some(space) = space else {
        return Ok(None);
    };
    let space = match space {
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Object(object) => match object.payload() {
                ObjectPayload::Boxed(inner) => *inner,
                _ => return Ok(None),
            },
            _ => space,
        },
        _ => space,
    };
    match space {
        Value::Number(n) => {
            if !n.is_finite() || n <= 0.0 {
                return Ok(None);
            }
            let count = (n.floor() as usize).min(10);
            Ok((count > 0).then(|| " ".repeat(count)))
        }
        Value::ShortString(s) => Ok(Some(truncate_chars(s.as_str(), 10))),
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::String(s) => match s.as_str() {
                Some(text) => Ok(Some(truncate_chars(text, 10))),
                None => Err(JsError::internal("space argument cannot be a byte string")),
            },
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Quotes and escapes a string per the JSON grammar: the two-character
/// escapes where they exist, `\u00XX` for remaining control bytes.
fn append_json_string(out: &mut ChunkBuffer, text: &str) {
    let mut buffer = String::with_capacity(text.len() + 2);
    buffer.push('"');
    for ch in text.chars() {
        match ch {
            '"' => buffer.push_str("\\\""),
            '\\' => buffer.push_str("\\\\"),
            '\n' => buffer.push_str("\\n"),
            '\r' => buffer.push_str("\\r"),
            '\t' => buffer.push_str("\\t"),
            '\u{8}' => buffer.push_str("\\b"),
            '\u{c}' => buffer.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                buffer.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => buffer.push(c),
        }
    }
    buffer.push('"');
    out.push(&buffer);
}

// ----- natives --------------------------------------------------------

/// Builds the `JSON` namespace's shared hash: `parse` and `stringify`.
pub(crate) fn namespace_entries(vm: &mut Vm) -> PropertyMap {
    let mut map = PropertyMap::new();
    let parse_fn = vm.alloc_native("parse", 2, json_parse_native).expect("init allocation");
    let stringify_fn = vm
        .alloc_native("stringify", 3, json_stringify_native)
        .expect("init allocation");
    insert_shared(&mut map, "parse", Property::method(parse_fn));
    insert_shared(&mut map, "stringify", Property::method(stringify_fn));
    map
}

fn json_parse_native(vm: &mut Vm, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let text = match args.first() {
        Some(text) => text.display_string(&vm.heap)?,
        None => "undefined".to_string(),
    };
    let reviver = args.get(1).copied();
    parse(vm, &text, reviver)
}

fn json_stringify_native(vm: &mut Vm, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let value = args.first().copied().unwrap_or(Value::Undefined);
    let replacer = args.get(1).copied();
    let space = args.get(2).copied();
    match stringify(vm, value, replacer, space)? {
        Some(text) => Value::from_text(&mut vm.heap, &text),
        None => Ok(Value::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::vm::{Handle, ValueRepr, Vm, VmOptions};

    fn vm() -> Vm {
        Vm::new(VmOptions::default())
    }

    fn parse_repr(vm: &mut Vm, text: &str) -> ValueRepr {
        let handle = vm.json_parse(text).expect("text should parse");
        vm.export(handle)
    }

    fn stringify_value(vm: &mut Vm, value: Value) -> Option<String> {
        stringify(vm, value, None, None).expect("value should stringify")
    }

    #[test]
    fn parse_object_with_nested_array() {
        let mut vm = vm();
        let repr = parse_repr(&mut vm, r#"{"a":1,"b":[2,3]}"#);
        let ValueRepr::Object(map) = repr else {
            panic!("expected an object");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(map["a"], ValueRepr::Number(1.0));
        assert_eq!(
            map["b"],
            ValueRepr::Array(vec![ValueRepr::Number(2.0), ValueRepr::Number(3.0)])
        );
    }

    #[test]
    fn parse_surrogate_pair_escape() {
        let mut vm = vm();
        let repr = parse_repr(&mut vm, r#""😀""#);
        // U+1F600: one character whose UTF-8 encoding is four bytes.
        assert_eq!(repr, ValueRepr::String("\u{1f600}".to_string()));

        // Lone surrogates decay to U+FFFD.
        assert_eq!(
            parse_repr(&mut vm, r#""\uD83Dx""#),
            ValueRepr::String("\u{fffd}x".to_string())
        );
        assert_eq!(
            parse_repr(&mut vm, r#""\uDE00""#),
            ValueRepr::String("\u{fffd}".to_string())
        );
    }

    #[test]
    fn parse_errors_carry_character_positions() {
        let mut vm = vm();
        let err = vm.json_parse("{\"a\" 1}").unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: Unexpected token at position 5");

        let err = vm.json_parse("[1,").unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: Unexpected end of input at position 3");

        // Position counts characters, not bytes.
        let err = vm.json_parse("[\"é\", )").unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: Unexpected token at position 6");
    }

    #[test]
    fn parse_depth_limit_is_32() {
        let mut vm = vm();
        let mut deep32 = "[".repeat(32);
        deep32.push('1');
        deep32.push_str(&"]".repeat(32));
        assert!(vm.json_parse(&deep32).is_ok());

        let mut deep33 = "[".repeat(33);
        deep33.push('1');
        deep33.push_str(&"]".repeat(33));
        let err = vm.json_parse(&deep33).unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: Nested too deep at position 32");
    }

    #[test]
    fn parse_rejects_trailing_content_and_bad_numbers() {
        let mut vm = vm();
        assert!(vm.json_parse("1 2").is_err());
        assert!(vm.json_parse("01").is_err());
        assert!(vm.json_parse("1.").is_err());
        assert!(vm.json_parse("+1").is_err());
        assert!(vm.json_parse("truthy").is_err());
        assert!(vm.json_parse("{\"a\":}").is_err());
        assert_eq!(parse_repr(&mut vm, "-0.5e2"), ValueRepr::Number(-50.0));
    }

    #[test]
    fn parse_proto_key_is_plain_data() {
        let mut vm = vm();
        let handle = vm.json_parse(r#"{"__proto__": 1}"#).unwrap();
        let value = vm.property(handle, "__proto__").unwrap().unwrap();
        assert_eq!(vm.export(value), ValueRepr::Number(1.0));
    }

    #[test]
    fn stringify_skips_undefined_and_functions_in_objects() {
        let mut vm = vm();
        let object = vm.object().unwrap();
        vm.set_property(object, "a", vm.number(1.0)).unwrap();
        vm.set_property(object, "b", vm.undefined()).unwrap();
        let func = vm.alloc_native("noop", 0, |_, _, _| Ok(Value::Undefined)).unwrap();
        vm.set_property(object, "c", Handle(func)).unwrap();

        let Handle(value) = object;
        assert_eq!(stringify_value(&mut vm, value), Some(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn stringify_nulls_holes_and_undefined_in_arrays() {
        let mut vm = vm();
        let array = vm.array(&[vm.number(1.0), vm.undefined(), vm.number(3.0)]).unwrap();
        let Handle(value) = array;
        assert_eq!(stringify_value(&mut vm, value), Some("[1,null,3]".to_string()));

        let holes = vm.alloc_array(vec![Value::Invalid, Value::Invalid, Value::Invalid]).unwrap();
        assert_eq!(
            stringify_value(&mut vm, Value::Ref(holes)),
            Some("[null,null,null]".to_string())
        );
    }

    #[test]
    fn stringify_root_reductions_return_none() {
        let mut vm = vm();
        assert_eq!(stringify_value(&mut vm, Value::Undefined), None);
        let func = vm.alloc_native("noop", 0, |_, _, _| Ok(Value::Undefined)).unwrap();
        assert_eq!(stringify_value(&mut vm, func), None);
        let symbol = vm.alloc_symbol(None).unwrap();
        assert_eq!(stringify_value(&mut vm, symbol), None);
    }

    #[test]
    fn stringify_numbers() {
        let mut vm = vm();
        let array = vm.alloc_array(vec![
            Value::Number(f64::NAN),
            Value::Number(f64::INFINITY),
            Value::Number(0.1),
            Value::Number(1e21),
        ]).unwrap();
        assert_eq!(
            stringify_value(&mut vm, Value::Ref(array)),
            Some("[null,null,0.1,1e+21]".to_string())
        );
    }

    #[test]
    fn stringify_escapes_strings() {
        let mut vm = vm();
        let text = Value::from_text(&mut vm.heap, "a\"b\\c\n\t\u{1}").unwrap();
        assert_eq!(
            stringify_value(&mut vm, text),
            Some("\"a\\\"b\\\\c\\n\\t\\u0001\"".to_string())
        );
    }

    #[test]
    fn stringify_depth_limit_reports_cycles() {
        let mut vm = vm();
        let object = vm.object().unwrap();
        vm.set_property(object, "me", object).unwrap();
        let Handle(value) = object;
        let err = stringify(&mut vm, value, None, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Nested too deep or a cyclic structure"
        );
    }

    #[test]
    fn stringify_replacer_array_filters_and_orders() {
        let mut vm = vm();
        let object = vm.object().unwrap();
        vm.set_property(object, "a", vm.number(1.0)).unwrap();
        vm.set_property(object, "b", vm.number(2.0)).unwrap();
        vm.set_property(object, "c", vm.number(3.0)).unwrap();

        let key_c1 = vm.string("c").unwrap();
        let key_a = vm.string("a").unwrap();
        let key_c2 = vm.string("c").unwrap();
        let keys = vm.array(&[key_c1, key_a, key_c2]).unwrap();
        let Handle(value) = object;
        let Handle(replacer) = keys;
        let text = stringify(&mut vm, value, Some(replacer), None).unwrap();
        assert_eq!(text, Some(r#"{"c":3,"a":1}"#.to_string()));
    }

    #[test]
    fn stringify_replacer_function_rewrites_values() {
        let mut vm = vm();
        let object = vm.object().unwrap();
        vm.set_property(object, "keep", vm.number(1.0)).unwrap();
        vm.set_property(object, "drop", vm.number(2.0)).unwrap();

        // Replaces 2 with undefined (dropping it) and doubles 1.
        let replacer = vm
            .alloc_native("replacer", 2, |_vm, _this, args| {
                Ok(match args.get(1) {
                    Some(Value::Number(n)) if *n == 2.0 => Value::Undefined,
                    Some(Value::Number(n)) => Value::Number(n * 2.0),
                    Some(other) => *other,
                    None => Value::Undefined,
                })
            })
            .unwrap();
        let Handle(value) = object;
        let text = stringify(&mut vm, value, Some(replacer), None).unwrap();
        assert_eq!(text, Some(r#"{"keep":2}"#.to_string()));
    }

    #[test]
    fn stringify_space_variants() {
        let mut vm = vm();
        let object = vm.object().unwrap();
        vm.set_property(object, "a", vm.number(1.0)).unwrap();
        let Handle(value) = object;

        let text = stringify(&mut vm, value, None, Some(Value::Number(2.0))).unwrap();
        assert_eq!(text, Some("{\n  \"a\": 1\n}".to_string()));

        // Clamp to ten; fractional floors; non-positive means none.
        let text = stringify(&mut vm, value, None, Some(Value::Number(99.0))).unwrap();
        assert_eq!(text, Some(format!("{{\n{}\"a\": 1\n}}", " ".repeat(10))));
        let text = stringify(&mut vm, value, None, Some(Value::Number(0.5))).unwrap();
        assert_eq!(text, Some(r#"{"a":1}"#.to_string()));
        let text = stringify(&mut vm, value, None, Some(Value::Number(f64::NAN))).unwrap();
        assert_eq!(text, Some(r#"{"a":1}"#.to_string()));

        let tab = Value::from_text(&mut vm.heap, "\t").unwrap();
        let text = stringify(&mut vm, value, None, Some(tab)).unwrap();
        assert_eq!(text, Some("{\n\t\"a\": 1\n}".to_string()));
    }

    #[test]
    fn stringify_space_byte_string_is_internal_error() {
        let mut vm = vm();
        let object = vm.object().unwrap();
        let Handle(value) = object;
        let bytes = crate::string::JsString::from_bytes(vec![0xff, 0xfe]);
        let id = vm.heap.allocate(crate::heap::HeapData::String(bytes)).unwrap();
        let err = stringify(&mut vm, value, None, Some(Value::Ref(id))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalError);
    }

    #[test]
    fn stringify_honors_getters() {
        let mut vm = vm();
        let object = vm.object().unwrap();
        let getter = vm.alloc_native("get_answer", 0, |_, _, _| Ok(Value::Number(42.0))).unwrap();
        let Handle(target) = object;
        let Value::Ref(id) = target else { unreachable!() };
        vm.define_property(
            id,
            PropertyKey::name("answer"),
            &crate::property::Descriptor {
                get: Some(getter),
                enumerable: Some(true),
                configurable: Some(true),
                ..crate::property::Descriptor::default()
            },
        )
        .unwrap();
        assert_eq!(stringify_value(&mut vm, target), Some(r#"{"answer":42}"#.to_string()));
    }

    #[test]
    fn reviver_replaces_and_deletes() {
        let mut vm = vm();
        // Reviver: drop "b", double numbers elsewhere.
        let reviver = vm
            .alloc_native("reviver", 2, |vm, _this, args| {
                let key = args.first().and_then(|k| k.as_text(&vm.heap).map(str::to_string));
                Ok(match (key.as_deref(), args.get(1)) {
                    (Some("b"), _) => Value::Undefined,
                    (_, Some(Value::Number(n))) => Value::Number(n * 2.0),
                    (_, Some(other)) => *other,
                    _ => Value::Undefined,
                })
            })
            .unwrap();
        let value = parse(&mut vm, r#"{"a":1,"b":2,"c":[3]}"#, Some(reviver)).unwrap();
        let repr = vm.export(Handle(value));
        let ValueRepr::Object(map) = repr else {
            panic!("expected an object");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), ["a", "c"]);
        assert_eq!(map["a"], ValueRepr::Number(2.0));
        assert_eq!(map["c"], ValueRepr::Array(vec![ValueRepr::Number(6.0)]));
    }

    #[test]
    fn round_trip_preserves_structure() {
        let mut vm = vm();
        let source = r#"{"name":"jörmun","versions":[1,2.5,null],"ok":true,"nested":{"deep":[{"a":"b"}]}}"#;
        let handle = vm.json_parse(source).unwrap();
        let text = vm.json_stringify(handle).unwrap().unwrap();
        assert_eq!(text, source);

        // A second round trip is a fixed point.
        let handle = vm.json_parse(&text).unwrap();
        assert_eq!(vm.json_stringify(handle).unwrap().unwrap(), text);
    }

    #[test]
    fn natives_are_reachable_through_the_json_object() {
        let mut vm = vm();
        let json = vm.json();
        let parse_fn = vm.property(json, "parse").unwrap().unwrap();
        let input = vm.string("[1,2]").unwrap();
        let result = vm.call_function(parse_fn, json, &[input]).unwrap();
        assert_eq!(
            vm.export(result),
            ValueRepr::Array(vec![ValueRepr::Number(1.0), ValueRepr::Number(2.0)])
        );
    }
}
