//! Heap string entity with the engine's two coexisting encodings.
//!
//! A *byte string* stores one byte per code point, so its byte size equals
//! its character length. A *UTF-8 string* has a character length smaller
//! than its byte size. Indexed access on long UTF-8 strings goes through an
//! offset table built lazily once the character length crosses
//! [`OFFSET_MAP_THRESHOLD`]; short strings just scan.
//!
//! Strings are immutable: any operation producing a modified result
//! allocates a new string. Short strings (≤ 14 bytes) never reach the heap
//! at all — see [`crate::value::ShortString`].

/// Character length above which indexed access builds an offset table.
pub(crate) const OFFSET_MAP_THRESHOLD: usize = 32;

/// The `{size, length}` view of a string's properties.
///
/// `size` is the byte size, `length` the character length. A string whose
/// size exceeds its length is UTF-8 encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrProps {
    pub size: u32,
    pub length: u32,
}

impl StrProps {
    #[inline]
    #[must_use]
    pub fn is_utf8(self) -> bool {
        self.size > self.length
    }
}

/// A heap-allocated string.
///
/// Byte strings may hold arbitrary bytes (host data); strings built from
/// Rust `&str` are always valid UTF-8 and remember it so `as_str` needs no
/// re-validation.
#[derive(Debug, Clone)]
pub(crate) struct JsString {
    bytes: Box<[u8]>,
    /// Character length; equals `bytes.len()` for byte strings.
    length: u32,
    valid_utf8: bool,
    /// Byte offset of every character, built lazily for long UTF-8 strings.
    offsets: Option<Box<[u32]>>,
}

impl JsString {
    /// Creates a UTF-8 string from Rust text. Length counts code units,
    /// so astral characters contribute two.
    pub fn from_str(text: &str) -> Self {
        let length = u32::try_from(text.chars().map(char::len_utf16).sum::<usize>()).unwrap_or(u32::MAX);
        Self {
            bytes: text.as_bytes().into(),
            length,
            valid_utf8: true,
            offsets: None,
        }
    }

    /// Creates a byte string: one byte per code point, size == length.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let length = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        let valid_utf8 = std::str::from_utf8(&bytes).is_ok();
        Self {
            bytes: bytes.into(),
            length,
            valid_utf8,
            offsets: None,
        }
    }

    #[inline]
    pub fn props(&self) -> StrProps {
        StrProps {
            size: u32::try_from(self.bytes.len()).unwrap_or(u32::MAX),
            length: self.length,
        }
    }

    /// Character length.
    #[inline]
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// The text as `&str`, or `None` for byte strings holding non-UTF-8
    /// host data.
    pub fn as_str(&self) -> Option<&str> {
        if self.valid_utf8 {
            // Checked at construction.
            Some(unsafe { std::str::from_utf8_unchecked(&self.bytes) })
        } else {
            None
        }
    }

    /// Whether this string is a byte string (size equals length).
    pub fn is_byte_string(&self) -> bool {
        !self.props().is_utf8()
    }

    /// Returns the character at `index`, or `None` past the end.
    ///
    /// Byte strings index directly. UTF-8 strings scan, or use the offset
    /// table once it exists; `&mut self` lets long strings build the table
    /// on first access.
    pub fn char_at(&mut self, index: usize) -> Option<char> {
        if index >= self.length as usize {
            return None;
        }
        if self.is_byte_string() {
            return Some(char::from(self.bytes[index]));
        }
        let text = self.as_str()?;
        if self.length as usize > OFFSET_MAP_THRESHOLD {
            // Rebuild path: split borrows by computing the table first.
            if self.offsets.is_none() {
                let offsets: Box<[u32]> = text
                    .char_indices()
                    .map(|(offset, _)| u32::try_from(offset).unwrap_or(u32::MAX))
                    .collect();
                self.offsets = Some(offsets);
            }
            let start = *self.offsets.as_ref()?.get(index)? as usize;
            let text = self.as_str()?;
            return text[start..].chars().next();
        }
        text.chars().nth(index)
    }

    /// Byte-wise equality; `===` on strings compares content.
    pub fn eq_bytes(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ascii_string_is_byte_string() {
        let s = JsString::from_str("hello");
        assert_eq!(s.props(), StrProps { size: 5, length: 5 });
        assert!(s.is_byte_string());
        assert!(!s.props().is_utf8());
    }

    #[test]
    fn multibyte_string_is_utf8() {
        let s = JsString::from_str("héllo");
        assert_eq!(s.props().size, 6);
        assert_eq!(s.props().length, 5);
        assert!(s.props().is_utf8());
    }

    #[test]
    fn char_at_scans_short_utf8() {
        let mut s = JsString::from_str("héllo");
        assert_eq!(s.char_at(1), Some('é'));
        assert_eq!(s.char_at(4), Some('o'));
        assert_eq!(s.char_at(5), None);
        assert!(s.offsets.is_none());
    }

    #[test]
    fn long_utf8_builds_offset_table_lazily() {
        let text: String = "é".repeat(OFFSET_MAP_THRESHOLD + 1);
        let mut s = JsString::from_str(&text);
        assert!(s.offsets.is_none());
        assert_eq!(s.char_at(OFFSET_MAP_THRESHOLD), Some('é'));
        assert!(s.offsets.is_some());
        assert_eq!(s.char_at(0), Some('é'));
    }

    #[test]
    fn astral_characters_count_two_code_units() {
        let s = JsString::from_str("😀");
        assert_eq!(s.props(), StrProps { size: 4, length: 2 });
        assert!(s.props().is_utf8());
    }

    #[test]
    fn byte_string_holds_arbitrary_bytes() {
        let s = JsString::from_bytes(vec![0xff, 0x00, 0x41]);
        assert_eq!(s.props(), StrProps { size: 3, length: 3 });
        assert!(s.as_str().is_none());
        assert!(s.is_byte_string());
    }
}
