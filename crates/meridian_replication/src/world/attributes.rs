//! Typed key/value attribute bag attached to every world object.
//!
//! Keys are stable 32-bit hashes of their names, so attribute lookups
//! never touch string data on the hot path. Well-known keys are declared
//! as constants next to the type.

use std::collections::HashMap;
use std::fmt;

/// Stable 32-bit key for a named attribute (FNV-1a over the name).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrKey(u32);

impl AttrKey {
    /// Hashes an attribute name into its stable key. Evaluable in
    /// const context, so well-known keys cost nothing at runtime.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash: u32 = 0x811c_9dc5;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(0x0100_0193);
            i += 1;
        }
        Self(hash)
    }

    /// Raw hash value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.0)
    }
}

/// Name of a live remote player avatar. A non-empty value tags the
/// object as an avatar for send prioritization.
pub const PLAYER_NAME: AttrKey = AttrKey::from_name("player_name");

/// Attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// Integer payload.
    Int(i64),
    /// Float payload.
    Float(f32),
    /// Text payload.
    Text(String),
    /// Boolean payload.
    Flag(bool),
}

impl AttrValue {
    /// Text payload, if this value holds one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Integer payload, if this value holds one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Boolean payload, if this value holds one.
    #[must_use]
    pub const fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            _ => None,
        }
    }
}

/// Attribute bag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    entries: HashMap<AttrKey, AttrValue>,
}

impl Attributes {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Sets an attribute, replacing any previous value under the key.
    pub fn set(&mut self, key: AttrKey, value: AttrValue) {
        self.entries.insert(key, value);
    }

    /// Reads an attribute.
    #[must_use]
    pub fn get(&self, key: AttrKey) -> Option<&AttrValue> {
        self.entries.get(&key)
    }

    /// Reads a text attribute, `None` when absent or of another type.
    #[must_use]
    pub fn text(&self, key: AttrKey) -> Option<&str> {
        self.entries.get(&key).and_then(AttrValue::as_text)
    }

    /// Removes an attribute, returning the previous value.
    pub fn remove(&mut self, key: AttrKey) -> Option<AttrValue> {
        self.entries.remove(&key)
    }

    /// Number of stored attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no attributes are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
