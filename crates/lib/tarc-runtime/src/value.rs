//! Tagged values exchanged between generated code and the runtime.
//!
//! A bare payload word means nothing without its [`Tag`]: the same bits are
//! either a signed integer or an array handle. [`Value`] keeps the two
//! together; [`Value::from_raw`] and [`Value::to_raw`] translate to and from
//! the `(payload, tag)` pair used at the machine level.

use std::fmt;

use slotmap::{Key, KeyData};

use crate::runtime::ErrorKind;

/// Raw machine word carrying a value's payload.
pub type RawVal = u64;

slotmap::new_key_type! {
    /// Handle to an array object stored in an [`ArrayHeap`](crate::ArrayHeap).
    ///
    /// Handles are generational: a handle to a freed object never aliases a
    /// newer one.
    pub struct ArrayRef;
}

impl ArrayRef {
    pub fn to_raw(self) -> RawVal {
        self.data().as_ffi()
    }
    pub fn from_raw(raw: RawVal) -> Self {
        KeyData::from_ffi(raw).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Int = 0,
    ArrayRef = 1,
}

impl From<Tag> for u64 {
    fn from(tag: Tag) -> Self {
        tag as u64
    }
}

impl TryFrom<u64> for Tag {
    type Error = ErrorKind;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Tag::Int),
            1 => Ok(Tag::ArrayRef),
            _ => Err(ErrorKind::InvalidTag(raw)),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Int => write!(f, "int"),
            Tag::ArrayRef => write!(f, "array"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Array(ArrayRef),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Int(_) => Tag::Int,
            Value::Array(_) => Tag::ArrayRef,
        }
    }

    /// Reassemble a value from the payload word and the tag that accompanied it.
    pub fn from_raw(payload: RawVal, tag: Tag) -> Self {
        match tag {
            Tag::Int => Value::Int(payload as i64),
            Tag::ArrayRef => Value::Array(ArrayRef::from_raw(payload)),
        }
    }

    pub fn to_raw(self) -> (RawVal, Tag) {
        match self {
            Value::Int(i) => (i as RawVal, Tag::Int),
            Value::Array(r) => (r.to_raw(), Tag::ArrayRef),
        }
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i),
            Value::Array(_) => None,
        }
    }

    pub fn as_array(self) -> Option<ArrayRef> {
        match self {
            Value::Array(r) => Some(r),
            Value::Int(_) => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<ArrayRef> for Value {
    fn from(r: ArrayRef) -> Self {
        Value::Array(r)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Array(r) => write!(f, "array@{:?}", r.data()),
        }
    }
}
