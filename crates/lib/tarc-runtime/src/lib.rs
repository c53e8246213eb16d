//! Runtime support library for programs whose generated code works on a small
//! dynamic type universe: plain integers and arrays, where arrays may hold
//! integers or further arrays.
//!
//! # Value Representation
//!
//! Every value crossing the runtime boundary travels together with its
//! [`Tag`](value::Tag). Inside Rust this is the [`Value`](value::Value) sum
//! type; at the raw boundary ([`runtime::ffi`]) it is a payload word plus a tag
//! word.
//!
//! # Arrays
//!
//! Arrays live in an [`ArrayHeap`](runtime::heap::ArrayHeap) and come in two
//! layouts: *flat* arrays store bare integers, *boxed* arrays store a tag next
//! to each element so that they can contain other arrays.
//!
//! # Reference Counting
//!
//! Arrays are kept alive by exact reference counts. Releasing the last
//! reference to a boxed array releases every array it still contains. Cyclic
//! structures are never collected.

pub mod intrinsics;
pub mod replay;
pub mod runtime;
pub mod utils;
pub mod value;

pub use log;
pub use runtime::heap::ArrayHeap;
pub use value::{ArrayRef, RawVal, Tag, Value};

/// What to do when array objects are still alive after every root of a
/// replayed script has been dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeakCheck {
    /// Do not inspect the heap.
    Ignore,
    /// Log the number of leaked objects.
    #[default]
    Warn,
    /// Treat leaked objects as an error.
    Error,
}

/// Configuration for the runtime front end.
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    pub leak_check: LeakCheck,
}
