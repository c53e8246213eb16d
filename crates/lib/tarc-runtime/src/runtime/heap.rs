//! Array object storage with exact reference counting.
//!
//! Every array lives in an [`ArrayHeap`] slot and is addressed by a
//! generational [`ArrayRef`] handle, so a handle that outlives its object is
//! reported instead of read through.
//!
//! ## Layouts
//!
//! ```text
//! Flat : [i64; len]             no per-element tag, integers only
//! Boxed: [(payload, Tag); len]  elements may reference other arrays
//! ```
//!
//! ## Ownership
//!
//! A fresh array starts with a refcount of 0. Each owning slot (a root binding
//! or an element of a boxed array) accounts for exactly one count. Retaining
//! never looks at the elements; releasing the last count of a boxed array
//! releases each element that is still an array reference.
//!
//! While an object is being released its in-progress marker is set. A release
//! that reaches a marked object returns immediately, so a release pass always
//! terminates, even on self-referential arrays. The price is that cycles keep
//! their counts above zero and are never freed.

use slotmap::SlotMap;

use super::ErrorKind;
use crate::value::{ArrayRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Flat,
    Boxed,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Elements {
    Flat(Vec<i64>),
    Boxed(Vec<Value>),
}

impl Elements {
    pub fn len(&self) -> usize {
        match self {
            Elements::Flat(v) => v.len(),
            Elements::Boxed(v) => v.len(),
        }
    }
    pub fn load(&self, index: usize) -> Value {
        match self {
            Elements::Flat(v) => Value::Int(v[index]),
            Elements::Boxed(v) => v[index],
        }
    }
    /// Callers must have checked that flat storage only receives integers.
    pub fn store(&mut self, index: usize, value: Value) {
        match (self, value) {
            (Elements::Flat(v), Value::Int(i)) => v[index] = i,
            (Elements::Boxed(v), value) => v[index] = value,
            (Elements::Flat(_), Value::Array(r)) => {
                unreachable!("array {r:?} stored into flat storage")
            }
        }
    }
}

/// Heap-allocated array with its reference count.
#[derive(Debug, Clone)]
pub struct ArrayObject {
    /// Number of live owning references.
    pub refcount: u64,
    in_release: bool,
    pub(crate) elements: Elements,
}

impl ArrayObject {
    pub(crate) fn new(elements: Elements) -> Self {
        Self {
            refcount: 0,
            in_release: false,
            elements,
        }
    }
    pub fn layout(&self) -> Layout {
        match self.elements {
            Elements::Flat(_) => Layout::Flat,
            Elements::Boxed(_) => Layout::Boxed,
        }
    }
    pub fn len(&self) -> usize {
        self.elements.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Whether a release pass is currently working on this object.
    pub fn is_releasing(&self) -> bool {
        self.in_release
    }
}

/// Storage for every array object of a running program.
#[derive(Debug, Clone, Default)]
pub struct ArrayHeap {
    pub(crate) storage: SlotMap<ArrayRef, ArrayObject>,
}

impl ArrayHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of array objects that have not been freed.
    pub fn live_count(&self) -> usize {
        self.storage.len()
    }

    pub fn is_live(&self, r: ArrayRef) -> bool {
        self.storage.contains_key(r)
    }

    pub fn object(&self, r: ArrayRef) -> Result<&ArrayObject, ErrorKind> {
        self.storage.get(r).ok_or(ErrorKind::Dangling(r))
    }

    pub fn refcount(&self, r: ArrayRef) -> Result<u64, ErrorKind> {
        self.object(r).map(|obj| obj.refcount)
    }

    pub fn layout(&self, r: ArrayRef) -> Result<Layout, ErrorKind> {
        self.object(r).map(ArrayObject::layout)
    }

    pub(crate) fn insert(&mut self, elements: Elements) -> ArrayRef {
        self.storage.insert(ArrayObject::new(elements))
    }

    /// Add one owning reference. Integers are never counted.
    pub fn retain(&mut self, v: Value) -> Result<(), ErrorKind> {
        let Value::Array(r) = v else {
            return Ok(());
        };
        match self.storage.get_mut(r) {
            Some(obj) => {
                obj.refcount += 1;
                log::trace!("retain: {r:?} refcount -> {}", obj.refcount);
                Ok(())
            }
            None => {
                log::warn!("retain: invalid ArrayRef {r:?}");
                Err(ErrorKind::Dangling(r))
            }
        }
    }

    /// Drop one owning reference, freeing the object when no reference is left.
    ///
    /// Freeing a boxed array releases each element that still holds an array
    /// reference, once per element. Objects already being released further up
    /// the same pass are skipped. Releasing an object whose count is already
    /// zero frees it; this is how a temporary that was never bound is
    /// discarded.
    pub fn release(&mut self, v: Value) -> Result<(), ErrorKind> {
        let Value::Array(target) = v else {
            return Ok(());
        };
        if !self.storage.contains_key(target) {
            log::warn!("release: invalid ArrayRef {target:?}");
            return Err(ErrorKind::Dangling(target));
        }
        let mut pending = vec![target];
        let mut dying = vec![];
        while let Some(r) = pending.pop() {
            let Some(obj) = self.storage.get_mut(r) else {
                log::warn!("release: element {r:?} was already freed");
                continue;
            };
            if obj.in_release {
                log::trace!("release: {r:?} is already being released");
                continue;
            }
            obj.in_release = true;
            obj.refcount = obj.refcount.saturating_sub(1);
            log::trace!("release: {r:?} refcount -> {}", obj.refcount);
            if obj.refcount == 0 {
                if let Elements::Boxed(elems) = &obj.elements {
                    pending.extend(elems.iter().rev().filter_map(|e| e.as_array()));
                }
                dying.push(r);
            } else {
                obj.in_release = false;
            }
        }
        for r in dying {
            log::trace!("release: freeing {r:?}");
            self.storage.remove(r);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_object_creation() {
        let obj = ArrayObject::new(Elements::Flat(vec![0; 5]));
        assert_eq!(obj.refcount, 0);
        assert_eq!(obj.len(), 5);
        assert_eq!(obj.layout(), Layout::Flat);
        assert!(!obj.is_releasing());
    }

    #[test]
    fn test_retain_and_release() {
        let mut heap = ArrayHeap::new();
        let r = heap.insert(Elements::Flat(vec![1, 2, 3]));
        let v = Value::Array(r);

        assert_eq!(heap.refcount(r), Ok(0));

        heap.retain(v).unwrap();
        assert_eq!(heap.refcount(r), Ok(1));
        heap.retain(v).unwrap();
        assert_eq!(heap.refcount(r), Ok(2));

        heap.release(v).unwrap();
        assert_eq!(heap.refcount(r), Ok(1));
        assert!(!heap.object(r).unwrap().is_releasing());

        // Final release frees the object
        heap.release(v).unwrap();
        assert!(!heap.is_live(r));
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn test_ints_are_not_counted() {
        let mut heap = ArrayHeap::new();
        heap.retain(Value::Int(3)).unwrap();
        heap.release(Value::Int(3)).unwrap();
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn test_release_already_freed() {
        let mut heap = ArrayHeap::new();
        let r = heap.insert(Elements::Flat(vec![]));
        heap.retain(Value::Array(r)).unwrap();
        heap.release(Value::Array(r)).unwrap();

        assert_eq!(
            heap.release(Value::Array(r)),
            Err(ErrorKind::Dangling(r))
        );
        assert_eq!(heap.retain(Value::Array(r)), Err(ErrorKind::Dangling(r)));
    }

    #[test]
    fn test_release_unbound_temporary() {
        let mut heap = ArrayHeap::new();
        let r = heap.insert(Elements::Flat(vec![1]));
        heap.release(Value::Array(r)).unwrap();
        assert!(!heap.is_live(r));
    }

    #[test]
    fn test_release_descends_into_boxed_elements() {
        let mut heap = ArrayHeap::new();
        let inner = heap.insert(Elements::Flat(vec![7, 7]));
        let shared = heap.insert(Elements::Flat(vec![1]));
        let outer = heap.insert(Elements::Boxed(vec![
            Value::Array(inner),
            Value::Int(4),
            Value::Array(shared),
        ]));
        heap.retain(Value::Array(inner)).unwrap();
        heap.retain(Value::Array(shared)).unwrap();
        // `shared` is also held by a root
        heap.retain(Value::Array(shared)).unwrap();
        heap.retain(Value::Array(outer)).unwrap();

        heap.release(Value::Array(outer)).unwrap();
        assert!(!heap.is_live(outer));
        assert!(!heap.is_live(inner));
        assert_eq!(heap.refcount(shared), Ok(1));
    }

    #[test]
    fn test_duplicate_elements_release_once_each() {
        let mut heap = ArrayHeap::new();
        let inner = heap.insert(Elements::Flat(vec![0]));
        let outer = heap.insert(Elements::Boxed(vec![Value::Array(inner); 3]));
        for _ in 0..3 {
            heap.retain(Value::Array(inner)).unwrap();
        }
        heap.retain(Value::Array(inner)).unwrap();
        heap.retain(Value::Array(outer)).unwrap();

        heap.release(Value::Array(outer)).unwrap();
        assert_eq!(heap.refcount(inner), Ok(1));
    }

    #[test]
    fn test_self_reference_terminates_and_leaks() {
        let mut heap = ArrayHeap::new();
        let r = heap.insert(Elements::Boxed(vec![Value::Int(0)]));
        heap.retain(Value::Array(r)).unwrap();
        heap.storage[r].elements.store(0, Value::Array(r));
        heap.retain(Value::Array(r)).unwrap();

        heap.release(Value::Array(r)).unwrap();
        assert_eq!(heap.refcount(r), Ok(1));
        assert!(!heap.object(r).unwrap().is_releasing());
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn test_self_reference_freed_when_count_reaches_zero() {
        let mut heap = ArrayHeap::new();
        let r = heap.insert(Elements::Boxed(vec![Value::Int(0), Value::Int(0)]));
        heap.storage[r].elements.store(1, Value::Array(r));
        heap.retain(Value::Array(r)).unwrap();

        // the only reference is the self-reference; the nested release of
        // `r` hits the in-progress marker
        heap.release(Value::Array(r)).unwrap();
        assert!(!heap.is_live(r));
    }
}
