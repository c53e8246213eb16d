//! Root bindings that own one reference each.
//!
//! A [`Root`] retains its value when bound or cloned and releases it when
//! dropped, so the variable slots of a running program keep refcounts exact
//! without explicit retain/release calls.

use std::{cell::RefCell, rc::Rc};

use super::{ErrorKind, heap::ArrayHeap};
use crate::value::Value;

/// Heap shared by every root of one program. Not thread-safe.
pub type SharedHeap = Rc<RefCell<ArrayHeap>>;

pub fn new_shared_heap() -> SharedHeap {
    Rc::new(RefCell::new(ArrayHeap::new()))
}

#[derive(Debug)]
pub struct Root {
    heap: SharedHeap,
    value: Value,
}

impl Root {
    /// Bind `value`, retaining it if it is an array.
    pub fn bind(heap: &SharedHeap, value: Value) -> Result<Self, ErrorKind> {
        heap.borrow_mut().retain(value)?;
        Ok(Self {
            heap: heap.clone(),
            value,
        })
    }
    pub fn value(&self) -> Value {
        self.value
    }
}

impl Clone for Root {
    fn clone(&self) -> Self {
        if let Err(e) = self.heap.borrow_mut().retain(self.value) {
            log::warn!("Root::clone: {e}");
        }
        Self {
            heap: self.heap.clone(),
            value: self.value,
        }
    }
}

impl Drop for Root {
    fn drop(&mut self) {
        match self.heap.try_borrow_mut() {
            Ok(mut heap) => {
                if let Err(e) = heap.release(self.value) {
                    log::warn!("Root::drop: {e}");
                }
            }
            Err(_) => log::warn!("Root::drop: heap is busy, leaking {}", self.value),
        }
    }
}
