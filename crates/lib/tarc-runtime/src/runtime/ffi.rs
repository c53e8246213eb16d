//! `extern "C"` entry points called by generated machine code.
//!
//! Generated code has no tagged union of its own: every value is passed as a
//! payload word followed by a tag word, and every result whose type is not
//! statically known comes back as a [`TaggedWord`].
//!
//! The heap is handed over as an opaque pointer obtained from
//! [`tarc_heap_new`]. Contract violations cannot unwind across the boundary,
//! so they are logged and the process aborts.

use super::{ErrorKind, heap::ArrayHeap};
use crate::value::{RawVal, Tag, Value};

/// A payload word and its tag word, returned as a pair.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedWord {
    pub payload: RawVal,
    pub tag: u64,
}

impl TaggedWord {
    pub fn decode(self) -> Result<Value, ErrorKind> {
        decode(self.payload, self.tag)
    }
}

impl From<Value> for TaggedWord {
    fn from(v: Value) -> Self {
        let (payload, tag) = v.to_raw();
        Self {
            payload,
            tag: tag.into(),
        }
    }
}

fn decode(payload: RawVal, tag: u64) -> Result<Value, ErrorKind> {
    Ok(Value::from_raw(payload, Tag::try_from(tag)?))
}

fn fatal(entry: &str, msg: impl std::fmt::Display) -> ! {
    log::error!("{entry}: {msg}");
    eprintln!("fatal: {entry}: {msg}");
    std::process::abort();
}

fn or_abort<T>(entry: &str, res: Result<T, ErrorKind>) -> T {
    res.unwrap_or_else(|e| fatal(entry, e))
}

/// # Safety
///
/// `heap` must be null or a pointer returned by [`tarc_heap_new`] that has not
/// been freed, with no other live reference to it.
unsafe fn heap_mut<'a>(entry: &str, heap: *mut ArrayHeap) -> &'a mut ArrayHeap {
    match unsafe { heap.as_mut() } {
        Some(heap) => heap,
        None => fatal(entry, "null heap"),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn tarc_heap_new() -> *mut ArrayHeap {
    Box::into_raw(Box::new(ArrayHeap::new()))
}

/// # Safety
///
/// `heap` must be null or a pointer returned by [`tarc_heap_new`] that is not
/// used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tarc_heap_free(heap: *mut ArrayHeap) {
    if !heap.is_null() {
        let heap = unsafe { Box::from_raw(heap) };
        if heap.live_count() > 0 {
            log::debug!("tarc_heap_free: {} arrays still live", heap.live_count());
        }
    }
}

/// Flat array construction. Returns the payload of an `ArrayRef`.
///
/// # Safety
///
/// See [`tarc_heap_free`] for the requirements on `heap`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tarc_arrmake(
    heap: *mut ArrayHeap,
    len: i64,
    init: RawVal,
    init_tag: u64,
) -> RawVal {
    const ENTRY: &str = "tarc_arrmake";
    let heap = unsafe { heap_mut(ENTRY, heap) };
    let init = or_abort(ENTRY, decode(init, init_tag));
    or_abort(ENTRY, heap.make(len, init)).to_raw()
}

/// Boxed array construction. Returns the payload of an `ArrayRef`.
///
/// # Safety
///
/// See [`tarc_heap_free`] for the requirements on `heap`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tarc_arrmake_boxed(
    heap: *mut ArrayHeap,
    len: i64,
    init: RawVal,
    init_tag: u64,
) -> RawVal {
    const ENTRY: &str = "tarc_arrmake_boxed";
    let heap = unsafe { heap_mut(ENTRY, heap) };
    let init = or_abort(ENTRY, decode(init, init_tag));
    or_abort(ENTRY, heap.make_boxed(len, init)).to_raw()
}

/// # Safety
///
/// See [`tarc_heap_free`] for the requirements on `heap`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tarc_arrget(
    heap: *mut ArrayHeap,
    arr: RawVal,
    arr_tag: u64,
    index: i64,
) -> TaggedWord {
    const ENTRY: &str = "tarc_arrget";
    let heap = unsafe { heap_mut(ENTRY, heap) };
    let arr = or_abort(ENTRY, decode(arr, arr_tag));
    or_abort(ENTRY, heap.get(arr, index)).into()
}

/// # Safety
///
/// See [`tarc_heap_free`] for the requirements on `heap`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tarc_arrset(
    heap: *mut ArrayHeap,
    arr: RawVal,
    arr_tag: u64,
    index: i64,
    value: RawVal,
    value_tag: u64,
) {
    const ENTRY: &str = "tarc_arrset";
    let heap = unsafe { heap_mut(ENTRY, heap) };
    let arr = or_abort(ENTRY, decode(arr, arr_tag));
    let value = or_abort(ENTRY, decode(value, value_tag));
    or_abort(ENTRY, heap.set(arr, index, value))
}

/// # Safety
///
/// See [`tarc_heap_free`] for the requirements on `heap`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tarc_arrlen(heap: *mut ArrayHeap, arr: RawVal, arr_tag: u64) -> i64 {
    const ENTRY: &str = "tarc_arrlen";
    let heap = unsafe { heap_mut(ENTRY, heap) };
    let arr = or_abort(ENTRY, decode(arr, arr_tag));
    or_abort(ENTRY, heap.len(arr)) as i64
}

/// # Safety
///
/// See [`tarc_heap_free`] for the requirements on `heap`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tarc_retain(heap: *mut ArrayHeap, v: RawVal, tag: u64) {
    const ENTRY: &str = "tarc_retain";
    let heap = unsafe { heap_mut(ENTRY, heap) };
    let v = or_abort(ENTRY, decode(v, tag));
    or_abort(ENTRY, heap.retain(v))
}

/// # Safety
///
/// See [`tarc_heap_free`] for the requirements on `heap`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tarc_release(heap: *mut ArrayHeap, v: RawVal, tag: u64) {
    const ENTRY: &str = "tarc_release";
    let heap = unsafe { heap_mut(ENTRY, heap) };
    let v = or_abort(ENTRY, decode(v, tag));
    or_abort(ENTRY, heap.release(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArrayRef;

    const INT: u64 = Tag::Int as u64;
    const ARR: u64 = Tag::ArrayRef as u64;

    #[test]
    fn boxed_roundtrip_through_raw_calls() {
        let heap = tarc_heap_new();
        unsafe {
            let a = tarc_arrmake_boxed(heap, 3, 0, INT);
            tarc_retain(heap, a, ARR);
            let b = tarc_arrmake(heap, 2, 7, INT);
            tarc_arrset(heap, a, ARR, 0, b, ARR);

            let elem = tarc_arrget(heap, a, ARR, 0);
            assert_eq!(elem, TaggedWord { payload: b, tag: ARR });
            assert_eq!(
                tarc_arrget(heap, b, ARR, 1).decode(),
                Ok(Value::Int(7))
            );
            assert_eq!(tarc_arrlen(heap, a, ARR), 3);
            assert_eq!((*heap).refcount(ArrayRef::from_raw(b)), Ok(1));

            tarc_release(heap, a, ARR);
            assert_eq!((*heap).live_count(), 0);
            tarc_heap_free(heap);
        }
    }

    #[test]
    fn tagged_word_rejects_unknown_tag() {
        let w = TaggedWord { payload: 1, tag: 5 };
        assert_eq!(w.decode(), Err(ErrorKind::InvalidTag(5)));
        assert_eq!(
            TaggedWord::from(Value::Int(-1)).decode(),
            Ok(Value::Int(-1))
        );
    }

    #[test]
    fn free_null_heap_is_noop() {
        unsafe { tarc_heap_free(std::ptr::null_mut()) };
    }
}
