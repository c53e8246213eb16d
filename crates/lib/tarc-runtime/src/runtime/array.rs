//! Array operations called by generated code.
//!
//! Arguments and results are tagged [`Value`]s. Array arguments are values
//! too: passing an integer where an array is expected is reported as
//! [`ErrorKind::NotAnArray`].

use super::{
    ErrorKind,
    heap::{ArrayHeap, Elements, Layout},
};
use crate::value::{ArrayRef, Tag, Value};

fn expect_array(v: Value) -> Result<ArrayRef, ErrorKind> {
    match v {
        Value::Array(r) => Ok(r),
        Value::Int(i) => Err(ErrorKind::NotAnArray(i)),
    }
}

fn checked_index(index: i64, len: usize) -> Result<usize, ErrorKind> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(ErrorKind::IndexOutOfRange { index, len })
}

fn checked_length(len: i64) -> Result<usize, ErrorKind> {
    usize::try_from(len).map_err(|_| ErrorKind::NegativeLength(len))
}

fn filled<T: Clone>(len: usize, init: T) -> Result<Vec<T>, ErrorKind> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ErrorKind::AllocationFailed { len })?;
    v.resize(len, init);
    Ok(v)
}

impl ArrayHeap {
    fn check_live(&self, v: Value) -> Result<(), ErrorKind> {
        match v {
            Value::Array(r) => self.object(r).map(|_| ()),
            Value::Int(_) => Ok(()),
        }
    }

    /// Allocate a flat array of `len` copies of `init`. The array starts
    /// unretained.
    pub fn make(&mut self, len: i64, init: Value) -> Result<ArrayRef, ErrorKind> {
        let len = checked_length(len)?;
        let Value::Int(i) = init else {
            return Err(ErrorKind::FlatArrayRef);
        };
        let r = self.insert(Elements::Flat(filled(len, i)?));
        log::trace!("make: {r:?} flat, len {len}");
        Ok(r)
    }

    /// Allocate a boxed array of `len` copies of `init`. When `init` is an
    /// array it is retained once per element.
    pub fn make_boxed(&mut self, len: i64, init: Value) -> Result<ArrayRef, ErrorKind> {
        let len = checked_length(len)?;
        self.check_live(init)?;
        let r = self.insert(Elements::Boxed(filled(len, init)?));
        log::trace!("make_boxed: {r:?} len {len}, init {init}");
        for _ in 0..len {
            self.retain(init)?;
        }
        Ok(r)
    }

    /// Flat array literal `[a, b, ...]`.
    pub fn make_from_ints(&mut self, ints: Vec<i64>) -> ArrayRef {
        let r = self.insert(Elements::Flat(ints));
        log::trace!("make_from_ints: {r:?}");
        r
    }

    /// Boxed array literal `{a, b, ...}`. Each array element is retained once.
    pub fn make_boxed_from(&mut self, values: Vec<Value>) -> Result<ArrayRef, ErrorKind> {
        values.iter().try_for_each(|v| self.check_live(*v))?;
        let r = self.insert(Elements::Boxed(values.clone()));
        log::trace!("make_boxed_from: {r:?} len {}", values.len());
        for v in values {
            self.retain(v)?;
        }
        Ok(r)
    }

    /// Read the element at `index` together with its tag. The element is not
    /// retained.
    pub fn get(&self, array: Value, index: i64) -> Result<Value, ErrorKind> {
        let obj = self.object(expect_array(array)?)?;
        let i = checked_index(index, obj.len())?;
        Ok(obj.elements.load(i))
    }

    /// Overwrite the element at `index`.
    ///
    /// Overwriting an element with an identical value does nothing. Otherwise
    /// the old element is released and the new one retained. When both are
    /// array references the new one is retained first, so an array that was
    /// only reachable through the old element stays alive.
    pub fn set(&mut self, array: Value, index: i64, value: Value) -> Result<(), ErrorKind> {
        let r = expect_array(array)?;
        let obj = self.object(r)?;
        let i = checked_index(index, obj.len())?;
        let old = obj.elements.load(i);
        if old == value {
            return Ok(());
        }
        if obj.layout() == Layout::Flat && value.tag() == Tag::ArrayRef {
            return Err(ErrorKind::FlatArrayRef);
        }
        self.check_live(old)?;
        self.check_live(value)?;

        let swap_refs = old.tag() == Tag::ArrayRef && value.tag() == Tag::ArrayRef;
        if swap_refs {
            self.retain(value)?;
        }
        self.release(old)?;
        let Some(obj) = self.storage.get_mut(r) else {
            // the array was only reachable through the element being replaced
            log::trace!("set: {r:?} was freed by releasing its own element");
            if swap_refs {
                self.release(value)?;
            }
            return Ok(());
        };
        obj.elements.store(i, value);
        if !swap_refs {
            self.retain(value)?;
        }
        Ok(())
    }

    /// Number of elements of `array`.
    pub fn len(&self, array: Value) -> Result<usize, ErrorKind> {
        self.object(expect_array(array)?).map(|obj| obj.len())
    }
}
