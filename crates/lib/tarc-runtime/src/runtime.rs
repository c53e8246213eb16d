use crate::{
    utils::{error::ReportableError, metadata::Location},
    value::ArrayRef,
};
use thiserror::Error;

pub mod array;
pub mod display;
pub mod ffi;
pub mod heap;
pub mod rooted;

/// Contract violations reported by the array runtime.
///
/// Every operation that fails with one of these leaves the heap unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("cannot store an array reference in a flat array")]
    FlatArrayRef,
    #[error("index {index} is out of range for an array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("array length must not be negative, got {0}")]
    NegativeLength(i64),
    #[error("cannot allocate an array of {len} elements")]
    AllocationFailed { len: usize },
    #[error("array {0:?} has already been freed")]
    Dangling(ArrayRef),
    #[error("expected an array, found the integer {0}")]
    NotAnArray(i64),
    #[error("invalid tag {0}")]
    InvalidTag(u64),
}

#[derive(Debug, Error)]
#[error("Runtime Error: {0}")]
pub struct RuntimeError(pub ErrorKind, pub Location);

impl ReportableError for RuntimeError {
    fn get_labels(&self) -> Vec<(Location, String)> {
        vec![(self.1.clone(), self.0.to_string())]
    }
}
