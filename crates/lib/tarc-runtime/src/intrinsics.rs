//! Scalar I/O and byte-string helpers.
//!
//! These live outside the reference-counted array model: strings are plain
//! byte buffers and every buffer returned here is owned by the caller.

use std::{
    cmp::Ordering,
    io::{BufRead, Write},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("index {index} is out of range for a string of length {len}")]
    OutOfRange { index: i64, len: usize },
    #[error("expected an integer, got {0:?}")]
    NotAnInteger(String),
    #[error("unexpected end of input")]
    EndOfInput,
}

fn checked_pos(index: i64, len: usize) -> Result<usize, Error> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i <= len)
        .ok_or(Error::OutOfRange { index, len })
}

/// Print an integer on its own line.
pub fn write(out: &mut impl Write, v: i64) -> Result<(), Error> {
    writeln!(out, "{v}")?;
    Ok(())
}

/// Prompt with `"> "` and read one integer from the next non-empty line.
pub fn read(input: &mut impl BufRead, prompt: &mut impl Write) -> Result<i64, Error> {
    write!(prompt, "> ")?;
    prompt.flush()?;
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(Error::EndOfInput);
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return trimmed
                .parse()
                .map_err(|_| Error::NotAnInteger(trimmed.to_string()));
        }
    }
}

/// `n` copies of `c`.
pub fn strmake(n: usize, c: u8) -> Vec<u8> {
    vec![c; n]
}

pub fn strdup(s: &[u8]) -> Vec<u8> {
    s.to_vec()
}

pub fn strlen(s: &[u8]) -> usize {
    s.len()
}

/// Lexicographic comparison returning -1, 0 or 1.
pub fn strcmp(a: &[u8], b: &[u8]) -> i64 {
    match a.cmp(b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

pub fn strget(s: &[u8], i: i64) -> Result<u8, Error> {
    let len = s.len();
    usize::try_from(i)
        .ok()
        .and_then(|i| s.get(i).copied())
        .ok_or(Error::OutOfRange { index: i, len })
}

pub fn strset(s: &mut [u8], i: i64, c: u8) -> Result<(), Error> {
    let len = s.len();
    let slot = usize::try_from(i)
        .ok()
        .and_then(|i| s.get_mut(i))
        .ok_or(Error::OutOfRange { index: i, len })?;
    *slot = c;
    Ok(())
}

/// The `n` bytes of `s` starting at `from`.
pub fn strsub(s: &[u8], from: i64, n: i64) -> Result<Vec<u8>, Error> {
    let start = checked_pos(from, s.len())?;
    let end = checked_pos(from.saturating_add(n), s.len())?;
    if end < start {
        return Err(Error::OutOfRange {
            index: n,
            len: s.len() - start,
        });
    }
    Ok(s[start..end].to_vec())
}

pub fn strcat(a: &[u8], b: &[u8]) -> Vec<u8> {
    [a, b].concat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test(unsupported = test)]
    fn write_then_read_back() {
        let mut out = vec![];
        write(&mut out, -12).unwrap();
        write(&mut out, 7).unwrap();
        assert_eq!(out, b"-12\n7\n");

        let mut prompt = vec![];
        let mut input = &b"\n  42 \n9\n"[..];
        assert_eq!(read(&mut input, &mut prompt).unwrap(), 42);
        assert_eq!(read(&mut input, &mut prompt).unwrap(), 9);
        assert!(matches!(
            read(&mut input, &mut prompt),
            Err(Error::EndOfInput)
        ));
        assert_eq!(prompt, b"> > > ");
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn read_rejects_garbage() {
        let mut input = &b"abc\n"[..];
        let err = read(&mut input, &mut std::io::sink()).unwrap_err();
        assert!(matches!(err, Error::NotAnInteger(s) if s == "abc"));
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn string_helpers() {
        let s = strmake(3, b'x');
        assert_eq!(s, b"xxx");
        assert_eq!(strlen(&s), 3);
        assert_eq!(strcat(b"ab", b"cd"), b"abcd");
        assert_eq!(strdup(b"hi"), b"hi");
        assert_eq!(strcmp(b"abc", b"abd"), -1);
        assert_eq!(strcmp(b"abc", b"abc"), 0);
        assert_eq!(strcmp(b"b", b"abc"), 1);
        assert_eq!(strsub(b"hello", 1, 3).unwrap(), b"ell");
        assert_eq!(strsub(b"hello", 5, 0).unwrap(), b"");
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn string_bounds_are_checked() {
        let mut s = strdup(b"abc");
        strset(&mut s, 1, b'z').unwrap();
        assert_eq!(s, b"azc");
        assert_eq!(strget(&s, 2).unwrap(), b'c');
        assert!(matches!(
            strget(&s, 3),
            Err(Error::OutOfRange { index: 3, len: 3 })
        ));
        assert!(strset(&mut s, -1, b'q').is_err());
        assert!(strsub(b"abc", 2, 5).is_err());
        assert!(strsub(b"abc", 1, -1).is_err());
    }
}
