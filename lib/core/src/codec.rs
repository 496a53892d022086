//! Big-endian wire helpers shared by the matrix and estimator formats.
//!
//! Every read checks the remaining length first, so a truncated buffer
//! surfaces as [`Error::Decode`] instead of a panic inside `bytes`.

use crate::{Error, Result};
use bytes::{Buf, BufMut};

pub fn get_u32<B: Buf>(buf: &mut B, what: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(truncated(what, 4, buf.remaining()));
    }
    Ok(buf.get_u32())
}

pub fn get_f64<B: Buf>(buf: &mut B, what: &str) -> Result<f64> {
    if buf.remaining() < 8 {
        return Err(truncated(what, 8, buf.remaining()));
    }
    Ok(buf.get_f64())
}

/// Write a `u32` length followed by the raw bytes
pub fn put_blob<B: BufMut>(buf: &mut B, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

pub fn get_blob<B: Buf>(buf: &mut B, what: &str) -> Result<Vec<u8>> {
    let len = get_u32(buf, what)? as usize;
    if buf.remaining() < len {
        return Err(truncated(what, len, buf.remaining()));
    }
    let mut data = vec![0u8; len];
    buf.copy_to_slice(&mut data);
    Ok(data)
}

pub fn put_string<B: BufMut>(buf: &mut B, value: &str) {
    put_blob(buf, value.as_bytes());
}

pub fn get_string<B: Buf>(buf: &mut B, what: &str) -> Result<String> {
    let data = get_blob(buf, what)?;
    String::from_utf8(data).map_err(|e| Error::Decode(format!("{}: {}", what, e)))
}

fn truncated(what: &str, needed: usize, remaining: usize) -> Error {
    Error::Decode(format!(
        "truncated buffer reading {}: needed {} bytes, {} left",
        what, needed, remaining
    ))
}
