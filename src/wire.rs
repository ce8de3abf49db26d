//! Shared big-endian wire helpers.
//!
//! `pkg/crypto`'s own `parsing` crate builds record codecs on a generic
//! parser-combinator DSL (`parser!`/`seq!`, used throughout
//! `pkg/crypto/src/tls/*.rs` via `tls_struct!`/`tls_enum_u8!` in
//! `macros.rs`) tuned for TLS's record shape. DTLS's header uses fields the
//! combinator macros don't have built-ins for (48-bit sequence numbers,
//! 24-bit fragment offsets/lengths), so this crate writes the handful of
//! codecs it needs directly — in the same manual style
//! `pkg/crypto/src/tls/record.rs` already uses for `Record::read`/
//! `serialize` instead of the macro DSL.

use bytes::{Buf, Bytes};

use crate::error::{Error, ErrorKind, Result};

pub const U8_LIMIT: usize = u8::MAX as usize;
pub const U16_LIMIT: usize = u16::MAX as usize;
pub const U24_LIMIT: usize = 1 << 24;

pub fn need(buf: &[u8], n: usize) -> Result<()> {
    if buf.len() < n {
        return Err(Error::with_message(
            ErrorKind::Malformed,
            format_args!("expected at least {} bytes, got {}", n, buf.len()),
        ));
    }
    Ok(())
}

pub fn read_u8(buf: &mut Bytes) -> Result<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn read_u16(buf: &mut Bytes) -> Result<u16> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

pub fn read_u24(buf: &mut Bytes) -> Result<u32> {
    need(buf, 3)?;
    let v = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32);
    buf.advance(3);
    Ok(v)
}

pub fn read_u32(buf: &mut Bytes) -> Result<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

pub fn read_u48(buf: &mut Bytes) -> Result<u64> {
    need(buf, 6)?;
    let mut v = 0u64;
    for i in 0..6 {
        v = (v << 8) | buf[i] as u64;
    }
    buf.advance(6);
    Ok(v)
}

pub fn read_bytes(buf: &mut Bytes, n: usize) -> Result<Bytes> {
    need(buf, n)?;
    Ok(buf.split_to(n))
}

/// Reads a length-prefixed vector where the prefix is 1, 2 or 3 bytes wide
/// depending on `max_bytes` — the TLS/DTLS "vector" convention.
pub fn read_varlen(buf: &mut Bytes, min_bytes: usize, max_bytes: usize) -> Result<Bytes> {
    let len = if max_bytes <= U8_LIMIT {
        read_u8(buf)? as usize
    } else if max_bytes <= U16_LIMIT {
        read_u16(buf)? as usize
    } else if max_bytes <= U24_LIMIT {
        read_u24(buf)? as usize
    } else {
        return Err(Error::new(ErrorKind::InternalError));
    };
    if len < min_bytes || len > max_bytes {
        return Err(Error::with_message(ErrorKind::Malformed, "vector length out of allowed range"));
    }
    read_bytes(buf, len)
}

pub fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_u24(out: &mut Vec<u8>, v: u32) {
    out.push(((v >> 16) & 0xff) as u8);
    out.push(((v >> 8) & 0xff) as u8);
    out.push((v & 0xff) as u8);
}

pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_u48(out: &mut Vec<u8>, v: u64) {
    for shift in [40, 32, 24, 16, 8, 0] {
        out.push(((v >> shift) & 0xff) as u8);
    }
}

/// Serializes `f`'s output behind a length prefix of the same variable
/// width `read_varlen` would expect.
pub fn write_varlen<F: FnOnce(&mut Vec<u8>)>(
    out: &mut Vec<u8>,
    min_bytes: usize,
    max_bytes: usize,
    f: F,
) {
    let prefix_len = if max_bytes <= U8_LIMIT {
        1
    } else if max_bytes <= U16_LIMIT {
        2
    } else {
        3
    };
    let start = out.len();
    out.resize(start + prefix_len, 0);
    let body_start = out.len();
    f(out);
    let size = out.len() - body_start;
    debug_assert!(size >= min_bytes && size <= max_bytes);
    match prefix_len {
        1 => out[start] = size as u8,
        2 => out[start..start + 2].copy_from_slice(&(size as u16).to_be_bytes()),
        3 => {
            out[start] = ((size >> 16) & 0xff) as u8;
            out[start + 1] = ((size >> 8) & 0xff) as u8;
            out[start + 2] = (size & 0xff) as u8;
        }
        _ => unreachable!(),
    }
}
