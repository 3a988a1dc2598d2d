//! Fixed-width reads and writes in host byte order with an optional swap.
//!
//! Every frame format this crate handles stores numbers in the byte order of
//! the machine that wrote it. Readers take an explicit `swap` flag and apply
//! it to every multi-byte field of a call.

use std::io::{Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Result;

pub fn read_i32<R: Read>(r: &mut R, swap: bool) -> Result<i32> {
    let v = r.read_i32::<NativeEndian>()?;
    Ok(if swap { v.swap_bytes() } else { v })
}

pub fn read_u32<R: Read>(r: &mut R, swap: bool) -> Result<u32> {
    let v = r.read_u32::<NativeEndian>()?;
    Ok(if swap { v.swap_bytes() } else { v })
}

pub fn read_u16<R: Read>(r: &mut R, swap: bool) -> Result<u16> {
    let v = r.read_u16::<NativeEndian>()?;
    Ok(if swap { v.swap_bytes() } else { v })
}

pub fn read_f32<R: Read>(r: &mut R, swap: bool) -> Result<f32> {
    let bits = read_u32(r, swap)?;
    Ok(f32::from_bits(bits))
}

/// Fill `dst` with consecutive `f32` values.
pub fn read_f32_into<R: Read>(r: &mut R, swap: bool, dst: &mut [f32]) -> Result<()> {
    r.read_f32_into::<NativeEndian>(dst)?;
    if swap {
        for v in dst.iter_mut() {
            *v = f32::from_bits(v.to_bits().swap_bytes());
        }
    }
    Ok(())
}

/// Fill `dst` with consecutive `u16` values.
pub fn read_u16_into<R: Read>(r: &mut R, swap: bool, dst: &mut [u16]) -> Result<()> {
    r.read_u16_into::<NativeEndian>(dst)?;
    if swap {
        for v in dst.iter_mut() {
            *v = v.swap_bytes();
        }
    }
    Ok(())
}

/// Advance the stream by `nbytes` without keeping what was read.
pub fn skip_bytes<R: Read>(r: &mut R, nbytes: u64) -> Result<()> {
    let copied = std::io::copy(&mut r.by_ref().take(nbytes), &mut std::io::sink())?;
    if copied < nbytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("stream ended after {copied} of {nbytes} bytes"),
        )
        .into());
    }
    Ok(())
}

pub fn write_i32<W: Write>(w: &mut W, v: i32) -> Result<()> {
    w.write_i32::<NativeEndian>(v)?;
    Ok(())
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_u32::<NativeEndian>(v)?;
    Ok(())
}

pub fn write_f32<W: Write>(w: &mut W, v: f32) -> Result<()> {
    w.write_f32::<NativeEndian>(v)?;
    Ok(())
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> Result<()> {
    w.write_u16::<NativeEndian>(v)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Slice decoding for timing headers
// ---------------------------------------------------------------------------

/// Unsigned 32-bit value at `buf[off..off + 4]`.
pub(crate) fn u32_at(buf: &[u8], off: usize, swap: bool) -> u32 {
    let v = u32::from_ne_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
    if swap { v.swap_bytes() } else { v }
}

/// Unsigned 16-bit value at `buf[off..off + 2]`.
pub(crate) fn u16_at(buf: &[u8], off: usize, swap: bool) -> u16 {
    let v = u16::from_ne_bytes([buf[off], buf[off + 1]]);
    if swap { v.swap_bytes() } else { v }
}

/// Signed 16-bit value at `buf[off..off + 2]`.
pub(crate) fn i16_at(buf: &[u8], off: usize, swap: bool) -> i16 {
    u16_at(buf, off, swap) as i16
}
