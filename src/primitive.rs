//! Low-level big-endian integer/byte helpers shared by the value codec and
//! the handshake. Mirrors the read/write helper style of a wire-protocol
//! primitive module, but big-endian throughout (the wire format here is
//! PackStream-like, not MySQL's little-endian wire format).

use crate::error::{Error, Result};
use zerocopy::byteorder::big_endian::{U16 as U16BE, U32 as U32BE, U64 as U64BE};
use zerocopy::FromBytes;

pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    if data.is_empty() {
        return Err(Error::protocol("unexpected end of input reading u8"));
    }
    Ok((data[0], &data[1..]))
}

pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    if data.len() < 2 {
        return Err(Error::protocol("unexpected end of input reading u16"));
    }
    let value = U16BE::ref_from_bytes(&data[..2])
        .map_err(Error::from_debug)?
        .get();
    Ok((value, &data[2..]))
}

pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::protocol("unexpected end of input reading u32"));
    }
    let value = U32BE::ref_from_bytes(&data[..4])
        .map_err(Error::from_debug)?
        .get();
    Ok((value, &data[4..]))
}

pub fn read_u64(data: &[u8]) -> Result<(u64, &[u8])> {
    if data.len() < 8 {
        return Err(Error::protocol("unexpected end of input reading u64"));
    }
    let value = U64BE::ref_from_bytes(&data[..8])
        .map_err(Error::from_debug)?
        .get();
    Ok((value, &data[8..]))
}

pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::protocol("unexpected end of input reading bytes"));
    }
    Ok(data.split_at(len))
}

pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_bits().to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_ints() {
        let mut out = Vec::new();
        write_u32(&mut out, 0xDEAD_BEEF);
        let (v, rest) = read_u32(&out).unwrap();
        assert_eq!(v, 0xDEAD_BEEF);
        assert!(rest.is_empty());
    }

    #[test]
    fn short_input_is_protocol_error() {
        assert!(read_u32(&[0, 1]).is_err());
    }
}
