//! Minimal OER (Octet Encoding Rules) helpers used by the binary packet
//! codec: variable-length octet strings and variable-length unsigned
//! integers.

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;
use std::io::{Error, ErrorKind, Result};

const HIGH_BIT: u8 = 0x80;
const LOWER_SEVEN_BITS: u8 = 0x7f;

/// Minimum number of bytes needed to encode the value.
fn var_uint_size(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    std::cmp::max(1, (bits + 7) / 8)
}

pub trait ReadOerExt<'a> {
    fn read_var_octet_string(&mut self) -> Result<&'a [u8]>;
    fn read_var_uint(&mut self) -> Result<u64>;
}

impl<'a> ReadOerExt<'a> for &'a [u8] {
    fn read_var_octet_string(&mut self) -> Result<&'a [u8]> {
        let length = self.read_u8()?;
        let length = if length & HIGH_BIT != 0 {
            let length_of_length = (length & LOWER_SEVEN_BITS) as usize;
            if length_of_length == 0 || length_of_length > 8 {
                return Err(Error::new(ErrorKind::InvalidData, "bad length prefix"));
            }
            self.read_uint::<BigEndian>(length_of_length)? as usize
        } else {
            length as usize
        };
        if self.len() < length {
            return Err(Error::new(ErrorKind::UnexpectedEof, "buffer too small"));
        }
        let content = &self[..length];
        *self = &self[length..];
        Ok(content)
    }

    fn read_var_uint(&mut self) -> Result<u64> {
        let content = self.read_var_octet_string()?;
        if content.is_empty() || content.len() > 8 {
            return Err(Error::new(ErrorKind::InvalidData, "bad VarUInt length"));
        }
        let mut value = 0u64;
        for byte in content {
            value = (value << 8) | u64::from(*byte);
        }
        Ok(value)
    }
}

pub trait WriteOerExt: BufMut + Sized {
    fn put_var_octet_string(&mut self, content: &[u8]) {
        let length = content.len();
        if length < 128 {
            self.put_u8(length as u8);
        } else {
            let length_of_length = var_uint_size(length as u64);
            self.put_u8(HIGH_BIT | length_of_length as u8);
            self.put_uint_be(length as u64, length_of_length);
        }
        self.put_slice(content);
    }

    fn put_var_uint(&mut self, value: u64) {
        let size = var_uint_size(value);
        self.put_u8(size as u8);
        self.put_uint_be(value, size);
    }
}

impl<B: BufMut + Sized> WriteOerExt for B {}
