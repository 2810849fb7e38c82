//! This module defines serializable types over the network.
//!
//! Every multi-byte integer is big-endian. Strings are UTF-8 with a
//! one-byte length prefix, so no string on the wire may exceed 255
//! bytes. Lists carry a two-byte count prefix.

use crate::errors::*;

use std::io::{self, prelude::*};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Something that can be read from a buffer.
pub trait Readable: Sized {
    fn read_from<T: io::Read>(buf: &mut T) -> ChessdResult<Self>;
}

/// Something that can be written to a buffer.
pub trait Writable: Sized {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> ChessdResult<()>;
}

// ---- Bool ---------------

pub type Bool = bool;

impl Readable for Bool {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> ChessdResult<Self> {
        Ok(buf.read_u8()? == 0x01)
    }
}

impl Writable for Bool {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> ChessdResult<()> {
        Ok(buf.write_u8(if *self { 0x01 } else { 0x00 })?)
    }
}

// ---- Unsigned Byte ------

pub type UnsignedByte = u8;

impl Readable for UnsignedByte {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> ChessdResult<Self> {
        Ok(buf.read_u8()?)
    }
}

impl Writable for UnsignedByte {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> ChessdResult<()> {
        Ok(buf.write_u8(*self)?)
    }
}

// ---- Unsigned Short -----

pub type UnsignedShort = u16;

impl Readable for UnsignedShort {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> ChessdResult<Self> {
        Ok(buf.read_u16::<BigEndian>()?)
    }
}

impl Writable for UnsignedShort {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> ChessdResult<()> {
        Ok(buf.write_u16::<BigEndian>(*self)?)
    }
}

// ---- String -------------

/// Longest string a one-byte length prefix can carry.
pub const MAX_STRING_LEN: usize = 255;

impl Readable for String {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> ChessdResult<Self> {
        let len = buf.read_u8()? as usize;
        let mut bytes = vec![0; len];
        buf.read_exact(&mut bytes)?;
        Ok(Self::from_utf8(bytes)?)
    }
}

impl Writable for String {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> ChessdResult<()> {
        let bytes = self.as_bytes();
        if bytes.len() > MAX_STRING_LEN {
            return Err(Error::PayloadTooLarge(bytes.len()));
        }
        buf.write_u8(bytes.len() as u8)?;
        Ok(buf.write_all(bytes)?)
    }
}

// ---- Lists --------------

impl<C: Readable> Readable for Vec<C> {
    fn read_from<T: io::Read>(buf: &mut T) -> ChessdResult<Self> {
        let len = buf.read_u16::<BigEndian>()? as usize;
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            data.push(C::read_from(buf)?);
        }
        Ok(data)
    }
}

impl<C: Writable> Writable for Vec<C> {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> ChessdResult<()> {
        if self.len() > u16::max_value() as usize {
            return Err(Error::PayloadTooLarge(self.len()));
        }
        buf.write_u16::<BigEndian>(self.len() as u16)?;
        for i in self {
            i.write_to(buf)?;
        }
        Ok(())
    }
}
