//! Data types for HeapDB
//!
//! This module defines the field types a tuple descriptor can carry and how
//! each type is laid out on a page.

use std::fmt;
use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::config::STRING_LEN;
use crate::error::{Error, Result};
use crate::storage::tuple::Field;

/// Field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// 32-bit signed integer
    Int,
    /// Fixed-width string of at most `STRING_LEN` bytes
    Str,
}

impl Type {
    /// Serialized width of a value of this type, in bytes.
    ///
    /// A string is a 4-byte length prefix followed by `STRING_LEN` bytes of
    /// zero-padded payload.
    pub fn len(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Str => STRING_LEN + 4,
        }
    }

    /// Read one value of this type from a big-endian byte stream
    pub fn parse<R: Read>(&self, reader: &mut R) -> Result<Field> {
        match self {
            Type::Int => Ok(Field::Int(reader.read_i32::<BigEndian>()?)),
            Type::Str => {
                let len = reader.read_u32::<BigEndian>()? as usize;
                let mut payload = [0u8; STRING_LEN];
                reader.read_exact(&mut payload)?;
                if len > STRING_LEN {
                    return Err(Error::Corrupted(format!(
                        "string length {} exceeds {}",
                        len, STRING_LEN
                    )));
                }
                let s = std::str::from_utf8(&payload[..len])
                    .map_err(|e| Error::Corrupted(format!("invalid utf-8 in string: {}", e)))?;
                Ok(Field::Str(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::Str => write!(f, "STRING"),
        }
    }
}
