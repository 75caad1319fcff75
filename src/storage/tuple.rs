//! Field and Tuple types for HeapDB
//!
//! This module defines how values are represented in memory and how they are
//! laid out inside a page slot.

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use byteorder::{BigEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::catalog::schema::TupleDesc;
use crate::catalog::types::Type;
use crate::config::STRING_LEN;
use crate::error::{Error, Result};
use crate::executor::predicate::Op;
use crate::storage::page::RecordId;

/// A single typed value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    /// 32-bit integer value
    Int(i32),
    /// String value
    Str(String),
}

impl Field {
    /// Type of this value
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::Str(_) => Type::Str,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(s) => Some(s),
            Field::Int(_) => None,
        }
    }

    /// Compare `self op other`.
    ///
    /// `Like` is substring containment for strings and equality for integers.
    /// Values of different types never satisfy any operator.
    pub fn compare(&self, op: Op, other: &Field) -> bool {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => match op {
                Op::Equals | Op::Like => a == b,
                Op::NotEquals => a != b,
                Op::LessThan => a < b,
                Op::LessThanOrEq => a <= b,
                Op::GreaterThan => a > b,
                Op::GreaterThanOrEq => a >= b,
            },
            (Field::Str(a), Field::Str(b)) => match op {
                Op::Equals => a == b,
                Op::NotEquals => a != b,
                Op::LessThan => a < b,
                Op::LessThanOrEq => a <= b,
                Op::GreaterThan => a > b,
                Op::GreaterThanOrEq => a >= b,
                Op::Like => a.contains(b.as_str()),
            },
            _ => false,
        }
    }

    /// Write this value in its fixed-width page encoding
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Field::Int(v) => writer.write_i32::<BigEndian>(*v)?,
            Field::Str(s) => {
                let bytes = truncate_to_boundary(s, STRING_LEN).as_bytes();
                writer.write_u32::<BigEndian>(bytes.len() as u32)?;
                writer.write_all(bytes)?;
                writer.write_all(&[0u8; STRING_LEN][..STRING_LEN - bytes.len()])?;
            }
        }
        Ok(())
    }
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary
fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v)
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::Str(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::Str(v.to_string())
    }
}

/// A row: one slot per descriptor field plus an optional storage location.
///
/// Fields start unset and stay distinguishable from set fields until assigned.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Option<Field>>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Create a tuple with every field unset
    pub fn new(desc: Arc<TupleDesc>) -> Self {
        let fields = vec![None; desc.num_fields()];
        Self {
            desc,
            fields,
            record_id: None,
        }
    }

    /// Create a fully populated tuple, checking arity and types
    pub fn from_fields(desc: Arc<TupleDesc>, fields: Vec<Field>) -> Result<Self> {
        if fields.len() != desc.num_fields() {
            return Err(Error::InvalidArgument(format!(
                "descriptor has {} fields but {} values were given",
                desc.num_fields(),
                fields.len()
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            let expected = desc.field_type(i)?;
            if field.field_type() != expected {
                return Err(Error::SchemaMismatch {
                    expected: expected.to_string(),
                    found: field.field_type().to_string(),
                });
            }
        }
        Ok(Self {
            desc,
            fields: fields.into_iter().map(Some).collect(),
            record_id: None,
        })
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    /// Value of field `i`
    pub fn field(&self, i: usize) -> Result<&Field> {
        match self.fields.get(i) {
            Some(Some(field)) => Ok(field),
            Some(None) => Err(Error::FieldUnset(i)),
            None => Err(Error::NoSuchElement(format!("field index {}", i))),
        }
    }

    /// Value of field `i`, or `None` if out of range or unset
    pub fn get(&self, i: usize) -> Option<&Field> {
        self.fields.get(i).and_then(|f| f.as_ref())
    }

    /// Assign field `i`
    pub fn set_field(&mut self, i: usize, field: Field) -> Result<()> {
        let expected = self.desc.field_type(i)?;
        if field.field_type() != expected {
            return Err(Error::SchemaMismatch {
                expected: expected.to_string(),
                found: field.field_type().to_string(),
            });
        }
        self.fields[i] = Some(field);
        Ok(())
    }

    pub fn fields(&self) -> &[Option<Field>] {
        &self.fields
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Replace the descriptor with a type-compatible one (e.g. renamed fields)
    pub fn reset_desc(&mut self, desc: Arc<TupleDesc>) -> Result<()> {
        if *desc != *self.desc {
            return Err(Error::SchemaMismatch {
                expected: self.desc.to_string(),
                found: desc.to_string(),
            });
        }
        self.desc = desc;
        Ok(())
    }

    /// All of `self`'s fields followed by all of `other`'s, under `desc`
    pub fn concat(&self, other: &Tuple, desc: Arc<TupleDesc>) -> Tuple {
        let mut fields = Vec::with_capacity(self.fields.len() + other.fields.len());
        fields.extend(self.fields.iter().cloned());
        fields.extend(other.fields.iter().cloned());
        Tuple {
            desc,
            fields,
            record_id: None,
        }
    }

    /// Write this tuple in its fixed-width slot encoding
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        for (i, field) in self.fields.iter().enumerate() {
            match field {
                Some(f) => f.serialize(writer)?,
                None => {
                    return Err(Error::IllegalState(format!(
                        "cannot serialize tuple with unset field {}",
                        i
                    )))
                }
            }
        }
        Ok(())
    }

    /// Read one tuple described by `desc` from a slot encoding
    pub fn parse<R: Read>(desc: Arc<TupleDesc>, reader: &mut R) -> Result<Tuple> {
        let mut fields = Vec::with_capacity(desc.num_fields());
        for t in desc.types() {
            fields.push(Some(t.parse(reader)?));
        }
        Ok(Tuple {
            desc,
            fields,
            record_id: None,
        })
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.desc == other.desc && self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            match field {
                Some(v) => write!(f, "{}", v)?,
                None => write!(f, "null")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::named(vec![(Type::Int, "id"), (Type::Str, "name")]).unwrap())
    }

    #[test]
    fn test_field_compare_ints() {
        let a = Field::Int(3);
        let b = Field::Int(5);
        assert!(a.compare(Op::LessThan, &b));
        assert!(a.compare(Op::LessThanOrEq, &b));
        assert!(!a.compare(Op::GreaterThan, &b));
        assert!(a.compare(Op::NotEquals, &b));
        assert!(a.compare(Op::Equals, &Field::Int(3)));
        assert!(a.compare(Op::GreaterThanOrEq, &Field::Int(3)));
    }

    #[test]
    fn test_field_compare_strings() {
        let s = Field::from("database");
        assert!(s.compare(Op::Like, &Field::from("tab")));
        assert!(!s.compare(Op::Like, &Field::from("xyz")));
        assert!(s.compare(Op::GreaterThan, &Field::from("apple")));
    }

    #[test]
    fn test_field_compare_mismatched_types() {
        let a = Field::Int(1);
        let b = Field::from("1");
        assert!(!a.compare(Op::Equals, &b));
        assert!(!a.compare(Op::NotEquals, &b));
    }

    #[test]
    fn test_string_truncated_on_char_boundary() {
        let long: String = "é".repeat(100);
        let mut buf = Vec::new();
        Field::Str(long).serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), Type::Str.len());

        let parsed = Type::Str.parse(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(parsed.as_str().unwrap().chars().count(), 64);
    }

    #[test]
    fn test_unset_fields() {
        let mut t = Tuple::new(desc());
        assert!(matches!(t.field(0), Err(Error::FieldUnset(0))));
        assert!(matches!(t.field(5), Err(Error::NoSuchElement(_))));

        t.set_field(0, Field::Int(9)).unwrap();
        assert_eq!(t.field(0).unwrap(), &Field::Int(9));
        assert!(matches!(
            t.set_field(1, Field::Int(1)),
            Err(Error::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_from_fields_checks_arity() {
        let result = Tuple::from_fields(desc(), vec![Field::Int(1)]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_serialize_unset_fails() {
        let t = Tuple::new(desc());
        let mut buf = Vec::new();
        assert!(matches!(t.serialize(&mut buf), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_tuple_bytes_roundtrip() {
        let t = Tuple::from_fields(desc(), vec![Field::Int(42), Field::from("alice")]).unwrap();
        let mut buf = Vec::new();
        t.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), desc().size());

        let parsed = Tuple::parse(desc(), &mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(parsed, t);
    }

    #[test]
    fn test_concat_and_display() {
        let left = Tuple::from_fields(desc(), vec![Field::Int(1), Field::from("a")]).unwrap();
        let right = Tuple::from_fields(desc(), vec![Field::Int(1), Field::from("b")]).unwrap();
        let merged = Arc::new(TupleDesc::merge(&desc(), &desc()));
        let joined = left.concat(&right, merged);
        assert_eq!(joined.to_string(), "1\ta\t1\tb");
    }
}
