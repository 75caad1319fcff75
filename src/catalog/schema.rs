//! Tuple descriptors for HeapDB
//!
//! A [`TupleDesc`] is the ordered list of (type, optional name) pairs that
//! every tuple, page and operator output is described by.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::types::Type;
use crate::error::{Error, Result};

/// One field of a tuple descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TdItem {
    /// Field type
    pub field_type: Type,
    /// Field name, if any. Duplicates are allowed.
    pub field_name: Option<String>,
}

impl TdItem {
    pub fn new(field_type: Type, field_name: Option<String>) -> Self {
        Self {
            field_type,
            field_name,
        }
    }
}

impl fmt::Display for TdItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field_name {
            Some(name) => write!(f, "{}({})", self.field_type, name),
            None => write!(f, "{}(null)", self.field_type),
        }
    }
}

/// Schema of a tuple
///
/// Equality and hashing only consider the number of fields and their types;
/// names are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    /// Build a descriptor from parallel type and name sequences
    pub fn new(types: Vec<Type>, names: Vec<Option<String>>) -> Result<Self> {
        if types.is_empty() {
            return Err(Error::InvalidArgument(
                "a tuple descriptor needs at least one field".to_string(),
            ));
        }
        if types.len() != names.len() {
            return Err(Error::InvalidArgument(format!(
                "{} types but {} names",
                types.len(),
                names.len()
            )));
        }

        let items = types
            .into_iter()
            .zip(names)
            .map(|(t, n)| TdItem::new(t, n))
            .collect();
        Ok(Self { items })
    }

    /// Build a descriptor with anonymous fields
    pub fn from_types(types: Vec<Type>) -> Result<Self> {
        let names = vec![None; types.len()];
        Self::new(types, names)
    }

    /// Build a descriptor where every field is named
    pub fn named<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Type, S)>,
        S: Into<String>,
    {
        let (types, names): (Vec<_>, Vec<_>) = fields
            .into_iter()
            .map(|(t, n)| (t, Some(n.into())))
            .unzip();
        Self::new(types, names)
    }

    /// Build from items the caller guarantees to be non-empty
    pub(crate) fn from_items(items: Vec<TdItem>) -> Self {
        debug_assert!(!items.is_empty());
        Self { items }
    }

    /// Concatenate two descriptors, `a`'s fields first
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> TupleDesc {
        let mut items = Vec::with_capacity(a.items.len() + b.items.len());
        items.extend(a.items.iter().cloned());
        items.extend(b.items.iter().cloned());
        TupleDesc { items }
    }

    /// Copy of this descriptor with every named field renamed to
    /// `alias.name`. Anonymous fields stay anonymous.
    pub fn with_prefix(&self, alias: &str) -> TupleDesc {
        let items = self
            .items
            .iter()
            .map(|item| TdItem {
                field_type: item.field_type,
                field_name: item
                    .field_name
                    .as_ref()
                    .map(|name| format!("{}.{}", alias, name)),
            })
            .collect();
        TupleDesc { items }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[TdItem] {
        &self.items
    }

    /// Name of field `i`
    pub fn field_name(&self, i: usize) -> Result<Option<&str>> {
        self.items
            .get(i)
            .map(|item| item.field_name.as_deref())
            .ok_or_else(|| Error::NoSuchElement(format!("field index {}", i)))
    }

    /// Type of field `i`
    pub fn field_type(&self, i: usize) -> Result<Type> {
        self.items
            .get(i)
            .map(|item| item.field_type)
            .ok_or_else(|| Error::NoSuchElement(format!("field index {}", i)))
    }

    /// Index of the first field called `name`
    pub fn field_name_to_index(&self, name: &str) -> Result<usize> {
        self.items
            .iter()
            .position(|item| item.field_name.as_deref() == Some(name))
            .ok_or_else(|| Error::FieldNameNotFound(name.to_string()))
    }

    /// Types of all fields, in order
    pub fn types(&self) -> impl Iterator<Item = Type> + '_ {
        self.items.iter().map(|item| item.field_type)
    }

    /// Fixed byte width of a tuple with this schema
    pub fn size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.len()).sum()
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len() && self.types().eq(other.types())
    }
}

impl Eq for TupleDesc {}

impl Hash for TupleDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for t in self.types() {
            t.hash(state);
        }
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}
