//! In-memory tuple source

use std::sync::Arc;

use super::{expect_children, Lookahead, Pull, TupleSource};
use crate::catalog::schema::TupleDesc;
use crate::error::{Error, Result};
use crate::storage::tuple::Tuple;

/// Serves a fixed list of tuples. Used for aggregate results and as a leaf
/// when tuples come from outside a table.
#[derive(Debug)]
pub struct TupleIterator {
    desc: Arc<TupleDesc>,
    tuples: Vec<Tuple>,
    position: usize,
    cursor: Lookahead,
}

impl TupleIterator {
    /// Every tuple must match `desc`
    pub fn new(desc: Arc<TupleDesc>, tuples: Vec<Tuple>) -> Result<Self> {
        if let Some(bad) = tuples.iter().find(|t| **t.tuple_desc() != *desc) {
            return Err(Error::SchemaMismatch {
                expected: desc.to_string(),
                found: bad.tuple_desc().to_string(),
            });
        }
        Ok(Self {
            desc,
            tuples,
            position: 0,
            cursor: Lookahead::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

impl Pull for TupleIterator {
    fn lookahead(&mut self) -> &mut Lookahead {
        &mut self.cursor
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let next = self.tuples.get(self.position).cloned();
        if next.is_some() {
            self.position += 1;
        }
        Ok(next)
    }
}

impl TupleSource for TupleIterator {
    fn open(&mut self) -> Result<()> {
        self.cursor.open()?;
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.cursor.close();
    }

    fn has_next(&mut self) -> Result<bool> {
        self.pull_has_next()
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        self.pull_next()
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor.reset()?;
        self.position = 0;
        Ok(())
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn children(&self) -> Vec<&dyn TupleSource> {
        Vec::new()
    }

    fn with_children(
        self: Box<Self>,
        children: Vec<Box<dyn TupleSource>>,
    ) -> Result<Box<dyn TupleSource>> {
        expect_children(children, 0, "TupleIterator")?;
        Ok(self)
    }
}
