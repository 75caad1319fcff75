//! Hash equi-join operator
//!
//! Block-at-a-time hash join. Up to `block_rows` left tuples are loaded into
//! a hash table keyed on the join field, then the whole right child is
//! probed against that block. When the right child runs out and more left
//! tuples remain, the right child is rewound and the next block is loaded.
//! Peak memory is one block; the right child is scanned once per block.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use super::predicate::{JoinPredicate, Op};
use super::{expect_children, Lookahead, Pull, TupleSource};
use crate::catalog::schema::TupleDesc;
use crate::config::DEFAULT_JOIN_BLOCK_ROWS;
use crate::error::{Error, Result};
use crate::storage::tuple::{Field, Tuple};

/// Joins two children on `left[i] = right[j]`.
///
/// Each output tuple is all left fields followed by all right fields.
pub struct HashEquiJoin {
    predicate: JoinPredicate,
    left: Box<dyn TupleSource>,
    right: Box<dyn TupleSource>,
    desc: Arc<TupleDesc>,
    block_rows: usize,
    /// Current block of left tuples, grouped by join key in arrival order
    block: HashMap<Field, Vec<Tuple>>,
    block_loaded: bool,
    left_exhausted: bool,
    /// Joined tuples for the right tuple being probed
    matches: VecDeque<Tuple>,
    cursor: Lookahead,
}

impl HashEquiJoin {
    pub fn new(
        predicate: JoinPredicate,
        left: Box<dyn TupleSource>,
        right: Box<dyn TupleSource>,
    ) -> Result<Self> {
        if predicate.op != Op::Equals {
            return Err(Error::InvalidArgument(format!(
                "hash join needs an equality predicate, got {}",
                predicate.op
            )));
        }
        let left_type = left.tuple_desc().field_type(predicate.left_field)?;
        let right_type = right.tuple_desc().field_type(predicate.right_field)?;
        if left_type != right_type {
            return Err(Error::SchemaMismatch {
                expected: left_type.to_string(),
                found: right_type.to_string(),
            });
        }

        let desc = Arc::new(TupleDesc::merge(left.tuple_desc(), right.tuple_desc()));
        Ok(Self {
            predicate,
            left,
            right,
            desc,
            block_rows: DEFAULT_JOIN_BLOCK_ROWS,
            block: HashMap::new(),
            block_loaded: false,
            left_exhausted: false,
            matches: VecDeque::new(),
            cursor: Lookahead::new(),
        })
    }

    /// Limit the number of left tuples buffered per block
    pub fn with_block_rows(mut self, rows: usize) -> Self {
        self.block_rows = rows.max(1);
        self
    }

    pub fn predicate(&self) -> &JoinPredicate {
        &self.predicate
    }

    /// Name of the left join field
    pub fn join_field1_name(&self) -> Option<&str> {
        self.left
            .tuple_desc()
            .field_name(self.predicate.left_field)
            .ok()
            .flatten()
    }

    /// Name of the right join field
    pub fn join_field2_name(&self) -> Option<&str> {
        self.right
            .tuple_desc()
            .field_name(self.predicate.right_field)
            .ok()
            .flatten()
    }

    /// Load the next block of left tuples. Returns false if there were none.
    fn load_block(&mut self) -> Result<bool> {
        self.block.clear();
        let mut loaded = 0;
        while loaded < self.block_rows {
            match self.left.next()? {
                Some(t) => {
                    let key = t.field(self.predicate.left_field)?.clone();
                    self.block.entry(key).or_default().push(t);
                    loaded += 1;
                }
                None => {
                    self.left_exhausted = true;
                    break;
                }
            }
        }

        self.block_loaded = loaded > 0;
        if self.block_loaded {
            debug!(rows = loaded, keys = self.block.len(), "loaded join block");
        }
        Ok(self.block_loaded)
    }

    fn reset_state(&mut self) {
        self.block.clear();
        self.block_loaded = false;
        self.left_exhausted = false;
        self.matches.clear();
    }
}

impl Pull for HashEquiJoin {
    fn lookahead(&mut self) -> &mut Lookahead {
        &mut self.cursor
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            if let Some(t) = self.matches.pop_front() {
                return Ok(Some(t));
            }

            if !self.block_loaded {
                if self.left_exhausted || !self.load_block()? {
                    return Ok(None);
                }
            }

            match self.right.next()? {
                Some(r) => {
                    let key = r.field(self.predicate.right_field)?;
                    if let Some(lefts) = self.block.get(key) {
                        for l in lefts {
                            self.matches.push_back(l.concat(&r, self.desc.clone()));
                        }
                    }
                }
                None => {
                    // Right side done with this block
                    self.block.clear();
                    self.block_loaded = false;
                    if self.left_exhausted {
                        return Ok(None);
                    }
                    self.right.rewind()?;
                }
            }
        }
    }
}

impl TupleSource for HashEquiJoin {
    fn open(&mut self) -> Result<()> {
        let (left, right) = (&mut self.left, &mut self.right);
        self.cursor.open_with(|| {
            left.open()?;
            right.open().map_err(|e| {
                left.close();
                e
            })
        })?;
        self.reset_state();
        Ok(())
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.reset_state();
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
        self.reset_state();
        self.left.rewind()?;
        self.right.rewind()
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn children(&self) -> Vec<&dyn TupleSource> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn with_children(
        self: Box<Self>,
        children: Vec<Box<dyn TupleSource>>,
    ) -> Result<Box<dyn TupleSource>> {
        let mut children = expect_children(children, 2, "HashEquiJoin")?;
        let right = children.remove(1);
        let left = children.remove(0);
        let join = HashEquiJoin::new(self.predicate, left, right)?.with_block_rows(self.block_rows);
        Ok(Box::new(join))
    }
}
