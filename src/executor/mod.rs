//! Query execution module
//!
//! Operators form a tree of [`TupleSource`] trait objects. The root is driven
//! with `has_next`/`next`; each operator pulls from its children on demand.

pub mod aggregate;
pub mod delete;
pub mod filter;
pub mod insert;
pub mod join;
pub mod predicate;
pub mod scan;
pub mod tuple_iter;

use std::sync::Arc;

use crate::catalog::schema::TupleDesc;
use crate::error::{Error, Result};
use crate::storage::tuple::Tuple;

pub use aggregate::{AggOp, Aggregate, Aggregator, IntegerAggregator, StringAggregator};
pub use delete::Delete;
pub use filter::Filter;
pub use insert::Insert;
pub use join::HashEquiJoin;
pub use predicate::{JoinPredicate, Op, Predicate};
pub use scan::SeqScan;
pub use tuple_iter::TupleIterator;

/// The pull-based iterator contract shared by every operator.
///
/// `open` must be called before `has_next`, `next` or `rewind`. Opening an
/// already open source is an error, as is pulling from a closed one.
pub trait TupleSource: Send {
    fn open(&mut self) -> Result<()>;

    fn close(&mut self);

    /// Whether another tuple is available
    fn has_next(&mut self) -> Result<bool>;

    /// The next tuple, or `None` at end of stream
    fn next(&mut self) -> Result<Option<Tuple>>;

    /// Restart from the first tuple
    fn rewind(&mut self) -> Result<()>;

    /// Output schema
    fn tuple_desc(&self) -> &Arc<TupleDesc>;

    fn children(&self) -> Vec<&dyn TupleSource>;

    /// Rebuild this node over new children
    fn with_children(
        self: Box<Self>,
        children: Vec<Box<dyn TupleSource>>,
    ) -> Result<Box<dyn TupleSource>>;
}

/// Drain a source into a vector. The source must already be open.
pub fn collect(source: &mut dyn TupleSource) -> Result<Vec<Tuple>> {
    let mut tuples = Vec::new();
    while let Some(t) = source.next()? {
        tuples.push(t);
    }
    Ok(tuples)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Unopened,
    Open,
    Closed,
}

/// Open/closed bookkeeping plus a one-tuple lookahead buffer
#[derive(Debug)]
pub(crate) struct Lookahead {
    state: CursorState,
    pending: Option<Tuple>,
}

impl Lookahead {
    pub(crate) fn new() -> Self {
        Self {
            state: CursorState::Unopened,
            pending: None,
        }
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        self.open_with(|| Ok(()))
    }

    /// Open once `open_inputs` succeeds. On failure the cursor keeps its
    /// previous state, so the operator can be opened again.
    pub(crate) fn open_with(&mut self, open_inputs: impl FnOnce() -> Result<()>) -> Result<()> {
        if self.state == CursorState::Open {
            return Err(Error::IllegalState("operator is already open".to_string()));
        }
        open_inputs()?;
        self.state = CursorState::Open;
        self.pending = None;
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.state = CursorState::Closed;
        self.pending = None;
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        match self.state {
            CursorState::Open => Ok(()),
            CursorState::Unopened => Err(Error::IllegalState("operator is not open".to_string())),
            CursorState::Closed => Err(Error::IllegalState("operator is closed".to_string())),
        }
    }

    /// Drop the buffered tuple, for rewinds
    pub(crate) fn reset(&mut self) -> Result<()> {
        self.check_open()?;
        self.pending = None;
        Ok(())
    }
}

/// Implements `has_next`/`next` on top of an operator's `fetch_next`
pub(crate) trait Pull {
    fn lookahead(&mut self) -> &mut Lookahead;

    /// Produce the next output tuple, or `None` when exhausted
    fn fetch_next(&mut self) -> Result<Option<Tuple>>;

    fn pull_has_next(&mut self) -> Result<bool> {
        self.lookahead().check_open()?;
        if self.lookahead().pending.is_none() {
            let next = self.fetch_next()?;
            self.lookahead().pending = next;
        }
        Ok(self.lookahead().pending.is_some())
    }

    fn pull_next(&mut self) -> Result<Option<Tuple>> {
        if !self.pull_has_next()? {
            return Ok(None);
        }
        Ok(self.lookahead().pending.take())
    }
}

/// Checks the child count handed to `with_children`
pub(crate) fn expect_children(
    children: Vec<Box<dyn TupleSource>>,
    expected: usize,
    operator: &str,
) -> Result<Vec<Box<dyn TupleSource>>> {
    if children.len() != expected {
        return Err(Error::InvalidArgument(format!(
            "{} takes {} children, got {}",
            operator,
            expected,
            children.len()
        )));
    }
    Ok(children)
}
