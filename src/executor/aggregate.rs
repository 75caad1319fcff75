//! Grouped aggregation
//!
//! An [`Aggregator`] folds tuples into one running accumulator per group.
//! The [`Aggregate`] operator drains its child into an aggregator when it is
//! opened and then serves the finished groups. Groups come out in the order
//! their keys were first seen.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tuple_iter::TupleIterator;
use super::{expect_children, Lookahead, Pull, TupleSource};
use crate::catalog::schema::{TdItem, TupleDesc};
use crate::catalog::types::Type;
use crate::error::{Error, Result};
use crate::storage::tuple::{Field, Tuple};

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggOp::Min => "MIN",
            AggOp::Max => "MAX",
            AggOp::Sum => "SUM",
            AggOp::Avg => "AVG",
            AggOp::Count => "COUNT",
        };
        write!(f, "{}", s)
    }
}

/// Folds tuples into per-group results
pub trait Aggregator: Send {
    /// Add one tuple to its group's accumulator
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()>;

    /// One tuple per group: `[group, value]`, or `[value]` when ungrouped
    fn results(&self) -> Result<TupleIterator>;

    /// Schema of the result tuples
    fn output_desc(&self) -> &Arc<TupleDesc>;

    /// Forget every group
    fn clear(&mut self);
}

fn output_desc_for(group: Option<(usize, Type)>) -> Arc<TupleDesc> {
    let mut items = Vec::with_capacity(2);
    if let Some((_, group_type)) = group {
        items.push(TdItem::new(group_type, None));
    }
    items.push(TdItem::new(Type::Int, None));
    Arc::new(TupleDesc::from_items(items))
}

fn group_key(group: Option<(usize, Type)>, tuple: &Tuple) -> Result<Option<Field>> {
    group
        .map(|(index, _)| tuple.field(index).cloned())
        .transpose()
}

fn result_tuple(desc: &Arc<TupleDesc>, key: &Option<Field>, value: Option<i64>) -> Result<Tuple> {
    let mut t = Tuple::new(desc.clone());
    let mut index = 0;
    if let Some(k) = key {
        t.set_field(0, k.clone())?;
        index = 1;
    }
    if let Some(v) = value {
        let v = i32::try_from(v).map_err(|_| {
            Error::InvalidArgument(format!("aggregate value {} does not fit in INT", v))
        })?;
        t.set_field(index, Field::Int(v))?;
    }
    Ok(t)
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    value: i64,
    count: i64,
}

/// Aggregates an INT field with any [`AggOp`]
#[derive(Debug)]
pub struct IntegerAggregator {
    group: Option<(usize, Type)>,
    agg_field: usize,
    op: AggOp,
    desc: Arc<TupleDesc>,
    groups: IndexMap<Option<Field>, Accumulator>,
}

impl IntegerAggregator {
    /// `group` is the group-by field index and type, or `None` for a single
    /// ungrouped result
    pub fn new(group: Option<(usize, Type)>, agg_field: usize, op: AggOp) -> Self {
        Self {
            group,
            agg_field,
            op,
            desc: output_desc_for(group),
            groups: IndexMap::new(),
        }
    }

    fn finish(&self, acc: &Accumulator) -> i64 {
        match self.op {
            AggOp::Count => acc.count,
            AggOp::Avg => acc.value / acc.count,
            AggOp::Min | AggOp::Max | AggOp::Sum => acc.value,
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()> {
        let key = group_key(self.group, tuple)?;
        let field = tuple.field(self.agg_field)?;
        let value = field.as_int().ok_or_else(|| Error::SchemaMismatch {
            expected: Type::Int.to_string(),
            found: field.field_type().to_string(),
        })? as i64;

        let op = self.op;
        self.groups
            .entry(key)
            .and_modify(|acc| {
                acc.count += 1;
                match op {
                    AggOp::Min => acc.value = acc.value.min(value),
                    AggOp::Max => acc.value = acc.value.max(value),
                    AggOp::Sum | AggOp::Avg => acc.value += value,
                    AggOp::Count => {}
                }
            })
            .or_insert(Accumulator { value, count: 1 });
        Ok(())
    }

    fn results(&self) -> Result<TupleIterator> {
        let mut tuples = Vec::with_capacity(self.groups.len().max(1));
        for (key, acc) in &self.groups {
            tuples.push(result_tuple(&self.desc, key, Some(self.finish(acc)))?);
        }

        // Ungrouped aggregates always produce one row. Only COUNT and SUM
        // have a value over no input.
        if self.group.is_none() && self.groups.is_empty() {
            let value = match self.op {
                AggOp::Count | AggOp::Sum => Some(0),
                AggOp::Min | AggOp::Max | AggOp::Avg => None,
            };
            tuples.push(result_tuple(&self.desc, &None, value)?);
        }

        TupleIterator::new(self.desc.clone(), tuples)
    }

    fn output_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn clear(&mut self) {
        self.groups.clear();
    }
}

/// Aggregates a STRING field. Only COUNT is supported.
#[derive(Debug)]
pub struct StringAggregator {
    group: Option<(usize, Type)>,
    agg_field: usize,
    desc: Arc<TupleDesc>,
    counts: IndexMap<Option<Field>, i64>,
}

impl StringAggregator {
    pub fn new(group: Option<(usize, Type)>, agg_field: usize, op: AggOp) -> Result<Self> {
        if op != AggOp::Count {
            return Err(Error::InvalidArgument(format!(
                "{} is not supported on STRING fields",
                op
            )));
        }
        Ok(Self {
            group,
            agg_field,
            desc: output_desc_for(group),
            counts: IndexMap::new(),
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()> {
        let key = group_key(self.group, tuple)?;
        tuple.field(self.agg_field)?;
        *self.counts.entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn results(&self) -> Result<TupleIterator> {
        let mut tuples = Vec::with_capacity(self.counts.len().max(1));
        for (key, count) in &self.counts {
            tuples.push(result_tuple(&self.desc, key, Some(*count))?);
        }
        if self.group.is_none() && self.counts.is_empty() {
            tuples.push(result_tuple(&self.desc, &None, Some(0))?);
        }
        TupleIterator::new(self.desc.clone(), tuples)
    }

    fn output_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn clear(&mut self) {
        self.counts.clear();
    }
}

/// Aggregation operator over one child.
///
/// Output columns are the group-by field (named as in the child) followed by
/// the aggregate, named `OP(field)`.
pub struct Aggregate {
    child: Box<dyn TupleSource>,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggOp,
    aggregator: Box<dyn Aggregator>,
    desc: Arc<TupleDesc>,
    results: Option<TupleIterator>,
    cursor: Lookahead,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn TupleSource>,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggOp,
    ) -> Result<Self> {
        let child_desc = child.tuple_desc().clone();
        let agg_type = child_desc.field_type(agg_field)?;
        let group = match group_field {
            Some(index) => Some((index, child_desc.field_type(index)?)),
            None => None,
        };

        let aggregator: Box<dyn Aggregator> = match agg_type {
            Type::Int => Box::new(IntegerAggregator::new(group, agg_field, op)),
            Type::Str => Box::new(StringAggregator::new(group, agg_field, op)?),
        };

        let agg_name = format!(
            "{}({})",
            op,
            child_desc.field_name(agg_field)?.unwrap_or_default()
        );
        let mut types = Vec::new();
        let mut names = Vec::new();
        if let Some((index, group_type)) = group {
            types.push(group_type);
            names.push(child_desc.field_name(index)?.map(str::to_string));
        }
        types.push(Type::Int);
        names.push(Some(agg_name));
        let desc = Arc::new(TupleDesc::new(types, names)?);

        Ok(Self {
            child,
            agg_field,
            group_field,
            op,
            aggregator,
            desc,
            results: None,
            cursor: Lookahead::new(),
        })
    }

    pub fn group_field(&self) -> Option<usize> {
        self.group_field
    }

    pub fn aggregate_field(&self) -> usize {
        self.agg_field
    }

    pub fn aggregate_op(&self) -> AggOp {
        self.op
    }

    /// Name of the group-by column in the output, if grouping
    pub fn group_field_name(&self) -> Option<&str> {
        self.group_field?;
        self.desc.field_name(0).ok().flatten()
    }

    /// Name of the aggregate column in the output
    pub fn aggregate_field_name(&self) -> Option<&str> {
        self.desc
            .field_name(self.desc.num_fields() - 1)
            .ok()
            .flatten()
    }
}

impl Pull for Aggregate {
    fn lookahead(&mut self) -> &mut Lookahead {
        &mut self.cursor
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let results = match self.results.as_mut() {
            Some(results) => results,
            None => return Ok(None),
        };
        match results.next()? {
            Some(mut t) => {
                t.reset_desc(self.desc.clone())?;
                Ok(Some(t))
            }
            None => Ok(None),
        }
    }
}

/// Drain `child` into `aggregator` and open the grouped results
fn aggregate_all(
    child: &mut dyn TupleSource,
    aggregator: &mut dyn Aggregator,
    op: AggOp,
) -> Result<TupleIterator> {
    aggregator.clear();
    let mut merged = 0usize;
    while let Some(t) = child.next()? {
        aggregator.merge_tuple_into_group(&t)?;
        merged += 1;
    }

    let mut results = aggregator.results()?;
    results.open()?;
    debug!(op = %op, tuples = merged, groups = results.len(), "aggregated");
    Ok(results)
}

impl TupleSource for Aggregate {
    fn open(&mut self) -> Result<()> {
        let Self {
            child,
            aggregator,
            results,
            cursor,
            op,
            ..
        } = self;
        cursor.open_with(|| {
            child.open()?;
            match aggregate_all(child.as_mut(), aggregator.as_mut(), *op) {
                Ok(aggregated) => {
                    *results = Some(aggregated);
                    Ok(())
                }
                Err(e) => {
                    child.close();
                    Err(e)
                }
            }
        })
    }

    fn close(&mut self) {
        self.child.close();
        self.results = None;
        self.aggregator.clear();
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
        match self.results.as_mut() {
            Some(results) => results.rewind(),
            None => Ok(()),
        }
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn children(&self) -> Vec<&dyn TupleSource> {
        vec![self.child.as_ref()]
    }

    fn with_children(
        self: Box<Self>,
        children: Vec<Box<dyn TupleSource>>,
    ) -> Result<Box<dyn TupleSource>> {
        let mut children = expect_children(children, 1, "Aggregate")?;
        let child = children.remove(0);
        Ok(Box::new(Aggregate::new(
            child,
            self.agg_field,
            self.group_field,
            self.op,
        )?))
    }
}
