//! Per-table statistics built from column histograms

use tracing::debug;

use super::histogram::{IntHistogram, StringHistogram};
use crate::catalog::types::Type;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::executor::predicate::Op;
use crate::storage::page::TableId;
use crate::storage::tuple::Field;

/// Histogram for one column
#[derive(Debug, Clone)]
pub enum ColumnHistogram {
    Int(IntHistogram),
    Str(StringHistogram),
}

impl ColumnHistogram {
    pub fn avg_selectivity(&self) -> f64 {
        match self {
            ColumnHistogram::Int(h) => h.avg_selectivity(),
            ColumnHistogram::Str(h) => h.avg_selectivity(),
        }
    }
}

/// Row count, page count and one histogram per column of a table
#[derive(Debug, Clone)]
pub struct TableStats {
    table_id: TableId,
    num_pages: u32,
    total_tuples: usize,
    io_cost_per_page: f64,
    histograms: Vec<ColumnHistogram>,
}

impl TableStats {
    /// Scan `table_id` twice through the buffer pool: once for the range of
    /// every INT column, then again to fill the histograms.
    pub fn compute(db: &Database, table_id: TableId) -> Result<Self> {
        let file = db.catalog().database_file(table_id)?;
        let desc = file.tuple_desc().clone();
        let buckets = db.config().histogram_buckets;
        let tid = db.begin();

        let mut bounds: Vec<Option<(i32, i32)>> = vec![None; desc.num_fields()];
        let mut total_tuples = 0;
        let mut iter = file.iter(db.buffer_pool().clone(), tid);
        iter.open()?;
        while let Some(t) = iter.next()? {
            total_tuples += 1;
            for (i, bound) in bounds.iter_mut().enumerate() {
                if let Field::Int(v) = t.field(i)? {
                    let v = *v;
                    *bound = Some(match *bound {
                        Some((lo, hi)) => (lo.min(v), hi.max(v)),
                        None => (v, v),
                    });
                }
            }
        }

        let mut histograms = Vec::with_capacity(desc.num_fields());
        for (i, field_type) in desc.types().enumerate() {
            histograms.push(match field_type {
                Type::Int => {
                    let (lo, hi) = bounds[i].unwrap_or((0, 0));
                    ColumnHistogram::Int(IntHistogram::new(buckets, lo, hi)?)
                }
                Type::Str => ColumnHistogram::Str(StringHistogram::new(buckets)?),
            });
        }

        iter.rewind()?;
        while let Some(t) = iter.next()? {
            for (i, histogram) in histograms.iter_mut().enumerate() {
                match (histogram, t.field(i)?) {
                    (ColumnHistogram::Int(h), Field::Int(v)) => h.add_value(*v),
                    (ColumnHistogram::Str(h), Field::Str(s)) => h.add_value(s),
                    _ => {}
                }
            }
        }
        iter.close();
        db.buffer_pool().transaction_complete(tid, true)?;

        let num_pages = file.num_pages()?;
        debug!(table = table_id, tuples = total_tuples, pages = num_pages, "computed table stats");
        Ok(Self {
            table_id,
            num_pages,
            total_tuples,
            io_cost_per_page: db.config().io_cost_per_page,
            histograms,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Cost of a full sequential scan: every page read once
    pub fn estimate_scan_cost(&self) -> f64 {
        self.num_pages as f64 * self.io_cost_per_page
    }

    /// Rows expected to pass a predicate of the given selectivity
    pub fn estimate_table_cardinality(&self, selectivity: f64) -> usize {
        (self.total_tuples as f64 * selectivity) as usize
    }

    pub fn total_tuples(&self) -> usize {
        self.total_tuples
    }

    pub fn histogram(&self, field: usize) -> Result<&ColumnHistogram> {
        self.histograms
            .get(field)
            .ok_or_else(|| Error::NoSuchElement(format!("field index {}", field)))
    }

    /// Estimated fraction of rows satisfying `field op constant`
    pub fn estimate_selectivity(&self, field: usize, op: Op, constant: &Field) -> Result<f64> {
        match (self.histogram(field)?, constant) {
            (ColumnHistogram::Int(h), Field::Int(v)) => Ok(h.estimate_selectivity(op, *v)),
            (ColumnHistogram::Str(h), Field::Str(s)) => Ok(h.estimate_selectivity(op, s)),
            (ColumnHistogram::Int(_), other) => Err(Error::SchemaMismatch {
                expected: Type::Int.to_string(),
                found: other.field_type().to_string(),
            }),
            (ColumnHistogram::Str(_), other) => Err(Error::SchemaMismatch {
                expected: Type::Str.to_string(),
                found: other.field_type().to_string(),
            }),
        }
    }

    /// Selectivity of `field = ?` for an unknown constant
    pub fn avg_selectivity(&self, field: usize) -> Result<f64> {
        Ok(self.histogram(field)?.avg_selectivity())
    }
}
