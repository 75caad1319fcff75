//! Delete operator

use std::sync::Arc;

use tracing::debug;

use super::insert::{count_desc, count_tuple};
use super::{expect_children, Lookahead, Pull, TupleSource};
use crate::catalog::schema::TupleDesc;
use crate::database::Database;
use crate::error::Result;
use crate::storage::buffer_pool::BufferPool;
use crate::storage::tuple::Tuple;
use crate::transaction::TransactionId;

/// Deletes every child tuple, then yields one tuple holding the number of
/// rows deleted.
///
/// Each tuple is deleted from whatever table its record id points into, so
/// the child may mix tables.
pub struct Delete {
    tid: TransactionId,
    child: Box<dyn TupleSource>,
    pool: Arc<BufferPool>,
    desc: Arc<TupleDesc>,
    done: bool,
    cursor: Lookahead,
}

impl Delete {
    pub fn new(db: &Database, tid: TransactionId, child: Box<dyn TupleSource>) -> Self {
        Self {
            tid,
            child,
            pool: db.buffer_pool().clone(),
            desc: count_desc(),
            done: false,
            cursor: Lookahead::new(),
        }
    }
}

impl Pull for Delete {
    fn lookahead(&mut self) -> &mut Lookahead {
        &mut self.cursor
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }

        let mut count = 0;
        while let Some(t) = self.child.next()? {
            self.pool.delete_tuple(self.tid, &t)?;
            count += 1;
        }
        self.done = true;

        debug!(tid = %self.tid, rows = count, "delete finished");
        Ok(Some(count_tuple(&self.desc, count)?))
    }
}

impl TupleSource for Delete {
    fn open(&mut self) -> Result<()> {
        self.cursor.open_with(|| self.child.open())?;
        self.done = false;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
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
        self.done = false;
        self.child.rewind()
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
        let mut children = expect_children(children, 1, "Delete")?;
        Ok(Box::new(Delete {
            tid: self.tid,
            child: children.remove(0),
            pool: self.pool,
            desc: self.desc,
            done: false,
            cursor: Lookahead::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::Type;
    use crate::config::DbConfig;
    use crate::error::Error;
    use crate::executor::predicate::{Op, Predicate};
    use crate::executor::{collect, Filter, SeqScan, TupleIterator};
    use crate::storage::tuple::Field;
    use tempfile::tempdir;

    #[test]
    fn test_delete_matching_rows() {
        let dir = tempdir().unwrap();
        let db = Database::new(DbConfig::new()).unwrap();
        let desc = TupleDesc::named(vec![(Type::Int, "a")]).unwrap();
        let table = db.create_table(dir.path().join("t.dat"), desc, "t").unwrap();
        let tid = db.begin();

        let row_desc = db.catalog().tuple_desc(table).unwrap();
        for v in 0..10 {
            let t = Tuple::from_fields(row_desc.clone(), vec![Field::Int(v)]).unwrap();
            db.buffer_pool().insert_tuple(tid, table, t).unwrap();
        }

        let scan = SeqScan::new(&db, tid, table, "t").unwrap();
        let filter = Filter::new(Predicate::new(0, Op::LessThan, 4), Box::new(scan));
        let mut delete = Delete::new(&db, tid, Box::new(filter));
        delete.open().unwrap();
        let out = collect(&mut delete).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field(0).unwrap(), &Field::Int(4));

        let mut scan = SeqScan::new(&db, tid, table, "t").unwrap();
        scan.open().unwrap();
        assert_eq!(collect(&mut scan).unwrap().len(), 6);
    }

    #[test]
    fn test_delete_without_record_id_fails() {
        let db = Database::new(DbConfig::new()).unwrap();
        let desc = Arc::new(TupleDesc::from_types(vec![Type::Int]).unwrap());
        let t = Tuple::from_fields(desc.clone(), vec![Field::Int(1)]).unwrap();
        let child = Box::new(TupleIterator::new(desc, vec![t]).unwrap());

        let mut delete = Delete::new(&db, db.begin(), child);
        delete.open().unwrap();
        assert!(matches!(delete.next(), Err(Error::MissingRecordId)));
    }
}
