//! Insert operator

use std::sync::Arc;

use tracing::debug;

use super::{expect_children, Lookahead, Pull, TupleSource};
use crate::catalog::schema::{TdItem, TupleDesc};
use crate::catalog::types::Type;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::storage::buffer_pool::BufferPool;
use crate::storage::page::TableId;
use crate::storage::tuple::{Field, Tuple};
use crate::transaction::TransactionId;

/// Single-column INT schema used by Insert and Delete to report row counts
pub(crate) fn count_desc() -> Arc<TupleDesc> {
    Arc::new(TupleDesc::from_items(vec![TdItem::new(Type::Int, None)]))
}

pub(crate) fn count_tuple(desc: &Arc<TupleDesc>, count: usize) -> Result<Tuple> {
    let count = i32::try_from(count)
        .map_err(|_| Error::InvalidArgument(format!("row count {} does not fit in INT", count)))?;
    Tuple::from_fields(desc.clone(), vec![Field::Int(count)])
}

/// The child must produce exactly the table's field types
fn check_child_schema(table_desc: &TupleDesc, child: &dyn TupleSource) -> Result<()> {
    if **child.tuple_desc() != *table_desc {
        return Err(Error::SchemaMismatch {
            expected: table_desc.to_string(),
            found: child.tuple_desc().to_string(),
        });
    }
    Ok(())
}

/// Inserts every child tuple into a table, then yields one tuple holding
/// the number of rows inserted. Runs once per open or rewind.
pub struct Insert {
    tid: TransactionId,
    table_id: TableId,
    child: Box<dyn TupleSource>,
    pool: Arc<BufferPool>,
    desc: Arc<TupleDesc>,
    done: bool,
    cursor: Lookahead,
}

impl Insert {
    /// Fails if the child's schema differs from the table's
    pub fn new(
        db: &Database,
        tid: TransactionId,
        child: Box<dyn TupleSource>,
        table_id: TableId,
    ) -> Result<Self> {
        check_child_schema(&*db.catalog().tuple_desc(table_id)?, child.as_ref())?;

        Ok(Self {
            tid,
            table_id,
            child,
            pool: db.buffer_pool().clone(),
            desc: count_desc(),
            done: false,
            cursor: Lookahead::new(),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }
}

impl Pull for Insert {
    fn lookahead(&mut self) -> &mut Lookahead {
        &mut self.cursor
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }

        let mut count = 0;
        while let Some(t) = self.child.next()? {
            self.pool.insert_tuple(self.tid, self.table_id, t)?;
            count += 1;
        }
        self.done = true;

        debug!(table = self.table_id, tid = %self.tid, rows = count, "insert finished");
        Ok(Some(count_tuple(&self.desc, count)?))
    }
}

impl TupleSource for Insert {
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
        let mut children = expect_children(children, 1, "Insert")?;
        let child = children.remove(0);
        check_child_schema(&*self.pool.catalog().tuple_desc(self.table_id)?, child.as_ref())?;
        Ok(Box::new(Insert {
            tid: self.tid,
            table_id: self.table_id,
            child,
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
    use crate::config::DbConfig;
    use crate::executor::{collect, SeqScan, TupleIterator};
    use tempfile::tempdir;

    fn setup(dir: &std::path::Path) -> (Database, TableId) {
        let db = Database::new(DbConfig::new()).unwrap();
        let desc = TupleDesc::named(vec![(Type::Int, "a")]).unwrap();
        let table = db.create_table(dir.join("t.dat"), desc, "t").unwrap();
        (db, table)
    }

    fn source(values: &[i32]) -> Box<dyn TupleSource> {
        let desc = Arc::new(TupleDesc::from_types(vec![Type::Int]).unwrap());
        let tuples = values
            .iter()
            .map(|v| Tuple::from_fields(desc.clone(), vec![Field::Int(*v)]).unwrap())
            .collect();
        Box::new(TupleIterator::new(desc, tuples).unwrap())
    }

    #[test]
    fn test_insert_runs_once() {
        let dir = tempdir().unwrap();
        let (db, table) = setup(dir.path());
        let tid = db.begin();

        let mut insert = Insert::new(&db, tid, source(&[1, 2, 3]), table).unwrap();
        insert.open().unwrap();
        let first = insert.next().unwrap().unwrap();
        assert_eq!(first.field(0).unwrap(), &Field::Int(3));
        assert!(insert.next().unwrap().is_none());

        let mut scan = SeqScan::new(&db, tid, table, "t").unwrap();
        scan.open().unwrap();
        assert_eq!(collect(&mut scan).unwrap().len(), 3);
    }

    #[test]
    fn test_insert_rewind_repeats() {
        let dir = tempdir().unwrap();
        let (db, table) = setup(dir.path());
        let tid = db.begin();

        let mut insert = Insert::new(&db, tid, source(&[7, 8]), table).unwrap();
        insert.open().unwrap();
        assert_eq!(collect(&mut insert).unwrap().len(), 1);
        insert.rewind().unwrap();
        let again = collect(&mut insert).unwrap();
        assert_eq!(again[0].field(0).unwrap(), &Field::Int(2));

        let mut scan = SeqScan::new(&db, tid, table, "t").unwrap();
        scan.open().unwrap();
        assert_eq!(collect(&mut scan).unwrap().len(), 4);
    }

    #[test]
    fn test_insert_schema_checked_at_construction() {
        let dir = tempdir().unwrap();
        let (db, table) = setup(dir.path());
        let desc = Arc::new(TupleDesc::from_types(vec![Type::Str]).unwrap());
        let child = Box::new(TupleIterator::new(desc, Vec::new()).unwrap());

        let result = Insert::new(&db, db.begin(), child, table);
        assert!(matches!(result, Err(Error::SchemaMismatch { .. })));
    }

    #[test]
    fn test_with_children_rechecks_schema() {
        let dir = tempdir().unwrap();
        let (db, table) = setup(dir.path());
        let insert: Box<dyn TupleSource> =
            Box::new(Insert::new(&db, db.begin(), source(&[1]), table).unwrap());

        let desc = Arc::new(TupleDesc::from_types(vec![Type::Str]).unwrap());
        let wrong = Box::new(TupleIterator::new(desc, Vec::new()).unwrap());
        assert!(matches!(
            insert.with_children(vec![wrong]),
            Err(Error::SchemaMismatch { .. })
        ));

        let insert: Box<dyn TupleSource> =
            Box::new(Insert::new(&db, db.begin(), source(&[1]), table).unwrap());
        let mut rebuilt = insert.with_children(vec![source(&[4, 5])]).unwrap();
        rebuilt.open().unwrap();
        let counts = collect(rebuilt.as_mut()).unwrap();
        assert_eq!(counts[0].field(0).unwrap(), &Field::Int(2));
    }
}
