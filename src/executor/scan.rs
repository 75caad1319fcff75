//! Sequential scan operator

use std::sync::Arc;

use super::{expect_children, Lookahead, Pull, TupleSource};
use crate::catalog::schema::TupleDesc;
use crate::database::Database;
use crate::error::Result;
use crate::storage::heap::HeapFileIterator;
use crate::storage::page::TableId;
use crate::storage::tuple::Tuple;
use crate::transaction::TransactionId;

/// Reads every tuple of one table in on-disk order.
///
/// Output field names are qualified as `alias.field`.
pub struct SeqScan {
    table_id: TableId,
    table_name: String,
    alias: String,
    desc: Arc<TupleDesc>,
    iter: HeapFileIterator,
    cursor: Lookahead,
}

impl SeqScan {
    pub fn new(db: &Database, tid: TransactionId, table_id: TableId, alias: &str) -> Result<Self> {
        let file = db.catalog().database_file(table_id)?;
        let table_name = db.catalog().table_name(table_id)?;
        let desc = Arc::new(file.tuple_desc().with_prefix(alias));
        let iter = file.iter(db.buffer_pool().clone(), tid);

        Ok(Self {
            table_id,
            table_name,
            alias: alias.to_string(),
            desc,
            iter,
            cursor: Lookahead::new(),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Pull for SeqScan {
    fn lookahead(&mut self) -> &mut Lookahead {
        &mut self.cursor
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        match self.iter.next()? {
            Some(mut t) => {
                t.reset_desc(self.desc.clone())?;
                Ok(Some(t))
            }
            None => Ok(None),
        }
    }
}

impl TupleSource for SeqScan {
    fn open(&mut self) -> Result<()> {
        self.cursor.open_with(|| self.iter.open())
    }

    fn close(&mut self) {
        self.iter.close();
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
        self.iter.rewind()
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
        expect_children(children, 0, "SeqScan")?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::Type;
    use crate::config::DbConfig;
    use crate::error::Error;
    use crate::executor::collect;
    use crate::storage::tuple::Field;
    use tempfile::tempdir;

    #[test]
    fn test_scan_prefixes_names_and_reads_rows() {
        let dir = tempdir().unwrap();
        let db = Database::new(DbConfig::new()).unwrap();
        let desc = TupleDesc::named(vec![(Type::Int, "id"), (Type::Str, "name")]).unwrap();
        let table = db.create_table(dir.path().join("people.dat"), desc, "people").unwrap();
        let tid = db.begin();

        let row_desc = db.catalog().tuple_desc(table).unwrap();
        for (id, name) in [(1, "ann"), (2, "bob")] {
            let t = Tuple::from_fields(row_desc.clone(), vec![Field::Int(id), Field::from(name)])
                .unwrap();
            db.buffer_pool().insert_tuple(tid, table, t).unwrap();
        }

        let mut scan = SeqScan::new(&db, tid, table, "p").unwrap();
        assert_eq!(scan.tuple_desc().field_name(0).unwrap(), Some("p.id"));
        assert_eq!(scan.table_name(), "people");

        scan.open().unwrap();
        let rows = collect(&mut scan).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].field(1).unwrap(), &Field::from("bob"));
        assert!(rows[0].record_id().is_some());

        scan.rewind().unwrap();
        assert_eq!(collect(&mut scan).unwrap().len(), 2);
    }

    #[test]
    fn test_scan_unknown_table() {
        let db = Database::new(DbConfig::new()).unwrap();
        let result = SeqScan::new(&db, db.begin(), 12345, "x");
        assert!(matches!(result, Err(Error::TableNotFound(12345))));
    }
}
