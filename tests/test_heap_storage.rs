use anyhow::Result;
use heapdb::catalog::{TupleDesc, Type};
use heapdb::storage::{Field, HeapFile, HeapPage, PageId, Tuple};
use heapdb::{Database, DbConfig};
use proptest::prelude::*;
use tempfile::tempdir;

fn two_ints() -> TupleDesc {
    TupleDesc::named(vec![(Type::Int, "a"), (Type::Int, "b")]).unwrap()
}

fn row(db: &Database, table: u32, a: i32) -> Result<Tuple> {
    let desc = db.catalog().tuple_desc(table)?;
    Ok(Tuple::from_fields(desc, vec![Field::Int(a), Field::Int(a * 2)])?)
}

fn scan_all(db: &Database, table: u32) -> Result<Vec<Tuple>> {
    let file = db.catalog().database_file(table)?;
    let mut it = file.iter(db.buffer_pool().clone(), db.begin());
    it.open()?;
    let mut out = Vec::new();
    while let Some(t) = it.next()? {
        out.push(t);
    }
    it.close();
    Ok(out)
}

#[test]
fn test_inserts_fill_lowest_page_first() -> Result<()> {
    heapdb::logging::init_tracing();
    let dir = tempdir()?;
    let db = Database::new(DbConfig::new())?;
    let table = db.create_table(dir.path().join("t.dat"), two_ints(), "t")?;
    let file = db.catalog().database_file(table)?;
    let tid = db.begin();

    // 8-byte tuples: 504 per page
    for i in 0..504 {
        db.buffer_pool().insert_tuple(tid, table, row(&db, table, i)?)?;
    }
    assert_eq!(file.num_pages()?, 1);

    db.buffer_pool().insert_tuple(tid, table, row(&db, table, 504)?)?;
    assert_eq!(file.num_pages()?, 2);

    // Free a slot on page 0; the next insert must land there
    let victim = scan_all(&db, table)?
        .into_iter()
        .find(|t| t.field(0).ok() == Some(&Field::Int(10)))
        .expect("row 10 exists");
    db.buffer_pool().delete_tuple(tid, &victim)?;
    db.buffer_pool().insert_tuple(tid, table, row(&db, table, 999)?)?;

    assert_eq!(file.num_pages()?, 2);
    let reinserted = scan_all(&db, table)?
        .into_iter()
        .find(|t| t.field(0).ok() == Some(&Field::Int(999)))
        .expect("row 999 exists");
    assert_eq!(reinserted.record_id(), victim.record_id());
    Ok(())
}

#[test]
fn test_iterator_skips_empty_pages() -> Result<()> {
    let dir = tempdir()?;
    let db = Database::new(DbConfig::new())?;
    let table = db.create_table(dir.path().join("t.dat"), two_ints(), "t")?;
    let file = db.catalog().database_file(table)?;

    // Page 0 and 1 empty, page 2 holds one tuple
    for n in 0..2 {
        file.write_page(&HeapPage::empty(PageId::new(table, n), file.tuple_desc().clone()))?;
    }
    let mut page = HeapPage::empty(PageId::new(table, 2), file.tuple_desc().clone());
    page.insert_tuple(row(&db, table, 5)?)?;
    file.write_page(&page)?;

    let rows = scan_all(&db, table)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].field(1)?, &Field::Int(10));
    Ok(())
}

#[test]
fn test_committed_data_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.dat");
    {
        let db = Database::new(DbConfig::new())?;
        let table = db.create_table(&path, two_ints(), "t")?;
        let tid = db.begin();
        for i in 0..20 {
            db.buffer_pool().insert_tuple(tid, table, row(&db, table, i)?)?;
        }
        db.commit(tid)?;
    }

    let db = Database::new(DbConfig::new())?;
    let table = db.create_table(&path, two_ints(), "t")?;
    let rows = scan_all(&db, table)?;
    assert_eq!(rows.len(), 20);
    assert_eq!(rows[19].field(0)?, &Field::Int(19));
    Ok(())
}

#[test]
fn test_page_round_trip_through_file() -> Result<()> {
    let dir = tempdir()?;
    let file = HeapFile::create(dir.path().join("t.dat"), two_ints())?;
    let desc = file.tuple_desc().clone();
    let pid = PageId::new(file.id(), 0);

    let mut page = HeapPage::empty(pid, desc.clone());
    for i in 0..30 {
        page.insert_tuple(Tuple::from_fields(desc.clone(), vec![Field::Int(i), Field::Int(-i)])?)?;
    }
    file.write_page(&page)?;

    let read = file.read_page(pid)?;
    assert_eq!(read.page_data()?, page.page_data()?);
    assert_eq!(read.num_empty_slots(), page.num_empty_slots());
    Ok(())
}

#[test]
fn test_scan_sees_page_appended_mid_scan() -> Result<()> {
    let dir = tempdir()?;
    let db = Database::new(DbConfig::new())?;
    let table = db.create_table(dir.path().join("t.dat"), two_ints(), "t")?;
    let file = db.catalog().database_file(table)?;
    let tid = db.begin();
    db.buffer_pool().insert_tuple(tid, table, row(&db, table, 1)?)?;

    let mut it = file.iter(db.buffer_pool().clone(), tid);
    it.open()?;
    assert!(it.next()?.is_some());

    let mut page = HeapPage::empty(PageId::new(table, 1), file.tuple_desc().clone());
    page.insert_tuple(row(&db, table, 2)?)?;
    file.write_page(&page)?;

    assert_eq!(it.next()?.map(|t| t.field(0).cloned()).transpose()?, Some(Field::Int(2)));
    assert!(it.next()?.is_none());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_iteration_count_matches_occupied_slots(
        ops in proptest::collection::vec((any::<bool>(), 0i32..1000), 1..300),
    ) {
        let dir = tempdir().unwrap();
        let db = Database::new(DbConfig::new().buffer_pool_pages(4)).unwrap();
        let table = db.create_table(dir.path().join("t.dat"), two_ints(), "t").unwrap();
        let tid = db.begin();
        let mut expected = 0usize;

        for (insert, value) in ops {
            if insert || expected == 0 {
                db.buffer_pool().insert_tuple(tid, table, row(&db, table, value).unwrap()).unwrap();
                expected += 1;
            } else {
                let rows = scan_all(&db, table).unwrap();
                let victim = &rows[value as usize % rows.len()];
                db.buffer_pool().delete_tuple(tid, victim).unwrap();
                expected -= 1;
            }
        }

        prop_assert_eq!(scan_all(&db, table).unwrap().len(), expected);
    }
}
