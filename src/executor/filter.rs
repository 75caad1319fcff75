//! Filter operator

use std::sync::Arc;

use super::predicate::Predicate;
use super::{expect_children, Lookahead, Pull, TupleSource};
use crate::catalog::schema::TupleDesc;
use crate::error::Result;
use crate::storage::tuple::Tuple;

/// Passes through the child tuples that satisfy a predicate
pub struct Filter {
    predicate: Predicate,
    child: Box<dyn TupleSource>,
    cursor: Lookahead,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn TupleSource>) -> Self {
        Self {
            predicate,
            child,
            cursor: Lookahead::new(),
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl Pull for Filter {
    fn lookahead(&mut self) -> &mut Lookahead {
        &mut self.cursor
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        while let Some(t) = self.child.next()? {
            if self.predicate.filter(&t)? {
                return Ok(Some(t));
            }
        }
        Ok(None)
    }
}

impl TupleSource for Filter {
    fn open(&mut self) -> Result<()> {
        self.cursor.open_with(|| self.child.open())
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
        self.child.rewind()
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        self.child.tuple_desc()
    }

    fn children(&self) -> Vec<&dyn TupleSource> {
        vec![self.child.as_ref()]
    }

    fn with_children(
        self: Box<Self>,
        children: Vec<Box<dyn TupleSource>>,
    ) -> Result<Box<dyn TupleSource>> {
        let mut children = expect_children(children, 1, "Filter")?;
        let child = children.remove(0);
        Ok(Box::new(Filter::new(self.predicate, child)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::Type;
    use crate::executor::predicate::Op;
    use crate::executor::{collect, TupleIterator};
    use crate::storage::tuple::Field;

    fn source(values: &[i32]) -> Box<dyn TupleSource> {
        let desc = Arc::new(TupleDesc::named(vec![(Type::Int, "v")]).unwrap());
        let tuples = values
            .iter()
            .map(|v| Tuple::from_fields(desc.clone(), vec![Field::Int(*v)]).unwrap())
            .collect();
        Box::new(TupleIterator::new(desc, tuples).unwrap())
    }

    fn values(tuples: &[Tuple]) -> Vec<i32> {
        tuples
            .iter()
            .map(|t| t.field(0).unwrap().as_int().unwrap())
            .collect()
    }

    #[test]
    fn test_filter_keeps_matches() {
        let mut filter = Filter::new(Predicate::new(0, Op::GreaterThan, 2), source(&[1, 5, 2, 3]));
        filter.open().unwrap();
        assert_eq!(values(&collect(&mut filter).unwrap()), vec![5, 3]);

        filter.rewind().unwrap();
        assert_eq!(values(&collect(&mut filter).unwrap()), vec![5, 3]);
        filter.close();
    }

    #[test]
    fn test_filter_schema_is_child_schema() {
        let filter = Filter::new(Predicate::new(0, Op::Equals, 1), source(&[]));
        assert_eq!(filter.tuple_desc().field_name(0).unwrap(), Some("v"));
    }

    #[test]
    fn test_with_children_rebuilds() {
        let filter: Box<dyn TupleSource> =
            Box::new(Filter::new(Predicate::new(0, Op::Equals, 4), source(&[1])));
        let mut rebuilt = filter.with_children(vec![source(&[4, 4, 2])]).unwrap();
        rebuilt.open().unwrap();
        assert_eq!(collect(rebuilt.as_mut()).unwrap().len(), 2);
        assert_eq!(rebuilt.children().len(), 1);
    }
}
