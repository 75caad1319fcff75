//! Comparison predicates used by Filter and the join operators

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::tuple::{Field, Tuple};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Equals,
    GreaterThan,
    LessThan,
    LessThanOrEq,
    GreaterThanOrEq,
    Like,
    NotEquals,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Equals => "=",
            Op::GreaterThan => ">",
            Op::LessThan => "<",
            Op::LessThanOrEq => "<=",
            Op::GreaterThanOrEq => ">=",
            Op::Like => "LIKE",
            Op::NotEquals => "<>",
        };
        write!(f, "{}", s)
    }
}

/// `tuple[field] op operand`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: usize,
    pub op: Op,
    pub operand: Field,
}

impl Predicate {
    pub fn new(field: usize, op: Op, operand: impl Into<Field>) -> Self {
        Self {
            field,
            op,
            operand: operand.into(),
        }
    }

    /// Evaluate against `tuple`
    pub fn filter(&self, tuple: &Tuple) -> Result<bool> {
        Ok(tuple.field(self.field)?.compare(self.op, &self.operand))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{} {} {}", self.field, self.op, self.operand)
    }
}

/// `left[left_field] op right[right_field]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPredicate {
    pub left_field: usize,
    pub op: Op,
    pub right_field: usize,
}

impl JoinPredicate {
    pub fn new(left_field: usize, op: Op, right_field: usize) -> Self {
        Self {
            left_field,
            op,
            right_field,
        }
    }

    pub fn filter(&self, left: &Tuple, right: &Tuple) -> Result<bool> {
        let l = left.field(self.left_field)?;
        let r = right.field(self.right_field)?;
        Ok(l.compare(self.op, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::TupleDesc;
    use crate::catalog::types::Type;
    use crate::error::Error;
    use std::sync::Arc;

    fn tuple(a: i32, s: &str) -> Tuple {
        let desc = Arc::new(TupleDesc::from_types(vec![Type::Int, Type::Str]).unwrap());
        Tuple::from_fields(desc, vec![Field::Int(a), Field::from(s)]).unwrap()
    }

    #[test]
    fn test_predicate_filter() {
        let t = tuple(10, "hello");
        assert!(Predicate::new(0, Op::GreaterThan, 5).filter(&t).unwrap());
        assert!(!Predicate::new(0, Op::LessThan, 5).filter(&t).unwrap());
        assert!(Predicate::new(1, Op::Like, "ell").filter(&t).unwrap());
        assert!(matches!(
            Predicate::new(4, Op::Equals, 1).filter(&t),
            Err(Error::NoSuchElement(_))
        ));
    }

    #[test]
    fn test_join_predicate() {
        let p = JoinPredicate::new(0, Op::Equals, 0);
        assert!(p.filter(&tuple(1, "a"), &tuple(1, "b")).unwrap());
        assert!(!p.filter(&tuple(1, "a"), &tuple(2, "b")).unwrap());
    }

    #[test]
    fn test_display() {
        assert_eq!(Predicate::new(2, Op::NotEquals, 3).to_string(), "f2 <> 3");
    }
}
