use core::fmt::Display;

use z3::ast::{BV, Bool};

use crate::{SmtError, SmtResult};

/// The widest bitvector the term layer hands out. Contract words are 256
/// bits wide, intermediate products never need more.
pub const MAX_WIDTH: u32 = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    Bool,
    BitVec(u32),
}

impl Sort {
    pub fn is_supported(self) -> bool {
        match self {
            Sort::Bool => true,
            Sort::BitVec(width) => (1..=MAX_WIDTH).contains(&width),
        }
    }

    pub fn check(self) -> SmtResult<Self> {
        if self.is_supported() {
            Ok(self)
        } else {
            Err(SmtError::UnsupportedSort(self))
        }
    }
}

impl Display for Sort {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::BitVec(width) => write!(f, "BitVec({width})"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Term<'ctx> {
    Bool(Bool<'ctx>),
    BitVec(BV<'ctx>),
}

impl<'ctx> Term<'ctx> {
    pub fn sort(&self) -> Sort {
        match self {
            Term::Bool(_) => Sort::Bool,
            Term::BitVec(bv) => Sort::BitVec(bv.get_size()),
        }
    }

    pub fn as_bv(&self) -> SmtResult<&BV<'ctx>> {
        match self {
            Term::BitVec(bv) => Ok(bv),
            Term::Bool(_) => Err(SmtError::SortMismatch {
                expected: Sort::BitVec(0),
                found: Sort::Bool,
            }),
        }
    }

    pub fn as_bool(&self) -> SmtResult<&Bool<'ctx>> {
        match self {
            Term::Bool(b) => Ok(b),
            Term::BitVec(bv) => Err(SmtError::SortMismatch {
                expected: Sort::Bool,
                found: Sort::BitVec(bv.get_size()),
            }),
        }
    }

    pub fn into_bv(self) -> SmtResult<BV<'ctx>> {
        match self {
            Term::BitVec(bv) => Ok(bv),
            Term::Bool(_) => Err(SmtError::SortMismatch {
                expected: Sort::BitVec(0),
                found: Sort::Bool,
            }),
        }
    }
}

impl<'ctx> From<BV<'ctx>> for Term<'ctx> {
    fn from(value: BV<'ctx>) -> Self {
        Term::BitVec(value)
    }
}

impl<'ctx> From<Bool<'ctx>> for Term<'ctx> {
    fn from(value: Bool<'ctx>) -> Self {
        Term::Bool(value)
    }
}

impl Display for Term<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Term::Bool(b) => write!(f, "{b}"),
            Term::BitVec(bv) => write!(f, "{bv}"),
        }
    }
}

/// Arithmetic operations with overflow predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

/// The outcome of a satisfiability query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Satisfiability {
    Sat,
    Unsat,
    Unknown,
}

impl From<z3::SatResult> for Satisfiability {
    fn from(value: z3::SatResult) -> Self {
        match value {
            z3::SatResult::Sat => Satisfiability::Sat,
            z3::SatResult::Unsat => Satisfiability::Unsat,
            z3::SatResult::Unknown => Satisfiability::Unknown,
        }
    }
}
