use thiserror::Error;

use crate::Sort;

/// Programming errors of the term layer. None of these are data dependent:
/// they mean a caller combined terms without reconciling their sorts first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmtError {
    #[error("unsupported sort {0}")]
    UnsupportedSort(Sort),

    #[error("width mismatch in `{operation}`: {lhs} vs {rhs} bits")]
    WidthMismatch {
        operation: &'static str,
        lhs: u32,
        rhs: u32,
    },

    #[error("expected a {expected} term, found {found}")]
    SortMismatch { expected: Sort, found: Sort },

    #[error("cannot {operation} a {from}-bit term to {to} bits")]
    InvalidResize {
        operation: &'static str,
        from: u32,
        to: u32,
    },

    #[error("invalid constant `{0}`")]
    InvalidConstant(String),

    #[error("the solver could not decide the query")]
    SolverUnknown,
}

pub type SmtResult<T> = Result<T, SmtError>;
