//! A thin term layer over the [z3](https://microsoft.github.io/z3guide/)
//! SMT solver, specialized for the bitvector arithmetic of contract
//! integer types. Terms of different widths are never combined silently:
//! callers reconcile widths explicitly with [`SmtSolver::extend`],
//! [`SmtSolver::truncate`] or [`SmtSolver::match_width`], which mirror the
//! two's complement conversions of the source language.
//!
//! Constraints only accumulate. Create one [`SmtSolver`] per independent
//! analysis unit.

mod error;
mod solver;
mod term;

pub use error::{SmtError, SmtResult};
pub use solver::{Bounds, SmtSolver, SolverConfig, interpret, type_range, wrap};
pub use term::{ArithOp, MAX_WIDTH, Satisfiability, Sort, Term};

pub use z3;

#[cfg(test)]
mod solver_tests;
