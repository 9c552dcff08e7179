//! Dataflow analyses over the SSA form of smart contracts.
//!
//! The [`ir`] module models contracts as functions with control flow graphs
//! of SSA operations. On top of it, [`analysis::interval_analysis`] derives
//! integer ranges by encoding the operations into bitvector constraints and
//! [`analysis::reentrancy_analysis`] finds state variables read before and
//! written after external calls.

#[macro_use]
extern crate lazy_static;

pub mod analysis;
pub mod error;
pub mod ir;

#[cfg(test)]
mod ir_tests;
