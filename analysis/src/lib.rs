//! Building blocks for dataflow analyses based on
//! [abstract interpretation](https://en.wikipedia.org/wiki/Abstract_interpretation).
//! The crate provides a trait for
//! [control flow graphs](https://en.wikipedia.org/wiki/Control-flow_graph)
//! with traversal helpers, join semi-lattice domains over sets, and two
//! fixpoint solvers: a worklist solver for monotone transfer functions and
//! a depth first path explorer that memoizes what it has already seen at
//! every node.
//!
//! Look at the contract-lib crate for analyses built on these helpers.
//!
//! Some resources to learn more about abstract interpretation:
//! * [Static Program Analysis, Anders Møller and Michael I. Schwartzbach](https://cs.au.dk/~amoeller/spa/)
//! * [Data Flow Analysis: Theory and Practice](https://www.amazon.com/Data-Flow-Analysis-Theory-Practice/dp/0849328802)
//! * [Data flow analysis: an informal introduction](https://clang.llvm.org/docs/DataFlowAnalysisIntro.html)

/// Trait for defining a control flow graph, and some algorithms and data
/// structures to make it easier to work with them.
pub mod cfg;

/// Join semi-lattices over sets and maps of sets.
pub mod domains;

/// Implementations of fixed-point iteration algorithms.
pub mod solvers;
