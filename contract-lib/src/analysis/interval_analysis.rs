//! Integer ranges of contract variables. Every variable of a machine word
//! type is a bitvector symbol of a shared solver, the operations of the IR
//! add constraints between them. The ranges are obtained by querying the
//! solver once the fixpoint is reached.

use std::collections::{BTreeMap, BTreeSet};

use analysis::cfg::OpPos;
use analysis::solvers::{SolveMonotone, TransferFunction};
use smt::{Bounds, SmtSolver, SolverConfig};
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::ir::{Function, NodeId, Operand, Program, Type, Variable, VariableKind};

mod arithmetic;
mod assignment;
mod builtins;
mod calls;
mod domain;
mod handlers;
mod references;
mod registry;

pub use calls::call_prefix;
pub use domain::{IntervalDomain, IntervalState, PrefixedDomain, TrackedVariable, VariableStore};
pub use handlers::{HandlerContext, return_identity, tuple_element_identity};
pub use registry::HandlerRegistry;

/// Elements of fixed size arrays seeded at the entry, longer arrays are
/// only tracked through the elements the function touches.
const MAX_SEEDED_ELEMENTS: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntervalConfig {
    /// How many nested internal calls are inlined. Deeper calls produce
    /// unconstrained results.
    pub max_call_depth: usize,
    /// Approximate visit limit per node for the fixpoint iteration.
    pub node_limit: usize,
    pub solver: SolverConfig,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 4,
            node_limit: 20,
            solver: SolverConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct IntervalAnalysis {
    pub config: IntervalConfig,
    pub registry: HandlerRegistry,
}

struct IntervalTransfer<'a, 'ctx> {
    solver: &'a mut SmtSolver<'ctx>,
    program: &'a Program,
    registry: &'a HandlerRegistry,
    config: &'a IntervalConfig,
}

impl<'ctx> TransferFunction<Function, IntervalDomain<'ctx>> for IntervalTransfer<'_, 'ctx> {
    type Error = AnalysisError;

    fn block(
        &mut self,
        block_id: usize,
        cfg: &Function,
        _ctx: &(),
        state: &mut IntervalDomain<'ctx>,
    ) -> Result<(), AnalysisError> {
        let IntervalDomain::State(store) = state else {
            return Ok(());
        };
        let node = &cfg.nodes[block_id];
        let mut cx = HandlerContext {
            solver: &mut *self.solver,
            program: self.program,
            registry: self.registry,
            config: self.config,
            call_stack: vec![cfg.name.clone()],
            position: OpPos { block_id, op_id: 0 },
        };
        for (op_id, op) in node.operations.iter().enumerate() {
            cx.position = OpPos { block_id, op_id };
            self.registry.handle(op, node, store, &mut cx)?;
        }
        Ok(())
    }
}

impl IntervalAnalysis {
    pub fn new(config: IntervalConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::standard(),
        }
    }

    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The domain at the entry of `function`: its parameters are in range,
    /// the state variables it reads before writing them hold their declared
    /// initial values.
    pub fn seed<'ctx>(
        &self,
        program: &Program,
        function: &Function,
        solver: &mut SmtSolver<'ctx>,
    ) -> Result<IntervalDomain<'ctx>, AnalysisError> {
        let mut state = IntervalState::default();
        let mut cx = HandlerContext {
            solver,
            program,
            registry: &self.registry,
            config: &self.config,
            call_stack: vec![function.name.clone()],
            position: OpPos {
                block_id: 0,
                op_id: 0,
            },
        };

        for parameter in &function.parameters {
            seed_variable(&mut state, &mut cx, parameter, &parameter.identity())?;
        }

        let defined: BTreeSet<String> = function
            .nodes
            .iter()
            .flat_map(|node| node.operations.iter())
            .filter_map(|op| op.lvalue())
            .map(Variable::identity)
            .collect();
        let entry_versions: BTreeMap<String, &Variable> = function
            .nodes
            .iter()
            .flat_map(|node| node.operations.iter())
            .flat_map(|op| op.reads())
            .filter(|var| var.kind == VariableKind::State)
            .map(|var| (var.identity(), var))
            .filter(|(identity, _)| !defined.contains(identity))
            .collect();
        for var in entry_versions.into_values() {
            let declaration = program
                .state_variables
                .iter()
                .find(|decl| decl.variable.name == var.name);
            match (declaration.and_then(|decl| decl.initial_value.as_ref()), var.ty.word()) {
                (Some(initial), Some(ty)) => {
                    let tracked = handlers::get_or_create(&mut state, &mut cx, &var.identity(), ty)?;
                    let operand = Operand::Constant(initial.clone());
                    if let Some(value) =
                        handlers::operand_value(&mut state, &mut cx, &operand, ty)?
                    {
                        handlers::assert_equal(&mut cx, &tracked, &value)?;
                    }
                }
                _ => seed_variable(&mut state, &mut cx, var, &var.identity())?,
            }
        }
        debug!(function = %function.name, variables = state.len(), "seeded entry state");
        Ok(IntervalDomain::State(state))
    }

    /// Run the analysis on `function`. The constraints are added to
    /// `solver`, query it through the returned results.
    pub fn analyze<'ctx>(
        &self,
        program: &Program,
        function: &Function,
        solver: &mut SmtSolver<'ctx>,
    ) -> Result<IntervalResults<'ctx>, AnalysisError> {
        info!(function = %function.name, "running interval analysis");
        let seed = self.seed(program, function, solver)?;
        let mut transfer = IntervalTransfer {
            solver,
            program,
            registry: &self.registry,
            config: &self.config,
        };
        let solution = SolveMonotone {
            node_limit: self.config.node_limit,
        }
        .solve(function, seed, &(), &mut transfer)?;
        if !solution.converged {
            return Err(AnalysisError::DidNotConverge {
                function: function.name.clone(),
                limit: self.config.node_limit,
            });
        }
        debug!(
            function = %function.name,
            visits = solution.total_visits(),
            "interval analysis finished"
        );
        Ok(IntervalResults {
            states: solution.post_states,
            visits: solution.visits,
        })
    }
}

/// Track a parameter or state variable in range. Elements of fixed size
/// arrays are tracked one by one.
fn seed_variable<'ctx>(
    state: &mut IntervalState<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
    var: &Variable,
    identity: &str,
) -> Result<(), AnalysisError> {
    match &var.ty {
        Type::Array(element, Some(len)) => {
            let Some(ty) = element.word() else {
                return Ok(());
            };
            for position in 0..(*len).min(MAX_SEEDED_ELEMENTS) {
                let element = format!("{}[{position}]", var.name);
                let tracked = handlers::get_or_create(state, cx, &element, ty)?;
                handlers::assert_no_overflow(cx, &tracked);
            }
        }
        ty => {
            if let Some(ty) = ty.word() {
                let tracked = handlers::get_or_create(state, cx, identity, ty)?;
                handlers::assert_no_overflow(cx, &tracked);
            }
        }
    }
    Ok(())
}

/// The per node domains of an analyzed function.
#[derive(Clone, Debug)]
pub struct IntervalResults<'ctx> {
    pub states: Vec<IntervalDomain<'ctx>>,
    pub visits: Vec<usize>,
}

impl<'ctx> IntervalResults<'ctx> {
    /// The domain after `node`, `None` when the node is unreachable.
    pub fn state(&self, node: NodeId) -> Option<&IntervalState<'ctx>> {
        self.states.get(node)?.state()
    }

    /// The variable tracked under `identity` in the first node that has it.
    pub fn variable(&self, identity: &str) -> Option<&TrackedVariable<'ctx>> {
        self.states
            .iter()
            .filter_map(IntervalDomain::state)
            .find_map(|state| state.get(identity))
    }

    /// The range of a tracked variable under the collected constraints.
    /// `None` when the variable is not tracked or the constraints are
    /// contradictory.
    pub fn bounds(
        &self,
        solver: &SmtSolver<'ctx>,
        identity: &str,
    ) -> Result<Option<Bounds>, AnalysisError> {
        let Some(var) = self.variable(identity) else {
            return Ok(None);
        };
        Ok(solver.bounds(&var.term, var.is_signed())?)
    }

    /// Whether the variable may hold a value produced by an overflowing
    /// operation.
    pub fn may_overflow(
        &self,
        solver: &SmtSolver<'ctx>,
        identity: &str,
    ) -> Result<bool, AnalysisError> {
        match self.variable(identity) {
            Some(var) => Ok(solver.is_possible(&var.overflow)?),
            None => Ok(false),
        }
    }
}
