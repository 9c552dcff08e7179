//! Detects state variables that are read before an external call that may
//! re-enter the contract and written after it. The CFG is explored path by
//! path, a path stops at a node when it carries no information the node has
//! not seen yet.

use core::cmp::Ordering;
use core::fmt::Debug;
use std::collections::{BTreeMap, BTreeSet};

use analysis::domains::{JoinSemiLattice, SetMap};
use analysis::solvers::{ExplorePaths, TransferFunction};
use num_traits::Zero;
use tracing::{debug, info, trace};

use crate::error::AnalysisError;
use crate::ir::{Function, LowLevelKind, Node, NodeId, Operand, Operation, Program};

/// How the exploration treats branches on the outcome of an external call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GuardHeuristic {
    /// Branch successors always see the branching node.
    Disabled,
    /// Only `if (!call())` guards: the true successor is explored as if the
    /// branching node was not its predecessor.
    NegatedOnly,
    /// Like [`GuardHeuristic::NegatedOnly`], and for non-negated conditions
    /// the false successor is explored that way.
    #[default]
    BranchOnCall,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReentrancyConfig {
    pub guard_heuristic: GuardHeuristic,
    /// `send` and `transfer` forward too little gas to re-enter, unless
    /// this is set.
    pub stipend_calls_reenter: bool,
    /// Approximate visit limit per node.
    pub node_limit: usize,
}

impl Default for ReentrancyConfig {
    fn default() -> Self {
        Self {
            guard_heuristic: GuardHeuristic::default(),
            stipend_calls_reenter: false,
            node_limit: 20,
        }
    }
}

/// Call targets are printed as `destination.function`.
pub type CallTarget = String;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct ReentrancyState {
    /// Nodes with calls that may re-enter, to their targets.
    pub calls: SetMap<NodeId, CallTarget>,
    /// Nodes sending ether with a re-entrant call.
    pub send_eth: SetMap<NodeId, CallTarget>,
    /// Nodes sending ether through `send` or `transfer`.
    pub safe_send_eth: SetMap<NodeId, CallTarget>,
    /// State variables to the nodes reading them.
    pub reads: SetMap<String, NodeId>,
    /// Call nodes to the state variables read on the path up to the call.
    pub reads_prior_calls: SetMap<NodeId, String>,
    /// State variables to the nodes writing them.
    pub written: SetMap<String, NodeId>,
    /// State variables to the nodes writing them after a call.
    pub writes_after_calls: SetMap<String, NodeId>,
    /// State variables read before and written after a call, to the calls.
    pub read_then_written: SetMap<String, NodeId>,
    /// Variables other functions read that are written after a call, to
    /// the calls.
    pub cross_function_writes: SetMap<String, NodeId>,
    /// Nodes to the events they emit.
    pub events: SetMap<NodeId, String>,
    /// Events emitted after a call, to the emitting nodes.
    pub events_after_calls: SetMap<String, NodeId>,
}

impl ReentrancyState {
    fn is_included_in(&self, other: &Self) -> bool {
        self.calls <= other.calls
            && self.send_eth <= other.send_eth
            && self.safe_send_eth <= other.safe_send_eth
            && self.reads <= other.reads
            && self.reads_prior_calls <= other.reads_prior_calls
            && self.written <= other.written
            && self.writes_after_calls <= other.writes_after_calls
            && self.read_then_written <= other.read_then_written
            && self.cross_function_writes <= other.cross_function_writes
            && self.events <= other.events
            && self.events_after_calls <= other.events_after_calls
    }

    fn union_with(&mut self, other: &Self) {
        self.calls.union_with(&other.calls);
        self.send_eth.union_with(&other.send_eth);
        self.safe_send_eth.union_with(&other.safe_send_eth);
        self.reads.union_with(&other.reads);
        self.reads_prior_calls.union_with(&other.reads_prior_calls);
        self.written.union_with(&other.written);
        self.writes_after_calls.union_with(&other.writes_after_calls);
        self.read_then_written.union_with(&other.read_then_written);
        self.cross_function_writes
            .union_with(&other.cross_function_writes);
        self.events.union_with(&other.events);
        self.events_after_calls.union_with(&other.events_after_calls);
    }
}

impl PartialOrd for ReentrancyState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_included_in(other), other.is_included_in(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl Debug for ReentrancyState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut out = f.debug_struct("ReentrancyState");
        let fields: [(&str, &dyn Debug); 11] = [
            ("calls", &self.calls),
            ("send_eth", &self.send_eth),
            ("safe_send_eth", &self.safe_send_eth),
            ("reads", &self.reads),
            ("reads_prior_calls", &self.reads_prior_calls),
            ("written", &self.written),
            ("writes_after_calls", &self.writes_after_calls),
            ("read_then_written", &self.read_then_written),
            ("cross_function_writes", &self.cross_function_writes),
            ("events", &self.events),
            ("events_after_calls", &self.events_after_calls),
        ];
        for (name, value) in fields {
            out.field(name, value);
        }
        out.finish()
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub enum ReentrancyDomain {
    #[default]
    Bottom,
    State(ReentrancyState),
}

impl ReentrancyDomain {
    pub fn state(&self) -> Option<&ReentrancyState> {
        match self {
            ReentrancyDomain::Bottom => None,
            ReentrancyDomain::State(state) => Some(state),
        }
    }
}

impl PartialOrd for ReentrancyDomain {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (ReentrancyDomain::Bottom, ReentrancyDomain::Bottom) => Some(Ordering::Equal),
            (ReentrancyDomain::Bottom, _) => Some(Ordering::Less),
            (_, ReentrancyDomain::Bottom) => Some(Ordering::Greater),
            (ReentrancyDomain::State(lhs), ReentrancyDomain::State(rhs)) => lhs.partial_cmp(rhs),
        }
    }
}

impl Debug for ReentrancyDomain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ReentrancyDomain::Bottom => write!(f, "Bottom"),
            ReentrancyDomain::State(state) => write!(f, "{state:?}"),
        }
    }
}

impl JoinSemiLattice for ReentrancyDomain {
    type LatticeContext = ();

    fn bottom(_: &()) -> Self {
        ReentrancyDomain::Bottom
    }

    fn join(&self, other: &Self, _: &()) -> Self {
        match (self, other) {
            (ReentrancyDomain::Bottom, _) => other.clone(),
            (_, ReentrancyDomain::Bottom) => self.clone(),
            (ReentrancyDomain::State(lhs), ReentrancyDomain::State(rhs)) => {
                let mut result = lhs.clone();
                result.union_with(rhs);
                ReentrancyDomain::State(result)
            }
        }
    }
}

/// What a node does, with the effects of the internal calls it makes.
#[derive(Default)]
struct NodeEffects {
    reads: BTreeSet<String>,
    writes: BTreeSet<String>,
    calls: BTreeSet<CallTarget>,
    send_eth: BTreeSet<CallTarget>,
    safe_send_eth: BTreeSet<CallTarget>,
    events: BTreeSet<String>,
    /// Reads evaluated before one of the node's own calls.
    reads_before_calls: BTreeSet<String>,
    /// Writes evaluated after one of the node's own calls, in the node or
    /// in an inlined callee.
    writes_after_calls: BTreeSet<String>,
}

impl NodeEffects {
    fn call(&mut self, target: CallTarget) {
        self.reads_before_calls.extend(self.reads.iter().cloned());
        self.calls.insert(target);
    }

    fn write(&mut self, var: String) {
        if !self.calls.is_empty() {
            self.writes_after_calls.insert(var.clone());
        }
        self.writes.insert(var);
    }
}

fn sends_value(value: Option<&Operand>) -> bool {
    match value {
        None => false,
        Some(Operand::Constant(constant)) => {
            constant.as_int().is_none_or(|amount| !amount.is_zero())
        }
        Some(Operand::Variable(_)) => true,
    }
}

/// Operations are visited in evaluation order: the operands are read, then
/// a call is made, then the lvalue is written.
fn collect_effects(
    node: &Node,
    program: &Program,
    config: &ReentrancyConfig,
    seen: &mut BTreeSet<String>,
    effects: &mut NodeEffects,
) {
    for op in &node.operations {
        effects.reads.extend(op.state_variables_read());
        match op {
            Operation::HighLevelCall {
                destination,
                function,
                value,
                is_static,
                ..
            } => {
                let target = format!("{destination}.{function}");
                if sends_value(value.as_ref()) {
                    effects.send_eth.insert(target.clone());
                }
                if !is_static {
                    effects.call(target);
                }
            }
            Operation::LowLevelCall {
                destination,
                kind,
                value,
                ..
            } => {
                let target = format!("{destination}.{kind}");
                if sends_value(value.as_ref()) {
                    effects.send_eth.insert(target.clone());
                }
                if *kind != LowLevelKind::StaticCall {
                    effects.call(target);
                }
            }
            Operation::Send { destination, .. } | Operation::Transfer { destination, .. } => {
                let method = match op {
                    Operation::Send { .. } => "send",
                    _ => "transfer",
                };
                let target = format!("{destination}.{method}");
                effects.safe_send_eth.insert(target.clone());
                if config.stipend_calls_reenter {
                    effects.send_eth.insert(target.clone());
                    effects.call(target);
                }
            }
            Operation::InternalCall { function, .. } => {
                inline_callee(function, program, config, seen, effects)
            }
            Operation::LibraryCall {
                library, function, ..
            } => inline_callee(&format!("{library}.{function}"), program, config, seen, effects),
            Operation::EventCall { name, .. } => {
                effects.events.insert(name.clone());
            }
            _ => {}
        }
        if let Some(var) = op.state_variable_written() {
            effects.write(var);
        }
    }
}

/// Internal calls contribute the effects of every node of the callee in
/// node order, transitively. Each callee is inlined once per node.
fn inline_callee(
    name: &str,
    program: &Program,
    config: &ReentrancyConfig,
    seen: &mut BTreeSet<String>,
    effects: &mut NodeEffects,
) {
    if !seen.insert(name.to_owned()) {
        return;
    }
    let Some(callee) = program.function(name) else {
        trace!(callee = name, "callee is not part of the program");
        return;
    };
    for node in &callee.nodes {
        collect_effects(node, program, config, seen, effects);
    }
}

fn node_effects(
    node: &Node,
    function: &Function,
    program: &Program,
    config: &ReentrancyConfig,
) -> NodeEffects {
    let mut effects = NodeEffects::default();
    let mut seen = BTreeSet::from([function.name.clone()]);
    collect_effects(node, program, config, &mut seen, &mut effects);
    effects
}

struct ReentrancyTransfer<'a> {
    program: &'a Program,
    config: &'a ReentrancyConfig,
    /// State variables used across function boundaries.
    cross_function: &'a BTreeSet<String>,
}

impl ReentrancyTransfer<'_> {
    fn apply(&self, node: NodeId, effects: &NodeEffects, state: &mut ReentrancyState) {
        // Calls made before this node.
        let earlier_calls: Vec<NodeId> = state
            .calls
            .keys()
            .copied()
            .filter(|&call| call != node)
            .collect();

        if !effects.calls.is_empty() {
            state.calls.extend(node, effects.calls.iter().cloned());
            let read_so_far: Vec<String> = state.reads.keys().cloned().collect();
            state.reads_prior_calls.extend(
                node,
                read_so_far
                    .into_iter()
                    .chain(effects.reads_before_calls.iter().cloned()),
            );
        }
        state.send_eth.extend(node, effects.send_eth.iter().cloned());
        state
            .safe_send_eth
            .extend(node, effects.safe_send_eth.iter().cloned());

        for var in &effects.writes {
            state.written.insert(var.clone(), node);
            // The node's own calls only precede the writes evaluated after them.
            let own_call = effects.writes_after_calls.contains(var).then_some(node);
            for call in earlier_calls.iter().copied().chain(own_call) {
                state.writes_after_calls.insert(var.clone(), node);
                if state.reads_prior_calls.contains(&call, var) {
                    state.read_then_written.insert(var.clone(), call);
                }
                if self.cross_function.contains(var) {
                    state.cross_function_writes.insert(var.clone(), call);
                }
            }
        }

        for var in &effects.reads {
            state.reads.insert(var.clone(), node);
        }

        for event in &effects.events {
            state.events.insert(node, event.clone());
            if !earlier_calls.is_empty() {
                state.events_after_calls.insert(event.clone(), node);
            }
        }
    }
}

impl TransferFunction<Function, ReentrancyDomain> for ReentrancyTransfer<'_> {
    type Error = AnalysisError;

    fn skip_father(&mut self, from: usize, to: usize, cfg: &Function) -> bool {
        let node = &cfg.nodes[from];
        let [on_true, on_false] = node.sons.as_slice() else {
            return false;
        };
        if !node.kind.is_branch() || on_true == on_false {
            return false;
        }
        if node_effects(node, cfg, self.program, self.config)
            .calls
            .is_empty()
        {
            return false;
        }
        match (self.config.guard_heuristic, node.has_negated_condition()) {
            (GuardHeuristic::Disabled, _) => false,
            (_, true) => to == *on_true,
            (GuardHeuristic::NegatedOnly, false) => false,
            (GuardHeuristic::BranchOnCall, false) => to == *on_false,
        }
    }

    fn block(
        &mut self,
        block_id: usize,
        cfg: &Function,
        _ctx: &(),
        state: &mut ReentrancyDomain,
    ) -> Result<(), AnalysisError> {
        // A reached node always has a state, even if no path brought one.
        if *state == ReentrancyDomain::Bottom {
            *state = ReentrancyDomain::State(ReentrancyState::default());
        }
        let ReentrancyDomain::State(current) = state else {
            return Ok(());
        };
        let effects = node_effects(&cfg.nodes[block_id], cfg, self.program, self.config);
        self.apply(block_id, &effects, current);
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReentrancyAnalysis {
    pub config: ReentrancyConfig,
}

/// A state variable read before an external call and written after it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Finding {
    pub variable: String,
    /// The calls that may re-enter between the read and the write.
    pub calls: BTreeSet<NodeId>,
    /// The nodes writing the variable after a call.
    pub writes: BTreeSet<NodeId>,
    /// Another function of the program reads the variable.
    pub cross_function: bool,
    /// Some of the calls send ether.
    pub sends_eth: bool,
}

#[derive(Clone, Debug)]
pub struct ReentrancyResults {
    pub states: Vec<ReentrancyDomain>,
    pub visits: Vec<usize>,
}

impl ReentrancyResults {
    pub fn state(&self, node: NodeId) -> Option<&ReentrancyState> {
        self.states.get(node)?.state()
    }

    /// The join of the states of every node.
    pub fn summary(&self) -> ReentrancyState {
        let mut summary = ReentrancyState::default();
        for state in self.states.iter().filter_map(ReentrancyDomain::state) {
            summary.union_with(state);
        }
        summary
    }

    pub fn findings(&self) -> Vec<Finding> {
        let summary = self.summary();
        let mut findings: BTreeMap<&String, Finding> = BTreeMap::new();
        for (variable, calls) in summary.read_then_written.iter() {
            let writes = summary
                .writes_after_calls
                .get(variable)
                .map(|nodes| nodes.iter().copied().collect())
                .unwrap_or_default();
            findings.insert(
                variable,
                Finding {
                    variable: variable.clone(),
                    calls: calls.iter().copied().collect(),
                    writes,
                    cross_function: summary.cross_function_writes.contains_key(variable),
                    sends_eth: calls
                        .iter()
                        .any(|call| summary.send_eth.contains_key(call)),
                },
            );
        }
        findings.into_values().collect()
    }
}

impl ReentrancyAnalysis {
    pub fn new(config: ReentrancyConfig) -> Self {
        Self { config }
    }

    /// The state variables read by the functions of `program` other than
    /// `function`.
    pub fn read_elsewhere(program: &Program, function: &Function) -> BTreeSet<String> {
        program
            .functions
            .iter()
            .filter(|other| other.name != function.name)
            .flat_map(|other| other.nodes.iter())
            .flat_map(Node::state_variables_read)
            .collect()
    }

    /// Analyze `function`, taking the variables other functions of the
    /// program read as the ones used across function boundaries.
    pub fn analyze(
        &self,
        program: &Program,
        function: &Function,
    ) -> Result<ReentrancyResults, AnalysisError> {
        let cross_function = Self::read_elsewhere(program, function);
        self.analyze_with(program, function, &cross_function)
    }

    /// Analyze `function`. Writes after a call to a variable of
    /// `cross_function` are reported as cross function.
    pub fn analyze_with(
        &self,
        program: &Program,
        function: &Function,
        cross_function: &BTreeSet<String>,
    ) -> Result<ReentrancyResults, AnalysisError> {
        info!(
            function = %function.name,
            cross_function = cross_function.len(),
            "running reentrancy analysis"
        );
        let mut transfer = ReentrancyTransfer {
            program,
            config: &self.config,
            cross_function,
        };
        let seed = ReentrancyDomain::State(ReentrancyState::default());
        let solution = ExplorePaths {
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
            "reentrancy analysis finished"
        );
        Ok(ReentrancyResults {
            states: solution.post_states,
            visits: solution.visits,
        })
    }
}
