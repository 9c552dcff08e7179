use core::convert::Infallible;
use core::marker::PhantomData;

use fixedbitset::FixedBitSet;
use tracing::{debug, trace, warn};

use super::cfg::{CfgBlock, ControlFlowGraph, OpPos, RPOWorklist, get_back_edges};
use super::domains::JoinSemiLattice;

/// Transfer functions need to implement this trait and define either
/// [`TransferFunction::block`] or [`TransferFunction::operation`]. The
/// state is mutated in place. Errors abort the whole solver run.
pub trait TransferFunction<Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
{
    type Error;

    /// Optional function to apply the effects of traversing an edge. Returning
    /// `None` means no state flows along the edge.
    fn edge(
        &mut self,
        _from: usize,
        _to: usize,
        _cfg: &Cfg,
        _ctx: &D::LatticeContext,
        post_state: &D,
    ) -> Option<D> {
        Some(post_state.clone())
    }

    /// Only consulted by [`ExplorePaths`]. When it returns true, exploring
    /// `to` right after `from` merges every predecessor of `to` except
    /// `from`. Later visits of `to` along other paths merge all of them.
    fn skip_father(&mut self, _from: usize, _to: usize, _cfg: &Cfg) -> bool {
        false
    }

    /// Apply the effects of a block to the analysis state. In case
    /// [`TransferFunction::operation`] is implemented, the default
    /// implementation should be sufficient.
    fn block(
        &mut self,
        block_id: usize,
        cfg: &Cfg,
        ctx: &D::LatticeContext,
        state: &mut D,
    ) -> Result<(), Self::Error> {
        for (op_id, op) in cfg.blocks()[block_id].operations().iter().enumerate() {
            self.operation(OpPos { block_id, op_id }, op, cfg, ctx, state)?;
        }
        Ok(())
    }

    /// Apply the effects of an operation to the analysis state.
    fn operation(
        &mut self,
        _pos: OpPos,
        _op: &<<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation,
        _cfg: &Cfg,
        _ctx: &D::LatticeContext,
        _state: &mut D,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Small utility so users do not need to create a new struct for every
/// infallible transfer function over blocks.
pub struct BlockTransfer<F, Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(usize, &Cfg, &D::LatticeContext, &mut D),
{
    func: F,
    phantom: PhantomData<(Cfg, D)>,
}

impl<F, Cfg, D> TransferFunction<Cfg, D> for BlockTransfer<F, Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(usize, &Cfg, &D::LatticeContext, &mut D),
{
    type Error = Infallible;

    fn block(
        &mut self,
        block_id: usize,
        cfg: &Cfg,
        ctx: &<D as JoinSemiLattice>::LatticeContext,
        state: &mut D,
    ) -> Result<(), Infallible> {
        (self.func)(block_id, cfg, ctx, state);
        Ok(())
    }
}

impl<F, Cfg, D> BlockTransfer<F, Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(usize, &Cfg, &D::LatticeContext, &mut D),
{
    /// Create a new transfer function for blocks from a closure or function.
    pub fn new(func: F) -> Self {
        Self {
            func,
            phantom: PhantomData,
        }
    }
}

/// The result of a solver run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution<D> {
    /// The analysis state after each CFG block. Unreached blocks are bottom.
    pub post_states: Vec<D>,
    /// How many times the transfer function ran on each block.
    pub visits: Vec<usize>,
    /// False when the iteration limit was hit before reaching a fixpoint.
    pub converged: bool,
}

impl<D> Solution<D> {
    pub fn total_visits(&self) -> usize {
        self.visits.iter().sum()
    }
}

/// A basic solver for monotonic transfer functions. It is also doing
/// widening on loop heads. The solver is using a worklist that visits
/// the queued nodes in reverse post-order. New post states are joined into
/// the previous ones, so the state of a block only grows during a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SolveMonotone {
    /// Set the approximate iteration limit per node. If the limit is reached
    /// (the analysis did not converge in the permitted number of steps),
    /// the solver stops and reports it in [`Solution::converged`].
    pub node_limit: usize,
}

impl Default for SolveMonotone {
    fn default() -> Self {
        Self { node_limit: 20 }
    }
}

impl SolveMonotone {
    /// Run the solver on a CFG.
    ///
    /// # Arguments
    ///
    /// * `seed` - The initial program state for the start node. This often has
    ///   the initial abstract values for the formal parameters of a function.
    /// * `transfer` - Function to apply the effects of blocks, edges, operations.
    pub fn solve<Cfg, D, F>(
        self,
        cfg: &Cfg,
        seed: D,
        lat_ctx: &D::LatticeContext,
        transfer: &mut F,
    ) -> Result<Solution<D>, F::Error>
    where
        Cfg: ControlFlowGraph,
        D: JoinSemiLattice,
        F: TransferFunction<Cfg, D>,
    {
        let node_num = cfg.blocks().len();
        let mut solution = Solution {
            post_states: vec![D::bottom(lat_ctx); node_num],
            visits: vec![0; node_num],
            converged: true,
        };
        if node_num == 0 {
            return Ok(solution);
        }

        // Loop header dominates the whole loop, every back edge should point to a
        // loop header.
        let loop_heads: Vec<bool> = {
            let mut heads = vec![false; node_num];
            for (_, target) in get_back_edges(cfg) {
                heads[target] = true;
            }
            heads
        };

        // The entry is processed with the seed as its input. When the entry is
        // also a loop head, the seed is merged into every later visit.
        let mut entry_state = seed.clone();
        transfer.block(0, cfg, lat_ctx, &mut entry_state)?;
        solution.post_states[0] = entry_state;
        solution.visits[0] = 1;

        let mut worklist = RPOWorklist::new(cfg);
        worklist.push_successors(0, cfg);

        let limit = self.node_limit * node_num;
        let mut processed_nodes = 1_usize;
        while let Some(current) = worklist.pop() {
            if limit > 0 && processed_nodes >= limit {
                warn!(processed_nodes, "monotone solver hit its iteration limit");
                solution.converged = false;
                break;
            }

            let mut pre_state = if current == 0 {
                seed.clone()
            } else {
                D::bottom(lat_ctx)
            };
            for &pred in cfg.blocks()[current].predecessors() {
                if let Some(transferred) =
                    transfer.edge(pred, current, cfg, lat_ctx, &solution.post_states[pred])
                {
                    pre_state = pre_state.join(&transferred, lat_ctx);
                }
            }
            let mut post_state = pre_state;
            transfer.block(current, cfg, lat_ctx, &mut post_state)?;
            trace!(block = current, "visited block");

            let previous = &solution.post_states[current];
            post_state = post_state.join(previous, lat_ctx);
            if loop_heads[current] {
                post_state = post_state.widen(previous, lat_ctx, processed_nodes / node_num);
            }

            processed_nodes += 1;
            let visited = solution.visits[current] > 0;
            solution.visits[current] += 1;
            if visited && *previous == post_state {
                continue;
            }

            solution.post_states[current] = post_state;
            worklist.push_successors(current, cfg);
        }
        debug!(processed_nodes, "monotone solver finished");
        Ok(solution)
    }
}

struct Frame {
    node: usize,
    skip_father: Option<usize>,
    path: FixedBitSet,
}

/// A solver exploring the paths of the CFG depth first. Every node keeps a
/// record of the merged input states it has seen along all the paths that
/// reached it so far. A path stops at a node when its input brings no new
/// information compared to that record, or when the node is already on the
/// path. The record only grows and the domains have finite height for a
/// given function, so the exploration terminates on cyclic graphs too.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExplorePaths {
    /// Approximate visit limit per node, see [`SolveMonotone::node_limit`].
    pub node_limit: usize,
}

impl Default for ExplorePaths {
    fn default() -> Self {
        Self { node_limit: 20 }
    }
}

impl ExplorePaths {
    /// Explore the CFG from its entry node. The post states are joined over
    /// all the explored paths.
    pub fn solve<Cfg, D, F>(
        self,
        cfg: &Cfg,
        seed: D,
        lat_ctx: &D::LatticeContext,
        transfer: &mut F,
    ) -> Result<Solution<D>, F::Error>
    where
        Cfg: ControlFlowGraph,
        D: JoinSemiLattice,
        F: TransferFunction<Cfg, D>,
    {
        let node_num = cfg.blocks().len();
        let mut solution = Solution {
            post_states: vec![D::bottom(lat_ctx); node_num],
            visits: vec![0; node_num],
            converged: true,
        };
        if node_num == 0 {
            return Ok(solution);
        }
        let mut seen = vec![D::bottom(lat_ctx); node_num];

        let limit = self.node_limit * node_num;
        let mut processed_nodes = 0_usize;
        let mut stack = vec![Frame {
            node: 0,
            skip_father: None,
            path: FixedBitSet::with_capacity(node_num),
        }];
        while let Some(Frame {
            node,
            skip_father,
            mut path,
        }) = stack.pop()
        {
            if path.contains(node) {
                continue;
            }

            let mut context = if node == 0 {
                seed.clone()
            } else {
                D::bottom(lat_ctx)
            };
            for &pred in cfg.blocks()[node].predecessors() {
                if skip_father == Some(pred) {
                    continue;
                }
                if let Some(transferred) =
                    transfer.edge(pred, node, cfg, lat_ctx, &solution.post_states[pred])
                {
                    context = context.join(&transferred, lat_ctx);
                }
            }

            if solution.visits[node] > 0 && seen[node].subsumes(&context) {
                trace!(block = node, "no new information, path cut off");
                continue;
            }
            if limit > 0 && processed_nodes >= limit {
                warn!(processed_nodes, "path explorer hit its iteration limit");
                solution.converged = false;
                break;
            }
            seen[node] = seen[node].join(&context, lat_ctx);

            let mut post_state = context;
            transfer.block(node, cfg, lat_ctx, &mut post_state)?;
            solution.post_states[node] = solution.post_states[node].join(&post_state, lat_ctx);
            solution.visits[node] += 1;
            processed_nodes += 1;
            trace!(block = node, "explored block");

            path.insert(node);
            for &son in cfg.blocks()[node].successors().iter().rev() {
                let skip_father = transfer.skip_father(node, son, cfg).then_some(node);
                stack.push(Frame {
                    node: son,
                    skip_father,
                    path: path.clone(),
                });
            }
        }
        debug!(processed_nodes, "path explorer finished");
        Ok(solution)
    }
}

