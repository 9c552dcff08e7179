use core::cmp::Reverse;
use std::collections::HashSet;

use priority_queue::PriorityQueue;

/// A node of a control flow graph. Nodes are identified by their index
/// in [`ControlFlowGraph::blocks`], and the node with index 0 is the entry.
pub trait CfgBlock {
    type Operation;

    fn operations(&self) -> &[Self::Operation];
    fn successors(&self) -> &[usize];
    fn predecessors(&self) -> &[usize];
}

pub trait ControlFlowGraph {
    type Block: CfgBlock;
    fn blocks(&self) -> &[Self::Block];
}

/// The position of an operation within a control flow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpPos {
    pub block_id: usize,
    pub op_id: usize,
}

pub fn print<Cfg, OpPrinter>(cfg: &Cfg, printer: OpPrinter) -> String
where
    Cfg: ControlFlowGraph,
    OpPrinter: Fn(&<<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation) -> String,
{
    let mut output = "digraph CFG {\n".to_owned();
    for (counter, block) in cfg.blocks().iter().enumerate() {
        let text: Vec<_> = block.operations().iter().map(&printer).collect();
        output.push_str(&format!("  Node_{counter}[label=\"{}\"]\n", text.join("\\n")));
    }
    output.push('\n');
    for (counter, block) in cfg.blocks().iter().enumerate() {
        for next in block.successors() {
            output.push_str(&format!("  Node_{counter} -> Node_{next}\n"));
        }
    }
    output.push_str("}\n");
    output
}

/// Depth first traversal from the entry node. Successors are visited in
/// reverse order so the resulting reverse post-order lists the first
/// successor of a branch before the second one.
///
/// Returns the post-order and the edges that point back to a node that
/// is still on the traversal stack.
fn depth_first<Cfg: ControlFlowGraph>(cfg: &Cfg) -> (Vec<usize>, Vec<(usize, usize)>) {
    let blocks = cfg.blocks();
    let mut post_order = Vec::with_capacity(blocks.len());
    let mut back_edges = Vec::new();
    if blocks.is_empty() {
        return (post_order, back_edges);
    }

    let mut visited = vec![false; blocks.len()];
    let mut on_stack = vec![false; blocks.len()];
    let mut stack = vec![(0_usize, blocks[0].successors().len())];
    visited[0] = true;
    on_stack[0] = true;
    while let Some((node, remaining)) = stack.last_mut() {
        let node = *node;
        if *remaining == 0 {
            stack.pop();
            on_stack[node] = false;
            post_order.push(node);
            continue;
        }
        *remaining -= 1;
        let next = blocks[node].successors()[*remaining];
        if on_stack[next] {
            back_edges.push((node, next));
        } else if !visited[next] {
            visited[next] = true;
            on_stack[next] = true;
            stack.push((next, blocks[next].successors().len()));
        }
    }
    (post_order, back_edges)
}

/// Returns the edges whose target is an ancestor of the source in the
/// depth first spanning tree. For reducible graphs these are the edges
/// pointing to loop heads.
pub fn get_back_edges<Cfg: ControlFlowGraph>(cfg: &Cfg) -> HashSet<(usize, usize)> {
    depth_first(cfg).1.into_iter().collect()
}

/// Returns the reverse post-order of the reachable nodes.
pub fn reverse_post_order<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Vec<usize> {
    let mut order = depth_first(cfg).0;
    order.reverse();
    order
}

/// A worklist that always returns the queued node that comes first in
/// reverse post-order. Nodes are never queued twice.
pub struct RPOWorklist {
    queue: PriorityQueue<usize, Reverse<usize>>,
    rpo_order: Vec<usize>,
}

impl RPOWorklist {
    pub fn new<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Self {
        let node_num = cfg.blocks().len();
        // Unreachable nodes are ordered after every reachable one.
        let mut rpo_order: Vec<usize> = (node_num..2 * node_num).collect();
        for (order, node) in reverse_post_order(cfg).into_iter().enumerate() {
            rpo_order[node] = order;
        }
        Self {
            queue: PriorityQueue::new(),
            rpo_order,
        }
    }

    pub fn get_rpo_order(&self, node: usize) -> usize {
        self.rpo_order[node]
    }

    pub fn push(&mut self, node: usize) {
        self.queue.push(node, Reverse(self.rpo_order[node]));
    }

    pub fn push_successors<Cfg: ControlFlowGraph>(&mut self, node: usize, cfg: &Cfg) {
        for &next in cfg.blocks()[node].successors() {
            self.push(next);
        }
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.queue.pop().map(|(node, _)| node)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
