use std::{cmp::Reverse, collections::BinaryHeap};

use cantus_utils::FrontierItem;

use super::{Alternatives, AndOrModule};

/// The state of a partially solved AND/OR tree.  Per-node state lives in the [`OrNode`]s
/// themselves, so a tree can be advanced a few levels at a time and picked up again by the next
/// call to [`Tree::proc`].
pub(super) struct Tree {
    next_seq: u64,
    num_alternatives: usize,
}

/// Marker for an OR-node which has no solvable alternative left
#[derive(Debug, Clone, Copy)]
pub(super) struct Unsolvable;

pub(super) struct OrNode<M: AndOrModule> {
    node: M::Node,
    state: OrState<M>,
}

enum OrState<M: AndOrModule> {
    /// A leaf, so `node` is its own solution
    Leaf,
    Unexpanded,
    /// Expanded, with the (unsolved) alternatives ordered best first
    Open(AltHeap<M>),
    /// The assembled node of the winning alternative
    Solved(M::Node),
}

type AltHeap<M> = BinaryHeap<FrontierItem<AndNode<M>, Reverse<(<M as AndOrModule>::Score, u64)>>>;

/// One alternative of an [`OrNode`]
struct AndNode<M: AndOrModule> {
    children: Vec<OrNode<M>>,
    /// Summary of the children's current best approximations
    assembled: M::Node,
}

impl<M: AndOrModule> OrNode<M> {
    pub fn new(module: &M, node: M::Node) -> Self {
        let state = if module.is_leaf(&node) {
            OrState::Leaf
        } else {
            OrState::Unexpanded
        };
        Self { node, state }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self.state, OrState::Leaf | OrState::Solved(_))
    }

    /// The best approximation of this node's solution found so far
    pub fn current(&self) -> &M::Node {
        match &self.state {
            OrState::Solved(solution) => solution,
            OrState::Open(heap) => heap.peek().map_or(&self.node, |alt| &alt.item.assembled),
            OrState::Leaf | OrState::Unexpanded => &self.node,
        }
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            num_alternatives: 0,
        }
    }

    pub fn num_alternatives(&self) -> usize {
        self.num_alternatives
    }

    /// Advance `or` by (at most) `depth` levels.  Unexpanded nodes are always expanded, but an
    /// alternative's children are only advanced while there is depth budget left.
    pub fn proc<M: AndOrModule>(
        &mut self,
        module: &mut M,
        or: &mut OrNode<M>,
        depth: usize,
    ) -> Result<(), Unsolvable> {
        match &mut or.state {
            OrState::Leaf | OrState::Solved(_) => Ok(()),
            OrState::Unexpanded => {
                let mut alts = Alternatives::new();
                module.expand(&or.node, &mut alts);
                let mut heap = BinaryHeap::new();
                for children in alts.into_and_nodes() {
                    let children = children
                        .into_iter()
                        .map(|n| OrNode::new(&*module, n))
                        .collect();
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    self.num_alternatives += 1;
                    self.push(module, &or.node, &mut heap, children, seq);
                }
                if heap.is_empty() {
                    return Err(Unsolvable);
                }
                or.state = OrState::Open(heap);
                Ok(())
            }
            OrState::Open(heap) => {
                if let Some(solution) = self.proc_open(module, &or.node, heap, depth)? {
                    or.state = OrState::Solved(solution);
                }
                Ok(())
            }
        }
    }

    /// Advance the best alternative of an expanded node, returning the assembled solution if that
    /// alternative turns out to be solved.
    fn proc_open<M: AndOrModule>(
        &mut self,
        module: &mut M,
        parent: &M::Node,
        heap: &mut AltHeap<M>,
        depth: usize,
    ) -> Result<Option<M::Node>, Unsolvable> {
        loop {
            let Some(FrontierItem { item, distance }) = heap.pop() else {
                return Err(Unsolvable);
            };
            let AndNode {
                mut children,
                assembled,
            } = item;
            let Reverse((_, seq)) = distance;

            if children.iter().all(OrNode::is_solved) {
                // This is the best alternative, so every other one can be discarded
                for alt in std::mem::take(heap) {
                    self.free_and(module, alt.item);
                }
                for child in children {
                    self.free_or(module, child);
                }
                return Ok(Some(assembled));
            }
            if depth == 0 {
                let and = AndNode {
                    children,
                    assembled,
                };
                heap.push(FrontierItem::new(and, distance));
                return Ok(None);
            }

            let mut failed = false;
            for child in children.iter_mut().filter(|c| !c.is_solved()) {
                if self.proc(module, child, depth - 1).is_err() {
                    failed = true;
                    break;
                }
            }
            module.free_node(assembled);
            if failed {
                for child in children {
                    self.free_or(module, child);
                }
                continue; // Try the next best alternative
            }
            self.push(module, parent, heap, children, seq);
            return Ok(None);
        }
    }

    /// Assemble and score an alternative, then add it to `heap`
    fn push<M: AndOrModule>(
        &mut self,
        module: &mut M,
        parent: &M::Node,
        heap: &mut AltHeap<M>,
        children: Vec<OrNode<M>>,
        seq: u64,
    ) {
        let current = children.iter().map(OrNode::current).collect::<Vec<_>>();
        let assembled = module.assemble(parent, &current);
        let score = module.score(&assembled);
        let and = AndNode {
            children,
            assembled,
        };
        heap.push(FrontierItem::new(and, Reverse((score, seq))));
    }

    /// Consume a solved root, returning its solution and freeing everything else
    pub fn take_solution<M: AndOrModule>(&mut self, module: &mut M, root: OrNode<M>) -> M::Node {
        match root.state {
            OrState::Leaf => root.node,
            OrState::Solved(solution) => {
                module.free_node(root.node);
                solution
            }
            OrState::Unexpanded | OrState::Open(_) => {
                unreachable!("Only solved nodes have solutions")
            }
        }
    }

    /// Free an OR-node and everything beneath it
    pub fn free_or<M: AndOrModule>(&mut self, module: &mut M, or: OrNode<M>) {
        match or.state {
            OrState::Open(heap) => {
                for alt in heap {
                    self.free_and(module, alt.item);
                }
            }
            OrState::Solved(solution) => module.free_node(solution),
            OrState::Leaf | OrState::Unexpanded => {}
        }
        module.free_node(or.node);
    }

    fn free_and<M: AndOrModule>(&mut self, module: &mut M, and: AndNode<M>) {
        for child in and.children {
            self.free_or(module, child);
        }
        module.free_node(and.assembled);
    }
}
