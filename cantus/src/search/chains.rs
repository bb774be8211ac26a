use std::collections::VecDeque;

use index_vec::IndexVec;

use crate::utils::Counts;

use super::{Choice, ChoiceModule};

/// A container of partial decision chains, stored as a linked-list style tree such that common
/// prefixes are only stored once.  Every node holds a strong count: one for the engine (while the
/// node is in the frontier) plus one per live successor.  When the count hits zero, the node is
/// reclaimed and its predecessor released in turn.
///
/// Alongside the nodes, every sequence position has a set of [`Counts`] recording how many live
/// nodes claim each [`Choice`] at that position.  A position can be committed exactly when a
/// single choice remains open.
pub(super) struct Chains<M: ChoiceModule> {
    /// Flat arena of nodes.  Empty slots form a linked list, of which `first_empty` is the head.
    slots: IndexVec<NodeId, Slot<M>>,
    first_empty: Option<NodeId>,
    /// Number of non-empty slots
    num_nodes: usize,

    num_choices: usize,
    /// `counters[i]` describes sequence position `first_counter_pos + i`
    counters: VecDeque<Counts>,
    first_counter_pos: usize,
    /// Positions before this have been passed to `ChoiceModule::assign`
    num_assigned: usize,

    next_seq: u64,
}

enum Slot<M: ChoiceModule> {
    Full(ChainNode<M>),
    Empty { next: Option<NodeId> },
}

pub(super) struct ChainNode<M: ChoiceModule> {
    pub node: M::Node,
    /// Accumulated score of the whole chain up to and including this node
    pub score: M::Score,
    pub prev: Link,
    pub pos: usize,
    pub choice: Choice,
    /// Creation order, used to break ties between equal scores (older nodes win)
    pub seq: u64,
    /// `true` if this node is still waiting to be expanded
    pub open: bool,
    refs: usize,
}

/// The predecessor of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Link {
    /// The node is at the first sequence position
    Begin,
    Node(NodeId),
    /// The predecessor was committed and then reclaimed because it could no longer influence any
    /// scores
    Retired,
}

impl<M: ChoiceModule> Chains<M> {
    pub fn new(num_choices: usize) -> Self {
        Self {
            slots: IndexVec::new(),
            first_empty: None,
            num_nodes: 0,

            num_choices,
            counters: VecDeque::new(),
            first_counter_pos: 0,
            num_assigned: 0,

            next_seq: 0,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_assigned(&self) -> usize {
        self.num_assigned
    }

    #[track_caller]
    pub fn get(&self, id: NodeId) -> &ChainNode<M> {
        match &self.slots[id] {
            Slot::Full(node) => node,
            Slot::Empty { .. } => panic!("{:?} refers to a reclaimed node", id),
        }
    }

    #[track_caller]
    fn get_mut(&mut self, id: NodeId) -> &mut ChainNode<M> {
        match &mut self.slots[id] {
            Slot::Full(node) => node,
            Slot::Empty { .. } => panic!("{:?} refers to a reclaimed node", id),
        }
    }

    /// The module's payload for the predecessor given by `link`, if there is one
    pub fn prev_node(&self, link: Link) -> Option<&M::Node> {
        match link {
            Link::Node(id) => Some(&self.get(id).node),
            Link::Begin => None,
            Link::Retired => unreachable!("Retired nodes can't be expanded"),
        }
    }

    /// Returns `true` if `id` still refers to the node created with `seq`, and that node is still
    /// waiting to be expanded.  Used to skip stale queue entries.
    pub fn is_open(&self, id: NodeId, seq: u64) -> bool {
        match self.slots.get(id) {
            Some(Slot::Full(node)) => node.seq == seq && node.open,
            _ => false,
        }
    }

    /// Mark an open node as expanded (or pruned).  Its frontier reference is **not** released.
    pub fn close(&mut self, id: NodeId) {
        let node = self.get_mut(id);
        assert!(node.open, "{:?} closed twice", id);
        node.open = false;
    }

    /// Compute the accumulated score of a new node which would follow `prev`.
    pub fn score_new(&self, module: &M, prev: Link, node: &M::Node) -> M::Score {
        // Build the window of predecessors which can still influence `node`
        let mut window = vec![node];
        let mut link = prev;
        while let Link::Node(id) = link {
            let pred = self.get(id);
            if module.is_out_of_range(&pred.node, node) {
                break;
            }
            window.push(&pred.node);
            link = pred.prev;
        }
        window.reverse();

        let marginal = module.score(&window);
        match prev {
            Link::Node(id) => self.get(id).score.clone() + marginal,
            Link::Begin | Link::Retired => marginal,
        }
    }

    /// Adds a new open node after `prev`, returning its [`NodeId`].  The caller owns the new
    /// node's frontier reference.
    pub fn add(&mut self, node: M::Node, score: M::Score, prev: Link, choice: Choice) -> NodeId {
        let pos = match prev {
            Link::Begin => 0,
            Link::Node(id) => {
                let pred = self.get_mut(id);
                pred.refs += 1;
                pred.pos + 1
            }
            Link::Retired => unreachable!("Nodes can't be added after retired nodes"),
        };
        assert!(
            pos >= self.num_assigned,
            "Node added at already committed position {}",
            pos
        );
        assert!(choice.index() < self.num_choices);
        self.counter_mut(pos)[choice.index()] += 1;

        let seq = self.next_seq;
        self.next_seq += 1;
        let chain_node = ChainNode {
            node,
            score,
            prev,
            pos,
            choice,
            seq,
            open: true,
            refs: 1,
        };

        self.num_nodes += 1;
        match self.first_empty {
            // No more empty slots, so push to the vector
            None => self.slots.push(Slot::Full(chain_node)),
            // Otherwise, reuse the first empty slot and remove it from the empty list
            Some(empty_idx) => {
                self.first_empty = match self.slots[empty_idx] {
                    Slot::Empty { next } => next,
                    Slot::Full(_) => panic!("`first_empty` pointed to a full slot"),
                };
                self.slots[empty_idx] = Slot::Full(chain_node);
                empty_idx
            }
        }
    }

    /// Drop one reference to `id`, reclaiming it (and possibly its predecessors) if that was the
    /// last one.
    pub fn release(&mut self, id: NodeId, module: &mut M) {
        let mut link = Link::Node(id);
        while let Link::Node(id) = link {
            let node = self.get_mut(id);
            assert!(node.refs > 0, "{:?} released too many times", id);
            node.refs -= 1;
            if node.refs > 0 {
                break; // Still used by some other branch
            }

            let next = self.first_empty;
            let Slot::Full(node) = std::mem::replace(&mut self.slots[id], Slot::Empty { next })
            else {
                unreachable!()
            };
            self.first_empty = Some(id);
            self.num_nodes -= 1;

            let count = &mut self.counter_mut(node.pos)[node.choice.index()];
            assert!(*count > 0, "Node counter for position {} underflowed", node.pos);
            *count -= 1;

            link = node.prev;
            module.free_node(node.node);
        }
        self.drop_drained_counters();
    }

    /// Commit every position (left to right) whose open-choice set contains exactly one choice,
    /// stopping at the first position which doesn't.  Returns the number of newly committed
    /// positions.
    ///
    /// Positions after `max_pos` are never committed.  Open nodes only grow new branches after
    /// their own position, so this should be the position of the open node furthest behind.
    pub fn sweep(&mut self, module: &mut M, max_pos: usize) -> usize {
        let mut num_committed = 0;
        while self.num_assigned <= max_pos {
            let Some(counts) = self.counters.get(self.num_assigned - self.first_counter_pos) else {
                break;
            };
            match counts.single_open() {
                Some(choice) => {
                    module.assign(Choice::new(choice));
                    self.num_assigned += 1;
                    num_committed += 1;
                }
                None => break,
            }
        }
        num_committed
    }

    /// Detach and reclaim committed nodes which can no longer influence any future score.
    /// `anchor` can be any live node.
    ///
    /// Every committed position has exactly one live node, so the committed nodes form a single
    /// chain ending in the newest committed node.  Anything on that chain which is out of range of
    /// the newest node is out of range of everything after it too.
    pub fn retire(&mut self, anchor: NodeId, module: &mut M) {
        // Find the newest committed node
        let mut newest = anchor;
        while self.get(newest).pos >= self.num_assigned {
            match self.get(newest).prev {
                Link::Node(id) => newest = id,
                Link::Begin | Link::Retired => return, // Nothing committed on this chain
            }
        }
        // Walk back until we find a predecessor which is out of range, and cut the chain there
        let mut child = newest;
        while let Link::Node(pred) = self.get(child).prev {
            if module.is_out_of_range(&self.get(pred).node, &self.get(newest).node) {
                self.get_mut(child).prev = Link::Retired;
                self.release(pred, module);
                return;
            }
            child = pred;
        }
    }

    /// Commit the choices along the chain ending at `end` for every position which hasn't yet been
    /// committed.
    pub fn finish(&mut self, end: Link, module: &mut M) {
        let mut choices = Vec::new();
        let mut link = end;
        while let Link::Node(id) = link {
            let node = self.get(id);
            if node.pos < self.num_assigned {
                break;
            }
            choices.push(node.choice);
            link = node.prev;
        }
        for choice in choices.into_iter().rev() {
            module.assign(choice);
            self.num_assigned += 1;
        }
    }

    /// Panics unless every node has been reclaimed and every counter drained.
    pub fn assert_empty(&self) {
        assert_eq!(self.num_nodes, 0, "Nodes still alive at the end of a search");
        assert!(
            self.counters.iter().all(Counts::is_zero),
            "Node counters not released at the end of a search"
        );
    }

    #[track_caller]
    fn counter_mut(&mut self, pos: usize) -> &mut Counts {
        assert!(
            pos >= self.first_counter_pos,
            "Counter for position {} was destroyed while still in use",
            pos
        );
        let idx = pos - self.first_counter_pos;
        while self.counters.len() <= idx {
            self.counters.push_back(Counts::zeros(self.num_choices));
        }
        &mut self.counters[idx]
    }

    /// Destroy counters of committed positions once all their nodes are gone
    fn drop_drained_counters(&mut self) {
        while self.first_counter_pos < self.num_assigned
            && self.counters.front().is_some_and(Counts::is_zero)
        {
            self.counters.pop_front();
            self.first_counter_pos += 1;
        }
    }

    #[cfg(test)]
    pub fn num_counters(&self) -> usize {
        self.counters.len()
    }

    #[cfg(test)]
    pub fn open_choices(&self, pos: usize) -> usize {
        pos.checked_sub(self.first_counter_pos)
            .and_then(|idx| self.counters.get(idx))
            .map_or(0, Counts::num_open)
    }
}

index_vec::define_index_type! {
    pub(super) struct NodeId = u32;
}
