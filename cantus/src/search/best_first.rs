use std::{cmp::Reverse, collections::BinaryHeap};

use cantus_utils::{BigNumInt, FrontierItem};

use crate::Error;

use super::{
    chains::{Chains, Link, NodeId},
    Choice, ChoiceModule, Config, Expansion, Progress, Update,
};

/// Queue of nodes to expand.  The best node is the one with the lowest score, breaking ties by
/// creation order (older nodes first).
type ExpandQueue<S> = BinaryHeap<FrontierItem<NodeId, Reverse<(S, u64)>>>;
/// Queue of nodes to prune.  The 'greatest' node is the one furthest behind in the sequence, then
/// the one with the highest score, then the newest.
type PruneQueue<S> = BinaryHeap<FrontierItem<NodeId, (Reverse<usize>, S, u64)>>;

/// Searches a [`ChoiceModule`] best-first, keeping at most `config.heap_size` open branches.
pub(super) fn search<M: ChoiceModule>(
    module: &mut M,
    config: &Config,
    mut update_fn: impl FnMut(Update),
) -> crate::Result<()> {
    log::info!(
        "Limiting best-first beam to {} branches",
        BigNumInt(config.heap_size)
    );

    let mut search = BestFirst {
        chains: Chains::new(module.num_choices()),
        expand_queue: BinaryHeap::new(),
        prune_queue: BinaryHeap::new(),
        num_open: 0,
        iter_count: 0,
    };
    let result = search.run(module, config, &mut update_fn);

    // Always send a final update before finishing
    update_fn(Update::Progress(search.progress()));
    search.release_all(module);
    update_fn(Update::Complete);
    result
}

struct BestFirst<M: ChoiceModule> {
    chains: Chains<M>,
    expand_queue: ExpandQueue<M::Score>,
    prune_queue: PruneQueue<M::Score>,
    /// Number of nodes which are still waiting to be expanded
    num_open: usize,
    iter_count: usize,
}

impl<M: ChoiceModule> BestFirst<M> {
    fn run(
        &mut self,
        module: &mut M,
        config: &Config,
        update_fn: &mut impl FnMut(Update),
    ) -> crate::Result<()> {
        if self.expand(module, Link::Begin) {
            return Ok(()); // No input events at all
        }

        // Repeatedly choose the best open node and expand it (i.e. add every way of extending it
        // to the frontier)
        loop {
            let Some(id) = self.pop_best() else {
                return Err(Error::NoChoices {
                    position: self.chains.num_assigned(),
                });
            };
            let reached_end = self.expand(module, Link::Node(id));
            if reached_end {
                // `id` is the best way to finish the sequence
                self.chains.finish(Link::Node(id), module);
                self.chains.release(id, module);
                return Ok(());
            }
            // Drop the frontier's reference to `id`.  If none of its children were valid, this
            // kills it (and possibly its ancestors)
            self.chains.release(id, module);

            self.prune(module, config.heap_size);
            debug_assert!(self.num_open <= config.heap_size);

            // Commit any positions that every surviving branch agrees on
            let max_pos = self.furthest_behind().unwrap_or(usize::MAX);
            if self.chains.sweep(module, max_pos) > 0 {
                if let Some(anchor) = self.any_open() {
                    self.chains.retire(anchor, module);
                }
            }
            self.compact_queues();

            self.iter_count += 1;
            if self.iter_count % config.progress_interval.max(1) == 0 {
                update_fn(Update::Progress(self.progress()));
            }
        }
    }

    /// Add every valid successor of `parent` to the frontier.  Returns `true` if the module
    /// reported that `parent` is the end of the sequence.
    fn expand(&mut self, module: &mut M, parent: Link) -> bool {
        for choice in (0..module.num_choices()).map(Choice::new) {
            let node = match module.new_node(self.chains.prev_node(parent), choice) {
                Expansion::End => return true,
                Expansion::Invalid => continue,
                Expansion::Node(node) => node,
            };
            let score = self.chains.score_new(module, parent, &node);
            let id = self.chains.add(node, score.clone(), parent, choice);
            let chain_node = self.chains.get(id);
            let (pos, seq) = (chain_node.pos, chain_node.seq);

            self.expand_queue
                .push(FrontierItem::new(id, Reverse((score.clone(), seq))));
            self.prune_queue
                .push(FrontierItem::new(id, (Reverse(pos), score, seq)));
            self.num_open += 1;
        }
        false
    }

    /// Pop the best open node, marking it as no longer open
    fn pop_best(&mut self) -> Option<NodeId> {
        while let Some(entry) = self.expand_queue.pop() {
            let Reverse((_, seq)) = entry.distance;
            if self.chains.is_open(entry.item, seq) {
                self.chains.close(entry.item);
                self.num_open -= 1;
                return Some(entry.item);
            }
        }
        None
    }

    /// Kill the worst open nodes until the beam fits within `heap_size`
    fn prune(&mut self, module: &mut M, heap_size: usize) {
        while self.num_open > heap_size {
            let Some(entry) = self.prune_queue.pop() else {
                unreachable!("Every open node should be in the prune queue");
            };
            let (_, _, seq) = entry.distance;
            if self.chains.is_open(entry.item, seq) {
                self.chains.close(entry.item);
                self.num_open -= 1;
                self.chains.release(entry.item, module);
            }
        }
    }

    /// The position of the open node furthest behind in the sequence
    fn furthest_behind(&mut self) -> Option<usize> {
        while let Some(entry) = self.prune_queue.peek() {
            let (Reverse(pos), _, seq) = &entry.distance;
            if self.chains.is_open(entry.item, *seq) {
                return Some(*pos);
            }
            self.prune_queue.pop();
        }
        None
    }

    fn any_open(&self) -> Option<NodeId> {
        self.expand_queue
            .iter()
            .find(|entry| self.chains.is_open(entry.item, entry.distance.0 .1))
            .map(|entry| entry.item)
    }

    /// Remove stale entries once they start to dominate the queues
    fn compact_queues(&mut self) {
        let chains = &self.chains;
        if self.expand_queue.len() > 2 * self.num_open + 64 {
            self.expand_queue
                .retain(|entry| chains.is_open(entry.item, entry.distance.0 .1));
        }
        if self.prune_queue.len() > 2 * self.num_open + 64 {
            self.prune_queue
                .retain(|entry| chains.is_open(entry.item, entry.distance.2));
        }
    }

    /// Release every node still waiting in the frontier
    fn release_all(&mut self, module: &mut M) {
        for entry in std::mem::take(&mut self.expand_queue) {
            let Reverse((_, seq)) = entry.distance;
            if self.chains.is_open(entry.item, seq) {
                self.chains.close(entry.item);
                self.num_open -= 1;
                self.chains.release(entry.item, module);
            }
        }
        self.prune_queue.clear();
        assert_eq!(self.num_open, 0);
        self.chains.assert_empty();
    }

    fn progress(&self) -> Progress {
        Progress {
            iter_count: self.iter_count,
            queue_len: self.num_open,
            num_assigned: self.chains.num_assigned(),
            num_nodes: self.chains.num_nodes(),
        }
    }
}
