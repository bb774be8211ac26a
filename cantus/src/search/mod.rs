//! The scored-choice protocol, and the two engines which search it.
//!
//! A [`ChoiceModule`] describes a sequence of decisions (one per input event), each of which picks
//! one of a small fixed set of [`Choice`]s.  The engines build chains of nodes (one node per
//! decision, linked backwards to the first), score each node against a bounded window of its
//! predecessors, and commit decisions to the module (via [`ChoiceModule::assign`]) as soon as every
//! surviving branch agrees on them.  Memory is therefore bounded by the width of the search, not
//! by the length of the input.

use std::{fmt::Debug, ops::Add};

use cantus_utils::BigNumInt;

use crate::Error;

mod best_first;
mod chains;
mod dynamic;

index_vec::define_index_type! {
    /// The index of one option in a [`ChoiceModule`]'s alphabet.  What each value means (an
    /// accidental, a voice, a clef, ...) is entirely up to the module.
    pub struct Choice = u32;
}

/// The result of asking a [`ChoiceModule`] to interpret the next input event under some
/// [`Choice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion<N> {
    /// The next event, interpreted under the given choice
    Node(N),
    /// The choice isn't valid for the next event (e.g. it conflicts with a user override).  This is
    /// normal pruning, not an error.
    Invalid,
    /// There are no more input events
    End,
}

/// A decision problem which can be searched by either engine.  Modules only supply local
/// knowledge (what the next node is, how much it costs); the engines own all the nodes and decide
/// which branches survive.
///
/// Scores accumulate along chains of nodes using `Score`'s [`Add`] impl, and are compared using
/// its [`Ord`] impl.  **Greater scores are worse.**
pub trait ChoiceModule {
    /// The module's payload for one partial decision.  Nodes are created by
    /// [`ChoiceModule::new_node`] and handed back exactly once through
    /// [`ChoiceModule::free_node`].
    type Node;
    type Score: Clone + Ord + Add<Output = Self::Score> + Debug;

    /// The number of choices available for every event.  Must stay fixed for a whole run.
    fn num_choices(&self) -> usize;

    /// Create the node which follows `prev` under `choice`.  `prev` is `None` for the first event
    /// (i.e. the predecessor is the start of the sequence).  Must be deterministic.
    fn new_node(&self, prev: Option<&Self::Node>, choice: Choice) -> Expansion<Self::Node>;

    /// The marginal score of the last node in `window`, given the nodes before it (ordered oldest
    /// to newest).  The window only contains predecessors which aren't
    /// [out of range](Self::is_out_of_range) of the last node.
    fn score(&self, window: &[&Self::Node]) -> Self::Score;

    /// Returns `true` if `earlier` can no longer influence the score of `later`.  This must be
    /// monotone: once a node is out of range of some node, it's out of range of every node after
    /// it.
    fn is_out_of_range(&self, earlier: &Self::Node, later: &Self::Node) -> bool;

    /// Commit the decision for the next sequence position.  Called exactly once per position,
    /// left to right.
    fn assign(&mut self, choice: Choice);

    /// Release a node which the engine no longer needs.
    fn free_node(&mut self, node: Self::Node) {
        drop(node);
    }
}

/// Configuration determining **how** a scored-choice search runs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which engine to run
    pub engine: EngineKind,
    /// The maximum number of open branches kept by the best-first engine.  When the beam gets
    /// larger than this, the branches furthest behind are pruned.
    pub heap_size: usize,
    /// The number of iterations between [`Update::Progress`] messages
    pub progress_interval: usize,
}

impl Config {
    pub fn validate(&self) -> crate::Result<()> {
        if self.heap_size == 0 {
            return Err(Error::ZeroHeapSize);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineKind::BestFirst,
            heap_size: 1024,
            progress_interval: 10_000,
        }
    }
}

/// The available scored-choice engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Bounded-memory best-first search with backtracking
    BestFirst,
    /// One node per choice, no backtracking.  Faster, lower quality.
    DynamicProgramming,
}

/// An update sent to the caller while a search runs
#[derive(Debug, Clone)]
pub enum Update {
    Progress(Progress),
    /// The search has finished (successfully or not)
    Complete,
}

/// How far through its input a search has got
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// How many steps have been run
    pub iter_count: usize,
    /// The number of open (i.e. not yet expanded) branches
    pub queue_len: usize,
    /// The number of sequence positions whose choice has been committed
    pub num_assigned: usize,
    /// The number of nodes currently held by the engine (open or not)
    pub num_nodes: usize,
}

/// Run a scored-choice search over `module` with the engine selected in `config`, committing every
/// decision through [`ChoiceModule::assign`].
pub fn run<M: ChoiceModule>(
    module: &mut M,
    config: &Config,
    update_fn: impl FnMut(Update),
) -> crate::Result<()> {
    config.validate()?;
    log::debug!(
        "Running {:?} search over {} choices (heap size {})",
        config.engine,
        module.num_choices(),
        BigNumInt(config.heap_size)
    );
    match config.engine {
        EngineKind::BestFirst => best_first::search(module, config, update_fn),
        EngineKind::DynamicProgramming => dynamic::search(module, config, update_fn),
    }
}

#[cfg(test)]
pub(crate) mod test_modules {
    //! Small modules shared by the engine tests

    use std::{cell::Cell, collections::HashSet};

    use ordered_float::OrderedFloat;

    use super::{Choice, ChoiceModule, Expansion};

    /// A chain of events where the cost of each choice at each position is looked up in a table
    /// (`None` marks an invalid choice).  Optionally adds a cost for changing choice between
    /// neighbours, so that the best choice at one position depends on the next.
    #[derive(Debug)]
    pub struct TableModule {
        pub costs: Vec<Vec<Option<f64>>>,
        pub change_cost: f64,
        pub assigned: Vec<usize>,
        /// IDs of every node passed to `free_node`
        pub freed: HashSet<u64>,
        /// Number of nodes created so far (also used to generate node IDs)
        pub created: Cell<u64>,
    }

    #[derive(Debug)]
    pub struct TableNode {
        pub idx: usize,
        pub choice: usize,
        pub id: u64,
    }

    impl TableModule {
        pub fn new(costs: Vec<Vec<Option<f64>>>, change_cost: f64) -> Self {
            Self {
                costs,
                change_cost,
                assigned: Vec::new(),
                freed: HashSet::new(),
                created: Cell::new(0),
            }
        }

        fn cost_of(&self, assignment: &[usize]) -> Option<f64> {
            let mut total = 0.0;
            for (i, &c) in assignment.iter().enumerate() {
                total += self.costs[i][c]?;
                if i > 0 && assignment[i - 1] != c {
                    total += self.change_cost;
                }
            }
            Some(total)
        }

        /// The cheapest total cost over every possible assignment, found by brute force
        pub fn brute_force(&self) -> Option<(f64, Vec<usize>)> {
            let num_choices = self.num_choices();
            let mut best: Option<(f64, Vec<usize>)> = None;
            let mut current = vec![0; self.costs.len()];
            loop {
                if let Some(total) = self.cost_of(&current) {
                    if best.as_ref().map_or(true, |(b, _)| total < *b) {
                        best = Some((total, current.clone()));
                    }
                }
                // Increment `current` like an odometer
                let mut i = current.len();
                loop {
                    if i == 0 {
                        return best;
                    }
                    i -= 1;
                    current[i] += 1;
                    if current[i] < num_choices {
                        break;
                    }
                    current[i] = 0;
                }
            }
        }

        pub fn assigned_cost(&self) -> Option<f64> {
            self.cost_of(&self.assigned)
        }
    }

    impl ChoiceModule for TableModule {
        type Node = TableNode;
        type Score = OrderedFloat<f64>;

        fn num_choices(&self) -> usize {
            self.costs.first().map_or(1, Vec::len)
        }

        fn new_node(&self, prev: Option<&TableNode>, choice: Choice) -> Expansion<TableNode> {
            let idx = prev.map_or(0, |p| p.idx + 1);
            let Some(row) = self.costs.get(idx) else {
                return Expansion::End;
            };
            if row[choice.index()].is_none() {
                return Expansion::Invalid;
            }
            let id = self.created.get();
            self.created.set(id + 1);
            Expansion::Node(TableNode {
                idx,
                choice: choice.index(),
                id,
            })
        }

        fn score(&self, window: &[&TableNode]) -> OrderedFloat<f64> {
            let last = window[window.len() - 1];
            let mut cost = self.costs[last.idx][last.choice].unwrap();
            if let [.., before, _] = window {
                if before.choice != last.choice {
                    cost += self.change_cost;
                }
            }
            OrderedFloat(cost)
        }

        fn is_out_of_range(&self, earlier: &TableNode, later: &TableNode) -> bool {
            later.idx - earlier.idx > 1
        }

        fn assign(&mut self, choice: Choice) {
            self.assigned.push(choice.index());
        }

        fn free_node(&mut self, node: TableNode) {
            assert!(self.freed.insert(node.id), "node {} freed twice", node.id);
        }
    }
}
