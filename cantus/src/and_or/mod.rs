//! The AND/OR protocol and its iterative-deepening engine, used for tree-structured decisions
//! where one decision spawns several independent sub-decisions (e.g. splitting a measure into
//! beats, then each beat into smaller pieces).
//!
//! Every decision point is an *OR-node*: a set of alternative expansions, exactly one of which is
//! eventually chosen.  Each alternative is an *AND-node*: an ordered set of sibling sub-decisions
//! which must all be solved before the alternative is.  The engine keeps the alternatives of every
//! OR-node in a heap ordered by their current score, and re-scores an alternative each time its
//! children are advanced by one level.

use std::fmt::Debug;

use cantus_utils::BigNumInt;
use index_vec::IndexVec;

use crate::Error;

mod tree;

use tree::OrNode;

/// A tree-structured decision problem which can be solved by [`run`].
///
/// **Greater scores are worse.**
pub trait AndOrModule {
    type Node;
    type Score: Clone + Ord + Debug;

    /// Returns the next top-level decision (e.g. the next measure), or `None` if there are none
    /// left.
    fn get_root(&mut self) -> Option<Self::Node>;

    /// Returns `true` if `node` needs no further expansion
    fn is_leaf(&self, node: &Self::Node) -> bool;

    /// Adds every way of splitting `node` into sub-decisions to `alts`.  Leaving `alts` empty
    /// means that `node` can't be solved.
    fn expand(&mut self, node: &Self::Node, alts: &mut Alternatives<Self::Node>);

    /// Creates a node summarising one alternative of `parent`, given the current best
    /// approximation of each of its children (in order).
    fn assemble(&mut self, parent: &Self::Node, children: &[&Self::Node]) -> Self::Node;

    fn score(&self, node: &Self::Node) -> Self::Score;

    /// Called with the solution for each root, in the order the roots were returned
    fn solution(&mut self, node: Self::Node);

    /// Release a node which the engine no longer needs.  Every node passed to the engine (by
    /// `get_root`, `expand` or `assemble`) is returned exactly once, either here or through
    /// [`AndOrModule::solution`].
    fn free_node(&mut self, node: Self::Node) {
        drop(node);
    }
}

index_vec::define_index_type! {
    /// The index of one alternative within an [`Alternatives`]
    pub struct AndNodeId = u32;
}

/// The alternatives produced by expanding a single OR-node.  Modules build these during
/// [`AndOrModule::expand`].
#[derive(Debug, Clone)]
pub struct Alternatives<N> {
    and_nodes: IndexVec<AndNodeId, Vec<N>>,
}

impl<N> Alternatives<N> {
    pub(crate) fn new() -> Self {
        Self {
            and_nodes: IndexVec::new(),
        }
    }

    /// Start a new (empty) alternative, returning its ID
    pub fn new_and_node(&mut self) -> AndNodeId {
        self.and_nodes.push(Vec::new())
    }

    /// Add `node` as the last child of the alternative `and_node`
    pub fn push_back(&mut self, and_node: AndNodeId, node: N) {
        self.and_nodes[and_node].push(node);
    }

    /// Add a whole alternative at once
    pub fn push_and_node(&mut self, children: impl IntoIterator<Item = N>) -> AndNodeId {
        self.and_nodes.push(children.into_iter().collect())
    }

    /// The children of the alternative `and_node`
    pub fn and_node(&self, and_node: AndNodeId) -> &[N] {
        &self.and_nodes[and_node]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[N]> {
        self.and_nodes.iter().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.and_nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.and_nodes.is_empty()
    }

    fn into_and_nodes(self) -> impl Iterator<Item = Vec<N>> {
        self.and_nodes.into_iter()
    }
}

/// Configuration for the AND/OR engine
#[derive(Debug, Clone)]
pub struct Config {
    /// The deepest budget given to a single root before giving up with [`Error::DepthLimit`].
    /// Each deepening step lets the best alternatives descend one level further.
    pub depth_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { depth_limit: 1024 }
    }
}

/// What happened during a run of the AND/OR engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    /// The number of roots which were solved
    pub solved: usize,
    /// The errors from every root which couldn't be solved
    pub failures: Vec<Error>,
}

/// Solve every root of `module`, passing each solution to [`AndOrModule::solution`].  A root which
/// can't be solved is logged and recorded in the returned [`Summary`], and the engine moves on to
/// the next root.
pub fn run<M: AndOrModule>(module: &mut M, config: &Config) -> Summary {
    run_with(module, config, |_, _| {})
}

/// Like [`run`], but calls `hook` with the current best approximation of the root (and its score)
/// after every deepening step.
pub fn run_with<M: AndOrModule>(
    module: &mut M,
    config: &Config,
    mut hook: impl FnMut(&M::Node, &M::Score),
) -> Summary {
    let mut summary = Summary::default();
    let mut tree = tree::Tree::new();
    let mut root_idx = 0;
    while let Some(root) = module.get_root() {
        match solve_root(module, config, &mut tree, root, root_idx, &mut hook) {
            Ok(()) => summary.solved += 1,
            Err(e) => {
                log::warn!("{}", e);
                summary.failures.push(e);
            }
        }
        root_idx += 1;
    }
    log::debug!(
        "Solved {} of {} roots ({} alternatives created)",
        summary.solved,
        root_idx,
        BigNumInt(tree.num_alternatives())
    );
    summary
}

fn solve_root<M: AndOrModule>(
    module: &mut M,
    config: &Config,
    tree: &mut tree::Tree,
    root: M::Node,
    root_idx: usize,
    hook: &mut impl FnMut(&M::Node, &M::Score),
) -> crate::Result<()> {
    let mut root = OrNode::new(module, root);
    let mut depth = 0;
    while !root.is_solved() {
        if depth > config.depth_limit {
            tree.free_or(module, root);
            return Err(Error::DepthLimit {
                root: root_idx,
                limit: config.depth_limit,
            });
        }
        if tree.proc(module, &mut root, depth).is_err() {
            tree.free_or(module, root);
            return Err(Error::NoSolution { root: root_idx });
        }
        let current = root.current();
        hook(current, &module.score(current));
        log::trace!("Root #{}: deepened to {}", root_idx, depth);
        depth += 1;
    }
    log::debug!("Root #{} solved at depth {}", root_idx, depth);
    let solution = tree.take_solution(module, root);
    module.solution(solution);
    Ok(())
}
