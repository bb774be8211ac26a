//! Dynamic-programming engine.  Keeps exactly one node per [`Choice`] (the best chain ending in
//! that choice) and never backtracks.  Faster, lower quality: the result is only guaranteed to be
//! optimal when each node's score depends on at most one predecessor.

use index_vec::IndexVec;

use crate::Error;

use super::{
    chains::{Chains, Link, NodeId},
    Choice, ChoiceModule, Config, Expansion, Progress, Update,
};

/// The best way found so far to reach one choice at the next position
struct Candidate<M: ChoiceModule> {
    node: M::Node,
    score: M::Score,
    prev: Link,
}

type Frontier = IndexVec<Choice, Option<NodeId>>;

pub(super) fn search<M: ChoiceModule>(
    module: &mut M,
    config: &Config,
    mut update_fn: impl FnMut(Update),
) -> crate::Result<()> {
    let num_choices = module.num_choices();
    log::info!("Running dynamic programming over {} slots", num_choices);

    let mut chains = Chains::<M>::new(num_choices);
    let mut frontier: Frontier = (0..num_choices).map(|_| None).collect();
    let mut iter_count = 0;
    let result = run(
        module,
        config,
        &mut chains,
        &mut frontier,
        &mut iter_count,
        &mut update_fn,
    );

    update_fn(Update::Progress(progress(&chains, &frontier, iter_count)));
    for id in frontier.into_iter().flatten() {
        chains.release(id, module);
    }
    chains.assert_empty();
    update_fn(Update::Complete);
    result
}

fn run<M: ChoiceModule>(
    module: &mut M,
    config: &Config,
    chains: &mut Chains<M>,
    frontier: &mut Frontier,
    iter_count: &mut usize,
    update_fn: &mut impl FnMut(Update),
) -> crate::Result<()> {
    let mut at_begin = true;
    loop {
        let parents: Vec<Link> = if at_begin {
            vec![Link::Begin]
        } else {
            frontier.iter().flatten().map(|&id| Link::Node(id)).collect()
        };

        let mut candidates: IndexVec<Choice, Option<Candidate<M>>> =
            (0..frontier.len()).map(|_| None).collect();
        let mut reached_end = false;
        'parents: for &prev in &parents {
            for choice in (0..frontier.len()).map(Choice::new) {
                let node = match module.new_node(chains.prev_node(prev), choice) {
                    Expansion::End => {
                        reached_end = true;
                        break 'parents;
                    }
                    Expansion::Invalid => continue,
                    Expansion::Node(node) => node,
                };
                let score = chains.score_new(module, prev, &node);
                // Only replace the incumbent if strictly better, so earlier parents win ties
                let slot = &mut candidates[choice];
                if slot.as_ref().is_some_and(|inc| inc.score <= score) {
                    module.free_node(node);
                } else if let Some(loser) = slot.replace(Candidate { node, score, prev }) {
                    module.free_node(loser.node);
                }
            }
        }

        if reached_end {
            for cand in candidates.into_iter().flatten() {
                module.free_node(cand.node);
            }
            // Finish with the best chain that reached the last position
            let best = frontier
                .iter()
                .flatten()
                .min_by_key(|&&id| {
                    let n = chains.get(id);
                    (n.score.clone(), n.seq)
                })
                .map_or(Link::Begin, |&id| Link::Node(id));
            chains.finish(best, module);
            return Ok(());
        }

        if candidates.iter().all(Option::is_none) {
            return Err(Error::NoChoices {
                position: chains.num_assigned(),
            });
        }

        // Replace the frontier with the winning candidates
        let old_frontier: Vec<NodeId> = frontier.iter().flatten().copied().collect();
        for (choice, cand) in candidates.into_iter_enumerated() {
            frontier[choice] = cand.map(|c| chains.add(c.node, c.score, c.prev, choice));
        }
        for id in old_frontier {
            chains.close(id);
            chains.release(id, module);
        }
        at_begin = false;

        // Every slot is at the same position, so nothing can branch off before it
        let anchor = frontier.iter().flatten().next().copied();
        if let Some(anchor) = anchor {
            let pos = chains.get(anchor).pos;
            if chains.sweep(module, pos) > 0 {
                chains.retire(anchor, module);
            }
        }

        *iter_count += 1;
        log::trace!(
            "Step {}: {} slots filled, {} positions committed",
            iter_count,
            frontier.iter().flatten().count(),
            chains.num_assigned()
        );
        if *iter_count % config.progress_interval.max(1) == 0 {
            update_fn(Update::Progress(progress(chains, frontier, *iter_count)));
        }
    }
}

fn progress<M: ChoiceModule>(
    chains: &Chains<M>,
    frontier: &Frontier,
    iter_count: usize,
) -> Progress {
    Progress {
        iter_count,
        queue_len: frontier.iter().flatten().count(),
        num_assigned: chains.num_assigned(),
        num_nodes: chains.num_nodes(),
    }
}
