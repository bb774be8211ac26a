//! Small helpers shared between the Cantus crates.

use std::{cmp::Ordering, fmt::Display};

use number_prefix::NumberPrefix;

/// A container type which sorts its contents according to some given distance metric.  This lets
/// items which aren't [`Ord`] live in a [`BinaryHeap`](std::collections::BinaryHeap).
#[derive(Debug, Clone)]
pub struct FrontierItem<Item, Dist> {
    pub item: Item,
    pub distance: Dist,
}

impl<Item, Dist> FrontierItem<Item, Dist> {
    pub fn new(item: Item, distance: Dist) -> Self {
        Self { item, distance }
    }
}

impl<Item, Dist: PartialEq> PartialEq for FrontierItem<Item, Dist> {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl<Item, Dist: Eq> Eq for FrontierItem<Item, Dist> {}

impl<Item, Dist: Ord> PartialOrd for FrontierItem<Item, Dist> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Item, Dist: Ord> Ord for FrontierItem<Item, Dist> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.cmp(&other.distance)
    }
}

/// Wrapper over [`usize`] which formats large numbers with SI prefixes (e.g. `12.3M` instead of
/// `12300000`).  Used to keep log lines readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BigNumInt(pub usize);

impl Display for BigNumInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match NumberPrefix::decimal(self.0 as f64) {
            NumberPrefix::Standalone(n) => write!(f, "{}", n as usize),
            NumberPrefix::Prefixed(prefix, n) => write!(f, "{:.1}{}", n, prefix.symbol()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::{BigNumInt, FrontierItem};

    #[test]
    fn big_num_int() {
        #[track_caller]
        fn check(n: usize, exp: &str) {
            assert_eq!(BigNumInt(n).to_string(), exp);
        }

        check(0, "0");
        check(999, "999");
        check(1_000, "1.0k");
        check(12_300_000, "12.3M");
    }

    #[test]
    fn frontier_orders_by_distance() {
        let mut heap = BinaryHeap::new();
        heap.push(FrontierItem::new("b", 2));
        heap.push(FrontierItem::new("c", 3));
        heap.push(FrontierItem::new("a", 1));
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|i| i.item)).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }
}
