use std::ops::{Index, IndexMut};

use itertools::Itertools;

/// A collection of counts of live nodes, one per choice value, describing a single sequence
/// position.  The choices with non-zero counts form that position's open-choice set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Counts(Vec<usize>);

impl Counts {
    /// Creates a set of `Counts` where every count is 0.
    pub fn zeros(len: usize) -> Self {
        Self(vec![0; len])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&c| c == 0)
    }

    /// The number of distinct choices with at least one live node
    #[cfg(test)]
    pub fn num_open(&self) -> usize {
        self.0.iter().filter(|&&c| c > 0).count()
    }

    /// If exactly one choice is open, return it
    pub fn single_open(&self) -> Option<usize> {
        self.0.iter().positions(|&c| c > 0).exactly_one().ok()
    }
}

impl Index<usize> for Counts {
    type Output = usize;

    fn index(&self, idx: usize) -> &usize {
        &self.0[idx]
    }
}

impl IndexMut<usize> for Counts {
    fn index_mut(&mut self, idx: usize) -> &mut usize {
        &mut self.0[idx]
    }
}
