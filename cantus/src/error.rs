//! Error types for the different ways that a Cantus pass can fail.

use std::fmt::{Display, Formatter};

/// Alias for `Result<T, cantus::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The different ways that Cantus can fail.  Each of these aborts only the pass that produced it;
/// whether to stop the whole pipeline is up to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /* SEARCH ERRORS */
    /// Every live branch of a scored-choice search was invalid or pruned before the input ran out.
    /// `position` is the sequence position the search was unable to extend.
    NoChoices { position: usize },
    /// Some AND/OR root has no alternative whose sub-decisions can all be solved.  `root` counts
    /// the roots returned by the module, starting from 0.
    NoSolution { root: usize },
    /// The iterative deepening of some AND/OR root went past [`and_or::Config::depth_limit`]
    /// without reaching a solution.
    ///
    /// [`and_or::Config::depth_limit`]: crate::and_or::Config::depth_limit
    DepthLimit { root: usize, limit: usize },

    /* CONFIG ERRORS */
    /// The beam of a best-first search must be able to hold at least one node
    ZeroHeapSize,
    /// Time signatures need a non-zero numerator and a power-of-two denominator
    InvalidTimeSig { num: u32, den: u32 },
    /// The quantization grid needs at least one division per beat
    ZeroBeatDiv,
    /// Tuplet numerators must be at least 2
    InvalidTuplet(u32),

    /* INPUT ERRORS */
    /// A note ends before it starts
    NegativeDuration { onset: f64, end: f64 },
    /// Two notes given to the measure divider overlap
    OverlappingNotes { index: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            /* SEARCH ERRORS */
            Error::NoChoices { position } => write!(
                f,
                "no possible choices (can't continue past position {})",
                position
            ),
            Error::NoSolution { root } => write!(f, "no solution for root #{}", root),
            Error::DepthLimit { root, limit } => write!(
                f,
                "no solution for root #{} within the depth limit of {}",
                root, limit
            ),

            /* CONFIG ERRORS */
            Error::ZeroHeapSize => write!(f, "Search heap size must be at least 1"),
            Error::InvalidTimeSig { num, den } => write!(
                f,
                "Invalid time signature {}/{}: the denominator must be a power of two and the \
numerator non-zero",
                num, den
            ),
            Error::ZeroBeatDiv => write!(f, "Need at least one division per beat"),
            Error::InvalidTuplet(num) => {
                write!(f, "Tuplets need at least 2 notes, but {} was requested", num)
            }

            /* INPUT ERRORS */
            Error::NegativeDuration { onset, end } => write!(
                f,
                "Note starting at beat {} ends before it starts (at beat {})",
                onset, end
            ),
            Error::OverlappingNotes { index } => {
                write!(f, "Note #{} overlaps the note before it", index)
            }
        }
    }
}

impl std::error::Error for Error {}
