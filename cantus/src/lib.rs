//! Cantus is a set of search engines for deciding how performed music should be notated.
//!
//! Turning a performance (e.g. a MIDI recording) into a score means making a huge number of small
//! decisions, most of which depend on their neighbours: which clef each note should be written in,
//! where each note really started, whether a note should be written as a dotted crotchet or as two
//! tied quavers.  Cantus provides two kinds of engine for these decisions, along with the modules
//! which drive them:
//!
//! - **Scored-choice** ([`search`]): a sequence of decisions where each one picks from a small
//!   fixed alphabet, and is scored against a bounded window of the decisions before it.  Searched
//!   either best-first with a bounded beam, or by dynamic programming.  Decisions are committed
//!   as soon as every surviving branch agrees on them, so long inputs run in bounded memory.
//!   [`clef`] chooses clefs this way.
//! - **AND/OR** ([`and_or`]): tree-shaped decisions where choosing one alternative creates several
//!   independent sub-decisions.  Searched by iterative deepening.  [`quantize`] (snapping
//!   performed times onto a grid) and [`divide`] (splitting notes into notatable pieces) both
//!   search the tree of ways to divide a measure, given by [`division`].
//!
//! All times are exact ([`Time`], in quarter-note beats), so divisions always tile their parents
//! exactly.

#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links, rustdoc::private_intra_doc_links)]

pub mod and_or;
pub mod clef;
pub mod distance;
pub mod divide;
pub mod division;
mod error;
pub mod quantize;
pub mod search;
pub mod time;
mod utils;

pub use error::{Error, Result};
pub use time::{Time, TimeSig};
