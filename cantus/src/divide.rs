//! Measure division: splitting already-quantized notes into notatable pieces (tying them where
//! needed) using the same division tree as the [quantizer](crate::quantize).

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::{
    and_or::{self, Alternatives, AndOrModule},
    division::{DivRules, Division, RulesConfig, Tiling, TupletLevel},
    time::{self, Time, TimeSig},
    Error,
};

/// A (quantized) note within one voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteSpan {
    pub time: Time,
    pub dur: Time,
}

impl NoteSpan {
    pub fn new(time: Time, dur: Time) -> Self {
        Self { time, dur }
    }

    fn end(self) -> Time {
        self.time + self.dur
    }
}

/// The costs which the divider minimises
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub tie: f64,
    /// Added (on top of `tie`) for ties which cross into or out of a tuplet
    pub forbidden_tie: f64,
    pub tuplet: f64,
    pub piece: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            tie: 1.0,
            forbidden_tie: 10.0,
            tuplet: 2.0,
            piece: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub rules: RulesConfig,
    pub search: and_or::Config,
    pub weights: Weights,
}

/// One written piece of a note or rest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub time: Time,
    pub dur: Time,
    /// Enclosing tuplets, outermost first
    pub tuplets: Vec<TupletLevel>,
    /// `true` if this piece is tied to the next one
    pub tied: bool,
}

/// A note (or a rest, if `note` is `None`) and the pieces it's written as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Index of the note in the input
    pub note: Option<usize>,
    pub pieces: Vec<Piece>,
}

impl Segment {
    pub fn is_rest(&self) -> bool {
        self.note.is_none()
    }
}

/// Divide the measure of `sig` starting at `time`, which contains the notes `notes` (in order).
/// Gaps between notes become rests, and notes are clipped to the measure.
pub fn divide(
    time: Time,
    sig: TimeSig,
    notes: &[NoteSpan],
    config: &Config,
) -> crate::Result<Vec<Segment>> {
    let rules = DivRules::new(config.rules.clone())?;
    let root = rules.root(time, sig);
    let spans = segment_spans(&root, notes)?;
    let boundaries = spans.iter().skip(1).map(|s| s.0).collect_vec();

    let mut module = DivideSearch {
        rules: &rules,
        root: Some(Tiling::new(root)),
        spans: &spans,
        boundaries: &boundaries,
        weights: config.weights,
        solution: None,
    };
    let summary = and_or::run(&mut module, &config.search);
    if let Some(err) = summary.failures.into_iter().next() {
        return Err(err);
    }
    let grid = module.solution.ok_or(Error::NoSolution { root: 0 })?;
    log::trace!(
        "Divided {} into {}",
        grid.div(),
        grid.pieces().iter().join(" ")
    );

    let segments = spans
        .iter()
        .map(|&(start, end, note)| {
            let pieces = grid
                .pieces()
                .iter()
                .filter(|p| start <= p.time() && p.end() <= end)
                .collect_vec();
            let last = pieces.len().saturating_sub(1);
            let pieces = pieces
                .into_iter()
                .enumerate()
                .map(|(i, p)| Piece {
                    time: p.time(),
                    dur: p.dur(),
                    tuplets: p.tuplets().to_vec(),
                    tied: note.is_some() && i < last,
                })
                .collect();
            Segment { note, pieces }
        })
        .collect();
    Ok(segments)
}

/// Split the measure into `(start, end, note)` spans, filling the gaps with rests
fn segment_spans(
    root: &Division,
    notes: &[NoteSpan],
) -> crate::Result<Vec<(Time, Time, Option<usize>)>> {
    let mut spans = Vec::new();
    let mut cursor = root.time();
    for (index, &note) in notes.iter().enumerate() {
        let start = note.time.max(root.time());
        let end = note.end().min(root.end());
        if end <= start {
            log::trace!("Note #{} is empty inside the measure; skipping", index);
            continue;
        }
        if start < cursor {
            return Err(Error::OverlappingNotes { index });
        }
        if cursor < start {
            spans.push((cursor, start, None));
        }
        spans.push((start, end, Some(index)));
        cursor = end;
    }
    if cursor < root.end() {
        spans.push((cursor, root.end(), None));
    }
    Ok(spans)
}

/// Returns `true` if a single note can be written with `dur` (so plain, dotted or double-dotted)
fn is_notatable(dur: Time) -> bool {
    [Time::from_integer(1), Time::new(3, 2), Time::new(7, 4)]
        .iter()
        .any(|&m| time::is_power_of_two(dur / m))
}

struct DivideSearch<'a> {
    rules: &'a DivRules,
    root: Option<Tiling>,
    spans: &'a [(Time, Time, Option<usize>)],
    /// Every span boundary strictly inside the measure
    boundaries: &'a [Time],
    weights: Weights,
    solution: Option<Tiling>,
}

impl DivideSearch<'_> {
    /// Is `t` strictly inside a note (rather than a rest or on a boundary)?
    fn inside_note(&self, t: Time) -> bool {
        self.spans
            .iter()
            .any(|&(start, end, note)| note.is_some() && start < t && t < end)
    }
}

impl AndOrModule for DivideSearch<'_> {
    type Node = Tiling;
    type Score = OrderedFloat<f64>;

    fn get_root(&mut self) -> Option<Tiling> {
        self.root.take()
    }

    fn is_leaf(&self, node: &Tiling) -> bool {
        let div = node.div();
        !self.boundaries.iter().any(|&b| div.contains_strictly(b))
            && is_notatable(div.written_dur())
    }

    fn expand(&mut self, node: &Tiling, alts: &mut Alternatives<Tiling>) {
        // Undivided spans have no alternatives, so can't be solved unless they're leaves
        for children in self.rules.expand(node.div(), &[]) {
            alts.push_and_node(children.into_iter().map(Tiling::new));
        }
    }

    fn assemble(&mut self, parent: &Tiling, children: &[&Tiling]) -> Tiling {
        Tiling::assemble(parent, children)
    }

    fn score(&self, node: &Tiling) -> OrderedFloat<f64> {
        let w = self.weights;
        let mut cost = node.pieces().len() as f64 * w.piece + node.num_tuplets() as f64 * w.tuplet;
        for (left, right) in node.pieces().iter().tuple_windows() {
            if self.inside_note(right.time()) {
                cost += w.tie;
                if !left.tie_end() || !right.tie_begin() {
                    cost += w.forbidden_tie;
                }
            }
        }
        OrderedFloat(cost)
    }

    fn solution(&mut self, node: Tiling) {
        self.solution = Some(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{beats, time};

    fn notes(spans: &[(Time, Time)]) -> Vec<NoteSpan> {
        spans.iter().map(|&(t, d)| NoteSpan::new(t, d)).collect()
    }

    /// `(dur, tied)` of every piece, and whether its segment is a rest
    fn shape(segments: &[Segment]) -> Vec<(bool, Vec<(Time, bool)>)> {
        segments
            .iter()
            .map(|s| {
                let pieces = s.pieces.iter().map(|p| (p.dur, p.tied)).collect();
                (s.is_rest(), pieces)
            })
            .collect()
    }

    #[test]
    fn quarters_need_no_ties() {
        let ns = notes(&(0..4).map(|i| (beats(i), beats(1))).collect_vec());
        let segs = divide(beats(0), TimeSig::COMMON, &ns, &Config::default()).unwrap();
        assert_eq!(
            shape(&segs),
            vec![(false, vec![(beats(1), false)]); 4]
        );
    }

    #[test]
    fn whole_note() {
        let ns = notes(&[(beats(0), beats(4))]);
        let segs = divide(beats(0), TimeSig::COMMON, &ns, &Config::default()).unwrap();
        assert_eq!(shape(&segs), vec![(false, vec![(beats(4), false)])]);
    }

    #[test]
    fn dotted_half_and_rest() {
        let ns = notes(&[(beats(0), beats(3))]);
        let segs = divide(beats(0), TimeSig::COMMON, &ns, &Config::default()).unwrap();
        assert_eq!(
            shape(&segs),
            vec![
                (false, vec![(beats(3), false)]),
                (true, vec![(beats(1), false)]),
            ]
        );
        assert_eq!(segs[0].note, Some(0));
    }

    #[test]
    fn syncopation() {
        let ns = notes(&[
            (beats(0), time(1, 2)),
            (time(1, 2), beats(1)),
            (time(3, 2), time(1, 2)),
        ]);
        let sig = TimeSig::new(2, 4).unwrap();
        let segs = divide(beats(0), sig, &ns, &Config::default()).unwrap();
        assert!(segs.iter().all(|s| s.pieces.len() == 1));
        assert_eq!(segs[1].pieces[0].dur, beats(1));
    }

    #[test]
    fn later_measures() {
        // A note which crosses the bar line is clipped
        let ns = notes(&[(beats(3), beats(2)), (beats(5), beats(3))]);
        let segs = divide(beats(4), TimeSig::COMMON, &ns, &Config::default()).unwrap();
        assert_eq!(
            shape(&segs),
            vec![
                (false, vec![(beats(1), false)]),
                (false, vec![(beats(3), false)]),
            ]
        );
        assert_eq!(segs[1].pieces[0].time, beats(5));
    }

    #[test]
    fn ties_inside_notes() {
        // A note across the middle of a 4/4 measure can't be a single dotted note
        let ns = notes(&[(beats(0), beats(1)), (beats(1), beats(2)), (beats(3), beats(1))]);
        let segs = divide(beats(0), TimeSig::COMMON, &ns, &Config::default()).unwrap();
        assert_eq!(segs.len(), 3);
        let middle = &segs[1].pieces;
        let total: Time = middle.iter().map(|p| p.dur).sum();
        assert_eq!(total, beats(2));
        assert!(middle.iter().all(|p| p.tuplets.is_empty()));
        // Written either as a half note or as two tied quarters
        assert!(middle.len() <= 2);
        assert!(middle[..middle.len() - 1].iter().all(|p| p.tied));
        assert!(!middle.last().unwrap().tied);
    }

    #[test]
    fn triplets() {
        let third = time(1, 3);
        let ns = notes(&[
            (beats(0), third),
            (third, third),
            (time(2, 3), third),
            (beats(1), beats(1)),
        ]);
        let sig = TimeSig::new(2, 4).unwrap();
        let segs = divide(beats(0), sig, &ns, &Config::default()).unwrap();
        assert!(segs.iter().all(|s| s.pieces.len() == 1));
        let levels = segs[0].pieces[0].tuplets.clone();
        assert_eq!(levels.len(), 1);
        assert_eq!((levels[0].num, levels[0].den), (3, 2));
        assert!(segs[3].pieces[0].tuplets.is_empty());
    }

    #[test]
    fn overlapping_notes() {
        let ns = notes(&[(beats(0), beats(2)), (beats(1), beats(1))]);
        assert_eq!(
            divide(beats(0), TimeSig::COMMON, &ns, &Config::default()),
            Err(Error::OverlappingNotes { index: 1 })
        );
    }

    #[test]
    fn notatable_durations() {
        assert!(is_notatable(beats(1)));
        assert!(is_notatable(time(1, 8)));
        assert!(is_notatable(beats(3)));
        assert!(is_notatable(time(3, 4)));
        assert!(is_notatable(time(7, 4)));
        assert!(!is_notatable(time(5, 4)));
        assert!(!is_notatable(time(1, 3)));
    }
}
