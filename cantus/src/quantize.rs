//! Time quantization: snapping performed note times onto a grid chosen by searching the
//! [division](crate::division) tree.
//!
//! Each voice group of each measure is quantized independently, in up to two passes.  If the
//! group contains tuplets placed by the user, the first pass quantizes only the tuplet boundaries
//! and turns the results into [`Exclusion`]s.  The second pass then quantizes every note onset and
//! end, honouring those exclusions.

use bit_vec::BitVec;
use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::{
    and_or::{self, Alternatives, AndOrModule},
    division::{DivRules, Division, Exclusion, RulesConfig, Tiling},
    time::{self, Time, TimeSig},
    Error,
};

/// A note as performed, in (floating point) beats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawNote {
    pub onset: f64,
    pub end: f64,
}

impl RawNote {
    pub fn new(onset: f64, end: f64) -> Self {
        Self { onset, end }
    }
}

/// Notes which are quantized together, along with the tuplets the user has placed on them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceGroup {
    pub notes: Vec<RawNote>,
    /// `(start, end)` of every user tuplet, in beats
    pub tuplets: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub time: Time,
    pub sig: TimeSig,
    pub groups: Vec<VoiceGroup>,
}

/// How quantization errors of the individual time points are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorPolicy {
    /// Sum of absolute errors
    Sum,
    /// Mean of squared errors
    MeanSquared,
}

/// What to do with notes which are quantized to no length at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZeroDurPolicy {
    Delete,
    /// Keep them as grace notes
    Grace,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of grid divisions per (quarter-note) beat.  This sets the shortest allowed division.
    pub beat_div: u32,
    pub error_policy: ErrorPolicy,
    pub zero_dur: ZeroDurPolicy,
    /// Rules for dividing measures.  `rules.min_dur` is overridden by `beat_div`.
    pub rules: RulesConfig,
    pub search: and_or::Config,
}

impl Config {
    pub fn min_dur(&self) -> Time {
        Time::new(1, self.beat_div.max(1) as i64)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.beat_div == 0 {
            return Err(Error::ZeroBeatDiv);
        }
        self.rules.validate()
    }

    fn div_rules(&self) -> crate::Result<DivRules> {
        self.validate()?;
        DivRules::new(RulesConfig {
            min_dur: self.min_dur(),
            ..self.rules.clone()
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            beat_div: 16,
            error_policy: ErrorPolicy::Sum,
            zero_dur: ZeroDurPolicy::Grace,
            rules: RulesConfig::default(),
            search: and_or::Config::default(),
        }
    }
}

/// A note after quantization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedNote {
    /// Index of the note within its [`VoiceGroup`]
    pub index: usize,
    pub time: Time,
    pub dur: Time,
    pub grace: bool,
}

/// The quantized version of one [`VoiceGroup`]
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedGroup {
    /// Notes in input order.  Deleted notes are left out.
    pub notes: Vec<QuantizedNote>,
    /// The quantized user tuplets, in input order
    pub tuplets: Vec<(Time, Time)>,
    /// The divisions making up the chosen grid
    pub divisions: Vec<Division>,
    /// The total error of the chosen grid, combined according to [`Config::error_policy`]
    pub error: f64,
}

/// Quantize every voice group of every measure.  Stops at the first measure which fails.
pub fn quantize_all(
    measures: &[Measure],
    config: &Config,
) -> crate::Result<Vec<Vec<QuantizedGroup>>> {
    let rules = config.div_rules()?;
    log::debug!("Quantizing {} measures", measures.len());
    measures
        .iter()
        .map(|m| quantize_with(m, config, &rules))
        .collect()
}

/// Quantize every voice group of a single measure
pub fn quantize(measure: &Measure, config: &Config) -> crate::Result<Vec<QuantizedGroup>> {
    let rules = config.div_rules()?;
    quantize_with(measure, config, &rules)
}

fn quantize_with(
    measure: &Measure,
    config: &Config,
    rules: &DivRules,
) -> crate::Result<Vec<QuantizedGroup>> {
    measure
        .groups
        .iter()
        .map(|group| quantize_group(measure, group, config, rules))
        .collect()
}

fn quantize_group(
    measure: &Measure,
    group: &VoiceGroup,
    config: &Config,
    rules: &DivRules,
) -> crate::Result<QuantizedGroup> {
    for &RawNote { onset, end } in &group.notes {
        if end < onset {
            return Err(Error::NegativeDuration { onset, end });
        }
    }
    for &(onset, end) in &group.tuplets {
        if end < onset {
            return Err(Error::NegativeDuration { onset, end });
        }
    }
    let root = rules.root(measure.time, measure.sig);
    let clamp = |t: f64| t.clamp(time::to_f64(root.time()), time::to_f64(root.end()));

    // Pass 1: quantize the boundaries of the user's tuplets
    let mut tuplets = Vec::new();
    let mut exclusions = Vec::new();
    let mut boundaries = Vec::new();
    if !group.tuplets.is_empty() {
        let points = group
            .tuplets
            .iter()
            .flat_map(|&(start, end)| [clamp(start), clamp(end)])
            .collect_vec();
        let settled = Settled::none(points.len());
        let (grid, _) = search_grid(&root, rules, config, &points, &settled, &[])?;
        for (&(raw_start, raw_end), pair) in group.tuplets.iter().zip_eq(points.chunks(2)) {
            let (start, end) = (snap(&grid, pair[0]), snap(&grid, pair[1]));
            log::trace!("User tuplet {}..{} quantized to {}..{}", raw_start, raw_end, start, end);
            tuplets.push((start, end));
            if start < end {
                exclusions.push(Exclusion::new(start, end));
            }
            boundaries.push((raw_start, start));
            boundaries.push((raw_end, end));
        }
    }

    // Pass 2: quantize every note, keeping points from the first pass where they are
    let points = group
        .notes
        .iter()
        .flat_map(|n| [clamp(n.onset), clamp(n.end)])
        .collect_vec();
    let mut settled = Settled::none(points.len());
    for (i, &p) in points.iter().enumerate() {
        let exact = boundaries
            .iter()
            .find(|(raw, _)| (clamp(*raw) - p).abs() < 1e-9);
        if let Some(&(_, exact)) = exact {
            settled.set(i, exact);
        }
    }
    let (grid, score) = search_grid(&root, rules, config, &points, &settled, &exclusions)?;

    let snapped = points
        .iter()
        .enumerate()
        .map(|(i, &p)| settled.get(i).unwrap_or_else(|| snap(&grid, p)))
        .collect_vec();
    let mut notes = Vec::with_capacity(group.notes.len());
    for (index, pair) in snapped.chunks(2).enumerate() {
        let (time, end) = (pair[0], pair[1].max(pair[0]));
        let dur = end - time;
        let grace = dur == Time::from_integer(0);
        if grace && config.zero_dur == ZeroDurPolicy::Delete {
            log::warn!("Deleting note #{} which quantized to zero length at {}", index, time);
            continue;
        }
        notes.push(QuantizedNote {
            index,
            time,
            dur,
            grace,
        });
    }

    Ok(QuantizedGroup {
        notes,
        tuplets,
        divisions: grid.pieces().to_vec(),
        error: score.error.0,
    })
}

/// Find the best grid for `points`
fn search_grid(
    root: &Division,
    rules: &DivRules,
    config: &Config,
    points: &[f64],
    settled: &Settled,
    exclusions: &[Exclusion],
) -> crate::Result<(Tiling, QuantScore)> {
    let mut module = GridSearch {
        rules,
        root: Some(root.clone()),
        points,
        settled,
        exclusions,
        tolerance: time::to_f64(config.min_dur()) / 2.0,
        min_dur: config.min_dur(),
        policy: config.error_policy,
        solution: None,
    };
    let summary = and_or::run(&mut module, &config.search);
    if let Some(err) = summary.failures.into_iter().next() {
        return Err(err);
    }
    let grid = module
        .solution
        .take()
        .ok_or(Error::NoSolution { root: 0 })?;
    let score = module.score(&grid);
    Ok((grid, score))
}

/// Snap `p` to the nearest boundary of `grid`, preferring the earlier one on ties
fn snap(grid: &Tiling, p: f64) -> Time {
    let boundaries = grid.boundaries();
    let mut best = boundaries[0];
    for &b in &boundaries[1..] {
        if (time::to_f64(b) - p).abs() < (time::to_f64(best) - p).abs() {
            best = b;
        }
    }
    best
}

/// Points whose quantized value is already fixed
#[derive(Debug, Clone)]
struct Settled {
    flags: BitVec,
    values: Vec<Time>,
}

impl Settled {
    fn none(len: usize) -> Self {
        Self {
            flags: BitVec::from_elem(len, false),
            values: vec![Time::from_integer(0); len],
        }
    }

    fn set(&mut self, idx: usize, value: Time) {
        self.flags.set(idx, true);
        self.values[idx] = value;
    }

    fn get(&self, idx: usize) -> Option<Time> {
        self.is_settled(idx).then(|| self.values[idx])
    }

    fn is_settled(&self, idx: usize) -> bool {
        self.flags.get(idx).unwrap_or(false)
    }

    fn num_unsettled(&self) -> usize {
        self.flags.iter().filter(|s| !s).count()
    }
}

/// The score of a (partial) grid.  Compared lexicographically: least error first, then fewest
/// tuplets, then fewest pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QuantScore {
    pub error: OrderedFloat<f64>,
    pub tuplets: usize,
    pub pieces: usize,
}

/// AND/OR module searching for the grid which best fits one set of points
struct GridSearch<'a> {
    rules: &'a DivRules,
    root: Option<Division>,
    points: &'a [f64],
    settled: &'a Settled,
    exclusions: &'a [Exclusion],
    /// Points this close to a division boundary snap to it
    tolerance: f64,
    min_dur: Time,
    policy: ErrorPolicy,
    solution: Option<Tiling>,
}

impl<'a> GridSearch<'a> {
    /// Unsettled points lying strictly inside `div`
    fn points_inside(&self, div: &Division) -> impl Iterator<Item = f64> + 'a {
        let (start, end) = (time::to_f64(div.time()), time::to_f64(div.end()));
        let (points, settled) = (self.points, self.settled);
        points
            .iter()
            .enumerate()
            .filter(move |&(i, &p)| !settled.is_settled(i) && start < p && p < end)
            .map(|(_, &p)| p)
    }

    /// The error of the leaf pieces of `tiling`.  Pieces which still need splitting count
    /// nothing, so refining a tiling never lowers its error and the first solved alternative
    /// popped by the engine is the one with the least error.
    fn error(&self, tiling: &Tiling) -> f64 {
        let mut total = 0.0;
        for piece in tiling.pieces().iter().filter(|p| self.is_leaf_div(p)) {
            let (start, end) = (time::to_f64(piece.time()), time::to_f64(piece.end()));
            for p in self.points_inside(piece) {
                let err = (p - start).min(end - p);
                total += match self.policy {
                    ErrorPolicy::Sum => err,
                    ErrorPolicy::MeanSquared => err * err,
                };
            }
        }
        match self.policy {
            ErrorPolicy::Sum => total,
            ErrorPolicy::MeanSquared => total / self.settled.num_unsettled().max(1) as f64,
        }
    }

    /// A division is a leaf once every unsettled point inside it snaps to one of its ends.  This
    /// holds for the held pieces of dotted and syncopated patterns too, which can't be split any
    /// further and so are unsolvable otherwise.
    fn is_leaf_div(&self, div: &Division) -> bool {
        // Exclusion boundaries must end up on the grid
        let boundary_inside = self
            .exclusions
            .iter()
            .any(|e| div.contains_strictly(e.start) || div.contains_strictly(e.end));
        if boundary_inside {
            return false;
        }
        if div.dur() <= self.min_dur {
            return true;
        }
        let (start, end) = (time::to_f64(div.time()), time::to_f64(div.end()));
        self.points_inside(div)
            .all(|p| p - start <= self.tolerance || end - p <= self.tolerance)
    }
}

impl AndOrModule for GridSearch<'_> {
    type Node = Tiling;
    type Score = QuantScore;

    fn get_root(&mut self) -> Option<Tiling> {
        self.root.take().map(Tiling::new)
    }

    fn is_leaf(&self, node: &Tiling) -> bool {
        self.is_leaf_div(node.div())
    }

    fn expand(&mut self, node: &Tiling, alts: &mut Alternatives<Tiling>) {
        for children in self.rules.expand(node.div(), self.exclusions) {
            alts.push_and_node(children.into_iter().map(Tiling::new));
        }
    }

    fn assemble(&mut self, parent: &Tiling, children: &[&Tiling]) -> Tiling {
        Tiling::assemble(parent, children)
    }

    fn score(&self, node: &Tiling) -> QuantScore {
        QuantScore {
            error: OrderedFloat(self.error(node)),
            tuplets: node.num_tuplets(),
            pieces: node.pieces().len(),
        }
    }

    fn solution(&mut self, node: Tiling) {
        self.solution = Some(node);
    }
}
