//! Division rules: how a measure (or any span within it) may be split into smaller rhythmic
//! spans.  Both the [quantizer](crate::quantize) and the [measure divider](crate::divide) search
//! the tree of divisions produced by [`DivRules::expand`].

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::{
    time::{Time, TimeSig},
    Error,
};

mod patterns;

pub use patterns::{PatternLevel, TupletPolicy};
use patterns::Special;

/// The structural level of a [`Division`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DivKind {
    /// A whole measure
    Measure,
    /// One of the top-level divisions of a measure
    Beat,
    /// Anything below a beat
    Small,
    /// The held piece of a dotted or syncopated pattern.  These are never split further.
    Undivided,
}

/// One level of tuplet enclosing a [`Division`]: `num` notes in the time of `den`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TupletLevel {
    pub num: u32,
    pub den: u32,
    /// The (actual) duration of the whole tuplet
    pub dur: Time,
    /// `true` if the division starts this tuplet
    pub begin: bool,
    /// `true` if the division ends this tuplet
    pub end: bool,
}

/// A candidate rhythmic span: a measure, or some piece of one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Division {
    kind: DivKind,
    sig: TimeSig,
    time: Time,
    dur: Time,
    /// Enclosing tuplets, outermost first
    tuplets: Vec<TupletLevel>,
    tie_begin: bool,
    tie_end: bool,
}

impl Division {
    pub fn kind(&self) -> DivKind {
        self.kind
    }

    pub fn sig(&self) -> TimeSig {
        self.sig
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn end(&self) -> Time {
        self.time + self.dur
    }

    pub fn dur(&self) -> Time {
        self.dur
    }

    pub fn tuplets(&self) -> &[TupletLevel] {
        &self.tuplets
    }

    /// Can a note be tied into this division from the one before it?
    pub fn tie_begin(&self) -> bool {
        self.tie_begin
    }

    /// Can a note be tied from this division into the one after it?
    pub fn tie_end(&self) -> bool {
        self.tie_end
    }

    /// The ratio of written to actual duration, accounting for every enclosing tuplet
    pub fn scale(&self) -> Time {
        self.tuplets
            .iter()
            .map(|t| Time::new(t.num as i64, t.den as i64))
            .product()
    }

    /// The duration this division would be written with
    pub fn written_dur(&self) -> Time {
        self.dur * self.scale()
    }

    /// Returns `true` if `t` lies strictly inside this division
    pub fn contains_strictly(&self, t: Time) -> bool {
        self.time < t && t < self.end()
    }
}

impl Display for Division {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}+{}", self.kind, self.time, self.dur)?;
        for t in &self.tuplets {
            write!(f, " {}:{}", t.num, t.den)?;
        }
        write!(f, "]")
    }
}

/// A time range where split points are forbidden (both ends exclusive), e.g. the inside of a
/// tuplet the user has already placed.  Divisions which lie entirely within the range can still
/// be split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Exclusion {
    pub start: Time,
    pub end: Time,
}

impl Exclusion {
    pub fn new(start: Time, end: Time) -> Self {
        Self { start, end }
    }

    fn contains(&self, div: &Division) -> bool {
        self.start <= div.time() && div.end() <= self.end
    }

    fn contains_strictly(&self, t: Time) -> bool {
        self.start < t && t < self.end
    }
}

/// Configuration for the division rules
#[derive(Debug, Clone)]
pub struct RulesConfig {
    /// Tuplet numerators to try.  Numerators which map to a regular split (e.g. 2 or 4 in a span
    /// which splits in two) are skipped.
    pub tuplets: Vec<u32>,
    pub tuplet_policy: TupletPolicy,
    /// Tuplets with at least this many notes use `large_tuplet_policy` instead
    pub large_tuplet_threshold: u32,
    pub large_tuplet_policy: TupletPolicy,
    /// Maximum number of nested tuplets
    pub max_tuplet_levels: usize,
    /// No division will be shorter than this (except to respect exclusion ranges)
    pub min_dur: Time,

    pub dot: PatternLevel,
    pub double_dot: PatternLevel,
    pub syncopation: PatternLevel,
    pub short_long_short: PatternLevel,

    /// If `false`, notes can't be tied into or out of a tuplet
    pub ties_across_tuplets: bool,
}

impl RulesConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(&num) = self.tuplets.iter().find(|&&n| n < 2) {
            return Err(Error::InvalidTuplet(num));
        }
        if self.min_dur <= Time::from_integer(0) {
            return Err(Error::ZeroBeatDiv);
        }
        Ok(())
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            tuplets: vec![2, 3, 4, 5, 6, 7],
            tuplet_policy: TupletPolicy::Nearest,
            large_tuplet_threshold: 7,
            large_tuplet_policy: TupletPolicy::Below,
            max_tuplet_levels: 1,
            min_dur: Time::new(1, 16),

            dot: PatternLevel::Anywhere,
            double_dot: PatternLevel::Measure,
            syncopation: PatternLevel::Division,
            short_long_short: PatternLevel::Division,

            ties_across_tuplets: false,
        }
    }
}

/// The rules for splitting [`Division`]s
#[derive(Debug, Clone)]
pub struct DivRules {
    config: RulesConfig,
}

/// One way of splitting a division, before it's been turned into child divisions
#[derive(Debug, Clone)]
struct Candidate {
    /// Relative lengths of the pieces
    weights: Vec<Time>,
    /// Index of the held piece of a special pattern
    held: Option<usize>,
    /// `(num, den)` if the pieces form a tuplet
    tuplet: Option<(u32, u32)>,
}

impl Candidate {
    fn plain(pattern: &[u32]) -> Self {
        Self {
            weights: pattern.iter().map(|&w| Time::from_integer(w as i64)).collect(),
            held: None,
            tuplet: None,
        }
    }
}

impl DivRules {
    pub fn new(config: RulesConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// The division covering the whole measure starting at `time`
    pub fn root(&self, time: Time, sig: TimeSig) -> Division {
        Division {
            kind: DivKind::Measure,
            sig,
            time,
            dur: sig.measure_dur(),
            tuplets: Vec::new(),
            tie_begin: true,
            tie_end: true,
        }
    }

    /// Every way of splitting `div` into smaller divisions, in a deterministic order.  The
    /// children of each alternative are contiguous and their durations always sum to `div`'s.
    pub fn expand(&self, div: &Division, exclusions: &[Exclusion]) -> Vec<Vec<Division>> {
        if div.kind == DivKind::Undivided {
            return Vec::new();
        }
        let units = div.written_dur() / div.sig.beat_unit();
        let ternary = patterns::is_ternary(units);

        let mut candidates = Vec::new();
        let plain = match div.kind {
            DivKind::Measure => patterns::initial_divisions(div.sig),
            _ => patterns::split_patterns(units),
        };
        candidates.extend(plain.iter().map(|p| Candidate::plain(p)));
        candidates.extend(self.specials(div.kind, ternary));
        if div.tuplets.len() < self.config.max_tuplet_levels {
            candidates.extend(self.tuplets(ternary));
        }

        let mut split_sets: Vec<Vec<Time>> = Vec::new();
        let mut alternatives = Vec::new();
        for cand in candidates {
            let Some((cand, edited)) = self.apply_exclusions(div, cand, exclusions) else {
                continue;
            };
            let children = self.build_children(div, &cand);
            // Pieces forced by exclusion ranges may be shorter than `min_dur`
            if !edited && children.iter().any(|c| c.dur < self.config.min_dur) {
                continue;
            }
            let splits = children.iter().skip(1).map(Division::time).collect_vec();
            if split_sets.contains(&splits) {
                continue; // Already produced by an earlier pattern
            }
            split_sets.push(splits);
            alternatives.push(children);
        }
        alternatives
    }

    fn specials(&self, kind: DivKind, ternary: bool) -> Vec<Candidate> {
        let groups: [(PatternLevel, &[Special]); 4] = [
            (self.config.dot, &patterns::DOT),
            (self.config.double_dot, &patterns::DOUBLE_DOT),
            (self.config.syncopation, &patterns::SYNCOPATION),
            (self.config.short_long_short, &patterns::SHORT_LONG_SHORT),
        ];
        groups
            .iter()
            .filter(|(level, _)| level.allows(kind))
            .flat_map(|(_, specials)| specials.iter())
            .filter(|special| special.ternary == ternary)
            .map(|special| Candidate {
                held: Some(special.held),
                ..Candidate::plain(special.pattern)
            })
            .collect()
    }

    fn tuplets(&self, ternary: bool) -> Vec<Candidate> {
        let m = if ternary { 3 } else { 2 };
        self.config
            .tuplets
            .iter()
            .filter_map(|&n| {
                let policy = if n >= self.config.large_tuplet_threshold {
                    self.config.large_tuplet_policy
                } else {
                    self.config.tuplet_policy
                };
                let den = patterns::tuplet_den(n, m, policy);
                (den != n).then(|| Candidate {
                    weights: vec![Time::from_integer(1); n as usize],
                    held: None,
                    tuplet: Some((n, den)),
                })
            })
            .collect()
    }

    /// Remove the split points of `cand` which fall inside an exclusion range, and add the
    /// boundaries of those ranges.  Tuplets can't be edited like this, so are dropped instead.
    /// Also returns whether `cand` had to be edited.
    fn apply_exclusions(
        &self,
        div: &Division,
        cand: Candidate,
        exclusions: &[Exclusion],
    ) -> Option<(Candidate, bool)> {
        let total: Time = cand.weights.iter().copied().sum();
        let mut splits = Vec::new();
        let mut acc = Time::from_integer(0);
        for w in &cand.weights[..cand.weights.len() - 1] {
            acc += *w;
            splits.push(div.time + div.dur * acc / total);
        }

        let mut edited = false;
        for excl in exclusions.iter().filter(|e| !e.contains(div)) {
            let len_before = splits.len();
            splits.retain(|&s| !excl.contains_strictly(s));
            edited |= splits.len() != len_before;
            for boundary in [excl.start, excl.end] {
                if div.contains_strictly(boundary) && !splits.contains(&boundary) {
                    splits.push(boundary);
                    edited = true;
                }
            }
        }
        if !edited {
            return Some((cand, false));
        }
        if cand.tuplet.is_some() {
            return None;
        }

        splits.sort();
        splits.dedup();
        if splits.is_empty() {
            return None; // Nothing left to split
        }
        let weights = std::iter::once(div.time)
            .chain(splits.iter().copied())
            .chain(std::iter::once(div.end()))
            .tuple_windows()
            .map(|(a, b)| b - a)
            .collect();
        let cand = Candidate {
            weights,
            held: None,
            tuplet: None,
        };
        Some((cand, true))
    }

    fn build_children(&self, div: &Division, cand: &Candidate) -> Vec<Division> {
        let total: Time = cand.weights.iter().copied().sum();
        let child_kind = match div.kind {
            DivKind::Measure => DivKind::Beat,
            _ => DivKind::Small,
        };
        let last = cand.weights.len() - 1;
        let ties_into_tuplet = self.config.ties_across_tuplets;

        let mut children = Vec::with_capacity(cand.weights.len());
        let mut acc = Time::from_integer(0);
        for (i, w) in cand.weights.iter().enumerate() {
            let start = div.time + div.dur * acc / total;
            acc += *w;
            // The last child ends exactly at the parent's end
            let end = if i == last {
                div.end()
            } else {
                div.time + div.dur * acc / total
            };

            let mut tuplets = div
                .tuplets
                .iter()
                .map(|t| TupletLevel {
                    begin: t.begin && i == 0,
                    end: t.end && i == last,
                    ..*t
                })
                .collect_vec();
            let mut tie_begin = if i == 0 { div.tie_begin } else { true };
            let mut tie_end = if i == last { div.tie_end } else { true };
            if let Some((num, den)) = cand.tuplet {
                tuplets.push(TupletLevel {
                    num,
                    den,
                    dur: div.dur,
                    begin: i == 0,
                    end: i == last,
                });
                if i == 0 {
                    tie_begin &= ties_into_tuplet;
                }
                if i == last {
                    tie_end &= ties_into_tuplet;
                }
            }

            children.push(Division {
                kind: if cand.held == Some(i) {
                    DivKind::Undivided
                } else {
                    child_kind
                },
                sig: div.sig,
                time: start,
                dur: end - start,
                tuplets,
                tie_begin,
                tie_end,
            });
        }
        children
    }
}

/// A [`Division`] together with the pieces it has been split into so far.  This is the node type
/// searched by both the quantizer and the measure divider: an unsplit division is its own single
/// piece, and assembling an alternative concatenates its children's pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiling {
    div: Division,
    pieces: Vec<Division>,
}

impl Tiling {
    pub fn new(div: Division) -> Self {
        Self {
            pieces: vec![div.clone()],
            div,
        }
    }

    pub fn assemble(parent: &Tiling, children: &[&Tiling]) -> Self {
        Self {
            div: parent.div.clone(),
            pieces: children
                .iter()
                .flat_map(|c| c.pieces.iter().cloned())
                .collect(),
        }
    }

    pub fn div(&self) -> &Division {
        &self.div
    }

    pub fn pieces(&self) -> &[Division] {
        &self.pieces
    }

    /// Every piece boundary, including both ends of the tiled division
    pub fn boundaries(&self) -> Vec<Time> {
        self.pieces
            .iter()
            .map(Division::time)
            .chain(std::iter::once(self.div.end()))
            .collect()
    }

    /// The number of tuplets started within this tiling
    pub fn num_tuplets(&self) -> usize {
        self.pieces
            .iter()
            .flat_map(|p| p.tuplets.iter())
            .filter(|t| t.begin)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    use super::*;
    use crate::time::{beats, time};

    fn rules() -> DivRules {
        DivRules::new(RulesConfig::default()).unwrap()
    }

    fn durs(children: &[Division]) -> Vec<Time> {
        children.iter().map(Division::dur).collect()
    }

    #[test]
    fn measure_expansion() {
        let rules = rules();
        let root = rules.root(beats(0), TimeSig::COMMON);
        let alts = rules.expand(&root, &[]);

        let all_durs = alts.iter().map(|a| durs(a)).collect_vec();
        assert!(all_durs.contains(&vec![beats(2), beats(2)]));
        assert!(all_durs.contains(&vec![beats(1); 4]));
        // Dotted half + quarter
        assert!(all_durs.contains(&vec![beats(3), beats(1)]));
        // Half-note triplets
        assert!(all_durs.contains(&vec![time(4, 3); 3]));
        // 4:4 isn't a tuplet
        assert!(!alts
            .iter()
            .any(|a| a.len() == 4 && !a[0].tuplets().is_empty()));

        let dotted = alts.iter().find(|a| durs(a) == vec![beats(3), beats(1)]);
        let kinds = dotted.unwrap().iter().map(Division::kind).collect_vec();
        assert_eq!(kinds, vec![DivKind::Undivided, DivKind::Beat]);
    }

    #[test]
    fn compound_measures() {
        let rules = rules();
        let sig = TimeSig::new(6, 8).unwrap();
        let alts = rules.expand(&rules.root(beats(0), sig), &[]);
        let all_durs = alts.iter().map(|a| durs(a)).collect_vec();
        assert_eq!(all_durs[0], vec![time(3, 2), time(3, 2)]);
        assert!(all_durs.contains(&vec![time(1, 2), beats(2), time(1, 2)]));

        // Each dotted beat splits into three
        let beat = &alts[0][0];
        let beat_alts = rules.expand(beat, &[]);
        assert_eq!(durs(&beat_alts[0]), vec![time(1, 2); 3]);
        assert!(beat_alts
            .iter()
            .all(|a| a.iter().all(|c| c.kind() != DivKind::Beat)));
        // Duplets replace the three quavers of a dotted crotchet
        let duplet = beat_alts
            .iter()
            .find(|a| a.len() == 2 && !a[0].tuplets().is_empty())
            .unwrap();
        let level = duplet[0].tuplets()[0];
        assert_eq!((level.num, level.den), (2, 3));
        assert_eq!(durs(duplet), vec![time(3, 4); 2]);
        assert_eq!(duplet[0].written_dur(), time(1, 2));
    }

    #[test]
    fn tuplet_flags() {
        let rules = rules();
        let root = rules.root(beats(0), TimeSig::new(2, 4).unwrap());
        let alts = rules.expand(&root, &[]);
        let triplet = alts
            .iter()
            .find(|a| a.len() == 3 && !a[0].tuplets().is_empty())
            .unwrap();
        let levels = triplet.iter().map(|c| c.tuplets()[0]).collect_vec();
        assert_eq!((levels[0].num, levels[0].den), (3, 2));
        assert_eq!(
            levels.iter().map(|l| (l.begin, l.end)).collect_vec(),
            vec![(true, false), (false, false), (false, true)]
        );
        // Ties can't cross into or out of the tuplet
        assert!(!triplet[0].tie_begin());
        assert!(triplet[0].tie_end());
        assert!(!triplet[2].tie_end());
        assert_eq!(triplet[0].written_dur(), beats(1));

        // Only one level of tuplets is allowed by default
        let inner = rules.expand(&triplet[0], &[]);
        assert!(inner
            .iter()
            .all(|a| a.iter().all(|c| c.tuplets().len() == 1)));
        assert!(inner.iter().all(|a| a[0].tuplets()[0].begin));
    }

    #[test]
    fn special_patterns_are_held() {
        let rules = rules();
        let root = rules.root(beats(0), TimeSig::new(2, 4).unwrap());
        let alts = rules.expand(&root, &[]);
        let syncopation = alts
            .iter()
            .find(|a| durs(a) == vec![time(1, 2), beats(1), time(1, 2)])
            .unwrap();
        assert_eq!(syncopation[1].kind(), DivKind::Undivided);
        assert!(rules.expand(&syncopation[1], &[]).is_empty());

        // Syncopation is only used at the top two levels
        let small = rules.expand(&alts[0][0], &[]);
        let small = rules.expand(&small[0][0], &[]);
        assert!(small.iter().all(|a| a.len() != 3 || !a[0].tuplets().is_empty()));
    }

    #[test]
    fn min_dur_is_respected() {
        let rules = rules();
        let root = rules.root(beats(0), TimeSig::new(1, 4).unwrap());
        let mut frontier = vec![root];
        while let Some(div) = frontier.pop() {
            for alt in rules.expand(&div, &[]) {
                for child in alt {
                    assert!(child.dur() >= time(1, 16), "{}", child);
                    frontier.push(child);
                }
            }
        }
    }

    #[test]
    fn exclusions() {
        let rules = rules();
        let root = rules.root(beats(0), TimeSig::COMMON);
        // A tuplet the user placed on beats 1 and 2
        let excl = Exclusion::new(beats(1), beats(3));
        let alts = rules.expand(&root, &[excl]);

        let split_sets = alts
            .iter()
            .map(|a| a.iter().skip(1).map(Division::time).collect_vec())
            .collect_vec();
        // `2 2` has its middle split moved to the range boundaries
        assert!(split_sets.contains(&vec![beats(1), beats(3)]));
        assert!(!split_sets.contains(&vec![beats(1), beats(2), beats(3)]));
        // No tuplets could be edited to fit
        assert!(alts.iter().all(|a| a[0].tuplets().is_empty()));
        // Split sets are unique
        assert!(split_sets.iter().all_unique());

        // Inside the range, splitting is allowed again
        let inside = alts
            .iter()
            .flatten()
            .find(|c| c.time() == beats(1) && c.end() == beats(3))
            .unwrap();
        let inside_alts = rules.expand(inside, &[excl]);
        assert!(inside_alts
            .iter()
            .any(|a| a.iter().skip(1).any(|c| c.time() == beats(2))));
    }

    /// A time signature with a small numerator
    #[derive(Debug, Clone, Copy)]
    struct ArbSig(TimeSig);

    impl Arbitrary for ArbSig {
        fn arbitrary(g: &mut Gen) -> Self {
            let num = u32::arbitrary(g) % 12 + 1;
            let den = *g.choose(&[2, 4, 8, 16]).unwrap();
            ArbSig(TimeSig::new(num, den).unwrap())
        }
    }

    #[quickcheck]
    fn children_sum_to_parent(sig: ArbSig, path: Vec<u8>) -> bool {
        let rules = rules();
        let mut div = rules.root(beats(0), sig.0);
        // Walk down a random path through the tree, checking every alternative on the way
        for step in path.into_iter().take(6) {
            let alts = rules.expand(&div, &[]);
            for alt in &alts {
                let total: Time = alt.iter().map(Division::dur).sum();
                let contiguous = alt.windows(2).all(|w| w[0].end() == w[1].time());
                if total != div.dur()
                    || !contiguous
                    || alt[0].time() != div.time()
                    || alt.iter().any(|c| c.dur() <= Time::from_integer(0))
                {
                    return false;
                }
            }
            let Some(alt) = alts.get(step as usize % alts.len().max(1)) else {
                break;
            };
            div = alt[step as usize % alt.len()].clone();
        }
        true
    }

    #[quickcheck]
    fn exclusion_points(sig: ArbSig, start: u8, len: u8) -> bool {
        let rules = rules();
        let root = rules.root(beats(0), sig.0);
        // Exclusion ranges on an eighth-note grid
        let start = time(start as i64 % 16, 2);
        let excl = Exclusion::new(start, start + time(1 + len as i64 % 8, 2));
        if excl.contains(&root) {
            return true; // Splitting inside the range is allowed
        }

        rules.expand(&root, &[excl]).iter().all(|alt| {
            let splits = alt.iter().skip(1).map(Division::time).collect_vec();
            let nothing_inside = splits.iter().all(|&s| !excl.contains_strictly(s));
            let boundaries_kept = [excl.start, excl.end]
                .iter()
                .all(|&b| !root.contains_strictly(b) || splits.contains(&b));
            nothing_inside && boundaries_kept
        })
    }

    #[test]
    fn tiling() {
        let rules = rules();
        let root = Tiling::new(rules.root(beats(0), TimeSig::new(2, 4).unwrap()));
        assert_eq!(root.boundaries(), vec![beats(0), beats(2)]);

        let alts = rules.expand(root.div(), &[]);
        let triplet = alts
            .iter()
            .find(|a| a.len() == 3 && !a[0].tuplets().is_empty())
            .unwrap();
        let children = triplet.iter().cloned().map(Tiling::new).collect_vec();
        let assembled = Tiling::assemble(&root, &children.iter().collect_vec());
        assert_eq!(
            assembled.boundaries(),
            vec![beats(0), time(2, 3), time(4, 3), beats(2)]
        );
        assert_eq!(assembled.num_tuplets(), 1);
        assert_eq!(assembled.pieces().len(), 3);
    }
}
