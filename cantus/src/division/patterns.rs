//! Tables of split patterns, and the rules for choosing tuplet ratios.

use crate::time::{Time, TimeSig};

use super::DivKind;

/// Ways of splitting a span, keyed by its length in beat units.  Each pattern gives the relative
/// lengths of the pieces, and sums to its key.
const SPLITS: &[(u32, &[&[u32]])] = &[
    (1, &[&[1, 1]]),
    (2, &[&[1, 1]]),
    (3, &[&[1, 1, 1], &[2, 1], &[1, 2]]),
    (4, &[&[2, 2], &[1, 1, 1, 1]]),
    (5, &[&[3, 2], &[2, 3]]),
    (6, &[&[3, 3], &[2, 2, 2]]),
    (7, &[&[4, 3], &[3, 4], &[2, 2, 3], &[3, 2, 2], &[2, 3, 2]]),
    (8, &[&[4, 4]]),
    (9, &[&[3, 3, 3]]),
    (12, &[&[3, 3, 3, 3]]),
];

fn table(units: u32) -> Option<&'static [&'static [u32]]> {
    SPLITS
        .iter()
        .find(|(key, _)| *key == units)
        .map(|(_, patterns)| *patterns)
}

/// Scale `units` up by powers of two until it's a whole number.  Spans inside tuplets always have
/// dyadic written lengths, so this only gives up on lengths which can't be notated anyway.
fn whole_units(units: Time) -> Option<u32> {
    let mut units = units;
    for _ in 0..32 {
        if units.is_integer() {
            return u32::try_from(units.to_integer()).ok();
        }
        units *= 2;
    }
    None
}

/// The split patterns of a span which is `units` beat units long.  Lengths missing from the
/// table are doubled (if fractional) or halved (if even) until they match, and anything else is
/// split as evenly as possible into two.
pub(super) fn split_patterns(units: Time) -> Vec<Vec<u32>> {
    let Some(mut key) = whole_units(units) else {
        return vec![vec![1, 1]];
    };
    let odd_key = loop {
        if let Some(patterns) = table(key) {
            return patterns.iter().map(|p| p.to_vec()).collect();
        }
        if key % 2 != 0 || key == 0 {
            break key;
        }
        key /= 2;
    };
    near_halves(odd_key)
}

fn near_halves(units: u32) -> Vec<Vec<u32>> {
    let (short, long) = (units / 2, units - units / 2);
    if short == 0 {
        return vec![vec![1, 1]];
    }
    if short == long {
        vec![vec![short, long]]
    } else {
        vec![vec![long, short], vec![short, long]]
    }
}

/// The ways a whole measure of `sig` can be split at the top level.  Compound signatures are
/// split into their dotted beats, everything else uses the table plus splitting into single beats.
pub(super) fn initial_divisions(sig: TimeSig) -> Vec<Vec<u32>> {
    let num = sig.num();
    if sig.is_compound() {
        let beats = num / 3;
        let mut divs = vec![vec![3; beats as usize]];
        if beats % 2 == 0 && beats > 2 {
            divs.push(vec![num / 2; 2]);
        }
        return divs;
    }
    let mut divs = split_patterns(Time::from_integer(num as i64));
    let single_beats = vec![1; num as usize];
    if num > 1 && !divs.contains(&single_beats) {
        divs.push(single_beats);
    }
    divs
}

/// Returns `true` if a span `units` beat units long naturally splits into three
pub(super) fn is_ternary(units: Time) -> bool {
    whole_units(units).is_some_and(|u| u % 3 == 0)
}

/// How to pick the denominator of a tuplet (the number of regular notes it replaces)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TupletPolicy {
    /// The closest allowed denominator, preferring the smaller one on ties (e.g. `3:2`, `6:4`)
    Nearest,
    /// The largest allowed denominator which is smaller than the numerator (e.g. `7:4`)
    Below,
    /// The smallest allowed denominator which is larger than the numerator (e.g. `3:4`)
    Above,
}

/// Choose the denominator of an `n`-tuplet from `m * 2^k`.  Returns `n` if it's already one of the
/// allowed values (i.e. no tuplet is needed).
pub(super) fn tuplet_den(n: u32, m: u32, policy: TupletPolicy) -> u32 {
    let mut largest_below = None;
    let mut d = m;
    while d < n {
        largest_below = Some(d);
        d *= 2;
    }
    if d == n {
        return n;
    }
    let above = d;
    match (policy, largest_below) {
        (TupletPolicy::Nearest, Some(below)) if n - below <= above - n => below,
        (TupletPolicy::Below, Some(below)) => below,
        _ => above,
    }
}

/// Where a special pattern may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternLevel {
    /// Only when splitting a whole measure
    Measure,
    /// When splitting a measure or one of its top-level divisions
    Division,
    Anywhere,
    Nowhere,
}

impl PatternLevel {
    pub(super) fn allows(self, kind: DivKind) -> bool {
        match self {
            PatternLevel::Measure => kind == DivKind::Measure,
            PatternLevel::Division => matches!(kind, DivKind::Measure | DivKind::Beat),
            PatternLevel::Anywhere => kind != DivKind::Undivided,
            PatternLevel::Nowhere => false,
        }
    }
}

/// An irregular split where one piece is held for its whole length
#[derive(Debug, Clone, Copy)]
pub(super) struct Special {
    pub pattern: &'static [u32],
    /// Index of the held piece
    pub held: usize,
    /// Whether the pattern applies to spans which split in three (rather than two)
    pub ternary: bool,
}

pub(super) const DOT: [Special; 2] = [
    Special {
        pattern: &[3, 1],
        held: 0,
        ternary: false,
    },
    Special {
        pattern: &[1, 3],
        held: 1,
        ternary: false,
    },
];

pub(super) const DOUBLE_DOT: [Special; 2] = [
    Special {
        pattern: &[7, 1],
        held: 0,
        ternary: false,
    },
    Special {
        pattern: &[1, 7],
        held: 1,
        ternary: false,
    },
];

pub(super) const SYNCOPATION: [Special; 1] = [Special {
    pattern: &[1, 2, 1],
    held: 1,
    ternary: false,
}];

pub(super) const SHORT_LONG_SHORT: [Special; 1] = [Special {
    pattern: &[1, 4, 1],
    held: 1,
    ternary: true,
}];
