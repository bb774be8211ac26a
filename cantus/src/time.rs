//! Exact musical time.  All times and durations are measured in quarter-note beats.

use std::fmt::{Display, Formatter};

use num_rational::Ratio;

use crate::Error;

/// A time point or duration, in quarter-note beats.  Rational so that tuplet divisions (thirds,
/// fifths, etc.) are represented exactly and sibling durations always sum to their parent's.
pub type Time = Ratio<i64>;

/// Creates a [`Time`] of `numer / denom` beats.
pub fn time(numer: i64, denom: i64) -> Time {
    Time::new(numer, denom)
}

/// Creates a [`Time`] of a whole number of beats.
pub fn beats(n: i64) -> Time {
    Time::from_integer(n)
}

pub fn to_f64(t: Time) -> f64 {
    *t.numer() as f64 / *t.denom() as f64
}

pub(crate) fn is_power_of_two(t: Time) -> bool {
    let (n, d) = (*t.numer(), *t.denom());
    n > 0 && d > 0 && (n as u64).is_power_of_two() && (d as u64).is_power_of_two()
}

/// A time signature, e.g. `6/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSig {
    num: u32,
    den: u32,
}

impl TimeSig {
    pub const COMMON: Self = Self { num: 4, den: 4 };

    pub fn new(num: u32, den: u32) -> crate::Result<Self> {
        if num == 0 || !den.is_power_of_two() || den > 128 {
            return Err(Error::InvalidTimeSig { num, den });
        }
        Ok(Self { num, den })
    }

    pub fn num(self) -> u32 {
        self.num
    }

    pub fn den(self) -> u32 {
        self.den
    }

    /// The length of the note value named by the denominator (e.g. `1/2` beats for `x/8`).
    pub fn beat_unit(self) -> Time {
        time(4, self.den as i64)
    }

    pub fn measure_dur(self) -> Time {
        self.beat_unit() * self.num as i64
    }

    /// Compound signatures (`6/8`, `9/8`, `12/16`, ...) group their units in threes.
    pub fn is_compound(self) -> bool {
        self.den >= 8 && self.num > 3 && self.num % 3 == 0
    }
}

impl Display for TimeSig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
