//! Distances between notes, used by per-dimension modules to decide when an earlier note can no
//! longer influence a later one.

use crate::time::{self, Time};

/// The position of a note in time and pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotePos {
    pub time: Time,
    /// MIDI note number
    pub pitch: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceConfig {
    /// Distance per beat of time between two notes
    pub beat_dist: f64,
    /// Distance per octave of pitch between two notes
    pub octave_dist: f64,
    /// Notes further apart than this are out of range of each other
    pub max_range: f64,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            beat_dist: 1.0,
            octave_dist: 1.0,
            max_range: 8.0,
        }
    }
}

/// Measures the distance between notes.  With a non-zero `octave_dist` the range check is not
/// monotone in time; modules which rely on monotonicity should set it to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    config: DistanceConfig,
}

impl Distance {
    pub fn new(config: DistanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DistanceConfig {
        &self.config
    }

    pub fn dist(&self, a: NotePos, b: NotePos) -> f64 {
        let beats = time::to_f64(b.time - a.time).abs();
        let octaves = (b.pitch - a.pitch).abs() as f64 / 12.0;
        beats * self.config.beat_dist + octaves * self.config.octave_dist
    }

    pub fn is_out_of_range(&self, earlier: NotePos, later: NotePos) -> bool {
        self.dist(earlier, later) > self.config.max_range
    }
}
