//! Choosing between treble and bass clef for a single staff, as a [`ChoiceModule`].
//!
//! Each note costs a penalty per ledger line it needs in its clef, and switching clef between two
//! notes which are within range of each other costs a fixed penalty.  Notes far enough apart
//! (e.g. across a long rest) can switch for free.

use ordered_float::OrderedFloat;

use crate::{
    distance::{Distance, DistanceConfig, NotePos},
    search::{self, Choice, ChoiceModule, Expansion},
    time::Time,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clef {
    Treble,
    Bass,
}

impl Clef {
    pub const ALL: [Clef; 2] = [Clef::Treble, Clef::Bass];

    fn from_choice(choice: Choice) -> Self {
        Self::ALL[choice.index()]
    }

    /// Diatonic steps of the bottom and top staff lines
    fn staff(self) -> (i32, i32) {
        match self {
            Clef::Treble => (37, 45), // E4 to F5
            Clef::Bass => (25, 33),   // G2 to A3
        }
    }

    /// The number of ledger lines needed to write `pitch` in this clef
    pub fn ledger_lines(self, pitch: i32) -> u32 {
        const STEPS: [i32; 12] = [0, 0, 1, 1, 2, 3, 3, 4, 4, 5, 5, 6];
        let step = pitch.div_euclid(12) * 7 + STEPS[pitch.rem_euclid(12) as usize];
        let (bottom, top) = self.staff();
        let outside = if step > top {
            step - top
        } else {
            (bottom - step).max(0)
        };
        (outside / 2) as u32
    }
}

/// A note on the staff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub time: Time,
    /// MIDI note number
    pub pitch: i32,
    /// A clef the user has fixed for this note
    pub clef: Option<Clef>,
}

impl Note {
    pub fn new(time: Time, pitch: i32) -> Self {
        Self {
            time,
            pitch,
            clef: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Cost per ledger line
    pub ledger_penalty: f64,
    /// Cost of changing clef between two notes which are in range of each other
    pub change_penalty: f64,
    /// Decides when notes are in range of each other.  `octave_dist` should be `0.0` so that the
    /// range check is monotone in time.
    pub distance: DistanceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_penalty: 1.0,
            change_penalty: 4.0,
            distance: DistanceConfig {
                beat_dist: 1.0,
                octave_dist: 0.0,
                max_range: 4.0,
            },
        }
    }
}

/// Choose a clef for every note in `notes` (which must be in time order)
pub fn choose_clefs(
    notes: &[Note],
    config: &Config,
    search_config: &search::Config,
) -> crate::Result<Vec<Clef>> {
    let mut chooser = ClefChooser {
        notes,
        config,
        distance: Distance::new(config.distance),
        assigned: Vec::with_capacity(notes.len()),
    };
    search::run(&mut chooser, search_config, |update| {
        log::trace!("Clef search: {:?}", update)
    })?;
    Ok(chooser.assigned)
}

struct ClefChooser<'a> {
    notes: &'a [Note],
    config: &'a Config,
    distance: Distance,
    assigned: Vec<Clef>,
}

#[derive(Debug)]
struct ClefNode {
    idx: usize,
    clef: Clef,
    pos: NotePos,
}

impl ChoiceModule for ClefChooser<'_> {
    type Node = ClefNode;
    type Score = OrderedFloat<f64>;

    fn num_choices(&self) -> usize {
        Clef::ALL.len()
    }

    fn new_node(&self, prev: Option<&ClefNode>, choice: Choice) -> Expansion<ClefNode> {
        let idx = prev.map_or(0, |p| p.idx + 1);
        let Some(note) = self.notes.get(idx) else {
            return Expansion::End;
        };
        let clef = Clef::from_choice(choice);
        if note.clef.is_some_and(|c| c != clef) {
            return Expansion::Invalid;
        }
        Expansion::Node(ClefNode {
            idx,
            clef,
            pos: NotePos {
                time: note.time,
                pitch: note.pitch,
            },
        })
    }

    fn score(&self, window: &[&ClefNode]) -> OrderedFloat<f64> {
        let last = window[window.len() - 1];
        let mut cost = last.clef.ledger_lines(last.pos.pitch) as f64 * self.config.ledger_penalty;
        if let [.., prev, _] = window {
            if prev.clef != last.clef {
                cost += self.config.change_penalty;
            }
        }
        OrderedFloat(cost)
    }

    fn is_out_of_range(&self, earlier: &ClefNode, later: &ClefNode) -> bool {
        self.distance.is_out_of_range(earlier.pos, later.pos)
    }

    fn assign(&mut self, choice: Choice) {
        self.assigned.push(Clef::from_choice(choice));
    }
}
