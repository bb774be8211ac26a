//! End-to-end runs of the engines through the public API

use std::cell::Cell;

use cantus::{
    quantize::{self, Measure, RawNote, VoiceGroup},
    search::{self, Choice, ChoiceModule, EngineKind, Expansion, Update},
    time::beats,
    Error, TimeSig,
};
use ordered_float::OrderedFloat;

fn one_group(notes: &[(f64, f64)]) -> Measure {
    Measure {
        time: beats(0),
        sig: TimeSig::COMMON,
        groups: vec![VoiceGroup {
            notes: notes.iter().map(|&(o, e)| RawNote::new(o, e)).collect(),
            tuplets: vec![],
        }],
    }
}

#[test]
fn quarter_notes_quantize_exactly() {
    let measure = one_group(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0), (3.0, 4.0)]);
    let groups = quantize::quantize(&measure, &quantize::Config::default()).unwrap();
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.error, 0.0);
    assert_eq!(
        group.divisions.iter().map(|d| d.dur()).collect::<Vec<_>>(),
        vec![beats(1); 4]
    );
    assert!(group.divisions.iter().all(|d| d.tuplets().is_empty()));
    for (i, note) in group.notes.iter().enumerate() {
        assert_eq!(note.time, beats(i as i64));
        assert_eq!(note.dur, beats(1));
        assert!(!note.grace);
    }
}

#[test]
fn late_onset_snaps_to_grid() {
    let measure = one_group(&[(1.03, 4.0)]);
    let groups = quantize::quantize_all(&[measure], &quantize::Config::default()).unwrap();
    let group = &groups[0][0];
    assert_eq!(group.notes[0].time, beats(1));
    assert_eq!(group.notes[0].dur, beats(3));
    assert!(group.divisions.iter().all(|d| d.tuplets().is_empty()));
}

/// `len` events with 3 choices.  Choice 1 always scores best, and after the first event it's the
/// only valid choice.
struct PreferOne {
    len: usize,
    assigned: Vec<usize>,
    created: Cell<usize>,
    freed: usize,
}

impl ChoiceModule for PreferOne {
    /// `(position, choice)`
    type Node = (usize, usize);
    type Score = OrderedFloat<f64>;

    fn num_choices(&self) -> usize {
        3
    }

    fn new_node(&self, prev: Option<&(usize, usize)>, choice: Choice) -> Expansion<(usize, usize)> {
        let idx = prev.map_or(0, |(p, _)| p + 1);
        if idx == self.len {
            return Expansion::End;
        }
        if idx > 0 && choice.index() != 1 {
            return Expansion::Invalid;
        }
        self.created.set(self.created.get() + 1);
        Expansion::Node((idx, choice.index()))
    }

    fn score(&self, window: &[&(usize, usize)]) -> OrderedFloat<f64> {
        let (_, choice) = window[window.len() - 1];
        OrderedFloat(if *choice == 1 { 0.0 } else { 1.0 })
    }

    fn is_out_of_range(&self, earlier: &(usize, usize), later: &(usize, usize)) -> bool {
        later.0 - earlier.0 > 2
    }

    fn assign(&mut self, choice: Choice) {
        self.assigned.push(choice.index());
    }

    fn free_node(&mut self, _node: (usize, usize)) {
        self.freed += 1;
    }
}

#[test]
fn best_choice_is_committed_everywhere() {
    for engine in [EngineKind::BestFirst, EngineKind::DynamicProgramming] {
        let mut module = PreferOne {
            len: 30,
            assigned: vec![],
            created: Cell::new(0),
            freed: 0,
        };
        let config = search::Config {
            engine,
            ..search::Config::default()
        };
        let mut completed = false;
        search::run(&mut module, &config, |update| {
            if let Update::Complete = update {
                completed = true;
            }
        })
        .unwrap();
        assert!(completed);
        assert_eq!(module.assigned, vec![1; 30], "{:?}", engine);
        assert_eq!(module.freed, module.created.get());
    }
}

/// Has no valid choices at all
struct Stuck {
    assigned: Vec<usize>,
}

impl ChoiceModule for Stuck {
    type Node = ();
    type Score = OrderedFloat<f64>;

    fn num_choices(&self) -> usize {
        2
    }

    fn new_node(&self, _prev: Option<&()>, _choice: Choice) -> Expansion<()> {
        Expansion::Invalid
    }

    fn score(&self, _window: &[&()]) -> OrderedFloat<f64> {
        OrderedFloat(0.0)
    }

    fn is_out_of_range(&self, _earlier: &(), _later: &()) -> bool {
        false
    }

    fn assign(&mut self, choice: Choice) {
        self.assigned.push(choice.index());
    }
}

#[test]
fn no_possible_choices() {
    for engine in [EngineKind::BestFirst, EngineKind::DynamicProgramming] {
        let mut module = Stuck { assigned: vec![] };
        let config = search::Config {
            engine,
            ..search::Config::default()
        };
        let err = search::run(&mut module, &config, |_| {}).unwrap_err();
        assert_eq!(err, Error::NoChoices { position: 0 });
        assert!(err.to_string().starts_with("no possible choices"));
        assert!(module.assigned.is_empty());
    }
}
