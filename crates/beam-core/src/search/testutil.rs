//! Shared fixtures for search tests.

use std::sync::{Arc, Mutex};

use crate::active_list::{BeamActiveListFactory, SimplePruner};
use crate::graph::{NonEmittingKind, StateId, StateKind, StaticGraph, Transition};
use crate::scorer::{FrameTableScorer, ModelLoader, NoTiedMixtures};
use crate::settings::{
    parse_settings_toml, ActiveListSettings, SearchSettings, DEFAULT_SETTINGS_TOML,
};

use super::{LookaheadSearch, SearchComponents};

/// States of the two-word graph built by `two_word_graph`.
pub struct TwoWords {
    pub graph: Arc<StaticGraph>,
    pub init: StateId,
    pub phone_a: StateId,
    pub word_a: StateId,
    pub final_a: StateId,
    pub phone_b: StateId,
    pub word_b: StateId,
    pub final_b: StateId,
}

pub const WORD_A: u32 = 1;
pub const WORD_B: u32 = 2;

/// init -> (phone boundary -> phone -> end of unit -> word -> final) twice.
///
/// Word A uses phone 0 and is entered with `trans_a`; word B uses phone 1
/// and is entered with `trans_b`. Each phone has a self-loop.
pub fn two_word_graph(trans_a: f32, trans_b: f32) -> TwoWords {
    let mut b = StaticGraph::builder();
    let init = b.add_state(StateKind::NonEmitting(NonEmittingKind::Branch));
    let mut chain = |phone: u16, word: u32, entry: f32| {
        let boundary = b.add_state(StateKind::NonEmitting(NonEmittingKind::PhoneBoundary));
        let hmm = b.add_state(StateKind::Emitting { phone });
        let unit_end = b.add_state(StateKind::NonEmitting(NonEmittingKind::EndOfUnit));
        let word_state = b.add_state(StateKind::NonEmitting(NonEmittingKind::Word(word)));
        let fin = b.add_state(StateKind::Final);
        b.add_arc(init, Transition::new(boundary, entry));
        b.add_arc(boundary, Transition::new(hmm, 0.0));
        b.add_arc(hmm, Transition::new(hmm, 0.0));
        b.add_arc(hmm, Transition::new(unit_end, 0.0));
        b.add_arc(unit_end, Transition::new(word_state, 0.0));
        b.add_arc(word_state, Transition::new(fin, 0.0));
        (hmm, word_state, fin)
    };
    let (phone_a, word_a, final_a) = chain(0, WORD_A, trans_a);
    let (phone_b, word_b, final_b) = chain(1, WORD_B, trans_b);
    b.set_initial(init);
    TwoWords {
        graph: Arc::new(b.build().unwrap()),
        init,
        phone_a,
        word_a,
        final_a,
        phone_b,
        word_b,
        final_b,
    }
}

/// Fast-match graph: a branch state looping over one emitting state per
/// phone.
pub fn phone_loop_graph(phones: u16) -> Arc<StaticGraph> {
    let mut b = StaticGraph::builder();
    let hub = b.add_state(StateKind::NonEmitting(NonEmittingKind::Branch));
    for phone in 0..phones {
        let hmm = b.add_state(StateKind::Emitting { phone });
        b.add_arc(hub, Transition::new(hmm, 0.0));
        b.add_arc(hmm, Transition::new(hmm, 0.0));
        b.add_arc(hmm, Transition::new(hub, 0.0));
    }
    Arc::new(b.build().unwrap())
}

/// `frames` rows of the same per-phone scores.
pub fn constant_table(row: &[f32], frames: usize) -> Vec<Vec<f32>> {
    vec![row.to_vec(); frames]
}

pub fn components(
    graph: Arc<StaticGraph>,
    table: Vec<Vec<f32>>,
    relative_beam_width: f32,
) -> SearchComponents {
    SearchComponents {
        graph,
        scorer: Box::new(FrameTableScorer::new(table)),
        pruner: Box::new(SimplePruner),
        active_lists: Box::new(BeamActiveListFactory::new(ActiveListSettings {
            absolute_beam_width: 0,
            relative_beam_width,
        })),
    }
}

pub fn search_settings(lookahead_window: usize, weight: f32) -> SearchSettings {
    let mut s = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap().search;
    s.lookahead_window = lookahead_window;
    s.lookahead_penalty_weight = weight;
    s
}

/// Main search over `graph` with a two-phone fast match that strongly
/// prefers phone 0.
pub fn search_with(
    settings: SearchSettings,
    graph: Arc<StaticGraph>,
    main_table: Vec<Vec<f32>>,
) -> LookaheadSearch {
    let frames = main_table.len() + settings.lookahead_window + 2;
    LookaheadSearch::new(
        settings,
        components(graph, main_table, -10.0),
        components(
            phone_loop_graph(2),
            constant_table(&[-1.0, -30.0], frames),
            -1000.0,
        ),
        Box::new(NoTiedMixtures),
    )
    .unwrap()
}

#[derive(Debug, Default)]
pub struct LoaderLog {
    pub queue_length: Option<usize>,
    pub clears: usize,
}

/// Tied-mixture loader that records the calls it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingLoader {
    pub log: Arc<Mutex<LoaderLog>>,
}

impl ModelLoader for RecordingLoader {
    fn has_tied_mixtures(&self) -> bool {
        true
    }

    fn set_score_queue_length(&mut self, frames: usize) {
        self.log.lock().unwrap().queue_length = Some(frames);
    }

    fn clear_scores(&mut self) {
        self.log.lock().unwrap().clears += 1;
    }
}
