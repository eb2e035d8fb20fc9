use std::sync::Arc;

use beam_core::active_list::{BeamActiveListFactory, SimplePruner};
use beam_core::graph::{NonEmittingKind, StateKind, StaticGraph, Transition};
use beam_core::scorer::{FrameTableScorer, NoTiedMixtures};
use beam_core::settings::{parse_settings_toml, ActiveListSettings, DEFAULT_SETTINGS_TOML};
use beam_core::{LookaheadSearch, SearchComponents};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

const PHONES: u16 = 40;
const WORDS: u32 = 200;
const FRAMES: usize = 100;

/// A word loop: every word is a chain of three phones, and every word end
/// returns to the loop's branch state.
fn word_loop() -> StaticGraph {
    let mut b = StaticGraph::builder();
    let hub = b.add_state(StateKind::NonEmitting(NonEmittingKind::Branch));
    for word in 0..WORDS {
        let mut prev = hub;
        for i in 0..3u32 {
            let phone = ((word * 7 + i * 13) % PHONES as u32) as u16;
            let boundary = b.add_state(StateKind::NonEmitting(NonEmittingKind::PhoneBoundary));
            let hmm = b.add_state(StateKind::Emitting { phone });
            b.add_arc(prev, Transition::new(boundary, if i == 0 { -3.0 } else { 0.0 }));
            b.add_arc(boundary, Transition::new(hmm, 0.0));
            b.add_arc(hmm, Transition::new(hmm, -0.7));
            prev = hmm;
        }
        let word_end = b.add_state(StateKind::NonEmitting(NonEmittingKind::Word(word)));
        b.add_arc(prev, Transition::new(word_end, -0.7));
        b.add_arc(word_end, Transition::new(hub, 0.0).with_language(-5.0));
    }
    b.build().unwrap()
}

fn phone_loop() -> StaticGraph {
    let mut b = StaticGraph::builder();
    let hub = b.add_state(StateKind::NonEmitting(NonEmittingKind::Branch));
    for phone in 0..PHONES {
        let hmm = b.add_state(StateKind::Emitting { phone });
        b.add_arc(hub, Transition::new(hmm, 0.0));
        b.add_arc(hmm, Transition::new(hmm, -0.7));
        b.add_arc(hmm, Transition::new(hub, -0.7));
    }
    b.build().unwrap()
}

/// Deterministic pseudo-random scores in [-12, 0).
fn score_table(frames: usize) -> Arc<Vec<Vec<f32>>> {
    let mut state = 0x2545_f491u32;
    let table = (0..frames)
        .map(|_| {
            (0..PHONES)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    -((state % 1200) as f32) / 100.0
                })
                .collect()
        })
        .collect();
    Arc::new(table)
}

fn components(graph: Arc<StaticGraph>, table: Arc<Vec<Vec<f32>>>, beam: f32) -> SearchComponents {
    SearchComponents {
        graph,
        scorer: Box::new(FrameTableScorer::shared(table)),
        pruner: Box::new(SimplePruner),
        active_lists: Box::new(BeamActiveListFactory::new(ActiveListSettings {
            absolute_beam_width: 2000,
            relative_beam_width: beam,
        })),
    }
}

fn bench_recognize(c: &mut Criterion) {
    let main_graph = Arc::new(word_loop());
    let fm_graph = Arc::new(phone_loop());
    let table = score_table(FRAMES + 16);
    let defaults = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap().search;

    let mut group = c.benchmark_group("recognize");
    for (label, weight) in [("no_lookahead", 0.0f32), ("lookahead", 1.0)] {
        for window in [1usize, 5, 10] {
            let mut settings = defaults.clone();
            settings.lookahead_window = window;
            settings.lookahead_penalty_weight = weight;
            group.bench_with_input(BenchmarkId::new(label, window), &settings, |b, settings| {
                let mut search = LookaheadSearch::new(
                    settings.clone(),
                    components(main_graph.clone(), table.clone(), -60.0),
                    components(fm_graph.clone(), table.clone(), -40.0),
                    Box::new(NoTiedMixtures),
                )
                .unwrap();
                b.iter(|| {
                    search.start_utterance().unwrap();
                    search.recognize(FRAMES).unwrap()
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_recognize);
criterion_main!(benches);
