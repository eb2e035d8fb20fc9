//! Fast-match pass: a cheap phone-loop search that runs ahead of the main
//! search and records per-phone evidence for every frame it expands.

use std::sync::Arc;

use tracing::{debug, debug_span};

use crate::active_list::{ActiveList, ActiveListFactory, Pruner};
use crate::graph::SearchGraph;
use crate::scorer::{AcousticScorer, ModelLoader, ScoreOutcome};
use crate::settings::{check_lookahead_window, SettingsError};
use crate::token::{Token, TokenArena, TokenId};

use super::grow::{expandable_tokens, FrameExpander, GrowContext, GrowPolicy};
use super::lookahead::{FrameCiScores, LookaheadWindow};
use super::{SearchComponents, SearchError};

const FAST_MATCH_POLICY: GrowPolicy = GrowPolicy {
    keep_all_tokens: true,
    check_state_order: false,
    relative_word_beam_width: f32::NEG_INFINITY,
};

pub struct FastMatch {
    graph: Arc<dyn SearchGraph>,
    scorer: Box<dyn AcousticScorer>,
    pruner: Box<dyn Pruner>,
    active_lists: Box<dyn ActiveListFactory>,
    arena: TokenArena,
    active_list: ActiveList,
    expander: FrameExpander,
    window: LookaheadWindow,
    lookahead_window: usize,
    frame: u32,
    stream_end: bool,
    steps: u64,
    seeds: Vec<TokenId>,
}

impl FastMatch {
    /// Fails unless `lookahead_window` is in `1..=10`.
    pub fn new(
        lookahead_window: usize,
        components: SearchComponents,
    ) -> Result<Self, SettingsError> {
        check_lookahead_window(lookahead_window)?;
        let SearchComponents {
            graph,
            scorer,
            pruner,
            active_lists,
        } = components;
        let active_list = active_lists.new_list();
        Ok(Self {
            graph,
            scorer,
            pruner,
            active_lists,
            arena: TokenArena::new(),
            active_list,
            expander: FrameExpander::default(),
            window: LookaheadWindow::with_capacity(lookahead_window),
            lookahead_window,
            frame: 0,
            stream_end: false,
            steps: 0,
            seeds: Vec::new(),
        })
    }

    /// Starts a new utterance and primes the window with
    /// `lookahead_window - 1` steps beyond the initial frame.
    pub fn reset(&mut self, loader: &mut dyn ModelLoader) -> Result<(), SearchError> {
        let _span = debug_span!("fast_match_reset", window = self.lookahead_window).entered();
        self.frame = 0;
        self.arena.clear();
        self.window.clear();
        self.stream_end = false;
        self.steps = 0;
        if loader.has_tied_mixtures() {
            loader.clear_scores();
        }
        self.scorer.start_utterance();

        let initial = self.graph.initial_state();
        let seed = self
            .arena
            .alloc(Token::seed(initial, self.graph.kind(initial), self.frame));
        let mut list = self.active_lists.new_list();
        list.push(seed, 0.0);
        self.active_list = list;
        self.grow()?;

        for _ in 1..self.lookahead_window {
            if self.stream_end {
                break;
            }
            self.step()?;
        }
        debug!(primed = self.window.len(), steps = self.steps);
        Ok(())
    }

    /// Scores, prunes and grows one frame. Does nothing once the input has
    /// ended.
    pub fn step(&mut self) -> Result<(), SearchError> {
        if self.stream_end {
            return Ok(());
        }
        self.steps += 1;
        let outcome = self
            .scorer
            .calculate_scores(&mut self.arena, &self.active_list);
        if !matches!(outcome, ScoreOutcome::Scored(_)) {
            self.stream_end = true;
            debug!(frame = self.frame, ?outcome, "fast match stream end");
            return Ok(());
        }
        let list = std::mem::replace(&mut self.active_list, self.active_lists.new_list());
        self.active_list = self.pruner.prune(list, &self.arena);
        self.frame += 1;
        self.grow()
    }

    /// Snapshots the tokens being expanded, then expands them.
    fn grow(&mut self) -> Result<(), SearchError> {
        let _span = debug_span!("fast_match_grow", frame = self.frame).entered();
        let old = std::mem::replace(&mut self.active_list, self.active_lists.new_list());
        expandable_tokens(&old, &self.arena, 0.0, &mut self.seeds);

        let mut snapshot = FrameCiScores::new(self.frame, self.graph.phone_count());
        for &id in &self.seeds {
            let token = self.arena.get(id);
            if let Some(phone) = token.kind.base_phone() {
                snapshot.observe(phone, token.score);
            }
        }

        let mut ctx = GrowContext {
            graph: self.graph.as_ref(),
            arena: &mut self.arena,
            next: &mut self.active_list,
            frame: self.frame,
            lookahead: None,
            alternates: None,
            results: None,
        };
        let created = self
            .expander
            .expand(&mut ctx, &FAST_MATCH_POLICY, self.seeds.iter().copied())?;
        self.compact();
        debug!(
            expanded = self.seeds.len(),
            created,
            next = self.active_list.len(),
            max_score = snapshot.max_score()
        );
        self.window.push(snapshot);
        Ok(())
    }

    /// Drops every token except those of the next active list. Fast-match
    /// tokens are never backtraced, so their paths are cut as well.
    fn compact(&mut self) {
        let ids = self.arena.retain_detached(self.active_list.tokens());
        let mut list = self.active_list.empty_like();
        for id in ids {
            list.push(id, self.arena.score(id));
        }
        self.active_list = list;
    }

    pub fn window(&self) -> &LookaheadWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut LookaheadWindow {
        &mut self.window
    }

    pub fn is_stream_end(&self) -> bool {
        self.stream_end
    }

    /// Frame label of the most recently recorded snapshot.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Steps run since the last `reset`, including those that found the
    /// stream ended.
    pub fn steps_taken(&self) -> u64 {
        self.steps
    }

    pub fn active_list(&self) -> &ActiveList {
        &self.active_list
    }

    /// Tokens currently held by the fast-match arena.
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    pub fn lookahead_window(&self) -> usize {
        self.lookahead_window
    }
}
