//! Frame-synchronous beam search with a fast-match lookahead.
//!
//! Each recognized frame runs the fast match one frame further ahead, then
//! scores, prunes and grows the main active list. Arcs that enter a phone
//! are pruned when the phone looked poor across the fast-match window:
//! `entry + weight * penalty < beam threshold`.

pub mod fast_match;
mod grow;
pub mod lookahead;
#[cfg(test)]
pub(crate) mod testutil;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, debug_span};

use crate::active_list::{ActiveList, ActiveListFactory, Pruner};
use crate::graph::{PhoneId, SearchGraph, StateId};
use crate::lattice::AlternateHypotheses;
use crate::scorer::{AcousticScorer, ModelLoader, ScoreOutcome};
use crate::settings::{SearchSettings, SettingsError};
use crate::token::{Token, TokenArena, TokenId};

use fast_match::FastMatch;
use grow::{expandable_tokens, FrameExpander, GrowContext, GrowPolicy, LookaheadPrune};
use lookahead::LookaheadPenalties;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(
        "state order violation: {from:?} (order {from_order}) -> {to:?} (order {to_order})"
    )]
    StateOrder {
        from: StateId,
        to: StateId,
        from_order: u32,
        to_order: u32,
    },
    #[error("recognize called before start_utterance")]
    NotStarted,
}

/// Collaborators of one search pass.
pub struct SearchComponents {
    pub graph: Arc<dyn SearchGraph>,
    pub scorer: Box<dyn AcousticScorer>,
    pub pruner: Box<dyn Pruner>,
    pub active_lists: Box<dyn ActiveListFactory>,
}

/// Counters for the current utterance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SearchStats {
    pub tokens_created: u64,
    pub tokens_scored: u64,
    /// Tokens created while growing the most recent frame.
    pub frame_tokens_created: u64,
    pub penalty_computations: u64,
    pub frames: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub active_list: Vec<TokenId>,
    /// Final tokens reached in the last grown frame.
    pub result_list: Vec<TokenId>,
    pub is_final: bool,
    /// Token of the initial state; every path starts here.
    pub initial_token: TokenId,
    pub frame: u32,
}

impl RecognitionResult {
    pub fn best_final_token(&self, arena: &TokenArena) -> Option<TokenId> {
        best_of(&self.result_list, arena)
    }

    /// Best final token, or the best active token when no final state was
    /// reached.
    pub fn best_token(&self, arena: &TokenArena) -> Option<TokenId> {
        self.best_final_token(arena)
            .or_else(|| best_of(&self.active_list, arena))
    }
}

fn best_of(ids: &[TokenId], arena: &TokenArena) -> Option<TokenId> {
    ids.iter()
        .copied()
        .max_by(|&a, &b| arena.score(a).total_cmp(&arena.score(b)))
}

pub struct LookaheadSearch {
    settings: SearchSettings,
    graph: Arc<dyn SearchGraph>,
    scorer: Box<dyn AcousticScorer>,
    pruner: Box<dyn Pruner>,
    active_lists: Box<dyn ActiveListFactory>,
    loader: Box<dyn ModelLoader>,
    fast_match: FastMatch,
    arena: TokenArena,
    active_list: ActiveList,
    result_list: Vec<TokenId>,
    alternates: AlternateHypotheses,
    penalties: LookaheadPenalties,
    expander: FrameExpander,
    seeds: Vec<TokenId>,
    initial_token: Option<TokenId>,
    frame: u32,
    stream_end: bool,
    stats: SearchStats,
}

impl LookaheadSearch {
    pub fn new(
        settings: SearchSettings,
        main: SearchComponents,
        fast_match: SearchComponents,
        mut loader: Box<dyn ModelLoader>,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        let fast_match = FastMatch::new(settings.lookahead_window, fast_match)?;
        if loader.has_tied_mixtures() {
            loader.set_score_queue_length(settings.lookahead_window + 2);
        }
        let SearchComponents {
            graph,
            scorer,
            pruner,
            active_lists,
        } = main;
        let active_list = active_lists.new_list();
        let alternates = AlternateHypotheses::new(settings.max_lattice_edges);
        Ok(Self {
            settings,
            graph,
            scorer,
            pruner,
            active_lists,
            loader,
            fast_match,
            arena: TokenArena::new(),
            active_list,
            result_list: Vec::new(),
            alternates,
            penalties: LookaheadPenalties::default(),
            expander: FrameExpander::default(),
            seeds: Vec::new(),
            initial_token: None,
            frame: 0,
            stream_end: false,
            stats: SearchStats::default(),
        })
    }

    pub fn start_utterance(&mut self) -> Result<(), SearchError> {
        let _span = debug_span!("start_utterance").entered();
        self.frame = 0;
        self.stats = SearchStats::default();
        self.arena.clear();
        self.alternates.clear();
        self.penalties.clear();
        self.penalties.reset_count();
        self.result_list.clear();
        self.stream_end = false;

        self.fast_match.reset(self.loader.as_mut())?;
        self.scorer.start_utterance();

        let initial = self.graph.initial_state();
        let seed = self
            .arena
            .alloc(Token::seed(initial, self.graph.kind(initial), 0));
        let mut list = self.active_lists.new_list();
        list.push(seed, 0.0);
        self.active_list = list;
        self.initial_token = Some(seed);
        self.grow()
    }

    /// Recognizes up to `n_frames` frames. Returns `None` when the input
    /// stream has ended.
    pub fn recognize(
        &mut self,
        n_frames: usize,
    ) -> Result<Option<RecognitionResult>, SearchError> {
        let initial_token = self.initial_token.ok_or(SearchError::NotStarted)?;
        let _span = debug_span!("recognize", n_frames, frame = self.frame).entered();
        self.stream_end = false;

        let mut done = false;
        for _ in 0..n_frames {
            if done {
                break;
            }
            if !self.fast_match.is_stream_end() {
                self.fast_match.step()?;
            }
            self.penalties.clear();
            self.fast_match.window_mut().drop_oldest();
            done = self.step_frame()?;
        }

        debug!(
            frame = self.frame,
            active = self.active_list.len(),
            results = self.result_list.len(),
            tokens_created = self.stats.tokens_created,
            tokens_scored = self.stats.tokens_scored,
            stream_end = self.stream_end
        );
        if self.stream_end {
            return Ok(None);
        }
        if self.settings.build_word_lattice {
            self.alternates.purge(&self.arena);
        }
        Ok(Some(RecognitionResult {
            active_list: self.active_list.tokens().to_vec(),
            result_list: self.result_list.clone(),
            is_final: done,
            initial_token,
            frame: self.frame,
        }))
    }

    /// One main-search frame. Returns true when the utterance is done.
    fn step_frame(&mut self) -> Result<bool, SearchError> {
        self.stats.tokens_scored += self.active_list.len() as u64;
        match self
            .scorer
            .calculate_scores(&mut self.arena, &self.active_list)
        {
            ScoreOutcome::Scored(_) => {}
            ScoreOutcome::Exhausted => return Ok(true),
            ScoreOutcome::StreamEnd => {
                self.stream_end = true;
                return Ok(true);
            }
        }
        let list = std::mem::replace(&mut self.active_list, self.active_lists.new_list());
        self.active_list = self.pruner.prune(list, &self.arena);
        self.frame += 1;
        self.stats.frames = self.frame;

        let interval = self.settings.grow_skip_interval;
        if interval > 0 && self.frame % interval == 0 {
            debug!(frame = self.frame, "grow skipped");
            return Ok(false);
        }
        self.grow()?;
        Ok(false)
    }

    fn grow(&mut self) -> Result<(), SearchError> {
        let _span = debug_span!("grow", frame = self.frame).entered();
        self.result_list.clear();
        let old = std::mem::replace(&mut self.active_list, self.active_lists.new_list());
        expandable_tokens(
            &old,
            &self.arena,
            self.settings.acoustic_lookahead_frames,
            &mut self.seeds,
        );

        let weight = self.settings.lookahead_penalty_weight;
        let lookahead = (weight > 0.0).then(|| LookaheadPrune {
            window: self.fast_match.window(),
            penalties: &mut self.penalties,
            weight,
        });
        let alternates = self
            .settings
            .build_word_lattice
            .then_some(&mut self.alternates);
        let policy = GrowPolicy {
            keep_all_tokens: self.settings.keep_all_tokens,
            check_state_order: self.settings.check_state_order,
            relative_word_beam_width: self.settings.relative_word_beam_width,
        };
        let mut ctx = GrowContext {
            graph: self.graph.as_ref(),
            arena: &mut self.arena,
            next: &mut self.active_list,
            frame: self.frame,
            lookahead,
            alternates,
            results: Some(&mut self.result_list),
        };
        let created = self
            .expander
            .expand(&mut ctx, &policy, self.seeds.iter().copied())?;

        self.stats.frame_tokens_created = created;
        self.stats.tokens_created += created;
        self.stats.penalty_computations = self.penalties.computations();
        debug!(
            expanded = self.seeds.len(),
            created,
            next = self.active_list.len(),
            results = self.result_list.len()
        );
        Ok(())
    }

    pub fn arena(&self) -> &TokenArena {
        &self.arena
    }

    pub fn alternates(&self) -> &AlternateHypotheses {
        &self.alternates
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn fast_match(&self) -> &FastMatch {
        &self.fast_match
    }

    pub fn active_list(&self) -> &ActiveList {
        &self.active_list
    }

    pub fn result_list(&self) -> &[TokenId] {
        &self.result_list
    }

    /// Token holding `state` after the most recent grow.
    pub fn best_token_for(&self, state: StateId) -> Option<TokenId> {
        self.expander.best_token(state)
    }

    /// Lookahead penalty of `phone` for the current frame, memoized.
    pub fn lookahead_penalty(&mut self, phone: PhoneId) -> f32 {
        let penalty = self.penalties.penalty(phone, self.fast_match.window());
        self.stats.penalty_computations = self.penalties.computations();
        penalty
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }
}
