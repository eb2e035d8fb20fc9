//! Acoustic scoring and model-loader hooks used by the search.
//!
//! Feature extraction and Gaussian evaluation live outside this crate; the
//! search only needs something that adds a frame's acoustic evidence to the
//! tokens of an active list and says whether input remains.

use std::sync::Arc;

use tracing::debug;

use crate::active_list::ActiveList;
use crate::token::{TokenArena, TokenId};

/// Result of scoring one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    /// The frame was scored; carries the best token.
    Scored(TokenId),
    /// Nothing left to score in this utterance: the list was empty or the
    /// input signalled its end. The caller finishes the utterance.
    Exhausted,
    /// No input at all; the stream is over.
    StreamEnd,
}

pub trait AcousticScorer: Send {
    /// Rewind to the first frame of a new utterance.
    fn start_utterance(&mut self) {}

    /// Adds the next frame's acoustic scores to every emitting token in `list`.
    fn calculate_scores(&mut self, arena: &mut TokenArena, list: &ActiveList) -> ScoreOutcome;
}

/// Model-loader controls for tied-mixture score caching.
pub trait ModelLoader: Send {
    fn has_tied_mixtures(&self) -> bool;

    /// Number of frames of cached Gaussian scores to retain.
    fn set_score_queue_length(&mut self, frames: usize);

    fn clear_scores(&mut self);
}

/// Loader without a tied-mixture cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTiedMixtures;

impl ModelLoader for NoTiedMixtures {
    fn has_tied_mixtures(&self) -> bool {
        false
    }

    fn set_score_queue_length(&mut self, _frames: usize) {}

    fn clear_scores(&mut self) {}
}

/// Scorer over a precomputed `frame x phone` table of log likelihoods.
///
/// After the last frame it reports `Exhausted` once, then `StreamEnd`.
/// Phones missing from a row score negative infinity.
#[derive(Debug, Clone)]
pub struct FrameTableScorer {
    frames: Arc<Vec<Vec<f32>>>,
    cursor: usize,
    end_signalled: bool,
}

impl FrameTableScorer {
    pub fn new(frames: Vec<Vec<f32>>) -> Self {
        Self::shared(Arc::new(frames))
    }

    /// Several scorers (main and fast match) can read one table.
    pub fn shared(frames: Arc<Vec<Vec<f32>>>) -> Self {
        Self {
            frames,
            cursor: 0,
            end_signalled: false,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Index of the next frame to be scored.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl AcousticScorer for FrameTableScorer {
    fn start_utterance(&mut self) {
        self.cursor = 0;
        self.end_signalled = false;
    }

    fn calculate_scores(&mut self, arena: &mut TokenArena, list: &ActiveList) -> ScoreOutcome {
        let Some(row) = self.frames.get(self.cursor) else {
            if self.end_signalled {
                return ScoreOutcome::StreamEnd;
            }
            self.end_signalled = true;
            debug!(frames = self.frames.len(), "end of scored input");
            return ScoreOutcome::Exhausted;
        };
        self.cursor += 1;

        let mut best: Option<(TokenId, f32)> = None;
        for id in list.iter() {
            let token = arena.get_mut(id);
            let Some(phone) = token.kind.base_phone() else {
                continue;
            };
            let acoustic = row
                .get(phone as usize)
                .copied()
                .unwrap_or(f32::NEG_INFINITY);
            token.acoustic_score = acoustic;
            token.score += acoustic;
            if best.map_or(true, |(_, s)| token.score > s) {
                best = Some((id, token.score));
            }
        }
        match best {
            Some((id, _)) => ScoreOutcome::Scored(id),
            None => ScoreOutcome::Exhausted,
        }
    }
}
