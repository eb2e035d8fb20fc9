//! Frame-scoped token lists with beam pruning.

use crate::settings::ActiveListSettings;
use crate::token::{TokenArena, TokenId};

/// Tokens eligible for expansion in one frame.
///
/// Tracks the best score seen so far, so the beam threshold tightens while a
/// frame's expansion fills the list.
#[derive(Debug, Clone)]
pub struct ActiveList {
    tokens: Vec<TokenId>,
    absolute_beam_width: usize,
    relative_beam_width: f32,
    best: Option<(TokenId, f32)>,
}

impl ActiveList {
    pub fn new(absolute_beam_width: usize, relative_beam_width: f32) -> Self {
        Self {
            tokens: Vec::new(),
            absolute_beam_width,
            relative_beam_width,
            best: None,
        }
    }

    /// Empty list with the same beam configuration.
    pub fn empty_like(&self) -> Self {
        Self::new(self.absolute_beam_width, self.relative_beam_width)
    }

    /// Lowest score a token may have to stay in the list.
    pub fn beam_threshold(&self) -> f32 {
        self.best_score() + self.relative_beam_width
    }

    pub fn best_score(&self) -> f32 {
        self.best.map_or(f32::NEG_INFINITY, |(_, s)| s)
    }

    pub fn best(&self) -> Option<TokenId> {
        self.best.map(|(id, _)| id)
    }

    pub fn relative_beam_width(&self) -> f32 {
        self.relative_beam_width
    }

    pub fn absolute_beam_width(&self) -> usize {
        self.absolute_beam_width
    }

    pub fn admits(&self, score: f32) -> bool {
        score >= self.beam_threshold()
    }

    /// Adds a token unless its score falls below the beam threshold.
    pub fn add(&mut self, id: TokenId, score: f32) -> bool {
        if !self.admits(score) {
            return false;
        }
        self.push(id, score);
        true
    }

    /// Adds without the beam test; callers check `admits` first.
    pub(crate) fn push(&mut self, id: TokenId, score: f32) {
        self.tokens.push(id);
        self.note_score(id, score);
    }

    /// Records an in-place score change of a token already in the list.
    pub fn note_score(&mut self, id: TokenId, score: f32) {
        if score > self.best_score() || self.best.is_none() {
            self.best = Some((id, score));
        }
    }

    /// Recomputes the best entry after scores changed outside the list.
    pub fn refresh(&mut self, arena: &TokenArena) {
        self.best = None;
        for &id in &self.tokens {
            let score = arena.score(id);
            if self.best.map_or(true, |(_, s)| score > s) {
                self.best = Some((id, score));
            }
        }
    }

    /// Sorts by score, applies the absolute beam and then the relative beam.
    pub fn commit(mut self, arena: &TokenArena) -> ActiveList {
        self.tokens
            .sort_by(|&a, &b| arena.score(b).total_cmp(&arena.score(a)));
        if self.absolute_beam_width > 0 && self.tokens.len() > self.absolute_beam_width {
            self.tokens.truncate(self.absolute_beam_width);
        }
        self.best = self.tokens.first().map(|&id| (id, arena.score(id)));
        let threshold = self.beam_threshold();
        self.tokens.retain(|&id| arena.score(id) >= threshold);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.tokens.iter().copied()
    }

    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Produces empty active lists for one search pass.
pub trait ActiveListFactory: Send {
    fn new_list(&self) -> ActiveList;
}

#[derive(Debug, Clone, Copy)]
pub struct BeamActiveListFactory {
    settings: ActiveListSettings,
}

impl BeamActiveListFactory {
    pub fn new(settings: ActiveListSettings) -> Self {
        Self { settings }
    }
}

impl ActiveListFactory for BeamActiveListFactory {
    fn new_list(&self) -> ActiveList {
        ActiveList::new(
            self.settings.absolute_beam_width,
            self.settings.relative_beam_width,
        )
    }
}

/// Bulk pruning applied once per step after scoring.
pub trait Pruner: Send {
    fn prune(&mut self, list: ActiveList, arena: &TokenArena) -> ActiveList;
}

/// Pruner that commits the list with its own beams.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimplePruner;

impl Pruner for SimplePruner {
    fn prune(&mut self, list: ActiveList, arena: &TokenArena) -> ActiveList {
        list.commit(arena)
    }
}
