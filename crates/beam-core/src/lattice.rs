use std::collections::HashMap;

use tracing::debug;

use crate::token::{TokenArena, TokenId};

/// Losing predecessors of word tokens.
///
/// When two paths meet at a word state in the same frame only the better one
/// stays on the token; the other is recorded here so a lattice builder can
/// still reach it.
#[derive(Debug)]
pub struct AlternateHypotheses {
    links: HashMap<TokenId, Vec<TokenId>>,
    max_edges: usize,
}

impl AlternateHypotheses {
    /// `max_edges` counts the primary predecessor, so each token keeps at
    /// most `max_edges - 1` alternates after `purge`.
    pub fn new(max_edges: usize) -> Self {
        Self {
            links: HashMap::new(),
            max_edges,
        }
    }

    pub fn add(&mut self, token: TokenId, predecessor: TokenId) {
        self.links.entry(token).or_default().push(predecessor);
    }

    pub fn get(&self, token: TokenId) -> &[TokenId] {
        self.links.get(&token).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_alternates(&self, token: TokenId) -> bool {
        self.links.get(&token).is_some_and(|l| !l.is_empty())
    }

    pub fn edge_count(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }

    /// Keep the best-scoring `max_edges - 1` alternates of every token.
    pub fn purge(&mut self, arena: &TokenArena) {
        let keep = self.max_edges.saturating_sub(1);
        let mut dropped = 0usize;
        for list in self.links.values_mut() {
            if list.len() > keep {
                list.sort_by(|&a, &b| arena.score(b).total_cmp(&arena.score(a)));
                dropped += list.len() - keep;
                list.truncate(keep);
            }
        }
        self.links.retain(|_, list| !list.is_empty());
        if dropped > 0 {
            debug!(dropped, remaining = self.edge_count(), "purged lattice edges");
        }
    }
}
