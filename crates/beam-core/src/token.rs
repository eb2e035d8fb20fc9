//! Token arena: hypotheses and their predecessor links for one utterance.
//!
//! Tokens are slots in a `Vec`; links between them are `TokenId` indices.
//! A better path reaching an occupied (state, frame) rewrites the slot in
//! place instead of allocating. The whole arena is dropped or cleared at
//! once when a new utterance starts.

use crate::graph::{StateId, StateKind, Transition, WordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u32);

impl TokenId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub state: StateId,
    pub kind: StateKind,
    /// Cumulative log score of the best path reaching this token.
    pub score: f32,
    /// Acoustic score added by the most recent scoring pass.
    pub acoustic_score: f32,
    pub insertion_score: f32,
    pub language_score: f32,
    pub frame: u32,
    pub predecessor: Option<TokenId>,
}

impl Token {
    /// Initial token of a search: no predecessor, zero score.
    pub fn seed(state: StateId, kind: StateKind, frame: u32) -> Self {
        Self {
            state,
            kind,
            score: 0.0,
            acoustic_score: 0.0,
            insertion_score: 0.0,
            language_score: 0.0,
            frame,
            predecessor: None,
        }
    }

    /// Token created by following `arc`.
    pub fn entering(
        predecessor: Option<TokenId>,
        arc: &Transition,
        kind: StateKind,
        score: f32,
        frame: u32,
    ) -> Self {
        Self {
            state: arc.target,
            kind,
            score,
            acoustic_score: 0.0,
            insertion_score: arc.insertion,
            language_score: arc.language,
            frame,
            predecessor,
        }
    }

    pub fn is_emitting(&self) -> bool {
        self.kind.is_emitting()
    }

    pub fn is_final(&self) -> bool {
        self.kind.is_final()
    }

    pub fn is_word(&self) -> bool {
        self.kind.is_word()
    }
}

#[derive(Debug, Default)]
pub struct TokenArena {
    tokens: Vec<Token>,
}

impl TokenArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
        }
    }

    /// Drops every token. Ids handed out earlier become invalid.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn alloc(&mut self, token: Token) -> TokenId {
        let id = TokenId(self.tokens.len() as u32);
        self.tokens.push(token);
        id
    }

    /// Panics on an id from another arena or from before the last `clear`.
    pub fn get(&self, id: TokenId) -> &Token {
        &self.tokens[id.index()]
    }

    pub fn get_mut(&mut self, id: TokenId) -> &mut Token {
        &mut self.tokens[id.index()]
    }

    pub fn score(&self, id: TokenId) -> f32 {
        self.tokens[id.index()].score
    }

    /// Rewrites a token with a better path that arrived through `arc`.
    pub fn update(
        &mut self,
        id: TokenId,
        predecessor: Option<TokenId>,
        arc: &Transition,
        score: f32,
        frame: u32,
    ) {
        let token = &mut self.tokens[id.index()];
        token.predecessor = predecessor;
        token.score = score;
        token.insertion_score = arc.insertion;
        token.language_score = arc.language;
        token.frame = frame;
    }

    /// Keeps only `ids`, cut loose from their predecessors and renumbered in
    /// the given order. Returns the new ids.
    pub fn retain_detached(&mut self, ids: &[TokenId]) -> Vec<TokenId> {
        let kept: Vec<Token> = ids
            .iter()
            .map(|&id| Token {
                predecessor: None,
                ..self.get(id).clone()
            })
            .collect();
        self.tokens.clear();
        self.tokens.extend(kept);
        (0..ids.len() as u32).map(TokenId).collect()
    }

    /// Token ids from the start of the path to `id`, inclusive.
    pub fn backtrace(&self, id: TokenId) -> Vec<TokenId> {
        let mut path = Vec::new();
        let mut cur = Some(id);
        while let Some(tid) = cur {
            path.push(tid);
            cur = self.get(tid).predecessor;
        }
        path.reverse();
        path
    }

    /// Words on the path ending at `id`, in utterance order.
    pub fn word_path(&self, id: TokenId) -> Vec<WordId> {
        self.backtrace(id)
            .into_iter()
            .filter_map(|tid| self.get(tid).kind.word())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &Token)> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (TokenId(i as u32), t))
    }
}

/// The token a successor should link back to.
///
/// With `keep_all_tokens` every token stays on the path. Otherwise only word
/// tokens and the path root do: any other token hands over its own
/// predecessor, which is already collapsed.
pub fn result_list_predecessor(
    arena: &TokenArena,
    id: TokenId,
    keep_all_tokens: bool,
) -> Option<TokenId> {
    let token = arena.get(id);
    if keep_all_tokens || token.is_word() || token.predecessor.is_none() {
        Some(id)
    } else {
        token.predecessor
    }
}
