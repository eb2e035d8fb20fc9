//! One frame of token expansion, shared by the fast match and the main search.
//!
//! Tokens follow graph arcs until they land on emitting (or final) states.
//! Arrivals at the same state in the same frame are merged: the resident
//! token keeps the higher score and is rewritten in place. Non-emitting
//! states go through a work queue ordered by score and are expanded at most
//! once per frame, which bounds the work on graphs with non-emitting cycles.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::warn;

use crate::active_list::ActiveList;
use crate::graph::{SearchGraph, StateId, StateKind, Transition};
use crate::lattice::AlternateHypotheses;
use crate::token::{result_list_predecessor, Token, TokenArena, TokenId};

use super::lookahead::{LookaheadPenalties, LookaheadWindow};
use super::SearchError;

#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowPolicy {
    pub keep_all_tokens: bool,
    pub check_state_order: bool,
    pub relative_word_beam_width: f32,
}

/// Lookahead pruning of arcs that enter a phone.
pub(crate) struct LookaheadPrune<'a> {
    pub window: &'a LookaheadWindow,
    pub penalties: &'a mut LookaheadPenalties,
    pub weight: f32,
}

impl LookaheadPrune<'_> {
    fn prunes(&mut self, phone: u16, entry_score: f32, threshold: f32) -> bool {
        // No evidence, no pruning.
        if self.weight == 0.0 || self.window.is_empty() {
            return false;
        }
        let penalty = self.penalties.penalty(phone, self.window);
        entry_score + self.weight * penalty < threshold
    }
}

pub(crate) struct GrowContext<'a> {
    pub graph: &'a dyn SearchGraph,
    pub arena: &'a mut TokenArena,
    pub next: &'a mut ActiveList,
    pub frame: u32,
    pub lookahead: Option<LookaheadPrune<'a>>,
    /// Present only when a word lattice is being built.
    pub alternates: Option<&'a mut AlternateHypotheses>,
    pub results: Option<&'a mut Vec<TokenId>>,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    score: f32,
    token: TokenId,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.token.cmp(&self.token))
    }
}

/// Scratch buffers for one frame, cleared rather than reallocated.
#[derive(Debug, Default)]
pub(crate) struct FrameExpander {
    best_tokens: HashMap<StateId, TokenId>,
    visited: HashSet<StateId>,
    pending: BinaryHeap<Pending>,
    best_word_score: f32,
}

impl FrameExpander {
    pub fn clear(&mut self) {
        self.best_tokens.clear();
        self.visited.clear();
        self.pending.clear();
        self.best_word_score = f32::NEG_INFINITY;
    }

    /// Best token that reached `state` during the last expanded frame.
    pub fn best_token(&self, state: StateId) -> Option<TokenId> {
        self.best_tokens.get(&state).copied()
    }

    /// Expands `seeds` into `ctx.next`. Returns the number of tokens created.
    pub fn expand(
        &mut self,
        ctx: &mut GrowContext<'_>,
        policy: &GrowPolicy,
        seeds: impl IntoIterator<Item = TokenId>,
    ) -> Result<u64, SearchError> {
        self.clear();
        let mut created = 0;
        for token in seeds {
            let (state, kind) = {
                let t = ctx.arena.get(token);
                (t.state, t.kind)
            };
            if !kind.is_emitting() && !self.visited.insert(state) {
                continue;
            }
            created += self.process(ctx, policy, token)?;
        }
        while let Some(Pending { token, .. }) = self.pending.pop() {
            if !self.visited.insert(ctx.arena.get(token).state) {
                continue;
            }
            created += self.process(ctx, policy, token)?;
        }
        Ok(created)
    }

    fn process(
        &mut self,
        ctx: &mut GrowContext<'_>,
        policy: &GrowPolicy,
        token: TokenId,
    ) -> Result<u64, SearchError> {
        let (state, kind, score) = {
            let t = ctx.arena.get(token);
            (t.state, t.kind, t.score)
        };
        if kind.is_final() {
            if let Some(results) = ctx.results.as_deref_mut() {
                results.push(token);
            }
            return Ok(0);
        }
        if kind.is_word() && score < self.best_word_score + policy.relative_word_beam_width {
            return Ok(0);
        }

        let graph = ctx.graph;
        let predecessor = result_list_predecessor(ctx.arena, token, policy.keep_all_tokens);
        let produces_phones = kind.produces_phones();
        let mut created = 0;
        for arc in graph.successors(state) {
            let next_kind = graph.kind(arc.target);
            let entry_score = score + arc.probability();

            if produces_phones {
                if let (Some(phone), Some(lookahead)) =
                    (next_kind.base_phone(), ctx.lookahead.as_mut())
                {
                    if lookahead.prunes(phone, entry_score, ctx.next.beam_threshold()) {
                        continue;
                    }
                }
            }

            if policy.check_state_order {
                check_state_order(graph, state, arc.target)?;
            }

            created += self.merge(ctx, predecessor, arc, next_kind, entry_score);
        }
        Ok(created)
    }

    /// Keeps the better of `entry_score` and the token already on the
    /// target. On a word state the losing predecessor becomes a lattice
    /// alternate, unless it is the winner's own predecessor: parallel arcs
    /// from one token add no edge.
    fn merge(
        &mut self,
        ctx: &mut GrowContext<'_>,
        predecessor: Option<TokenId>,
        arc: &Transition,
        kind: StateKind,
        entry_score: f32,
    ) -> u64 {
        let Some(best) = self.best_tokens.get(&arc.target).copied() else {
            if kind.is_emitting() && !ctx.next.admits(entry_score) {
                return 0;
            }
            let id = ctx.arena.alloc(Token::entering(
                predecessor,
                arc,
                kind,
                entry_score,
                ctx.frame,
            ));
            self.best_tokens.insert(arc.target, id);
            if kind.is_emitting() {
                ctx.next.push(id, entry_score);
            } else {
                self.enqueue(id, kind, entry_score);
            }
            return 1;
        };

        let resident = ctx.arena.get(best);
        let (resident_score, resident_predecessor) = (resident.score, resident.predecessor);
        if entry_score > resident_score {
            ctx.arena
                .update(best, predecessor, arc, entry_score, ctx.frame);
            if kind.is_emitting() {
                ctx.next.note_score(best, entry_score);
            } else {
                self.enqueue(best, kind, entry_score);
            }
            if kind.is_word() {
                let alternates = ctx.alternates.as_deref_mut();
                if let (Some(alts), Some(old)) = (alternates, resident_predecessor) {
                    if Some(old) != predecessor {
                        alts.add(best, old);
                    }
                }
            }
        } else if kind.is_word() {
            let alternates = ctx.alternates.as_deref_mut();
            if let (Some(alts), Some(pred)) = (alternates, predecessor) {
                if Some(pred) != resident_predecessor {
                    alts.add(best, pred);
                }
            }
        }
        0
    }

    /// Queues a non-emitting or final token for expansion this frame.
    fn enqueue(&mut self, id: TokenId, kind: StateKind, score: f32) {
        if kind.is_word() && score > self.best_word_score {
            self.best_word_score = score;
        }
        self.pending.push(Pending { score, token: id });
    }
}

fn check_state_order(
    graph: &dyn SearchGraph,
    from: StateId,
    to: StateId,
) -> Result<(), SearchError> {
    let from_order = graph.order(from);
    if from_order + 1 == graph.num_state_orders() {
        return Ok(());
    }
    let to_order = graph.order(to);
    if from_order > to_order {
        warn!(?from, ?to, from_order, to_order, "illegal state order");
        return Err(SearchError::StateOrder {
            from,
            to,
            from_order,
            to_order,
        });
    }
    Ok(())
}

/// Tokens of `list` worth expanding.
///
/// With acoustic lookahead the current acoustic score is extrapolated
/// `acoustic_lookahead_frames` ahead before the relative beam is applied.
pub(crate) fn expandable_tokens(
    list: &ActiveList,
    arena: &TokenArena,
    acoustic_lookahead_frames: f32,
    out: &mut Vec<TokenId>,
) {
    out.clear();
    if acoustic_lookahead_frames > 0.0 {
        let predicted = |id: TokenId| {
            let t = arena.get(id);
            t.score + t.acoustic_score * acoustic_lookahead_frames
        };
        let best = list
            .iter()
            .map(predicted)
            .fold(f32::NEG_INFINITY, f32::max);
        let threshold = best + list.relative_beam_width();
        out.extend(list.iter().filter(|&id| predicted(id) > threshold));
    } else {
        let threshold = list.beam_threshold();
        out.extend(list.iter().filter(|&id| arena.score(id) >= threshold));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NonEmittingKind, StaticGraph};
    use proptest::prelude::*;

    const POLICY: GrowPolicy = GrowPolicy {
        keep_all_tokens: true,
        check_state_order: false,
        relative_word_beam_width: f32::NEG_INFINITY,
    };

    fn branch() -> StateKind {
        StateKind::NonEmitting(NonEmittingKind::Branch)
    }

    /// init -> n branch states (one per score) -> one shared emitting target.
    fn fan_in(scores: &[f32]) -> (StaticGraph, StateId) {
        let mut b = StaticGraph::builder();
        let init = b.add_state(branch());
        let target = b.add_state(StateKind::Emitting { phone: 0 });
        for &s in scores {
            let mid = b.add_state(branch());
            b.add_arc(init, Transition::new(mid, s));
            b.add_arc(mid, Transition::new(target, 0.0));
        }
        b.set_initial(init);
        (b.build().unwrap(), target)
    }

    fn grow_from_seed(
        graph: &StaticGraph,
        expander: &mut FrameExpander,
    ) -> (TokenArena, ActiveList) {
        let mut arena = TokenArena::new();
        let mut next = ActiveList::new(0, f32::NEG_INFINITY);
        let init = graph.initial_state();
        let seed = arena.alloc(Token::seed(init, graph.kind(init), 0));
        let mut ctx = GrowContext {
            graph,
            arena: &mut arena,
            next: &mut next,
            frame: 1,
            lookahead: None,
            alternates: None,
            results: None,
        };
        expander.expand(&mut ctx, &POLICY, [seed]).unwrap();
        (arena, next)
    }

    #[test]
    fn non_emitting_cycle_terminates() {
        let mut b = StaticGraph::builder();
        let a = b.add_state(branch());
        let c = b.add_state(branch());
        let e = b.add_state(StateKind::Emitting { phone: 0 });
        b.add_arc(a, Transition::new(c, 0.0));
        b.add_arc(c, Transition::new(a, 0.0));
        b.add_arc(c, Transition::new(e, -1.0));
        let graph = b.build().unwrap();

        let mut expander = FrameExpander::default();
        let (arena, next) = grow_from_seed(&graph, &mut expander);
        assert_eq!(next.len(), 1);
        assert_eq!(arena.score(next.tokens()[0]), -1.0);
    }

    #[test]
    fn rejected_emitting_token_is_not_created() {
        let (graph, target) = fan_in(&[-1.0]);
        let mut arena = TokenArena::new();
        let mut next = ActiveList::new(0, -1.0);
        let filler = arena.alloc(Token::seed(StateId(0), StateKind::Emitting { phone: 0 }, 0));
        next.add(filler, 5.0);
        let init = graph.initial_state();
        let seed = arena.alloc(Token::seed(init, graph.kind(init), 0));
        let before = arena.len();

        let mut expander = FrameExpander::default();
        let mut ctx = GrowContext {
            graph: &graph,
            arena: &mut arena,
            next: &mut next,
            frame: 1,
            lookahead: None,
            alternates: None,
            results: None,
        };
        let created = expander.expand(&mut ctx, &POLICY, [seed]).unwrap();
        // Only the intermediate branch token exists; the emitting arrival
        // fell below the beam and was dropped.
        assert_eq!(created, 1);
        assert_eq!(arena.len(), before + 1);
        assert_eq!(expander.best_token(target), None);
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn expandable_tokens_uses_acoustic_lookahead() {
        let mut arena = TokenArena::new();
        let mut list = ActiveList::new(0, -5.0);
        let steady = arena.alloc(Token::seed(StateId(0), StateKind::Emitting { phone: 0 }, 0));
        let fading = arena.alloc(Token::seed(StateId(1), StateKind::Emitting { phone: 1 }, 0));
        arena.get_mut(steady).score = -3.0;
        arena.get_mut(steady).acoustic_score = -0.5;
        arena.get_mut(fading).score = -1.0;
        arena.get_mut(fading).acoustic_score = -4.0;
        list.add(steady, -3.0);
        list.add(fading, -1.0);

        let mut out = Vec::new();
        expandable_tokens(&list, &arena, 0.0, &mut out);
        assert_eq!(out.len(), 2);

        // Predicted: steady -4.0, fading -9.0; beam -5 from -4.0 keeps only steady.
        expandable_tokens(&list, &arena, 2.0, &mut out);
        assert_eq!(out, vec![steady]);
    }

    proptest! {
        #[test]
        fn merged_token_holds_maximum_entry_score(
            scores in prop::collection::vec(-50.0f32..0.0, 1..12),
        ) {
            let (graph, target) = fan_in(&scores);
            let mut expander = FrameExpander::default();
            let (arena, next) = grow_from_seed(&graph, &mut expander);

            let best = expander.best_token(target).unwrap();
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            prop_assert_eq!(arena.score(best), max);
            prop_assert_eq!(next.len(), 1);
            let copies = arena.iter().filter(|(_, t)| t.state == target).count();
            prop_assert_eq!(copies, 1);
        }
    }
}
