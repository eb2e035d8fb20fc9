//! Fast-match snapshots and the lookahead penalty derived from them.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::graph::PhoneId;

/// Best fast-match score per base phone for one frame, plus the frame's
/// overall best. Unobserved phones hold negative infinity.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCiScores {
    frame: u32,
    scores: Vec<f32>,
    max_score: f32,
}

impl FrameCiScores {
    pub fn new(frame: u32, phone_count: usize) -> Self {
        Self {
            frame,
            scores: vec![f32::NEG_INFINITY; phone_count],
            max_score: f32::NEG_INFINITY,
        }
    }

    /// Records a phone-tagged token score. Phones outside the inventory are
    /// ignored.
    pub fn observe(&mut self, phone: PhoneId, score: f32) {
        let Some(slot) = self.scores.get_mut(phone as usize) else {
            return;
        };
        if *slot < score {
            *slot = score;
        }
        if self.max_score < score {
            self.max_score = score;
        }
    }

    /// Fast-match frame number at which the snapshot was recorded.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn score(&self, phone: PhoneId) -> f32 {
        self.scores
            .get(phone as usize)
            .copied()
            .unwrap_or(f32::NEG_INFINITY)
    }

    pub fn max_score(&self) -> f32 {
        self.max_score
    }

    /// Score of `phone` relative to the frame's best; negative infinity if
    /// the phone was not seen.
    pub fn relative_score(&self, phone: PhoneId) -> f32 {
        let score = self.score(phone);
        if score == f32::NEG_INFINITY {
            return f32::NEG_INFINITY;
        }
        score - self.max_score
    }
}

/// Sliding window of snapshots, oldest first.
#[derive(Debug, Default)]
pub struct LookaheadWindow {
    snapshots: VecDeque<FrameCiScores>,
}

impl LookaheadWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn push(&mut self, snapshot: FrameCiScores) {
        self.snapshots.push_back(snapshot);
    }

    pub fn drop_oldest(&mut self) -> Option<FrameCiScores> {
        self.snapshots.pop_front()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameCiScores> {
        self.snapshots.iter()
    }

    /// Frame numbers of the retained snapshots, oldest first.
    pub fn frames(&self) -> Vec<u32> {
        self.snapshots.iter().map(FrameCiScores::frame).collect()
    }

    /// How competitive `phone` is relative to the best phone over the
    /// window: the maximum relative score across snapshots. Never positive;
    /// negative infinity when the phone is absent from every snapshot or the
    /// window is empty.
    pub fn penalty(&self, phone: PhoneId) -> f32 {
        self.snapshots
            .iter()
            .map(|s| s.relative_score(phone))
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Per-frame memo of lookahead penalties.
#[derive(Debug, Default)]
pub struct LookaheadPenalties {
    cache: HashMap<PhoneId, f32>,
    computations: u64,
}

impl LookaheadPenalties {
    /// Cached penalty for `phone`, computing it from `window` on first use
    /// in the current frame.
    pub fn penalty(&mut self, phone: PhoneId, window: &LookaheadWindow) -> f32 {
        if let Some(&cached) = self.cache.get(&phone) {
            return cached;
        }
        let penalty = window.penalty(phone);
        self.computations += 1;
        debug!(phone, penalty, "lookahead penalty");
        self.cache.insert(phone, penalty);
        penalty
    }

    /// Forget this frame's penalties; keeps the allocation.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn cached(&self, phone: PhoneId) -> Option<f32> {
        self.cache.get(&phone).copied()
    }

    /// Penalties computed (not served from cache) since `reset_count`.
    pub fn computations(&self) -> u64 {
        self.computations
    }

    pub fn reset_count(&mut self) {
        self.computations = 0;
    }
}
