//! Search graph interface consumed by the decoder.
//!
//! The graph is owned by whichever linguist built it. The search only keeps
//! `StateId`s and reads states and arcs on demand; it never mutates the graph.

mod static_graph;

pub use static_graph::{
    GraphDescription, GraphError, StateDescription, StaticGraph, StaticGraphBuilder,
};

use serde::{Deserialize, Serialize};

/// Base (context-independent) phone identifier.
pub type PhoneId = u16;

/// Word identifier carried by word-boundary states.
pub type WordId = u32;

/// Number of distinct state orders produced by `StateKind::default_order`.
pub const NUM_STATE_ORDERS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub u32);

impl StateId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Kinds of states that do not consume a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonEmittingKind {
    /// Grammar or structural node.
    Branch,
    /// Entry into a phone HMM.
    PhoneBoundary,
    /// Word boundary; lattice alternates are recorded here.
    Word(WordId),
    /// Exit from a phone HMM.
    EndOfUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Emitting { phone: PhoneId },
    NonEmitting(NonEmittingKind),
    Final,
}

impl StateKind {
    pub fn is_emitting(self) -> bool {
        matches!(self, StateKind::Emitting { .. })
    }

    pub fn is_final(self) -> bool {
        matches!(self, StateKind::Final)
    }

    pub fn word(self) -> Option<WordId> {
        match self {
            StateKind::NonEmitting(NonEmittingKind::Word(word)) => Some(word),
            _ => None,
        }
    }

    pub fn is_word(self) -> bool {
        self.word().is_some()
    }

    /// Base phone of an emitting state.
    pub fn base_phone(self) -> Option<PhoneId> {
        match self {
            StateKind::Emitting { phone } => Some(phone),
            _ => None,
        }
    }

    /// True for states whose successors enter phone HMMs. Arcs leaving these
    /// states are subject to lookahead pruning.
    pub fn produces_phones(self) -> bool {
        matches!(
            self,
            StateKind::NonEmitting(
                NonEmittingKind::PhoneBoundary
                    | NonEmittingKind::Word(_)
                    | NonEmittingKind::EndOfUnit
            )
        )
    }

    /// Topological order used by the state-order check. Within one frame
    /// non-emitting arcs must never lead to a lower order; emitting states
    /// hold the highest order and are exempt.
    pub fn default_order(self) -> u32 {
        match self {
            StateKind::NonEmitting(NonEmittingKind::Branch) => 0,
            StateKind::NonEmitting(NonEmittingKind::EndOfUnit) => 1,
            StateKind::NonEmitting(NonEmittingKind::Word(_)) => 2,
            StateKind::NonEmitting(NonEmittingKind::PhoneBoundary) => 3,
            StateKind::Final => 4,
            StateKind::Emitting { .. } => NUM_STATE_ORDERS - 1,
        }
    }
}

/// A directed arc. All probabilities are natural-log values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub target: StateId,
    #[serde(default)]
    pub acoustic: f32,
    #[serde(default)]
    pub insertion: f32,
    #[serde(default)]
    pub language: f32,
}

impl Transition {
    pub fn new(target: StateId, acoustic: f32) -> Self {
        Self {
            target,
            acoustic,
            insertion: 0.0,
            language: 0.0,
        }
    }

    pub fn with_language(mut self, language: f32) -> Self {
        self.language = language;
        self
    }

    pub fn with_insertion(mut self, insertion: f32) -> Self {
        self.insertion = insertion;
        self
    }

    /// Combined log probability added to a token's score when it follows this arc.
    pub fn probability(&self) -> f32 {
        self.acoustic + self.insertion + self.language
    }
}

/// A search graph for the decoder.
///
/// Arc log probabilities must be at most zero. Within a frame non-emitting
/// states are expanded best score first, and each state only once, which is
/// only exact when no arc raises a score. `StaticGraph` rejects such arcs.
pub trait SearchGraph: Send + Sync {
    fn initial_state(&self) -> StateId;
    fn kind(&self, state: StateId) -> StateKind;
    fn successors(&self, state: StateId) -> &[Transition];

    /// Number of base phones; snapshot arrays are sized from this.
    fn phone_count(&self) -> usize;

    fn order(&self, state: StateId) -> u32 {
        self.kind(state).default_order()
    }

    fn num_state_orders(&self) -> u32 {
        NUM_STATE_ORDERS
    }
}
