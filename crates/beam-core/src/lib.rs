pub mod active_list;
pub mod graph;
pub mod lattice;
pub mod scorer;
pub mod search;
pub mod settings;
pub mod token;

pub use active_list::{ActiveList, ActiveListFactory, BeamActiveListFactory, Pruner, SimplePruner};
pub use graph::{PhoneId, SearchGraph, StateId, StateKind, StaticGraph, Transition, WordId};
pub use scorer::{AcousticScorer, FrameTableScorer, ModelLoader, NoTiedMixtures, ScoreOutcome};
pub use search::{LookaheadSearch, RecognitionResult, SearchComponents, SearchError, SearchStats};
pub use token::{Token, TokenArena, TokenId};
