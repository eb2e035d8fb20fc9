//! Speech decoding engine built on `beam_core`.
//!
//! Loads search graphs and score tables from disk, wires the main search and
//! the fast match from settings, and drives an utterance to a word
//! hypothesis.

use std::io;

pub mod graph_io;
pub mod recognizer;
mod trace_init;

pub use beam_core;
pub use graph_io::{load_graph, load_score_table, parse_graph_json};
pub use recognizer::{Hypothesis, Pass, Recognizer};
pub use trace_init::init_tracing;

use beam_core::graph::GraphError;
use beam_core::search::SearchError;
use beam_core::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
}
