//! Graph and score-table files.
//!
//! Graphs are `GraphDescription`s in TOML (`.toml`) or JSON (`.json`).
//! Score tables are JSON arrays of frames, each an array of per-phone log
//! likelihoods.

use std::fs;
use std::path::Path;

use beam_core::graph::{GraphDescription, StaticGraph};
use tracing::debug;

use crate::EngineError;

pub fn load_graph(path: &Path) -> Result<StaticGraph, EngineError> {
    let text = fs::read_to_string(path)?;
    let graph = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => StaticGraph::from_toml(&text)?,
        Some("json") => parse_graph_json(&text)?,
        other => {
            return Err(EngineError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            ))
        }
    };
    debug!(
        path = %path.display(),
        states = graph.state_count(),
        arcs = graph.arc_count(),
        "loaded graph"
    );
    Ok(graph)
}

pub fn parse_graph_json(text: &str) -> Result<StaticGraph, EngineError> {
    let desc: GraphDescription = serde_json::from_str(text)?;
    Ok(StaticGraph::from_description(desc)?)
}

pub fn save_graph_json(graph: &StaticGraph, path: &Path) -> Result<(), EngineError> {
    let text = serde_json::to_string_pretty(&graph.to_description())?;
    fs::write(path, text)?;
    Ok(())
}

pub fn load_score_table(path: &Path) -> Result<Vec<Vec<f32>>, EngineError> {
    let text = fs::read_to_string(path)?;
    let table: Vec<Vec<f32>> = serde_json::from_str(&text)?;
    debug!(path = %path.display(), frames = table.len(), "loaded score table");
    Ok(table)
}
