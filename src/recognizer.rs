//! Recognizer facade over `LookaheadSearch`.

use std::sync::Arc;

use beam_core::active_list::{BeamActiveListFactory, SimplePruner};
use beam_core::graph::{SearchGraph, WordId};
use beam_core::scorer::{AcousticScorer, ModelLoader, NoTiedMixtures};
use beam_core::search::{LookaheadSearch, RecognitionResult, SearchComponents};
use beam_core::settings::{ActiveListSettings, Settings};
use tracing::{debug, debug_span};

use crate::EngineError;

/// Graph and scorer of one search pass.
pub struct Pass {
    pub graph: Arc<dyn SearchGraph>,
    pub scorer: Box<dyn AcousticScorer>,
}

impl Pass {
    pub fn new(graph: Arc<dyn SearchGraph>, scorer: Box<dyn AcousticScorer>) -> Self {
        Self { graph, scorer }
    }

    fn into_components(self, beams: ActiveListSettings) -> SearchComponents {
        SearchComponents {
            graph: self.graph,
            scorer: self.scorer,
            pruner: Box::new(SimplePruner),
            active_lists: Box::new(BeamActiveListFactory::new(beams)),
        }
    }
}

/// Best word sequence of a decoded utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub words: Vec<WordId>,
    pub score: f32,
    pub frames: u32,
    /// False when no final state was reached and the best active token was
    /// used instead.
    pub reached_final: bool,
}

pub struct Recognizer {
    search: LookaheadSearch,
}

impl Recognizer {
    pub fn new(settings: &Settings, main: Pass, fast_match: Pass) -> Result<Self, EngineError> {
        Self::with_loader(settings, main, fast_match, Box::new(NoTiedMixtures))
    }

    pub fn with_loader(
        settings: &Settings,
        main: Pass,
        fast_match: Pass,
        loader: Box<dyn ModelLoader>,
    ) -> Result<Self, EngineError> {
        settings.active_list.validate("active_list")?;
        settings
            .fast_match_active_list
            .validate("fast_match_active_list")?;
        let search = LookaheadSearch::new(
            settings.search.clone(),
            main.into_components(settings.active_list),
            fast_match.into_components(settings.fast_match_active_list),
            loader,
        )?;
        Ok(Self { search })
    }

    /// Decodes a whole utterance, `chunk` frames per `recognize` call.
    /// Returns `None` when the input stream ended before any frame.
    pub fn decode_all(&mut self, chunk: usize) -> Result<Option<Hypothesis>, EngineError> {
        let _span = debug_span!("decode_all", chunk).entered();
        let chunk = chunk.max(1);
        self.search.start_utterance()?;

        let mut last: Option<RecognitionResult> = None;
        while let Some(result) = self.search.recognize(chunk)? {
            let is_final = result.is_final;
            last = Some(result);
            if is_final {
                break;
            }
        }
        let Some(result) = last else {
            debug!("no frames decoded");
            return Ok(None);
        };

        let arena = self.search.arena();
        let final_token = result.best_final_token(arena);
        let Some(best) = final_token.or_else(|| result.best_token(arena)) else {
            return Ok(None);
        };
        let hypothesis = Hypothesis {
            words: arena.word_path(best),
            score: arena.score(best),
            frames: result.frame,
            reached_final: final_token.is_some(),
        };
        debug!(
            words = hypothesis.words.len(),
            score = hypothesis.score,
            frames = hypothesis.frames,
            reached_final = hypothesis.reached_final
        );
        Ok(Some(hypothesis))
    }

    pub fn search(&self) -> &LookaheadSearch {
        &self.search
    }

    pub fn search_mut(&mut self) -> &mut LookaheadSearch {
        &mut self.search
    }
}
