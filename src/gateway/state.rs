//! Shared handler state: engines and adapters constructed at startup.

use std::sync::Arc;

use crate::agents::{ExplainEngine, FeedbackService, QaEngine, StreamingQaEngine};
use crate::cache::ResponseCache;
use crate::extract::TextExtractor;
use crate::indexer::Indexer;
use crate::prompts::PromptRegistry;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub qa: Arc<QaEngine>,
    pub stream: Arc<StreamingQaEngine>,
    pub explain: Arc<ExplainEngine>,
    pub feedback: Arc<FeedbackService>,
    pub indexer: Arc<Indexer>,
    pub prompts: Arc<PromptRegistry>,
    pub cache: Arc<ResponseCache>,
    pub documents: Arc<dyn DocumentStore>,
    pub extractor: Arc<dyn TextExtractor>,
}
