use crate::enrich::EnrichmentOrchestrator;
use std::sync::Arc;

pub struct AppState {
    pub orchestrator: Arc<EnrichmentOrchestrator>,
}
