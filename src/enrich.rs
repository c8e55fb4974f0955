//! Enrichment orchestrator: resolve → (curate images ∥ fetch-or-generate
//! description) → assemble.
//!
//! All subsystem calls are blocking (SQLite, ureq) and run on the tokio
//! blocking pool. Image curation never fails a request.

use crate::cancel::CancelToken;
use crate::config::{EngineConfig, MediaConfig};
use crate::describe::{
    CacheKey, DescriptionCache, DescriptionError, DescriptionRequest, Generator, InsertOnConflictCache,
    OpenAiGenerator,
};
use crate::location::{AdministrativeResolver, LocationError, PlaceMetadata, Store};
use crate::media::{CurationRequest, ImageCandidate, ImageCurator, WikipediaIndex};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::{spawn_blocking, JoinError};
use tracing::{debug, info, warn};

/// Assembled response for one place.
#[derive(Debug, Clone, Serialize)]
pub struct Enrichment {
    pub description: String,
    pub cached: bool,
    pub metadata: PlaceMetadata,
    pub images: Vec<ImageCandidate>,
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error(transparent)]
    Description(#[from] DescriptionError),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("background task failed: {0}")]
    Task(#[from] JoinError),
}

impl EnrichError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EnrichError::Location(LocationError::NotFound(_)))
    }

    pub fn is_generation_failure(&self) -> bool {
        matches!(self, EnrichError::Description(DescriptionError::GenerationFailed(_)))
    }
}

pub struct EnrichmentOrchestrator {
    resolver: Arc<AdministrativeResolver>,
    curator: Arc<ImageCurator>,
    cache: Arc<dyn DescriptionCache>,
    generator: Arc<dyn Generator>,
    media: MediaConfig,
}

impl EnrichmentOrchestrator {
    pub fn new(
        resolver: AdministrativeResolver,
        curator: ImageCurator,
        cache: Arc<dyn DescriptionCache>,
        generator: Arc<dyn Generator>,
        media: MediaConfig,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            curator: Arc::new(curator),
            cache,
            generator,
            media,
        }
    }

    /// Wire the production clients: SQLite store, Wikipedia index, OpenAI generator.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EnrichError> {
        let store = Arc::new(Store::open(&config.database_path)?);
        let index = Arc::new(WikipediaIndex::new(&config.media));
        if config.generator.api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; uncached descriptions will fail");
        }
        Ok(Self::new(
            AdministrativeResolver::new(store.clone()),
            ImageCurator::new(index, &config.filter),
            Arc::new(InsertOnConflictCache::new(store)),
            Arc::new(OpenAiGenerator::new(&config.generator)),
            config.media.clone(),
        ))
    }

    pub async fn enrich(
        &self,
        name: &str,
        lang: &str,
        sub_region_hint: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Enrichment, EnrichError> {
        let start = Instant::now();
        let resolved = {
            let resolver = self.resolver.clone();
            let name = name.to_string();
            let hint = sub_region_hint.map(str::to_string);
            spawn_blocking(move || resolver.resolve(&name, hint.as_deref())).await??
        };
        debug!(place = %resolved.display_line(), lang, "enriching");

        let images_task = {
            let curator = self.curator.clone();
            let media = self.media.clone();
            let place = resolved.place.name.clone();
            let parent = resolved.sub_region_name().map(str::to_string);
            let cancel = cancel.clone();
            spawn_blocking(move || {
                let request = CurationRequest {
                    place_name: &place,
                    parent_region_name: parent.as_deref(),
                    lang: &media.lang,
                    thumb_width: media.thumb_width,
                    extra_count: media.extra_count,
                    max_fetch: media.max_fetch,
                };
                curator.curate(&request, &cancel)
            })
        };

        let description_task = {
            let cache = self.cache.clone();
            let generator = self.generator.clone();
            let key = CacheKey::new(&resolved.place.id, &resolved.place.sub_region_id, lang);
            let request = DescriptionRequest {
                place_name: resolved.place.name.clone(),
                sub_region_name: resolved.sub_region_name().map(str::to_string),
                region_name: resolved.region_name().map(str::to_string),
                lang: lang.to_string(),
            };
            let cancel = cancel.clone();
            spawn_blocking(move || cache.get_or_generate(&key, &request, generator.as_ref(), &cancel))
        };

        let (images, description) = tokio::join!(images_task, description_task);

        let images = images.unwrap_or_else(|e| {
            warn!(place = %resolved.place.name, stage = "images", error = %e, "image curation task failed");
            Vec::new()
        });
        let (description, cached) = match description? {
            Ok(outcome) => (outcome.text, outcome.cached),
            Err(DescriptionError::CacheWriteFailed { text, source }) => {
                warn!(place = %resolved.place.name, lang, error = %source, "serving description that could not be cached");
                (text, false)
            }
            Err(e) => {
                warn!(place = %resolved.place.name, lang, stage = "description", error = %e, "enrichment failed");
                return Err(e.into());
            }
        };

        info!(
            place = %resolved.place.name,
            lang,
            cached,
            images = images.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "enrichment complete"
        );
        Ok(Enrichment {
            description,
            cached,
            metadata: resolved.metadata(),
            images,
        })
    }

    /// Drop every cached language for a (town, department) pair.
    pub async fn invalidate(&self, place_id: &str, sub_region_id: &str) -> Result<usize, EnrichError> {
        let cache = self.cache.clone();
        let place_id = place_id.to_string();
        let sub_region_id = sub_region_id.to_string();
        Ok(spawn_blocking(move || cache.invalidate(&place_id, &sub_region_id)).await??)
    }

    pub async fn nearest(&self, lat: f64, lon: f64) -> Result<Option<PlaceMetadata>, EnrichError> {
        let resolver = self.resolver.clone();
        let found = spawn_blocking(move || resolver.nearest(lat, lon)).await??;
        Ok(found.map(|p| p.metadata()))
    }
}
