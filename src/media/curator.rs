//! Image curator: turns a noisy page image list into a small, relevant set.
//!
//! Flow per title: lead thumbnail → linked file titles → batched image info →
//! heuristic filter → primary-first sampling under the size budget.
//! An empty result retries once with the disambiguated `Town_(Department)` title.

use super::filter::{is_image_title, place_token, ImageFilter};
use super::providers::{MediaIndex, MAX_TITLES_PER_QUERY};
use super::types::{CurationRequest, ImageCandidate, MediaError};
use crate::cancel::CancelToken;
use crate::config::FilterConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub struct ImageCurator {
    index: Arc<dyn MediaIndex>,
    filter: ImageFilter,
    rng: Mutex<StdRng>,
}

impl ImageCurator {
    pub fn new(index: Arc<dyn MediaIndex>, filter: &FilterConfig) -> Self {
        Self::with_rng(index, filter, StdRng::from_entropy())
    }

    /// Curator with a caller-supplied random source (seeded in tests).
    pub fn with_rng(index: Arc<dyn MediaIndex>, filter: &FilterConfig, rng: StdRng) -> Self {
        Self {
            index,
            filter: ImageFilter::new(filter),
            rng: Mutex::new(rng),
        }
    }

    /// Curate images for a place. Never fails; upstream errors shrink the result.
    pub fn curate(&self, req: &CurationRequest<'_>, cancel: &CancelToken) -> Vec<ImageCandidate> {
        let token = place_token(req.place_name);
        let images = self.gather(req.place_name, &token, req, cancel);
        if !images.is_empty() || cancel.is_cancelled() {
            return images;
        }

        let Some(region) = req.parent_region_name else {
            debug!(place = req.place_name, "no images and no parent region for fallback");
            return images;
        };
        let fallback = fallback_title(req.place_name, region);
        info!(place = req.place_name, fallback = %fallback, "no images under canonical title, retrying");
        self.gather(&fallback, &token, req, cancel)
    }

    fn gather(&self, title: &str, token: &str, req: &CurationRequest<'_>, cancel: &CancelToken) -> Vec<ImageCandidate> {
        let mut results: Vec<ImageCandidate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // 1. Infobox thumbnail
        match self.index.lead_thumbnail(req.lang, title, req.thumb_width) {
            Ok(Some(url)) => {
                seen.insert(url.clone());
                results.push(ImageCandidate {
                    url,
                    caption: None,
                    is_primary: true,
                });
            }
            Ok(None) => {}
            Err(e) => log_stage_failure(title, "lead_thumbnail", &e),
        }
        if cancel.is_cancelled() {
            return results;
        }

        // 2. Linked file titles
        let titles: Vec<String> = match self.index.image_titles(req.lang, title, req.max_fetch) {
            Ok(all) => all
                .into_iter()
                .filter(|t| is_image_title(t))
                .take(req.max_fetch)
                .collect(),
            Err(e) => {
                log_stage_failure(title, "image_titles", &e);
                Vec::new()
            }
        };

        // 3. Batched metadata, 4. filtering
        let mut rejected = 0usize;
        for chunk in titles.chunks(MAX_TITLES_PER_QUERY) {
            if cancel.is_cancelled() {
                break;
            }
            let infos = match self.index.image_infos(req.lang, chunk, req.thumb_width) {
                Ok(infos) => infos,
                Err(e) => {
                    log_stage_failure(title, "image_infos", &e);
                    continue;
                }
            };
            for info in infos {
                let Some(url) = info.best_url() else {
                    rejected += 1;
                    continue;
                };
                if seen.contains(url) {
                    rejected += 1;
                    continue;
                }
                match self.filter.check(&info.title, info.caption_html.as_deref(), token) {
                    Ok(caption) => {
                        seen.insert(url.to_string());
                        results.push(ImageCandidate {
                            url: url.to_string(),
                            caption,
                            is_primary: false,
                        });
                    }
                    Err(_) => rejected += 1,
                }
            }
        }

        // 5. Primary first, sample to budget
        let chosen = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            select(results, req.limit(), &mut *rng)
        };
        info!(
            title,
            titles = titles.len(),
            rejected,
            selected = chosen.len(),
            "images curated"
        );
        chosen
    }
}

/// `"Saint Malo", "Ille et Vilaine"` → `"Saint_Malo_(Ille_et_Vilaine)"`.
pub fn fallback_title(place: &str, parent_region: &str) -> String {
    format!("{}_({})", place.trim().replace(' ', "_"), parent_region.trim().replace(' ', "_"))
}

/// Keep every primary; when over `limit`, fill the remaining slots with a
/// uniform sample of the others, shuffled.
pub fn select<R: rand::Rng + ?Sized>(candidates: Vec<ImageCandidate>, limit: usize, rng: &mut R) -> Vec<ImageCandidate> {
    let (primaries, others): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| c.is_primary);
    if primaries.len() + others.len() <= limit {
        let mut all = primaries;
        all.extend(others);
        return all;
    }

    let slots = limit.saturating_sub(primaries.len());
    let mut sampled: Vec<ImageCandidate> = others.choose_multiple(&mut *rng, slots).cloned().collect();
    sampled.shuffle(&mut *rng);

    let mut chosen = primaries;
    chosen.extend(sampled);
    chosen
}

fn log_stage_failure(title: &str, stage: &str, err: &MediaError) {
    match err {
        MediaError::UpstreamTimeout => warn!(title, stage, "media index timed out"),
        _ => warn!(title, stage, error = %err, "media index request failed"),
    }
}
