//! Description cache: one stored narrative per (town, department, language).
//!
//! Policy: read → on miss generate → insert-if-absent. There is no per-key
//! lock, so two concurrent first requests may both generate; the primary key
//! keeps the first row and the second caller still gets its own text back.

use super::generator::{DescriptionRequest, GenerationError, Generator};
use crate::cancel::CancelToken;
use crate::location::DescriptionStore;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub place_id: String,
    pub sub_region_id: String,
    pub lang: String,
}

impl CacheKey {
    pub fn new(place_id: impl Into<String>, sub_region_id: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            place_id: place_id.into(),
            sub_region_id: sub_region_id.into(),
            lang: lang.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptionOutcome {
    pub text: String,
    /// `true` when the text came from storage and no generation happened.
    pub cached: bool,
}

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("description generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),
    /// The generated text could not be stored. It is still valid for this caller.
    #[error("description cache write failed: {source}")]
    CacheWriteFailed {
        text: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("request cancelled")]
    Cancelled,
}

/// Fetch-or-generate policy. Swap implementations (e.g. a single-flight
/// variant) without touching callers.
pub trait DescriptionCache: Send + Sync {
    fn get_or_generate(
        &self,
        key: &CacheKey,
        request: &DescriptionRequest,
        generator: &dyn Generator,
        cancel: &CancelToken,
    ) -> Result<DescriptionOutcome, DescriptionError>;

    /// Remove every language for a (town, department) pair.
    fn invalidate(&self, place_id: &str, sub_region_id: &str) -> Result<usize, rusqlite::Error>;
}

/// Check, generate, then `INSERT .. ON CONFLICT DO NOTHING`.
pub struct InsertOnConflictCache {
    store: Arc<dyn DescriptionStore>,
}

impl InsertOnConflictCache {
    pub fn new(store: Arc<dyn DescriptionStore>) -> Self {
        Self { store }
    }
}

impl DescriptionCache for InsertOnConflictCache {
    fn get_or_generate(
        &self,
        key: &CacheKey,
        request: &DescriptionRequest,
        generator: &dyn Generator,
        cancel: &CancelToken,
    ) -> Result<DescriptionOutcome, DescriptionError> {
        // An unreadable cache is treated as a miss.
        let hit = match self.store.fetch_description(&key.place_id, &key.sub_region_id, &key.lang) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(place = %request.place_name, key = ?key, stage = "cache_read", error = %e, "description cache read failed");
                None
            }
        };
        if let Some(text) = hit {
            info!(place = %request.place_name, key = ?key, "description cache hit");
            return Ok(DescriptionOutcome { text, cached: true });
        }

        if cancel.is_cancelled() {
            return Err(DescriptionError::Cancelled);
        }
        let text = generator.describe(request)?;

        if cancel.is_cancelled() {
            debug!(key = ?key, "request abandoned, skipping cache write");
            return Err(DescriptionError::Cancelled);
        }
        match self
            .store
            .insert_description(&key.place_id, &key.sub_region_id, &key.lang, &text)
        {
            Ok(true) => info!(place = %request.place_name, key = ?key, "description cache miss, generated and stored"),
            Ok(false) => info!(place = %request.place_name, key = ?key, "description already stored by a concurrent request"),
            Err(source) => {
                warn!(place = %request.place_name, key = ?key, error = %source, "description cache write failed");
                return Err(DescriptionError::CacheWriteFailed { text, source });
            }
        }
        Ok(DescriptionOutcome { text, cached: false })
    }

    fn invalidate(&self, place_id: &str, sub_region_id: &str) -> Result<usize, rusqlite::Error> {
        let removed = self.store.delete_descriptions(place_id, sub_region_id)?;
        info!(place_id, sub_region_id, removed, "description cache invalidated");
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::location::Store;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts calls and returns `"{place} ({lang}) #{n}"`.
    #[derive(Default)]
    pub(crate) struct CountingGenerator {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl Generator for CountingGenerator {
        fn describe(&self, request: &DescriptionRequest) -> Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(GenerationError::Request("boom".into()));
            }
            Ok(format!("{} ({}) #{}", request.place_name, request.lang, n))
        }
    }

    /// Reads succeed (always empty), writes fail.
    struct ReadOnlyStore;

    impl DescriptionStore for ReadOnlyStore {
        fn fetch_description(&self, _: &str, _: &str, _: &str) -> rusqlite::Result<Option<String>> {
            Ok(None)
        }
        fn insert_description(&self, _: &str, _: &str, _: &str, _: &str) -> rusqlite::Result<bool> {
            Err(rusqlite::Error::InvalidQuery)
        }
        fn delete_descriptions(&self, _: &str, _: &str) -> rusqlite::Result<usize> {
            Ok(0)
        }
    }

    /// Simulates a racing writer: the key is taken between our read and our insert.
    struct RacedStore {
        inner: Store,
        winner_text: String,
        raced: Mutex<bool>,
    }

    impl DescriptionStore for RacedStore {
        fn fetch_description(&self, p: &str, s: &str, l: &str) -> rusqlite::Result<Option<String>> {
            self.inner.fetch_description(p, s, l)
        }
        fn insert_description(&self, p: &str, s: &str, l: &str, t: &str) -> rusqlite::Result<bool> {
            let mut raced = self.raced.lock().unwrap();
            if !*raced {
                *raced = true;
                self.inner.insert_description(p, s, l, &self.winner_text)?;
            }
            self.inner.insert_description(p, s, l, t)
        }
        fn delete_descriptions(&self, p: &str, s: &str) -> rusqlite::Result<usize> {
            self.inner.delete_descriptions(p, s)
        }
    }

    /// Every read fails; writes go to an in-memory store.
    struct UnreadableStore {
        inner: Store,
    }

    impl DescriptionStore for UnreadableStore {
        fn fetch_description(&self, _: &str, _: &str, _: &str) -> rusqlite::Result<Option<String>> {
            Err(rusqlite::Error::InvalidQuery)
        }
        fn insert_description(&self, p: &str, s: &str, l: &str, t: &str) -> rusqlite::Result<bool> {
            self.inner.insert_description(p, s, l, t)
        }
        fn delete_descriptions(&self, p: &str, s: &str) -> rusqlite::Result<usize> {
            self.inner.delete_descriptions(p, s)
        }
    }

    fn paris(lang: &str) -> DescriptionRequest {
        DescriptionRequest {
            place_name: "Paris".into(),
            sub_region_name: Some("Paris".into()),
            region_name: Some("Île-de-France".into()),
            lang: lang.into(),
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = InsertOnConflictCache::new(Arc::new(Store::open_in_memory().unwrap()));
        let gen = CountingGenerator::default();
        let key = CacheKey::new("75056", "75", "en");
        let cancel = CancelToken::new();

        let first = cache.get_or_generate(&key, &paris("en"), &gen, &cancel).unwrap();
        let second = cache.get_or_generate(&key, &paris("en"), &gen, &cancel).unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.text, second.text);
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_languages_are_separate_keys() {
        let cache = InsertOnConflictCache::new(Arc::new(Store::open_in_memory().unwrap()));
        let gen = CountingGenerator::default();
        let cancel = CancelToken::new();
        let en = cache
            .get_or_generate(&CacheKey::new("75056", "75", "en"), &paris("en"), &gen, &cancel)
            .unwrap();
        let fr = cache
            .get_or_generate(&CacheKey::new("75056", "75", "fr"), &paris("fr"), &gen, &cancel)
            .unwrap();
        assert!(!en.cached && !fr.cached);
        assert_ne!(en.text, fr.text);
    }

    #[test]
    fn test_invalidate_all_languages_only_for_pair() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let cache = InsertOnConflictCache::new(store.clone());
        let gen = CountingGenerator::default();
        let cancel = CancelToken::new();
        for (p, s, l) in [("75056", "75", "en"), ("75056", "75", "fr"), ("13055", "13", "en")] {
            cache
                .get_or_generate(&CacheKey::new(p, s, l), &paris(l), &gen, &cancel)
                .unwrap();
        }

        assert_eq!(cache.invalidate("75056", "75").unwrap(), 2);
        assert!(store.fetch_description("75056", "75", "en").unwrap().is_none());
        assert!(store.fetch_description("75056", "75", "fr").unwrap().is_none());
        assert!(store.fetch_description("13055", "13", "en").unwrap().is_some());

        let again = cache
            .get_or_generate(&CacheKey::new("75056", "75", "en"), &paris("en"), &gen, &cancel)
            .unwrap();
        assert!(!again.cached);
    }

    #[test]
    fn test_generation_failure_writes_nothing() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let cache = InsertOnConflictCache::new(store.clone());
        let gen = CountingGenerator { fail: true, ..Default::default() };
        let err = cache
            .get_or_generate(&CacheKey::new("75056", "75", "en"), &paris("en"), &gen, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DescriptionError::GenerationFailed(_)));
        assert_eq!(store.description_count().unwrap(), 0);
    }

    #[test]
    fn test_write_failure_keeps_text() {
        let cache = InsertOnConflictCache::new(Arc::new(ReadOnlyStore));
        let gen = CountingGenerator::default();
        let err = cache
            .get_or_generate(&CacheKey::new("75056", "75", "en"), &paris("en"), &gen, &CancelToken::new())
            .unwrap_err();
        match err {
            DescriptionError::CacheWriteFailed { text, .. } => assert_eq!(text, "Paris (en) #1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_losing_writer_gets_own_text_first_persists() {
        let store = Arc::new(RacedStore {
            inner: Store::open_in_memory().unwrap(),
            winner_text: "winner".into(),
            raced: Mutex::new(false),
        });
        let cache = InsertOnConflictCache::new(store.clone());
        let gen = CountingGenerator::default();
        let key = CacheKey::new("75056", "75", "en");
        let cancel = CancelToken::new();

        let mine = cache.get_or_generate(&key, &paris("en"), &gen, &cancel).unwrap();
        assert_eq!(mine.text, "Paris (en) #1");
        assert!(!mine.cached);

        let later = cache.get_or_generate(&key, &paris("en"), &gen, &cancel).unwrap();
        assert_eq!(later.text, "winner");
        assert!(later.cached);
    }

    #[test]
    fn test_read_failure_falls_through_to_generation() {
        let store = Arc::new(UnreadableStore {
            inner: Store::open_in_memory().unwrap(),
        });
        let cache = InsertOnConflictCache::new(store.clone());
        let gen = CountingGenerator::default();
        let out = cache
            .get_or_generate(&CacheKey::new("75056", "75", "en"), &paris("en"), &gen, &CancelToken::new())
            .unwrap();
        assert_eq!(out.text, "Paris (en) #1");
        assert!(!out.cached);
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.description_count().unwrap(), 1);
    }

    #[test]
    fn test_read_and_write_failure_still_returns_text() {
        struct BrokenStore;
        impl DescriptionStore for BrokenStore {
            fn fetch_description(&self, _: &str, _: &str, _: &str) -> rusqlite::Result<Option<String>> {
                Err(rusqlite::Error::InvalidQuery)
            }
            fn insert_description(&self, _: &str, _: &str, _: &str, _: &str) -> rusqlite::Result<bool> {
                Err(rusqlite::Error::InvalidQuery)
            }
            fn delete_descriptions(&self, _: &str, _: &str) -> rusqlite::Result<usize> {
                Ok(0)
            }
        }

        let cache = InsertOnConflictCache::new(Arc::new(BrokenStore));
        let gen = CountingGenerator::default();
        let err = cache
            .get_or_generate(&CacheKey::new("75056", "75", "en"), &paris("en"), &gen, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DescriptionError::CacheWriteFailed { ref text, .. } if text == "Paris (en) #1"));
    }

    #[test]
    fn test_cancelled_request_never_writes() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let cache = InsertOnConflictCache::new(store.clone());
        let gen = CountingGenerator::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = cache
            .get_or_generate(&CacheKey::new("75056", "75", "en"), &paris("en"), &gen, &cancel)
            .unwrap_err();
        assert!(matches!(err, DescriptionError::Cancelled));
        assert_eq!(gen.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.description_count().unwrap(), 0);
    }
}
