//! Generated descriptions and their persistent cache.

pub mod cache;
pub mod generator;

pub use cache::{CacheKey, DescriptionCache, DescriptionError, DescriptionOutcome, InsertOnConflictCache};
pub use generator::{DescriptionRequest, GenerationError, Generator, OpenAiGenerator};
