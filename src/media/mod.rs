//! Image curation subsystem.
//!
//! Queries a MediaWiki-compatible index for page images, filters them with
//! configurable block/allow vocabularies and samples a bounded set.

pub mod curator;
pub mod filter;
pub mod providers;
pub mod types;

pub use curator::ImageCurator;
pub use filter::ImageFilter;
pub use providers::{MediaIndex, WikipediaIndex};
pub use types::{CurationRequest, ImageCandidate, ImageInfo, MediaError};
