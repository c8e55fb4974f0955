//! Administrative location subsystem.
//!
//! Resolves town names against the reference tables (towns, departments,
//! regions) kept in the SQLite store, which also holds the description cache.

pub mod resolver;
pub mod store;
pub mod types;

pub use resolver::{fold_name, normalize_name, AdministrativeResolver};
pub use store::{DescriptionStore, Store};
pub use types::{LocationError, PlaceMetadata, PlaceRecord, RegionRecord, ResolvedPlace, SubRegionRecord};
