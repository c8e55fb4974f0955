//! Administrative resolver: town name → town + department + region.
//!
//! Flow: repair + NFKC-normalize input → case-folded lookup (optionally
//! filtered by department code) → join department → join region.
//! Missing join targets degrade to `None`, never to an error.

use super::store::Store;
use super::types::{LocationError, ResolvedPlace};
use std::sync::Arc;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// Maximum squared degree distance for nearest-town lookups (0.5°).
const NEAREST_MAX_D2: f64 = 0.25;

/// Byte sequences that legacy Windows-1252 imports left in place of `œ`.
const MOJIBAKE: &[(&str, &str)] = &[("\u{009C}", "œ"), ("??", "œ")];

pub struct AdministrativeResolver {
    store: Arc<Store>,
}

impl AdministrativeResolver {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Resolve a town name, optionally pinned to a department code.
    pub fn resolve(&self, name: &str, sub_region_hint: Option<&str>) -> Result<ResolvedPlace, LocationError> {
        let query = normalize_name(name);
        if query.is_empty() {
            return Err(LocationError::NotFound(name.to_string()));
        }
        let hint = sub_region_hint.map(str::trim).filter(|h| !h.is_empty());

        let place = self
            .store
            .find_place(&fold_name(&query), hint)?
            .ok_or_else(|| LocationError::NotFound(name.to_string()))?;

        debug!(place = %place.name, code = %place.id, sub_region = %place.sub_region_id, "place resolved");
        self.join(place)
    }

    /// Closest town to a coordinate, if any lies within half a degree.
    pub fn nearest(&self, lat: f64, lon: f64) -> Result<Option<ResolvedPlace>, LocationError> {
        match self.store.nearest_place(lat, lon, NEAREST_MAX_D2)? {
            Some(place) => self.join(place).map(Some),
            None => Ok(None),
        }
    }

    fn join(&self, place: super::types::PlaceRecord) -> Result<ResolvedPlace, LocationError> {
        let sub_region = self.store.sub_region(&place.sub_region_id)?;
        let region = match &sub_region {
            Some(dep) => self.store.region(&dep.region_id)?,
            None => None,
        };
        Ok(ResolvedPlace {
            place,
            sub_region,
            region,
        })
    }
}

/// Repair known mojibake, apply NFKC and collapse whitespace.
pub fn normalize_name(raw: &str) -> String {
    let mut name = raw.to_string();
    for (bad, good) in MOJIBAKE {
        if name.contains(bad) {
            name = name.replace(bad, good);
        }
    }
    name.nfkc()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Comparison key: NFKC then Unicode lowercase.
///
/// Registered as the `fold_name` SQL function so stored names are folded the
/// same way as queries.
pub fn fold_name(name: &str) -> String {
    name.nfkc().collect::<String>().to_lowercase()
}
