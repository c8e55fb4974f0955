//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A town row from the reference tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    /// Town code, unique together with `sub_region_id`.
    pub id: String,
    pub name: String,
    /// Department code.
    pub sub_region_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRegionRecord {
    pub id: String,
    pub name: String,
    pub region_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub id: String,
    pub name: String,
}

/// A place joined with its administrative parents.
///
/// Either parent may be missing from the reference data; callers get `None`
/// rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlace {
    pub place: PlaceRecord,
    pub sub_region: Option<SubRegionRecord>,
    pub region: Option<RegionRecord>,
}

impl ResolvedPlace {
    pub fn sub_region_name(&self) -> Option<&str> {
        self.sub_region.as_ref().map(|d| d.name.as_str())
    }

    pub fn region_name(&self) -> Option<&str> {
        self.region.as_ref().map(|r| r.name.as_str())
    }

    pub fn metadata(&self) -> PlaceMetadata {
        PlaceMetadata {
            id: self.place.id.clone(),
            name: self.place.name.clone(),
            latitude: self.place.latitude,
            longitude: self.place.longitude,
            sub_region_code: self.place.sub_region_id.clone(),
            sub_region_name: self.sub_region.as_ref().map(|d| d.name.clone()),
            region_code: self.sub_region.as_ref().map(|d| d.region_id.clone()),
            region_name: self.region.as_ref().map(|r| r.name.clone()),
        }
    }

    pub fn display_line(&self) -> String {
        let mut line = self.place.name.clone();
        if let Some(dep) = self.sub_region_name() {
            line.push_str(&format!(", {}", dep));
        }
        if let Some(reg) = self.region_name() {
            line.push_str(&format!(", {}", reg));
        }
        format!("{} [{}-{}]", line, self.place.id, self.place.sub_region_id)
    }
}

/// Flat metadata block returned to API consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceMetadata {
    pub id: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sub_region_code: String,
    pub sub_region_name: Option<String>,
    pub region_code: Option<String>,
    pub region_name: Option<String>,
}

/// Location resolution errors.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location not found: '{0}'")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}
