//! SQLite-backed store for reference tables and the description cache.
//!
//! Reference rows (regions, departments, towns) are written by external
//! import jobs; this crate only reads them. The `descriptions` table is
//! append-only apart from keyed deletion.

use super::types::{PlaceRecord, RegionRecord, SubRegionRecord};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS regions (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS departments (
    code   TEXT PRIMARY KEY,
    name   TEXT NOT NULL,
    region TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS towns (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    code       TEXT NOT NULL,
    name       TEXT NOT NULL,
    department TEXT NOT NULL,
    latitude   REAL,
    longitude  REAL,
    UNIQUE (code, department)
);
CREATE TABLE IF NOT EXISTS descriptions (
    town_code   TEXT NOT NULL,
    department  TEXT NOT NULL,
    language    TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (town_code, department, language)
);
"#;

/// Persistence operations the description cache relies on.
///
/// Split out so the cache policy can be exercised against stores that fail
/// or race.
pub trait DescriptionStore: Send + Sync {
    fn fetch_description(
        &self,
        place_id: &str,
        sub_region_id: &str,
        lang: &str,
    ) -> rusqlite::Result<Option<String>>;

    /// Insert unless the key exists. Returns `true` when this call wrote the row.
    fn insert_description(
        &self,
        place_id: &str,
        sub_region_id: &str,
        lang: &str,
        text: &str,
    ) -> rusqlite::Result<bool>;

    /// Delete every language for the pair. Returns the number of rows removed.
    fn delete_descriptions(&self, place_id: &str, sub_region_id: &str) -> rusqlite::Result<usize>;
}

/// The store. One connection guarded by a mutex; SQLite serializes writers anyway.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent() {
            // Connection::open reports the failure; this keeps the underlying cause.
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "cannot create database directory");
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = Self::prepare(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// In-memory database (for testing and one-shot runs).
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::prepare(Connection::open_in_memory()?, None)
    }

    fn prepare(conn: Connection, path: Option<PathBuf>) -> rusqlite::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        conn.create_scalar_function(
            "fold_name",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let raw: Option<String> = ctx.get(0)?;
                Ok(raw.map(|s| crate::location::resolver::fold_name(&s)))
            },
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself intact.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─── Reference data ─────────────────────────────────────────

    /// Find a town by its folded name, optionally restricted to one department.
    pub fn find_place(&self, folded_name: &str, sub_region: Option<&str>) -> rusqlite::Result<Option<PlaceRecord>> {
        let conn = self.lock();
        match sub_region {
            Some(dep) => conn
                .query_row(
                    "SELECT code, name, department, latitude, longitude FROM towns
                     WHERE fold_name(name) = ?1 AND department = ?2
                     ORDER BY id LIMIT 1",
                    params![folded_name, dep],
                    place_from_row,
                )
                .optional(),
            None => conn
                .query_row(
                    "SELECT code, name, department, latitude, longitude FROM towns
                     WHERE fold_name(name) = ?1
                     ORDER BY id LIMIT 1",
                    params![folded_name],
                    place_from_row,
                )
                .optional(),
        }
    }

    /// Closest geocoded town within `max_d2` squared degrees.
    pub fn nearest_place(&self, lat: f64, lon: f64, max_d2: f64) -> rusqlite::Result<Option<PlaceRecord>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT code, name, department, latitude, longitude FROM (
                 SELECT code, name, department, latitude, longitude, id,
                        ((latitude - ?1) * (latitude - ?1)
                         + (longitude - ?2) * (longitude - ?2)) AS dist2
                 FROM towns
                 WHERE latitude IS NOT NULL AND longitude IS NOT NULL
             )
             WHERE dist2 <= ?3
             ORDER BY dist2, id
             LIMIT 1",
            params![lat, lon, max_d2],
            place_from_row,
        )
        .optional()
    }

    pub fn sub_region(&self, code: &str) -> rusqlite::Result<Option<SubRegionRecord>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT code, name, region FROM departments WHERE code = ?1 LIMIT 1",
            params![code],
            |row| {
                Ok(SubRegionRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    region_id: row.get(2)?,
                })
            },
        )
        .optional()
    }

    pub fn region(&self, code: &str) -> rusqlite::Result<Option<RegionRecord>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT code, name FROM regions WHERE code = ?1 LIMIT 1",
            params![code],
            |row| {
                Ok(RegionRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()
    }

    // ─── Import helpers ─────────────────────────────────────────

    pub fn insert_region(&self, region: &RegionRecord) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO regions (code, name) VALUES (?1, ?2)",
            params![region.id, region.name],
        )?;
        Ok(())
    }

    pub fn insert_sub_region(&self, dep: &SubRegionRecord) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO departments (code, name, region) VALUES (?1, ?2, ?3)",
            params![dep.id, dep.name, dep.region_id],
        )?;
        Ok(())
    }

    pub fn insert_place(&self, place: &PlaceRecord) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT INTO towns (code, name, department, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (code, department) DO UPDATE SET
                 name = excluded.name,
                 latitude = excluded.latitude,
                 longitude = excluded.longitude",
            params![place.id, place.name, place.sub_region_id, place.latitude, place.longitude],
        )?;
        Ok(())
    }

    /// Number of cached descriptions (for diagnostics and tests).
    pub fn description_count(&self) -> rusqlite::Result<usize> {
        let n: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM descriptions", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl DescriptionStore for Store {
    fn fetch_description(&self, place_id: &str, sub_region_id: &str, lang: &str) -> rusqlite::Result<Option<String>> {
        self.lock()
            .query_row(
                "SELECT description FROM descriptions
                 WHERE town_code = ?1 AND department = ?2 AND language = ?3
                 LIMIT 1",
                params![place_id, sub_region_id, lang],
                |row| row.get(0),
            )
            .optional()
    }

    fn insert_description(&self, place_id: &str, sub_region_id: &str, lang: &str, text: &str) -> rusqlite::Result<bool> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let changed = self.lock().execute(
            "INSERT INTO descriptions (town_code, department, language, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (town_code, department, language) DO NOTHING",
            params![place_id, sub_region_id, lang, text, created_at],
        )?;
        debug!(place = place_id, sub_region = sub_region_id, lang, inserted = (changed == 1), "description insert");
        Ok(changed == 1)
    }

    fn delete_descriptions(&self, place_id: &str, sub_region_id: &str) -> rusqlite::Result<usize> {
        self.lock().execute(
            "DELETE FROM descriptions WHERE town_code = ?1 AND department = ?2",
            params![place_id, sub_region_id],
        )
    }
}

fn place_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlaceRecord> {
    Ok(PlaceRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        sub_region_id: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
    })
}

#[cfg(test)]
pub(crate) fn seeded_store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store
        .insert_region(&RegionRecord { id: "11".into(), name: "Île-de-France".into() })
        .unwrap();
    store
        .insert_region(&RegionRecord { id: "93".into(), name: "Provence-Alpes-Côte d'Azur".into() })
        .unwrap();
    store
        .insert_sub_region(&SubRegionRecord { id: "75".into(), name: "Paris".into(), region_id: "11".into() })
        .unwrap();
    store
        .insert_sub_region(&SubRegionRecord {
            id: "13".into(),
            name: "Bouches-du-Rhône".into(),
            region_id: "93".into(),
        })
        .unwrap();
    store
        .insert_place(&PlaceRecord {
            id: "75056".into(),
            name: "Paris".into(),
            sub_region_id: "75".into(),
            latitude: Some(48.8566),
            longitude: Some(2.3522),
        })
        .unwrap();
    store
        .insert_place(&PlaceRecord {
            id: "13055".into(),
            name: "Marseille".into(),
            sub_region_id: "13".into(),
            latitude: Some(43.2965),
            longitude: Some(5.3698),
        })
        .unwrap();
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("atlas.db");
        let store = Store::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn test_open_under_a_file_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        assert!(Store::open(&blocker.join("atlas.db")).is_err());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("atlas.db");
        {
            let store = Store::open(&path).unwrap();
            store.insert_description("75056", "75", "en", "Paris text").unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.description_count().unwrap(), 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_insert_description_on_conflict_keeps_first() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.insert_description("75056", "75", "en", "first").unwrap());
        assert!(!store.insert_description("75056", "75", "en", "second").unwrap());
        assert_eq!(
            store.fetch_description("75056", "75", "en").unwrap().as_deref(),
            Some("first")
        );
    }

    #[test]
    fn test_delete_descriptions_all_languages() {
        let store = Store::open_in_memory().unwrap();
        store.insert_description("75056", "75", "en", "a").unwrap();
        store.insert_description("75056", "75", "fr", "b").unwrap();
        store.insert_description("13055", "13", "en", "c").unwrap();

        assert_eq!(store.delete_descriptions("75056", "75").unwrap(), 2);
        assert!(store.fetch_description("75056", "75", "en").unwrap().is_none());
        assert!(store.fetch_description("75056", "75", "fr").unwrap().is_none());
        assert_eq!(
            store.fetch_description("13055", "13", "en").unwrap().as_deref(),
            Some("c")
        );
    }

    #[test]
    fn test_find_place_folds_case() {
        let store = seeded_store();
        let place = store.find_place("marseille", None).unwrap().unwrap();
        assert_eq!(place.id, "13055");
        assert!(store.find_place("marseille", Some("75")).unwrap().is_none());
    }

    #[test]
    fn test_nearest_place_within_range() {
        let store = seeded_store();
        let place = store.nearest_place(48.85, 2.35, 0.25).unwrap().unwrap();
        assert_eq!(place.name, "Paris");
        assert!(store.nearest_place(0.0, 0.0, 0.25).unwrap().is_none());
    }

    #[test]
    fn test_reference_lookups() {
        let store = seeded_store();
        assert_eq!(store.sub_region("13").unwrap().unwrap().region_id, "93");
        assert_eq!(store.region("11").unwrap().unwrap().name, "Île-de-France");
        assert!(store.region("99").unwrap().is_none());
    }
}
