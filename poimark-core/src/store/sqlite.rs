//! SQLite-backed store persisting users, POIs, regions, bookmarks and ratings.
//!
//! POIs and regions are loaded into memory when the store opens and kept in
//! sync on every staff write. Bookmark scopes run inside `BEGIN IMMEDIATE`
//! transactions so concurrent writers, even from other processes, queue up
//! instead of interleaving their order shifts.

use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};

use geo::{Coord, MultiPolygon, Rect};
use log::{debug, warn};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};
use thiserror::Error;

use crate::{
    Bookmark, BookmarkError, BookmarkRows, BookmarkStore, CategoryId, Deletion, PoiId,
    PointOfInterest, PointOfInterestError, Rating, RatingStore, Region, RegionCatalog,
    RegionError, RegionId, RegionKind, Score, StoreError, User, UserError, UserId,
};

use super::{PoiIndex, PoiStore};

/// How long a writer waits for another process to release the database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    is_staff INTEGER NOT NULL DEFAULT 0,
    is_superuser INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS pois (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    lon REAL NOT NULL,
    lat REAL NOT NULL,
    categories TEXT NOT NULL DEFAULT '[]',
    deleted INTEGER NOT NULL DEFAULT 0,
    deleted_by INTEGER
);
CREATE TABLE IF NOT EXISTS regions (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    country_id INTEGER REFERENCES regions (id),
    boundary TEXT,
    managers TEXT NOT NULL DEFAULT '[]',
    deleted INTEGER NOT NULL DEFAULT 0,
    deleted_by INTEGER
);
CREATE TABLE IF NOT EXISTS bookmarks (
    user_id INTEGER NOT NULL,
    poi_id INTEGER NOT NULL,
    ord INTEGER NOT NULL,
    UNIQUE (user_id, poi_id),
    UNIQUE (user_id, ord)
);
CREATE TABLE IF NOT EXISTS ratings (
    user_id INTEGER NOT NULL,
    poi_id INTEGER NOT NULL,
    score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 10),
    UNIQUE (user_id, poi_id)
);
";

/// Error raised when opening the database or applying staff writes.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}: {source}")]
    OpenDatabase {
        /// Location of the SQLite database on disk.
        path: PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A stored JSON column could not be decoded.
    #[error("failed to parse {column} for {table} row {id}: {source}")]
    InvalidJson {
        /// Table holding the row.
        table: &'static str,
        /// Column holding the payload.
        column: &'static str,
        /// Row identifier.
        id: u64,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A value could not be encoded as JSON for storage.
    #[error("failed to encode column: {0}")]
    Encode(#[source] serde_json::Error),
    /// A stored POI failed validation.
    #[error("stored POI {id} is invalid: {source}")]
    InvalidPoi {
        /// Identifier of the POI.
        id: u64,
        /// Validation failure.
        #[source]
        source: PointOfInterestError,
    },
    /// A stored user failed validation.
    #[error("stored user {id} is invalid: {source}")]
    InvalidUser {
        /// Identifier of the user.
        id: u64,
        /// Validation failure.
        #[source]
        source: UserError,
    },
    /// A region write broke the hierarchy rules.
    #[error(transparent)]
    Region(#[from] RegionError),
    /// Shared state or identifier conversion failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Generic SQLite error.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        match error {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Self::Constraint(message.unwrap_or_else(|| failure.to_string()))
            }
            other => Self::Backend(Box::new(other)),
        }
    }
}

/// Read-write store backed by a single SQLite database.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use poimark_core::{Bookmarks, PoiId, PointOfInterest, SqliteStore, UserId};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SqliteStore::open_in_memory()?;
/// store.insert_poi(&PointOfInterest::new(PoiId(1), "Fountain", Coord { x: 2.1, y: 41.4 })?)?;
///
/// let (bookmark, created) = Bookmarks::new(&store).bookmark(UserId(7), PoiId(1))?;
/// assert!(created);
/// assert_eq!(bookmark.order, 1);
/// # Ok(())
/// # }
/// ```
pub struct SqliteStore {
    connection: Mutex<Connection>,
    pois: RwLock<PoiIndex>,
    regions: RwLock<RegionCatalog>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pois = self.pois.read().map_or(0, |index| index.len());
        f.debug_struct("SqliteStore")
            .field("pois", &pois)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open<P>(path: P) -> Result<Self, SqliteStoreError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let connection =
            Connection::open(path).map_err(|source| SqliteStoreError::OpenDatabase {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_connection(connection)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, SqliteStoreError> {
        connection.busy_timeout(BUSY_TIMEOUT)?;
        connection.execute_batch(SCHEMA)?;
        let pois = load_pois(&connection)?;
        let regions = load_regions(&connection)?;
        debug!(
            "opened SQLite store with {} POIs and {} regions",
            pois.len(),
            regions.iter().count()
        );
        Ok(Self {
            connection: Mutex::new(connection),
            pois: RwLock::new(PoiIndex::bulk_load(pois)),
            regions: RwLock::new(regions),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert a user or update the stored one with the same id.
    pub fn insert_user(&self, user: &User) -> Result<(), SqliteStoreError> {
        self.lock()?.execute(
            "INSERT INTO users (id, username, is_staff, is_superuser, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (id) DO UPDATE SET
                username = excluded.username,
                is_staff = excluded.is_staff,
                is_superuser = excluded.is_superuser,
                is_active = excluded.is_active",
            params![
                key(user.id.get())?,
                user.username,
                user.is_staff,
                user.is_superuser,
                user.is_active
            ],
        )?;
        Ok(())
    }

    /// Look up a user, active or not.
    pub fn user(&self, id: UserId) -> Result<Option<User>, SqliteStoreError> {
        let connection = self.lock()?;
        let row = connection
            .query_row(
                "SELECT username, is_staff, is_superuser, is_active FROM users WHERE id = ?1",
                params![key(id.get())?],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((username, is_staff, is_superuser, is_active)) = row else {
            return Ok(None);
        };
        let mut user = User::new(id, username).map_err(|source| SqliteStoreError::InvalidUser {
            id: id.get(),
            source,
        })?;
        user.is_staff = is_staff || is_superuser;
        user.is_superuser = is_superuser;
        user.is_active = is_active;
        Ok(Some(user))
    }

    /// Close a user's account. Returns `false` when the user was unknown or
    /// already inactive.
    pub fn deactivate_user(&self, id: UserId) -> Result<bool, SqliteStoreError> {
        let changed = self.lock()?.execute(
            "UPDATE users SET is_active = 0 WHERE id = ?1 AND is_active = 1",
            params![key(id.get())?],
        )?;
        if changed > 0 {
            debug!("deactivated user {id}");
        }
        Ok(changed > 0)
    }

    /// Insert a POI or replace the stored one with the same id.
    pub fn insert_poi(&self, poi: &PointOfInterest) -> Result<(), SqliteStoreError> {
        let categories = serde_json::to_string(&poi.categories).map_err(SqliteStoreError::Encode)?;
        let deleted_by = poi.deletion.deleted_by.map(|by| key(by.get())).transpose()?;
        self.lock()?.execute(
            "INSERT INTO pois
                (id, name, summary, description, lon, lat, categories, deleted, deleted_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                summary = excluded.summary,
                description = excluded.description,
                lon = excluded.lon,
                lat = excluded.lat,
                categories = excluded.categories,
                deleted = excluded.deleted,
                deleted_by = excluded.deleted_by",
            params![
                key(poi.id.get())?,
                poi.name,
                poi.summary,
                poi.description,
                poi.location.x,
                poi.location.y,
                categories,
                poi.deletion.deleted,
                deleted_by
            ],
        )?;
        self.pois
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .upsert(poi.clone());
        Ok(())
    }

    /// Soft-delete a POI. Returns `false` when it was unknown or already
    /// deleted.
    pub fn soft_delete_poi(&self, id: PoiId, by: UserId) -> Result<bool, SqliteStoreError> {
        let changed = self.lock()?.execute(
            "UPDATE pois SET deleted = 1, deleted_by = ?2
             WHERE id = ?1 AND deleted = 0 AND deleted_by IS NULL",
            params![key(id.get())?, key(by.get())?],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        self.pois
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .soft_delete(id, by);
        debug!("user {by} deleted POI {id}");
        Ok(true)
    }

    /// Register a new region. Provinces must reference a stored country.
    pub fn insert_region(&self, region: &Region) -> Result<(), SqliteStoreError> {
        let mut catalog = self.regions.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = catalog.clone();
        next.insert(region.clone())?;

        let boundary = region
            .boundary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(SqliteStoreError::Encode)?;
        let managers = serde_json::to_string(&region.managers).map_err(SqliteStoreError::Encode)?;
        let country = region.parent().map(|id| key(id.get())).transpose()?;
        let deleted_by = region
            .deletion
            .deleted_by
            .map(|by| key(by.get()))
            .transpose()?;
        self.lock()?.execute(
            "INSERT INTO regions (id, name, country_id, boundary, managers, deleted, deleted_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key(region.id.get())?,
                region.name,
                country,
                boundary,
                managers,
                region.deletion.deleted,
                deleted_by
            ],
        )?;
        *catalog = next;
        Ok(())
    }

    /// Soft-delete a visible region.
    pub fn soft_delete_region(&self, id: RegionId, by: UserId) -> Result<(), SqliteStoreError> {
        let mut catalog = self.regions.write().map_err(|_| StoreError::Poisoned)?;
        if catalog.get(id).is_none() {
            return Err(RegionError::NotFound(id).into());
        }
        self.lock()?.execute(
            "UPDATE regions SET deleted = 1, deleted_by = ?2 WHERE id = ?1",
            params![key(id.get())?, key(by.get())?],
        )?;
        catalog.soft_delete(id, by)?;
        debug!("user {by} deleted region {id}");
        Ok(())
    }

    /// Snapshot of the region hierarchy.
    pub fn region_catalog(&self) -> Result<RegionCatalog, StoreError> {
        Ok(self.regions.read().map_err(|_| StoreError::Poisoned)?.clone())
    }
}

impl PoiStore for SqliteStore {
    fn get_pois_in_bbox(
        &self,
        bbox: &Rect<f64>,
    ) -> Box<dyn Iterator<Item = PointOfInterest> + Send + '_> {
        let index = self.pois.read().unwrap_or_else(PoisonError::into_inner);
        Box::new(index.in_bbox(bbox).into_iter())
    }

    fn get_poi(&self, id: PoiId) -> Option<PointOfInterest> {
        let index = self.pois.read().unwrap_or_else(PoisonError::into_inner);
        index.get(id).cloned()
    }
}

impl BookmarkStore for SqliteStore {
    fn with_user_bookmarks<T, F>(&self, user: UserId, work: F) -> Result<T, BookmarkError>
    where
        F: FnOnce(&mut dyn BookmarkRows) -> Result<T, BookmarkError>,
    {
        let mut connection = self.lock()?;
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let mut rows = SqliteRows {
            connection: &transaction,
            user,
            user_key: key(user.get())?,
        };
        // Dropping the transaction on error rolls every write back.
        let value = work(&mut rows)?;
        transaction.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    fn list_bookmarks(&self, user: UserId) -> Result<Vec<Bookmark>, StoreError> {
        select_bookmarks(&*self.lock()?, user, key(user.get())?)
    }
}

fn select_bookmarks(
    connection: &Connection,
    user: UserId,
    user_key: i64,
) -> Result<Vec<Bookmark>, StoreError> {
    let mut statement = connection
        .prepare("SELECT poi_id, ord FROM bookmarks WHERE user_id = ?1 ORDER BY ord")?;
    let rows = statement.query_map(params![user_key], |row| {
        Ok(Bookmark {
            user,
            poi: PoiId(row.get(0)?),
            order: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// One user's bookmark rows inside an open transaction.
struct SqliteRows<'c> {
    connection: &'c Connection,
    user: UserId,
    user_key: i64,
}

impl SqliteRows<'_> {
    fn bookmark(&self, poi: PoiId, order: u32) -> Bookmark {
        Bookmark {
            user: self.user,
            poi,
            order,
        }
    }

    fn expect_row(&self, changed: usize, poi: PoiId) -> Result<(), StoreError> {
        if changed == 0 {
            return Err(StoreError::Constraint(format!(
                "user {} has no bookmark for POI {poi}",
                self.user
            )));
        }
        Ok(())
    }

    fn restore_signs(&self) -> Result<(), StoreError> {
        self.connection.execute(
            "UPDATE bookmarks SET ord = -ord WHERE user_id = ?1 AND ord < 0",
            params![self.user_key],
        )?;
        Ok(())
    }
}

impl BookmarkRows for SqliteRows<'_> {
    fn user(&self) -> UserId {
        self.user
    }

    fn get(&self, poi: PoiId) -> Result<Option<Bookmark>, StoreError> {
        let order = self
            .connection
            .query_row(
                "SELECT ord FROM bookmarks WHERE user_id = ?1 AND poi_id = ?2",
                params![self.user_key, key(poi.get())?],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(order.map(|order| self.bookmark(poi, order)))
    }

    fn list(&self) -> Result<Vec<Bookmark>, StoreError> {
        select_bookmarks(self.connection, self.user, self.user_key)
    }

    fn max_order(&self) -> Result<u32, StoreError> {
        Ok(self.connection.query_row(
            "SELECT COALESCE(MAX(ord), 0) FROM bookmarks WHERE user_id = ?1",
            params![self.user_key],
            |row| row.get(0),
        )?)
    }

    fn insert(&mut self, poi: PoiId, order: u32) -> Result<Bookmark, StoreError> {
        self.connection.execute(
            "INSERT INTO bookmarks (user_id, poi_id, ord) VALUES (?1, ?2, ?3)",
            params![self.user_key, key(poi.get())?, order],
        )?;
        Ok(self.bookmark(poi, order))
    }

    fn delete(&mut self, poi: PoiId) -> Result<(), StoreError> {
        let changed = self.connection.execute(
            "DELETE FROM bookmarks WHERE user_id = ?1 AND poi_id = ?2",
            params![self.user_key, key(poi.get())?],
        )?;
        self.expect_row(changed, poi)
    }

    fn set_order(&mut self, poi: PoiId, order: u32) -> Result<(), StoreError> {
        let changed = self.connection.execute(
            "UPDATE bookmarks SET ord = ?3 WHERE user_id = ?1 AND poi_id = ?2",
            params![self.user_key, key(poi.get())?, order],
        )?;
        self.expect_row(changed, poi)
    }

    // SQLite checks UNIQUE (user_id, ord) row by row, so shifts go through
    // negative orders first.
    fn shift_down_above(&mut self, above: u32) -> Result<(), StoreError> {
        self.connection.execute(
            "UPDATE bookmarks SET ord = -(ord - 1) WHERE user_id = ?1 AND ord > ?2",
            params![self.user_key, above],
        )?;
        self.restore_signs()
    }

    fn shift_up_from(&mut self, from: u32) -> Result<(), StoreError> {
        self.connection.execute(
            "UPDATE bookmarks SET ord = -(ord + 1) WHERE user_id = ?1 AND ord >= ?2 AND ord > 0",
            params![self.user_key, from],
        )?;
        self.restore_signs()
    }
}

impl RatingStore for SqliteStore {
    fn upsert_rating(&self, rating: Rating) -> Result<Rating, StoreError> {
        self.lock()?.execute(
            "INSERT INTO ratings (user_id, poi_id, score) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, poi_id) DO UPDATE SET score = excluded.score",
            params![
                key(rating.user.get())?,
                key(rating.poi.get())?,
                rating.score.get()
            ],
        )?;
        Ok(rating)
    }

    fn delete_rating(&self, user: UserId, poi: PoiId) -> Result<bool, StoreError> {
        let changed = self.lock()?.execute(
            "DELETE FROM ratings WHERE user_id = ?1 AND poi_id = ?2",
            params![key(user.get())?, key(poi.get())?],
        )?;
        Ok(changed > 0)
    }

    fn rating(&self, user: UserId, poi: PoiId) -> Result<Option<Rating>, StoreError> {
        let score = self
            .lock()?
            .query_row(
                "SELECT score FROM ratings WHERE user_id = ?1 AND poi_id = ?2",
                params![key(user.get())?, key(poi.get())?],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(score.map(|score| Rating {
            user,
            poi,
            score: Score::clamped(score),
        }))
    }

    fn ratings_of(&self, user: UserId) -> Result<Vec<Rating>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT poi_id, score FROM ratings WHERE user_id = ?1 ORDER BY poi_id")?;
        let rows = statement.query_map(params![key(user.get())?], |row| {
            Ok(Rating {
                user,
                poi: PoiId(row.get(0)?),
                score: Score::clamped(row.get(1)?),
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn key(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::IdOutOfRange { id })
}

fn deletion(row: &Row<'_>, deleted: usize, deleted_by: usize) -> rusqlite::Result<Deletion> {
    Ok(Deletion {
        deleted: row.get(deleted)?,
        deleted_by: row.get::<_, Option<u64>>(deleted_by)?.map(UserId),
    })
}

fn load_pois(connection: &Connection) -> Result<Vec<PointOfInterest>, SqliteStoreError> {
    let mut statement = connection.prepare(
        "SELECT id, name, summary, description, lon, lat, categories, deleted, deleted_by
         FROM pois ORDER BY id",
    )?;
    let mut rows = statement.query([])?;
    let mut pois = Vec::new();

    while let Some(row) = rows.next()? {
        let id: u64 = row.get(0)?;
        let location = Coord {
            x: row.get(4)?,
            y: row.get(5)?,
        };
        let categories_json: String = row.get(6)?;
        let categories: BTreeSet<CategoryId> =
            serde_json::from_str(&categories_json).map_err(|source| {
                SqliteStoreError::InvalidJson {
                    table: "pois",
                    column: "categories",
                    id,
                    source,
                }
            })?;
        let mut poi = PointOfInterest::new(PoiId(id), row.get::<_, String>(1)?, location)
            .map_err(|source| SqliteStoreError::InvalidPoi { id, source })?
            .with_summary(row.get::<_, String>(2)?)
            .with_description(row.get::<_, String>(3)?)
            .with_categories(categories);
        poi.deletion = deletion(row, 7, 8)?;
        pois.push(poi);
    }

    Ok(pois)
}

fn load_regions(connection: &Connection) -> Result<RegionCatalog, SqliteStoreError> {
    // Countries first so provinces find their parent.
    let mut statement = connection.prepare(
        "SELECT id, name, country_id, boundary, managers, deleted, deleted_by
         FROM regions ORDER BY country_id IS NOT NULL, id",
    )?;
    let mut rows = statement.query([])?;
    let mut catalog = RegionCatalog::new();

    while let Some(row) = rows.next()? {
        let id: u64 = row.get(0)?;
        let kind = match row.get::<_, Option<u64>>(2)? {
            None => RegionKind::Country,
            Some(country) => RegionKind::Province {
                country: RegionId(country),
            },
        };
        let boundary: Option<MultiPolygon<f64>> = row
            .get::<_, Option<String>>(3)?
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|source| SqliteStoreError::InvalidJson {
                table: "regions",
                column: "boundary",
                id,
                source,
            })?;
        let managers_json: String = row.get(4)?;
        let managers: BTreeSet<UserId> =
            serde_json::from_str(&managers_json).map_err(|source| {
                SqliteStoreError::InvalidJson {
                    table: "regions",
                    column: "managers",
                    id,
                    source,
                }
            })?;

        let region = Region {
            id: RegionId(id),
            name: row.get(1)?,
            kind,
            boundary,
            managers,
            deletion: deletion(row, 5, 6)?,
        };
        if let Err(error) = catalog.insert(region) {
            warn!("skipping stored region {id}: {error}");
        }
    }

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bookmarks, SoftDeletable, rate};
    use geo::polygon;
    use rstest::{fixture, rstest};
    use std::{sync::Arc, thread};
    use tempfile::TempDir;

    fn poi(id: u64, x: f64, y: f64) -> PointOfInterest {
        PointOfInterest::new(PoiId(id), format!("poi {id}"), Coord { x, y }).expect("valid poi")
    }

    #[fixture]
    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open store")
    }

    fn everywhere() -> Rect<f64> {
        Rect::new(Coord { x: -180.0, y: -90.0 }, Coord { x: 180.0, y: 90.0 })
    }

    #[rstest]
    fn reopening_restores_every_table() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("poimark.db");
        {
            let store = SqliteStore::open(&path).expect("open store");
            store
                .insert_user(&User::new(UserId(1), "ana").expect("user").with_staff())
                .expect("insert user");
            store
                .insert_poi(&poi(1, 2.0, 41.0).with_categories([CategoryId(4)]))
                .expect("insert poi");
            store.insert_poi(&poi(2, 2.1, 41.1)).expect("insert poi");
            store.soft_delete_poi(PoiId(2), UserId(1)).expect("delete poi");
            store
                .insert_region(
                    &Region::country(RegionId(1), "Spain")
                        .with_boundary(polygon![
                            (x: 0.0, y: 40.0),
                            (x: 4.0, y: 40.0),
                            (x: 4.0, y: 43.0),
                            (x: 0.0, y: 43.0),
                        ])
                        .with_managers([UserId(1)]),
                )
                .expect("insert country");
            store
                .insert_region(&Region::province(RegionId(2), "Girona", RegionId(1)))
                .expect("insert province");
            Bookmarks::new(&store)
                .bookmark(UserId(1), PoiId(1))
                .expect("bookmark");
            rate(&store, UserId(1), PoiId(1), 12).expect("rate");
        }

        let store = SqliteStore::open(&path).expect("reopen store");
        let user = store.user(UserId(1)).expect("read user").expect("user kept");
        assert!(user.is_staff);

        let pois: Vec<_> = store.get_pois_in_bbox(&everywhere()).collect();
        assert_eq!(pois.len(), 2);
        assert!(pois.first().is_some_and(|p| p.categories.contains(&CategoryId(4))));
        assert!(pois.get(1).is_some_and(|p| !p.is_visible()));

        let catalog = store.region_catalog().expect("catalog");
        assert!(catalog.is_province_allowed(&user, RegionId(2)));
        assert!(
            catalog
                .get(RegionId(1))
                .is_some_and(|spain| spain.contains(Coord { x: 2.0, y: 41.0 }))
        );

        let bookmarks = Bookmarks::new(&store).list(UserId(1)).expect("list");
        assert_eq!(bookmarks.len(), 1);
        let rating = store.rating(UserId(1), PoiId(1)).expect("rating");
        assert_eq!(rating.map(|r| r.score.get()), Some(10));
    }

    #[rstest]
    fn provinces_need_a_stored_country(store: SqliteStore) {
        let error = store
            .insert_region(&Region::province(RegionId(2), "Orphan", RegionId(1)))
            .expect_err("province without country");
        assert!(matches!(
            error,
            SqliteStoreError::Region(RegionError::UnknownCountry { .. })
        ));
        assert_eq!(store.region_catalog().expect("catalog").iter().count(), 0);
    }

    #[rstest]
    fn deleted_regions_disappear(store: SqliteStore) {
        store
            .insert_region(&Region::country(RegionId(1), "Spain"))
            .expect("insert");
        store
            .soft_delete_region(RegionId(1), UserId(9))
            .expect("delete");
        let again = store.soft_delete_region(RegionId(1), UserId(9));
        assert!(matches!(
            again,
            Err(SqliteStoreError::Region(RegionError::NotFound(RegionId(1))))
        ));
        assert!(store.region_catalog().expect("catalog").get(RegionId(1)).is_none());
    }

    #[rstest]
    fn deactivating_users(store: SqliteStore) {
        store
            .insert_user(&User::new(UserId(1), "ana").expect("user"))
            .expect("insert");
        assert!(store.deactivate_user(UserId(1)).expect("deactivate"));
        assert!(!store.deactivate_user(UserId(1)).expect("deactivate again"));
        let user = store.user(UserId(1)).expect("read").expect("user kept");
        assert!(!user.is_active);
        assert_eq!(store.user(UserId(2)).expect("read"), None);
    }

    #[rstest]
    fn shifts_survive_unique_orders(store: SqliteStore) {
        let bookmarks = Bookmarks::new(&store);
        for poi in 1..=5 {
            bookmarks.bookmark(UserId(1), PoiId(poi)).expect("bookmark");
        }
        bookmarks
            .move_before(UserId(1), PoiId(5), Some(PoiId(2)))
            .expect("move up");
        bookmarks
            .move_before(UserId(1), PoiId(1), None)
            .expect("move to end");
        assert!(bookmarks.unbookmark(UserId(1), PoiId(2)).expect("remove"));

        let listed: Vec<(u64, u32)> = bookmarks
            .list(UserId(1))
            .expect("list")
            .iter()
            .map(|b| (b.poi.get(), b.order))
            .collect();
        assert_eq!(listed, vec![(5, 1), (3, 2), (4, 3), (1, 4)]);
    }

    #[rstest]
    fn failed_scopes_roll_back(store: SqliteStore) {
        let bookmarks = Bookmarks::new(&store);
        bookmarks.bookmark(UserId(1), PoiId(1)).expect("bookmark");
        let result: Result<(), BookmarkError> = store.with_user_bookmarks(UserId(1), |rows| {
            rows.delete(PoiId(1))?;
            Err(BookmarkError::NotFound {
                user: UserId(1),
                poi: PoiId(9),
            })
        });
        assert!(result.is_err());
        assert_eq!(bookmarks.list(UserId(1)).expect("list").len(), 1);
    }

    #[rstest]
    fn duplicate_orders_map_to_constraint_errors(store: SqliteStore) {
        let result = store.with_user_bookmarks(UserId(1), |rows| {
            rows.insert(PoiId(1), 1)?;
            rows.insert(PoiId(2), 1).map_err(BookmarkError::from)
        });
        assert!(matches!(
            result,
            Err(BookmarkError::Store(StoreError::Constraint(_)))
        ));
    }

    #[rstest]
    fn ids_beyond_sqlite_range_are_rejected(store: SqliteStore) {
        let result = store.rating(UserId(u64::MAX), PoiId(1));
        assert!(matches!(result, Err(StoreError::IdOutOfRange { id: u64::MAX })));
    }

    #[rstest]
    fn listing_reads_while_another_writer_holds_the_lock() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("poimark.db");
        let store = SqliteStore::open(&path).expect("open store");
        let bookmarks = Bookmarks::new(&store);
        for poi in [PoiId(2), PoiId(1)] {
            bookmarks.bookmark(UserId(1), poi).expect("bookmark");
        }

        let writer = Connection::open(&path).expect("open second connection");
        writer.execute_batch("BEGIN IMMEDIATE").expect("reserve write lock");

        let listed: Vec<PoiId> = bookmarks
            .list(UserId(1))
            .expect("listing does not need the write lock")
            .iter()
            .map(|bookmark| bookmark.poi)
            .collect();
        assert_eq!(listed, vec![PoiId(2), PoiId(1)]);
        writer.execute_batch("ROLLBACK").expect("release write lock");
    }

    #[rstest]
    fn concurrent_moves_stay_dense() {
        let dir = TempDir::new().expect("create temp dir");
        let store = Arc::new(SqliteStore::open(dir.path().join("poimark.db")).expect("open"));
        let bookmarks = Bookmarks::new(store.as_ref());
        for poi in 1..=6 {
            bookmarks.bookmark(UserId(1), PoiId(poi)).expect("bookmark");
        }

        let workers: Vec<_> = (1..=4_u64)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let bookmarks = Bookmarks::new(store.as_ref());
                    for round in 0..10_u64 {
                        let poi = PoiId((worker + round) % 6 + 1);
                        let before = (round % 3 != 0).then(|| PoiId((worker * 5 + round) % 6 + 1));
                        bookmarks
                            .move_before(UserId(1), poi, before)
                            .expect("move succeeds");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker finished");
        }

        let orders: Vec<u32> = bookmarks
            .list(UserId(1))
            .expect("list")
            .iter()
            .map(|b| b.order)
            .collect();
        assert_eq!(orders, (1..=6).collect::<Vec<u32>>());
    }
}
