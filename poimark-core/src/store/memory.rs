//! In-memory backend implementing every storage seam.
//!
//! POIs sit in an R\*-tree behind a read/write lock. Bookmark lists have one
//! mutex per user: a scope locks that user's list, works on a copy and swaps
//! the copy in only when the work succeeds.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use geo::Rect;

use crate::{
    Bookmark, BookmarkError, BookmarkRows, BookmarkStore, PoiId, PointOfInterest, Rating,
    RatingStore, StoreError, UserId,
};

use super::{PoiIndex, PoiStore};

type UserList = Arc<Mutex<Vec<Bookmark>>>;

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    pois: RwLock<PoiIndex>,
    bookmarks: Mutex<HashMap<UserId, UserList>>,
    ratings: RwLock<BTreeMap<(UserId, PoiId), Rating>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pois = self
            .pois
            .read()
            .map_or(0, |index| index.len());
        f.debug_struct("MemoryStore")
            .field("pois", &pois)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create a store from a collection of points of interest.
    pub fn with_pois<I>(pois: I) -> Self
    where
        I: IntoIterator<Item = PointOfInterest>,
    {
        Self {
            pois: RwLock::new(PoiIndex::bulk_load(pois)),
            ..Self::default()
        }
    }

    /// Insert or replace a POI.
    pub fn insert_poi(&self, poi: PointOfInterest) -> Result<(), StoreError> {
        self.pois
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .upsert(poi);
        Ok(())
    }

    /// Soft-delete a POI. Returns `false` when it was unknown or already
    /// deleted.
    pub fn soft_delete_poi(&self, id: PoiId, by: UserId) -> Result<bool, StoreError> {
        Ok(self
            .pois
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .soft_delete(id, by))
    }

    fn user_list(&self, user: UserId) -> Result<UserList, StoreError> {
        let mut users = self.bookmarks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(Arc::clone(users.entry(user).or_default()))
    }
}

impl PoiStore for MemoryStore {
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

impl BookmarkStore for MemoryStore {
    fn with_user_bookmarks<T, F>(&self, user: UserId, work: F) -> Result<T, BookmarkError>
    where
        F: FnOnce(&mut dyn BookmarkRows) -> Result<T, BookmarkError>,
    {
        let list = self.user_list(user)?;
        let mut guard = list.lock().map_err(|_| StoreError::Poisoned)?;
        let mut scope = MemoryRows {
            user,
            rows: guard.clone(),
        };
        let value = work(&mut scope)?;
        *guard = scope.rows;
        Ok(value)
    }

    fn list_bookmarks(&self, user: UserId) -> Result<Vec<Bookmark>, StoreError> {
        let list = self
            .bookmarks
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .get(&user)
            .map(Arc::clone);
        let Some(list) = list else {
            return Ok(Vec::new());
        };
        let mut rows = list.lock().map_err(|_| StoreError::Poisoned)?.clone();
        rows.sort_unstable_by_key(|bookmark| bookmark.order);
        Ok(rows)
    }
}

/// Working copy of one user's bookmarks.
struct MemoryRows {
    user: UserId,
    rows: Vec<Bookmark>,
}

impl MemoryRows {
    fn position(&self, poi: PoiId) -> Result<usize, StoreError> {
        self.rows
            .iter()
            .position(|bookmark| bookmark.poi == poi)
            .ok_or_else(|| {
                StoreError::Constraint(format!("user {} has no bookmark for POI {poi}", self.user))
            })
    }

    fn order_taken(&self, order: u32, except: PoiId) -> bool {
        self.rows
            .iter()
            .any(|bookmark| bookmark.order == order && bookmark.poi != except)
    }

    fn order_conflict(&self, order: u32) -> StoreError {
        StoreError::Constraint(format!("user {} already holds order {order}", self.user))
    }
}

impl BookmarkRows for MemoryRows {
    fn user(&self) -> UserId {
        self.user
    }

    fn get(&self, poi: PoiId) -> Result<Option<Bookmark>, StoreError> {
        Ok(self.rows.iter().find(|bookmark| bookmark.poi == poi).copied())
    }

    fn list(&self) -> Result<Vec<Bookmark>, StoreError> {
        let mut rows = self.rows.clone();
        rows.sort_unstable_by_key(|bookmark| bookmark.order);
        Ok(rows)
    }

    fn max_order(&self) -> Result<u32, StoreError> {
        Ok(self
            .rows
            .iter()
            .map(|bookmark| bookmark.order)
            .max()
            .unwrap_or(0))
    }

    fn insert(&mut self, poi: PoiId, order: u32) -> Result<Bookmark, StoreError> {
        if self.rows.iter().any(|bookmark| bookmark.poi == poi) {
            return Err(StoreError::Constraint(format!(
                "user {} already bookmarked POI {poi}",
                self.user
            )));
        }
        if self.order_taken(order, poi) {
            return Err(self.order_conflict(order));
        }
        let bookmark = Bookmark {
            user: self.user,
            poi,
            order,
        };
        self.rows.push(bookmark);
        Ok(bookmark)
    }

    fn delete(&mut self, poi: PoiId) -> Result<(), StoreError> {
        let index = self.position(poi)?;
        self.rows.swap_remove(index);
        Ok(())
    }

    fn set_order(&mut self, poi: PoiId, order: u32) -> Result<(), StoreError> {
        if self.order_taken(order, poi) {
            return Err(self.order_conflict(order));
        }
        let index = self.position(poi)?;
        if let Some(bookmark) = self.rows.get_mut(index) {
            bookmark.order = order;
        }
        Ok(())
    }

    fn shift_down_above(&mut self, above: u32) -> Result<(), StoreError> {
        for bookmark in self.rows.iter_mut().filter(|b| b.order > above) {
            bookmark.order -= 1;
        }
        Ok(())
    }

    fn shift_up_from(&mut self, from: u32) -> Result<(), StoreError> {
        for bookmark in self
            .rows
            .iter_mut()
            .filter(|b| b.order != 0 && b.order >= from)
        {
            bookmark.order += 1;
        }
        Ok(())
    }
}

impl RatingStore for MemoryStore {
    fn upsert_rating(&self, rating: Rating) -> Result<Rating, StoreError> {
        self.ratings
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert((rating.user, rating.poi), rating);
        Ok(rating)
    }

    fn delete_rating(&self, user: UserId, poi: PoiId) -> Result<bool, StoreError> {
        Ok(self
            .ratings
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .remove(&(user, poi))
            .is_some())
    }

    fn rating(&self, user: UserId, poi: PoiId) -> Result<Option<Rating>, StoreError> {
        Ok(self
            .ratings
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(&(user, poi))
            .copied())
    }

    fn ratings_of(&self, user: UserId) -> Result<Vec<Rating>, StoreError> {
        let ratings = self.ratings.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ratings
            .range((user, PoiId(u64::MIN))..=(user, PoiId(u64::MAX)))
            .map(|(_, rating)| *rating)
            .collect())
    }
}
