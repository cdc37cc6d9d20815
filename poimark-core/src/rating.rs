//! Per-user 0–10 ratings of POIs.

use log::debug;

use crate::{PoiId, StoreError, UserId};

/// Lowest storable score.
pub const MIN_SCORE: u8 = 0;
/// Highest storable score.
pub const MAX_SCORE: u8 = 10;

/// A score already clamped to `[MIN_SCORE, MAX_SCORE]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Score(u8);

impl Score {
    /// Clamp a raw score into range.
    ///
    /// # Examples
    /// ```
    /// use poimark_core::Score;
    ///
    /// assert_eq!(Score::clamped(15).get(), 10);
    /// assert_eq!(Score::clamped(-3).get(), 0);
    /// assert_eq!(Score::clamped(7).get(), 7);
    /// ```
    #[must_use]
    pub fn clamped(raw: i64) -> Self {
        let bounded = raw.clamp(i64::from(MIN_SCORE), i64::from(MAX_SCORE));
        Self(u8::try_from(bounded).unwrap_or(MAX_SCORE))
    }

    /// The clamped value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

/// A user's score for a POI. At most one exists per (user, POI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rating {
    /// Rating author.
    pub user: UserId,
    /// Rated POI.
    pub poi: PoiId,
    /// Clamped score.
    pub score: Score,
}

impl Rating {
    /// Build a rating, clamping `raw_score`.
    #[must_use]
    pub fn new(user: UserId, poi: PoiId, raw_score: i64) -> Self {
        Self {
            user,
            poi,
            score: Score::clamped(raw_score),
        }
    }
}

/// Backend holding ratings keyed by (user, POI).
pub trait RatingStore {
    /// Insert the rating or overwrite the score of the existing one.
    fn upsert_rating(&self, rating: Rating) -> Result<Rating, StoreError>;

    /// Delete the rating. Returns whether one existed.
    fn delete_rating(&self, user: UserId, poi: PoiId) -> Result<bool, StoreError>;

    /// Current rating, if any.
    fn rating(&self, user: UserId, poi: PoiId) -> Result<Option<Rating>, StoreError>;

    /// All of `user`'s ratings, ordered by POI id.
    fn ratings_of(&self, user: UserId) -> Result<Vec<Rating>, StoreError>;
}

/// Rate `poi` for `user`, clamping the score. Repeated calls overwrite the
/// score instead of adding rows.
pub fn rate<S>(store: &S, user: UserId, poi: PoiId, raw_score: i64) -> Result<Rating, StoreError>
where
    S: RatingStore + ?Sized,
{
    let rating = store.upsert_rating(Rating::new(user, poi, raw_score))?;
    debug!("user {user} rated POI {poi} with {}", rating.score.get());
    Ok(rating)
}

/// Remove `user`'s rating of `poi`. Returns whether one existed.
pub fn unrate<S>(store: &S, user: UserId, poi: PoiId) -> Result<bool, StoreError>
where
    S: RatingStore + ?Sized,
{
    let removed = store.delete_rating(user, poi)?;
    if removed {
        debug!("user {user} removed rating for POI {poi}");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> MemoryStore {
        MemoryStore::default()
    }

    #[rstest]
    #[case(15, 10)]
    #[case(-3, 0)]
    #[case(0, 0)]
    #[case(10, 10)]
    #[case(i64::MAX, 10)]
    #[case(i64::MIN, 0)]
    fn scores_are_clamped(store: MemoryStore, #[case] raw: i64, #[case] stored: u8) {
        let rating = rate(&store, UserId(1), PoiId(1), raw).expect("rate");
        assert_eq!(rating.score.get(), stored);
        let persisted = store.rating(UserId(1), PoiId(1)).expect("read");
        assert_eq!(persisted.map(|r| r.score.get()), Some(stored));
    }

    #[rstest]
    fn rerating_overwrites(store: MemoryStore) {
        rate(&store, UserId(1), PoiId(1), 3).expect("first");
        rate(&store, UserId(1), PoiId(1), 8).expect("second");
        rate(&store, UserId(1), PoiId(1), 8).expect("idempotent");
        let ratings = store.ratings_of(UserId(1)).expect("list");
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings.first().map(|r| r.score.get()), Some(8));
    }

    #[rstest]
    fn unrate_reports_existence(store: MemoryStore) {
        rate(&store, UserId(1), PoiId(1), 5).expect("rate");
        assert!(unrate(&store, UserId(1), PoiId(1)).expect("unrate"));
        assert!(!unrate(&store, UserId(1), PoiId(1)).expect("unrate again"));
        assert_eq!(store.rating(UserId(1), PoiId(1)).expect("read"), None);
    }
}
