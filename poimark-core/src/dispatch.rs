//! Translate external action requests into calls on the search, bookmark and
//! rating components.
//!
//! Actions are plain values. [`Dispatcher::dispatch`] checks who is asking,
//! resolves the referenced POI where one is named and forwards to the owning
//! component. Every user-scoped action needs an authenticated, active caller.

use std::collections::HashSet;

use log::debug;
use thiserror::Error;

use crate::{
    AnnotatedPoi, Bookmark, BookmarkError, BookmarkStore, Bookmarks, PersonalScope, PoiId,
    PoiStore, Rating, RatingStore, RegionCatalog, SearchError, SearchQuery, SoftDeletable,
    SpatialSearch, StoreError, User, UserId, rate, unrate,
};

/// Rate a POI with a raw score, clamped on storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePoiAction {
    /// POI to rate.
    pub poi: PoiId,
    /// Raw score before clamping.
    pub score: i64,
}

/// Remove the caller's rating of a POI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnratePoiAction {
    /// POI to unrate.
    pub poi: PoiId,
}

/// Append a POI to the caller's bookmark list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookmarkPoiAction {
    /// POI to bookmark.
    pub poi: PoiId,
}

/// Remove a POI from the caller's bookmark list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnbookmarkPoiAction {
    /// POI to remove.
    pub poi: PoiId,
}

/// Move the caller's bookmark for `poi` before the one for `before`, or to
/// the end of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovePoiBookmarkAction {
    /// Bookmarked POI to move.
    pub poi: PoiId,
    /// Bookmarked POI to land in front of.
    pub before: Option<PoiId>,
}

/// Run a combined search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchAction {
    /// Search constraints.
    pub query: SearchQuery,
}

/// Every request the dispatcher understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Combined search.
    Search(SearchAction),
    /// Rate a POI.
    Rate(RatePoiAction),
    /// Remove a rating.
    Unrate(UnratePoiAction),
    /// Bookmark a POI.
    Bookmark(BookmarkPoiAction),
    /// Remove a bookmark.
    Unbookmark(UnbookmarkPoiAction),
    /// Reorder a bookmark.
    MoveBookmark(MovePoiBookmarkAction),
    /// The caller's bookmarks in list order.
    ListBookmarks,
    /// The caller's ratings by POI id.
    ListRatings,
}

macro_rules! action_from {
    ($($payload:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for Action {
                fn from(action: $payload) -> Self {
                    Self::$variant(action)
                }
            }
        )*
    };
}

action_from! {
    SearchAction => Search,
    RatePoiAction => Rate,
    UnratePoiAction => Unrate,
    BookmarkPoiAction => Bookmark,
    UnbookmarkPoiAction => Unbookmark,
    MovePoiBookmarkAction => MoveBookmark,
}

/// Result of a dispatched action.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "outcome", rename_all = "snake_case"))]
pub enum Outcome {
    /// Search hits in result order.
    Results {
        /// Matching POIs.
        pois: Vec<AnnotatedPoi>,
    },
    /// The stored rating.
    Rated {
        /// Rating after clamping.
        rating: Rating,
    },
    /// Whether a rating was removed.
    Unrated {
        /// `false` when there was nothing to remove.
        removed: bool,
    },
    /// The caller's bookmark for the POI.
    Bookmarked {
        /// New or existing bookmark.
        bookmark: Bookmark,
        /// `false` when the POI was already bookmarked.
        created: bool,
    },
    /// Whether a bookmark was removed.
    Unbookmarked {
        /// `false` when there was nothing to remove.
        removed: bool,
    },
    /// The moved bookmark at its new order.
    Moved {
        /// Bookmark after the move.
        bookmark: Bookmark,
    },
    /// The caller's bookmarks.
    Bookmarks {
        /// Bookmarks in list order.
        bookmarks: Vec<Bookmark>,
    },
    /// The caller's ratings.
    Ratings {
        /// Ratings by POI id.
        ratings: Vec<Rating>,
    },
}

/// Errors returned by [`Dispatcher::dispatch`].
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action needs a caller but none was supplied.
    #[error("this action requires an authenticated user")]
    AuthenticationRequired,
    /// The caller's account is closed.
    #[error("user {0} is inactive")]
    InactiveUser(UserId),
    /// The POI does not exist or was deleted.
    #[error("POI {0} not found")]
    PoiNotFound(PoiId),
    /// The search was rejected.
    #[error(transparent)]
    Search(#[from] SearchError),
    /// The bookmark operation failed.
    #[error(transparent)]
    Bookmark(#[from] BookmarkError),
    /// The backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Routes [`Action`]s to the components backed by one store.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use poimark_core::{
///     BookmarkPoiAction, Dispatcher, MemoryStore, Outcome, PoiId, PointOfInterest,
///     RegionCatalog, User, UserId,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::with_pois([PointOfInterest::new(
///     PoiId(1),
///     "Lighthouse",
///     Coord { x: -9.5, y: 38.7 },
/// )?]);
/// let regions = RegionCatalog::new();
/// let user = User::new(UserId(1), "ana")?;
///
/// let outcome = Dispatcher::new(&store, &regions)
///     .dispatch(Some(&user), BookmarkPoiAction { poi: PoiId(1) }.into())?;
/// assert!(matches!(outcome, Outcome::Bookmarked { created: true, .. }));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Dispatcher<'a, S: ?Sized> {
    store: &'a S,
    regions: &'a RegionCatalog,
}

impl<'a, S> Dispatcher<'a, S>
where
    S: PoiStore + BookmarkStore + RatingStore + ?Sized,
{
    /// Dispatch against `store`, resolving region ids through `regions`.
    pub const fn new(store: &'a S, regions: &'a RegionCatalog) -> Self {
        Self { store, regions }
    }

    /// Run `action` on behalf of `caller`. Only searches accept an anonymous
    /// caller. Rating and bookmarking need a visible POI; removals and moves
    /// also reach rows whose POI was deleted since.
    pub fn dispatch(&self, caller: Option<&User>, action: Action) -> Result<Outcome, ActionError> {
        let outcome = match action {
            Action::Search(SearchAction { query }) => self.search(caller, &query)?,
            Action::Rate(RatePoiAction { poi, score }) => {
                let user = active(caller)?;
                self.require_visible(poi)?;
                Outcome::Rated {
                    rating: rate(self.store, user, poi, score)?,
                }
            }
            Action::Unrate(UnratePoiAction { poi }) => {
                let user = active(caller)?;
                Outcome::Unrated {
                    removed: unrate(self.store, user, poi)?,
                }
            }
            Action::Bookmark(BookmarkPoiAction { poi }) => {
                let user = active(caller)?;
                self.require_visible(poi)?;
                let (bookmark, created) = self.bookmarks().bookmark(user, poi)?;
                Outcome::Bookmarked { bookmark, created }
            }
            Action::Unbookmark(UnbookmarkPoiAction { poi }) => {
                let user = active(caller)?;
                Outcome::Unbookmarked {
                    removed: self.bookmarks().unbookmark(user, poi)?,
                }
            }
            Action::MoveBookmark(MovePoiBookmarkAction { poi, before }) => {
                let user = active(caller)?;
                Outcome::Moved {
                    bookmark: self.bookmarks().move_before(user, poi, before)?,
                }
            }
            Action::ListBookmarks => Outcome::Bookmarks {
                bookmarks: self.bookmarks().list(active(caller)?)?,
            },
            Action::ListRatings => Outcome::Ratings {
                ratings: self.store.ratings_of(active(caller)?)?,
            },
        };
        Ok(outcome)
    }

    fn search(&self, caller: Option<&User>, query: &SearchQuery) -> Result<Outcome, ActionError> {
        let scope = match caller {
            Some(_) if query.needs_personal_scope() => Some(self.personal_scope(active(caller)?)?),
            _ => None,
        };
        let pois = SpatialSearch::new(self.store).search(query, self.regions, scope.as_ref())?;
        debug!("search returned {} POIs", pois.len());
        Ok(Outcome::Results { pois })
    }

    fn personal_scope(&self, user: UserId) -> Result<PersonalScope, ActionError> {
        let bookmarked: HashSet<PoiId> = self
            .bookmarks()
            .list(user)?
            .into_iter()
            .map(|bookmark| bookmark.poi)
            .collect();
        let rated = self
            .store
            .ratings_of(user)?
            .into_iter()
            .map(|rating| rating.poi)
            .collect();
        Ok(PersonalScope { bookmarked, rated })
    }

    fn require_visible(&self, poi: PoiId) -> Result<(), ActionError> {
        match self.store.get_poi(poi) {
            Some(found) if found.is_visible() => Ok(()),
            _ => Err(ActionError::PoiNotFound(poi)),
        }
    }

    const fn bookmarks(&self) -> Bookmarks<'a, S> {
        Bookmarks::new(self.store)
    }
}

fn active(caller: Option<&User>) -> Result<UserId, ActionError> {
    match caller {
        None => Err(ActionError::AuthenticationRequired),
        Some(user) if !user.is_active => Err(ActionError::InactiveUser(user.id)),
        Some(user) => Ok(user.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, PointOfInterest};
    use geo::Coord;
    use rstest::{fixture, rstest};

    fn poi(id: u64, x: f64) -> PointOfInterest {
        PointOfInterest::new(PoiId(id), format!("poi {id}"), Coord { x, y: 0.0 })
            .expect("valid poi")
    }

    #[fixture]
    fn store() -> MemoryStore {
        MemoryStore::with_pois([poi(1, 0.0), poi(2, 0.001), poi(3, 0.002)])
    }

    #[fixture]
    fn ana() -> User {
        User::new(UserId(1), "ana").expect("valid user")
    }

    fn around_origin() -> SearchQuery {
        SearchQuery::around(Coord { x: 0.0, y: 0.0 }, 1_000.0)
    }

    #[rstest]
    fn user_actions_need_a_caller(store: MemoryStore) {
        let regions = RegionCatalog::new();
        let result = Dispatcher::new(&store, &regions).dispatch(None, Action::ListBookmarks);
        assert!(matches!(result, Err(ActionError::AuthenticationRequired)));
    }

    #[rstest]
    fn inactive_users_are_refused(store: MemoryStore, mut ana: User) {
        ana.deactivate();
        let regions = RegionCatalog::new();
        let result = Dispatcher::new(&store, &regions)
            .dispatch(Some(&ana), RatePoiAction { poi: PoiId(1), score: 5 }.into());
        assert!(matches!(result, Err(ActionError::InactiveUser(UserId(1)))));
        assert!(store.ratings_of(ana.id).expect("ratings").is_empty());
    }

    #[rstest]
    fn deleted_pois_cannot_be_bookmarked(store: MemoryStore, ana: User) {
        store.soft_delete_poi(PoiId(2), UserId(9)).expect("delete");
        let regions = RegionCatalog::new();
        let dispatcher = Dispatcher::new(&store, &regions);
        for poi in [PoiId(2), PoiId(404)] {
            let result = dispatcher.dispatch(Some(&ana), BookmarkPoiAction { poi }.into());
            assert!(matches!(result, Err(ActionError::PoiNotFound(id)) if id == poi));
        }
    }

    #[rstest]
    fn rows_for_deleted_pois_can_still_be_removed(store: MemoryStore, ana: User) {
        let regions = RegionCatalog::new();
        let dispatcher = Dispatcher::new(&store, &regions);
        for poi in [PoiId(1), PoiId(2), PoiId(3)] {
            dispatcher
                .dispatch(Some(&ana), BookmarkPoiAction { poi }.into())
                .expect("bookmark");
        }
        dispatcher
            .dispatch(Some(&ana), RatePoiAction { poi: PoiId(2), score: 6 }.into())
            .expect("rate");
        store.soft_delete_poi(PoiId(2), UserId(9)).expect("delete");

        let removed = dispatcher
            .dispatch(Some(&ana), UnbookmarkPoiAction { poi: PoiId(2) }.into())
            .expect("unbookmark a deleted POI");
        assert_eq!(removed, Outcome::Unbookmarked { removed: true });
        let unrated = dispatcher
            .dispatch(Some(&ana), UnratePoiAction { poi: PoiId(2) }.into())
            .expect("unrate a deleted POI");
        assert_eq!(unrated, Outcome::Unrated { removed: true });

        let Outcome::Bookmarks { bookmarks } = dispatcher
            .dispatch(Some(&ana), Action::ListBookmarks)
            .expect("list")
        else {
            panic!("expected a bookmark listing");
        };
        let listed: Vec<(PoiId, u32)> = bookmarks.iter().map(|b| (b.poi, b.order)).collect();
        assert_eq!(listed, vec![(PoiId(1), 1), (PoiId(3), 2)]);
        assert!(store.ratings_of(ana.id).expect("ratings").is_empty());
    }

    #[rstest]
    fn rating_clamps_and_lists(store: MemoryStore, ana: User) {
        let regions = RegionCatalog::new();
        let dispatcher = Dispatcher::new(&store, &regions);
        let rated = dispatcher
            .dispatch(Some(&ana), RatePoiAction { poi: PoiId(1), score: 15 }.into())
            .expect("rate");
        assert!(matches!(rated, Outcome::Rated { rating } if rating.score.get() == 10));

        let listed = dispatcher
            .dispatch(Some(&ana), Action::ListRatings)
            .expect("list");
        assert!(matches!(listed, Outcome::Ratings { ratings } if ratings.len() == 1));

        let removed = dispatcher
            .dispatch(Some(&ana), UnratePoiAction { poi: PoiId(1) }.into())
            .expect("unrate");
        assert_eq!(removed, Outcome::Unrated { removed: true });
    }

    #[rstest]
    fn bookmark_lifecycle(store: MemoryStore, ana: User) {
        let regions = RegionCatalog::new();
        let dispatcher = Dispatcher::new(&store, &regions);
        for poi in [PoiId(1), PoiId(2), PoiId(3)] {
            dispatcher
                .dispatch(Some(&ana), BookmarkPoiAction { poi }.into())
                .expect("bookmark");
        }
        let moved = dispatcher
            .dispatch(
                Some(&ana),
                MovePoiBookmarkAction {
                    poi: PoiId(3),
                    before: Some(PoiId(1)),
                }
                .into(),
            )
            .expect("move");
        assert!(matches!(moved, Outcome::Moved { bookmark } if bookmark.order == 1));

        dispatcher
            .dispatch(Some(&ana), UnbookmarkPoiAction { poi: PoiId(1) }.into())
            .expect("unbookmark");
        let Outcome::Bookmarks { bookmarks } = dispatcher
            .dispatch(Some(&ana), Action::ListBookmarks)
            .expect("list")
        else {
            panic!("expected a bookmark listing");
        };
        let listed: Vec<(PoiId, u32)> = bookmarks.iter().map(|b| (b.poi, b.order)).collect();
        assert_eq!(listed, vec![(PoiId(3), 1), (PoiId(2), 2)]);
    }

    #[rstest]
    fn moving_an_unknown_bookmark_fails(store: MemoryStore, ana: User) {
        let regions = RegionCatalog::new();
        let result = Dispatcher::new(&store, &regions).dispatch(
            Some(&ana),
            MovePoiBookmarkAction {
                poi: PoiId(1),
                before: None,
            }
            .into(),
        );
        assert!(matches!(
            result,
            Err(ActionError::Bookmark(BookmarkError::NotFound { .. }))
        ));
    }

    #[rstest]
    fn anonymous_search_is_allowed(store: MemoryStore) {
        let regions = RegionCatalog::new();
        let outcome = Dispatcher::new(&store, &regions)
            .dispatch(None, SearchAction { query: around_origin() }.into())
            .expect("search");
        assert!(matches!(outcome, Outcome::Results { pois } if pois.len() == 3));
    }

    #[rstest]
    fn anonymous_personal_search_is_rejected(store: MemoryStore) {
        let regions = RegionCatalog::new();
        let result = Dispatcher::new(&store, &regions).dispatch(
            None,
            SearchAction {
                query: around_origin().bookmarked_only(),
            }
            .into(),
        );
        assert!(matches!(
            result,
            Err(ActionError::Search(SearchError::AnonymousPersonalFilter))
        ));
    }

    #[rstest]
    fn personal_search_uses_the_callers_lists(store: MemoryStore, ana: User) {
        let regions = RegionCatalog::new();
        let dispatcher = Dispatcher::new(&store, &regions);
        dispatcher
            .dispatch(Some(&ana), BookmarkPoiAction { poi: PoiId(2) }.into())
            .expect("bookmark");
        let outcome = dispatcher
            .dispatch(
                Some(&ana),
                SearchAction {
                    query: around_origin().bookmarked_only(),
                }
                .into(),
            )
            .expect("search");
        let Outcome::Results { pois } = outcome else {
            panic!("expected search results");
        };
        let ids: Vec<PoiId> = pois.iter().map(|hit| hit.poi.id).collect();
        assert_eq!(ids, vec![PoiId(2)]);
    }
}
