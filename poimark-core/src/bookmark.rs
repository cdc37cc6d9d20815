//! Per-user ordered bookmark lists.
//!
//! Each user's bookmarks carry a persisted `order` that is kept dense: for a
//! user with `N` bookmarks the orders are exactly `1..=N`. Appends take
//! `N + 1`, removals close the gap, and moves pop the bookmark out (order 0),
//! close the gap, then reopen a slot where it lands.
//!
//! Every mutation runs inside [`BookmarkStore::with_user_bookmarks`], which
//! serialises work per user and only publishes changes when the closure
//! succeeds. The density check runs before the scope is left, so a broken
//! list aborts the whole operation instead of being persisted.

use log::{debug, error, warn};
use thiserror::Error;

use crate::{PoiId, StoreError, UserId};

/// A user's saved reference to a POI and its position in their list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bookmark {
    /// Owner of the bookmark.
    pub user: UserId,
    /// Bookmarked POI.
    pub poi: PoiId,
    /// 1-based position in the owner's list.
    pub order: u32,
}

/// Errors raised by [`Bookmarks`].
#[derive(Debug, Error)]
pub enum BookmarkError {
    /// The user has not bookmarked the POI.
    #[error("user {user} has no bookmark for POI {poi}")]
    NotFound {
        /// Owner whose list was searched.
        user: UserId,
        /// POI that was not bookmarked.
        poi: PoiId,
    },
    /// A move referenced a bookmark owned by someone other than the caller.
    #[error("user {caller} cannot move bookmarks owned by user {owner}")]
    CrossOwnerReference {
        /// User requesting the move.
        caller: UserId,
        /// Owner of the offending bookmark.
        owner: UserId,
    },
    /// Stored orders were not exactly `1..=N`. Indicates a bug; nothing was
    /// written.
    #[error("bookmark orders for user {user} are not dense: {orders:?}")]
    InvariantViolation {
        /// Owner of the corrupt list.
        user: UserId,
        /// Orders found, ascending.
        orders: Vec<u32>,
    },
    /// The backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One user's bookmark rows, as seen inside a [`BookmarkStore`] scope.
///
/// Shift operations never touch the row parked at order 0.
pub trait BookmarkRows {
    /// Owner of the rows.
    fn user(&self) -> UserId;

    /// Bookmark for `poi`, if any.
    fn get(&self, poi: PoiId) -> Result<Option<Bookmark>, StoreError>;

    /// All bookmarks, ascending by order.
    fn list(&self) -> Result<Vec<Bookmark>, StoreError>;

    /// Highest order held, or 0 for an empty list.
    fn max_order(&self) -> Result<u32, StoreError>;

    /// Create a bookmark. Fails if the POI or order is already taken.
    fn insert(&mut self, poi: PoiId, order: u32) -> Result<Bookmark, StoreError>;

    /// Delete the bookmark for `poi`.
    fn delete(&mut self, poi: PoiId) -> Result<(), StoreError>;

    /// Reassign the order of the bookmark for `poi`.
    fn set_order(&mut self, poi: PoiId, order: u32) -> Result<(), StoreError>;

    /// Decrement every order greater than `above`.
    fn shift_down_above(&mut self, above: u32) -> Result<(), StoreError>;

    /// Increment every order greater than or equal to `from`.
    fn shift_up_from(&mut self, from: u32) -> Result<(), StoreError>;
}

/// Backend holding bookmark rows.
pub trait BookmarkStore {
    /// Run `work` against `user`'s rows with exclusive access.
    ///
    /// Implementations must hold a per-user lock or an equivalent
    /// serialisable transaction from the first read to the last write, and
    /// must discard every change when `work` returns an error.
    fn with_user_bookmarks<T, F>(&self, user: UserId, work: F) -> Result<T, BookmarkError>
    where
        F: FnOnce(&mut dyn BookmarkRows) -> Result<T, BookmarkError>;

    /// `user`'s bookmarks ascending by order, read outside any write scope.
    fn list_bookmarks(&self, user: UserId) -> Result<Vec<Bookmark>, StoreError>;
}

/// Ordered bookmark list operations over a [`BookmarkStore`].
///
/// # Examples
/// ```
/// use poimark_core::{Bookmarks, MemoryStore, PoiId, UserId};
///
/// # fn main() -> Result<(), poimark_core::BookmarkError> {
/// let store = MemoryStore::default();
/// let bookmarks = Bookmarks::new(&store);
/// let user = UserId(1);
///
/// for poi in [PoiId(10), PoiId(20), PoiId(30)] {
///     bookmarks.bookmark(user, poi)?;
/// }
/// bookmarks.move_before(user, PoiId(30), Some(PoiId(10)))?;
///
/// let order: Vec<_> = bookmarks.list(user)?.iter().map(|b| b.poi).collect();
/// assert_eq!(order, vec![PoiId(30), PoiId(10), PoiId(20)]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Bookmarks<'s, S: ?Sized> {
    store: &'s S,
}

impl<S: ?Sized> Clone for Bookmarks<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for Bookmarks<'_, S> {}

impl<'s, S> Bookmarks<'s, S>
where
    S: BookmarkStore + ?Sized,
{
    /// Wrap a store.
    pub const fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Append `poi` to `user`'s list.
    ///
    /// Returns the existing bookmark unchanged with `false` when the POI is
    /// already bookmarked, otherwise the new bookmark at order `N + 1` with
    /// `true`.
    pub fn bookmark(&self, user: UserId, poi: PoiId) -> Result<(Bookmark, bool), BookmarkError> {
        self.store.with_user_bookmarks(user, |rows| {
            if let Some(existing) = rows.get(poi)? {
                return Ok((existing, false));
            }
            let order = rows.max_order()?.saturating_add(1);
            let created = rows.insert(poi, order)?;
            ensure_dense(rows)?;
            debug!("user {user} bookmarked POI {poi} at order {order}");
            Ok((created, true))
        })
    }

    /// Remove `poi` from `user`'s list and close the gap.
    ///
    /// Returns `false` when the POI was not bookmarked.
    pub fn unbookmark(&self, user: UserId, poi: PoiId) -> Result<bool, BookmarkError> {
        self.store.with_user_bookmarks(user, |rows| {
            let Some(existing) = rows.get(poi)? else {
                return Ok(false);
            };
            rows.delete(poi)?;
            rows.shift_down_above(existing.order)?;
            ensure_dense(rows)?;
            debug!(
                "user {user} removed bookmark for POI {poi} from order {}",
                existing.order
            );
            Ok(true)
        })
    }

    /// Move `bookmark` immediately before `before`, or to the end of the list
    /// when `before` is `None`.
    ///
    /// Both bookmarks must belong to `caller`; otherwise nothing is touched and
    /// [`BookmarkError::CrossOwnerReference`] is returned. The passed values are
    /// only used for ownership and identity: current orders are re-read from
    /// the store.
    pub fn move_bookmark(
        &self,
        caller: UserId,
        bookmark: &Bookmark,
        before: Option<&Bookmark>,
    ) -> Result<Bookmark, BookmarkError> {
        for owner in std::iter::once(bookmark.user).chain(before.map(|b| b.user)) {
            if owner != caller {
                warn!("user {caller} tried to move a bookmark owned by user {owner}");
                return Err(BookmarkError::CrossOwnerReference { caller, owner });
            }
        }
        self.move_before(caller, bookmark.poi, before.map(|b| b.poi))
    }

    /// Move the bookmark for `poi` immediately before the bookmark for
    /// `before`, or to the end when `before` is `None`.
    ///
    /// Moving a bookmark before itself leaves the list unchanged.
    pub fn move_before(
        &self,
        user: UserId,
        poi: PoiId,
        before: Option<PoiId>,
    ) -> Result<Bookmark, BookmarkError> {
        self.store.with_user_bookmarks(user, |rows| {
            let moving = require(rows, poi)?;
            let order = match before {
                Some(target) if target == poi => return Ok(moving),
                None => {
                    pop_out(rows, &moving)?;
                    rows.max_order()?.saturating_add(1)
                }
                Some(target) => {
                    require(rows, target)?;
                    pop_out(rows, &moving)?;
                    // The pop may have shifted the target; read it again.
                    let anchor = require(rows, target)?;
                    rows.shift_up_from(anchor.order)?;
                    anchor.order
                }
            };
            rows.set_order(poi, order)?;
            ensure_dense(rows)?;
            debug!(
                "user {user} moved bookmark for POI {poi} from order {} to {order}",
                moving.order
            );
            require(rows, poi)
        })
    }

    /// `user`'s bookmarks in list order.
    pub fn list(&self, user: UserId) -> Result<Vec<Bookmark>, BookmarkError> {
        Ok(self.store.list_bookmarks(user)?)
    }
}

fn require(rows: &dyn BookmarkRows, poi: PoiId) -> Result<Bookmark, BookmarkError> {
    rows.get(poi)?.ok_or(BookmarkError::NotFound {
        user: rows.user(),
        poi,
    })
}

/// Park `bookmark` at order 0 and close the gap it leaves.
fn pop_out(rows: &mut dyn BookmarkRows, bookmark: &Bookmark) -> Result<(), BookmarkError> {
    rows.set_order(bookmark.poi, 0)?;
    rows.shift_down_above(bookmark.order)?;
    Ok(())
}

fn ensure_dense(rows: &dyn BookmarkRows) -> Result<(), BookmarkError> {
    let orders: Vec<u32> = rows.list()?.iter().map(|bookmark| bookmark.order).collect();
    if is_dense(&orders) {
        return Ok(());
    }
    let user = rows.user();
    error!("bookmark orders for user {user} lost density: {orders:?}");
    Err(BookmarkError::InvariantViolation { user, orders })
}

/// Whether ascending `orders` are exactly `1..=len`.
pub(crate) fn is_dense(orders: &[u32]) -> bool {
    orders
        .iter()
        .zip(1_u32..)
        .all(|(order, expected)| *order == expected)
}
