//! Soft-deletion visibility rule.
//!
//! Records are never physically removed while something references them.
//! Instead they carry a [`Deletion`] marker, and every read path filters them
//! out with [`VisibleExt::visible`] before applying any other predicate.

use crate::UserId;

/// Soft-deletion state carried by POIs and regions.
///
/// A record counts as deleted when either the flag is set or a deleter is
/// recorded. Both are set together by [`Deletion::mark`], but rows loaded from
/// storage may disagree and are treated as deleted in that case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Deletion {
    /// Logical deletion flag.
    #[cfg_attr(feature = "serde", serde(default))]
    pub deleted: bool,
    /// User responsible for the deletion, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub deleted_by: Option<UserId>,
}

impl Deletion {
    /// State of a record that has not been deleted.
    #[must_use]
    pub const fn active() -> Self {
        Self {
            deleted: false,
            deleted_by: None,
        }
    }

    /// Mark the record as deleted by `by`.
    pub const fn mark(&mut self, by: UserId) {
        self.deleted = true;
        self.deleted_by = Some(by);
    }

    /// Whether the record should be returned by read paths.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.deleted && self.deleted_by.is_none()
    }
}

/// Records that can be logically deleted.
pub trait SoftDeletable {
    /// Current deletion state.
    fn deletion(&self) -> Deletion;

    /// Whether the record passes the visibility rule.
    fn is_visible(&self) -> bool {
        self.deletion().is_visible()
    }
}

impl<T: SoftDeletable + ?Sized> SoftDeletable for &T {
    fn deletion(&self) -> Deletion {
        (**self).deletion()
    }
}

/// Iterator adaptor yielding only visible records.
#[derive(Debug, Clone)]
pub struct Visible<I> {
    inner: I,
}

impl<I> Iterator for Visible<I>
where
    I: Iterator,
    I::Item: SoftDeletable,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.find(SoftDeletable::is_visible)
    }
}

/// Adds [`visible`](VisibleExt::visible) to every iterator.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use poimark_core::{PointOfInterest, PoiId, UserId, VisibleExt};
///
/// let kept = PointOfInterest::new(PoiId(1), "Harbour", Coord { x: 0.0, y: 0.0 }).unwrap();
/// let mut gone = PointOfInterest::new(PoiId(2), "Old mill", Coord { x: 0.0, y: 0.0 }).unwrap();
/// gone.deletion.mark(UserId(9));
///
/// let ids: Vec<_> = [kept, gone].iter().visible().map(|poi| poi.id).collect();
/// assert_eq!(ids, vec![PoiId(1)]);
/// ```
pub trait VisibleExt: Iterator + Sized {
    /// Drop every logically deleted record.
    fn visible(self) -> Visible<Self>
    where
        Self::Item: SoftDeletable,
    {
        Visible { inner: self }
    }
}

impl<I: Iterator> VisibleExt for I {}
