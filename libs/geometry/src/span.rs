//! A one-dimensional span.
//!
//! A span represents the closed interval `[start, stop]`.
use serde::{Deserialize, Serialize};

/// A closed interval of coordinates in one dimension.
///
/// Represents the range `[start, stop]`.
#[derive(
    Debug, Default, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize, PartialEq, Eq,
)]
pub struct Span {
    start: i64,
    stop: i64,
}

impl Span {
    /// Creates a new [`Span`] between two integers.
    ///
    /// The endpoints are sorted, so `Span::new(5, 1)` is the same as `Span::new(1, 5)`.
    pub fn new(start: i64, stop: i64) -> Self {
        use std::cmp::{max, min};
        Self {
            start: min(start, stop),
            stop: max(start, stop),
        }
    }

    /// Creates a span of zero length encompassing the given point.
    pub const fn from_point(x: i64) -> Self {
        Self { start: x, stop: x }
    }

    /// Creates a new [`Span`] with center `center` and length `span`.
    ///
    /// # Example
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let span = Span::from_center_span(0, 40);
    /// assert_eq!(span, Span::new(-20, 20));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `span` is negative or odd.
    pub fn from_center_span(center: i64, span: i64) -> Self {
        assert!(span >= 0);
        assert_eq!(span % 2, 0);
        Self::new(center - span / 2, center + span / 2)
    }

    /// Gets the start of the span.
    #[inline]
    pub const fn start(&self) -> i64 {
        self.start
    }

    /// Gets the stop of the span.
    #[inline]
    pub const fn stop(&self) -> i64 {
        self.stop
    }

    /// Gets the center of the span, rounded towards negative infinity.
    #[inline]
    pub const fn center(&self) -> i64 {
        (self.start + self.stop).div_euclid(2)
    }

    /// Gets the length of the span.
    #[inline]
    pub const fn length(&self) -> i64 {
        self.stop - self.start
    }

    /// Checks if the span intersects with the [`Span`] `other`.
    ///
    /// Spans that only touch at an endpoint intersect.
    #[inline]
    pub const fn intersects(&self, other: &Self) -> bool {
        !(other.stop < self.start || self.stop < other.start)
    }

    /// Checks if the interiors of the two spans overlap.
    ///
    /// Abutting spans do not overlap.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// assert!(Span::new(0, 10).overlaps(&Span::new(9, 20)));
    /// assert!(!Span::new(0, 10).overlaps(&Span::new(10, 20)));
    /// ```
    #[inline]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// Returns `true` if `x` lies in the closed interval.
    #[inline]
    pub const fn contains(&self, x: i64) -> bool {
        self.start <= x && x <= self.stop
    }

    /// Returns `true` if `other` lies entirely within this span.
    #[inline]
    pub const fn contains_span(&self, other: &Self) -> bool {
        self.start <= other.start && other.stop <= self.stop
    }

    /// The smallest span containing both spans.
    pub fn union(self, other: Self) -> Self {
        Self {
            start: std::cmp::min(self.start, other.start),
            stop: std::cmp::max(self.stop, other.stop),
        }
    }

    /// The intersection of two spans, if it is not empty.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let start = std::cmp::max(self.start, other.start);
        let stop = std::cmp::min(self.stop, other.stop);
        (start <= stop).then_some(Self { start, stop })
    }

    /// Creates a new minimal [`Span`] that contains all of the elements of `spans`.
    ///
    /// Returns [`None`] if `spans` is empty.
    pub fn merge(spans: impl IntoIterator<Item = Self>) -> Option<Self> {
        spans.into_iter().reduce(Self::union)
    }

    /// Extends the span so it includes `x`.
    pub fn add_point(self, x: i64) -> Self {
        self.union(Self::from_point(x))
    }

    /// Moves the lower end down by `lower` and the upper end up by `upper`.
    pub fn expand(self, lower: i64, upper: i64) -> Self {
        Self::new(self.start - lower, self.stop + upper)
    }

    /// Shifts the span by `delta`.
    pub const fn translate(self, delta: i64) -> Self {
        Self {
            start: self.start + delta,
            stop: self.stop + delta,
        }
    }

    /// Reflects the span about the origin.
    pub const fn negate(self) -> Self {
        Self {
            start: -self.stop,
            stop: -self.start,
        }
    }
}

impl From<(i64, i64)> for Span {
    fn from(value: (i64, i64)) -> Self {
        Self::new(value.0, value.1)
    }
}

impl From<Span> for (i64, i64) {
    fn from(value: Span) -> Self {
        (value.start, value.stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_merge_and_intersection() {
        let merged = Span::merge([Span::new(10, 20), Span::new(-5, 0), Span::new(30, 31)]);
        assert_eq!(merged, Some(Span::new(-5, 31)));
        assert_eq!(Span::merge(std::iter::empty()), None);
        assert_eq!(
            Span::new(0, 10).intersection(Span::new(5, 15)),
            Some(Span::new(5, 10))
        );
        assert_eq!(Span::new(0, 10).intersection(Span::new(11, 15)), None);
    }

    #[test]
    fn span_negate_and_center() {
        let span = Span::new(-30, 10);
        assert_eq!(span.negate(), Span::new(-10, 30));
        assert_eq!(span.center(), -10);
        assert_eq!(Span::new(-3, 0).center(), -2);
    }
}
