//! Axis-aligned rectangles.

use serde::{Deserialize, Serialize};

use crate::dir::Dir;
use crate::point::Point;
use crate::side::Side;
use crate::span::Span;

/// An axis-aligned rectangle, specified by lower-left and upper-right corners.
///
/// Also used as the bounding box (`[xl, yb, xr, yt]`) of instances and templates.
#[derive(
    Debug, Default, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Rect {
    p0: Point,
    p1: Point,
}

impl Rect {
    /// Creates a rectangle with corners `(0, 0), (dx, dy)`.
    pub fn from_size(dx: i64, dy: i64) -> Self {
        Self::from_sides(0, 0, dx, dy)
    }

    /// Creates a rectangle from all 4 sides (left, bottom, right, top).
    ///
    /// The sides are sorted, so swapped inputs produce the same rectangle.
    ///
    /// # Example
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let rect = Rect::from_sides(15, 20, 30, 40);
    /// assert_eq!(rect.left(), 15);
    /// assert_eq!(rect.bot(), 20);
    /// assert_eq!(rect.right(), 30);
    /// assert_eq!(rect.top(), 40);
    /// assert_eq!(Rect::from_sides(30, 40, 15, 20), rect);
    /// ```
    pub fn from_sides(left: i64, bot: i64, right: i64, top: i64) -> Self {
        let h = Span::new(left, right);
        let v = Span::new(bot, top);
        Self::from_spans(h, v)
    }

    /// Creates a rectangle from its lower-left and upper-right corners.
    pub fn new(lower_left: Point, upper_right: Point) -> Self {
        Self::from_sides(lower_left.x, lower_left.y, upper_right.x, upper_right.y)
    }

    /// Creates a rectangle from horizontal and vertical [`Span`]s.
    pub fn from_spans(h: Span, v: Span) -> Self {
        Self {
            p0: Point::new(h.start(), v.start()),
            p1: Point::new(h.stop(), v.stop()),
        }
    }

    /// Creates a rectangle from a span parallel to `dir` and a perpendicular span.
    pub fn from_dir_spans(dir: Dir, parallel: Span, perp: Span) -> Self {
        match dir {
            Dir::Horiz => Self::from_spans(parallel, perp),
            Dir::Vert => Self::from_spans(perp, parallel),
        }
    }

    /// The bottom y-coordinate.
    #[inline]
    pub const fn bot(&self) -> i64 {
        self.p0.y
    }

    /// The top y-coordinate.
    #[inline]
    pub const fn top(&self) -> i64 {
        self.p1.y
    }

    /// The left x-coordinate.
    #[inline]
    pub const fn left(&self) -> i64 {
        self.p0.x
    }

    /// The right x-coordinate.
    #[inline]
    pub const fn right(&self) -> i64 {
        self.p1.x
    }

    /// The coordinate of the given side.
    pub const fn side(&self, side: Side) -> i64 {
        match side {
            Side::Left => self.left(),
            Side::Right => self.right(),
            Side::Bot => self.bot(),
            Side::Top => self.top(),
        }
    }

    /// The horizontal span.
    #[inline]
    pub fn hspan(&self) -> Span {
        Span::new(self.p0.x, self.p1.x)
    }

    /// The vertical span.
    #[inline]
    pub fn vspan(&self) -> Span {
        Span::new(self.p0.y, self.p1.y)
    }

    /// The span along direction `dir`.
    pub fn span(&self, dir: Dir) -> Span {
        match dir {
            Dir::Horiz => self.hspan(),
            Dir::Vert => self.vspan(),
        }
    }

    /// Replaces the span along `dir`.
    pub fn with_span(self, span: Span, dir: Dir) -> Self {
        match dir {
            Dir::Horiz => Self::from_spans(span, self.vspan()),
            Dir::Vert => Self::from_spans(self.hspan(), span),
        }
    }

    /// The width.
    #[inline]
    pub const fn width(&self) -> i64 {
        self.p1.x - self.p0.x
    }

    /// The height.
    #[inline]
    pub const fn height(&self) -> i64 {
        self.p1.y - self.p0.y
    }

    /// The length along `dir`.
    pub const fn length(&self, dir: Dir) -> i64 {
        match dir {
            Dir::Horiz => self.width(),
            Dir::Vert => self.height(),
        }
    }

    /// The lower-left corner.
    #[inline]
    pub const fn lower_left(&self) -> Point {
        self.p0
    }

    /// The upper-right corner.
    #[inline]
    pub const fn upper_right(&self) -> Point {
        self.p1
    }

    /// The center, rounded towards negative infinity.
    pub const fn center(&self) -> Point {
        Point::new(
            (self.p0.x + self.p1.x).div_euclid(2),
            (self.p0.y + self.p1.y).div_euclid(2),
        )
    }

    /// The smallest rectangle containing both rectangles.
    pub fn union(self, other: Self) -> Self {
        Self::from_spans(
            self.hspan().union(other.hspan()),
            self.vspan().union(other.vspan()),
        )
    }

    /// The union of an iterator of rectangles, or [`None`] if it is empty.
    pub fn union_all(rects: impl IntoIterator<Item = Self>) -> Option<Self> {
        rects.into_iter().reduce(Self::union)
    }

    /// The intersection of two rectangles, if it is not empty.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let h = self.hspan().intersection(other.hspan())?;
        let v = self.vspan().intersection(other.vspan())?;
        Some(Self::from_spans(h, v))
    }

    /// Returns `true` if the interiors of the two rectangles overlap.
    ///
    /// Abutting rectangles do not overlap.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let a = Rect::from_sides(0, 0, 10, 10);
    /// assert!(!a.overlaps(&Rect::from_sides(10, 0, 20, 10)));
    /// assert!(a.overlaps(&Rect::from_sides(9, 9, 20, 20)));
    /// ```
    pub fn overlaps(&self, other: &Self) -> bool {
        self.hspan().overlaps(&other.hspan()) && self.vspan().overlaps(&other.vspan())
    }

    /// Returns `true` if `other` lies entirely within this rectangle.
    pub fn contains_rect(&self, other: &Self) -> bool {
        self.hspan().contains_span(&other.hspan()) && self.vspan().contains_span(&other.vspan())
    }

    /// Shifts the rectangle by `(dx, dy)`.
    pub fn translate(self, dx: i64, dy: i64) -> Self {
        Self {
            p0: self.p0.translate(dx, dy),
            p1: self.p1.translate(dx, dy),
        }
    }

    /// Expands the rectangle by `amount` on both ends of direction `dir`.
    pub fn expand_dir(self, dir: Dir, amount: i64) -> Self {
        self.with_span(self.span(dir).expand(amount, amount), dir)
    }

    /// Expands one side of the rectangle by `amount`.
    pub fn expand_side(self, side: Side, amount: i64) -> Self {
        let dir = side.coord_dir();
        let span = if side.is_upper() {
            self.span(dir).expand(0, amount)
        } else {
            self.span(dir).expand(amount, 0)
        };
        self.with_span(span, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_union_and_expand() {
        let a = Rect::from_sides(0, 0, 100, 200);
        let b = Rect::from_sides(-50, 100, 20, 400);
        assert_eq!(a.union(b), Rect::from_sides(-50, 0, 100, 400));
        assert_eq!(
            a.expand_side(Side::Left, 10),
            Rect::from_sides(-10, 0, 100, 200)
        );
        assert_eq!(
            a.expand_dir(Dir::Vert, 5),
            Rect::from_sides(0, -5, 100, 205)
        );
        assert_eq!(Rect::union_all([a, b]), Some(a.union(b)));
    }
}
