//! Placement transformations.

use serde::{Deserialize, Serialize};

use crate::dir::Dir;
use crate::orientation::Orientation;
use crate::point::Point;
use crate::rect::Rect;
use crate::span::Span;

/// A Manhattan transformation: an orientation about the origin followed by a translation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transformation {
    offset: Point,
    orientation: Orientation,
}

impl Transformation {
    /// The identity transformation.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Creates a transformation that orients about the origin then moves it to `offset`.
    pub fn from_offset_and_orientation(offset: Point, orientation: Orientation) -> Self {
        Self {
            offset,
            orientation,
        }
    }

    /// A pure translation.
    pub fn from_offset(offset: Point) -> Self {
        Self::from_offset_and_orientation(offset, Orientation::R0)
    }

    /// The translation applied after orienting.
    #[inline]
    pub fn offset_point(&self) -> Point {
        self.offset
    }

    /// The orientation component.
    #[inline]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Applies the transformation to a point.
    pub fn apply_point(&self, p: Point) -> Point {
        self.orientation.apply(p) + self.offset
    }

    /// Applies the transformation to a rectangle.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let tf = Transformation::from_offset_and_orientation(Point::new(0, 100), Orientation::MX);
    /// let r = Rect::from_sides(0, 0, 50, 100);
    /// assert_eq!(tf.apply_rect(r), Rect::from_sides(0, 0, 50, 100));
    /// ```
    pub fn apply_rect(&self, r: Rect) -> Rect {
        Rect::new(
            self.apply_point(r.lower_left()),
            self.apply_point(r.upper_right()),
        )
    }

    /// Applies the transformation to a span of coordinates along `dir`.
    pub fn apply_span(&self, span: Span, dir: Dir) -> Span {
        let flipped = match dir {
            Dir::Horiz => self.orientation.flips_x(),
            Dir::Vert => self.orientation.flips_y(),
        };
        let span = if flipped { span.negate() } else { span };
        span.translate(self.offset.coord(dir))
    }

    /// Applies the transformation to a single coordinate along `dir`.
    pub fn apply_coord(&self, coord: i64, dir: Dir) -> i64 {
        self.apply_span(Span::from_point(coord), dir).start()
    }

    /// Returns the transformation equivalent to applying `child`, then `parent`.
    pub fn cascade(parent: Transformation, child: Transformation) -> Transformation {
        Self {
            offset: parent.apply_point(child.offset),
            orientation: child.orientation.then(parent.orientation),
        }
    }

    /// The inverse transformation.
    pub fn inv(&self) -> Transformation {
        let orientation = self.orientation.inverse();
        Self {
            offset: -orientation.apply(self.offset),
            orientation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_and_inverse() {
        let parent = Transformation::from_offset_and_orientation(Point::new(100, 0), Orientation::MY);
        let child = Transformation::from_offset_and_orientation(Point::new(10, 20), Orientation::MX);
        let tf = Transformation::cascade(parent, child);
        let p = Point::new(3, 4);
        assert_eq!(tf.apply_point(p), parent.apply_point(child.apply_point(p)));
        assert_eq!(tf.orientation(), Orientation::R180);
        assert_eq!(tf.inv().apply_point(tf.apply_point(p)), p);
    }

    #[test]
    fn span_transform_flips() {
        let tf = Transformation::from_offset_and_orientation(Point::new(500, 0), Orientation::MY);
        assert_eq!(
            tf.apply_span(Span::new(100, 200), Dir::Horiz),
            Span::new(300, 400)
        );
        assert_eq!(tf.apply_span(Span::new(100, 200), Dir::Vert), Span::new(100, 200));
    }
}
