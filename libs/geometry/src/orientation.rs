//! Orientations of placed layout objects.

use serde::{Deserialize, Serialize};

use crate::point::Point;

/// The four Manhattan orientations used by row-based analog layouts.
///
/// Rotations by 90 degrees are never needed because every row primitive keeps
/// its gates vertical.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// No rotations or reflections.
    #[default]
    R0,
    /// Mirror about the x-axis: `(x, y) -> (x, -y)`.
    MX,
    /// Mirror about the y-axis: `(x, y) -> (-x, y)`.
    MY,
    /// Rotate 180 degrees: `(x, y) -> (-x, -y)`.
    R180,
}

impl Orientation {
    /// Builds an orientation from its two reflection flags.
    pub const fn from_flips(flip_x: bool, flip_y: bool) -> Self {
        match (flip_x, flip_y) {
            (false, false) => Self::R0,
            (false, true) => Self::MX,
            (true, false) => Self::MY,
            (true, true) => Self::R180,
        }
    }

    /// Whether x-coordinates are negated.
    #[inline]
    pub const fn flips_x(&self) -> bool {
        matches!(self, Self::MY | Self::R180)
    }

    /// Whether y-coordinates are negated.
    #[inline]
    pub const fn flips_y(&self) -> bool {
        matches!(self, Self::MX | Self::R180)
    }

    /// Applies `other` after `self`.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// assert_eq!(Orientation::MX.then(Orientation::MY), Orientation::R180);
    /// assert_eq!(Orientation::MX.then(Orientation::MX), Orientation::R0);
    /// ```
    pub const fn then(self, other: Self) -> Self {
        Self::from_flips(
            self.flips_x() ^ other.flips_x(),
            self.flips_y() ^ other.flips_y(),
        )
    }

    /// Returns this orientation additionally mirrored about the x-axis.
    pub const fn mirrored_x(self) -> Self {
        self.then(Self::MX)
    }

    /// Returns this orientation additionally mirrored about the y-axis.
    pub const fn mirrored_y(self) -> Self {
        self.then(Self::MY)
    }

    /// Applies the orientation to a point about the origin.
    pub const fn apply(&self, p: Point) -> Point {
        Point::new(
            if self.flips_x() { -p.x } else { p.x },
            if self.flips_y() { -p.y } else { p.y },
        )
    }

    /// Every orientation is its own inverse.
    pub const fn inverse(self) -> Self {
        self
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::R0 => "R0",
            Self::MX => "MX",
            Self::MY => "MY",
            Self::R180 => "R180",
        };
        write!(f, "{s}")
    }
}
