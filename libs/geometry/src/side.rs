//! The sides of a rectangle.

use serde::{Deserialize, Serialize};

use crate::dir::Dir;

/// One of the four sides of an axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
pub enum Side {
    /// The left side.
    Left,
    /// The right side.
    Right,
    /// The bottom side.
    Bot,
    /// The top side.
    Top,
}

impl Side {
    /// The direction along which this side is an extremum.
    ///
    /// `Left` and `Right` are extremes of the horizontal coordinate.
    pub const fn coord_dir(&self) -> Dir {
        match self {
            Self::Left | Self::Right => Dir::Horiz,
            Self::Bot | Self::Top => Dir::Vert,
        }
    }

    /// Whether this side is at the upper end of its coordinate.
    pub const fn is_upper(&self) -> bool {
        matches!(self, Self::Right | Self::Top)
    }

    /// The opposite side.
    pub const fn other(&self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Bot => Self::Top,
            Self::Top => Self::Bot,
        }
    }
}
