//! Routing grid errors.

use arcstr::ArcStr;
use geometry::dir::Dir;

use crate::grid::LayerId;
use crate::half_int::HalfInt;

/// A result type returning [`GridError`]s.
pub type Result<T, E = GridError> = std::result::Result<T, E>;

/// An error raised by track arithmetic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// The layer does not exist in the grid.
    #[error("layer {0} is not part of the routing grid")]
    UnknownLayer(LayerId),
    /// A coordinate cannot be represented on the grid.
    #[error("coordinate {coord} on layer {layer} is outside the representable range")]
    OutOfRange {
        /// The layer being queried.
        layer: LayerId,
        /// The offending coordinate.
        coord: i64,
    },
    /// A track index cannot be represented on the grid.
    #[error("track {idx} on layer {layer} is outside the representable range")]
    TrackOutOfRange {
        /// The layer being queried.
        layer: LayerId,
        /// The offending track index.
        idx: HalfInt,
    },
    /// A coordinate does not fall on a track or half track.
    #[error("coordinate {coord} is not on the half-track grid of layer {layer}")]
    OffGrid {
        /// The layer being queried.
        layer: LayerId,
        /// The offending coordinate.
        coord: i64,
    },
    /// A layer routes in the wrong direction.
    #[error("layer {layer} routes {found} wires but {expected} was required")]
    DirectionMismatch {
        /// The layer being queried.
        layer: LayerId,
        /// The required routing direction.
        expected: Dir,
        /// The layer's routing direction.
        found: Dir,
    },
    /// Two layers that must be connected by a via are not adjacent.
    #[error("layers {0} and {1} are not adjacent; no via can connect them")]
    NonAdjacentLayers(LayerId, LayerId),
    /// A track slot is too small for the requested wires.
    #[error("need {needed} tracks on layer {layer} but only {available} are available")]
    InsufficientSpace {
        /// The layer being queried.
        layer: LayerId,
        /// The minimum number of tracks needed.
        needed: HalfInt,
        /// The number of tracks available.
        available: HalfInt,
    },
    /// A layer or wire has an invalid width.
    #[error("invalid geometry on layer {layer}: {reason}")]
    InvalidWidth {
        /// The layer being queried.
        layer: LayerId,
        /// A description of the violated rule.
        reason: ArcStr,
    },
}
