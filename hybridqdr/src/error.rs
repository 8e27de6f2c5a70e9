//! Error types and error handling utilities.

use std::sync::Arc;

use arcstr::ArcStr;
use routing::{GridError, HalfInt, LayerId};

/// A result type returning generator errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type for layout generators.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// Generator parameters are missing, inconsistent, or out of range.
    #[error("invalid configuration: {0}")]
    Config(ArcStr),
    /// A routing grid query failed.
    #[error(transparent)]
    Geometry(#[from] GridError),
    /// An instance or device could not be placed where requested.
    #[error("invalid placement: {0}")]
    Placement(ArcStr),
    /// Two instances or devices occupy the same area.
    #[error("{new} overlaps {existing}")]
    CellOverlap {
        /// The object being placed.
        new: ArcStr,
        /// The object already occupying the area.
        existing: ArcStr,
    },
    /// A net was referenced before any wire was drawn on it.
    #[error("net `{0}` has no wires in this template")]
    UnknownNet(ArcStr),
    /// A port lookup failed.
    #[error("no port named `{0}`")]
    UnknownPort(ArcStr),
    /// Wires could not be connected as requested.
    #[error("routing error: {0}")]
    Routing(ArcStr),
    /// A shielded bias bundle does not fit in its lane.
    #[error("bias routes on layer {layer} need {needed} tracks but only {available} are available")]
    NoRoomForBiasRoutes {
        /// The routing layer of the bundle.
        layer: LayerId,
        /// Tracks needed by the bundle, including shields.
        needed: HalfInt,
        /// Tracks available in the lane.
        available: HalfInt,
    },
    /// A route would cross an area reserved by an earlier route.
    #[error("{what} on layer {layer} collides with an existing blockage")]
    BlockageCollision {
        /// The routing layer.
        layer: LayerId,
        /// A description of the new route.
        what: ArcStr,
    },
    /// Two collinear wire ends are closer than the line-end space rule allows.
    #[error("line-end gap of {gap} on layer {layer} is smaller than the required {required}")]
    LineEndSpace {
        /// The routing layer.
        layer: LayerId,
        /// The actual gap.
        gap: i64,
        /// The minimum line-end space.
        required: i64,
    },
    /// An internal error that indicates a bug in a generator.
    #[error("internal error: {0}")]
    Invariant(ArcStr),
    /// A configuration file could not be parsed.
    #[error("error parsing configuration: {0}")]
    Yaml(#[from] Arc<serde_yaml::Error>),
    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] Arc<std::io::Error>),
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(Arc::new(value))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl Error {
    /// Creates a [`Error::Config`] from anything printable.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(ArcStr::from(msg.to_string()))
    }

    /// Creates a [`Error::Placement`] from anything printable.
    pub fn placement(msg: impl std::fmt::Display) -> Self {
        Self::Placement(ArcStr::from(msg.to_string()))
    }

    /// Creates a [`Error::Routing`] from anything printable.
    pub fn routing(msg: impl std::fmt::Display) -> Self {
        Self::Routing(ArcStr::from(msg.to_string()))
    }

    /// Creates a [`Error::Invariant`] from anything printable.
    pub fn invariant(msg: impl std::fmt::Display) -> Self {
        Self::Invariant(ArcStr::from(msg.to_string()))
    }
}
