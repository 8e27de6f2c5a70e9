//! 2-D Manhattan geometry for grid-based layout generation.
//!
//! All coordinates are integers in the resolution unit of the routing grid.
//!
//! # Examples
//!
//! Create a [rectangle](crate::rect::Rect):
//!
//! ```
//! # use geometry::prelude::*;
//! let rect = Rect::from_sides(10, 20, 30, 40);
//! assert_eq!(rect.width(), 20);
//! ```
#![warn(missing_docs)]

extern crate self as geometry;

pub mod dir;
pub mod orientation;
pub mod point;
pub mod prelude;
pub mod rect;
pub mod side;
pub mod span;
pub mod transform;
