//! Discrete routing tracks.
//!
//! A [`RoutingGrid`](grid::RoutingGrid) describes an alternating stack of routing
//! layers. Each layer carries uniformly spaced tracks indexed by half-integers
//! ([`HalfInt`](half_int::HalfInt)): track `t` on a layer with pitch `p` is centered
//! at `(t + 1/2) * p`, and a wire `w` tracks wide covers tracks
//! `t - (w - 1)/2 ..= t + (w - 1)/2`.
//!
//! The [`TrackManager`](manager::TrackManager) layers typed widths and spacings on
//! top of the grid so that generators can ask for wires by role (`"clk"`, `"sup"`,
//! `"out"`, ...) rather than by raw track counts.
#![warn(missing_docs)]

pub mod error;
pub mod grid;
pub mod half_int;
pub mod manager;
pub mod track;

#[cfg(test)]
mod tests;

pub use error::{GridError, Result};
pub use grid::{LayerId, LayerSpec, RoundingMode, RoutingGrid};
pub use half_int::HalfInt;
pub use manager::{Alignment, TrackManager, TrackTables, TrackType};
pub use track::{TrackId, WireArray};
