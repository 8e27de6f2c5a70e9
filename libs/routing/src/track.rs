//! Tracks and the wires drawn on them.

use geometry::rect::Rect;
use geometry::span::Span;
use geometry::transform::Transformation;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::{LayerId, RoutingGrid};
use crate::half_int::HalfInt;

/// A set of evenly spaced tracks of equal width on a single layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TrackId {
    layer: LayerId,
    base: HalfInt,
    width: u32,
    num: u32,
    pitch: HalfInt,
}

impl TrackId {
    /// A single track `width` tracks wide centered on `idx`.
    pub fn new(layer: LayerId, idx: HalfInt, width: u32) -> Self {
        Self {
            layer,
            base: idx,
            width: width.max(1),
            num: 1,
            pitch: HalfInt::ZERO,
        }
    }

    /// A bus of `num` tracks starting at `base` with the given pitch.
    pub fn bus(layer: LayerId, base: HalfInt, width: u32, num: u32, pitch: HalfInt) -> Self {
        let num = num.max(1);
        Self {
            layer,
            base,
            width: width.max(1),
            num,
            pitch: if num == 1 { HalfInt::ZERO } else { pitch },
        }
    }

    /// The layer of the tracks.
    #[inline]
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// The index of the first track.
    #[inline]
    pub fn base_index(&self) -> HalfInt {
        self.base
    }

    /// The width of each track, in tracks.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The number of tracks.
    #[inline]
    pub fn num(&self) -> u32 {
        self.num
    }

    /// The distance between adjacent tracks of the bus.
    #[inline]
    pub fn pitch(&self) -> HalfInt {
        self.pitch
    }

    /// Iterates over the track indices.
    pub fn indices(&self) -> impl Iterator<Item = HalfInt> + '_ {
        (0..self.num as i64).map(|i| self.base + self.pitch * i)
    }

    /// The center track of the set.
    pub fn middle(&self) -> HalfInt {
        self.base + (self.pitch * (self.num as i64 - 1)).div2(false)
    }

    /// The index of the lowest-numbered track.
    pub fn lower_index(&self) -> HalfInt {
        self.indices().min().unwrap_or(self.base)
    }

    /// The index of the highest-numbered track.
    pub fn upper_index(&self) -> HalfInt {
        self.indices().max().unwrap_or(self.base)
    }

    /// The coordinates of the outer edges of the set, perpendicular to the layer direction.
    pub fn bounds(&self, grid: &RoutingGrid) -> Result<Span> {
        let (lo, _) = grid.get_wire_bounds(self.layer, self.lower_index(), self.width)?;
        let (_, hi) = grid.get_wire_bounds(self.layer, self.upper_index(), self.width)?;
        Ok(Span::new(lo, hi))
    }

    /// Applies a placement transformation to the tracks.
    pub fn transform(&self, grid: &RoutingGrid, tf: &Transformation) -> Result<Self> {
        let base = grid.transform_track(self.layer, self.base, tf)?;
        let next = grid.transform_track(self.layer, self.base + self.pitch, tf)?;
        Ok(Self {
            base,
            pitch: next - base,
            ..*self
        })
    }
}

/// Wires drawn on a [`TrackId`] over the interval `[lower, upper]`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WireArray {
    track_id: TrackId,
    lower: i64,
    upper: i64,
}

impl WireArray {
    /// Creates a new [`WireArray`].
    pub fn new(track_id: TrackId, lower: i64, upper: i64) -> Self {
        Self {
            track_id,
            lower: lower.min(upper),
            upper: lower.max(upper),
        }
    }

    /// The tracks the wires are drawn on.
    #[inline]
    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    /// The layer of the wires.
    #[inline]
    pub fn layer(&self) -> LayerId {
        self.track_id.layer
    }

    /// The lower end of the wires.
    #[inline]
    pub fn lower(&self) -> i64 {
        self.lower
    }

    /// The upper end of the wires.
    #[inline]
    pub fn upper(&self) -> i64 {
        self.upper
    }

    /// The extent of the wires along the layer direction.
    #[inline]
    pub fn span(&self) -> Span {
        Span::new(self.lower, self.upper)
    }

    /// The length of the wires.
    #[inline]
    pub fn length(&self) -> i64 {
        self.upper - self.lower
    }

    /// The center of the wires along the layer direction.
    #[inline]
    pub fn middle(&self) -> i64 {
        self.span().center()
    }

    /// The same tracks drawn over a different interval.
    pub fn with_span(&self, span: Span) -> Self {
        Self::new(self.track_id, span.start(), span.stop())
    }

    /// Splits a bus into one [`WireArray`] per track.
    pub fn to_warr_list(&self) -> Vec<WireArray> {
        self.track_id
            .indices()
            .map(|idx| {
                WireArray::new(
                    TrackId::new(self.layer(), idx, self.track_id.width),
                    self.lower,
                    self.upper,
                )
            })
            .collect()
    }

    /// The bounding box of all wires in the array.
    pub fn bbox(&self, grid: &RoutingGrid) -> Result<Rect> {
        let dir = grid.dir(self.layer())?;
        let perp = self.track_id.bounds(grid)?;
        Ok(Rect::from_dir_spans(dir, self.span(), perp))
    }

    /// Applies a placement transformation to the wires.
    pub fn transform(&self, grid: &RoutingGrid, tf: &Transformation) -> Result<Self> {
        let dir = grid.dir(self.layer())?;
        let span = tf.apply_span(self.span(), dir);
        Ok(Self::new(
            self.track_id.transform(grid, tf)?,
            span.start(),
            span.stop(),
        ))
    }
}
