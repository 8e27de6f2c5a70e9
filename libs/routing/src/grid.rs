//! Layered routing grids.
//!
//! Each layer of a [`RoutingGrid`] routes in a single preferred direction. Adjacent
//! layers route in orthogonal directions. Track `t` of a layer with pitch `p` is
//! centered at `(t + 1/2) * p`.
use std::cmp::Ordering;

use arcstr::ArcStr;
use geometry::dir::Dir;
use geometry::transform::Transformation;
use indexmap::IndexMap;
use num::integer::{div_ceil, div_floor};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::half_int::HalfInt;

/// The identifier of a routing layer.
///
/// Higher layers have larger identifiers.
pub type LayerId = usize;

/// Rounding options.
#[derive(Copy, Clone, Eq, PartialEq, Default, Debug, Serialize, Deserialize)]
pub enum RoundingMode {
    /// Round to the nearest number, rounding ties up.
    #[default]
    Nearest,
    /// Round down.
    Down,
    /// Round up.
    Up,
}

impl RoundingMode {
    /// The rounding mode corresponding to `-1`, `0` or `1`.
    pub fn from_sign(mode: i32) -> Self {
        match mode.cmp(&0) {
            Ordering::Less => Self::Down,
            Ordering::Equal => Self::Nearest,
            Ordering::Greater => Self::Up,
        }
    }
}

/// Power fill geometry of a single layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FillConfig {
    /// Fill wire width in tracks.
    pub tr_w: i64,
    /// Space between fill wires in tracks.
    pub tr_sp: i64,
    /// Space to other wires, in resolution units.
    pub sp: i64,
    /// Line-end space to other wires, in resolution units.
    pub sp_le: i64,
}

/// The geometry of a single routing layer.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LayerSpec {
    /// The layer identifier.
    pub id: LayerId,
    /// The direction in which wires on this layer run.
    pub dir: Dir,
    /// The center-to-center distance between adjacent tracks.
    pub pitch: i64,
    /// The physical width of a single-track wire.
    pub width: i64,
    /// Minimum edge-to-edge spacing, as `(max_width, space)` pairs sorted by width.
    ///
    /// A wire whose physical width is at most `max_width` needs `space`.
    #[serde(default)]
    pub space_by_width: Vec<(i64, i64)>,
    /// Minimum line-end spacing, as `(max_width, space)` pairs sorted by width.
    #[serde(default)]
    pub line_end_space: Vec<(i64, i64)>,
    /// How far a wire must extend past the edge of a via landing on it.
    #[serde(default)]
    pub via_enclosure: i64,
    /// Minimum wire length.
    #[serde(default)]
    pub min_length: i64,
}

impl LayerSpec {
    /// The space between two adjacent single-track wires.
    #[inline]
    pub fn track_space(&self) -> i64 {
        self.pitch - self.width
    }

    /// The physical width of a wire `ntr` tracks wide.
    #[inline]
    pub fn wire_width(&self, ntr: u32) -> i64 {
        self.width + (ntr as i64 - 1) * self.pitch
    }

    /// The direction along which track indices increase.
    #[inline]
    pub fn track_dir(&self) -> Dir {
        !self.dir
    }

    fn lookup(table: &[(i64, i64)], phys_width: i64, default: i64) -> i64 {
        table
            .iter()
            .find(|(max_w, _)| phys_width <= *max_w)
            .or_else(|| table.last())
            .map(|(_, sp)| *sp)
            .unwrap_or(default)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| GridError::InvalidWidth {
            layer: self.id,
            reason: ArcStr::from(reason),
        };
        if self.pitch <= 0 || self.pitch % 2 != 0 {
            return Err(invalid("pitch must be a positive even integer"));
        }
        if self.width <= 0 || self.width % 2 != 0 {
            return Err(invalid("width must be a positive even integer"));
        }
        if self.width >= self.pitch {
            return Err(invalid("width must be smaller than the pitch"));
        }
        Ok(())
    }
}

/// An immutable stack of routing layers.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RoutingGrid {
    /// The physical size of one resolution unit, in meters.
    resolution: Decimal,
    /// The layers, ordered from bottom to top with consecutive identifiers.
    layers: Vec<LayerSpec>,
}

impl RoutingGrid {
    /// The largest coordinate magnitude the grid will represent.
    pub const MAX_COORD: i64 = 1 << 40;

    /// Creates a new routing grid.
    ///
    /// Layers must have consecutive identifiers, alternating directions and
    /// positive even widths and pitches.
    pub fn new(resolution: Decimal, mut layers: Vec<LayerSpec>) -> Result<Self> {
        layers.sort_by_key(|l| l.id);
        for layer in layers.iter() {
            layer.validate()?;
        }
        for (a, b) in layers.iter().zip(layers.iter().skip(1)) {
            if b.id != a.id + 1 {
                return Err(GridError::NonAdjacentLayers(a.id, b.id));
            }
            if a.dir == b.dir {
                return Err(GridError::DirectionMismatch {
                    layer: b.id,
                    expected: !a.dir,
                    found: b.dir,
                });
            }
        }
        Ok(Self { resolution, layers })
    }

    /// The physical size of one resolution unit, in meters.
    pub fn resolution(&self) -> Decimal {
        self.resolution
    }

    /// The lowest layer in the grid.
    pub fn bot_layer(&self) -> Option<LayerId> {
        self.layers.first().map(|l| l.id)
    }

    /// The highest layer in the grid.
    pub fn top_layer(&self) -> Option<LayerId> {
        self.layers.last().map(|l| l.id)
    }

    /// Iterates over the layers from bottom to top.
    pub fn layers(&self) -> impl Iterator<Item = &LayerSpec> {
        self.layers.iter()
    }

    /// The geometry of the given layer.
    pub fn layer(&self, layer: LayerId) -> Result<&LayerSpec> {
        let first = self.bot_layer().ok_or(GridError::UnknownLayer(layer))?;
        layer
            .checked_sub(first)
            .and_then(|i| self.layers.get(i))
            .ok_or(GridError::UnknownLayer(layer))
    }

    /// The routing direction of the given layer.
    pub fn dir(&self, layer: LayerId) -> Result<Dir> {
        Ok(self.layer(layer)?.dir)
    }

    /// Fails with [`GridError::DirectionMismatch`] unless `layer` routes in `dir`.
    pub fn require_dir(&self, layer: LayerId, dir: Dir) -> Result<()> {
        let found = self.dir(layer)?;
        if found != dir {
            return Err(GridError::DirectionMismatch {
                layer,
                expected: dir,
                found,
            });
        }
        Ok(())
    }

    /// The track pitch of the given layer.
    pub fn get_track_pitch(&self, layer: LayerId) -> Result<i64> {
        Ok(self.layer(layer)?.pitch)
    }

    fn check_coord(layer: LayerId, coord: i64) -> Result<()> {
        if coord.abs() > Self::MAX_COORD {
            return Err(GridError::OutOfRange { layer, coord });
        }
        Ok(())
    }

    /// The center coordinate of the given track.
    pub fn track_to_coord(&self, layer: LayerId, idx: HalfInt) -> Result<i64> {
        let half = self.layer(layer)?.pitch / 2;
        let coord = (idx.dbl() + 1)
            .checked_mul(half)
            .ok_or(GridError::TrackOutOfRange { layer, idx })?;
        if coord.abs() > Self::MAX_COORD {
            return Err(GridError::TrackOutOfRange { layer, idx });
        }
        Ok(coord)
    }

    /// The track (or half track) centered at `coord`.
    pub fn coord_to_track(&self, layer: LayerId, coord: i64) -> Result<HalfInt> {
        Self::check_coord(layer, coord)?;
        let half = self.layer(layer)?.pitch / 2;
        if coord % half != 0 {
            return Err(GridError::OffGrid { layer, coord });
        }
        Ok(HalfInt::from_dbl(coord / half - 1))
    }

    /// The track closest to `coord` in the given rounding mode.
    ///
    /// If `half_track` is set, half-integer tracks are also considered.
    pub fn coord_to_nearest_track(
        &self,
        layer: LayerId,
        coord: i64,
        mode: RoundingMode,
        half_track: bool,
    ) -> Result<HalfInt> {
        Self::check_coord(layer, coord)?;
        let pitch = self.layer(layer)?.pitch;
        let half = pitch / 2;
        if half_track {
            let q = match mode {
                RoundingMode::Down => div_floor(coord, half),
                RoundingMode::Up => div_ceil(coord, half),
                RoundingMode::Nearest => div_floor(2 * coord + half, 2 * half),
            };
            Ok(HalfInt::from_dbl(q - 1))
        } else {
            let rel = coord - half;
            let q = match mode {
                RoundingMode::Down => div_floor(rel, pitch),
                RoundingMode::Up => div_ceil(rel, pitch),
                RoundingMode::Nearest => div_floor(2 * rel + pitch, 2 * pitch),
            };
            Ok(HalfInt::new(q))
        }
    }

    /// The track nearest to `coord` whose wire edge lies on the far side of `coord`.
    ///
    /// With [`RoundingMode::Up`], the lower edge of a `tr_width` wide wire on the
    /// returned track is at or above `coord`. With [`RoundingMode::Down`], its upper
    /// edge is at or below `coord`. [`RoundingMode::Nearest`] returns the track
    /// whose center is nearest to `coord`.
    pub fn find_next_track(
        &self,
        layer: LayerId,
        coord: i64,
        tr_width: u32,
        half_track: bool,
        mode: RoundingMode,
    ) -> Result<HalfInt> {
        let half_w = self.get_wire_width(layer, tr_width)? / 2;
        let target = match mode {
            RoundingMode::Up => coord + half_w,
            RoundingMode::Down => coord - half_w,
            RoundingMode::Nearest => coord,
        };
        self.coord_to_nearest_track(layer, target, mode, half_track)
    }

    /// The physical width of a wire `ntr` tracks wide.
    pub fn get_wire_width(&self, layer: LayerId, ntr: u32) -> Result<i64> {
        if ntr == 0 {
            return Err(GridError::InvalidWidth {
                layer,
                reason: arcstr::literal!("wires must be at least one track wide"),
            });
        }
        Ok(self.layer(layer)?.wire_width(ntr))
    }

    /// The lower and upper edges of a wire `width` tracks wide centered on track `idx`.
    pub fn get_wire_bounds(&self, layer: LayerId, idx: HalfInt, width: u32) -> Result<(i64, i64)> {
        let center = self.track_to_coord(layer, idx)?;
        let half_w = self.get_wire_width(layer, width)? / 2;
        Ok((center - half_w, center + half_w))
    }

    /// The number of empty tracks needed beside a wire `width` tracks wide.
    ///
    /// Rounded up to a multiple of one half if `half_space` is set and to a
    /// whole number of tracks otherwise.
    pub fn get_num_space_tracks(
        &self,
        layer: LayerId,
        width: u32,
        half_space: bool,
    ) -> Result<HalfInt> {
        let spec = self.layer(layer)?;
        let phys = self.get_wire_width(layer, width)?;
        let required = LayerSpec::lookup(&spec.space_by_width, phys, spec.track_space());
        // With `n` empty tracks, the edge gap between any two wires is `(n + 1) * pitch - width`.
        let deficit = required - spec.track_space();
        if deficit <= 0 {
            return Ok(HalfInt::ZERO);
        }
        Ok(if half_space {
            HalfInt::from_dbl(div_ceil(deficit, spec.pitch / 2))
        } else {
            HalfInt::new(div_ceil(deficit, spec.pitch))
        })
    }

    /// The minimum gap between the ends of two collinear wires `width` tracks wide.
    pub fn get_line_end_space(&self, layer: LayerId, width: u32) -> Result<i64> {
        let spec = self.layer(layer)?;
        let phys = self.get_wire_width(layer, width)?;
        Ok(LayerSpec::lookup(
            &spec.line_end_space,
            phys,
            spec.track_space(),
        ))
    }

    /// How far wires must extend past the center of a via between `bot_layer`
    /// and the layer above it.
    ///
    /// Returns `(ext_bot, ext_top)`: the extension of the `w_bot`-track wire on
    /// `bot_layer` and of the `w_top`-track wire on the layer above.
    pub fn get_via_extensions(
        &self,
        bot_layer: LayerId,
        w_bot: u32,
        w_top: u32,
    ) -> Result<(i64, i64)> {
        let top_layer = bot_layer + 1;
        let bot = self.layer(bot_layer)?;
        let top = self
            .layer(top_layer)
            .map_err(|_| GridError::NonAdjacentLayers(bot_layer, top_layer))?;
        let ext_bot = bot.via_enclosure + top.wire_width(w_top) / 2;
        let ext_top = top.via_enclosure + bot.wire_width(w_bot) / 2;
        Ok((ext_bot, ext_top))
    }

    /// The minimum length of a wire `width` tracks wide.
    pub fn get_min_length(&self, layer: LayerId, width: u32) -> Result<i64> {
        let spec = self.layer(layer)?;
        Ok(std::cmp::max(spec.min_length, self.get_wire_width(layer, width)?))
    }

    /// The size of the placement block of a template whose top layer is `top_layer`.
    ///
    /// Every layer up to `top_layer` has an integer number of tracks in a block.
    pub fn get_block_size(&self, top_layer: LayerId) -> Result<(i64, i64)> {
        self.layer(top_layer)?;
        let (mut w, mut h) = (1, 1);
        for layer in self.layers.iter().take_while(|l| l.id <= top_layer) {
            match layer.track_dir() {
                Dir::Horiz => w = num::integer::lcm(w, layer.pitch),
                Dir::Vert => h = num::integer::lcm(h, layer.pitch),
            }
        }
        Ok((w, h))
    }

    /// The block size of `top_layer` scaled so that the top two layers hold a
    /// whole number of power fill pitches.
    pub fn get_fill_size(
        &self,
        top_layer: LayerId,
        fill_config: &IndexMap<LayerId, FillConfig>,
    ) -> Result<(i64, i64)> {
        let (mut w, mut h) = self.get_block_size(top_layer)?;
        let layers = [top_layer.checked_sub(1), Some(top_layer)];
        for layer in layers.into_iter().flatten() {
            let Some(cfg) = fill_config.get(&layer) else {
                continue;
            };
            let spec = self.layer(layer)?;
            let fill_pitch = (cfg.tr_w + cfg.tr_sp) * spec.pitch;
            if fill_pitch <= 0 {
                return Err(GridError::InvalidWidth {
                    layer,
                    reason: arcstr::literal!("fill pitch must be positive"),
                });
            }
            match spec.track_dir() {
                Dir::Horiz => w = num::integer::lcm(w, fill_pitch),
                Dir::Vert => h = num::integer::lcm(h, fill_pitch),
            }
        }
        Ok((w, h))
    }

    /// The track halfway between `a` and `b`.
    ///
    /// If the midpoint is a quarter track, rounds up when `round_up` is set and
    /// down otherwise.
    pub fn get_middle_track(a: HalfInt, b: HalfInt, round_up: bool) -> HalfInt {
        (a + b).div2(round_up)
    }

    /// The track of a parent template that track `idx` of a child placed with
    /// transformation `tf` lands on.
    pub fn transform_track(
        &self,
        layer: LayerId,
        idx: HalfInt,
        tf: &Transformation,
    ) -> Result<HalfInt> {
        let dir = self.layer(layer)?.track_dir();
        let coord = self.track_to_coord(layer, idx)?;
        self.coord_to_track(layer, tf.apply_coord(coord, dir))
    }
}
