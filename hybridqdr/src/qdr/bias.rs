//! Shielded bias routing lanes.
//!
//! A lane is a bundle of bias signal tracks enclosed by two supply-tied
//! shield tracks:
//!
//! ```text
//! | shield | sp_shield | sig 0 | sp_sig | sig 1 | ... | sig n-1 | sp_shield | shield |
//! ```

use std::hash::{Hash, Hasher};

use arcstr::ArcStr;
use geometry::prelude::*;
use indexmap::IndexMap;
use itertools::Itertools;
use routing::{HalfInt, LayerId, TrackId, WireArray};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::template::{Generator, MinLenMode, PinOpts, TemplateBuilder, TrackConnect};

/// Shield and signal geometry of the bias lanes on one layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BiasLayerConfig {
    /// The shield width, in tracks.
    pub w_shield: u32,
    /// Empty tracks between a shield and the nearest signal.
    pub sp_shield: HalfInt,
    /// The signal width, in tracks.
    pub w_sig: u32,
    /// Empty tracks between adjacent signals.
    pub sp_sig: HalfInt,
}

/// The track positions of one lane.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BiasTracks {
    /// The lower and upper shield tracks.
    pub shields: (HalfInt, HalfInt),
    /// The signal tracks, from low to high.
    pub sigs: Vec<HalfInt>,
}

impl BiasTracks {
    /// The lowest track covered by the lane.
    pub fn lower_edge(&self, cfg: &BiasLayerConfig) -> HalfInt {
        self.shields.0 - HalfInt::from_dbl(cfg.w_shield as i64 - 1)
    }

    /// The highest track covered by the lane.
    pub fn upper_edge(&self, cfg: &BiasLayerConfig) -> HalfInt {
        self.shields.1 + HalfInt::from_dbl(cfg.w_shield as i64 - 1)
    }
}

impl BiasLayerConfig {
    /// Lays out `n` signals in a lane whose lower shield is centered on `offset`.
    pub fn tracks(&self, offset: HalfInt, n: usize) -> BiasTracks {
        let sig0 = offset + HalfInt::from_dbl((self.w_shield + self.w_sig) as i64) + self.sp_shield;
        let pitch = HalfInt::new(self.w_sig as i64) + self.sp_sig;
        let sigs: Vec<HalfInt> = (0..n as i64).map(|i| sig0 + pitch * i).collect();
        let last = sigs.last().copied().unwrap_or(offset);
        let shield1 = if n == 0 {
            offset
        } else {
            last + HalfInt::from_dbl((self.w_sig + self.w_shield) as i64) + self.sp_shield
        };
        BiasTracks {
            shields: (offset, shield1),
            sigs,
        }
    }

    /// The lower shield track that puts the lower edge of a lane on track `lower`.
    pub fn offset_from_lower(&self, lower: HalfInt) -> HalfInt {
        lower + HalfInt::from_dbl(self.w_shield as i64 - 1)
    }
}

/// Bias lane geometry, keyed by routing layer.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BiasConfig(pub IndexMap<LayerId, BiasLayerConfig>);

impl Hash for BiasConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.iter().for_each(|entry| entry.hash(state));
    }
}

impl BiasConfig {
    /// Adds the geometry of `layer`.
    pub fn with_layer(mut self, layer: LayerId, cfg: BiasLayerConfig) -> Self {
        self.0.insert(layer, cfg);
        self
    }

    /// The geometry of `layer`.
    pub fn get(&self, layer: LayerId) -> Result<&BiasLayerConfig> {
        self.0
            .get(&layer)
            .ok_or_else(|| {
                Error::config(format!(
                    "no bias lane geometry for layer {layer} (configured: {})",
                    self.0.keys().join(", ")
                ))
            })
    }
}

/// A bias net and the wires to connect to its lane track.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BiasWire {
    /// The net name.
    pub name: ArcStr,
    /// Wires on a layer adjacent to the lane.
    pub warrs: Vec<WireArray>,
}

/// Options for [`connect_bias_shields`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct BiasRouteOpts {
    /// The lowest track the lane may cover.
    pub tr_lower: Option<HalfInt>,
    /// The highest track the lane may cover.
    pub tr_upper: Option<HalfInt>,
    /// Extend every lane wire down to at least this coordinate.
    pub lower: Option<i64>,
    /// Extend every lane wire up to at least this coordinate.
    pub upper: Option<i64>,
    /// How signal wires meet the minimum length rule.
    pub end_mode: Option<MinLenMode>,
    /// Extend the shields past the signal ends by the line-end space.
    pub add_end: bool,
    /// Draw every signal over the common extent of the lane.
    pub extend_tracks: bool,
}

/// The result of [`connect_bias_shields`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BiasInfo {
    /// The routing layer.
    pub layer: LayerId,
    /// The net names, in track order.
    pub names: Vec<ArcStr>,
    /// The signal tracks, in the same order as `names`.
    pub tracks: Vec<TrackId>,
    /// The signal wires, in the same order as `names`.
    pub wires: Vec<WireArray>,
    /// Both shields.
    pub shields: WireArray,
    /// The first coordinate above the lane, where a following lane may start.
    pub p0: i64,
    /// The extent of the lane along the layer direction.
    pub span: Span,
}

fn check_line_ends(
    b: &TemplateBuilder,
    existing: &[WireArray],
    warr: &WireArray,
) -> Result<()> {
    let layer = warr.layer();
    let tid = warr.track_id();
    let required = b.grid().get_line_end_space(layer, tid.width())?;
    for other in existing
        .iter()
        .filter(|w| w.track_id().base_index() == tid.base_index() && w.layer() == layer)
    {
        let gap = if other.upper() < warr.lower() {
            warr.lower() - other.upper()
        } else if other.lower() > warr.upper() {
            other.lower() - warr.upper()
        } else {
            continue;
        };
        if gap < required {
            return Err(Error::LineEndSpace {
                layer,
                gap,
                required,
            });
        }
    }
    Ok(())
}

/// Routes each of `wires` to its own track of a shielded lane on `layer`.
///
/// The lower shield is centered on track `offset`. The shields are drawn
/// over the extent of the signals and connected to `sup_warrs`. The lane is
/// reserved as a blockage.
///
/// Fails with [`Error::NoRoomForBiasRoutes`] if the lane leaves
/// `[tr_lower, tr_upper]`, with [`Error::BlockageCollision`] if it crosses
/// an existing blockage, and with [`Error::LineEndSpace`] if a signal ends
/// too close to a collinear wire.
pub fn connect_bias_shields(
    b: &mut TemplateBuilder,
    layer: LayerId,
    config: &BiasConfig,
    wires: &[BiasWire],
    offset: HalfInt,
    opts: BiasRouteOpts,
    sup_warrs: &[WireArray],
) -> Result<BiasInfo> {
    let cfg = *config.get(layer)?;
    if wires.is_empty() {
        return Err(Error::config(format!("bias lane on layer {layer} has no signals")));
    }
    let tracks = cfg.tracks(offset, wires.len());
    let (lo, hi) = (tracks.lower_edge(&cfg), tracks.upper_edge(&cfg));
    let needed = hi - lo + HalfInt::ONE;
    let too_low = opts.tr_lower.is_some_and(|l| lo < l);
    let too_high = opts.tr_upper.is_some_and(|u| hi > u);
    if too_low || too_high {
        let start = opts.tr_lower.unwrap_or(lo);
        let available = opts
            .tr_upper
            .map_or(needed, |u| u - start + HalfInt::ONE);
        return Err(Error::NoRoomForBiasRoutes {
            layer,
            needed,
            available,
        });
    }

    let grid = b.grid_arc();
    let existing: Vec<WireArray> = b
        .wires()
        .iter()
        .filter(|w| w.layer() == layer)
        .copied()
        .collect();

    let conn = TrackConnect {
        track_lower: opts.lower,
        track_upper: opts.upper,
        min_len_mode: opts.end_mode,
    };
    let mut sig_wires = Vec::with_capacity(wires.len());
    let mut tids = Vec::with_capacity(wires.len());
    for (wire, idx) in wires.iter().zip(tracks.sigs.iter()) {
        let tid = TrackId::new(layer, *idx, cfg.w_sig);
        let warr = if wire.warrs.is_empty() {
            let (lower, upper) = opts.lower.zip(opts.upper).ok_or_else(|| {
                Error::routing(format!(
                    "bias net `{}` has no wires and the lane has no extent",
                    wire.name
                ))
            })?;
            b.add_wires(layer, *idx, lower, upper, cfg.w_sig, 1, HalfInt::ZERO)?
        } else {
            b.connect_to_tracks(&wire.warrs, tid, conn)?
        };
        b.add_net(wire.name.clone(), warr);
        sig_wires.push(warr);
        tids.push(tid);
    }

    let mut span = Span::merge(sig_wires.iter().map(|w| w.span()))
        .ok_or_else(|| Error::invariant("bias lane drew no signals"))?;
    if opts.extend_tracks {
        sig_wires = b.extend_wires(&sig_wires, Some(span.start()), Some(span.stop()), None)?;
    }
    for warr in sig_wires.iter() {
        check_line_ends(b, &existing, warr)?;
    }
    if opts.add_end {
        let le = grid.get_line_end_space(layer, cfg.w_sig)?;
        span = span.expand(le, le);
    }

    let dir = grid.dir(layer)?;
    let perp = Span::new(
        grid.get_wire_bounds(layer, tracks.shields.0, cfg.w_shield)?.0,
        grid.get_wire_bounds(layer, tracks.shields.1, cfg.w_shield)?.1,
    );
    let lane = Rect::from_dir_spans(dir, span, perp);
    let what = format!("bias lane at track {offset}");
    b.check_blockage(layer, lane, &what)?;

    let shield_tid = TrackId::bus(
        layer,
        tracks.shields.0,
        cfg.w_shield,
        2,
        tracks.shields.1 - tracks.shields.0,
    );
    let shields = if sup_warrs.is_empty() {
        b.add_wires(
            layer,
            tracks.shields.0,
            span.start(),
            span.stop(),
            cfg.w_shield,
            2,
            tracks.shields.1 - tracks.shields.0,
        )?
    } else {
        b.connect_to_tracks(sup_warrs, shield_tid, TrackConnect::spanning(span))?
    };
    b.add_blockage(layer, lane, what);

    debug!(layer, %offset, n = wires.len(), "routed bias lane");
    Ok(BiasInfo {
        layer,
        names: wires.iter().map(|w| w.name.clone()).collect(),
        tracks: tids,
        wires: sig_wires,
        shields,
        p0: perp.stop(),
        span: shields.span(),
    })
}

/// A straight bias lane tile.
///
/// Draws the shields over the full length and reserves the signal tracks.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BiasShield {
    /// The lane layer.
    pub layer: LayerId,
    /// The number of signals.
    pub nwire: usize,
    /// Lane geometry.
    pub bias_config: BiasConfig,
    /// The tile length along the lane.
    pub length: i64,
}

/// Data published by a [`BiasShield`].
#[derive(Debug, Clone)]
pub struct BiasShieldData {
    /// The track positions of the lane.
    pub tracks: BiasTracks,
}

impl Generator for BiasShield {
    type Data = BiasShieldData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("bias_shield")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let cfg = *self.bias_config.get(self.layer)?;
        if self.nwire == 0 {
            return Err(Error::config("bias shield tiles need at least one signal"));
        }
        let offset = cfg.offset_from_lower(HalfInt::ZERO);
        let tracks = cfg.tracks(offset, self.nwire);
        let grid = b.grid_arc();
        let dir = grid.dir(self.layer)?;
        let top = grid.track_to_coord(self.layer, tracks.upper_edge(&cfg) + HalfInt::HALF)?;
        let perp = Span::new(0, top);

        let shields = b.add_wires(
            self.layer,
            tracks.shields.0,
            0,
            self.length,
            cfg.w_shield,
            2,
            tracks.shields.1 - tracks.shields.0,
        )?;
        b.add_pin("VSS", shields)?;
        let (sig_lo, _) = grid.get_wire_bounds(self.layer, tracks.sigs[0], cfg.w_sig)?;
        let (_, sig_hi) = grid.get_wire_bounds(
            self.layer,
            tracks.sigs[self.nwire - 1],
            cfg.w_sig,
        )?;
        b.add_blockage(
            self.layer,
            Rect::from_dir_spans(dir, Span::new(0, self.length), Span::new(sig_lo, sig_hi)),
            "bias signals",
        );
        b.set_size_from_bound_box(
            self.layer + 1,
            Rect::from_dir_spans(dir, Span::new(0, self.length), perp),
        )?;
        Ok(BiasShieldData { tracks })
    }
}

/// An L-shaped corner joining a lane on `layer` to a lane on the layer above.
///
/// Signals enter from the bottom on `layer` and leave to the right on the
/// layer above. The signal closest to the corner turns first, so the
/// horizontal track order is the reverse of the vertical one and no two
/// signals cross.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BiasShieldJoin {
    /// The vertical lane layer.
    pub layer: LayerId,
    /// The number of signals.
    pub nwire: usize,
    /// Lane geometry of both layers.
    pub bias_config: BiasConfig,
    /// Whether pin labels are visible.
    pub show_pins: bool,
}

/// Data published by a [`BiasShieldJoin`].
#[derive(Debug, Clone)]
pub struct BiasShieldJoinData {
    /// The vertical lane tracks.
    pub bot: BiasTracks,
    /// The horizontal lane routes.
    pub top: BiasInfo,
}

impl Generator for BiasShieldJoin {
    type Data = BiasShieldJoinData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("bias_shield_join")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let (vl, hl) = (self.layer, self.layer + 1);
        let grid = b.grid_arc();
        grid.require_dir(vl, Dir::Vert)?;
        let vcfg = *self.bias_config.get(vl)?;
        let hcfg = *self.bias_config.get(hl)?;
        if self.nwire == 0 {
            return Err(Error::config("bias shield joins need at least one signal"));
        }

        let vtr = vcfg.tracks(vcfg.offset_from_lower(HalfInt::ZERO), self.nwire);
        let htr = hcfg.tracks(hcfg.offset_from_lower(HalfInt::ZERO), self.nwire);
        let right = grid.track_to_coord(vl, vtr.upper_edge(&vcfg) + HalfInt::HALF)?;
        let top = grid.track_to_coord(hl, htr.upper_edge(&hcfg) + HalfInt::HALF)?;

        // Vertical stubs, each stopping at its horizontal track.
        let mut wires = Vec::with_capacity(self.nwire);
        for (i, vidx) in vtr.sigs.iter().enumerate() {
            let hidx = htr.sigs[self.nwire - 1 - i];
            let y = grid.track_to_coord(hl, hidx)?;
            let stub = b.add_wires(vl, *vidx, 0, y, vcfg.w_sig, 1, HalfInt::ZERO)?;
            let opts = PinOpts {
                hide: !self.show_pins,
                edge_mode: -1,
                ..Default::default()
            };
            b.add_pin_with(format!("bias<{i}>"), stub, opts)?;
            wires.push(BiasWire {
                name: ArcStr::from(format!("bias<{i}>")),
                warrs: vec![stub],
            });
        }
        // Horizontal tracks are assigned bottom-up, so reverse the order.
        wires.reverse();

        let vshields = b.add_wires(
            vl,
            vtr.shields.0,
            0,
            top,
            vcfg.w_shield,
            2,
            vtr.shields.1 - vtr.shields.0,
        )?;
        let info = connect_bias_shields(
            b,
            hl,
            &self.bias_config,
            &wires,
            htr.shields.0,
            BiasRouteOpts {
                upper: Some(right),
                ..Default::default()
            },
            &[vshields],
        )?;
        for (name, warr) in info.names.iter().zip(info.wires.iter()) {
            let opts = PinOpts {
                hide: !self.show_pins,
                edge_mode: 1,
                ..Default::default()
            };
            b.add_pin_with(name.clone(), *warr, opts)?;
        }
        b.add_pin("VSS", vshields)?;
        b.add_pin("VSS", info.shields)?;
        b.set_size_from_bound_box(hl, Rect::from_sides(0, 0, right, top))?;
        Ok(BiasShieldJoinData { bot: vtr, top: info })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::tests::{demo_bias_config, demo_ctx, Scratch};

    fn five_wires(b: &mut TemplateBuilder) -> Vec<BiasWire> {
        (0..5)
            .map(|i| {
                let warr = b
                    .add_wires(2, HalfInt::new(2 * i), 0, 3000, 1, 1, HalfInt::ZERO)
                    .unwrap();
                BiasWire {
                    name: ArcStr::from(format!("b{i}")),
                    warrs: vec![warr],
                }
            })
            .collect()
    }

    #[test]
    fn signals_are_evenly_spaced() {
        let ctx = demo_ctx();
        let cfg = demo_bias_config();
        let info = Scratch::run(&ctx, |b| {
            let wires = five_wires(b);
            let opts = BiasRouteOpts::default();
            connect_bias_shields(b, 3, &cfg, &wires, HalfInt::new(20), opts, &[])
        })
        .unwrap();
        assert_eq!(info.tracks.len(), 5);
        for pair in info.tracks.windows(2) {
            assert_eq!(pair[1].base_index() - pair[0].base_index(), HalfInt::new(2));
        }
        let c = cfg.get(3).unwrap();
        let tr = c.tracks(HalfInt::new(20), 5);
        assert_eq!(info.shields.track_id().base_index(), tr.shields.0);
        assert_eq!(info.names[0], "b0");
    }

    #[test]
    fn lane_must_fit_its_bounds() {
        let ctx = demo_ctx();
        let cfg = demo_bias_config();
        let err = Scratch::run(&ctx, |b| {
            let wires = five_wires(b);
            let opts = BiasRouteOpts {
                tr_lower: Some(HalfInt::ZERO),
                tr_upper: Some(HalfInt::new(8)),
                ..Default::default()
            };
            connect_bias_shields(b, 3, &cfg, &wires, HalfInt::new(1), opts, &[])
        })
        .unwrap_err();
        assert!(matches!(err, Error::NoRoomForBiasRoutes { layer: 3, .. }));
    }

    #[test]
    fn lanes_cannot_overlap() {
        let ctx = demo_ctx();
        let cfg = demo_bias_config();
        let err = Scratch::run(&ctx, |b| {
            let wires = five_wires(b);
            let opts = BiasRouteOpts {
                extend_tracks: true,
                ..Default::default()
            };
            connect_bias_shields(b, 3, &cfg, &wires, HalfInt::new(20), opts, &[])?;
            connect_bias_shields(b, 3, &cfg, &wires, HalfInt::new(24), opts, &[])
        })
        .unwrap_err();
        assert!(matches!(err, Error::BlockageCollision { layer: 3, .. }));
    }

    #[test]
    fn join_reverses_the_track_order() {
        let ctx = demo_ctx();
        let join = ctx
            .new_template(BiasShieldJoin {
                layer: 3,
                nwire: 3,
                bias_config: demo_bias_config(),
                show_pins: true,
            })
            .unwrap();
        let data = join.data();
        // The leftmost vertical signal turns on the topmost horizontal track.
        assert_eq!(data.top.names[2], "bias<0>");
        assert_eq!(data.top.names[0], "bias<2>");
        assert!(join.has_port("VSS"));
    }
}
