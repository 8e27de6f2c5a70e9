//! A row of summer cells, one per equalizer tap.

use arcstr::ArcStr;
use geometry::prelude::*;
use indexmap::IndexMap;
use routing::{Alignment, HalfInt, RoundingMode, TrackId, TrackType, WireArray};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::placer::RelPlace;
use crate::qdr::info::SegDict;
use crate::qdr::summer_cell::{SummerParams, TapXSummerCell};
use crate::qdr::{tap_suffix, TapKind};
use crate::template::{Generator, InstanceId, TemplateBuilder, TrackConnect};

/// How many times a cell may be widened to make room for its tracks.
const MAX_WIDEN: u32 = 32;

/// Row nets joined on the top layer below the outputs, bottom to top.
const ROW_NETS: [&str; 8] = [
    "clkp", "clkn", "biasp_m", "biasn_m", "biasp_a", "biasn_a", "biasp_d", "biasn_d",
];

/// Summer cells for the main cursor, the feed-forward taps and all but the
/// first decision-feedback tap, packed left to right.
///
/// Cells are ordered FFE taps from the highest index down, the main cursor,
/// DFE taps from the highest index down to 3, then DFE tap 2. Each cell
/// gets vertical tracks for its clocks and its cascode or sign inputs
/// between the previous cell's outputs and its own. Clocks and biases of
/// all cells are joined on top-layer tracks at the bottom of the row, with
/// the summed outputs above them.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TapXSummer {
    /// Shared cell parameters.
    pub params: SummerParams,
    /// Segments of the main cursor summer.
    pub seg_main: SegDict,
    /// Segments of FFE taps 1, 2, ...
    pub seg_ffe: Vec<SegDict>,
    /// Segments of DFE taps 2, 3, ...
    pub seg_dfe: Vec<SegDict>,
    /// Segments of every latch.
    pub seg_lat: SegDict,
    /// Output polarity flips: the main cursor, then FFE taps, then DFE taps.
    ///
    /// Missing entries are not flipped.
    #[serde(default)]
    pub flip_sign: Vec<bool>,
}

/// The vertical track of an exported tap input.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TapTrack {
    /// The track index.
    pub idx: HalfInt,
    /// The track width.
    pub width: u32,
}

/// Data published by a [`TapXSummer`].
#[derive(Debug, Clone)]
pub struct TapXSummerData {
    /// The total number of fingers of all cells.
    pub fg_tot: u32,
    /// The tap of each cell, left to right.
    pub kinds: Vec<TapKind>,
    /// The number of fingers of each cell, left to right.
    pub cell_fg: Vec<u32>,
    /// The left dummies each cell was widened by, left to right.
    pub dum_l: Vec<u32>,
    /// The source/drain pitch.
    pub sd_pitch: i64,
    /// Input tracks of the main cursor.
    pub main_track_info: IndexMap<ArcStr, TapTrack>,
    /// Input tracks of the feed-forward taps.
    pub ffe_track_info: IndexMap<ArcStr, TapTrack>,
    /// Input tracks of the decision-feedback taps.
    pub dfe_track_info: IndexMap<ArcStr, TapTrack>,
    /// The horizontal extent of each cell's signal wires, including line-end
    /// clearance, left to right.
    pub block_intvs: Vec<Span>,
    /// The vertical tracks joining each cell's `clkp` and `clkn`, left to
    /// right.
    pub clk_tracks: Vec<[HalfInt; 2]>,
    /// The top-layer tracks of the clock and bias nets.
    pub net_tracks: IndexMap<ArcStr, HalfInt>,
    /// The tracks of `outp_s`, `outn_s`, `outp_l` and `outn_l` on the
    /// top layer.
    pub out_tracks: [HalfInt; 4],
}

#[derive(Serialize)]
struct SummerSchParams<'a> {
    seg_main: &'a SegDict,
    seg_ffe: &'a [SegDict],
    seg_dfe: &'a [SegDict],
    seg_lat: &'a SegDict,
    flip_sign: Vec<bool>,
    dum_l: &'a [u32],
}

impl TapXSummer {
    /// The taps in placement order, with their segments and sign flips.
    pub fn cells(&self) -> Vec<(TapKind, SegDict, bool)> {
        let nffe = self.seg_ffe.len();
        let flip = |pos: usize| self.flip_sign.get(pos).copied().unwrap_or(false);
        let mut out = Vec::with_capacity(1 + nffe + self.seg_dfe.len());
        for (i, seg) in self.seg_ffe.iter().enumerate().rev() {
            out.push((TapKind::Ffe(i as u32 + 1), seg.clone(), flip(1 + i)));
        }
        out.push((TapKind::Main, self.seg_main.clone(), flip(0)));
        let dfe: Vec<_> = self
            .seg_dfe
            .iter()
            .enumerate()
            .map(|(i, seg)| (TapKind::Dfe(i as u32 + 2), seg.clone(), flip(1 + nffe + i)))
            .collect();
        // Tap 2 sits last, next to the divider column.
        if let Some((first, rest)) = dfe.split_first() {
            out.extend(rest.iter().rev().cloned());
            out.push(first.clone());
        }
        out
    }

    fn cell(&self, seg: &SegDict, flip_sign: bool, dum_l: u32) -> TapXSummerCell {
        TapXSummerCell {
            params: self.params.clone(),
            seg_sum: seg.clone(),
            seg_lat: self.seg_lat.clone(),
            fg_min: 0,
            dum_l,
            flip_sign,
        }
    }
}

/// The exported names of a cell's tap input pins.
fn tap_input_names(
    b: &TemplateBuilder,
    id: InstanceId,
    kind: TapKind,
) -> Result<Vec<(&'static str, ArcStr)>> {
    let inst = b.instance(id)?;
    let k = kind.index();
    let mut out = Vec::new();
    if inst.has_port("casc") {
        let name = match kind {
            TapKind::Main => arcstr::literal!("casc"),
            _ => ArcStr::from(format!("casc<{k}>")),
        };
        out.push(("casc", name));
    }
    if inst.has_port("casc<0>") && inst.has_port("casc<1>") {
        let (p, n) = match kind {
            TapKind::Dfe(_) => ("sgnp", "sgnn"),
            _ => ("cascp", "cascn"),
        };
        out.push(("casc<0>", ArcStr::from(format!("{p}<{k}>"))));
        out.push(("casc<1>", ArcStr::from(format!("{n}<{k}>"))));
    }
    Ok(out)
}

impl Generator for TapXSummer {
    type Data = TapXSummerData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("tapx_summer")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let ctx = b.ctx().clone();
        let grid = b.grid_arc();
        let tech = b.tech().clone();
        let (vm, xm) = (tech.vm_layer(), tech.xm_layer());
        grid.require_dir(xm, Dir::Horiz)?;
        let tm = ctx.track_manager(self.params.tr_tables.clone(), true);
        let bias_ty = TrackType::from("bias");
        let vm_w = tm.get_width(vm, &bias_ty);
        let vm_half_w = grid.get_wire_width(vm, vm_w)? / 2;

        let mut data = TapXSummerData {
            fg_tot: 0,
            kinds: Vec::new(),
            cell_fg: Vec::new(),
            dum_l: Vec::new(),
            sd_pitch: tech.sd_pitch(&grid)?,
            main_track_info: IndexMap::new(),
            ffe_track_info: IndexMap::new(),
            dfe_track_info: IndexMap::new(),
            block_intvs: Vec::new(),
            clk_tracks: Vec::new(),
            net_tracks: IndexMap::new(),
            out_tracks: [HalfInt::ZERO; 4],
        };
        let clk_ty = TrackType::from("clk");
        let clk_w = tm.get_width(vm, &clk_ty);
        let mut row_nets: IndexMap<ArcStr, Vec<WireArray>> = IndexMap::new();

        let mut x0 = 0;
        let mut xcur = 0;
        let mut prev: Option<InstanceId> = None;
        let mut placed = Vec::new();
        for (kind, seg, flip) in self.cells() {
            let mut dum_l = 0;
            let mut widened = 0;
            let (master, locs) = loop {
                let master = ctx.new_template(self.cell(&seg, flip, dum_l))?;
                let start = grid.find_next_track(vm, xcur, 1, true, RoundingMode::Up)?;
                // Count the input pins from the master; their number does not
                // depend on the dummies.
                let n_in = ["casc", "casc<0>", "casc<1>"]
                    .iter()
                    .filter(|p| master.has_port(p))
                    .count();
                let mut types = vec![clk_ty.clone(); 2];
                types.extend(std::iter::repeat(bias_ty.clone()).take(n_in));
                let (_, locs) = tm.place_wires(vm, &types, start)?;
                let limit = x0 + master.data().get_vm_coord(&grid, vm_w, true, true)?;
                let fits = match locs.last() {
                    Some(last) => grid.track_to_coord(vm, *last)? <= limit,
                    None => true,
                };
                if fits {
                    break (master, locs);
                }
                widened += 1;
                if widened > MAX_WIDEN {
                    return Err(Error::placement(format!(
                        "no room for the inputs of tap {kind:?} after {MAX_WIDEN} widenings"
                    )));
                }
                dum_l += 2;
                debug!(?kind, dum_l, "widening summer cell");
            };

            let name = format!("X{}", tap_suffix(kind).to_uppercase());
            let place = match prev {
                None => RelPlace::origin(),
                Some(p) => RelPlace::beside(p, Side::Right),
            };
            let id = b.relplace(master.template(), name.as_str(), place)?;

            // Both clocks of the cell drop to vertical tracks at its left.
            let (clk_locs, in_locs) = locs.split_at(2);
            let odd = kind.index() % 2 == 1;
            for (port, idx) in ["clkp", "clkn"].into_iter().zip(clk_locs) {
                let pins = b.inst_pins(id, port)?;
                let tid = TrackId::new(vm, *idx, clk_w);
                let warr = b.connect_to_tracks(&pins, tid, TrackConnect::default())?;
                b.add_blockage(vm, warr.bbox(&grid)?, ArcStr::from(format!("{name} {port}")));
                let net = match (port, odd) {
                    ("clkp", false) | ("clkn", true) => "clkp",
                    _ => "clkn",
                };
                row_nets.entry(ArcStr::from(net)).or_default().push(warr);
            }
            data.clk_tracks.push([clk_locs[0], clk_locs[1]]);
            let letter = kind.bias_letter();
            for (port, net) in [("biasn_s", "biasn"), ("biasp_l", "biasp")] {
                if b.instance(id)?.has_port(port) {
                    let pins = b.inst_pins(id, port)?;
                    row_nets
                        .entry(ArcStr::from(format!("{net}_{letter}")))
                        .or_default()
                        .extend(pins);
                }
            }

            let inputs = tap_input_names(&*b, id, kind)?;
            for ((port, export), idx) in inputs.into_iter().zip(in_locs.iter().copied()) {
                let pins = b.inst_pins(id, port)?;
                let tid = TrackId::new(vm, idx, vm_w);
                let warr = b.connect_to_tracks(&pins, tid, TrackConnect::default())?;
                b.add_pin(export.clone(), warr)?;
                let bbox = warr.bbox(&grid)?;
                b.add_blockage(vm, bbox, export.clone());
                let info = TapTrack { idx, width: vm_w };
                match kind {
                    TapKind::Main => data.main_track_info.insert(export, info),
                    TapKind::Ffe(_) => data.ffe_track_info.insert(export, info),
                    TapKind::Dfe(_) => data.dfe_track_info.insert(export, info),
                };
            }

            let cd = master.data();
            let blk_lo = x0 + cd.get_vm_coord(&grid, vm_w, true, false)?;
            let blk_hi = x0 + cd.get_vm_coord(&grid, vm_w, false, false)?;
            data.block_intvs.push(Span::new(blk_lo, blk_hi));
            let out_r = x0 + cd.get_vm_coord(&grid, vm_w, false, true)?;
            xcur = out_r.max(blk_hi) - vm_half_w;

            data.kinds.push(kind);
            data.cell_fg.push(cd.fg_tot);
            data.dum_l.push(dum_l);
            data.fg_tot += cd.fg_tot;
            x0 = b.instance(id)?.array_box().right();
            prev = Some(id);
            placed.push((kind, id));
        }

        for &(kind, id) in placed.iter() {
            let suffix = tap_suffix(kind);
            for port in ["en<2>", "en<3>", "VDD", "VSS"] {
                b.reexport_if_present(id, port, None)?;
            }
            b.reexport_if_present(id, "inp", Some(&format!("inp_{suffix}")))?;
            b.reexport_if_present(id, "inn", Some(&format!("inn_{suffix}")))?;
        }

        let bbox = Rect::union_all(
            placed
                .iter()
                .map(|(_, id)| b.instance(*id).map(|inst| inst.bound_box()))
                .collect::<Result<Vec<_>>>()?,
        )
        .ok_or_else(|| Error::config("a summer row needs at least one tap"))?;

        // Clocks and biases run at the bottom of the row on the top layer.
        let out_ty = TrackType::from("out");
        let out_w = tm.get_width(xm, &out_ty);
        let xm_pitch = grid.get_track_pitch(xm)?;
        let row_lo = grid.find_next_track(xm, bbox.bot(), 1, false, RoundingMode::Up)?;
        let row_hi = row_lo + HalfInt::new(bbox.height() / xm_pitch);
        let low: Vec<(&str, TrackType)> = ROW_NETS
            .into_iter()
            .filter(|net| row_nets.contains_key(*net))
            .map(|net| {
                let ty = if net.starts_with("clk") { &clk_ty } else { &bias_ty };
                (net, ty.clone())
            })
            .collect();
        let low_types: Vec<TrackType> = low.iter().map(|(_, ty)| ty.clone()).collect();
        let (_, low_locs) = tm.place_wires(xm, &low_types, row_lo)?;
        for ((net, ty), idx) in low.iter().zip(low_locs.iter()) {
            let tid = TrackId::new(xm, *idx, tm.get_width(xm, ty));
            let warr = b.connect_to_tracks(&row_nets[*net], tid, TrackConnect::default())?;
            b.add_pin(*net, warr)?;
            data.net_tracks.insert(ArcStr::from(*net), *idx);
        }

        // Outputs of every cell are summed on the top layer above them.
        let start = match (low.last(), low_locs.last()) {
            (Some((_, ty)), Some(idx)) => {
                tm.get_next_track(xm, *idx, ty, &out_ty, true)?
                    - HalfInt::from_dbl(out_w as i64 - 1)
            }
            _ => row_lo,
        };
        let locs = tm.align_wires(xm, &vec![out_ty; 4], row_hi - start, Alignment::Center, start)?;
        let out_pins = |b: &TemplateBuilder, port: &str| -> Result<Vec<WireArray>> {
            let mut out = Vec::new();
            for (_, id) in placed.iter() {
                out.extend(b.instance(*id)?.port_pins(b.grid(), port, Some(vm))?);
            }
            Ok(out)
        };
        for (i, (p, n)) in [("outp_s", "outn_s"), ("outp_l", "outn_l")].into_iter().enumerate() {
            let pwarrs = out_pins(&*b, p)?;
            let nwarrs = out_pins(&*b, n)?;
            let (idx_p, idx_n) = (locs[2 * i], locs[2 * i + 1]);
            let (wp, wn) = b.connect_differential_tracks(
                &pwarrs,
                &nwarrs,
                xm,
                idx_p,
                idx_n,
                out_w,
                TrackConnect::default(),
            )?;
            b.add_pin(p, wp)?;
            b.add_pin(n, wn)?;
            data.out_tracks[2 * i] = idx_p;
            data.out_tracks[2 * i + 1] = idx_n;
        }

        b.set_size_from_bound_box(xm, bbox)?;
        let flip_sign: Vec<bool> = self.cells().iter().map(|(_, _, f)| *f).collect();
        b.set_sch_params(&SummerSchParams {
            seg_main: &self.seg_main,
            seg_ffe: &self.seg_ffe,
            seg_dfe: &self.seg_dfe,
            seg_lat: &self.seg_lat,
            flip_sign,
            dum_l: &data.dum_l,
        })?;
        debug!(fg_tot = data.fg_tot, ncells = data.kinds.len(), "drew summer row");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::tests::{assert_no_shorts, demo_ctx, demo_summer};

    #[test]
    fn cells_are_ordered_around_the_main_cursor() {
        let summer = demo_summer(2, 3);
        let kinds: Vec<TapKind> = summer.cells().into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                TapKind::Ffe(2),
                TapKind::Ffe(1),
                TapKind::Main,
                TapKind::Dfe(3),
                TapKind::Dfe(2),
            ]
        );
    }

    #[test]
    fn cell_widths_add_up() {
        let ctx = demo_ctx();
        let master = ctx.new_template(demo_summer(1, 2)).unwrap();
        let data = master.data();
        assert_eq!(data.cell_fg.len(), 3);
        assert_eq!(data.fg_tot, data.cell_fg.iter().sum::<u32>());
        let width: i64 = master
            .instances()
            .iter()
            .map(|inst| inst.array_box().width())
            .sum();
        assert_eq!(width, data.fg_tot as i64 * data.sd_pitch);
    }

    #[test]
    fn odd_taps_swap_clocks() {
        let ctx = demo_ctx();
        let master = ctx.new_template(demo_summer(1, 0)).unwrap();
        let data = master.data();
        let vm = ctx.tech().vm_layer();
        let joins = |vm_idx: HalfInt, net: &str| {
            let xm_idx = data.net_tracks[net];
            master
                .vias()
                .iter()
                .any(|v| v.bot_layer == vm && v.bot_track == vm_idx && v.top_track == xm_idx)
        };
        // The FFE tap 1 cell is placed first, then the main cursor.
        let [ffe_p, ffe_n] = data.clk_tracks[0];
        let [main_p, main_n] = data.clk_tracks[1];
        assert!(joins(ffe_p, "clkn") && joins(ffe_n, "clkp"));
        assert!(joins(main_p, "clkp") && joins(main_n, "clkn"));
        assert!(!joins(ffe_p, "clkp"));
    }

    #[test]
    fn clocks_and_biases_run_below_the_outputs() {
        let ctx = demo_ctx();
        let master = ctx.new_template(demo_summer(2, 2)).unwrap();
        let data = master.data();
        let xm = ctx.tech().xm_layer();
        let lowest_out = data.out_tracks.iter().copied().min().unwrap();
        for net in ROW_NETS {
            let idx = data.net_tracks[net];
            assert!(idx < lowest_out, "{net} on track {idx}");
            let pins: Vec<_> = master.port_pins_iter(net, None).unwrap().collect();
            assert_eq!(pins.len(), 1, "{net}");
            assert_eq!(pins[0].layer(), xm);
        }
        let mut idx: Vec<HalfInt> = data.net_tracks.values().copied().collect();
        idx.sort();
        idx.dedup();
        assert_eq!(idx.len(), ROW_NETS.len());
    }

    #[test]
    fn summer_row_has_no_shorts() {
        let ctx = demo_ctx();
        let master = ctx.new_template(demo_summer(2, 2)).unwrap();
        assert_no_shorts(ctx.grid(), master.template());
    }

    #[test]
    fn input_tracks_do_not_overlap() {
        let ctx = demo_ctx();
        let master = ctx.new_template(demo_summer(2, 2)).unwrap();
        let data = master.data();
        let mut idx: Vec<HalfInt> = data
            .main_track_info
            .values()
            .chain(data.ffe_track_info.values())
            .chain(data.dfe_track_info.values())
            .map(|t| t.idx)
            .collect();
        let n = idx.len();
        idx.sort();
        idx.dedup();
        assert_eq!(idx.len(), n);
        assert!(master.has_port("cascp<1>"));
        assert!(master.has_port("cascn<2>"));
        assert!(master.has_port("sgnp<2>"));
    }
}
