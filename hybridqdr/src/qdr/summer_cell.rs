//! A summer amplifier stacked with its latch.

use arcstr::ArcStr;
use geometry::prelude::*;
use routing::{
    Alignment, HalfInt, LayerId, RoundingMode, RoutingGrid, TrackId, TrackTables, TrackType,
    WireArray,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::placer::RelPlace;
use crate::qdr::info::SegDict;
use crate::qdr::integ_amp::IntegAmp;
use crate::qdr::DeviceParams;
use crate::template::{Generator, PinOpts, TemplateBuilder, TrackConnect};

/// The largest number of output pitches the latch outputs move outward.
const MAX_OUT_SHIFT: i64 = 4;

/// Parameters shared by every summer cell of a tap row.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SummerParams {
    /// The channel length, in meters.
    pub lch: Decimal,
    /// The substrate tap width.
    pub ptap_w: u32,
    /// The well tap width.
    pub ntap_w: u32,
    /// Device widths of the summer amplifier.
    pub w_sum: DeviceParams<u32>,
    /// Device widths of the latch.
    pub w_lat: DeviceParams<u32>,
    /// Threshold flavors of the summer amplifier.
    pub th_sum: DeviceParams<ArcStr>,
    /// Threshold flavors of the latch.
    pub th_lat: DeviceParams<ArcStr>,
    /// Dummy fingers at each edge.
    pub fg_dum: u32,
    /// Wire widths and spacings.
    pub tr_tables: TrackTables,
    /// Whether pin labels are visible.
    pub show_pins: bool,
}

/// A summer amplifier with a latch stacked upside down on top of it.
///
/// Both amplifiers are drawn with the same number of fingers. The summer
/// outputs drive the latch inputs on vertical wires, and the latch outputs
/// move outward until they clear them. The tail biases of both amplifiers
/// share `biasn_s` and the load biases share `biasp_l`, each on its own
/// vertical track between the output tracks.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TapXSummerCell {
    /// Shared parameters.
    pub params: SummerParams,
    /// Segments of the summer amplifier.
    pub seg_sum: SegDict,
    /// Segments of the latch.
    pub seg_lat: SegDict,
    /// The minimum total width, in fingers.
    pub fg_min: u32,
    /// Extra dummy fingers at the left edge.
    pub dum_l: u32,
    /// Swaps the summer output pins.
    pub flip_sign: bool,
}

/// Data published by a [`TapXSummerCell`].
#[derive(Debug, Clone)]
pub struct SummerCellData {
    /// The total number of fingers.
    pub fg_tot: u32,
    /// The extra left dummies.
    pub dum_l: u32,
    /// The source/drain pitch.
    pub sd_pitch: i64,
    /// The vertical output tracks of the summer amplifier.
    pub out_s: (HalfInt, HalfInt),
    /// The vertical output tracks of the latch.
    pub out_l: (HalfInt, HalfInt),
    /// The width of the output tracks.
    pub out_width: u32,
    /// The vertical tracks of `biasn_s` and, if present, `biasp_l`.
    pub bias_tracks: Vec<HalfInt>,
    /// The vertical routing layer.
    pub vm_layer: LayerId,
    /// The horizontal extent of the signal wires of both amplifiers.
    pub hm_span: Span,
}

impl SummerCellData {
    /// The coordinate of the vertical track of width `vm_width` closest to
    /// the cell's wires on one side.
    ///
    /// With `is_out`, the track clears the outermost output track. Otherwise
    /// it clears the line ends of the horizontal signal wires.
    pub fn get_vm_coord(
        &self,
        grid: &RoutingGrid,
        vm_width: u32,
        is_left: bool,
        is_out: bool,
    ) -> Result<i64> {
        let vm = self.vm_layer;
        if is_out {
            let tracks = [self.out_s.0, self.out_s.1, self.out_l.0, self.out_l.1];
            let outer = if is_left {
                tracks.into_iter().min()
            } else {
                tracks.into_iter().max()
            }
            .ok_or_else(|| Error::invariant("summer cell has no output tracks"))?;
            let sp = grid.get_num_space_tracks(vm, self.out_width.max(vm_width), true)?;
            let delta = HalfInt::from_dbl((self.out_width + vm_width) as i64) + sp;
            let idx = if is_left { outer - delta } else { outer + delta };
            return Ok(grid.track_to_coord(vm, idx)?);
        }

        let hm = vm - 1;
        let le = grid.get_line_end_space(hm, 1)?;
        let (_, ext) = grid.get_via_extensions(hm, 1, vm_width)?;
        let (coord, mode) = if is_left {
            (self.hm_span.start() - le - ext, RoundingMode::Down)
        } else {
            (self.hm_span.stop() + le + ext, RoundingMode::Up)
        };
        let idx = grid.find_next_track(vm, coord, vm_width, true, mode)?;
        Ok(grid.track_to_coord(vm, idx)?)
    }
}

/// Whether every latch output track is at least `pitch` from every summer
/// output track.
fn outputs_clear(out_s: (HalfInt, HalfInt), out_l: (HalfInt, HalfInt), pitch: HalfInt) -> bool {
    [out_l.0, out_l.1]
        .into_iter()
        .all(|l| [out_s.0, out_s.1].into_iter().all(|s| l.max(s) - l.min(s) >= pitch))
}

impl TapXSummerCell {
    fn amp(&self, w: &DeviceParams<u32>, th: &DeviceParams<ArcStr>, seg: &SegDict) -> IntegAmp {
        let p = &self.params;
        IntegAmp {
            lch: p.lch,
            ptap_w: p.ptap_w,
            ntap_w: p.ntap_w,
            w: w.clone(),
            th: th.clone(),
            seg_dict: seg.clone(),
            fg_min: self.fg_min,
            fg_dum: p.fg_dum,
            dum_l: self.dum_l,
            out_shift: HalfInt::ZERO,
            tr_tables: p.tr_tables.clone(),
            show_pins: p.show_pins,
        }
    }
}

impl Generator for TapXSummerCell {
    type Data = SummerCellData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("tapx_summer_cell")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let p = &self.params;
        let ctx = b.ctx().clone();
        let mut sum = ctx.new_template(self.amp(&p.w_sum, &p.th_sum, &self.seg_sum))?;
        let mut lat = ctx.new_template(self.amp(&p.w_lat, &p.th_lat, &self.seg_lat))?;

        let fg_tot = sum.data().fg_tot.max(lat.data().fg_tot);
        if sum.data().fg_tot < fg_tot {
            sum = ctx.new_template_with(&sum, |amp| amp.fg_min = fg_tot)?;
        }
        if lat.data().fg_tot < fg_tot {
            lat = ctx.new_template_with(&lat, |amp| amp.fg_min = fg_tot)?;
        }
        if sum.data().fg_tot != lat.data().fg_tot {
            return Err(Error::invariant(format!(
                "summer ({}) and latch ({}) widths differ after equalization",
                sum.data().fg_tot,
                lat.data().fg_tot
            )));
        }

        let vm = b.tech().vm_layer();
        let tm = ctx.track_manager(p.tr_tables.clone(), false);
        let out_ty = TrackType::from("out");
        let bias_ty = TrackType::from("bias");
        let pitch = tm.get_next_track(vm, HalfInt::ZERO, &out_ty, &out_ty, true)?;
        let out_s = sum.data().out_tracks;
        let mut shift = HalfInt::ZERO;
        while !outputs_clear(out_s, lat.data().out_tracks, pitch) {
            if shift >= pitch * MAX_OUT_SHIFT {
                return Err(Error::invariant(format!(
                    "latch outputs {:?} cannot clear summer outputs {out_s:?}",
                    lat.data().out_tracks
                )));
            }
            shift += pitch;
            lat = ctx.new_template_with(&lat, |amp| amp.out_shift = shift)?;
        }
        let out_l = lat.data().out_tracks;
        if !outputs_clear(out_s, out_l, pitch) {
            return Err(Error::invariant(format!(
                "summer outputs {out_s:?} and latch outputs {out_l:?} overlap"
            )));
        }

        let sum_id = b.relplace(sum.template(), "XSUM", RelPlace::origin())?;
        let lat_id = b.relplace(
            lat.template(),
            "XLAT",
            RelPlace::beside(sum_id, Side::Top).orient(Orientation::MX),
        )?;

        // Summer outputs drive the latch inputs.
        let s_outp = b.inst_pin(sum_id, "outp")?;
        let s_outn = b.inst_pin(sum_id, "outn")?;
        let l_inp = b.inst_pins(lat_id, "inp")?;
        let l_inn = b.inst_pins(lat_id, "inn")?;
        let (s_outp, s_outn) = b.connect_differential_wires(&l_inp, &l_inn, &s_outp, &s_outn)?;

        // Shared biases run on vertical tracks between the inner outputs.
        let mut bias_nets: Vec<(&str, Vec<WireArray>)> = Vec::new();
        for (port, name) in [("biasn", "biasn_s"), ("biasp", "biasp_l")] {
            let mut warrs = Vec::new();
            for id in [sum_id, lat_id] {
                if b.instance(id)?.has_port(port) {
                    warrs.extend(b.inst_pins(id, port)?);
                }
            }
            if !warrs.is_empty() {
                bias_nets.push((name, warrs));
            }
        }
        let inner_l = out_s.0.max(out_l.0);
        let inner_r = out_s.1.min(out_l.1);
        let lo = tm.get_next_track(vm, inner_l, &out_ty, &bias_ty, true)?;
        let hi = tm.get_next_track(vm, inner_r, &out_ty, &bias_ty, false)?;
        let bias_w = tm.get_width(vm, &bias_ty);
        let types = vec![bias_ty.clone(); bias_nets.len()];
        let (needed, _) = tm.place_wires(vm, &types, HalfInt::ZERO)?;
        let available = hi - lo + HalfInt::new(bias_w as i64);
        if needed > available {
            return Err(Error::NoRoomForBiasRoutes {
                layer: vm,
                needed,
                available,
            });
        }
        let start = lo - HalfInt::from_dbl(bias_w as i64 - 1);
        let bias_tracks = tm.align_wires(vm, &types, available, Alignment::Center, start)?;
        let opts = PinOpts {
            hide: !p.show_pins,
            ..Default::default()
        };
        for ((name, warrs), idx) in bias_nets.iter().zip(bias_tracks.iter()) {
            let tid = TrackId::new(vm, *idx, bias_w);
            let warr = b.connect_to_tracks(warrs, tid, TrackConnect::default())?;
            b.add_pin_with(*name, warr, opts.clone())?;
        }

        for (port, name) in [
            ("clkp", "clkp"),
            ("clkn", "clkn"),
            ("casc", "casc"),
            ("sgnp", "casc<0>"),
            ("sgnn", "casc<1>"),
            ("inp", "inp"),
            ("inn", "inn"),
            ("en", "en<3>"),
            ("VDD", "VDD"),
            ("VSS", "VSS"),
        ] {
            b.reexport_if_present(sum_id, port, Some(name))?;
        }
        for (port, name) in [
            ("clkp", "clkn"),
            ("clkn", "clkp"),
            ("en", "en<2>"),
            ("outp", "outp_l"),
            ("outn", "outn_l"),
            ("VDD", "VDD"),
            ("VSS", "VSS"),
        ] {
            b.reexport_if_present(lat_id, port, Some(name))?;
        }
        let (outp_s, outn_s) = if self.flip_sign {
            (s_outn, s_outp)
        } else {
            (s_outp, s_outn)
        };
        b.add_pin("outp_s", outp_s)?;
        b.add_pin("outn_s", outn_s)?;

        let bbox = b
            .instance(sum_id)?
            .bound_box()
            .union(b.instance(lat_id)?.bound_box());
        b.set_size_from_bound_box(vm, bbox)?;

        let sd = sum.data();
        let ld = lat.data();
        debug!(fg_tot, dum_l = self.dum_l, %shift, "drew summer cell");
        Ok(SummerCellData {
            fg_tot,
            dum_l: self.dum_l,
            sd_pitch: sd.sd_pitch,
            out_s,
            out_l,
            out_width: sd.out_width.max(ld.out_width),
            bias_tracks,
            vm_layer: vm,
            hm_span: sd.hm_span.union(ld.hm_span),
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::template::Template;
    use crate::tests::{assert_no_shorts, demo_ctx, summer_params};

    fn equal_halves() -> SegDict {
        SegDict {
            tail: 4,
            nen: 4,
            input: 4,
            load: 4,
            ..Default::default()
        }
    }

    fn cell(seg_sum: SegDict, seg_lat: SegDict) -> TapXSummerCell {
        TapXSummerCell {
            params: summer_params(),
            seg_sum,
            seg_lat,
            fg_min: 0,
            dum_l: 0,
            flip_sign: false,
        }
    }

    #[test]
    fn latch_is_widened_to_match_the_summer() {
        let ctx = demo_ctx();
        let sum = SegDict {
            tail: 8,
            nen: 8,
            input: 8,
            casc: 8,
            load: 4,
            ..Default::default()
        };
        let lat = SegDict {
            tail: 2,
            nen: 2,
            input: 2,
            load: 2,
            ..Default::default()
        };
        let master = ctx.new_template(cell(sum, lat)).unwrap();
        let data = master.data();
        assert_eq!(data.fg_tot, 2 * 8 + 2 + 2 * 2);
        let insts = master.instances();
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0].array_box().width(), insts[1].array_box().width());
        assert_eq!(insts[1].orientation(), Orientation::MX);
        assert_eq!(insts[1].array_box().bot(), insts[0].array_box().top());
    }

    #[test]
    fn flip_sign_swaps_the_summer_outputs() {
        let ctx = demo_ctx();
        let seg = SegDict {
            tail: 4,
            nen: 4,
            input: 4,
            load: 4,
            ..Default::default()
        };
        let plain = ctx.new_template(cell(seg.clone(), seg.clone())).unwrap();
        let mut flipped = cell(seg.clone(), seg);
        flipped.flip_sign = true;
        let flipped = ctx.new_template(flipped).unwrap();

        fn pin(m: &Template, name: &str) -> WireArray {
            *m.port_pins_iter(name, None).unwrap().next().unwrap()
        }
        assert_eq!(pin(&plain, "outp_s"), pin(&flipped, "outn_s"));
        assert_eq!(pin(&plain, "outn_s"), pin(&flipped, "outp_s"));
        assert!(plain.has_port("outp_l"));
        assert!(!plain.has_port("en<3>"));
    }

    #[test]
    fn output_clearance_is_outside_the_outputs() {
        let ctx = demo_ctx();
        let seg = SegDict {
            tail: 4,
            nen: 4,
            input: 4,
            load: 4,
            ..Default::default()
        };
        let master = ctx.new_template(cell(seg.clone(), seg)).unwrap();
        let data = master.data();
        let grid = ctx.grid();
        let left = data.get_vm_coord(grid, 1, true, true).unwrap();
        let right = data.get_vm_coord(grid, 1, false, true).unwrap();
        let out_l = grid.track_to_coord(data.vm_layer, data.out_s.0).unwrap();
        let out_r = grid.track_to_coord(data.vm_layer, data.out_s.1).unwrap();
        assert!(left < out_l);
        assert!(right > out_r);
        assert!(data.get_vm_coord(grid, 1, true, false).unwrap() < data.hm_span.start());
        assert!(data.get_vm_coord(grid, 1, false, false).unwrap() > data.hm_span.stop());
    }

    #[test]
    fn latch_outputs_move_off_the_summer_outputs() {
        let ctx = demo_ctx();
        let master = ctx.new_template(cell(equal_halves(), equal_halves())).unwrap();
        let data = master.data();
        let (s, l) = (data.out_s, data.out_l);
        for t in [l.0, l.1] {
            assert_ne!(t, s.0);
            assert_ne!(t, s.1);
        }
        assert!(l.0 < s.0 && s.1 < l.1);
        assert!(outputs_clear(s, l, HalfInt::ONE));
        assert_no_shorts(ctx.grid(), master.template());
    }

    #[test]
    fn biases_share_one_vertical_track_each() {
        let ctx = demo_ctx();
        let lat = SegDict {
            tail: 2,
            nen: 2,
            input: 2,
            load: 2,
            ..Default::default()
        };
        let master = ctx.new_template(cell(equal_halves(), lat)).unwrap();
        let data = master.data();
        assert!(!master.has_port("biasp_s"));
        let inner = (data.out_s.0.max(data.out_l.0), data.out_s.1.min(data.out_l.1));
        let mut tracks = Vec::new();
        for name in ["biasn_s", "biasp_l"] {
            let pins: Vec<_> = master.port_pins_iter(name, None).unwrap().collect();
            assert_eq!(pins.len(), 1, "{name}");
            assert_eq!(pins[0].layer(), data.vm_layer);
            let idx = pins[0].track_id().base_index();
            assert!(inner.0 < idx && idx < inner.1, "{name} on track {idx}");
            tracks.push(idx);
        }
        assert_eq!(tracks, data.bias_tracks);
        assert_ne!(tracks[0], tracks[1]);
        assert_no_shorts(ctx.grid(), master.template());
    }

    #[test]
    fn flipped_cell_has_no_shorts() {
        let ctx = demo_ctx();
        let mut flipped = cell(equal_halves(), equal_halves());
        flipped.flip_sign = true;
        let master = ctx.new_template(flipped).unwrap();
        assert_no_shorts(ctx.grid(), master.template());
    }
}
