//! A divide-by-two clock divider with a sinusoidal clock input.

use arcstr::ArcStr;
use routing::{HalfInt, LayerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    band_track, draw_devices, pack_columns, round_up, vm_pair, Device, DigitalParams,
    DigitalTracks, DividerSegs,
};
use crate::analog::{RowLayoutInfo, RowSpec, WireNames, WireRole};
use crate::error::{Error, Result};
use crate::laygo::LaygoBase;
use crate::tech::MosType;
use crate::template::{Generator, TemplateBuilder, TrackConnect};

/// Horizontal nets exported as pins.
const HM_PINS: [&str; 6] = ["clkp", "clkn", "en", "scan_s", "nen", "pen"];

/// Device rows, bottom to top, between the tap rows.
const ROW_TAIL: usize = 1;
const ROW_INT: usize = 2;
const ROW_DRV: usize = 3;
const ROW_PDRV: usize = 4;

/// A divide-by-two clock divider.
///
/// The blocks are placed left to right: an enable buffer producing `nen`
/// and `pen`, an integrating stage clocked by `clkp`, a clocked latch
/// holding `q`/`qb`, and pull-downs that override the state when
/// `scan_s` or `nen` is high. The state nodes are joined on vertical
/// wires.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SinClkDivider {
    /// Row parameters.
    pub params: DigitalParams,
    /// Segment counts.
    pub seg: DividerSegs,
    /// The minimum total width, in fingers.
    #[serde(default)]
    pub fg_min: u32,
}

/// Data published by a [`SinClkDivider`].
#[derive(Debug, Clone)]
pub struct SinClkDividerData {
    /// The total number of fingers.
    pub fg_tot: u32,
    /// The number of fingers the devices need.
    pub fg_intrinsic: u32,
    /// The source/drain pitch.
    pub sd_pitch: i64,
    /// The row stack.
    pub row_info: RowLayoutInfo,
    /// The vertical tracks of `q` and `qb`.
    pub q_tracks: (HalfInt, HalfInt),
    /// The vertical layer of `q` and `qb`.
    pub vm_layer: LayerId,
}

#[derive(Serialize)]
struct DividerSchParams<'a> {
    lch: Decimal,
    w_n: u32,
    w_p: u32,
    th_n: &'a ArcStr,
    th_p: &'a ArcStr,
    seg: &'a DividerSegs,
    fg_tot: u32,
}

impl SinClkDivider {
    fn rows(&self) -> Vec<RowSpec> {
        let p = &self.params;
        vec![
            p.nch(
                WireNames::default()
                    .with(WireRole::G, ["clk", "clk"])
                    .with(WireRole::Ds, ["sig", "sig"]),
            ),
            p.nch(
                WireNames::default()
                    .with(WireRole::G, ["sig", "sig"])
                    .with(WireRole::Ds, ["sig", "sig"]),
            ),
            p.nch(
                WireNames::default()
                    .with(WireRole::G, ["sig", "sig", "sig"])
                    .with(WireRole::Ds, ["sig", "sig", "sig"]),
            ),
            p.pch(WireNames::default().with(WireRole::G, ["sig", "sig"])),
        ]
    }

    fn tracks(&self, base: &LaygoBase<'_>) -> Result<DigitalTracks> {
        let mut t = DigitalTracks::default();
        t.put("clkp", band_track(base, ROW_TAIL, WireRole::G, 0, "clk")?);
        t.put("clkn", band_track(base, ROW_TAIL, WireRole::G, 1, "clk")?);
        t.put("tail", band_track(base, ROW_TAIL, WireRole::Ds, 0, "sig")?);
        t.put("foot", band_track(base, ROW_TAIL, WireRole::Ds, 1, "sig")?);
        t.put("midp", band_track(base, ROW_INT, WireRole::Ds, 0, "sig")?);
        t.put("midn", band_track(base, ROW_INT, WireRole::Ds, 1, "sig")?);
        t.put("en", band_track(base, ROW_DRV, WireRole::G, 0, "sig")?);
        t.put("nen", band_track(base, ROW_DRV, WireRole::G, 1, "sig")?);
        t.put("scan_s", band_track(base, ROW_DRV, WireRole::G, 2, "sig")?);
        t.put("q", band_track(base, ROW_DRV, WireRole::Ds, 0, "sig")?);
        t.put("qb", band_track(base, ROW_DRV, WireRole::Ds, 1, "sig")?);
        t.put("pen", band_track(base, ROW_DRV, WireRole::Ds, 2, "sig")?);
        // The integrating stage and the PMOS latch read the state on
        // their own tracks.
        t.put_row("qb", ROW_INT, band_track(base, ROW_INT, WireRole::G, 0, "sig")?);
        t.put_row("q", ROW_INT, band_track(base, ROW_INT, WireRole::G, 1, "sig")?);
        t.put_row("q", ROW_PDRV, band_track(base, ROW_PDRV, WireRole::G, 0, "sig")?);
        t.put_row("qb", ROW_PDRV, band_track(base, ROW_PDRV, WireRole::G, 1, "sig")?);
        Ok(t)
    }

    /// The starting column of each block and the total width.
    fn columns(&self, sep: u32) -> (Vec<u32>, u32) {
        let s = &self.seg;
        pack_columns(&[2 * s.inv, 2 * s.int, 2 * s.sr, 2 * s.nor], sep)
    }

    fn devices(&self, cols: &[u32]) -> Vec<Device> {
        let s = &self.seg;
        let (c_inv, c_int, c_sr, c_nor) = (cols[0], cols[1], cols[2], cols[3]);
        vec![
            Device::new(ROW_DRV, c_inv, s.inv, "en", "VSS", "nen"),
            Device::new(ROW_PDRV, c_inv, s.inv, "en", "VDD", "nen"),
            Device::new(ROW_DRV, c_inv + s.inv, s.inv, "nen", "VSS", "pen"),
            Device::new(ROW_PDRV, c_inv + s.inv, s.inv, "nen", "VDD", "pen"),
            Device::new(ROW_TAIL, c_int, 2 * s.int, "clkp", "VSS", "tail"),
            Device::new(ROW_INT, c_int, s.int, "qb", "tail", "midp"),
            Device::new(ROW_INT, c_int + s.int, s.int, "q", "tail", "midn"),
            Device::new(ROW_PDRV, c_int, s.int, "clkp", "VDD", "midp"),
            Device::new(ROW_PDRV, c_int + s.int, s.int, "clkp", "VDD", "midn"),
            Device::new(ROW_TAIL, c_sr, 2 * s.sr, "clkn", "VSS", "foot"),
            Device::new(ROW_DRV, c_sr, s.sr, "midp", "foot", "qb"),
            Device::new(ROW_DRV, c_sr + s.sr, s.sr, "midn", "foot", "q"),
            Device::new(ROW_PDRV, c_sr, s.sr, "q", "VDD", "qb"),
            Device::new(ROW_PDRV, c_sr + s.sr, s.sr, "qb", "VDD", "q"),
            Device::new(ROW_DRV, c_nor, s.nor, "scan_s", "VSS", "q"),
            Device::new(ROW_DRV, c_nor + s.nor, s.nor, "nen", "VSS", "qb"),
        ]
    }
}

impl Generator for SinClkDivider {
    type Data = SinClkDividerData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("sin_clk_divider")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let s = &self.seg;
        if [s.inv, s.int, s.sr, s.nor].contains(&0) {
            return Err(Error::config(format!(
                "every clock divider block needs at least one segment, got {s:?}"
            )));
        }
        let tech = b.tech().clone();
        let vm = tech.vm_layer();
        let (cols, fg_intrinsic) = self.columns(tech.laygo_sep());
        let fg_tot = round_up(fg_intrinsic.max(self.fg_min), tech.fg_unit);
        let p = &self.params;
        b.set_sch_params(&DividerSchParams {
            lch: p.lch,
            w_n: p.w_n,
            w_p: p.w_p,
            th_n: &p.th_n,
            th_p: &p.th_p,
            seg: &self.seg,
            fg_tot,
        })?;

        let tm = b.ctx().track_manager(p.tr_tables.clone(), true);
        let mut base = LaygoBase::draw_base(b, tm, &p.plan(self.rows(), vm))?;
        let tracks = self.tracks(&base)?;
        let hm_wires = draw_devices(&mut base, &self.devices(&cols), &tracks, fg_tot)?;
        if fg_tot > fg_intrinsic {
            debug!(fg_tot, fg_intrinsic, "padded clock divider");
        }

        let opts = p.pin_opts();
        for name in HM_PINS {
            let wires = hm_wires
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnknownNet(ArcStr::from(name)))?;
            for warr in base.connect_wires(&wires)? {
                base.add_pin_with(name, warr, opts.clone())?;
            }
        }

        // The state nodes meet on vertical wires centered on the latch.
        let sd_pitch = base.sd_pitch();
        let center = (cols[2] + s.sr) as i64 * sd_pitch;
        let (idx_q, idx_qb, width) = vm_pair(&base, base.tm(), center, "sig")?;
        let q_hm = hm_wires.get("q").cloned().unwrap_or_default();
        let qb_hm = hm_wires.get("qb").cloned().unwrap_or_default();
        let (q, qb) = base.connect_differential_tracks(
            &q_hm,
            &qb_hm,
            vm,
            idx_q,
            idx_qb,
            width,
            TrackConnect::default(),
        )?;
        base.add_pin_with("q", q, opts.clone())?;
        base.add_pin_with("qb", qb, opts.clone())?;

        for (kind, net) in [(MosType::Ntap, "VDD"), (MosType::Ptap, "VSS")] {
            for warr in base.supply_wires(kind)? {
                base.add_pin_with(net, warr, opts.clone())?;
            }
        }

        let row_info = base.finish()?;
        Ok(SinClkDividerData {
            fg_tot,
            fg_intrinsic,
            sd_pitch,
            row_info,
            q_tracks: (idx_q, idx_qb),
            vm_layer: vm,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::tests::{demo_ctx, demo_divider};

    #[test]
    fn divider_is_padded_to_fg_min() {
        let ctx = demo_ctx();
        let div = ctx.new_template(demo_divider(0)).unwrap();
        let intrinsic = div.data().fg_intrinsic;
        assert_eq!(div.data().fg_tot, intrinsic);

        let n = intrinsic + 6;
        let wide = ctx.new_template_with(&div, |d| d.fg_min = n).unwrap();
        assert_eq!(wide.data().fg_tot, n);
        assert_eq!(wide.bound_box().width(), n as i64 * wide.data().sd_pitch);
        assert_eq!(wide.data().row_info.fg_tot, n);
    }

    #[test]
    fn fg_min_below_the_intrinsic_width_is_ignored() {
        let ctx = demo_ctx();
        let div = ctx.new_template(demo_divider(2)).unwrap();
        assert_eq!(div.data().fg_tot, div.data().fg_intrinsic);
    }

    #[test]
    fn divider_exports_its_control_pins() {
        let ctx = demo_ctx();
        let div = ctx.new_template(demo_divider(0)).unwrap();
        for name in ["clkp", "clkn", "en", "q", "qb", "scan_s", "nen", "pen", "VDD", "VSS"] {
            assert!(div.has_port(name), "missing {name}");
        }
        let q = *div.port_pins_iter("q", None).unwrap().next().unwrap();
        assert_eq!(q.layer(), div.data().vm_layer);
        let (idx_q, idx_qb) = div.data().q_tracks;
        assert!(idx_q < idx_qb);
    }

    #[test]
    fn empty_blocks_are_rejected() {
        let ctx = demo_ctx();
        let mut div = demo_divider(0);
        div.seg.nor = 0;
        assert!(matches!(ctx.new_template(div), Err(Error::Config(_))));
    }
}
