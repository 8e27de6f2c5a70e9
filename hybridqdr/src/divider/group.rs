//! Pitch-matched divider groups and the divider column.

use arcstr::ArcStr;
use geometry::prelude::*;
use routing::{Alignment, HalfInt, RoundingMode, TrackId, TrackType, WireArray};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clk_div::SinClkDivider;
use super::retimer::EnableRetimer;
use super::{vm_pair, DigitalParams, DividerSegs};
use crate::error::{Error, Result};
use crate::placer::RelPlace;
use crate::template::{Generator, InstanceId, TemplateBuilder, TrackConnect};

/// An enable retimer stacked upside down on a clock divider.
///
/// Both blocks are widened to the same number of fingers. The retimer
/// output `en3` drives the divider enable, and the clocks of both blocks
/// are joined and brought up to the second horizontal routing layer.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DividerGroup {
    /// Row parameters.
    pub params: DigitalParams,
    /// Segment counts.
    pub seg: DividerSegs,
    /// The minimum total width, in fingers.
    #[serde(default)]
    pub fg_min: u32,
}

/// Data published by a [`DividerGroup`].
#[derive(Debug, Clone)]
pub struct DividerGroupData {
    /// The width of both blocks, in fingers.
    pub fg_tot: u32,
    /// The source/drain pitch.
    pub sd_pitch: i64,
    /// The horizontal tracks of `clkp` and `clkn`.
    pub clk_tracks: (HalfInt, HalfInt),
}

/// Pins of the divider exported by a group.
const DIV_PINS: [&str; 5] = ["q", "qb", "scan_s", "nen", "pen"];
/// Pins of the retimer exported by a group.
const RET_PINS: [&str; 3] = ["en", "en2", "en3"];

impl Generator for DividerGroup {
    type Data = DividerGroupData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("divider_group")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let ctx = b.ctx().clone();
        let grid = b.grid_arc();
        let tech = b.tech().clone();
        let (vm, xm) = (tech.vm_layer(), tech.xm_layer());
        grid.require_dir(xm, Dir::Horiz)?;

        let mut div = ctx.new_template(SinClkDivider {
            params: self.params.clone(),
            seg: self.seg,
            fg_min: self.fg_min,
        })?;
        let mut ret = ctx.new_template(EnableRetimer {
            params: self.params.clone(),
            seg: self.seg.retimer,
            fg_min: self.fg_min,
        })?;
        let fg_tot = div.data().fg_tot.max(ret.data().fg_tot);
        if div.data().fg_tot < fg_tot {
            div = ctx.new_template_with(&div, |d| d.fg_min = fg_tot)?;
        }
        if ret.data().fg_tot < fg_tot {
            ret = ctx.new_template_with(&ret, |r| r.fg_min = fg_tot)?;
        }
        if div.data().fg_tot != ret.data().fg_tot {
            return Err(Error::invariant(format!(
                "divider ({}) and retimer ({}) widths differ after equalization",
                div.data().fg_tot,
                ret.data().fg_tot
            )));
        }

        let div_id = b.relplace(div.template(), "XDIV", RelPlace::origin())?;
        let ret_id = b.relplace(
            ret.template(),
            "XRET",
            RelPlace::beside(div_id, Side::Top).orient(Orientation::MX),
        )?;

        let tm = ctx.track_manager(self.params.tr_tables.clone(), true);

        // The retimed enable drives the divider enable on a vertical wire
        // left of the retimer output.
        let en3 = b.inst_pins(ret_id, "en3")?;
        let mut en_warrs = b.inst_pins(div_id, "en")?;
        let en3_left = en3
            .iter()
            .map(|w| w.lower())
            .min()
            .ok_or_else(|| Error::UnknownPort(arcstr::literal!("en3")))?;
        let en_ty = TrackType::from("sig");
        let en_w = tm.get_width(vm, &en_ty);
        let en_idx = grid.find_next_track(vm, en3_left, en_w, false, RoundingMode::Nearest)?;
        en_warrs.extend(en3);
        b.connect_to_tracks(&en_warrs, TrackId::new(vm, en_idx, en_w), TrackConnect::default())?;

        // Clocks of both blocks meet on a vertical pair, then go up.
        let mut clkp = b.inst_pins(div_id, "clkp")?;
        clkp.extend(b.inst_pins(ret_id, "clkp")?);
        let mut clkn = b.inst_pins(div_id, "clkn")?;
        clkn.extend(b.inst_pins(ret_id, "clkn")?);
        let clk_left = clkp
            .iter()
            .chain(clkn.iter())
            .map(WireArray::lower)
            .min()
            .ok_or_else(|| Error::UnknownPort(arcstr::literal!("clkp")))?;
        let (vp_idx, vn_idx, vm_w) = vm_pair(b, &tm, clk_left, "clk")?;
        let (vp, vn) = b.connect_differential_tracks(
            &clkp,
            &clkn,
            vm,
            vp_idx,
            vn_idx,
            vm_w,
            TrackConnect::default(),
        )?;

        let bbox = b
            .instance(div_id)?
            .bound_box()
            .union(b.instance(ret_id)?.bound_box());
        let clk_ty = TrackType::from("clk");
        let xm_w = tm.get_width(xm, &clk_ty);
        let ntr = HalfInt::new(bbox.height() / grid.get_track_pitch(xm)?);
        let start = grid.find_next_track(xm, bbox.bot(), 1, false, RoundingMode::Up)?;
        let locs = tm.align_wires(xm, &[clk_ty.clone(), clk_ty], ntr, Alignment::Center, start)?;
        let (xp, xn) = b.connect_differential_tracks(
            &[vp],
            &[vn],
            xm,
            locs[0],
            locs[1],
            xm_w,
            TrackConnect::default(),
        )?;
        b.add_pin("clkp", xp)?;
        b.add_pin("clkn", xn)?;

        for port in DIV_PINS {
            b.reexport(div_id, port, None)?;
        }
        for port in RET_PINS {
            b.reexport(ret_id, port, None)?;
        }
        for id in [div_id, ret_id] {
            b.reexport(id, "VDD", None)?;
            b.reexport(id, "VSS", None)?;
        }

        b.set_size_from_bound_box(xm, bbox)?;
        debug!(fg_tot, "drew divider group");
        Ok(DividerGroupData {
            fg_tot,
            sd_pitch: div.data().sd_pitch,
            clk_tracks: (locs[0], locs[1]),
        })
    }
}

/// Two divider groups stacked, one per quadrature clock pair.
///
/// Ports of group `i` are exported with the suffix `<i>`; supplies are
/// shared.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DividerColumn {
    /// Row parameters.
    pub params: DigitalParams,
    /// Segment counts.
    pub seg: DividerSegs,
    /// The minimum total width, in fingers.
    #[serde(default)]
    pub fg_min: u32,
}

/// Data published by a [`DividerColumn`].
#[derive(Debug, Clone)]
pub struct DividerColumnData {
    /// The width of every group, in fingers.
    pub fg_tot: u32,
}

impl Generator for DividerColumn {
    type Data = DividerColumnData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("divider_column")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let ctx = b.ctx().clone();
        let group = ctx.new_template(DividerGroup {
            params: self.params.clone(),
            seg: self.seg,
            fg_min: self.fg_min,
        })?;

        let mut ids: Vec<InstanceId> = Vec::with_capacity(2);
        for i in 0..2 {
            let place = match ids.last() {
                None => RelPlace::origin(),
                Some(prev) => RelPlace::beside(*prev, Side::Top),
            };
            ids.push(b.relplace(group.template(), format!("XGRP{i}"), place)?);
        }

        let mut bbox: Option<Rect> = None;
        for (i, id) in ids.iter().enumerate() {
            let inst = b.instance(*id)?;
            bbox = Some(bbox.map_or(inst.bound_box(), |r| r.union(inst.bound_box())));
            let ports: Vec<ArcStr> = inst.master().port_names().cloned().collect();
            for port in ports {
                let name = if port == "VDD" || port == "VSS" {
                    port.clone()
                } else {
                    ArcStr::from(format!("{port}<{i}>"))
                };
                b.reexport(*id, &port, Some(&name))?;
            }
        }
        let bbox = bbox.ok_or_else(|| Error::invariant("divider column placed no groups"))?;
        b.set_size_from_bound_box(group.top_layer(), bbox)?;
        Ok(DividerColumnData {
            fg_tot: group.data().fg_tot,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::tests::{assert_no_shorts, demo_ctx, demo_digital, demo_segs};

    fn group(fg_min: u32) -> DividerGroup {
        DividerGroup {
            params: demo_digital(),
            seg: demo_segs(),
            fg_min,
        }
    }

    #[test]
    fn group_blocks_share_one_width() {
        let ctx = demo_ctx();
        let master = ctx.new_template(group(0)).unwrap();
        let insts = master.instances();
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0].array_box().width(), insts[1].array_box().width());
        assert_eq!(
            insts[0].array_box().width(),
            master.data().fg_tot as i64 * master.data().sd_pitch
        );
        assert_eq!(insts[1].orientation(), Orientation::MX);
        assert_eq!(insts[1].array_box().bot(), insts[0].array_box().top());
    }

    #[test]
    fn group_has_no_shorts() {
        let ctx = demo_ctx();
        let master = ctx.new_template(group(0)).unwrap();
        assert_no_shorts(ctx.grid(), master.template());
    }

    #[test]
    fn group_honors_fg_min() {
        let ctx = demo_ctx();
        let narrow = ctx.new_template(group(0)).unwrap();
        let n = narrow.data().fg_tot + 8;
        let wide = ctx.new_template(group(n)).unwrap();
        assert_eq!(wide.data().fg_tot, n);
    }

    #[test]
    fn group_clocks_are_on_the_top_layer() {
        let ctx = demo_ctx();
        let master = ctx.new_template(group(0)).unwrap();
        let xm = ctx.tech().xm_layer();
        let clkp = *master.port_pins_iter("clkp", None).unwrap().next().unwrap();
        let clkn = *master.port_pins_iter("clkn", None).unwrap().next().unwrap();
        assert_eq!(clkp.layer(), xm);
        assert_eq!(clkp.span(), clkn.span());
        assert_ne!(clkp.track_id().base_index(), clkn.track_id().base_index());
    }

    #[test]
    fn column_suffixes_group_ports() {
        let ctx = demo_ctx();
        let master = ctx
            .new_template(DividerColumn {
                params: demo_digital(),
                seg: demo_segs(),
                fg_min: 0,
            })
            .unwrap();
        for name in ["clkp<0>", "clkn<1>", "en3<0>", "q<1>", "VDD", "VSS"] {
            assert!(master.has_port(name), "missing {name}");
        }
        assert!(!master.has_port("VDD<0>"));
        assert_eq!(master.instances().len(), 2);
    }
}
