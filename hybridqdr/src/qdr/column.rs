//! The TapX column: four summer rows, their bias lanes and the divider column.

use arcstr::ArcStr;
use geometry::prelude::*;
use indexmap::IndexMap;
use routing::{HalfInt, LayerId, RoundingMode, WireArray};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::divider::DividerColumn;
use crate::error::{Error, Result};
use crate::placer::{PlacementGrid, RelPlace};
use crate::qdr::bias::{connect_bias_shields, BiasConfig, BiasInfo, BiasRouteOpts, BiasWire};
use crate::qdr::summer::TapXSummer;
use crate::template::{Generator, InstanceId, PinOpts, TemplateBuilder};

/// The way of each summer row, bottom to top.
///
/// Rows alternate between even and odd ways so that consecutive taps feed
/// forward without crossing.
pub const WAY_ORDER: [u32; 4] = [3, 0, 2, 1];

/// Bias nets routed in the lanes, in lane track order.
const BIAS_NAMES: [&str; 6] = [
    "biasp_m", "biasn_m", "biasp_a", "biasn_a", "biasp_d", "biasn_d",
];

/// Four summer rows between two shielded bias lanes, with a divider column
/// to the right.
///
/// The left lane serves the two lower rows and the right lane the two
/// upper rows, and each lane's shields tie to the supply of the row cells
/// next to it. Row pins are exported with the suffix `_<way>`; bias nets
/// and supplies keep their names. Cascode and sign inputs run the height
/// of their row, and the signal wires of every cell are blocked for later
/// vertical routes.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TapXColumn {
    /// The summer row drawn for every way.
    pub summer: TapXSummer,
    /// The divider column.
    pub divider: DividerColumn,
    /// Lane geometry. Must hold the vertical routing layer.
    pub bias_config: BiasConfig,
    /// Whether pin labels are visible.
    #[serde(default)]
    pub show_pins: bool,
}

/// Data published by a [`TapXColumn`].
#[derive(Debug, Clone)]
pub struct TapXColumnData {
    /// The number of fingers of each summer row.
    pub fg_tot: u32,
    /// The number of fingers of each divider block.
    pub fg_div: u32,
    /// The left and right bias lanes.
    pub lanes: [BiasInfo; 2],
    /// The way of each row, bottom to top.
    pub way_order: [u32; 4],
}

impl TapXColumn {
    /// Collects the bias wires of `rows` in lane order.
    fn lane_wires(b: &TemplateBuilder, rows: &[InstanceId]) -> Result<Vec<BiasWire>> {
        let mut by_name: IndexMap<ArcStr, Vec<WireArray>> = IndexMap::new();
        for name in BIAS_NAMES {
            for id in rows {
                if b.instance(*id)?.has_port(name) {
                    by_name
                        .entry(ArcStr::from(name))
                        .or_default()
                        .extend(b.inst_pins(*id, name)?);
                }
            }
        }
        Ok(by_name
            .into_iter()
            .map(|(name, warrs)| BiasWire { name, warrs })
            .collect())
    }

    /// The supply pins of `rows` at the cells nearest a lane.
    fn lane_supplies(
        b: &TemplateBuilder,
        rows: &[InstanceId],
        hm: LayerId,
        left: bool,
    ) -> Result<Vec<WireArray>> {
        let mut out = Vec::new();
        for id in rows {
            let pins = b.instance(*id)?.port_pins(b.grid(), "VSS", Some(hm))?;
            let edge = if left {
                pins.iter().map(WireArray::lower).min()
            } else {
                pins.iter().map(WireArray::upper).max()
            };
            let Some(edge) = edge else {
                continue;
            };
            out.extend(pins.into_iter().filter(|w| {
                if left {
                    w.lower() == edge
                } else {
                    w.upper() == edge
                }
            }));
        }
        Ok(out)
    }

    fn route_lane(
        &self,
        b: &mut TemplateBuilder,
        wires: &[BiasWire],
        lower: HalfInt,
        height: i64,
        supplies: &[WireArray],
    ) -> Result<BiasInfo> {
        let vm = b.tech().vm_layer();
        let cfg = self.bias_config.get(vm)?;
        let info = connect_bias_shields(
            b,
            vm,
            &self.bias_config,
            wires,
            cfg.offset_from_lower(lower),
            BiasRouteOpts {
                lower: Some(0),
                upper: Some(height),
                extend_tracks: true,
                ..Default::default()
            },
            supplies,
        )?;
        let opts = PinOpts {
            hide: !self.show_pins,
            ..Default::default()
        };
        for (name, warr) in info.names.iter().zip(info.wires.iter()) {
            b.add_pin_with(name.clone(), *warr, opts.clone())?;
        }
        b.add_pin("VSS", info.shields)?;
        Ok(info)
    }
}

/// The number of placement grid units needed to reach `coord`.
fn grid_units(coord: i64, unit: i64) -> i64 {
    coord.div_euclid(unit) + i64::from(coord.rem_euclid(unit) != 0)
}

impl Generator for TapXColumn {
    type Data = TapXColumnData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("tapx_column")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let ctx = b.ctx().clone();
        let grid = b.grid_arc();
        let tech = b.tech().clone();
        let (vm, xm) = (tech.vm_layer(), tech.xm_layer());
        grid.require_dir(vm, Dir::Vert)?;
        let cfg = *self.bias_config.get(vm)?;
        let pg = PlacementGrid::for_layer(&grid, xm)?;

        let summer = ctx.new_template(self.summer.clone())?;
        let divider = ctx.new_template(self.divider.clone())?;

        // The left lane starts at the origin; rows start past its upper shield.
        let left = cfg.tracks(cfg.offset_from_lower(HalfInt::ZERO), BIAS_NAMES.len());
        let left_edge = grid.track_to_coord(vm, left.upper_edge(&cfg) + HalfInt::HALF)?;
        let dx = grid_units(left_edge, pg.x);

        let mut rows: Vec<InstanceId> = Vec::with_capacity(WAY_ORDER.len());
        for (pos, way) in WAY_ORDER.iter().enumerate() {
            let orient = if pos % 2 == 1 {
                Orientation::MX
            } else {
                Orientation::R0
            };
            let place = match rows.last() {
                None => RelPlace::origin().shift(dx, 0),
                Some(prev) => RelPlace::beside(*prev, Side::Top),
            };
            let id = b.relplace(summer.template(), format!("XSUM{way}"), place.orient(orient))?;
            rows.push(id);
        }

        let rows_box = Rect::union_all(
            rows.iter()
                .map(|id| b.instance(*id).map(|inst| inst.bound_box()))
                .collect::<Result<Vec<_>>>()?,
        )
        .ok_or_else(|| Error::invariant("tapx column placed no rows"))?;
        let height = rows_box.top();

        // Keep later vertical routes off the signal wires of every cell.
        let sd = summer.data();
        let mut inputs = Vec::new();
        for (id, way) in rows.iter().zip(WAY_ORDER) {
            let inst = b.instance(*id)?;
            let rbox = inst.bound_box();
            let mut blocks = Vec::with_capacity(sd.block_intvs.len());
            for intv in sd.block_intvs.iter() {
                let a = inst.translate_master_coord(intv.start(), Dir::Horiz);
                let c = inst.translate_master_coord(intv.stop(), Dir::Horiz);
                blocks.push(Rect::from_spans(Span::new(a.min(c), a.max(c)), rbox.vspan()));
            }
            for (name, tr) in sd
                .main_track_info
                .iter()
                .chain(sd.ffe_track_info.iter())
                .chain(sd.dfe_track_info.iter())
            {
                let idx = inst.translate_master_track(&grid, vm, tr.idx)?;
                inputs.push((ArcStr::from(format!("{name}_{way}")), idx, tr.width, rbox.vspan()));
            }
            for (k, rect) in blocks.into_iter().enumerate() {
                b.add_blockage(vm, rect, format!("XSUM{way} cell {k}"));
            }
        }

        let hm = tech.hm_layer();
        let left_wires = Self::lane_wires(b, &rows[..2])?;
        if left_wires.is_empty() {
            return Err(Error::config("summer rows export no bias nets"));
        }
        let left_sup = Self::lane_supplies(b, &rows[..2], hm, true)?;
        let left_info = self.route_lane(b, &left_wires, HalfInt::ZERO, height, &left_sup)?;

        let right_lower = grid.find_next_track(vm, rows_box.right(), 1, false, RoundingMode::Up)?;
        let right_wires = Self::lane_wires(b, &rows[2..])?;
        let right_sup = Self::lane_supplies(b, &rows[2..], hm, false)?;
        let right_info = self.route_lane(b, &right_wires, right_lower, height, &right_sup)?;

        // Cascode and sign inputs run the height of their row.
        let mut input_names = Vec::with_capacity(inputs.len());
        for (name, idx, width, rows_y) in inputs {
            let le = grid.get_line_end_space(vm, width)?;
            let warr = b.add_wires(
                vm,
                idx,
                rows_y.start() + le,
                rows_y.stop() - le,
                width,
                1,
                HalfInt::ZERO,
            )?;
            b.add_pin(name.clone(), warr)?;
            input_names.push(name);
        }

        let div_dx = grid_units(right_info.p0, pg.x);
        let div_id = b.relplace(divider.template(), "XDIV", RelPlace::origin().shift(div_dx, 0))?;

        for (id, way) in rows.iter().zip(WAY_ORDER) {
            let ports: Vec<ArcStr> = b.instance(*id)?.master().port_names().cloned().collect();
            for port in ports {
                if port.starts_with("bias") {
                    continue;
                }
                let name = format!("{port}_{way}");
                if port == "VDD" || port == "VSS" {
                    b.reexport(*id, &port, None)?;
                } else if !input_names.iter().any(|n| n.as_str() == name) {
                    b.reexport(*id, &port, Some(&name))?;
                }
            }
        }
        let div_ports: Vec<ArcStr> = b.instance(div_id)?.master().port_names().cloned().collect();
        for port in div_ports {
            b.reexport(div_id, &port, None)?;
        }

        let bbox = rows_box
            .union(b.instance(div_id)?.bound_box())
            .union(Rect::from_sides(0, 0, right_info.p0, height));
        b.set_size_from_bound_box(xm, bbox)?;
        debug!(
            fg_tot = summer.data().fg_tot,
            left = left_info.names.len(),
            right = right_info.names.len(),
            "drew tapx column"
        );
        Ok(TapXColumnData {
            fg_tot: summer.data().fg_tot,
            fg_div: divider.data().fg_tot,
            lanes: [left_info, right_info],
            way_order: WAY_ORDER,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::tests::{assert_no_shorts, demo_column, demo_ctx};

    #[test]
    fn each_lane_carries_each_bias_net_once() {
        let ctx = demo_ctx();
        let col = ctx.new_template(demo_column(2, 2)).unwrap();
        for lane in col.data().lanes.iter() {
            for name in BIAS_NAMES {
                let n = lane.names.iter().filter(|n| *n == name).count();
                assert_eq!(n, 1, "{name} appears {n} times");
            }
        }
        assert!(col.has_port("cascp<1>_3"));
        assert!(col.has_port("cascn<1>_0"));
        assert!(col.has_port("biasn_m"));
        assert!(!col.has_port("biasn_m_3"));
    }

    #[test]
    fn rows_follow_the_way_order() {
        let ctx = demo_ctx();
        let col = ctx.new_template(demo_column(1, 2)).unwrap();
        let rows: Vec<_> = col
            .instances()
            .iter()
            .filter(|inst| inst.name().starts_with("XSUM"))
            .collect();
        assert_eq!(rows.len(), 4);
        let names: Vec<&str> = rows.iter().map(|inst| inst.name().as_str()).collect();
        assert_eq!(names, ["XSUM3", "XSUM0", "XSUM2", "XSUM1"]);
        for pair in rows.windows(2) {
            assert_eq!(pair[0].array_box().top(), pair[1].array_box().bot());
        }
        assert_eq!(rows[1].orientation(), Orientation::MX);
        assert_eq!(rows[2].orientation(), Orientation::R0);
    }

    #[test]
    fn rows_clear_the_left_lane_and_the_divider_clears_the_right() {
        let ctx = demo_ctx();
        let col = ctx.new_template(demo_column(1, 2)).unwrap();
        let [left, right] = &col.data().lanes;
        let mut xsum = None;
        let mut xdiv = None;
        for inst in col.instances() {
            match inst.name().as_str() {
                "XSUM3" => xsum = Some(inst.array_box()),
                "XDIV" => xdiv = Some(inst.array_box()),
                _ => {}
            }
        }
        let (xsum, xdiv) = (xsum.unwrap(), xdiv.unwrap());
        assert!(xsum.left() >= left.p0);
        let grid = ctx.grid();
        let vm = ctx.tech().vm_layer();
        let first_sig = grid.track_to_coord(vm, right.tracks[0].base_index()).unwrap();
        assert!(first_sig > xsum.right());
        assert!(xdiv.left() >= right.p0);
    }

    #[test]
    fn placement_units_round_up() {
        assert_eq!(grid_units(0, 100), 0);
        assert_eq!(grid_units(250, 100), 3);
        assert_eq!(grid_units(300, 100), 3);
    }

    #[test]
    fn fg_tot_matches_the_summer_cells() {
        let ctx = demo_ctx();
        let col = ctx.new_template(demo_column(2, 2)).unwrap();
        let summer = ctx.new_template(col.params().summer.clone()).unwrap();
        assert_eq!(col.data().fg_tot, summer.data().cell_fg.iter().sum::<u32>());
        assert!(col.has_port("clkp<0>"));
        assert!(col.has_port("VSS"));
    }

    #[test]
    fn column_has_no_shorts() {
        let ctx = demo_ctx();
        let col = ctx.new_template(demo_column(2, 2)).unwrap();
        assert_no_shorts(ctx.grid(), col.template());
    }

    #[test]
    fn lane_shields_tie_to_the_row_supply() {
        let ctx = demo_ctx();
        let col = ctx.new_template(demo_column(2, 2)).unwrap();
        let hm = ctx.tech().hm_layer();
        for lane in col.data().lanes.iter() {
            for idx in lane.shields.track_id().indices() {
                let tied = col
                    .vias()
                    .iter()
                    .any(|v| v.bot_layer == hm && v.top_track == idx);
                assert!(tied, "shield on track {idx} is floating");
            }
        }
    }

    #[test]
    fn tap_inputs_span_their_rows_and_cells_are_blocked() {
        let ctx = demo_ctx();
        let col = ctx.new_template(demo_column(2, 2)).unwrap();
        let summer = ctx.new_template(col.params().summer.clone()).unwrap();
        let grid = ctx.grid();
        let vm = ctx.tech().vm_layer();
        let sd = summer.data();
        let tr = sd
            .main_track_info
            .get("cascp<1>")
            .or_else(|| sd.ffe_track_info.get("cascp<1>"))
            .or_else(|| sd.dfe_track_info.get("cascp<1>"))
            .unwrap();
        let le = grid.get_line_end_space(vm, tr.width).unwrap();
        let row = col
            .instances()
            .iter()
            .find(|inst| inst.name().as_str() == "XSUM3")
            .unwrap()
            .bound_box();
        let pin = *col.port_pins_iter("cascp<1>_3", None).unwrap().next().unwrap();
        assert_eq!(pin.layer(), vm);
        assert_eq!((pin.lower(), pin.upper()), (row.bot() + le, row.top() - le));
        let blocked = col
            .blockages()
            .iter()
            .filter(|blk| blk.layer == vm && blk.owner.starts_with("XSUM3 "))
            .count();
        assert_eq!(blocked, sd.block_intvs.len());
    }
}
