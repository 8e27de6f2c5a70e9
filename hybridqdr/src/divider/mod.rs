//! The clock divider column.
//!
//! A [`SinClkDivider`](clk_div::SinClkDivider) and an
//! [`EnableRetimer`](retimer::EnableRetimer) are drawn on digital rows and
//! widened to the same number of fingers, so a
//! [`DividerGroup`](group::DividerGroup) pitch-matches the analog rows of
//! the summer column. Two groups stack into a
//! [`DividerColumn`](group::DividerColumn).

use arcstr::ArcStr;
use geometry::prelude::Orientation;
use indexmap::IndexMap;
use routing::{HalfInt, RoundingMode, TrackId, TrackManager, TrackTables, TrackType, WireArray};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analog::{MosConnOpts, RowSpec, WireNames, WireRole};
use crate::error::{Error, Result};
use crate::laygo::{GateLoc, LaygoBase, LaygoRowPlan};
use crate::tech::MosType;
use crate::template::{PinOpts, TemplateBuilder, TrackConnect};

pub mod clk_div;
pub mod group;
pub mod retimer;

pub use clk_div::SinClkDivider;
pub use group::{DividerColumn, DividerGroup};
pub use retimer::EnableRetimer;

/// Row parameters shared by the digital blocks of the divider column.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DigitalParams {
    /// The channel length, in meters.
    pub lch: Decimal,
    /// The substrate tap width.
    pub ptap_w: u32,
    /// The well tap width.
    pub ntap_w: u32,
    /// The NMOS width.
    pub w_n: u32,
    /// The PMOS width.
    pub w_p: u32,
    /// The NMOS threshold flavor.
    #[serde(default)]
    pub th_n: ArcStr,
    /// The PMOS threshold flavor.
    #[serde(default)]
    pub th_p: ArcStr,
    /// Wire widths and spacings of the digital rows.
    pub tr_tables: TrackTables,
    /// Whether pin labels are visible.
    #[serde(default)]
    pub show_pins: bool,
}

/// Segment counts of the divider column blocks.
///
/// Every count must be a multiple of the digital column unit.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DividerSegs {
    /// Each inverter of the enable buffer.
    pub inv: u32,
    /// Each half of the integrating stage.
    pub int: u32,
    /// Each half of the output latch.
    pub sr: u32,
    /// Each override pull-down.
    pub nor: u32,
    /// Each latch of the enable retimer.
    pub retimer: u32,
}

impl DigitalParams {
    fn nch(&self, wires: WireNames) -> RowSpec {
        RowSpec {
            kind: MosType::Nch,
            w: self.w_n,
            th: self.th_n.clone(),
            orient: Default::default(),
            wires,
        }
    }

    fn pch(&self, wires: WireNames) -> RowSpec {
        RowSpec {
            kind: MosType::Pch,
            w: self.w_p,
            th: self.th_p.clone(),
            orient: Orientation::MX,
            wires,
        }
    }

    fn tap(&self, kind: MosType) -> RowSpec {
        let w = if kind == MosType::Ptap {
            self.ptap_w
        } else {
            self.ntap_w
        };
        RowSpec {
            kind,
            w,
            th: ArcStr::new(),
            orient: Default::default(),
            wires: WireNames::default(),
        }
    }

    /// A row plan with tap rows around the given device rows.
    fn plan(&self, rows: Vec<RowSpec>, top_layer: usize) -> LaygoRowPlan {
        let mut all = Vec::with_capacity(rows.len() + 2);
        all.push(self.tap(MosType::Ptap));
        all.extend(rows);
        all.push(self.tap(MosType::Ntap));
        LaygoRowPlan {
            lch: self.lch,
            rows: all,
            top_layer,
        }
    }

    fn pin_opts(&self) -> PinOpts {
        PinOpts {
            hide: !self.show_pins,
            ..Default::default()
        }
    }
}

/// A digital device: row, column, segments and terminal nets.
struct Device {
    row: usize,
    col: u32,
    seg: u32,
    g: ArcStr,
    s: ArcStr,
    d: ArcStr,
}

impl Device {
    fn new(
        row: usize,
        col: u32,
        seg: u32,
        g: impl Into<ArcStr>,
        s: impl Into<ArcStr>,
        d: impl Into<ArcStr>,
    ) -> Self {
        Self {
            row,
            col,
            seg,
            g: g.into(),
            s: s.into(),
            d: d.into(),
        }
    }
}

/// The horizontal track of each net, with per-row overrides.
#[derive(Default)]
struct DigitalTracks {
    by_row: IndexMap<(ArcStr, usize), TrackId>,
    by_net: IndexMap<ArcStr, TrackId>,
}

impl DigitalTracks {
    fn put(&mut self, net: impl Into<ArcStr>, tid: TrackId) {
        self.by_net.insert(net.into(), tid);
    }

    fn put_row(&mut self, net: impl Into<ArcStr>, row: usize, tid: TrackId) {
        self.by_row.insert((net.into(), row), tid);
    }

    fn get(&self, net: &str, row: usize) -> Result<TrackId> {
        self.by_row
            .get(&(ArcStr::from(net), row))
            .or_else(|| self.by_net.get(net))
            .copied()
            .ok_or_else(|| Error::UnknownNet(ArcStr::from(net)))
    }
}

/// The track of wire `idx` of band `role` in row `row`, sized for wire type `ty`.
fn band_track(
    base: &LaygoBase<'_>,
    row: usize,
    role: WireRole,
    idx: usize,
    ty: &str,
) -> Result<TrackId> {
    let hm = base.hm_layer();
    let width = base.tm().get_width(hm, &TrackType::from(ty));
    Ok(TrackId::new(hm, base.get_track_index(row, role, idx)?, width))
}

/// Draws `devices`, pads the rows to `fg_tot` fingers and connects every
/// terminal to its horizontal track.
///
/// Supply terminals are tied to the tap row wires. Returns the horizontal
/// wires of every other net.
fn draw_devices(
    base: &mut LaygoBase<'_>,
    devices: &[Device],
    tracks: &DigitalTracks,
    fg_tot: u32,
) -> Result<IndexMap<ArcStr, Vec<WireArray>>> {
    let mut hookups: IndexMap<(ArcStr, TrackId), Vec<WireArray>> = IndexMap::new();
    for dev in devices {
        let opts = MosConnOpts::nets(dev.g.clone(), dev.s.clone(), dev.d.clone());
        let ports = base.add_laygo_mos(dev.row, dev.col, dev.seg, GateLoc::S, &opts)?;
        for (net, warr) in [(&dev.g, ports.g), (&dev.s, ports.s), (&dev.d, ports.d)] {
            if net == "VSS" || net == "VDD" {
                continue;
            }
            let tid = tracks.get(net, dev.row)?;
            hookups.entry((net.clone(), tid)).or_default().push(warr);
        }
    }
    base.fill_space(fg_tot)?;

    for (kind, net) in [(MosType::Ptap, "VSS"), (MosType::Ntap, "VDD")] {
        let sup = base.supply_wires(kind)?;
        let first = sup
            .first()
            .ok_or_else(|| Error::invariant(format!("no {net} wire after filling the rows")))?;
        let span = first.span();
        base.connect_net_to_tracks(net, first.track_id(), TrackConnect::spanning(span))?;
    }

    let mut out: IndexMap<ArcStr, Vec<WireArray>> = IndexMap::new();
    for ((net, tid), warrs) in hookups {
        let track = base.connect_to_tracks(&warrs, tid, TrackConnect::default())?;
        base.add_net(net.clone(), track);
        out.entry(net).or_default().push(track);
    }
    Ok(out)
}

/// The columns taken by consecutive blocks of the given widths, separated
/// by `sep`, and the total width.
fn pack_columns(widths: &[u32], sep: u32) -> (Vec<u32>, u32) {
    let mut cols = Vec::with_capacity(widths.len());
    let mut col = 0;
    for (i, w) in widths.iter().enumerate() {
        if i > 0 {
            col += sep;
        }
        cols.push(col);
        col += w;
    }
    (cols, col)
}

/// The smallest multiple of `unit` that is at least `fg`.
fn round_up(fg: u32, unit: u32) -> u32 {
    fg.div_ceil(unit) * unit
}

/// Two adjacent vertical tracks of type `ty`, the first one nearest `coord`.
fn vm_pair(
    b: &TemplateBuilder,
    tm: &TrackManager,
    coord: i64,
    ty: &str,
) -> Result<(HalfInt, HalfInt, u32)> {
    let vm = b.tech().vm_layer();
    let ty = TrackType::from(ty);
    let width = tm.get_width(vm, &ty);
    let lo = b
        .grid()
        .find_next_track(vm, coord, width, false, RoundingMode::Nearest)?;
    let hi = tm.get_next_track(vm, lo, &ty, &ty, true)?;
    Ok((lo, hi, width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_packed_with_separation() {
        let (cols, total) = pack_columns(&[4, 8, 2], 2);
        assert_eq!(cols, vec![0, 6, 16]);
        assert_eq!(total, 18);
        assert_eq!(pack_columns(&[], 2), (vec![], 0));
    }

    #[test]
    fn widths_round_to_the_column_unit() {
        assert_eq!(round_up(7, 2), 8);
        assert_eq!(round_up(8, 2), 8);
        assert_eq!(round_up(0, 2), 0);
    }
}
