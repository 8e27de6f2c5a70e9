//! Analog transistor row templates.
//!
//! An [`AnalogBase`] stacks a substrate tap row, NMOS rows, PMOS rows and a
//! well tap row, all with the same number of fingers. Devices are drawn by
//! column and their terminals are routed to the horizontal wire bands of
//! their rows.

use std::ops::{Deref, DerefMut};

use arcstr::ArcStr;
use geometry::prelude::*;
use routing::{HalfInt, LayerId, TrackId, TrackManager, WireArray};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::tech::MosType;
use crate::template::TemplateBuilder;

pub mod mos;
pub mod rows;

pub use mos::{MosConnOpts, MosPorts};
pub use rows::{RowLayoutInfo, RowSpec, WireNames, WireRole};
use rows::RowStack;

/// One transistor row of an [`AnalogRowPlan`].
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MosRow {
    /// The device width.
    pub w: u32,
    /// The threshold flavor.
    #[serde(default)]
    pub th: ArcStr,
    /// The row orientation.
    #[serde(default)]
    pub orient: Orientation,
    /// The wire bands.
    #[serde(default)]
    pub wires: WireNames,
}

/// The rows of an analog template.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AnalogRowPlan {
    /// The channel length, in meters.
    pub lch: Decimal,
    /// The substrate tap width.
    pub ptap_w: u32,
    /// The well tap width.
    pub ntap_w: u32,
    /// NMOS rows, from bottom to top.
    pub nch: Vec<MosRow>,
    /// PMOS rows, from bottom to top.
    pub pch: Vec<MosRow>,
    /// The number of fingers in every row.
    pub fg_tot: u32,
    /// The top routing layer of the template.
    pub top_layer: LayerId,
}

impl AnalogRowPlan {
    fn specs(&self) -> Vec<RowSpec> {
        let tap = |kind, w, orient| RowSpec {
            kind,
            w,
            th: ArcStr::default(),
            orient,
            wires: WireNames::default(),
        };
        let mos = |kind, row: &MosRow| RowSpec {
            kind,
            w: row.w,
            th: row.th.clone(),
            orient: row.orient,
            wires: row.wires.clone(),
        };
        std::iter::once(tap(MosType::Ptap, self.ptap_w, Orientation::R0))
            .chain(self.nch.iter().map(|r| mos(MosType::Nch, r)))
            .chain(self.pch.iter().map(|r| mos(MosType::Pch, r)))
            .chain(std::iter::once(tap(MosType::Ntap, self.ntap_w, Orientation::MX)))
            .collect()
    }
}

/// A template builder with an analog row stack drawn in it.
pub struct AnalogBase<'a> {
    b: &'a mut TemplateBuilder,
    tm: TrackManager,
    rows: RowStack,
    fg_tot: u32,
    top_layer: LayerId,
}

impl<'a> AnalogBase<'a> {
    /// Lays out the rows of `plan`.
    pub fn draw_base(
        b: &'a mut TemplateBuilder,
        tm: TrackManager,
        plan: &AnalogRowPlan,
    ) -> Result<Self> {
        if plan.fg_tot == 0 {
            return Err(Error::config("analog rows need at least one finger"));
        }
        let rows = RowStack::new(&tm, b.tech(), plan.specs(), Some(plan.fg_tot))?;
        debug!(
            fg_tot = plan.fg_tot,
            nrows = rows.rows().len(),
            height = rows.height(),
            "drew analog rows"
        );
        Ok(Self {
            b,
            tm,
            rows,
            fg_tot: plan.fg_tot,
            top_layer: plan.top_layer,
        })
    }

    /// The track manager.
    pub fn tm(&self) -> &TrackManager {
        &self.tm
    }

    /// The number of fingers in every row.
    pub fn fg_tot(&self) -> u32 {
        self.fg_tot
    }

    /// The source/drain pitch.
    pub fn sd_pitch(&self) -> i64 {
        self.rows.sd_pitch()
    }

    /// The horizontal row wire layer.
    pub fn hm_layer(&self) -> LayerId {
        self.rows.hm_layer()
    }

    /// The placed rows, from bottom to top.
    pub fn rows(&self) -> &[rows::Row] {
        self.rows.rows()
    }

    /// The track of wire `wire_idx` in band `role` of the `row_idx`-th row of kind `kind`.
    pub fn get_track_index(
        &self,
        kind: MosType,
        row_idx: usize,
        role: WireRole,
        wire_idx: usize,
    ) -> Result<HalfInt> {
        let pos = self.rows.row_pos(kind, row_idx)?;
        self.rows.track_index(pos, role, wire_idx)
    }

    /// The track of the first `name` wire in band `role` of a row.
    pub fn get_wire_id(
        &self,
        kind: MosType,
        row_idx: usize,
        role: WireRole,
        name: &str,
    ) -> Result<TrackId> {
        let pos = self.rows.row_pos(kind, row_idx)?;
        self.rows.wire_id(&self.tm, pos, role, name)
    }

    /// The supply track of the tap row of kind `kind`.
    pub fn get_sup_track(&self, kind: MosType) -> Result<TrackId> {
        let pos = self.rows.row_pos(kind, 0)?;
        let idx = self.rows.sup_track(pos)?;
        Ok(TrackId::new(self.hm_layer(), idx, 1))
    }

    /// Draws a transistor of `fg` fingers starting at column `col`.
    ///
    /// `sdir` and `ddir` give the direction of the source and drain
    /// connections: `0` toward the gate bands, `1` within the device and `2`
    /// toward the source/drain bands.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_mos_conn(
        &mut self,
        kind: MosType,
        row_idx: usize,
        col: u32,
        fg: u32,
        sdir: u8,
        ddir: u8,
        opts: &MosConnOpts,
    ) -> Result<MosPorts> {
        let pos = self.rows.row_pos(kind, row_idx)?;
        mos::draw_mos(self.b, &mut self.rows, pos, col, fg, sdir, ddir, opts)
    }

    /// Draws a decoupling capacitor whose source and drain connect to `sd_net`.
    pub fn draw_mos_decap(
        &mut self,
        kind: MosType,
        row_idx: usize,
        col: u32,
        fg: u32,
        g_net: &str,
        sd_net: &str,
    ) -> Result<MosPorts> {
        let min = self.b.tech().min_fg_decap;
        if fg < min {
            return Err(Error::config(format!(
                "decoupling capacitors need at least {min} fingers, got {fg}"
            )));
        }
        let opts = MosConnOpts::nets(g_net, sd_net, sd_net);
        self.draw_mos_conn(kind, row_idx, col, fg, 1, 1, &opts)
    }

    /// Turns every unused finger into a dummy tied to its tap row and draws
    /// the supply wires of the tap rows.
    ///
    /// Returns the `(VDD, VSS)` wires.
    pub fn fill_dummy(&mut self, vdd_width: u32, vss_width: u32) -> Result<(WireArray, WireArray)> {
        let dummies = mos::draw_dummies(self.b, &mut self.rows, self.fg_tot)?;
        let right = self.fg_tot as i64 * self.sd_pitch();
        let vdd_idx = self.get_sup_track(MosType::Ntap)?.base_index();
        let vss_idx = self.get_sup_track(MosType::Ptap)?.base_index();
        let hm = self.hm_layer();
        let vdd = self.b.add_wires(hm, vdd_idx, 0, right, vdd_width, 1, HalfInt::ZERO)?;
        let vss = self.b.add_wires(hm, vss_idx, 0, right, vss_width, 1, HalfInt::ZERO)?;
        self.b.add_net("VDD", vdd);
        self.b.add_net("VSS", vss);
        debug!(dummies, "filled unused fingers");
        Ok((vdd, vss))
    }

    /// Sets the template size from the row stack and publishes the row layout.
    pub fn finish(self) -> Result<RowLayoutInfo> {
        let width = self.fg_tot as i64 * self.sd_pitch();
        let bbox = Rect::from_sides(0, 0, width, self.rows.height());
        self.b.set_size_from_bound_box(self.top_layer, bbox)?;
        let info = self.rows.layout_info(self.fg_tot);
        self.b.set_row_layout_info(info.clone());
        Ok(info)
    }
}

impl Deref for AnalogBase<'_> {
    type Target = TemplateBuilder;

    fn deref(&self) -> &Self::Target {
        self.b
    }
}

impl DerefMut for AnalogBase<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.b
    }
}
