//! Digital transistor rows.
//!
//! Digital rows place devices on a column grid of [`MosTech::fg_unit`]
//! fingers and grow to the right as devices are added. The final width is
//! set by [`LaygoBase::fill_space`].
//!
//! [`MosTech::fg_unit`]: crate::tech::MosTech::fg_unit

use std::ops::{Deref, DerefMut};

use geometry::prelude::*;
use routing::{HalfInt, LayerId, TrackId, TrackManager, WireArray};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analog::mos::{self, MosConnOpts, MosPorts};
use crate::analog::rows::{Row, RowLayoutInfo, RowSpec, RowStack, WireRole};
use crate::error::{Error, Result};
use crate::tech::MosType;
use crate::template::TemplateBuilder;

/// The rows of a digital template.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LaygoRowPlan {
    /// The channel length, in meters.
    pub lch: Decimal,
    /// The rows, from bottom to top. Tap rows carry the supplies.
    pub rows: Vec<RowSpec>,
    /// The top routing layer of the template.
    pub top_layer: LayerId,
}

/// Where the gate contacts of a digital device sit.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum GateLoc {
    /// On every finger.
    #[default]
    S,
    /// Only on fingers next to a drain.
    D,
}

/// A template builder with digital rows drawn in it.
pub struct LaygoBase<'a> {
    b: &'a mut TemplateBuilder,
    tm: TrackManager,
    rows: RowStack,
    top_layer: LayerId,
}

impl<'a> LaygoBase<'a> {
    /// Lays out the rows of `plan`.
    pub fn draw_base(
        b: &'a mut TemplateBuilder,
        tm: TrackManager,
        plan: &LaygoRowPlan,
    ) -> Result<Self> {
        let taps = plan.rows.iter().filter(|r| r.kind.is_tap()).count();
        if taps == 0 {
            return Err(Error::config("digital rows need at least one tap row"));
        }
        let rows = RowStack::new(&tm, b.tech(), plan.rows.clone(), None)?;
        Ok(Self {
            b,
            tm,
            rows,
            top_layer: plan.top_layer,
        })
    }

    /// The track manager.
    pub fn tm(&self) -> &TrackManager {
        &self.tm
    }

    /// The column unit.
    pub fn fg_unit(&self) -> u32 {
        self.b.tech().fg_unit
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
    pub fn rows(&self) -> &[Row] {
        self.rows.rows()
    }

    /// The number of columns used by devices so far.
    pub fn used_columns(&self) -> u32 {
        self.rows.used_extent()
    }

    /// The track of wire `wire_idx` in band `role` of row `row`.
    pub fn get_track_index(&self, row: usize, role: WireRole, wire_idx: usize) -> Result<HalfInt> {
        self.rows.track_index(row, role, wire_idx)
    }

    /// The track of the first `name` wire in band `role` of row `row`.
    pub fn get_wire_id(&self, row: usize, role: WireRole, name: &str) -> Result<TrackId> {
        self.rows.wire_id(&self.tm, row, role, name)
    }

    /// Draws a device of `seg` fingers at column `col` of row `row`.
    ///
    /// Sources connect toward the gate bands and drains toward the
    /// source/drain bands.
    pub fn add_laygo_mos(
        &mut self,
        row: usize,
        col: u32,
        seg: u32,
        gate_loc: GateLoc,
        opts: &MosConnOpts,
    ) -> Result<MosPorts> {
        let unit = self.fg_unit();
        if col % unit != 0 || seg % unit != 0 {
            return Err(Error::placement(format!(
                "digital device at column {col} with {seg} fingers is off the {unit}-finger grid"
            )));
        }
        let opts = MosConnOpts {
            gate_on_drain: gate_loc == GateLoc::D,
            ..opts.clone()
        };
        mos::draw_mos(self.b, &mut self.rows, row, col, seg, 0, 2, &opts)
    }

    /// Pads every row to `fg_tot` fingers with dummies and draws the supply
    /// wires of the tap rows.
    ///
    /// Returns the number of dummy fingers added.
    pub fn fill_space(&mut self, fg_tot: u32) -> Result<u32> {
        let unit = self.fg_unit();
        if fg_tot % unit != 0 {
            return Err(Error::config(format!(
                "digital templates must be a multiple of {unit} fingers wide, got {fg_tot}"
            )));
        }
        let used = self.rows.used_extent();
        if fg_tot < used {
            return Err(Error::placement(format!(
                "devices use {used} columns but the template is only {fg_tot} wide"
            )));
        }
        self.rows.set_fg_limit(fg_tot);
        let dummies = mos::draw_dummies(self.b, &mut self.rows, fg_tot)?;

        let right = fg_tot as i64 * self.sd_pitch();
        let hm = self.hm_layer();
        for pos in 0..self.rows.rows().len() {
            let row = self.rows.row(pos)?;
            if !row.spec.kind.is_tap() {
                continue;
            }
            let net = row.spec.kind.supply();
            let idx = self.rows.sup_track(pos)?;
            let warr = self.b.add_wires(hm, idx, 0, right, 1, 1, HalfInt::ZERO)?;
            self.b.add_net(net, warr);
        }
        debug!(fg_tot, used, dummies, "filled digital rows");
        Ok(dummies)
    }

    /// The supply wires of the tap rows, after [`LaygoBase::fill_space`].
    pub fn supply_wires(&self, kind: MosType) -> Result<Vec<WireArray>> {
        Ok(self
            .b
            .net(kind.supply())?
            .iter()
            .filter(|w| w.layer() == self.hm_layer())
            .copied()
            .collect())
    }

    /// Sets the template size and publishes the row layout.
    pub fn finish(self) -> Result<RowLayoutInfo> {
        let fg_tot = self
            .rows
            .fg_limit()
            .ok_or_else(|| Error::invariant("digital rows finished before fill_space"))?;
        let width = fg_tot as i64 * self.sd_pitch();
        let bbox = Rect::from_sides(0, 0, width, self.rows.height());
        self.b.set_size_from_bound_box(self.top_layer, bbox)?;
        let info = self.rows.layout_info(fg_tot);
        self.b.set_row_layout_info(info.clone());
        Ok(info)
    }
}

impl Deref for LaygoBase<'_> {
    type Target = TemplateBuilder;

    fn deref(&self) -> &Self::Target {
        self.b
    }
}

impl DerefMut for LaygoBase<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.b
    }
}
