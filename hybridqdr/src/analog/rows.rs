//! Stacks of transistor rows and their horizontal wire bands.
//!
//! Each transistor row is built from wire bands around a device body. In an
//! unmirrored row the order from bottom to top is `g`, `g2`, body, `gb`, `ds`,
//! `ds2`; mirrored rows reverse the order and the wire order within each band.
//! Tap rows have a single supply track centered in the row.

use arcstr::ArcStr;
use geometry::prelude::*;
use routing::{HalfInt, LayerId, TrackId, TrackManager, TrackType};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::tech::{MosTech, MosType};

/// A band of horizontal wires in a transistor row.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    /// Gate wires.
    G,
    /// Secondary gate wires, farther from the device.
    G2,
    /// Gate wires on the drain side of the device.
    Gb,
    /// Source/drain wires.
    Ds,
    /// Secondary source/drain wires, farther from the device.
    Ds2,
}

impl WireRole {
    const GATE_SIDE: [WireRole; 2] = [WireRole::G, WireRole::G2];
    const DS_SIDE: [WireRole; 3] = [WireRole::Gb, WireRole::Ds, WireRole::Ds2];
}

/// The track types of each wire band of a row.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WireNames {
    /// Gate wires.
    pub g: Vec<TrackType>,
    /// Secondary gate wires.
    pub g2: Vec<TrackType>,
    /// Drain-side gate wires.
    pub gb: Vec<TrackType>,
    /// Source/drain wires.
    pub ds: Vec<TrackType>,
    /// Secondary source/drain wires.
    pub ds2: Vec<TrackType>,
}

impl WireNames {
    /// The track types of band `role`.
    pub fn get(&self, role: WireRole) -> &[TrackType] {
        match role {
            WireRole::G => &self.g,
            WireRole::G2 => &self.g2,
            WireRole::Gb => &self.gb,
            WireRole::Ds => &self.ds,
            WireRole::Ds2 => &self.ds2,
        }
    }

    /// Appends wires of the given types to band `role`.
    pub fn with<T: Into<TrackType>>(
        mut self,
        role: WireRole,
        types: impl IntoIterator<Item = T>,
    ) -> Self {
        let band = match role {
            WireRole::G => &mut self.g,
            WireRole::G2 => &mut self.g2,
            WireRole::Gb => &mut self.gb,
            WireRole::Ds => &mut self.ds,
            WireRole::Ds2 => &mut self.ds2,
        };
        band.extend(types.into_iter().map(Into::into));
        self
    }
}

/// A row of the stack, before it is placed.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RowSpec {
    /// The device kind.
    pub kind: MosType,
    /// The device width.
    pub w: u32,
    /// The threshold flavor. Empty selects the default flavor.
    #[serde(default)]
    pub th: ArcStr,
    /// [`Orientation::R0`] or [`Orientation::MX`].
    #[serde(default)]
    pub orient: Orientation,
    /// The wire bands.
    #[serde(default)]
    pub wires: WireNames,
}

/// A placed wire band.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Band {
    /// The band role.
    pub role: WireRole,
    /// The first horizontal track of the band.
    pub start: i64,
    /// The number of tracks in the band.
    pub ntr: i64,
    /// The wire types, in declaration order.
    pub types: Vec<TrackType>,
    /// The center track of each wire.
    pub locs: Vec<HalfInt>,
}

/// A placed row.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Row {
    /// The row parameters.
    pub spec: RowSpec,
    /// The index of this row among rows of the same kind, counted from the bottom.
    pub kind_index: usize,
    /// The first horizontal track of the row.
    pub bot: i64,
    /// The number of tracks in the row.
    pub ntr: i64,
    /// The tracks `[lo, hi)` covered by the device body.
    pub body: (i64, i64),
    /// The wire bands, from bottom to top.
    pub bands: Vec<Band>,
    /// The supply track of a tap row.
    pub sup: Option<HalfInt>,
}

impl Row {
    /// The band with the given role.
    pub fn band(&self, role: WireRole) -> Option<&Band> {
        self.bands.iter().find(|b| b.role == role)
    }

    fn mirrored(&self) -> bool {
        self.spec.orient.flips_y()
    }
}

/// The published row stack of a transistor template.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RowLayoutInfo {
    /// The total number of fingers per row.
    pub fg_tot: u32,
    /// The source/drain pitch.
    pub sd_pitch: i64,
    /// The horizontal row wire layer.
    pub hm_layer: LayerId,
    /// The height of the stack.
    pub height: i64,
    /// The rows, from bottom to top.
    pub rows: Vec<RowLayout>,
}

/// One row of a [`RowLayoutInfo`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RowLayout {
    /// The device kind.
    pub kind: MosType,
    /// The device width.
    pub w: u32,
    /// The threshold flavor.
    pub th: ArcStr,
    /// The row orientation.
    pub orient: Orientation,
    /// The vertical extent of the row.
    pub y: Span,
    /// The number of dummy fingers.
    pub dummies: u32,
}

/// Placed rows and the fingers occupied in each.
#[derive(Debug, Clone)]
pub(crate) struct RowStack {
    hm_layer: LayerId,
    hm_pitch: i64,
    sd_pitch: i64,
    fg_limit: Option<u32>,
    rows: Vec<Row>,
    used: Vec<Vec<Option<ArcStr>>>,
    dummies: Vec<u32>,
}

impl RowStack {
    pub(crate) fn new(
        tm: &TrackManager,
        tech: &MosTech,
        specs: Vec<RowSpec>,
        fg_limit: Option<u32>,
    ) -> Result<Self> {
        let grid = tm.grid();
        let hm_layer = tech.hm_layer();
        let hm_pitch = grid.get_track_pitch(hm_layer)?;
        let sd_pitch = tech.sd_pitch(grid)?;

        let mut rows: Vec<Row> = Vec::with_capacity(specs.len());
        let mut bot = 0;
        for spec in specs {
            if !matches!(spec.orient, Orientation::R0 | Orientation::MX) {
                return Err(Error::config(format!(
                    "{} rows must be R0 or MX, got {:?}",
                    spec.kind, spec.orient
                )));
            }
            let kind_index = rows.iter().filter(|r| r.spec.kind == spec.kind).count();
            let row = if spec.kind.is_tap() {
                let sup = TrackType::from("sup");
                let (used, _) =
                    tm.place_wires(hm_layer, std::slice::from_ref(&sup), HalfInt::ZERO)?;
                let ntr = std::cmp::max(tech.tap_tracks as i64, used.ceil());
                Row {
                    spec,
                    kind_index,
                    bot,
                    ntr,
                    body: (bot, bot + ntr),
                    bands: Vec::new(),
                    sup: Some(HalfInt::new(bot) + HalfInt::from_dbl(ntr - 1)),
                }
            } else {
                Self::mos_row(tm, tech, hm_layer, spec, kind_index, bot)?
            };
            trace!(kind = %row.spec.kind, bot = row.bot, ntr = row.ntr, "placed row");
            bot += row.ntr;
            rows.push(row);
        }

        let n = rows.len();
        Ok(Self {
            hm_layer,
            hm_pitch,
            sd_pitch,
            fg_limit,
            rows,
            used: vec![Vec::new(); n],
            dummies: vec![0; n],
        })
    }

    fn mos_row(
        tm: &TrackManager,
        tech: &MosTech,
        hm_layer: LayerId,
        spec: RowSpec,
        kind_index: usize,
        bot: i64,
    ) -> Result<Row> {
        let mirrored = spec.orient.flips_y();
        let (lower, upper): (Vec<WireRole>, Vec<WireRole>) = if mirrored {
            (
                WireRole::DS_SIDE.iter().rev().copied().collect(),
                WireRole::GATE_SIDE.iter().rev().copied().collect(),
            )
        } else {
            (WireRole::GATE_SIDE.to_vec(), WireRole::DS_SIDE.to_vec())
        };

        let mut bands = Vec::new();
        let mut cursor = bot;
        let mut add_band = |role: WireRole, cursor: &mut i64| -> Result<()> {
            let types = spec.wires.get(role);
            if types.is_empty() {
                return Ok(());
            }
            let (used, rel) = tm.place_wires(hm_layer, types, HalfInt::ZERO)?;
            let ntr = used.ceil();
            let locs = rel
                .into_iter()
                .map(|loc| {
                    if mirrored {
                        HalfInt::new(*cursor + ntr - 1) - loc
                    } else {
                        HalfInt::new(*cursor) + loc
                    }
                })
                .collect();
            bands.push(Band {
                role,
                start: *cursor,
                ntr,
                types: types.to_vec(),
                locs,
            });
            *cursor += ntr;
            Ok(())
        };

        for role in lower {
            add_band(role, &mut cursor)?;
        }
        let body = (cursor, cursor + tech.device_tracks(spec.w));
        cursor = body.1;
        for role in upper {
            add_band(role, &mut cursor)?;
        }

        Ok(Row {
            spec,
            kind_index,
            bot,
            ntr: cursor - bot,
            body,
            bands,
            sup: None,
        })
    }

    pub(crate) fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub(crate) fn hm_layer(&self) -> LayerId {
        self.hm_layer
    }

    pub(crate) fn sd_pitch(&self) -> i64 {
        self.sd_pitch
    }

    pub(crate) fn fg_limit(&self) -> Option<u32> {
        self.fg_limit
    }

    pub(crate) fn set_fg_limit(&mut self, fg_tot: u32) {
        self.fg_limit = Some(fg_tot);
    }

    /// The height of the stack.
    pub(crate) fn height(&self) -> i64 {
        self.rows.last().map_or(0, |r| (r.bot + r.ntr) * self.hm_pitch)
    }

    /// The index of the `idx`-th row of kind `kind`.
    pub(crate) fn row_pos(&self, kind: MosType, idx: usize) -> Result<usize> {
        self.rows
            .iter()
            .position(|r| r.spec.kind == kind && r.kind_index == idx)
            .ok_or_else(|| Error::placement(format!("there is no {kind} row {idx}")))
    }

    pub(crate) fn row(&self, pos: usize) -> Result<&Row> {
        self.rows
            .get(pos)
            .ok_or_else(|| Error::placement(format!("there is no row {pos}")))
    }

    /// The center track of wire `wire_idx` in band `role` of a row.
    pub(crate) fn track_index(
        &self,
        pos: usize,
        role: WireRole,
        wire_idx: usize,
    ) -> Result<HalfInt> {
        let row = self.row(pos)?;
        let band = row.band(role).ok_or_else(|| {
            Error::config(format!(
                "{} row {} has no {role:?} wires",
                row.spec.kind, row.kind_index
            ))
        })?;
        band.locs.get(wire_idx).copied().ok_or_else(|| {
            Error::config(format!(
                "{} row {} has only {} {role:?} wires",
                row.spec.kind,
                row.kind_index,
                band.locs.len()
            ))
        })
    }

    /// The track of the first wire of type `name` in band `role` of a row.
    pub(crate) fn wire_id(
        &self,
        tm: &TrackManager,
        pos: usize,
        role: WireRole,
        name: &str,
    ) -> Result<TrackId> {
        let row = self.row(pos)?;
        let band = row.band(role);
        let found = band.and_then(|band| {
            band.types
                .iter()
                .zip(band.locs.iter())
                .find(|(ty, _)| ty.name().is_some_and(|n| n.as_str() == name))
        });
        let (ty, idx) = found.ok_or_else(|| {
            Error::config(format!(
                "{} row {} has no {role:?} wire of type `{name}`",
                row.spec.kind, row.kind_index
            ))
        })?;
        Ok(TrackId::new(self.hm_layer, *idx, tm.get_width(self.hm_layer, ty)))
    }

    /// The supply track of a tap row.
    pub(crate) fn sup_track(&self, pos: usize) -> Result<HalfInt> {
        let row = self.row(pos)?;
        row.sup
            .ok_or_else(|| Error::config(format!("{} row has no supply track", row.spec.kind)))
    }

    /// Marks fingers `[col, col + fg)` of a row as used by `owner`.
    pub(crate) fn claim(&mut self, pos: usize, col: u32, fg: u32, owner: &ArcStr) -> Result<()> {
        let row = self.row(pos)?;
        if row.spec.kind.is_tap() {
            return Err(Error::placement(format!(
                "cannot draw {owner} in a {} row",
                row.spec.kind
            )));
        }
        let end = col + fg;
        if let Some(limit) = self.fg_limit {
            if end > limit {
                return Err(Error::placement(format!(
                    "{owner} at columns {col}..{end} exceeds the {limit} fingers of the row"
                )));
            }
        }
        let used = &mut self.used[pos];
        if used.len() < end as usize {
            used.resize(end as usize, None);
        }
        if let Some(existing) = used[col as usize..end as usize].iter().flatten().next() {
            return Err(Error::CellOverlap {
                new: owner.clone(),
                existing: existing.clone(),
            });
        }
        for slot in used[col as usize..end as usize].iter_mut() {
            *slot = Some(owner.clone());
        }
        Ok(())
    }

    /// The number of fingers used in the widest row.
    pub(crate) fn used_extent(&self) -> u32 {
        self.used
            .iter()
            .map(|u| u.iter().rposition(Option::is_some).map_or(0, |p| p as u32 + 1))
            .max()
            .unwrap_or(0)
    }

    /// The maximal runs `(col, fg)` of unused fingers of a row below `fg_tot`.
    pub(crate) fn free_runs(&self, pos: usize, fg_tot: u32) -> Vec<(u32, u32)> {
        let used = &self.used[pos];
        let mut runs = Vec::new();
        let mut start = None;
        for col in 0..fg_tot {
            let free = used.get(col as usize).map_or(true, Option::is_none);
            match (free, start) {
                (true, None) => start = Some(col),
                (false, Some(s)) => {
                    runs.push((s, col - s));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push((s, fg_tot - s));
        }
        runs
    }

    pub(crate) fn add_dummies(&mut self, pos: usize, fg: u32) {
        self.dummies[pos] += fg;
    }

    /// The vertical extent of a connection wire leaving the device body of a
    /// row in direction `dir`.
    ///
    /// Direction `0` points toward the gate bands, `2` toward the
    /// source/drain bands and `1` stays within the body.
    pub(crate) fn conn_span(&self, pos: usize, dir: u8) -> Result<Span> {
        let row = self.row(pos)?;
        let p = self.hm_pitch;
        let (row_lo, row_hi) = (row.bot * p, (row.bot + row.ntr) * p);
        let (body_lo, body_hi) = (row.body.0 * p, row.body.1 * p);
        let toward_lower = match dir {
            0 => !row.mirrored(),
            2 => row.mirrored(),
            1 => return Ok(Span::new(body_lo, body_hi)),
            _ => {
                return Err(Error::config(format!(
                    "connection direction must be 0, 1 or 2, got {dir}"
                )))
            }
        };
        Ok(if toward_lower {
            Span::new(row_lo, body_hi)
        } else {
            Span::new(body_lo, row_hi)
        })
    }

    /// The vertical extent of gate connection wires.
    pub(crate) fn gate_span(&self, pos: usize) -> Result<Span> {
        let row = self.row(pos)?;
        let p = self.hm_pitch;
        let mid = (row.body.0 + row.body.1) * p / 2;
        Ok(if row.mirrored() {
            Span::new(mid, (row.bot + row.ntr) * p)
        } else {
            Span::new(row.bot * p, mid)
        })
    }

    pub(crate) fn layout_info(&self, fg_tot: u32) -> RowLayoutInfo {
        RowLayoutInfo {
            fg_tot,
            sd_pitch: self.sd_pitch,
            hm_layer: self.hm_layer,
            height: self.height(),
            rows: self
                .rows
                .iter()
                .zip(self.dummies.iter())
                .map(|(row, dummies)| RowLayout {
                    kind: row.spec.kind,
                    w: row.spec.w,
                    th: row.spec.th.clone(),
                    orient: row.spec.orient,
                    y: Span::new(row.bot * self.hm_pitch, (row.bot + row.ntr) * self.hm_pitch),
                    dummies: *dummies,
                })
                .collect(),
        }
    }
}
