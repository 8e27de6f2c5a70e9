//! Transistor terminal connections.

use arcstr::ArcStr;
use routing::{HalfInt, TrackId, WireArray};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::analog::rows::RowStack;
use crate::error::{Error, Result};
use crate::tech::MosType;
use crate::template::{TemplateBuilder, TrackConnect};

/// The terminal wires of a drawn transistor, on the connection layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MosPorts {
    /// The gates, one wire per finger.
    pub g: WireArray,
    /// The source junctions.
    pub s: WireArray,
    /// The drain junctions.
    pub d: WireArray,
}

/// Options for drawing a transistor.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct MosConnOpts {
    /// The number of series fingers per drain/source pair.
    pub stack: u32,
    /// Swaps the source and drain junctions.
    pub flip_lr: bool,
    /// Connects the gate to the drain.
    pub diode: bool,
    /// The gate net.
    pub g_net: Option<ArcStr>,
    /// The source net.
    pub s_net: Option<ArcStr>,
    /// The drain net.
    pub d_net: Option<ArcStr>,
    /// Only gate fingers next to drain junctions get gate wires.
    pub gate_on_drain: bool,
}

impl MosConnOpts {
    /// Options with the given gate, source and drain nets.
    pub fn nets(g: impl Into<ArcStr>, s: impl Into<ArcStr>, d: impl Into<ArcStr>) -> Self {
        Self {
            stack: 1,
            g_net: Some(g.into()),
            s_net: Some(s.into()),
            d_net: Some(d.into()),
            ..Default::default()
        }
    }

    /// Sets the stack height.
    pub fn stack(mut self, stack: u32) -> Self {
        self.stack = stack;
        self
    }

    /// Sets whether source and drain are swapped.
    pub fn flip_lr(mut self, flip: bool) -> Self {
        self.flip_lr = flip;
        self
    }
}

/// The track of source/drain junction `j` on the connection layer.
pub(crate) fn junction_track(j: u32) -> HalfInt {
    HalfInt::new(j as i64).down()
}

/// Draws a transistor of `fg` fingers starting at column `col` of row `pos`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn draw_mos(
    b: &mut TemplateBuilder,
    rows: &mut RowStack,
    pos: usize,
    col: u32,
    fg: u32,
    sdir: u8,
    ddir: u8,
    opts: &MosConnOpts,
) -> Result<MosPorts> {
    let stack = opts.stack.max(1);
    if fg == 0 || fg % stack != 0 {
        return Err(Error::config(format!(
            "{fg} fingers cannot be split into stacks of {stack}"
        )));
    }
    let owner = {
        let row = rows.row(pos)?;
        ArcStr::from(format!(
            "{} row {} columns {col}..{}",
            row.spec.kind,
            row.kind_index,
            col + fg
        ))
    };
    rows.claim(pos, col, fg, &owner)?;

    let conn = b.tech().mos_conn_layer;
    let period = 2 * stack;
    let (s_phase, d_phase) = if opts.flip_lr { (stack, 0) } else { (0, stack) };
    let junctions = |phase: u32| -> (u32, u32) {
        let first = phase;
        let count = if first > fg { 0 } else { (fg - first) / period + 1 };
        (first, count)
    };
    let (s_first, s_num) = junctions(s_phase);
    let (d_first, d_num) = junctions(d_phase);
    if s_num == 0 || d_num == 0 {
        return Err(Error::config(format!(
            "{fg} fingers with stack {stack} leave no room for both source and drain"
        )));
    }

    let sd_pitch = HalfInt::new(period as i64);
    let s_span = rows.conn_span(pos, sdir)?;
    let d_span = rows.conn_span(pos, ddir)?;
    let g_span = rows.gate_span(pos)?;

    let s = WireArray::new(
        TrackId::bus(conn, junction_track(col + s_first), 1, s_num, sd_pitch),
        s_span.start(),
        s_span.stop(),
    );
    let d = WireArray::new(
        TrackId::bus(conn, junction_track(col + d_first), 1, d_num, sd_pitch),
        d_span.start(),
        d_span.stop(),
    );
    let g_tid = if opts.gate_on_drain && fg >= 2 * stack {
        let first = col + if opts.flip_lr { 0 } else { stack };
        TrackId::bus(conn, HalfInt::new(first as i64), 1, fg / period, sd_pitch)
    } else {
        TrackId::bus(conn, HalfInt::new(col as i64), 1, fg, HalfInt::ONE)
    };
    let g = WireArray::new(g_tid, g_span.start(), g_span.stop());

    for warr in [g, s, d] {
        b.push_wire(warr);
    }
    if let Some(net) = &opts.g_net {
        b.add_net(net.clone(), g);
        if opts.diode {
            b.add_net(net.clone(), d);
        }
    }
    if let Some(net) = &opts.s_net {
        b.add_net(net.clone(), s);
    }
    if let Some(net) = &opts.d_net {
        b.add_net(net.clone(), d);
    }
    trace!(%owner, sdir, ddir, stack, "drew transistor");
    Ok(MosPorts { g, s, d })
}

/// The tap row that dummies of row `pos` are tied to and the rows crossed on
/// the way, or `None` if another kind of row is in between.
fn tap_path(rows: &RowStack, pos: usize) -> Result<Option<(usize, Vec<usize>)>> {
    let kind = rows.row(pos)?.spec.kind;
    let order: Box<dyn Iterator<Item = usize>> = match kind {
        MosType::Nch => Box::new((0..pos).rev()),
        MosType::Pch => Box::new(pos + 1..rows.rows().len()),
        MosType::Ptap | MosType::Ntap => return Ok(None),
    };
    let mut between = Vec::new();
    for other in order {
        let row = rows.row(other)?;
        if row.spec.kind.is_tap() {
            let same = row.spec.kind.supply() == kind.supply();
            return Ok(same.then_some((other, between)));
        }
        if row.spec.kind != kind {
            return Ok(None);
        }
        between.push(other);
    }
    Ok(None)
}

/// Splits `[col, col + fg)` into maximal runs `(start, len, clear)` of
/// columns that agree on `clear`.
fn split_runs(col: u32, fg: u32, clear: impl Fn(u32) -> bool) -> Vec<(u32, u32, bool)> {
    let mut out: Vec<(u32, u32, bool)> = Vec::new();
    for c in col..col + fg {
        let ok = clear(c);
        match out.last_mut() {
            Some((_, len, last)) if *last == ok => *len += 1,
            _ => out.push((c, 1, ok)),
        }
    }
    out
}

/// Ties the gates and inner junctions of unused fingers to the supply track of
/// the nearest tap row and returns the number of dummy fingers added.
///
/// A dummy column reaches its tap only if every row in between is also a
/// dummy at that column. Other columns are drawn but left unconnected.
pub(crate) fn draw_dummies(
    b: &mut TemplateBuilder,
    rows: &mut RowStack,
    fg_tot: u32,
) -> Result<u32> {
    let conn = b.tech().mos_conn_layer;
    let hm = rows.hm_layer();
    let runs: Vec<Vec<(u32, u32)>> = rows
        .rows()
        .iter()
        .enumerate()
        .map(|(pos, row)| {
            if row.spec.kind.is_tap() {
                Vec::new()
            } else {
                rows.free_runs(pos, fg_tot)
            }
        })
        .collect();
    let is_dummy = |pos: usize, c: u32| runs[pos].iter().any(|&(col, fg)| (col..col + fg).contains(&c));

    let mut total = 0;
    let mut floating = 0;
    for (pos, row_runs) in runs.iter().enumerate() {
        if row_runs.is_empty() {
            continue;
        }
        let supply = ArcStr::from(rows.row(pos)?.spec.kind.supply());
        let path = tap_path(rows, pos)?;
        let span = rows.conn_span(pos, 1)?;
        for &(col, fg) in row_runs {
            let owner = ArcStr::from(format!("dummy at columns {col}..{}", col + fg));
            rows.claim(pos, col, fg, &owner)?;
            rows.add_dummies(pos, fg);
            let reaches = |c: u32| {
                path.as_ref()
                    .is_some_and(|(_, between)| between.iter().all(|&r| is_dummy(r, c)))
            };
            for (start, len, clear) in split_runs(col, fg, reaches) {
                let mut warrs = vec![WireArray::new(
                    TrackId::bus(conn, HalfInt::new(start as i64), 1, len, HalfInt::ONE),
                    span.start(),
                    span.stop(),
                )];
                if len >= 2 {
                    warrs.push(WireArray::new(
                        TrackId::bus(conn, junction_track(start + 1), 1, len - 1, HalfInt::ONE),
                        span.start(),
                        span.stop(),
                    ));
                }
                for warr in warrs.iter() {
                    b.add_net(supply.clone(), *warr);
                }
                match (&path, clear) {
                    (Some((tap, _)), true) => {
                        let tid = TrackId::new(hm, rows.sup_track(*tap)?, 1);
                        b.connect_to_tracks(&warrs, tid, TrackConnect::default())?;
                    }
                    _ => {
                        for warr in warrs {
                            b.push_wire(warr);
                        }
                        floating += len;
                    }
                }
            }
            total += fg;
        }
    }
    if floating > 0 {
        warn!(floating, "dummy fingers are blocked from their supply tap");
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use geometry::prelude::*;

    use super::*;
    use crate::qdr::SegDict;
    use crate::template::Template;
    use crate::tests::{demo_amp, demo_ctx};

    /// The gate vias on the supply track of `kind` dummies, and the number of
    /// dummy fingers in rows of that kind.
    fn tied_gates(amp: &Template, kind: MosType) -> (usize, u32) {
        let info = amp.row_layout_info().unwrap();
        let tap = match kind {
            MosType::Nch => MosType::Ptap,
            _ => MosType::Ntap,
        };
        let y = info.rows.iter().find(|r| r.kind == tap).unwrap().y.center();
        let vias = amp
            .vias()
            .iter()
            .filter(|v| v.bot_layer == 1 && v.bot_track.is_integer() && v.loc.coord(Dir::Vert) == y)
            .count();
        let dummies = info.rows.iter().filter(|r| r.kind == kind).map(|r| r.dummies).sum();
        (vias, dummies)
    }

    #[test]
    fn dummies_reach_both_supplies() {
        let ctx = demo_ctx();
        let amp = ctx
            .new_template(demo_amp(SegDict {
                tail: 4,
                nen: 4,
                input: 4,
                casc: 4,
                load: 4,
                ..Default::default()
            }))
            .unwrap();
        for kind in [MosType::Nch, MosType::Pch] {
            let (vias, dummies) = tied_gates(amp.template(), kind);
            assert!(dummies > 0);
            assert_eq!(vias, dummies as usize, "{kind} dummies");
        }
    }

    #[test]
    fn dummies_above_devices_are_not_tied() {
        let ctx = demo_ctx();
        // The enable row is narrower than the tail row below it, so two
        // enable dummies per half sit above tail devices.
        let amp = ctx
            .new_template(demo_amp(SegDict {
                tail: 4,
                nen: 2,
                input: 4,
                ..Default::default()
            }))
            .unwrap();
        let (vias, dummies) = tied_gates(amp.template(), MosType::Nch);
        assert_eq!(vias + 4, dummies as usize);
    }

    #[test]
    fn runs_split_where_clearance_changes() {
        let runs = split_runs(2, 6, |c| !(4..6).contains(&c));
        assert_eq!(runs, [(2, 2, true), (4, 2, false), (6, 2, true)]);
        assert_eq!(split_runs(0, 3, |_| true), [(0, 3, true)]);
    }
}
