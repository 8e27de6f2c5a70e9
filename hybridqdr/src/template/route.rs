//! Track-based routing primitives.

use geometry::prelude::*;
use indexmap::IndexMap;
use routing::{HalfInt, LayerId, TrackId, WireArray};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::template::{TemplateBuilder, Via};

/// Which end of a wire to extend when it is shorter than the minimum length.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MinLenMode {
    /// Extend the lower end.
    Lower,
    /// Extend both ends equally.
    Center,
    /// Extend the upper end.
    Upper,
}

/// Options for connecting wires to tracks.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TrackConnect {
    /// Extend the track wire down to at least this coordinate.
    pub track_lower: Option<i64>,
    /// Extend the track wire up to at least this coordinate.
    pub track_upper: Option<i64>,
    /// How to satisfy the minimum length rule, if at all.
    pub min_len_mode: Option<MinLenMode>,
}

impl TrackConnect {
    /// Extends the track wire to cover `span`.
    pub fn spanning(span: Span) -> Self {
        Self {
            track_lower: Some(span.start()),
            track_upper: Some(span.stop()),
            min_len_mode: None,
        }
    }
}

/// How a set of wires reaches a set of tracks.
struct Reach {
    /// The span each input wire must cover.
    wire_spans: Vec<Span>,
    /// The span the track wire must cover.
    track_span: Span,
}

impl TemplateBuilder {
    fn reach(&self, warrs: &[WireArray], tid: TrackId, opts: &TrackConnect) -> Result<Reach> {
        let grid = self.grid();
        let tr_layer = tid.layer();
        let t_lo = grid.track_to_coord(tr_layer, tid.lower_index())?;
        let t_hi = grid.track_to_coord(tr_layer, tid.upper_index())?;

        let mut wire_spans = Vec::with_capacity(warrs.len());
        let mut track_span: Option<Span> = None;
        for warr in warrs {
            let layer = warr.layer();
            let w_width = warr.track_id().width();
            let (ext_wire, ext_track) = if layer + 1 == tr_layer {
                grid.get_via_extensions(layer, w_width, tid.width())?
            } else if tr_layer + 1 == layer {
                let (ext_bot, ext_top) = grid.get_via_extensions(tr_layer, tid.width(), w_width)?;
                (ext_top, ext_bot)
            } else {
                return Err(Error::routing(format!(
                    "cannot connect layer {layer} wires to layer {tr_layer} tracks"
                )));
            };
            wire_spans.push(warr.span().union(Span::new(t_lo - ext_wire, t_hi + ext_wire)));
            let w_lo = grid.track_to_coord(layer, warr.track_id().lower_index())?;
            let w_hi = grid.track_to_coord(layer, warr.track_id().upper_index())?;
            let s = Span::new(w_lo - ext_track, w_hi + ext_track);
            track_span = Some(track_span.map_or(s, |t| t.union(s)));
        }

        let mut span = track_span.ok_or_else(|| Error::routing("no wires to connect"))?;
        if let Some(lower) = opts.track_lower {
            span = span.add_point(lower);
        }
        if let Some(upper) = opts.track_upper {
            span = span.add_point(upper);
        }
        if let Some(mode) = opts.min_len_mode {
            let min_len = grid.get_min_length(tr_layer, tid.width())?;
            let deficit = min_len - span.length();
            if deficit > 0 {
                span = match mode {
                    MinLenMode::Lower => span.expand(deficit, 0),
                    MinLenMode::Upper => span.expand(0, deficit),
                    MinLenMode::Center => span.expand(deficit / 2, deficit - deficit / 2),
                };
            }
        }
        Ok(Reach {
            wire_spans,
            track_span: span,
        })
    }

    fn add_vias(&mut self, a: &WireArray, b: &WireArray) -> Result<()> {
        let (bot, top) = if a.layer() < b.layer() { (a, b) } else { (b, a) };
        let dir = self.grid().dir(bot.layer())?;
        let mut vias = Vec::new();
        for bi in bot.track_id().indices() {
            let bc = self.grid().track_to_coord(bot.layer(), bi)?;
            for ti in top.track_id().indices() {
                let tc = self.grid().track_to_coord(top.layer(), ti)?;
                vias.push(Via {
                    bot_layer: bot.layer(),
                    bot_track: bi,
                    top_track: ti,
                    loc: Point::from_dir_coords(dir, tc, bc),
                });
            }
        }
        self.vias.extend(vias);
        Ok(())
    }

    /// Connects wires on an adjacent layer to the tracks of `tid`.
    ///
    /// The input wires are extended to reach every track, the track wire is
    /// drawn over every input wire, and vias are added at each crossing.
    /// Returns the track wire.
    pub fn connect_to_tracks(
        &mut self,
        warrs: &[WireArray],
        tid: TrackId,
        opts: TrackConnect,
    ) -> Result<WireArray> {
        let reach = self.reach(warrs, tid, &opts)?;
        let track = WireArray::new(tid, reach.track_span.start(), reach.track_span.stop());
        for (warr, span) in warrs.iter().zip(reach.wire_spans) {
            let extended = warr.with_span(span);
            self.push_wire(extended);
            self.add_vias(&extended, &track)?;
        }
        self.push_wire(track);
        debug!(
            layer = tid.layer(),
            track = %tid.base_index(),
            n = warrs.len(),
            "connected wires to track"
        );
        Ok(track)
    }

    /// Merges wires drawn on the same tracks into one wire per track set.
    ///
    /// Calling this again on its own output returns the same wires.
    pub fn connect_wires(&mut self, warrs: &[WireArray]) -> Result<Vec<WireArray>> {
        let mut merged: IndexMap<TrackId, Span> = IndexMap::new();
        for warr in warrs {
            merged
                .entry(warr.track_id())
                .and_modify(|s| *s = s.union(warr.span()))
                .or_insert(warr.span());
        }
        let out: Vec<WireArray> = merged
            .into_iter()
            .map(|(tid, span)| WireArray::new(tid, span.start(), span.stop()))
            .collect();
        for warr in out.iter() {
            self.push_wire(*warr);
        }
        Ok(out)
    }

    /// Extends each wire so it covers `lower` and `upper`.
    pub fn extend_wires(
        &mut self,
        warrs: &[WireArray],
        lower: Option<i64>,
        upper: Option<i64>,
        min_len_mode: Option<MinLenMode>,
    ) -> Result<Vec<WireArray>> {
        let mut out = Vec::with_capacity(warrs.len());
        for warr in warrs {
            let mut span = warr.span();
            if let Some(lower) = lower {
                span = span.add_point(lower);
            }
            if let Some(upper) = upper {
                span = span.add_point(upper);
            }
            if let Some(mode) = min_len_mode {
                let min_len = self
                    .grid()
                    .get_min_length(warr.layer(), warr.track_id().width())?;
                let deficit = min_len - span.length();
                if deficit > 0 {
                    span = match mode {
                        MinLenMode::Lower => span.expand(deficit, 0),
                        MinLenMode::Upper => span.expand(0, deficit),
                        MinLenMode::Center => span.expand(deficit / 2, deficit - deficit / 2),
                    };
                }
            }
            let extended = warr.with_span(span);
            self.push_wire(extended);
            out.push(extended);
        }
        Ok(out)
    }

    /// Connects a differential pair of wire sets to two tracks of `layer`.
    ///
    /// Both track wires are drawn over the same interval so the pair stays
    /// matched.
    #[allow(clippy::too_many_arguments)]
    pub fn connect_differential_tracks(
        &mut self,
        pwarrs: &[WireArray],
        nwarrs: &[WireArray],
        layer: LayerId,
        idx_p: HalfInt,
        idx_n: HalfInt,
        width: u32,
        opts: TrackConnect,
    ) -> Result<(WireArray, WireArray)> {
        if idx_p == idx_n {
            return Err(Error::routing(format!(
                "differential tracks on layer {layer} must differ, got {idx_p} twice"
            )));
        }
        let tp = TrackId::new(layer, idx_p, width);
        let tn = TrackId::new(layer, idx_n, width);
        let sp = self.reach(pwarrs, tp, &opts)?.track_span;
        let sn = self.reach(nwarrs, tn, &opts)?.track_span;
        let shared = TrackConnect::spanning(sp.union(sn));
        let p = self.connect_to_tracks(pwarrs, tp, shared)?;
        let n = self.connect_to_tracks(nwarrs, tn, shared)?;
        Ok((p, n))
    }

    /// Connects a differential pair of wire sets to an existing pair of wires
    /// on the adjacent layer.
    pub fn connect_differential_wires(
        &mut self,
        pwarrs: &[WireArray],
        nwarrs: &[WireArray],
        p_upper: &WireArray,
        n_upper: &WireArray,
    ) -> Result<(WireArray, WireArray)> {
        let (tp, tn) = (p_upper.track_id(), n_upper.track_id());
        if tp.layer() != tn.layer() || tp.width() != tn.width() {
            return Err(Error::routing("differential wires must share a layer and a width"));
        }
        let span = p_upper.span().union(n_upper.span());
        self.connect_differential_tracks(
            pwarrs,
            nwarrs,
            tp.layer(),
            tp.base_index(),
            tn.base_index(),
            tp.width(),
            TrackConnect::spanning(span),
        )
    }

    /// Connects every recorded wire of net `net` on a layer adjacent to `tid`
    /// to the tracks of `tid`.
    ///
    /// The new track wire is recorded on the net as well.
    pub fn connect_net_to_tracks(
        &mut self,
        net: &str,
        tid: TrackId,
        opts: TrackConnect,
    ) -> Result<WireArray> {
        let layer = tid.layer();
        let warrs: Vec<WireArray> = self
            .net(net)?
            .iter()
            .filter(|w| w.layer() + 1 == layer || layer + 1 == w.layer())
            .copied()
            .collect();
        if warrs.is_empty() {
            return Err(Error::routing(format!(
                "net `{net}` has no wires adjacent to layer {layer}"
            )));
        }
        let track = self.connect_to_tracks(&warrs, tid, opts)?;
        self.add_net(net, track);
        Ok(track)
    }
}
