//! Integrating amplifier templates.

use arcstr::ArcStr;
use geometry::prelude::*;
use indexmap::IndexMap;
use routing::{HalfInt, RoundingMode, TrackId, TrackTables, TrackType, WireArray};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analog::{
    AnalogBase, AnalogRowPlan, MosConnOpts, MosRow, RowLayoutInfo, WireNames, WireRole,
};
use crate::error::{Error, Result};
use crate::qdr::info::{get_integ_amp_info, Half, IntegAmpInfo, SegDict};
use crate::qdr::DeviceParams;
use crate::tech::MosType;
use crate::template::{Generator, PinOpts, TemplateBuilder, TrackConnect};

/// Gate nets exported as pins, in export order.
const GATE_PINS: [&str; 10] = [
    "biasn", "clkp", "clkn", "inp", "inn", "casc", "sgnp", "sgnn", "biasp", "en",
];

/// A differential integrating amplifier.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct IntegAmp {
    /// The channel length, in meters.
    pub lch: Decimal,
    /// The substrate tap width.
    pub ptap_w: u32,
    /// The well tap width.
    pub ntap_w: u32,
    /// Device widths.
    pub w: DeviceParams<u32>,
    /// Device threshold flavors.
    pub th: DeviceParams<ArcStr>,
    /// Device segment counts.
    pub seg_dict: SegDict,
    /// The minimum total width, in fingers.
    pub fg_min: u32,
    /// Dummy fingers at each edge.
    pub fg_dum: u32,
    /// Extra dummy fingers at the left edge.
    pub dum_l: u32,
    /// Moves both output tracks away from the center by this many tracks.
    #[serde(default)]
    pub out_shift: HalfInt,
    /// Wire widths and spacings.
    pub tr_tables: TrackTables,
    /// Whether pin labels are visible.
    pub show_pins: bool,
}

/// Data published by an [`IntegAmp`].
#[derive(Debug, Clone)]
pub struct IntegAmpData {
    /// The finger allocation, before the extra left dummies.
    pub info: IntegAmpInfo,
    /// The total number of fingers.
    pub fg_tot: u32,
    /// The extra left dummies.
    pub dum_l: u32,
    /// The source/drain pitch.
    pub sd_pitch: i64,
    /// The row stack.
    pub row_info: RowLayoutInfo,
    /// The vertical tracks of `outp` and `outn`.
    pub out_tracks: (HalfInt, HalfInt),
    /// The width of the output tracks.
    pub out_width: u32,
    /// The horizontal extent of the signal wires.
    pub hm_span: Span,
}

#[derive(Serialize)]
struct AmpSchParams<'a> {
    lch: Decimal,
    w: &'a DeviceParams<u32>,
    th: &'a DeviceParams<ArcStr>,
    seg_dict: &'a IndexMap<ArcStr, u32>,
    fg_tot: u32,
    fg_dum: u32,
}

/// The row holding each device.
fn device_row(dev: &str) -> Result<(MosType, usize)> {
    Ok(match dev {
        "tail" | "cap" => (MosType::Nch, 0),
        "nen" | "tsw" => (MosType::Nch, 1),
        "in" => (MosType::Nch, 2),
        "casc" | "but0" | "but1" => (MosType::Nch, 3),
        "load" => (MosType::Pch, 0),
        "pen" => (MosType::Pch, 1),
        _ => return Err(Error::invariant(format!("unknown amplifier device `{dev}`"))),
    })
}

fn lookup<T: Copy>(map: &IndexMap<ArcStr, T>, dev: &str) -> Result<T> {
    map.get(dev)
        .copied()
        .ok_or_else(|| Error::invariant(format!("amplifier device `{dev}` is incomplete")))
}

/// The horizontal track of each net, with a separate table for PMOS terminals.
struct NetTracks {
    nmos: IndexMap<ArcStr, TrackId>,
    pmos: IndexMap<ArcStr, TrackId>,
}

impl NetTracks {
    fn get(&self, net: &str, pmos: bool) -> Result<TrackId> {
        pmos.then(|| self.pmos.get(net))
            .flatten()
            .or_else(|| self.nmos.get(net))
            .copied()
            .ok_or_else(|| Error::UnknownNet(ArcStr::from(net)))
    }
}

impl IntegAmp {
    fn has_mid(&self) -> bool {
        self.seg_dict.casc > 0 || self.seg_dict.but > 0
    }

    fn row_plan(&self, fg_tot: u32, top_layer: usize) -> AnalogRowPlan {
        let seg = &self.seg_dict;
        let row = |w: u32, th: &ArcStr, orient: Orientation, wires: WireNames| MosRow {
            w,
            th: th.clone(),
            orient,
            wires,
        };
        let pair = |ty: &'static str| [ty, ty];

        let mut nch = vec![
            row(
                self.w.tail,
                &self.th.tail,
                Orientation::R0,
                WireNames::default()
                    .with(WireRole::G, ["bias"])
                    .with(WireRole::Ds, ["sig"]),
            ),
            row(
                self.w.nen,
                &self.th.nen,
                Orientation::R0,
                if seg.tsw > 0 {
                    WireNames::default()
                        .with(WireRole::G, pair("clk"))
                        .with(WireRole::Ds, pair("sig"))
                } else {
                    WireNames::default()
                        .with(WireRole::G, ["clk"])
                        .with(WireRole::Ds, ["sig"])
                },
            ),
            row(
                self.w.input,
                &self.th.input,
                Orientation::R0,
                WireNames::default()
                    .with(WireRole::G, pair("sig"))
                    .with(WireRole::Ds, pair(if self.has_mid() { "sig" } else { "out" })),
            ),
        ];
        if seg.casc > 0 {
            nch.push(row(
                self.w.casc,
                &self.th.casc,
                Orientation::R0,
                WireNames::default()
                    .with(WireRole::G, ["bias"])
                    .with(WireRole::Ds, pair("out")),
            ));
        } else if seg.but > 0 {
            nch.push(row(
                self.w.but,
                &self.th.but,
                Orientation::R0,
                WireNames::default()
                    .with(WireRole::G, pair("sig"))
                    .with(WireRole::Ds, pair("out")),
            ));
        }

        let mut pch = Vec::new();
        if seg.load > 0 {
            pch.push(row(
                self.w.load,
                &self.th.load,
                Orientation::MX,
                WireNames::default()
                    .with(WireRole::G, ["bias"])
                    .with(WireRole::Ds, pair("out")),
            ));
        }
        if seg.pen > 0 {
            pch.push(row(
                self.w.pen,
                &self.th.pen,
                Orientation::MX,
                WireNames::default()
                    .with(WireRole::G, ["en"])
                    .with(WireRole::Ds, pair("sig")),
            ));
        }

        AnalogRowPlan {
            lch: self.lch,
            ptap_w: self.ptap_w,
            ntap_w: self.ntap_w,
            nch,
            pch,
            fg_tot,
            top_layer,
        }
    }

    fn net_tracks(&self, base: &AnalogBase<'_>) -> Result<NetTracks> {
        let seg = &self.seg_dict;
        let hm = base.hm_layer();
        let track = |kind: MosType, row: usize, role: WireRole, idx: usize, ty: &str| {
            let width = base.tm().get_width(hm, &TrackType::from(ty));
            let idx = base.get_track_index(kind, row, role, idx)?;
            Ok::<_, Error>(TrackId::new(hm, idx, width))
        };
        let mut nmos = IndexMap::new();
        let mut put = |net: &str, tid: TrackId| {
            nmos.insert(ArcStr::from(net), tid);
        };

        put("VSS", base.get_sup_track(MosType::Ptap)?);
        put("VDD", base.get_sup_track(MosType::Ntap)?);
        put("biasn", track(MosType::Nch, 0, WireRole::G, 0, "bias")?);
        put("foot", track(MosType::Nch, 0, WireRole::Ds, 0, "sig")?);
        put("clkp", track(MosType::Nch, 1, WireRole::G, 0, "clk")?);
        if seg.tsw > 0 {
            put("clkn", track(MosType::Nch, 1, WireRole::G, 1, "clk")?);
            put("tailp", track(MosType::Nch, 1, WireRole::Ds, 0, "sig")?);
            put("tailn", track(MosType::Nch, 1, WireRole::Ds, 1, "sig")?);
        } else {
            put("tail", track(MosType::Nch, 1, WireRole::Ds, 0, "sig")?);
        }
        put("inp", track(MosType::Nch, 2, WireRole::G, 0, "sig")?);
        put("inn", track(MosType::Nch, 2, WireRole::G, 1, "sig")?);
        if self.has_mid() {
            put("nmp", track(MosType::Nch, 2, WireRole::Ds, 0, "sig")?);
            put("nmn", track(MosType::Nch, 2, WireRole::Ds, 1, "sig")?);
            if seg.casc > 0 {
                put("casc", track(MosType::Nch, 3, WireRole::G, 0, "bias")?);
            } else {
                put("sgnp", track(MosType::Nch, 3, WireRole::G, 0, "sig")?);
                put("sgnn", track(MosType::Nch, 3, WireRole::G, 1, "sig")?);
            }
            put("outp", track(MosType::Nch, 3, WireRole::Ds, 0, "out")?);
            put("outn", track(MosType::Nch, 3, WireRole::Ds, 1, "out")?);
        } else {
            put("outp", track(MosType::Nch, 2, WireRole::Ds, 0, "out")?);
            put("outn", track(MosType::Nch, 2, WireRole::Ds, 1, "out")?);
        }

        let mut pmos = IndexMap::new();
        if seg.load > 0 {
            nmos.insert(
                arcstr::literal!("biasp"),
                track(MosType::Pch, 0, WireRole::G, 0, "bias")?,
            );
            pmos.insert(
                arcstr::literal!("outp"),
                track(MosType::Pch, 0, WireRole::Ds, 0, "out")?,
            );
            pmos.insert(
                arcstr::literal!("outn"),
                track(MosType::Pch, 0, WireRole::Ds, 1, "out")?,
            );
        }
        if seg.pen > 0 {
            nmos.insert(arcstr::literal!("en"), track(MosType::Pch, 1, WireRole::G, 0, "en")?);
            nmos.insert(arcstr::literal!("pmp"), track(MosType::Pch, 1, WireRole::Ds, 0, "sig")?);
            nmos.insert(arcstr::literal!("pmn"), track(MosType::Pch, 1, WireRole::Ds, 1, "sig")?);
        }
        Ok(NetTracks { nmos, pmos })
    }
}

impl Generator for IntegAmp {
    type Data = IntegAmpData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("integ_amp")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let tech = b.tech().clone();
        let info = get_integ_amp_info(
            &tech,
            &self.seg_dict,
            self.fg_min.saturating_sub(self.dum_l),
            self.fg_dum,
        )?;
        let fg_tot = info.fg_tot + self.dum_l;
        b.set_sch_params(&AmpSchParams {
            lch: self.lch,
            w: &self.w,
            th: &self.th,
            seg_dict: &info.seg_dict,
            fg_tot,
            fg_dum: info.fg_dum,
        })?;

        let vm = tech.vm_layer();
        let tm = b.ctx().track_manager(self.tr_tables.clone(), true);
        let out_width = tm.get_width(vm, &TrackType::from("out"));
        let mut base = AnalogBase::draw_base(b, tm, &self.row_plan(fg_tot, vm))?;
        let tracks = self.net_tracks(&base)?;

        // Draw every device and remember which track each terminal goes to.
        let mut hookups: IndexMap<(ArcStr, TrackId), Vec<WireArray>> = IndexMap::new();
        for (dev, &(col_l, col_r)) in info.col_dict.iter() {
            let (kind, row) = device_row(dev)?;
            let pmos = kind == MosType::Pch;
            let seg = lookup(&info.seg_dict, dev)?;
            let (sdir, ddir) = lookup(&info.sd_dir_dict, dev)?;
            let stack = lookup(&info.stack_dict, dev)?;
            let g_base = info
                .g_dict
                .get(dev.as_str())
                .ok_or_else(|| Error::invariant(format!("amplifier device `{dev}` has no gate")))?;
            let halves: &[(Half, u32)] = if dev == "tsw" {
                &[(Half::Left, col_l)]
            } else {
                &[(Half::Left, col_l), (Half::Right, col_r)]
            };
            for &(half, col) in halves {
                let (s, d) = info.sd_nets(dev, half)?;
                let g = info.net_name(g_base, half, false);
                let col = col + self.dum_l;
                let ports = if dev == "cap" {
                    base.draw_mos_decap(kind, row, col, seg, &g, &s)?
                } else {
                    let opts = MosConnOpts::nets(g.clone(), s.clone(), d.clone()).stack(stack);
                    base.draw_mos_conn(kind, row, col, seg, sdir, ddir, &opts)?
                };
                for (net, warr) in [(g, ports.g), (s, ports.s), (d, ports.d)] {
                    let tid = tracks.get(&net, pmos)?;
                    hookups.entry((net, tid)).or_default().push(warr);
                }
            }
        }

        let (vdd, vss) = base.fill_dummy(1, 1)?;

        let mut hm_wires: IndexMap<ArcStr, Vec<WireArray>> = IndexMap::new();
        for ((net, tid), warrs) in hookups {
            let track = base.connect_to_tracks(&warrs, tid, TrackConnect::default())?;
            base.add_net(net.clone(), track);
            hm_wires.entry(net).or_default().push(track);
        }

        let opts = PinOpts {
            hide: !self.show_pins,
            ..Default::default()
        };
        let mut hm_span = Span::merge(
            hm_wires
                .iter()
                .filter(|(net, _)| !matches!(net.as_str(), "VDD" | "VSS"))
                .flat_map(|(_, warrs)| warrs.iter().map(WireArray::span)),
        );
        for name in GATE_PINS {
            let Some(wires) = hm_wires.get(name).cloned() else {
                continue;
            };
            for warr in base.connect_wires(&wires)? {
                hm_span = Some(hm_span.map_or(warr.span(), |s| s.union(warr.span())));
                base.add_pin_with(name, warr, opts.clone())?;
            }
        }
        base.add_pin_with("VDD", vdd, opts.clone())?;
        base.add_pin_with("VSS", vss, opts.clone())?;

        let sd = base.sd_pitch();
        let half_w = info.seg_single as i64 * sd / 2;
        let left = (self.dum_l + info.core_start) as i64 * sd + half_w;
        let right_col = self.dum_l + info.core_start + info.seg_single + info.fg_sep;
        let right = right_col as i64 * sd + half_w;
        let idx_p = base.grid().coord_to_nearest_track(vm, left, RoundingMode::Nearest, false)?
            - self.out_shift;
        let idx_n = base.grid().coord_to_nearest_track(vm, right, RoundingMode::Nearest, false)?
            + self.out_shift;
        if idx_p >= idx_n {
            return Err(Error::config(format!(
                "output shift {} crosses the outputs at tracks {idx_p} and {idx_n}",
                self.out_shift
            )));
        }
        let outp_hm = hm_wires.get("outp").cloned().unwrap_or_default();
        let outn_hm = hm_wires.get("outn").cloned().unwrap_or_default();
        let (outp, outn) = base.connect_differential_tracks(
            &outp_hm,
            &outn_hm,
            vm,
            idx_p,
            idx_n,
            out_width,
            TrackConnect::default(),
        )?;
        base.add_net("outp", outp);
        base.add_net("outn", outn);
        base.add_pin_with("outp", outp, opts.clone())?;
        base.add_pin_with("outn", outn, opts)?;

        let hm_span = hm_span
            .ok_or_else(|| Error::invariant("amplifier drew no signal wires"))?
            .union(outp.bbox(base.grid())?.hspan())
            .union(outn.bbox(base.grid())?.hspan());
        let row_info = base.finish()?;
        debug!(fg_tot, dum_l = self.dum_l, "drew integrating amplifier");

        Ok(IntegAmpData {
            info,
            fg_tot,
            dum_l: self.dum_l,
            sd_pitch: sd,
            row_info,
            out_tracks: (idx_p, idx_n),
            out_width,
            hm_span,
        })
    }
}
