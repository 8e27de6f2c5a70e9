//! The enable retimer.

use arcstr::ArcStr;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{band_track, draw_devices, pack_columns, round_up, Device, DigitalParams, DigitalTracks};
use crate::analog::{RowLayoutInfo, RowSpec, WireNames, WireRole};
use crate::error::{Error, Result};
use crate::laygo::LaygoBase;
use crate::tech::MosType;
use crate::template::{Generator, TemplateBuilder};

const ROW_CLK: usize = 1;
const ROW_DATA: usize = 2;
const ROW_PDATA: usize = 3;

/// The input and output net of each latch of the chain.
///
/// Two flip-flops are followed by a single latch. Flip-flop outputs are
/// `en1` and `en2`; the final latch drives `en3`.
const CHAIN: [(&str, &str); 5] = [
    ("en", "m1"),
    ("m1", "en1"),
    ("en1", "m2"),
    ("m2", "en2"),
    ("en2", "en3"),
];

/// Nets exported as pins.
const PINS: [&str; 5] = ["en", "en2", "en3", "clkp", "clkn"];

/// A chain of two flip-flops and a latch that retimes the divider enable.
///
/// Each latch is a clocked inverter; latches alternate between `clkp` and
/// `clkn`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EnableRetimer {
    /// Row parameters.
    pub params: DigitalParams,
    /// Segments of each latch.
    pub seg: u32,
    /// The minimum total width, in fingers.
    #[serde(default)]
    pub fg_min: u32,
}

/// Data published by an [`EnableRetimer`].
#[derive(Debug, Clone)]
pub struct EnableRetimerData {
    /// The total number of fingers.
    pub fg_tot: u32,
    /// The number of fingers the latches need.
    pub fg_intrinsic: u32,
    /// The row stack.
    pub row_info: RowLayoutInfo,
}

#[derive(Serialize)]
struct RetimerSchParams {
    lch: Decimal,
    w_n: u32,
    w_p: u32,
    seg: u32,
    fg_tot: u32,
}

impl EnableRetimer {
    fn rows(&self) -> Vec<RowSpec> {
        let p = &self.params;
        vec![
            p.nch(
                WireNames::default()
                    .with(WireRole::G, ["clk", "clk"])
                    .with(WireRole::Ds, ["sig"]),
            ),
            p.nch(
                WireNames::default()
                    .with(WireRole::G, ["sig"])
                    .with(WireRole::Ds, ["sig", "sig"]),
            ),
            p.pch(WireNames::default().with(WireRole::G, ["sig"])),
        ]
    }

    fn tracks(&self, base: &LaygoBase<'_>) -> Result<DigitalTracks> {
        let mut t = DigitalTracks::default();
        t.put("clkp", band_track(base, ROW_CLK, WireRole::G, 0, "clk")?);
        t.put("clkn", band_track(base, ROW_CLK, WireRole::G, 1, "clk")?);
        t.put("en", band_track(base, ROW_DATA, WireRole::G, 0, "sig")?);
        // Consecutive latch outputs overlap horizontally, so they alternate
        // between two tracks. Latch feet do not overlap and share one.
        for (i, (_, out)) in CHAIN.iter().enumerate() {
            t.put(*out, band_track(base, ROW_DATA, WireRole::Ds, i % 2, "sig")?);
            t.put(foot(i), band_track(base, ROW_CLK, WireRole::Ds, 0, "sig")?);
        }
        // The PMOS gates of the first latch read `en` on their own row.
        t.put_row("en", ROW_PDATA, band_track(base, ROW_PDATA, WireRole::G, 0, "sig")?);
        Ok(t)
    }

    fn devices(&self, cols: &[u32]) -> Vec<Device> {
        let seg = self.seg;
        let mut out = Vec::with_capacity(3 * CHAIN.len());
        for (i, ((input, output), col)) in CHAIN.iter().zip(cols).enumerate() {
            let clk = if i % 2 == 0 { "clkp" } else { "clkn" };
            out.push(Device::new(ROW_CLK, *col, seg, clk, "VSS", foot(i)));
            out.push(Device::new(ROW_DATA, *col, seg, *input, foot(i), *output));
            out.push(Device::new(ROW_PDATA, *col, seg, *input, "VDD", *output));
        }
        out
    }
}

/// The internal foot net of latch `i`.
fn foot(i: usize) -> ArcStr {
    ArcStr::from(format!("foot<{i}>"))
}

impl Generator for EnableRetimer {
    type Data = EnableRetimerData;

    fn name(&self) -> ArcStr {
        arcstr::literal!("enable_retimer")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        if self.seg == 0 {
            return Err(Error::config("retimer latches need at least one segment"));
        }
        let tech = b.tech().clone();
        let (cols, fg_intrinsic) = pack_columns(&[self.seg; CHAIN.len()], tech.laygo_sep());
        let fg_tot = round_up(fg_intrinsic.max(self.fg_min), tech.fg_unit);
        let p = &self.params;
        b.set_sch_params(&RetimerSchParams {
            lch: p.lch,
            w_n: p.w_n,
            w_p: p.w_p,
            seg: self.seg,
            fg_tot,
        })?;

        let tm = b.ctx().track_manager(p.tr_tables.clone(), true);
        let mut base = LaygoBase::draw_base(b, tm, &p.plan(self.rows(), tech.vm_layer()))?;
        let tracks = self.tracks(&base)?;
        let hm_wires = draw_devices(&mut base, &self.devices(&cols), &tracks, fg_tot)?;

        let opts = p.pin_opts();
        for name in PINS {
            let wires = hm_wires
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnknownNet(ArcStr::from(name)))?;
            for warr in base.connect_wires(&wires)? {
                base.add_pin_with(name, warr, opts.clone())?;
            }
        }
        for (kind, net) in [(MosType::Ntap, "VDD"), (MosType::Ptap, "VSS")] {
            for warr in base.supply_wires(kind)? {
                base.add_pin_with(net, warr, opts.clone())?;
            }
        }

        let row_info = base.finish()?;
        debug!(fg_tot, fg_intrinsic, "drew enable retimer");
        Ok(EnableRetimerData {
            fg_tot,
            fg_intrinsic,
            row_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::tests::{demo_ctx, demo_retimer};

    #[test]
    fn retimer_chain_has_five_latches() {
        let ctx = demo_ctx();
        let ret = ctx.new_template(demo_retimer(0)).unwrap();
        let sep = ctx.tech().laygo_sep();
        let seg = ret.params().seg;
        assert_eq!(ret.data().fg_intrinsic, 5 * seg + 4 * sep);
        for name in ["en", "en2", "en3", "clkp", "clkn", "VDD", "VSS"] {
            assert!(ret.has_port(name), "missing {name}");
        }
        assert!(!ret.has_port("m1"));
    }

    #[test]
    fn retimer_is_padded_to_fg_min() {
        let ctx = demo_ctx();
        let ret = ctx.new_template(demo_retimer(0)).unwrap();
        let n = ret.data().fg_intrinsic + 4;
        let wide = ctx.new_template_with(&ret, |r| r.fg_min = n).unwrap();
        assert_eq!(wide.data().fg_tot, n);
    }
}
