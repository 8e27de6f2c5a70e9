//! Finger allocation of integrating amplifiers.
//!
//! An integrating amplifier is a differential pair of half circuits placed
//! mirror-symmetrically about a center separation. Every row holds the
//! left half of its device, the separation, then the right half:
//!
//! ```text
//! | edge | cap | sep | ...left half... | center | ...right half... | sep | cap | edge |
//! ```

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::tech::MosTech;

/// Segment counts of the devices of an integrating amplifier.
///
/// A count of zero leaves the device out.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SegDict {
    /// The tail device.
    pub tail: u32,
    /// The clocked enable device.
    pub nen: u32,
    /// The input pair.
    #[serde(rename = "in")]
    pub input: u32,
    /// The cascode pair.
    pub casc: u32,
    /// Each of the two butterfly switches of a half.
    pub but: u32,
    /// The PMOS load pair.
    pub load: u32,
    /// The PMOS enable pair.
    pub pen: u32,
    /// The tail switch between the two halves.
    pub tsw: u32,
    /// The total decoupling capacitor fingers, split between both edges.
    pub cap: u32,
    /// The NMOS separation at the center.
    pub nsep: Option<u32>,
    /// The PMOS separation at the center.
    pub psep: Option<u32>,
    /// The stack height of the input pair.
    pub stack_in: Option<u32>,
    /// Swaps the source and drain of the PMOS devices.
    pub en_only: bool,
}

/// One half of a differential device pair.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Half {
    /// The left half, carrying the positive nets.
    Left,
    /// The right half, carrying the negative nets.
    Right,
}

/// The source and drain nets of a device.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SdNets {
    /// The source net.
    pub s: ArcStr,
    /// The drain net.
    pub d: ArcStr,
    /// The drain connects to the opposite polarity of its half.
    pub d_cross: bool,
}

impl SdNets {
    fn new(s: impl Into<ArcStr>, d: impl Into<ArcStr>) -> Self {
        Self {
            s: s.into(),
            d: d.into(),
            d_cross: false,
        }
    }

    fn crossed(mut self) -> Self {
        self.d_cross = true;
        self
    }
}

/// The result of [`get_integ_amp_info`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct IntegAmpInfo {
    /// The number of fingers in every row.
    pub fg_tot: u32,
    /// The dummy fingers at each edge.
    pub fg_dum: u32,
    /// The fingers separating the two halves.
    pub fg_sep: u32,
    /// The NMOS separation.
    pub fg_sep_nmos: u32,
    /// The PMOS separation.
    pub fg_sep_pmos: u32,
    /// The width of one half circuit.
    pub seg_single: u32,
    /// The column where the left half circuit begins.
    pub core_start: u32,
    /// The `(left, right)` start columns of each device.
    ///
    /// The tail switch spans both halves and has equal entries.
    pub col_dict: IndexMap<ArcStr, (u32, u32)>,
    /// The fingers of each device, per half.
    pub seg_dict: IndexMap<ArcStr, u32>,
    /// The source and drain nets of each device.
    pub sd_dict: IndexMap<ArcStr, SdNets>,
    /// The `(source, drain)` connection directions of each device.
    pub sd_dir_dict: IndexMap<ArcStr, (u8, u8)>,
    /// The gate net of each device.
    pub g_dict: IndexMap<ArcStr, ArcStr>,
    /// The stack height of each device.
    pub stack_dict: IndexMap<ArcStr, u32>,
    /// Base names of nets that exist once per half.
    pub diff_nets: Vec<ArcStr>,
    /// Whether the PMOS sources and drains are swapped.
    pub flip_load_sd: bool,
}

impl IntegAmpInfo {
    /// The concrete name of net `base` in `half`.
    ///
    /// Differential nets get a `p` or `n` suffix; `cross` selects the
    /// opposite polarity.
    pub fn net_name(&self, base: &str, half: Half, cross: bool) -> ArcStr {
        if self.diff_nets.iter().any(|n| n == base) {
            let positive = (half == Half::Left) != cross;
            ArcStr::from(format!("{base}{}", if positive { 'p' } else { 'n' }))
        } else {
            ArcStr::from(base)
        }
    }

    /// The concrete `(source, drain)` nets of device `dev` in `half`.
    pub fn sd_nets(&self, dev: &str, half: Half) -> Result<(ArcStr, ArcStr)> {
        let nets = self
            .sd_dict
            .get(dev)
            .ok_or_else(|| Error::config(format!("integrating amplifier has no `{dev}` device")))?;
        Ok((
            self.net_name(&nets.s, half, false),
            self.net_name(&nets.d, half, nets.d_cross),
        ))
    }

    /// Whether device `dev` is drawn.
    pub fn has_device(&self, dev: &str) -> bool {
        self.col_dict.contains_key(dev)
    }
}

fn validate(tech: &MosTech, seg: &SegDict) -> Result<()> {
    for (name, n) in [("tail", seg.tail), ("nen", seg.nen), ("in", seg.input)] {
        if n == 0 {
            return Err(Error::config(format!(
                "integrating amplifiers require a nonzero `{name}` segment count"
            )));
        }
    }
    if seg.but > 0 && (seg.casc > 0 || seg.load > 0) {
        return Err(Error::config(
            "`but` cannot be combined with `casc` or `load`",
        ));
    }
    if seg.but % 2 != 0 {
        return Err(Error::config(format!(
            "butterfly switches share a junction and need an even segment count, got {}",
            seg.but
        )));
    }
    if seg.pen > 0 && seg.pen != seg.load {
        return Err(Error::config(format!(
            "`pen` ({}) must equal `load` ({})",
            seg.pen, seg.load
        )));
    }
    if seg.cap % 2 != 0 {
        return Err(Error::config(format!(
            "`cap` is split between both edges and must be even, got {}",
            seg.cap
        )));
    }
    if seg.cap > 0 && seg.cap / 2 < tech.min_fg_decap {
        return Err(Error::config(format!(
            "each decoupling capacitor needs {} fingers, got {}",
            tech.min_fg_decap,
            seg.cap / 2
        )));
    }
    let stack_in = seg.stack_in.unwrap_or(1);
    if stack_in == 0 || seg.input % stack_in != 0 {
        return Err(Error::config(format!(
            "`in` ({}) must be a multiple of `stack_in` ({stack_in})",
            seg.input
        )));
    }
    Ok(())
}

/// Computes the columns and nets of an integrating amplifier.
///
/// `fg_dum` dummy fingers are added at each edge. If the result is narrower
/// than `fg_min`, the edges are padded symmetrically and an odd remainder
/// widens the center separation, so the result is exactly `fg_min` wide.
pub fn get_integ_amp_info(
    tech: &MosTech,
    seg: &SegDict,
    fg_min: u32,
    fg_dum: u32,
) -> Result<IntegAmpInfo> {
    validate(tech, seg)?;
    let min_sep = tech.min_fg_sep;
    let fg_sep_nmos = seg.nsep.unwrap_or(min_sep).max(min_sep);
    let fg_sep_pmos = seg.psep.unwrap_or(min_sep).max(min_sep);

    let seg_pmos = seg.load.max(seg.pen);
    let seg_but_tot = 2 * seg.but;
    let seg_single = [seg_pmos, seg.casc, seg.input, seg_but_tot, seg.nen, seg.tail]
        .into_iter()
        .max()
        .unwrap_or(0);
    let mut fg_sep = if seg.tsw > 0 {
        2 * fg_sep_nmos + seg.tsw
    } else {
        fg_sep_nmos.max(fg_sep_pmos)
    };
    let side_need = if seg.cap > 0 { seg.cap / 2 + min_sep } else { 0 };

    let base = 2 * seg_single + fg_sep + 2 * side_need + 2 * fg_dum;
    let mut edge = fg_dum;
    if fg_min > base {
        let pad = fg_min - base;
        edge += pad / 2;
        fg_sep += pad % 2;
        debug!(fg_min, base, pad, "padded integrating amplifier");
    }
    let fg_tot = 2 * edge + 2 * side_need + 2 * seg_single + fg_sep;
    let core_start = edge + side_need;
    let center_l = core_start + seg_single;
    let center_r = center_l + fg_sep;

    let has_mid = seg.casc > 0 || seg.but > 0;
    let stack_in = seg.stack_in.unwrap_or(1);
    let flip_load_sd = seg.en_only || (stack_in % 2 == 0 && has_mid);

    let mut info = IntegAmpInfo {
        fg_tot,
        fg_dum: edge,
        fg_sep,
        fg_sep_nmos,
        fg_sep_pmos,
        seg_single,
        core_start,
        col_dict: IndexMap::new(),
        seg_dict: IndexMap::new(),
        sd_dict: IndexMap::new(),
        sd_dir_dict: IndexMap::new(),
        g_dict: IndexMap::new(),
        stack_dict: IndexMap::new(),
        diff_nets: Vec::new(),
        flip_load_sd,
    };

    let mut diff = vec!["in", "out"];
    if has_mid {
        diff.push("nm");
    }
    if seg.pen > 0 {
        diff.push("pm");
    }
    if seg.tsw > 0 {
        diff.push("tail");
    }
    info.diff_nets = diff.into_iter().map(ArcStr::from).collect();

    let mut add =
        |name: &str, seg_n: u32, cols: (u32, u32), nets: SdNets, dirs: (u8, u8), g: &str| {
            let name = ArcStr::from(name);
            info.col_dict.insert(name.clone(), cols);
            info.seg_dict.insert(name.clone(), seg_n);
            info.sd_dict.insert(name.clone(), nets);
            info.sd_dir_dict.insert(name.clone(), dirs);
            info.g_dict.insert(name.clone(), ArcStr::from(g));
            info.stack_dict.insert(name, 1);
        };
    let sym = |n: u32| (center_l - n, center_r);

    let nmos_dirs = (0, 2);
    add("tail", seg.tail, sym(seg.tail), SdNets::new("VSS", "foot"), nmos_dirs, "biasn");
    add("nen", seg.nen, sym(seg.nen), SdNets::new("foot", "tail"), nmos_dirs, "clkp");
    let in_d = if has_mid { "nm" } else { "out" };
    add("in", seg.input, sym(seg.input), SdNets::new("tail", in_d), nmos_dirs, "in");
    if seg.casc > 0 {
        add("casc", seg.casc, sym(seg.casc), SdNets::new("nm", "out"), nmos_dirs, "casc");
    }
    if seg.but > 0 {
        let b = seg.but;
        let nets = SdNets::new("nm", "out");
        let (cols0, cols1) = ((center_l - 2 * b, center_r + b), (center_l - b, center_r));
        add("but0", b, cols0, nets.clone(), nmos_dirs, "sgnp");
        add("but1", b, cols1, nets.crossed(), nmos_dirs, "sgnn");
    }
    let pmos_dirs = if flip_load_sd { (2, 0) } else { (0, 2) };
    let pm = if seg.pen > 0 { "pm" } else { "VDD" };
    if seg.load > 0 {
        let nets = if flip_load_sd {
            SdNets::new("out", pm)
        } else {
            SdNets::new(pm, "out")
        };
        add("load", seg.load, sym(seg.load), nets, pmos_dirs, "biasp");
    }
    if seg.pen > 0 {
        let nets = if flip_load_sd {
            SdNets::new("pm", "VDD")
        } else {
            SdNets::new("VDD", "pm")
        };
        add("pen", seg.pen, sym(seg.pen), nets, pmos_dirs, "en");
    }
    if seg.tsw > 0 {
        let col = center_l + (fg_sep - seg.tsw) / 2;
        add("tsw", seg.tsw, (col, col), SdNets::new("tailp", "tailn"), (2, 2), "clkn");
    }
    if seg.cap > 0 {
        let half = seg.cap / 2;
        add("cap", half, (edge, fg_tot - edge - half), SdNets::new("VSS", "VSS"), (1, 1), "biasn");
    }
    info.stack_dict.insert(arcstr::literal!("in"), stack_in);
    debug!(fg_tot, seg_single, fg_sep, core_start, "computed integrating amplifier columns");
    Ok(info)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn tech() -> MosTech {
        MosTech {
            mos_conn_layer: 1,
            min_fg_sep: 2,
            min_fg_decap: 2,
            fg_unit: 2,
            w_per_track: 4,
            min_mos_tracks: 2,
            tap_tracks: 2,
        }
    }

    #[test]
    fn tail_switch_sits_between_the_halves() {
        let seg = SegDict {
            tail: 4,
            nen: 4,
            input: 4,
            tsw: 2,
            ..Default::default()
        };
        let info = get_integ_amp_info(&tech(), &seg, 0, 0).unwrap();
        assert_eq!(info.fg_sep, 2 * 2 + 2);
        assert_eq!(info.col_dict["tsw"], (6, 6));
        assert_eq!(
            info.sd_nets("nen", Half::Right).unwrap(),
            (ArcStr::from("foot"), ArcStr::from("tailn"))
        );
        assert_eq!(
            info.sd_nets("tsw", Half::Left).unwrap(),
            (ArcStr::from("tailp"), ArcStr::from("tailn"))
        );
    }

    #[test]
    fn decaps_sit_at_the_edges() {
        let seg = SegDict {
            tail: 2,
            nen: 2,
            input: 2,
            cap: 4,
            ..Default::default()
        };
        let info = get_integ_amp_info(&tech(), &seg, 0, 1).unwrap();
        // 2 * (1 dummy + 2 cap + 2 sep + 2 core) + 2 center
        assert_eq!(info.fg_tot, 16);
        assert_eq!(info.col_dict["cap"], (1, 13));
        assert_eq!(info.col_dict["tail"], (5, 9));
    }

    #[test]
    fn stacked_inputs_flip_the_loads() {
        let seg = SegDict {
            tail: 4,
            nen: 4,
            input: 4,
            casc: 4,
            load: 4,
            stack_in: Some(2),
            ..Default::default()
        };
        let info = get_integ_amp_info(&tech(), &seg, 0, 0).unwrap();
        assert!(info.flip_load_sd);
        assert_eq!(info.sd_dir_dict["load"], (2, 0));
        assert_eq!(info.sd_dict["load"].s, "out");
        assert_eq!(info.stack_dict["in"], 2);
    }

    #[test]
    fn pmos_separation_applies_without_pmos_devices() {
        let seg = SegDict {
            tail: 2,
            nen: 2,
            input: 2,
            psep: Some(4),
            ..Default::default()
        };
        let info = get_integ_amp_info(&tech(), &seg, 0, 0).unwrap();
        assert_eq!(info.fg_sep, 4);
        assert_eq!(info.fg_tot, 2 * 2 + 4);
    }

    #[test]
    fn odd_cap_is_rejected() {
        let seg = SegDict {
            tail: 2,
            nen: 2,
            input: 2,
            cap: 3,
            ..Default::default()
        };
        assert!(matches!(
            get_integ_amp_info(&tech(), &seg, 0, 0),
            Err(Error::Config(_))
        ));
    }
}
