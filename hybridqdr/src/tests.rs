use std::sync::Arc;

use arcstr::ArcStr;
use geometry::prelude::*;
use indexmap::IndexMap;
use routing::{HalfInt, LayerId, LayerSpec, RoutingGrid, TrackId, TrackTables, WireArray};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use test_log::test;

use crate::context::LayoutContext;
use crate::divider::{DigitalParams, DividerColumn, DividerSegs, EnableRetimer, SinClkDivider};
use crate::error::{Error, Result};
use crate::placer::RelPlace;
use crate::qdr::bias::{BiasConfig, BiasLayerConfig};
use crate::qdr::column::TapXColumn;
use crate::qdr::integ_amp::IntegAmp;
use crate::qdr::summer::TapXSummer;
use crate::qdr::summer_cell::SummerParams;
use crate::qdr::{get_integ_amp_info, DeviceParams, Half, SegDict};
use crate::tech::MosTech;
use crate::template::{Generator, Template, TemplateBuilder, TrackConnect};

pub(crate) fn lch() -> Decimal {
    dec!(36e-9)
}

fn layer(id: LayerId, dir: Dir, pitch: i64, width: i64) -> LayerSpec {
    LayerSpec {
        id,
        dir,
        pitch,
        width,
        space_by_width: Vec::new(),
        line_end_space: Vec::new(),
        via_enclosure: 0,
        min_length: 0,
    }
}

pub(crate) fn demo_grid() -> RoutingGrid {
    RoutingGrid::new(
        dec!(1e-9),
        vec![
            layer(1, Dir::Vert, 100, 40),
            layer(2, Dir::Horiz, 100, 40),
            layer(3, Dir::Vert, 100, 40),
            layer(4, Dir::Horiz, 200, 80),
            layer(5, Dir::Vert, 200, 80),
            layer(6, Dir::Horiz, 400, 160),
        ],
    )
    .unwrap()
}

pub(crate) fn demo_tech() -> MosTech {
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

pub(crate) fn demo_ctx() -> LayoutContext {
    LayoutContext::new(demo_grid(), demo_tech()).unwrap()
}

pub(crate) fn demo_tables() -> TrackTables {
    TrackTables::default()
        .with_width("out", 4, 1)
        .with_space("clk:sig", 2, HalfInt::ONE)
}

pub(crate) fn summer_params() -> SummerParams {
    SummerParams {
        lch: lch(),
        ptap_w: 8,
        ntap_w: 8,
        w_sum: DeviceParams::uniform(8),
        w_lat: DeviceParams::uniform(8),
        th_sum: DeviceParams::uniform(arcstr::literal!("lvt")),
        th_lat: DeviceParams::uniform(arcstr::literal!("lvt")),
        fg_dum: 2,
        tr_tables: demo_tables(),
        show_pins: true,
    }
}

/// An amplifier drawn with the summer devices of [`summer_params`].
pub(crate) fn demo_amp(seg_dict: SegDict) -> IntegAmp {
    let p = summer_params();
    IntegAmp {
        lch: p.lch,
        ptap_w: p.ptap_w,
        ntap_w: p.ntap_w,
        w: p.w_sum,
        th: p.th_sum,
        seg_dict,
        fg_min: 0,
        fg_dum: p.fg_dum,
        dum_l: 0,
        out_shift: HalfInt::ZERO,
        tr_tables: p.tr_tables,
        show_pins: true,
    }
}

/// A summer row with `num_ffe` feed-forward taps and DFE taps `2..=num_dfe`.
pub(crate) fn demo_summer(num_ffe: usize, num_dfe: usize) -> TapXSummer {
    let main = SegDict {
        tail: 4,
        nen: 4,
        input: 4,
        casc: 4,
        load: 4,
        ..Default::default()
    };
    let tap = SegDict {
        tail: 2,
        nen: 2,
        input: 2,
        but: 2,
        ..Default::default()
    };
    let lat = SegDict {
        tail: 2,
        nen: 2,
        input: 2,
        load: 2,
        ..Default::default()
    };
    TapXSummer {
        params: summer_params(),
        seg_main: main,
        seg_ffe: vec![tap.clone(); num_ffe],
        seg_dfe: vec![tap; num_dfe.saturating_sub(1)],
        seg_lat: lat,
        flip_sign: Vec::new(),
    }
}

pub(crate) fn demo_bias_config() -> BiasConfig {
    let cfg = BiasLayerConfig {
        w_shield: 2,
        sp_shield: HalfInt::ONE,
        w_sig: 1,
        sp_sig: HalfInt::ONE,
    };
    BiasConfig::default().with_layer(3, cfg).with_layer(4, cfg)
}

pub(crate) fn demo_digital() -> DigitalParams {
    DigitalParams {
        lch: lch(),
        ptap_w: 8,
        ntap_w: 8,
        w_n: 8,
        w_p: 8,
        th_n: arcstr::literal!("lvt"),
        th_p: arcstr::literal!("lvt"),
        tr_tables: demo_tables(),
        show_pins: true,
    }
}

pub(crate) fn demo_segs() -> DividerSegs {
    DividerSegs {
        inv: 2,
        int: 4,
        sr: 2,
        nor: 2,
        retimer: 2,
    }
}

pub(crate) fn demo_divider(fg_min: u32) -> SinClkDivider {
    SinClkDivider {
        params: demo_digital(),
        seg: demo_segs(),
        fg_min,
    }
}

pub(crate) fn demo_retimer(fg_min: u32) -> EnableRetimer {
    EnableRetimer {
        params: demo_digital(),
        seg: demo_segs().retimer,
        fg_min,
    }
}

pub(crate) fn demo_column(num_ffe: usize, num_dfe: usize) -> TapXColumn {
    TapXColumn {
        summer: demo_summer(num_ffe, num_dfe),
        divider: DividerColumn {
            params: demo_digital(),
            seg: demo_segs(),
            fg_min: 0,
        },
        bias_config: demo_bias_config(),
        show_pins: true,
    }
}

/// The port a wire shape belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Owner {
    Top(ArcStr),
    Inst(usize, ArcStr),
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn join(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra] = rb;
    }
}

/// Panics if the wires and vias drawn in `t` join two different ports of
/// `t`, or two different ports of one of its instances.
///
/// Shapes on the same layer are connected when they touch. Instance pins are
/// taken as drawn; the inside of each master is not examined.
pub(crate) fn assert_no_shorts(grid: &RoutingGrid, t: &Template) {
    let mut shapes: Vec<(LayerId, Rect, Option<Owner>)> = Vec::new();
    let mut push = |warr: &WireArray, owner: Option<Owner>| {
        for w in warr.to_warr_list() {
            shapes.push((w.layer(), w.bbox(grid).unwrap(), owner.clone()));
        }
    };
    for warr in t.wires() {
        push(warr, None);
    }
    for name in t.port_names() {
        for warr in t.port_pins_iter(name, None).unwrap() {
            push(warr, Some(Owner::Top(name.clone())));
        }
    }
    for (i, inst) in t.instances().iter().enumerate() {
        for name in inst.master().port_names() {
            for warr in inst.port_pins(grid, name, None).unwrap() {
                push(&warr, Some(Owner::Inst(i, name.clone())));
            }
        }
    }

    let mut parent: Vec<usize> = (0..shapes.len()).collect();
    for a in 0..shapes.len() {
        for b in a + 1..shapes.len() {
            if shapes[a].0 == shapes[b].0 && shapes[a].1.intersection(shapes[b].1).is_some() {
                join(&mut parent, a, b);
            }
        }
    }
    for via in t.vias() {
        let (x, y) = (via.loc.coord(Dir::Horiz), via.loc.coord(Dir::Vert));
        let hits: Vec<usize> = shapes
            .iter()
            .enumerate()
            .filter(|(_, (layer, rect, _))| {
                (*layer == via.bot_layer || *layer == via.bot_layer + 1)
                    && rect.hspan().contains(x)
                    && rect.vspan().contains(y)
            })
            .map(|(i, _)| i)
            .collect();
        for pair in hits.windows(2) {
            join(&mut parent, pair[0], pair[1]);
        }
    }

    let mut nets: IndexMap<usize, Vec<Owner>> = IndexMap::new();
    for (i, (_, _, owner)) in shapes.iter().enumerate() {
        if let Some(owner) = owner {
            let root = find(&mut parent, i);
            let owners = nets.entry(root).or_default();
            if !owners.contains(owner) {
                owners.push(owner.clone());
            }
        }
    }
    for owners in nets.values() {
        let tops: Vec<&ArcStr> = owners
            .iter()
            .filter_map(|o| match o {
                Owner::Top(name) => Some(name),
                Owner::Inst(..) => None,
            })
            .collect();
        assert!(tops.len() <= 1, "{} shorts ports {tops:?}", t.name());
        for (k, a) in owners.iter().enumerate() {
            for b in &owners[k + 1..] {
                if let (Owner::Inst(ia, pa), Owner::Inst(ib, pb)) = (a, b) {
                    assert!(
                        ia != ib || pa == pb,
                        "{} shorts {pa} and {pb} of {}",
                        t.name(),
                        t.instances()[*ia].name()
                    );
                }
            }
        }
    }
}

/// Runs `f` on a builder that is never frozen.
pub(crate) struct Scratch;

impl Scratch {
    pub(crate) fn run<T>(
        ctx: &LayoutContext,
        f: impl FnOnce(&mut TemplateBuilder) -> Result<T>,
    ) -> Result<T> {
        let mut b = TemplateBuilder::new(ctx.clone(), arcstr::literal!("scratch"));
        f(&mut b)
    }
}

/// An empty template with the given array box.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Block {
    w: i64,
    h: i64,
    top_layer: LayerId,
}

impl Generator for Block {
    type Data = ();

    fn name(&self) -> ArcStr {
        arcstr::literal!("block")
    }

    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data> {
        let rect = Rect::from_sides(0, 0, self.w, self.h);
        b.set_size_from_bound_box(self.top_layer, rect)?;
        b.set_array_box(rect);
        Ok(())
    }
}

fn block(w: i64, h: i64) -> Block {
    Block { w, h, top_layer: 3 }
}

#[test]
fn equal_parameters_hit_the_cache() {
    let ctx = demo_ctx();
    let a = ctx.new_template(block(400, 200)).unwrap();
    let b = ctx.new_template(block(400, 200)).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(ctx.num_templates().unwrap(), 1);
    let c = ctx.new_template_with(&a, |p| p.w = 600).unwrap();
    assert_eq!(c.array_box().width(), 600);
    assert_eq!(ctx.num_templates().unwrap(), 2);
}

#[test]
fn failed_generation_is_cached_as_an_error() {
    let ctx = demo_ctx();
    let mut div = demo_divider(0);
    div.seg.inv = 0;
    assert!(matches!(ctx.new_template(div.clone()), Err(Error::Config(_))));
    assert!(matches!(ctx.new_template(div), Err(Error::Config(_))));
}

#[test]
fn relplace_abuts_array_boxes() {
    let ctx = demo_ctx();
    let a = ctx.new_template(block(400, 200)).unwrap();
    let b = ctx.new_template(block(200, 300)).unwrap();
    Scratch::run(&ctx, |t| {
        let ia = t.relplace(a.template(), "XA", RelPlace::origin())?;
        let ib = t.relplace(b.template(), "XB", RelPlace::beside(ia, Side::Right))?;
        let ic = t.relplace(
            b.template(),
            "XC",
            RelPlace::beside(ia, Side::Top).orient(Orientation::MX),
        )?;
        let ib = t.instance(ib)?.array_box();
        assert_eq!((ib.left(), ib.bot()), (400, 0));
        let ic_inst = t.instance(ic)?;
        assert_eq!(ic_inst.orientation(), Orientation::MX);
        assert_eq!(ic_inst.array_box(), Rect::from_sides(0, 200, 200, 500));
        assert_eq!(t.edges().len(), 3);
        Ok(())
    })
    .unwrap();
}

#[test]
fn relplace_shifts_in_grid_units() {
    let ctx = demo_ctx();
    let a = ctx.new_template(block(400, 200)).unwrap();
    let abox = Scratch::run(&ctx, |t| {
        let id = t.relplace(a.template(), "XA", RelPlace::origin().shift(3, 2))?;
        Ok(t.instance(id)?.array_box())
    })
    .unwrap();
    assert_eq!((abox.left(), abox.bot()), (300, 200));
}

#[test]
fn relplace_rejects_overlap() {
    let ctx = demo_ctx();
    let a = ctx.new_template(block(400, 200)).unwrap();
    let err = Scratch::run(&ctx, |t| {
        t.relplace(a.template(), "XA", RelPlace::origin())?;
        t.relplace(a.template(), "XB", RelPlace::origin().shift(2, 0))
    })
    .unwrap_err();
    assert!(matches!(err, Error::CellOverlap { .. }));
}

#[test]
fn relplace_rejects_off_grid_masters() {
    let ctx = demo_ctx();
    let a = ctx.new_template(block(150, 200)).unwrap();
    let err = Scratch::run(&ctx, |t| t.relplace(a.template(), "XA", RelPlace::origin()))
        .unwrap_err();
    assert!(matches!(err, Error::Placement(_)));
}

#[test]
fn connect_wires_is_idempotent() {
    let ctx = demo_ctx();
    let (once, twice) = Scratch::run(&ctx, |b| {
        let w0 = b.add_wires(2, HalfInt::new(3), 0, 500, 1, 1, HalfInt::ZERO)?;
        let w1 = b.add_wires(2, HalfInt::new(3), 300, 900, 1, 1, HalfInt::ZERO)?;
        let once = b.connect_wires(&[w0, w1])?;
        let twice = b.connect_wires(&once)?;
        Ok((once, twice))
    })
    .unwrap();
    assert_eq!(once.len(), 1);
    assert_eq!(once, twice);
    assert_eq!((once[0].lower(), once[0].upper()), (0, 900));
}

#[test]
fn differential_tracks_are_matched() {
    let ctx = demo_ctx();
    let (p, n) = Scratch::run(&ctx, |b| {
        let p = b.add_wires(3, HalfInt::new(2), 0, 400, 1, 1, HalfInt::ZERO)?;
        let n = b.add_wires(3, HalfInt::new(6), 200, 1200, 1, 1, HalfInt::ZERO)?;
        b.connect_differential_tracks(
            &[p],
            &[n],
            4,
            HalfInt::new(1),
            HalfInt::new(4),
            1,
            TrackConnect::default(),
        )
    })
    .unwrap();
    assert_eq!(p.span(), n.span());
    assert_eq!(p.track_id().width(), n.track_id().width());
}

#[test]
fn differential_tracks_must_differ() {
    let ctx = demo_ctx();
    let err = Scratch::run(&ctx, |b| {
        let p = b.add_wires(3, HalfInt::new(2), 0, 400, 1, 1, HalfInt::ZERO)?;
        let n = b.add_wires(3, HalfInt::new(4), 0, 400, 1, 1, HalfInt::ZERO)?;
        b.connect_differential_tracks(
            &[p],
            &[n],
            4,
            HalfInt::new(1),
            HalfInt::new(1),
            1,
            TrackConnect::default(),
        )
    })
    .unwrap_err();
    assert!(matches!(err, Error::Routing(_)));
}

#[test]
fn unknown_nets_are_reported() {
    let ctx = demo_ctx();
    let err = Scratch::run(&ctx, |b| {
        let tid = TrackId::new(2, HalfInt::ZERO, 1);
        b.connect_net_to_tracks("nope", tid, TrackConnect::default())
    })
    .unwrap_err();
    assert!(matches!(err, Error::UnknownNet(ref n) if n == "nope"));
}

#[test]
fn minimum_integ_amp() {
    let tech = demo_tech();
    let seg = SegDict {
        tail: 2,
        nen: 2,
        input: 2,
        ..Default::default()
    };
    let info = get_integ_amp_info(&tech, &seg, 0, 0).unwrap();
    assert_eq!(info.fg_tot, 4 + tech.min_fg_sep);
    assert_eq!(info.fg_dum, 0);
    assert_eq!(info, get_integ_amp_info(&tech, &seg, 0, 0).unwrap());
}

#[test]
fn cascode_integ_amp() {
    let seg = SegDict {
        tail: 4,
        nen: 4,
        input: 4,
        casc: 6,
        load: 8,
        pen: 8,
        ..Default::default()
    };
    let info = get_integ_amp_info(&demo_tech(), &seg, 0, 0).unwrap();
    assert_eq!(info.seg_single, 8);
    let (_, load_d) = info.sd_nets("load", Half::Left).unwrap();
    assert_eq!(load_d, "outp");
    let (casc_s, _) = info.sd_nets("casc", Half::Left).unwrap();
    assert_eq!(casc_s, "nmp");
}

#[test]
fn butterfly_integ_amp() {
    let seg = SegDict {
        tail: 4,
        nen: 4,
        input: 4,
        but: 6,
        ..Default::default()
    };
    let info = get_integ_amp_info(&demo_tech(), &seg, 0, 0).unwrap();
    assert_eq!(info.sd_nets("but0", Half::Left).unwrap().1, "outp");
    assert_eq!(info.sd_nets("but1", Half::Left).unwrap().1, "outn");
    assert_eq!(info.sd_nets("but0", Half::Right).unwrap().1, "outn");
    assert_eq!(info.sd_nets("but1", Half::Right).unwrap().1, "outp");
}

#[test]
fn cascode_and_butterfly_conflict() {
    let seg = SegDict {
        tail: 4,
        nen: 4,
        input: 4,
        casc: 4,
        but: 2,
        ..Default::default()
    };
    assert!(matches!(
        get_integ_amp_info(&demo_tech(), &seg, 0, 0),
        Err(Error::Config(_))
    ));
}

#[test]
fn divider_matches_any_wider_fg_min() {
    let ctx = demo_ctx();
    let intrinsic = ctx.new_template(demo_divider(0)).unwrap().data().fg_intrinsic;
    for extra in [0, 2, 10] {
        let n = intrinsic + extra;
        let div = ctx.new_template(demo_divider(n)).unwrap();
        assert_eq!(div.data().fg_tot, n);
    }
}
