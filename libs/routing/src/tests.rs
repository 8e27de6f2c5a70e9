use std::sync::Arc;

use geometry::prelude::*;
use indexmap::IndexMap;
use rust_decimal_macros::dec;
use test_log::test;

use crate::grid::FillConfig;
use crate::manager::SpaceOverride;
use crate::*;

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

fn demo_grid() -> RoutingGrid {
    let mut m2 = layer(2, Dir::Horiz, 100, 50);
    m2.via_enclosure = 10;
    m2.line_end_space = vec![(50, 80), (250, 120)];
    let mut m3 = layer(3, Dir::Vert, 120, 60);
    m3.via_enclosure = 20;
    m3.space_by_width = vec![(60, 60), (180, 120)];
    m3.min_length = 400;
    RoutingGrid::new(
        dec!(1e-9),
        vec![
            layer(1, Dir::Vert, 100, 40),
            m2,
            m3,
            layer(4, Dir::Horiz, 200, 100),
            layer(5, Dir::Vert, 400, 200),
        ],
    )
    .unwrap()
}

fn demo_manager(half_space: bool) -> TrackManager {
    let tables = TrackTables::default()
        .with_width("sup", 4, 2)
        .with_width("clk", 4, 1)
        .with_space("sup", 4, HalfInt::ONE)
        .with_space("clk:sig", 4, HalfInt::new(2));
    TrackManager::new(Arc::new(demo_grid()), tables, half_space)
}

#[test]
fn grid_rejects_parallel_adjacent_layers() {
    let err = RoutingGrid::new(
        dec!(1e-9),
        vec![layer(1, Dir::Vert, 100, 40), layer(2, Dir::Vert, 100, 40)],
    )
    .unwrap_err();
    assert!(matches!(err, GridError::DirectionMismatch { layer: 2, .. }));
}

#[test]
fn grid_rejects_odd_width() {
    let err = RoutingGrid::new(dec!(1e-9), vec![layer(1, Dir::Vert, 100, 41)]).unwrap_err();
    assert!(matches!(err, GridError::InvalidWidth { layer: 1, .. }));
}

#[test]
fn track_coord_round_trip() {
    let grid = demo_grid();
    for id in 1..=5 {
        for dbl in -21..=21 {
            let idx = HalfInt::from_dbl(dbl);
            let coord = grid.track_to_coord(id, idx).unwrap();
            assert_eq!(grid.coord_to_track(id, coord).unwrap(), idx);
        }
    }
}

#[test]
fn coord_to_track_failures() {
    let grid = demo_grid();
    assert!(matches!(
        grid.coord_to_track(2, 30),
        Err(GridError::OffGrid { layer: 2, coord: 30 })
    ));
    assert!(matches!(
        grid.coord_to_track(2, 1 << 41),
        Err(GridError::OutOfRange { .. })
    ));
    assert!(matches!(
        grid.track_to_coord(2, HalfInt::new(i64::MAX / 4)),
        Err(GridError::TrackOutOfRange { .. })
    ));
    assert_eq!(grid.coord_to_track(9, 0), Err(GridError::UnknownLayer(9)));
}

#[test]
fn nearest_track_modes() {
    let grid = demo_grid();
    let nearest = |coord, mode, half| grid.coord_to_nearest_track(2, coord, mode, half).unwrap();
    assert_eq!(nearest(120, RoundingMode::Down, false), HalfInt::new(0));
    assert_eq!(nearest(120, RoundingMode::Up, false), HalfInt::new(1));
    assert_eq!(nearest(120, RoundingMode::Nearest, false), HalfInt::new(1));
    // Ties round up.
    assert_eq!(nearest(100, RoundingMode::Nearest, false), HalfInt::new(1));
    assert_eq!(nearest(-60, RoundingMode::Down, false), HalfInt::new(-2));
    assert_eq!(nearest(120, RoundingMode::Down, true), HalfInt::from_dbl(1));
    assert_eq!(nearest(120, RoundingMode::Up, true), HalfInt::new(1));
    assert_eq!(nearest(150, RoundingMode::Up, true), HalfInt::new(1));
}

#[test]
fn find_next_track_accounts_for_width() {
    let grid = demo_grid();
    let up = grid
        .find_next_track(2, 120, 1, false, RoundingMode::Up)
        .unwrap();
    assert_eq!(up, HalfInt::new(1));
    assert!(grid.get_wire_bounds(2, up, 1).unwrap().0 >= 120);
    let down = grid
        .find_next_track(2, 120, 1, false, RoundingMode::Down)
        .unwrap();
    assert_eq!(down, HalfInt::new(0));
    assert!(grid.get_wire_bounds(2, down, 1).unwrap().1 <= 120);

    let up = grid
        .find_next_track(2, 120, 2, true, RoundingMode::Up)
        .unwrap();
    assert!(grid.get_wire_bounds(2, up, 2).unwrap().0 >= 120);
}

#[test]
fn wire_widths_and_bounds() {
    let grid = demo_grid();
    assert_eq!(grid.get_wire_width(3, 2).unwrap(), 180);
    assert_eq!(
        grid.get_wire_bounds(3, HalfInt::from_dbl(1), 2).unwrap(),
        (30, 210)
    );
    assert!(grid.get_wire_width(3, 0).is_err());
}

#[test]
fn space_tracks_follow_width_rules() {
    let grid = demo_grid();
    assert_eq!(grid.get_num_space_tracks(3, 1, false).unwrap(), HalfInt::ZERO);
    assert_eq!(grid.get_num_space_tracks(3, 2, true).unwrap(), HalfInt::HALF);
    assert_eq!(grid.get_num_space_tracks(3, 2, false).unwrap(), HalfInt::ONE);
    // Wider than any entry uses the last entry.
    assert_eq!(grid.get_num_space_tracks(3, 4, false).unwrap(), HalfInt::ONE);
    assert_eq!(grid.get_line_end_space(2, 1).unwrap(), 80);
    assert_eq!(grid.get_line_end_space(2, 3).unwrap(), 120);
    assert_eq!(grid.get_line_end_space(4, 1).unwrap(), 100);
}

#[test]
fn via_extensions_and_min_length() {
    let grid = demo_grid();
    assert_eq!(grid.get_via_extensions(2, 1, 1).unwrap(), (40, 45));
    assert_eq!(grid.get_via_extensions(2, 2, 2).unwrap(), (100, 95));
    assert_eq!(
        grid.get_via_extensions(5, 1, 1),
        Err(GridError::NonAdjacentLayers(5, 6))
    );
    assert_eq!(grid.get_min_length(3, 1).unwrap(), 400);
    assert_eq!(grid.get_min_length(2, 1).unwrap(), 50);
}

#[test]
fn block_and_fill_sizes() {
    let grid = demo_grid();
    assert_eq!(grid.get_block_size(2).unwrap(), (100, 100));
    assert_eq!(grid.get_block_size(4).unwrap(), (600, 200));
    assert_eq!(grid.get_block_size(5).unwrap(), (1200, 200));

    let mut fill = IndexMap::new();
    fill.insert(
        4,
        FillConfig {
            tr_w: 2,
            tr_sp: 1,
            sp: 100,
            sp_le: 200,
        },
    );
    assert_eq!(grid.get_fill_size(4, &fill).unwrap(), (600, 600));
    fill.insert(
        3,
        FillConfig {
            tr_w: 1,
            tr_sp: 4,
            sp: 100,
            sp_le: 200,
        },
    );
    assert_eq!(grid.get_fill_size(4, &fill).unwrap(), (600, 600));
    assert_eq!(grid.get_fill_size(5, &fill).unwrap(), (1200, 600));
}

#[test]
fn middle_track_tie_break() {
    let a = HalfInt::new(0);
    assert_eq!(
        RoutingGrid::get_middle_track(a, HalfInt::new(3), false),
        HalfInt::from_dbl(3)
    );
    assert_eq!(
        RoutingGrid::get_middle_track(a, HalfInt::HALF, true),
        HalfInt::HALF
    );
    assert_eq!(
        RoutingGrid::get_middle_track(a, HalfInt::HALF, false),
        HalfInt::ZERO
    );
}

#[test]
fn transform_track_mirrors() {
    let grid = demo_grid();
    let tf = Transformation::from_offset_and_orientation(Point::new(0, 1000), Orientation::MX);
    assert_eq!(
        grid.transform_track(2, HalfInt::new(2), &tf).unwrap(),
        HalfInt::new(7)
    );
    // Vertical tracks are unaffected by a mirror about the x axis.
    assert_eq!(
        grid.transform_track(3, HalfInt::new(2), &tf).unwrap(),
        HalfInt::new(2)
    );
    let tf = Transformation::from_offset(Point::new(600, 0));
    assert_eq!(
        grid.transform_track(3, HalfInt::new(2), &tf).unwrap(),
        HalfInt::new(7)
    );
}

#[test]
fn wire_array_geometry() {
    let grid = demo_grid();
    let warr = WireArray::new(TrackId::new(2, HalfInt::ZERO, 1), 500, 0);
    assert_eq!((warr.lower(), warr.upper()), (0, 500));
    assert_eq!(warr.bbox(&grid).unwrap(), Rect::from_sides(0, 25, 500, 75));

    let tf = Transformation::from_offset_and_orientation(Point::new(0, 1000), Orientation::MX);
    let moved = warr.transform(&grid, &tf).unwrap();
    assert_eq!(moved.track_id().base_index(), HalfInt::new(9));
    assert_eq!(moved.span(), Span::new(0, 500));
}

#[test]
fn track_id_bus() {
    let tid = TrackId::bus(3, HalfInt::new(1), 1, 3, HalfInt::new(2));
    let idx: Vec<_> = tid.indices().collect();
    assert_eq!(idx, vec![HalfInt::new(1), HalfInt::new(3), HalfInt::new(5)]);
    assert_eq!(tid.middle(), HalfInt::new(3));
    let warrs = WireArray::new(tid, 0, 100).to_warr_list();
    assert_eq!(warrs.len(), 3);
    assert_eq!(warrs[2].track_id().base_index(), HalfInt::new(5));
}

#[test]
fn widths_and_spaces() {
    let tm = demo_manager(false);
    assert_eq!(tm.get_width(4, &"sup".into()), 2);
    assert_eq!(tm.get_width(4, &"unknown".into()), 1);
    assert_eq!(tm.get_width(3, &"sup".into()), 1);
    assert_eq!(tm.get_width(4, &TrackType::Width(3)), 3);
    assert_eq!(
        tm.get_space(4, &"sig".into(), &"clk".into()).unwrap(),
        HalfInt::new(2)
    );
    assert_eq!(
        tm.get_space(4, &"sig".into(), &"sup".into()).unwrap(),
        HalfInt::ONE
    );
    assert_eq!(
        tm.get_space(4, &"sig".into(), &"sig".into()).unwrap(),
        HalfInt::ZERO
    );
    // Falls back to the grid spacing rules for wide wires.
    assert_eq!(
        tm.get_space(3, &TrackType::Width(2), &"sig".into()).unwrap(),
        HalfInt::ONE
    );
}

#[test]
fn place_wires_respects_edge_spacing() {
    let tm = demo_manager(true);
    let grid = tm.grid();
    let types: Vec<TrackType> = vec![
        "sig".into(),
        "clk".into(),
        "sup".into(),
        TrackType::Width(2),
        TrackType::Width(3),
    ];
    for id in 2..=4 {
        let spec = grid.layer(id).unwrap();
        for a in types.iter() {
            for b in types.iter() {
                let pair = [a.clone(), b.clone()];
                let (_, locs) = tm.place_wires(id, &pair, HalfInt::ZERO).unwrap();
                let sp = tm.get_space(id, a, b).unwrap();
                let (_, a_hi) = grid
                    .get_wire_bounds(id, locs[0], tm.get_width(id, a))
                    .unwrap();
                let (b_lo, _) = grid
                    .get_wire_bounds(id, locs[1], tm.get_width(id, b))
                    .unwrap();
                let required = sp.dbl() * spec.pitch / 2 + spec.track_space();
                assert!(
                    b_lo - a_hi >= required,
                    "{a} then {b} on layer {id}: gap {} < {required}",
                    b_lo - a_hi
                );
            }
        }
    }
}

#[test]
fn place_wires_counts_used_tracks() {
    let tm = demo_manager(false);
    let (used, locs) = tm
        .place_wires(4, &["sig".into(), "sup".into(), "sig".into()], HalfInt::ZERO)
        .unwrap();
    assert_eq!(used, HalfInt::new(6));
    assert_eq!(
        locs,
        vec![HalfInt::ZERO, HalfInt::from_dbl(5), HalfInt::new(5)]
    );

    let (used, locs) = tm.place_wires(4, &[], HalfInt::new(3)).unwrap();
    assert_eq!(used, HalfInt::ZERO);
    assert!(locs.is_empty());
}

#[test]
fn next_track_in_both_directions() {
    let tm = demo_manager(false);
    let up = tm
        .get_next_track(4, HalfInt::ZERO, &"sig".into(), &"sup".into(), true)
        .unwrap();
    let down = tm
        .get_next_track(4, HalfInt::ZERO, &"sig".into(), &"sup".into(), false)
        .unwrap();
    assert_eq!(up, HalfInt::from_dbl(5));
    assert_eq!(down, HalfInt::from_dbl(-5));
}

#[test]
fn spread_wires_alignments() {
    let tm = demo_manager(false);
    let sig: TrackType = "sig".into();
    let types = vec![sig.clone(), sig.clone(), sig.clone()];
    let ntr = HalfInt::new(9);
    let spread = |key: Option<&TrackType>, align, ov: &[SpaceOverride]| {
        tm.spread_wires(4, &types, ntr, key, align, HalfInt::ZERO, ov)
            .unwrap()
    };
    let ints = |v: &[i64]| v.iter().map(|x| HalfInt::new(*x)).collect::<Vec<_>>();

    assert_eq!(spread(None, Alignment::Center, &[]), ints(&[0, 4, 8]));
    assert_eq!(spread(Some(&sig), Alignment::Center, &[]), ints(&[3, 4, 5]));
    assert_eq!(spread(None, Alignment::Lower, &[]), ints(&[0, 1, 2]));
    assert_eq!(spread(None, Alignment::Upper, &[]), ints(&[6, 7, 8]));
    assert_eq!(
        spread(
            None,
            Alignment::Lower,
            &[(sig.clone(), sig.clone(), HalfInt::new(2))]
        ),
        ints(&[0, 3, 6])
    );

    let err = tm
        .spread_wires(4, &types, HalfInt::new(2), None, Alignment::Center, HalfInt::ZERO, &[])
        .unwrap_err();
    assert_eq!(
        err,
        GridError::InsufficientSpace {
            layer: 4,
            needed: HalfInt::new(3),
            available: HalfInt::new(2),
        }
    );
}

#[test]
fn spread_wires_keeps_key_spacing() {
    let tm = demo_manager(false);
    let types: Vec<TrackType> = vec!["sig".into(), "clk".into(), "sig".into(), "sig".into()];
    let locs = tm
        .spread_wires(
            4,
            &types,
            HalfInt::new(12),
            Some(&"clk".into()),
            Alignment::Center,
            HalfInt::ZERO,
            &[],
        )
        .unwrap();
    // sig-clk pairs keep their two-track spacing; the sig-sig gap absorbs the slack.
    assert_eq!(locs[1] - locs[0], HalfInt::new(3));
    assert_eq!(locs[2] - locs[1], HalfInt::new(3));
    assert_eq!(locs[3] - locs[2], HalfInt::new(5));
}

#[test]
fn align_wires_centers_without_inflation() {
    let tm = demo_manager(false);
    let locs = tm
        .align_wires(
            4,
            &["sig".into(), "sup".into()],
            HalfInt::new(8),
            Alignment::Center,
            HalfInt::ZERO,
        )
        .unwrap();
    assert_eq!(locs, vec![HalfInt::new(2), HalfInt::from_dbl(9)]);
    assert!(tm
        .align_wires(4, &["sup".into(), "sup".into()], HalfInt::new(4), Alignment::Lower, HalfInt::ZERO)
        .is_err());
}

#[test]
fn track_tables_from_yaml() {
    let tables: TrackTables = serde_yaml::from_str(
        r#"
widths:
  sup: {4: 2}
spaces:
  "clk:sig": {4: 1.5}
  sup: {4: 1}
"#,
    )
    .unwrap();
    let tm = TrackManager::new(Arc::new(demo_grid()), tables, true);
    assert_eq!(tm.get_width(4, &"sup".into()), 2);
    assert_eq!(
        tm.get_space(4, &"sig".into(), &"clk".into()).unwrap(),
        HalfInt::from_dbl(3)
    );
}
