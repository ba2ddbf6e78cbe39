mod common;

use common::{mosaic, Displacement, FRAME, OVERLAP};
use tile_stitcher::algorithms::{PhaseCorrelation, Projections};
use tile_stitcher::{Direction, GridCell, NeighborEdge, PairwiseRegistrar, TileLoader};

fn registrar() -> PairwiseRegistrar {
    PairwiseRegistrar::new(OVERLAP, FRAME, 1)
}

#[test]
fn test_recovers_pure_east_translation() {
    let (grid, loader) = mosaic(&[
        ((0, 0), Displacement::new(0, 0, 0)),
        ((0, 1), Displacement::new(0, 0, 7)),
    ]);
    let edge = grid.edges()[0];
    assert_eq!(edge.direction, Direction::East);

    let m = registrar().register_edge(&grid, &edge, &loader).unwrap();
    assert!((m.shift.h - 7.0).abs() < 0.5, "dH = {}", m.shift.h);
    assert!(m.shift.v.abs() < 0.5, "dV = {}", m.shift.v);
    assert!(m.shift.d.abs() < 0.5, "dD = {}", m.shift.d);
}

#[test]
fn test_h_reliability_comes_from_best_h_plane() {
    let (grid, loader) = mosaic(&[
        ((0, 0), Displacement::new(0, 0, 0)),
        ((0, 1), Displacement::new(0, 0, 7)),
    ]);
    let first = loader.load(&grid.tiles()[0]).unwrap();
    let second = loader.load(&grid.tiles()[1]).unwrap();
    let p1 = Projections::from_volume(&first);
    let p2 = Projections::from_volume(&second);

    let planes = registrar()
        .estimate_planes(Direction::East, &p1, &p2)
        .unwrap();
    let edge = NeighborEdge::new(GridCell::new(0, 0), GridCell::new(0, 1)).unwrap();
    let m = registrar().register_projections(&edge, &p1, &p2).unwrap();

    assert_eq!(m.reliability.h, planes.zx.error.min(planes.yx.error));
    assert!(m.reliability.h >= 0.0);
}

#[test]
fn test_recovers_south_translation_with_lateral_drift() {
    let (grid, loader) = mosaic(&[
        ((0, 0), Displacement::new(0, 0, 0)),
        ((1, 0), Displacement::new(2, 3, -2)),
    ]);
    let edge = grid.edges()[0];
    assert_eq!(edge.direction, Direction::South);

    let m = registrar().register_edge(&grid, &edge, &loader).unwrap();
    assert!((m.shift.v - 3.0).abs() < 0.5, "dV = {}", m.shift.v);
    assert!((m.shift.h + 2.0).abs() < 0.5, "dH = {}", m.shift.h);
    assert!((m.shift.d - 2.0).abs() < 0.5, "dD = {}", m.shift.d);
}

#[test]
fn test_subpixel_refinement_keeps_integer_shift() {
    let (grid, loader) = mosaic(&[
        ((0, 0), Displacement::new(0, 0, 0)),
        ((0, 1), Displacement::new(0, 0, 5)),
    ]);
    let edge = grid.edges()[0];
    let m = PairwiseRegistrar::new(OVERLAP, FRAME, 10)
        .register_edge(&grid, &edge, &loader)
        .unwrap();
    assert!((m.shift.h - 5.0).abs() < 0.2, "dH = {}", m.shift.h);
}

#[test]
fn test_identical_images_register_perfectly() {
    let volume = common::world(4, 32, 32);
    let plane = Projections::from_volume(&volume).yx;
    let estimate = PhaseCorrelation::default().register(&plane, &plane).unwrap();
    assert_eq!(estimate.shift, [0.0, 0.0]);
    assert!(estimate.error < 1e-4);
}
