#![allow(dead_code)]

use ndarray::{s, Array3};
use tile_stitcher::{GridCell, GridModel, MemoryLoader, Tile, TileType, Volume};

pub const FRAME: usize = 64;
pub const OVERLAP: usize = 24;
pub const DEPTH: usize = 16;
pub const SPACING: usize = FRAME - OVERLAP;
const MARGIN: usize = 4;

fn splitmix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Sparse bright spots on a dim background, like labelled nuclei
pub fn world(nz: usize, ny: usize, nx: usize) -> Array3<f32> {
    Array3::from_shape_fn((nz, ny, nx), |(z, y, x)| {
        let h = splitmix(((z * 1_000_003 + y) * 1_000_003 + x) as u64);
        if h % 151 == 0 {
            1000.0 + (h % 1000) as f32
        } else {
            (h % 10) as f32
        }
    })
}

/// Displacement of a tile from its nominal grid position, in pixels
#[derive(Debug, Clone, Copy)]
pub struct Displacement {
    pub dz: usize,
    pub dy: isize,
    pub dx: isize,
}

impl Displacement {
    pub fn new(dz: usize, dy: isize, dx: isize) -> Self {
        Self { dz, dy, dx }
    }
}

/// Cut tiles out of one synthetic world at the given displacements
pub fn mosaic(cells: &[((usize, usize), Displacement)]) -> (GridModel, MemoryLoader) {
    let nrow = cells.iter().map(|((r, _), _)| r + 1).max().unwrap_or(1);
    let ncol = cells.iter().map(|((_, c), _)| c + 1).max().unwrap_or(1);
    let max_dz = cells.iter().map(|(_, d)| d.dz).max().unwrap_or(0);
    let ny = 2 * MARGIN + (nrow - 1) * SPACING + FRAME + MARGIN;
    let nx = 2 * MARGIN + (ncol - 1) * SPACING + FRAME + MARGIN;
    let w = world(DEPTH + max_dz, ny, nx);

    let mut loader = MemoryLoader::new();
    let mut tiles = Vec::new();
    for &((row, col), d) in cells {
        let y0 = (2 * MARGIN + row * SPACING) as isize + d.dy;
        let x0 = (2 * MARGIN + col * SPACING) as isize + d.dx;
        assert!(y0 >= 0 && x0 >= 0, "displacement larger than the margin");
        let (y0, x0) = (y0 as usize, x0 as usize);
        let volume: Volume = w
            .slice(s![d.dz..d.dz + DEPTH, y0..y0 + FRAME, x0..x0 + FRAME])
            .to_owned();
        loader.insert(GridCell::new(row, col), volume);
        tiles.push(Tile::new(
            format!("{}_{}.tif", row, col),
            row,
            col,
            TileType::Tiff3D,
        ));
    }
    (GridModel::new(tiles).unwrap(), loader)
}
