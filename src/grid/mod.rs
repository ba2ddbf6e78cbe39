//! Tile grid model
//!
//! Holds the tiles of a mosaic on an `nrow x ncol` grid (which may have holes)
//! and derives the adjacency used by pairwise registration and by traversal.

use crate::error::{Result, StitchError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Backing format of a tile on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TileType {
    /// One directory per tile holding a sequence of 2D slices
    #[value(name = "tiff2d")]
    Tiff2D,
    /// One multi-page TIFF per tile
    #[value(name = "tiff3d")]
    Tiff3D,
    /// Adaptive particle representation, loaded by an external collaborator
    #[value(name = "apr")]
    Apr,
}

impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileType::Tiff2D => write!(f, "tiff2d"),
            TileType::Tiff3D => write!(f, "tiff3d"),
            TileType::Apr => write!(f, "apr"),
        }
    }
}

/// Zero-based position of a tile on the acquisition grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
}

impl GridCell {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub path: PathBuf,
    pub row: usize,
    pub col: usize,
    pub tile_type: TileType,
}

impl Tile {
    pub fn new(path: impl Into<PathBuf>, row: usize, col: usize, tile_type: TileType) -> Self {
        Self {
            path: path.into(),
            row,
            col,
            tile_type,
        }
    }

    pub fn cell(&self) -> GridCell {
        GridCell::new(self.row, self.col)
    }
}

/// Direction from one grid cell to an adjacent one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    East,
    South,
    West,
    North,
}

impl Direction {
    /// Infer the direction of `to` as seen from `from`.
    ///
    /// Only 4-connected neighbors resolve to a direction.
    pub fn between(from: GridCell, to: GridCell) -> Option<Direction> {
        if from.row == to.row && to.col == from.col + 1 {
            Some(Direction::East)
        } else if from.col == to.col && to.row == from.row + 1 {
            Some(Direction::South)
        } else if from.row == to.row && from.col == to.col + 1 {
            Some(Direction::West)
        } else if from.col == to.col && from.row == to.row + 1 {
            Some(Direction::North)
        } else {
            None
        }
    }

    /// EAST and SOUTH are the only directions measured by pairwise registration
    pub fn is_forward(self) -> bool {
        matches!(self, Direction::East | Direction::South)
    }
}

/// A directed pair of adjacent occupied cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NeighborEdge {
    pub from: GridCell,
    pub to: GridCell,
    pub direction: Direction,
}

impl NeighborEdge {
    pub fn new(from: GridCell, to: GridCell) -> Result<Self> {
        let direction = Direction::between(from, to).ok_or(StitchError::DirectionInference {
            from_row: from.row,
            from_col: from.col,
            to_row: to.row,
            to_col: to.col,
        })?;
        Ok(Self {
            from,
            to,
            direction,
        })
    }
}

/// Which grid cells hold a tile, and the path backing each one
#[derive(Debug, Clone)]
pub struct TilePattern {
    occupied: Array2<bool>,
    paths: Array2<Option<PathBuf>>,
}

impl TilePattern {
    fn from_tiles(nrow: usize, ncol: usize, tiles: &[Tile]) -> Self {
        let mut occupied = Array2::from_elem((nrow, ncol), false);
        let mut paths = Array2::from_elem((nrow, ncol), None);
        for tile in tiles {
            occupied[[tile.row, tile.col]] = true;
            paths[[tile.row, tile.col]] = Some(tile.path.clone());
        }
        Self { occupied, paths }
    }

    pub fn is_occupied(&self, cell: GridCell) -> bool {
        self.occupied
            .get([cell.row, cell.col])
            .copied()
            .unwrap_or(false)
    }

    pub fn path(&self, cell: GridCell) -> Option<&Path> {
        self.paths
            .get([cell.row, cell.col])
            .and_then(|p| p.as_deref())
    }

    pub fn occupied(&self) -> &Array2<bool> {
        &self.occupied
    }
}

/// Tiles arranged on the acquisition grid with their adjacency maps
#[derive(Debug, Clone)]
pub struct GridModel {
    tiles: Vec<Tile>,
    nrow: usize,
    ncol: usize,
    pattern: TilePattern,
    neighbors: Vec<Vec<NeighborEdge>>,
    neighbors_total: Vec<Vec<NeighborEdge>>,
}

impl GridModel {
    /// Build the grid from discovered tiles.
    ///
    /// Rows and columns are shifted so that the smallest ones are 0, and the
    /// tiles are sorted row-major.
    pub fn new(mut tiles: Vec<Tile>) -> Result<Self> {
        if tiles.is_empty() {
            return Err(StitchError::Discovery("no tiles were found".to_string()));
        }

        correct_offset(&mut tiles);
        tiles.sort_by_key(|t| (t.row, t.col));

        let mut seen = HashSet::new();
        for tile in &tiles {
            if !seen.insert(tile.cell()) {
                return Err(StitchError::Discovery(format!(
                    "more than one tile at {} ({:?})",
                    tile.cell(),
                    tile.path
                )));
            }
        }

        let nrow = tiles.iter().map(|t| t.row).max().unwrap_or(0) + 1;
        let ncol = tiles.iter().map(|t| t.col).max().unwrap_or(0) + 1;
        let pattern = TilePattern::from_tiles(nrow, ncol, &tiles);

        let mut grid = Self {
            tiles,
            nrow,
            ncol,
            pattern,
            neighbors: Vec::new(),
            neighbors_total: Vec::new(),
        };
        grid.neighbors = grid.build_neighbors_map(false)?;
        grid.neighbors_total = grid.build_neighbors_map(true)?;

        tracing::info!(
            tiles = grid.tiles.len(),
            nrow = grid.nrow,
            ncol = grid.ncol,
            edges = grid.n_edges(),
            "Parsed tile grid"
        );
        Ok(grid)
    }

    fn build_neighbors_map(&self, redundant: bool) -> Result<Vec<Vec<NeighborEdge>>> {
        let mut map = vec![Vec::new(); self.n_vertex()];
        for tile in &self.tiles {
            let cell = tile.cell();
            let (y, x) = (cell.row, cell.col);
            let mut candidates = vec![GridCell::new(y, x + 1), GridCell::new(y + 1, x)];
            if redundant {
                if x > 0 {
                    candidates.push(GridCell::new(y, x - 1));
                }
                if y > 0 {
                    candidates.push(GridCell::new(y - 1, x));
                }
            }
            for other in candidates {
                if self.pattern.is_occupied(other) {
                    map[self.ravel(cell)].push(NeighborEdge::new(cell, other)?);
                }
            }
        }
        Ok(map)
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Number of graph vertices, holes included
    pub fn n_vertex(&self) -> usize {
        self.nrow * self.ncol
    }

    pub fn n_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn pattern(&self) -> &TilePattern {
        &self.pattern
    }

    pub fn is_occupied(&self, cell: GridCell) -> bool {
        self.pattern.is_occupied(cell)
    }

    pub fn tile_at(&self, cell: GridCell) -> Option<&Tile> {
        if !self.is_occupied(cell) {
            return None;
        }
        self.tiles
            .binary_search_by_key(&(cell.row, cell.col), |t| (t.row, t.col))
            .ok()
            .map(|i| &self.tiles[i])
    }

    /// Row-major vertex index of a cell
    pub fn ravel(&self, cell: GridCell) -> usize {
        cell.row * self.ncol + cell.col
    }

    pub fn unravel(&self, index: usize) -> GridCell {
        GridCell::new(index / self.ncol, index % self.ncol)
    }

    /// EAST and SOUTH neighbors of `cell`
    pub fn neighbors(&self, cell: GridCell) -> &[NeighborEdge] {
        self.neighbors
            .get(self.ravel(cell))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All four neighbors of `cell`
    pub fn neighbors_total(&self, cell: GridCell) -> &[NeighborEdge] {
        self.neighbors_total
            .get(self.ravel(cell))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every non-redundant edge, in row-major order of the source cell
    pub fn edges(&self) -> Vec<NeighborEdge> {
        self.neighbors.iter().flatten().copied().collect()
    }

    pub fn n_edges(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum()
    }
}

fn correct_offset(tiles: &mut [Tile]) {
    let row_min = tiles.iter().map(|t| t.row).min().unwrap_or(0);
    let col_min = tiles.iter().map(|t| t.col).min().unwrap_or(0);
    if row_min > 0 || col_min > 0 {
        for tile in tiles.iter_mut() {
            tile.row -= row_min;
            tile.col -= col_min;
        }
    }
}
