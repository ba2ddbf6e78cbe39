use crate::data::loader::has_tiff_extension;
use crate::error::{Result, StitchError};
use crate::grid::{GridModel, Tile, TileType};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Detect the tile format from the contents of `root`.
///
/// Exactly one of: sub-directories (2D slice sequences), `.tif` files
/// (3D stacks) or `.apr` files must be present.
pub fn detect_type(root: &Path) -> Result<TileType> {
    let entries = list_entries(root)?;
    let n_dirs = entries.iter().filter(|p| p.is_dir()).count();
    let n_tif = entries
        .iter()
        .filter(|p| p.is_file() && has_tiff_extension(p))
        .count();
    let n_apr = entries
        .iter()
        .filter(|p| p.is_file() && has_extension(p, "apr"))
        .count();

    let detected = [n_dirs, n_tif, n_apr].iter().filter(|&&n| n > 0).count();
    if detected != 1 {
        return Err(StitchError::Discovery(format!(
            "could not determine file type automatically in {:?} ({} folders, {} tif, {} apr)",
            root, n_dirs, n_tif, n_apr
        )));
    }

    Ok(if n_dirs > 0 {
        TileType::Tiff2D
    } else if n_tif > 0 {
        TileType::Tiff3D
    } else {
        TileType::Apr
    })
}

/// List the tiles found under `root`, each named `<row>_<col>`.
pub fn discover_tiles(root: &Path, tile_type: TileType) -> Result<Vec<Tile>> {
    let pattern = Regex::new(r"(\d+)_(\d+)").map_err(|e| StitchError::Discovery(e.to_string()))?;

    let mut tiles = Vec::new();
    for path in list_entries(root)? {
        let candidate = match tile_type {
            TileType::Tiff2D => path.is_dir(),
            TileType::Tiff3D => path.is_file() && has_tiff_extension(&path),
            TileType::Apr => path.is_file() && has_extension(&path, "apr"),
        };
        if !candidate {
            continue;
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let caps = pattern.captures(name).ok_or_else(|| {
            StitchError::Discovery(format!("couldn't get the row/column from {:?}", path))
        })?;
        let row = parse_index(&caps[1], &path)?;
        let col = parse_index(&caps[2], &path)?;
        tiles.push(Tile::new(path, row, col, tile_type));
    }

    if tiles.is_empty() {
        return Err(StitchError::Discovery(format!(
            "no {} tiles were found in {:?}",
            tile_type, root
        )));
    }
    Ok(tiles)
}

/// Discover tiles and arrange them on the grid.
///
/// `tile_type` of `None` triggers automatic detection.
pub fn parse_grid(root: &Path, tile_type: Option<TileType>) -> Result<GridModel> {
    let tile_type = match tile_type {
        Some(t) => t,
        None => detect_type(root)?,
    };
    let tiles = discover_tiles(root, tile_type)?;
    tracing::info!(path = ?root, tile_type = %tile_type, tiles = tiles.len(), "Discovered tiles");
    GridModel::new(tiles)
}

fn list_entries(root: &Path) -> Result<Vec<PathBuf>> {
    let read = std::fs::read_dir(root)
        .map_err(|e| StitchError::Discovery(format!("cannot read {:?}: {}", root, e)))?;
    let mut entries: Vec<PathBuf> = read.filter_map(|e| e.ok().map(|e| e.path())).collect();
    entries.sort();
    Ok(entries)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn parse_index(digits: &str, path: &Path) -> Result<usize> {
    digits
        .parse()
        .map_err(|_| StitchError::Discovery(format!("row/column out of range in {:?}", path)))
}
