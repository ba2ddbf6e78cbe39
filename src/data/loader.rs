use crate::error::{Result, StitchError};
use crate::grid::{GridCell, GridModel, Tile, TileType};
use ndarray::{Array3, Axis};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};

/// Intensity volume indexed `[z, y, x]`
pub type Volume = Array3<f32>;

/// Source of tile volumes.
///
/// Implementations must be shareable across the registration worker pool.
pub trait TileLoader: Send + Sync {
    fn load(&self, tile: &Tile) -> Result<Volume>;
}

/// Loads TIFF-backed tiles (single multi-page file or a folder of slices)
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffLoader;

impl TileLoader for TiffLoader {
    fn load(&self, tile: &Tile) -> Result<Volume> {
        match tile.tile_type {
            TileType::Tiff3D => read_tiff_stack(&tile.path),
            TileType::Tiff2D => read_tiff_sequence(&tile.path),
            TileType::Apr => Err(StitchError::tile_load(
                &tile.path,
                "APR tiles need an external loader",
            )),
        }
    }
}

/// Serves volumes that are already in memory, keyed by grid cell
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    volumes: HashMap<GridCell, Volume>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cell: GridCell, volume: Volume) {
        self.volumes.insert(cell, volume);
    }

    pub fn with_volume(mut self, cell: GridCell, volume: Volume) -> Self {
        self.insert(cell, volume);
        self
    }
}

impl TileLoader for MemoryLoader {
    fn load(&self, tile: &Tile) -> Result<Volume> {
        self.volumes
            .get(&tile.cell())
            .cloned()
            .ok_or_else(|| StitchError::tile_load(&tile.path, "no volume registered for this cell"))
    }
}

/// Read every page of a multi-page TIFF into a volume
pub fn read_tiff_stack(path: &Path) -> Result<Volume> {
    let file = File::open(path).map_err(|e| StitchError::tile_load(path, e))?;
    let mut decoder =
        Decoder::new(BufReader::new(file)).map_err(|e| StitchError::tile_load(path, e))?;

    let mut slices = Vec::new();
    loop {
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| StitchError::tile_load(path, e))?;
        let data = decoder
            .read_image()
            .map_err(|e| StitchError::tile_load(path, e))?;
        let pixels = decoding_result_to_f32(data).ok_or_else(|| {
            StitchError::tile_load(path, "unsupported TIFF sample format")
        })?;
        if pixels.len() != (width as usize) * (height as usize) {
            return Err(StitchError::tile_load(
                path,
                format!("page is not single-channel {}x{}", width, height),
            ));
        }
        slices.push((height as usize, width as usize, pixels));

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| StitchError::tile_load(path, e))?;
    }

    stack_slices(path, slices)
}

/// Read a folder of single-page TIFF slices, sorted by file name
pub fn read_tiff_sequence(dir: &Path) -> Result<Volume> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| StitchError::tile_load(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| has_tiff_extension(p))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(StitchError::tile_load(dir, "no .tif slices found"));
    }

    let mut slices = Vec::with_capacity(files.len());
    for file in &files {
        let img = image::open(file)
            .map_err(|e| StitchError::tile_load(file, e))?
            .to_luma16();
        let (width, height) = img.dimensions();
        let pixels = img.into_raw().into_iter().map(f32::from).collect();
        slices.push((height as usize, width as usize, pixels));
    }

    stack_slices(dir, slices)
}

pub(crate) fn has_tiff_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

fn stack_slices(path: &Path, slices: Vec<(usize, usize, Vec<f32>)>) -> Result<Volume> {
    let (ny, nx) = match slices.first() {
        Some((h, w, _)) => (*h, *w),
        None => return Err(StitchError::tile_load(path, "empty image stack")),
    };
    let nz = slices.len();

    let mut volume = Volume::zeros((nz, ny, nx));
    for (z, (h, w, pixels)) in slices.into_iter().enumerate() {
        if (h, w) != (ny, nx) {
            return Err(StitchError::tile_load(
                path,
                format!("slice {} is {}x{}, expected {}x{}", z, w, h, nx, ny),
            ));
        }
        let plane = ndarray::Array2::from_shape_vec((ny, nx), pixels)
            .map_err(|e| StitchError::tile_load(path, e))?;
        volume.index_axis_mut(Axis(0), z).assign(&plane);
    }
    Ok(volume)
}

fn decoding_result_to_f32(data: DecodingResult) -> Option<Vec<f32>> {
    let pixels = match data {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|p| p as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|p| p as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|p| p as f32).collect(),
        _ => return None,
    };
    Some(pixels)
}

/// Try to load every tile of the grid; returns the tiles that failed.
pub fn verify_tiles<L: TileLoader + ?Sized>(
    grid: &GridModel,
    loader: &L,
) -> Vec<(Tile, StitchError)> {
    let mut failures = Vec::new();
    for tile in grid.tiles() {
        if let Err(e) = loader.load(tile) {
            tracing::warn!(row = tile.row, col = tile.col, error = %e, "Problem detected with tile");
            failures.push((tile.clone(), e));
        }
    }
    if failures.is_empty() {
        tracing::info!(tiles = grid.n_tiles(), "All tiles are readable");
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tiff::encoder::{colortype, TiffEncoder};

    fn write_stack(path: &Path, nz: u32, ny: u32, nx: u32) {
        let mut buffer = Cursor::new(Vec::new());
        let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
        for z in 0..nz {
            let data: Vec<u16> = (0..ny * nx).map(|i| (i + z * 100) as u16).collect();
            encoder
                .write_image::<colortype::Gray16>(nx, ny, &data)
                .unwrap();
        }
        std::fs::write(path, buffer.into_inner()).unwrap();
    }

    #[test]
    fn test_read_multipage_stack() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0_0.tif");
        write_stack(&path, 3, 4, 5);

        let volume = read_tiff_stack(&path).unwrap();
        assert_eq!(volume.dim(), (3, 4, 5));
        assert_eq!(volume[[0, 0, 1]], 1.0);
        assert_eq!(volume[[2, 1, 0]], 205.0);
    }

    #[test]
    fn test_apr_requires_external_loader() {
        let tile = Tile::new("0_0.apr", 0, 0, TileType::Apr);
        assert!(matches!(
            TiffLoader.load(&tile),
            Err(StitchError::TileLoad { .. })
        ));
    }

    #[test]
    fn test_memory_loader_missing_cell() {
        let loader = MemoryLoader::new().with_volume(GridCell::new(0, 0), Volume::zeros((1, 2, 2)));
        assert!(loader.load(&Tile::new("a", 0, 0, TileType::Tiff3D)).is_ok());
        assert!(loader.load(&Tile::new("b", 0, 1, TileType::Tiff3D)).is_err());
    }

    #[test]
    fn test_verify_reports_unreadable_tiles() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("0_0.tif");
        write_stack(&good, 2, 4, 4);
        let bad = dir.path().join("0_1.tif");
        std::fs::write(&bad, b"not a tiff").unwrap();

        let grid = GridModel::new(vec![
            Tile::new(good, 0, 0, TileType::Tiff3D),
            Tile::new(bad, 0, 1, TileType::Tiff3D),
        ])
        .unwrap();

        let failures = verify_tiles(&grid, &TiffLoader);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.cell(), GridCell::new(0, 1));
    }
}
