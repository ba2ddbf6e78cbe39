use crate::data::Volume;
use crate::grid::Direction;
use ndarray::{s, Array2, Axis};

/// Which end of a tile faces the overlap band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapSide {
    /// Last `overlap` pixels (the first tile of a pair)
    Trailing,
    /// First `overlap` pixels (the second tile of a pair)
    Leading,
}

/// Maximum-intensity projections of a volume along each axis
#[derive(Debug, Clone, PartialEq)]
pub struct Projections {
    /// Collapsed along X: Z rows, Y columns
    pub zy: Array2<f32>,
    /// Collapsed along Y: Z rows, X columns
    pub zx: Array2<f32>,
    /// Collapsed along Z: Y rows, X columns
    pub yx: Array2<f32>,
}

impl Projections {
    pub fn from_volume(volume: &Volume) -> Self {
        Self {
            zy: max_projection(volume, Axis(2)),
            zx: max_projection(volume, Axis(1)),
            yx: max_projection(volume, Axis(0)),
        }
    }

    /// Crop the projections to the band expected to overlap with the
    /// neighbor in `direction`.
    ///
    /// EAST pairs crop the X-involving planes along X; SOUTH pairs crop the
    /// Y-involving planes along Y. The remaining plane is kept whole.
    pub fn crop_overlap(&self, direction: Direction, overlap: usize, side: OverlapSide) -> Self {
        match direction {
            Direction::East | Direction::West => Self {
                zy: self.zy.clone(),
                zx: crop_cols(&self.zx, overlap, side),
                yx: crop_cols(&self.yx, overlap, side),
            },
            Direction::South | Direction::North => Self {
                zy: crop_cols(&self.zy, overlap, side),
                zx: self.zx.clone(),
                yx: crop_rows(&self.yx, overlap, side),
            },
        }
    }
}

fn max_projection(volume: &Volume, axis: Axis) -> Array2<f32> {
    volume.fold_axis(axis, f32::NEG_INFINITY, |&acc, &v| acc.max(v))
}

fn crop_cols(plane: &Array2<f32>, overlap: usize, side: OverlapSide) -> Array2<f32> {
    let n = plane.ncols();
    let width = overlap.min(n);
    match side {
        OverlapSide::Trailing => plane.slice(s![.., n - width..]).to_owned(),
        OverlapSide::Leading => plane.slice(s![.., ..width]).to_owned(),
    }
}

fn crop_rows(plane: &Array2<f32>, overlap: usize, side: OverlapSide) -> Array2<f32> {
    let n = plane.nrows();
    let height = overlap.min(n);
    match side {
        OverlapSide::Trailing => plane.slice(s![n - height.., ..]).to_owned(),
        OverlapSide::Leading => plane.slice(s![..height, ..]).to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_volume() -> Volume {
        // value = 100 z + 10 y + x, so every max sits at the far corner
        Volume::from_shape_fn((2, 3, 4), |(z, y, x)| (100 * z + 10 * y + x) as f32)
    }

    #[test]
    fn test_projection_shapes_and_values() {
        let p = Projections::from_volume(&ramp_volume());
        assert_eq!(p.zy.dim(), (2, 3));
        assert_eq!(p.zx.dim(), (2, 4));
        assert_eq!(p.yx.dim(), (3, 4));
        assert_eq!(p.zy[[1, 2]], 123.0);
        assert_eq!(p.zx[[0, 1]], 21.0);
        assert_eq!(p.yx[[2, 3]], 123.0);
    }

    #[test]
    fn test_east_crop_uses_columns() {
        let p = Projections::from_volume(&ramp_volume());
        let trailing = p.crop_overlap(Direction::East, 2, OverlapSide::Trailing);
        assert_eq!(trailing.zx.dim(), (2, 2));
        assert_eq!(trailing.yx[[0, 0]], 102.0);
        assert_eq!(trailing.zy, p.zy);

        let leading = p.crop_overlap(Direction::East, 2, OverlapSide::Leading);
        assert_eq!(leading.yx[[0, 1]], 101.0);
    }

    #[test]
    fn test_south_crop_uses_rows() {
        let p = Projections::from_volume(&ramp_volume());
        let trailing = p.crop_overlap(Direction::South, 1, OverlapSide::Trailing);
        assert_eq!(trailing.yx.dim(), (1, 4));
        assert_eq!(trailing.yx[[0, 0]], 120.0);
        assert_eq!(trailing.zy.dim(), (2, 1));
        assert_eq!(trailing.zx, p.zx);
    }
}
