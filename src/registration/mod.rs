//! Pairwise registration of adjacent tiles
//!
//! Each edge of the grid is registered independently from the maximum
//! intensity projections of its two tiles, cropped to the overlap band.

use crate::algorithms::{OverlapSide, PhaseCorrelation, Projections, ShiftEstimate};
use crate::config::RegistrationConfig;
use crate::data::{TileLoader, Volume};
use crate::error::{Result, StitchError};
use crate::graph::Axis;
use crate::grid::{Direction, GridModel, NeighborEdge, Tile};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// One scalar per spatial axis
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisValues {
    pub h: f64,
    pub v: f64,
    pub d: f64,
}

impl AxisValues {
    pub fn new(h: f64, v: f64, d: f64) -> Self {
        Self { h, v, d }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::H => self.h,
            Axis::V => self.v,
            Axis::D => self.d,
        }
    }
}

/// Shift and reliability measured across one neighbor edge.
///
/// `shift` is the displacement of `edge.to` relative to its nominal place
/// next to `edge.from`. `reliability` is a registration error: lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairwiseMeasurement {
    pub edge: NeighborEdge,
    pub shift: AxisValues,
    pub reliability: AxisValues,
}

/// Shift estimates for the three projection planes of a pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneEstimates {
    pub zy: ShiftEstimate,
    pub zx: ShiftEstimate,
    pub yx: ShiftEstimate,
}

impl PlaneEstimates {
    /// Each axis appears in two planes; keep the one with the lower error.
    pub fn select_axes(&self) -> (AxisValues, AxisValues) {
        let (zy, zx, yx) = (&self.zy, &self.zx, &self.yx);

        let (dd, rd) = if zx.error < zy.error {
            (zx.shift[0], zx.error)
        } else {
            (zy.shift[0], zy.error)
        };
        let (dh, rh) = if zx.error < yx.error {
            (zx.shift[1], zx.error)
        } else {
            (yx.shift[1], yx.error)
        };
        let (dv, rv) = if yx.error < zy.error {
            (yx.shift[0], yx.error)
        } else {
            (zy.shift[1], zy.error)
        };

        (AxisValues::new(dh, dv, dd), AxisValues::new(rh, rv, rd))
    }
}

/// Estimates the translation between two adjacent tiles
#[derive(Debug, Clone, Copy)]
pub struct PairwiseRegistrar {
    overlap: usize,
    frame_size: usize,
    correlator: PhaseCorrelation,
}

impl PairwiseRegistrar {
    pub fn new(overlap: usize, frame_size: usize, upsample_factor: usize) -> Self {
        Self {
            overlap,
            frame_size,
            correlator: PhaseCorrelation::new(upsample_factor),
        }
    }

    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self::new(config.overlap, config.frame_size, config.upsample_factor)
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Load both tiles of `edge`, reduce them to projections and register.
    ///
    /// Each volume is dropped as soon as its projections exist.
    pub fn register_edge<L: TileLoader + ?Sized>(
        &self,
        grid: &GridModel,
        edge: &NeighborEdge,
        loader: &L,
    ) -> Result<PairwiseMeasurement> {
        let first = self.load_projections(grid, edge, true, loader)?;
        let second = self.load_projections(grid, edge, false, loader)?;
        self.register_projections(edge, &first, &second)
    }

    fn load_projections<L: TileLoader + ?Sized>(
        &self,
        grid: &GridModel,
        edge: &NeighborEdge,
        source: bool,
        loader: &L,
    ) -> Result<Projections> {
        let cell = if source { edge.from } else { edge.to };
        let tile: &Tile = grid.tile_at(cell).ok_or_else(|| {
            StitchError::InvalidState(format!("edge endpoint {} holds no tile", cell))
        })?;
        let volume = loader.load(tile)?;
        self.check_frame(tile, &volume);
        Ok(Projections::from_volume(&volume))
    }

    fn check_frame(&self, tile: &Tile, volume: &Volume) {
        let (_, ny, nx) = volume.dim();
        if ny != self.frame_size || nx != self.frame_size {
            debug!(
                row = tile.row,
                col = tile.col,
                ny,
                nx,
                frame_size = self.frame_size,
                "Tile extent differs from the nominal frame size"
            );
        }
    }

    pub fn register_volumes(
        &self,
        edge: &NeighborEdge,
        first: &Volume,
        second: &Volume,
    ) -> Result<PairwiseMeasurement> {
        self.register_projections(
            edge,
            &Projections::from_volume(first),
            &Projections::from_volume(second),
        )
    }

    pub fn register_projections(
        &self,
        edge: &NeighborEdge,
        first: &Projections,
        second: &Projections,
    ) -> Result<PairwiseMeasurement> {
        let direction = checked_direction(edge)?;
        let planes = self.estimate_planes(direction, first, second)?;
        let (shift, reliability) = planes.select_axes();

        trace!(
            from = %edge.from,
            to = %edge.to,
            dh = shift.h,
            dv = shift.v,
            dd = shift.d,
            "Pairwise registration"
        );

        Ok(PairwiseMeasurement {
            edge: *edge,
            shift,
            reliability,
        })
    }

    /// Crop to the overlap band and correlate each projection plane
    pub fn estimate_planes(
        &self,
        direction: Direction,
        first: &Projections,
        second: &Projections,
    ) -> Result<PlaneEstimates> {
        let extent = match direction {
            Direction::East | Direction::West => first.yx.ncols().min(second.yx.ncols()),
            Direction::South | Direction::North => first.yx.nrows().min(second.yx.nrows()),
        };
        if self.overlap == 0 || self.overlap > extent {
            return Err(StitchError::Registration(format!(
                "overlap of {} pixels does not fit a tile extent of {}",
                self.overlap, extent
            )));
        }

        let band1 = first.crop_overlap(direction, self.overlap, OverlapSide::Trailing);
        let band2 = second.crop_overlap(direction, self.overlap, OverlapSide::Leading);

        Ok(PlaneEstimates {
            zy: self.correlator.register(&band1.zy, &band2.zy)?,
            zx: self.correlator.register(&band1.zx, &band2.zx)?,
            yx: self.correlator.register(&band1.yx, &band2.yx)?,
        })
    }
}

/// The recorded direction must agree with the coordinates and be EAST or SOUTH
fn checked_direction(edge: &NeighborEdge) -> Result<Direction> {
    match Direction::between(edge.from, edge.to) {
        Some(d) if d == edge.direction && d.is_forward() => Ok(d),
        _ => Err(StitchError::DirectionInference {
            from_row: edge.from.row,
            from_col: edge.from.col,
            to_row: edge.to.row,
            to_col: edge.to.col,
        }),
    }
}
