//! Registration database: one row of offsets per tile, persisted as CSV.

use crate::error::{Result, StitchError};
use crate::graph::RegistrationMap;
use crate::grid::{GridCell, GridModel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub path: PathBuf,
    pub row: usize,
    pub col: usize,
    #[serde(rename = "dH")]
    pub dh: f64,
    #[serde(rename = "dV")]
    pub dv: f64,
    #[serde(rename = "dD")]
    pub dd: f64,
    #[serde(rename = "ABS_H")]
    pub abs_h: f64,
    #[serde(rename = "ABS_V")]
    pub abs_v: f64,
    #[serde(rename = "ABS_D")]
    pub abs_d: f64,
}

impl DatabaseRecord {
    pub fn cell(&self) -> GridCell {
        GridCell::new(self.row, self.col)
    }

    /// Absolute position in `[z, y, x]` order
    pub fn position(&self) -> [f64; 3] {
        [self.abs_d, self.abs_v, self.abs_h]
    }
}

/// Per-tile offsets keyed by `(row, col)`
#[derive(Debug, Clone, Default)]
pub struct RegistrationDatabase {
    records: Vec<DatabaseRecord>,
    index: HashMap<GridCell, usize>,
}

impl RegistrationDatabase {
    /// One record per occupied cell, in row-major order
    pub fn build(grid: &GridModel, map: &RegistrationMap) -> Result<Self> {
        if map.nrow() != grid.nrow() || map.ncol() != grid.ncol() {
            return Err(StitchError::InvalidState(format!(
                "registration map is {}x{} but the grid is {}x{}",
                map.nrow(),
                map.ncol(),
                grid.nrow(),
                grid.ncol()
            )));
        }

        let mut records = Vec::with_capacity(grid.n_tiles());
        for tile in grid.tiles() {
            let cell = tile.cell();
            let (rel, abs) = map
                .relative_offset(cell)
                .zip(map.absolute_offset(cell))
                .ok_or_else(|| {
                    StitchError::InvalidState(format!("tile {} has no registered offset", cell))
                })?;
            records.push(DatabaseRecord {
                path: tile.path.clone(),
                row: tile.row,
                col: tile.col,
                dh: rel.h,
                dv: rel.v,
                dd: rel.d,
                abs_h: abs.h,
                abs_v: abs.v,
                abs_d: abs.d,
            });
        }
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<DatabaseRecord>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.cell(), i))
            .collect();
        Self { records, index }
    }

    pub fn records(&self) -> &[DatabaseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn lookup(&self, row: usize, col: usize) -> Option<&DatabaseRecord> {
        self.index
            .get(&GridCell::new(row, col))
            .map(|&i| &self.records[i])
    }

    /// Absolute `[z, y, x]` position of the tile at `(row, col)`
    pub fn position(&self, row: usize, col: usize) -> Option<[f64; 3]> {
        self.lookup(row, col).map(DatabaseRecord::position)
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        info!(path = %path.display(), tiles = self.records.len(), "Saved registration database");
        Ok(())
    }

    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<DatabaseRecord>, _>>()?;
        Ok(Self::from_records(records))
    }
}
