use super::{Axis, PerAxis};
use crate::error::{Result, StitchError};
use crate::grid::{GridCell, GridModel};
use crate::registration::PairwiseMeasurement;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashMap;
use tracing::{info, warn};

/// One coordinate entry of an axis graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphEntry {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
}

/// Sparse `n_vertex x n_vertex` reliability graph for one axis
#[derive(Debug, Clone)]
pub struct AxisGraph {
    axis: Axis,
    entries: Vec<GraphEntry>,
    graph: UnGraph<(), f64>,
}

impl AxisGraph {
    fn build(axis: Axis, n_vertex: usize, entries: Vec<GraphEntry>) -> Self {
        let mut graph = UnGraph::with_capacity(n_vertex, entries.len());
        for _ in 0..n_vertex {
            graph.add_node(());
        }
        for entry in &entries {
            graph.add_edge(
                NodeIndex::new(entry.from),
                NodeIndex::new(entry.to),
                entry.weight,
            );
        }
        Self {
            axis,
            entries,
            graph,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn n_vertex(&self) -> usize {
        self.graph.node_count()
    }

    pub fn n_edges(&self) -> usize {
        self.entries.len()
    }

    /// Entries in measurement order
    pub fn entries(&self) -> &[GraphEntry] {
        &self.entries
    }

    pub fn graph(&self) -> &UnGraph<(), f64> {
        &self.graph
    }
}

/// Collects pairwise measurements until every edge has been registered
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    nrow: usize,
    ncol: usize,
    occupied: Vec<bool>,
    measurements: Vec<PairwiseMeasurement>,
    index: HashMap<(usize, usize), usize>,
}

impl GraphBuilder {
    pub fn new(grid: &GridModel) -> Self {
        let occupied = (0..grid.n_vertex())
            .map(|i| grid.is_occupied(grid.unravel(i)))
            .collect();
        Self {
            nrow: grid.nrow(),
            ncol: grid.ncol(),
            occupied,
            measurements: Vec::with_capacity(grid.n_edges()),
            index: HashMap::with_capacity(grid.n_edges()),
        }
    }

    pub fn record(&mut self, measurement: PairwiseMeasurement) -> Result<()> {
        let edge = measurement.edge;
        for cell in [edge.from, edge.to] {
            if cell.row >= self.nrow || cell.col >= self.ncol {
                return Err(StitchError::InvalidState(format!(
                    "measurement endpoint {} is outside the {}x{} grid",
                    cell, self.nrow, self.ncol
                )));
            }
            if !self.occupied[self.ravel(cell)] {
                return Err(StitchError::InvalidState(format!(
                    "measurement endpoint {} holds no tile",
                    cell
                )));
            }
        }
        let pair = unordered(self.ravel(edge.from), self.ravel(edge.to));
        if self.index.contains_key(&pair) {
            return Err(StitchError::InvalidState(format!(
                "pair {} - {} was already measured",
                edge.from, edge.to
            )));
        }
        self.index.insert(pair, self.measurements.len());
        self.measurements.push(measurement);
        Ok(())
    }

    fn ravel(&self, cell: GridCell) -> usize {
        cell.row * self.ncol + cell.col
    }

    pub fn measurements(&self) -> &[PairwiseMeasurement] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Build the three axis graphs.
    ///
    /// Must run after every edge has been measured; a partial measurement
    /// set silently yields a partial graph.
    pub fn build(&self) -> RegistrationGraph {
        let n_vertex = self.nrow * self.ncol;
        let ravel = |cell: GridCell| self.ravel(cell);

        let graphs = PerAxis::from_fn(|axis| {
            let entries = self
                .measurements
                .iter()
                .map(|m| GraphEntry {
                    from: ravel(m.edge.from),
                    to: ravel(m.edge.to),
                    weight: sanitize_weight(axis, m.reliability.get(axis)),
                })
                .collect();
            AxisGraph::build(axis, n_vertex, entries)
        });

        info!(
            vertices = n_vertex,
            edges = self.measurements.len(),
            "Built sparse axis graphs"
        );

        RegistrationGraph {
            nrow: self.nrow,
            ncol: self.ncol,
            occupied: self.occupied.clone(),
            measurements: self.measurements.clone(),
            graphs,
            index: self.index.clone(),
        }
    }
}

fn sanitize_weight(axis: Axis, weight: f64) -> f64 {
    if weight.is_nan() {
        warn!(axis = %axis, "NaN reliability treated as the worst possible value");
        f64::INFINITY
    } else {
        weight
    }
}

pub(crate) fn unordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Axis graphs plus the measurements they were built from
#[derive(Debug, Clone)]
pub struct RegistrationGraph {
    nrow: usize,
    ncol: usize,
    occupied: Vec<bool>,
    measurements: Vec<PairwiseMeasurement>,
    graphs: PerAxis<AxisGraph>,
    index: HashMap<(usize, usize), usize>,
}

impl RegistrationGraph {
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    pub fn n_vertex(&self) -> usize {
        self.nrow * self.ncol
    }

    pub fn n_occupied(&self) -> usize {
        self.occupied.iter().filter(|&&o| o).count()
    }

    pub fn is_occupied(&self, vertex: usize) -> bool {
        self.occupied.get(vertex).copied().unwrap_or(false)
    }

    /// Traversal root: the first occupied cell in row-major order
    pub fn root(&self) -> Option<usize> {
        self.occupied.iter().position(|&o| o)
    }

    pub fn ravel(&self, cell: GridCell) -> usize {
        cell.row * self.ncol + cell.col
    }

    pub fn unravel(&self, vertex: usize) -> GridCell {
        GridCell::new(vertex / self.ncol, vertex % self.ncol)
    }

    pub fn axis(&self, axis: Axis) -> &AxisGraph {
        &self.graphs[axis]
    }

    pub fn graphs(&self) -> &PerAxis<AxisGraph> {
        &self.graphs
    }

    pub fn measurements(&self) -> &[PairwiseMeasurement] {
        &self.measurements
    }

    /// Find the measurement between two vertices, in either orientation
    pub fn lookup(&self, a: usize, b: usize) -> Result<&PairwiseMeasurement> {
        self.index
            .get(&unordered(a, b))
            .map(|&i| &self.measurements[i])
            .ok_or(StitchError::Lookup { from: a, to: b })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{NeighborEdge, Tile, TileType};
    use crate::registration::AxisValues;

    fn grid_1x3() -> GridModel {
        GridModel::new(
            (0..3)
                .map(|c| Tile::new(format!("0_{}", c), 0, c, TileType::Tiff3D))
                .collect(),
        )
        .unwrap()
    }

    fn measurement(from: (usize, usize), to: (usize, usize), relia: f64) -> PairwiseMeasurement {
        PairwiseMeasurement {
            edge: NeighborEdge::new(GridCell::new(from.0, from.1), GridCell::new(to.0, to.1))
                .unwrap(),
            shift: AxisValues::new(1.0, 2.0, 3.0),
            reliability: AxisValues::new(relia, relia * 2.0, relia * 3.0),
        }
    }

    #[test]
    fn test_builds_one_graph_per_axis() {
        let mut builder = GraphBuilder::new(&grid_1x3());
        builder.record(measurement((0, 0), (0, 1), 0.1)).unwrap();
        builder.record(measurement((0, 1), (0, 2), 0.2)).unwrap();

        let graph = builder.build();
        assert_eq!(graph.n_vertex(), 3);
        assert_eq!(graph.axis(Axis::H).n_edges(), 2);
        assert_eq!(
            graph.axis(Axis::V).entries()[1],
            GraphEntry {
                from: 1,
                to: 2,
                weight: 0.4
            }
        );
        assert!((graph.axis(Axis::D).entries()[0].weight - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_lookup_in_both_orientations() {
        let mut builder = GraphBuilder::new(&grid_1x3());
        builder.record(measurement((0, 1), (0, 2), 0.2)).unwrap();
        let graph = builder.build();

        assert_eq!(graph.lookup(1, 2).unwrap().edge.to, GridCell::new(0, 2));
        assert_eq!(graph.lookup(2, 1).unwrap().edge.from, GridCell::new(0, 1));
        assert!(matches!(
            graph.lookup(0, 1),
            Err(StitchError::Lookup { from: 0, to: 1 })
        ));
    }

    #[test]
    fn test_duplicate_pair_is_rejected() {
        let mut builder = GraphBuilder::new(&grid_1x3());
        builder.record(measurement((0, 0), (0, 1), 0.1)).unwrap();
        assert!(builder.record(measurement((0, 0), (0, 1), 0.3)).is_err());
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_reversed_duplicate_is_rejected() {
        let mut builder = GraphBuilder::new(&grid_1x3());
        builder.record(measurement((0, 1), (0, 2), 0.1)).unwrap();
        assert!(matches!(
            builder.record(measurement((0, 2), (0, 1), 0.3)),
            Err(StitchError::InvalidState(_))
        ));
        assert_eq!(builder.build().lookup(2, 1).unwrap().reliability.h, 0.1);
    }

    #[test]
    fn test_edge_onto_empty_cell_is_rejected() {
        let grid = GridModel::new(vec![
            Tile::new("0_0", 0, 0, TileType::Tiff3D),
            Tile::new("0_1", 0, 1, TileType::Tiff3D),
            Tile::new("1_1", 1, 1, TileType::Tiff3D),
        ])
        .unwrap();
        let mut builder = GraphBuilder::new(&grid);

        assert!(matches!(
            builder.record(measurement((0, 0), (1, 0), 0.1)),
            Err(StitchError::InvalidState(_))
        ));
        assert!(builder.is_empty());
        builder.record(measurement((0, 1), (1, 1), 0.1)).unwrap();
        assert_eq!(builder.build().axis(Axis::H).n_edges(), 1);
    }
}
