use super::{Axis, PerAxis, RegistrationGraph, SpanningTree};
use crate::error::{Result, StitchError};
use crate::grid::GridCell;
use crate::registration::AxisValues;
use ndarray::{Array2, Array3};
use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;
use tracing::{debug, info};

/// Relative and absolute offsets of every tile, indexed `[axis, row, col]`
/// with axes ordered (H, V, D).
///
/// Cells that hold no tile are unreachable: their entries are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationMap {
    relative: Array3<f64>,
    absolute: Array3<f64>,
    reachable: Array2<bool>,
}

impl RegistrationMap {
    pub fn nrow(&self) -> usize {
        self.reachable.nrows()
    }

    pub fn ncol(&self) -> usize {
        self.reachable.ncols()
    }

    pub fn relative(&self) -> &Array3<f64> {
        &self.relative
    }

    pub fn absolute(&self) -> &Array3<f64> {
        &self.absolute
    }

    pub fn is_reachable(&self, cell: GridCell) -> bool {
        self.reachable
            .get([cell.row, cell.col])
            .copied()
            .unwrap_or(false)
    }

    /// Offset of `cell` relative to its nominal grid placement
    pub fn relative_offset(&self, cell: GridCell) -> Option<AxisValues> {
        self.is_reachable(cell)
            .then(|| axis_values(&self.relative, cell))
    }

    /// Absolute position of `cell` in pixels
    pub fn absolute_offset(&self, cell: GridCell) -> Option<AxisValues> {
        self.is_reachable(cell)
            .then(|| axis_values(&self.absolute, cell))
    }
}

fn axis_values(map: &Array3<f64>, cell: GridCell) -> AxisValues {
    AxisValues::new(
        map[[Axis::H.index(), cell.row, cell.col]],
        map[[Axis::V.index(), cell.row, cell.col]],
        map[[Axis::D.index(), cell.row, cell.col]],
    )
}

/// Accumulates tree-edge shifts into per-tile coordinates
#[derive(Debug, Clone, Copy)]
pub struct CoordinatePropagator {
    frame_size: usize,
    overlap: usize,
}

impl CoordinatePropagator {
    pub fn new(frame_size: usize, overlap: usize) -> Self {
        Self {
            frame_size,
            overlap,
        }
    }

    /// Nominal distance between adjacent tiles
    pub fn spacing(&self) -> f64 {
        self.frame_size as f64 - self.overlap as f64
    }

    /// Walk each axis tree depth-first from the root and build the map
    pub fn produce(
        &self,
        graph: &RegistrationGraph,
        trees: &PerAxis<SpanningTree>,
    ) -> Result<RegistrationMap> {
        let (nrow, ncol) = (graph.nrow(), graph.ncol());
        let root = graph
            .root()
            .ok_or_else(|| StitchError::InvalidState("grid holds no tile".to_string()))?;

        let mut relative = Array3::from_elem((3, nrow, ncol), f64::NAN);
        let mut reachable = Array2::from_elem((nrow, ncol), true);

        for (axis, tree) in trees.iter() {
            let offsets = self.propagate_axis(graph, tree, root)?;
            for (vertex, offset) in offsets.into_iter().enumerate() {
                let cell = graph.unravel(vertex);
                match offset {
                    Some(value) => relative[[axis.index(), cell.row, cell.col]] = value,
                    None => reachable[[cell.row, cell.col]] = false,
                }
            }
        }

        let spacing = self.spacing();
        let mut absolute = relative.clone();
        for ((a, row, col), value) in absolute.indexed_iter_mut() {
            if a == Axis::H.index() {
                *value += col as f64 * spacing;
            } else if a == Axis::V.index() {
                *value += row as f64 * spacing;
            }
        }

        info!(
            tiles = reachable.iter().filter(|&&r| r).count(),
            spacing,
            "Produced registration map"
        );

        Ok(RegistrationMap {
            relative,
            absolute,
            reachable,
        })
    }

    /// Relative offsets of one axis; `None` for vertices the tree does not reach.
    ///
    /// Fails if an occupied cell is not reached or a tree edge has no
    /// measurement behind it.
    pub fn propagate_axis(
        &self,
        graph: &RegistrationGraph,
        tree: &SpanningTree,
        root: usize,
    ) -> Result<Vec<Option<f64>>> {
        let axis = tree.axis();
        let tree_graph = tree.graph();
        let mut offsets: Vec<Option<f64>> = vec![None; graph.n_vertex()];
        offsets[root] = Some(0.0);

        let mut dfs = Dfs::new(tree_graph, NodeIndex::new(root));
        while let Some(node) = dfs.next(tree_graph) {
            let to = node.index();
            if to == root {
                continue;
            }

            let from = tree_graph
                .neighbors(node)
                .map(|n| n.index())
                .find(|&n| offsets[n].is_some())
                .ok_or(StitchError::Lookup { from: root, to })?;
            let base = offsets[from].unwrap_or_default();

            let measurement = graph.lookup(from, to)?;
            let shift = measurement.shift.get(axis);
            let value = if graph.ravel(measurement.edge.to) == to {
                base + shift
            } else {
                base - shift
            };
            offsets[to] = Some(value);
        }

        let visited = offsets.iter().filter(|o| o.is_some()).count();
        let missing = (0..graph.n_vertex())
            .filter(|&v| graph.is_occupied(v) && offsets[v].is_none())
            .count();
        if missing > 0 {
            return Err(StitchError::DisconnectedGraph {
                axis,
                edges: tree.n_edges(),
                required: graph.n_occupied().saturating_sub(1),
            });
        }

        debug!(axis = %axis, visited, "Propagated offsets along spanning tree");
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, SpanningTreeOptimizer};
    use crate::grid::{GridModel, NeighborEdge, Tile, TileType};
    use crate::registration::PairwiseMeasurement;

    fn grid(cells: &[(usize, usize)]) -> GridModel {
        GridModel::new(
            cells
                .iter()
                .map(|&(r, c)| Tile::new(format!("{}_{}", r, c), r, c, TileType::Tiff3D))
                .collect(),
        )
        .unwrap()
    }

    fn measurement(
        from: (usize, usize),
        to: (usize, usize),
        shift: AxisValues,
        relia: f64,
    ) -> PairwiseMeasurement {
        PairwiseMeasurement {
            edge: NeighborEdge::new(GridCell::new(from.0, from.1), GridCell::new(to.0, to.1))
                .unwrap(),
            shift,
            reliability: AxisValues::new(relia, relia, relia),
        }
    }

    fn run(grid: &GridModel, measurements: Vec<PairwiseMeasurement>) -> Result<RegistrationMap> {
        let mut builder = GraphBuilder::new(grid);
        for m in measurements {
            builder.record(m)?;
        }
        let graph = builder.build();
        let trees = SpanningTreeOptimizer::new().optimize(&graph)?;
        CoordinatePropagator::new(100, 20).produce(&graph, &trees)
    }

    #[test]
    fn test_reverse_traversal_subtracts_shift() {
        // Root (0,0) reaches (0,1) only through (1,1), so the (0,1)->(1,1)
        // measurement is walked against its recorded orientation.
        let g = grid(&[(0, 0), (0, 1), (1, 0), (1, 1)]);
        let map = run(
            &g,
            vec![
                measurement((0, 0), (0, 1), AxisValues::new(9.0, 9.0, 9.0), 0.9),
                measurement((0, 0), (1, 0), AxisValues::new(1.0, 2.0, 0.5), 0.1),
                measurement((0, 1), (1, 1), AxisValues::new(-1.0, 1.0, 1.0), 0.1),
                measurement((1, 0), (1, 1), AxisValues::new(3.0, 0.0, 0.0), 0.1),
            ],
        )
        .unwrap();

        let rel = map.relative_offset(GridCell::new(0, 1)).unwrap();
        assert_eq!(rel, AxisValues::new(5.0, 1.0, -0.5));
        let abs = map.absolute_offset(GridCell::new(1, 1)).unwrap();
        assert_eq!(abs, AxisValues::new(84.0, 82.0, 0.5));
    }

    #[test]
    fn test_holes_are_flagged_unreachable() {
        let g = grid(&[(0, 0), (0, 1), (1, 1)]);
        let map = run(
            &g,
            vec![
                measurement((0, 0), (0, 1), AxisValues::new(2.0, 0.0, 0.0), 0.1),
                measurement((0, 1), (1, 1), AxisValues::new(0.0, 3.0, 0.0), 0.1),
            ],
        )
        .unwrap();

        assert!(!map.is_reachable(GridCell::new(1, 0)));
        assert!(map.relative_offset(GridCell::new(1, 0)).is_none());
        assert!(map.relative()[[0, 1, 0]].is_nan());
        assert_eq!(
            map.absolute_offset(GridCell::new(1, 1)).unwrap(),
            AxisValues::new(82.0, 83.0, 0.0)
        );
    }

    #[test]
    fn test_root_is_first_occupied_cell() {
        let g = grid(&[(0, 1), (1, 0), (1, 1)]);
        let map = run(
            &g,
            vec![
                measurement((0, 1), (1, 1), AxisValues::new(1.0, 1.0, 1.0), 0.1),
                measurement((1, 0), (1, 1), AxisValues::new(4.0, 0.0, 0.0), 0.1),
            ],
        )
        .unwrap();

        assert_eq!(
            map.relative_offset(GridCell::new(0, 1)).unwrap(),
            AxisValues::default()
        );
        assert_eq!(
            map.relative_offset(GridCell::new(1, 0)).unwrap(),
            AxisValues::new(-3.0, 1.0, 1.0)
        );
    }

    #[test]
    fn test_consistent_loop_is_independent_of_dropped_edge() {
        let g = grid(&[(0, 0), (0, 1), (1, 0), (1, 1)]);
        let edges = [
            ((0, 0), (0, 1), AxisValues::new(3.0, 1.0, 0.5)),
            ((0, 0), (1, 0), AxisValues::new(2.0, 4.0, 1.0)),
            ((0, 1), (1, 1), AxisValues::new(2.0, 4.0, 2.0)),
            ((1, 0), (1, 1), AxisValues::new(3.0, 1.0, 1.5)),
        ];

        let maps: Vec<RegistrationMap> = (0..edges.len())
            .map(|worst| {
                let measurements = edges
                    .iter()
                    .enumerate()
                    .map(|(i, &(from, to, shift))| {
                        let relia = if i == worst { 0.9 } else { 0.1 };
                        measurement(from, to, shift, relia)
                    })
                    .collect();
                run(&g, measurements).unwrap()
            })
            .collect();

        for map in &maps[1..] {
            assert_eq!(map.absolute(), maps[0].absolute());
        }
        assert_eq!(
            maps[0].absolute_offset(GridCell::new(1, 1)).unwrap(),
            AxisValues::new(85.0, 85.0, 2.5)
        );
    }
}
