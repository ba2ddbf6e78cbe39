use crate::error::Result;
use crate::graph::{Axis, PerAxis, RegistrationGraph, SpanningTree};
use crate::grid::{Direction, GridCell};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Coarse classification of a registration error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityGrade {
    Good,
    Fair,
    Poor,
}

impl QualityGrade {
    pub const GOOD_BELOW: f64 = 0.15;
    pub const FAIR_BELOW: f64 = 0.30;

    /// NaN errors grade as `Poor`
    pub fn from_error(error: f64) -> Self {
        if error < Self::GOOD_BELOW {
            QualityGrade::Good
        } else if error < Self::FAIR_BELOW {
            QualityGrade::Fair
        } else {
            QualityGrade::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage_name: String,
    pub duration_ms: f64,
}

impl StageTiming {
    pub fn new(stage_name: &str, duration: Duration) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            duration_ms: duration.as_secs_f64() * 1000.0,
        }
    }
}

/// One measured edge as seen by one axis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeReport {
    pub from: GridCell,
    pub to: GridCell,
    pub direction: Direction,
    pub shift: f64,
    pub reliability: f64,
    pub grade: QualityGrade,
    /// Whether the spanning tree kept this measurement
    pub in_tree: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisReport {
    pub axis: Axis,
    pub tree_weight: f64,
    pub tree_edges: usize,
    pub edges: Vec<EdgeReport>,
}

impl AxisReport {
    pub fn count(&self, grade: QualityGrade) -> usize {
        self.edges.iter().filter(|e| e.grade == grade).count()
    }
}

/// Per-edge quality overview of a registration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationReport {
    pub generated_at: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub nrow: usize,
    pub ncol: usize,
    pub tiles: usize,
    pub axes: Vec<AxisReport>,
    pub timings: Vec<StageTiming>,
}

impl RegistrationReport {
    pub fn new(
        correlation_id: Uuid,
        graph: &RegistrationGraph,
        trees: &PerAxis<SpanningTree>,
        timings: Vec<StageTiming>,
    ) -> Self {
        let axes = trees
            .iter()
            .map(|(axis, tree)| {
                let edges = graph
                    .measurements()
                    .iter()
                    .map(|m| {
                        let reliability = m.reliability.get(axis);
                        EdgeReport {
                            from: m.edge.from,
                            to: m.edge.to,
                            direction: m.edge.direction,
                            shift: m.shift.get(axis),
                            reliability,
                            grade: QualityGrade::from_error(reliability),
                            in_tree: tree
                                .contains(graph.ravel(m.edge.from), graph.ravel(m.edge.to)),
                        }
                    })
                    .collect();
                AxisReport {
                    axis,
                    tree_weight: tree.total_weight(),
                    tree_edges: tree.n_edges(),
                    edges,
                }
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            correlation_id,
            nrow: graph.nrow(),
            ncol: graph.ncol(),
            tiles: graph.n_occupied(),
            axes,
            timings,
        }
    }

    pub fn axis(&self, axis: Axis) -> Option<&AxisReport> {
        self.axes.iter().find(|a| a.axis == axis)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, SpanningTreeOptimizer};
    use crate::grid::{GridModel, NeighborEdge, Tile, TileType};
    use crate::registration::{AxisValues, PairwiseMeasurement};

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(QualityGrade::from_error(0.0), QualityGrade::Good);
        assert_eq!(QualityGrade::from_error(0.149), QualityGrade::Good);
        assert_eq!(QualityGrade::from_error(0.15), QualityGrade::Fair);
        assert_eq!(QualityGrade::from_error(0.30), QualityGrade::Poor);
        assert_eq!(QualityGrade::from_error(f64::NAN), QualityGrade::Poor);
    }

    #[test]
    fn test_stage_timing_in_milliseconds() {
        let timing = StageTiming::new("optimize", Duration::from_micros(2500));
        assert!((timing.duration_ms - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_only_the_dropped_edge_is_outside_the_tree() {
        let grid = GridModel::new(
            [(0, 0), (0, 1), (1, 0), (1, 1)]
                .iter()
                .map(|&(r, c)| Tile::new(format!("{}_{}", r, c), r, c, TileType::Tiff3D))
                .collect(),
        )
        .unwrap();
        let mut builder = GraphBuilder::new(&grid);
        for (from, to, relia) in [
            ((0, 0), (0, 1), 0.1),
            ((0, 0), (1, 0), 0.2),
            ((0, 1), (1, 1), 0.4),
            ((1, 0), (1, 1), 0.3),
        ] {
            builder
                .record(PairwiseMeasurement {
                    edge: NeighborEdge::new(GridCell::new(from.0, from.1), GridCell::new(to.0, to.1))
                        .unwrap(),
                    shift: AxisValues::default(),
                    reliability: AxisValues::new(relia, relia, relia),
                })
                .unwrap();
        }
        let graph = builder.build();
        let trees = SpanningTreeOptimizer::new().optimize(&graph).unwrap();

        let report = RegistrationReport::new(Uuid::nil(), &graph, &trees, Vec::new());
        for axis in &report.axes {
            let dropped: Vec<_> = axis.edges.iter().filter(|e| !e.in_tree).collect();
            assert_eq!(dropped.len(), 1);
            assert_eq!(dropped[0].from, GridCell::new(0, 1));
            assert_eq!(dropped[0].to, GridCell::new(1, 1));
            assert_eq!(axis.tree_edges, 3);
        }
    }
}
