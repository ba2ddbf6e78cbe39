use super::report::{RegistrationReport, StageTiming};
use crate::config::RegistrationConfig;
use crate::data::TileLoader;
use crate::database::RegistrationDatabase;
use crate::error::{Result, StitchError};
use crate::graph::{
    CoordinatePropagator, GraphBuilder, PerAxis, RegistrationGraph, RegistrationMap,
    SpanningTree, SpanningTreeOptimizer,
};
use crate::grid::GridModel;
use crate::logging::{get_correlation_id, new_correlation_id, StageSpan};
use crate::registration::{PairwiseMeasurement, PairwiseRegistrar};
use rayon::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

/// Runs a grid through registration, optimization and propagation.
///
/// Each step stores its product; asking for a step before the one it
/// depends on fails with [`StitchError::InvalidState`].
pub struct Stitcher {
    grid: GridModel,
    config: RegistrationConfig,
    correlation_id: Uuid,
    measurements: Option<Vec<PairwiseMeasurement>>,
    graph: Option<RegistrationGraph>,
    trees: Option<PerAxis<SpanningTree>>,
    map: Option<RegistrationMap>,
    database: Option<RegistrationDatabase>,
    timings: Vec<StageTiming>,
}

impl Stitcher {
    pub fn new(grid: GridModel, config: RegistrationConfig) -> Self {
        let correlation_id = get_correlation_id().unwrap_or_else(new_correlation_id);
        Self {
            grid,
            config,
            correlation_id,
            measurements: None,
            graph: None,
            trees: None,
            map: None,
            database: None,
            timings: Vec::new(),
        }
    }

    pub fn grid(&self) -> &GridModel {
        &self.grid
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn measurements(&self) -> Option<&[PairwiseMeasurement]> {
        self.measurements.as_deref()
    }

    pub fn graph(&self) -> Option<&RegistrationGraph> {
        self.graph.as_ref()
    }

    pub fn trees(&self) -> Option<&PerAxis<SpanningTree>> {
        self.trees.as_ref()
    }

    pub fn registration_map(&self) -> Option<&RegistrationMap> {
        self.map.as_ref()
    }

    pub fn database(&self) -> Option<&RegistrationDatabase> {
        self.database.as_ref()
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    fn run_stage<T>(
        &mut self,
        name: &str,
        items: usize,
        f: impl FnOnce(&Self) -> Result<T>,
    ) -> Result<T> {
        let span = StageSpan::new(name, Some(self.correlation_id));
        let _enter = span.enter();
        span.record_input(items);

        let result = f(self);
        let duration = span.record_completion(result.is_ok());
        self.timings.push(StageTiming::new(name, duration));
        result
    }

    /// Register every non-redundant edge of the grid.
    ///
    /// Edges run in parallel and all measurements are collected before this
    /// returns. The first failing edge aborts the whole step.
    pub fn compute_registration<L: TileLoader + ?Sized>(
        &mut self,
        loader: &L,
    ) -> Result<&[PairwiseMeasurement]> {
        let edges = self.grid.edges();
        let measurements = self.run_stage("register", edges.len(), |this| {
            let registrar = PairwiseRegistrar::from_config(&this.config);
            let grid = &this.grid;
            let register = || {
                edges
                    .par_iter()
                    .map(|edge| registrar.register_edge(grid, edge, loader))
                    .collect::<Result<Vec<_>>>()
            };

            match this.config.threads {
                Some(threads) => {
                    let pool = rayon::ThreadPoolBuilder::new()
                        .num_threads(threads)
                        .build()
                        .map_err(|e| StitchError::Registration(e.to_string()))?;
                    debug!(threads, "Registering on a dedicated thread pool");
                    pool.install(register)
                }
                None => register(),
            }
        })?;

        info!(edges = measurements.len(), "Pairwise registration complete");
        self.graph = None;
        self.trees = None;
        self.map = None;
        self.database = None;
        Ok(self.measurements.insert(measurements).as_slice())
    }

    pub fn build_graphs(&mut self) -> Result<&RegistrationGraph> {
        let count = self.measurements.as_ref().map_or(0, Vec::len);
        let graph = self.run_stage("build", count, |this| {
            let measurements = this.measurements.as_ref().ok_or_else(|| {
                StitchError::InvalidState(
                    "graphs requested before pairwise registration".to_string(),
                )
            })?;
            let mut builder = GraphBuilder::new(&this.grid);
            for measurement in measurements {
                builder.record(*measurement)?;
            }
            Ok(builder.build())
        })?;
        self.trees = None;
        self.map = None;
        self.database = None;
        Ok(self.graph.insert(graph))
    }

    pub fn optimize(&mut self) -> Result<&PerAxis<SpanningTree>> {
        let trees = self.run_stage("optimize", self.grid.n_tiles(), |this| {
            let graph = this.graph.as_ref().ok_or_else(|| {
                StitchError::InvalidState("optimization requested before graphs".to_string())
            })?;
            SpanningTreeOptimizer::new().optimize(graph)
        })?;
        self.map = None;
        self.database = None;
        Ok(self.trees.insert(trees))
    }

    pub fn produce_registration_map(&mut self) -> Result<&RegistrationMap> {
        let map = self.run_stage("propagate", self.grid.n_tiles(), |this| {
            let (graph, trees) = this.graph.as_ref().zip(this.trees.as_ref()).ok_or_else(|| {
                StitchError::InvalidState(
                    "registration map requested before optimization".to_string(),
                )
            })?;
            CoordinatePropagator::new(this.config.frame_size, this.config.overlap)
                .produce(graph, trees)
        })?;
        self.database = None;
        Ok(self.map.insert(map))
    }

    pub fn build_database(&mut self) -> Result<&RegistrationDatabase> {
        let database = self.run_stage("database", self.grid.n_tiles(), |this| {
            let map = this.map.as_ref().ok_or_else(|| {
                StitchError::InvalidState(
                    "database requested before the registration map".to_string(),
                )
            })?;
            RegistrationDatabase::build(&this.grid, map)
        })?;
        Ok(self.database.insert(database))
    }

    /// Every step from pairwise registration to the database
    pub fn run<L: TileLoader + ?Sized>(&mut self, loader: &L) -> Result<&RegistrationDatabase> {
        info!(
            correlation_id = %self.correlation_id,
            tiles = self.grid.n_tiles(),
            edges = self.grid.n_edges(),
            "Starting registration run"
        );
        self.compute_registration(loader)?;
        self.build_graphs()?;
        self.optimize()?;
        self.produce_registration_map()?;
        self.build_database()
    }

    pub fn report(&self) -> Result<RegistrationReport> {
        let (graph, trees) = self.graph.as_ref().zip(self.trees.as_ref()).ok_or_else(|| {
            StitchError::InvalidState("report requested before optimization".to_string())
        })?;
        Ok(RegistrationReport::new(
            self.correlation_id,
            graph,
            trees,
            self.timings.clone(),
        ))
    }
}
