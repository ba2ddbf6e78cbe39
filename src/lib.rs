pub mod algorithms;
pub mod config;
pub mod data;
pub mod database;
pub mod error;
pub mod graph;
pub mod grid;
pub mod logging;
pub mod pipeline;
pub mod registration;

pub use config::{load_config_or_default, ConfigFormat, StitchConfig};
pub use data::*;
pub use database::{DatabaseRecord, RegistrationDatabase};
pub use error::{Result, StitchError};
pub use graph::{Axis, PerAxis, RegistrationMap};
pub use grid::*;
pub use pipeline::{RegistrationReport, Stitcher};
pub use registration::*;
