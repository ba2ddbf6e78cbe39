//! Global optimization of pairwise measurements
//!
//! Measurements are split into one weighted graph per spatial axis. A minimum
//! spanning tree keeps the most reliable measurements on each axis, and a
//! traversal of the tree turns relative shifts into tile coordinates.

pub mod builder;
pub mod optimizer;
pub mod propagation;

pub use builder::*;
pub use optimizer::*;
pub use propagation::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Spatial axis of the mosaic: H (columns, x), V (rows, y), D (depth, z)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    H,
    V,
    D,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::H, Axis::V, Axis::D];

    pub fn index(self) -> usize {
        match self {
            Axis::H => 0,
            Axis::V => 1,
            Axis::D => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::H => write!(f, "H"),
            Axis::V => write!(f, "V"),
            Axis::D => write!(f, "D"),
        }
    }
}

/// One value of `T` per axis, addressed by [`Axis`]
#[derive(Debug, Clone, PartialEq)]
pub struct PerAxis<T>([T; 3]);

impl<T> PerAxis<T> {
    pub fn from_fn(mut f: impl FnMut(Axis) -> T) -> Self {
        Self([f(Axis::H), f(Axis::V), f(Axis::D)])
    }

    pub fn try_from_fn<E>(mut f: impl FnMut(Axis) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self([f(Axis::H)?, f(Axis::V)?, f(Axis::D)?]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, &T)> {
        Axis::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<Axis> for PerAxis<T> {
    type Output = T;

    fn index(&self, axis: Axis) -> &T {
        &self.0[axis.index()]
    }
}

impl<T> IndexMut<Axis> for PerAxis<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        &mut self.0[axis.index()]
    }
}
