pub mod phase_correlation;
pub mod projection;

pub use phase_correlation::*;
pub use projection::*;
