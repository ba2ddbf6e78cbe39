pub mod discovery;
pub mod loader;

pub use discovery::*;
pub use loader::*;
