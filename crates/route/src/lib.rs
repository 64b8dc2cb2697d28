pub mod geometry;
pub mod store;

pub use geometry::*;
pub use store::*;
