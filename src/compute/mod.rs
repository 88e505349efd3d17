//! Compute module - Geometry, host construction and structure search.

mod enumerate;
mod geometry;
mod host;

pub mod evolution;

pub use enumerate::*;
pub use geometry::*;
pub use host::*;
