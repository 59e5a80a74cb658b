//! Arc consolidation
//!
//! Detects runs of short linear moves that trace a circular arc and
//! rewrites each run as a single G2/G3 command.

mod geometry;
mod optimizer;

pub use geometry::{Circle, Direction, Point};
pub use optimizer::{ArcOptimizer, ArcOptimizerConfig};
