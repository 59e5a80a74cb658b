//! Stretch compensation
//!
//! Widens holes and pushes corners outward to compensate for filament
//! shrinkage, following the classic Skeinforge stretch approach: sample
//! the thread direction a fixed contour distance ahead of and behind each
//! vertex and displace the vertex away from the local curvature center.

mod config;
mod cursor;
mod dialect;
mod engine;
mod tags;

pub use config::{StretchConfig, StretchProfile, DEFAULT_EDGE_WIDTH};
pub use cursor::{ContourCursor, ScanDirection};
pub use dialect::{detect_dialect, CuraDialect, SkeinforgeDialect, Slic3rDialect, SlicerDialect};
pub use engine::StretchFilter;
pub use tags::{LineTag, SegmentKind};
