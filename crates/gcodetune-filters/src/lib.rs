//! # gcodetune-filters
//!
//! The post-processing filters of gcodetune:
//!
//! - [`arc`]: collapses runs of short linear moves into G2/G3 arcs
//! - [`stretch`]: displaces contours outward to compensate filament
//!   shrinkage, with per-slicer dialect detection
//! - [`translate`]: shifts a program in the X/Y plane
//! - [`relative_extrusion`]: converts cumulative E values to amounts
//! - [`tempcal`]: injects a temperature gradient along Z
//! - [`visit`]: layer walking, including pause insertion
//!
//! Filters implement the `LineFilter`/`DocumentFilter` contracts from
//! `gcodetune-core` and can be chained over one `Document`.

pub mod arc;
pub mod error;
pub mod relative_extrusion;
pub mod stretch;
pub mod tempcal;
pub mod translate;
pub mod visit;

pub use arc::{ArcOptimizer, ArcOptimizerConfig};
pub use error::{FilterError, Result};
pub use relative_extrusion::RelativeExtrusionFilter;
pub use stretch::{StretchConfig, StretchFilter};
pub use tempcal::{GradientMode, TempGradient};
pub use translate::TranslateFilter;
pub use visit::{walk_layers, LayerInfo, LayerVisitor, PauseAtLayer};
