//! # gcodetune
//!
//! A G-code post-processing toolkit for 3D printing:
//!
//! - **Arc consolidation**: collapses runs of short linear moves into
//!   G2/G3 arcs, shrinking programs and smoothing motion
//! - **Stretch compensation**: widens holes and pushes corners outward
//!   to counter filament shrinkage, with per-slicer dialect detection
//! - **Utility passes**: XY translation, absolute-to-relative extrusion
//!   conversion, temperature gradients, pause insertion
//!
//! ## Architecture
//!
//! gcodetune is organized as a workspace:
//!
//! 1. **gcodetune-core** - line codec, document model, filter pipeline
//! 2. **gcodetune-filters** - the post-processing filters
//! 3. **gcodetune** - command line binary integrating both

pub use gcodetune_core::{
    apply_line_filter, Document, DocumentFilter, Error, FilterAction, Layer, Line, LineFilter,
    Result,
};

pub use gcodetune_filters::{
    walk_layers, ArcOptimizer, ArcOptimizerConfig, FilterError, GradientMode, LayerVisitor,
    PauseAtLayer, RelativeExtrusionFilter, StretchConfig, StretchFilter, TempGradient,
    TranslateFilter,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the given verbosity
///
/// Sets up structured logging with:
/// - Console output on stderr, keeping stdout clean for G-code
/// - RUST_LOG environment variable support
/// - Verbosity counted from -q/-v flags (0 = warnings, 1 = info, 2+ = debug)
pub fn init_logging(verbosity: i32) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let default_level = match verbosity {
        i32::MIN..=-1 => tracing::Level::ERROR,
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(default_level.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
