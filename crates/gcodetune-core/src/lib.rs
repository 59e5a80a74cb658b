//! # gcodetune-core
//!
//! Core building blocks for the gcodetune post-processor:
//!
//! - **Line codec**: parses one physical G-code line into a structured
//!   record with resolved modal state, and serializes it back
//! - **Document model**: ordered layers of lines with aggregate Z queries
//! - **Filter pipeline**: the per-line transform contract and its driver
//!
//! The filters themselves (arc consolidation, stretch compensation, the
//! single-pass rewrites) live in `gcodetune-filters`.

pub mod document;
pub mod error;
pub mod filter;
pub mod line;

pub use document::{Document, Layer};
pub use error::{Error, Result};
pub use filter::{apply_line_filter, DocumentFilter, FilterAction, LineFilter};
pub use line::{format_number, round_to, Line, GCODE_RELATIVE_EXTRUSION};
