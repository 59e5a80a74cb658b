//! Segmentation tags
//!
//! Pass 1 of the stretch engine classifies every line of a layer before
//! any point is moved. Tags are derived per run and discarded afterwards,
//! never persisted in the document.

/// What kind of thread a line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// A closed contour that is neither the innermost nor outermost
    /// perimeter (extra shells)
    Loop,
    /// Innermost perimeter, facing holes
    InnerEdge,
    /// Outermost perimeter, facing the outside of the part
    OuterEdge,
    /// Any open extruded run, typically infill
    Path,
}

impl SegmentKind {
    /// Whether threads of this kind close back on their start point
    pub fn is_loop(self) -> bool {
        !matches!(self, SegmentKind::Path)
    }
}

/// Per-line classification produced by pass 1
#[derive(Debug, Clone, Copy)]
pub struct LineTag {
    /// The line is a move that deposits filament
    pub extruding: bool,
    /// Thread kind active at this line
    pub kind: SegmentKind,
    /// Travel move that positions the head at the start of the next
    /// extruded thread; displaced together with that thread
    pub leads_extrusion: bool,
    /// The current thread, if any, ends before this line
    pub breaks_thread: bool,
}

impl Default for LineTag {
    fn default() -> Self {
        Self {
            extruding: false,
            kind: SegmentKind::Path,
            leads_extrusion: false,
            breaks_thread: false,
        }
    }
}
