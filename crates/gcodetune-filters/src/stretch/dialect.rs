//! Slicer dialect strategies
//!
//! Each slicer marks up its output differently: Skeinforge brackets
//! threads with M101/M103 and `(<loop>`/`(<edge>` comments, Cura labels
//! sections with `;TYPE:` comments, Slic3r emits no markers at all and is
//! recognized by structure alone. One dialect is selected per document by
//! sniffing, before pass 1 runs, so marker interpretation is never
//! ambiguous.

use std::sync::OnceLock;

use gcodetune_core::{Document, Line};
use regex::Regex;
use tracing::warn;

use crate::arc::Point;

use super::config::DEFAULT_EDGE_WIDTH;
use super::tags::{LineTag, SegmentKind};

fn skeinforge_edge_width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(<edgeWidth> ([0-9.]+)").unwrap())
}

fn slic3r_extrusion_width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"extrusion width = ([0-9.]+)\s*mm").unwrap())
}

/// Marker vocabulary and edge-width extraction for one slicer
pub trait SlicerDialect {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Whether the document carries this dialect's signature
    fn sniff(&self, doc: &Document) -> bool;

    /// Edge width declared by the slicer, if any
    fn edge_width(&self, doc: &Document) -> Option<f64>;

    /// Classify every line of one layer
    fn tag_layer(&self, lines: &[Line], edge_width: f64) -> Vec<LineTag>;
}

/// Pick the dialect for a document; Slic3r is the markerless fallback
pub fn detect_dialect(doc: &Document) -> Box<dyn SlicerDialect> {
    let cura = CuraDialect;
    if cura.sniff(doc) {
        return Box::new(cura);
    }
    let skeinforge = SkeinforgeDialect;
    if skeinforge.sniff(doc) {
        return Box::new(skeinforge);
    }
    Box::new(Slic3rDialect)
}

/// Travel move whose next move starts depositing filament
fn leads_into_extrusion(tags: &[LineTag], lines: &[Line], index: usize) -> bool {
    for (line, tag) in lines.iter().zip(tags.iter()).skip(index + 1) {
        if line.is_move() {
            return tag.extruding;
        }
        if tag.breaks_thread {
            return false;
        }
    }
    false
}

/// Skeinforge: M101/M103 extruder markers, parenthesized loop and edge
/// comments, edge width in the extruder initialization block
pub struct SkeinforgeDialect;

impl SkeinforgeDialect {
    /// Skeinforge-specific lead-in: a travel move is displaced with the
    /// upcoming thread when the activate command follows before any
    /// other move
    fn just_before_activate(lines: &[Line], index: usize) -> bool {
        for line in &lines[index + 1..] {
            if line.is_move() || line.command.as_deref() == Some("M103") {
                return false;
            }
            if line.command.as_deref() == Some("M101") {
                return true;
            }
        }
        false
    }
}

impl SlicerDialect for SkeinforgeDialect {
    fn name(&self) -> &str {
        "skeinforge"
    }

    fn sniff(&self, doc: &Document) -> bool {
        doc.lines().any(|line| {
            line.raw.contains("(<edgeWidth>") || line.raw.contains("</extruderInitialization>")
        })
    }

    fn edge_width(&self, doc: &Document) -> Option<f64> {
        for line in doc.lines() {
            if let Some(captures) = skeinforge_edge_width_re().captures(&line.raw) {
                return captures[1].parse().ok();
            }
        }
        None
    }

    fn tag_layer(&self, lines: &[Line], _edge_width: f64) -> Vec<LineTag> {
        let mut tags = vec![LineTag::default(); lines.len()];
        let mut kind = SegmentKind::Path;
        let mut active = false;
        let mut depth: i64 = 0;

        for (index, line) in lines.iter().enumerate() {
            let raw = line.raw.trim_start();
            match line.command.as_deref() {
                Some("M101") => {
                    if active {
                        warn!(line = %line.raw, "extruder activated twice, continuing");
                    }
                    active = true;
                }
                Some("M103") => {
                    if !active {
                        warn!(line = %line.raw, "extruder deactivated while inactive, continuing");
                    }
                    active = false;
                    kind = SegmentKind::Path;
                    tags[index].breaks_thread = true;
                }
                _ => {}
            }

            if raw.starts_with("(<loop>") {
                kind = SegmentKind::Loop;
                depth += 1;
            } else if raw.starts_with("(</loop>)") {
                kind = SegmentKind::Path;
                depth -= 1;
            } else if raw.starts_with("(<edge> outer") {
                kind = SegmentKind::OuterEdge;
                depth += 1;
            } else if raw.starts_with("(<edge>") {
                kind = SegmentKind::InnerEdge;
                depth += 1;
            } else if raw.starts_with("(</edge>)") {
                kind = SegmentKind::Path;
                depth -= 1;
            }

            if line.is_move() {
                tags[index].extruding = active;
                tags[index].kind = kind;
                if !active {
                    tags[index].breaks_thread = true;
                    tags[index].leads_extrusion = Self::just_before_activate(lines, index);
                }
            }
        }

        if depth != 0 {
            warn!(depth, "unbalanced loop markers, using best-effort thread boundaries");
        }
        tags
    }
}

/// Cura: profile string signature, `;TYPE:` section labels, extrusion
/// recognized by the E word on the move itself
pub struct CuraDialect;

impl SlicerDialect for CuraDialect {
    fn name(&self) -> &str {
        "cura"
    }

    fn sniff(&self, doc: &Document) -> bool {
        doc.lines().any(|line| line.raw.contains("CURA_PROFILE_STRING"))
    }

    fn edge_width(&self, _doc: &Document) -> Option<f64> {
        // the profile string is opaque; fall back to the default width
        None
    }

    fn tag_layer(&self, lines: &[Line], _edge_width: f64) -> Vec<LineTag> {
        let mut tags = vec![LineTag::default(); lines.len()];
        let mut kind = SegmentKind::Path;

        for (index, line) in lines.iter().enumerate() {
            let raw = line.raw.trim_start();
            if let Some(section) = raw.strip_prefix(";TYPE:") {
                kind = match section.trim() {
                    "WALL-OUTER" => SegmentKind::OuterEdge,
                    "WALL-INNER" => SegmentKind::InnerEdge,
                    _ => SegmentKind::Path,
                };
                tags[index].breaks_thread = true;
                continue;
            }
            if line.is_move() {
                let extruding = line.e.map(|e| e > 0.0).unwrap_or(false)
                    && (line.x.is_some() || line.y.is_some());
                tags[index].extruding = extruding;
                tags[index].kind = kind;
                if !extruding {
                    tags[index].breaks_thread = true;
                }
            }
        }

        for index in 0..tags.len() {
            if tags[index].breaks_thread && lines[index].is_move() {
                tags[index].leads_extrusion = leads_into_extrusion(&tags, lines, index);
            }
        }
        tags
    }
}

/// Slic3r: no markers. An extruded run is a maximal sequence of E-bearing
/// XY moves; a run that closes back on its start point within one edge
/// width is a loop. Verbose per-move comments refine the kind when present.
pub struct Slic3rDialect;

impl Slic3rDialect {
    fn classify_run(lines: &[Line], run: &[usize], start: Option<Point>, edge_width: f64) -> SegmentKind {
        for &index in run {
            if let Some(comment) = &lines[index].comment {
                if comment.contains("external perimeter") {
                    return SegmentKind::OuterEdge;
                }
                if comment.contains("perimeter") {
                    return SegmentKind::InnerEdge;
                }
            }
        }
        let closed = match (start, run.last().and_then(|&i| lines[i].xy())) {
            (Some(first), Some((x, y))) => first.distance_to(&Point::new(x, y)) <= edge_width,
            _ => false,
        };
        if closed {
            SegmentKind::Loop
        } else {
            SegmentKind::Path
        }
    }
}

impl SlicerDialect for Slic3rDialect {
    fn name(&self) -> &str {
        "slic3r"
    }

    fn sniff(&self, _doc: &Document) -> bool {
        true
    }

    fn edge_width(&self, doc: &Document) -> Option<f64> {
        for line in doc.lines() {
            if let Some(captures) = slic3r_extrusion_width_re().captures(&line.raw) {
                return captures[1].parse().ok();
            }
        }
        None
    }

    fn tag_layer(&self, lines: &[Line], edge_width: f64) -> Vec<LineTag> {
        let mut tags = vec![LineTag::default(); lines.len()];

        // collect maximal runs of extruding moves, remembering the travel
        // position each run starts from
        let mut runs: Vec<(Vec<usize>, Option<Point>)> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut run_start: Option<Point> = None;
        let mut last_position: Option<Point> = None;

        for (index, line) in lines.iter().enumerate() {
            if !line.is_move() {
                continue;
            }
            let extruding =
                line.e.map(|e| e > 0.0).unwrap_or(false) && (line.x.is_some() || line.y.is_some());
            if extruding {
                if current.is_empty() {
                    run_start = last_position;
                }
                current.push(index);
            } else {
                if !current.is_empty() {
                    runs.push((std::mem::take(&mut current), run_start));
                }
                tags[index].breaks_thread = true;
            }
            if let Some((x, y)) = line.xy() {
                last_position = Some(Point::new(x, y));
            }
        }
        if !current.is_empty() {
            runs.push((current, run_start));
        }

        for (run, start) in &runs {
            let kind = Self::classify_run(lines, run, *start, edge_width);
            for &index in run {
                tags[index].extruding = true;
                tags[index].kind = kind;
            }
        }

        for index in 0..tags.len() {
            if tags[index].breaks_thread && lines[index].is_move() {
                tags[index].leads_extrusion = leads_into_extrusion(&tags, lines, index);
            }
        }
        tags
    }
}
