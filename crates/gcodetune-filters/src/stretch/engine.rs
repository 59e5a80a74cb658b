//! Stretch displacement engine
//!
//! Extruded holes come out smaller than modeled because filament shrinks
//! as it cools. The engine compensates by displacing every vertex of an
//! extruded contour away from the local curvature center, by an amount
//! bounded per segment kind.
//!
//! Two passes over the document: pass 1 tags every line of every layer
//! (dialect-specific, see [`super::dialect`]), pass 2 rewrites vertices.
//! Pass 2 works from a snapshot of each layer taken at entry, so moving
//! an earlier vertex never perturbs the contour scan for a later one.

use gcodetune_core::{round_to, Document, DocumentFilter, Line, Result};
use tracing::{debug, info};

use crate::arc::Point;

use super::config::{StretchConfig, StretchProfile, DEFAULT_EDGE_WIDTH};
use super::cursor::{ContourCursor, ScanDirection};
use super::dialect::detect_dialect;
use super::tags::{LineTag, SegmentKind};

const EPSILON: f64 = 1e-9;

/// One extruded run of a layer, reconstructed from pass-1 tags
struct Thread {
    kind: SegmentKind,
    /// Line index and endpoint of each extruding move
    vertices: Vec<(usize, Point)>,
    /// The travel move that positioned the head at the start vertex,
    /// with whether it is itself eligible for displacement
    lead: Option<(usize, Point, bool)>,
}

/// Whole-document stretch compensation filter
pub struct StretchFilter {
    config: StretchConfig,
}

impl StretchFilter {
    pub fn new() -> Self {
        Self::with_config(StretchConfig::default())
    }

    pub fn with_config(config: StretchConfig) -> Self {
        Self { config }
    }

    fn collect_threads(lines: &[Line], tags: &[LineTag]) -> Vec<Thread> {
        let mut threads = Vec::new();
        let mut open: Option<Thread> = None;
        let mut last_move: Option<(usize, Point, bool)> = None;

        for (index, (line, tag)) in lines.iter().zip(tags).enumerate() {
            if tag.breaks_thread {
                if let Some(thread) = open.take() {
                    threads.push(thread);
                }
            }
            if !line.is_move() {
                continue;
            }
            let Some((x, y)) = line.xy() else { continue };
            let point = Point::new(x, y);
            if tag.extruding {
                let thread = open.get_or_insert_with(|| Thread {
                    kind: tag.kind,
                    vertices: Vec::new(),
                    lead: last_move,
                });
                thread.vertices.push((index, point));
            }
            last_move = Some((index, point, tag.leads_extrusion));
        }
        if let Some(thread) = open.take() {
            threads.push(thread);
        }
        threads
    }

    /// Relative displacement (magnitude ≤ 1) for the vertex at `position`
    /// of `cycle`, or `None` when nothing moves
    fn relative_displacement(
        &self,
        cycle: &[Point],
        position: usize,
        location: Point,
        wrap: bool,
        profile: &StretchProfile,
    ) -> Option<Point> {
        let forward = sample_direction(
            location,
            ContourCursor::new(cycle, position, ScanDirection::Forward, wrap),
            profile,
        );
        let backward = sample_direction(
            location,
            ContourCursor::new(cycle, position, ScanDirection::Backward, wrap),
            profile,
        );
        let mut stretch = (forward + backward) * 0.8;

        let mut cross_forward = ContourCursor::new(cycle, position, ScanDirection::Forward, wrap);
        stretch = cross_limit(stretch, &mut cross_forward, location, profile);
        let mut cross_backward = ContourCursor::new(cycle, position, ScanDirection::Backward, wrap);
        stretch = cross_limit(stretch, &mut cross_backward, location, profile);

        let magnitude = stretch.amplitude();
        if magnitude < EPSILON {
            return None;
        }
        if magnitude > 1.0 {
            stretch = stretch * (1.0 / magnitude);
        }
        Some(stretch)
    }

    fn stretch_layer(&self, lines: &mut Vec<Line>, tags: &[LineTag], profile: &StretchProfile) {
        // snapshot: all geometry is read from here, rewrites go to `lines`
        let snapshot = lines.clone();
        let threads = Self::collect_threads(&snapshot, tags);

        for thread in &threads {
            let max_stretch = profile.max_stretch(thread.kind);
            if max_stretch <= 0.0 || thread.vertices.len() < 2 {
                continue;
            }
            let wrap = thread.kind.is_loop();
            let cycle: Vec<Point> = thread.vertices.iter().map(|&(_, point)| point).collect();

            let mut displaced: Vec<(usize, Point, Point)> = Vec::new();
            for (position, &(line_index, location)) in thread.vertices.iter().enumerate() {
                let line = &snapshot[line_index];
                if line.x.is_none() && line.y.is_none() {
                    continue;
                }
                if let Some(stretch) =
                    self.relative_displacement(&cycle, position, location, wrap, profile)
                {
                    displaced.push((line_index, location, stretch));
                }
            }
            // the lead-in travel move shares the loop's start vertex and
            // moves with it
            if wrap {
                if let Some((lead_index, lead_point, eligible)) = thread.lead {
                    if eligible {
                        if let Some(stretch) = self.relative_displacement(
                            &cycle,
                            cycle.len() - 1,
                            lead_point,
                            wrap,
                            profile,
                        ) {
                            displaced.push((lead_index, lead_point, stretch));
                        }
                    }
                }
            }

            for (line_index, location, stretch) in displaced {
                let target = location + stretch * max_stretch;
                let line = &mut lines[line_index];
                line.x = Some(round_to(target.x, 3));
                line.y = Some(round_to(target.y, 3));
                if profile.attenuate_extrusion {
                    if let Some(e) = line.e {
                        line.e = Some(e * (1.0 - stretch.amplitude()));
                    }
                }
                line.rebuild();
                line.current_x = Some(target.x);
                line.current_y = Some(target.y);
            }
            debug!(
                kind = ?thread.kind,
                vertices = thread.vertices.len(),
                "stretched thread"
            );
        }
    }
}

impl Default for StretchFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFilter for StretchFilter {
    fn name(&self) -> &str {
        "stretch"
    }

    fn apply(&mut self, doc: &mut Document) -> Result<()> {
        let dialect = detect_dialect(doc);
        let edge_width = dialect.edge_width(doc).unwrap_or(DEFAULT_EDGE_WIDTH);
        let profile = StretchProfile::new(&self.config, edge_width);
        info!(
            dialect = dialect.name(),
            edge_width, "stretching with detected dialect"
        );

        // pass 1 must complete for the whole document before pass 2
        // rewrites anything
        let tags: Vec<Vec<LineTag>> = doc
            .layers()
            .iter()
            .map(|layer| dialect.tag_layer(layer.lines(), edge_width))
            .collect();

        for (layer, layer_tags) in doc.layers_mut().iter_mut().zip(tags.iter()) {
            self.stretch_layer(layer.lines_mut(), layer_tags, &profile);
        }
        Ok(())
    }
}

/// Direction from the contour point at the sampling distance back to
/// `location`, scaled by the sampling distance.
///
/// A walk that exhausts the thread before covering the sampling distance
/// contributes nothing.
fn sample_direction(location: Point, mut cursor: ContourCursor, profile: &StretchProfile) -> Point {
    let mut last = location;
    let mut walked = 0.0;
    loop {
        let Some(point) = cursor.next_point() else {
            return Point::default();
        };
        let segment = last.distance_to(&point);
        if segment < EPSILON {
            last = point;
            continue;
        }
        if walked + segment >= profile.stretch_from_distance {
            let ratio = (profile.stretch_from_distance - walked) / segment;
            let sample = Point::new(
                ratio * point.x + (1.0 - ratio) * last.x,
                ratio * point.y + (1.0 - ratio) * last.y,
            );
            return (location - sample) * (1.0 / profile.stretch_from_distance);
        }
        walked += segment;
        last = point;
    }
}

/// Damp the component of `stretch` perpendicular to the direction toward
/// the nearest reference point on the contour.
///
/// Beyond the full cross-limit distance only the parallel component
/// survives; within a third of it the vector passes unchanged; in between
/// the perpendicular component fades linearly.
fn cross_limit(
    stretch: Point,
    cursor: &mut ContourCursor,
    location: Point,
    profile: &StretchProfile,
) -> Point {
    let Some(point) = cursor.next_point() else {
        return stretch;
    };
    let offset = location - point;
    let distance = offset.amplitude();
    if distance <= profile.cross_limit_fraction {
        return stretch;
    }
    let parallel_normal = offset * (1.0 / distance);
    let parallel = parallel_normal * parallel_normal.dot(&stretch);
    if distance > profile.cross_limit_distance {
        return parallel;
    }
    let cross_normal = Point::new(parallel_normal.y, -parallel_normal.x);
    let cross = cross_normal * cross_normal.dot(&stretch);
    let portion = (profile.cross_limit_distance - distance) / profile.cross_limit_remainder;
    parallel + cross * portion
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const CENTER: (f64, f64) = (20.0, 20.0);

    /// Closed 24-gon traced with relative extrusion, markerless
    fn polygon_program(radius: f64, sides: usize) -> String {
        let mut out = String::from("M83\n");
        let vertex = |k: usize| {
            let theta = 2.0 * PI * (k as f64) / (sides as f64);
            (
                CENTER.0 + radius * theta.cos(),
                CENTER.1 + radius * theta.sin(),
            )
        };
        let (x0, y0) = vertex(0);
        out.push_str(&format!("G1 X{:.4} Y{:.4}\n", x0, y0));
        let mut previous = vertex(0);
        for k in 1..=sides {
            let (x, y) = vertex(k % sides);
            let e = ((x - previous.0).hypot(y - previous.1)) * 0.05;
            out.push_str(&format!("G1 X{:.4} Y{:.4} E{:.5}\n", x, y, e));
            previous = (x, y);
        }
        out
    }

    fn apply(text: &str, config: StretchConfig) -> Document {
        let mut doc = Document::parse(text).unwrap();
        let mut filter = StretchFilter::with_config(config);
        filter.apply(&mut doc).unwrap();
        doc
    }

    fn vertex_radii(doc: &Document) -> Vec<f64> {
        doc.lines()
            .filter(|l| l.is_move() && l.e.is_some())
            .map(|l| {
                let (x, y) = l.xy().unwrap();
                (x - CENTER.0).hypot(y - CENTER.1)
            })
            .collect()
    }

    #[test]
    fn test_loop_vertices_move_outward() {
        let text = polygon_program(2.0, 24);
        let doc = apply(&text, StretchConfig::default());
        for radius in vertex_radii(&doc) {
            assert!(radius > 2.0 + 1e-4, "vertex did not move outward: {radius}");
        }
    }

    #[test]
    fn test_displacement_bounded_by_loop_maximum() {
        let text = polygon_program(2.0, 24);
        let original = Document::parse(&text).unwrap();
        let doc = apply(&text, StretchConfig::default());
        let max = 0.4 * 0.11; // edge width x loop ratio
        for (before, after) in original.lines().zip(doc.lines()) {
            if let (Some((x0, y0)), Some((x1, y1))) = (before.xy(), after.xy()) {
                let moved = (x1 - x0).hypot(y1 - y0);
                assert!(moved <= max + 1e-3, "moved {moved} beyond maximum {max}");
            }
        }
    }

    #[test]
    fn test_clamp_holds_under_extreme_strength() {
        let text = polygon_program(2.0, 24);
        let config = StretchConfig {
            stretch_strength: 100.0,
            ..StretchConfig::default()
        };
        let original = Document::parse(&text).unwrap();
        let doc = apply(&text, config);
        let max = 0.4 * 0.11 * 100.0;
        for (before, after) in original.lines().zip(doc.lines()) {
            if let (Some((x0, y0)), Some((x1, y1))) = (before.xy(), after.xy()) {
                let moved = (x1 - x0).hypot(y1 - y0);
                assert!(moved <= max + 1e-3);
            }
        }
    }

    #[test]
    fn test_open_path_is_never_displaced() {
        // default path ratio is zero: infill-like zigzags stay put
        let text = "M83\nG1 X0 Y0\nG1 X10 Y0 E0.5\nG1 X10 Y5 E0.25\nG1 X0 Y5 E0.5\n";
        let doc = apply(text, StretchConfig::default());
        assert_eq!(doc.render(), text);
    }

    #[test]
    fn test_lines_outside_threads_untouched() {
        let mut text = polygon_program(2.0, 24);
        text.push_str("M107\nG1 X50 Y50\n");
        let doc = apply(&text, StretchConfig::default());
        let raws: Vec<&str> = doc.lines().map(|l| l.raw.as_str()).collect();
        assert!(raws.contains(&"M107"));
        assert!(raws.contains(&"G1 X50 Y50"));
    }

    #[test]
    fn test_extrusion_unchanged_by_default() {
        let text = polygon_program(2.0, 24);
        let original = Document::parse(&text).unwrap();
        let doc = apply(&text, StretchConfig::default());
        let before: Vec<f64> = original.lines().filter_map(|l| l.e).collect();
        let after: Vec<f64> = doc.lines().filter_map(|l| l.e).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_extrusion_attenuated_when_configured() {
        let text = polygon_program(2.0, 24);
        let config = StretchConfig {
            attenuate_extrusion: true,
            ..StretchConfig::default()
        };
        let original = Document::parse(&text).unwrap();
        let doc = apply(&text, config);
        let before: Vec<f64> = original.lines().filter_map(|l| l.e).collect();
        let after: Vec<f64> = doc.lines().filter_map(|l| l.e).collect();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            assert!(a < b, "attenuation must reduce extrusion: {a} vs {b}");
        }
    }

    #[test]
    fn test_cross_limit_keeps_only_parallel_beyond_full_distance() {
        let profile = StretchProfile::new(&StretchConfig::default(), 0.4);
        // reference point far away along +x: perpendicular (y) component
        // must vanish entirely
        let cycle = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let mut cursor = ContourCursor::new(&cycle, 0, ScanDirection::Forward, false);
        let limited = cross_limit(
            Point::new(0.5, 0.5),
            &mut cursor,
            Point::new(0.0, 0.0),
            &profile,
        );
        assert!((limited.x - 0.5).abs() < 1e-12);
        assert!(limited.y.abs() < 1e-12);
    }

    #[test]
    fn test_cross_limit_noop_within_fraction() {
        let profile = StretchProfile::new(&StretchConfig::default(), 0.4);
        let cycle = vec![Point::new(0.0, 0.0), Point::new(0.3, 0.0)];
        let mut cursor = ContourCursor::new(&cycle, 0, ScanDirection::Forward, false);
        let stretch = Point::new(0.5, 0.5);
        let limited = cross_limit(stretch, &mut cursor, Point::new(0.0, 0.0), &profile);
        assert_eq!(limited, stretch);
    }

    #[test]
    fn test_sample_direction_exhaustion_contributes_zero() {
        let profile = StretchProfile::new(&StretchConfig::default(), 0.4);
        // total contour length 0.2 < sampling distance 0.8
        let cycle = vec![Point::new(0.0, 0.0), Point::new(0.2, 0.0)];
        let cursor = ContourCursor::new(&cycle, 0, ScanDirection::Forward, false);
        let direction = sample_direction(Point::new(0.0, 0.0), cursor, &profile);
        assert_eq!(direction, Point::default());
    }
}
