//! Arc consolidation filter
//!
//! Buffers a run of consecutive linear moves, fits a circle to the queued
//! points and, once the run is confirmed to lie on one arc traversed at a
//! near-uniform angular step, collapses it into a single G2/G3 command.
//! Total extrusion and exit feed are conserved across the rewrite.

use std::collections::VecDeque;

use gcodetune_core::{round_to, FilterAction, Line, LineFilter, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::geometry::{
    arc_length, chord_length, fit_circle, normalize_angle, phase_steps, radial_errors, Circle,
    Direction, Point,
};

/// Tuning parameters for arc detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcOptimizerConfig {
    /// Minimum queued moves before a circle fit is attempted
    pub min_segments: usize,
    /// Largest plausible printed arc radius in mm; a larger fit indicates
    /// near-collinear points
    pub max_radius: f64,
    /// Maximum distance of any point from the fitted circumference, mm
    pub alignment_error: f64,
    /// Maximum deviation of any angular step from the mean step, degrees
    pub phase_error: f64,
    /// Maximum relative deviation of a segment's extrusion/length ratio
    /// from the run average
    pub extrusion_error: f64,
    /// Relative arc-vs-path length deviation beyond which absolute
    /// extrusion gets a G92 bookkeeping reset
    pub extrusion_correction_limit: f64,
    /// Guard for degenerate quantities
    pub epsilon: f64,
}

impl Default for ArcOptimizerConfig {
    fn default() -> Self {
        Self {
            min_segments: 8,
            max_radius: 200.0,
            alignment_error: 0.015,
            phase_error: 5.0,
            extrusion_error: 0.15,
            extrusion_correction_limit: 0.01,
            epsilon: 1e-9,
        }
    }
}

/// Per-segment extrusion and path-length profile of the queued run
struct ExtrusionProfile {
    /// Extruded filament per segment, relative amounts
    filament: Vec<f64>,
    /// XY path length per segment
    path: Vec<f64>,
    /// filament/path ratio per segment
    ratio: Vec<f64>,
    total_filament: f64,
    total_path: f64,
    average_ratio: f64,
}

/// Filter replacing runs of linear moves with G2/G3 arcs
pub struct ArcOptimizer {
    config: ArcOptimizerConfig,
    queue: VecDeque<Line>,
    confirmed: bool,
}

impl ArcOptimizer {
    /// Create an optimizer with default tuning
    pub fn new() -> Self {
        Self::with_config(ArcOptimizerConfig::default())
    }

    /// Create an optimizer with explicit tuning.
    ///
    /// A window of fewer than two moves can never seat a circle;
    /// `min_segments` below that is raised to 2.
    pub fn with_config(mut config: ArcOptimizerConfig) -> Self {
        if config.min_segments < 2 {
            warn!(
                min_segments = config.min_segments,
                "min_segments too small for a circle window, using 2"
            );
            config.min_segments = 2;
        }
        Self {
            config,
            queue: VecDeque::new(),
            confirmed: false,
        }
    }

    fn drain_queue(&mut self) -> Vec<Line> {
        self.queue.drain(..).collect()
    }

    /// XY positions of every queued line, `None` if any is unresolved
    fn queued_points(&self) -> Option<Vec<Point>> {
        self.queue
            .iter()
            .map(|line| line.xy().map(|(x, y)| Point::new(x, y)))
            .collect()
    }

    /// Fit and vet a circle over the current queue
    fn fit_queue(&self) -> Option<Circle> {
        let points = self.queued_points()?;
        let (center, radius) = fit_circle(&points, self.config.epsilon)?;

        if radius > self.config.max_radius {
            return None;
        }
        if radial_errors(&points, &center, radius)
            .iter()
            .any(|err| *err > self.config.alignment_error)
        {
            return None;
        }

        let steps = phase_steps(&points, &center);
        let mean = steps.iter().sum::<f64>() / steps.len() as f64;
        let tolerance = self.config.phase_error.to_radians();
        if steps.iter().any(|step| (step - mean).abs() > tolerance) {
            return None;
        }

        // winding from the circular difference between the 3rd and 1st
        // point phases relative to the center
        let turn = normalize_angle(points[2].phase_from(&center) - points[0].phase_from(&center));
        let direction = if turn > 0.0 {
            Direction::CounterClockwise
        } else {
            Direction::Clockwise
        };

        Some(Circle {
            radius,
            center,
            direction,
            start: points[0],
            end: points[points.len() - 1],
        })
    }

    /// Per-segment extrusion profile over the queued run
    fn extrusion_profile(&self) -> Option<ExtrusionProfile> {
        let mut filament = Vec::new();
        let mut path = Vec::new();
        let mut ratio = Vec::new();
        let mut total_filament = 0.0;
        let mut total_path = 0.0;

        let mut prev: Option<&Line> = None;
        for line in &self.queue {
            if let Some(previous) = prev {
                let (x0, y0) = previous.xy()?;
                let (x1, y1) = line.xy()?;
                let length = (x1 - x0).hypot(y1 - y0);
                let extruded = if line.relative_e {
                    line.e?
                } else {
                    line.e? - previous.current_e.unwrap_or(0.0)
                };
                if length < self.config.epsilon {
                    return None;
                }
                filament.push(extruded);
                path.push(length);
                ratio.push(extruded / length);
                total_filament += extruded;
                total_path += length;
            }
            prev = Some(line);
        }

        if path.is_empty() || total_path < self.config.epsilon {
            return None;
        }
        let average_ratio = total_filament / total_path;
        Some(ExtrusionProfile {
            filament,
            path,
            ratio,
            total_filament,
            total_path,
            average_ratio,
        })
    }

    /// Check whether the whole queue is currently a valid circle candidate
    fn queue_valid(&self) -> bool {
        // index 0 is the move onto the start point, judge from index 1
        let probe = &self.queue[1];
        let mut all_extrude = probe.e.is_some();
        let mut all_feed = probe.f.is_some();
        for line in self.queue.iter().skip(1) {
            all_extrude &= line.f.is_none() && line.e.is_some();
            all_feed &= line.e.is_none() && line.f.is_some();
            if line.current_z != probe.current_z {
                return false;
            }
        }
        if !(all_extrude || all_feed) {
            return false;
        }

        if all_extrude {
            let Some(profile) = self.extrusion_profile() else {
                return false;
            };
            if profile.average_ratio.abs() < self.config.epsilon {
                return false;
            }
            let consistent = profile
                .ratio
                .iter()
                .all(|r| (r / profile.average_ratio - 1.0).abs() < self.config.extrusion_error);
            if !consistent {
                return false;
            }
        }

        self.fit_queue().is_some()
    }

    /// Collapse the queue into `[first, G2/G3, (G92)]`, detaching the
    /// newest element for the caller to re-seed or emit.
    ///
    /// Returns `None` when the remaining window no longer fits a circle;
    /// callers fall back to a verbatim flush.
    fn synthesize(&mut self) -> Option<(Vec<Line>, Line)> {
        let last = self.queue.pop_back()?;
        let first = self.queue.front()?.clone();
        let circle = self.fit_queue()?;
        let profile = self.extrusion_profile();
        let segments = self.queue.len() - 1;

        let points = self.queued_points()?;
        let steps = phase_steps(&points, &circle.center);
        let total_angle: f64 = steps.iter().map(|s| s.abs()).sum();

        let exit = self.queue.back()?;
        let relative_e = self.queue.get(1).map(|l| l.relative_e).unwrap_or(false);

        let mut arc = Line {
            command: Some(
                match circle.direction {
                    Direction::CounterClockwise => "G3",
                    Direction::Clockwise => "G2",
                }
                .to_string(),
            ),
            x: Some(round_to(circle.end.x, 3)),
            y: Some(round_to(circle.end.y, 3)),
            i: Some(round_to(circle.center.x - circle.start.x, 3)),
            j: Some(round_to(circle.center.y - circle.start.y, 3)),
            f: exit.current_f,
            comment: Some(format!("; generated from {} segments", segments)),
            current_x: Some(circle.end.x),
            current_y: Some(circle.end.y),
            current_z: exit.current_z,
            current_e: exit.current_e,
            current_f: exit.current_f,
            relative_e,
            ..Line::default()
        };

        let mut bookkeeping: Option<Line> = None;
        if let Some(profile) = &profile {
            if relative_e {
                // redistribute each straight-chord amount into its
                // arc-proportional form
                let redistributed: f64 = profile
                    .filament
                    .iter()
                    .zip(steps.iter())
                    .map(|(extruded, step)| {
                        let arc = arc_length(circle.radius, *step);
                        if arc < self.config.epsilon {
                            *extruded
                        } else {
                            extruded * chord_length(circle.radius, *step) / arc
                        }
                    })
                    .sum();
                arc.e = Some(redistributed);
            } else {
                let start_e = first.current_e.unwrap_or(0.0);
                let synthesized_length = total_angle * circle.radius;
                arc.e = Some(start_e + synthesized_length * profile.average_ratio);

                // absolute extrusion drifts when the arc and the original
                // polyline differ in length; reset the position past the limit
                let deviation = synthesized_length / profile.total_path - 1.0;
                if deviation.abs() > self.config.extrusion_correction_limit {
                    if let Some(final_e) = exit.current_e {
                        let mut reset = Line {
                            command: Some("G92".to_string()),
                            e: Some(final_e),
                            current_x: arc.current_x,
                            current_y: arc.current_y,
                            current_z: arc.current_z,
                            current_e: Some(final_e),
                            current_f: arc.current_f,
                            ..Line::default()
                        };
                        reset.rebuild();
                        bookkeeping = Some(reset);
                    }
                }
            }
        }

        arc.rebuild();
        debug!(
            segments,
            radius = circle.radius,
            command = arc.command.as_deref().unwrap_or(""),
            "consolidated linear run into arc"
        );

        let mut emitted = vec![first, arc];
        emitted.extend(bookkeeping);
        Some((emitted, last))
    }
}

impl Default for ArcOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFilter for ArcOptimizer {
    fn name(&self) -> &str {
        "arc-optimizer"
    }

    fn process(&mut self, line: &Line) -> Result<FilterAction> {
        self.queue.push_back(line.clone());

        if self.queue.len() <= self.config.min_segments {
            if line.is_move() {
                return Ok(FilterAction::Replace(vec![]));
            }
            // a non-move resets the window before it ever had a chance
            self.confirmed = false;
            return Ok(FilterAction::Replace(self.drain_queue()));
        }

        if !line.is_move() {
            // structural break (tool change, fan, comment, ...)
            if self.confirmed {
                self.confirmed = false;
                if let Some((mut emitted, breaker)) = self.synthesize() {
                    emitted.push(breaker);
                    self.queue.clear();
                    return Ok(FilterAction::Replace(emitted));
                }
            }
            self.confirmed = false;
            return Ok(FilterAction::Replace(self.drain_queue()));
        }

        if self.queue_valid() {
            self.confirmed = true;
            return Ok(FilterAction::Replace(vec![]));
        }

        if self.confirmed {
            // the newest move broke the circle: consolidate everything
            // before it and re-seed the window with that move
            self.confirmed = false;
            if let Some((emitted, reseed)) = self.synthesize() {
                self.queue.clear();
                self.queue.push_back(reseed);
                return Ok(FilterAction::Replace(emitted));
            }
            return Ok(FilterAction::Replace(self.drain_queue()));
        }

        // no circle in sight: slide the window by one
        let oldest = self.queue.pop_front();
        Ok(FilterAction::Replace(oldest.into_iter().collect()))
    }

    fn finish(&mut self) -> Vec<Line> {
        if self.confirmed && self.queue.len() > self.config.min_segments {
            if let Some((mut emitted, tail)) = self.synthesize() {
                emitted.push(tail);
                self.queue.clear();
                self.confirmed = false;
                return emitted;
            }
        }
        self.confirmed = false;
        self.drain_queue()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodetune_core::{apply_line_filter, Document};
    use std::f64::consts::PI;

    fn run(text: &str) -> Document {
        let mut doc = Document::parse(text).unwrap();
        let mut filter = ArcOptimizer::new();
        apply_line_filter(&mut doc, &mut filter).unwrap();
        doc
    }

    /// Program tracing `n` chords of a circle with consistent extrusion
    fn circle_program(cx: f64, cy: f64, r: f64, n: usize, ccw: bool) -> String {
        let mut out = String::from("M83\nG1 Z0.2 F1200\n");
        let sign = if ccw { 1.0 } else { -1.0 };
        let mut previous = Point::new(cx + r, cy);
        out.push_str(&format!("G1 X{:.4} Y{:.4}\n", previous.x, previous.y));
        for k in 1..=n {
            let theta = sign * 2.0 * PI * (k as f64) / (n as f64);
            let p = Point::new(cx + r * theta.cos(), cy + r * theta.sin());
            let e = previous.distance_to(&p) * 0.05;
            out.push_str(&format!("G1 X{:.4} Y{:.4} E{:.5}\n", p.x, p.y, e));
            previous = p;
        }
        out
    }

    #[test]
    fn test_short_run_passes_through_verbatim() {
        let text = "M107\nG1 X1 Y1\nG1 X2 Y1\nG1 X3 Y2\nM106\n";
        let doc = run(text);
        assert_eq!(doc.render(), text);
    }

    #[test]
    fn test_tiny_min_segments_does_not_panic() {
        let text = "G1 X0 Y0\nG1 X1 Y1\nG1 X2 Y2\n";
        let mut doc = Document::parse(text).unwrap();
        let config = ArcOptimizerConfig {
            min_segments: 0,
            ..ArcOptimizerConfig::default()
        };
        let mut filter = ArcOptimizer::with_config(config);
        apply_line_filter(&mut doc, &mut filter).unwrap();
        assert_eq!(doc.render(), text);
    }

    #[test]
    fn test_full_circle_collapses_to_single_arc() {
        let doc = run(&circle_program(20.0, 20.0, 10.0, 16, true));
        let arcs: Vec<_> = doc
            .lines()
            .filter(|l| matches!(l.command_code(), Some(('G', 2 | 3))))
            .collect();
        assert_eq!(arcs.len(), 1);
        let arc = arcs[0];
        assert_eq!(arc.command.as_deref(), Some("G3"));
        // I/J point from the arc start (20+r, 20) back to the center
        let i = arc.i.unwrap();
        let j = arc.j.unwrap();
        assert!((i.hypot(j) - 10.0).abs() < 0.015);
    }

    #[test]
    fn test_clockwise_circle_yields_g2() {
        let doc = run(&circle_program(20.0, 20.0, 10.0, 16, false));
        let arcs: Vec<_> = doc
            .lines()
            .filter(|l| matches!(l.command_code(), Some(('G', 2 | 3))))
            .collect();
        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].command.as_deref(), Some("G2"));
    }

    #[test]
    fn test_perturbed_point_blocks_single_span() {
        let mut text = circle_program(20.0, 20.0, 10.0, 16, true);
        // push one interior vertex well outside the alignment tolerance
        text = text.replace("G1 X10.0000 Y20.0000", "G1 X9.9000 Y20.0000");
        let doc = run(&text);
        let spanning = doc
            .lines()
            .filter(|l| matches!(l.command_code(), Some(('G', 2 | 3))))
            .count();
        // no single arc may span the perturbed vertex; smaller partial
        // arcs on either side are acceptable
        for line in doc.lines() {
            if matches!(line.command_code(), Some(('G', 2 | 3))) {
                assert!(line.comment.as_deref().unwrap_or("").contains("generated"));
            }
        }
        assert!(spanning <= 2);
        // the perturbed vertex itself must survive somewhere in the output
        assert!(doc.lines().any(|l| l.raw.contains("X9.9")));
    }

    #[test]
    fn test_relative_extrusion_is_conserved() {
        let text = circle_program(20.0, 20.0, 10.0, 16, true);
        let original: f64 = Document::parse(&text)
            .unwrap()
            .lines()
            .filter_map(|l| l.e)
            .sum();
        let doc = run(&text);
        let rewritten: f64 = doc.lines().filter_map(|l| l.e).sum();
        // chord amounts are scaled by chord/arc length, so the arc
        // extrudes slightly less than the sum of the chords it replaced;
        // the detached tail segment keeps its own E
        let tail: f64 = doc
            .lines()
            .filter(|l| matches!(l.command_code(), Some(('G', 1))))
            .filter_map(|l| l.e)
            .sum();
        let arc_e = rewritten - tail;
        let consumed = original - tail;
        // arc/chord ratio for a 16-gon is within 1%, and the redistribution
        // conserves the per-segment amounts up to that ratio
        assert!((arc_e - consumed).abs() / consumed < 0.01);
    }

    #[test]
    fn test_fine_polygon_conserves_extrusion_tightly() {
        // at 300 segments the chord/arc correction is below 1e-4 overall
        let text = circle_program(20.0, 20.0, 10.0, 300, true);
        let original: f64 = Document::parse(&text)
            .unwrap()
            .lines()
            .filter_map(|l| l.e)
            .sum();
        let doc = run(&text);
        let rewritten: f64 = doc.lines().filter_map(|l| l.e).sum();
        let tail: f64 = doc
            .lines()
            .filter(|l| matches!(l.command_code(), Some(('G', 1))))
            .filter_map(|l| l.e)
            .sum();
        assert!(((rewritten - tail) - (original - tail)).abs() < 1e-4);
    }

    #[test]
    fn test_non_move_break_emits_arc_then_breaker() {
        let mut text = circle_program(20.0, 20.0, 10.0, 16, true);
        text.push_str("M107\n");
        let doc = run(&text);
        let raws: Vec<&str> = doc.lines().map(|l| l.raw.as_str()).collect();
        let arc_idx = raws.iter().position(|r| r.starts_with("G3")).unwrap();
        let breaker_idx = raws.iter().position(|r| *r == "M107").unwrap();
        assert!(breaker_idx > arc_idx);
    }

    #[test]
    fn test_every_line_emitted_exactly_once_on_noisy_input() {
        // random-ish walk, nothing arc-like: output must equal input
        let mut text = String::from("G1 Z0.2 F900\n");
        let coords = [
            (0.0, 0.0),
            (5.0, 1.0),
            (6.0, 7.0),
            (2.0, 9.0),
            (8.0, 14.0),
            (1.0, 15.0),
            (3.0, 22.0),
            (9.0, 23.0),
            (4.0, 30.0),
            (10.0, 31.0),
            (5.0, 38.0),
            (11.0, 39.0),
        ];
        for (x, y) in coords {
            text.push_str(&format!("G1 X{} Y{}\n", x, y));
        }
        let doc = run(&text);
        assert_eq!(doc.render(), text);
    }

    #[test]
    fn test_feed_change_inside_run_rejects_circle() {
        let mut text = circle_program(20.0, 20.0, 10.0, 16, true);
        // an extruding run must not carry explicit feed changes
        text = text.replace("G1 X10.0000 Y20.0000", "G1 F2400 X10.0000 Y20.0000");
        let doc = run(&text);
        let spanning = doc
            .lines()
            .filter(|l| matches!(l.command_code(), Some(('G', 2 | 3))))
            .count();
        assert!(spanning <= 2);
    }
}
