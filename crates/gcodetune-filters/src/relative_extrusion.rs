//! Absolute to relative extrusion conversion
//!
//! Rewrites cumulative filament positions into per-move amounts. M82 is
//! replaced by M83 so the output declares the mode it actually uses; G92
//! E redefinitions only adjust the running tracker and pass through.

use gcodetune_core::{FilterAction, Line, LineFilter, Result, GCODE_RELATIVE_EXTRUSION};

/// Filter converting a program to relative extrusion
pub struct RelativeExtrusionFilter {
    /// Whether the source program is already in relative mode
    source_relative: bool,
    /// Cumulative filament position of the source program
    current_e: f64,
}

impl RelativeExtrusionFilter {
    pub fn new() -> Self {
        Self {
            source_relative: false,
            current_e: 0.0,
        }
    }
}

impl Default for RelativeExtrusionFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFilter for RelativeExtrusionFilter {
    fn name(&self) -> &str {
        "relative-extrusion"
    }

    fn process(&mut self, line: &Line) -> Result<FilterAction> {
        match line.command_code() {
            Some(('M', 83)) => {
                self.source_relative = true;
                return Ok(FilterAction::Unchanged);
            }
            Some(('M', 82)) => {
                self.source_relative = false;
                return Ok(FilterAction::Replace(vec![Line::from_raw(
                    GCODE_RELATIVE_EXTRUSION,
                )]));
            }
            Some(('G', 92)) => {
                if let Some(e) = line.e {
                    self.current_e = e;
                } else if line.x.is_none() && line.y.is_none() && line.z.is_none() {
                    self.current_e = 0.0;
                }
                return Ok(FilterAction::Unchanged);
            }
            _ => {}
        }

        if line.is_move() && !self.source_relative {
            if let Some(e) = line.e {
                let mut patched = line.clone();
                patched.e = Some(e - self.current_e);
                patched.relative_e = true;
                patched.rebuild();
                self.current_e = e;
                return Ok(FilterAction::Replace(vec![patched]));
            }
        }
        Ok(FilterAction::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodetune_core::{apply_line_filter, Document};

    fn convert(text: &str) -> String {
        let mut doc = Document::parse(text).unwrap();
        let mut filter = RelativeExtrusionFilter::new();
        apply_line_filter(&mut doc, &mut filter).unwrap();
        doc.render()
    }

    #[test]
    fn test_cumulative_positions_become_amounts() {
        let out = convert("M82\nG1 X1 E2\nG1 X2 E5\nG1 X3 E5.5\n");
        assert_eq!(out, "M83\nG1 X1 E2\nG1 X2 E3\nG1 X3 E0.5\n");
    }

    #[test]
    fn test_g92_resets_the_tracker() {
        let out = convert("G1 X1 E5\nG92 E0\nG1 X2 E2\n");
        assert_eq!(out, "G1 X1 E5\nG92 E0\nG1 X2 E2\n");
    }

    #[test]
    fn test_bare_g92_zeroes_the_tracker() {
        let out = convert("G1 X1 E5\nG92\nG1 X2 E2\n");
        assert_eq!(out, "G1 X1 E5\nG92\nG1 X2 E2\n");
    }

    #[test]
    fn test_already_relative_program_untouched() {
        let out = convert("M83\nG1 X1 E0.5\nG1 X2 E0.5\n");
        assert_eq!(out, "M83\nG1 X1 E0.5\nG1 X2 E0.5\n");
    }

    #[test]
    fn test_moves_without_extrusion_untouched() {
        let out = convert("G1 X1 E2\nG0 X5\nG1 X6 E3\n");
        assert_eq!(out, "G1 X1 E2\nG0 X5\nG1 X6 E1\n");
    }
}
