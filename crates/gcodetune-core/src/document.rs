//! Document model: ordered layers of G-code lines
//!
//! [`Document::parse`] runs the line codec over a whole program, resolving
//! modal state (position, feed, cumulative extrusion, distance and
//! extrusion modes) across lines and grouping them into layers at Z steps.

use crate::error::{Error, Result};
use crate::line::{round_to, Line};

/// Ordered sequence of lines bound to one Z step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    lines: Vec<Line>,
    /// Printed Z step, recorded from the travel move that opened the layer.
    /// Preamble layers that never see such a move stay unbound.
    z: Option<f64>,
}

impl Layer {
    /// Create a layer from lines
    pub fn new(lines: Vec<Line>) -> Self {
        Self { lines, z: None }
    }

    /// Lines of this layer
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Mutable lines of this layer
    pub fn lines_mut(&mut self) -> &mut Vec<Line> {
        &mut self.lines
    }

    /// Printed Z step of this layer, if it has one
    pub fn z(&self) -> Option<f64> {
        self.z
    }

    /// Whether the layer holds no lines
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines in the layer
    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

/// Modal machine state carried across lines during parsing
#[derive(Debug, Clone, Copy, Default)]
struct ModalState {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    e: Option<f64>,
    f: Option<f64>,
    relative_position: bool,
    relative_extrusion: bool,
}

/// An ordered sequence of layers forming one G-code program
#[derive(Debug, Clone, Default)]
pub struct Document {
    layers: Vec<Layer>,
}

impl Document {
    /// Parse G-code text into a document.
    ///
    /// A new layer starts at a travel move (no extrusion) that establishes
    /// a Z different from the current layer's.
    pub fn parse(text: &str) -> Result<Document> {
        let mut layers: Vec<Layer> = vec![Layer::default()];
        let mut state = ModalState::default();
        let mut layer_z: Option<f64> = None;
        let mut any_line = false;

        for (index, raw) in text.lines().enumerate() {
            let mut line = Line::parse(raw).map_err(|reason| Error::Parse {
                line_number: index + 1,
                reason,
            })?;
            any_line = true;

            apply_modal_state(&mut state, &mut line);

            let establishes_z = line.is_move() && line.z.is_some() && line.e.is_none();
            let starts_new_layer =
                establishes_z && layer_z.is_some() && line.current_z != layer_z;

            if establishes_z {
                layer_z = line.current_z;
            }

            if starts_new_layer && !layers.last().map(Layer::is_empty).unwrap_or(true) {
                layers.push(Layer::default());
            }
            if let Some(last) = layers.last_mut() {
                // the layer's printed Z comes from the travel move that
                // opened it, never from preamble state such as homing
                if establishes_z {
                    last.z = line.current_z;
                }
                last.lines_mut().push(line);
            }
        }

        if !any_line {
            return Err(Error::EmptyDocument);
        }

        Ok(Document { layers })
    }

    /// Serialize the document back to G-code text.
    ///
    /// Lines never touched by a filter reproduce their original text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for layer in &self.layers {
            for line in layer.lines() {
                out.push_str(&line.raw);
                out.push('\n');
            }
        }
        out
    }

    /// Layers of the document
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Mutable layers of the document
    pub fn layers_mut(&mut self) -> &mut Vec<Layer> {
        &mut self.layers
    }

    /// Iterator over every line in document order
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.layers.iter().flat_map(|l| l.lines().iter())
    }

    /// Lowest layer Z in the document
    pub fn zmin(&self) -> Option<f64> {
        self.layers
            .iter()
            .filter_map(Layer::z)
            .fold(None, |acc, z| match acc {
                Some(best) if best <= z => Some(best),
                _ => Some(z),
            })
    }

    /// Highest layer Z in the document
    pub fn zmax(&self) -> Option<f64> {
        self.layers
            .iter()
            .filter_map(Layer::z)
            .fold(None, |acc, z| match acc {
                Some(best) if best >= z => Some(best),
                _ => Some(z),
            })
    }

    /// Sorted, de-duplicated layer Z values rounded to `decimals` places
    pub fn sorted_zs(&self, decimals: u32) -> Vec<f64> {
        let mut zs: Vec<f64> = self
            .layers
            .iter()
            .filter_map(Layer::z)
            .map(|z| round_to(z, decimals))
            .collect();
        zs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        zs.dedup();
        zs
    }

    /// Insert lines at the start of the layer at `index`
    pub fn prepend_to_layer(&mut self, lines: Vec<Line>, index: usize) {
        if let Some(layer) = self.layers.get_mut(index) {
            layer.lines_mut().splice(0..0, lines);
        }
    }

    /// Line-by-line numeric equality within `epsilon` (test oracle)
    pub fn approx_eq(&self, other: &Document, epsilon: f64) -> bool {
        let mut ours = self.lines();
        let mut theirs = other.lines();
        loop {
            match (ours.next(), theirs.next()) {
                (Some(a), Some(b)) => {
                    if !a.approx_eq(b, epsilon) {
                        return false;
                    }
                }
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

/// Resolve one line's carried modal fields and update the running state
fn apply_modal_state(state: &mut ModalState, line: &mut Line) {
    match line.command_code() {
        Some(('G', 90)) => {
            state.relative_position = false;
            state.relative_extrusion = false;
        }
        Some(('G', 91)) => {
            state.relative_position = true;
            state.relative_extrusion = true;
        }
        Some(('M', 82)) => state.relative_extrusion = false,
        Some(('M', 83)) => state.relative_extrusion = true,
        Some(('G', 92)) => {
            if line.x.is_none() && line.y.is_none() && line.z.is_none() && line.e.is_none() {
                // bare G92 resets every axis
                state.x = Some(0.0);
                state.y = Some(0.0);
                state.z = Some(0.0);
                state.e = Some(0.0);
            } else {
                if let Some(x) = line.x {
                    state.x = Some(x);
                }
                if let Some(y) = line.y {
                    state.y = Some(y);
                }
                if let Some(z) = line.z {
                    state.z = Some(z);
                }
                if let Some(e) = line.e {
                    state.e = Some(e);
                }
            }
        }
        Some(('G', 28)) => {
            if line.x.is_none() && line.y.is_none() && line.z.is_none() {
                state.x = Some(0.0);
                state.y = Some(0.0);
                state.z = Some(0.0);
            } else {
                if line.x.is_some() {
                    state.x = Some(0.0);
                }
                if line.y.is_some() {
                    state.y = Some(0.0);
                }
                if line.z.is_some() {
                    state.z = Some(0.0);
                }
            }
        }
        Some(('G', 0..=3)) => {
            if let Some(x) = line.x {
                state.x = Some(if state.relative_position {
                    state.x.unwrap_or(0.0) + x
                } else {
                    x
                });
            }
            if let Some(y) = line.y {
                state.y = Some(if state.relative_position {
                    state.y.unwrap_or(0.0) + y
                } else {
                    y
                });
            }
            if let Some(z) = line.z {
                state.z = Some(if state.relative_position {
                    state.z.unwrap_or(0.0) + z
                } else {
                    z
                });
            }
            if let Some(e) = line.e {
                state.e = Some(if state.relative_extrusion {
                    state.e.unwrap_or(0.0) + e
                } else {
                    e
                });
            }
        }
        _ => {}
    }

    if let Some(f) = line.f {
        state.f = Some(f);
    }

    line.current_x = state.x;
    line.current_y = state.y;
    line.current_z = state.z;
    line.current_e = state.e;
    line.current_f = state.f;
    line.relative_e = state.relative_extrusion;
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_PROGRAM: &str = "\
G90
G28
G1 Z0.2 F300
G1 X10 Y0 E1 F1200
G1 X10 Y10 E2
G1 Z0.4
G1 X0 Y10 E3
";

    #[test]
    fn test_layer_split_on_z_change() {
        let doc = Document::parse(SMALL_PROGRAM).unwrap();
        assert_eq!(doc.layers().len(), 2);
        assert_eq!(doc.layers()[0].z(), Some(0.2));
        assert_eq!(doc.layers()[1].z(), Some(0.4));
    }

    #[test]
    fn test_modal_carry() {
        let doc = Document::parse(SMALL_PROGRAM).unwrap();
        let lines: Vec<&Line> = doc.lines().collect();
        // "G1 X10 Y10 E2" carries Z from the preceding layer move
        assert_eq!(lines[4].current_z, Some(0.2));
        assert_eq!(lines[4].current_x, Some(10.0));
        assert_eq!(lines[4].current_f, Some(1200.0));
        assert_eq!(lines[4].current_e, Some(2.0));
    }

    #[test]
    fn test_relative_extrusion_flag() {
        let doc = Document::parse("M83\nG1 X1 E0.5\nG1 X2 E0.5\n").unwrap();
        let lines: Vec<&Line> = doc.lines().collect();
        assert!(lines[1].relative_e);
        assert_eq!(lines[2].current_e, Some(1.0));
    }

    #[test]
    fn test_g92_resets_extrusion() {
        let doc = Document::parse("G1 X1 E5\nG92 E0\nG1 X2 E1\n").unwrap();
        let lines: Vec<&Line> = doc.lines().collect();
        assert_eq!(lines[1].current_e, Some(0.0));
        assert_eq!(lines[2].current_e, Some(1.0));
    }

    #[test]
    fn test_render_is_identity_for_untouched_lines() {
        let doc = Document::parse(SMALL_PROGRAM).unwrap();
        assert_eq!(doc.render(), SMALL_PROGRAM);
    }

    #[test]
    fn test_z_bounds() {
        let doc = Document::parse(SMALL_PROGRAM).unwrap();
        assert_eq!(doc.zmin(), Some(0.2));
        assert_eq!(doc.zmax(), Some(0.4));
    }

    #[test]
    fn test_homing_does_not_bind_layer_z() {
        // G28 resolves Z to 0 but the layer is bound to its printed step
        let doc = Document::parse("G90\nG28\nG1 Z0.2 F300\nG1 X10 Y0 E1\n").unwrap();
        assert_eq!(doc.layers().len(), 1);
        assert_eq!(doc.layers()[0].z(), Some(0.2));
        assert_eq!(doc.zmin(), Some(0.2));
        assert_eq!(doc.sorted_zs(2), vec![0.2]);
    }

    #[test]
    fn test_empty_document_is_error() {
        assert!(matches!(Document::parse(""), Err(Error::EmptyDocument)));
    }

    #[test]
    fn test_program_markers_pass_through() {
        let doc = Document::parse("%\nG1 X1 Y1\n%\n").unwrap();
        assert_eq!(doc.render(), "%\nG1 X1 Y1\n%\n");
    }
}
