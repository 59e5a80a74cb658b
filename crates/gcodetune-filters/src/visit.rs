//! Layer walking
//!
//! A read-only walk over a document that tells visitors which layers are
//! actually printed (bound to a real Z step) versus merely parsed
//! (preamble, homing). Visitors can ask for lines to be prepended to a
//! layer; prepends are applied after the walk so indices stay stable.

use gcodetune_core::{Document, Layer, Line};
use tracing::debug;

/// Opcode inserted to pause the print
pub const PAUSE_COMMAND: &str = "M226";

/// Position of the walk when a visitor callback fires
#[derive(Debug, Clone, Copy)]
pub struct LayerInfo {
    /// Rank of this layer's Z among all printed heights
    pub layer_number: usize,
    /// Index of the layer in the document
    pub layer_index: usize,
    /// Number of lines walked so far
    pub line_number: usize,
    /// Whether the layer is bound to a printed Z step
    pub is_printed: bool,
}

/// Read-only visitor over layers and lines
pub trait LayerVisitor {
    fn will_visit_layer(&mut self, _layer: &Layer, _info: &LayerInfo) {}

    fn visit_line(&mut self, _line: &Line, _info: &LayerInfo) {}

    /// Called after a layer has been walked; returned lines are prepended
    /// to that layer once the walk completes
    fn did_visit_layer(&mut self, _layer: &Layer, _info: &LayerInfo) -> Vec<Line> {
        Vec::new()
    }
}

/// Walk every layer and line of a document with `visitor`.
///
/// `decimals` controls how layer heights are rounded before being ranked,
/// so numerically noisy Z values collapse onto one printed layer.
pub fn walk_layers(doc: &mut Document, visitor: &mut dyn LayerVisitor, decimals: u32) {
    let printed_zs = doc.sorted_zs(decimals);
    let mut line_number = 0usize;
    let mut prepends: Vec<(usize, Vec<Line>)> = Vec::new();

    for (layer_index, layer) in doc.layers().iter().enumerate() {
        let rank = layer
            .z()
            .map(|z| gcodetune_core::round_to(z, decimals))
            .and_then(|z| printed_zs.iter().position(|candidate| *candidate == z));
        let (layer_number, is_printed) = match rank {
            Some(number) => (number, true),
            None => (layer_index, false),
        };
        debug!(layer_index, layer_number, is_printed, "visiting layer");

        let info = LayerInfo {
            layer_number,
            layer_index,
            line_number,
            is_printed,
        };
        visitor.will_visit_layer(layer, &info);

        for line in layer.lines() {
            let info = LayerInfo {
                layer_number,
                layer_index,
                line_number,
                is_printed,
            };
            visitor.visit_line(line, &info);
            line_number += 1;
        }

        let info = LayerInfo {
            layer_number,
            layer_index,
            line_number: line_number.saturating_sub(1),
            is_printed,
        };
        let lines = visitor.did_visit_layer(layer, &info);
        if !lines.is_empty() {
            prepends.push((layer_index, lines));
        }
    }

    for (layer_index, lines) in prepends {
        doc.prepend_to_layer(lines, layer_index);
    }
}

/// Inserts a pause command at the start of each requested printed layer
pub struct PauseAtLayer {
    pause_layers: Vec<usize>,
}

impl PauseAtLayer {
    pub fn new(pause_layers: Vec<usize>) -> Self {
        Self { pause_layers }
    }
}

impl LayerVisitor for PauseAtLayer {
    fn did_visit_layer(&mut self, _layer: &Layer, info: &LayerInfo) -> Vec<Line> {
        if info.is_printed && self.pause_layers.contains(&info.layer_number) {
            vec![Line::from_raw(PAUSE_COMMAND)]
        } else {
            Vec::new()
        }
    }
}
