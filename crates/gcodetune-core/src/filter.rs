//! Filter pipeline
//!
//! Filters transform a document one line at a time. A filter is invoked
//! once per line in document order and answers with an explicit tagged
//! result: keep the line as-is, or splice zero, one or many replacement
//! lines in its place. The driver only rebuilds a layer when at least one
//! call asked for a replacement.

use crate::document::Document;
use crate::error::Result;
use crate::line::Line;

/// Outcome of processing one line
#[derive(Debug, Clone)]
pub enum FilterAction {
    /// Keep the input line untouched
    Unchanged,
    /// Splice these lines in place of the input line (may be empty)
    Replace(Vec<Line>),
}

/// A streaming per-line transform over a document
///
/// Implementations may buffer lines across calls; [`LineFilter::finish`] is
/// invoked after the last line of the document so any buffered tail can be
/// drained. Every input line must be emitted exactly once over the whole
/// run, either verbatim or folded into a synthesized replacement.
pub trait LineFilter {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Process a single line
    fn process(&mut self, line: &Line) -> Result<FilterAction>;

    /// Drain any buffered lines once the document is exhausted
    fn finish(&mut self) -> Vec<Line> {
        Vec::new()
    }
}

/// A whole-document transform
///
/// Used by algorithms that need more than a single forward pass (the
/// stretch engine, temperature gradients).
pub trait DocumentFilter {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Transform the document in place
    fn apply(&mut self, doc: &mut Document) -> Result<()>;
}

/// Drive a [`LineFilter`] across every layer of a document.
///
/// Replacement lines are spliced in place of their input line; a layer is
/// only rebuilt when something changed. The filter's tail is appended to
/// the last layer.
pub fn apply_line_filter<F: LineFilter>(doc: &mut Document, filter: &mut F) -> Result<()> {
    for layer in doc.layers_mut().iter_mut() {
        let mut dirty = false;
        let mut rebuilt: Vec<Line> = Vec::with_capacity(layer.len());

        for line in layer.lines() {
            match filter.process(line)? {
                FilterAction::Unchanged => rebuilt.push(line.clone()),
                FilterAction::Replace(lines) => {
                    dirty = true;
                    rebuilt.extend(lines);
                }
            }
        }

        if dirty {
            *layer.lines_mut() = rebuilt;
        }
    }

    let tail = filter.finish();
    if !tail.is_empty() {
        if let Some(last) = doc.layers_mut().last_mut() {
            last.lines_mut().extend(tail);
        }
    }

    Ok(())
}

impl<F: LineFilter> DocumentFilter for F {
    fn name(&self) -> &str {
        LineFilter::name(self)
    }

    fn apply(&mut self, doc: &mut Document) -> Result<()> {
        apply_line_filter(doc, self)
    }
}
