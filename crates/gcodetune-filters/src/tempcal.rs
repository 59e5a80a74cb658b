//! Temperature gradient injection
//!
//! Turns a sliced calibration object into an unattended temperature test:
//! each layer above a minimum height gets an M104 target interpolated
//! between a start and an end temperature. Targets outside the safety
//! bounds are skipped, and a target equal to the previous one is not
//! repeated (vase mode would otherwise emit one per layer).

use gcodetune_core::{round_to, Document, DocumentFilter, Line, Result as CoreResult};
use tracing::{debug, info};

use crate::error::{FilterError, Result};

/// Safety bounds for injected targets, °C
pub const ABSOLUTE_MIN_TEMPERATURE: f64 = 150.0;
pub const ABSOLUTE_MAX_TEMPERATURE: f64 = 250.0;

/// How the temperature varies along Z
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientMode {
    /// Recompute the target for every layer; needs a fast, precise hotend
    Continuous,
    /// Hold the target over bands of equal height, this many bands
    Steps(u32),
}

/// Whole-document filter injecting a temperature gradient along Z
pub struct TempGradient {
    start_temp: f64,
    end_temp: f64,
    min_z_change: f64,
    mode: GradientMode,
}

impl TempGradient {
    pub fn new(start_temp: f64, end_temp: f64, min_z_change: f64, mode: GradientMode) -> Self {
        Self {
            start_temp,
            end_temp,
            min_z_change,
            mode,
        }
    }

    /// Target temperature at `z`, given the gradient bounds
    fn temperature_at(&self, z: f64, zmin: f64, zmax: f64) -> f64 {
        match self.mode {
            GradientMode::Continuous => {
                self.start_temp + (self.end_temp - self.start_temp) / (zmax - zmin) * (z - zmin)
            }
            GradientMode::Steps(steps) => {
                // one extra band so the end temperature is actually reached
                let steps = steps as f64;
                let step_end = self.end_temp + (self.end_temp - self.start_temp) / steps;
                let bands = steps + 1.0;
                let progress = ((z - zmin) / (zmax - zmin) * bands).floor() / bands;
                let target = self.start_temp + progress * (step_end - self.start_temp);
                let ceiling = self.start_temp.max(self.end_temp);
                target.min(ceiling)
            }
        }
    }

    fn inject(&self, doc: &mut Document) -> Result<()> {
        let zmax = doc.zmax().ok_or_else(|| FilterError::GradientImpossible {
            reason: "document carries no layer heights".to_string(),
        })?;

        // lowest layer above the minimum height; the slicer's own first
        // layer temperature is kept below it for adhesion
        let zmin = doc
            .layers()
            .iter()
            .filter_map(|layer| layer.z())
            .filter(|z| *z > self.min_z_change)
            .fold(None, |best: Option<f64>, z| match best {
                Some(b) if b <= z => Some(b),
                _ => Some(z),
            })
            .ok_or_else(|| FilterError::GradientImpossible {
                reason: format!("no layer above {}mm", self.min_z_change),
            })?;

        if zmin >= zmax {
            return Err(FilterError::GradientImpossible {
                reason: format!("all printing happens below {}mm", self.min_z_change),
            });
        }

        info!(
            start_temp = self.start_temp,
            end_temp = self.end_temp,
            zmin,
            zmax,
            "injecting temperature gradient"
        );

        let mut last_target: Option<f64> = None;
        let mut prepends: Vec<(usize, f64)> = Vec::new();
        for (index, layer) in doc.layers().iter().enumerate() {
            let Some(z) = layer.z() else { continue };
            if z < zmin || z > zmax {
                continue;
            }
            let target = round_to(self.temperature_at(z, zmin, zmax), 1);
            if Some(target) == last_target {
                continue;
            }
            last_target = Some(target);
            if !(ABSOLUTE_MIN_TEMPERATURE..=ABSOLUTE_MAX_TEMPERATURE).contains(&target) {
                debug!(target, z, "target outside safety bounds, skipped");
                continue;
            }
            debug!(target, z, layer = index, "layer target");
            prepends.push((index, target));
        }

        for (index, target) in prepends {
            let command = Line::from_raw(&format!("M104 S{:.1}", target));
            doc.prepend_to_layer(vec![command], index);
        }
        Ok(())
    }
}

impl DocumentFilter for TempGradient {
    fn name(&self) -> &str {
        "tempcal"
    }

    fn apply(&mut self, doc: &mut Document) -> CoreResult<()> {
        self.inject(doc).map_err(|e| e.into_core("tempcal"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ten layers from z = 0.2 to 2.0
    fn tower() -> Document {
        let mut text = String::from("G90\nG28\n");
        for step in 1..=10 {
            let z = 0.2 * step as f64;
            text.push_str(&format!("G1 Z{:.1} F3000\nG1 X10 Y10 E1\n", z));
        }
        Document::parse(&text).unwrap()
    }

    fn injected_targets(doc: &Document) -> Vec<String> {
        doc.lines()
            .filter(|l| l.raw.starts_with("M104"))
            .map(|l| l.raw.clone())
            .collect()
    }

    #[test]
    fn test_continuous_gradient_spans_the_range() {
        let mut doc = tower();
        let mut filter = TempGradient::new(220.0, 180.0, 0.1, GradientMode::Continuous);
        filter.apply(&mut doc).unwrap();
        let targets = injected_targets(&doc);
        assert_eq!(targets.first().map(String::as_str), Some("M104 S220.0"));
        assert_eq!(targets.last().map(String::as_str), Some("M104 S180.0"));
        assert_eq!(targets.len(), 10);
    }

    #[test]
    fn test_equal_targets_are_deduplicated() {
        let mut doc = tower();
        // two bands over ten layers: only a couple of changes
        let mut filter = TempGradient::new(220.0, 200.0, 0.1, GradientMode::Steps(2));
        filter.apply(&mut doc).unwrap();
        let targets = injected_targets(&doc);
        assert!(targets.len() < 10, "dedup failed: {targets:?}");
        let mut seen = targets.clone();
        seen.dedup();
        assert_eq!(seen, targets, "adjacent duplicates must not be emitted");
    }

    #[test]
    fn test_targets_outside_safety_bounds_are_skipped() {
        let mut doc = tower();
        let mut filter = TempGradient::new(280.0, 240.0, 0.1, GradientMode::Continuous);
        filter.apply(&mut doc).unwrap();
        for target in injected_targets(&doc) {
            let value: f64 = target.trim_start_matches("M104 S").parse().unwrap();
            assert!((ABSOLUTE_MIN_TEMPERATURE..=ABSOLUTE_MAX_TEMPERATURE).contains(&value));
        }
    }

    #[test]
    fn test_flat_document_is_fatal() {
        let mut doc = Document::parse("G90\nG1 Z0.2 F3000\nG1 X10 Y10 E1\n").unwrap();
        let mut filter = TempGradient::new(220.0, 180.0, 0.1, GradientMode::Continuous);
        assert!(filter.apply(&mut doc).is_err());
    }

    #[test]
    fn test_gradient_direction_can_rise() {
        let mut doc = tower();
        let mut filter = TempGradient::new(180.0, 220.0, 0.1, GradientMode::Continuous);
        filter.apply(&mut doc).unwrap();
        let targets = injected_targets(&doc);
        assert_eq!(targets.first().map(String::as_str), Some("M104 S180.0"));
        assert_eq!(targets.last().map(String::as_str), Some("M104 S220.0"));
    }
}
