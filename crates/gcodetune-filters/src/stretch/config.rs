//! Stretch tuning
//!
//! All distances are expressed as ratios over the slicer's edge width, so
//! one set of defaults works across nozzle sizes. [`StretchProfile`]
//! resolves the ratios into absolute millimeter distances once the edge
//! width is known.

use serde::{Deserialize, Serialize};

use super::tags::SegmentKind;

/// Edge width assumed when the program carries no slicer metadata, mm
pub const DEFAULT_EDGE_WIDTH: f64 = 0.4;

/// User-facing stretch parameters, all ratios over the edge width
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StretchConfig {
    /// Distance within which nearby contour points damp lateral stretch
    pub cross_limit_distance_over_edge_width: f64,
    /// Maximum stretch for generic closed loops (extra shells)
    pub loop_stretch_over_edge_width: f64,
    /// Maximum stretch for inner perimeters; the dominant hole-size knob
    pub edge_inside_stretch_over_edge_width: f64,
    /// Maximum stretch for outer perimeters
    pub edge_outside_stretch_over_edge_width: f64,
    /// Maximum stretch for open paths such as infill
    pub path_stretch_over_edge_width: f64,
    /// Contour distance at which the local thread direction is sampled
    pub stretch_from_distance_over_edge_width: f64,
    /// Global multiplier applied to every per-kind maximum
    pub stretch_strength: f64,
    /// Scale extrusion of a displaced move by (1 − |relative stretch|)
    pub attenuate_extrusion: bool,
}

impl Default for StretchConfig {
    fn default() -> Self {
        Self {
            cross_limit_distance_over_edge_width: 5.0,
            loop_stretch_over_edge_width: 0.11,
            edge_inside_stretch_over_edge_width: 0.32,
            edge_outside_stretch_over_edge_width: 0.1,
            path_stretch_over_edge_width: 0.0,
            stretch_from_distance_over_edge_width: 2.0,
            stretch_strength: 1.0,
            attenuate_extrusion: false,
        }
    }
}

/// Absolute distances derived from a [`StretchConfig`] and an edge width
#[derive(Debug, Clone)]
pub struct StretchProfile {
    pub edge_width: f64,
    pub cross_limit_distance: f64,
    pub cross_limit_fraction: f64,
    pub cross_limit_remainder: f64,
    pub stretch_from_distance: f64,
    pub loop_max_stretch: f64,
    pub inner_edge_max_stretch: f64,
    pub outer_edge_max_stretch: f64,
    pub path_max_stretch: f64,
    pub attenuate_extrusion: bool,
}

impl StretchProfile {
    pub fn new(config: &StretchConfig, edge_width: f64) -> Self {
        let cross_limit_distance = edge_width * config.cross_limit_distance_over_edge_width;
        let cross_limit_fraction = cross_limit_distance / 3.0;
        let strength = config.stretch_strength;
        Self {
            edge_width,
            cross_limit_distance,
            cross_limit_fraction,
            cross_limit_remainder: cross_limit_distance - cross_limit_fraction,
            stretch_from_distance: edge_width * config.stretch_from_distance_over_edge_width,
            loop_max_stretch: edge_width * config.loop_stretch_over_edge_width * strength,
            inner_edge_max_stretch: edge_width
                * config.edge_inside_stretch_over_edge_width
                * strength,
            outer_edge_max_stretch: edge_width
                * config.edge_outside_stretch_over_edge_width
                * strength,
            path_max_stretch: edge_width * config.path_stretch_over_edge_width * strength,
            attenuate_extrusion: config.attenuate_extrusion,
        }
    }

    /// Maximum absolute stretch for a segment kind, mm
    pub fn max_stretch(&self, kind: SegmentKind) -> f64 {
        match kind {
            SegmentKind::Loop => self.loop_max_stretch,
            SegmentKind::InnerEdge => self.inner_edge_max_stretch,
            SegmentKind::OuterEdge => self.outer_edge_max_stretch,
            SegmentKind::Path => self.path_max_stretch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_derivation_with_defaults() {
        let profile = StretchProfile::new(&StretchConfig::default(), 0.4);
        assert!((profile.cross_limit_distance - 2.0).abs() < 1e-12);
        assert!((profile.cross_limit_fraction - 2.0 / 3.0).abs() < 1e-12);
        assert!((profile.cross_limit_remainder - 4.0 / 3.0).abs() < 1e-12);
        assert!((profile.stretch_from_distance - 0.8).abs() < 1e-12);
        assert!((profile.max_stretch(SegmentKind::InnerEdge) - 0.128).abs() < 1e-12);
        assert!((profile.max_stretch(SegmentKind::OuterEdge) - 0.04).abs() < 1e-12);
        assert!((profile.max_stretch(SegmentKind::Loop) - 0.044).abs() < 1e-12);
        assert_eq!(profile.max_stretch(SegmentKind::Path), 0.0);
    }

    #[test]
    fn test_strength_scales_all_maxima() {
        let config = StretchConfig {
            stretch_strength: 2.0,
            ..StretchConfig::default()
        };
        let profile = StretchProfile::new(&config, 0.4);
        assert!((profile.max_stretch(SegmentKind::InnerEdge) - 0.256).abs() < 1e-12);
        // sampling distances are geometry, not strength
        assert!((profile.stretch_from_distance - 0.8).abs() < 1e-12);
    }
}
