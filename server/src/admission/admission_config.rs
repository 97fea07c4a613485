use std::default::Default;

use rail_shared::Embedding;

/// Contains Config properties which will be used by the absorption state
/// machine
#[derive(Clone, Debug)]
pub struct AdmissionConfig {
    /// Assessments required before an observed agent counts as assessed
    pub min_interactions: u32,
    /// Alignment at or above this value counts as well-aligned
    pub alignment_threshold: f32,
    /// Coupling gained per assessment once connected
    pub coupling_ramp_rate: f32,
    /// Coupling level an agent must reach before absorption
    pub max_coupling: f32,
    /// Consecutive well-aligned assessments required for absorption
    pub sustained_alignment: u32,
    /// When set, alignment is measured against this embedding instead of the
    /// agent's own running centroid
    pub reference_centroid: Option<Embedding>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_interactions: 2,
            alignment_threshold: 0.7,
            coupling_ramp_rate: 0.25,
            max_coupling: 1.0,
            sustained_alignment: 3,
            reference_centroid: None,
        }
    }
}
