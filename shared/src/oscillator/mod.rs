//! Kuramoto phase math over a set of oscillators. Pure functions, no I/O.
//!
//! Phase evolution: dθ_i/dt = ω_i + (K/N) Σ_{j≠i} sin(θ_j − θ_i)
//! Order parameter: r = |1/N Σ_j e^(iθ_j)|

mod engine;

pub use engine::{EngineTick, OscillatorEngine};

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// An entity with a phase angle and natural frequency
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Oscillator {
    pub id: String,
    /// Phase angle in [0, 2π)
    pub phase: f64,
    /// Radians per second
    pub natural_frequency: f64,
}

impl Oscillator {
    pub fn new(id: impl Into<String>, phase: f64, natural_frequency: f64) -> Self {
        Self {
            id: id.into(),
            phase: wrap_phase(phase),
            natural_frequency,
        }
    }

    /// Advance this oscillator alone by `dt` seconds at its natural frequency
    pub fn advance(&mut self, dt: f64) {
        self.phase = wrap_phase(self.phase + self.natural_frequency * dt);
    }
}

/// Wraps any finite angle into [0, 2π). Non-finite input maps to 0.
pub fn wrap_phase(phase: f64) -> f64 {
    if !phase.is_finite() {
        return 0.0;
    }
    let wrapped = phase.rem_euclid(TAU);
    // rem_euclid may round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Order parameter of the given oscillators, in [0, 1].
/// Empty input yields 0, a singleton yields 1.
pub fn compute_coherence(oscillators: &[Oscillator]) -> f64 {
    let (r, _) = order_parameter(oscillators.iter().map(|o| o.phase));
    r
}

/// Circular mean phase ψ of the given oscillators, or `None` when empty
pub fn mean_phase(oscillators: &[Oscillator]) -> Option<f64> {
    if oscillators.is_empty() {
        return None;
    }
    let (_, psi) = order_parameter(oscillators.iter().map(|o| o.phase));
    Some(psi)
}

/// Returns (r, ψ) for an iterator of phases
pub(crate) fn order_parameter(phases: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut count = 0usize;
    let mut sum_cos = 0.0;
    let mut sum_sin = 0.0;
    for phase in phases {
        sum_cos += phase.cos();
        sum_sin += phase.sin();
        count += 1;
    }
    if count == 0 {
        return (0.0, 0.0);
    }

    let n = count as f64;
    let (mean_cos, mean_sin) = (sum_cos / n, sum_sin / n);
    let r = (mean_cos * mean_cos + mean_sin * mean_sin).sqrt().min(1.0);
    (r, wrap_phase(mean_sin.atan2(mean_cos)))
}

/// Computes the next phase of `oscillator` given the whole population.
///
/// `all` may include `oscillator` itself; its own entry contributes
/// sin(0) = 0. N is the population size.
pub fn evolve_phase(oscillator: &Oscillator, all: &[Oscillator], coupling: f64, dt: f64) -> f64 {
    let n = all.len().max(1) as f64;
    let coupling_sum: f64 = all
        .iter()
        .filter(|other| other.id != oscillator.id)
        .map(|other| (other.phase - oscillator.phase).sin())
        .sum();

    let velocity = oscillator.natural_frequency + (coupling / n) * coupling_sum;
    wrap_phase(oscillator.phase + dt * velocity)
}

/// Alignment of a phase with the population mean, in [0, 1]:
/// (1 + cos(θ − ψ)) / 2
pub fn phase_alignment(phase: f64, mean_phase: f64) -> f64 {
    (1.0 + (phase - mean_phase).cos()) / 2.0
}
