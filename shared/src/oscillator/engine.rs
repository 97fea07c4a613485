use std::collections::HashMap;

use super::{compute_coherence, evolve_phase, order_parameter, phase_alignment, wrap_phase, Oscillator};

/// Result of advancing an [`OscillatorEngine`] by one step
#[derive(Clone, Debug, PartialEq)]
pub struct EngineTick {
    pub coherence: f64,
    pub phases: HashMap<String, f64>,
}

/// Owns a population of oscillators and advances them together
#[derive(Clone, Debug)]
pub struct OscillatorEngine {
    oscillators: Vec<Oscillator>,
    index: HashMap<String, usize>,
    coupling: f64,
    intervention_threshold: f64,
}

impl OscillatorEngine {
    pub fn new(coupling: f64, intervention_threshold: f64) -> Self {
        Self {
            oscillators: Vec::new(),
            index: HashMap::new(),
            coupling,
            intervention_threshold,
        }
    }

    /// Adds an oscillator. Returns false when the id is already present.
    pub fn insert(&mut self, oscillator: Oscillator) -> bool {
        if self.index.contains_key(&oscillator.id) {
            return false;
        }
        self.index
            .insert(oscillator.id.clone(), self.oscillators.len());
        self.oscillators.push(oscillator);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Oscillator> {
        let position = self.index.remove(id)?;
        let removed = self.oscillators.swap_remove(position);
        if let Some(moved) = self.oscillators.get(position) {
            self.index.insert(moved.id.clone(), position);
        }
        Some(removed)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Oscillator> {
        self.index.get(id).map(|&i| &self.oscillators[i])
    }

    /// Overwrites a phase directly. Returns false for unknown ids.
    pub fn set_phase(&mut self, id: &str, phase: f64) -> bool {
        match self.index.get(id) {
            Some(&i) => {
                self.oscillators[i].phase = wrap_phase(phase);
                true
            }
            None => false,
        }
    }

    pub fn oscillators(&self) -> &[Oscillator] {
        &self.oscillators
    }

    pub fn len(&self) -> usize {
        self.oscillators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oscillators.is_empty()
    }

    pub fn coupling(&self) -> f64 {
        self.coupling
    }

    pub fn set_coupling(&mut self, coupling: f64) {
        self.coupling = coupling;
    }

    pub fn coherence(&self) -> f64 {
        compute_coherence(&self.oscillators)
    }

    pub fn mean_phase(&self) -> Option<f64> {
        if self.oscillators.is_empty() {
            return None;
        }
        let (_, psi) = order_parameter(self.oscillators.iter().map(|o| o.phase));
        Some(psi)
    }

    /// Alignment of one oscillator with the population mean, in [0, 1]
    pub fn alignment(&self, id: &str) -> Option<f64> {
        let oscillator = self.get(id)?;
        let psi = self.mean_phase()?;
        Some(phase_alignment(oscillator.phase, psi))
    }

    /// Advances every oscillator by `dt` using the pre-tick snapshot
    pub fn tick(&mut self, dt: f64) -> EngineTick {
        let snapshot = self.oscillators.clone();
        for (oscillator, before) in self.oscillators.iter_mut().zip(snapshot.iter()) {
            oscillator.phase = evolve_phase(before, &snapshot, self.coupling, dt);
        }

        EngineTick {
            coherence: self.coherence(),
            phases: self
                .oscillators
                .iter()
                .map(|o| (o.id.clone(), o.phase))
                .collect(),
        }
    }

    pub fn needs_intervention(&self) -> bool {
        self.coherence() < self.intervention_threshold
    }

    /// Pulls every phase toward the circular mean by `strength` in [0, 1].
    /// A strength of 1 collapses all phases onto the mean. Returns the
    /// resulting coherence.
    pub fn force_synchronize(&mut self, strength: f64) -> f64 {
        let strength = strength.clamp(0.0, 1.0);
        if let Some(psi) = self.mean_phase() {
            for oscillator in self.oscillators.iter_mut() {
                // shortest signed angular distance to the mean
                let delta = (psi - oscillator.phase + std::f64::consts::PI)
                    .rem_euclid(std::f64::consts::TAU)
                    - std::f64::consts::PI;
                oscillator.phase = wrap_phase(oscillator.phase + strength * delta);
            }
        }
        self.coherence()
    }
}
