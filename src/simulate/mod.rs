//! Forward model: moves the isochromats of every voxel through the sequence
//! and records the signal received at every ADC event.
//!
//! Every event applies, in this order:
//! 1. relaxation over the event duration,
//! 2. precession from off-resonance and the gradient moment of the event,
//! 3. the (instantaneous) RF pulse,
//!
//! and is sampled afterwards if its ADC is active. Voxels never interact, so
//! they are simulated in parallel in fixed chunks; each chunk runs through the
//! whole sequence with a private signal buffer. Buffers are summed in chunk
//! order, which keeps repeated runs bit identical.

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use std::f64::consts::TAU;

use crate::config::{B1Source, ResetPolicy, SimConfig};
use crate::error::{check_shape, Error, Result};
use crate::phantom::{Phantom, Voxel};
use crate::sequence::Sequence;
use crate::spins::SpinEnsemble;
use crate::util::Rotation;

mod magnetization;
mod signal;

pub use magnetization::Magnetization;
pub use signal::Signal;

const VOXEL_CHUNK: usize = 32;

/// Everything the inner loop needs to know about one voxel.
struct VoxelParams {
    voxel: Voxel,
    rb1: f64,
    position: (f64, f64),
    /// Unit: `rad / s`, one per isochromat
    omega: Vec<f64>,
    sensitivity: Vec<Complex64>,
}

pub struct Scanner {
    config: SimConfig,
    /// Coil major, one complex weight per voxel. `None` means a single coil
    /// with unit sensitivity.
    coils: Option<Vec<Vec<Complex64>>>,
}

impl Scanner {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            coils: None,
        }
    }

    /// Receive coil sensitivity maps, one map per coil in voxel index order.
    pub fn with_coils(mut self, sensitivities: Vec<Vec<Complex64>>) -> Result<Self> {
        if sensitivities.is_empty() {
            return Err(Error::InvalidParameter {
                name: "coil sensitivities",
                reason: "at least one receive coil is needed".to_owned(),
            });
        }
        self.coils = Some(sensitivities);
        Ok(self)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn n_coils(&self) -> usize {
        self.coils.as_ref().map_or(1, Vec::len)
    }

    /// Simulates `seq` on `phantom`. All shapes are checked before anything
    /// is computed.
    pub fn forward(
        &self,
        phantom: &Phantom,
        spins: &SpinEnsemble,
        seq: &Sequence,
    ) -> Result<Signal> {
        self.config.validate()?;
        seq.validate()?;
        check_shape("spin ensemble voxels", phantom.voxel_count(), spins.n_voxels())?;
        if let Some(coils) = &self.coils {
            for map in coils {
                check_shape("coil sensitivity map", phantom.voxel_count(), map.len())?;
            }
        }

        let phantom = phantom.sanitized(self.config.relaxation_cutoff);
        let active: Vec<usize> = (0..phantom.voxel_count())
            .filter(|&v| phantom.voxels()[v].pd > 0.0)
            .collect();
        // RF pulses are played at the end of their event, the frequency
        // offset phase is taken at that time
        let pulse_times: Vec<f64> = seq
            .timeline()
            .map(|t| t.t_start + t.event.duration)
            .collect();

        tracing::debug!(
            "Forward simulation: {} of {} voxels, {} spins, {} events x {} repetitions, {} coils",
            active.len(),
            phantom.voxel_count(),
            spins.n_spins(),
            seq.n_events(),
            seq.n_reps(),
            self.n_coils()
        );

        let partials: Vec<Vec<Complex64>> = active
            .par_chunks(VOXEL_CHUNK)
            .map(|chunk| self.simulate_chunk(&phantom, spins, seq, &pulse_times, chunk))
            .collect();

        let mut signal = Signal::zeros(seq, self.n_coils());
        for partial in partials {
            for (s, p) in signal.data_mut().iter_mut().zip(partial) {
                *s += p;
            }
        }

        self.demodulate(&mut signal, seq);
        self.add_noise(&mut signal)?;

        tracing::debug!("Forward simulation done, {} ADC samples", seq.adc_count());
        Ok(signal)
    }

    fn voxel_params(&self, phantom: &Phantom, spins: &SpinEnsemble, v: usize) -> VoxelParams {
        let voxel = phantom.voxels()[v];
        let rb1 = match self.config.b1 {
            B1Source::Phantom => voxel.rb1,
            B1Source::Uniform => 1.0,
        };
        let sensitivity = match &self.coils {
            Some(coils) => coils.iter().map(|map| map[v]).collect(),
            None => vec![Complex64::new(1.0, 0.0)],
        };
        VoxelParams {
            voxel,
            rb1,
            position: phantom.position(v),
            omega: (0..spins.n_spins()).map(|s| spins.omega(s, v)).collect(),
            sensitivity,
        }
    }

    /// Runs a group of voxels through the whole sequence and returns their
    /// summed (not yet demodulated) signal.
    fn simulate_chunk(
        &self,
        phantom: &Phantom,
        spins: &SpinEnsemble,
        seq: &Sequence,
        pulse_times: &[f64],
        voxels: &[usize],
    ) -> Vec<Complex64> {
        let n_events = seq.n_events();
        let n_coils = self.n_coils();
        let params: Vec<VoxelParams> = voxels
            .iter()
            .map(|&v| self.voxel_params(phantom, spins, v))
            .collect();
        let pd: Vec<f64> = params.iter().map(|p| p.voxel.pd).collect();

        let mut state = Magnetization::relaxed(&pd, spins.n_spins());
        let mut out = vec![Complex64::new(0.0, 0.0); n_events * seq.n_reps() * n_coils];

        for (r, rep) in seq.repetitions().enumerate() {
            if r > 0 && self.config.reset == ResetPolicy::Relaxed {
                state.reset(&pd);
            }

            for (e, event) in rep.iter().enumerate() {
                let dt = event.duration;
                let [gx, gy] = event.gradient_moment;
                let pulse = event.has_rf().then(|| {
                    let (angle, phase) = event.normalized_rf();
                    let t = pulse_times[r * n_events + e];
                    (angle, phase + TAU * event.rf_frequency * t)
                });
                let offset = (r * n_events + e) * n_coils;

                for (i, p) in params.iter().enumerate() {
                    state.relax(i, dt, p.voxel.t1, p.voxel.t2, p.voxel.pd);

                    if dt != 0.0 {
                        let phase = TAU * p.voxel.db0 * dt
                            + TAU * (gx * p.position.0 + gy * p.position.1);
                        state.precess(i, phase, &p.omega, dt);
                    }

                    if let Some((angle, rf_phase)) = pulse {
                        state.excite(i, &Rotation::new(angle * p.rb1, rf_phase));
                    }

                    if event.adc_active {
                        let m = state.transverse_mean(i) * p.rb1;
                        for (s, &w) in out[offset..offset + n_coils].iter_mut().zip(&p.sensitivity) {
                            *s += w * m;
                        }
                    }
                }

                state.round(self.config.precision);
            }

            if self.config.spoil_transverse {
                state.spoil();
            }
        }

        out
    }

    fn demodulate(&self, signal: &mut Signal, seq: &Sequence) {
        let n_coils = signal.n_coils();
        for timed in seq.timeline().filter(|t| t.event.adc_active) {
            let offset = signal.offset(timed.index, timed.rep);
            let rot = Complex64::from_polar(1.0, -timed.event.adc_phase);
            for s in &mut signal.data_mut()[offset..offset + n_coils] {
                *s *= rot;
            }
        }
    }

    /// Complex white noise on every ADC sample. The generator is seeded from
    /// the config so a run can be repeated exactly.
    fn add_noise(&self, signal: &mut Signal) -> Result<()> {
        if self.config.noise_std == 0.0 {
            return Ok(());
        }
        let normal =
            Normal::new(0.0, self.config.noise_std).map_err(|err| Error::InvalidParameter {
                name: "noise_std",
                reason: err.to_string(),
            })?;
        let mut rng = StdRng::seed_from_u64(self.config.noise_seed);

        let n_coils = signal.n_coils();
        for rep in 0..signal.n_reps() {
            for event in 0..signal.n_events() {
                if !signal.is_sampled(event, rep) {
                    continue;
                }
                let offset = signal.offset(event, rep);
                for s in &mut signal.data_mut()[offset..offset + n_coils] {
                    *s += Complex64::new(normal.sample(&mut rng), normal.sample(&mut rng));
                }
            }
        }
        Ok(())
    }
}
