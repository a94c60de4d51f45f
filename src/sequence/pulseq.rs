//! Import of pulseq sequences into the event descriptor. A new repetition
//! starts at the center of every RF pulse. The pulse itself becomes a zero
//! duration RF event, every ADC sample becomes one event that ends on the
//! sample, and a final event runs up to the center of the next pulse.
//! Repetitions with fewer samples are padded with null events.

use std::path::Path;

use pulseq_rs::Gradient;

use super::{Event, RfUsage, Sequence, SequenceClass, REFOCUSING_THRESHOLD};
use crate::error::{Error, Result};
use crate::util::{Rotation, Spin};

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Field of view in x and y, converts gradient moments from `1 / m` to
    /// cycles per FOV. Unit: `m`
    pub fov: (f64, f64),
    pub class: SequenceClass,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            fov: (1.0, 1.0),
            class: SequenceClass::GradientEcho,
        }
    }
}

pub fn from_pulseq_file<P: AsRef<Path>>(path: P, options: &ImportOptions) -> Result<Sequence> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_owned()));
    }
    let seq =
        pulseq_rs::Sequence::from_file(path).map_err(|err| Error::Pulseq(format!("{err:?}")))?;
    from_pulseq(&seq, options)
}

pub fn from_pulseq(seq: &pulseq_rs::Sequence, options: &ImportOptions) -> Result<Sequence> {
    let source = PulseqSource::new(seq);
    let pulses = source.pulses();
    let samples = source.adc_samples();

    assemble(
        &pulses,
        &samples,
        source.duration(),
        |t_start, t_end| {
            let [mx, my] = source.gradient_moment(t_start, t_end);
            [mx * options.fov.0, my * options.fov.1]
        },
        options.class,
    )
}

/// An RF pulse collapsed into a single rotation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PulseSpan {
    pub start: f64,
    pub end: f64,
    pub angle: f64,
    pub phase: f64,
}

impl PulseSpan {
    fn center(&self) -> f64 {
        0.5 * (self.start + self.end)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AdcSample {
    pub time: f64,
    pub phase: f64,
}

/// Builds the repetitions. `moment(t_start, t_end)` must return the gradient
/// moment between two time points in cycles per FOV.
pub(crate) fn assemble<F>(
    pulses: &[PulseSpan],
    samples: &[AdcSample],
    duration: f64,
    moment: F,
    class: SequenceClass,
) -> Result<Sequence>
where
    F: Fn(f64, f64) -> [f64; 2],
{
    let mut reps = Vec::with_capacity(pulses.len());
    let mut sample_idx = samples.partition_point(|s| s.time < pulses.first().map_or(0.0, |p| p.center()));
    if sample_idx > 0 {
        tracing::debug!("Ignoring {sample_idx} ADC samples before the first pulse");
    }

    for (i, pulse) in pulses.iter().enumerate() {
        let rep_start = pulse.center();
        let rep_end = pulses.get(i + 1).map_or(duration, PulseSpan::center);

        let mut events = vec![Event {
            flip_angle: pulse.angle,
            rf_phase: pulse.phase,
            rf_usage: if pulse.angle.abs() < REFOCUSING_THRESHOLD {
                RfUsage::Excitation
            } else {
                RfUsage::Refocusing
            },
            ..Event::null()
        }];

        let mut t = rep_start;
        while let Some(sample) = samples.get(sample_idx).filter(|s| s.time < rep_end) {
            events.push(Event {
                gradient_moment: moment(t, sample.time),
                duration: sample.time - t,
                adc_active: true,
                adc_phase: sample.phase - std::f64::consts::FRAC_PI_2,
                ..Event::null()
            });
            t = sample.time;
            sample_idx += 1;
        }

        events.push(Event {
            gradient_moment: moment(t, rep_end),
            duration: (rep_end - t).max(0.0),
            ..Event::null()
        });
        reps.push(events);
    }

    let n_events = reps.iter().map(Vec::len).max().unwrap_or(0);
    for rep in &mut reps {
        rep.resize(n_events, Event::null());
    }
    tracing::debug!(
        "Imported {} repetitions with {} events each",
        reps.len(),
        n_events
    );

    Sequence::from_repetitions(reps, class)
}

/// Reads pulses, samples and gradient moments out of a parsed pulseq file.
/// All times are converted to `f64` seconds.
struct PulseqSource<'a> {
    seq: &'a pulseq_rs::Sequence,
    block_starts: Vec<f64>,
}

impl<'a> PulseqSource<'a> {
    fn new(seq: &'a pulseq_rs::Sequence) -> Self {
        let block_starts = seq
            .blocks
            .iter()
            .scan(0.0, |acc, b| {
                let start = *acc;
                *acc += b.duration as f64;
                Some(start)
            })
            .collect();
        Self { seq, block_starts }
    }

    fn duration(&self) -> f64 {
        self.seq.blocks.iter().map(|b| b.duration as f64).sum()
    }

    fn pulses(&self) -> Vec<PulseSpan> {
        let raster = self.seq.time_raster.rf as f64;
        let mut pulses = Vec::new();

        for (block, &block_start) in self.seq.blocks.iter().zip(&self.block_starts) {
            let Some(rf) = block.rf.as_ref() else {
                continue;
            };
            let start = block_start + rf.delay as f64;
            let n = rf.amp_shape.0.len();

            let mut spin = Spin::relaxed();
            for i in 0..n {
                spin *= Rotation::new(
                    rf.amp as f64 * rf.amp_shape.0[i] as f64 * raster * std::f64::consts::TAU,
                    rf.phase as f64 + rf.phase_shape.0[i] as f64 * std::f64::consts::TAU,
                );
            }

            // Frequency offsets only shift the slice, which has no effect on
            // an in-plane simulation
            pulses.push(PulseSpan {
                start,
                end: start + n as f64 * raster,
                angle: spin.angle(),
                phase: spin.phase(),
            });
        }

        pulses
    }

    fn adc_samples(&self) -> Vec<AdcSample> {
        let mut samples = Vec::new();
        for (block, &block_start) in self.seq.blocks.iter().zip(&self.block_starts) {
            let Some(adc) = block.adc.as_ref() else {
                continue;
            };
            let dwell = adc.dwell as f64;
            // ADC samples sit in the center of their dwell time
            samples.extend((0..adc.num as usize).map(|i| AdcSample {
                time: block_start + adc.delay as f64 + (i as f64 + 0.5) * dwell,
                phase: adc.phase as f64,
            }));
        }
        samples
    }

    /// Unit: `1 / m` (gradients are stored in `Hz / m`)
    fn gradient_moment(&self, t_start: f64, t_end: f64) -> [f64; 2] {
        if t_end <= t_start {
            return [0.0, 0.0];
        }

        let idx_start = match self
            .block_starts
            .binary_search_by(|t| t.total_cmp(&t_start))
        {
            Ok(idx) => idx,             // start searching beginning with the exact match
            Err(idx) => idx.max(1) - 1, // start searching before the insertion point
        };
        let idx_end = match self.block_starts.binary_search_by(|t| t.total_cmp(&t_end)) {
            Ok(idx) => idx,  // end searching before the exact match
            Err(idx) => idx, // end searching before the insertion point
        };

        let raster = self.seq.time_raster.grad as f64;
        let mut moment = [0.0, 0.0];
        for idx in idx_start..idx_end {
            let block = &self.seq.blocks[idx];
            let block_start = self.block_starts[idx];
            if let Some(gx) = block.gx.as_ref() {
                moment[0] += integrate_grad(gx.as_ref(), t_start, t_end, block_start, raster);
            }
            if let Some(gy) = block.gy.as_ref() {
                moment[1] += integrate_grad(gy.as_ref(), t_start, t_end, block_start, raster);
            }
        }
        moment
    }
}

fn integrate_grad(
    grad: &Gradient,
    t_start: f64,
    t_end: f64,
    block_start: f64,
    raster: f64,
) -> f64 {
    match grad {
        Gradient::Free {
            amp, delay, shape, ..
        } => {
            let offset = block_start + *delay as f64;
            *amp as f64 * integrate_free(t_start - offset, t_end - offset, &shape.0, raster)
        }
        Gradient::Trap {
            amp,
            rise,
            flat,
            fall,
            delay,
            ..
        } => {
            let offset = block_start + *delay as f64;
            *amp as f64
                * integrate_trap(
                    t_start - offset,
                    t_end - offset,
                    *rise as f64,
                    *flat as f64,
                    *fall as f64,
                )
        }
    }
}

/// Area of a unit amplitude trapezoid (starting at `t = 0`) that lies within
/// `[t_start, t_end]`.
fn integrate_trap(t_start: f64, t_end: f64, rise: f64, flat: f64, fall: f64) -> f64 {
    // Ramps are linear, so the mean of the clipped end values is exact
    let ramp = |t0: f64, len: f64, value: &dyn Fn(f64) -> f64| {
        let a = t_start.clamp(t0, t0 + len);
        let b = t_end.clamp(t0, t0 + len);
        if b > a {
            0.5 * (value(a) + value(b)) * (b - a)
        } else {
            0.0
        }
    };
    let up = ramp(0.0, rise, &|t| t / rise);
    let plateau = (t_end.min(rise + flat) - t_start.max(rise)).max(0.0);
    let down = ramp(rise + flat, fall, &|t| (rise + flat + fall - t) / fall);
    up + plateau + down
}

/// Area of a piecewise constant shape (sample `i` covers
/// `[i * dwell, (i + 1) * dwell)`) within `[t_start, t_end]`.
fn integrate_free<T: Copy + Into<f64>>(t_start: f64, t_end: f64, shape: &[T], dwell: f64) -> f64 {
    if t_end <= t_start {
        return 0.0;
    }
    let first = ((t_start / dwell).floor().max(0.0) as usize).min(shape.len());
    let last = ((t_end / dwell).ceil().max(0.0) as usize).min(shape.len());

    // Consecutive ADC intervals share their edges. Inner samples count with
    // the exact dwell so that the moments of a whole readout add up to the
    // area of the shape without rounding drift.
    shape[first..last]
        .iter()
        .enumerate()
        .map(|(i, &sample)| {
            let t = (first + i) as f64 * dwell;
            let overlap = if t_start <= t && t + dwell <= t_end {
                dwell
            } else {
                ((t + dwell).min(t_end) - t.max(t_start)).max(0.0)
            };
            sample.into() * overlap
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn trapezoid_area() {
        // rise 1, flat 2, fall 1 -> area 3
        check!((integrate_trap(-1.0, 10.0, 1.0, 2.0, 1.0) - 3.0).abs() < 1e-12);
        check!((integrate_trap(0.0, 1.0, 1.0, 2.0, 1.0) - 0.5).abs() < 1e-12);
        check!((integrate_trap(1.0, 2.0, 1.0, 2.0, 1.0) - 1.0).abs() < 1e-12);
        check!((integrate_trap(3.5, 4.0, 1.0, 2.0, 1.0) - 0.125).abs() < 1e-12);
    }

    #[test]
    fn free_shape_area() {
        let shape = [1.0_f32, 2.0, 3.0];
        check!((integrate_free(0.0, 3.0, &shape, 1.0) - 6.0).abs() < 1e-12);
        check!((integrate_free(0.5, 1.5, &shape, 1.0) - 1.5).abs() < 1e-12);
        check!(integrate_free(5.0, 6.0, &shape, 1.0) == 0.0);
    }

    #[test]
    fn split_readout_adds_up() {
        let shape: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin()).collect();
        let dwell = 1e-5;
        let full = integrate_free(0.0, 40.0 * dwell, &shape, dwell);

        let edges: Vec<f64> = (0..=17).map(|i| i as f64 * 40.0 * dwell / 17.0).collect();
        let split: f64 = edges
            .windows(2)
            .map(|w| integrate_free(w[0], w[1], &shape, dwell))
            .sum();
        check!((split - full).abs() < 1e-15);

        let trap: f64 = edges
            .windows(2)
            .map(|w| integrate_trap(w[0], w[1], 0.0, 2e-4, 1e-4))
            .sum();
        check!((trap - 2.5e-4).abs() < 1e-15);
    }

    const FID_READOUT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/fid_readout.seq");

    #[test]
    fn reads_pulses_and_samples() {
        let seq = pulseq_rs::Sequence::from_file(FID_READOUT).unwrap();
        let source = PulseqSource::new(&seq);
        check!((source.duration() - 1.4e-3).abs() < 1e-9);

        let pulses = source.pulses();
        check!(pulses.len() == 1);
        check!((pulses[0].angle - FRAC_PI_2).abs() < 1e-4);
        check!(crate::util::wrap_phase(pulses[0].phase).abs() < 1e-4);
        check!((pulses[0].center() - 5e-5).abs() < 1e-9);

        let samples = source.adc_samples();
        check!(samples.len() == 10);
        for (i, sample) in samples.iter().enumerate() {
            check!((sample.time - (3.5e-4 + i as f64 * 1e-4)).abs() < 1e-8);
        }

        // Whole trapezoid: 1e5 Hz/m * (50 + 1000 + 50) us
        check!((source.gradient_moment(0.0, 1.4e-3)[0] - 110.0).abs() < 1e-3);
        check!((source.gradient_moment(2e-4, 3e-4)[0] - 5.0).abs() < 1e-3);
        check!(source.gradient_moment(0.0, 2e-4) == [0.0, 0.0]);
    }

    #[test]
    fn imports_readout_in_cycles_per_fov() {
        let options = ImportOptions {
            fov: (0.1, 0.1),
            ..ImportOptions::default()
        };
        let seq = from_pulseq_file(FID_READOUT, &options).unwrap();
        check!(seq.n_reps() == 1);
        check!(seq.n_events() == 12);
        check!(seq.adc_count() == 10);

        let events = seq.repetition(0);
        check!((events[0].flip_angle - FRAC_PI_2).abs() < 1e-4);
        check!(events[0].rf_usage == RfUsage::Excitation);
        check!((events[1].duration - 3e-4).abs() < 1e-8);
        check!((events[11].duration - 1.5e-4).abs() < 1e-8);
        check!(!events[11].adc_active);
        check!(events[1..11].iter().all(|e| (e.adc_phase + FRAC_PI_2).abs() < 1e-12));

        // One cycle per FOV between samples, also from the pulse center to
        // the first sample and from the last sample to the end
        let kspace = seq.kspace();
        for (i, k) in kspace.iter().enumerate().skip(1) {
            check!((k[0] - i as f64).abs() < 1e-4, "event {i}");
            check!(k[1] == 0.0);
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let_assert!(
            Err(Error::FileNotFound(_)) =
                from_pulseq_file("does/not/exist.seq", &ImportOptions::default())
        );
    }

    /// Two excitations, four samples after the first one and two after the
    /// second one, with a constant read gradient of 1 cycle per ms.
    #[test]
    fn assembles_repetitions() {
        let pulses = [
            PulseSpan {
                start: 0.0,
                end: 2e-3,
                angle: FRAC_PI_2,
                phase: 0.0,
            },
            PulseSpan {
                start: 10e-3,
                end: 12e-3,
                angle: PI,
                phase: FRAC_PI_2,
            },
        ];
        let samples: Vec<AdcSample> = [-1e-3, 3e-3, 4e-3, 5e-3, 6e-3, 13e-3, 14e-3]
            .iter()
            .map(|&time| AdcSample { time, phase: 0.0 })
            .collect();

        let seq = assemble(
            &pulses,
            &samples,
            20e-3,
            |t0, t1| [(t1 - t0) * 1e3, 0.0],
            SequenceClass::SpinEcho,
        )
        .unwrap();

        check!(seq.n_reps() == 2);
        check!(seq.n_events() == 6);
        check!(seq.adc_count() == 6);
        check!(seq.class() == SequenceClass::SpinEcho);

        let first = seq.repetition(0);
        check!(first[0].flip_angle == FRAC_PI_2);
        check!(first[0].rf_usage == RfUsage::Excitation);
        check!(first[0].duration == 0.0);
        check!((first[1].duration - 2e-3).abs() < 1e-12);
        check!((first[1].gradient_moment[0] - 2.0).abs() < 1e-9);
        check!(first[1].adc_active);
        check!((first[1].adc_phase + FRAC_PI_2).abs() < 1e-12);
        check!(!first[5].adc_active);
        check!((first[5].duration - 5e-3).abs() < 1e-12);

        let second = seq.repetition(1);
        check!(second[0].rf_usage == RfUsage::Refocusing);
        check!(second[2].adc_active);
        check!(!second[3].adc_active);
        check!((second[3].duration - 6e-3).abs() < 1e-12);
        // padding
        check!(second[4] == Event::null());
        check!(second[5] == Event::null());

        // Every repetition spans from one pulse center to the next
        check!((seq.duration() - 19e-3).abs() < 1e-12);
    }
}
