//! The event sequence descriptor. A sequence is a `n_events x n_reps` table of
//! events; every repetition has the same number of events so the signal of
//! a run can be indexed by `(event, repetition, coil)`.

use crate::error::{check_shape, Error, Result};
use std::f64::consts::{FRAC_PI_2, PI};

mod class;
pub mod pulseq;

pub use class::SequenceClass;

/// Flip angles at or above this are treated as refocusing pulses when the
/// usage of a pulse is not given explicitly.
pub const REFOCUSING_THRESHOLD: f64 = 100.0 * PI / 180.0;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfUsage {
    #[default]
    Undefined,
    Excitation,
    Refocusing,
}

/// One step of a repetition. RF pulses and ADC samples are instantaneous and
/// happen at the end of the event, after relaxation and precession over
/// `duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Unit: `rad`, zero means no pulse
    pub flip_angle: f64,
    /// Unit: `rad`
    pub rf_phase: f64,
    /// Unit: `Hz`
    pub rf_frequency: f64,
    pub rf_usage: RfUsage,
    /// Gradient moment increment of this event. Unit: cycles per field of
    /// view, so a step of 1 moves by one k-space line. Ignored if the event
    /// has zero duration.
    pub gradient_moment: [f64; 2],
    /// Unit: `s`
    pub duration: f64,
    pub adc_active: bool,
    /// Demodulation phase, the sample is multiplied by `exp(-i * adc_phase)`.
    /// Unit: `rad`
    pub adc_phase: f64,
}

impl Default for Event {
    fn default() -> Self {
        Self::null()
    }
}

impl Event {
    /// Does nothing: no time passes, no pulse, no gradient, no sample.
    pub const fn null() -> Self {
        Self {
            flip_angle: 0.0,
            rf_phase: 0.0,
            rf_frequency: 0.0,
            rf_usage: RfUsage::Undefined,
            gradient_moment: [0.0, 0.0],
            duration: 0.0,
            adc_active: false,
            adc_phase: 0.0,
        }
    }

    pub fn has_rf(&self) -> bool {
        self.flip_angle != 0.0
    }

    /// Flip angle and phase with the flip made positive: a negative flip is
    /// the same rotation as a positive one with the phase shifted by 180°.
    pub fn normalized_rf(&self) -> (f64, f64) {
        if self.flip_angle < 0.0 {
            (-self.flip_angle, self.rf_phase + PI)
        } else {
            (self.flip_angle, self.rf_phase)
        }
    }

    pub fn is_refocusing(&self) -> bool {
        match self.rf_usage {
            RfUsage::Refocusing => true,
            RfUsage::Excitation => false,
            RfUsage::Undefined => self.flip_angle.abs() >= REFOCUSING_THRESHOLD,
        }
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("flip_angle", self.flip_angle),
            ("rf_phase", self.rf_phase),
            ("rf_frequency", self.rf_frequency),
            ("gradient_moment", self.gradient_moment[0]),
            ("gradient_moment", self.gradient_moment[1]),
            ("duration", self.duration),
            ("adc_phase", self.adc_phase),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(Error::InvalidParameter {
                    name,
                    reason: format!("must be finite, got {value}"),
                });
            }
        }
        if self.duration < 0.0 {
            return Err(Error::InvalidParameter {
                name: "duration",
                reason: format!("must be >= 0, got {}", self.duration),
            });
        }
        Ok(())
    }
}

/// ADC demodulation phase that turns the FID following an excitation with the
/// given pulse into a real, positive signal.
pub fn excitation_adc_phase(flip_angle: f64, rf_phase: f64) -> f64 {
    let pulse = Event {
        flip_angle,
        rf_phase,
        ..Event::null()
    };
    let (_, phase) = pulse.normalized_rf();
    crate::util::wrap_phase(phase - FRAC_PI_2)
}

/// An event together with its place in the sequence.
#[derive(Debug, Clone, Copy)]
pub struct TimedEvent<'a> {
    pub rep: usize,
    pub index: usize,
    /// Start of the event relative to the start of the sequence. Unit: `s`
    pub t_start: f64,
    pub event: &'a Event,
}

#[derive(Debug, Clone)]
pub struct Sequence {
    n_events: usize,
    n_reps: usize,
    /// Repetition major: event `e` of repetition `r` is at `r * n_events + e`
    events: Vec<Event>,
    class: SequenceClass,
}

impl Sequence {
    /// A sequence of null events, to be filled with `event_mut`.
    pub fn new(n_events: usize, n_reps: usize, class: SequenceClass) -> Result<Self> {
        if n_events == 0 || n_reps == 0 {
            return Err(Error::EmptySequence);
        }
        Ok(Self {
            n_events,
            n_reps,
            events: vec![Event::null(); n_events * n_reps],
            class,
        })
    }

    /// Every repetition must contain the same number of events.
    pub fn from_repetitions(reps: Vec<Vec<Event>>, class: SequenceClass) -> Result<Self> {
        let n_reps = reps.len();
        let n_events = reps.first().map_or(0, Vec::len);
        if n_events == 0 {
            return Err(Error::EmptySequence);
        }
        for rep in &reps {
            check_shape("events per repetition", n_events, rep.len())?;
        }
        Ok(Self {
            n_events,
            n_reps,
            events: reps.into_iter().flatten().collect(),
            class,
        })
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn n_reps(&self) -> usize {
        self.n_reps
    }

    pub fn class(&self) -> SequenceClass {
        self.class
    }

    pub fn set_class(&mut self, class: SequenceClass) {
        self.class = class;
    }

    pub fn event(&self, event: usize, rep: usize) -> &Event {
        assert!(event < self.n_events && rep < self.n_reps);
        &self.events[rep * self.n_events + event]
    }

    pub fn event_mut(&mut self, event: usize, rep: usize) -> &mut Event {
        assert!(event < self.n_events && rep < self.n_reps);
        &mut self.events[rep * self.n_events + event]
    }

    pub fn repetition(&self, rep: usize) -> &[Event] {
        &self.events[rep * self.n_events..(rep + 1) * self.n_events]
    }

    pub fn repetitions(&self) -> impl Iterator<Item = &[Event]> {
        self.events.chunks(self.n_events)
    }

    /// Same ADC mask for every repetition.
    pub fn set_adc_mask(&mut self, mask: &[bool]) -> Result<()> {
        check_shape("ADC mask", self.n_events, mask.len())?;
        for rep in self.events.chunks_mut(self.n_events) {
            for (event, &active) in rep.iter_mut().zip(mask) {
                event.adc_active = active;
            }
        }
        Ok(())
    }

    /// Demodulation phase of all samples of one repetition.
    pub fn set_adc_phase(&mut self, rep: usize, phase: f64) -> Result<()> {
        if rep >= self.n_reps {
            return Err(Error::InvalidParameter {
                name: "repetition",
                reason: format!("{rep} is out of range, have {}", self.n_reps),
            });
        }
        let n = self.n_events;
        for event in &mut self.events[rep * n..(rep + 1) * n] {
            event.adc_phase = phase;
        }
        Ok(())
    }

    pub fn adc_count(&self) -> usize {
        self.events.iter().filter(|e| e.adc_active).count()
    }

    /// Unit: `s`
    pub fn duration(&self) -> f64 {
        self.events.iter().map(|e| e.duration).sum()
    }

    /// All events in playout order, with their start times.
    pub fn timeline(&self) -> impl Iterator<Item = TimedEvent<'_>> {
        let n_events = self.n_events;
        self.events
            .iter()
            .enumerate()
            .scan(0.0, move |t, (i, event)| {
                let t_start = *t;
                *t += event.duration;
                Some(TimedEvent {
                    rep: i / n_events,
                    index: i % n_events,
                    t_start,
                    event,
                })
            })
    }

    /// Cumulative gradient moment at the end of every event, in the same
    /// layout as the events. See `SequenceClass` for the accumulation rule.
    pub fn kspace(&self) -> Vec<[f64; 2]> {
        self.repetitions()
            .flat_map(|rep| self.class.trajectory(rep))
            .collect()
    }

    /// Checks that every event holds usable values, before any simulation.
    pub fn validate(&self) -> Result<()> {
        self.events.iter().try_for_each(Event::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};

    #[test]
    fn negative_flip_is_phase_shifted() {
        let event = Event {
            flip_angle: -FRAC_PI_2,
            rf_phase: 0.3,
            ..Event::null()
        };
        let (angle, phase) = event.normalized_rf();
        check!(angle == FRAC_PI_2);
        check!((phase - (0.3 + PI)).abs() < 1e-12);
    }

    #[test]
    fn refocusing_detection() {
        let mut event = Event {
            flip_angle: PI,
            ..Event::null()
        };
        check!(event.is_refocusing());
        event.rf_usage = RfUsage::Excitation;
        check!(!event.is_refocusing());
        event.flip_angle = 0.5;
        event.rf_usage = RfUsage::Refocusing;
        check!(event.is_refocusing());
    }

    #[test]
    fn timeline_accumulates_durations() {
        let mut seq = Sequence::new(3, 2, SequenceClass::GradientEcho).unwrap();
        for rep in 0..2 {
            for e in 0..3 {
                seq.event_mut(e, rep).duration = 1.0 + e as f64;
            }
        }
        let starts: Vec<_> = seq.timeline().map(|t| (t.rep, t.index, t.t_start)).collect();
        check!(
            starts
                == vec![
                    (0, 0, 0.0),
                    (0, 1, 1.0),
                    (0, 2, 3.0),
                    (1, 0, 6.0),
                    (1, 1, 7.0),
                    (1, 2, 9.0)
                ]
        );
        check!(seq.duration() == 12.0);
    }

    #[test]
    fn ragged_repetitions_are_rejected() {
        let reps = vec![vec![Event::null(); 4], vec![Event::null(); 3]];
        let_assert!(
            Err(Error::ShapeMismatch { expected, found, .. }) =
                Sequence::from_repetitions(reps, SequenceClass::GradientEcho)
        );
        check!(expected == 4);
        check!(found == 3);
        check!(Sequence::new(0, 1, SequenceClass::GradientEcho).is_err());
    }

    #[test]
    fn adc_mask_and_phase() {
        let mut seq = Sequence::new(4, 3, SequenceClass::GradientEcho).unwrap();
        check!(seq.set_adc_mask(&[false, true, true]).is_err());
        seq.set_adc_mask(&[false, true, true, false]).unwrap();
        seq.set_adc_phase(1, 0.7).unwrap();
        let_assert!(Err(Error::InvalidParameter { .. }) = seq.set_adc_phase(3, 0.1));
        check!(seq.adc_count() == 6);
        check!(seq.event(2, 1).adc_phase == 0.7);
        check!(seq.event(2, 2).adc_phase == 0.0);
    }

    #[test]
    fn invalid_events_are_rejected() {
        let mut seq = Sequence::new(2, 1, SequenceClass::GradientEcho).unwrap();
        check!(seq.validate().is_ok());
        seq.event_mut(1, 0).duration = -1.0;
        check!(seq.validate().is_err());
        seq.event_mut(1, 0).duration = 1.0;
        seq.event_mut(0, 0).gradient_moment[1] = f64::NAN;
        check!(seq.validate().is_err());
    }

    #[test]
    fn kspace_restarts_every_repetition() {
        let mut seq = Sequence::new(2, 2, SequenceClass::GradientEcho).unwrap();
        for rep in 0..2 {
            for e in 0..2 {
                let event = seq.event_mut(e, rep);
                event.gradient_moment = [1.0, -0.5];
                event.duration = 1e-3;
            }
        }
        check!(seq.kspace() == vec![[1.0, -0.5], [2.0, -1.0], [1.0, -0.5], [2.0, -1.0]]);
    }

    #[test]
    fn demodulation_phase_for_excitation() {
        check!((excitation_adc_phase(FRAC_PI_2, 0.0) + FRAC_PI_2).abs() < 1e-12);
        check!((excitation_adc_phase(-FRAC_PI_2, 0.0) - FRAC_PI_2).abs() < 1e-12);
    }
}
