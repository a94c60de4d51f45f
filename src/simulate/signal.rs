use num_complex::Complex64;

use crate::error::{check_shape, Error, Result};
use crate::sequence::Sequence;

/// Received signal, indexed by `(event, repetition, coil)`. Entries of events
/// without an active ADC are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    n_events: usize,
    n_reps: usize,
    n_coils: usize,
    adc: Vec<bool>,
    data: Vec<Complex64>,
}

impl Signal {
    pub(crate) fn zeros(seq: &Sequence, n_coils: usize) -> Self {
        let n_events = seq.n_events();
        let n_reps = seq.n_reps();
        let adc = seq.repetitions().flatten().map(|e| e.adc_active).collect();
        Self {
            n_events,
            n_reps,
            n_coils,
            adc,
            data: vec![Complex64::new(0.0, 0.0); n_events * n_reps * n_coils],
        }
    }

    /// Wraps samples measured on a real scanner so they can be reconstructed
    /// like simulated ones. `samples` holds the ADC samples in acquisition
    /// order, all coils of a sample next to each other.
    pub fn from_adc_samples(seq: &Sequence, n_coils: usize, samples: &[Complex64]) -> Result<Self> {
        if n_coils == 0 {
            return Err(Error::InvalidParameter {
                name: "n_coils",
                reason: "at least one receive coil is needed".to_owned(),
            });
        }
        check_shape("measured ADC samples", seq.adc_count() * n_coils, samples.len())?;
        let mut signal = Self::zeros(seq, n_coils);
        let adc_events = (0..signal.adc.len()).filter(|&i| signal.adc[i]).collect::<Vec<_>>();
        for (i, coils) in adc_events.into_iter().zip(samples.chunks(n_coils)) {
            signal.data[i * n_coils..(i + 1) * n_coils].copy_from_slice(coils);
        }
        Ok(signal)
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn n_reps(&self) -> usize {
        self.n_reps
    }

    pub fn n_coils(&self) -> usize {
        self.n_coils
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn offset(&self, event: usize, rep: usize) -> usize {
        (rep * self.n_events + event) * self.n_coils
    }

    pub fn get(&self, event: usize, rep: usize, coil: usize) -> Complex64 {
        assert!(event < self.n_events && rep < self.n_reps && coil < self.n_coils);
        self.data[self.offset(event, rep) + coil]
    }

    pub fn is_sampled(&self, event: usize, rep: usize) -> bool {
        self.adc[rep * self.n_events + event]
    }

    /// All ADC samples of one coil in acquisition order.
    pub fn adc_trace(&self, coil: usize) -> Vec<Complex64> {
        assert!(coil < self.n_coils);
        self.adc
            .iter()
            .enumerate()
            .filter(|&(_, &active)| active)
            .map(|(i, _)| self.data[i * self.n_coils + coil])
            .collect()
    }

    pub(crate) fn data(&self) -> &[Complex64] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    /// The signal must come from a sequence with the same shape and ADC mask.
    pub(crate) fn check_matches(&self, seq: &Sequence) -> Result<()> {
        check_shape("signal events", seq.n_events(), self.n_events)?;
        check_shape("signal repetitions", seq.n_reps(), self.n_reps)?;
        let mismatch = seq
            .repetitions()
            .flatten()
            .zip(&self.adc)
            .position(|(event, &sampled)| event.adc_active != sampled);
        match mismatch {
            Some(i) => Err(Error::AdcMaskMismatch {
                event: i % self.n_events,
                rep: i / self.n_events,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SequenceClass;
    use assert2::check;

    #[test]
    fn measured_samples_are_placed_on_adc_events() {
        let mut seq = Sequence::new(3, 2, SequenceClass::GradientEcho).unwrap();
        seq.set_adc_mask(&[false, true, true]).unwrap();
        let samples: Vec<_> = (0..8).map(|i| Complex64::new(i as f64, 0.0)).collect();

        check!(Signal::from_adc_samples(&seq, 2, &samples[..7]).is_err());
        let signal = Signal::from_adc_samples(&seq, 2, &samples).unwrap();

        check!(signal.get(0, 0, 0) == Complex64::new(0.0, 0.0));
        check!(signal.get(1, 0, 1) == Complex64::new(1.0, 0.0));
        check!(signal.get(2, 1, 0) == Complex64::new(6.0, 0.0));
        check!(signal.adc_trace(1).iter().map(|s| s.re).collect::<Vec<_>>() == vec![1.0, 3.0, 5.0, 7.0]);
        check!(signal.is_sampled(1, 1));
        check!(!signal.is_sampled(0, 1));
        check!(signal.check_matches(&seq).is_ok());
    }
}
