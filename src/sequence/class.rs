use super::Event;

/// Acquisition family. The only behavior that depends on it is how the
/// cumulative gradient moment (the k-space position) reacts to a refocusing
/// pulse; the simulated physics is the same for all classes.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceClass {
    /// Gradient echo / FID: moments only add up.
    #[default]
    GradientEcho,
    /// Spin echo: a refocusing pulse inverts the accumulated moment.
    SpinEcho,
}

impl SequenceClass {
    /// Moment after `event`, given the moment before it. The gradient of an
    /// event acts before its pulse, so the increment is added first. Zero
    /// duration events play no gradient.
    pub fn accumulate(self, k: [f64; 2], event: &Event) -> [f64; 2] {
        let k = if event.duration == 0.0 {
            k
        } else {
            [
                k[0] + event.gradient_moment[0],
                k[1] + event.gradient_moment[1],
            ]
        };
        match self {
            SequenceClass::SpinEcho if event.has_rf() && event.is_refocusing() => [-k[0], -k[1]],
            _ => k,
        }
    }

    /// Cumulative moment at the end of every event of one repetition,
    /// starting from zero.
    pub fn trajectory(self, events: &[Event]) -> Vec<[f64; 2]> {
        events
            .iter()
            .scan([0.0, 0.0], |k, event| {
                *k = self.accumulate(*k, event);
                Some(*k)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn gradient(gx: f64, gy: f64) -> Event {
        Event {
            gradient_moment: [gx, gy],
            duration: 1e-3,
            ..Event::null()
        }
    }

    fn pulse(angle: f64) -> Event {
        Event {
            flip_angle: angle,
            rf_phase: FRAC_PI_2,
            ..gradient(0.0, 0.0)
        }
    }

    #[test]
    fn gradient_echo_ignores_pulses() {
        let events = [gradient(-2.0, 1.0), pulse(PI), gradient(1.0, 0.0)];
        let k = SequenceClass::GradientEcho.trajectory(&events);
        check!(k == vec![[-2.0, 1.0], [-2.0, 1.0], [-1.0, 1.0]]);
    }

    #[test]
    fn spin_echo_inverts_at_refocusing() {
        let events = [
            pulse(FRAC_PI_2),
            gradient(3.0, -1.0),
            pulse(PI),
            gradient(1.0, 0.0),
        ];
        let k = SequenceClass::SpinEcho.trajectory(&events);
        check!(k == vec![[0.0, 0.0], [3.0, -1.0], [-3.0, 1.0], [-2.0, 1.0]]);
    }

    #[test]
    fn increment_is_added_before_inversion() {
        let event = Event {
            gradient_moment: [1.0, 0.0],
            ..pulse(PI)
        };
        let k = SequenceClass::SpinEcho.accumulate([2.0, 0.0], &event);
        check!(k == [-3.0, -0.0]);
    }

    #[test]
    fn zero_duration_plays_no_gradient() {
        let event = Event {
            duration: 0.0,
            ..gradient(5.0, 5.0)
        };
        check!(SequenceClass::GradientEcho.accumulate([1.0, 2.0], &event) == [1.0, 2.0]);
    }
}
