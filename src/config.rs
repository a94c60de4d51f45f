/// Numerical precision of the stored isochromat state. Arithmetic is always
/// done in `f64`; `Single` rounds the state to `f32` after every event.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Single,
    #[default]
    Double,
}

impl Precision {
    #[inline]
    pub fn round(self, x: f64) -> f64 {
        match self {
            Precision::Single => x as f32 as f64,
            Precision::Double => x,
        }
    }
}

/// What happens to the magnetization between two repetitions.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// The state at the end of a repetition is the start of the next one.
    #[default]
    Carry,
    /// Every repetition starts from equilibrium `(0, 0, PD)`.
    Relaxed,
}

/// Source of the relative transmit / receive field scaling.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum B1Source {
    /// Use the rB1 value stored per voxel in the phantom
    #[default]
    Phantom,
    /// Ignore the phantom and assume a homogeneous field of 1
    Uniform,
}

/// Settings of a simulation run. Passed explicitly to the scanner instead of
/// living in process wide flags.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub precision: Precision,
    /// Standard deviation of the additive noise, per real component
    pub noise_std: f64,
    pub noise_seed: u64,
    pub reset: ResetPolicy,
    /// Zero the transverse magnetization at the end of every repetition
    pub spoil_transverse: bool,
    pub b1: B1Source,
    /// Unit: `s`. T1 and T2 below this are clamped to it.
    pub relaxation_cutoff: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            precision: Precision::Double,
            noise_std: 0.0,
            noise_seed: 0,
            reset: ResetPolicy::Carry,
            spoil_transverse: false,
            b1: B1Source::Phantom,
            relaxation_cutoff: 1e-12,
        }
    }
}

impl SimConfig {
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_noise(mut self, std: f64, seed: u64) -> Self {
        self.noise_std = std;
        self.noise_seed = seed;
        self
    }

    pub fn with_reset(mut self, reset: ResetPolicy) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_spoiling(mut self, spoil_transverse: bool) -> Self {
        self.spoil_transverse = spoil_transverse;
        self
    }

    pub fn with_b1(mut self, b1: B1Source) -> Self {
        self.b1 = b1;
        self
    }

    pub fn with_relaxation_cutoff(mut self, cutoff: f64) -> Self {
        self.relaxation_cutoff = cutoff;
        self
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(crate::Error::InvalidParameter {
                name: "noise_std",
                reason: format!("must be finite and >= 0, got {}", self.noise_std),
            });
        }
        if self.relaxation_cutoff.is_nan() || self.relaxation_cutoff <= 0.0 {
            return Err(crate::Error::InvalidParameter {
                name: "relaxation_cutoff",
                reason: format!("must be > 0, got {}", self.relaxation_cutoff),
            });
        }
        Ok(())
    }
}
